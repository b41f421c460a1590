//! This module implements the least-squares regression tree used as the weak
//! learner of the boosting driver.
//!
//! The builder keeps, for every feature, the row indices sorted by that
//! feature's value. Instead of physically splitting the data, every row
//! carries the id of the node it currently belongs to. A node scans each
//! feature's sorted rows with running sums, picks the split with the lowest
//! `left_error + right_error` and recurses on both children, which get fresh
//! ids (left first). Equal feature values always stay on the same side.
//!
//! # Example
//! ```
//! use ltr::data_container::InputDataContainer;
//! use ltr::model::Scorer;
//! use ltr::regression_tree::RegressionTree;
//!
//! let mut data = InputDataContainer::new(1);
//! for (x, y) in &[(1.5, 1.0), (1.5, 1.0), (3.0, 1.0), (3.0, 2.0), (3.0, 2.0), (3.0, 2.0)] {
//!     data.read_data_item(&[*x], *y, 0).unwrap();
//! }
//! data.finalize_data().unwrap();
//!
//! let mut tree = RegressionTree::new();
//! tree.build_tree(&data, 0.0, 1).unwrap();
//! assert_eq!(tree.score(&[1.0]), 1.0);
//! assert_eq!(tree.score(&[3.0]), 1.75);
//! ```

use crate::binary_tree::{BinaryTree, BinaryTreeNode, TreeIndex};
use crate::data_container::ValueType;
use crate::errors::{LtrError, Result};
use crate::model::Scorer;

#[cfg(feature = "enable_training")]
use crate::data_container::DataContainer;
#[cfg(feature = "enable_training")]
use crate::fitness::{double_equals, squared_error_from_sums, EPSILON};

#[cfg(feature = "enable_training")]
use rand::prelude::SliceRandom;
#[cfg(feature = "enable_training")]
use rand::thread_rng;
#[cfg(feature = "enable_training")]
use rayon::prelude::*;

use serde_derive::{Deserialize, Serialize};

/// A node of the regression tree. It's stored in the `value` of the
/// ltr::binary_tree::BinaryTreeNode; the node id is its arena index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RTNode {
    /// the feature used to split the node
    pub feature_index: usize,
    /// rows with `feature < threshold` go to the left child
    pub threshold: ValueType,
    /// the mean target of the rows under the node, the prediction of a leaf
    pub output: ValueType,
    /// sum of squared deviations of the targets from `output`
    pub error: ValueType,
    pub is_leaf: bool,
}

impl RTNode {
    fn leaf(output: ValueType, error: ValueType) -> Self {
        RTNode {
            feature_index: 0,
            threshold: 0.0,
            output,
            error,
            is_leaf: true,
        }
    }
}

/// Count and running sums of the targets under a node or one side of a split.
#[cfg(feature = "enable_training")]
#[derive(Debug, Clone, Copy, Default)]
struct NodeStats {
    count: usize,
    sum: f64,
    sum_sq: f64,
}

#[cfg(feature = "enable_training")]
impl NodeStats {
    fn push(&mut self, target: ValueType) {
        self.count += 1;
        self.sum += target;
        self.sum_sq += target * target;
    }

    fn mean(&self) -> ValueType {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    fn error(&self) -> ValueType {
        squared_error_from_sums(self.sum, self.sum_sq, self.count)
    }

    fn collect(outputs: &[ValueType], valid: &[TreeIndex], node: TreeIndex) -> Self {
        let mut stats = NodeStats::default();
        for (target, _) in outputs.iter().zip(valid.iter()).filter(|(_, id)| **id == node) {
            stats.push(*target);
        }
        stats
    }
}

/// The best split of one feature.
#[cfg(feature = "enable_training")]
#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: ValueType,
    error: ValueType,
}

/// The regression tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    tree: BinaryTree<RTNode>,
    /// portion of features examined when splitting a node
    feature_sample_ratio: f64,
}

impl Default for RegressionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RegressionTree {
    /// Return an empty tree. Scoring an empty tree returns 0.
    pub fn new() -> Self {
        RegressionTree {
            tree: BinaryTree::new(),
            feature_sample_ratio: 1.0,
        }
    }

    /// Set the portion of features to be examined. When splitting a node, a random subset
    /// of `feature_size * feature_sample_ratio` features (at least one) is searched.
    pub fn set_feature_sample_ratio(&mut self, feature_sample_ratio: f64) {
        self.feature_sample_ratio = feature_sample_ratio;
    }

    /// Build the tree on the outputs of `data`.
    ///
    /// A node is split only if the best split leaves at least `q` rows on each
    /// side and lowers the error by more than `delta`. Returns, for every row,
    /// the id of the leaf it ends up in.
    ///
    /// # Example
    /// ```
    /// use ltr::data_container::InputDataContainer;
    /// use ltr::regression_tree::RegressionTree;
    ///
    /// let rows = [
    ///     ([1.0, 1.0, 8.0], 1.0), ([2.0, 3.0, 7.0], 2.0),
    ///     ([3.0, 4.0, 4.0], 2.0), ([4.0, 2.0, 3.0], 1.0),
    ///     ([5.0, 6.0, 1.0], 3.0), ([6.0, 8.0, 2.0], 4.0),
    ///     ([7.0, 5.0, 5.0], 3.0), ([8.0, 7.0, 6.0], 4.0),
    /// ];
    /// let mut data = InputDataContainer::new(3);
    /// for (features, relevance) in rows.iter() {
    ///     data.read_data_item(features, *relevance, 1).unwrap();
    /// }
    /// data.finalize_data().unwrap();
    ///
    /// let mut tree = RegressionTree::new();
    /// let leaves = tree.build_tree(&data, 0.0, 2).unwrap();
    /// assert_eq!(tree.root().unwrap().output, 2.5);
    /// assert!(tree.leaf_count() >= 2);
    /// assert!(leaves.iter().all(|id| tree.node(*id).unwrap().is_leaf));
    /// ```
    ///
    /// # Errors
    /// `EmptyData` for a container without rows, `InvalidConfig` when `q` is 0.
    #[cfg(feature = "enable_training")]
    pub fn build_tree<D>(&mut self, data: &D, delta: ValueType, q: usize) -> Result<Vec<TreeIndex>>
    where
        D: DataContainer + Sync + ?Sized,
    {
        if data.is_empty() {
            return Err(LtrError::EmptyData);
        }
        if q == 0 {
            return Err(LtrError::InvalidConfig(
                "the minimum leaf size of a regression tree must be at least 1".to_string(),
            ));
        }
        let sorted = Self::create_sorted(data);

        let mut valid = vec![0; data.rows()];
        let root_stats = NodeStats::collect(data.outputs(), &valid, 0);
        let root = self
            .tree
            .add_root(BinaryTreeNode::new(RTNode::leaf(root_stats.mean(), root_stats.error())));
        self.split_node(data, &sorted, &mut valid, root, root_stats, delta, q);

        log::debug!(
            "regression tree built: {} nodes, {} leaves",
            self.len(),
            self.leaf_count()
        );
        Ok(valid)
    }

    /// For every feature, the row indices sorted by that feature's value.
    #[cfg(feature = "enable_training")]
    fn create_sorted<D>(data: &D) -> Vec<Vec<usize>>
    where
        D: DataContainer + Sync + ?Sized,
    {
        (0..data.dimensions())
            .into_par_iter()
            .map(|feature| {
                let mut rows: Vec<usize> = (0..data.rows()).collect();
                rows.sort_by(|a, b| data.value(*a, feature).total_cmp(&data.value(*b, feature)));
                rows
            })
            .collect()
    }

    /// The features searched for the next split, in ascending order.
    #[cfg(feature = "enable_training")]
    fn candidate_features(&self, feature_size: usize) -> Vec<usize> {
        let mut features: Vec<usize> = (0..feature_size).collect();
        if self.feature_sample_ratio < 1.0 {
            let mut rng = thread_rng();
            features.shuffle(&mut rng);
            let keep = ((self.feature_sample_ratio * feature_size as f64) as usize).max(1);
            features.truncate(keep);
            features.sort_unstable();
        }
        features
    }

    /// Recursively split `node`. The rows under it are the rows whose `valid`
    /// label equals `node`.
    #[cfg(feature = "enable_training")]
    #[allow(clippy::too_many_arguments)]
    fn split_node<D>(
        &mut self,
        data: &D,
        sorted: &[Vec<usize>],
        valid: &mut [TreeIndex],
        node: TreeIndex,
        stats: NodeStats,
        delta: ValueType,
        q: usize,
    ) where
        D: DataContainer + Sync + ?Sized,
    {
        let node_error = stats.error();
        let features = self.candidate_features(data.dimensions());

        let labels: &[TreeIndex] = &*valid;
        let candidates: Vec<Option<SplitCandidate>> = features
            .par_iter()
            .map(|feature| best_split(data, &sorted[*feature], labels, node, *feature, &stats, q))
            .collect();

        // features are ascending, so on equal errors the lowest feature wins
        let mut best: Option<SplitCandidate> = None;
        for candidate in candidates.into_iter().flatten() {
            if candidate.error < best.map_or(node_error, |b| b.error) {
                best = Some(candidate);
            }
        }
        // gains below the rounding noise of the running sums are no gains
        let noise = EPSILON * stats.sum_sq;
        let best = match best {
            Some(best) if best.error + delta + noise < node_error => best,
            _ => return,
        };

        if let Some(node_ref) = self.tree.get_node_mut(node) {
            node_ref.value.feature_index = best.feature;
            node_ref.value.threshold = best.threshold;
            node_ref.value.is_leaf = false;
        }

        let left = self
            .tree
            .add_left_node(node, BinaryTreeNode::new(RTNode::leaf(0.0, 0.0)));
        let right = self
            .tree
            .add_right_node(node, BinaryTreeNode::new(RTNode::leaf(0.0, 0.0)));
        for (row, label) in valid.iter_mut().enumerate() {
            if *label == node {
                *label = if data.value(row, best.feature) < best.threshold {
                    left
                } else {
                    right
                };
            }
        }

        log::trace!(
            "node {} split on ${} < {} into {} and {}",
            node,
            best.feature,
            best.threshold,
            left,
            right
        );

        let left_stats = NodeStats::collect(data.outputs(), valid, left);
        let right_stats = NodeStats::collect(data.outputs(), valid, right);
        for (child, child_stats) in [(left, left_stats), (right, right_stats)].iter() {
            if let Some(child_ref) = self.tree.get_node_mut(*child) {
                child_ref.value.output = child_stats.mean();
                child_ref.value.error = child_stats.error();
            }
        }
        self.split_node(data, sorted, valid, left, left_stats, delta, q);
        self.split_node(data, sorted, valid, right, right_stats, delta, q);
    }

    /// Return the root node, if the tree has been built.
    pub fn root(&self) -> Option<&RTNode> {
        self.tree.get_root().map(|n| &n.value)
    }

    /// Return the node with the given id.
    pub fn node(&self, id: TreeIndex) -> Option<&RTNode> {
        self.tree.get_node(id).map(|n| &n.value)
    }

    /// The ids of the leaves, in id order.
    pub fn leaves(&self) -> Vec<TreeIndex> {
        self.tree
            .iter()
            .filter(|n| n.value.is_leaf)
            .map(|n| n.index())
            .collect()
    }

    pub fn leaf_count(&self) -> usize {
        self.tree.iter().filter(|n| n.value.is_leaf).count()
    }

    /// Replace the output of leaf `id`, keeping the split structure.
    ///
    /// # Example
    /// ```
    /// use ltr::data_container::InputDataContainer;
    /// use ltr::model::Scorer;
    /// use ltr::regression_tree::RegressionTree;
    ///
    /// let mut data = InputDataContainer::new(1);
    /// data.read_data_item(&[1.0], 4.0, 0).unwrap();
    /// data.finalize_data().unwrap();
    /// let mut tree = RegressionTree::new();
    /// let leaves = tree.build_tree(&data, 0.0, 1).unwrap();
    ///
    /// tree.set_leaf_output(leaves[0], -1.0).unwrap();
    /// assert_eq!(tree.score(&[1.0]), -1.0);
    /// assert!(tree.set_leaf_output(7, 0.0).is_err());
    /// ```
    pub fn set_leaf_output(&mut self, id: TreeIndex, output: ValueType) -> Result<()> {
        match self.tree.get_node_mut(id) {
            Some(node) if node.value.is_leaf => {
                node.value.output = output;
                Ok(())
            }
            _ => Err(LtrError::NotALeaf(id)),
        }
    }

    /// The number of nodes.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Render the tree one node per line, children indented below their parent:
    /// `id: output (err: error) $feature < threshold ?` for internal nodes and
    /// `id: output (err: error)` for leaves.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (depth, node) in self.tree.preorder() {
            for _ in 0..depth {
                out.push_str("  ");
            }
            let n = &node.value;
            if n.is_leaf {
                out.push_str(&format!("{}: {} (err: {})\n", node.index(), n.output, n.error));
            } else {
                out.push_str(&format!(
                    "{}: {} (err: {}) ${} < {} ?\n",
                    node.index(),
                    n.output,
                    n.error,
                    n.feature_index,
                    n.threshold
                ));
            }
        }
        out
    }
}

impl Scorer for RegressionTree {
    /// Walk from the root to a leaf, going left when `features[feature_index] < threshold`.
    ///
    /// # Panic
    /// If `features` is shorter than a feature index used by the tree.
    fn score(&self, features: &[ValueType]) -> ValueType {
        let mut node = match self.tree.get_root() {
            Some(root) => root,
            None => return 0.0,
        };
        while !node.value.is_leaf {
            let next = if features[node.value.feature_index] < node.value.threshold {
                self.tree.get_left_child(node)
            } else {
                self.tree.get_right_child(node)
            };
            match next {
                Some(child) => node = child,
                None => break,
            }
        }
        node.value.output
    }
}

/// Scan the rows of `node` in the order of `feature` and return the split with
/// the lowest total error that leaves at least `q` rows on each side.
#[cfg(feature = "enable_training")]
fn best_split<D>(
    data: &D,
    order: &[usize],
    valid: &[TreeIndex],
    node: TreeIndex,
    feature: usize,
    totals: &NodeStats,
    q: usize,
) -> Option<SplitCandidate>
where
    D: DataContainer + ?Sized,
{
    let outputs = data.outputs();
    let mut left = NodeStats::default();
    let mut last_value: Option<ValueType> = None;
    let mut best: Option<SplitCandidate> = None;

    for row in order.iter().copied().filter(|row| valid[*row] == node) {
        let curr_value = data.value(row, feature);
        if let Some(last) = last_value {
            if double_equals(last, curr_value) {
                left.push(outputs[row]);
                continue;
            }
        }

        let right_count = totals.count - left.count;
        if left.count >= q && right_count >= q {
            let right_error = squared_error_from_sums(
                totals.sum - left.sum,
                totals.sum_sq - left.sum_sq,
                right_count,
            );
            let error = left.error() + right_error;
            if best.map_or(true, |b| error < b.error) {
                let threshold = match last_value {
                    Some(last) => (last + curr_value) / 2.0,
                    None => curr_value - EPSILON,
                };
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    error,
                });
            }
        }

        left.push(outputs[row]);
        last_value = Some(curr_value);
    }
    best
}
