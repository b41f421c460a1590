//! This module implements the boosting driver: an ensemble of weighted
//! regression trees trained with LambdaMART.
//!
//! Every round scores the training documents with the current ensemble,
//! computes the lambda gradients of every query, fits a regression tree to
//! the negated lambdas and adds it to the ensemble with the current learning
//! rate as its weight. The scores are updated in place from the new tree's
//! leaf assignment. Training stops after `iterations` rounds, when the
//! learning rate schedule is exhausted, or, with early stopping enabled, when
//! nDCG has not improved for `early_stop_rounds` rounds; in that case the
//! ensemble is cut back to its best round.
//!
//! # Example
//! ```
//! use ltr::config::Config;
//! use ltr::data_container::{FeatureSet, InputDataContainer};
//! use ltr::gradient_boost::LambdaMART;
//!
//! let docs = vec![
//!     FeatureSet::new_training_data(1, vec![0.1, 3.0], 0),
//!     FeatureSet::new_training_data(1, vec![0.9, 1.0], 2),
//!     FeatureSet::new_training_data(1, vec![0.5, 2.0], 1),
//!     FeatureSet::new_training_data(2, vec![0.8, 1.5], 1),
//!     FeatureSet::new_training_data(2, vec![0.2, 2.5], 0),
//! ];
//! let train = InputDataContainer::from_feature_sets(2, &docs).unwrap();
//!
//! let mut cfg = Config::new();
//! cfg.set_feature_size(2);
//! cfg.set_iterations(10);
//! cfg.set_learning_rate("constant:0.5").unwrap();
//!
//! let mut model = LambdaMART::new(&cfg);
//! model.fit(&train).unwrap();
//! assert!(model.evaluate(&train).unwrap() > 0.99);
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter};

use crate::config::Config;
use crate::data_container::{DataContainer, FeatureSet, ValueType};
use crate::errors::{LtrError, Result};
use crate::model::Scorer;
use crate::ndcg::NdcgEvaluator;
use crate::regression_tree::RegressionTree;

#[cfg(feature = "enable_training")]
use crate::binary_tree::TreeIndex;
#[cfg(feature = "enable_training")]
use crate::config::Algorithm;
#[cfg(feature = "enable_training")]
use crate::data_container::ReferenceDataContainer;
#[cfg(feature = "enable_training")]
use crate::fitness::double_equals;
#[cfg(feature = "enable_training")]
use crate::lambda::LambdaGradientComputer;
#[cfg(feature = "enable_training")]
use crate::learning_rate::LearningRateFunction;

use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};

/// An additive model: the score of a document is the weighted sum of the
/// scores of the trees.
///
/// # Example
/// ```
/// use ltr::data_container::InputDataContainer;
/// use ltr::gradient_boost::Ensemble;
/// use ltr::model::Scorer;
/// use ltr::regression_tree::RegressionTree;
///
/// let mut data = InputDataContainer::new(1);
/// data.read_data_item(&[1.0], 2.0, 0).unwrap();
/// data.finalize_data().unwrap();
/// let mut tree = RegressionTree::new();
/// tree.build_tree(&data, 0.0, 1).unwrap();
///
/// let mut ensemble = Ensemble::new();
/// ensemble.push(tree.clone(), 0.5);
/// ensemble.push(tree, 0.25);
/// assert_eq!(ensemble.score(&[1.0]), 1.5);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ensemble {
    trees: Vec<(RegressionTree, ValueType)>,
}

impl Ensemble {
    pub fn new() -> Self {
        Ensemble { trees: Vec::new() }
    }

    /// Append `tree` with the given weight.
    pub fn push(&mut self, tree: RegressionTree, weight: ValueType) {
        self.trees.push((tree, weight));
    }

    /// Keep only the first `len` trees.
    pub fn truncate(&mut self, len: usize) {
        self.trees.truncate(len);
    }

    pub fn trees(&self) -> &[(RegressionTree, ValueType)] {
        &self.trees
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// The weighted sum of the first `n` trees only.
    pub fn score_n(&self, features: &[ValueType], n: usize) -> ValueType {
        self.trees
            .iter()
            .take(n)
            .map(|(tree, weight)| weight * tree.score(features))
            .sum()
    }
}

impl Scorer for Ensemble {
    fn score(&self, features: &[ValueType]) -> ValueType {
        self.score_n(features, self.trees.len())
    }
}

/// The LambdaMART ranker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LambdaMART {
    conf: Config,
    ensemble: Ensemble,
}

impl LambdaMART {
    /// Return a untrained model with the given config.
    pub fn new(conf: &Config) -> LambdaMART {
        LambdaMART {
            conf: conf.clone(),
            ensemble: Ensemble::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.conf
    }

    pub fn ensemble(&self) -> &Ensemble {
        &self.ensemble
    }

    /// Train on `train`. Early stopping, if enabled, watches the training nDCG.
    #[cfg(feature = "enable_training")]
    pub fn fit<D>(&mut self, train: &D) -> Result<()>
    where
        D: DataContainer + Sync + ?Sized,
    {
        self.fit_inner(train, None)
    }

    /// Train on `train`, reporting (and early stopping on) the nDCG of `valid`.
    #[cfg(feature = "enable_training")]
    pub fn fit_with_validation<D, V>(&mut self, train: &D, valid: &V) -> Result<()>
    where
        D: DataContainer + Sync + ?Sized,
        V: DataContainer + Sync + ?Sized,
    {
        self.check_dimensions(valid)?;
        if valid.dimensions() != train.dimensions() {
            return Err(LtrError::FeatureSizeMismatch {
                expected: train.dimensions(),
                actual: valid.dimensions(),
            });
        }
        if valid.is_empty() {
            return Err(LtrError::EmptyData);
        }
        self.fit_inner(train, Some(ReferenceDataContainer::new(valid)))
    }

    #[cfg(feature = "enable_training")]
    fn fit_inner<D>(&mut self, train: &D, valid: Option<ReferenceDataContainer<'_>>) -> Result<()>
    where
        D: DataContainer + Sync + ?Sized,
    {
        self.conf.validate()?;
        if train.is_empty() {
            return Err(LtrError::EmptyData);
        }
        self.check_dimensions(train)?;
        if self.conf.feature_size == 0 {
            self.conf.feature_size = train.dimensions();
        }

        let conf = self.conf.clone();
        let evaluator = NdcgEvaluator::new(conf.ndcg_cutoff);
        let mut learning_rate = conf.learning_rate.clone();
        learning_rate.reset();
        let mut computer = LambdaGradientComputer::new(conf.algorithm, conf.sigma);
        computer.initialize(train);
        log::debug!(
            "training on {} rows in {} queries\n{}",
            train.rows(),
            computer.groups().len(),
            conf
        );

        let rows = train.rows();
        let mut scores = vec![0.0; rows];
        let mut lambdas = vec![0.0; rows];
        let mut weights = vec![0.0; rows];
        let mut targets = vec![0.0; rows];
        let mut valid_scores = valid.map(|v| vec![0.0; v.rows()]);

        // (ensemble length, nDCG) of the best round so far
        let mut best: Option<(usize, ValueType)> = None;
        let mut rounds_since_best = 0;

        self.ensemble = Ensemble::new();
        for round in 0..conf.iterations {
            computer.compute(train, &scores, &mut lambdas, &mut weights)?;
            if lambdas.iter().all(|l| *l == 0.0) {
                log::warn!("round {}: all lambdas are zero, the tree is a constant", round);
            }
            for (target, lambda) in targets.iter_mut().zip(lambdas.iter()) {
                *target = -lambda;
            }

            let view = ReferenceDataContainer::with_outputs(train, &targets)?;
            let mut tree = RegressionTree::new();
            tree.set_feature_sample_ratio(conf.feature_sample_ratio);
            let assignment = tree.build_tree(&view, conf.min_error_decrease, conf.min_leaf_size)?;
            if conf.newton_leaves && conf.algorithm == Algorithm::LambdaMART {
                newton_leaves(&mut tree, &assignment, &targets, &weights)?;
            }

            let rate = learning_rate.get();
            let leaf_outputs: Vec<ValueType> = (0..tree.len())
                .map(|id| tree.node(id).map_or(0.0, |n| n.output))
                .collect();
            for (score, leaf) in scores.iter_mut().zip(assignment.iter()) {
                *score += rate * leaf_outputs[*leaf];
            }
            if let (Some(v), Some(v_scores)) = (valid.as_ref(), valid_scores.as_mut()) {
                v_scores.par_iter_mut().enumerate().for_each(|(row, score)| {
                    *score += rate * tree.score(v.row(row));
                });
            }
            if conf.debug {
                log::debug!("round {} tree:\n{}", round, tree.render());
            }
            let leaves = tree.leaf_count();
            self.ensemble.push(tree, rate);

            let train_ndcg = evaluator.evaluate(train, &scores)?;
            let valid_ndcg = match (valid.as_ref(), valid_scores.as_ref()) {
                (Some(v), Some(v_scores)) => Some(evaluator.evaluate(v, v_scores)?),
                _ => None,
            };
            match valid_ndcg {
                Some(v_ndcg) => log::info!(
                    "round {}: learning rate = {}, leaves = {}, train nDCG@{} = {:.6}, valid nDCG@{} = {:.6}",
                    round,
                    rate,
                    leaves,
                    conf.ndcg_cutoff,
                    train_ndcg,
                    conf.ndcg_cutoff,
                    v_ndcg
                ),
                None => log::info!(
                    "round {}: learning rate = {}, leaves = {}, train nDCG@{} = {:.6}",
                    round,
                    rate,
                    leaves,
                    conf.ndcg_cutoff,
                    train_ndcg
                ),
            }

            if conf.early_stop_rounds > 0 {
                let current = valid_ndcg.unwrap_or(train_ndcg);
                match best {
                    Some((_, best_ndcg)) if current <= best_ndcg => rounds_since_best += 1,
                    _ => {
                        best = Some((self.ensemble.len(), current));
                        rounds_since_best = 0;
                    }
                }
                if rounds_since_best >= conf.early_stop_rounds {
                    if let Some((best_len, best_ndcg)) = best {
                        log::warn!(
                            "no improvement for {} rounds, restoring the model of round {} (nDCG@{} = {:.6})",
                            rounds_since_best,
                            best_len - 1,
                            conf.ndcg_cutoff,
                            best_ndcg
                        );
                        self.ensemble.truncate(best_len);
                    }
                    break;
                }
            }

            if !learning_rate.advance() {
                log::info!("learning rate schedule exhausted after {} rounds", round + 1);
                break;
            }
        }
        Ok(())
    }

    fn check_dimensions<D>(&self, data: &D) -> Result<()>
    where
        D: DataContainer + ?Sized,
    {
        if self.conf.feature_size != 0 && data.dimensions() != self.conf.feature_size {
            return Err(LtrError::FeatureSizeMismatch {
                expected: self.conf.feature_size,
                actual: data.dimensions(),
            });
        }
        Ok(())
    }

    /// Score every row of `data`.
    pub fn predict<D>(&self, data: &D) -> Result<Vec<ValueType>>
    where
        D: DataContainer + Sync + ?Sized,
    {
        self.check_dimensions(data)?;
        Ok((0..data.rows())
            .into_par_iter()
            .map(|row| self.ensemble.score(data.row(row)))
            .collect())
    }

    /// Write the model's score of every document into `doc.score`.
    pub fn score_feature_sets(&self, docs: &mut [FeatureSet]) -> Result<()> {
        if self.conf.feature_size != 0 {
            if let Some(doc) = docs
                .iter()
                .find(|doc| doc.features.len() != self.conf.feature_size)
            {
                return Err(LtrError::FeatureSizeMismatch {
                    expected: self.conf.feature_size,
                    actual: doc.features.len(),
                });
            }
        }
        docs.par_iter_mut()
            .for_each(|doc| doc.score = self.ensemble.score(&doc.features));
        Ok(())
    }

    /// The mean nDCG@`ndcg_cutoff` of the model on `data`.
    pub fn evaluate<D>(&self, data: &D) -> Result<ValueType>
    where
        D: DataContainer + Sync + ?Sized,
    {
        let scores = self.predict(data)?;
        NdcgEvaluator::new(self.conf.ndcg_cutoff).evaluate(data, &scores)
    }

    /// Save the model to a file using serde_json.
    pub fn save_model(&self, filename: &str) -> Result<()> {
        let file = File::create(filename)?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Load a model saved by `save_model`.
    pub fn load_model(filename: &str) -> Result<Self> {
        let file = File::open(filename)?;
        let model = serde_json::from_reader(BufReader::new(file))?;
        Ok(model)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Scorer for LambdaMART {
    fn score(&self, features: &[ValueType]) -> ValueType {
        self.ensemble.score(features)
    }
}

/// Replace every leaf output with the Newton step `Σ target / Σ weight` over
/// the rows of the leaf; 0 when the weights vanish.
#[cfg(feature = "enable_training")]
fn newton_leaves(
    tree: &mut RegressionTree,
    assignment: &[TreeIndex],
    targets: &[ValueType],
    weights: &[ValueType],
) -> Result<()> {
    let mut sums = vec![(0.0, 0.0); tree.len()];
    for ((leaf, target), weight) in assignment.iter().zip(targets.iter()).zip(weights.iter()) {
        sums[*leaf].0 += target;
        sums[*leaf].1 += weight;
    }
    for leaf in tree.leaves() {
        let (target_sum, weight_sum) = sums[leaf];
        let output = if double_equals(weight_sum, 0.0) {
            0.0
        } else {
            target_sum / weight_sum
        };
        tree.set_leaf_output(leaf, output)?;
    }
    Ok(())
}
