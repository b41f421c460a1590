//! This module implements a simple arena binary tree.
//!
//! Nodes live in a [std::vec::Vec](https://doc.rust-lang.org/std/vec/struct.Vec.html)
//! and refer to their children by index, so each node exclusively owns its two
//! children and dropping the tree drops every node at once. Nodes can be
//! inserted and modified; deleting a node is not supported.

use serde_derive::{Deserialize, Serialize};

/// Node of the binary tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BinaryTreeNode<T> {
    /// Store information in a node.
    pub value: T,

    /// The position of this node in the arena.
    index: usize,

    /// The index of the left child node. 0 means no left child.
    left: usize,

    /// The index of the right child node. 0 means no right child.
    right: usize,
}

impl<T> BinaryTreeNode<T> {
    /// New a node with given value
    ///
    /// # Example
    /// ```
    /// use ltr::binary_tree::BinaryTreeNode;
    /// let root = BinaryTreeNode::new(2.5);
    /// assert!(root.is_leaf());
    /// ```
    pub fn new(value: T) -> Self {
        BinaryTreeNode {
            value,
            index: 0,
            left: 0,
            right: 0,
        }
    }

    /// The arena index of this node.
    pub fn index(&self) -> TreeIndex {
        self.index
    }

    /// A node without children. Internal nodes always have both children.
    pub fn is_leaf(&self) -> bool {
        self.left == 0 && self.right == 0
    }
}

/// The index to retrieve a tree node. Always get the index value from [`BinaryTree`] APIs.
///
/// [`BinaryTree`]: struct.BinaryTree.html
pub type TreeIndex = usize;

/// The binary tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryTree<T> {
    tree: Vec<BinaryTreeNode<T>>,
}

impl<T> Default for BinaryTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BinaryTree<T> {
    /// build a new empty binary tree
    pub fn new() -> Self {
        BinaryTree { tree: Vec::new() }
    }

    /// Add a node as the root node. Return the index of the root node.
    /// # Example
    ///
    /// ``` rust
    /// use ltr::binary_tree::{BinaryTree, BinaryTreeNode};
    /// let mut tree: BinaryTree<f64> = BinaryTree::new();
    /// let root_index = tree.add_root(BinaryTreeNode::new(10.0));
    /// assert_eq!(root_index, tree.get_root_index());
    /// ```
    pub fn add_root(&mut self, root: BinaryTreeNode<T>) -> TreeIndex {
        self.tree.clear();
        self.add_node(0, false, root)
    }

    /// Return the index of the root node.
    pub fn get_root_index(&self) -> TreeIndex {
        0
    }

    /// Return the root node, or `None` for an empty tree.
    pub fn get_root(&self) -> Option<&BinaryTreeNode<T>> {
        self.tree.first()
    }

    /// Return the left child of the given `node`
    pub fn get_left_child(&self, node: &BinaryTreeNode<T>) -> Option<&BinaryTreeNode<T>> {
        if node.left == 0 {
            None
        } else {
            self.tree.get(node.left)
        }
    }

    /// Return the right child of the given `node`
    pub fn get_right_child(&self, node: &BinaryTreeNode<T>) -> Option<&BinaryTreeNode<T>> {
        if node.right == 0 {
            None
        } else {
            self.tree.get(node.right)
        }
    }

    /// Return the node with the given index
    /// # Example
    ///
    /// ``` rust
    /// use ltr::binary_tree::{BinaryTree, BinaryTreeNode};
    /// let mut tree: BinaryTree<i32> = BinaryTree::new();
    /// let root = tree.add_root(BinaryTreeNode::new(10));
    /// let left = tree.add_left_node(root, BinaryTreeNode::new(5));
    /// assert_eq!(5, tree.get_node(left).expect("left child").value);
    /// ```
    pub fn get_node(&self, index: TreeIndex) -> Option<&BinaryTreeNode<T>> {
        self.tree.get(index)
    }

    /// Return the mutable reference of a node with the given index
    pub fn get_node_mut(&mut self, index: TreeIndex) -> Option<&mut BinaryTreeNode<T>> {
        self.tree.get_mut(index)
    }

    /// Add a node as the left child of a given `parent` node. Return the index of the added node.
    pub fn add_left_node(&mut self, parent: TreeIndex, child: BinaryTreeNode<T>) -> TreeIndex {
        self.add_node(parent, true, child)
    }

    /// Add a node as the right child of a given `parent` node. Return the index of the added node.
    pub fn add_right_node(&mut self, parent: TreeIndex, child: BinaryTreeNode<T>) -> TreeIndex {
        self.add_node(parent, false, child)
    }

    /// Push `child` into the arena and link it under `parent`. When the tree is
    /// empty the node becomes the root and `parent` is ignored.
    fn add_node(&mut self, parent: TreeIndex, is_left: bool, mut child: BinaryTreeNode<T>) -> TreeIndex {
        let position = self.tree.len();
        child.index = position;
        self.tree.push(child);

        if position == 0 {
            return position;
        }
        if let Some(n) = self.tree.get_mut(parent) {
            if is_left {
                n.left = position;
            } else {
                n.right = position;
            }
        };
        position
    }

    /// Pre-order walk from the root: every node paired with its depth, the
    /// left subtree visited before the right one.
    ///
    /// # Example
    /// ```
    /// use ltr::binary_tree::{BinaryTree, BinaryTreeNode};
    /// let mut tree: BinaryTree<u8> = BinaryTree::new();
    /// let root = tree.add_root(BinaryTreeNode::new(0));
    /// let left = tree.add_left_node(root, BinaryTreeNode::new(1));
    /// tree.add_right_node(root, BinaryTreeNode::new(2));
    /// tree.add_left_node(left, BinaryTreeNode::new(3));
    /// tree.add_right_node(left, BinaryTreeNode::new(4));
    ///
    /// let order: Vec<(usize, u8)> = tree.preorder().iter().map(|(d, n)| (*d, n.value)).collect();
    /// assert_eq!(order, vec![(0, 0), (1, 1), (2, 3), (2, 4), (1, 2)]);
    /// ```
    pub fn preorder(&self) -> Vec<(usize, &BinaryTreeNode<T>)> {
        let mut visited = Vec::with_capacity(self.tree.len());
        let mut stack: Vec<(usize, Option<&BinaryTreeNode<T>>)> = vec![(0, self.get_root())];
        while let Some((depth, node_opt)) = stack.pop() {
            if let Some(node) = node_opt {
                visited.push((depth, node));
                stack.push((depth + 1, self.get_right_child(node)));
                stack.push((depth + 1, self.get_left_child(node)));
            }
        }
        visited
    }

    /// Iterate over all nodes in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, BinaryTreeNode<T>> {
        self.tree.iter()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}
