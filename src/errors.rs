//! This module implements the error type shared by the whole crate.

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LtrError>;

#[derive(Debug, Error)]
pub enum LtrError {
    /// A learning rate strategy was built with parameters outside its domain.
    #[error("Invalid learning rate: {0}")]
    InvalidLearningRate(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Feature size mismatch: expected {expected}, got {actual}")]
    FeatureSizeMismatch { expected: usize, actual: usize },
    /// The rows of a query are not contiguous.
    #[error("Data is not grouped by query id (row {row})")]
    UnsortedQueries { row: usize },
    #[error("Data container is empty")]
    EmptyData,
    #[error("Length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    /// An `NdcgMetric` method was called before the state it depends on was computed.
    #[error("NdcgMetric::{operation} called before {required}")]
    MetricState {
        operation: &'static str,
        required: &'static str,
    },
    /// A leaf override named a node that is not a leaf of the tree.
    #[error("Node {0} is not a leaf")]
    NotALeaf(usize),
    #[error("IO error: {0}")]
    IO(#[from] io::Error),
    #[error("SerdeJson error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}
