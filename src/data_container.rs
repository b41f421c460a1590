//! This module implements the data containers handed to the learners.
//!
//! A container is a dense `rows x dimensions` feature matrix (row-major), an
//! output vector with one value per row and a query id per row. The rows of
//! a query must be contiguous. For ranking the outputs are the relevance
//! grades; the boosting driver swaps them for the lambda targets through a
//! [`ReferenceDataContainer`] without copying the features.
//!
//! Readers fill an [`InputDataContainer`] row by row and finalize it:
//!
//! ```
//! use ltr::data_container::{DataContainer, InputDataContainer};
//! let mut data = InputDataContainer::new(2);
//! data.read_data_item(&[1.0, 0.5], 2.0, 7).unwrap();
//! data.read_data_item(&[0.1, 0.2], 0.0, 7).unwrap();
//! data.read_data_item(&[0.9, 0.3], 1.0, 8).unwrap();
//! data.finalize_data().unwrap();
//!
//! assert_eq!(data.rows(), 3);
//! assert_eq!(data.row(1), &[0.1, 0.2]);
//! assert_eq!(data.query_groups(), vec![0..2, 2..3]);
//! ```
//!
//! [`InputDataContainer`]: struct.InputDataContainer.html
//! [`ReferenceDataContainer`]: struct.ReferenceDataContainer.html

use std::ops::Range;

use crate::errors::{LtrError, Result};

use serde_derive::{Deserialize, Serialize};

///! For now we only support std::$t using this macro.
macro_rules! def_value_type {
    ($t: tt) => {
        pub type ValueType = $t;
    };
}

def_value_type!(f64);

/// The identifier of a query.
pub type QueryId = u64;

/// Row capacity reserved by a fresh `InputDataContainer`.
const INITIAL_ROWS: usize = 1000;

/// A document of a query: its feature vector, its relevance grade and the score
/// given to it by the current model. The score is never a feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    /// the query this document belongs to
    pub query_id: QueryId,
    /// the vector of features
    pub features: Vec<ValueType>,
    /// the relevance grade, 0 means irrelevant
    pub relevance: u32,
    /// the score of the current model
    pub score: ValueType,
}

impl FeatureSet {
    /// Generate a training document.
    ///
    /// # Example
    /// ``` rust
    /// use ltr::data_container::FeatureSet;
    /// let doc = FeatureSet::new_training_data(1, vec![1.0, 2.0, 3.0], 2);
    /// assert_eq!(doc.score, 0.0);
    /// ```
    pub fn new_training_data(query_id: QueryId, features: Vec<ValueType>, relevance: u32) -> Self {
        FeatureSet {
            query_id,
            features,
            relevance,
            score: 0.0,
        }
    }

    /// Generate a document to be scored. The relevance is optional.
    pub fn new_test_data(query_id: QueryId, features: Vec<ValueType>, relevance: Option<u32>) -> Self {
        FeatureSet {
            query_id,
            features,
            relevance: relevance.unwrap_or(0),
            score: 0.0,
        }
    }
}

/// Read access to a dense data set grouped by query.
pub trait DataContainer {
    /// The number of features of a row.
    fn dimensions(&self) -> usize;

    /// The feature matrix, row-major, `rows() * dimensions()` values.
    fn data(&self) -> &[ValueType];

    /// One output (relevance or regression target) per row.
    fn outputs(&self) -> &[ValueType];

    /// One query id per row.
    fn query_ids(&self) -> &[QueryId];

    fn rows(&self) -> usize {
        self.outputs().len()
    }

    fn is_empty(&self) -> bool {
        self.rows() == 0
    }

    /// The features of row `row`.
    fn row(&self, row: usize) -> &[ValueType] {
        let d = self.dimensions();
        &self.data()[row * d..(row + 1) * d]
    }

    /// The value of feature `feature` in row `row`.
    fn value(&self, row: usize, feature: usize) -> ValueType {
        self.data()[row * self.dimensions() + feature]
    }

    /// The rows that start a new query: row 0 and every row whose query id
    /// differs from the previous row's.
    fn queries(&self) -> Vec<usize> {
        let ids = self.query_ids();
        let mut starts = Vec::new();
        for (row, id) in ids.iter().enumerate() {
            if row == 0 || ids[row - 1] != *id {
                starts.push(row);
            }
        }
        starts
    }

    /// The row range of every query, in row order.
    fn query_groups(&self) -> Vec<Range<usize>> {
        let starts = self.queries();
        let rows = self.rows();
        starts
            .iter()
            .enumerate()
            .map(|(i, start)| *start..starts.get(i + 1).copied().unwrap_or(rows))
            .collect()
    }
}

/// A data container that owns its data and is filled row by row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputDataContainer {
    dimensions: usize,
    data: Vec<ValueType>,
    outputs: Vec<ValueType>,
    query_ids: Vec<QueryId>,
    finalized: bool,
}

impl InputDataContainer {
    /// A container for rows of `dimensions` features.
    pub fn new(dimensions: usize) -> Self {
        InputDataContainer {
            dimensions,
            data: Vec::with_capacity(INITIAL_ROWS * dimensions),
            outputs: Vec::with_capacity(INITIAL_ROWS),
            query_ids: Vec::with_capacity(INITIAL_ROWS),
            finalized: false,
        }
    }

    /// Build a finalized container from documents already grouped by query.
    ///
    /// # Example
    /// ```
    /// use ltr::data_container::{DataContainer, FeatureSet, InputDataContainer};
    /// let docs = vec![
    ///     FeatureSet::new_training_data(1, vec![1.0, 2.0], 1),
    ///     FeatureSet::new_training_data(1, vec![2.0, 1.0], 0),
    /// ];
    /// let data = InputDataContainer::from_feature_sets(2, &docs).unwrap();
    /// assert_eq!(data.outputs(), &[1.0, 0.0]);
    /// ```
    pub fn from_feature_sets(dimensions: usize, docs: &[FeatureSet]) -> Result<Self> {
        let mut container = InputDataContainer::new(dimensions);
        for doc in docs {
            container.read_feature_set(doc)?;
        }
        container.finalize_data()?;
        Ok(container)
    }

    /// Append one row.
    pub fn read_data_item(&mut self, features: &[ValueType], output: ValueType, query_id: QueryId) -> Result<()> {
        if features.len() != self.dimensions {
            return Err(LtrError::FeatureSizeMismatch {
                expected: self.dimensions,
                actual: features.len(),
            });
        }
        if self.data.len() == self.data.capacity() {
            // amortized doubling, trimmed again in finalize_data
            self.data.reserve(self.data.len().max(self.dimensions));
        }
        self.data.extend_from_slice(features);
        self.outputs.push(output);
        self.query_ids.push(query_id);
        self.finalized = false;
        Ok(())
    }

    /// Append a document; its relevance becomes the row output.
    pub fn read_feature_set(&mut self, doc: &FeatureSet) -> Result<()> {
        self.read_data_item(&doc.features, ValueType::from(doc.relevance), doc.query_id)
    }

    /// Trim the storage to the rows read and check that every query occupies
    /// a contiguous run of rows.
    pub fn finalize_data(&mut self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for (row, id) in self.query_ids.iter().enumerate() {
            let starts_group = row == 0 || self.query_ids[row - 1] != *id;
            if starts_group && !seen.insert(*id) {
                return Err(LtrError::UnsortedQueries { row });
            }
        }
        self.data.shrink_to_fit();
        self.outputs.shrink_to_fit();
        self.query_ids.shrink_to_fit();
        self.finalized = true;
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Replace the outputs, e.g. with the model's scores.
    pub fn set_outputs(&mut self, outputs: Vec<ValueType>) -> Result<()> {
        if outputs.len() != self.outputs.len() {
            return Err(LtrError::LengthMismatch {
                expected: self.outputs.len(),
                actual: outputs.len(),
            });
        }
        self.outputs = outputs;
        Ok(())
    }
}

impl DataContainer for InputDataContainer {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn data(&self) -> &[ValueType] {
        &self.data
    }

    fn outputs(&self) -> &[ValueType] {
        &self.outputs
    }

    fn query_ids(&self) -> &[QueryId] {
        &self.query_ids
    }
}

/// A read-only view: the features and query ids of another container with a
/// different output vector.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceDataContainer<'a> {
    dimensions: usize,
    data: &'a [ValueType],
    outputs: &'a [ValueType],
    query_ids: &'a [QueryId],
}

impl<'a> ReferenceDataContainer<'a> {
    /// View `base` with its own outputs.
    pub fn new<D: DataContainer + ?Sized>(base: &'a D) -> Self {
        ReferenceDataContainer {
            dimensions: base.dimensions(),
            data: base.data(),
            outputs: base.outputs(),
            query_ids: base.query_ids(),
        }
    }

    /// View `base` with `outputs` substituted for its outputs.
    ///
    /// # Example
    /// ```
    /// use ltr::data_container::{DataContainer, InputDataContainer, ReferenceDataContainer};
    /// let mut data = InputDataContainer::new(1);
    /// data.read_data_item(&[1.0], 3.0, 0).unwrap();
    /// data.read_data_item(&[2.0], 1.0, 0).unwrap();
    /// data.finalize_data().unwrap();
    ///
    /// let targets = [0.25, -0.25];
    /// let view = ReferenceDataContainer::with_outputs(&data, &targets).unwrap();
    /// assert_eq!(view.outputs(), &targets);
    /// assert_eq!(view.row(1), data.row(1));
    /// ```
    pub fn with_outputs<D: DataContainer + ?Sized>(base: &'a D, outputs: &'a [ValueType]) -> Result<Self> {
        if outputs.len() != base.rows() {
            return Err(LtrError::LengthMismatch {
                expected: base.rows(),
                actual: outputs.len(),
            });
        }
        Ok(ReferenceDataContainer {
            dimensions: base.dimensions(),
            data: base.data(),
            outputs,
            query_ids: base.query_ids(),
        })
    }

    /// Build a view over externally owned matrices.
    pub fn from_parts(
        dimensions: usize,
        data: &'a [ValueType],
        outputs: &'a [ValueType],
        query_ids: &'a [QueryId],
    ) -> Result<Self> {
        if data.len() != outputs.len() * dimensions {
            return Err(LtrError::LengthMismatch {
                expected: outputs.len() * dimensions,
                actual: data.len(),
            });
        }
        if query_ids.len() != outputs.len() {
            return Err(LtrError::LengthMismatch {
                expected: outputs.len(),
                actual: query_ids.len(),
            });
        }
        Ok(ReferenceDataContainer {
            dimensions,
            data,
            outputs,
            query_ids,
        })
    }
}

impl<'a> DataContainer for ReferenceDataContainer<'a> {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn data(&self) -> &[ValueType] {
        self.data
    }

    fn outputs(&self) -> &[ValueType] {
        self.outputs
    }

    fn query_ids(&self) -> &[QueryId] {
        self.query_ids
    }
}
