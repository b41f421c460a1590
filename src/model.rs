//! The scoring contract shared by single trees and boosted ensembles.

use crate::data_container::{DataContainer, ValueType};

/// Something that maps a feature vector to a ranking score.
pub trait Scorer {
    /// Score a single feature vector.
    fn score(&self, features: &[ValueType]) -> ValueType;

    /// Score every row of `data`, in row order.
    fn score_all<D: DataContainer + ?Sized>(&self, data: &D) -> Vec<ValueType>
    where
        Self: Sized,
    {
        (0..data.rows()).map(|row| self.score(data.row(row))).collect()
    }
}
