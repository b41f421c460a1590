//! This module implements nDCG, the ranking measure LambdaMART optimizes.
//!
//! [`NdcgMetric`] serves the gradient computation of one query. It has to be
//! used in order: `initialize` with the relevance grades computes the ideal
//! DCG, `rankings` with the current scores ranks the documents, and only then
//! `delta` and `compute_ndcg` can be called. Out of order calls return
//! [`LtrError::MetricState`]. The instance is reused across boosting rounds:
//! initialize it once, rank it every round.
//!
//! [`NdcgEvaluator`] is the evaluation measure: nDCG truncated at a cutoff
//! and averaged over the queries of a data set.
//!
//! [`NdcgMetric`]: struct.NdcgMetric.html
//! [`NdcgEvaluator`]: struct.NdcgEvaluator.html
//! [`LtrError::MetricState`]: ../errors/enum.LtrError.html

use std::cmp::Ordering;

use crate::data_container::{DataContainer, ValueType};
use crate::errors::{LtrError, Result};

use rayon::prelude::*;

/// The DCG contribution of a document with grade `relevance` at 0-based `rank`.
///
/// # Example
/// ```
/// use ltr::ndcg::dcg_at;
/// assert!((dcg_at(3.0, 0) - 7.0).abs() < 1e-12);
/// assert!((dcg_at(1.0, 2) - 0.5).abs() < 1e-12);
/// ```
pub fn dcg_at(relevance: ValueType, rank: usize) -> ValueType {
    (relevance.exp2() - 1.0) / ((rank + 2) as ValueType).log2()
}

/// Order document indices by score, highest first. Equal scores keep index order.
pub fn rank_by_score(scores: &[ValueType]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|a, b| scores[*b].total_cmp(&scores[*a]));
    order
}

/// The DCG of the best possible ordering of `relevance`, over the top `cutoff`
/// positions (all of them if `cutoff` is `None`).
pub fn ideal_dcg(relevance: &[ValueType], cutoff: Option<usize>) -> ValueType {
    let mut sorted = relevance.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
    let k = cutoff.unwrap_or(sorted.len()).min(sorted.len());
    sorted[..k]
        .iter()
        .enumerate()
        .map(|(rank, rel)| dcg_at(*rel, rank))
        .sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricState {
    Empty,
    Initialized,
    Ranked,
}

/// nDCG and swap deltas for the documents of one query.
///
/// # Example
/// ```
/// use ltr::ndcg::NdcgMetric;
/// let relevance = [3.0, 2.0, 4.0, 1.0];
/// let mut metric = NdcgMetric::new();
/// metric.initialize(&relevance);
/// metric.rankings(&[0.3, 0.2, 0.4, 0.1]).unwrap();
///
/// // scores agree with the grades
/// assert!((metric.compute_ndcg(&relevance).unwrap() - 1.0).abs() < 1e-12);
/// // moving the best document down can only hurt
/// assert!(metric.delta(&relevance, 2, 3).unwrap() < 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct NdcgMetric {
    idcg: ValueType,
    /// document index -> 0-based rank
    ranks: Vec<usize>,
    len: usize,
    state: MetricState,
}

impl Default for NdcgMetric {
    fn default() -> Self {
        Self::new()
    }
}

impl NdcgMetric {
    pub fn new() -> Self {
        NdcgMetric {
            idcg: 0.0,
            ranks: Vec::new(),
            len: 0,
            state: MetricState::Empty,
        }
    }

    /// Compute and store the ideal DCG of the query. Forgets any earlier ranking.
    pub fn initialize(&mut self, relevance: &[ValueType]) {
        self.idcg = ideal_dcg(relevance, None);
        self.len = relevance.len();
        self.ranks.clear();
        self.state = MetricState::Initialized;
    }

    /// Rank the documents by `scores`, highest first, and store every
    /// document's rank.
    pub fn rankings(&mut self, scores: &[ValueType]) -> Result<()> {
        if self.state == MetricState::Empty {
            return Err(LtrError::MetricState {
                operation: "rankings",
                required: "initialize",
            });
        }
        if scores.len() != self.len {
            return Err(LtrError::LengthMismatch {
                expected: self.len,
                actual: scores.len(),
            });
        }
        self.ranks.resize(scores.len(), 0);
        for (rank, doc) in rank_by_score(scores).into_iter().enumerate() {
            self.ranks[doc] = rank;
        }
        self.state = MetricState::Ranked;
        Ok(())
    }

    /// The change of nDCG if documents `i` and `j` swapped ranks.
    /// A query whose ideal DCG is 0 (no relevant document) always returns 0.
    pub fn delta(&self, relevance: &[ValueType], i: usize, j: usize) -> Result<ValueType> {
        self.check_ranked("delta", relevance)?;
        if self.idcg == 0.0 {
            return Ok(0.0);
        }
        let (rank_i, rank_j) = (self.ranks[i], self.ranks[j]);
        let delta = -dcg_at(relevance[i], rank_i) - dcg_at(relevance[j], rank_j)
            + dcg_at(relevance[i], rank_j)
            + dcg_at(relevance[j], rank_i);
        Ok(delta / self.idcg)
    }

    /// The nDCG of the current ranking. A query without any relevant
    /// document is ranked perfectly by every ordering, so its nDCG is 1.
    pub fn compute_ndcg(&self, relevance: &[ValueType]) -> Result<ValueType> {
        self.check_ranked("compute_ndcg", relevance)?;
        if self.idcg == 0.0 {
            return Ok(1.0);
        }
        let dcg: ValueType = relevance
            .iter()
            .zip(self.ranks.iter())
            .map(|(rel, rank)| dcg_at(*rel, *rank))
            .sum();
        Ok(dcg / self.idcg)
    }

    pub fn idcg(&self) -> ValueType {
        self.idcg
    }

    /// The rank of document `doc` in the last ranking.
    pub fn rank_of(&self, doc: usize) -> Option<usize> {
        match self.state {
            MetricState::Ranked => self.ranks.get(doc).copied(),
            _ => None,
        }
    }

    fn check_ranked(&self, operation: &'static str, relevance: &[ValueType]) -> Result<()> {
        match self.state {
            MetricState::Empty => Err(LtrError::MetricState {
                operation,
                required: "initialize",
            }),
            MetricState::Initialized => Err(LtrError::MetricState {
                operation,
                required: "rankings",
            }),
            MetricState::Ranked if relevance.len() != self.len => Err(LtrError::LengthMismatch {
                expected: self.len,
                actual: relevance.len(),
            }),
            MetricState::Ranked => Ok(()),
        }
    }
}

/// nDCG@cutoff averaged over queries.
///
/// # Example
/// ```
/// use ltr::data_container::InputDataContainer;
/// use ltr::ndcg::NdcgEvaluator;
///
/// let mut data = InputDataContainer::new(1);
/// data.read_data_item(&[0.0], 2.0, 1).unwrap();
/// data.read_data_item(&[0.0], 0.0, 1).unwrap();
/// data.read_data_item(&[0.0], 1.0, 2).unwrap();
/// data.read_data_item(&[0.0], 0.0, 2).unwrap();
/// data.finalize_data().unwrap();
///
/// let evaluator = NdcgEvaluator::new(10);
/// let perfect = evaluator.evaluate(&data, &[1.0, 0.0, 1.0, 0.0]).unwrap();
/// assert!((perfect - 1.0).abs() < 1e-12);
/// let reversed = evaluator.evaluate(&data, &[0.0, 1.0, 0.0, 1.0]).unwrap();
/// assert!(reversed < 1.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NdcgEvaluator {
    /// the "at" in nDCG@20; 0 evaluates the whole ranking
    cutoff: usize,
}

impl NdcgEvaluator {
    pub fn new(cutoff: usize) -> Self {
        NdcgEvaluator { cutoff }
    }

    pub fn cutoff(&self) -> usize {
        self.cutoff
    }

    fn cutoff_opt(&self) -> Option<usize> {
        if self.cutoff == 0 {
            None
        } else {
            Some(self.cutoff)
        }
    }

    /// nDCG@cutoff of a single query.
    pub fn evaluate_query(&self, relevance: &[ValueType], scores: &[ValueType]) -> ValueType {
        let idcg = ideal_dcg(relevance, self.cutoff_opt());
        if idcg == 0.0 {
            return 1.0;
        }
        let order = rank_by_score(scores);
        let k = self.cutoff_opt().unwrap_or(order.len()).min(order.len());
        let dcg: ValueType = order[..k]
            .iter()
            .enumerate()
            .map(|(rank, doc)| dcg_at(relevance[*doc], rank))
            .sum();
        dcg / idcg
    }

    /// The mean nDCG@cutoff over the queries of `data`; `scores` has one score per row.
    pub fn evaluate<D>(&self, data: &D, scores: &[ValueType]) -> Result<ValueType>
    where
        D: DataContainer + Sync + ?Sized,
    {
        if data.is_empty() {
            return Err(LtrError::EmptyData);
        }
        if scores.len() != data.rows() {
            return Err(LtrError::LengthMismatch {
                expected: data.rows(),
                actual: scores.len(),
            });
        }
        let groups = data.query_groups();
        let relevance = data.outputs();
        let total: ValueType = groups
            .par_iter()
            .map(|range| self.evaluate_query(&relevance[range.clone()], &scores[range.clone()]))
            .sum();
        Ok(total / groups.len() as ValueType)
    }
}
