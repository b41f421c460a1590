//! This module implements the pairwise lambda gradients of RankNet,
//! LambdaRank and LambdaMART.
//!
//! For every pair of documents of a query with different relevance, the
//! RankNet derivative `dC/ds_i` is computed (`S_ij = +1` if `i` is the more
//! relevant one). LambdaRank and LambdaMART multiply it by `|ΔnDCG|` of
//! swapping the two documents. The pair contributes `+λ_ij` to document `i`
//! and `-λ_ij` to document `j`, so the lambdas of a query always sum to 0.
//! LambdaMART also accumulates the second-order weights used by Newton leaf
//! refinement.
//!
//! Queries are independent: [`LambdaGradientComputer::compute`] runs one
//! rayon task per query, each writing into its own slice of the output.
//!
//! [`LambdaGradientComputer::compute`]: struct.LambdaGradientComputer.html#method.compute

use std::ops::Range;

use crate::config::Algorithm;
use crate::data_container::{DataContainer, ValueType};
use crate::errors::{LtrError, Result};
use crate::fitness::{double_equals, ranknet_gradient};
use crate::ndcg::NdcgMetric;

use rayon::prelude::*;

/// Pairwise gradients for every query of a data set. The per-query metrics
/// are set up once by `initialize` and reused every round.
///
/// # Example
/// ```
/// use ltr::config::Algorithm;
/// use ltr::data_container::InputDataContainer;
/// use ltr::lambda::LambdaGradientComputer;
///
/// let mut data = InputDataContainer::new(1);
/// data.read_data_item(&[0.0], 2.0, 1).unwrap();
/// data.read_data_item(&[0.0], 0.0, 1).unwrap();
/// data.read_data_item(&[0.0], 1.0, 1).unwrap();
/// data.finalize_data().unwrap();
///
/// let mut computer = LambdaGradientComputer::new(Algorithm::LambdaMART, 1.0);
/// computer.initialize(&data);
/// let mut lambdas = vec![0.0; 3];
/// let mut weights = vec![0.0; 3];
/// computer.compute(&data, &[0.0, 0.0, 0.0], &mut lambdas, &mut weights).unwrap();
///
/// // the most relevant document is pushed up hardest
/// assert!(lambdas[0] < lambdas[2] && lambdas[2] < lambdas[1]);
/// assert!(lambdas.iter().sum::<f64>().abs() < 1e-12);
/// assert!(weights.iter().all(|w| *w > 0.0));
/// ```
#[derive(Debug, Clone)]
pub struct LambdaGradientComputer {
    algorithm: Algorithm,
    sigma: ValueType,
    groups: Vec<Range<usize>>,
    /// the relevance grades the metrics were initialized with
    relevance: Vec<ValueType>,
    metrics: Vec<NdcgMetric>,
}

impl LambdaGradientComputer {
    pub fn new(algorithm: Algorithm, sigma: ValueType) -> Self {
        LambdaGradientComputer {
            algorithm,
            sigma,
            groups: Vec::new(),
            relevance: Vec::new(),
            metrics: Vec::new(),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Derive the query groups of `data` and compute the ideal DCG of each.
    pub fn initialize<D>(&mut self, data: &D)
    where
        D: DataContainer + ?Sized,
    {
        let relevance = data.outputs();
        self.groups = data.query_groups();
        self.relevance = relevance.to_vec();
        self.metrics = self
            .groups
            .iter()
            .map(|range| {
                let mut metric = NdcgMetric::new();
                metric.initialize(&relevance[range.clone()]);
                metric
            })
            .collect();
    }

    /// The query groups found by `initialize`.
    pub fn groups(&self) -> &[Range<usize>] {
        &self.groups
    }

    /// Compute the lambdas (and, for LambdaMART, the second-order weights) of
    /// every row of `data` under the current `scores`. Every output slot is
    /// overwritten. Calls `initialize` first if it has not been called yet or
    /// was called with a data set of different queries or grades.
    pub fn compute<D>(
        &mut self,
        data: &D,
        scores: &[ValueType],
        lambdas: &mut [ValueType],
        weights: &mut [ValueType],
    ) -> Result<()>
    where
        D: DataContainer + ?Sized,
    {
        let rows = data.rows();
        for len in &[scores.len(), lambdas.len(), weights.len()] {
            if *len != rows {
                return Err(LtrError::LengthMismatch {
                    expected: rows,
                    actual: *len,
                });
            }
        }
        if self.relevance.as_slice() != data.outputs() || self.groups != data.query_groups() {
            log::debug!("lambda gradient computer re-initialized for {} rows", rows);
            self.initialize(data);
        }

        let mut lambda_parts = Vec::with_capacity(self.groups.len());
        let mut weight_parts = Vec::with_capacity(self.groups.len());
        let mut lambda_rest = lambdas;
        let mut weight_rest = weights;
        for range in &self.groups {
            let (l, lr) = std::mem::take(&mut lambda_rest).split_at_mut(range.len());
            let (w, wr) = std::mem::take(&mut weight_rest).split_at_mut(range.len());
            lambda_parts.push(l);
            weight_parts.push(w);
            lambda_rest = lr;
            weight_rest = wr;
        }

        let algorithm = self.algorithm;
        let sigma = self.sigma;
        let relevance = data.outputs();
        self.metrics
            .par_iter_mut()
            .zip(self.groups.par_iter())
            .zip(lambda_parts.into_par_iter())
            .zip(weight_parts.into_par_iter())
            .try_for_each(|(((metric, range), lambda), weight)| {
                query_gradients(
                    algorithm,
                    sigma,
                    metric,
                    &relevance[range.clone()],
                    &scores[range.clone()],
                    lambda,
                    weight,
                )
            })
    }

    /// Compute the lambdas and weights of a single query. `metric` must have
    /// been initialized with `relevance`; it is re-ranked with `scores`.
    pub fn compute_query(
        &self,
        metric: &mut NdcgMetric,
        relevance: &[ValueType],
        scores: &[ValueType],
        lambdas: &mut [ValueType],
        weights: &mut [ValueType],
    ) -> Result<()> {
        query_gradients(
            self.algorithm,
            self.sigma,
            metric,
            relevance,
            scores,
            lambdas,
            weights,
        )
    }
}

fn query_gradients(
    algorithm: Algorithm,
    sigma: ValueType,
    metric: &mut NdcgMetric,
    relevance: &[ValueType],
    scores: &[ValueType],
    lambdas: &mut [ValueType],
    weights: &mut [ValueType],
) -> Result<()> {
    let n = relevance.len();
    if scores.len() != n || lambdas.len() != n || weights.len() != n {
        return Err(LtrError::LengthMismatch {
            expected: n,
            actual: scores.len().min(lambdas.len()).min(weights.len()),
        });
    }
    lambdas.iter_mut().for_each(|l| *l = 0.0);
    weights.iter_mut().for_each(|w| *w = 0.0);
    if n < 2 {
        return Ok(());
    }

    let metric_weighted = algorithm != Algorithm::RankNet;
    if metric_weighted {
        metric.rankings(scores)?;
    }

    for i in 0..n - 1 {
        for j in i + 1..n {
            if double_equals(relevance[i], relevance[j]) {
                continue;
            }
            let s_ij = if relevance[i] > relevance[j] { 1.0 } else { -1.0 };
            let delta = if metric_weighted {
                metric.delta(relevance, i, j)?.abs()
            } else {
                1.0
            };
            let lambda_ij = ranknet_gradient(sigma, s_ij, scores[i], scores[j]) * delta;
            lambdas[i] += lambda_ij;
            lambdas[j] -= lambda_ij;

            if algorithm == Algorithm::LambdaMART {
                let (hi, lo) = if s_ij > 0.0 { (i, j) } else { (j, i) };
                let rho = 1.0 / (1.0 + (sigma * (scores[hi] - scores[lo])).exp());
                let w = sigma * sigma * delta * rho * (1.0 - rho);
                weights[i] += w;
                weights[j] += w;
            }
        }
    }
    Ok(())
}
