//! This module implements the config for LambdaMART training.
//!
//! # Example
//! ```
//! use ltr::config::{Algorithm, Config};
//! let mut cfg = Config::new();
//! cfg.set_feature_size(3);
//! cfg.set_iterations(50);
//! cfg.set_algorithm("lambdarank");
//! cfg.set_learning_rate("linear:0.9:0.1:0.15").unwrap();
//! assert_eq!(cfg.algorithm, Algorithm::LambdaRank);
//! assert!(cfg.validate().is_ok());
//! println!("{}", cfg);
//! ```

use std::fmt;

use crate::data_container::ValueType;
use crate::errors::{LtrError, Result};
use crate::learning_rate::{create_learning_rate_function, LearningRate};

use serde_derive::{Deserialize, Serialize};

/// The pairwise gradient used to build the regression targets.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum Algorithm {
    /// the plain RankNet gradient
    RankNet,
    /// RankNet weighted by the nDCG change of the swap
    LambdaRank,
    /// LambdaRank plus the second-order weights
    LambdaMART,
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::LambdaMART
    }
}

/// Parse an algorithm name, case-insensitive. Unknown names fall back to LambdaMART.
pub fn string2algorithm(s: &str) -> Algorithm {
    match s.to_ascii_lowercase().as_str() {
        "ranknet" => Algorithm::RankNet,
        "lambdarank" => Algorithm::LambdaRank,
        "lambdamart" => Algorithm::LambdaMART,
        _ => Algorithm::LambdaMART,
    }
}

pub fn algorithm2string(a: &Algorithm) -> String {
    match a {
        Algorithm::RankNet => String::from("RankNet"),
        Algorithm::LambdaRank => String::from("LambdaRank"),
        Algorithm::LambdaMART => String::from("LambdaMART"),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub feature_size: usize,
    /// the maximum number of boosting rounds
    pub iterations: usize,
    pub algorithm: Algorithm,
    /// steepness of the RankNet sigmoid
    pub sigma: ValueType,
    /// `delta` of the tree builder: a split must lower the error by more than this
    pub min_error_decrease: ValueType,
    /// `q` of the tree builder: the minimum number of rows on each side of a split
    pub min_leaf_size: usize,
    pub feature_sample_ratio: f64,
    pub learning_rate: LearningRate,
    /// the "at" in nDCG@20; 0 means the whole ranking
    pub ndcg_cutoff: usize,
    /// stop after this many rounds without improvement; 0 disables early stopping
    pub early_stop_rounds: usize,
    /// LambdaMART only: set leaf outputs to the Newton step instead of the mean
    pub newton_leaves: bool,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Config {
        Config {
            feature_size: 0,
            iterations: 100,
            algorithm: Algorithm::LambdaMART,
            sigma: 1.0,
            min_error_decrease: 0.0,
            min_leaf_size: 1,
            feature_sample_ratio: 1.0,
            learning_rate: LearningRate::default(),
            ndcg_cutoff: 20,
            early_stop_rounds: 0,
            newton_leaves: false,
            debug: false,
        }
    }

    pub fn set_feature_size(&mut self, n: usize) {
        self.feature_size = n;
    }

    pub fn set_iterations(&mut self, n: usize) {
        self.iterations = n;
    }

    pub fn set_algorithm(&mut self, a: &str) {
        self.algorithm = string2algorithm(a);
    }

    pub fn set_sigma(&mut self, sigma: ValueType) {
        self.sigma = sigma;
    }

    pub fn set_min_error_decrease(&mut self, delta: ValueType) {
        self.min_error_decrease = delta;
    }

    pub fn set_min_leaf_size(&mut self, n: usize) {
        self.min_leaf_size = n;
    }

    pub fn set_feature_sample_ratio(&mut self, n: f64) {
        self.feature_sample_ratio = n;
    }

    /// Set the learning rate schedule from its descriptor, e.g. `constant:0.1`.
    pub fn set_learning_rate(&mut self, descriptor: &str) -> Result<()> {
        self.learning_rate = create_learning_rate_function(descriptor)?;
        Ok(())
    }

    pub fn set_ndcg_cutoff(&mut self, n: usize) {
        self.ndcg_cutoff = n;
    }

    pub fn set_early_stop_rounds(&mut self, n: usize) {
        self.early_stop_rounds = n;
    }

    pub fn enable_newton_leaves(&mut self, option: bool) {
        self.newton_leaves = option;
    }

    pub fn set_debug(&mut self, option: bool) {
        self.debug = option;
    }

    /// Check the parameters that the training loop cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.min_leaf_size == 0 {
            return Err(LtrError::InvalidConfig(
                "min_leaf_size must be at least 1".to_string(),
            ));
        }
        if !(self.sigma > 0.0) {
            return Err(LtrError::InvalidConfig(format!(
                "sigma must be greater than 0, got {}",
                self.sigma
            )));
        }
        if !(self.feature_sample_ratio > 0.0 && self.feature_sample_ratio <= 1.0) {
            return Err(LtrError::InvalidConfig(format!(
                "feature_sample_ratio must be in (0, 1], got {}",
                self.feature_sample_ratio
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "number of features = {}", self.feature_size)?;
        writeln!(f, "iterations = {}", self.iterations)?;
        writeln!(f, "algorithm = {}", algorithm2string(&self.algorithm))?;
        writeln!(f, "sigma = {}", self.sigma)?;
        writeln!(f, "min error decrease = {}", self.min_error_decrease)?;
        writeln!(f, "min leaf size = {}", self.min_leaf_size)?;
        writeln!(f, "feature sample ratio = {}", self.feature_sample_ratio)?;
        writeln!(f, "learning rate = {}", self.learning_rate)?;
        writeln!(f, "ndcg cutoff = {}", self.ndcg_cutoff)?;
        writeln!(f, "early stop rounds = {}", self.early_stop_rounds)?;
        writeln!(f, "newton leaves enabled = {}", self.newton_leaves)?;
        writeln!(f, "debug enabled = {}", self.debug)
    }
}
