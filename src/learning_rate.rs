//! This module implements the learning rate schedules of the boosting driver.
//!
//! A schedule has a current value (`get`), moves to the next round with
//! `advance`, which returns `false` once the schedule is exhausted, and can be
//! rewound with `reset`. Schedules are usually built from a descriptor:
//!
//! * `constant:<c>`
//! * `linear:<start>:<step>:<end>`
//! * `composite:<descriptor>;<descriptor>;...`
//!
//! The long names `ConstantLearningRate`, `LinearLearningRate` and
//! `CompositeLearningRate` are accepted as well.
//!
//! # Example
//! ```
//! use ltr::learning_rate::{create_learning_rate_function, LearningRateFunction};
//! let mut lr = create_learning_rate_function("composite:linear:0.5:0.25:0.1;constant:0.05").unwrap();
//! assert_eq!(lr.get(), 0.5);
//! assert!(lr.advance());
//! assert_eq!(lr.get(), 0.25);
//! assert!(lr.advance()); // the linear part is clamped to its end
//! assert_eq!(lr.get(), 0.1);
//! assert!(lr.advance()); // and the constant part takes over
//! assert_eq!(lr.get(), 0.05);
//! assert_eq!(lr.to_string(), "composite:linear:0.5:0.25:0.1;constant:0.05");
//! ```

use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use crate::data_container::ValueType;
use crate::errors::{LtrError, Result};

use serde_derive::{Deserialize, Serialize};

/// A learning rate schedule.
pub trait LearningRateFunction {
    /// The learning rate of the current round.
    fn get(&self) -> ValueType;

    /// Move to the next round. Returns `false` if the schedule has run out.
    fn advance(&mut self) -> bool;

    /// Rewind to the first round.
    fn reset(&mut self);
}

/// A learning rate that never changes.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantLearningRate {
    learning_rate: ValueType,
}

impl ConstantLearningRate {
    /// # Errors
    /// `InvalidLearningRate` if `learning_rate <= 0`.
    pub fn new(learning_rate: ValueType) -> Result<Self> {
        if !(learning_rate > 0.0) {
            return Err(LtrError::InvalidLearningRate(
                "learning_rate must be greater than 0".to_string(),
            ));
        }
        Ok(ConstantLearningRate { learning_rate })
    }
}

impl LearningRateFunction for ConstantLearningRate {
    fn get(&self) -> ValueType {
        self.learning_rate
    }

    fn advance(&mut self) -> bool {
        true
    }

    fn reset(&mut self) {}
}

/// A learning rate decreasing by `step` every round from `start` down to `end`.
///
/// # Example
/// ```
/// use ltr::learning_rate::{LearningRateFunction, LinearLearningRate};
/// let mut lr = LinearLearningRate::new(0.9, 0.3, 0.2).unwrap();
/// assert!(lr.advance());
/// assert!((lr.get() - 0.6).abs() < 1e-12);
/// assert!(lr.advance());
/// assert!(!lr.advance());
/// assert_eq!(lr.get(), 0.2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LinearLearningRate {
    learning_rate: ValueType,
    start: ValueType,
    step: ValueType,
    end: ValueType,
}

impl LinearLearningRate {
    /// # Errors
    /// `InvalidLearningRate` if `start <= 0`, `end < 0` or `end >= start`.
    pub fn new(start: ValueType, step: ValueType, end: ValueType) -> Result<Self> {
        if !(start > 0.0) {
            return Err(LtrError::InvalidLearningRate(
                "starting value must be greater than 0".to_string(),
            ));
        }
        if !(end >= 0.0) {
            return Err(LtrError::InvalidLearningRate(
                "ending value must not be less than 0".to_string(),
            ));
        }
        if end >= start {
            return Err(LtrError::InvalidLearningRate(
                "ending value must be less than starting value".to_string(),
            ));
        }
        Ok(LinearLearningRate {
            learning_rate: start,
            start,
            step,
            end,
        })
    }
}

impl LearningRateFunction for LinearLearningRate {
    fn get(&self) -> ValueType {
        self.learning_rate
    }

    /// Once the value would drop below `end` it is clamped to `end` and the
    /// schedule is exhausted.
    fn advance(&mut self) -> bool {
        self.learning_rate -= self.step;
        if self.learning_rate < self.end {
            self.learning_rate = self.end;
            false
        } else {
            true
        }
    }

    fn reset(&mut self) {
        self.learning_rate = self.start;
    }
}

/// Several schedules run one after the other. An exhausted part keeps its
/// last value for one round before the next part takes over; once the last
/// part has had that round the composite is exhausted.
///
/// # Example
/// ```
/// use ltr::learning_rate::{create_learning_rate_function, LearningRateFunction};
/// let mut lr = create_learning_rate_function("composite:linear:0.9:0.4:0.2").unwrap();
/// let mut seen = vec![lr.get()];
/// while lr.advance() {
///     seen.push(lr.get());
/// }
/// assert_eq!(seen.len(), 3);
/// assert_eq!(seen[2], 0.2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeLearningRate {
    parts: Vec<LearningRate>,
    index: usize,
    /// the part at `index` has run out and shows its clamped value
    exhausted: bool,
}

impl CompositeLearningRate {
    /// # Errors
    /// `InvalidLearningRate` if `parts` is empty.
    pub fn new(parts: Vec<LearningRate>) -> Result<Self> {
        if parts.is_empty() {
            return Err(LtrError::InvalidLearningRate(
                "no valid learning rate functions specified".to_string(),
            ));
        }
        Ok(CompositeLearningRate {
            parts,
            index: 0,
            exhausted: false,
        })
    }

    pub fn parts(&self) -> &[LearningRate] {
        &self.parts
    }
}

impl LearningRateFunction for CompositeLearningRate {
    fn get(&self) -> ValueType {
        self.parts[self.index].get()
    }

    fn advance(&mut self) -> bool {
        if self.exhausted {
            if self.index + 1 >= self.parts.len() {
                return false;
            }
            self.index += 1;
            self.exhausted = false;
            return true;
        }
        if !self.parts[self.index].advance() {
            self.exhausted = true;
        }
        true
    }

    fn reset(&mut self) {
        self.parts.iter_mut().for_each(|p| p.reset());
        self.index = 0;
        self.exhausted = false;
    }
}

/// Any of the schedules above. This is what `Config` stores; it is
/// (de)serialized as its descriptor string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LearningRate {
    Constant(ConstantLearningRate),
    Linear(LinearLearningRate),
    Composite(CompositeLearningRate),
}

impl Default for LearningRate {
    fn default() -> Self {
        LearningRate::Constant(ConstantLearningRate { learning_rate: 0.1 })
    }
}

impl LearningRateFunction for LearningRate {
    fn get(&self) -> ValueType {
        match self {
            LearningRate::Constant(lr) => lr.get(),
            LearningRate::Linear(lr) => lr.get(),
            LearningRate::Composite(lr) => lr.get(),
        }
    }

    fn advance(&mut self) -> bool {
        match self {
            LearningRate::Constant(lr) => lr.advance(),
            LearningRate::Linear(lr) => lr.advance(),
            LearningRate::Composite(lr) => lr.advance(),
        }
    }

    fn reset(&mut self) {
        match self {
            LearningRate::Constant(lr) => lr.reset(),
            LearningRate::Linear(lr) => lr.reset(),
            LearningRate::Composite(lr) => lr.reset(),
        }
    }
}

fn parse_param(name: &str, value: Option<&str>) -> Result<ValueType> {
    let value = value.map(str::trim).unwrap_or("");
    value.parse::<ValueType>().map_err(|_| {
        LtrError::InvalidLearningRate(format!("cannot parse {} from {:?}", name, value))
    })
}

/// Build a schedule from its descriptor.
///
/// # Example
/// ```
/// use ltr::learning_rate::{create_learning_rate_function, LearningRateFunction};
/// let lr = create_learning_rate_function("constant:0.3").unwrap();
/// assert_eq!(lr.get(), 0.3);
/// assert!(create_learning_rate_function("constant:0").is_err());
/// assert!(create_learning_rate_function("cosine:1").is_err());
/// ```
pub fn create_learning_rate_function(descriptor: &str) -> Result<LearningRate> {
    let descriptor = descriptor.trim();
    let (name, params) = match descriptor.find(':') {
        Some(pos) => (&descriptor[..pos], &descriptor[pos + 1..]),
        None => (descriptor, ""),
    };
    match name {
        "constant" | "ConstantLearningRate" => {
            let c = parse_param("constant value", Some(params))?;
            Ok(LearningRate::Constant(ConstantLearningRate::new(c)?))
        }
        "linear" | "LinearLearningRate" => {
            let mut values = params.split(':');
            let start = parse_param("starting value", values.next())?;
            let step = parse_param("step", values.next())?;
            let end = parse_param("ending value", values.next())?;
            if values.next().is_some() {
                return Err(LtrError::InvalidLearningRate(format!(
                    "too many parameters in {:?}",
                    descriptor
                )));
            }
            Ok(LearningRate::Linear(LinearLearningRate::new(start, step, end)?))
        }
        "composite" | "CompositeLearningRate" => {
            let parts = params
                .split(';')
                .filter(|part| !part.trim().is_empty())
                .map(create_learning_rate_function)
                .collect::<Result<Vec<_>>>()?;
            Ok(LearningRate::Composite(CompositeLearningRate::new(parts)?))
        }
        _ => Err(LtrError::InvalidLearningRate(format!(
            "unknown learning rate function {:?}",
            name
        ))),
    }
}

impl FromStr for LearningRate {
    type Err = LtrError;

    fn from_str(s: &str) -> Result<Self> {
        create_learning_rate_function(s)
    }
}

impl TryFrom<String> for LearningRate {
    type Error = LtrError;

    fn try_from(s: String) -> Result<Self> {
        create_learning_rate_function(&s)
    }
}

impl From<LearningRate> for String {
    fn from(lr: LearningRate) -> String {
        lr.to_string()
    }
}

impl fmt::Display for LearningRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LearningRate::Constant(lr) => write!(f, "constant:{}", lr.learning_rate),
            LearningRate::Linear(lr) => write!(f, "linear:{}:{}:{}", lr.start, lr.step, lr.end),
            LearningRate::Composite(lr) => {
                write!(f, "composite:")?;
                for (i, part) in lr.parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ";")?;
                    }
                    write!(f, "{}", part)?;
                }
                Ok(())
            }
        }
    }
}
