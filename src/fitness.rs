//! This module implements some math functions used by the ranking and boosting process.

use crate::data_container::ValueType;

/// The tolerance of [`double_equals`](fn.double_equals.html).
pub const EPSILON: ValueType = 1e-9;

/// Whether `a` and `b` differ by less than `thrs`.
///
/// # Example
/// ```rust
/// use ltr::fitness::almost_equal_thrs;
/// assert_eq!(true, almost_equal_thrs(1.0, 0.998, 0.01));
/// ```
pub fn almost_equal_thrs(a: ValueType, b: ValueType, thrs: f64) -> bool {
    (a - b).abs() < thrs
}

/// Whether `a` and `b` differ by less than `1e-5`.
///
/// # Example
/// ```rust
/// use ltr::fitness::almost_equal;
/// assert_eq!(false, almost_equal(1.0, 0.998));
/// assert_eq!(true, almost_equal(1.0, 0.999998));
/// ```
pub fn almost_equal(a: ValueType, b: ValueType) -> bool {
    (a - b).abs() < 1.0e-5
}

/// Feature values closer than [`EPSILON`](constant.EPSILON.html) are the same value
/// for the tree builder. `NaN` equals nothing.
pub fn double_equals(a: ValueType, b: ValueType) -> bool {
    (a - b).abs() < EPSILON
}

/// The `P_ij` of RankNet: the modelled probability that document `i` should
/// be ranked above document `j`.
pub fn sigmoid(sigma: ValueType, s_i: ValueType, s_j: ValueType) -> ValueType {
    1.0 / (1.0 + (-sigma * (s_i - s_j)).exp())
}

/// The RankNet cross-entropy cost for the estimated probability `p_ij` and
/// the known probability `t_ij`.
pub fn ranknet_cost(p_ij: ValueType, t_ij: ValueType) -> ValueType {
    -t_ij * p_ij.ln() - (1.0 - t_ij) * (1.0 - p_ij).ln()
}

/// The derivative of the RankNet cost over `s_i`.
///
/// `s_ij` is `+1` if document `i` is more relevant than `j` and `-1` otherwise.
///
/// # Example
/// ```rust
/// use ltr::fitness::{almost_equal, ranknet_gradient};
/// // equal scores, i more relevant: the cost falls when s_i grows
/// assert!(almost_equal(-0.5, ranknet_gradient(1.0, 1.0, 0.3, 0.3)));
/// assert!(almost_equal(0.5, ranknet_gradient(1.0, -1.0, 0.3, 0.3)));
/// ```
pub fn ranknet_gradient(sigma: ValueType, s_ij: ValueType, s_i: ValueType, s_j: ValueType) -> ValueType {
    sigma * ((0.5 - 0.5 * s_ij) - 1.0 / (1.0 + (sigma * (s_i - s_j)).exp()))
}

/// Return the average of the values, 0 for an empty slice.
pub fn average(values: &[ValueType]) -> ValueType {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<ValueType>() / values.len() as ValueType
}

/// Sum of squared deviations from the mean.
///
/// # Example
/// ```rust
/// use ltr::fitness::{almost_equal, squared_error};
/// assert!(almost_equal(2.0, squared_error(&[1.0, 2.0, 3.0])));
/// ```
pub fn squared_error(values: &[ValueType]) -> ValueType {
    let mean = average(values);
    values.iter().map(|v| (v - mean).powi(2)).sum()
}

/// Sum of squared deviations computed from running sums: `sum_ss - sum_s^2 / n`.
/// Rounding can make the difference slightly negative, so it is clamped at 0.
pub fn squared_error_from_sums(sum_s: f64, sum_ss: f64, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let error = sum_ss - sum_s * sum_s / n as f64;
    if error < 0.0 {
        0.0
    } else {
        error
    }
}
