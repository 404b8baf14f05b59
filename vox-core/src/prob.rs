//! Log-domain probability arithmetic for numerically stable computation.
//!
//! Probabilities are carried as natural logarithms so that products over
//! hundreds of frames stay representable. `0.0` is certainty ([`LOG_ONE`]) and
//! negative infinity is impossibility ([`LOG_ZERO`]).
//!
//! The free functions operate on raw `f64` values and are what the trellis
//! loops use; [`LogProb`] wraps the same operations for call sites that want
//! the representation in the type.

use crate::{Result, VoxError};

/// `ln(1)`: probability one.
pub const LOG_ONE: f64 = 0.0;

/// `ln(0)`: probability zero, reserved for structurally unreachable cells.
pub const LOG_ZERO: f64 = f64::NEG_INFINITY;

/// Smallest linear probability allowed to flow into later products.
pub const LINEAR_FLOOR: f64 = 1e-300;

/// `ln(LINEAR_FLOOR)`.
pub const LOG_FLOOR: f64 = -690.775_527_898_213_7;

/// Numerically stable `ln(exp(a) + exp(b))`.
///
/// Negative infinity is the identity element on either side.
pub fn ln_add(a: f64, b: f64) -> f64 {
    if a == LOG_ZERO {
        return b;
    }
    if b == LOG_ZERO {
        return a;
    }
    let (max, min) = if a >= b { (a, b) } else { (b, a) };
    max + (min - max).exp().ln_1p()
}

/// `ln(exp(a) - exp(b))` for `a >= b`.
///
/// # Errors
///
/// Returns an error if `b > a`, since the difference would be a negative
/// probability.
pub fn ln_sub(a: f64, b: f64) -> Result<f64> {
    if b == LOG_ZERO {
        return Ok(a);
    }
    if b > a {
        return Err(VoxError::InvalidInput(format!(
            "ln_sub: subtrahend e^{b} exceeds minuend e^{a}"
        )));
    }
    if a == b {
        return Ok(LOG_ZERO);
    }
    Ok(a + (-(b - a).exp()).ln_1p())
}

/// Log-sum-exp over an iterator of log values.
///
/// Returns [`LOG_ZERO`] for an empty input or when every term is impossible.
pub fn ln_sum<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    values.into_iter().fold(LOG_ZERO, ln_add)
}

/// Multiply a log probability by a linear factor `k >= 0`.
pub fn ln_scale(a: f64, k: f64) -> f64 {
    if k == 0.0 {
        return LOG_ZERO;
    }
    a + k.ln()
}

/// Convert a non-negative linear value to the log domain; `0` maps to
/// [`LOG_ZERO`].
pub fn linear_to_log(x: f64) -> f64 {
    debug_assert!(x >= 0.0, "linear_to_log: negative input {x}");
    if x == 0.0 {
        LOG_ZERO
    } else {
        x.ln()
    }
}

/// Convert a log value back to the linear domain; [`LOG_ZERO`] maps to `0`.
pub fn log_to_linear(x: f64) -> f64 {
    if x == LOG_ZERO {
        0.0
    } else {
        x.exp()
    }
}

/// Clamp a log value to [`LOG_FLOOR`] so it never carries a true zero into
/// later products. NaN also clamps to the floor.
pub fn floor_log(x: f64) -> f64 {
    x.max(LOG_FLOOR)
}

/// Clamp a log value to an arbitrary lower bound.
pub fn floor_log_at(x: f64, bound: f64) -> f64 {
    x.max(bound)
}

/// A probability stored as its natural logarithm: `ln(p)`.
///
/// `LogProb(0.0)` is certainty and `LogProb(f64::NEG_INFINITY)` is
/// impossibility. Densities evaluated at a point may legitimately exceed one,
/// so positive values are allowed.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LogProb(pub f64);

impl LogProb {
    /// Create a [`LogProb`] from a raw probability in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns an error if `p` is not in `[0, 1]`.
    pub fn from_prob(p: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&p) {
            return Err(VoxError::InvalidInput(format!(
                "LogProb::from_prob: p must be in [0, 1], got {p}"
            )));
        }
        Ok(Self(linear_to_log(p)))
    }

    /// Convert back to a raw probability.
    pub fn to_prob(self) -> f64 {
        log_to_linear(self.0)
    }

    /// Log-sum-exp: the log-domain equivalent of addition.
    pub fn ln_add(self, other: Self) -> Self {
        Self(ln_add(self.0, other.0))
    }

    /// Log-domain subtraction, see [`ln_sub`].
    pub fn ln_sub(self, other: Self) -> Result<Self> {
        ln_sub(self.0, other.0).map(Self)
    }

    /// Multiply two probabilities in log-space (addition of log values).
    pub fn ln_mul(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }

    /// Divide two probabilities in log-space.
    pub fn ln_div(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }

    /// Multiply by a linear factor.
    pub fn scale(self, k: f64) -> Self {
        Self(ln_scale(self.0, k))
    }

    /// Clamp to [`LOG_FLOOR`].
    pub fn floored(self) -> Self {
        Self(floor_log(self.0))
    }

    /// Whether this is exactly probability zero.
    pub fn is_impossible(self) -> bool {
        self.0 == LOG_ZERO
    }

    /// Certain event: `ln(1) = 0`.
    pub const fn certain() -> Self {
        Self(LOG_ONE)
    }

    /// Impossible event: `ln(0) = -∞`.
    pub const fn impossible() -> Self {
        Self(LOG_ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-10;

    #[test]
    fn log_floor_matches_linear_floor() {
        assert!((LOG_FLOOR - LINEAR_FLOOR.ln()).abs() < 1e-9);
    }

    #[test]
    fn linear_to_log_zero_is_neg_infinity() {
        assert_eq!(linear_to_log(0.0), f64::NEG_INFINITY);
        assert_eq!(log_to_linear(f64::NEG_INFINITY), 0.0);
    }

    #[test]
    fn ln_add_identity_and_symmetry() {
        assert_eq!(ln_add(LOG_ZERO, -3.5), -3.5);
        assert_eq!(ln_add(-3.5, LOG_ZERO), -3.5);
        assert_eq!(ln_add(LOG_ZERO, LOG_ZERO), LOG_ZERO);
        assert!((ln_add(-1.0, -2.0) - ln_add(-2.0, -1.0)).abs() < TOL);
    }

    #[test]
    fn ln_add_no_overflow_or_underflow() {
        let r = ln_add(-1000.0, -1001.0);
        assert!(r.is_finite());
        assert!(r > -1000.0 && r < -999.0);

        let big = ln_add(700.0, 700.0);
        assert!((big - (700.0 + 2.0_f64.ln())).abs() < TOL);

        let two = ln_add(0.0, 0.0);
        assert!((two - 2.0_f64.ln()).abs() < TOL);
    }

    #[test]
    fn ln_sub_inverts_ln_add() {
        let a = 0.3_f64.ln();
        let b = 0.1_f64.ln();
        let d = ln_sub(a, b).unwrap();
        assert!((d.exp() - 0.2).abs() < TOL);
        assert_eq!(ln_sub(a, a).unwrap(), LOG_ZERO);
        assert_eq!(ln_sub(a, LOG_ZERO).unwrap(), a);
        assert!(ln_sub(b, a).is_err());
    }

    #[test]
    fn ln_sum_handles_empty_and_impossible() {
        assert_eq!(ln_sum(Vec::<f64>::new()), LOG_ZERO);
        assert_eq!(ln_sum([LOG_ZERO, LOG_ZERO]), LOG_ZERO);
        let s = ln_sum([0.25_f64.ln(), 0.25_f64.ln(), 0.5_f64.ln()]);
        assert!(s.abs() < TOL);
    }

    #[test]
    fn ln_scale_multiplies_linear_value() {
        let a = 0.2_f64.ln();
        assert!((log_to_linear(ln_scale(a, 3.0)) - 0.6).abs() < TOL);
        assert_eq!(ln_scale(a, 0.0), LOG_ZERO);
    }

    #[test]
    fn floor_log_clamps_zero_and_nan() {
        assert_eq!(floor_log(LOG_ZERO), LOG_FLOOR);
        assert_eq!(floor_log(f64::NAN), LOG_FLOOR);
        assert_eq!(floor_log(-5.0), -5.0);
        assert_eq!(floor_log_at(-50.0, -10.0), -10.0);
    }

    #[test]
    fn logprob_from_prob_bounds() {
        assert!(LogProb::from_prob(-0.1).is_err());
        assert!(LogProb::from_prob(1.5).is_err());
        assert!(LogProb::from_prob(0.0).unwrap().is_impossible());
        let half = LogProb::from_prob(0.5).unwrap();
        assert!((half.0 - 0.5_f64.ln()).abs() < TOL);
        assert!((half.to_prob() - 0.5).abs() < TOL);
    }

    #[test]
    fn logprob_arithmetic() {
        let a = LogProb::from_prob(0.5).unwrap();
        let b = LogProb::from_prob(0.25).unwrap();
        assert!((a.ln_add(b).to_prob() - 0.75).abs() < TOL);
        assert!((a.ln_mul(b).to_prob() - 0.125).abs() < TOL);
        assert!((b.ln_div(a).to_prob() - 0.5).abs() < TOL);
        assert!((a.ln_sub(b).unwrap().to_prob() - 0.25).abs() < TOL);
        assert!((b.scale(2.0).to_prob() - 0.5).abs() < TOL);
        assert_eq!(LogProb::impossible().floored().0, LOG_FLOOR);
        assert_eq!(LogProb::certain().to_prob(), 1.0);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn round_trip_linear_log(x in 1e-300f64..1e300) {
            let back = log_to_linear(linear_to_log(x));
            prop_assert!(((back - x) / x).abs() < 1e-12);
        }

        #[test]
        fn ln_add_identity(a in -1e6f64..1e3) {
            prop_assert_eq!(ln_add(a, LOG_ZERO), a);
            prop_assert_eq!(ln_add(LOG_ZERO, a), a);
        }

        #[test]
        fn ln_add_bounded_by_max_plus_ln2(a in -800f64..0.0, b in -800f64..0.0) {
            let s = ln_add(a, b);
            prop_assert!(s >= a.max(b));
            prop_assert!(s <= a.max(b) + 2.0_f64.ln() + 1e-12);
        }

        #[test]
        fn ln_add_matches_linear_sum(p in 1e-6f64..1.0, q in 1e-6f64..1.0) {
            let s = log_to_linear(ln_add(p.ln(), q.ln()));
            prop_assert!((s - (p + q)).abs() < 1e-9);
        }
    }
}
