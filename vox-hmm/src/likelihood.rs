//! Sequence likelihoods that stay meaningful far below `f64::MIN_POSITIVE`.
//!
//! A 20-frame utterance under a 12-dimensional Gaussian model routinely scores
//! around `e^-1000`, which has no `f64` representation. [`Likelihood`] keeps
//! the natural log and converts to a base-10 mantissa and exponent on demand.

use std::f64::consts::LN_10;
use std::fmt;

use vox_core::prob::{log_to_linear, LOG_ZERO};
use vox_core::{LogProb, Scored};

/// Likelihood `P(O | model)` held as its natural logarithm.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Likelihood(LogProb);

impl Likelihood {
    pub fn from_ln(ln: f64) -> Self {
        Self(LogProb(ln))
    }

    /// Natural-log likelihood.
    pub fn ln(self) -> f64 {
        self.0 .0
    }

    /// Linear likelihood. Underflows to `0.0` below roughly `e^-745` even
    /// though the model assigns the sequence nonzero probability; use
    /// [`scientific`](Self::scientific) or [`ln`](Self::ln) for reporting.
    pub fn to_linear(self) -> f64 {
        log_to_linear(self.ln())
    }

    /// True only when no path through the model can produce the sequence.
    pub fn is_zero(self) -> bool {
        self.ln() == LOG_ZERO
    }

    /// `(mantissa, exponent)` with `mantissa` in `[1, 10)` and
    /// `likelihood = mantissa * 10^exponent`. Zero is `(0.0, 0)`.
    pub fn scientific(self) -> (f64, i64) {
        if self.is_zero() {
            return (0.0, 0);
        }
        let log10 = self.ln() / LN_10;
        let mut exponent = log10.floor();
        let mut mantissa = 10f64.powf(log10 - exponent);
        if mantissa >= 10.0 {
            mantissa /= 10.0;
            exponent += 1.0;
        }
        (mantissa, exponent as i64)
    }
}

impl Scored for Likelihood {
    fn score(&self) -> f64 {
        self.ln()
    }
}

impl fmt::Display for Likelihood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return write!(f, "0");
        }
        let (mantissa, exponent) = self.scientific();
        write!(f, "{mantissa:.4}e{exponent}")
    }
}
