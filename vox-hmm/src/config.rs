//! Model and training configuration.

use vox_core::{Result, VoxError};

/// Number of states in the default word/phone model.
pub const DEFAULT_NUM_STATES: usize = 6;

/// Size of the default quantizer codebook.
pub const DEFAULT_NUM_SYMBOLS: usize = 10;

/// Flat-start means for a 12-component cepstral front-end.
pub const DEFAULT_MEANS: [f64; 12] = [
    -20.0, 70.0, 30.0, 43.0, 26.0, 10.0, 12.0, 0.0, 4.0, 0.0, 15.0, 0.0,
];

/// Flat-start diagonal variances matching [`DEFAULT_MEANS`].
pub const DEFAULT_VARIANCES: [f64; 12] = [
    1800.0, 850.0, 500.0, 450.0, 350.0, 300.0, 300.0, 250.0, 250.0, 215.0, 180.0, 150.0,
];

/// Configuration shared by every model variant.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HmmConfig {
    /// Number of states in the left-to-right chain.
    pub n_states: usize,
    /// Lower bound for every reestimated Gaussian variance component.
    pub variance_floor: f64,
    /// Lower bound for every discrete symbol probability.
    pub min_symbol_probability: f64,
    /// Rescale each discrete row to sum to one after flooring.
    pub renormalize_symbols: bool,
}

impl Default for HmmConfig {
    fn default() -> Self {
        Self {
            n_states: DEFAULT_NUM_STATES,
            variance_floor: 1e-3,
            min_symbol_probability: 1e-9,
            renormalize_symbols: true,
        }
    }
}

impl HmmConfig {
    /// Default configuration with a different chain length.
    pub fn with_states(n_states: usize) -> Self {
        Self {
            n_states,
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.n_states == 0 {
            return Err(VoxError::InvalidInput("n_states must be > 0".into()));
        }
        if !(self.variance_floor > 0.0 && self.variance_floor.is_finite()) {
            return Err(VoxError::InvalidInput(format!(
                "variance_floor must be positive and finite, got {}",
                self.variance_floor
            )));
        }
        if !(self.min_symbol_probability > 0.0 && self.min_symbol_probability < 1.0) {
            return Err(VoxError::InvalidInput(format!(
                "min_symbol_probability must be in (0, 1), got {}",
                self.min_symbol_probability
            )));
        }
        Ok(())
    }
}

/// Configuration for running several EM iterations.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrainingConfig {
    /// Maximum number of iterations (passes over the data).
    pub max_iter: usize,
    /// Stop once the log-likelihood improves by less than this. `0.0` never
    /// stops early.
    pub tolerance: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            max_iter: 5,
            tolerance: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(HmmConfig::default().validate().is_ok());
        assert_eq!(HmmConfig::default().n_states, 6);
        assert_eq!(DEFAULT_MEANS.len(), DEFAULT_VARIANCES.len());
    }

    #[test]
    fn rejects_degenerate_settings() {
        assert!(HmmConfig::with_states(0).validate().is_err());
        let cfg = HmmConfig {
            variance_floor: 0.0,
            ..HmmConfig::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = HmmConfig {
            min_symbol_probability: 1.0,
            ..HmmConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
