//! Diagonal-covariance Gaussian emissions over continuous feature frames.

use std::f64::consts::PI;

use tracing::debug;
use vox_core::prob::{floor_log, LOG_ZERO};
use vox_core::{Result, Summarizable, VoxError};

use super::{check_evidence, EmissionModel, Evidence};
use crate::observation::FeatureSequence;
use crate::posterior::pooled_occupancy;
use crate::topology::{arc_index, legal_arcs, n_arcs};

/// Log density of a diagonal-covariance Gaussian at `x`:
/// `-0.5 * Σ_d [ (x_d - μ_d)² / σ²_d + ln(2π σ²_d) ]`, clamped to the log
/// floor so an outlying frame never produces a true zero.
pub fn log_gaussian_density(mean: &[f64], variance: &[f64], x: &[f64]) -> f64 {
    debug_assert_eq!(mean.len(), x.len());
    debug_assert_eq!(variance.len(), x.len());
    let mut acc = 0.0;
    for ((&mu, &var), &xd) in mean.iter().zip(variance).zip(x) {
        let diff = xd - mu;
        acc += diff * diff / var + (2.0 * PI * var).ln();
    }
    floor_log(-0.5 * acc)
}

/// Per-arc mean and diagonal variance vectors, stored flat as
/// `n_arcs * dim` values in arc-index order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GaussianEmissions {
    n_states: usize,
    dim: usize,
    means: Vec<f64>,
    variances: Vec<f64>,
    variance_floor: f64,
}

impl GaussianEmissions {
    /// Flat start: every arc gets the same mean and variance vectors.
    ///
    /// # Errors
    ///
    /// Returns an error if `n_states` or the dimension is zero, the vectors
    /// differ in length, or any variance is not strictly positive.
    pub fn flat(
        n_states: usize,
        mean: &[f64],
        variance: &[f64],
        variance_floor: f64,
    ) -> Result<Self> {
        if n_states == 0 {
            return Err(VoxError::InvalidInput("n_states must be > 0".into()));
        }
        let arcs = n_arcs(n_states);
        Self::from_arc_rows(
            n_states,
            vec![mean.to_vec(); arcs],
            vec![variance.to_vec(); arcs],
            variance_floor,
        )
    }

    /// Build from one mean row and one variance row per legal arc, in arc
    /// index order `(0,0), (0,1), (1,1), …`.
    ///
    /// Variances below `variance_floor` are raised to it.
    pub fn from_arc_rows(
        n_states: usize,
        means: Vec<Vec<f64>>,
        variances: Vec<Vec<f64>>,
        variance_floor: f64,
    ) -> Result<Self> {
        if n_states == 0 {
            return Err(VoxError::InvalidInput("n_states must be > 0".into()));
        }
        let arcs = n_arcs(n_states);
        if means.len() != arcs || variances.len() != arcs {
            return Err(VoxError::InvalidInput(format!(
                "expected {arcs} mean and variance rows, got {} and {}",
                means.len(),
                variances.len()
            )));
        }
        let dim = means[0].len();
        if dim == 0 {
            return Err(VoxError::InvalidInput("feature dimension must be > 0".into()));
        }
        if !(variance_floor > 0.0) {
            return Err(VoxError::InvalidInput(format!(
                "variance_floor must be positive, got {variance_floor}"
            )));
        }

        let mut flat_means = Vec::with_capacity(arcs * dim);
        let mut flat_vars = Vec::with_capacity(arcs * dim);
        for (k, (mu, var)) in means.into_iter().zip(variances).enumerate() {
            if mu.len() != dim || var.len() != dim {
                return Err(VoxError::DimensionMismatch {
                    expected: dim,
                    found: if mu.len() != dim { mu.len() } else { var.len() },
                });
            }
            if let Some(bad) = mu.iter().find(|v| !v.is_finite()) {
                return Err(VoxError::InvalidInput(format!(
                    "arc {k}: non-finite mean component {bad}"
                )));
            }
            if let Some(bad) = var.iter().find(|v| !(**v > 0.0 && v.is_finite())) {
                return Err(VoxError::InvalidInput(format!(
                    "arc {k}: variance component {bad} must be positive"
                )));
            }
            flat_means.extend(mu);
            flat_vars.extend(var.into_iter().map(|v| v.max(variance_floor)));
        }

        Ok(Self {
            n_states,
            dim,
            means: flat_means,
            variances: flat_vars,
            variance_floor,
        })
    }

    /// Feature dimensionality `D`.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn variance_floor(&self) -> f64 {
        self.variance_floor
    }

    /// Mean vector of arc `(from, to)`.
    pub fn mean(&self, from: usize, to: usize) -> &[f64] {
        let k = arc_index(from, to);
        &self.means[k * self.dim..(k + 1) * self.dim]
    }

    /// Diagonal variance vector of arc `(from, to)`.
    pub fn variance(&self, from: usize, to: usize) -> &[f64] {
        let k = arc_index(from, to);
        &self.variances[k * self.dim..(k + 1) * self.dim]
    }

    /// Mean vectors, one row per legal arc.
    pub fn mean_rows(&self) -> Vec<Vec<f64>> {
        self.means.chunks_exact(self.dim).map(<[f64]>::to_vec).collect()
    }

    /// Variance vectors, one row per legal arc.
    pub fn variance_rows(&self) -> Vec<Vec<f64>> {
        self.variances.chunks_exact(self.dim).map(<[f64]>::to_vec).collect()
    }
}

impl EmissionModel for GaussianEmissions {
    type Sequence = FeatureSequence;

    fn n_states(&self) -> usize {
        self.n_states
    }

    fn validate(&self, seq: &FeatureSequence) -> Result<()> {
        if !seq.is_empty() && seq.dim() != self.dim {
            return Err(VoxError::DimensionMismatch {
                expected: self.dim,
                found: seq.dim(),
            });
        }
        Ok(())
    }

    fn output_probability(&self, from: usize, to: usize, seq: &FeatureSequence, t: usize) -> f64 {
        log_gaussian_density(self.mean(from, to), self.variance(from, to), seq.frame(t))
    }

    /// New mean is the posterior-weighted average of the frames; new variance
    /// is the posterior-weighted squared deviation from that new mean, floored.
    /// Weights are pooled over every sequence in `evidence`.
    fn reestimate(&mut self, evidence: &[Evidence<'_, FeatureSequence>]) -> Result<usize> {
        check_evidence(self, evidence)?;
        let d = self.dim;
        let mut updated = 0;
        let mut mean = vec![0.0; d];
        let mut var = vec![0.0; d];

        for (i, j) in legal_arcs(self.n_states) {
            let total = pooled_occupancy(evidence.iter().map(|&(p, _)| p), i, j);
            if total == LOG_ZERO {
                debug!(from = i, to = j, "arc carries no posterior mass; keeping parameters");
                continue;
            }
            let weights: Vec<Vec<f64>> = evidence
                .iter()
                .map(|&(p, _)| p.scaled_weights(i, j, total))
                .collect();

            mean.iter_mut().for_each(|m| *m = 0.0);
            for (&(_, seq), w) in evidence.iter().zip(&weights) {
                for (t, &wt) in w.iter().enumerate() {
                    if wt == 0.0 {
                        continue;
                    }
                    for (m, &x) in mean.iter_mut().zip(seq.frame(t)) {
                        *m += wt * x;
                    }
                }
            }

            var.iter_mut().for_each(|v| *v = 0.0);
            for (&(_, seq), w) in evidence.iter().zip(&weights) {
                for (t, &wt) in w.iter().enumerate() {
                    if wt == 0.0 {
                        continue;
                    }
                    for ((v, &m), &x) in var.iter_mut().zip(&mean).zip(seq.frame(t)) {
                        let diff = x - m;
                        *v += wt * diff * diff;
                    }
                }
            }

            let k = arc_index(i, j);
            self.means[k * d..(k + 1) * d].copy_from_slice(&mean);
            for (dst, &v) in self.variances[k * d..(k + 1) * d].iter_mut().zip(&var) {
                *dst = v.max(self.variance_floor);
            }
            updated += 1;
        }
        Ok(updated)
    }
}

impl Summarizable for GaussianEmissions {
    fn summary(&self) -> String {
        format!(
            "Gaussian emissions: arcs={}, dim={}, variance floor={:e}",
            n_arcs(self.n_states),
            self.dim,
            self.variance_floor
        )
    }
}
