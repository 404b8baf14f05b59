//! Emission models: the output distribution attached to every arc.
//!
//! Emissions live on arcs rather than states, so a self-loop `(i, i)` and the
//! advance `(i, i + 1)` out of the same state carry independent parameters.
//! Two variants implement [`EmissionModel`]:
//!
//! - [`GaussianEmissions`]: diagonal-covariance multivariate Gaussians over
//!   continuous feature frames
//! - [`DiscreteEmissions`]: categorical distributions over codebook symbols

mod discrete;
mod gaussian;

pub use discrete::DiscreteEmissions;
pub use gaussian::{log_gaussian_density, GaussianEmissions};

use vox_core::{Result, VoxError};

use crate::observation::Observations;
use crate::posterior::ArcPosteriors;

/// One sequence's arc posteriors paired with the sequence they were computed
/// from.
pub type Evidence<'a, S> = (&'a ArcPosteriors, &'a S);

/// Capability shared by every emission variant.
///
/// Arc arguments must always be legal arcs of the model's chain
/// (`to == from` or `to == from + 1`).
pub trait EmissionModel {
    /// Observation sequence type this model scores.
    type Sequence: Observations;

    /// Number of states in the chain the parameters are laid out for.
    fn n_states(&self) -> usize;

    /// Reject a sequence this model cannot score (wrong dimension, symbol
    /// outside the alphabet) before any trellis work starts.
    fn validate(&self, seq: &Self::Sequence) -> Result<()>;

    /// `ln b(from, to, t)`: log output probability (or density) of frame `t`
    /// on arc `(from, to)`, never below the log floor.
    fn output_probability(&self, from: usize, to: usize, seq: &Self::Sequence, t: usize) -> f64;

    /// Baum-Welch update of every arc's parameters from the pooled arc
    /// posteriors of one or more sequences. Arcs with no posterior mass in
    /// any sequence keep their parameters. Returns the number of arcs updated.
    ///
    /// # Errors
    ///
    /// Returns an error, leaving the parameters untouched, if any posterior
    /// table disagrees with the model's state count or its sequence's length,
    /// or a sequence fails [`validate`](Self::validate).
    fn reestimate(&mut self, evidence: &[Evidence<'_, Self::Sequence>]) -> Result<usize>;
}

/// Shape checks shared by every [`EmissionModel::reestimate`].
pub(crate) fn check_evidence<E: EmissionModel>(
    model: &E,
    evidence: &[Evidence<'_, E::Sequence>],
) -> Result<()> {
    for (u, &(posteriors, seq)) in evidence.iter().enumerate() {
        if posteriors.n_states() != model.n_states() {
            return Err(VoxError::InvalidInput(format!(
                "sequence {u}: posteriors cover {} states, model has {}",
                posteriors.n_states(),
                model.n_states()
            )));
        }
        if posteriors.n_frames() != seq.n_frames() {
            return Err(VoxError::InvalidInput(format!(
                "sequence {u}: posteriors cover {} frames, sequence has {}",
                posteriors.n_frames(),
                seq.n_frames()
            )));
        }
        model.validate(seq)?;
    }
    Ok(())
}
