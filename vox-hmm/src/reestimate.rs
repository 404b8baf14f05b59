//! Baum-Welch maximization step.
//!
//! Transitions and emissions are both updated from the same posteriors, which
//! were computed under the parameters in force before the step. With several
//! sequences the expected counts are pooled before any parameter moves.

use vox_core::Result;

use crate::emission::{EmissionModel, Evidence};
use crate::posterior::ArcPosteriors;
use crate::topology::BakisTopology;

/// What one maximization step changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReestimationSummary {
    /// States whose outgoing transition pair was reestimated.
    pub states_updated: usize,
    /// Arcs whose emission parameters were reestimated.
    pub arcs_updated: usize,
}

/// Emissions are updated first: they check every shape the topology does, so
/// a rejected batch leaves both untouched.
pub(crate) fn maximize<E: EmissionModel>(
    topology: &mut BakisTopology,
    emissions: &mut E,
    evidence: &[Evidence<'_, E::Sequence>],
) -> Result<ReestimationSummary> {
    let arcs_updated = emissions.reestimate(evidence)?;
    let posteriors: Vec<&ArcPosteriors> = evidence.iter().map(|&(p, _)| p).collect();
    let states_updated = topology.reestimate(&posteriors)?;
    Ok(ReestimationSummary {
        states_updated,
        arcs_updated,
    })
}
