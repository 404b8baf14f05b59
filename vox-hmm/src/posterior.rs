//! Arc posteriors: `P(arc (i, j) taken at frame t | observations, model)`.

use vox_core::prob::{ln_sum, log_to_linear, LOG_ZERO};

use crate::topology::{arc_index, legal_arcs, n_arcs, BakisTopology};
use crate::trellis::{EmissionTable, Trellis};

/// Log-domain posterior of every legal arc at every frame.
///
/// Cells where the source state is unreachable from the start, or the target
/// state cannot reach the end, hold [`LOG_ZERO`] and are skipped by every sum.
#[derive(Debug, Clone)]
pub struct ArcPosteriors {
    n_states: usize,
    n_frames: usize,
    log_likelihood: f64,
    /// `log_gamma[arc * n_frames + t]`.
    log_gamma: Vec<f64>,
}

impl ArcPosteriors {
    /// `γ[i][j][t] = α[t][i] + ln a(i,j) + ln b(i,j,t) + β[t+1][j] - ln P(O)`.
    pub(crate) fn compute(
        topology: &BakisTopology,
        emissions: &EmissionTable,
        trellis: &Trellis,
    ) -> Self {
        let n = trellis.n_states();
        let t_len = trellis.n_frames();
        let ll = trellis.log_likelihood();
        let mut log_gamma = vec![LOG_ZERO; n_arcs(n) * t_len];

        if ll != LOG_ZERO {
            for t in 0..t_len {
                for s in 0..n {
                    let alpha = trellis.alpha(t, s);
                    if alpha == LOG_ZERO {
                        continue;
                    }
                    let beta_stay = trellis.beta(t + 1, s);
                    if beta_stay != LOG_ZERO {
                        log_gamma[arc_index(s, s) * t_len + t] = alpha
                            + topology.log_stay(s)
                            + emissions.stay(t, s)
                            + beta_stay
                            - ll;
                    }
                    if s + 1 < n {
                        let beta_next = trellis.beta(t + 1, s + 1);
                        if beta_next != LOG_ZERO {
                            log_gamma[arc_index(s, s + 1) * t_len + t] = alpha
                                + topology.log_advance(s)
                                + emissions.advance(t, s)
                                + beta_next
                                - ll;
                        }
                    }
                }
            }
        }

        Self {
            n_states: n,
            n_frames: t_len,
            log_likelihood: ll,
            log_gamma,
        }
    }

    pub fn n_states(&self) -> usize {
        self.n_states
    }

    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    /// Sequence log-likelihood the posteriors were normalized by.
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    /// Log posterior of arc `(from, to)` at frame `t`.
    pub fn get(&self, from: usize, to: usize, t: usize) -> f64 {
        self.log_gamma[arc_index(from, to) * self.n_frames + t]
    }

    /// Log posteriors of arc `(from, to)` over all frames.
    pub fn arc(&self, from: usize, to: usize) -> &[f64] {
        let k = arc_index(from, to);
        &self.log_gamma[k * self.n_frames..(k + 1) * self.n_frames]
    }

    /// Expected number of frames spent on arc `(from, to)`, in the log domain.
    pub fn occupancy(&self, from: usize, to: usize) -> f64 {
        ln_sum(self.arc(from, to).iter().copied())
    }

    /// Per-frame weights of arc `(from, to)` normalized by its occupancy, so
    /// they sum to one. `None` if the arc never carries posterior mass.
    ///
    /// Normalizing in the log domain keeps the weights representable even
    /// when the raw posteriors underflow.
    pub fn normalized_weights(&self, from: usize, to: usize) -> Option<Vec<f64>> {
        let denom = self.occupancy(from, to);
        if denom == LOG_ZERO {
            return None;
        }
        Some(self.scaled_weights(from, to, denom))
    }

    /// Per-frame linear weights of arc `(from, to)` divided by an external
    /// log total, typically a [`pooled_occupancy`] over several sequences.
    pub fn scaled_weights(&self, from: usize, to: usize, log_total: f64) -> Vec<f64> {
        self.arc(from, to)
            .iter()
            .map(|&g| log_to_linear(g - log_total))
            .collect()
    }

    /// Total posterior mass over every arc active at frame `t`, in the log
    /// domain. Equals `ln 1 = 0` for any reachable sequence.
    pub fn frame_mass(&self, t: usize) -> f64 {
        ln_sum(legal_arcs(self.n_states).map(|(i, j)| self.get(i, j, t)))
    }
}

/// Log occupancy of arc `(from, to)` summed over several sequences' posteriors.
pub fn pooled_occupancy<'a, I>(posteriors: I, from: usize, to: usize) -> f64
where
    I: IntoIterator<Item = &'a ArcPosteriors>,
{
    ln_sum(posteriors.into_iter().map(|p| p.occupancy(from, to)))
}
