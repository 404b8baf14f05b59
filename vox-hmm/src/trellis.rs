//! Forward, backward, and Viterbi passes over a left-to-right trellis.
//!
//! Tables have `T + 1` rows: row `t` holds the state distribution after `t`
//! frames have been emitted. Frame `t` is emitted on the arc taken between row
//! `t` and row `t + 1`. All values are natural-log probabilities and
//! [`LOG_ZERO`] marks a cell no path can occupy.
//!
//! Entry is strict (only state 0 at `t = 0`) and so is exit (only the final
//! state at `t = T`), which means a cell `(t, s)` is reachable only when
//! `s <= t` and `N - 1 - s <= T - t`. Terms from unreachable neighbours are
//! skipped rather than folded through `ln_add`.

use vox_core::prob::{ln_add, LOG_ONE, LOG_ZERO};
use vox_core::Scored;

use crate::emission::EmissionModel;
use crate::observation::Observations;
use crate::topology::BakisTopology;

/// Output log-probabilities of every arc at every frame, computed once per
/// call and shared by all passes.
#[derive(Debug, Clone)]
pub(crate) struct EmissionTable {
    n_states: usize,
    /// `stay[t * N + s] = ln b(s, s, t)`.
    stay: Vec<f64>,
    /// `advance[t * N + s] = ln b(s, s + 1, t)`; unused for the final state.
    advance: Vec<f64>,
}

impl EmissionTable {
    pub(crate) fn build<E: EmissionModel>(emissions: &E, seq: &E::Sequence) -> Self {
        let n = emissions.n_states();
        let t_len = seq.n_frames();
        let mut stay = vec![LOG_ZERO; t_len * n];
        let mut advance = vec![LOG_ZERO; t_len * n];
        for t in 0..t_len {
            for s in 0..n {
                stay[t * n + s] = emissions.output_probability(s, s, seq, t);
                if s + 1 < n {
                    advance[t * n + s] = emissions.output_probability(s, s + 1, seq, t);
                }
            }
        }
        Self {
            n_states: n,
            stay,
            advance,
        }
    }

    pub(crate) fn stay(&self, t: usize, s: usize) -> f64 {
        self.stay[t * self.n_states + s]
    }

    pub(crate) fn advance(&self, t: usize, s: usize) -> f64 {
        self.advance[t * self.n_states + s]
    }
}

/// Forward and backward tables for one observation sequence.
#[derive(Debug, Clone)]
pub struct Trellis {
    n_states: usize,
    n_frames: usize,
    alpha: Vec<f64>,
    beta: Vec<f64>,
}

impl Trellis {
    pub(crate) fn compute(topology: &BakisTopology, table: &EmissionTable, n_frames: usize) -> Self {
        let n_states = topology.n_states();
        Self {
            n_states,
            n_frames,
            alpha: forward(topology, table, n_frames),
            beta: backward(topology, table, n_frames),
        }
    }

    pub fn n_states(&self) -> usize {
        self.n_states
    }

    /// Number of frames `T`; the tables have `T + 1` rows.
    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    /// `ln α[t][s]`: probability of emitting the first `t` frames and being in
    /// state `s`.
    pub fn alpha(&self, t: usize, s: usize) -> f64 {
        self.alpha[t * self.n_states + s]
    }

    /// `ln β[t][s]`: probability of emitting frames `t..T` starting from
    /// state `s` and finishing in the final state.
    pub fn beta(&self, t: usize, s: usize) -> f64 {
        self.beta[t * self.n_states + s]
    }

    /// Sequence log-likelihood from the forward pass, `α[T][N-1]`.
    pub fn log_likelihood(&self) -> f64 {
        self.alpha(self.n_frames, self.n_states - 1)
    }

    /// Sequence log-likelihood from the backward pass, `β[0][0]`.
    pub fn backward_log_likelihood(&self) -> f64 {
        self.beta(0, 0)
    }
}

/// Forward pass only, for scoring: `ln α[T][N-1]`.
pub(crate) fn forward_log_likelihood(
    topology: &BakisTopology,
    table: &EmissionTable,
    t_len: usize,
) -> f64 {
    let n = topology.n_states();
    forward(topology, table, t_len)[t_len * n + n - 1]
}

fn forward(topology: &BakisTopology, table: &EmissionTable, t_len: usize) -> Vec<f64> {
    let n = topology.n_states();
    let mut alpha = vec![LOG_ZERO; (t_len + 1) * n];
    alpha[0] = LOG_ONE;

    for t in 1..=t_len {
        let (done, rest) = alpha.split_at_mut(t * n);
        let prev = &done[(t - 1) * n..];
        let cur = &mut rest[..n];
        for s in 0..n {
            let mut acc = LOG_ZERO;
            if s > 0 && prev[s - 1] != LOG_ZERO {
                acc = prev[s - 1] + topology.log_advance(s - 1) + table.advance(t - 1, s - 1);
            }
            if prev[s] != LOG_ZERO {
                let stay = prev[s] + topology.log_stay(s) + table.stay(t - 1, s);
                acc = if acc == LOG_ZERO { stay } else { ln_add(acc, stay) };
            }
            cur[s] = acc;
        }
    }
    alpha
}

fn backward(topology: &BakisTopology, table: &EmissionTable, t_len: usize) -> Vec<f64> {
    let n = topology.n_states();
    let mut beta = vec![LOG_ZERO; (t_len + 1) * n];
    beta[t_len * n + n - 1] = LOG_ONE;

    for t in (0..t_len).rev() {
        let (head, tail) = beta.split_at_mut((t + 1) * n);
        let cur = &mut head[t * n..];
        let next = &tail[..n];
        for s in (0..n).rev() {
            let mut acc = LOG_ZERO;
            if s + 1 < n && next[s + 1] != LOG_ZERO {
                acc = next[s + 1] + topology.log_advance(s) + table.advance(t, s);
            }
            if next[s] != LOG_ZERO {
                let stay = next[s] + topology.log_stay(s) + table.stay(t, s);
                acc = if acc == LOG_ZERO { stay } else { ln_add(acc, stay) };
            }
            cur[s] = acc;
        }
    }
    beta
}

/// The single most likely state path through the trellis.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Alignment {
    /// `states[t]` is the state after `t` frames; `T + 1` entries, starting at
    /// state 0 and ending at the final state.
    pub states: Vec<usize>,
    /// Log-probability of the path.
    pub log_prob: f64,
}

impl Alignment {
    /// The arc each frame was emitted on.
    pub fn frame_arcs(&self) -> Vec<(usize, usize)> {
        self.states.windows(2).map(|w| (w[0], w[1])).collect()
    }

    /// Frame range `[start, end)` emitted from each state, `None` for a state
    /// the path passes through without emitting (only possible for the final
    /// state).
    pub fn segments(&self, n_states: usize) -> Vec<Option<(usize, usize)>> {
        let mut segments = vec![None; n_states];
        let emitting = self.states.len().saturating_sub(1);
        for (t, &s) in self.states[..emitting].iter().enumerate() {
            segments[s] = Some(match segments[s] {
                None => (t, t + 1),
                Some((start, _)) => (start, t + 1),
            });
        }
        segments
    }
}

impl Scored for Alignment {
    fn score(&self) -> f64 {
        self.log_prob
    }
}

/// Viterbi decoding over the same recurrence as [`forward`], with `max` in
/// place of `ln_add`. `None` when the final state is unreachable.
pub(crate) fn viterbi(
    topology: &BakisTopology,
    table: &EmissionTable,
    t_len: usize,
) -> Option<Alignment> {
    let n = topology.n_states();
    let mut delta = vec![LOG_ZERO; (t_len + 1) * n];
    // `advanced[t * N + s]`: whether the best path into (t, s) came from s - 1.
    let mut advanced = vec![false; (t_len + 1) * n];
    delta[0] = LOG_ONE;

    for t in 1..=t_len {
        for s in 0..n {
            let prev_stay = delta[(t - 1) * n + s];
            let mut best = LOG_ZERO;
            if prev_stay != LOG_ZERO {
                best = prev_stay + topology.log_stay(s) + table.stay(t - 1, s);
            }
            if s > 0 {
                let prev_adv = delta[(t - 1) * n + s - 1];
                if prev_adv != LOG_ZERO {
                    let v = prev_adv + topology.log_advance(s - 1) + table.advance(t - 1, s - 1);
                    if v > best {
                        best = v;
                        advanced[t * n + s] = true;
                    }
                }
            }
            delta[t * n + s] = best;
        }
    }

    let log_prob = delta[t_len * n + n - 1];
    if log_prob == LOG_ZERO {
        return None;
    }

    let mut states = vec![0usize; t_len + 1];
    let mut s = n - 1;
    for t in (1..=t_len).rev() {
        states[t] = s;
        if advanced[t * n + s] {
            s -= 1;
        }
    }
    states[0] = s;
    debug_assert_eq!(s, 0);

    Some(Alignment { states, log_prob })
}
