//! Left-to-right ("Bakis") state graph and its transition table.
//!
//! Every state may loop on itself or advance exactly one state; the final
//! state only loops. Arcs are indexed densely in the order
//! `(0,0), (0,1), (1,1), (1,2), …, (N-1,N-1)`, giving `2N - 1` arcs in total.
//!
//! Transition probabilities are held in the log domain for the whole lifetime
//! of a topology.

use tracing::warn;
use vox_core::prob::{floor_log, ln_add, linear_to_log, log_to_linear, LOG_ONE, LOG_ZERO};
use vox_core::{Result, VoxError};

use crate::posterior::{pooled_occupancy, ArcPosteriors};

/// Tolerance for transition rows supplied by callers.
const ROW_SUM_TOL: f64 = 1e-6;

/// Number of legal arcs in an `n_states` chain.
pub fn n_arcs(n_states: usize) -> usize {
    2 * n_states - 1
}

/// Whether `(from, to)` is an arc of an `n_states` chain.
pub fn is_legal_arc(n_states: usize, from: usize, to: usize) -> bool {
    from < n_states && (to == from || (to == from + 1 && to < n_states))
}

/// Dense index of a legal arc.
pub fn arc_index(from: usize, to: usize) -> usize {
    debug_assert!(to == from || to == from + 1, "illegal arc ({from}, {to})");
    2 * from + (to - from)
}

/// All legal arcs of an `n_states` chain, in index order.
pub fn legal_arcs(n_states: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..n_states).flat_map(move |i| {
        let next = (i + 1 < n_states).then_some((i, i + 1));
        std::iter::once((i, i)).chain(next)
    })
}

/// Transition table of a left-to-right chain.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BakisTopology {
    /// `ln a[i][i]` per state.
    log_stay: Vec<f64>,
    /// `ln a[i][i+1]` per state; [`LOG_ZERO`] for the final state.
    log_advance: Vec<f64>,
}

impl BakisTopology {
    /// Flat start: every non-final state splits its mass evenly between
    /// looping and advancing; the final state loops with probability one.
    ///
    /// # Errors
    ///
    /// Returns an error if `n_states` is zero.
    pub fn flat(n_states: usize) -> Result<Self> {
        if n_states == 0 {
            return Err(VoxError::InvalidInput("n_states must be > 0".into()));
        }
        let half = 0.5_f64.ln();
        let mut log_stay = vec![half; n_states];
        let mut log_advance = vec![half; n_states];
        log_stay[n_states - 1] = LOG_ONE;
        log_advance[n_states - 1] = LOG_ZERO;
        Ok(Self {
            log_stay,
            log_advance,
        })
    }

    /// Build from a full `N x N` matrix of linear probabilities.
    ///
    /// # Errors
    ///
    /// Returns an error if the matrix is not square, puts mass on an arc the
    /// chain does not have, or has a row that does not sum to one.
    pub fn from_transition_matrix(rows: &[Vec<f64>]) -> Result<Self> {
        let n = rows.len();
        if n == 0 {
            return Err(VoxError::InvalidInput("transition matrix is empty".into()));
        }
        let mut log_stay = Vec::with_capacity(n);
        let mut log_advance = Vec::with_capacity(n);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n {
                return Err(VoxError::InvalidInput(format!(
                    "transition row {i} has {} columns, expected {n}",
                    row.len()
                )));
            }
            for (j, &p) in row.iter().enumerate() {
                if !(0.0..=1.0).contains(&p) {
                    return Err(VoxError::InvalidInput(format!(
                        "transition ({i},{j}) = {p} is not a probability"
                    )));
                }
                if p != 0.0 && !is_legal_arc(n, i, j) {
                    return Err(VoxError::InvalidInput(format!(
                        "transition ({i},{j}) = {p} is not a left-to-right arc"
                    )));
                }
            }
            let row_sum: f64 = row.iter().sum();
            if (row_sum - 1.0).abs() > ROW_SUM_TOL {
                return Err(VoxError::InvalidInput(format!(
                    "transition row {i} sums to {row_sum}, expected ~1.0"
                )));
            }
            log_stay.push(floor_log(linear_to_log(row[i])));
            log_advance.push(if i + 1 < n {
                floor_log(linear_to_log(row[i + 1]))
            } else {
                LOG_ZERO
            });
        }
        // The final state has nowhere else to go.
        log_stay[n - 1] = LOG_ONE;
        let mut topology = Self {
            log_stay,
            log_advance,
        };
        for i in 0..n - 1 {
            topology.renormalize(i);
        }
        Ok(topology)
    }

    pub fn n_states(&self) -> usize {
        self.log_stay.len()
    }

    /// `ln a[i][i]`.
    pub fn log_stay(&self, state: usize) -> f64 {
        self.log_stay[state]
    }

    /// `ln a[i][i+1]`; [`LOG_ZERO`] for the final state.
    pub fn log_advance(&self, state: usize) -> f64 {
        self.log_advance[state]
    }

    /// Log transition probability of a legal arc.
    pub fn transition_probability(&self, from: usize, to: usize) -> f64 {
        debug_assert!(is_legal_arc(self.n_states(), from, to));
        if to == from {
            self.log_stay[from]
        } else {
            self.log_advance[from]
        }
    }

    /// Full `N x N` matrix of linear probabilities, zero off the band.
    pub fn transition_matrix(&self) -> Vec<Vec<f64>> {
        let n = self.n_states();
        let mut rows = vec![vec![0.0; n]; n];
        for (i, j) in legal_arcs(n) {
            rows[i][j] = log_to_linear(self.transition_probability(i, j));
        }
        rows
    }

    /// Baum-Welch update of every outgoing pair `(a[i][i], a[i][i+1])` from
    /// the pooled posteriors of one or more sequences.
    ///
    /// Each new value is the arc's total posterior mass over the state's total
    /// outgoing mass, floored, then the pair is rescaled to sum to one. States
    /// that received no posterior mass keep their previous values. Returns the
    /// number of states updated.
    ///
    /// # Errors
    ///
    /// Returns an error, leaving the table untouched, if any posterior table
    /// covers a different number of states.
    pub fn reestimate(&mut self, posteriors: &[&ArcPosteriors]) -> Result<usize> {
        let n = self.n_states();
        if let Some(bad) = posteriors.iter().find(|p| p.n_states() != n) {
            return Err(VoxError::InvalidInput(format!(
                "posteriors cover {} states, topology has {n}",
                bad.n_states()
            )));
        }

        let mut updated = 0;
        for i in 0..n.saturating_sub(1) {
            let stay = pooled_occupancy(posteriors.iter().copied(), i, i);
            let advance = pooled_occupancy(posteriors.iter().copied(), i, i + 1);
            let total = ln_add(stay, advance);
            if total == LOG_ZERO {
                warn!(state = i, "state never visited; keeping transitions");
                continue;
            }
            self.log_stay[i] = floor_log(stay - total);
            self.log_advance[i] = floor_log(advance - total);
            self.renormalize(i);
            updated += 1;
        }
        Ok(updated)
    }

    fn renormalize(&mut self, state: usize) {
        let z = ln_add(self.log_stay[state], self.log_advance[state]);
        self.log_stay[state] -= z;
        self.log_advance[state] -= z;
    }
}
