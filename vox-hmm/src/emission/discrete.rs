//! Categorical emissions over vector-quantized codebook symbols.

use tracing::debug;
use vox_core::prob::{linear_to_log, LOG_ZERO};
use vox_core::{Result, Summarizable, VoxError};

use super::{check_evidence, EmissionModel, Evidence};
use crate::observation::SymbolSequence;
use crate::posterior::pooled_occupancy;
use crate::topology::{arc_index, legal_arcs, n_arcs};

/// Tolerance for caller-supplied rows.
const ROW_SUM_TOL: f64 = 1e-6;

/// Per-arc symbol distributions, stored flat as `n_arcs * n_symbols` linear
/// probabilities in arc-index order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiscreteEmissions {
    n_states: usize,
    n_symbols: usize,
    probs: Vec<f64>,
    min_probability: f64,
    renormalize: bool,
}

impl DiscreteEmissions {
    /// Flat start: every arc emits every symbol with probability `1 / K`.
    pub fn flat(
        n_states: usize,
        n_symbols: usize,
        min_probability: f64,
        renormalize: bool,
    ) -> Result<Self> {
        if n_states == 0 {
            return Err(VoxError::InvalidInput("n_states must be > 0".into()));
        }
        if n_symbols == 0 {
            return Err(VoxError::InvalidInput("n_symbols must be > 0".into()));
        }
        let uniform = 1.0 / n_symbols as f64;
        Self::from_arc_rows(
            n_states,
            vec![vec![uniform; n_symbols]; n_arcs(n_states)],
            min_probability,
            renormalize,
        )
    }

    /// Build from one probability row per legal arc, in arc-index order.
    ///
    /// # Errors
    ///
    /// Returns an error if the row count or widths are wrong, or a row does
    /// not sum to approximately one.
    pub fn from_arc_rows(
        n_states: usize,
        rows: Vec<Vec<f64>>,
        min_probability: f64,
        renormalize: bool,
    ) -> Result<Self> {
        if n_states == 0 {
            return Err(VoxError::InvalidInput("n_states must be > 0".into()));
        }
        let arcs = n_arcs(n_states);
        if rows.len() != arcs {
            return Err(VoxError::InvalidInput(format!(
                "expected {arcs} symbol rows, got {}",
                rows.len()
            )));
        }
        let n_symbols = rows[0].len();
        if n_symbols == 0 {
            return Err(VoxError::InvalidInput("n_symbols must be > 0".into()));
        }
        if !(min_probability > 0.0 && min_probability * (n_symbols as f64) < 1.0) {
            return Err(VoxError::InvalidInput(format!(
                "min_probability must be in (0, 1/{n_symbols}), got {min_probability}"
            )));
        }

        let mut probs = Vec::with_capacity(arcs * n_symbols);
        for (k, mut row) in rows.into_iter().enumerate() {
            if row.len() != n_symbols {
                return Err(VoxError::InvalidInput(format!(
                    "arc {k} has {} symbols, expected {n_symbols}",
                    row.len()
                )));
            }
            if row.iter().any(|p| !(0.0..=1.0).contains(p)) {
                return Err(VoxError::InvalidInput(format!(
                    "arc {k} has a value outside [0, 1]"
                )));
            }
            let row_sum: f64 = row.iter().sum();
            if (row_sum - 1.0).abs() > ROW_SUM_TOL {
                return Err(VoxError::InvalidInput(format!(
                    "arc {k} sums to {row_sum}, expected ~1.0"
                )));
            }
            if renormalize {
                floor_distribution(&mut row, min_probability);
            } else {
                row.iter_mut().for_each(|p| *p = p.max(min_probability));
            }
            probs.extend(row);
        }

        Ok(Self {
            n_states,
            n_symbols,
            probs,
            min_probability,
            renormalize,
        })
    }

    /// Alphabet size `K`.
    pub fn n_symbols(&self) -> usize {
        self.n_symbols
    }

    /// Linear symbol distribution of arc `(from, to)`.
    pub fn distribution(&self, from: usize, to: usize) -> &[f64] {
        let k = arc_index(from, to);
        &self.probs[k * self.n_symbols..(k + 1) * self.n_symbols]
    }
}

impl EmissionModel for DiscreteEmissions {
    type Sequence = SymbolSequence;

    fn n_states(&self) -> usize {
        self.n_states
    }

    fn validate(&self, seq: &SymbolSequence) -> Result<()> {
        for (t, &o) in seq.as_slice().iter().enumerate() {
            if o >= self.n_symbols {
                return Err(VoxError::InvalidInput(format!(
                    "observation[{t}] = {o} out of range (n_symbols = {})",
                    self.n_symbols
                )));
            }
        }
        Ok(())
    }

    fn output_probability(&self, from: usize, to: usize, seq: &SymbolSequence, t: usize) -> f64 {
        let p = self.distribution(from, to)[seq.symbol(t)];
        linear_to_log(p.max(self.min_probability))
    }

    /// New probability of symbol `k` is the share of the arc's pooled
    /// posterior mass on frames quantized to `k`. Every entry is then raised
    /// to the floor, and with renormalization on the row is rescaled so it
    /// sums to one without pushing any entry back below the floor.
    fn reestimate(&mut self, evidence: &[Evidence<'_, SymbolSequence>]) -> Result<usize> {
        check_evidence(self, evidence)?;
        let k_len = self.n_symbols;
        let mut updated = 0;
        let mut counts = vec![0.0; k_len];

        for (i, j) in legal_arcs(self.n_states) {
            let total = pooled_occupancy(evidence.iter().map(|&(p, _)| p), i, j);
            if total == LOG_ZERO {
                debug!(from = i, to = j, "arc carries no posterior mass; keeping parameters");
                continue;
            }

            counts.iter_mut().for_each(|c| *c = 0.0);
            for &(posteriors, seq) in evidence {
                for (t, w) in posteriors.scaled_weights(i, j, total).into_iter().enumerate() {
                    counts[seq.symbol(t)] += w;
                }
            }
            if self.renormalize {
                floor_distribution(&mut counts, self.min_probability);
            } else {
                counts.iter_mut().for_each(|c| *c = c.max(self.min_probability));
            }

            let k = arc_index(i, j);
            self.probs[k * k_len..(k + 1) * k_len].copy_from_slice(&counts);
            updated += 1;
        }
        Ok(updated)
    }
}

/// Rescale `row` to sum to one with every entry at least `floor`.
///
/// Entries that fall below the floor are pinned to it and the remaining mass
/// is shared among the others in proportion; pinning repeats until no free
/// entry drops below the floor. Requires `floor * row.len() < 1`.
fn floor_distribution(row: &mut [f64], floor: f64) {
    let mut pinned = vec![false; row.len()];
    loop {
        let mut newly_pinned = false;
        for (p, pin) in row.iter_mut().zip(pinned.iter_mut()) {
            if !*pin && *p < floor {
                *p = floor;
                *pin = true;
                newly_pinned = true;
            }
        }

        let n_pinned = pinned.iter().filter(|&&pin| pin).count();
        let free: f64 = row
            .iter()
            .zip(&pinned)
            .filter(|&(_, &pin)| !pin)
            .map(|(p, _)| p)
            .sum();
        if free > 0.0 {
            let scale = (1.0 - n_pinned as f64 * floor) / free;
            for (p, _) in row.iter_mut().zip(&pinned).filter(|&(_, &pin)| !pin) {
                *p *= scale;
            }
        }

        if !newly_pinned {
            break;
        }
    }
}

impl Summarizable for DiscreteEmissions {
    fn summary(&self) -> String {
        format!(
            "Discrete emissions: arcs={}, symbols={}, floor={:e}",
            n_arcs(self.n_states),
            self.n_symbols,
            self.min_probability
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_start_is_uniform() {
        let em = DiscreteEmissions::flat(6, 10, 1e-9, true).unwrap();
        assert_eq!(em.n_symbols(), 10);
        for &p in em.distribution(3, 4) {
            assert!((p - 0.1).abs() < 1e-12);
        }
        let seq = SymbolSequence::new(vec![7]);
        assert!((em.output_probability(0, 0, &seq, 0) - 0.1_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn zero_probabilities_are_floored_on_lookup() {
        let rows = vec![vec![1.0, 0.0]; 3];
        let em = DiscreteEmissions::from_arc_rows(2, rows, 1e-9, true).unwrap();
        let seq = SymbolSequence::new(vec![1]);
        let lp = em.output_probability(0, 1, &seq, 0);
        assert!(lp.is_finite());
        assert!((lp - 1e-9_f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn rejects_malformed_rows() {
        assert!(DiscreteEmissions::flat(2, 0, 1e-9, true).is_err());
        assert!(DiscreteEmissions::from_arc_rows(2, vec![vec![0.5, 0.5]; 2], 1e-9, true).is_err());
        assert!(DiscreteEmissions::from_arc_rows(2, vec![vec![0.5, 0.4]; 3], 1e-9, true).is_err());
        assert!(DiscreteEmissions::from_arc_rows(1, vec![vec![1.5, -0.5]], 1e-9, true).is_err());
        assert!(DiscreteEmissions::flat(2, 4, 0.0, true).is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_symbols() {
        let em = DiscreteEmissions::flat(2, 4, 1e-9, true).unwrap();
        assert!(em.validate(&SymbolSequence::new(vec![0, 3, 1])).is_ok());
        assert!(em.validate(&SymbolSequence::new(vec![0, 4])).is_err());
    }

    #[test]
    fn floor_distribution_keeps_floor_and_unit_sum() {
        let mut row = vec![0.9, 0.052, 0.048, 0.0];
        floor_distribution(&mut row, 0.05);
        assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(row.iter().all(|&p| p >= 0.05));
        // The 0.052 entry drops below the floor once the others are pinned.
        assert_eq!(&row[1..], &[0.05, 0.05, 0.05]);
        assert!((row[0] - 0.85).abs() < 1e-12);
    }

    #[test]
    fn reestimated_rows_respect_floor() {
        use crate::config::HmmConfig;
        use crate::model::DiscreteHmm;

        let config = HmmConfig {
            min_symbol_probability: 0.05,
            ..HmmConfig::with_states(1)
        };
        let model = DiscreteHmm::flat_start(&config, 4).unwrap();
        let seq = SymbolSequence::new(vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        let posteriors = model.posteriors(&seq).unwrap();
        let mut em = model.emissions().clone();
        assert_eq!(em.reestimate(&[(&posteriors, &seq)]).unwrap(), 1);
        let row = em.distribution(0, 0);
        assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(row.iter().all(|&p| p >= 0.05));
        assert_eq!(&row[2..], &[0.05, 0.05]);
    }

    #[test]
    fn reestimate_rejects_mismatched_evidence() {
        use crate::config::HmmConfig;
        use crate::model::DiscreteHmm;

        let model = DiscreteHmm::flat_start(&HmmConfig::with_states(2), 3).unwrap();
        let seq = SymbolSequence::new(vec![0, 1, 2]);
        let posteriors = model.posteriors(&seq).unwrap();
        let mut em = model.emissions().clone();

        let short = SymbolSequence::new(vec![0, 1]);
        assert!(em.reestimate(&[(&posteriors, &short)]).is_err());
        let out_of_range = SymbolSequence::new(vec![0, 1, 3]);
        assert!(em.reestimate(&[(&posteriors, &out_of_range)]).is_err());
        let mut other = DiscreteEmissions::flat(3, 3, 1e-9, true).unwrap();
        assert!(other.reestimate(&[(&posteriors, &seq)]).is_err());
        assert_eq!(&em, model.emissions());
    }

    #[test]
    fn floor_must_leave_room_for_a_distribution() {
        assert!(DiscreteEmissions::flat(2, 4, 0.25, true).is_err());
        assert!(DiscreteEmissions::flat(2, 4, 0.2, true).is_ok());
    }
}
