//! The model façade: scoring, Baum-Welch training, and alignment.
//!
//! # Quick start
//!
//! ```
//! use vox_hmm::{ContinuousHmm, FeatureSequence, HmmConfig};
//!
//! let mut model = ContinuousHmm::with_default_parameters(&HmmConfig::default()).unwrap();
//! let utterance = FeatureSequence::zeros(20, 12);
//!
//! let before = model.evaluate(&utterance).unwrap();
//! assert!(!before.is_zero());
//!
//! model.train(&utterance).unwrap();
//! let after = model.evaluate(&utterance).unwrap();
//! assert!(after.ln() >= before.ln());
//! ```

use tracing::{debug, instrument, warn};
use vox_core::prob::LOG_ZERO;
use vox_core::{Result, Summarizable, VoxError};

use crate::config::{HmmConfig, TrainingConfig, DEFAULT_MEANS, DEFAULT_VARIANCES};
use crate::emission::{DiscreteEmissions, EmissionModel, GaussianEmissions};
use crate::likelihood::Likelihood;
use crate::observation::Observations;
use crate::posterior::ArcPosteriors;
use crate::reestimate::maximize;
use crate::topology::BakisTopology;
use crate::trellis::{self, Alignment, EmissionTable, Trellis};

/// A left-to-right HMM with emissions of type `E`.
///
/// Parameters are mutated in place by [`train`](Self::train); callers sharing
/// one model across threads must serialize training themselves.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HiddenMarkovModel<E> {
    topology: BakisTopology,
    emissions: E,
}

/// HMM over continuous feature frames.
pub type ContinuousHmm = HiddenMarkovModel<GaussianEmissions>;

/// HMM over vector-quantized symbols.
pub type DiscreteHmm = HiddenMarkovModel<DiscreteEmissions>;

impl<E: EmissionModel> HiddenMarkovModel<E> {
    /// Combine a topology with emissions laid out for the same chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the two disagree on the number of states.
    pub fn new(topology: BakisTopology, emissions: E) -> Result<Self> {
        if topology.n_states() != emissions.n_states() {
            return Err(VoxError::InvalidInput(format!(
                "topology has {} states but emissions have {}",
                topology.n_states(),
                emissions.n_states()
            )));
        }
        Ok(Self {
            topology,
            emissions,
        })
    }

    pub fn n_states(&self) -> usize {
        self.topology.n_states()
    }

    pub fn topology(&self) -> &BakisTopology {
        &self.topology
    }

    pub fn emissions(&self) -> &E {
        &self.emissions
    }

    /// Validate `seq` and score every arc at every frame.
    fn prepare(&self, seq: &E::Sequence) -> Result<EmissionTable> {
        if seq.n_frames() == 0 {
            return Err(VoxError::InvalidInput(
                "observation sequence is empty".into(),
            ));
        }
        self.emissions.validate(seq)?;
        Ok(EmissionTable::build(&self.emissions, seq))
    }

    /// Forward and backward tables for `seq`.
    pub fn trellis(&self, seq: &E::Sequence) -> Result<Trellis> {
        let table = self.prepare(seq)?;
        Ok(Trellis::compute(&self.topology, &table, seq.n_frames()))
    }

    /// Arc posteriors for `seq` under the current parameters. Every cell is
    /// absent when the final state is unreachable.
    pub fn posteriors(&self, seq: &E::Sequence) -> Result<ArcPosteriors> {
        let table = self.prepare(seq)?;
        let trellis = Trellis::compute(&self.topology, &table, seq.n_frames());
        Ok(ArcPosteriors::compute(&self.topology, &table, &trellis))
    }

    /// `P(seq | model)` from the forward pass.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty sequence or one the emissions cannot
    /// score. A sequence too short to reach the final state is not an error;
    /// its likelihood is zero.
    #[instrument(skip_all, fields(n_frames = seq.n_frames()))]
    pub fn evaluate(&self, seq: &E::Sequence) -> Result<Likelihood> {
        let table = self.prepare(seq)?;
        let ll = trellis::forward_log_likelihood(&self.topology, &table, seq.n_frames());
        debug!(log_likelihood = ll, "evaluated sequence");
        Ok(Likelihood::from_ln(ll))
    }

    /// Natural-log likelihood of `seq`.
    pub fn log_likelihood(&self, seq: &E::Sequence) -> Result<f64> {
        self.evaluate(seq).map(Likelihood::ln)
    }

    /// One Baum-Welch iteration on `seq`: forward, backward, posteriors, then
    /// an in-place update of transitions and emissions.
    ///
    /// Returns the log-likelihood of `seq` under the parameters *before* the
    /// update. If the final state is unreachable the model is left untouched
    /// and the returned value is negative infinity.
    #[instrument(skip_all, fields(n_frames = seq.n_frames()))]
    pub fn train(&mut self, seq: &E::Sequence) -> Result<f64> {
        let table = self.prepare(seq)?;
        let trellis = Trellis::compute(&self.topology, &table, seq.n_frames());
        let ll = trellis.log_likelihood();
        if ll == LOG_ZERO {
            warn!(
                n_states = self.n_states(),
                "sequence cannot reach the final state; skipping update"
            );
            return Ok(ll);
        }

        let posteriors = ArcPosteriors::compute(&self.topology, &table, &trellis);
        let summary = maximize(&mut self.topology, &mut self.emissions, &[(&posteriors, seq)])?;
        debug!(
            log_likelihood = ll,
            states_updated = summary.states_updated,
            arcs_updated = summary.arcs_updated,
            "reestimated parameters"
        );
        Ok(ll)
    }

    /// Repeated EM iterations on a single sequence.
    ///
    /// Runs `config.max_iter` iterations, or fewer when `config.tolerance` is
    /// positive and the log-likelihood improves by less than it.
    #[instrument(skip_all, fields(max_iter = config.max_iter))]
    pub fn train_repeated(
        &mut self,
        seq: &E::Sequence,
        config: &TrainingConfig,
    ) -> Result<TrainingReport> {
        let mut log_likelihoods = Vec::with_capacity(config.max_iter);
        let mut converged = false;

        for iter in 0..config.max_iter {
            let ll = self.train(seq)?;
            let prev = log_likelihoods.last().copied();
            log_likelihoods.push(ll);
            debug!(iter, log_likelihood = ll, "iteration complete");
            if ll == LOG_ZERO {
                break;
            }
            if let Some(prev) = prev {
                if config.tolerance > 0.0 && (ll - prev).abs() < config.tolerance {
                    converged = true;
                    break;
                }
            }
        }

        Ok(TrainingReport {
            log_likelihoods,
            final_log_likelihood: self.log_likelihood(seq)?,
            converged,
        })
    }

    /// Multi-sequence Baum-Welch over a corpus of utterances.
    ///
    /// Each pass computes posteriors for every utterance under the same
    /// parameters, pools their expected counts, and applies a single update.
    /// The per-pass history holds the summed log-likelihood, under the
    /// parameters in force at the start of the pass, of the utterances that
    /// can reach the final state; it is [`LOG_ZERO`] when none can, in which
    /// case training stops without touching the model.
    ///
    /// Every utterance is validated before the model is touched.
    #[instrument(skip_all, fields(n_utterances = corpus.len(), max_iter = config.max_iter))]
    pub fn train_corpus(
        &mut self,
        corpus: &[E::Sequence],
        config: &TrainingConfig,
    ) -> Result<TrainingReport> {
        if corpus.is_empty() {
            return Err(VoxError::InvalidInput("training corpus is empty".into()));
        }
        for (u, seq) in corpus.iter().enumerate() {
            if seq.n_frames() == 0 {
                return Err(VoxError::InvalidInput(format!(
                    "utterance {u} is empty"
                )));
            }
            self.emissions.validate(seq)?;
        }

        let mut log_likelihoods = Vec::with_capacity(config.max_iter);
        let mut converged = false;
        for pass in 0..config.max_iter {
            let posteriors = corpus
                .iter()
                .map(|seq| self.posteriors(seq))
                .collect::<Result<Vec<_>>>()?;
            let evidence: Vec<_> = posteriors
                .iter()
                .zip(corpus)
                .filter(|(p, _)| p.log_likelihood() != LOG_ZERO)
                .collect();
            let total = sum_reachable(posteriors.iter().map(ArcPosteriors::log_likelihood));
            let prev = log_likelihoods.last().copied();
            log_likelihoods.push(total);

            if evidence.is_empty() {
                warn!(
                    n_states = self.n_states(),
                    "no utterance can reach the final state; skipping update"
                );
                break;
            }

            let summary = maximize(&mut self.topology, &mut self.emissions, &evidence)?;
            debug!(
                pass,
                log_likelihood = total,
                reachable = evidence.len(),
                states_updated = summary.states_updated,
                arcs_updated = summary.arcs_updated,
                "corpus pass complete"
            );
            if let Some(prev) = prev {
                if config.tolerance > 0.0 && (total - prev).abs() < config.tolerance {
                    converged = true;
                    break;
                }
            }
        }

        let final_log_likelihood = sum_reachable(
            corpus
                .iter()
                .map(|seq| self.log_likelihood(seq))
                .collect::<Result<Vec<_>>>()?,
        );

        Ok(TrainingReport {
            log_likelihoods,
            final_log_likelihood,
            converged,
        })
    }

    /// Viterbi alignment of `seq` to the chain. `None` when the sequence is too
    /// short to reach the final state.
    pub fn align(&self, seq: &E::Sequence) -> Result<Option<Alignment>> {
        let table = self.prepare(seq)?;
        Ok(trellis::viterbi(&self.topology, &table, seq.n_frames()))
    }
}

impl ContinuousHmm {
    /// Flat start with the same mean and variance on every arc.
    pub fn flat_start(config: &HmmConfig, mean: &[f64], variance: &[f64]) -> Result<Self> {
        config.validate()?;
        Self::new(
            BakisTopology::flat(config.n_states)?,
            GaussianEmissions::flat(config.n_states, mean, variance, config.variance_floor)?,
        )
    }

    /// Flat start from [`DEFAULT_MEANS`] and [`DEFAULT_VARIANCES`].
    pub fn with_default_parameters(config: &HmmConfig) -> Result<Self> {
        Self::flat_start(config, &DEFAULT_MEANS, &DEFAULT_VARIANCES)
    }

    /// Feature dimensionality `D`.
    pub fn dim(&self) -> usize {
        self.emissions.dim()
    }
}

impl DiscreteHmm {
    /// Flat start with uniform symbol distributions.
    pub fn flat_start(config: &HmmConfig, n_symbols: usize) -> Result<Self> {
        config.validate()?;
        Self::new(
            BakisTopology::flat(config.n_states)?,
            DiscreteEmissions::flat(
                config.n_states,
                n_symbols,
                config.min_symbol_probability,
                config.renormalize_symbols,
            )?,
        )
    }

    /// Alphabet size `K`.
    pub fn n_symbols(&self) -> usize {
        self.emissions.n_symbols()
    }
}

/// Sum of the finite log-likelihoods; [`LOG_ZERO`] when every term is.
fn sum_reachable<I: IntoIterator<Item = f64>>(log_likelihoods: I) -> f64 {
    log_likelihoods
        .into_iter()
        .filter(|&ll| ll != LOG_ZERO)
        .fold(None, |acc, ll| Some(acc.unwrap_or(0.0) + ll))
        .unwrap_or(LOG_ZERO)
}

impl<E: EmissionModel + Summarizable> Summarizable for HiddenMarkovModel<E> {
    fn summary(&self) -> String {
        format!("HMM: states={}; {}", self.n_states(), self.emissions.summary())
    }
}

/// Log-likelihood history of a multi-iteration training run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrainingReport {
    /// Log-likelihood before each iteration's update.
    pub log_likelihoods: Vec<f64>,
    /// Log-likelihood under the final parameters.
    pub final_log_likelihood: f64,
    /// Whether the run stopped on the tolerance rather than `max_iter`.
    pub converged: bool,
}

impl TrainingReport {
    pub fn n_iter(&self) -> usize {
        self.log_likelihoods.len()
    }

    /// Final log-likelihood minus the log-likelihood before the first update.
    ///
    /// Zero when either end is [`LOG_ZERO`], since nothing was learned.
    pub fn improvement(&self) -> f64 {
        match self.log_likelihoods.first() {
            Some(&first) if first != LOG_ZERO && self.final_log_likelihood != LOG_ZERO => {
                self.final_log_likelihood - first
            }
            _ => 0.0,
        }
    }
}

impl Summarizable for TrainingReport {
    fn summary(&self) -> String {
        format!(
            "Training: iterations={}, final log-likelihood={:.4}, improvement={:.4}{}",
            self.n_iter(),
            self.final_log_likelihood,
            self.improvement(),
            if self.converged { ", converged" } else { "" }
        )
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::observation::SymbolSequence;
    use proptest::prelude::*;

    fn symbols(max_len: usize) -> impl Strategy<Value = Vec<usize>> {
        proptest::collection::vec(0usize..4, 3..=max_len)
    }

    proptest! {
        #[test]
        fn forward_equals_backward(obs in symbols(40)) {
            let model = DiscreteHmm::flat_start(&HmmConfig::with_states(3), 4).unwrap();
            let trellis = model.trellis(&SymbolSequence::new(obs)).unwrap();
            let f = trellis.log_likelihood();
            let b = trellis.backward_log_likelihood();
            prop_assert!((f - b).abs() < 1e-9 * f.abs().max(1.0));
        }

        #[test]
        fn posterior_mass_is_one_after_training(obs in symbols(30)) {
            let mut model = DiscreteHmm::flat_start(&HmmConfig::with_states(3), 4).unwrap();
            let seq = SymbolSequence::new(obs);
            model.train(&seq).unwrap();
            let post = model.posteriors(&seq).unwrap();
            for t in 0..post.n_frames() {
                prop_assert!(post.frame_mass(t).abs() < 1e-9);
            }
        }

        #[test]
        fn transition_rows_stay_normalized(obs in symbols(30), iters in 1usize..6) {
            let mut model = DiscreteHmm::flat_start(&HmmConfig::with_states(3), 4).unwrap();
            let seq = SymbolSequence::new(obs);
            for _ in 0..iters {
                model.train(&seq).unwrap();
            }
            for row in model.topology().transition_matrix() {
                prop_assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            }
        }
    }
}
