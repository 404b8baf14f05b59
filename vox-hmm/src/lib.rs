//! Left-to-right hidden Markov models for isolated-word speech recognition.
//!
//! `vox-hmm` scores and trains Bakis-topology HMMs over feature sequences:
//!
//! - **Topology**: [`BakisTopology`], where each state loops or advances one
//!   state and emissions are attached to arcs
//! - **Emissions**: diagonal [`GaussianEmissions`] over continuous frames and
//!   [`DiscreteEmissions`] over vector-quantized symbols
//! - **Trellis**: log-domain forward, backward, and Viterbi passes with
//!   explicit unreachable cells
//! - **Training**: Baum-Welch reestimation from [`ArcPosteriors`], single
//!   step, repeated, or over a corpus
//! - **State dump**: [`state_io`] text matrices for transitions, means, and
//!   variances
//!
//! Every probability inside the engine is a natural logarithm, so sequences of
//! hundreds of frames never underflow. [`HiddenMarkovModel::evaluate`] returns
//! a [`Likelihood`] that can be reported even when the linear value is far
//! below the smallest `f64`.

pub mod config;
pub mod emission;
pub mod likelihood;
pub mod model;
pub mod observation;
pub mod posterior;
pub mod reestimate;
pub mod state_io;
pub mod topology;
pub mod trellis;

pub use config::{HmmConfig, TrainingConfig};
pub use emission::{DiscreteEmissions, EmissionModel, Evidence, GaussianEmissions};
pub use likelihood::Likelihood;
pub use model::{ContinuousHmm, DiscreteHmm, HiddenMarkovModel, TrainingReport};
pub use observation::{FeatureSequence, Observations, SymbolSequence};
pub use posterior::{pooled_occupancy, ArcPosteriors};
pub use reestimate::ReestimationSummary;
pub use topology::BakisTopology;
pub use trellis::{Alignment, Trellis};
