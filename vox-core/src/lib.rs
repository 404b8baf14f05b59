//! Shared primitives for the vox speech-model crates.
//!
//! `vox-core` provides the foundation the model crates build on:
//!
//! - **Error types**: [`VoxError`] and [`Result`] for structured error handling
//! - **Log-domain arithmetic**: [`prob`] functions and [`LogProb`] for
//!   probabilities that survive long products without underflow
//! - **Traits**: small cross-crate abstractions like [`Summarizable`]

pub mod error;
pub mod prob;
pub mod traits;

pub use error::{Result, VoxError};
pub use prob::LogProb;
pub use traits::*;
