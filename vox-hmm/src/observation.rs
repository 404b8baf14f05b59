//! Observation sequences: one feature vector (or codebook symbol) per frame.
//!
//! Both types are built once per utterance and never mutated afterwards, so a
//! model can borrow them for the duration of a train or evaluate call.

use vox_core::{Result, VoxError};

/// Anything with a number of frames that an emission model can score.
pub trait Observations {
    /// Number of frames `T`.
    fn n_frames(&self) -> usize;
}

/// A sequence of `T` continuous feature frames of dimension `D`, stored
/// row-major as one flat `Vec<f64>` of length `T * D`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureSequence {
    dim: usize,
    data: Vec<f64>,
}

impl FeatureSequence {
    /// Build from one `Vec<f64>` per frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frames are ragged, zero-dimensional, or contain
    /// non-finite values.
    pub fn new(frames: Vec<Vec<f64>>) -> Result<Self> {
        let dim = frames.first().map_or(0, Vec::len);
        if dim == 0 && !frames.is_empty() {
            return Err(VoxError::InvalidInput(
                "feature dimension must be > 0".into(),
            ));
        }
        let mut data = Vec::with_capacity(frames.len() * dim);
        for (t, frame) in frames.into_iter().enumerate() {
            if frame.len() != dim {
                return Err(VoxError::InvalidInput(format!(
                    "frame {t} has dimension {}, expected {dim}",
                    frame.len()
                )));
            }
            data.extend(frame);
        }
        Self::from_flat(dim, data)
    }

    /// Build from a flat row-major buffer of `T * dim` values.
    ///
    /// # Errors
    ///
    /// Returns an error if `dim` is zero, the buffer length is not a multiple
    /// of `dim`, or any value is NaN or infinite.
    pub fn from_flat(dim: usize, data: Vec<f64>) -> Result<Self> {
        if dim == 0 && !data.is_empty() {
            return Err(VoxError::InvalidInput(
                "feature dimension must be > 0".into(),
            ));
        }
        if dim > 0 && data.len() % dim != 0 {
            return Err(VoxError::InvalidInput(format!(
                "buffer length {} is not a multiple of dimension {dim}",
                data.len()
            )));
        }
        if let Some(pos) = data.iter().position(|v| !v.is_finite()) {
            return Err(VoxError::InvalidInput(format!(
                "non-finite feature value at frame {}, component {}",
                pos / dim,
                pos % dim
            )));
        }
        Ok(Self { dim, data })
    }

    /// Build from integer frames as produced by a fixed-point cepstral
    /// front-end.
    pub fn from_int_frames(frames: &[Vec<i32>]) -> Result<Self> {
        Self::new(
            frames
                .iter()
                .map(|f| f.iter().map(|&v| f64::from(v)).collect())
                .collect(),
        )
    }

    /// A sequence of `len` all-zero frames.
    pub fn zeros(len: usize, dim: usize) -> Self {
        Self {
            dim,
            data: vec![0.0; len * dim],
        }
    }

    /// Number of frames `T`.
    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    /// Whether the sequence has no frames.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Feature dimensionality `D`.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The feature vector at frame `t`.
    pub fn frame(&self, t: usize) -> &[f64] {
        &self.data[t * self.dim..(t + 1) * self.dim]
    }

    /// Iterate over frames in time order.
    pub fn frames(&self) -> impl Iterator<Item = &[f64]> {
        // chunks_exact panics on zero; an empty sequence has no frames anyway.
        self.data.chunks_exact(self.dim.max(1))
    }
}

impl Observations for FeatureSequence {
    fn n_frames(&self) -> usize {
        self.len()
    }
}

/// A sequence of `T` vector-quantized symbol IDs.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SymbolSequence {
    symbols: Vec<usize>,
}

impl SymbolSequence {
    pub fn new(symbols: Vec<usize>) -> Self {
        Self { symbols }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Codebook class at frame `t`.
    pub fn symbol(&self, t: usize) -> usize {
        self.symbols[t]
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.symbols
    }
}

impl Observations for SymbolSequence {
    fn n_frames(&self) -> usize {
        self.len()
    }
}

impl From<Vec<usize>> for SymbolSequence {
    fn from(symbols: Vec<usize>) -> Self {
        Self::new(symbols)
    }
}
