//! Plain-text dump of a trained continuous model.
//!
//! A model is stored as three whitespace-separated numeric matrices:
//!
//! - transitions: `N` rows of `N` linear probabilities, zero off the band
//! - means: one row of `D` values per legal arc, in arc-index order
//!   `(0,0), (0,1), (1,1), …, (N-1,N-1)`
//! - variances: same layout as the means
//!
//! Blank lines and lines starting with `#` are ignored when parsing.

use std::io::Write;

use vox_core::{Result, VoxError};

use crate::emission::GaussianEmissions;
use crate::model::ContinuousHmm;
use crate::topology::BakisTopology;

/// Parse a whitespace-separated numeric matrix from a string.
///
/// # Errors
///
/// Returns an error if a value does not parse as `f64` or a row's width
/// differs from the first row's, with line number context.
///
/// # Examples
///
/// ```
/// # use vox_hmm::state_io::parse_matrix_str;
/// let rows = parse_matrix_str("# transitions\n0.5 0.5\n0 1\n").unwrap();
/// assert_eq!(rows, vec![vec![0.5, 0.5], vec![0.0, 1.0]]);
/// ```
pub fn parse_matrix_str(data: &str) -> Result<Vec<Vec<f64>>> {
    let mut rows: Vec<Vec<f64>> = Vec::new();

    for (line_idx, line) in data.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let row = line
            .split_whitespace()
            .map(|field| {
                field.parse::<f64>().map_err(|_| {
                    VoxError::Parse(format!("line {}: invalid value '{}'", line_idx + 1, field))
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        if let Some(first) = rows.first() {
            if row.len() != first.len() {
                return Err(VoxError::Parse(format!(
                    "line {}: expected {} values, found {}",
                    line_idx + 1,
                    first.len(),
                    row.len()
                )));
            }
        }
        rows.push(row);
    }

    Ok(rows)
}

/// Write a numeric matrix to a string, one tab-separated row per line.
pub fn write_matrix_string(rows: &[Vec<f64>]) -> String {
    let mut out = String::new();
    for row in rows {
        let line: Vec<String> = row.iter().map(f64::to_string).collect();
        out.push_str(&line.join("\t"));
        out.push('\n');
    }
    out
}

/// Write a numeric matrix to any writer.
pub fn write_matrix<W: Write>(writer: &mut W, rows: &[Vec<f64>]) -> Result<()> {
    writer.write_all(write_matrix_string(rows).as_bytes())?;
    Ok(())
}

impl ContinuousHmm {
    /// Transition matrix in the dump format.
    pub fn transition_dump(&self) -> String {
        write_matrix_string(&self.topology().transition_matrix())
    }

    /// Per-arc means in the dump format.
    pub fn means_dump(&self) -> String {
        write_matrix_string(&self.emissions().mean_rows())
    }

    /// Per-arc variances in the dump format.
    pub fn variances_dump(&self) -> String {
        write_matrix_string(&self.emissions().variance_rows())
    }

    /// Rebuild a model from the three dumps.
    ///
    /// # Errors
    ///
    /// Returns a parse error for malformed text, and an input error if the
    /// matrices violate the chain's structure (off-band transitions, rows not
    /// summing to one, wrong arc count, non-positive variances).
    pub fn from_state_dump(
        transitions: &str,
        means: &str,
        variances: &str,
        variance_floor: f64,
    ) -> Result<Self> {
        let topology = BakisTopology::from_transition_matrix(&parse_matrix_str(transitions)?)?;
        let emissions = GaussianEmissions::from_arc_rows(
            topology.n_states(),
            parse_matrix_str(means)?,
            parse_matrix_str(variances)?,
            variance_floor,
        )?;
        Self::new(topology, emissions)
    }
}
