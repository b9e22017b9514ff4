//! Core representation engine.
//!
//! This module provides the fundamental SDR structures and operations:
//! - Fixed-topology weighted connections with eligibility traces
//! - Grid neighbourhoods for receptive, recurrent, lateral, predictive and feedback fields
//! - [`SparseLayer`]: settling, competitive inhibition, reconstruction, local learning
//! - [`PredictiveStack`]: layered prediction with surprise-weighted attention
//!
//! ## Settling
//!
//! Each hidden unit integrates its drive with a leaky integrator:
//! ```text
//! p ← p (1 - leak) + leak (e - Σ_j w_ij s_j) + noise U(-1, 1)
//! ```
//! where `e` is the excitation and `s_j` the previous iteration's spikes of
//! competing units. The last `measure` iterations are averaged into the
//! reported activation.

pub mod connection;
pub mod grid;
pub mod predictive;
pub mod sparse_layer;

pub use connection::Connection;
pub use grid::GridSize;
pub use predictive::{Layer, LayerDesc, PredictionNode, PredictiveStack};
pub use sparse_layer::{HiddenNode, LearnParams, SparseLayer, SparseLayerDesc, VisibleNode};

use thiserror::Error;

/// Error type for SDR operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SdrError {
    /// Malformed layer description or simulation parameters
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    /// Caller-supplied vector does not match the field it addresses
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),
    /// Flat or (x, y) index outside a field
    #[error("Index out of bounds: {what} index {index} (len {len})")]
    OutOfBounds {
        what: &'static str,
        index: usize,
        len: usize,
    },
    /// Reading or writing a configuration file failed
    #[error("I/O error: {0}")]
    Io(String),
    /// A configuration file could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),
}

pub type SdrResult<T> = Result<T, SdrError>;

/// Check that a `(min, max)` initialization range is ordered and finite.
pub(crate) fn check_range(name: &str, range: (f32, f32)) -> SdrResult<()> {
    let (min, max) = range;
    if !min.is_finite() || !max.is_finite() {
        return Err(SdrError::InvalidConfig(format!(
            "{name} must be finite, got ({min}, {max})"
        )));
    }
    if min > max {
        return Err(SdrError::InvalidConfig(format!(
            "{name} is inverted: min {min} > max {max}"
        )));
    }
    Ok(())
}

/// Check that a caller-supplied vector matches a field length.
pub(crate) fn check_len(what: &str, got: usize, expected: usize) -> SdrResult<()> {
    if got != expected {
        return Err(SdrError::ShapeMismatch(format!(
            "{what}: expected length {expected}, got {got}"
        )));
    }
    Ok(())
}
