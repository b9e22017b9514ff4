//! # Predictive SDR
//!
//! Hierarchical recurrent sparse distributed representations for online
//! sequence prediction.
//!
//! ## Overview
//!
//! A stream of discrete symbols is written into the input field one step at a
//! time. Each layer settles a sparse code for its input under lateral
//! inhibition, learns locally (no backpropagation, no batches), and forecasts
//! its own next code from the layer above and its own history. The bottom
//! layer's forecast is decoded into a prediction of the next input.
//!
//! ## Structure
//!
//! - [`core`]: Connections, grid topology, [`SparseLayer`], [`PredictiveStack`]
//! - [`data`]: Alphabet sizing and one-hot coding of a byte corpus
//! - [`training`]: Online sequence driver and metrics
//! - [`config`]: JSON configuration files
//! - [`utils`]: Scalar math helpers

pub mod config;
pub mod core;
pub mod data;
pub mod training;
pub mod utils;

pub use crate::core::{
    Connection, GridSize, HiddenNode, Layer, LayerDesc, LearnParams, PredictionNode,
    PredictiveStack, SdrError, SdrResult, SparseLayer, SparseLayerDesc, VisibleNode,
};
pub use config::StackConfig;
pub use data::Alphabet;
pub use training::{run_sequence, Metrics, SequencePredictor};

use serde::{Deserialize, Serialize};

/// Per-step simulation parameters shared by every layer of a stack.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Settle iterations before measuring
    pub settle_iterations: usize,
    /// Iterations averaged into the reported activation
    pub measure_iterations: usize,
    /// Integrator leak in `[0, 1]`
    pub leak: f32,
    /// Amplitude of uniform noise added to the integrator each iteration
    pub noise: f32,
    pub weight_decay: f32,
    pub max_weight_delta: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            settle_iterations: 20,
            measure_iterations: 4,
            leak: 0.25,
            noise: 0.0,
            weight_decay: 0.0,
            max_weight_delta: 0.5,
        }
    }
}

impl Config {
    /// # Errors
    /// `InvalidConfig` if any parameter is out of range.
    pub fn validate(&self) -> SdrResult<()> {
        let fail = |msg: String| Err(SdrError::InvalidConfig(msg));
        if self.measure_iterations == 0 {
            return fail("measure_iterations must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.leak) {
            return fail(format!("leak must lie in [0, 1], got {}", self.leak));
        }
        if !(self.noise >= 0.0) {
            return fail(format!("noise must be non-negative, got {}", self.noise));
        }
        if !(0.0..1.0).contains(&self.weight_decay) {
            return fail(format!(
                "weight_decay must lie in [0, 1), got {}",
                self.weight_decay
            ));
        }
        if !(self.max_weight_delta > 0.0) {
            return fail(format!(
                "max_weight_delta must be positive, got {}",
                self.max_weight_delta
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_rejects_bad_values() {
        for cfg in [
            Config { measure_iterations: 0, ..Config::default() },
            Config { leak: -0.1, ..Config::default() },
            Config { noise: f32::NAN, ..Config::default() },
            Config { weight_decay: 1.0, ..Config::default() },
            Config { max_weight_delta: 0.0, ..Config::default() },
        ] {
            assert!(cfg.validate().is_err(), "{cfg:?} should be rejected");
        }
    }
}
