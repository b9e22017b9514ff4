//! JSON configuration files for a predictive stack.
//!
//! A [`StackConfig`] carries everything needed to build a stack apart from
//! the input field, which comes from the data. Missing fields fall back to
//! their defaults, so a file may name only what it changes.

use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::{GridSize, LayerDesc, PredictiveStack, SdrError, SdrResult};
use crate::Config;

/// Serializable description of a whole stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Layer descriptors, bottom first
    pub layers: Vec<LayerDesc>,
    /// Per-step simulation parameters
    pub sim: Config,
    pub init_weight_range: (f32, f32),
    pub init_inhibition_range: (f32, f32),
    /// Seed used by the command-line driver when none is given
    pub seed: u64,
}

impl Default for StackConfig {
    fn default() -> Self {
        let layer = |side: usize| LayerDesc {
            width: side,
            height: side,
            ..LayerDesc::default()
        };
        Self {
            layers: vec![layer(16), layer(12), layer(8)],
            sim: Config::default(),
            init_weight_range: (-0.01, 0.01),
            init_inhibition_range: (0.0, 0.05),
            seed: 42,
        }
    }
}

impl StackConfig {
    /// Build a randomly initialized stack over `input_size`.
    ///
    /// # Errors
    /// `InvalidConfig` if any layer or simulation parameter is malformed.
    pub fn build<R: Rng + ?Sized>(&self, input_size: GridSize, rng: &mut R) -> SdrResult<PredictiveStack> {
        PredictiveStack::create_random(
            input_size,
            self.layers.clone(),
            self.init_weight_range,
            self.init_inhibition_range,
            rng,
        )?
        .with_config(self.sim)
    }
}

/// Load a stack configuration from a JSON file.
///
/// # Errors
/// `Io` if the file cannot be read, `Parse` if it is not a valid config.
pub fn load_config(path: &Path) -> SdrResult<StackConfig> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| SdrError::Io(format!("failed to read config from {}: {e}", path.display())))?;
    serde_json::from_str(&json).map_err(|e| SdrError::Parse(format!("{}: {e}", path.display())))
}

/// Save a stack configuration as pretty-printed JSON, creating parent directories.
///
/// # Errors
/// `Io` if the file or its directory cannot be written.
pub fn save_config(config: &StackConfig, path: &Path) -> SdrResult<()> {
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| SdrError::Parse(format!("failed to serialize config: {e}")))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| SdrError::Io(format!("failed to create config directory: {e}")))?;
    }

    std::fs::write(path, json)
        .map_err(|e| SdrError::Io(format!("failed to write config to {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::fs;

    #[test]
    fn test_config_round_trip() {
        let mut config = StackConfig::default();
        config.layers[1].attention_factor = 0.5;
        config.sim.noise = 0.01;
        let dir = std::env::temp_dir().join("sdr_test_config");
        let path = dir.join("stack.json");

        save_config(&config, &path).expect("save");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, config);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = std::env::temp_dir().join("sdr_test_config_partial");
        let path = dir.join("partial.json");
        fs::create_dir_all(&dir).unwrap();
        fs::write(&path, r#"{ "layers": [{ "width": 4, "height": 4 }], "seed": 7 }"#).unwrap();

        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded.seed, 7);
        assert_eq!(loaded.layers.len(), 1);
        assert_eq!(loaded.layers[0].width, 4);
        assert_eq!(loaded.layers[0].sparsity, LayerDesc::default().sparsity);
        assert_eq!(loaded.sim, Config::default());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_save_creates_directory() {
        let root = std::env::temp_dir().join("sdr_test_config_nested");
        let path = root.join("deep").join("path").join("stack.json");
        save_config(&StackConfig::default(), &path).expect("save");
        assert!(path.exists());
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_load_errors() {
        let missing = load_config(Path::new("/nonexistent/stack.json"));
        assert!(matches!(missing, Err(SdrError::Io(_))));

        let dir = std::env::temp_dir().join("sdr_test_config_bad");
        let path = dir.join("bad.json");
        fs::create_dir_all(&dir).unwrap();
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config(&path), Err(SdrError::Parse(_))));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_build_applies_sim_config() {
        let mut config = StackConfig::default();
        config.layers = vec![LayerDesc {
            width: 3,
            height: 3,
            receptive_radius: 1,
            recurrent_radius: 1,
            lateral_radius: 1,
            ..LayerDesc::default()
        }];
        config.sim.settle_iterations = 7;
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let stack = config.build(GridSize::new(2, 2), &mut rng).unwrap();
        assert_eq!(stack.config().settle_iterations, 7);
        assert_eq!(stack.layers().len(), 1);

        config.sim.leak = 2.0;
        assert!(config.build(GridSize::new(2, 2), &mut rng).is_err());
    }
}
