//! Configuration loading for the overlay engine
//!
//! Resolution follows a fixed priority order:
//! 1. Explicit path passed by the composing application (highest)
//! 2. `CHEFAR_CONFIG` environment variable
//! 3. Compiled defaults (fallback)
//!
//! After loading, `GEMINI_API_KEY` from the environment overrides the
//! configured inference API key.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Environment variable naming an alternate config file path.
pub const CONFIG_ENV_VAR: &str = "CHEFAR_CONFIG";

/// Environment variable carrying the inference API key.
pub const API_KEY_ENV_VAR: &str = "GEMINI_API_KEY";

/// Multimodal inference service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    /// Upper bound on one inference round trip; an unbounded call would
    /// block that step's overlay indefinitely.
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.0-flash-lite".to_string(),
            api_key: String::new(),
            timeout_secs: 30,
        }
    }
}

/// Object detection and localization tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Detections at or below this confidence are discarded.
    pub confidence_threshold: f32,
    /// Exponential blend weight toward the newest raw position sample.
    pub smoothing_weight: f32,
    /// Raw estimates farther than this (world units) from the previous
    /// smoothed position are rejected as single-frame glitches.
    pub outlier_gate_distance: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            smoothing_weight: 0.2,
            outlier_gate_distance: 0.2,
        }
    }
}

/// Asset cache sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub cache_capacity: usize,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self { cache_capacity: 10 }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub inference: InferenceConfig,
    pub detection: DetectionConfig,
    pub assets: AssetConfig,
}

impl EngineConfig {
    /// Load configuration following the priority order above.
    ///
    /// A missing file at the resolved path is an error when the path was
    /// explicit, and falls through to defaults when it came from the
    /// environment.
    pub fn load(explicit_path: Option<&Path>) -> Result<EngineConfig> {
        let mut config = if let Some(path) = explicit_path {
            Self::from_file(path)?
        } else if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(env_path);
            if path.exists() {
                Self::from_file(&path)?
            } else {
                tracing::warn!(path = %path.display(), "{} points at a missing file, using defaults", CONFIG_ENV_VAR);
                EngineConfig::default()
            }
        } else {
            EngineConfig::default()
        };

        if let Ok(key) = std::env::var(API_KEY_ENV_VAR) {
            if !key.is_empty() {
                config.inference.api_key = key;
            }
        }

        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<EngineConfig> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        tracing::info!(path = %path.display(), "Loaded engine configuration");
        Ok(config)
    }
}
