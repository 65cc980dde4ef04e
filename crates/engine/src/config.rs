//! Engine configuration.
//!
//! Every section falls back to its defaults, so an empty TOML file (or no
//! file at all) yields the reference tuning.
//!
//! ```toml
//! [transitions]
//! epsilon = 0.2
//!
//! [maintenance]
//! interval_secs = 600
//! ```

use crate::error::{EngineError, Result};
use agents::CollaborativeConfig;
use pipeline::{FeatureConfig, FusionConfig, QuickPickConfig};
use profile_model::ProfileConfig;
use sequence::{SkipConfig, TransitionConfig};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub interval_secs: u64,
    /// Minimum history vectors before the external model is retrained
    pub training_min_samples: usize,
    /// Drop catalog songs whose backing file has disappeared
    pub remove_missing_files: bool,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            training_min_samples: 5,
            remove_missing_files: true,
        }
    }
}

impl MaintenanceConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Budget for one external score before it counts as missing
    pub external_timeout_ms: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            external_timeout_ms: 250,
        }
    }
}

impl ScoringConfig {
    pub fn external_timeout(&self) -> Duration {
        Duration::from_millis(self.external_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub transitions: TransitionConfig,
    pub skips: SkipConfig,
    pub features: FeatureConfig,
    pub fusion: FusionConfig,
    pub quick_picks: QuickPickConfig,
    pub collaborative: CollaborativeConfig,
    pub profile: ProfileConfig,
    pub maintenance: MaintenanceConfig,
    pub scoring: ScoringConfig,
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(content).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| EngineError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.transitions.validate()?;
        self.skips.validate()?;
        if !(self.features.recency_half_life_days > 0.0) {
            return Err(EngineError::Config(
                "features.recency_half_life_days must be positive".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.fusion.external_confidence_gate) {
            return Err(EngineError::Config(
                "fusion.external_confidence_gate must be in [0, 100]".to_string(),
            ));
        }
        if self.quick_picks.history_capacity == 0 || !(self.quick_picks.bucket_width > 0.0) {
            return Err(EngineError::Config(
                "quick_picks needs a non-zero history and a positive bucket width".to_string(),
            ));
        }
        if self.collaborative.top_k == 0 {
            return Err(EngineError::Config("collaborative.top_k must be non-zero".to_string()));
        }
        Ok(())
    }
}
