//! Pipeline configuration.
//!
//! Everything the core needs is passed in as a [`PipelineConfig`] value;
//! nothing is read from the environment.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::AlignerConfig;
use crate::features::FeatureConfig;
use crate::model::ModelConfig;
use crate::portfolio::OptimizerConfig;
use crate::regime::ThresholdRegimeConfig;
use crate::walkforward::FoldConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete forecasting and allocation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub aligner: AlignerConfig,
    pub features: FeatureConfig,
    /// Threshold rule used when `features.include_regime` is set.
    pub regime: ThresholdRegimeConfig,
    /// Input window length L.
    pub window_len: usize,
    pub model: ModelConfig,
    pub folds: FoldConfig,
    pub optimizer: OptimizerConfig,
    /// Shrinkage intensity applied to the return covariance before allocation.
    pub covariance_shrinkage: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            aligner: AlignerConfig::default(),
            features: FeatureConfig::default(),
            regime: ThresholdRegimeConfig::default(),
            window_len: 20,
            model: ModelConfig::default(),
            folds: FoldConfig::default(),
            optimizer: OptimizerConfig::default(),
            covariance_shrinkage: 0.1,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a TOML document. Missing sections take defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.window_len == 0 {
            return invalid("window_len must be positive".into());
        }
        if self.features.target.trim().is_empty() {
            return invalid("features.target must name a column".into());
        }
        if let Err(e) = self.model.validate() {
            return invalid(e.to_string());
        }
        if let Err(e) = self.folds.validate() {
            return invalid(e.to_string());
        }
        if let Err(e) = self.optimizer.validate() {
            return invalid(e.to_string());
        }
        if self.folds.max_train_len.is_some_and(|max| max <= self.window_len) {
            return invalid(format!(
                "folds.max_train_len must exceed window_len ({})",
                self.window_len
            ));
        }
        if self.folds.initial_train <= self.window_len {
            return invalid(format!(
                "folds.initial_train ({}) must exceed window_len ({})",
                self.folds.initial_train, self.window_len
            ));
        }
        if !(0.0..=1.0).contains(&self.covariance_shrinkage) {
            return invalid(format!(
                "covariance_shrinkage must be in [0, 1], got {}",
                self.covariance_shrinkage
            ));
        }
        Ok(())
    }
}
