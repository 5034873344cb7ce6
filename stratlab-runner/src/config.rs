//! Research configuration loaded from TOML.
//!
//! Every table is optional; missing keys take their defaults.
//!
//! ```toml
//! [settings]
//! code = "7203"
//! benchmark_code = "TOPIX"
//!
//! [scoring]
//! sharpe = 0.6
//! calmar = 0.2
//! total_return = 0.2
//!
//! [evolution]
//! population_size = 30
//! generations = 15
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::evaluator::EvaluatorConfig;
use crate::evolution::EvolutionConfig;
use crate::generator::GeneratorConfig;
use crate::scoring::ScoringWeights;
use crate::sequential::SequentialConfig;
use crate::settings::SharedSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("unknown shared-setting override '{0}'")]
    UnknownOverride(String),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Top-level configuration for a research session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub settings: SharedSettings,
    pub scoring: ScoringWeights,
    pub evaluator: EvaluatorConfig,
    pub generator: GeneratorConfig,
    pub evolution: EvolutionConfig,
    pub sequential: SequentialConfig,
}

impl ResearchConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings.validate()?;
        self.scoring.validate()?;
        self.evaluator.validate()?;
        self.generator.validate()?;
        self.evolution.validate()?;
        self.sequential.validate()?;
        Ok(())
    }
}
