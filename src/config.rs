use crate::rewrite::LiftRewrite;
use serde::{Deserialize, Serialize};
use std::path::Path;
use strum::IntoEnumIterator;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("max_use_ratio must be positive and finite, got {0}")]
    InvalidMaxUseRatio(f64),
}

/// Which lift rules the equilibrium driver runs, and its firing budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    pub rules: Vec<LiftRewrite>,
    /// Firings allowed per node of the initial graph.
    pub max_use_ratio: f64,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            rules: LiftRewrite::iter().collect(),
            max_use_ratio: 100.0,
        }
    }
}

impl RewriteConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        log::debug!("Loading rewrite config from {}", path.as_ref().display());
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.max_use_ratio.is_finite() || self.max_use_ratio <= 0.0 {
            return Err(ConfigError::InvalidMaxUseRatio(self.max_use_ratio));
        }
        Ok(())
    }
}
