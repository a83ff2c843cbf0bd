//! Runtime configuration loaded from TOML.
//!
//! Every key is optional; an empty file yields the defaults.
//!
//! ```toml
//! expire_time_ms = 180000
//! sweep_interval_ms = 1000
//!
//! [templates.plains]
//! environment_id = "duel_plains"
//! time_of_day = 1000
//! spawns = [{ x = 0, y = 64, z = 0 }, { x = 0, y = 64, z = 16 }]
//! loadout.items = [{ item = "iron_sword" }, { item = "bread", count = 8 }]
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use duelhall_core::{ArenaTemplate, DEFAULT_RESOLVED_RETENTION, EXPIRE_TIME_MS};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuelConfig {
    /// Age at which an unanswered request lapses.
    pub expire_time_ms: u64,
    /// Period of the background expiration sweep.
    pub sweep_interval_ms: u64,
    /// Harm leaving a participant below this vitality ends the duel.
    pub survival_threshold: f64,
    /// Vitality both participants start a duel with.
    pub max_vitality: f64,
    pub max_nourishment: u32,
    /// Resolved sessions kept for lookup, oldest evicted first.
    pub resolved_retention: usize,
    pub templates: BTreeMap<String, ArenaTemplate>,
}

impl Default for DuelConfig {
    fn default() -> Self {
        Self {
            expire_time_ms: EXPIRE_TIME_MS,
            sweep_interval_ms: 1_000,
            survival_threshold: 1.0,
            max_vitality: 20.0,
            max_nourishment: 20,
            resolved_retention: DEFAULT_RESOLVED_RETENTION,
            templates: BTreeMap::new(),
        }
    }
}

impl DuelConfig {
    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.expire_time_ms == 0 {
            return Err(ConfigError::Invalid("expire_time_ms must be positive".into()));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "sweep_interval_ms must be positive".into(),
            ));
        }
        if self.resolved_retention == 0 {
            return Err(ConfigError::Invalid(
                "resolved_retention must be positive".into(),
            ));
        }
        if !self.max_vitality.is_finite() || self.max_vitality <= 0.0 {
            return Err(ConfigError::Invalid(
                "max_vitality must be positive and finite".into(),
            ));
        }
        if !self.survival_threshold.is_finite() {
            return Err(ConfigError::Invalid(
                "survival_threshold must be finite".into(),
            ));
        }
        if self.survival_threshold > self.max_vitality {
            return Err(ConfigError::Invalid(format!(
                "survival_threshold {} exceeds max_vitality {}",
                self.survival_threshold, self.max_vitality
            )));
        }
        for (name, template) in &self.templates {
            template
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("template {name}: {e}")))?;
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn template(&self, name: &str) -> Option<&ArenaTemplate> {
        self.templates.get(name)
    }

    #[must_use]
    pub fn with_template(mut self, name: impl Into<String>, template: ArenaTemplate) -> Self {
        self.templates.insert(name.into(), template);
        self
    }
}
