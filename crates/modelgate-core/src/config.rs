//! Runtime configuration.
//!
//! Loaded from a TOML file (every key optional), then overridden by
//! `MODELGATE_*` environment variables, then validated.
//!
//! ```toml
//! [registry]
//! max_lock_attempts = 3
//! lock_timeout_ms = 250
//!
//! [promotion]
//! metric = "auc"
//! higher_is_better = true
//! max_attempts = 3
//!
//! [drift]
//! buffer_capacity = 1000
//! high_drift_threshold = 0.1
//! reference_sample_limit = 1000
//! default_model_version = "unknown"
//!
//! [storage]
//! path = ".modelgate/db"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{LifecycleError, Result};

/// Per-name write serialization in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Lock acquisition attempts before `ConcurrentModification`
    pub max_lock_attempts: u32,
    /// Wait per attempt, in milliseconds
    pub lock_timeout_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_lock_attempts: 3,
            lock_timeout_ms: 250,
        }
    }
}

impl RegistryConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionConfig {
    /// Metric compared by default when callers do not name one
    pub metric: String,
    pub higher_is_better: bool,
    /// Read-compare-transition cycles before surfacing a conflict
    pub max_attempts: u32,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            metric: "auc".to_string(),
            higher_is_better: true,
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Live-traffic FIFO size
    pub buffer_capacity: usize,
    /// Scores strictly above this are flagged as high drift
    pub high_drift_threshold: f64,
    /// Rows of the historical sample used to build the reference
    pub reference_sample_limit: usize,
    /// `model_version` label used by `DriftMonitor::record`
    pub default_model_version: String,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 1000,
            high_drift_threshold: 0.1,
            reference_sample_limit: 1000,
            default_model_version: "unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Local SurrealKV directory
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".modelgate/db"),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub registry: RegistryConfig,
    pub promotion: PromotionConfig,
    pub drift: DriftConfig,
    pub storage: StorageConfig,
}

impl LifecycleConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| LifecycleError::Config(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| LifecycleError::Config(format!("read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    /// Load `path` if given, apply environment overrides, validate.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `MODELGATE_*` environment overrides.
    ///
    /// Recognised: `MODELGATE_DB_PATH`, `MODELGATE_PROMOTION_METRIC`,
    /// `MODELGATE_PROMOTION_MAX_ATTEMPTS`, `MODELGATE_DRIFT_BUFFER_CAPACITY`,
    /// `MODELGATE_DRIFT_THRESHOLD`, `MODELGATE_LOCK_TIMEOUT_MS`.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MODELGATE_DB_PATH") {
            self.storage.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("MODELGATE_PROMOTION_METRIC") {
            self.promotion.metric = v;
        }
        if let Some(v) = lookup("MODELGATE_PROMOTION_MAX_ATTEMPTS") {
            self.promotion.max_attempts = parse_env("MODELGATE_PROMOTION_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("MODELGATE_DRIFT_BUFFER_CAPACITY") {
            self.drift.buffer_capacity = parse_env("MODELGATE_DRIFT_BUFFER_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("MODELGATE_DRIFT_THRESHOLD") {
            self.drift.high_drift_threshold = parse_env("MODELGATE_DRIFT_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("MODELGATE_LOCK_TIMEOUT_MS") {
            self.registry.lock_timeout_ms = parse_env("MODELGATE_LOCK_TIMEOUT_MS", &v)?;
        }
        Ok(())
    }

    /// Reject values the components cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.drift.buffer_capacity == 0 {
            return Err(LifecycleError::Config(
                "drift.buffer_capacity must be greater than 0".to_string(),
            ));
        }
        let t = self.drift.high_drift_threshold;
        if !(t > 0.0 && t <= 1.0) {
            return Err(LifecycleError::Config(format!(
                "drift.high_drift_threshold must be in (0, 1], got {t}"
            )));
        }
        if self.promotion.max_attempts == 0 {
            return Err(LifecycleError::Config(
                "promotion.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.registry.max_lock_attempts == 0 {
            return Err(LifecycleError::Config(
                "registry.max_lock_attempts must be at least 1".to_string(),
            ));
        }
        if self.promotion.metric.trim().is_empty() {
            return Err(LifecycleError::Config(
                "promotion.metric must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| LifecycleError::Config(format!("{key}: cannot parse '{raw}'")))
}
