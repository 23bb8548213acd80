//! Storage trait definitions for modelgate
//!
//! These traits define the core storage abstractions:
//! - `MetricSnapshotStore`: run id -> evaluation metrics written by training jobs
//! - `VersionStore`: registered model versions and their lifecycle stage
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Flat metric name -> value mapping captured for a training run.
pub type MetricMap = BTreeMap<String, f64>;

// ---------------------------------------------------------------------------
// Identifiers and stages
// ---------------------------------------------------------------------------

/// Opaque reference to the training run that produced an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        RunId(id.into())
    }

    /// Generate a random run id for callers without a tracking server.
    pub fn generate() -> Self {
        RunId(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 8 chars), as printed in registry listings.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        RunId(s.to_string())
    }
}

/// Lifecycle stage of a model version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Registered, never promoted
    None,
    /// Actively serving; at most one per model name
    Production,
    /// Superseded or rolled back, retained for history
    Archived,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::None => "None",
            Stage::Production => "Production",
            Stage::Archived => "Archived",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Stage::None),
            "production" => Ok(Stage::Production),
            "archived" => Ok(Stage::Archived),
            other => Err(format!(
                "unknown stage '{other}' (expected None, Production or Archived)"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// MetricSnapshotStore
// ---------------------------------------------------------------------------

/// Metrics logged by a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub run_id: RunId,
    pub metrics: MetricMap,
    pub recorded_at: DateTime<Utc>,
}

/// Durable `run_id -> metrics` association written by external training jobs.
#[async_trait]
pub trait MetricSnapshotStore: Send + Sync {
    /// Store (or replace) the metrics for a run.
    async fn put_snapshot(&self, run_id: &RunId, metrics: MetricMap)
        -> StorageResult<MetricSnapshot>;

    /// Fetch the metrics for a run. Returns `SnapshotNotFound` if absent.
    async fn get_snapshot(&self, run_id: &RunId) -> StorageResult<MetricSnapshot>;
}

// ---------------------------------------------------------------------------
// VersionStore
// ---------------------------------------------------------------------------

/// One registration of a trained artifact. Only `stage` (and its timestamp)
/// ever changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Model family identifier
    pub name: String,
    /// Strictly increasing per name, never reused
    pub version: u32,
    pub run_id: RunId,
    /// Metrics captured at registration time
    pub metrics: MetricMap,
    pub stage: Stage,
    pub created_at: DateTime<Utc>,
    pub stage_updated_at: DateTime<Utc>,
}

impl ModelVersion {
    /// Metric value, if present and finite.
    pub fn metric(&self, metric_name: &str) -> Option<f64> {
        self.metrics
            .get(metric_name)
            .copied()
            .filter(|v| v.is_finite())
    }

    pub fn is_production(&self) -> bool {
        self.stage == Stage::Production
    }
}

/// Outcome of an atomic production swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTransition {
    /// The version now in `Production`
    pub promoted: ModelVersion,
    /// The previous production version, now `Archived`
    pub demoted: Option<ModelVersion>,
}

/// Model version store.
///
/// Guarantees:
/// - Version numbers per name are `max + 1`, allocated inside the store.
/// - At most one version per name is `Production` after any call returns.
/// - `swap_production` is the only way into `Production`, and it is a
///   compare-and-swap against the production version the caller observed.
/// - Nothing is ever deleted.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Register a new version in stage `None`.
    ///
    /// Fails with `EmptyMetrics` or `DuplicateRun`.
    async fn insert_version(
        &self,
        name: &str,
        run_id: &RunId,
        metrics: MetricMap,
    ) -> StorageResult<ModelVersion>;

    /// Fetch one version. `ModelNotFound` / `VersionNotFound` if absent.
    async fn get_version(&self, name: &str, version: u32) -> StorageResult<ModelVersion>;

    /// Resolve the version registered for a run. `RunNotFound` if absent.
    async fn find_by_run(&self, run_id: &RunId) -> StorageResult<ModelVersion>;

    /// All versions of a model, ascending by version. Empty if unknown.
    async fn list_versions(&self, name: &str) -> StorageResult<Vec<ModelVersion>>;

    /// All model names with at least one version, sorted.
    async fn list_names(&self) -> StorageResult<Vec<String>>;

    /// Archive the current production version (if any) and promote `target`
    /// in one atomic step.
    ///
    /// Fails with `Conflict` if the current production version differs from
    /// `expected_current`. Promoting the version that is already in
    /// production is a no-op with `demoted = None`.
    async fn swap_production(
        &self,
        name: &str,
        expected_current: Option<u32>,
        target: u32,
    ) -> StorageResult<StageTransition>;

    /// Override the stage of a single version (manual rollback path).
    ///
    /// `Stage::Production` is rejected with `InvalidTransition`, as is moving
    /// an `Archived` or `Production` version back to `Stage::None`.
    async fn set_stage(&self, name: &str, version: u32, stage: Stage)
        -> StorageResult<ModelVersion>;
}
