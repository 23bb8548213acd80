//! In-memory implementations of the storage traits
//!
//! Provides `MemoryMetricStore` and `MemoryVersionStore` that satisfy the
//! trait contracts without any external dependencies. Used by tests and by
//! callers that embed modelgate without a database.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::storage_traits::*;

fn lock<T>(mutex: &Mutex<T>) -> StorageResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| StorageError::Backend("in-memory store lock poisoned".to_string()))
}

// ---------------------------------------------------------------------------
// MemoryMetricStore
// ---------------------------------------------------------------------------

/// In-memory metric snapshot store backed by a `HashMap<run_id, snapshot>`.
#[derive(Debug, Default)]
pub struct MemoryMetricStore {
    snapshots: Mutex<HashMap<RunId, MetricSnapshot>>,
}

impl MemoryMetricStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetricSnapshotStore for MemoryMetricStore {
    async fn put_snapshot(
        &self,
        run_id: &RunId,
        metrics: MetricMap,
    ) -> StorageResult<MetricSnapshot> {
        let snapshot = MetricSnapshot {
            run_id: run_id.clone(),
            metrics,
            recorded_at: Utc::now(),
        };
        lock(&self.snapshots)?.insert(run_id.clone(), snapshot.clone());
        Ok(snapshot)
    }

    async fn get_snapshot(&self, run_id: &RunId) -> StorageResult<MetricSnapshot> {
        lock(&self.snapshots)?
            .get(run_id)
            .cloned()
            .ok_or_else(|| StorageError::SnapshotNotFound {
                run_id: run_id.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// MemoryVersionStore
// ---------------------------------------------------------------------------

/// In-memory version store backed by a `HashMap<name, Vec<ModelVersion>>`.
///
/// Versions are kept in registration order, so `versions[n - 1]` is
/// version `n`. A single mutex makes every operation atomic.
#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    models: Mutex<HashMap<String, Vec<ModelVersion>>>,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn slot<'a>(
    models: &'a mut HashMap<String, Vec<ModelVersion>>,
    name: &str,
    version: u32,
) -> StorageResult<&'a mut ModelVersion> {
    let versions = models
        .get_mut(name)
        .ok_or_else(|| StorageError::ModelNotFound {
            name: name.to_string(),
        })?;
    versions
        .iter_mut()
        .find(|v| v.version == version)
        .ok_or_else(|| StorageError::VersionNotFound {
            name: name.to_string(),
            version,
        })
}

#[async_trait]
impl VersionStore for MemoryVersionStore {
    async fn insert_version(
        &self,
        name: &str,
        run_id: &RunId,
        metrics: MetricMap,
    ) -> StorageResult<ModelVersion> {
        if metrics.is_empty() {
            return Err(StorageError::EmptyMetrics {
                run_id: run_id.to_string(),
            });
        }

        let mut models = lock(&self.models)?;
        let versions = models.entry(name.to_string()).or_default();
        if let Some(existing) = versions.iter().find(|v| &v.run_id == run_id) {
            return Err(StorageError::DuplicateRun {
                name: name.to_string(),
                run_id: run_id.to_string(),
                version: existing.version,
            });
        }

        let next = versions.iter().map(|v| v.version).max().unwrap_or(0) + 1;
        let now = Utc::now();
        let record = ModelVersion {
            name: name.to_string(),
            version: next,
            run_id: run_id.clone(),
            metrics,
            stage: Stage::None,
            created_at: now,
            stage_updated_at: now,
        };
        versions.push(record.clone());
        Ok(record)
    }

    async fn get_version(&self, name: &str, version: u32) -> StorageResult<ModelVersion> {
        let mut models = lock(&self.models)?;
        slot(&mut models, name, version).map(|v| v.clone())
    }

    async fn find_by_run(&self, run_id: &RunId) -> StorageResult<ModelVersion> {
        let models = lock(&self.models)?;
        models
            .values()
            .flatten()
            .filter(|v| &v.run_id == run_id)
            .max_by_key(|v| v.created_at)
            .cloned()
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }

    async fn list_versions(&self, name: &str) -> StorageResult<Vec<ModelVersion>> {
        let models = lock(&self.models)?;
        let mut versions = models.get(name).cloned().unwrap_or_default();
        versions.sort_by_key(|v| v.version);
        Ok(versions)
    }

    async fn list_names(&self) -> StorageResult<Vec<String>> {
        let models = lock(&self.models)?;
        let mut names: Vec<String> = models
            .iter()
            .filter(|(_, versions)| !versions.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn swap_production(
        &self,
        name: &str,
        expected_current: Option<u32>,
        target: u32,
    ) -> StorageResult<StageTransition> {
        let mut models = lock(&self.models)?;

        // Validate the target before touching anything.
        slot(&mut models, name, target)?;

        let versions = models
            .get_mut(name)
            .ok_or_else(|| StorageError::ModelNotFound {
                name: name.to_string(),
            })?;
        let current = versions
            .iter()
            .find(|v| v.stage == Stage::Production)
            .map(|v| v.version);
        if current != expected_current {
            return Err(StorageError::Conflict {
                name: name.to_string(),
                expected: expected_current,
                actual: current,
            });
        }

        let now = Utc::now();
        let mut demoted = None;
        for v in versions.iter_mut() {
            if v.stage == Stage::Production && v.version != target {
                v.stage = Stage::Archived;
                v.stage_updated_at = now;
                demoted = Some(v.clone());
            }
        }

        let promoted = versions
            .iter_mut()
            .find(|v| v.version == target)
            .ok_or_else(|| StorageError::VersionNotFound {
                name: name.to_string(),
                version: target,
            })?;
        if promoted.stage != Stage::Production {
            promoted.stage = Stage::Production;
            promoted.stage_updated_at = now;
        }

        Ok(StageTransition {
            promoted: promoted.clone(),
            demoted,
        })
    }

    async fn set_stage(
        &self,
        name: &str,
        version: u32,
        stage: Stage,
    ) -> StorageResult<ModelVersion> {
        if stage == Stage::Production {
            return Err(StorageError::InvalidTransition {
                name: name.to_string(),
                version,
                reason: "production is only reachable through swap_production".to_string(),
            });
        }

        let mut models = lock(&self.models)?;
        let record = slot(&mut models, name, version)?;
        if record.stage != Stage::None && stage == Stage::None {
            return Err(StorageError::InvalidTransition {
                name: name.to_string(),
                version,
                reason: format!("cannot return a {} version to None", record.stage),
            });
        }
        if record.stage != stage {
            record.stage = stage;
            record.stage_updated_at = Utc::now();
        }
        Ok(record.clone())
    }
}
