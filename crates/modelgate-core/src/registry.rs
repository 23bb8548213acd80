//! Version Registry: invariant-preserving access to registered model versions.
//!
//! `ModelRegistry` wraps an injected [`VersionStore`] and serializes every
//! mutation per model name through a writer lock. Independent names never
//! contend. The store itself guarantees that a production swap is atomic and
//! rejects a swap whose expected production version is stale, so the lock is
//! the first line of serialization and the compare-and-swap the last.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as WriterLock, OwnedMutexGuard};
use tracing::debug;

use modelgate_state::{
    MetricMap, MetricSnapshotStore, ModelVersion, RunId, Stage, StageTransition, VersionStore,
};

use crate::config::RegistryConfig;
use crate::domain::{LifecycleError, Result, ValidationError};
use crate::exporter::MetricsExporter;
use crate::obs;

/// One line of the registry listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub version: u32,
    pub stage: Stage,
    /// First 8 characters of the run id
    pub run: String,
}

impl fmt::Display for VersionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{} - Stage: {}, Run: {}", self.version, self.stage, self.run)
    }
}

/// A model with all its versions, ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub name: String,
    pub production: Option<u32>,
    pub versions: Vec<VersionSummary>,
}

impl ModelSummary {
    fn from_versions(name: String, versions: &[ModelVersion]) -> Self {
        Self {
            production: versions.iter().find(|v| v.is_production()).map(|v| v.version),
            versions: versions
                .iter()
                .map(|v| VersionSummary {
                    version: v.version,
                    stage: v.stage,
                    run: v.run_id.short().to_string(),
                })
                .collect(),
            name,
        }
    }
}

/// Registry of model versions backed by a [`VersionStore`].
pub struct ModelRegistry<S> {
    store: Arc<S>,
    config: RegistryConfig,
    writers: parking_lot::Mutex<HashMap<String, Arc<WriterLock<()>>>>,
    exporter: Option<Arc<MetricsExporter>>,
}

impl<S> ModelRegistry<S>
where
    S: VersionStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, RegistryConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: RegistryConfig) -> Self {
        Self {
            store,
            config,
            writers: parking_lot::Mutex::new(HashMap::new()),
            exporter: None,
        }
    }

    /// Publish promoted versions' metrics to `exporter`.
    pub fn with_exporter(mut self, exporter: Arc<MetricsExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Register a new version of `name` in stage `None`.
    ///
    /// The version number is `max + 1` for the name, or 1 for a new name.
    pub async fn register(
        &self,
        name: &str,
        run_id: &RunId,
        metrics: MetricMap,
    ) -> Result<ModelVersion> {
        validate_registration(name, run_id, &metrics)?;

        let _writer = self.acquire(name).await?;
        let registered = self.store.insert_version(name, run_id, metrics).await?;

        obs::emit_version_registered(
            &registered.name,
            registered.version,
            registered.run_id.as_str(),
            registered.metrics.len(),
        );
        Ok(registered)
    }

    /// Register `run_id` using the metrics its training job logged.
    pub async fn register_from_snapshot<M>(
        &self,
        name: &str,
        run_id: &RunId,
        snapshots: &M,
    ) -> Result<ModelVersion>
    where
        M: MetricSnapshotStore + ?Sized,
    {
        let snapshot = snapshots.get_snapshot(run_id).await?;
        self.register(name, run_id, snapshot.metrics).await
    }

    /// Atomically archive the current production version (if any) and
    /// promote `version`.
    ///
    /// Promoting the version that is already in production is a no-op.
    pub async fn transition_to_production(
        &self,
        name: &str,
        version: u32,
    ) -> Result<StageTransition> {
        let _writer = self.acquire(name).await?;
        let current = self.current_production(name).await?;
        self.commit_swap(name, current, version).await
    }

    /// Like [`Self::transition_to_production`], but fails with
    /// `ConcurrentModification` unless the production version is still
    /// `expected_current` at commit time.
    pub async fn transition_if_current(
        &self,
        name: &str,
        expected_current: Option<u32>,
        version: u32,
    ) -> Result<StageTransition> {
        let _writer = self.acquire(name).await?;
        self.commit_swap(name, expected_current, version).await
    }

    /// Manual rollback: make `version` the single production version,
    /// archiving whatever currently serves.
    pub async fn reset_to_version(&self, name: &str, version: u32) -> Result<StageTransition> {
        debug!(model = %name, version, "resetting production");
        self.transition_to_production(name, version).await
    }

    /// Override the stage of one version.
    ///
    /// Only `Archived` is accepted. Production is reachable only through the
    /// atomic swap, and archival is terminal.
    pub async fn demote(&self, name: &str, version: u32, to_stage: Stage) -> Result<ModelVersion> {
        let reason = match to_stage {
            Stage::Archived => None,
            Stage::Production => Some("use transition_to_production to promote"),
            Stage::None => Some("a version cannot be returned to None"),
        };
        if let Some(reason) = reason {
            return Err(ValidationError::InvalidStage {
                name: name.to_string(),
                version,
                reason: reason.to_string(),
            }
            .into());
        }

        let _writer = self.acquire(name).await?;
        let before = self.store.get_version(name, version).await?;
        let after = self.store.set_stage(name, version, to_stage).await?;

        if before.stage != after.stage {
            obs::emit_stage_transition(name, version, before.stage.as_str(), after.stage.as_str());
        }
        Ok(after)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// The version of `name` in `stage`.
    ///
    /// `Production` has at most one match. For `None` and `Archived` the most
    /// recently created match is returned.
    pub async fn get_by_stage(&self, name: &str, stage: Stage) -> Result<ModelVersion> {
        let versions = self.store.list_versions(name).await?;
        if versions.is_empty() {
            return Err(LifecycleError::NotFound(format!("model {name}")));
        }
        versions
            .into_iter()
            .filter(|v| v.stage == stage)
            .max_by_key(|v| (v.created_at, v.version))
            .ok_or_else(|| LifecycleError::NotFound(format!("{name} in stage {stage}")))
    }

    /// The production version of `name`, if one exists.
    pub async fn production_version(&self, name: &str) -> Result<Option<ModelVersion>> {
        let versions = self.store.list_versions(name).await?;
        Ok(versions.into_iter().find(|v| v.is_production()))
    }

    pub async fn get_version(&self, name: &str, version: u32) -> Result<ModelVersion> {
        Ok(self.store.get_version(name, version).await?)
    }

    /// Resolve the version registered for a training run.
    pub async fn find_by_run(&self, run_id: &RunId) -> Result<ModelVersion> {
        Ok(self.store.find_by_run(run_id).await?)
    }

    pub async fn list_versions(&self, name: &str) -> Result<Vec<ModelVersion>> {
        Ok(self.store.list_versions(name).await?)
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        Ok(self.store.list_names().await?)
    }

    /// Every model with its versions and stages.
    pub async fn status(&self) -> Result<Vec<ModelSummary>> {
        let mut out = Vec::new();
        for name in self.store.list_names().await? {
            let versions = self.store.list_versions(&name).await?;
            out.push(ModelSummary::from_versions(name, &versions));
        }
        Ok(out)
    }

    /// Summary of a single model. `NotFound` if it has no versions.
    pub async fn model_status(&self, name: &str) -> Result<ModelSummary> {
        let versions = self.store.list_versions(name).await?;
        if versions.is_empty() {
            return Err(LifecycleError::NotFound(format!("model {name}")));
        }
        Ok(ModelSummary::from_versions(name.to_string(), &versions))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn current_production(&self, name: &str) -> Result<Option<u32>> {
        Ok(self.production_version(name).await?.map(|v| v.version))
    }

    /// Caller holds the writer lock for `name`.
    async fn commit_swap(
        &self,
        name: &str,
        expected_current: Option<u32>,
        version: u32,
    ) -> Result<StageTransition> {
        let target = self.store.get_version(name, version).await?;
        let transition = self
            .store
            .swap_production(name, expected_current, version)
            .await?;

        if let Some(demoted) = &transition.demoted {
            obs::emit_stage_transition(
                name,
                demoted.version,
                Stage::Production.as_str(),
                demoted.stage.as_str(),
            );
        }
        if target.stage != Stage::Production {
            obs::emit_stage_transition(
                name,
                version,
                target.stage.as_str(),
                Stage::Production.as_str(),
            );
        }
        self.publish_performance(&transition.promoted);
        Ok(transition)
    }

    fn publish_performance(&self, promoted: &ModelVersion) {
        if let Some(exporter) = &self.exporter {
            let label = promoted.version.to_string();
            for (metric, value) in &promoted.metrics {
                if value.is_finite() {
                    exporter.set_performance(&label, metric, *value);
                }
            }
        }
    }

    /// Take the writer lock for `name`, waiting at most `lock_timeout` per
    /// attempt for `max_lock_attempts` attempts.
    async fn acquire(&self, name: &str) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut writers = self.writers.lock();
            Arc::clone(writers.entry(name.to_string()).or_default())
        };

        let max = self.config.max_lock_attempts.max(1);
        for attempt in 1..=max {
            match tokio::time::timeout(self.config.lock_timeout(), Arc::clone(&lock).lock_owned())
                .await
            {
                Ok(guard) => return Ok(guard),
                Err(_) => obs::emit_transition_conflict(name, attempt, max, "writer lock busy"),
            }
        }
        Err(LifecycleError::ConcurrentModification {
            name: name.to_string(),
            detail: format!("writer lock not acquired after {max} attempts"),
        })
    }
}

fn validate_registration(name: &str, run_id: &RunId, metrics: &MetricMap) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName.into());
    }
    if metrics.is_empty() {
        return Err(ValidationError::EmptyMetrics {
            run_id: run_id.to_string(),
        }
        .into());
    }
    if let Some((metric, _)) = metrics.iter().find(|(_, v)| !v.is_finite()) {
        return Err(ValidationError::NonFiniteMetric {
            run_id: run_id.to_string(),
            metric: metric.clone(),
        }
        .into());
    }
    Ok(())
}
