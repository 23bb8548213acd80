//! SurrealDB-backed implementations of [`VersionStore`] and
//! [`MetricSnapshotStore`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use surrealdb::sql::Datetime as SurrealDatetime;
use tracing::{debug, instrument};

use crate::error::StorageError;
use crate::schema::{MetricSnapshotRow, ModelVersionRow};
use crate::storage_traits::{
    MetricMap, MetricSnapshot, MetricSnapshotStore, ModelVersion, RunId, Stage, StageTransition,
    StorageResult, VersionStore,
};
use crate::SurrealHandle;

const CONFLICT_MARKER: &str = "modelgate:production_conflict";

const SWAP_PRODUCTION_SQL: &str = r#"
    BEGIN TRANSACTION;
    LET $current = (SELECT VALUE version FROM model_versions WHERE name = $name AND stage = 'Production');
    IF $current != $expected { THROW "modelgate:production_conflict" };
    UPDATE model_versions SET stage = 'Archived', stage_updated_at = $now
        WHERE name = $name AND stage = 'Production' AND version != $target;
    UPDATE model_versions SET stage = 'Production', stage_updated_at = $now
        WHERE name = $name AND version = $target AND stage != 'Production';
    COMMIT TRANSACTION;
"#;

fn backend(err: surrealdb::Error) -> StorageError {
    StorageError::Backend(err.to_string())
}

/// SurrealDB-backed model version and metric snapshot store.
#[derive(Clone)]
pub struct SurrealVersionStore {
    handle: Arc<SurrealHandle>,
}

impl SurrealVersionStore {
    pub fn new(handle: Arc<SurrealHandle>) -> Self {
        Self { handle }
    }

    /// Convenience constructor over a fresh in-memory database.
    pub async fn in_memory() -> crate::Result<Self> {
        Ok(Self::new(Arc::new(SurrealHandle::in_memory().await?)))
    }

    async fn rows_for(&self, name: &str) -> StorageResult<Vec<ModelVersionRow>> {
        let mut res = self
            .handle
            .db()
            .query("SELECT * FROM model_versions WHERE name = $name ORDER BY version ASC")
            .bind(("name", name.to_string()))
            .await
            .map_err(backend)?;
        res.take(0).map_err(backend)
    }

    /// Archive the current production version and promote `target` in one
    /// transaction, aborting if production is no longer `expected_current`.
    async fn commit_swap(
        &self,
        name: &str,
        expected_current: Option<u32>,
        target: u32,
    ) -> StorageResult<()> {
        let expected: Vec<u32> = expected_current.into_iter().collect();
        let outcome = self
            .handle
            .db()
            .query(SWAP_PRODUCTION_SQL)
            .bind(("name", name.to_string()))
            .bind(("expected", expected))
            .bind(("target", target))
            .bind(("now", SurrealDatetime::from(Utc::now())))
            .await;

        // An aborted transaction reports the THROW on its own statement and
        // "not executed" on every other one.
        let mut errors: Vec<(usize, surrealdb::Error)> = match outcome {
            Ok(mut response) => response.take_errors().into_iter().collect(),
            Err(err) => vec![(0, err)],
        };
        if errors.is_empty() {
            return Ok(());
        }
        errors.sort_by_key(|(index, _)| *index);

        let thrown = errors
            .iter()
            .any(|(_, e)| e.to_string().contains(CONFLICT_MARKER));
        let actual = self.production_of(name).await?;
        if thrown || actual != expected_current {
            return Err(StorageError::Conflict {
                name: name.to_string(),
                expected: expected_current,
                actual,
            });
        }
        let (_, first) = errors.swap_remove(0);
        Err(backend(first))
    }

    async fn production_of(&self, name: &str) -> StorageResult<Option<u32>> {
        let mut res = self
            .handle
            .db()
            .query(
                "SELECT VALUE version FROM model_versions \
                 WHERE name = $name AND stage = 'Production'",
            )
            .bind(("name", name.to_string()))
            .await
            .map_err(backend)?;
        let versions: Vec<u32> = res.take(0).map_err(backend)?;
        Ok(versions.into_iter().next())
    }
}

#[async_trait]
impl VersionStore for SurrealVersionStore {
    #[instrument(skip(self, metrics), fields(name = %name, run_id = %run_id))]
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

        let existing = self.rows_for(name).await?;
        if let Some(dup) = existing.iter().find(|r| r.run_id == run_id.as_str()) {
            return Err(StorageError::DuplicateRun {
                name: name.to_string(),
                run_id: run_id.to_string(),
                version: dup.version,
            });
        }
        let next = existing.iter().map(|r| r.version).max().unwrap_or(0) + 1;

        // The unique (name, version) index rejects a concurrent writer that
        // allocated the same number.
        let row = ModelVersionRow::new(name, next, run_id, metrics);
        let created: Option<ModelVersionRow> = self
            .handle
            .db()
            .create("model_versions")
            .content(row)
            .await
            .map_err(backend)?;

        debug!(version = next, "model version inserted");
        created
            .ok_or_else(|| StorageError::Backend("failed to create model version".to_string()))?
            .into_model_version()
    }

    async fn get_version(&self, name: &str, version: u32) -> StorageResult<ModelVersion> {
        let rows = self.rows_for(name).await?;
        if rows.is_empty() {
            return Err(StorageError::ModelNotFound {
                name: name.to_string(),
            });
        }
        rows.into_iter()
            .find(|r| r.version == version)
            .ok_or_else(|| StorageError::VersionNotFound {
                name: name.to_string(),
                version,
            })?
            .into_model_version()
    }

    async fn find_by_run(&self, run_id: &RunId) -> StorageResult<ModelVersion> {
        let mut res = self
            .handle
            .db()
            .query(
                "SELECT * FROM model_versions WHERE run_id = $run_id \
                 ORDER BY created_at DESC LIMIT 1",
            )
            .bind(("run_id", run_id.to_string()))
            .await
            .map_err(backend)?;
        let rows: Vec<ModelVersionRow> = res.take(0).map_err(backend)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.to_string(),
            })?
            .into_model_version()
    }

    async fn list_versions(&self, name: &str) -> StorageResult<Vec<ModelVersion>> {
        self.rows_for(name)
            .await?
            .into_iter()
            .map(ModelVersionRow::into_model_version)
            .collect()
    }

    async fn list_names(&self) -> StorageResult<Vec<String>> {
        let mut res = self
            .handle
            .db()
            .query("SELECT VALUE name FROM model_versions")
            .await
            .map_err(backend)?;
        let mut names: Vec<String> = res.take(0).map_err(backend)?;
        names.sort();
        names.dedup();
        Ok(names)
    }

    #[instrument(skip(self), fields(name = %name))]
    async fn swap_production(
        &self,
        name: &str,
        expected_current: Option<u32>,
        target: u32,
    ) -> StorageResult<StageTransition> {
        let target_row = self.get_version(name, target).await?;
        let current = self.production_of(name).await?;
        if current != expected_current {
            return Err(StorageError::Conflict {
                name: name.to_string(),
                expected: expected_current,
                actual: current,
            });
        }

        self.commit_swap(name, expected_current, target).await?;

        let demoted = match current {
            Some(v) if v != target => Some(self.get_version(name, v).await?),
            _ => None,
        };
        let promoted = self.get_version(name, target_row.version).await?;
        Ok(StageTransition { promoted, demoted })
    }

    #[instrument(skip(self), fields(name = %name, stage = %stage))]
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

        let record = self.get_version(name, version).await?;
        if record.stage == stage {
            return Ok(record);
        }
        if stage == Stage::None {
            return Err(StorageError::InvalidTransition {
                name: name.to_string(),
                version,
                reason: format!("cannot return a {} version to None", record.stage),
            });
        }

        self.handle
            .db()
            .query(
                "UPDATE model_versions SET stage = $stage, stage_updated_at = $now \
                 WHERE name = $name AND version = $version",
            )
            .bind(("name", name.to_string()))
            .bind(("version", version))
            .bind(("stage", stage.as_str().to_string()))
            .bind(("now", SurrealDatetime::from(Utc::now())))
            .await
            .and_then(|r| r.check())
            .map_err(backend)?;

        self.get_version(name, version).await
    }
}

#[async_trait]
impl MetricSnapshotStore for SurrealVersionStore {
    async fn put_snapshot(
        &self,
        run_id: &RunId,
        metrics: MetricMap,
    ) -> StorageResult<MetricSnapshot> {
        let row = MetricSnapshotRow {
            id: None,
            run_id: run_id.to_string(),
            metrics,
            recorded_at: Utc::now(),
        };

        self.handle
            .db()
            .query(
                r#"
                BEGIN TRANSACTION;
                DELETE metric_snapshots WHERE run_id = $run_id;
                CREATE metric_snapshots CONTENT $row;
                COMMIT TRANSACTION;
                "#,
            )
            .bind(("run_id", run_id.to_string()))
            .bind(("row", row.clone()))
            .await
            .and_then(|r| r.check())
            .map_err(backend)?;

        Ok(row.into_snapshot())
    }

    async fn get_snapshot(&self, run_id: &RunId) -> StorageResult<MetricSnapshot> {
        let mut res = self
            .handle
            .db()
            .query("SELECT * FROM metric_snapshots WHERE run_id = $run_id LIMIT 1")
            .bind(("run_id", run_id.to_string()))
            .await
            .map_err(backend)?;
        let rows: Vec<MetricSnapshotRow> = res.take(0).map_err(backend)?;
        rows.into_iter()
            .next()
            .map(MetricSnapshotRow::into_snapshot)
            .ok_or_else(|| StorageError::SnapshotNotFound {
                run_id: run_id.to_string(),
            })
    }
}
