//! Database row types for the SurrealDB backend.
//!
//! Converted to/from `storage_traits` types at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::{MetricMap, MetricSnapshot, ModelVersion, RunId, Stage, StorageResult};

/// Serialize chrono DateTime as a native SurrealDB datetime
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Row in `model_versions`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ModelVersionRow {
    #[serde(default, skip_serializing)]
    pub id: Option<surrealdb::sql::Thing>,
    pub name: String,
    pub version: u32,
    pub run_id: String,
    pub metrics: MetricMap,
    pub stage: String,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub stage_updated_at: DateTime<Utc>,
}

impl ModelVersionRow {
    pub fn new(name: &str, version: u32, run_id: &RunId, metrics: MetricMap) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            name: name.to_string(),
            version,
            run_id: run_id.to_string(),
            metrics,
            stage: Stage::None.as_str().to_string(),
            created_at: now,
            stage_updated_at: now,
        }
    }

    pub fn into_model_version(self) -> StorageResult<ModelVersion> {
        let stage = self
            .stage
            .parse::<Stage>()
            .map_err(StorageError::Backend)?;
        Ok(ModelVersion {
            name: self.name,
            version: self.version,
            run_id: RunId(self.run_id),
            metrics: self.metrics,
            stage,
            created_at: self.created_at,
            stage_updated_at: self.stage_updated_at,
        })
    }
}

/// Row in `metric_snapshots`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct MetricSnapshotRow {
    #[serde(default, skip_serializing)]
    pub id: Option<surrealdb::sql::Thing>,
    pub run_id: String,
    pub metrics: MetricMap,
    #[serde(with = "surreal_datetime")]
    pub recorded_at: DateTime<Utc>,
}

impl MetricSnapshotRow {
    pub fn into_snapshot(self) -> MetricSnapshot {
        MetricSnapshot {
            run_id: RunId(self.run_id),
            metrics: self.metrics,
            recorded_at: self.recorded_at,
        }
    }
}
