//! SurrealDB schema initialization
//!
//! Idempotent: safe to run on every connection.

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StateError;
use crate::Result;

/// Initialize all modelgate tables.
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing modelgate SurrealDB schema");

    init_model_versions_table(db).await?;
    init_metric_snapshots_table(db).await?;

    info!("modelgate schema initialization complete");
    Ok(())
}

/// Initialize `model_versions`
///
/// Schema:
/// ```text
/// TABLE model_versions {
///   name:              STRING
///   version:           INT     (unique per name)
///   run_id:            STRING  (unique per name)
///   metrics:           OBJECT
///   stage:             STRING  (None | Production | Archived)
///   created_at:        DATETIME
///   stage_updated_at:  DATETIME
/// }
/// ```
///
/// Records are never deleted.
async fn init_model_versions_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing model_versions table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS model_versions
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_name_version ON TABLE model_versions COLUMNS name, version UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_name_run_id ON TABLE model_versions COLUMNS name, run_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_run_id ON TABLE model_versions COLUMNS run_id;
        DEFINE INDEX IF NOT EXISTS idx_name_stage ON TABLE model_versions COLUMNS name, stage;
    "#;

    db.query(sql)
        .await
        .and_then(|r| r.check())
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    debug!("model_versions table initialized");
    Ok(())
}

/// Initialize `metric_snapshots` (one row per training run)
async fn init_metric_snapshots_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing metric_snapshots table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS metric_snapshots
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete FULL;

        DEFINE INDEX IF NOT EXISTS idx_snapshot_run_id ON TABLE metric_snapshots COLUMNS run_id UNIQUE;
    "#;

    db.query(sql)
        .await
        .and_then(|r| r.check())
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    debug!("metric_snapshots table initialized");
    Ok(())
}
