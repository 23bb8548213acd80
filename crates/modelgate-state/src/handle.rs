//! SurrealDB Handle - Connection management
//!
//! Supports an in-memory engine (tests, ephemeral runs), a local
//! `surrealkv://` file store (the durable default for operator tooling) and
//! any URL understood by `surrealdb::engine::any`.

use std::path::Path;

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{info, instrument};

use crate::error::StateError;
use crate::migrations;
use crate::Result;

/// Default namespace / database selected after connecting.
pub const DEFAULT_NAMESPACE: &str = "modelgate";
pub const DEFAULT_DATABASE: &str = "registry";

/// SurrealDB connection handle for modelgate
#[derive(Clone)]
pub struct SurrealHandle {
    db: Surreal<Any>,
}

impl SurrealHandle {
    /// Connect to an in-memory database and set up the schema.
    #[instrument(skip_all)]
    pub async fn in_memory() -> Result<Self> {
        Self::connect("mem://").await
    }

    /// Open (or create) a durable local store at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open_local(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(|e| {
            StateError::Connection(format!(
                "Failed to create database directory {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::connect(&format!("surrealkv://{}", path.display())).await
    }

    /// Connect to any SurrealDB endpoint URL.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to SurrealDB");

        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        db.use_ns(DEFAULT_NAMESPACE)
            .use_db(DEFAULT_DATABASE)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;

        info!("SurrealDB connected and schema initialized");
        Ok(SurrealHandle { db })
    }

    /// Connect using environment variables.
    ///
    /// If `MODELGATE_SURREAL_URL` is set, connects to that URL. Otherwise
    /// opens the local store at `default_path`.
    pub async fn from_env(default_path: impl AsRef<Path>) -> Result<Self> {
        match std::env::var("MODELGATE_SURREAL_URL") {
            Ok(url) => Self::connect(&url).await,
            Err(_) => Self::open_local(default_path).await,
        }
    }

    pub(crate) fn db(&self) -> &Surreal<Any> {
        &self.db
    }
}
