//! modelgate-state: persistence layer for the model registry
//!
//! This crate owns everything that touches storage: the lifecycle `Stage`
//! enum, `ModelVersion` records, metric snapshots written by training jobs,
//! and the async store traits the registry is built on.
//!
//! ## Key Components
//!
//! - `VersionStore`: version allocation, stage changes, atomic production swap
//! - `MetricSnapshotStore`: `run_id -> metrics` written by training jobs
//! - `fakes`: in-memory implementations of both traits
//! - `SurrealVersionStore`: SurrealDB implementation (`mem://` or `surrealkv://`)

mod error;
pub mod fakes;
mod handle;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use handle::{SurrealHandle, DEFAULT_DATABASE, DEFAULT_NAMESPACE};
pub use storage_traits::{
    MetricMap, MetricSnapshot, MetricSnapshotStore, ModelVersion, RunId, Stage, StageTransition,
    StorageResult, VersionStore,
};
pub use surreal_store::SurrealVersionStore;

/// Result type for connection and schema operations
pub type Result<T> = std::result::Result<T, StateError>;
