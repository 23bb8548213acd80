//! Error types for modelgate-state

use thiserror::Error;

/// Errors raised while connecting to or preparing the backing database.
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

/// Errors returned by the storage traits.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// No versions have ever been registered under this model name
    #[error("model not found: {name}")]
    ModelNotFound { name: String },

    /// The model exists but the requested version does not
    #[error("model version not found: {name} v{version}")]
    VersionNotFound { name: String, version: u32 },

    /// No version or snapshot references this run id
    #[error("no record for run: {run_id}")]
    RunNotFound { run_id: String },

    /// No metric snapshot has been written for the run
    #[error("metric snapshot not found for run: {run_id}")]
    SnapshotNotFound { run_id: String },

    /// The run id is already registered under the model name
    #[error("run {run_id} is already registered for model {name} as v{version}")]
    DuplicateRun {
        name: String,
        run_id: String,
        version: u32,
    },

    /// Registration attempted with an empty metrics map
    #[error("metrics for run {run_id} are empty")]
    EmptyMetrics { run_id: String },

    /// Compare-and-swap failed: production changed since it was read
    #[error(
        "production version of {name} changed: expected {expected:?}, found {actual:?}"
    )]
    Conflict {
        name: String,
        expected: Option<u32>,
        actual: Option<u32>,
    },

    /// Requested stage change is not permitted on this path
    #[error("invalid stage transition for {name} v{version}: {reason}")]
    InvalidTransition {
        name: String,
        version: u32,
        reason: String,
    },

    /// Backend (database) failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        StorageError::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_names_both_versions() {
        let err = StorageError::Conflict {
            name: "noshow".to_string(),
            expected: Some(1),
            actual: Some(2),
        };
        let msg = err.to_string();
        assert!(msg.contains("noshow"));
        assert!(msg.contains("Some(1)"));
        assert!(msg.contains("Some(2)"));
    }

    #[test]
    fn state_error_converts_to_backend() {
        let err: StorageError = StateError::Connection("refused".to_string()).into();
        assert!(matches!(err, StorageError::Backend(ref m) if m.contains("refused")));
    }
}
