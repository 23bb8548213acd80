//! Domain-level error taxonomy for modelgate.

use modelgate_state::StorageError;

/// Errors produced by input validation.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("metrics for run {run_id} are empty")]
    EmptyMetrics { run_id: String },

    #[error("metric {metric} for run {run_id} is not a finite number")]
    NonFiniteMetric { run_id: String, metric: String },

    #[error("run {run_id} is already registered for {name} as v{version}")]
    DuplicateRun {
        name: String,
        run_id: String,
        version: u32,
    },

    #[error("{name} v{version} has no metric '{metric}'")]
    MissingMetric {
        name: String,
        version: u32,
        metric: String,
    },

    #[error("invalid stage change for {name} v{version}: {reason}")]
    InvalidStage {
        name: String,
        version: u32,
        reason: String,
    },

    #[error("model name must not be empty")]
    EmptyName,
}

/// modelgate domain errors.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("concurrent modification of {name}: {detail}")]
    ConcurrentModification { name: String, detail: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LifecycleError {
    /// Whether retrying the whole read-compare-transition sequence may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LifecycleError::ConcurrentModification { .. } | LifecycleError::Storage(_)
        )
    }
}

impl From<StorageError> for LifecycleError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ModelNotFound { name } => {
                LifecycleError::NotFound(format!("model {name}"))
            }
            StorageError::VersionNotFound { name, version } => {
                LifecycleError::NotFound(format!("{name} v{version}"))
            }
            StorageError::RunNotFound { run_id } => {
                LifecycleError::NotFound(format!("registered version for run {run_id}"))
            }
            StorageError::SnapshotNotFound { run_id } => {
                LifecycleError::NotFound(format!("metric snapshot for run {run_id}"))
            }
            StorageError::DuplicateRun {
                name,
                run_id,
                version,
            } => ValidationError::DuplicateRun {
                name,
                run_id,
                version,
            }
            .into(),
            StorageError::EmptyMetrics { run_id } => {
                ValidationError::EmptyMetrics { run_id }.into()
            }
            StorageError::InvalidTransition {
                name,
                version,
                reason,
            } => ValidationError::InvalidStage {
                name,
                version,
                reason,
            }
            .into(),
            StorageError::Conflict {
                name,
                expected,
                actual,
            } => LifecycleError::ConcurrentModification {
                detail: format!(
                    "production changed from {} to {}",
                    fmt_version(expected),
                    fmt_version(actual)
                ),
                name,
            },
            StorageError::Backend(msg) => LifecycleError::Storage(msg),
        }
    }
}

fn fmt_version(v: Option<u32>) -> String {
    v.map(|v| format!("v{v}"))
        .unwrap_or_else(|| "none".to_string())
}

/// Result type for modelgate domain operations.
pub type Result<T> = std::result::Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_map_onto_taxonomy() {
        let err: LifecycleError = StorageError::VersionNotFound {
            name: "noshow".to_string(),
            version: 4,
        }
        .into();
        assert!(matches!(err, LifecycleError::NotFound(ref m) if m == "noshow v4"));

        let err: LifecycleError = StorageError::EmptyMetrics {
            run_id: "r1".to_string(),
        }
        .into();
        assert!(matches!(
            err,
            LifecycleError::Validation(ValidationError::EmptyMetrics { .. })
        ));

        let err: LifecycleError = StorageError::Backend("disk full".to_string()).into();
        assert!(matches!(err, LifecycleError::Storage(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn conflict_carries_both_versions() {
        let err: LifecycleError = StorageError::Conflict {
            name: "noshow".to_string(),
            expected: None,
            actual: Some(3),
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("noshow"));
        assert!(msg.contains("none"));
        assert!(msg.contains("v3"));
        assert!(err.is_retryable());
    }

    #[test]
    fn missing_metric_names_the_version() {
        let err = LifecycleError::from(ValidationError::MissingMetric {
            name: "noshow".to_string(),
            version: 2,
            metric: "auc".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "validation error: noshow v2 has no metric 'auc'"
        );
        assert!(!err.is_retryable());
    }
}
