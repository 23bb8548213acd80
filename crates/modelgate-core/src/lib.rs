//! modelgate core library
//!
//! Model version lifecycle for a binary-classification service:
//!
//! - [`ModelRegistry`]: registration, atomic production swap, manual rollback
//! - [`PromotionPolicy`]: automatic promotion when a candidate beats production
//! - [`DriftMonitor`]: bounded live-traffic buffer scored against a reference
//! - [`MetricsExporter`]: Prometheus text exposition for the above
//!
//! Storage is injected through the [`modelgate_state::VersionStore`] trait.

pub mod config;
pub mod domain;
pub mod drift;
pub mod exporter;
pub mod obs;
pub mod promotion;
pub mod registry;
pub mod reporting;
pub mod telemetry;

pub use config::{DriftConfig, LifecycleConfig, PromotionConfig, RegistryConfig, StorageConfig};
pub use domain::{
    numeric_features, FeatureValue, FeatureVector, LifecycleError, Prediction, Result,
    ValidationError,
};
pub use drift::{
    DriftLevel, DriftMonitor, DriftReport, FeatureDrift, FeatureStats, ReferenceDistribution,
};
pub use exporter::{MetricsExporter, TEXT_CONTENT_TYPE};
pub use promotion::{decide, PromotionDecision, PromotionPolicy};
pub use registry::{ModelRegistry, ModelSummary, VersionSummary};
pub use reporting::{render_drift_report_html, write_drift_report_html, write_drift_report_json};
pub use telemetry::init_tracing;

pub use modelgate_state::{
    MetricMap, MetricSnapshot, MetricSnapshotStore, ModelVersion, RunId, Stage, StageTransition,
    VersionStore,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
