//! Observability tests for model lifecycle tracing.
//!
//! These tests check that the structured events fire with their `event`
//! field for registration, promotion decisions, stage transitions, conflicts
//! and drift computation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use modelgate_core::obs::{
    emit_drift_computed, emit_promotion_decided, emit_stage_transition, emit_transition_conflict,
    emit_version_registered, promotion_span,
};
use modelgate_core::{
    DriftConfig, DriftMonitor, FeatureStats, FeatureVector, MetricMap, ModelRegistry, Prediction,
    PromotionPolicy, ReferenceDistribution, RunId,
};
use modelgate_state::fakes::MemoryVersionStore;
use tracing::Instrument;
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_emit_version_registered_logs_model_and_version() {
    emit_version_registered("noshow", 3, "abc123", 4);
    assert!(logs_contain("version.registered"));
    assert!(logs_contain("model=noshow"));
}

#[traced_test]
#[test]
fn test_emit_promotion_decided_logs_compared_values() {
    emit_promotion_decided("noshow", 3, "auc", Some(0.85), Some((1, 0.70)), true);
    assert!(logs_contain("promotion.decided"));
    assert!(logs_contain("candidate_value=Some(0.85)"));
    assert!(logs_contain("incumbent_value=Some(0.7)"));
}

#[traced_test]
#[test]
fn test_emit_stage_transition_and_conflict() {
    emit_stage_transition("noshow", 1, "Production", "Archived");
    emit_transition_conflict("noshow", 1, 3, "production changed from none to v2");
    assert!(logs_contain("stage.transition"));
    assert!(logs_contain("stage.conflict"));
}

#[traced_test]
#[test]
fn test_emit_drift_computed() {
    emit_drift_computed(50, 2, 1);
    assert!(logs_contain("drift.computed"));
}

#[traced_test]
#[tokio::test]
async fn test_promotion_span_wraps_events() {
    async { emit_version_registered("noshow", 1, "run-1", 1) }
        .instrument(promotion_span("noshow", "run-1"))
        .await;
    assert!(logs_contain("modelgate.promotion"));
}

#[traced_test]
#[tokio::test]
async fn test_auto_promote_emits_decision_and_transition() {
    let registry = Arc::new(ModelRegistry::new(Arc::new(MemoryVersionStore::new())));
    let policy = PromotionPolicy::new(Arc::clone(&registry));
    let run = RunId::from("run-obs");
    registry
        .register("noshow", &run, MetricMap::from([("auc".to_string(), 0.7)]))
        .await
        .unwrap();
    policy.auto_promote(&run).await.unwrap();

    assert!(logs_contain("version.registered"));
    assert!(logs_contain("promotion.decided"));
    assert!(logs_contain("stage.transition"));
}

#[traced_test]
#[test]
fn test_compute_drift_emits_summary() {
    let reference = ReferenceDistribution::from_stats(BTreeMap::from([(
        "age".to_string(),
        FeatureStats {
            mean: 40.0,
            std: 10.0,
        },
    )]));
    let monitor = DriftMonitor::new(reference, DriftConfig::default()).unwrap();
    monitor.record(
        &FeatureVector::from([("age".to_string(), 70.0.into())]),
        Prediction::Show,
        Duration::ZERO,
    );
    monitor.compute_drift();
    assert!(logs_contain("drift.computed"));
    assert!(logs_contain("high_drift=1"));
}
