//! Trait contract tests for VersionStore and MetricSnapshotStore.
//!
//! Every check runs against the in-memory fakes and against SurrealDB
//! (`mem://`). Any conforming implementation must pass these.

use modelgate_state::fakes::{MemoryMetricStore, MemoryVersionStore};
use modelgate_state::storage_traits::*;
use modelgate_state::{StorageError, SurrealVersionStore};

fn metrics(auc: f64) -> MetricMap {
    let mut m = MetricMap::new();
    m.insert("auc".to_string(), auc);
    m.insert("f1".to_string(), auc / 2.0);
    m
}

fn production_count(versions: &[ModelVersion]) -> usize {
    versions.iter().filter(|v| v.stage == Stage::Production).count()
}

// ===========================================================================
// VersionStore contracts
// ===========================================================================

async fn versions_are_allocated_sequentially(store: &dyn VersionStore) {
    for (i, run) in ["r1", "r2", "r3"].iter().enumerate() {
        let v = store
            .insert_version("noshow", &RunId::from(*run), metrics(0.7))
            .await
            .unwrap();
        assert_eq!(v.version, i as u32 + 1);
        assert_eq!(v.stage, Stage::None);
    }

    // Independent name starts at 1
    let other = store
        .insert_version("churn", &RunId::from("r1"), metrics(0.6))
        .await
        .unwrap();
    assert_eq!(other.version, 1);

    let listed = store.list_versions("noshow").await.unwrap();
    let numbers: Vec<u32> = listed.iter().map(|v| v.version).collect();
    assert_eq!(numbers, vec![1, 2, 3]);

    assert_eq!(
        store.list_names().await.unwrap(),
        vec!["churn".to_string(), "noshow".to_string()]
    );
}

async fn duplicate_run_and_empty_metrics_are_rejected(store: &dyn VersionStore) {
    store
        .insert_version("noshow", &RunId::from("r1"), metrics(0.7))
        .await
        .unwrap();

    let err = store
        .insert_version("noshow", &RunId::from("r1"), metrics(0.8))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::DuplicateRun { version: 1, .. }));

    let err = store
        .insert_version("noshow", &RunId::from("r2"), MetricMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::EmptyMetrics { .. }));

    // Failed registrations consume no version numbers
    let next = store
        .insert_version("noshow", &RunId::from("r3"), metrics(0.9))
        .await
        .unwrap();
    assert_eq!(next.version, 2);
}

async fn lookups_report_not_found(store: &dyn VersionStore) {
    let err = store.get_version("ghost", 1).await.unwrap_err();
    assert!(matches!(err, StorageError::ModelNotFound { .. }));

    store
        .insert_version("noshow", &RunId::from("r1"), metrics(0.7))
        .await
        .unwrap();
    let err = store.get_version("noshow", 9).await.unwrap_err();
    assert!(matches!(err, StorageError::VersionNotFound { version: 9, .. }));

    let err = store.find_by_run(&RunId::from("nope")).await.unwrap_err();
    assert!(matches!(err, StorageError::RunNotFound { .. }));

    let found = store.find_by_run(&RunId::from("r1")).await.unwrap();
    assert_eq!((found.name.as_str(), found.version), ("noshow", 1));
    assert!(store.list_versions("ghost").await.unwrap().is_empty());
}

async fn swap_archives_previous_production(store: &dyn VersionStore) {
    for run in ["r1", "r2"] {
        store
            .insert_version("noshow", &RunId::from(run), metrics(0.7))
            .await
            .unwrap();
    }

    let first = store.swap_production("noshow", None, 1).await.unwrap();
    assert_eq!(first.promoted.version, 1);
    assert_eq!(first.promoted.stage, Stage::Production);
    assert!(first.demoted.is_none());

    let second = store.swap_production("noshow", Some(1), 2).await.unwrap();
    assert_eq!(second.promoted.version, 2);
    let demoted = second.demoted.expect("v1 demoted");
    assert_eq!(demoted.version, 1);
    assert_eq!(demoted.stage, Stage::Archived);

    let all = store.list_versions("noshow").await.unwrap();
    assert_eq!(production_count(&all), 1);
    assert_eq!(all[0].stage, Stage::Archived);
    assert_eq!(all[1].stage, Stage::Production);
}

async fn swap_rejects_stale_expectation(store: &dyn VersionStore) {
    for run in ["r1", "r2", "r3"] {
        store
            .insert_version("noshow", &RunId::from(run), metrics(0.7))
            .await
            .unwrap();
    }
    store.swap_production("noshow", None, 1).await.unwrap();

    let err = store.swap_production("noshow", None, 2).await.unwrap_err();
    assert_eq!(
        err,
        StorageError::Conflict {
            name: "noshow".to_string(),
            expected: None,
            actual: Some(1),
        }
    );

    // Nothing changed
    let all = store.list_versions("noshow").await.unwrap();
    assert_eq!(production_count(&all), 1);
    assert_eq!(all[0].stage, Stage::Production);
    assert_eq!(all[1].stage, Stage::None);

    let err = store.swap_production("noshow", Some(1), 7).await.unwrap_err();
    assert!(matches!(err, StorageError::VersionNotFound { version: 7, .. }));
}

async fn swap_to_current_production_is_noop(store: &dyn VersionStore) {
    store
        .insert_version("noshow", &RunId::from("r1"), metrics(0.7))
        .await
        .unwrap();
    store.swap_production("noshow", None, 1).await.unwrap();

    let again = store.swap_production("noshow", Some(1), 1).await.unwrap();
    assert_eq!(again.promoted.stage, Stage::Production);
    assert!(again.demoted.is_none());
}

async fn set_stage_never_creates_production(store: &dyn VersionStore) {
    store
        .insert_version("noshow", &RunId::from("r1"), metrics(0.7))
        .await
        .unwrap();

    let err = store
        .set_stage("noshow", 1, Stage::Production)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidTransition { .. }));

    let archived = store.set_stage("noshow", 1, Stage::Archived).await.unwrap();
    assert_eq!(archived.stage, Stage::Archived);
    assert!(archived.stage_updated_at >= archived.created_at);

    // Versions are never renumbered or removed
    let all = store.list_versions("noshow").await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].version, 1);
}

async fn archived_and_production_never_return_to_none(store: &dyn VersionStore) {
    for run in ["r1", "r2", "r3"] {
        store
            .insert_version("noshow", &RunId::from(run), metrics(0.7))
            .await
            .unwrap();
    }
    store.swap_production("noshow", None, 1).await.unwrap();
    store.swap_production("noshow", Some(1), 2).await.unwrap();

    // v1 archived by the swap, v2 serving
    for version in [1, 2] {
        let err = store
            .set_stage("noshow", version, Stage::None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidTransition { .. }));
    }

    // Never-promoted version: None -> None is a no-op
    let untouched = store.set_stage("noshow", 3, Stage::None).await.unwrap();
    assert_eq!(untouched.stage, Stage::None);

    let stages: Vec<Stage> = store
        .list_versions("noshow")
        .await
        .unwrap()
        .into_iter()
        .map(|v| v.stage)
        .collect();
    assert_eq!(stages, vec![Stage::Archived, Stage::Production, Stage::None]);
}

async fn metrics_are_captured_at_registration(store: &dyn VersionStore) {
    let v = store
        .insert_version("noshow", &RunId::from("r1"), metrics(0.85))
        .await
        .unwrap();
    assert_eq!(v.metric("auc"), Some(0.85));
    let fetched = store.get_version("noshow", 1).await.unwrap();
    assert_eq!(fetched.metrics, v.metrics);
}

macro_rules! version_store_contract {
    ($($check:ident),* $(,)?) => {
        mod memory {
            use super::*;
            $(
                #[tokio::test]
                async fn $check() {
                    super::$check(&MemoryVersionStore::new()).await;
                }
            )*
        }

        mod surreal {
            use super::*;
            $(
                #[tokio::test]
                async fn $check() {
                    let store = SurrealVersionStore::in_memory().await.unwrap();
                    super::$check(&store).await;
                }
            )*
        }
    };
}

version_store_contract!(
    versions_are_allocated_sequentially,
    duplicate_run_and_empty_metrics_are_rejected,
    lookups_report_not_found,
    swap_archives_previous_production,
    swap_rejects_stale_expectation,
    swap_to_current_production_is_noop,
    set_stage_never_creates_production,
    archived_and_production_never_return_to_none,
    metrics_are_captured_at_registration,
);

// ===========================================================================
// MetricSnapshotStore contracts
// ===========================================================================

async fn snapshot_put_then_get(store: &dyn MetricSnapshotStore) {
    let run = RunId::from("run-a");
    store.put_snapshot(&run, metrics(0.7)).await.unwrap();
    let snap = store.get_snapshot(&run).await.unwrap();
    assert_eq!(snap.run_id, run);
    assert_eq!(snap.metrics.get("auc"), Some(&0.7));

    // A re-logged run replaces the previous snapshot
    store.put_snapshot(&run, metrics(0.9)).await.unwrap();
    let snap = store.get_snapshot(&run).await.unwrap();
    assert_eq!(snap.metrics.get("auc"), Some(&0.9));
}

async fn snapshot_missing_is_not_found(store: &dyn MetricSnapshotStore) {
    let err = store.get_snapshot(&RunId::from("absent")).await.unwrap_err();
    assert!(matches!(err, StorageError::SnapshotNotFound { .. }));
}

#[tokio::test]
async fn memory_snapshot_put_then_get() {
    snapshot_put_then_get(&MemoryMetricStore::new()).await;
}

#[tokio::test]
async fn memory_snapshot_missing_is_not_found() {
    snapshot_missing_is_not_found(&MemoryMetricStore::new()).await;
}

#[tokio::test]
async fn surreal_snapshot_put_then_get() {
    let store = SurrealVersionStore::in_memory().await.unwrap();
    snapshot_put_then_get(&store).await;
}

#[tokio::test]
async fn surreal_snapshot_missing_is_not_found() {
    let store = SurrealVersionStore::in_memory().await.unwrap();
    snapshot_missing_is_not_found(&store).await;
}
