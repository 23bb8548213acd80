//! Promotion Policy: decide whether a freshly trained candidate should serve,
//! and apply the decision against the registry.
//!
//! [`decide`] is pure. [`PromotionPolicy`] runs the read-compare-transition
//! cycle, committing with the production version it observed so that a
//! concurrent promotion turns a stale commit into a conflict instead of a
//! lost update. Conflicts restart the cycle with fresh data, a bounded number
//! of times.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use modelgate_state::{ModelVersion, RunId, VersionStore};

use crate::config::PromotionConfig;
use crate::domain::{LifecycleError, Result, ValidationError};
use crate::obs;
use crate::registry::ModelRegistry;

/// Outcome of comparing a candidate against the current production version.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PromotionDecision {
    /// No production version exists; the candidate wins unconditionally.
    Bootstrap,
    Better { candidate: f64, incumbent: f64 },
    /// Equal or worse. Ties never promote.
    NotBetter { candidate: f64, incumbent: f64 },
}

impl PromotionDecision {
    pub fn promotes(&self) -> bool {
        !matches!(self, PromotionDecision::NotBetter { .. })
    }
}

/// Compare `candidate` against `production` on `metric_name`.
///
/// Fails with `MissingMetric` if either side lacks a finite value for the
/// metric. The bootstrap case never looks at metrics.
pub fn decide(
    candidate: &ModelVersion,
    production: Option<&ModelVersion>,
    metric_name: &str,
    higher_is_better: bool,
) -> Result<PromotionDecision> {
    let Some(production) = production else {
        return Ok(PromotionDecision::Bootstrap);
    };

    let candidate_value = required_metric(candidate, metric_name)?;
    let incumbent_value = required_metric(production, metric_name)?;

    let wins = if higher_is_better {
        candidate_value > incumbent_value
    } else {
        candidate_value < incumbent_value
    };

    Ok(if wins {
        PromotionDecision::Better {
            candidate: candidate_value,
            incumbent: incumbent_value,
        }
    } else {
        PromotionDecision::NotBetter {
            candidate: candidate_value,
            incumbent: incumbent_value,
        }
    })
}

fn required_metric(version: &ModelVersion, metric_name: &str) -> Result<f64> {
    version.metric(metric_name).ok_or_else(|| {
        ValidationError::MissingMetric {
            name: version.name.clone(),
            version: version.version,
            metric: metric_name.to_string(),
        }
        .into()
    })
}

/// Applies [`decide`] against a shared registry.
pub struct PromotionPolicy<S> {
    registry: Arc<ModelRegistry<S>>,
    config: PromotionConfig,
}

impl<S> PromotionPolicy<S>
where
    S: VersionStore,
{
    pub fn new(registry: Arc<ModelRegistry<S>>) -> Self {
        Self::with_config(registry, PromotionConfig::default())
    }

    pub fn with_config(registry: Arc<ModelRegistry<S>>, config: PromotionConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry<S>> {
        &self.registry
    }

    /// Promote the version registered for `run_id` if it beats production on
    /// the configured metric.
    pub async fn auto_promote(&self, run_id: &RunId) -> Result<Option<u32>> {
        self.auto_promote_if_better(run_id, &self.config.metric, self.config.higher_is_better)
            .await
    }

    /// Promote the version registered for `run_id` if it is strictly better
    /// than the current production version on `metric_name`.
    ///
    /// Returns the promoted version number, or `None` if the candidate lost.
    /// A candidate that is already in production returns its own version.
    pub async fn auto_promote_if_better(
        &self,
        run_id: &RunId,
        metric_name: &str,
        higher_is_better: bool,
    ) -> Result<Option<u32>> {
        let candidate = self.registry.find_by_run(run_id).await?;
        let span = obs::promotion_span(&candidate.name, run_id.as_str());
        self.promote_candidate(&candidate, metric_name, higher_is_better)
            .instrument(span)
            .await
    }

    async fn promote_candidate(
        &self,
        candidate: &ModelVersion,
        metric_name: &str,
        higher_is_better: bool,
    ) -> Result<Option<u32>> {
        let name = candidate.name.as_str();
        let max = self.config.max_attempts.max(1);
        let mut last_conflict = String::new();

        for attempt in 1..=max {
            let production = self.registry.production_version(name).await?;
            if production.as_ref().map(|p| p.version) == Some(candidate.version) {
                return Ok(Some(candidate.version));
            }

            let decision = decide(candidate, production.as_ref(), metric_name, higher_is_better)?;
            obs::emit_promotion_decided(
                name,
                candidate.version,
                metric_name,
                candidate.metric(metric_name),
                production
                    .as_ref()
                    .and_then(|p| p.metric(metric_name).map(|m| (p.version, m))),
                decision.promotes(),
            );
            if !decision.promotes() {
                return Ok(None);
            }

            let expected = production.as_ref().map(|p| p.version);
            match self
                .registry
                .transition_if_current(name, expected, candidate.version)
                .await
            {
                Ok(transition) => return Ok(Some(transition.promoted.version)),
                Err(LifecycleError::ConcurrentModification { detail, .. }) => {
                    obs::emit_transition_conflict(name, attempt, max, &detail);
                    last_conflict = detail;
                }
                Err(other) => return Err(other),
            }
        }

        Err(LifecycleError::ConcurrentModification {
            name: name.to_string(),
            detail: format!(
                "v{} not promoted after {max} attempts: {last_conflict}",
                candidate.version
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use modelgate_state::fakes::MemoryVersionStore;
    use modelgate_state::{MetricMap, Stage};

    fn version(v: u32, auc: Option<f64>) -> ModelVersion {
        let now = Utc::now();
        let mut metrics = MetricMap::new();
        metrics.insert("logloss".to_string(), 0.4);
        if let Some(auc) = auc {
            metrics.insert("auc".to_string(), auc);
        }
        ModelVersion {
            name: "noshow".to_string(),
            version: v,
            run_id: RunId::new(format!("run-{v}")),
            metrics,
            stage: Stage::None,
            created_at: now,
            stage_updated_at: now,
        }
    }

    #[test]
    fn bootstrap_ignores_metrics() {
        let d = decide(&version(1, None), None, "auc", true).unwrap();
        assert_eq!(d, PromotionDecision::Bootstrap);
        assert!(d.promotes());
    }

    #[test]
    fn ties_never_promote() {
        let d = decide(&version(2, Some(0.7)), Some(&version(1, Some(0.7))), "auc", true).unwrap();
        assert!(!d.promotes());
        let d = decide(&version(2, Some(0.7)), Some(&version(1, Some(0.7))), "auc", false).unwrap();
        assert!(!d.promotes());
    }

    #[test]
    fn direction_follows_higher_is_better() {
        let candidate = version(2, Some(0.8));
        let incumbent = version(1, Some(0.7));
        let better = decide(&candidate, Some(&incumbent), "auc", true).unwrap();
        assert_eq!(
            better,
            PromotionDecision::Better {
                candidate: 0.8,
                incumbent: 0.7
            }
        );
        let lower = decide(&candidate, Some(&incumbent), "auc", false).unwrap();
        assert!(!lower.promotes());
    }

    #[test]
    fn missing_metric_names_the_offending_side() {
        let err = decide(&version(2, Some(0.8)), Some(&version(1, None)), "auc", true).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Validation(ValidationError::MissingMetric { version: 1, .. })
        ));
        let err = decide(&version(2, Some(f64::NAN)), Some(&version(1, Some(0.7))), "auc", true)
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Validation(ValidationError::MissingMetric { version: 2, .. })
        ));
    }

    #[tokio::test]
    async fn already_production_returns_own_version() {
        let registry = Arc::new(ModelRegistry::new(Arc::new(MemoryVersionStore::new())));
        let run = RunId::from("a");
        registry
            .register("noshow", &run, MetricMap::from([("auc".to_string(), 0.7)]))
            .await
            .unwrap();
        let policy = PromotionPolicy::new(Arc::clone(&registry));
        assert_eq!(policy.auto_promote(&run).await.unwrap(), Some(1));
        assert_eq!(policy.auto_promote(&run).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn unregistered_run_is_not_found() {
        let registry = Arc::new(ModelRegistry::new(Arc::new(MemoryVersionStore::new())));
        let policy = PromotionPolicy::new(registry);
        let err = policy
            .auto_promote_if_better(&RunId::from("ghost"), "auc", true)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(_)));
    }
}
