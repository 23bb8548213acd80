//! Structured observability hooks for model lifecycle events.
//!
//! This module provides:
//! - A promotion-scoped tracing span (`promotion_span`)
//! - Emission functions for registration, promotion decisions, stage
//!   transitions, transition conflicts and drift computation
//!
//! Events are emitted at `info!` level, conflicts at `warn!`. Filtering is
//! controlled by `RUST_LOG` (see [`crate::telemetry::init_tracing`]).

use tracing::{info, warn};

/// Span covering one promotion attempt sequence for a candidate run.
///
/// Attach it with `tracing::Instrument` so the future stays `Send`.
///
/// # Example
///
/// ```ignore
/// promote(run).instrument(promotion_span("noshow", "3f2a9c10")).await;
/// // every event inside carries model = "noshow", run_id = "3f2a9c10"
/// ```
pub fn promotion_span(model: &str, run_id: &str) -> tracing::Span {
    tracing::info_span!("modelgate.promotion", model = %model, run_id = %run_id)
}

/// Emit event: a new version was registered.
pub fn emit_version_registered(name: &str, version: u32, run_id: &str, metric_count: usize) {
    info!(
        event = "version.registered",
        model = %name,
        version = version,
        run_id = %run_id,
        metric_count = metric_count,
    );
}

/// Emit event: a promotion decision was made.
///
/// `incumbent` is `None` for the bootstrap case.
pub fn emit_promotion_decided(
    name: &str,
    candidate_version: u32,
    metric: &str,
    candidate: Option<f64>,
    incumbent: Option<(u32, f64)>,
    promoted: bool,
) {
    info!(
        event = "promotion.decided",
        model = %name,
        candidate_version = candidate_version,
        metric = %metric,
        candidate_value = ?candidate,
        incumbent_version = ?incumbent.map(|(v, _)| v),
        incumbent_value = ?incumbent.map(|(_, m)| m),
        promoted = promoted,
    );
}

/// Emit event: a version changed stage.
pub fn emit_stage_transition(name: &str, version: u32, from: &str, to: &str) {
    info!(
        event = "stage.transition",
        model = %name,
        version = version,
        from = %from,
        to = %to,
    );
}

/// Emit event: a transition lost a race and will be retried or surfaced.
pub fn emit_transition_conflict(name: &str, attempt: u32, max_attempts: u32, detail: &str) {
    warn!(
        event = "stage.conflict",
        model = %name,
        attempt = attempt,
        max_attempts = max_attempts,
        detail = %detail,
    );
}

/// Emit event: drift scores were computed over the buffer.
pub fn emit_drift_computed(buffered: usize, features: usize, high_drift: usize) {
    info!(
        event = "drift.computed",
        buffered = buffered,
        features = features,
        high_drift = high_drift,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_span_enters() {
        let span = promotion_span("noshow", "run-1");
        let _entered = span.enter();
        emit_version_registered("noshow", 1, "run-1", 2);
    }
}
