//! Pull-based Prometheus exposition.
//!
//! `MetricsExporter` owns a private `prometheus::Registry`; nothing is
//! registered in the process-global default registry, so several exporters
//! (one per test, one per embedded monitor) never collide.
//!
//! The exporter holds no decision logic. The registry and the drift monitor
//! feed it; a scrape handler calls [`MetricsExporter::render`].

use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::domain::{LifecycleError, Prediction, Result};

/// `Content-Type` of the text exposition format.
pub const TEXT_CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

pub const PREDICTIONS_TOTAL: &str = "model_predictions_total";
pub const PREDICTION_LATENCY_SECONDS: &str = "model_prediction_latency_seconds";
pub const DRIFT_SCORE: &str = "model_data_drift_score";
pub const PERFORMANCE_METRIC: &str = "model_performance_metric";

/// Latency buckets in seconds, sized for in-process classifier inference.
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

/// Prometheus collectors for serving, drift and registry metrics.
pub struct MetricsExporter {
    registry: Registry,
    predictions: IntCounterVec,
    latency: HistogramVec,
    drift: GaugeVec,
    performance: GaugeVec,
}

impl MetricsExporter {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let predictions = IntCounterVec::new(
            Opts::new(PREDICTIONS_TOTAL, "Total number of predictions served"),
            &["model_version", "outcome"],
        )?;
        let latency = HistogramVec::new(
            HistogramOpts::new(PREDICTION_LATENCY_SECONDS, "Prediction latency in seconds")
                .buckets(LATENCY_BUCKETS.to_vec()),
            &["model_version"],
        )?;
        let drift = GaugeVec::new(
            Opts::new(DRIFT_SCORE, "Normalised drift score per feature, in [0, 1]"),
            &["feature_name"],
        )?;
        let performance = GaugeVec::new(
            Opts::new(
                PERFORMANCE_METRIC,
                "Evaluation metric of a promoted model version",
            ),
            &["model_version", "metric"],
        )?;

        registry.register(Box::new(predictions.clone()))?;
        registry.register(Box::new(latency.clone()))?;
        registry.register(Box::new(drift.clone()))?;
        registry.register(Box::new(performance.clone()))?;

        Ok(Self {
            registry,
            predictions,
            latency,
            drift,
            performance,
        })
    }

    /// Count one served prediction and observe its latency.
    pub fn observe_prediction(&self, model_version: &str, outcome: Prediction, latency_secs: f64) {
        self.predictions
            .with_label_values(&[model_version, outcome.as_str()])
            .inc();
        self.latency
            .with_label_values(&[model_version])
            .observe(latency_secs.max(0.0));
    }

    pub fn set_drift_score(&self, feature: &str, score: f64) {
        self.drift.with_label_values(&[feature]).set(score);
    }

    pub fn set_performance(&self, model_version: &str, metric: &str, value: f64) {
        self.performance
            .with_label_values(&[model_version, metric])
            .set(value);
    }

    /// Current value of the prediction counter for one label pair.
    pub fn prediction_count(&self, model_version: &str, outcome: Prediction) -> u64 {
        self.predictions
            .with_label_values(&[model_version, outcome.as_str()])
            .get()
    }

    pub fn drift_score(&self, feature: &str) -> f64 {
        self.drift.with_label_values(&[feature]).get()
    }

    pub fn performance(&self, model_version: &str, metric: &str) -> f64 {
        self.performance
            .with_label_values(&[model_version, metric])
            .get()
    }

    /// Text exposition of every collector, as served on a scrape.
    pub fn render(&self) -> Result<String> {
        let families = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new().encode(&families, &mut buf)?;
        String::from_utf8(buf)
            .map_err(|e| LifecycleError::Metrics(prometheus::Error::Msg(e.to_string())))
    }
}

impl std::fmt::Debug for MetricsExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsExporter").finish_non_exhaustive()
    }
}
