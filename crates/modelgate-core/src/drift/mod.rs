//! Drift Monitor: divergence between live-traffic features and a reference
//! baseline.
//!
//! `record` is called on every served prediction and only holds the buffer
//! lock for a push. `compute_drift` copies the buffer under the lock and
//! does the statistics after releasing it, so writers never wait on a drift
//! computation.
//!
//! Score per feature: `|mean(buffer) - ref.mean| / ref.std`, clamped to
//! `[0, 1]`, and `0` when `ref.std` is zero.

mod buffer;
mod reference;

pub use buffer::{DriftBuffer, NumericSample};
pub use reference::{FeatureStats, ReferenceDistribution};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::DriftConfig;
use crate::domain::{numeric_features, FeatureVector, Prediction, Result};
use crate::exporter::MetricsExporter;
use crate::obs;

/// Classification of one feature's drift score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftLevel {
    High,
    Ok,
}

impl DriftLevel {
    pub fn label(&self) -> &'static str {
        match self {
            DriftLevel::High => "HIGH DRIFT",
            DriftLevel::Ok => "OK",
        }
    }
}

impl fmt::Display for DriftLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDrift {
    pub feature: String,
    pub score: f64,
    pub level: DriftLevel,
}

/// Point-in-time drift report artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub report_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub threshold: f64,
    pub buffered_samples: usize,
    pub reference_features: usize,
    pub features: Vec<FeatureDrift>,
}

impl DriftReport {
    pub fn high_drift(&self) -> impl Iterator<Item = &FeatureDrift> {
        self.features.iter().filter(|f| f.level == DriftLevel::High)
    }
}

/// Bounded live-traffic monitor scored against a fixed reference.
pub struct DriftMonitor {
    buffer: Mutex<DriftBuffer>,
    reference: ReferenceDistribution,
    config: DriftConfig,
    exporter: Arc<MetricsExporter>,
}

impl DriftMonitor {
    /// Build a monitor with its own prediction, latency and drift collectors.
    pub fn new(reference: ReferenceDistribution, config: DriftConfig) -> Result<Self> {
        Ok(Self {
            buffer: Mutex::new(DriftBuffer::new(config.buffer_capacity)),
            reference,
            config,
            exporter: Arc::new(MetricsExporter::new()?),
        })
    }

    /// Report into a shared exporter instead, e.g. the one the registry
    /// publishes performance gauges to.
    pub fn with_exporter(mut self, exporter: Arc<MetricsExporter>) -> Self {
        self.exporter = exporter;
        self
    }

    /// Collectors this monitor records into; render it to serve a scrape.
    pub fn exporter(&self) -> &Arc<MetricsExporter> {
        &self.exporter
    }

    pub fn reference(&self) -> &ReferenceDistribution {
        &self.reference
    }

    pub fn threshold(&self) -> f64 {
        self.config.high_drift_threshold
    }

    /// Record one served request under the configured default version label.
    pub fn record(&self, features: &FeatureVector, prediction: Prediction, latency: Duration) {
        self.record_for_version(
            &self.config.default_model_version,
            features,
            prediction,
            latency,
        );
    }

    /// Record one served request attributed to `model_version`.
    pub fn record_for_version(
        &self,
        model_version: &str,
        features: &FeatureVector,
        prediction: Prediction,
        latency: Duration,
    ) {
        let sample = numeric_features(features);
        self.buffer.lock().push(sample);
        self.exporter
            .observe_prediction(model_version, prediction, latency.as_secs_f64());
    }

    /// Drift score per feature present in both the buffer and the reference.
    ///
    /// Empty when either side has no data.
    pub fn compute_drift(&self) -> BTreeMap<String, f64> {
        self.score_snapshot().1
    }

    /// Scores together with the size of the buffer snapshot they came from.
    fn score_snapshot(&self) -> (usize, BTreeMap<String, f64>) {
        let snapshot = self.buffer.lock().snapshot();
        if self.reference.is_empty() {
            return (snapshot.len(), BTreeMap::new());
        }
        let scores = score_samples(&self.reference, &snapshot);

        for (feature, score) in &scores {
            self.exporter.set_drift_score(feature, *score);
        }
        let high = scores
            .values()
            .filter(|s| **s > self.config.high_drift_threshold)
            .count();
        obs::emit_drift_computed(snapshot.len(), scores.len(), high);
        (snapshot.len(), scores)
    }

    /// Flag each score against the configured threshold (strictly greater
    /// is high drift).
    pub fn classify(&self, scores: &BTreeMap<String, f64>) -> Vec<FeatureDrift> {
        classify_scores(scores, self.config.high_drift_threshold)
    }

    pub fn generate_report(&self) -> DriftReport {
        let (buffered_samples, scores) = self.score_snapshot();
        DriftReport {
            report_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            threshold: self.config.high_drift_threshold,
            buffered_samples,
            reference_features: self.reference.len(),
            features: self.classify(&scores),
        }
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn clear(&self) {
        self.buffer.lock().clear();
    }
}

impl fmt::Debug for DriftMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriftMonitor")
            .field("buffered", &self.buffered_len())
            .field("reference_features", &self.reference.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Score a batch of samples against a reference.
pub fn score_samples(
    reference: &ReferenceDistribution,
    samples: &[NumericSample],
) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for sample in samples {
        for (feature, value) in sample {
            if reference.get(feature).is_some() {
                let entry = sums.entry(feature.as_str()).or_insert((0.0, 0));
                entry.0 += value;
                entry.1 += 1;
            }
        }
    }

    sums.into_iter()
        .filter_map(|(feature, (sum, n))| {
            let stats = reference.get(feature)?;
            Some((feature.to_string(), drift_score(sum / n as f64, stats)))
        })
        .collect()
}

/// Normalised distance of `current_mean` from the reference, in `[0, 1]`.
pub fn drift_score(current_mean: f64, stats: &FeatureStats) -> f64 {
    if stats.std == 0.0 || !stats.std.is_finite() {
        return 0.0;
    }
    let score = (current_mean - stats.mean).abs() / stats.std;
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

pub fn classify_scores(scores: &BTreeMap<String, f64>, threshold: f64) -> Vec<FeatureDrift> {
    scores
        .iter()
        .map(|(feature, score)| FeatureDrift {
            feature: feature.clone(),
            score: *score,
            level: if *score > threshold {
                DriftLevel::High
            } else {
                DriftLevel::Ok
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn age_reference() -> ReferenceDistribution {
        ReferenceDistribution::from_stats(BTreeMap::from([(
            "age".to_string(),
            FeatureStats {
                mean: 40.0,
                std: 10.0,
            },
        )]))
    }

    fn features(age: f64) -> FeatureVector {
        FeatureVector::from([
            ("age".to_string(), age.into()),
            ("gender".to_string(), "F".into()),
        ])
    }

    #[test]
    fn empty_buffer_or_reference_yields_empty_map() {
        let monitor = DriftMonitor::new(age_reference(), DriftConfig::default()).unwrap();
        assert!(monitor.compute_drift().is_empty());

        let monitor =
            DriftMonitor::new(ReferenceDistribution::empty(), DriftConfig::default()).unwrap();
        monitor.record(&features(60.0), Prediction::Show, Duration::from_millis(3));
        assert!(monitor.compute_drift().is_empty());
    }

    #[test]
    fn partial_shift_scores_proportionally() {
        let monitor = DriftMonitor::new(age_reference(), DriftConfig::default()).unwrap();
        monitor.record(&features(44.0), Prediction::Show, Duration::from_millis(1));
        monitor.record(&features(46.0), Prediction::NoShow, Duration::from_millis(1));
        let scores = monitor.compute_drift();
        assert!((scores["age"] - 0.5).abs() < 1e-12);
        assert!(!scores.contains_key("gender"));
    }

    #[test]
    fn zero_std_reference_scores_zero() {
        let reference = ReferenceDistribution::from_stats(BTreeMap::from([(
            "scholarship".to_string(),
            FeatureStats { mean: 0.0, std: 0.0 },
        )]));
        let monitor = DriftMonitor::new(reference, DriftConfig::default()).unwrap();
        monitor.record(
            &FeatureVector::from([("scholarship".to_string(), 1.0.into())]),
            Prediction::Show,
            Duration::ZERO,
        );
        assert_eq!(monitor.compute_drift()["scholarship"], 0.0);
    }

    #[test]
    fn classify_uses_strict_threshold() {
        let scores = BTreeMap::from([
            ("a".to_string(), 0.1),
            ("b".to_string(), 0.1000001),
        ]);
        let flagged = classify_scores(&scores, 0.1);
        assert_eq!(flagged[0].level, DriftLevel::Ok);
        assert_eq!(flagged[1].level, DriftLevel::High);
    }

    #[test]
    fn buffer_capacity_follows_config() {
        let config = DriftConfig {
            buffer_capacity: 5,
            ..DriftConfig::default()
        };
        let monitor = DriftMonitor::new(age_reference(), config).unwrap();
        for i in 0..12 {
            monitor.record(&features(i as f64), Prediction::Show, Duration::ZERO);
        }
        assert_eq!(monitor.buffered_len(), 5);
        monitor.clear();
        assert_eq!(monitor.buffered_len(), 0);
    }

    #[test]
    fn record_feeds_exporter_with_default_label() {
        let exporter = Arc::new(MetricsExporter::new().unwrap());
        let monitor = DriftMonitor::new(age_reference(), DriftConfig::default())
            .unwrap()
            .with_exporter(Arc::clone(&exporter));
        monitor.record(&features(40.0), Prediction::NoShow, Duration::from_millis(2));
        monitor.record_for_version("3", &features(90.0), Prediction::Show, Duration::ZERO);

        assert_eq!(exporter.prediction_count("unknown", Prediction::NoShow), 1);
        assert_eq!(exporter.prediction_count("3", Prediction::Show), 1);

        monitor.compute_drift();
        assert_eq!(exporter.drift_score("age"), 1.0);
    }

    #[test]
    fn record_counts_without_extra_wiring() {
        let monitor = DriftMonitor::new(age_reference(), DriftConfig::default()).unwrap();
        monitor.record(&features(40.0), Prediction::Show, Duration::from_millis(2));
        monitor.record(&features(41.0), Prediction::Show, Duration::from_millis(5));
        monitor.record_for_version("2", &features(42.0), Prediction::NoShow, Duration::ZERO);

        let exporter = monitor.exporter();
        assert_eq!(exporter.prediction_count("unknown", Prediction::Show), 2);
        assert_eq!(exporter.prediction_count("2", Prediction::NoShow), 1);
        let text = exporter.render().unwrap();
        assert!(text.contains(
            r#"model_prediction_latency_seconds_count{model_version="unknown"} 2"#
        ));
    }

    #[test]
    fn report_counts_the_scored_snapshot() {
        let monitor = DriftMonitor::new(age_reference(), DriftConfig::default()).unwrap();
        monitor.record(&features(60.0), Prediction::Show, Duration::ZERO);
        monitor.record(&features(20.0), Prediction::Show, Duration::ZERO);
        let report = monitor.generate_report();
        // one sample at +20 and one at -20 cancel out
        assert_eq!(report.buffered_samples, 2);
        assert_eq!(report.features[0].score, 0.0);

        let empty = DriftMonitor::new(ReferenceDistribution::empty(), DriftConfig::default())
            .unwrap();
        empty.record(&features(60.0), Prediction::Show, Duration::ZERO);
        assert_eq!(empty.generate_report().buffered_samples, 1);
    }

    #[test]
    fn report_carries_threshold_and_counts() {
        let monitor = DriftMonitor::new(age_reference(), DriftConfig::default()).unwrap();
        monitor.record(&features(60.0), Prediction::Show, Duration::ZERO);
        let report = monitor.generate_report();
        assert_eq!(report.threshold, 0.1);
        assert_eq!(report.buffered_samples, 1);
        assert_eq!(report.reference_features, 1);
        assert_eq!(report.high_drift().count(), 1);
    }
}
