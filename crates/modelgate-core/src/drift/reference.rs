//! Per-feature baseline statistics computed once from a historical sample.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{FeatureValue, FeatureVector, LifecycleError, Result};

/// Mean and sample standard deviation of one feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub mean: f64,
    pub std: f64,
}

impl FeatureStats {
    /// Sample statistics (`n - 1` denominator). Fewer than two values give
    /// `std = 0`. `None` for an empty slice.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = if values.len() < 2 {
            0.0
        } else {
            let ss = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
            (ss / (n - 1.0)).sqrt()
        };
        Some(Self { mean, std })
    }
}

/// Immutable reference baseline the drift monitor scores against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDistribution {
    features: BTreeMap<String, FeatureStats>,
}

impl ReferenceDistribution {
    /// No baseline: every drift computation yields an empty map.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_stats(features: BTreeMap<String, FeatureStats>) -> Self {
        Self { features }
    }

    /// Build from historical records. Non-numeric fields are skipped.
    pub fn from_samples(samples: &[FeatureVector]) -> Self {
        let mut columns: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for sample in samples {
            for (name, value) in sample {
                if let Some(v) = value.as_number() {
                    columns.entry(name.clone()).or_default().push(v);
                }
            }
        }
        let features = columns
            .into_iter()
            .filter_map(|(name, values)| FeatureStats::from_values(&values).map(|s| (name, s)))
            .collect();
        Self { features }
    }

    /// Load a JSON array of records and use the first `limit` rows.
    ///
    /// `null` fields are treated as absent.
    pub fn from_json_file(path: &Path, limit: usize) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let rows: Vec<BTreeMap<String, Option<FeatureValue>>> = serde_json::from_str(&raw)?;
        if rows.is_empty() {
            return Err(LifecycleError::Config(format!(
                "reference sample {} has no rows",
                path.display()
            )));
        }
        let samples: Vec<FeatureVector> = rows
            .into_iter()
            .take(limit)
            .map(|row| {
                row.into_iter()
                    .filter_map(|(k, v)| v.map(|v| (k, v)))
                    .collect()
            })
            .collect();
        Ok(Self::from_samples(&samples))
    }

    pub fn get(&self, feature: &str) -> Option<&FeatureStats> {
        self.features.get(feature)
    }

    pub fn features(&self) -> &BTreeMap<String, FeatureStats> {
        &self.features
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, FeatureValue)]) -> FeatureVector {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn sample_std_uses_n_minus_one() {
        let s = FeatureStats::from_values(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(s.mean, 5.0);
        assert!((s.std - 2.138089935299395).abs() < 1e-12);
    }

    #[test]
    fn single_value_has_zero_std() {
        let s = FeatureStats::from_values(&[3.0]).unwrap();
        assert_eq!(s, FeatureStats { mean: 3.0, std: 0.0 });
        assert!(FeatureStats::from_values(&[]).is_none());
    }

    #[test]
    fn from_samples_skips_non_numeric_fields() {
        let reference = ReferenceDistribution::from_samples(&[
            row(&[("age", 30.0.into()), ("gender", "F".into())]),
            row(&[("age", 50.0.into()), ("sms_received", true.into())]),
        ]);
        assert_eq!(reference.len(), 1);
        assert_eq!(reference.get("age").unwrap().mean, 40.0);
    }

    #[test]
    fn json_file_respects_row_limit_and_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reference.json");
        std::fs::write(
            &path,
            r#"[{"age": 10, "waiting_days": null}, {"age": 20, "waiting_days": 4}, {"age": 900}]"#,
        )
        .unwrap();

        let reference = ReferenceDistribution::from_json_file(&path, 2).unwrap();
        assert_eq!(reference.get("age").unwrap().mean, 15.0);
        assert_eq!(reference.get("waiting_days").unwrap().std, 0.0);
    }

    #[test]
    fn json_file_errors_are_typed() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            ReferenceDistribution::from_json_file(&missing, 10),
            Err(LifecycleError::Io(_))
        ));

        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, "[]").unwrap();
        assert!(matches!(
            ReferenceDistribution::from_json_file(&empty, 10),
            Err(LifecycleError::Config(_))
        ));
    }
}
