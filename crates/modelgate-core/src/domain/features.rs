//! Inference-side inputs: feature vectors and binary prediction outcomes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single input field as received by the inference service.
///
/// Only finite numbers take part in drift scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl FeatureValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Number(v)
    }
}

impl From<i64> for FeatureValue {
    fn from(v: i64) -> Self {
        FeatureValue::Number(v as f64)
    }
}

impl From<bool> for FeatureValue {
    fn from(v: bool) -> Self {
        FeatureValue::Bool(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Text(v.to_string())
    }
}

/// Named input fields of one prediction request.
pub type FeatureVector = BTreeMap<String, FeatureValue>;

/// Keep only the finite numeric fields of a feature vector.
pub fn numeric_features(features: &FeatureVector) -> BTreeMap<String, f64> {
    features
        .iter()
        .filter_map(|(k, v)| v.as_number().map(|n| (k.clone(), n)))
        .collect()
}

/// Outcome of a binary no-show classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prediction {
    Show,
    NoShow,
}

impl Prediction {
    /// Map a raw class label (`1` = no-show) to an outcome.
    pub fn from_label(label: u8) -> Self {
        if label == 1 {
            Prediction::NoShow
        } else {
            Prediction::Show
        }
    }

    /// Label value used for the `outcome` metric dimension.
    pub fn as_str(&self) -> &'static str {
        match self {
            Prediction::Show => "show",
            Prediction::NoShow => "no_show",
        }
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
