//! Domain models for modelgate.
//!
//! - `LifecycleError` / `ValidationError`: the error taxonomy surfaced to callers
//! - `FeatureVector` / `Prediction`: what the inference service reports per request

pub mod error;
pub mod features;

pub use error::{LifecycleError, Result, ValidationError};
pub use features::{numeric_features, FeatureValue, FeatureVector, Prediction};
