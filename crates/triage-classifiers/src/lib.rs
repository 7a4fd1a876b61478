//! Triage Classifiers
//!
//! Wraps an externally trained model artifact behind a uniform
//! `classify(vector) -> (label, confidence)` capability.
//!
//! - [`TriageModel`] is the opaque capability a loaded artifact exposes
//! - [`ClassifierAdapter`] checks the artifact against the declared schema at
//!   startup and enforces the output contract per request
//! - [`load_model`] reads a JSON or YAML artifact once at process start

pub mod classifier;
pub mod forest;
pub mod logistic;
pub mod model;
pub mod model_loader;

pub use classifier::{ClassificationResult, ClassifierAdapter};
pub use forest::RandomForestModel;
pub use logistic::LogisticModel;
pub use model::TriageModel;
pub use model_loader::{load_model, ModelArtifact, ModelConfig, ModelFormat};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classifier::{ClassificationResult, ClassifierAdapter};
    pub use crate::model::TriageModel;
    pub use crate::model_loader::{load_model, ModelConfig};
}
