//! Opaque model capability

use std::collections::HashMap;
use triage_core::{Error, FeatureValue, FeatureVector, Result};

/// A pre-trained, read-only classifier artifact
///
/// Implementations must be safe to call concurrently. Whether the artifact
/// carries its own preprocessing is its own business; callers only see
/// `predict` and, optionally, `predict_proba`.
pub trait TriageModel: Send + Sync {
    /// Artifact name, for logs
    fn name(&self) -> &str;

    /// Feature names in the order the artifact was trained on
    fn feature_names(&self) -> &[String];

    /// Predict the class index (0 or 1 for a binary label)
    fn predict(&self, vector: &FeatureVector) -> Result<u8>;

    /// Per-class probabilities, when the artifact provides them
    fn predict_proba(&self, _vector: &FeatureVector) -> Result<Option<Vec<f64>>> {
        Ok(None)
    }
}

/// Numeric input row for artifacts that work on floats
///
/// Categorical values use the injected code when the builder attached one,
/// otherwise their position in the artifact's own category list.
pub fn numeric_row(
    vector: &FeatureVector,
    categories: &HashMap<String, Vec<String>>,
) -> Result<Vec<f64>> {
    vector
        .iter()
        .map(|(field, value, code)| match value {
            FeatureValue::Categorical(category) => {
                if let Some(code) = code {
                    return Ok(code as f64);
                }
                let known = categories.get(&field.name).ok_or_else(|| {
                    Error::schema_mismatch(format!(
                        "model has no encoding for categorical field '{}'",
                        field.name
                    ))
                })?;
                known
                    .iter()
                    .position(|c| c == category)
                    .map(|p| p as f64)
                    .ok_or_else(|| {
                        Error::rejected(format!(
                            "unseen category '{}' for field '{}'",
                            category, field.name
                        ))
                    })
            }
            // Non-categorical values always have a numeric view.
            other => other.as_f64().ok_or_else(|| {
                Error::schema_mismatch(format!("field '{}' has no numeric value", field.name))
            }),
        })
        .collect()
}
