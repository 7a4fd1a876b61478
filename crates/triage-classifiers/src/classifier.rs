//! Classifier adapter and classification result

use crate::model::TriageModel;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use triage_core::{Confidence, Error, FeatureSchema, FeatureVector, Result, TriageLevel};

/// Result of classification
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    /// Predicted triage level
    pub label: TriageLevel,

    /// Class probabilities, when the model provides them
    pub confidence: Option<Confidence>,

    /// Latency in microseconds
    pub latency_us: u64,
}

impl ClassificationResult {
    pub fn new(label: TriageLevel) -> Self {
        Self {
            label,
            confidence: None,
            latency_us: 0,
        }
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Uniform classification capability over an opaque model
///
/// Constructed once at startup and shared read-only across requests.
#[derive(Clone)]
pub struct ClassifierAdapter {
    model: Arc<dyn TriageModel>,
    schema: Arc<FeatureSchema>,
}

impl ClassifierAdapter {
    /// Wrap a loaded model, refusing it if its inputs differ from the schema
    pub fn new(model: Arc<dyn TriageModel>, schema: Arc<FeatureSchema>) -> Result<Self> {
        let expected = schema.names();
        let actual: Vec<&str> = model.feature_names().iter().map(String::as_str).collect();
        if expected != actual {
            return Err(Error::model_load(format!(
                "model '{}' expects features [{}], schema declares [{}]",
                model.name(),
                actual.join(", "),
                expected.join(", ")
            )));
        }
        Ok(Self { model, schema })
    }

    /// Classify one feature vector
    pub fn classify(&self, vector: &FeatureVector) -> Result<ClassificationResult> {
        if !Arc::ptr_eq(vector.schema(), &self.schema) && !vector.schema().same_fields(&self.schema)
        {
            return Err(Error::schema_mismatch(format!(
                "vector fields [{}] do not match classifier fields [{}]",
                vector.schema().names().join(", "),
                self.schema.names().join(", ")
            )));
        }

        let start = Instant::now();

        let raw_label = self.model.predict(vector)?;
        let label = TriageLevel::try_from(raw_label).map_err(Error::contract)?;

        let confidence = self
            .model
            .predict_proba(vector)?
            .map(|probabilities| Confidence::from_probabilities(&probabilities))
            .transpose()?;

        let latency_us = start.elapsed().as_micros() as u64;
        debug!(model = self.model.name(), %label, latency_us, "classified feature vector");

        Ok(ClassificationResult {
            label,
            confidence,
            latency_us,
        })
    }

    /// Get the model name
    pub fn name(&self) -> &str {
        self.model.name()
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }
}

impl std::fmt::Debug for ClassifierAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierAdapter")
            .field("model", &self.model.name())
            .field("fields", &self.schema.len())
            .finish()
    }
}
