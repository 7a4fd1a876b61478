//! Logistic regression artifact

use crate::model::{numeric_row, TriageModel};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use triage_core::{Error, FeatureVector, Result};

fn default_threshold() -> f64 {
    0.5
}

/// Linear model with a sigmoid link: `p(urgent) = 1 / (1 + e^-(w·x + b))`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub name: String,

    pub feature_names: Vec<String>,

    #[serde(default)]
    pub categories: HashMap<String, Vec<String>>,

    pub weights: Vec<f64>,

    pub intercept: f64,

    /// Minimum `p(urgent)` for label 1
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl LogisticModel {
    pub fn validate(&self) -> Result<()> {
        if self.feature_names.is_empty() {
            return Err(Error::model_load(format!(
                "model '{}' declares no features",
                self.name
            )));
        }
        if self.weights.len() != self.feature_names.len() {
            return Err(Error::model_load(format!(
                "model '{}' has {} weights for {} features",
                self.name,
                self.weights.len(),
                self.feature_names.len()
            )));
        }
        if self.weights.iter().any(|w| !w.is_finite()) || !self.intercept.is_finite() {
            return Err(Error::model_load(format!(
                "model '{}' has non-finite coefficients",
                self.name
            )));
        }
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(Error::model_load(format!(
                "model '{}' threshold {} outside (0, 1)",
                self.name, self.threshold
            )));
        }
        Ok(())
    }

    fn urgent_probability(&self, vector: &FeatureVector) -> Result<f64> {
        let row = numeric_row(vector, &self.categories)?;
        if row.len() != self.weights.len() {
            return Err(Error::schema_mismatch(format!(
                "model '{}' expects {} features, got {}",
                self.name,
                self.weights.len(),
                row.len()
            )));
        }
        let z: f64 = self
            .weights
            .iter()
            .zip(&row)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.intercept;
        Ok(1.0 / (1.0 + (-z).exp()))
    }
}

impl TriageModel for LogisticModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, vector: &FeatureVector) -> Result<u8> {
        let p = self.urgent_probability(vector)?;
        Ok(u8::from(p >= self.threshold))
    }

    fn predict_proba(&self, vector: &FeatureVector) -> Result<Option<Vec<f64>>> {
        let p = self.urgent_probability(vector)?;
        Ok(Some(vec![1.0 - p, p]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use triage_core::{FeatureSchema, FeatureVectorBuilder, FieldSpec};

    fn model() -> LogisticModel {
        LogisticModel {
            name: "lr".into(),
            feature_names: vec!["pain_grade".into(), "o2_saturation".into()],
            categories: HashMap::new(),
            weights: vec![0.8, -0.1],
            intercept: 3.0,
            threshold: 0.5,
        }
    }

    fn builder() -> FeatureVectorBuilder {
        let schema = FeatureSchema::new(vec![
            FieldSpec::integer("pain_grade"),
            FieldSpec::integer("o2_saturation"),
        ])
        .unwrap();
        FeatureVectorBuilder::new(Arc::new(schema))
    }

    #[test]
    fn test_logistic_prediction() {
        let model = model();
        model.validate().unwrap();

        // z = 0.8 * 9 - 0.1 * 88 + 3 = 1.4
        let vector = builder().build(&json!([9, 88])).unwrap();
        assert_eq!(model.predict(&vector).unwrap(), 1);
        let proba = model.predict_proba(&vector).unwrap().unwrap();
        assert!((proba[0] + proba[1] - 1.0).abs() < 1e-12);
        assert!(proba[1] > 0.8);

        // z = 0.8 * 1 - 0.1 * 99 + 3 = -6.1
        let vector = builder().build(&json!([1, 99])).unwrap();
        assert_eq!(model.predict(&vector).unwrap(), 0);
    }

    #[test]
    fn test_validate_weight_count() {
        let mut model = model();
        model.weights.push(1.0);
        assert!(matches!(model.validate(), Err(Error::ModelLoad(_))));
    }

    #[test]
    fn test_validate_threshold() {
        let mut model = model();
        model.threshold = 1.0;
        assert!(model.validate().is_err());
    }
}
