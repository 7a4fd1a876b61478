//! The shipped forest artifact loads against the default schema

use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use triage_classifiers::{load_model, ClassifierAdapter, ModelConfig};
use triage_core::{FeatureSchema, FeatureVectorBuilder, TriageLevel};

fn artifact() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../models/triage_forest.json")
}

fn adapter() -> (ClassifierAdapter, FeatureVectorBuilder) {
    let schema = Arc::new(FeatureSchema::triage_default());
    let model = load_model(&ModelConfig::from_local(artifact())).unwrap();
    let adapter = ClassifierAdapter::new(model, schema.clone()).unwrap();
    (adapter, FeatureVectorBuilder::new(schema))
}

#[test]
fn test_severe_presentation_is_urgent() {
    let (adapter, builder) = adapter();
    let vector = builder
        .build(&json!({
            "gender": "female",
            "age": 45,
            "chief_complaint": "chest pain",
            "pain_grade": 8,
            "blood_pressure_systolic": 160,
            "blood_pressure_diastolic": 100,
            "pulse_rate": 110,
            "respiratory_rate": 22,
            "o2_saturation": 91
        }))
        .unwrap();

    let result = adapter.classify(&vector).unwrap();
    assert_eq!(result.label, TriageLevel::Urgent);
    let confidence = result.confidence.unwrap();
    assert!(confidence.urgent > 0.8, "{confidence:?}");
}

#[test]
fn test_mild_presentation_is_not_urgent() {
    let (adapter, builder) = adapter();
    let vector = builder
        .build(&json!(["male", 30, "headache", 2, 120, 80, 70, 14, 99]))
        .unwrap();

    let result = adapter.classify(&vector).unwrap();
    assert_eq!(result.label, TriageLevel::NotUrgent);
}

#[test]
fn test_unseen_complaint_is_client_error() {
    let (adapter, builder) = adapter();
    let vector = builder
        .build(&json!(["male", 30, "hiccups", 2, 120, 80, 70, 14, 99]))
        .unwrap();

    let err = adapter.classify(&vector).unwrap_err();
    assert!(err.is_client_error(), "{err}");
}
