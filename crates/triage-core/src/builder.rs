//! Feature vector builder
//!
//! Turns an arbitrary JSON payload into a [`FeatureVector`] ordered exactly as
//! the schema declares. Keyed payloads are matched by name or alias,
//! positional payloads by index. The builder has no side effects.

use crate::error::ValidationError;
use crate::schema::{FeatureSchema, FieldKind, FieldSpec, UnknownFieldPolicy};
use crate::types::{FeatureValue, FeatureVector};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Validates raw input against a [`FeatureSchema`]
#[derive(Debug, Clone)]
pub struct FeatureVectorBuilder {
    schema: Arc<FeatureSchema>,
}

impl FeatureVectorBuilder {
    pub fn new(schema: Arc<FeatureSchema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    /// Build a feature vector from a JSON object or array
    pub fn build(&self, raw: &Value) -> Result<FeatureVector, ValidationError> {
        let slots = match raw {
            Value::Object(map) => self.slots_from_object(map)?,
            Value::Array(items) => self.slots_from_array(items)?,
            other => {
                return Err(ValidationError::UnsupportedPayload(
                    json_type_name(other).to_string(),
                ))
            }
        };

        let missing: Vec<String> = self
            .schema
            .fields()
            .iter()
            .zip(&slots)
            .filter(|(_, slot)| matches!(slot, None | Some(Value::Null)))
            .map(|(field, _)| field.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields(missing));
        }

        let mut values = Vec::with_capacity(slots.len());
        let mut codes = Vec::with_capacity(slots.len());
        for (field, slot) in self.schema.fields().iter().zip(slots) {
            // Presence checked above.
            let Some(raw_value) = slot else { continue };
            let value = coerce(field, raw_value)?;
            codes.push(self.encode(field, &value)?);
            values.push(value);
        }

        Ok(FeatureVector::new(self.schema.clone(), values, codes))
    }

    fn slots_from_object<'a>(
        &self,
        map: &'a Map<String, Value>,
    ) -> Result<Vec<Option<&'a Value>>, ValidationError> {
        let mut slots: Vec<Option<(&'a str, &'a Value)>> = vec![None; self.schema.len()];
        let mut unexpected = Vec::new();

        for (key, value) in map {
            match self.schema.resolve_key(key) {
                Some(index) => {
                    if let Some((previous, _)) = slots[index] {
                        return Err(ValidationError::DuplicateField {
                            field: self.schema.fields()[index].name.clone(),
                            keys: vec![previous.to_string(), key.clone()],
                        });
                    }
                    slots[index] = Some((key.as_str(), value));
                }
                None => unexpected.push(key.clone()),
            }
        }

        if !unexpected.is_empty() && self.schema.unknown_fields() == UnknownFieldPolicy::Reject {
            let present = slots.iter().filter(|s| s.is_some()).count();
            // Missing fields are the more useful report when both apply.
            if present == self.schema.len() {
                return Err(ValidationError::UnexpectedFields(unexpected));
            }
        }
        if !unexpected.is_empty() {
            tracing::debug!(keys = ?unexpected, "ignoring unknown payload keys");
        }

        Ok(slots.into_iter().map(|s| s.map(|(_, v)| v)).collect())
    }

    fn slots_from_array<'a>(
        &self,
        items: &'a [Value],
    ) -> Result<Vec<Option<&'a Value>>, ValidationError> {
        if items.len() != self.schema.len() {
            return Err(ValidationError::ArityMismatch {
                expected: self.schema.len(),
                actual: items.len(),
            });
        }
        Ok(items.iter().map(Some).collect())
    }

    fn encode(&self, field: &FieldSpec, value: &FeatureValue) -> Result<Option<i64>, ValidationError> {
        let (Some(table), FeatureValue::Categorical(category)) =
            (self.schema.encoding().table_for(&field.name), value)
        else {
            return Ok(None);
        };
        table
            .get(category)
            .copied()
            .map(Some)
            .ok_or_else(|| ValidationError::UnknownCategory {
                field: field.name.clone(),
                value: category.clone(),
            })
    }
}

/// Coerce a JSON value to the field's declared kind and check its bounds
fn coerce(field: &FieldSpec, raw: &Value) -> Result<FeatureValue, ValidationError> {
    let invalid = || ValidationError::InvalidType {
        field: field.name.clone(),
        value: raw.to_string(),
        expected: field.kind,
    };

    let value = match field.kind {
        FieldKind::Categorical => match raw {
            Value::String(s) => FeatureValue::Categorical(s.clone()),
            _ => return Err(invalid()),
        },
        FieldKind::Integer => match raw {
            Value::Number(n) => match n.as_i64() {
                Some(i) => FeatureValue::Integer(i),
                None => n
                    .as_f64()
                    .and_then(integral)
                    .map(FeatureValue::Integer)
                    .ok_or_else(invalid)?,
            },
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(FeatureValue::Integer)
                .map_err(|_| invalid())?,
            _ => return Err(invalid()),
        },
        FieldKind::Float => match raw {
            Value::Number(n) => n.as_f64().map(FeatureValue::Float).ok_or_else(invalid)?,
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(FeatureValue::Float)
                .ok_or_else(invalid)?,
            _ => return Err(invalid()),
        },
        FieldKind::Boolean => match raw {
            Value::Bool(b) => FeatureValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(0) => FeatureValue::Boolean(false),
                Some(1) => FeatureValue::Boolean(true),
                _ => return Err(invalid()),
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => FeatureValue::Boolean(true),
                "false" | "0" => FeatureValue::Boolean(false),
                _ => return Err(invalid()),
            },
            _ => return Err(invalid()),
        },
    };

    if let Some(number) = value.as_f64().filter(|_| field.kind.is_numeric()) {
        if !field.in_range(number) {
            return Err(ValidationError::OutOfRange {
                field: field.name.clone(),
                value: number,
                min: field.min,
                max: field.max,
            });
        }
    }

    Ok(value)
}

fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CategoricalEncoding;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn builder() -> FeatureVectorBuilder {
        FeatureVectorBuilder::new(Arc::new(FeatureSchema::triage_default()))
    }

    fn sample() -> Value {
        json!({
            "gender": "female",
            "age": 45,
            "chief_complaint": "chest pain",
            "pain_grade": 8,
            "blood_pressure_systolic": 160,
            "blood_pressure_diastolic": 100,
            "pulse_rate": 110,
            "respiratory_rate": 22,
            "o2_saturation": 91
        })
    }

    #[test]
    fn test_build_keyed_payload() {
        let vector = builder().build(&sample()).unwrap();
        assert_eq!(vector.len(), 9);
        assert_eq!(
            vector.get("gender"),
            Some(&FeatureValue::Categorical("female".into()))
        );
        assert_eq!(vector.get("o2_saturation"), Some(&FeatureValue::Integer(91)));
        assert_eq!(vector.code(0), None);
    }

    #[test]
    fn test_build_positional_payload() {
        let raw = json!(["male", 30, "headache", 3, 120, 80, 70, 16, 98]);
        let vector = builder().build(&raw).unwrap();
        assert_eq!(vector.get("chief_complaint").and_then(|v| v.as_str()), Some("headache"));
        assert_eq!(vector.get("respiratory_rate"), Some(&FeatureValue::Integer(16)));
    }

    #[test]
    fn test_positional_arity() {
        let raw = json!(["male", 30]);
        assert_eq!(
            builder().build(&raw).unwrap_err(),
            ValidationError::ArityMismatch {
                expected: 9,
                actual: 2
            }
        );
    }

    #[test]
    fn test_legacy_aliases() {
        let raw = json!({
            "gender": "female",
            "age": 45,
            "ChiefComplaint": "chest pain",
            "PainGrade": 8,
            "BlooddpressurSystol": 160,
            "BlooddpressurDiastol": 100,
            "PulseRate": 110,
            "Respiration": 22,
            "O2Saturation": 91
        });
        let vector = builder().build(&raw).unwrap();
        assert_eq!(vector.get("pain_grade"), Some(&FeatureValue::Integer(8)));
        assert_eq!(vector.get("respiratory_rate"), Some(&FeatureValue::Integer(22)));
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let mut raw = sample();
        raw["PainGrade"] = json!(7);
        let err = builder().build(&raw).unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateField { ref field, .. } if field == "pain_grade"));
    }

    #[test]
    fn test_missing_fields_all_reported() {
        let mut raw = sample();
        let map = raw.as_object_mut().unwrap();
        map.remove("age");
        map.remove("pulse_rate");
        map.insert("o2_saturation".into(), Value::Null);

        assert_eq!(
            builder().build(&raw).unwrap_err(),
            ValidationError::MissingFields(vec![
                "age".into(),
                "pulse_rate".into(),
                "o2_saturation".into()
            ])
        );
    }

    #[test]
    fn test_non_numeric_string_rejected() {
        let mut raw = sample();
        raw["age"] = json!("abc");
        let err = builder().build(&raw).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidType {
                field: "age".into(),
                value: "\"abc\"".into(),
                expected: FieldKind::Integer,
            }
        );
    }

    #[test]
    fn test_numeric_coercion() {
        let mut raw = sample();
        raw["age"] = json!("45");
        raw["pulse_rate"] = json!(110.0);
        let vector = builder().build(&raw).unwrap();
        assert_eq!(vector.get("age"), Some(&FeatureValue::Integer(45)));
        assert_eq!(vector.get("pulse_rate"), Some(&FeatureValue::Integer(110)));

        raw["pulse_rate"] = json!(110.5);
        assert!(matches!(
            builder().build(&raw).unwrap_err(),
            ValidationError::InvalidType { .. }
        ));
    }

    #[test]
    fn test_categorical_rejects_number() {
        let mut raw = sample();
        raw["gender"] = json!(1);
        assert!(matches!(
            builder().build(&raw).unwrap_err(),
            ValidationError::InvalidType { expected: FieldKind::Categorical, .. }
        ));
    }

    #[test]
    fn test_pain_grade_bounds() {
        let mut raw = sample();
        raw["pain_grade"] = json!(11);
        assert!(matches!(
            builder().build(&raw).unwrap_err(),
            ValidationError::OutOfRange { ref field, .. } if field == "pain_grade"
        ));
    }

    #[test]
    fn test_unknown_fields_policy() {
        let mut raw = sample();
        raw["ward"] = json!("A&E");

        assert!(builder().build(&raw).is_ok());

        let strict = FeatureSchema::triage_default().with_unknown_fields(UnknownFieldPolicy::Reject);
        let strict = FeatureVectorBuilder::new(Arc::new(strict));
        assert_eq!(
            strict.build(&raw).unwrap_err(),
            ValidationError::UnexpectedFields(vec!["ward".into()])
        );
    }

    #[test]
    fn test_unsupported_payload() {
        assert_eq!(
            builder().build(&json!("hello")).unwrap_err(),
            ValidationError::UnsupportedPayload("string".into())
        );
    }

    #[test]
    fn test_encoding_table() {
        let mut genders = HashMap::new();
        genders.insert("female".to_string(), 0);
        genders.insert("male".to_string(), 1);
        let mut tables = HashMap::new();
        tables.insert("gender".to_string(), genders);

        let schema = FeatureSchema::triage_default()
            .with_encoding(CategoricalEncoding::Table { tables })
            .unwrap();
        let builder = FeatureVectorBuilder::new(Arc::new(schema));

        let vector = builder.build(&sample()).unwrap();
        assert_eq!(vector.code(0), Some(0));
        // Raw value is retained alongside the code.
        assert_eq!(vector.get("gender").and_then(|v| v.as_str()), Some("female"));
        // No table for chief_complaint, so it passes through.
        assert_eq!(vector.code(2), None);

        let mut raw = sample();
        raw["gender"] = json!("other");
        assert_eq!(
            builder.build(&raw).unwrap_err(),
            ValidationError::UnknownCategory {
                field: "gender".into(),
                value: "other".into()
            }
        );
    }

    #[test]
    fn test_boolean_coercion() {
        let schema = FeatureSchema::new(vec![FieldSpec::boolean("smoker"), FieldSpec::float("temp")])
            .unwrap();
        let builder = FeatureVectorBuilder::new(Arc::new(schema));

        let vector = builder.build(&json!({"smoker": "TRUE", "temp": "37.5"})).unwrap();
        assert_eq!(vector.values(), &[FeatureValue::Boolean(true), FeatureValue::Float(37.5)]);

        let vector = builder.build(&json!([0, 38])).unwrap();
        assert_eq!(vector.values(), &[FeatureValue::Boolean(false), FeatureValue::Float(38.0)]);

        assert!(builder.build(&json!({"smoker": 2, "temp": 37})).is_err());
        assert!(builder.build(&json!({"smoker": true, "temp": "NaN"})).is_err());
    }

    proptest! {
        #[test]
        fn prop_valid_input_round_trips(
            age in 0i64..=130,
            pain in 0i64..=10,
            systolic in 60i64..250,
            o2 in 0i64..=100,
            complaint in "[a-z ]{1,24}",
        ) {
            let raw = json!({
                "gender": "male",
                "age": age,
                "chief_complaint": complaint,
                "pain_grade": pain,
                "blood_pressure_systolic": systolic,
                "blood_pressure_diastolic": 80,
                "pulse_rate": 70,
                "respiratory_rate": 16,
                "o2_saturation": o2,
            });
            let vector = builder().build(&raw).unwrap();
            let features = vector.to_features();
            for (name, value) in features.iter() {
                prop_assert_eq!(serde_json::to_value(value).unwrap(), raw[name].clone());
            }
        }

        #[test]
        fn prop_every_missing_field_is_named(mask in proptest::collection::vec(any::<bool>(), 9)) {
            prop_assume!(mask.iter().any(|&drop| drop));
            let mut raw = sample();
            let map = raw.as_object_mut().unwrap();
            let names = FeatureSchema::triage_default()
                .names()
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>();
            let mut expected = Vec::new();
            for (name, drop) in names.iter().zip(&mask) {
                if *drop {
                    map.remove(name);
                    expected.push(name.clone());
                }
            }
            prop_assert_eq!(
                builder().build(&raw).unwrap_err(),
                ValidationError::MissingFields(expected)
            );
        }
    }
}
