//! Core types for the triage pipeline

use crate::error::{Error, Result};
use crate::schema::{FeatureSchema, FieldSpec};
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Allowed deviation of a binary probability pair from summing to 1.0
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// A single typed feature value, as supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Categorical(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl FeatureValue {
    /// Numeric view of the value; categorical values have none
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::Categorical(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Categorical(v) => Some(v),
            _ => None,
        }
    }
}

impl std::fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Categorical(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
        }
    }
}

/// Ordered, typed feature values matching a [`FeatureSchema`]
///
/// Only the builder constructs vectors, so every field is present and of its
/// declared kind. Categorical codes are populated when the schema carries an
/// encoding table for the field.
#[derive(Debug, Clone)]
pub struct FeatureVector {
    schema: Arc<FeatureSchema>,
    values: Vec<FeatureValue>,
    codes: Vec<Option<i64>>,
}

impl FeatureVector {
    pub(crate) fn new(
        schema: Arc<FeatureSchema>,
        values: Vec<FeatureValue>,
        codes: Vec<Option<i64>>,
    ) -> Self {
        debug_assert_eq!(schema.len(), values.len());
        debug_assert_eq!(schema.len(), codes.len());
        Self {
            schema,
            values,
            codes,
        }
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    pub fn values(&self) -> &[FeatureValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value by canonical field name
    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.schema.index_of(name).map(|i| &self.values[i])
    }

    /// Injected categorical code at a position, if any
    pub fn code(&self, index: usize) -> Option<i64> {
        self.codes.get(index).copied().flatten()
    }

    /// Iterate fields, values and codes in schema order
    pub fn iter(&self) -> impl Iterator<Item = (&FieldSpec, &FeatureValue, Option<i64>)> {
        self.schema
            .fields()
            .iter()
            .zip(&self.values)
            .zip(&self.codes)
            .map(|((field, value), code)| (field, value, *code))
    }

    /// Named raw values, as persisted
    pub fn to_features(&self) -> Features {
        let mut features = Features::with_capacity(self.values.len());
        for (field, value, _) in self.iter() {
            features.push(field.name.clone(), value.clone());
        }
        features
    }
}

/// Named feature values in schema order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Features {
    entries: Vec<(String, FeatureValue)>,
}

impl Features {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, value: FeatureValue) {
        self.entries.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Features {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Binary triage outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum TriageLevel {
    NotUrgent = 0,
    Urgent = 1,
}

impl TriageLevel {
    pub const ALL: [TriageLevel; 2] = [TriageLevel::NotUrgent, TriageLevel::Urgent];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Human-readable label
    pub fn label(self) -> &'static str {
        match self {
            Self::NotUrgent => "not_urgent",
            Self::Urgent => "urgent",
        }
    }
}

impl From<TriageLevel> for u8 {
    fn from(level: TriageLevel) -> Self {
        level.as_u8()
    }
}

impl TryFrom<u8> for TriageLevel {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::NotUrgent),
            1 => Ok(Self::Urgent),
            other => Err(format!("triage level must be 0 or 1, got {other}")),
        }
    }
}

impl std::fmt::Display for TriageLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-level probabilities for a binary classification
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    pub not_urgent: f64,
    pub urgent: f64,
}

impl Confidence {
    /// Validate a `[p(not_urgent), p(urgent)]` pair
    pub fn from_probabilities(probabilities: &[f64]) -> Result<Self> {
        let [not_urgent, urgent] = probabilities else {
            return Err(Error::contract(format!(
                "expected 2 probabilities, got {}",
                probabilities.len()
            )));
        };
        for p in [not_urgent, urgent] {
            if !(0.0..=1.0).contains(p) {
                return Err(Error::contract(format!("probability {p} outside [0, 1]")));
            }
        }
        if (not_urgent + urgent - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(Error::contract(format!(
                "probabilities sum to {}, expected 1.0",
                not_urgent + urgent
            )));
        }
        Ok(Self {
            not_urgent: *not_urgent,
            urgent: *urgent,
        })
    }

    pub fn probability_of(&self, level: TriageLevel) -> f64 {
        match level {
            TriageLevel::NotUrgent => self.not_urgent,
            TriageLevel::Urgent => self.urgent,
        }
    }

    /// Round both probabilities to `places` decimal places for display
    pub fn rounded(&self, places: i32) -> Self {
        let factor = 10f64.powi(places);
        Self {
            not_urgent: (self.not_urgent * factor).round() / factor,
            urgent: (self.urgent * factor).round() / factor,
        }
    }
}

/// Persisted triage entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriageRecord {
    /// Store-assigned identifier
    pub id: i64,

    /// Raw feature values in schema order
    #[serde(flatten)]
    pub features: Features,

    /// Label produced from exactly these features
    pub triage_level: TriageLevel,

    /// Class probabilities, when the model provides them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,

    /// Store-assigned creation time
    pub created_at: DateTime<Utc>,
}

/// Record counts grouped by triage level
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateCounts {
    pub total: u64,
    pub per_label: BTreeMap<TriageLevel, u64>,
}

impl AggregateCounts {
    /// Build from per-level counts; every level is present and `total` is their sum
    pub fn from_counts(counts: impl IntoIterator<Item = (TriageLevel, u64)>) -> Self {
        let mut per_label: BTreeMap<TriageLevel, u64> =
            TriageLevel::ALL.iter().map(|&level| (level, 0)).collect();
        for (level, count) in counts {
            *per_label.entry(level).or_insert(0) += count;
        }
        let total = per_label.values().sum();
        Self { total, per_label }
    }

    pub fn count(&self, level: TriageLevel) -> u64 {
        self.per_label.get(&level).copied().unwrap_or(0)
    }
}

/// On-demand summary: counts plus the records read back with them
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateSnapshot {
    pub total: u64,
    pub per_label: BTreeMap<TriageLevel, u64>,
    pub records: Vec<TriageRecord>,
}

impl AggregateSnapshot {
    pub fn new(counts: AggregateCounts, records: Vec<TriageRecord>) -> Self {
        Self {
            total: counts.total,
            per_label: counts.per_label,
            records,
        }
    }

    pub fn count(&self, level: TriageLevel) -> u64 {
        self.per_label.get(&level).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_accepts_valid_pair() {
        let confidence = Confidence::from_probabilities(&[0.25, 0.75]).unwrap();
        assert_eq!(confidence.probability_of(TriageLevel::Urgent), 0.75);
    }

    #[test]
    fn test_confidence_tolerance() {
        assert!(Confidence::from_probabilities(&[0.3, 0.7 + 5e-7]).is_ok());
        assert!(Confidence::from_probabilities(&[0.3, 0.71]).is_err());
        assert!(Confidence::from_probabilities(&[-0.1, 1.1]).is_err());
        assert!(Confidence::from_probabilities(&[1.0]).is_err());
    }

    #[test]
    fn test_confidence_rounding() {
        let confidence = Confidence {
            not_urgent: 0.12345,
            urgent: 0.87655,
        };
        let rounded = confidence.rounded(3);
        assert_eq!(rounded.not_urgent, 0.123);
        assert_eq!(rounded.urgent, 0.877);
    }

    #[test]
    fn test_triage_level_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&TriageLevel::Urgent).unwrap(), "1");
        let level: TriageLevel = serde_json::from_str("0").unwrap();
        assert_eq!(level, TriageLevel::NotUrgent);
        assert!(serde_json::from_str::<TriageLevel>("2").is_err());
    }

    #[test]
    fn test_aggregate_counts_zero_fill() {
        let counts = AggregateCounts::from_counts([(TriageLevel::Urgent, 3)]);
        assert_eq!(counts.total, 3);
        assert_eq!(counts.count(TriageLevel::NotUrgent), 0);
        assert_eq!(counts.per_label.len(), 2);
    }

    #[test]
    fn test_record_serializes_flat() {
        let mut features = Features::new();
        features.push("gender", FeatureValue::Categorical("female".into()));
        features.push("age", FeatureValue::Integer(45));

        let record = TriageRecord {
            id: 7,
            features,
            triage_level: TriageLevel::Urgent,
            confidence: None,
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["gender"], "female");
        assert_eq!(json["age"], 45);
        assert_eq!(json["triage_level"], 1);
        assert!(json.get("confidence").is_none());
    }
}
