//! Declared feature schema
//!
//! A [`FeatureSchema`] is the single source of truth for field names, order
//! and types. The builder validates against it, the classifier adapter checks
//! the model artifact against it at startup, and the record store derives its
//! table columns from it.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Column names owned by the record store that fields may not shadow
pub const RESERVED_COLUMNS: &[&str] = &[
    "id",
    "triage_level",
    "confidence_not_urgent",
    "confidence_urgent",
    "created_at",
];

/// Declared type of a feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Categorical,
    Integer,
    Float,
    Boolean,
}

impl FieldKind {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Categorical => "categorical",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
        };
        f.write_str(s)
    }
}

/// One declared field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Canonical name, also used as the storage column
    pub name: String,

    /// Declared type
    pub kind: FieldKind,

    /// Inclusive lower bound for numeric fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    /// Inclusive upper bound for numeric fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    /// Alternative keys accepted in keyed payloads
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            min: None,
            max: None,
            aliases: Vec::new(),
        }
    }

    pub fn categorical(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Categorical)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Float)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    /// Set inclusive bounds
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Add accepted alias keys
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    /// Check a numeric value against the declared bounds
    pub fn in_range(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

/// What the builder does with keys that match no field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownFieldPolicy {
    #[default]
    Ignore,
    Reject,
}

/// How categorical values are handed to the classifier
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CategoricalEncoding {
    /// Raw strings only; the model artifact owns encoding
    #[default]
    PassThrough,

    /// Integer codes from an injected table, keyed by field then category
    Table {
        tables: HashMap<String, HashMap<String, i64>>,
    },
}

impl CategoricalEncoding {
    /// Encoding table for a field, if one is configured
    pub fn table_for(&self, field: &str) -> Option<&HashMap<String, i64>> {
        match self {
            Self::PassThrough => None,
            Self::Table { tables } => tables.get(field),
        }
    }
}

/// Serialized form of a schema, validated on conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSpec {
    pub fields: Vec<FieldSpec>,

    #[serde(default)]
    pub unknown_fields: UnknownFieldPolicy,

    #[serde(default)]
    pub encoding: CategoricalEncoding,
}

/// Ordered, validated set of feature fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SchemaSpec", into = "SchemaSpec")]
pub struct FeatureSchema {
    fields: Vec<FieldSpec>,
    unknown_fields: UnknownFieldPolicy,
    encoding: CategoricalEncoding,
    keys: HashMap<String, usize>,
}

impl FeatureSchema {
    /// Build a schema from fields, validating names, aliases and bounds
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self> {
        Self::from_spec(SchemaSpec {
            fields,
            unknown_fields: UnknownFieldPolicy::default(),
            encoding: CategoricalEncoding::default(),
        })
    }

    /// Validate a serialized schema
    pub fn from_spec(spec: SchemaSpec) -> Result<Self> {
        if spec.fields.is_empty() {
            return Err(Error::config("feature schema declares no fields"));
        }

        let mut keys = HashMap::new();
        for (index, field) in spec.fields.iter().enumerate() {
            if !is_identifier(&field.name) {
                return Err(Error::config(format!(
                    "field name '{}' must match [a-z_][a-z0-9_]*",
                    field.name
                )));
            }
            if RESERVED_COLUMNS.contains(&field.name.as_str()) {
                return Err(Error::config(format!(
                    "field name '{}' is reserved",
                    field.name
                )));
            }
            if let (Some(min), Some(max)) = (field.min, field.max) {
                if min > max {
                    return Err(Error::config(format!(
                        "field '{}' has min {} greater than max {}",
                        field.name, min, max
                    )));
                }
            }
            if (field.min.is_some() || field.max.is_some()) && !field.kind.is_numeric() {
                return Err(Error::config(format!(
                    "field '{}' is {} and cannot declare bounds",
                    field.name, field.kind
                )));
            }

            for key in std::iter::once(&field.name).chain(field.aliases.iter()) {
                if keys.insert(key.clone(), index).is_some() {
                    return Err(Error::config(format!("duplicate field key '{}'", key)));
                }
            }
        }

        if let CategoricalEncoding::Table { tables } = &spec.encoding {
            for name in tables.keys() {
                match keys.get(name).map(|&i| &spec.fields[i]) {
                    Some(field) if field.kind == FieldKind::Categorical && &field.name == name => {}
                    _ => {
                        return Err(Error::config(format!(
                            "encoding table '{}' does not name a categorical field",
                            name
                        )))
                    }
                }
            }
        }

        Ok(Self {
            fields: spec.fields,
            unknown_fields: spec.unknown_fields,
            encoding: spec.encoding,
            keys,
        })
    }

    /// The 9-field emergency triage schema
    pub fn triage_default() -> Self {
        let fields = vec![
            FieldSpec::categorical("gender"),
            FieldSpec::integer("age").with_range(0.0, 130.0),
            FieldSpec::categorical("chief_complaint").with_aliases(["ChiefComplaint"]),
            FieldSpec::integer("pain_grade")
                .with_range(0.0, 10.0)
                .with_aliases(["PainGrade"]),
            FieldSpec::integer("blood_pressure_systolic").with_aliases(["BlooddpressurSystol"]),
            FieldSpec::integer("blood_pressure_diastolic").with_aliases(["BlooddpressurDiastol"]),
            FieldSpec::integer("pulse_rate").with_aliases(["PulseRate"]),
            FieldSpec::integer("respiratory_rate").with_aliases(["RespiratoryRate", "Respiration"]),
            FieldSpec::integer("o2_saturation")
                .with_range(0.0, 100.0)
                .with_aliases(["O2Saturation"]),
        ];

        // Static field table; validation cannot fail.
        Self::new(fields).unwrap_or_else(|e| unreachable!("default schema is invalid: {e}"))
    }

    /// Parse a schema from YAML
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::config(format!("invalid schema: {e}")))
    }

    /// Load a schema from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read schema {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Set the unknown-field policy
    pub fn with_unknown_fields(mut self, policy: UnknownFieldPolicy) -> Self {
        self.unknown_fields = policy;
        self
    }

    /// Set the categorical encoding, re-validating table names
    pub fn with_encoding(self, encoding: CategoricalEncoding) -> Result<Self> {
        Self::from_spec(SchemaSpec {
            fields: self.fields,
            unknown_fields: self.unknown_fields,
            encoding,
        })
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn unknown_fields(&self) -> UnknownFieldPolicy {
        self.unknown_fields
    }

    pub fn encoding(&self) -> &CategoricalEncoding {
        &self.encoding
    }

    /// Canonical field names in declared order
    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Index of a field by canonical name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Index of the field a payload key refers to (name or alias)
    pub fn resolve_key(&self, key: &str) -> Option<usize> {
        self.keys.get(key).copied()
    }

    /// Whether another schema declares the same fields in the same order
    pub fn same_fields(&self, other: &FeatureSchema) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.name == b.name && a.kind == b.kind)
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::triage_default()
    }
}

impl TryFrom<SchemaSpec> for FeatureSchema {
    type Error = Error;

    fn try_from(spec: SchemaSpec) -> Result<Self> {
        Self::from_spec(spec)
    }
}

impl From<FeatureSchema> for SchemaSpec {
    fn from(schema: FeatureSchema) -> Self {
        Self {
            fields: schema.fields,
            unknown_fields: schema.unknown_fields,
            encoding: schema.encoding,
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
