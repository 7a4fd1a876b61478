//! Triage Core
//!
//! Types and pure logic shared by every triage component.
//!
//! This crate provides:
//! - The declared [`FeatureSchema`] consumed by the builder, the classifier
//!   adapter and the record store
//! - The [`FeatureVectorBuilder`] that validates raw payloads
//! - Persisted and derived records ([`TriageRecord`], [`AggregateSnapshot`])
//! - The error taxonomy surfaced at the service boundary

pub mod builder;
pub mod error;
pub mod schema;
pub mod types;

pub use builder::FeatureVectorBuilder;
pub use error::{Error, InferenceFault, Result, ValidationError};
pub use schema::{CategoricalEncoding, FeatureSchema, FieldKind, FieldSpec, UnknownFieldPolicy};
pub use types::{
    AggregateCounts, AggregateSnapshot, Confidence, FeatureValue, FeatureVector, Features,
    TriageLevel, TriageRecord,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::builder::FeatureVectorBuilder;
    pub use crate::error::{Error, InferenceFault, Result, ValidationError};
    pub use crate::schema::{FeatureSchema, FieldKind, FieldSpec};
    pub use crate::types::{Confidence, FeatureValue, FeatureVector, TriageLevel, TriageRecord};
}
