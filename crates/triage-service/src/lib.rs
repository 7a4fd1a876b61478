//! Triage Service
//!
//! Orchestrates one submission through the feature builder, the classifier
//! adapter and the record store, and composes the monitoring summary.
//!
//! All handles are injected at construction; the service holds no other
//! state, so one instance is shared by every request.

pub mod service;

pub use service::TriageService;
