//! Triage service

use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use triage_classifiers::ClassifierAdapter;
use triage_core::{
    AggregateSnapshot, Error, FeatureSchema, FeatureVectorBuilder, Result, TriageRecord,
};
use triage_store::RecordStore;

/// Entry point for the transport layer
#[derive(Clone)]
pub struct TriageService {
    builder: FeatureVectorBuilder,
    classifier: ClassifierAdapter,
    store: Arc<dyn RecordStore>,
}

impl TriageService {
    pub fn new(
        builder: FeatureVectorBuilder,
        classifier: ClassifierAdapter,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        if !builder.schema().same_fields(classifier.schema()) {
            warn!(
                model = classifier.name(),
                "builder and classifier schemas differ; every submission will fail"
            );
        }
        Self {
            builder,
            classifier,
            store,
        }
    }

    /// Validate, classify and persist one raw input
    ///
    /// Any failure aborts the whole submission; nothing is stored unless
    /// the returned record is.
    pub async fn submit(&self, raw: &Value) -> Result<TriageRecord> {
        let start = Instant::now();
        let result = self.run_submit(raw).await;
        let latency_us = start.elapsed().as_micros() as u64;

        metrics::histogram!("triage_submit_latency_us").record(latency_us as f64);

        match &result {
            Ok(record) => {
                metrics::counter!("triage_submissions_total", "outcome" => "ok").increment(1);
                metrics::counter!("triage_predictions_total", "level" => record.triage_level.label())
                    .increment(1);
                info!(
                    id = record.id,
                    level = %record.triage_level,
                    latency_us,
                    "submission stored"
                );
            }
            Err(e) => {
                metrics::counter!("triage_submissions_total", "outcome" => e.code()).increment(1);
                log_failure("submit", e);
            }
        }

        result
    }

    async fn run_submit(&self, raw: &Value) -> Result<TriageRecord> {
        let vector = self.builder.build(raw)?;
        let classification = self.classifier.classify(&vector)?;
        debug!(
            level = %classification.label,
            latency_us = classification.latency_us,
            "classification complete"
        );
        self.store
            .insert_and_fetch(&vector, classification.label, classification.confidence)
            .await
    }

    /// Counts plus every stored record, newest first
    ///
    /// Counts are read before records, so under concurrent submissions
    /// `total` never exceeds the number of records returned.
    pub async fn summarize(&self) -> Result<AggregateSnapshot> {
        let result = async {
            let counts = self.store.aggregate_counts().await?;
            let records = self.store.list_recent(None).await?;
            Ok(AggregateSnapshot::new(counts, records))
        }
        .await;

        if let Err(e) = &result {
            log_failure("summarize", e);
        }
        result
    }

    /// Most recent records; `None` or `Some(0)` returns all
    pub async fn list_recent(&self, limit: Option<usize>) -> Result<Vec<TriageRecord>> {
        let result = self.store.list_recent(limit).await;
        if let Err(e) = &result {
            log_failure("list_recent", e);
        }
        result
    }

    pub async fn fetch(&self, id: i64) -> Result<Option<TriageRecord>> {
        let result = self.store.fetch(id).await;
        if let Err(e) = &result {
            log_failure("fetch", e);
        }
        result
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        self.builder.schema()
    }

    pub fn model_name(&self) -> &str {
        self.classifier.name()
    }
}

fn log_failure(op: &str, err: &Error) {
    if err.is_client_error() {
        info!(op, kind = err.code(), "request rejected: {}", err);
    } else if err.is_retryable() {
        warn!(op, kind = err.code(), "store unavailable: {}", err);
    } else {
        error!(op, kind = err.code(), "server defect: {}", err);
    }
}

impl std::fmt::Debug for TriageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriageService")
            .field("classifier", &self.classifier)
            .field("fields", &self.builder.schema().len())
            .finish()
    }
}
