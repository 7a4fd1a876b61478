//! Shared application state

use metrics_exporter_prometheus::PrometheusHandle;
use triage_service::TriageService;

/// State handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub service: TriageService,

    /// Prometheus render handle; absent when no recorder is installed
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(service: TriageService) -> Self {
        Self {
            service,
            metrics_handle: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
