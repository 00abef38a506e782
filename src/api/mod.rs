pub mod health;
pub mod metrics;
pub mod openapi;
pub mod query;
pub mod response;

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::control::ControlClient;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub control: Arc<ControlClient>,
    /// Recorder handle, absent when no recorder was installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(control: Arc<ControlClient>) -> Self {
        Self {
            control,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
