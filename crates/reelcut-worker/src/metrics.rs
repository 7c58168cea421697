//! Prometheus metrics for the worker.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_COMPLETED_TOTAL: &str = "reelcut_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "reelcut_jobs_failed_total";
    pub const STAGE_DURATION_SECONDS: &str = "reelcut_stage_duration_seconds";
    pub const STAGE_WARNINGS_TOTAL: &str = "reelcut_stage_warnings_total";
}

/// Install the recorder and serve `/metrics` on `port`.
pub fn init_metrics(port: u16) -> WorkerResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

pub fn record_job_completed() {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
}

pub fn record_job_failed(stage: &str) {
    let labels = [("stage", stage.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_stage_duration(stage: &str, duration_secs: f64) {
    let labels = [("stage", stage.to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_stage_warning(stage: &str) {
    let labels = [("stage", stage.to_string())];
    counter!(names::STAGE_WARNINGS_TOTAL, &labels).increment(1);
}
