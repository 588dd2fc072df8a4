//! Prometheus metrics for the supervisor.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use storyclip_models::{FailureKind, JobStatus};

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

/// Metric names as constants for consistency.
pub mod names {
    // Job metrics
    pub const JOBS_SUBMITTED_TOTAL: &str = "storyclip_jobs_submitted_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "storyclip_jobs_completed_total";
    pub const JOBS_STALLED_TOTAL: &str = "storyclip_jobs_stalled_total";
    pub const JOBS_ACTIVE: &str = "storyclip_jobs_active";
    pub const JOB_DURATION_SECONDS: &str = "storyclip_job_duration_seconds";

    // Clip metrics
    pub const CLIPS_RENDERED_TOTAL: &str = "storyclip_clips_rendered_total";
    pub const CLIPS_FAILED_TOTAL: &str = "storyclip_clips_failed_total";
    pub const CLIP_RETRIES_TOTAL: &str = "storyclip_clip_retries_total";
}

pub fn record_job_submitted() {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
}

/// Record a job reaching a terminal state.
pub fn record_job_completed(status: JobStatus, duration_secs: f64) {
    let labels = [("status", status.as_str().to_string())];
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_job_stalled() {
    counter!(names::JOBS_STALLED_TOTAL).increment(1);
}

pub fn set_active_jobs(count: usize) {
    gauge!(names::JOBS_ACTIVE).set(count as f64);
}

pub fn record_clip_rendered() {
    counter!(names::CLIPS_RENDERED_TOTAL).increment(1);
}

pub fn record_clip_failed(kind: FailureKind) {
    let labels = [("kind", kind.as_str().to_string())];
    counter!(names::CLIPS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_clip_retry(kind: FailureKind) {
    let labels = [("kind", kind.as_str().to_string())];
    counter!(names::CLIP_RETRIES_TOTAL, &labels).increment(1);
}
