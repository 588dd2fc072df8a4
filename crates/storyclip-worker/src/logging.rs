//! Structured job logging.

use tracing::{error, info, warn, Span};

use storyclip_models::{ClipFailure, JobId, JobStatus};

/// Logs job lifecycle events with the job id and operation attached.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: &'static str,
}

impl JobLogger {
    pub fn new(job_id: &JobId, operation: &'static str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation,
        }
    }

    pub fn log_start(&self, total_clips: usize) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            total_clips,
            "Job started"
        );
    }

    pub fn log_clip_retry(&self, index: u32, attempt: u32, reason: &str) {
        warn!(
            job_id = %self.job_id,
            operation = self.operation,
            clip = index,
            attempt,
            "Retrying clip: {}", reason
        );
    }

    /// Stderr stays out of the log line; it is kept on the failure record.
    pub fn log_clip_failure(&self, failure: &ClipFailure) {
        warn!(
            job_id = %self.job_id,
            operation = self.operation,
            clip = failure.index,
            kind = %failure.kind,
            attempts = failure.attempts,
            exit_code = ?failure.exit_code,
            "Clip failed: {}", failure.message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            operation = self.operation,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, status: JobStatus, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = self.operation,
            status = %status,
            "Job finished: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        self.operation
    }

    /// Span that wraps everything the job's pipeline does.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = self.operation
        )
    }
}
