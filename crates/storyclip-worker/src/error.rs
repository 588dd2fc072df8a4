//! Supervisor error types.

use thiserror::Error;

use storyclip_models::JobId;

use crate::clip_pipeline::PlanError;
use crate::repository::RepositoryError;

pub type SupervisorResult<T> = Result<T, SupervisorError>;

/// Errors surfaced synchronously to supervisor callers.
///
/// Per-clip render failures never appear here; they are recorded on the job.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Insufficient duration: {0}")]
    InsufficientDuration(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job already exists: {0}")]
    DuplicateJob(JobId),

    #[error("Repository error: {0}")]
    Repository(RepositoryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn invalid_source(msg: impl Into<String>) -> Self {
        Self::InvalidSource(msg.into())
    }

    /// Whether the caller's input was at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SupervisorError::InvalidSource(_)
                | SupervisorError::InvalidRequest(_)
                | SupervisorError::InsufficientDuration(_)
                | SupervisorError::JobNotFound(_)
        )
    }
}

impl From<PlanError> for SupervisorError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::InvalidSource(msg) => Self::InvalidSource(msg),
            PlanError::InvalidRequest(msg) => Self::InvalidRequest(msg),
            PlanError::InsufficientDuration(msg) => Self::InsufficientDuration(msg),
        }
    }
}

impl From<RepositoryError> for SupervisorError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => Self::JobNotFound(id),
            RepositoryError::Duplicate(id) => Self::DuplicateJob(id),
            other => Self::Repository(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_errors_map_one_to_one() {
        let err: SupervisorError = PlanError::InsufficientDuration("short".into()).into();
        assert!(matches!(err, SupervisorError::InsufficientDuration(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_repository_errors_map_to_job_errors() {
        let id = JobId::from_string("job-1");
        let err: SupervisorError = RepositoryError::NotFound(id.clone()).into();
        assert!(matches!(err, SupervisorError::JobNotFound(ref found) if *found == id));

        let err: SupervisorError = RepositoryError::Duplicate(id).into();
        assert!(matches!(err, SupervisorError::DuplicateJob(_)));
        assert!(!err.is_client_error());
    }
}
