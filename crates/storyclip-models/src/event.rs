//! Job lifecycle events emitted to the notification layer.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{Job, JobId, JobStatus};
use crate::manifest::ManifestView;

/// Event published whenever a job changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Status or progress changed
    JobUpdated {
        job_id: JobId,
        status: JobStatus,
        progress: u8,
        message: String,
        seq: u64,
    },
    /// Job reached a terminal state
    JobCompleted {
        job_id: JobId,
        status: JobStatus,
        manifest: ManifestView,
        seq: u64,
    },
}

impl JobEvent {
    pub fn updated(job: &Job) -> Self {
        JobEvent::JobUpdated {
            job_id: job.id.clone(),
            status: job.status,
            progress: job.progress,
            message: job.state_message(),
            seq: job.event_seq,
        }
    }

    pub fn completed(job: &Job) -> Self {
        JobEvent::JobCompleted {
            job_id: job.id.clone(),
            status: job.status,
            manifest: job.manifest_view(),
            seq: job.event_seq,
        }
    }

    /// Event for the job's current state.
    pub fn for_job(job: &Job) -> Self {
        if job.is_terminal() {
            Self::completed(job)
        } else {
            Self::updated(job)
        }
    }

    pub fn job_id(&self) -> &JobId {
        match self {
            JobEvent::JobUpdated { job_id, .. } | JobEvent::JobCompleted { job_id, .. } => job_id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, JobEvent::JobCompleted { .. })
    }
}
