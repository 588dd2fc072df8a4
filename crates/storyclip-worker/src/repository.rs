//! Job table.
//!
//! Every job mutation goes through [`JobRepository`]; the in-memory
//! implementation applies each update under one write lock so transitions for
//! a job are serialised.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use storyclip_models::{Artifact, ClipFailure, FailureKind, Job, JobId, TransitionError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RepositoryError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job already exists: {0}")]
    Duplicate(JobId),

    #[error("Job {job_id} rejected update: {source}")]
    Rejected {
        job_id: JobId,
        #[source]
        source: TransitionError,
    },
}

impl RepositoryError {
    /// The job had already reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RepositoryError::Rejected {
                source: TransitionError::Terminal(_),
                ..
            }
        )
    }
}

/// State change applied to a stored job.
#[derive(Debug, Clone)]
pub enum JobUpdate {
    /// QUEUED -> RUNNING
    Start,
    /// Refresh `updated_at` while a render is making progress
    Heartbeat,
    ClipFailed(ClipFailure),
    /// Resolve to DONE or ERROR from the manifest
    Finalize,
    /// Force ERROR (stall, cancel)
    Fail { kind: FailureKind, message: String },
}

impl JobUpdate {
    fn apply(self, job: &mut Job) -> Result<(), TransitionError> {
        match self {
            JobUpdate::Start => job.start(),
            JobUpdate::Heartbeat => job.heartbeat(),
            JobUpdate::ClipFailed(failure) => job.record_failure(failure),
            JobUpdate::Finalize => job.finalize().map(|_| ()),
            JobUpdate::Fail { kind, message } => job.fail(kind, message),
        }
    }
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Store a new job. Fails with `Duplicate` if the id is taken.
    async fn create_job(&self, job: Job) -> Result<(), RepositoryError>;

    /// Apply a state change and return the updated job.
    async fn update_job_progress(&self, job_id: &JobId, update: JobUpdate) -> Result<Job, RepositoryError>;

    /// Append a rendered clip. Rejected once the job is terminal.
    async fn append_artifact(&self, job_id: &JobId, artifact: Artifact) -> Result<Job, RepositoryError>;

    async fn record_failure(&self, job_id: &JobId, failure: ClipFailure) -> Result<Job, RepositoryError> {
        self.update_job_progress(job_id, JobUpdate::ClipFailed(failure)).await
    }

    async fn get_job(&self, job_id: &JobId) -> Result<Job, RepositoryError>;

    async fn list_jobs(&self) -> Result<Vec<Job>, RepositoryError>;
}

/// Single-node job table.
#[derive(Debug, Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn mutate<F>(&self, job_id: &JobId, f: F) -> Result<Job, RepositoryError>
    where
        F: FnOnce(&mut Job) -> Result<(), TransitionError> + Send,
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| RepositoryError::NotFound(job_id.clone()))?;
        f(job).map_err(|source| RepositoryError::Rejected {
            job_id: job_id.clone(),
            source,
        })?;
        Ok(job.clone())
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create_job(&self, job: Job) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(RepositoryError::Duplicate(job.id));
        }
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn update_job_progress(&self, job_id: &JobId, update: JobUpdate) -> Result<Job, RepositoryError> {
        self.mutate(job_id, move |job| update.apply(job)).await
    }

    async fn append_artifact(&self, job_id: &JobId, artifact: Artifact) -> Result<Job, RepositoryError> {
        self.mutate(job_id, move |job| job.record_artifact(artifact)).await
    }

    async fn get_job(&self, job_id: &JobId) -> Result<Job, RepositoryError> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(job_id.clone()))
    }

    async fn list_jobs(&self) -> Result<Vec<Job>, RepositoryError> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs)
    }
}
