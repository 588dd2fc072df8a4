//! Job records and their lifecycle.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::manifest::{Artifact, ClipFailure, FailureKind, ManifestError, ManifestView, OutputManifest};
use crate::request::SourceMedia;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Job lifecycle state.
///
/// Transitions go `Queued -> Running -> {Done | Error}`; `Queued -> Error` covers early cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Queued, JobStatus::Error)
                | (JobStatus::Running, JobStatus::Done)
                | (JobStatus::Running, JobStatus::Error)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Job is already {0}")]
    Terminal(JobStatus),

    #[error("Invalid job transition from {from} to {to}")]
    Invalid { from: JobStatus, to: JobStatus },

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Reason a job ended in `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobError {
    pub kind: FailureKind,
    pub message: String,
}

/// A clip-rendering job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Progress percentage (0-100)
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    /// Last state change or render heartbeat
    pub updated_at: DateTime<Utc>,
    pub source: SourceMedia,
    pub total_clips: u32,
    pub manifest: OutputManifest,
    pub error: Option<JobError>,
    /// Sequence number for event ordering (monotonically increasing)
    pub event_seq: u64,
}

impl Job {
    /// Create a queued job for `total_clips` planned windows.
    pub fn new(id: JobId, source: SourceMedia, total_clips: u32) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Queued,
            progress: 0,
            created_at: now,
            updated_at: now,
            source,
            total_clips,
            manifest: OutputManifest::new(),
            error: None,
            event_seq: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal(self.status));
        }
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::Invalid {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.event_seq += 1;
    }

    fn ensure_running(&self) -> Result<(), TransitionError> {
        match self.status {
            JobStatus::Running => Ok(()),
            status if status.is_terminal() => Err(TransitionError::Terminal(status)),
            status => Err(TransitionError::Invalid {
                from: status,
                to: JobStatus::Running,
            }),
        }
    }

    /// Move from `Queued` to `Running`.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Running)
    }

    /// Refresh `updated_at` without changing anything else.
    pub fn heartbeat(&mut self) -> Result<(), TransitionError> {
        self.ensure_running()?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record a rendered clip and advance progress.
    pub fn record_artifact(&mut self, artifact: Artifact) -> Result<(), TransitionError> {
        self.ensure_running()?;
        self.manifest.append_artifact(artifact)?;
        self.advance_progress();
        Ok(())
    }

    /// Record a clip failure and advance progress.
    pub fn record_failure(&mut self, failure: ClipFailure) -> Result<(), TransitionError> {
        self.ensure_running()?;
        self.manifest.append_failure(failure)?;
        self.advance_progress();
        Ok(())
    }

    fn advance_progress(&mut self) {
        self.progress = self.progress.max(self.running_progress());
        self.touch();
    }

    /// `round(100 * resolved / total)`, held below 100 until the job is done.
    pub fn running_progress(&self) -> u8 {
        if self.total_clips == 0 {
            return 0;
        }
        let resolved = self.manifest.resolved_count() as f64;
        let pct = (100.0 * resolved / f64::from(self.total_clips)).round();
        pct.min(99.0) as u8
    }

    /// True once every planned clip has an artifact or a failure.
    pub fn all_clips_resolved(&self) -> bool {
        self.manifest.resolved_count() >= self.total_clips as usize
    }

    /// Finish a running job.
    ///
    /// With at least one artifact the job is `Done` (degraded when failures
    /// exist). With none it is `Error`, carrying the reason of the
    /// lowest-index failure.
    pub fn finalize(&mut self) -> Result<JobStatus, TransitionError> {
        self.ensure_running()?;

        if self.manifest.artifact_count() > 0 {
            self.transition(JobStatus::Done)?;
            self.progress = 100;
        } else {
            let error = match self.manifest.first_failure() {
                Some(failure) => JobError {
                    kind: failure.kind,
                    message: format!("Clip {} failed: {}", failure.index, failure.message),
                },
                None => JobError {
                    kind: FailureKind::OutputMissing,
                    message: "No clips were produced".to_string(),
                },
            };
            self.transition(JobStatus::Error)?;
            self.error = Some(error);
        }

        Ok(self.status)
    }

    /// Force the job into `Error`. Progress stays where it was.
    pub fn fail(&mut self, kind: FailureKind, message: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Error)?;
        self.error = Some(JobError {
            kind,
            message: message.into(),
        });
        Ok(())
    }

    /// Running with no update for longer than `threshold`.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        let idle = now.signed_duration_since(self.updated_at);
        idle.to_std().map(|idle| idle > threshold).unwrap_or(false)
    }

    pub fn manifest_view(&self) -> ManifestView {
        self.manifest.view(&self.id, self.status, self.progress)
    }

    /// Human-readable state message.
    pub fn state_message(&self) -> String {
        match self.status {
            JobStatus::Queued => "Waiting to start".to_string(),
            JobStatus::Running => format!(
                "Rendering clips ({}/{})",
                self.manifest.resolved_count(),
                self.total_clips
            ),
            JobStatus::Done if self.manifest.failure_count() > 0 => format!(
                "Completed with {} of {} clips ({} failed)",
                self.manifest.artifact_count(),
                self.total_clips,
                self.manifest.failure_count()
            ),
            JobStatus::Done => format!("Completed {} clips", self.manifest.artifact_count()),
            JobStatus::Error => match &self.error {
                Some(error) => format!("Failed ({}): {}", error.kind, error.message),
                None => "Failed".to_string(),
            },
        }
    }

    /// Status snapshot without engine diagnostics.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id.clone(),
            status: self.status,
            progress: self.progress,
            message: self.state_message(),
            total_clips: self.total_clips,
            created_at: self.created_at,
            updated_at: self.updated_at,
            error: self.error.clone(),
            manifest: self.manifest_view(),
        }
    }

    /// Snapshot including per-clip failures with stderr tails.
    pub fn debug_snapshot(&self) -> JobDebugSnapshot {
        JobDebugSnapshot {
            snapshot: self.snapshot(),
            source: self.source.clone(),
            failures: self.manifest.failures().cloned().collect(),
            artifacts: self.manifest.artifacts().cloned().collect(),
            event_seq: self.event_seq,
        }
    }
}

/// Default status response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    /// Human-readable state
    pub message: String,
    pub total_clips: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub manifest: ManifestView,
}

/// Operator view with engine diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobDebugSnapshot {
    #[serde(flatten)]
    pub snapshot: JobSnapshot,
    pub source: SourceMedia,
    pub failures: Vec<ClipFailure>,
    pub artifacts: Vec<Artifact>,
    pub event_seq: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn running_job(total: u32) -> Job {
        let mut job = Job::new(JobId::new(), SourceMedia::new("/in.mp4", 30.0), total);
        job.start().unwrap();
        job
    }

    fn artifact(index: u32) -> Artifact {
        Artifact {
            index,
            path: PathBuf::from("/out/clip.mp4"),
            url: "https://cdn.test/clip.mp4".to_string(),
            size_bytes: 10,
            duration_seconds: 3.0,
            format: "mp4".to_string(),
        }
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut job = Job::new(JobId::new(), SourceMedia::new("/in.mp4", 30.0), 1);
        assert_eq!(job.status, JobStatus::Queued);
        assert!(matches!(
            job.finalize(),
            Err(TransitionError::Invalid { .. })
        ));

        job.start().unwrap();
        job.record_artifact(artifact(1)).unwrap();
        assert_eq!(job.finalize().unwrap(), JobStatus::Done);
        assert_eq!(job.progress, 100);

        assert_eq!(job.start(), Err(TransitionError::Terminal(JobStatus::Done)));
        assert_eq!(
            job.fail(FailureKind::StalledJob, "late"),
            Err(TransitionError::Terminal(JobStatus::Done))
        );
    }

    #[test]
    fn test_progress_is_monotonic_and_capped() {
        let mut job = running_job(3);
        job.record_artifact(artifact(1)).unwrap();
        assert_eq!(job.progress, 33);
        job.record_failure(ClipFailure::new(2, FailureKind::Timeout, "slow"))
            .unwrap();
        assert_eq!(job.progress, 67);
        job.record_artifact(artifact(3)).unwrap();
        assert_eq!(job.progress, 99);
        assert_eq!(job.status, JobStatus::Running);

        job.finalize().unwrap();
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_zero_successes_finalize_to_error_with_first_failure() {
        let mut job = running_job(2);
        job.record_failure(ClipFailure::new(2, FailureKind::Timeout, "slow"))
            .unwrap();
        job.record_failure(ClipFailure::new(1, FailureKind::EngineExit, "exit code 1"))
            .unwrap();

        assert_eq!(job.finalize().unwrap(), JobStatus::Error);
        let error = job.error.clone().unwrap();
        assert_eq!(error.kind, FailureKind::EngineExit);
        assert!(error.message.contains("Clip 1"));
        assert!(job.progress < 100);
    }

    #[test]
    fn test_terminal_job_rejects_artifacts() {
        let mut job = running_job(2);
        job.fail(FailureKind::Cancelled, "cancelled by operator").unwrap();
        assert_eq!(
            job.record_artifact(artifact(1)),
            Err(TransitionError::Terminal(JobStatus::Error))
        );
        assert_eq!(job.manifest.artifact_count(), 0);
    }

    #[test]
    fn test_stale_detection_only_for_running() {
        let mut job = running_job(1);
        let later = job.updated_at + chrono::Duration::seconds(180);
        assert!(job.is_stale(later, Duration::from_secs(120)));
        assert!(!job.is_stale(job.updated_at, Duration::from_secs(120)));

        job.fail(FailureKind::StalledJob, "stalled").unwrap();
        assert!(!job.is_stale(later, Duration::from_secs(120)));
    }

    #[test]
    fn test_snapshot_hides_stderr() {
        let mut job = running_job(1);
        let mut failure = ClipFailure::new(1, FailureKind::EngineExit, "engine exited with code 1");
        failure.stderr_tail = Some("Invalid argument".to_string());
        job.record_failure(failure).unwrap();
        job.finalize().unwrap();

        let snapshot = serde_json::to_string(&job.snapshot()).unwrap();
        assert!(!snapshot.contains("Invalid argument"));

        let debug = job.debug_snapshot();
        assert_eq!(
            debug.failures[0].stderr_tail.as_deref(),
            Some("Invalid argument")
        );
    }
}
