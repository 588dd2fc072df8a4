//! Per-job output manifest.
//!
//! Artifacts are append-only and keyed by clip index, so the read view is
//! always index-ordered. Failure annotations live next to them; a clip index
//! resolves to exactly one of the two.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::{JobId, JobStatus};

/// Classified reason for a clip or job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidRequest,
    InsufficientDuration,
    EngineInvocation,
    EngineExit,
    OutputMissing,
    Timeout,
    StalledJob,
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidRequest => "invalid_request",
            FailureKind::InsufficientDuration => "insufficient_duration",
            FailureKind::EngineInvocation => "engine_invocation",
            FailureKind::EngineExit => "engine_exit",
            FailureKind::OutputMissing => "output_missing",
            FailureKind::Timeout => "timeout",
            FailureKind::StalledJob => "stalled_job",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successfully rendered clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Artifact {
    /// Clip window index
    pub index: u32,
    /// Final location on disk
    pub path: PathBuf,
    /// Public URL
    pub url: String,
    pub size_bytes: u64,
    pub duration_seconds: f64,
    /// Container format (e.g. "mp4")
    pub format: String,
}

/// A clip that could not be rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipFailure {
    pub index: u32,
    pub kind: FailureKind,
    /// Human-readable reason (never contains engine stderr)
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Last lines of engine stderr, only surfaced in debug views
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_tail: Option<String>,
    /// Output file the failure concerns, only surfaced in debug views
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Render attempts made before giving up
    pub attempts: u32,
}

impl ClipFailure {
    pub fn new(index: u32, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            index,
            kind,
            message: message.into(),
            exit_code: None,
            stderr_tail: None,
            output_path: None,
            attempts: 1,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    #[error("Clip {0} already resolved")]
    AlreadyResolved(u32),
}

/// Append-only collection of artifacts and failures for one job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OutputManifest {
    artifacts: BTreeMap<u32, Artifact>,
    failures: BTreeMap<u32, ClipFailure>,
}

impl OutputManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an artifact. Each index may be resolved only once.
    pub fn append_artifact(&mut self, artifact: Artifact) -> Result<(), ManifestError> {
        self.ensure_unresolved(artifact.index)?;
        self.artifacts.insert(artifact.index, artifact);
        Ok(())
    }

    /// Annotate a clip index as failed.
    pub fn append_failure(&mut self, failure: ClipFailure) -> Result<(), ManifestError> {
        self.ensure_unresolved(failure.index)?;
        self.failures.insert(failure.index, failure);
        Ok(())
    }

    fn ensure_unresolved(&self, index: u32) -> Result<(), ManifestError> {
        if self.artifacts.contains_key(&index) || self.failures.contains_key(&index) {
            return Err(ManifestError::AlreadyResolved(index));
        }
        Ok(())
    }

    /// Artifacts in clip-index order.
    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.values()
    }

    /// Failures in clip-index order.
    pub fn failures(&self) -> impl Iterator<Item = &ClipFailure> {
        self.failures.values()
    }

    pub fn artifact_count(&self) -> usize {
        self.artifacts.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Number of clip indices resolved either way.
    pub fn resolved_count(&self) -> usize {
        self.artifacts.len() + self.failures.len()
    }

    pub fn failed_indices(&self) -> Vec<u32> {
        self.failures.keys().copied().collect()
    }

    /// Failure with the lowest clip index.
    pub fn first_failure(&self) -> Option<&ClipFailure> {
        self.failures.values().next()
    }

    /// Read view joined with job state.
    pub fn view(&self, job_id: &JobId, status: JobStatus, progress: u8) -> ManifestView {
        let failed_indices = self.failed_indices();
        ManifestView {
            job_id: job_id.clone(),
            status,
            progress,
            clips: self
                .artifacts
                .values()
                .map(|a| ManifestClip {
                    index: a.index,
                    url: a.url.clone(),
                    duration_seconds: a.duration_seconds,
                    size_bytes: a.size_bytes,
                })
                .collect(),
            degraded: !failed_indices.is_empty(),
            failed_indices,
        }
    }
}

/// Entry in the public manifest view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManifestClip {
    pub index: u32,
    pub url: String,
    pub duration_seconds: f64,
    pub size_bytes: u64,
}

/// Public manifest shape returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManifestView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub clips: Vec<ManifestClip>,
    pub failed_indices: Vec<u32>,
    /// True when the job finished with at least one failed clip
    pub degraded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(index: u32) -> Artifact {
        Artifact {
            index,
            path: PathBuf::from(format!("/out/clip_{:03}.mp4", index)),
            url: format!("https://cdn.test/job/clip_{:03}.mp4", index),
            size_bytes: 1024,
            duration_seconds: 3.0,
            format: "mp4".to_string(),
        }
    }

    #[test]
    fn test_view_is_index_ordered() {
        let mut manifest = OutputManifest::new();
        manifest.append_artifact(artifact(3)).unwrap();
        manifest.append_artifact(artifact(1)).unwrap();
        manifest
            .append_failure(ClipFailure::new(2, FailureKind::OutputMissing, "no output"))
            .unwrap();

        let view = manifest.view(&JobId::from_string("job-1"), JobStatus::Done, 100);
        let indices: Vec<u32> = view.clips.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![1, 3]);
        assert_eq!(view.failed_indices, vec![2]);
        assert!(view.degraded);
    }

    #[test]
    fn test_index_resolves_once() {
        let mut manifest = OutputManifest::new();
        manifest.append_artifact(artifact(1)).unwrap();
        assert_eq!(
            manifest.append_artifact(artifact(1)),
            Err(ManifestError::AlreadyResolved(1))
        );
        assert_eq!(
            manifest.append_failure(ClipFailure::new(1, FailureKind::Timeout, "slow")),
            Err(ManifestError::AlreadyResolved(1))
        );
        assert_eq!(manifest.resolved_count(), 1);
    }

    #[test]
    fn test_first_failure_is_lowest_index() {
        let mut manifest = OutputManifest::new();
        manifest
            .append_failure(ClipFailure::new(4, FailureKind::Timeout, "slow"))
            .unwrap();
        manifest
            .append_failure(ClipFailure::new(2, FailureKind::EngineExit, "exit 1"))
            .unwrap();
        assert_eq!(manifest.first_failure().unwrap().index, 2);
    }

    #[test]
    fn test_view_uses_public_field_names() {
        let mut manifest = OutputManifest::new();
        manifest.append_artifact(artifact(1)).unwrap();
        let view = manifest.view(&JobId::from_string("job-1"), JobStatus::Done, 100);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["jobId"], "job-1");
        assert_eq!(json["clips"][0]["sizeBytes"], 1024);
        assert_eq!(json["clips"][0]["durationSeconds"], 3.0);
        assert_eq!(json["failedIndices"], serde_json::json!([]));
        assert_eq!(json["degraded"], false);
    }
}
