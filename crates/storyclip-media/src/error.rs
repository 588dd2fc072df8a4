//! Error types for media operations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use storyclip_models::{ClipFailure, FailureKind};
use thiserror::Error;

use crate::filters::FilterGraphError;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    /// The engine could not be started at all.
    #[error("Failed to invoke encoding engine: {message}")]
    EngineInvocation { message: String },

    /// The engine ran and exited unsuccessfully.
    #[error("Encoding engine exited with {}", describe_exit(.code))]
    EngineExit {
        code: Option<i32>,
        stderr_tail: String,
    },

    /// The engine reported success but left no usable output.
    /// The path stays out of the message; see [`MediaError::output_path`].
    #[error("Engine produced no usable output")]
    OutputMissing { path: PathBuf },

    #[error("Operation timed out after {:.1} seconds", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Invalid filter graph: {0}")]
    FilterGraph(#[from] FilterGraphError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

impl MediaError {
    pub fn engine_invocation(message: impl Into<String>) -> Self {
        Self::EngineInvocation {
            message: message.into(),
        }
    }

    pub fn engine_exit(code: Option<i32>, stderr_tail: impl Into<String>) -> Self {
        Self::EngineExit {
            code,
            stderr_tail: stderr_tail.into(),
        }
    }

    pub fn output_missing(path: impl Into<PathBuf>) -> Self {
        Self::OutputMissing { path: path.into() }
    }

    /// Failure taxonomy entry for this error.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            MediaError::EngineExit { .. } => FailureKind::EngineExit,
            MediaError::OutputMissing { .. } => FailureKind::OutputMissing,
            MediaError::Timeout(_) => FailureKind::Timeout,
            MediaError::Cancelled => FailureKind::Cancelled,
            MediaError::FilterGraph(_) => FailureKind::InvalidRequest,
            MediaError::FfmpegNotFound
            | MediaError::FfprobeNotFound
            | MediaError::EngineInvocation { .. }
            | MediaError::FfprobeFailed { .. }
            | MediaError::FileNotFound(_)
            | MediaError::InvalidVideo(_)
            | MediaError::Io(_)
            | MediaError::JsonParse(_) => FailureKind::EngineInvocation,
        }
    }

    /// Whether a fresh attempt at the same clip could succeed.
    ///
    /// A non-zero exit is deterministic for the same input and arguments,
    /// so it is not retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MediaError::Timeout(_)
                | MediaError::OutputMissing { .. }
                | MediaError::EngineInvocation { .. }
                | MediaError::Io(_)
        )
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            MediaError::EngineExit { code, .. } => *code,
            _ => None,
        }
    }

    /// File the failure is about, for debug views.
    pub fn output_path(&self) -> Option<&Path> {
        match self {
            MediaError::OutputMissing { path } => Some(path),
            _ => None,
        }
    }

    pub fn stderr_tail(&self) -> Option<&str> {
        match self {
            MediaError::EngineExit { stderr_tail, .. } if !stderr_tail.is_empty() => {
                Some(stderr_tail)
            }
            MediaError::FfprobeFailed { stderr, .. } => stderr.as_deref(),
            _ => None,
        }
    }

    /// Convert into a manifest failure annotation.
    ///
    /// The message is the error's display text, which never includes stderr;
    /// the tail is carried separately for debug views.
    pub fn to_clip_failure(&self, index: u32, attempts: u32) -> ClipFailure {
        ClipFailure {
            index,
            kind: self.failure_kind(),
            message: self.to_string(),
            exit_code: self.exit_code(),
            stderr_tail: self.stderr_tail().map(str::to_string),
            output_path: self.output_path().map(Path::to_path_buf),
            attempts,
        }
    }
}
