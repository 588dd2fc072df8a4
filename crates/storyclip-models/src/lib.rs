//! Shared data models for the StoryClip pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their lifecycle and status snapshots
//! - Clip windows and distribution requests
//! - Effect configuration (overrides and the resolved form)
//! - Encoding configuration
//! - Output manifests and job events

pub mod clip;
pub mod effects;
pub mod encoding;
pub mod event;
pub mod job;
pub mod manifest;
pub mod request;

// Re-export common types
pub use clip::{clip_file_name, ClipKind, ClipWindow, MAX_CLIPS, MAX_CLIP_DURATION_SECS};
pub use effects::{
    AspectRatio, AspectRatioParseError, ColorFilter, ColorPreset, EffectConfig, EffectError,
    EffectOverrides, FitMode, Indicator, IndicatorOverrides, IndicatorPosition, IndicatorStyle,
    IndicatorTiming, Resolution, TextureKind, TextureOverlay,
};
pub use encoding::EncodingConfig;
pub use event::JobEvent;
pub use job::{Job, JobDebugSnapshot, JobError, JobId, JobSnapshot, JobStatus, TransitionError};
pub use manifest::{
    Artifact, ClipFailure, FailureKind, ManifestClip, ManifestError, ManifestView, OutputManifest,
};
pub use request::{ClipCount, Dimensions, DistributionRequest, SourceMedia};
