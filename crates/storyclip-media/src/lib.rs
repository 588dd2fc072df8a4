#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper for clip rendering.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:1`
//! - Timeout and cancellation via `CancellationToken`
//! - Deterministic filter graphs built from a resolved effect configuration
//! - The render worker that turns one clip window into one output file

pub mod command;
pub mod error;
pub mod filters;
pub mod fs_utils;
pub mod probe;
pub mod progress;
pub mod render;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use filters::{FilterDescriptor, FilterGraph, FilterGraphBuilder, FilterGraphError};
pub use probe::{probe_source, probe_video, VideoInfo};
pub use progress::{FfmpegProgress, ProgressCallback};
pub use render::{ClipRenderer, RenderRequest, RenderResult, RenderWorker, RenderedFile};
