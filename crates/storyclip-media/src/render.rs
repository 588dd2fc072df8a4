//! Single-clip rendering.
//!
//! The render worker runs the engine once for one clip window and classifies
//! the outcome. It never retries; retry policy belongs to the caller.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use storyclip_models::{ClipWindow, EncodingConfig};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::FilterGraph;
use crate::fs_utils::{non_empty_file_size, remove_file_if_exists};
use crate::progress::ProgressCallback;

const RENDER_DURATION_SECONDS: &str = "storyclip_render_duration_seconds";
const RENDERS_TOTAL: &str = "storyclip_renders_total";

/// Everything needed to render one clip.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub source: PathBuf,
    pub window: ClipWindow,
    pub graph: FilterGraph,
    /// Only file the render may write
    pub destination: PathBuf,
    pub timeout: Duration,
}

/// A verified, non-empty output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Outcome of one render.
#[derive(Debug)]
pub struct RenderResult {
    pub index: u32,
    pub failed: bool,
    pub output: Option<RenderedFile>,
    pub error: Option<MediaError>,
    pub elapsed: Duration,
}

impl RenderResult {
    pub fn succeeded(index: u32, output: RenderedFile, elapsed: Duration) -> Self {
        Self {
            index,
            failed: false,
            output: Some(output),
            error: None,
            elapsed,
        }
    }

    pub fn failed(index: u32, error: MediaError, elapsed: Duration) -> Self {
        Self {
            index,
            failed: true,
            output: None,
            error: Some(error),
            elapsed,
        }
    }

    fn from_outcome(index: u32, outcome: MediaResult<RenderedFile>, elapsed: Duration) -> Self {
        match outcome {
            Ok(output) => Self::succeeded(index, output, elapsed),
            Err(error) => Self::failed(index, error, elapsed),
        }
    }

    pub fn into_result(self) -> MediaResult<RenderedFile> {
        match (self.output, self.error) {
            (Some(output), None) => Ok(output),
            (_, Some(error)) => Err(error),
            (None, None) => Err(MediaError::engine_invocation("render produced no result")),
        }
    }
}

/// Renders a single clip. Implemented by [`RenderWorker`]; the supervisor
/// only depends on this seam.
#[async_trait]
pub trait ClipRenderer: Send + Sync {
    async fn render_clip(
        &self,
        request: &RenderRequest,
        cancel: CancellationToken,
        on_progress: Option<ProgressCallback>,
    ) -> RenderResult;
}

/// FFmpeg-backed clip renderer.
#[derive(Debug, Clone, Default)]
pub struct RenderWorker {
    program: Option<PathBuf>,
    encoding: EncodingConfig,
}

impl RenderWorker {
    pub fn new(encoding: EncodingConfig) -> Self {
        Self {
            program: None,
            encoding,
        }
    }

    /// Use a specific engine binary instead of `ffmpeg` from PATH.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn encoding(&self) -> &EncodingConfig {
        &self.encoding
    }

    /// Render `window` of `source` into `destination`.
    pub async fn render(
        &self,
        source: &Path,
        window: &ClipWindow,
        graph: &FilterGraph,
        destination: &Path,
        timeout: Duration,
    ) -> RenderResult {
        let request = RenderRequest {
            source: source.to_path_buf(),
            window: window.clone(),
            graph: graph.clone(),
            destination: destination.to_path_buf(),
            timeout,
        };
        self.render_clip(&request, CancellationToken::new(), None).await
    }

    pub fn build_command(&self, request: &RenderRequest) -> FfmpegCommand {
        FfmpegCommand::new(&request.source, &request.destination)
            .stream_loop(request.window.loops)
            .seek(request.window.start_offset)
            .duration(request.window.duration)
            .video_filter(request.graph.to_filter_chain())
            .encoding(&self.encoding)
    }

    async fn run_engine(
        &self,
        request: &RenderRequest,
        cancel: CancellationToken,
        on_progress: Option<ProgressCallback>,
    ) -> MediaResult<RenderedFile> {
        if let Some(parent) = request.destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // A leftover file from an earlier attempt must not count as output
        remove_file_if_exists(&request.destination).await;

        let mut runner = FfmpegRunner::new()
            .with_cancel(cancel)
            .with_timeout(request.timeout);
        if let Some(program) = &self.program {
            runner = runner.with_program(program);
        }

        runner
            .run_with_progress(&self.build_command(request), on_progress)
            .await?;

        match non_empty_file_size(&request.destination).await {
            Some(size_bytes) => Ok(RenderedFile {
                path: request.destination.clone(),
                size_bytes,
            }),
            None => Err(MediaError::output_missing(&request.destination)),
        }
    }
}

#[async_trait]
impl ClipRenderer for RenderWorker {
    async fn render_clip(
        &self,
        request: &RenderRequest,
        cancel: CancellationToken,
        on_progress: Option<ProgressCallback>,
    ) -> RenderResult {
        let index = request.window.index;
        let started = Instant::now();
        debug!(
            clip = index,
            start = request.window.start_offset,
            duration = request.window.duration,
            loops = request.window.loops,
            "Rendering clip"
        );

        let outcome = self.run_engine(request, cancel, on_progress).await;
        let elapsed = started.elapsed();

        let label = match &outcome {
            Ok(output) => {
                info!(
                    clip = index,
                    size_bytes = output.size_bytes,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Clip rendered"
                );
                "success"
            }
            Err(e) => {
                remove_file_if_exists(&request.destination).await;
                warn!(clip = index, kind = %e.failure_kind(), "Clip render failed: {}", e);
                e.failure_kind().as_str()
            }
        };

        counter!(RENDERS_TOTAL, "outcome" => label).increment(1);
        histogram!(RENDER_DURATION_SECONDS).record(elapsed.as_secs_f64());

        RenderResult::from_outcome(index, outcome, elapsed)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use storyclip_models::{ClipKind, Dimensions, EffectConfig};
    use tempfile::TempDir;

    use crate::filters::FilterGraphBuilder;

    /// Write an executable stand-in for the engine. `$last` is the output path.
    fn fake_engine(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("fake-ffmpeg");
        let script = format!("#!/bin/sh\nfor last; do :; done\n{}\n", body);
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn request(dir: &TempDir, timeout: Duration) -> RenderRequest {
        let graph =
            FilterGraphBuilder::build(&EffectConfig::default(), Dimensions::new(720, 1280)).unwrap();
        RenderRequest {
            source: dir.path().join("source.mp4"),
            window: ClipWindow::new(2, 3.0, 3.0, ClipKind::Standard),
            graph,
            destination: dir.path().join("work").join("clip_002.mp4"),
            timeout,
        }
    }

    #[tokio::test]
    async fn test_successful_render_reports_size() {
        let dir = TempDir::new().unwrap();
        let engine = fake_engine(&dir, r#"printf 'encoded' > "$last""#);
        let worker = RenderWorker::default().with_program(engine);
        let req = request(&dir, Duration::from_secs(10));

        let result = worker.render_clip(&req, CancellationToken::new(), None).await;

        assert!(!result.failed, "{:?}", result.error);
        assert_eq!(result.index, 2);
        let output = result.into_result().unwrap();
        assert_eq!(output.size_bytes, 7);
        assert_eq!(output.path, req.destination);
    }

    #[tokio::test]
    async fn test_zero_exit_without_output_is_failure() {
        let dir = TempDir::new().unwrap();
        let worker = RenderWorker::default().with_program(fake_engine(&dir, "exit 0"));
        let req = request(&dir, Duration::from_secs(10));

        let result = worker.render_clip(&req, CancellationToken::new(), None).await;

        assert!(result.failed);
        assert!(matches!(result.error, Some(MediaError::OutputMissing { .. })));
    }

    #[tokio::test]
    async fn test_zero_exit_with_empty_output_is_failure() {
        let dir = TempDir::new().unwrap();
        let worker = RenderWorker::default().with_program(fake_engine(&dir, r#": > "$last""#));
        let req = request(&dir, Duration::from_secs(10));

        let result = worker.render_clip(&req, CancellationToken::new(), None).await;

        assert!(result.failed);
        assert!(matches!(result.error, Some(MediaError::OutputMissing { .. })));
        assert!(!req.destination.exists());
    }

    #[tokio::test]
    async fn test_non_zero_exit_captures_code_and_stderr() {
        let dir = TempDir::new().unwrap();
        let engine = fake_engine(
            &dir,
            r#"printf 'partial' > "$last"; echo "first line" >&2; echo "Invalid filter" >&2; exit 3"#,
        );
        let worker = RenderWorker::default().with_program(engine);
        let req = request(&dir, Duration::from_secs(10));

        let result = worker.render_clip(&req, CancellationToken::new(), None).await;

        assert!(result.failed);
        match result.error {
            Some(MediaError::EngineExit { code, stderr_tail }) => {
                assert_eq!(code, Some(3));
                assert!(stderr_tail.ends_with("Invalid filter"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(!req.destination.exists(), "partial output must be removed");
    }

    #[tokio::test]
    async fn test_timeout_kills_engine() {
        let dir = TempDir::new().unwrap();
        let worker = RenderWorker::default().with_program(fake_engine(&dir, "exec sleep 30"));
        let req = request(&dir, Duration::from_millis(200));

        let started = Instant::now();
        let result = worker.render_clip(&req, CancellationToken::new(), None).await;

        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(matches!(result.error, Some(MediaError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_cancellation_kills_engine() {
        let dir = TempDir::new().unwrap();
        let worker = RenderWorker::default().with_program(fake_engine(&dir, "exec sleep 30"));
        let req = request(&dir, Duration::from_secs(30));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let result = worker.render_clip(&req, cancel, None).await;
        assert!(matches!(result.error, Some(MediaError::Cancelled)));
    }

    #[tokio::test]
    async fn test_progress_blocks_reach_callback() {
        let dir = TempDir::new().unwrap();
        let engine = fake_engine(
            &dir,
            r#"printf 'out_time_us=1000000\nprogress=continue\nout_time_us=3000000\nprogress=end\n'; printf 'x' > "$last""#,
        );
        let worker = RenderWorker::default().with_program(engine);
        let req = request(&dir, Duration::from_secs(10));

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let callback: ProgressCallback = Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let result = worker
            .render_clip(&req, CancellationToken::new(), Some(callback))
            .await;

        assert!(!result.failed);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_command_includes_window_and_loop() {
        let dir = TempDir::new().unwrap();
        let mut req = request(&dir, Duration::from_secs(1));
        req.window.loops = 1;
        let args = RenderWorker::default().build_command(&req).build_args().join(" ");
        assert!(args.contains("-stream_loop 1 -ss 3.000 -i"));
        assert!(args.contains("-t 3.000 -vf scale=720:1280"));
        assert!(args.contains("-movflags +faststart"));
    }
}
