//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use storyclip_models::EncodingConfig;

use crate::error::{MediaError, MediaResult};
use crate::progress::{ProgressCallback, ProgressParser};

/// Number of stderr lines kept for diagnostics.
pub const DEFAULT_STDERR_TAIL_LINES: usize = 20;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    /// Arguments placed before `-i`
    input_args: Vec<String>,
    /// Arguments placed after `-i`
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Input seek (fast, keyframe-accurate with re-encode).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Loop the input `count` extra times.
    pub fn stream_loop(self, count: u32) -> Self {
        if count == 0 {
            return self;
        }
        self.input_arg("-stream_loop").input_arg(count.to_string())
    }

    /// Output duration; applied after looping so it bounds the whole clip.
    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Apply codec, quality and container arguments.
    pub fn encoding(self, encoding: &EncodingConfig) -> Self {
        self.output_args(encoding.to_ffmpeg_args())
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.extend(["-hide_banner", "-nostdin", "-nostats"].map(String::from));
        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Progress blocks go to stdout so stderr stays diagnostic-only
        args.push("-progress".to_string());
        args.push("pipe:1".to_string());

        args.extend(self.input_args.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with progress tracking, timeout and cancellation.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    /// Explicit engine binary; `ffmpeg` from PATH when unset
    program: Option<PathBuf>,
    cancel: Option<CancellationToken>,
    timeout: Option<Duration>,
    stderr_tail_lines: usize,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self {
            program: None,
            cancel: None,
            timeout: None,
            stderr_tail_lines: DEFAULT_STDERR_TAIL_LINES,
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_stderr_tail_lines(mut self, lines: usize) -> Self {
        self.stderr_tail_lines = lines.max(1);
        self
    }

    fn resolve_program(&self) -> MediaResult<PathBuf> {
        match &self.program {
            Some(program) => Ok(program.clone()),
            None => check_ffmpeg(),
        }
    }

    /// Run an FFmpeg command.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, None).await
    }

    /// Run an FFmpeg command, reporting each progress block to `on_progress`.
    pub async fn run_with_progress(
        &self,
        cmd: &FfmpegCommand,
        on_progress: Option<ProgressCallback>,
    ) -> MediaResult<()> {
        let program = self.resolve_program()?;
        let args = cmd.build_args();
        debug!("Running FFmpeg: {} {}", program.display(), args.join(" "));

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                MediaError::engine_invocation(format!("{}: {}", program.display(), e))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::engine_invocation("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::engine_invocation("stderr not captured"))?;

        let progress_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut parser = ProgressParser::new();
            while let Ok(Some(line)) = lines.next_line().await {
                if let (Some(block), Some(callback)) = (parser.feed(&line), on_progress.as_ref()) {
                    callback(block);
                }
            }
        });

        let tail_lines = self.stderr_tail_lines;
        let stderr_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut tail = VecDeque::with_capacity(tail_lines);
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == tail_lines {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Vec::from(tail).join("\n")
        });

        match self.wait_for_exit(&mut child).await {
            Ok(status) => {
                let _ = progress_handle.await;
                let stderr_tail = stderr_handle.await.unwrap_or_default();
                if status.success() {
                    Ok(())
                } else {
                    Err(MediaError::engine_exit(status.code(), stderr_tail))
                }
            }
            Err(e) => {
                progress_handle.abort();
                stderr_handle.abort();
                Err(e)
            }
        }
    }

    /// Wait for the child, killing it on timeout or cancellation.
    async fn wait_for_exit(&self, child: &mut Child) -> MediaResult<ExitStatus> {
        let cancel = self.cancel.clone().unwrap_or_default();
        let timeout = self.timeout;
        let deadline = async move {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            status = child.wait() => {
                status.map_err(|e| MediaError::engine_invocation(format!("wait failed: {}", e)))
            }
            _ = cancel.cancelled() => {
                info!("FFmpeg cancelled, killing process");
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill cancelled FFmpeg process: {}", e);
                }
                Err(MediaError::Cancelled)
            }
            _ = deadline => {
                let limit = timeout.unwrap_or_default();
                warn!("FFmpeg timed out after {:?}, killing process", limit);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill timed out FFmpeg process: {}", e);
                }
                Err(MediaError::Timeout(limit))
            }
        }
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("input.mp4", "output.mp4")
            .seek(10.0)
            .duration(3.0)
            .video_filter("null")
            .encoding(&EncodingConfig::default());

        let args = cmd.build_args();
        let joined = args.join(" ");
        assert!(joined.starts_with("-y "));
        assert!(joined.contains("-progress pipe:1"));
        assert!(joined.contains("-ss 10.000 -i input.mp4"));
        assert!(joined.contains("-t 3.000"));
        assert!(joined.contains("-vf null"));
        assert!(joined.contains("-c:v libx264"));
        assert_eq!(args.last().map(String::as_str), Some("output.mp4"));
    }

    #[test]
    fn test_stream_loop_precedes_input() {
        let args = FfmpegCommand::new("in.mp4", "out.mp4")
            .stream_loop(2)
            .seek(1.0)
            .build_args();
        let loop_pos = args.iter().position(|a| a == "-stream_loop").unwrap();
        let input_pos = args.iter().position(|a| a == "-i").unwrap();
        assert!(loop_pos < input_pos);
        assert_eq!(args[loop_pos + 1], "2");

        let without = FfmpegCommand::new("in.mp4", "out.mp4").stream_loop(0).build_args();
        assert!(!without.contains(&"-stream_loop".to_string()));
    }

    #[tokio::test]
    async fn test_missing_program_is_invocation_error() {
        let cmd = FfmpegCommand::new("in.mp4", "out.mp4");
        let err = FfmpegRunner::new()
            .with_program("/nonexistent/storyclip-ffmpeg")
            .run(&cmd)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::EngineInvocation { .. }));
    }
}
