//! Supervisor configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// System-wide cap on concurrent engine processes
    pub max_concurrent_renders: usize,
    /// Clips rendered in parallel within a single job
    pub per_job_concurrency: usize,
    /// Per-clip render timeout
    pub clip_timeout: Duration,
    /// A running job with no update for this long is stalled
    pub stall_threshold: Duration,
    /// How often the watchdog sweeps the job table
    pub watchdog_interval: Duration,
    /// Minimum spacing between render heartbeats for one clip
    pub heartbeat_interval: Duration,
    /// Retries for a retryable clip failure (not counting the first attempt)
    pub max_clip_retries: u32,
    /// Base delay for clip retry backoff
    pub retry_base_delay: Duration,
    /// Scratch directory; each job renders into `<work_dir>/<job_id>/`
    pub work_dir: PathBuf,
    /// Published clips land in `<output_dir>/<job_id>/`
    pub output_dir: PathBuf,
    /// Prefix for artifact URLs
    pub public_base_url: String,
    /// Buffered job events per subscriber
    pub event_capacity: usize,
    /// Explicit ffmpeg binary; resolved from PATH when unset
    pub ffmpeg_path: Option<PathBuf>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_renders: 4,
            per_job_concurrency: 2,
            clip_timeout: Duration::from_secs(120),
            stall_threshold: Duration::from_secs(120),
            watchdog_interval: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(1),
            max_clip_retries: 1,
            retry_base_delay: Duration::from_millis(500),
            work_dir: PathBuf::from("/tmp/storyclip/work"),
            output_dir: PathBuf::from("/tmp/storyclip/outputs"),
            public_base_url: "/outputs".to_string(),
            event_capacity: 256,
            ffmpeg_path: None,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(default)
}

impl SupervisorConfig {
    /// Create config from `STORYCLIP_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_renders: env_or(
                "STORYCLIP_MAX_CONCURRENT_RENDERS",
                defaults.max_concurrent_renders,
            )
            .max(1),
            per_job_concurrency: env_or("STORYCLIP_PER_JOB_CONCURRENCY", defaults.per_job_concurrency)
                .max(1),
            clip_timeout: env_secs("STORYCLIP_CLIP_TIMEOUT_SECS", defaults.clip_timeout),
            stall_threshold: env_secs("STORYCLIP_STALL_THRESHOLD_SECS", defaults.stall_threshold),
            watchdog_interval: env_secs(
                "STORYCLIP_WATCHDOG_INTERVAL_SECS",
                defaults.watchdog_interval,
            ),
            heartbeat_interval: env_secs(
                "STORYCLIP_HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval,
            ),
            max_clip_retries: env_or("STORYCLIP_MAX_CLIP_RETRIES", defaults.max_clip_retries),
            retry_base_delay: Duration::from_millis(env_or(
                "STORYCLIP_RETRY_BASE_DELAY_MS",
                defaults.retry_base_delay.as_millis() as u64,
            )),
            work_dir: std::env::var("STORYCLIP_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            output_dir: std::env::var("STORYCLIP_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            public_base_url: std::env::var("STORYCLIP_PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_base_url),
            event_capacity: env_or("STORYCLIP_EVENT_CAPACITY", defaults.event_capacity).max(1),
            ffmpeg_path: std::env::var("STORYCLIP_FFMPEG").ok().map(PathBuf::from),
        }
    }
}
