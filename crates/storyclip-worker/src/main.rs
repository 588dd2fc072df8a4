//! StoryClip command-line interface.
//!
//! Usage:
//!   storyclip plan <DURATION> [OPTIONS]   Print the clip windows for a source duration
//!   storyclip probe <SOURCE>              Print probed source properties
//!   storyclip render <SOURCE> [OPTIONS]   Render clips and print the manifest

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storyclip_media::{probe_source, probe_video, RenderWorker};
use storyclip_models::{ClipCount, DistributionRequest, EffectOverrides, EncodingConfig, JobStatus};
use storyclip_worker::{metrics, plan, JobSupervisor, SupervisorConfig};

#[derive(Parser)]
#[command(
    name = "storyclip",
    about = "Split a video into short clips with effects",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the clip plan for a source of the given duration
    Plan {
        /// Source duration in seconds
        duration: f64,

        #[command(flatten)]
        distribution: DistributionArgs,
    },

    /// Probe a source file with ffprobe
    Probe {
        source: PathBuf,
    },

    /// Render clips from a source file
    Render {
        source: PathBuf,

        #[command(flatten)]
        distribution: DistributionArgs,

        /// Directory for published clips
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Scratch directory for in-progress renders
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// ffmpeg binary to use instead of the one on PATH
        #[arg(long)]
        ffmpeg: Option<PathBuf>,

        /// Clips rendered in parallel
        #[arg(long)]
        concurrency: Option<usize>,

        /// Print per-clip diagnostics instead of the manifest
        #[arg(long)]
        debug: bool,
    },
}

#[derive(Args, Debug, Clone)]
struct DistributionArgs {
    /// Nominal clip duration (seconds)
    #[arg(long, default_value = "3.0")]
    clip_duration: f64,

    /// Number of clips: "auto" or a number
    #[arg(long, default_value = "auto")]
    count: ClipCount,

    /// Where the first clip starts (seconds)
    #[arg(long, default_value = "0.0")]
    start_offset: f64,

    /// Let clips wrap around the end of a short source
    #[arg(long)]
    allow_looping: bool,

    /// JSON file with effect overrides
    #[arg(long)]
    effects: Option<PathBuf>,
}

impl DistributionArgs {
    fn to_request(&self) -> anyhow::Result<DistributionRequest> {
        let effects = match &self.effects {
            Some(path) => read_effects(path)?,
            None => EffectOverrides::default(),
        };
        Ok(DistributionRequest {
            clip_duration_seconds: self.clip_duration,
            clip_count: self.count,
            start_offset_seconds: self.start_offset,
            allow_looping: self.allow_looping,
            effects,
        })
    }
}

fn read_effects(path: &Path) -> anyhow::Result<EffectOverrides> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read effects file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid effects file {}", path.display()))
}

fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("storyclip_worker=info".parse()?)
        .add_directive("storyclip_media=info".parse()?);

    // Logs go to stderr; stdout carries command output
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    if let Ok(addr) = std::env::var("STORYCLIP_METRICS_ADDR") {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("Invalid STORYCLIP_METRICS_ADDR '{}'", addr))?;
        metrics::init_metrics(addr).context("Failed to install Prometheus exporter")?;
        info!("Serving metrics on {}", addr);
    }

    let cli = Cli::parse();
    match cli.command {
        Commands::Plan {
            duration,
            distribution,
        } => {
            let windows = plan(duration, &distribution.to_request()?)?;
            print_json(&windows)
        }
        Commands::Probe { source } => {
            let info = probe_video(&source)
                .await
                .with_context(|| format!("Failed to probe {}", source.display()))?;
            print_json(&info)
        }
        Commands::Render {
            source,
            distribution,
            output_dir,
            work_dir,
            ffmpeg,
            concurrency,
            debug,
        } => {
            let mut config = SupervisorConfig::from_env();
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(dir) = work_dir {
                config.work_dir = dir;
            }
            if let Some(width) = concurrency {
                config.per_job_concurrency = width.max(1);
            }
            if ffmpeg.is_some() {
                config.ffmpeg_path = ffmpeg;
            }
            info!("Supervisor config: {:?}", config);

            let request = distribution.to_request()?;
            let source = probe_source(&source)
                .await
                .with_context(|| format!("Failed to probe {}", source.display()))?;

            let mut worker = RenderWorker::new(EncodingConfig::default());
            if let Some(program) = &config.ffmpeg_path {
                worker = worker.with_program(program);
            }

            let supervisor = JobSupervisor::in_memory(config, Arc::new(worker));
            let shutdown = CancellationToken::new();
            let watchdog = supervisor.spawn_watchdog(shutdown.clone());

            let job_id = supervisor.submit(source, request).await?;
            info!(job_id = %job_id, "Rendering");

            let snapshot = tokio::select! {
                result = supervisor.wait_for_terminal(&job_id) => result?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    supervisor.cancel(&job_id).await?
                }
            };

            shutdown.cancel();
            watchdog.await.ok();

            if debug {
                print_json(&supervisor.get_debug_status(&job_id).await?)?;
            } else {
                print_json(&snapshot.manifest)?;
            }

            if snapshot.status == JobStatus::Error {
                bail!("{}", snapshot.message);
            }
            Ok(())
        }
    }
}
