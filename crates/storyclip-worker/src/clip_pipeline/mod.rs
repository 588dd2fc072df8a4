use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use storyclip_media::fs_utils::remove_file_if_exists;
use storyclip_media::ClipRenderer;
use storyclip_models::JobId;

use crate::config::SupervisorConfig;
use crate::events::ProgressChannel;
use crate::logging::JobLogger;
use crate::metrics;
use crate::repository::JobRepository;
use crate::retry::RetryPolicy;

pub mod clip;
pub mod planner;
pub mod tasks;

pub use clip::{process_single_clip, ClipOutcome, JobSlots};
pub use planner::{plan, PlanError};
pub use tasks::{generate_render_tasks, OutputLayout, RenderTask};

/// Shared state for every job's render pipeline.
pub struct PipelineContext {
    pub repo: Arc<dyn JobRepository>,
    pub renderer: Arc<dyn ClipRenderer>,
    pub events: ProgressChannel,
    /// System-wide engine process cap
    pub limiter: Arc<Semaphore>,
    pub retry: RetryPolicy,
    pub layout: OutputLayout,
    pub config: SupervisorConfig,
}

impl PipelineContext {
    pub fn new(config: SupervisorConfig, repo: Arc<dyn JobRepository>, renderer: Arc<dyn ClipRenderer>) -> Self {
        Self {
            repo,
            renderer,
            events: ProgressChannel::new(config.event_capacity),
            limiter: Arc::new(Semaphore::new(config.max_concurrent_renders.max(1))),
            retry: RetryPolicy::from_config(&config),
            layout: OutputLayout::from_config(&config),
            config,
        }
    }

    /// Engine processes currently holding a render slot.
    pub fn renders_in_flight(&self) -> usize {
        self.config
            .max_concurrent_renders
            .max(1)
            .saturating_sub(self.limiter.available_permits())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClipProcessingResults {
    pub rendered: u32,
    pub failed: u32,
    pub abandoned: u32,
}

/// Render every task of a job, `per_job_concurrency` at a time, recording
/// each resolution on the job as it arrives.
pub async fn process_clips(
    ctx: &PipelineContext,
    job_id: &JobId,
    tasks: Vec<RenderTask>,
    cancel: &CancellationToken,
    logger: &JobLogger,
) -> ClipProcessingResults {
    let width = ctx.config.per_job_concurrency.max(1);
    let slots = JobSlots::default();
    let slots = &slots;
    let mut outcomes = stream::iter(tasks.into_iter().map(|task| async move {
        let outcome = process_single_clip(ctx, &task, slots, cancel, logger).await;
        (task, outcome)
    }))
    .buffer_unordered(width);

    let mut results = ClipProcessingResults::default();
    while let Some((task, outcome)) = outcomes.next().await {
        match outcome {
            ClipOutcome::Rendered(artifact) => match ctx.repo.append_artifact(job_id, artifact).await {
                Ok(job) => {
                    results.rendered += 1;
                    metrics::record_clip_rendered();
                    ctx.events.updated(&job);
                }
                Err(e) => {
                    if e.is_terminal() {
                        debug!(clip = task.index(), "Job already finished, discarding late clip");
                    } else {
                        logger.log_error(&e.to_string());
                    }
                    remove_file_if_exists(&task.output_path).await;
                    results.abandoned += 1;
                }
            },
            ClipOutcome::Failed(failure) => {
                logger.log_clip_failure(&failure);
                metrics::record_clip_failed(failure.kind);
                match ctx.repo.record_failure(job_id, failure).await {
                    Ok(job) => {
                        results.failed += 1;
                        ctx.events.updated(&job);
                    }
                    Err(e) if e.is_terminal() => results.abandoned += 1,
                    Err(e) => logger.log_error(&e.to_string()),
                }
            }
            ClipOutcome::Abandoned => results.abandoned += 1,
        }
    }

    results
}
