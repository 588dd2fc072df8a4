use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::SemaphorePermit;
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use storyclip_media::fs_utils::move_file;
use storyclip_media::{FfmpegProgress, MediaError, MediaResult, ProgressCallback};
use storyclip_models::encoding::OUTPUT_FORMAT;
use storyclip_models::{Artifact, ClipFailure, JobId};

use super::tasks::RenderTask;
use super::PipelineContext;
use crate::logging::JobLogger;
use crate::metrics;
use crate::repository::JobUpdate;

/// How one clip ended up.
#[derive(Debug)]
pub enum ClipOutcome {
    Rendered(Artifact),
    Failed(ClipFailure),
    /// Dropped because the job was cancelled or stalled
    Abandoned,
}

/// Render slots held by one job's clips.
#[derive(Debug, Default)]
pub struct JobSlots {
    held: AtomicUsize,
}

impl JobSlots {
    pub fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }
}

/// A system-wide render slot, counted against the owning job until dropped.
struct HeldSlot<'a> {
    _permit: SemaphorePermit<'a>,
    slots: &'a JobSlots,
}

impl Drop for HeldSlot<'_> {
    fn drop(&mut self) {
        self.slots.held.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Render one clip, retrying retryable failures, and publish it on success.
pub async fn process_single_clip(
    ctx: &PipelineContext,
    task: &RenderTask,
    slots: &JobSlots,
    cancel: &CancellationToken,
    logger: &JobLogger,
) -> ClipOutcome {
    let index = task.index();
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return ClipOutcome::Abandoned;
        }
        attempts += 1;

        // Dropping the attempt kills an in-flight engine process
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ClipOutcome::Abandoned,
            outcome = render_attempt(ctx, task, slots, cancel) => outcome,
        };

        match outcome {
            Ok(artifact) => return ClipOutcome::Rendered(artifact),
            Err(MediaError::Cancelled) => return ClipOutcome::Abandoned,
            Err(e) if ctx.retry.should_retry(attempts, &e) => {
                let delay = ctx.retry.delay_for_attempt(attempts);
                logger.log_clip_retry(index, attempts, &e.to_string());
                metrics::record_clip_retry(e.failure_kind());
                tokio::select! {
                    _ = cancel.cancelled() => return ClipOutcome::Abandoned,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => return ClipOutcome::Failed(e.to_clip_failure(index, attempts)),
        }
    }
}

async fn render_attempt(
    ctx: &PipelineContext,
    task: &RenderTask,
    slots: &JobSlots,
    cancel: &CancellationToken,
) -> MediaResult<Artifact> {
    let _slot = acquire_slot(ctx, &task.job_id, slots).await?;

    let heartbeat = heartbeat_callback(ctx, &task.job_id);
    let rendered = ctx
        .renderer
        .render_clip(&task.request, cancel.clone(), Some(heartbeat))
        .await
        .into_result()?;

    move_file(&rendered.path, &task.output_path).await?;

    Ok(Artifact {
        index: task.index(),
        path: task.output_path.clone(),
        url: task.url.clone(),
        size_bytes: rendered.size_bytes,
        duration_seconds: task.request.window.duration,
        format: OUTPUT_FORMAT.to_string(),
    })
}

/// Wait for a system-wide render slot.
///
/// While the job holds no slot at all it is queued, not stalled, so the wait
/// keeps refreshing `updated_at`. Once any of its clips is rendering, that
/// render's own progress is the only heartbeat.
async fn acquire_slot<'a>(
    ctx: &'a PipelineContext,
    job_id: &JobId,
    slots: &'a JobSlots,
) -> MediaResult<HeldSlot<'a>> {
    let acquire = ctx.limiter.acquire();
    tokio::pin!(acquire);

    let period = ctx.config.heartbeat_interval.max(Duration::from_millis(10));
    let mut beats = interval_at(tokio::time::Instant::now() + period, period);
    beats.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            permit = &mut acquire => {
                let permit = permit.map_err(|_| MediaError::Cancelled)?;
                slots.held.fetch_add(1, Ordering::SeqCst);
                return Ok(HeldSlot { _permit: permit, slots });
            }
            _ = beats.tick() => {
                if slots.held() == 0 {
                    if let Err(e) = ctx.repo.update_job_progress(job_id, JobUpdate::Heartbeat).await {
                        debug!(job_id = %job_id, "Queued heartbeat ignored: {}", e);
                    }
                }
            }
        }
    }
}

/// Progress callback that refreshes the job's `updated_at`, at most once per
/// heartbeat interval.
fn heartbeat_callback(ctx: &PipelineContext, job_id: &JobId) -> ProgressCallback {
    let repo = ctx.repo.clone();
    let job_id = job_id.clone();
    let interval = ctx.config.heartbeat_interval;
    let last_beat: Mutex<Option<Instant>> = Mutex::new(None);

    Arc::new(move |_progress: FfmpegProgress| {
        let now = Instant::now();
        let due = match last_beat.lock() {
            Ok(mut last) => {
                let due = last.map_or(true, |at| now.duration_since(at) >= interval);
                if due {
                    *last = Some(now);
                }
                due
            }
            Err(_) => false,
        };
        if !due {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let repo = repo.clone();
        let job_id = job_id.clone();
        handle.spawn(async move {
            if let Err(e) = repo.update_job_progress(&job_id, JobUpdate::Heartbeat).await {
                debug!(job_id = %job_id, "Heartbeat ignored: {}", e);
            }
        });
    })
}
