//! Job supervision: accept requests, run render pipelines, answer status
//! queries and cancel jobs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};
use validator::Validate;

use storyclip_media::fs_utils::remove_dir_best_effort;
use storyclip_media::{ClipRenderer, FilterGraphBuilder};
use storyclip_models::{
    DistributionRequest, FailureKind, Job, JobDebugSnapshot, JobEvent, JobId, JobSnapshot,
    JobStatus, SourceMedia,
};

use crate::clip_pipeline::{generate_render_tasks, plan, process_clips, PipelineContext, RenderTask};
use crate::config::SupervisorConfig;
use crate::error::{SupervisorError, SupervisorResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::repository::{InMemoryJobRepository, JobRepository, JobUpdate};
use crate::watchdog::StalledJobDetector;

/// Cancellation tokens of jobs whose pipeline is still running.
#[derive(Debug, Clone, Default)]
pub struct ActiveJobs {
    tokens: Arc<Mutex<HashMap<JobId, CancellationToken>>>,
}

impl ActiveJobs {
    pub async fn insert(&self, job_id: JobId, token: CancellationToken) {
        let mut tokens = self.tokens.lock().await;
        tokens.insert(job_id, token);
        metrics::set_active_jobs(tokens.len());
    }

    /// Fire the job's token. Returns false when the job has no live pipeline.
    pub async fn cancel(&self, job_id: &JobId) -> bool {
        match self.tokens.lock().await.get(job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, job_id: &JobId) {
        let mut tokens = self.tokens.lock().await;
        tokens.remove(job_id);
        metrics::set_active_jobs(tokens.len());
    }

    pub async fn ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.tokens.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Monitoring projection over the job table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SupervisorOverview {
    pub total_jobs: usize,
    pub queued: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
    /// Done, but with at least one failed clip
    pub degraded: usize,
    pub active_job_ids: Vec<JobId>,
    pub renders_in_flight: usize,
}

/// Owns the job table, the render pipelines and the stall watchdog.
pub struct JobSupervisor {
    ctx: Arc<PipelineContext>,
    active: ActiveJobs,
}

impl JobSupervisor {
    pub fn new(
        config: SupervisorConfig,
        repo: Arc<dyn JobRepository>,
        renderer: Arc<dyn ClipRenderer>,
    ) -> Self {
        Self {
            ctx: Arc::new(PipelineContext::new(config, repo, renderer)),
            active: ActiveJobs::default(),
        }
    }

    /// Supervisor backed by a fresh in-memory job table.
    pub fn in_memory(config: SupervisorConfig, renderer: Arc<dyn ClipRenderer>) -> Self {
        Self::new(config, Arc::new(InMemoryJobRepository::new()), renderer)
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.ctx.config
    }

    /// Validate, plan and start a job. Returns as soon as rendering is
    /// scheduled; request errors never create a job.
    pub async fn submit(
        &self,
        source: SourceMedia,
        request: DistributionRequest,
    ) -> SupervisorResult<JobId> {
        if !source.is_playable() {
            return Err(SupervisorError::invalid_source(format!(
                "{} is not playable (duration {}s)",
                source.path.display(),
                source.duration_seconds
            )));
        }
        request
            .validate()
            .map_err(|e| SupervisorError::invalid_request(e.to_string()))?;
        let effects = request
            .effects
            .clone()
            .resolve()
            .map_err(|e| SupervisorError::invalid_request(e.to_string()))?;

        let windows = plan(source.duration_seconds, &request)?;
        let graph = FilterGraphBuilder::build(&effects, effects.target_dimensions())
            .map_err(|e| SupervisorError::invalid_request(e.to_string()))?;

        let job_id = JobId::new();
        let tasks = generate_render_tasks(
            &job_id,
            &source.path,
            windows,
            &graph,
            &self.ctx.layout,
            self.ctx.config.clip_timeout,
        );

        self.ctx
            .repo
            .create_job(Job::new(job_id.clone(), source, tasks.len() as u32))
            .await?;

        // Registered before the job starts so an early cancel reaches the pipeline
        let token = CancellationToken::new();
        self.active.insert(job_id.clone(), token.clone()).await;

        let job = match self.ctx.repo.update_job_progress(&job_id, JobUpdate::Start).await {
            Ok(job) => job,
            // Cancelled before it started; nothing left to run
            Err(e) if e.is_terminal() => {
                self.active.remove(&job_id).await;
                return Ok(job_id);
            }
            Err(e) => {
                self.active.remove(&job_id).await;
                return Err(e.into());
            }
        };
        self.ctx.events.updated(&job);

        info!(
            job_id = %job_id,
            clips = tasks.len(),
            filter = %graph.to_filter_chain(),
            "Job accepted"
        );
        metrics::record_job_submitted();

        tokio::spawn(run_job(
            self.ctx.clone(),
            self.active.clone(),
            job_id.clone(),
            tasks,
            token,
        ));

        Ok(job_id)
    }

    /// Current status. Side-effect free.
    pub async fn get_status(&self, job_id: &JobId) -> SupervisorResult<JobSnapshot> {
        Ok(self.ctx.repo.get_job(job_id).await?.snapshot())
    }

    /// Status plus per-clip failure diagnostics.
    pub async fn get_debug_status(&self, job_id: &JobId) -> SupervisorResult<JobDebugSnapshot> {
        Ok(self.ctx.repo.get_job(job_id).await?.debug_snapshot())
    }

    /// Fail the job as cancelled and kill its in-flight renders.
    ///
    /// Cancelling a finished job changes nothing and returns its snapshot.
    pub async fn cancel(&self, job_id: &JobId) -> SupervisorResult<JobSnapshot> {
        let update = JobUpdate::Fail {
            kind: FailureKind::Cancelled,
            message: "Job cancelled by operator".to_string(),
        };
        match self.ctx.repo.update_job_progress(job_id, update).await {
            Ok(job) => {
                self.active.cancel(job_id).await;
                info!(job_id = %job_id, "Job cancelled");
                metrics::record_job_completed(job.status, elapsed_secs(&job));
                self.ctx.events.completed(&job);
                Ok(job.snapshot())
            }
            Err(e) if e.is_terminal() => self.get_status(job_id).await,
            Err(e) => Err(e.into()),
        }
    }

    pub async fn overview(&self) -> SupervisorResult<SupervisorOverview> {
        let jobs = self.ctx.repo.list_jobs().await?;
        let mut overview = SupervisorOverview {
            total_jobs: jobs.len(),
            active_job_ids: self.active.ids().await,
            renders_in_flight: self.ctx.renders_in_flight(),
            ..Default::default()
        };
        for job in &jobs {
            match job.status {
                JobStatus::Queued => overview.queued += 1,
                JobStatus::Running => overview.running += 1,
                JobStatus::Done => {
                    overview.done += 1;
                    if job.manifest.failure_count() > 0 {
                        overview.degraded += 1;
                    }
                }
                JobStatus::Error => overview.failed += 1,
            }
        }
        Ok(overview)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.ctx.events.subscribe()
    }

    /// Wait until the job reaches DONE or ERROR.
    pub async fn wait_for_terminal(&self, job_id: &JobId) -> SupervisorResult<JobSnapshot> {
        let mut events = self.subscribe();
        loop {
            let snapshot = self.get_status(job_id).await?;
            if snapshot.status.is_terminal() {
                return Ok(snapshot);
            }
            loop {
                match events.recv().await {
                    Ok(event) if event.is_completed() && event.job_id() == job_id => break,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(_)) | Err(RecvError::Closed) => break,
                }
            }
        }
    }

    pub fn watchdog(&self) -> StalledJobDetector {
        StalledJobDetector::new(
            self.ctx.repo.clone(),
            self.ctx.events.clone(),
            self.active.clone(),
            self.ctx.config.stall_threshold,
            self.ctx.config.watchdog_interval,
        )
    }

    /// Run the stall watchdog until `shutdown` fires.
    pub fn spawn_watchdog(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let detector = self.watchdog();
        tokio::spawn(async move { detector.run(shutdown).await })
    }
}

pub(crate) fn elapsed_secs(job: &Job) -> f64 {
    (job.updated_at - job.created_at)
        .to_std()
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

async fn run_job(
    ctx: Arc<PipelineContext>,
    active: ActiveJobs,
    job_id: JobId,
    tasks: Vec<RenderTask>,
    cancel: CancellationToken,
) {
    let logger = JobLogger::new(&job_id, "render_clips");
    let span = logger.create_span();

    async {
        let started = Instant::now();
        logger.log_start(tasks.len());

        let results = process_clips(&ctx, &job_id, tasks, &cancel, &logger).await;
        debug!(
            rendered = results.rendered,
            failed = results.failed,
            abandoned = results.abandoned,
            "Clip processing finished"
        );

        if cancel.is_cancelled() {
            debug!("Job was stopped; skipping finalization");
        } else {
            match ctx.repo.update_job_progress(&job_id, JobUpdate::Finalize).await {
                Ok(job) => {
                    logger.log_completion(job.status, &job.state_message());
                    metrics::record_job_completed(job.status, started.elapsed().as_secs_f64());
                    ctx.events.completed(&job);
                }
                Err(e) if e.is_terminal() => debug!("Job already finished: {}", e),
                Err(e) => logger.log_error(&e.to_string()),
            }
        }

        remove_dir_best_effort(&ctx.layout.job_work_dir(&job_id)).await;
        active.remove(&job_id).await;
    }
    .instrument(span)
    .await
}
