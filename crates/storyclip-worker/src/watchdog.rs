//! Background detection of stalled jobs.
//!
//! A running job whose `updated_at` has not moved for longer than the stall
//! threshold is failed with `StalledJob` and its in-flight renders are
//! cancelled. The repository rejects a second transition out of a terminal
//! state, so each job is recovered at most once.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use storyclip_models::FailureKind;

use crate::events::ProgressChannel;
use crate::metrics;
use crate::repository::{JobRepository, JobUpdate};
use crate::supervisor::{elapsed_secs, ActiveJobs};

/// Stalled job detector service.
pub struct StalledJobDetector {
    repo: Arc<dyn JobRepository>,
    events: ProgressChannel,
    active: ActiveJobs,
    threshold: Duration,
    interval: Duration,
}

impl StalledJobDetector {
    pub fn new(
        repo: Arc<dyn JobRepository>,
        events: ProgressChannel,
        active: ActiveJobs,
        threshold: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            repo,
            events,
            active,
            threshold,
            interval,
        }
    }

    /// Sweep every interval until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Starting stalled job detector (interval: {:?}, threshold: {:?})",
            self.interval, self.threshold
        );

        let mut ticker = interval(self.interval.max(Duration::from_millis(10)));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Stalled job detector stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.sweep_once(Utc::now()).await;
                }
            }
        }
    }

    /// Run a single sweep as of `now`. Returns the number of jobs failed.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> u32 {
        let jobs = match self.repo.list_jobs().await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("Stalled job sweep failed to list jobs: {}", e);
                return 0;
            }
        };

        let mut recovered = 0u32;
        for job in jobs.iter().filter(|job| job.is_stale(now, self.threshold)) {
            warn!(
                job_id = %job.id,
                updated_at = %job.updated_at,
                resolved = job.manifest.resolved_count(),
                total = job.total_clips,
                "Detected stalled job"
            );

            let update = JobUpdate::Fail {
                kind: FailureKind::StalledJob,
                message: format!(
                    "No progress for more than {}s",
                    self.threshold.as_secs_f64()
                ),
            };
            match self.repo.update_job_progress(&job.id, update).await {
                Ok(failed) => {
                    recovered += 1;
                    self.active.cancel(&job.id).await;
                    metrics::record_job_stalled();
                    metrics::record_job_completed(failed.status, elapsed_secs(&failed));
                    self.events.completed(&failed);
                }
                // Finished between the listing and the update
                Err(e) if e.is_terminal() => {}
                Err(e) => error!(job_id = %job.id, "Failed to mark job stalled: {}", e),
            }
        }

        if recovered > 0 {
            info!("Stalled job sweep complete: {} recovered", recovered);
        }
        recovered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryJobRepository;
    use storyclip_models::{Job, JobId, JobStatus, SourceMedia};

    async fn running_job(repo: &InMemoryJobRepository, id: &str) -> JobId {
        let job_id = JobId::from_string(id);
        repo.create_job(Job::new(job_id.clone(), SourceMedia::new("/s.mp4", 20.0), 3))
            .await
            .unwrap();
        repo.update_job_progress(&job_id, JobUpdate::Start).await.unwrap();
        job_id
    }

    fn detector(repo: Arc<InMemoryJobRepository>, active: ActiveJobs) -> StalledJobDetector {
        StalledJobDetector::new(
            repo,
            ProgressChannel::new(8),
            active,
            Duration::from_secs(120),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_stalled_job_failed_exactly_once() {
        let repo = Arc::new(InMemoryJobRepository::new());
        let job_id = running_job(&repo, "stuck").await;
        let active = ActiveJobs::default();
        let token = CancellationToken::new();
        active.insert(job_id.clone(), token.clone()).await;

        let detector = detector(repo.clone(), active);
        let later = Utc::now() + chrono::Duration::minutes(10);

        assert_eq!(detector.sweep_once(later).await, 1);
        assert_eq!(detector.sweep_once(later).await, 0);

        let job = repo.get_job(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error.unwrap().kind, FailureKind::StalledJob);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_fresh_jobs_left_alone() {
        let repo = Arc::new(InMemoryJobRepository::new());
        let job_id = running_job(&repo, "busy").await;
        let detector = detector(repo.clone(), ActiveJobs::default());

        assert_eq!(detector.sweep_once(Utc::now()).await, 0);
        assert_eq!(repo.get_job(&job_id).await.unwrap().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let repo = Arc::new(InMemoryJobRepository::new());
        let detector = detector(repo, ActiveJobs::default());
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), detector.run(shutdown))
            .await
            .unwrap();
    }
}
