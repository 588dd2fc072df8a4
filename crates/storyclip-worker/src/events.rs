//! Job events via an in-process broadcast channel.

use tokio::sync::broadcast;
use tracing::debug;

use storyclip_models::{Job, JobEvent};

/// Channel for publishing/subscribing to job events.
#[derive(Debug, Clone)]
pub struct ProgressChannel {
    sender: broadcast::Sender<JobEvent>,
}

impl ProgressChannel {
    /// Create a channel buffering `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: JobEvent) {
        let job_id = event.job_id().clone();
        if self.sender.send(event).is_err() {
            debug!(job_id = %job_id, "No event subscribers");
        }
    }

    /// Publish a progress update for a running job.
    pub fn updated(&self, job: &Job) {
        self.publish(JobEvent::updated(job));
    }

    /// Publish the final state of a job.
    pub fn completed(&self, job: &Job) {
        self.publish(JobEvent::completed(job));
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyclip_models::{JobId, SourceMedia};

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let channel = ProgressChannel::new(8);
        let mut rx = channel.subscribe();
        assert_eq!(channel.subscriber_count(), 1);

        let mut job = Job::new(JobId::from_string("j"), SourceMedia::new("/s.mp4", 10.0), 1);
        job.start().unwrap();
        channel.updated(&job);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.job_id().as_str(), "j");
        assert!(!event.is_completed());
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        let channel = ProgressChannel::new(1);
        let job = Job::new(JobId::from_string("j"), SourceMedia::new("/s.mp4", 10.0), 1);
        channel.completed(&job);
    }
}
