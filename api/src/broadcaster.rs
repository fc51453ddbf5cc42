use std::sync::Arc;

use scrape_core::{Bus, DomainEvent};
use tokio::sync::broadcast;

/// C7 Broadcaster. The Bus already gives every subscriber its own bounded,
/// drop-oldest-on-lag `broadcast::Receiver`, so fanning out to per-sink
/// queues needs no registry of its own - subscribing just means taking a
/// receiver and, for the per-job scope, filtering it. Unsubscribing is
/// dropping the `JobSubscription`; the broadcast channel reclaims the slot
/// itself, which is the idiomatic Rust shape of that operation.
#[derive(Clone)]
pub struct Broadcaster {
    bus: Arc<Bus>,
}

impl Broadcaster {
    pub fn new(bus: Arc<Bus>) -> Self {
        Self { bus }
    }

    pub fn subscribe_all(&self) -> JobSubscription {
        JobSubscription {
            receiver: self.bus.subscribe(),
            job_id: None,
        }
    }

    pub fn subscribe_job(&self, job_id: String) -> JobSubscription {
        JobSubscription {
            receiver: self.bus.subscribe(),
            job_id: Some(job_id),
        }
    }
}

/// A single sink's view of the Bus: either every event, or only those for
/// one job_id. Dropping this value is the Broadcaster's `unsubscribe`.
pub struct JobSubscription {
    receiver: broadcast::Receiver<DomainEvent>,
    job_id: Option<String>,
}

impl JobSubscription {
    /// Waits for the next event this sink cares about. Returns `None` once
    /// the Bus's sender side is gone - the connection should close, not
    /// retry, since that only happens on process shutdown.
    pub async fn recv(&mut self) -> Option<DomainEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    let matches = match &self.job_id {
                        Some(job_id) => event.job_id() == job_id,
                        None => true,
                    };
                    if matches {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        skipped,
                        job_id = ?self.job_id,
                        "websocket subscriber lagged, dropped oldest events - client should reconcile via a status request"
                    );
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(job_id: &str) -> DomainEvent {
        DomainEvent::ArticleTransition {
            job_id: job_id.to_string(),
            article_id: uuid::Uuid::new_v4(),
            url: "https://news.example/1".to_string(),
            status: "SCRAPED".to_string(),
            error_message: None,
            completed_count: 1,
            failed_count: 0,
            total_articles: 3,
        }
    }

    #[tokio::test]
    async fn subscribe_all_sees_events_for_every_job() {
        let bus = Arc::new(Bus::new(16));
        let broadcaster = Broadcaster::new(bus.clone());
        let mut sub = broadcaster.subscribe_all();

        bus.publish_local(transition("job-a"));
        bus.publish_local(transition("job-b"));

        assert_eq!(sub.recv().await.unwrap().job_id(), "job-a");
        assert_eq!(sub.recv().await.unwrap().job_id(), "job-b");
    }

    #[tokio::test]
    async fn subscribe_job_filters_out_other_jobs() {
        let bus = Arc::new(Bus::new(16));
        let broadcaster = Broadcaster::new(bus.clone());
        let mut sub = broadcaster.subscribe_job("job-a".to_string());

        bus.publish_local(transition("job-b"));
        bus.publish_local(transition("job-a"));

        let event = sub.recv().await.unwrap();
        assert_eq!(event.job_id(), "job-a");
    }

    #[tokio::test]
    async fn lagging_subscriber_drops_oldest_instead_of_blocking() {
        let bus = Arc::new(Bus::new(2));
        let broadcaster = Broadcaster::new(bus.clone());
        let mut sub = broadcaster.subscribe_all();

        // Publish more than the channel holds before the subscriber ever
        // reads - it should skip the dropped entries and recover, not hang.
        for i in 0..5 {
            bus.publish_local(transition(&format!("job-{i}")));
        }

        let event = sub.recv().await.expect("receiver recovers past the lag");
        assert_eq!(event.job_id(), "job-4");
    }
}
