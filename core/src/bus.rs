use serde::{Deserialize, Serialize};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::QueueError;

pub const CHANNEL: &str = "job_updates";

/// The payload carried over the bus. Workers publish one of these per
/// committed transition; the api process's listener fans them out to
/// whatever's subscribed (C7). `ArticleTransition` carries every field of
/// a single transition together - article id, its new status, and the
/// job's counters after that transition - matching the one-object-per-update
/// wire schema rather than splitting a transition across several messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    JobProgress {
        job_id: String,
        completed_count: i32,
        failed_count: i32,
        total_articles: i32,
    },
    JobCancelled {
        job_id: String,
    },
    ArticleTransition {
        job_id: String,
        article_id: Uuid,
        url: String,
        status: String,
        error_message: Option<String>,
        completed_count: i32,
        failed_count: i32,
        total_articles: i32,
    },
}

impl DomainEvent {
    pub fn job_id(&self) -> &str {
        match self {
            DomainEvent::JobProgress { job_id, .. }
            | DomainEvent::JobCancelled { job_id }
            | DomainEvent::ArticleTransition { job_id, .. } => job_id,
        }
    }
}

/// Publishes events by NOTIFYing Postgres. Any process holding a LISTEN
/// connection on `CHANNEL` sees them - this is what lets worker processes
/// and the api process's broadcaster agree on job state without adding a
/// second message broker to the stack.
#[derive(Clone)]
pub struct Publisher {
    pool: PgPool,
}

impl Publisher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn publish(&self, event: &DomainEvent) -> Result<(), QueueError> {
        let payload = serde_json::to_string(event)?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(CHANNEL)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Bridges Postgres NOTIFY traffic into an in-process bounded `broadcast`
/// channel any number of local subscribers can read from. A slow or absent
/// reader just lags and drops the oldest events - it never blocks the
/// listener loop.
pub struct Bus {
    sender: broadcast::Sender<DomainEvent>,
}

impl Bus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    /// Publishes directly to local subscribers, bypassing the Postgres
    /// NOTIFY round trip `run` normally feeds events through.
    pub fn publish_local(&self, event: DomainEvent) {
        let _ = self.sender.send(event);
    }

    /// Runs until the listen connection fails. Intended to be spawned once
    /// per process and restarted by the caller's supervision loop.
    pub async fn run(&self, database_url: &str) -> Result<(), QueueError> {
        let mut listener = PgListener::connect(database_url).await?;
        listener.listen(CHANNEL).await?;

        loop {
            let notification = listener.recv().await?;
            match serde_json::from_str::<DomainEvent>(notification.payload()) {
                Ok(event) => {
                    // No subscribers is not an error - it just means nobody's listening yet.
                    let _ = self.sender.send(event);
                }
                Err(error) => {
                    tracing::warn!(%error, "dropping malformed bus notification");
                }
            }
        }
    }
}
