use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use crate::error::QueueError;
use crate::queue::Queue;
use crate::store::{ArticleUpdate, Store};
use crate::submitter::priority_to_queue;
use crate::types::{Article, ArticleStatus};

/// Operational sweep supplementing C1/C2/C6: recovers articles a worker left
/// stuck in `SCRAPING` (its queue item is gone - `pop_batch` deletes on
/// dequeue - so without this sweep a crashed worker orphans the article
/// forever), and prunes old terminal jobs. Grounded on the teacher's janitor
/// crate; not part of the core component set, purely operational tooling.
pub struct Janitor {
    pool: PgPool,
    store: Store,
    queue: Queue,
}

impl Janitor {
    pub fn new(pool: PgPool) -> Self {
        let store = Store::from_pool(pool.clone());
        let queue = Queue::new(pool.clone());
        Self { pool, store, queue }
    }

    /// Articles stuck in `SCRAPING` past `timeout` are re-enqueued against
    /// whichever non-terminal job still references them; if none remains
    /// (every referencing job already finished or was cancelled) the
    /// article is marked `FAILED` instead since nobody is waiting on it.
    ///
    /// The select-and-claim is one atomic `FOR UPDATE SKIP LOCKED` CTE
    /// feeding the status-flipping `UPDATE`, the same shape `Queue::pop_batch`
    /// uses - two concurrent janitor runs can never both claim the same
    /// stalled row, unlike a bare `SELECT ... FOR UPDATE` whose lock is
    /// released the instant the statement completes.
    pub async fn reset_stalled_articles(&self, timeout: Duration) -> Result<u64, QueueError> {
        let deadline: DateTime<Utc> = Utc::now() - timeout;
        let claimed = sqlx::query_as::<_, Article>(
            r#"
            WITH stalled AS (
                SELECT id FROM articles
                WHERE status = 'SCRAPING' AND updated_at <= $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE articles
            SET status = 'PENDING', updated_at = now()
            FROM stalled
            WHERE articles.id = stalled.id
            RETURNING articles.*
            "#,
        )
        .bind(deadline)
        .fetch_all(&self.pool)
        .await?;

        let mut recovered = 0u64;
        for article in claimed {
            let owners = self.store.jobs_referencing_article(article.id).await?;
            if let Some(job) = owners.first() {
                self.queue
                    .push_head(
                        priority_to_queue(article.priority),
                        &job.id,
                        article.id,
                        &article.url,
                        article.priority,
                        0,
                    )
                    .await?;
            } else {
                self.store
                    .update_article(
                        article.id,
                        Some(ArticleStatus::Pending),
                        ArticleUpdate {
                            status: Some(ArticleStatus::Failed),
                            error_message: Some(Some(
                                "orphaned: no job still referenced this article".to_string(),
                            )),
                            ..Default::default()
                        },
                    )
                    .await?;
            }
            recovered += 1;
        }

        common_metrics::inc(crate::metrics::JANITOR_STALLED_RESET, &[], recovered);

        Ok(recovered)
    }

    /// Deletes jobs that reached a terminal status more than `retention` ago.
    pub async fn delete_terminal_jobs(&self, retention: Duration) -> Result<u64, QueueError> {
        let deadline: DateTime<Utc> = Utc::now() - retention;
        let result = sqlx::query(
            "DELETE FROM jobs WHERE status IN ('COMPLETED', 'FAILED', 'CANCELLED') AND completed_at <= $1",
        )
        .bind(deadline)
        .execute(&self.pool)
        .await?;

        common_metrics::inc(
            crate::metrics::JANITOR_JOBS_DELETED,
            &[],
            result.rows_affected(),
        );

        Ok(result.rows_affected())
    }
}
