use sqlx::PgPool;
use uuid::Uuid;

use crate::error::QueueError;
use crate::types::{QueueItem, QueueName};

/// C2 Queue - three named priority bands (`high`/`medium`/`low`) backed by
/// one `queue_items` table in the same database as the Store. Popping across
/// all three bands is one atomic, server-side statement, the same pattern
/// the teacher uses to atomically hand out a single "available" job: a
/// `FOR UPDATE SKIP LOCKED` CTE feeding a row-returning `DELETE`.
#[derive(Clone)]
pub struct Queue {
    pool: PgPool,
}

impl Queue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Appends to the tail of `queue_name` - the normal path for a freshly
    /// submitted article.
    pub async fn push_tail(
        &self,
        queue_name: QueueName,
        job_id: &str,
        article_id: Uuid,
        url: &str,
        priority: i16,
    ) -> Result<i64, QueueError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO queue_items (queue_name, job_id, article_id, url, priority, attempt, enqueued_at, sequence)
            VALUES ($1, $2, $3, $4, $5, 0, now(), nextval('queue_items_sequence_seq'))
            RETURNING id
            "#,
        )
        .bind(queue_name.as_str())
        .bind(job_id)
        .bind(article_id)
        .bind(url)
        .bind(priority)
        .fetch_one(&self.pool)
        .await?;

        common_metrics::inc(
            crate::metrics::QUEUE_PUSH,
            &[("queue_name".to_string(), queue_name.as_str().to_string())],
            1,
        );

        Ok(id)
    }

    /// Inserts ahead of everything currently waiting on `queue_name` - used
    /// to promote a retried article back to the front of the `high` band
    /// rather than re-deriving its original priority.
    pub async fn push_head(
        &self,
        queue_name: QueueName,
        job_id: &str,
        article_id: Uuid,
        url: &str,
        priority: i16,
        attempt: i32,
    ) -> Result<i64, QueueError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO queue_items (queue_name, job_id, article_id, url, priority, attempt, enqueued_at, sequence)
            VALUES ($1, $2, $3, $4, $5, $6, now(),
                    COALESCE((SELECT MIN(sequence) - 1 FROM queue_items WHERE queue_name = $1), 0))
            RETURNING id
            "#,
        )
        .bind(queue_name.as_str())
        .bind(job_id)
        .bind(article_id)
        .bind(url)
        .bind(priority)
        .bind(attempt)
        .fetch_one(&self.pool)
        .await?;

        common_metrics::inc(
            crate::metrics::QUEUE_PUSH,
            &[("queue_name".to_string(), queue_name.as_str().to_string())],
            1,
        );

        Ok(id)
    }

    /// Atomically pops up to `limit` items across all three bands, strictly
    /// ordered high before medium before low, FIFO within a band. This is the
    /// single server-side operation the concurrency model requires: no
    /// worker can observe a partial view of "what's next".
    pub async fn pop_batch(&self, limit: i64) -> Result<Vec<QueueItem>, QueueError> {
        let items = sqlx::query_as::<_, QueueItem>(
            r#"
            WITH next AS (
                SELECT id FROM queue_items
                ORDER BY
                    CASE queue_name WHEN 'high' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END,
                    sequence
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            DELETE FROM queue_items
            USING next
            WHERE queue_items.id = next.id
            RETURNING queue_items.*
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        common_metrics::inc(crate::metrics::QUEUE_POP, &[], items.len() as u64);

        Ok(items)
    }

    /// Removes queued items belonging to a cancelled `job_id`. An item whose
    /// article is still depended on by another non-terminal job is never
    /// left pointed at the cancelled job - spec.md:189 requires that no
    /// *queue item referencing the cancelled job* remain once this returns,
    /// so a surviving item is reassigned to the earliest-created live job
    /// that still references its article (rather than merely being spared
    /// from deletion, which would leave its `job_id` dangling on a job a
    /// worker would immediately see as cancelled and drop). Only items with
    /// no surviving referencing job are actually deleted; those are the
    /// "removed-task count" `DELETE /jobs/{id}` reports back.
    ///
    /// Both statements run in one transaction: the reassignment must commit
    /// before the delete runs, since the delete's `job_id = $1` predicate
    /// should only match rows the reassignment left behind.
    pub async fn drain_matching_job(&self, job_id: &str) -> Result<u64, QueueError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE queue_items qi
            SET job_id = (
                SELECT j.id FROM jobs j
                WHERE j.id <> $1
                AND qi.article_id = ANY(j.article_ids)
                AND j.status NOT IN ('COMPLETED', 'FAILED', 'CANCELLED')
                ORDER BY j.created_at
                LIMIT 1
            )
            WHERE qi.job_id = $1
            AND EXISTS (
                SELECT 1 FROM jobs j
                WHERE j.id <> $1
                AND qi.article_id = ANY(j.article_ids)
                AND j.status NOT IN ('COMPLETED', 'FAILED', 'CANCELLED')
            )
            "#,
        )
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM queue_items WHERE job_id = $1")
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected())
    }

    pub async fn depth(&self) -> Result<Vec<(QueueName, i64)>, QueueError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT queue_name, COUNT(*) FROM queue_items GROUP BY queue_name")
                .fetch_all(&self.pool)
                .await?;

        let depths = rows
            .into_iter()
            .map(|(name, count)| Ok::<_, QueueError>((name.parse()?, count)))
            .collect::<Result<Vec<_>, _>>()?;

        for (name, count) in &depths {
            common_metrics::gauge(
                crate::metrics::QUEUE_DEPTH,
                &[("queue_name".to_string(), name.as_str().to_string())],
                *count as f64,
            );
        }

        Ok(depths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_name_rank_orders_high_first() {
        assert!(QueueName::High.rank() < QueueName::Medium.rank());
        assert!(QueueName::Medium.rank() < QueueName::Low.rank());
    }
}
