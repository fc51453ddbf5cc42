use chrono::{DateTime, Utc};
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use crate::config::PoolConfig;
use crate::error::QueueError;
use crate::types::{Article, ArticleRequest, ArticleStatus, Job, JobStatus};

/// A set of field updates for one article. `None` means "leave alone"; the
/// doubly-`Option`-wrapped fields use the outer `None`/inner `None` split to
/// distinguish "don't touch" from "set to null", the same convention the
/// teacher's job-update struct uses.
#[derive(Debug, Default)]
pub struct ArticleUpdate {
    pub status: Option<ArticleStatus>,
    pub title: Option<Option<String>>,
    pub content: Option<Option<String>>,
    pub error_message: Option<Option<String>>,
    pub scraped_at: Option<Option<DateTime<Utc>>>,
    pub retry_count: Option<i32>,
}

impl ArticleUpdate {
    pub fn scraped(title: String, content: String) -> Self {
        Self {
            status: Some(ArticleStatus::Scraped),
            title: Some(Some(title)),
            content: Some(Some(content)),
            error_message: Some(None),
            scraped_at: Some(Some(Utc::now())),
            retry_count: Some(0),
        }
    }

    pub fn failed(error_message: String, retry_count: i32) -> Self {
        Self {
            status: Some(ArticleStatus::Failed),
            error_message: Some(Some(error_message)),
            retry_count: Some(retry_count),
            ..Default::default()
        }
    }

    pub fn scraping() -> Self {
        Self {
            status: Some(ArticleStatus::Scraping),
            ..Default::default()
        }
    }
}

/// C1 Store - the single Postgres-backed home for Articles and Jobs. Queue
/// bookkeeping lives alongside it in the `queue` module, against the same
/// pool, so a caller that needs both just holds one `PgPool`.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn new(config: PoolConfig) -> Result<Self, QueueError> {
        let pool = config.connect().await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), QueueError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| QueueError::Validation(e.to_string()))
    }

    /// Atomically get-or-create an Article row for `req.url`. Returns the row
    /// and whether this call is the one that inserted it - exactly one
    /// concurrent caller for the same URL sees `inserted = true`.
    pub async fn upsert_article_pending(
        &self,
        req: &ArticleRequest,
    ) -> Result<(Article, bool), QueueError> {
        let row = sqlx::query(
            r#"
            INSERT INTO articles (id, url, source, category, priority, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, now(), now())
            ON CONFLICT (url) DO UPDATE SET updated_at = articles.updated_at
            RETURNING *, (xmax = 0) AS inserted
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(&req.url)
        .bind(&req.source)
        .bind(&req.category)
        .bind(req.priority)
        .bind(ArticleStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await?;

        let inserted: bool = sqlx::Row::try_get(&row, "inserted")?;
        let article = <Article as sqlx::FromRow<sqlx::postgres::PgRow>>::from_row(&row)?;
        Ok((article, inserted))
    }

    pub async fn get_article(&self, id: Uuid) -> Result<Article, QueueError> {
        sqlx::query_as::<_, Article>("SELECT * FROM articles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(QueueError::ArticleNotFound(id))
    }

    pub async fn list_articles(&self, ids: &[Uuid]) -> Result<Vec<Article>, QueueError> {
        Ok(
            sqlx::query_as::<_, Article>("SELECT * FROM articles WHERE id = ANY($1)")
                .bind(ids)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    /// Looks up an Article by its dedup key. Used by callers that only have
    /// a URL in hand (e.g. the results endpoint cross-referencing a job's
    /// `article_ids`) rather than an id.
    pub async fn get_article_by_url(&self, url: &str) -> Result<Option<Article>, QueueError> {
        Ok(
            sqlx::query_as::<_, Article>("SELECT * FROM articles WHERE url = $1")
                .bind(url)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn increment_reference_count(&self, id: Uuid) -> Result<(), QueueError> {
        let result = sqlx::query(
            "UPDATE articles SET reference_count = reference_count + 1, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::ArticleNotFound(id));
        }
        Ok(())
    }

    /// Apply `update` to the article `id`, optionally only if its current
    /// status matches `status_precondition` - this is the guard that keeps
    /// a stale worker from clobbering a status another worker already moved
    /// past.
    pub async fn update_article(
        &self,
        id: Uuid,
        status_precondition: Option<ArticleStatus>,
        update: ArticleUpdate,
    ) -> Result<Article, QueueError> {
        let mut builder = QueryBuilder::new("UPDATE articles SET updated_at = now()");

        if let Some(status) = update.status {
            builder.push(", status = ").push_bind(status.as_str());
        }
        if let Some(title) = update.title {
            builder.push(", title = ").push_bind(title);
        }
        if let Some(content) = update.content {
            builder.push(", content = ").push_bind(content);
        }
        if let Some(error_message) = update.error_message {
            builder.push(", error_message = ").push_bind(error_message);
        }
        if let Some(scraped_at) = update.scraped_at {
            builder.push(", scraped_at = ").push_bind(scraped_at);
        }
        if let Some(retry_count) = update.retry_count {
            builder.push(", retry_count = ").push_bind(retry_count);
        }

        builder.push(" WHERE id = ").push_bind(id);
        if let Some(expected) = status_precondition {
            builder.push(" AND status = ").push_bind(expected.as_str());
        }
        builder.push(" RETURNING *");

        let row = builder
            .build_query_as::<Article>()
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(article) => Ok(article),
            None => {
                if status_precondition.is_some() && self.get_article(id).await.is_ok() {
                    Err(QueueError::PreconditionFailed {
                        id,
                        expected: status_precondition.unwrap().to_string(),
                    })
                } else {
                    Err(QueueError::ArticleNotFound(id))
                }
            }
        }
    }

    /// Creates a Job already carrying its initial status and
    /// `completed_count` - a batch that's entirely cache hits is COMPLETED
    /// the moment it exists, never passing through an observable
    /// `completed_count=0` state that would understate its own progress.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_job(
        &self,
        id: String,
        status: JobStatus,
        total_articles: i32,
        new_articles: i32,
        cached_articles: i32,
        initial_completed_count: i32,
        article_ids: Vec<Uuid>,
        cached_article_ids: Vec<Uuid>,
    ) -> Result<Job, QueueError> {
        let completed_at_clause = if status.is_terminal() {
            "now()"
        } else {
            "NULL"
        };
        let sql = format!(
            r#"
            INSERT INTO jobs (id, status, total_articles, new_articles, cached_articles,
                               completed_count, failed_count, article_ids, cached_article_ids,
                               created_at, updated_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, 0, $7, $8, now(), now(), {completed_at_clause})
            RETURNING *
            "#
        );
        let job = sqlx::query_as::<_, Job>(&sql)
            .bind(id)
            .bind(status.as_str())
            .bind(total_articles)
            .bind(new_articles)
            .bind(cached_articles)
            .bind(initial_completed_count)
            .bind(article_ids)
            .bind(cached_article_ids)
            .fetch_one(&self.pool)
            .await?;

        common_metrics::inc(crate::metrics::JOB_CREATED, &[], 1);
        if job.status.is_terminal() {
            common_metrics::inc(crate::metrics::JOB_COMPLETED, &[], 1);
        }

        Ok(job)
    }

    pub async fn get_job(&self, id: &str) -> Result<Job, QueueError> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))
    }

    /// Every non-terminal job whose `article_ids` includes `article_id` -
    /// used to fan a single article's terminal transition out to every job
    /// that depends on it, including jobs that found the article already
    /// `AlreadyScheduled` by someone else and so never enqueued it
    /// themselves.
    pub async fn jobs_referencing_article(&self, article_id: Uuid) -> Result<Vec<Job>, QueueError> {
        Ok(sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs WHERE $1 = ANY(article_ids) AND status NOT IN ('COMPLETED', 'FAILED', 'CANCELLED')",
        )
        .bind(article_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Paginated job listing, optionally restricted to one status - backs
    /// `GET /jobs/?status_filter=&limit=&skip=`.
    pub async fn list_jobs(
        &self,
        status_filter: Option<JobStatus>,
        limit: i64,
        skip: i64,
    ) -> Result<Vec<Job>, QueueError> {
        let jobs = match status_filter {
            Some(status) => {
                sqlx::query_as::<_, Job>(
                    "SELECT * FROM jobs WHERE status = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
                )
                .bind(status.as_str())
                .bind(limit)
                .bind(skip)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Job>(
                    "SELECT * FROM jobs ORDER BY created_at DESC LIMIT $1 OFFSET $2",
                )
                .bind(limit)
                .bind(skip)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(jobs)
    }

    /// Bumps `completed_count`/`failed_count` by the given deltas in one
    /// statement, flipping the job to a terminal status once every article
    /// has reported in. All-failed batches still complete - see the retry
    /// policy notes for why that isn't treated as a distinct job outcome.
    pub async fn update_job_counters(
        &self,
        id: &str,
        completed_delta: i32,
        failed_delta: i32,
    ) -> Result<Job, QueueError> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET completed_count = completed_count + $2,
                failed_count = failed_count + $3,
                updated_at = now(),
                status = CASE
                    WHEN completed_count + $2 + failed_count + $3 >= total_articles
                        THEN 'COMPLETED'
                    ELSE status
                END,
                completed_at = CASE
                    WHEN completed_count + $2 + failed_count + $3 >= total_articles
                        THEN now()
                    ELSE completed_at
                END
            WHERE id = $1 AND status NOT IN ('CANCELLED')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(completed_delta)
        .bind(failed_delta)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;

        if job.status.is_terminal() {
            common_metrics::inc(crate::metrics::JOB_COMPLETED, &[], 1);
        }

        Ok(job)
    }

    pub async fn set_job_status(&self, id: &str, status: JobStatus) -> Result<Job, QueueError> {
        let completed_at_clause = if status.is_terminal() {
            "now()"
        } else {
            "completed_at"
        };
        let sql = format!(
            "UPDATE jobs SET status = $2, completed_at = {completed_at_clause}, updated_at = now() WHERE id = $1 RETURNING *"
        );
        sqlx::query_as::<_, Job>(&sql)
            .bind(id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))
    }

    /// Mark `id` cancelled, rejecting jobs already in a terminal state.
    pub async fn cancel_job(&self, id: &str) -> Result<Job, QueueError> {
        let job = self.get_job(id).await?;
        if job.status.is_terminal() {
            return Err(QueueError::AlreadyTerminal(id.to_string()));
        }
        sqlx::query_as::<_, Job>(
            "UPDATE jobs SET status = 'CANCELLED', completed_at = now(), updated_at = now() \
             WHERE id = $1 AND status NOT IN ('COMPLETED', 'FAILED', 'CANCELLED') RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| QueueError::AlreadyTerminal(id.to_string()))
    }
}
