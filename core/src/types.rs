use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::QueueError;

/// Expands a bare identifier list into the as_str/FromStr/Display trio every
/// text-backed domain enum in this crate needs. Kept as plain Rust (no sqlx
/// Type/Encode/Decode impls) so columns round-trip as TEXT and conversion
/// happens in Rust, not in the wire format.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = QueueError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(QueueError::Validation(format!(
                        "{other} is not a valid {}",
                        stringify!($name)
                    ))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ArticleStatus {
    Pending,
    Scraping,
    Scraped,
    Failed,
}

text_enum!(ArticleStatus {
    Pending => "PENDING",
    Scraping => "SCRAPING",
    Scraped => "SCRAPED",
    Failed => "FAILED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

text_enum!(JobStatus {
    Pending => "PENDING",
    InProgress => "IN_PROGRESS",
    Completed => "COMPLETED",
    Failed => "FAILED",
    Cancelled => "CANCELLED",
});

impl JobStatus {
    /// Terminal states can't transition anywhere else - cancellation and
    /// counter updates both need to check this before writing.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    High,
    Medium,
    Low,
}

text_enum!(QueueName {
    High => "high",
    Medium => "medium",
    Low => "low",
});

impl QueueName {
    /// Ordering used for the cross-queue pop: lower sorts first.
    pub fn rank(&self) -> i16 {
        match self {
            QueueName::High => 0,
            QueueName::Medium => 1,
            QueueName::Low => 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Article {
    pub id: Uuid,
    pub url: String,
    pub source: Option<String>,
    pub category: Option<String>,
    pub priority: i16,
    pub title: Option<String>,
    pub content: Option<String>,
    pub status: ArticleStatus,
    pub error_message: Option<String>,
    pub scraped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reference_count: i32,
    pub retry_count: i32,
}

impl sqlx::FromRow<'_, PgRow> for Article {
    fn from_row(row: &PgRow) -> sqlx::Result<Self> {
        let status: String = row.try_get("status")?;
        Ok(Article {
            id: row.try_get("id")?,
            url: row.try_get("url")?,
            source: row.try_get("source")?,
            category: row.try_get("category")?,
            priority: row.try_get("priority")?,
            title: row.try_get("title")?,
            content: row.try_get("content")?,
            status: status
                .parse()
                .map_err(|e: QueueError| sqlx::Error::Decode(Box::new(e)))?,
            error_message: row.try_get("error_message")?,
            scraped_at: row.try_get("scraped_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            reference_count: row.try_get("reference_count")?,
            retry_count: row.try_get("retry_count")?,
        })
    }
}

/// What a submitter hands the store for one URL in a batch.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArticleRequest {
    pub url: String,
    pub source: Option<String>,
    pub category: Option<String>,
    pub priority: i16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub total_articles: i32,
    pub new_articles: i32,
    pub cached_articles: i32,
    pub completed_count: i32,
    pub failed_count: i32,
    pub article_ids: Vec<Uuid>,
    /// Subset of `article_ids` that were cache hits at submission time -
    /// lets the results surface report `cached: bool` per article without
    /// guessing from `reference_count`, which is shared across every job
    /// that has ever referenced the article.
    pub cached_article_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl sqlx::FromRow<'_, PgRow> for Job {
    fn from_row(row: &PgRow) -> sqlx::Result<Self> {
        let status: String = row.try_get("status")?;
        Ok(Job {
            id: row.try_get("id")?,
            status: status
                .parse()
                .map_err(|e: QueueError| sqlx::Error::Decode(Box::new(e)))?,
            total_articles: row.try_get("total_articles")?,
            new_articles: row.try_get("new_articles")?,
            cached_articles: row.try_get("cached_articles")?,
            completed_count: row.try_get("completed_count")?,
            failed_count: row.try_get("failed_count")?,
            article_ids: row.try_get("article_ids")?,
            cached_article_ids: row.try_get("cached_article_ids")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

impl Job {
    pub fn new_id() -> String {
        format!("job_{}", Uuid::now_v7())
    }
}

/// A single leased unit of work handed back by `Queue::pop_batch`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueItem {
    pub id: i64,
    pub queue_name: QueueName,
    pub job_id: String,
    pub article_id: Uuid,
    pub url: String,
    pub priority: i16,
    pub attempt: i32,
}

impl sqlx::FromRow<'_, PgRow> for QueueItem {
    fn from_row(row: &PgRow) -> sqlx::Result<Self> {
        let queue_name: String = row.try_get("queue_name")?;
        Ok(QueueItem {
            id: row.try_get("id")?,
            queue_name: queue_name
                .parse()
                .map_err(|e: QueueError| sqlx::Error::Decode(Box::new(e)))?,
            job_id: row.try_get("job_id")?,
            article_id: row.try_get("article_id")?,
            url: row.try_get("url")?,
            priority: row.try_get("priority")?,
            attempt: row.try_get("attempt")?,
        })
    }
}

/// Result of `Deduplicator::classify` for a single URL in a submitted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupOutcome {
    /// A fresh row was created; the caller must enqueue it.
    Miss,
    /// An existing row was found already scraped; nothing to enqueue.
    CacheHit,
    /// An existing row was found still pending/scraping; it's already on a queue.
    AlreadyScheduled,
}
