use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use scrape_core::{Article, Job};

#[derive(Debug, Deserialize)]
pub struct SubmitArticleRequest {
    pub url: String,
    pub source: Option<String>,
    pub category: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i16,
}

fn default_priority() -> i16 {
    5
}

#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub articles: Vec<SubmitArticleRequest>,
}

#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub job_id: String,
    pub status: String,
    pub total_articles: i32,
    pub new_articles: i32,
    pub cached_articles: i32,
    pub message: String,
}

impl From<Job> for SubmitJobResponse {
    fn from(job: Job) -> Self {
        let message = format!(
            "accepted {} article(s), {} new, {} served from cache",
            job.total_articles, job.new_articles, job.cached_articles
        );
        Self {
            job_id: job.id,
            status: job.status.to_string(),
            total_articles: job.total_articles,
            new_articles: job.new_articles,
            cached_articles: job.cached_articles,
            message,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: String,
    pub total_articles: i32,
    pub completed: i32,
    pub failed: i32,
    pub pending: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        let pending = job.total_articles - job.completed_count - job.failed_count;
        Self {
            job_id: job.id,
            status: job.status.to_string(),
            total_articles: job.total_articles,
            completed: job.completed_count,
            failed: job.failed_count,
            pending: pending.max(0),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ArticleResult {
    pub article_id: Uuid,
    pub url: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub status: String,
    pub cached: bool,
}

#[derive(Debug, Serialize)]
pub struct FailedArticle {
    pub article_id: Uuid,
    pub url: String,
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JobResultsResponse {
    pub job_id: String,
    pub status: String,
    pub articles: Vec<ArticleResult>,
    pub failed_articles: Vec<FailedArticle>,
}

/// Assembles the results payload from the job's own record plus the full
/// rows for every article it references - `job.cached_article_ids` is what
/// lets this mark `cached` per-article instead of guessing from the
/// article's shared `reference_count`.
pub fn build_results_response(job: &Job, articles: Vec<Article>) -> JobResultsResponse {
    let mut results = Vec::with_capacity(articles.len());
    let mut failed = Vec::new();

    for article in articles {
        if article.status == scrape_core::ArticleStatus::Failed {
            failed.push(FailedArticle {
                article_id: article.id,
                url: article.url.clone(),
                error_message: article.error_message.clone(),
            });
        }
        results.push(ArticleResult {
            cached: job.cached_article_ids.contains(&article.id),
            article_id: article.id,
            url: article.url,
            title: article.title,
            content: article.content,
            status: article.status.to_string(),
        });
    }

    JobResultsResponse {
        job_id: job.id.clone(),
        status: job.status.to_string(),
        articles: results,
        failed_articles: failed,
    }
}

#[derive(Debug, Serialize)]
pub struct CancelJobResponse {
    pub job_id: String,
    pub status: String,
    pub removed_tasks: u64,
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub status_filter: Option<String>,
    pub limit: Option<i64>,
    pub skip: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub job_id: String,
    pub status: String,
    pub total_articles: i32,
    pub completed: i32,
    pub failed: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobSummary {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status.to_string(),
            total_articles: job.total_articles,
            completed: job.completed_count,
            failed: job.failed_count,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobSummary>,
    pub limit: i64,
    pub skip: i64,
}

/// Wire shape for both `/ws` and `/ws/jobs/{id}` - one flattened message
/// type regardless of which `DomainEvent` variant produced it, per the
/// documented `{type: "job_update", ...}` shape.
#[derive(Debug, Clone, Serialize)]
pub struct JobUpdateMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub job_id: String,
    pub article_id: Option<Uuid>,
    pub status: Option<String>,
    pub completed: Option<i32>,
    pub failed: Option<i32>,
    pub total: Option<i32>,
}

impl From<scrape_core::DomainEvent> for JobUpdateMessage {
    fn from(event: scrape_core::DomainEvent) -> Self {
        use scrape_core::DomainEvent::*;
        match event {
            JobProgress {
                job_id,
                completed_count,
                failed_count,
                total_articles,
            } => JobUpdateMessage {
                kind: "job_update",
                job_id,
                article_id: None,
                status: None,
                completed: Some(completed_count),
                failed: Some(failed_count),
                total: Some(total_articles),
            },
            JobCancelled { job_id } => JobUpdateMessage {
                kind: "job_update",
                job_id,
                article_id: None,
                status: Some("CANCELLED".to_string()),
                completed: None,
                failed: None,
                total: None,
            },
            ArticleTransition {
                job_id,
                article_id,
                url: _,
                status,
                error_message: _,
                completed_count,
                failed_count,
                total_articles,
            } => JobUpdateMessage {
                kind: "job_update",
                job_id,
                article_id: Some(article_id),
                status: Some(status),
                completed: Some(completed_count),
                failed: Some(failed_count),
                total: Some(total_articles),
            },
        }
    }
}
