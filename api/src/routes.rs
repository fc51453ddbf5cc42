use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use scrape_core::{ArticleRequest, JobStatus, Submitter};

use crate::context::AppContext;
use crate::dto::{
    build_results_response, CancelJobResponse, JobListResponse, JobStatusResponse, JobSummary,
    ListJobsQuery, SubmitJobRequest, SubmitJobResponse,
};
use crate::error::ApiError;
use crate::metrics_constants::{JOBS_CANCELLED, JOBS_SUBMITTED};

pub async fn submit_job(
    State(context): State<Arc<AppContext>>,
    Json(body): Json<SubmitJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let requests = body
        .articles
        .into_iter()
        .map(|a| ArticleRequest {
            url: a.url,
            source: a.source,
            category: a.category,
            priority: a.priority,
        })
        .collect();

    let submitter = Submitter::new(&context.store, &context.queue, &context.publisher);
    let job = submitter.submit(requests).await?;

    common_metrics::inc(JOBS_SUBMITTED, &[], 1);

    Ok((StatusCode::CREATED, Json(SubmitJobResponse::from(job))))
}

pub async fn job_status(
    State(context): State<Arc<AppContext>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job = context.store.get_job(&job_id).await?;
    Ok(Json(JobStatusResponse::from(job)))
}

pub async fn job_results(
    State(context): State<Arc<AppContext>>,
    Path(job_id): Path<String>,
) -> Result<Json<crate::dto::JobResultsResponse>, ApiError> {
    let job = context.store.get_job(&job_id).await?;
    let articles = context.store.list_articles(&job.article_ids).await?;
    Ok(Json(build_results_response(&job, articles)))
}

pub async fn cancel_job(
    State(context): State<Arc<AppContext>>,
    Path(job_id): Path<String>,
) -> Result<Json<CancelJobResponse>, ApiError> {
    let (job, removed_tasks) = scrape_core::cancel_job(
        &context.store,
        &context.queue,
        &context.publisher,
        &job_id,
    )
    .await?;

    common_metrics::inc(JOBS_CANCELLED, &[], 1);

    Ok(Json(CancelJobResponse {
        job_id: job.id,
        status: job.status.to_string(),
        removed_tasks,
    }))
}

pub async fn list_jobs(
    State(context): State<Arc<AppContext>>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<JobListResponse>, ApiError> {
    let status_filter = query
        .status_filter
        .map(|raw| raw.parse::<JobStatus>())
        .transpose()?;

    let limit = query
        .limit
        .unwrap_or(context.config.default_page_size)
        .clamp(1, context.config.max_page_size);
    let skip = query.skip.unwrap_or(0).max(0);

    let jobs = context.store.list_jobs(status_filter, limit, skip).await?;

    Ok(Json(JobListResponse {
        jobs: jobs.into_iter().map(JobSummary::from).collect(),
        limit,
        skip,
    }))
}
