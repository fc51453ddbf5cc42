use std::{cmp::min, future::Future, sync::Arc};

use scrape_core::{
    ArticleStatus, ArticleUpdate, DomainEvent, JobStatus, QueueError, QueueItem, QueueName,
};
use tokio::sync::OwnedSemaphorePermit;
use tokio::task::JoinSet;
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::{context::AppContext, error::WorkerError, metrics_constants::*, scraper::ScrapedPage};

/// Bounded in-place retry for a single transient Store error, per spec.md
/// §4.6/§7: "transient Store errors during update are retried in-place with
/// bounded attempts; after exhaustion, the worker logs and drops the item."
/// This is a distinct policy from a `ScrapeFailure`'s re-queue-with-backoff
/// path in `handle_failure` - it never touches the queue or the article's
/// `retry_count`, it just re-issues the same Store call a few times before
/// giving up and letting the error propagate to `tick`'s own log-and-drop
/// handling.
const STORE_RETRY_ATTEMPTS: usize = 3;
const STORE_RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(50);

async fn with_store_retry<T, F, Fut>(operation: &str, mut call: F) -> Result<T, QueueError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, QueueError>>,
{
    let mut attempt = 0usize;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt + 1 < STORE_RETRY_ATTEMPTS => {
                attempt += 1;
                warn!(%error, operation, attempt, "retrying transient store error in place");
                tokio::time::sleep(STORE_RETRY_DELAY).await;
            }
            Err(error) => return Err(error),
        }
    }
}

/// C6 Worker, one tick of the outer loop: pop as many items as we have
/// spare permits for, and spawn one task per item onto `tasks` rather than
/// detaching it with a bare `tokio::spawn` - the caller retains the join
/// handles so a shutdown signal can drain in-flight work instead of letting
/// the runtime abort it out from under a scrape. Mirrors the teacher's
/// `tick`/`run_job` split - `tick` never blocks on an individual item's
/// work, only on acquiring the permit that bounds how much runs at once.
#[instrument(skip_all)]
pub async fn tick(context: Arc<AppContext>, tasks: &mut JoinSet<()>) -> Result<usize, WorkerError> {
    let labels = context.metric_labels();
    common_metrics::gauge(
        WORKER_SAT,
        &labels,
        context.concurrency_limit.available_permits() as f64,
    );

    let max_items = min(
        context.concurrency_limit.available_permits(),
        context.config.batch_size,
    );
    if max_items == 0 {
        return Ok(0);
    }

    let items = {
        let _time = common_metrics::timing_guard(DEQUEUE_TIME, &labels);
        context.queue.pop_batch(max_items as i64).await?
    };

    let num_items = items.len();
    common_metrics::inc(WORKER_DEQUEUED, &labels, num_items as u64);

    let _time = common_metrics::timing_guard(SPAWN_TIME, &labels);
    for item in items {
        let context = context.clone();
        // We acquire permits one at a time so a finished item's permit is
        // immediately available to the next dequeue, rather than held for
        // the whole batch.
        let permit = context
            .concurrency_limit
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore is never closed");
        tasks.spawn(async move {
            let labels = context.metric_labels();
            if let Err(error) = run_item(context.clone(), item, permit).await {
                error!(%error, "error running queue item");
                common_metrics::inc(ITEM_ERRORS, &labels, 1);
            }
        });
    }

    Ok(num_items)
}

/// C6 Worker steps 2-7 for a single leased item.
#[instrument(skip_all, fields(article_id = %item.article_id, job_id = %item.job_id, attempt = item.attempt))]
pub async fn run_item(
    context: Arc<AppContext>,
    item: QueueItem,
    _permit: OwnedSemaphorePermit,
) -> Result<(), WorkerError> {
    let labels = context.metric_labels();
    let total_time = common_metrics::timing_guard(ITEM_TOTAL_TIME, &labels);

    // Step 2: claim the article. A retry re-enters this same PENDING->SCRAPING
    // transition; the precondition is what keeps two workers from racing to
    // scrape the same article.
    let claimed = with_store_retry("claim_article", || {
        context.store.update_article(
            item.article_id,
            Some(ArticleStatus::Pending),
            ArticleUpdate::scraping(),
        )
    })
    .await;

    let article = match claimed {
        Ok(article) => article,
        Err(QueueError::PreconditionFailed { .. }) => {
            // Raced: someone else already moved this article past PENDING.
            // If it landed on SCRAPED, the winner already credited every
            // referencing job; if it's CANCELLED-adjacent, there's nothing
            // further to do either way - just drop this lease.
            total_time.label(OUTCOME_LABEL, "precondition_failed").fin();
            return Ok(());
        }
        Err(error) => return Err(error.into()),
    };

    // Step 3: a cancelled job's remaining leases are dropped, not executed.
    match with_store_retry("get_job", || context.store.get_job(&item.job_id)).await {
        Ok(job) if job.status == JobStatus::Cancelled => {
            total_time.label(OUTCOME_LABEL, "job_cancelled").fin();
            return Ok(());
        }
        Ok(_) => {}
        Err(QueueError::JobNotFound(_)) => {
            total_time.label(OUTCOME_LABEL, "job_missing").fin();
            return Ok(());
        }
        Err(error) => return Err(error.into()),
    }

    common_metrics::inc(scrape_core::metrics::SCRAPE_ATTEMPT, &labels, 1);

    // Step 4: invoke the black-box scraper, bounded by SCRAPE_TIMEOUT.
    let scrape_time = common_metrics::timing_guard(SCRAPE_REQUEST_TIME, &labels);
    let scrape_timeout = context
        .config
        .scrape_timeout
        .to_std()
        .unwrap_or(std::time::Duration::from_secs(30));
    let outcome = match tokio::time::timeout(scrape_timeout, context.scraper.scrape(&item.url)).await
    {
        Ok(Ok(page)) => Ok(page),
        Ok(Err(error)) => Err(error.to_string()),
        Err(_) => Err("scrape timed out".to_string()),
    };

    match outcome {
        Ok(page) => {
            scrape_time.label(OUTCOME_LABEL, "success").fin();
            handle_success(&context, &item, page).await?;
            total_time.label(OUTCOME_LABEL, "success").fin();
        }
        Err(message) => {
            scrape_time.label(OUTCOME_LABEL, "failure").fin();
            handle_failure(&context, &item, article.retry_count, message).await?;
            total_time.label(OUTCOME_LABEL, "failure").fin();
        }
    }

    Ok(())
}

// Step 5: success path.
async fn handle_success(
    context: &AppContext,
    item: &QueueItem,
    page: ScrapedPage,
) -> Result<(), WorkerError> {
    with_store_retry("mark_scraped", || {
        context.store.update_article(
            item.article_id,
            Some(ArticleStatus::Scraping),
            ArticleUpdate::scraped(page.title.clone(), page.content.clone()),
        )
    })
    .await?;

    common_metrics::inc(
        scrape_core::metrics::SCRAPE_SUCCESS,
        &context.metric_labels(),
        1,
    );

    fan_out(context, item.article_id, &item.url, true, None).await
}

// Step 6: failure path - retry with backoff, or exhaust into FAILED.
async fn handle_failure(
    context: &AppContext,
    item: &QueueItem,
    previous_retry_count: i32,
    message: String,
) -> Result<(), WorkerError> {
    let retry_count = previous_retry_count + 1;

    if retry_count < context.config.max_retry_attempts as i32 {
        with_store_retry("mark_retry_pending", || {
            context.store.update_article(
                item.article_id,
                Some(ArticleStatus::Scraping),
                ArticleUpdate {
                    status: Some(ArticleStatus::Pending),
                    error_message: Some(Some(message.clone())),
                    retry_count: Some(retry_count),
                    ..Default::default()
                },
            )
        })
        .await?;

        common_metrics::inc(
            scrape_core::metrics::SCRAPE_RETRY,
            &context.metric_labels(),
            1,
        );

        let delay = context.retry_policy.backoff(retry_count);
        let queue = context.queue.clone();
        let job_id = item.job_id.clone();
        let article_id = item.article_id;
        let url = item.url.clone();
        let priority = item.priority;

        // Sleep-then-push: the retry is invisible to pop() until the
        // backoff elapses, satisfying "push onto `high` after the delay".
        tokio::spawn(async move {
            tokio::time::sleep(delay.to_std().unwrap_or_default()).await;
            if let Err(error) = queue
                .push_head(QueueName::High, &job_id, article_id, &url, priority, retry_count)
                .await
            {
                warn!(%error, %article_id, "failed to re-enqueue retry");
            }
        });

        Ok(())
    } else {
        with_store_retry("mark_failed", || {
            context.store.update_article(
                item.article_id,
                Some(ArticleStatus::Scraping),
                ArticleUpdate::failed(message.clone(), retry_count),
            )
        })
        .await?;

        common_metrics::inc(
            scrape_core::metrics::SCRAPE_FAILURE,
            &context.metric_labels(),
            1,
        );

        fan_out(context, item.article_id, &item.url, false, Some(message)).await
    }
}

/// Step 7: every Job that still references this article gets its counters
/// bumped and a single bus event carrying the whole transition, not just the
/// Job that happened to own the queue item - a URL reached via
/// `AlreadyScheduled` never enqueues its own item, so this fan-out is the
/// only way that sibling Job ever hears the result. One `ArticleTransition`
/// per referencing job is the entire wire event for that job: article id,
/// its new status, and the job's counters after the update, all together -
/// matching the one-message-per-transition contract instead of splitting it
/// across a status event and a counts event.
async fn fan_out(
    context: &AppContext,
    article_id: Uuid,
    url: &str,
    success: bool,
    error_message: Option<String>,
) -> Result<(), WorkerError> {
    let owners = with_store_retry("jobs_referencing_article", || {
        context.store.jobs_referencing_article(article_id)
    })
    .await?;
    let status = if success {
        ArticleStatus::Scraped
    } else {
        ArticleStatus::Failed
    };

    for job in owners {
        let updated = with_store_retry("update_job_counters", || {
            let (completed_delta, failed_delta) = if success { (1, 0) } else { (0, 1) };
            context
                .store
                .update_job_counters(&job.id, completed_delta, failed_delta)
        })
        .await?;

        context
            .publisher
            .publish(&DomainEvent::ArticleTransition {
                job_id: updated.id.clone(),
                article_id,
                url: url.to_string(),
                status: status.to_string(),
                error_message: error_message.clone(),
                completed_count: updated.completed_count,
                failed_count: updated.failed_count,
                total_articles: updated.total_articles,
            })
            .await?;
    }

    Ok(())
}
