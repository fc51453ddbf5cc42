use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use health::HealthRegistry;
use scrape_core::{Publisher, Queue, RetryPolicy, Store};
use sqlx::PgPool;
use tokio::sync::Semaphore;

use scrape_worker::{
    config::AppConfig,
    context::AppContext,
    scraper::{ScrapeError, ScrapedPage, Scraper},
};

/// A `Scraper` that always succeeds, returning a fixed page - the test
/// double standing in for the black-box seam `Scraper` is built around.
pub struct AlwaysSucceeds;

#[async_trait]
impl Scraper for AlwaysSucceeds {
    async fn scrape(&self, _url: &str) -> Result<ScrapedPage, ScrapeError> {
        Ok(ScrapedPage {
            title: "stub title".to_string(),
            content: "stub content".to_string(),
        })
    }
}

/// A `Scraper` that always fails with the same status error.
pub struct AlwaysFails;

#[async_trait]
impl Scraper for AlwaysFails {
    async fn scrape(&self, _url: &str) -> Result<ScrapedPage, ScrapeError> {
        Err(ScrapeError::Status(reqwest::StatusCode::INTERNAL_SERVER_ERROR))
    }
}

#[allow(dead_code)]
pub async fn context(
    db: PgPool,
    scraper: Arc<dyn Scraper>,
    max_retry_attempts: u32,
) -> Arc<AppContext> {
    let store = Store::from_pool(db.clone());
    let queue = Queue::new(db.clone());
    let publisher = Publisher::new(db);

    let config = AppConfig {
        host: "::".to_string(),
        port: 0,
        worker_id: "test-worker".to_string(),
        poll_interval: Duration::milliseconds(10),
        concurrency_limit: 10,
        batch_size: 10,
        scrape_timeout: Duration::seconds(5),
        max_retry_attempts,
        // Kept tiny so retry-exhaustion tests don't sit through real backoff.
        retry_backoff_base: Duration::milliseconds(1),
        retry_backoff_max: Duration::milliseconds(20),
        retry_backoff_jitter_seconds: 0,
    };

    let liveness = HealthRegistry::new("test")
        .register("worker".to_string(), std::time::Duration::from_secs(60))
        .await;

    Arc::new(AppContext {
        store,
        queue,
        publisher,
        scraper,
        retry_policy: RetryPolicy {
            base: config.retry_backoff_base,
            maximum_interval: config.retry_backoff_max,
            jitter_seconds: config.retry_backoff_jitter_seconds,
        },
        concurrency_limit: Arc::new(Semaphore::new(config.concurrency_limit as usize)),
        liveness,
        config,
    })
}
