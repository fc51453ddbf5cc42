use std::sync::Arc;

use health::HealthHandle;
use scrape_core::{PoolConfig, Publisher, Queue, RetryPolicy, Store};
use tokio::sync::Semaphore;

use crate::{config::AppConfig, error::WorkerError, scraper::HttpScraper, scraper::Scraper};

pub struct AppContext {
    pub store: Store,
    pub queue: Queue,
    pub publisher: Publisher,
    pub scraper: Arc<dyn Scraper>,
    pub retry_policy: RetryPolicy,
    pub concurrency_limit: Arc<Semaphore>,
    pub liveness: HealthHandle,
    pub config: AppConfig,
}

impl AppContext {
    pub async fn create(
        config: AppConfig,
        pool_config: PoolConfig,
        liveness: HealthHandle,
    ) -> Result<Self, WorkerError> {
        let pool = pool_config
            .connect()
            .await
            .map_err(|e| WorkerError::Startup(format!("failed to connect to postgres: {e}")))?;

        let store = Store::from_pool(pool.clone());
        let queue = Queue::new(pool.clone());
        let publisher = Publisher::new(pool);

        let scrape_timeout = config
            .scrape_timeout
            .to_std()
            .map_err(|e| WorkerError::Startup(format!("invalid scrape timeout: {e}")))?;
        let scraper: Arc<dyn Scraper> = Arc::new(HttpScraper::new(scrape_timeout));

        let retry_policy = RetryPolicy {
            base: config.retry_backoff_base,
            maximum_interval: config.retry_backoff_max,
            jitter_seconds: config.retry_backoff_jitter_seconds,
        };

        let concurrency_limit = Arc::new(Semaphore::new(config.concurrency_limit as usize));

        Ok(Self {
            store,
            queue,
            publisher,
            scraper,
            retry_policy,
            concurrency_limit,
            liveness,
            config,
        })
    }

    pub fn metric_labels(&self) -> Vec<(String, String)> {
        vec![("worker_id".to_string(), self.config.worker_id.clone())]
    }
}
