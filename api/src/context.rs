use std::sync::Arc;

use health::HealthHandle;
use scrape_core::{Bus, PoolConfig, Publisher, Queue, Store};
use sqlx::PgPool;

use crate::broadcaster::Broadcaster;
use crate::config::AppConfig;
use crate::error::ApiError;

pub struct AppContext {
    pub store: Store,
    pub queue: Queue,
    pub publisher: Publisher,
    pub broadcaster: Broadcaster,
    pub liveness: HealthHandle,
    pub config: AppConfig,
}

impl AppContext {
    pub async fn create(
        config: AppConfig,
        pool_config: PoolConfig,
        liveness: HealthHandle,
    ) -> Result<Self, ApiError> {
        let database_url = pool_config.db_url.clone();
        let pool = pool_config
            .connect()
            .await
            .map_err(|e| ApiError::Internal(format!("failed to connect to postgres: {e}")))?;

        Ok(Self::from_pool(pool, &database_url, config, liveness))
    }

    /// Builds the context around an already-connected pool, skipping the
    /// LISTEN spawn's reliance on `PoolConfig` - used directly by
    /// `sqlx::test`-backed route tests, which hand us a pool rather than a
    /// connection string.
    pub fn from_pool(
        pool: PgPool,
        database_url: &str,
        config: AppConfig,
        liveness: HealthHandle,
    ) -> Self {
        let store = Store::from_pool(pool.clone());
        let queue = Queue::new(pool.clone());
        let publisher = Publisher::new(pool);

        let bus = Arc::new(Bus::new(config.bus_channel_capacity));
        let broadcaster = Broadcaster::new(bus.clone());

        // The one process-wide LISTEN connection. Runs for the life of the
        // process; if it dies the liveness probe stops being reported and
        // the orchestrator restarts us rather than limping on with a Bus
        // nobody is feeding.
        let database_url = database_url.to_string();
        tokio::spawn(async move {
            if let Err(error) = bus.run(&database_url).await {
                tracing::error!(%error, "bus listener exited");
            }
        });

        Self {
            store,
            queue,
            publisher,
            broadcaster,
            liveness,
            config,
        }
    }
}
