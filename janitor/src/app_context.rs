use chrono::{DateTime, Duration, Utc};
use health::{HealthHandle, HealthRegistry};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::{
    config::{Config, JanitorSettings},
    janitor::run_once,
};

pub struct AppContext {
    pub janitor: scrape_core::Janitor,
    pub metrics_labels: Vec<(String, String)>,
    pub health: HealthRegistry,
    pub janitor_liveness: HealthHandle,
    pub state: AppState,
    pub janitor_id: String,
}

impl AppContext {
    pub async fn new(config: Config) -> Self {
        let config = config.get_janitor_config();
        let pool = config
            .pool
            .connect()
            .await
            .expect("failed to connect to postgres");
        let janitor = scrape_core::Janitor::new(pool);

        let health = HealthRegistry::new("liveness");

        let metrics_labels = vec![("janitor_id".to_string(), config.settings.id.clone())];

        let janitor_liveness = health
            .register(
                "janitor".to_string(),
                (config.settings.cleanup_interval * 4)
                    .to_std()
                    .unwrap_or_default(),
            )
            .await;

        let state = AppState::new(&config.settings);

        Self {
            janitor,
            metrics_labels,
            health,
            janitor_liveness,
            state,
            janitor_id: config.settings.id,
        }
    }

    pub async fn cleanup_loop(&self) {
        loop {
            let interval = self.state.get_control().await.cleanup_interval;
            let next_run = Utc::now() + interval;
            let mut next_status = run_once(self).await;
            next_status.next_run = Some(next_run);
            self.state.set_status(next_status).await;
            self.janitor_liveness.report_healthy().await;
            tokio::time::sleep(interval.to_std().unwrap_or_default()).await;
        }
    }
}

// Cross-cutting state, shared between the cleanup loop and the control interface.
#[derive(Debug)]
pub struct AppState {
    status: Mutex<JanitorStatus>,
    control: Mutex<ControlFlags>,
}

// Transient state, displayed to the user on the control interface. Includes "status" and "control".
#[derive(Debug, Clone, Serialize, Default)]
pub struct JanitorStatus {
    pub last_stalled_reset: Option<u64>,
    pub last_jobs_deleted: Option<u64>,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
    pub last_successful_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
}

// Control flags, snapshotted at the start of each loop iteration.
#[derive(Debug, Clone, Default)]
pub struct ControlFlags {
    pub paused_until: Option<DateTime<Utc>>,
    pub cleanup_interval: Duration,
    pub stalled_article_timeout: Duration,
    pub job_retention: Duration,
}

impl AppState {
    pub fn new(settings: &JanitorSettings) -> Self {
        let status = Default::default();
        let control = ControlFlags {
            cleanup_interval: settings.cleanup_interval,
            stalled_article_timeout: settings.stalled_article_timeout,
            job_retention: settings.job_retention,
            paused_until: None,
        };
        Self {
            status: Mutex::new(status),
            control: Mutex::new(control),
        }
    }

    pub async fn get_status(&self) -> JanitorStatus {
        self.status.lock().await.clone()
    }

    pub async fn get_control(&self) -> ControlFlags {
        self.control.lock().await.clone()
    }

    pub async fn set_status(&self, status: JanitorStatus) {
        *self.status.lock().await = status;
    }
}
