use axum::{extract::State, routing::get, Router};
use common_metrics::setup_metrics_routes;
use envconfig::Envconfig;
use health::HealthRegistry;
use scrape_worker::{config::Config, context::AppContext, engine, error as worker_error};
use std::{future::ready, sync::Arc, time::Duration};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

async fn listen(app: Router, bind: String) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Clone)]
struct WorkerId(pub String);

pub fn app(liveness: HealthRegistry, worker_id: String) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(move || ready(liveness.get_status())))
        .with_state(WorkerId(worker_id))
}

async fn index(State(worker_id): State<WorkerId>) -> String {
    format!("scrape worker {}", worker_id.0)
}

/// Cooperative loop: pops and spawns work onto `tasks` until `shutdown`
/// flips, then stops popping and drains whatever's still in-flight, bounded
/// by a timeout, instead of letting the process exit abort it mid-scrape.
async fn worker_loop(
    context: Arc<AppContext>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), worker_error::WorkerError> {
    let mut tasks = JoinSet::new();

    while !*shutdown.borrow() {
        context.liveness.report_healthy().await;
        let started = engine::tick(context.clone(), &mut tasks).await?;
        while tasks.try_join_next().is_some() {}

        if started == 0 {
            tokio::select! {
                _ = tokio::time::sleep(context.config.poll_interval.to_std().unwrap_or_default()) => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    info!(
        in_flight = tasks.len(),
        "shutdown signalled, draining in-flight scrapes"
    );
    let drain_timeout = context
        .config
        .scrape_timeout
        .to_std()
        .unwrap_or(Duration::from_secs(30))
        + Duration::from_secs(5);
    if tokio::time::timeout(drain_timeout, async {
        while tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!(
            remaining = tasks.len(),
            "drain timed out, abandoning remaining in-flight scrapes"
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let config = Config::init_from_env().expect("failed to load configuration from env");
    tracing_subscriber::fmt::init();

    let liveness = HealthRegistry::new("liveness");

    let (app_config, pool_config) = config.to_components();
    let bind = format!("{}:{}", app_config.host, app_config.port);

    info!(
        "scrape worker starting with id {:?}, listening at {}",
        app_config.worker_id, bind
    );

    let worker_liveness = liveness
        .register(
            "worker".to_string(),
            (app_config.poll_interval * 4).to_std().unwrap_or_default(),
        )
        .await;

    let app = setup_metrics_routes(app(liveness, app_config.worker_id.clone()));

    let context = Arc::new(
        AppContext::create(app_config, pool_config, worker_liveness)
            .await
            .expect("failed to create app context"),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut http_server = tokio::spawn(listen(app, bind));
    let mut worker = tokio::spawn(worker_loop(context, shutdown_rx));

    tokio::select! {
        res = &mut worker => {
            error!("worker loop exited");
            if let Err(e) = res {
                error!("worker task panicked: {}", e)
            }
        }
        res = &mut http_server => {
            error!("http server exited");
            if let Err(e) = res {
                error!("server task panicked: {}", e)
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal, waiting for in-flight scrapes");
            let _ = shutdown_tx.send(true);
            if let Err(e) = (&mut worker).await {
                error!("worker task panicked during shutdown: {}", e)
            }
        }
    }

    info!("exiting");
}
