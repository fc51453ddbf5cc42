mod broadcaster;
mod config;
mod context;
mod dto;
mod error;
mod metrics_constants;
mod routes;
mod ws;

use std::future::ready;
use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use common_metrics::setup_metrics_routes;
use config::Config;
use context::AppContext;
use envconfig::Envconfig;
use health::HealthRegistry;
use tracing::{error, info};

async fn listen(app: Router, bind: String) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index() -> &'static str {
    "scrape api"
}

fn app(liveness: HealthRegistry, context: Arc<AppContext>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(move || ready(liveness.get_status())))
        .route("/jobs/submit", post(routes::submit_job))
        .route("/jobs/:id/status", get(routes::job_status))
        .route("/jobs/:id/results", get(routes::job_results))
        .route("/jobs/:id", delete(routes::cancel_job))
        .route("/jobs", get(routes::list_jobs))
        .route("/ws", get(ws::ws_all_jobs))
        .route("/ws/jobs/:id", get(ws::ws_job))
        .with_state(context)
}


#[tokio::main]
async fn main() {
    let config = Config::init_from_env().expect("failed to load configuration from env");
    tracing_subscriber::fmt::init();

    let liveness = HealthRegistry::new("liveness");

    let (app_config, pool_config) = config.to_components();
    let bind = format!("{}:{}", app_config.host, app_config.port);

    info!("scrape api starting, listening at {}", bind);

    let api_liveness = liveness
        .register("api".to_string(), std::time::Duration::from_secs(30))
        .await;

    let context = Arc::new(
        AppContext::create(app_config, pool_config, api_liveness)
            .await
            .expect("failed to create app context"),
    );

    context
        .store
        .run_migrations()
        .await
        .expect("failed to run migrations");

    context.liveness.report_healthy().await;

    let router = setup_metrics_routes(app(liveness, context.clone()));

    let http_server = tokio::spawn(listen(router, bind));

    tokio::select! {
        res = http_server => {
            error!("http server exited");
            if let Err(e) = res {
                error!("server task panicked: {}", e)
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    info!("exiting");
}
