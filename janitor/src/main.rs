mod app_context;
mod config;
mod http;
mod janitor;
mod metrics_constants;

use std::sync::Arc;

use app_context::AppContext;
use config::Config;
use envconfig::Envconfig;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = Config::init_from_env().expect("failed to load configuration from env");
    tracing_subscriber::fmt::init();

    let bind = format!("{}:{}", config.host, config.port);
    let context = Arc::new(AppContext::new(config).await);

    info!(
        "starting janitor with id {:?}, listening at {}",
        context.janitor_id, bind
    );

    let cleanup_context = context.clone();
    let cleanup_loop = tokio::spawn(async move { cleanup_context.cleanup_loop().await });

    let app = http::app(context);
    let http_server = tokio::spawn(http::listen(app, bind));

    tokio::select! {
        res = cleanup_loop => {
            error!("janitor loop exited");
            if let Err(e) = res {
                error!("janitor task panicked: {}", e)
            }
        }
        res = http_server => {
            error!("http server exited");
            if let Err(e) = res {
                error!("server failed with: {:?}", e)
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    info!("exiting");
}
