use chrono::Utc;
use scrape_core::QueueError;
use tracing::{error, info, warn};

use crate::app_context::{AppContext, JanitorStatus};
use crate::metrics_constants::*;

pub async fn run_once(context: &AppContext) -> JanitorStatus {
    match run_once_inner(context).await {
        Ok(status) => status,
        Err(e) => {
            error!("janitor loop failed: {:?}", e);
            let mut status = context.state.get_status().await;
            status.last_error = Some(e.to_string());
            status.last_error_time = Some(Utc::now());
            status
        }
    }
}

async fn run_once_inner(context: &AppContext) -> Result<JanitorStatus, QueueError> {
    info!("running janitor loop");

    // Grab a snapshot of the control state at the instant we started this run.
    let control_state = context.state.get_control().await;

    if control_state
        .paused_until
        .map(|t| t > Utc::now())
        .unwrap_or(false)
    {
        info!("janitor is paused, skipping cleanup");
        return Ok(context.state.get_status().await);
    }

    let labels = &context.metrics_labels;

    let _loop_start = common_metrics::timing_guard(RUN_TIME, labels);
    common_metrics::inc(RUN_STARTS, labels, 1);

    let stalled = {
        let _time = common_metrics::timing_guard(STALLED_TIME, labels);
        context
            .janitor
            .reset_stalled_articles(control_state.stalled_article_timeout)
            .await?
    };
    common_metrics::inc(STALLED_COUNT, labels, stalled);

    if stalled > 0 {
        warn!("reset {} stalled articles", stalled);
    }

    let jobs_deleted = {
        let _time = common_metrics::timing_guard(JOBS_DELETED_TIME, labels);
        context
            .janitor
            .delete_terminal_jobs(control_state.job_retention)
            .await?
    };
    common_metrics::inc(JOBS_DELETED_COUNT, labels, jobs_deleted);

    common_metrics::inc(RUN_ENDS, labels, 1);
    info!("janitor loop complete");

    let mut status = context.state.get_status().await;
    status.last_stalled_reset = Some(stalled);
    status.last_jobs_deleted = Some(jobs_deleted);
    status.last_successful_run = Some(Utc::now());

    Ok(status)
}
