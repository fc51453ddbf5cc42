use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use crate::context::AppContext;
use crate::dto::JobUpdateMessage;
use crate::metrics_constants::{SCOPE_LABEL, WS_CONNECTIONS, WS_MESSAGES_SENT};

pub async fn ws_all_jobs(
    ws: WebSocketUpgrade,
    State(context): State<Arc<AppContext>>,
) -> impl IntoResponse {
    let subscription = context.broadcaster.subscribe_all();
    ws.on_upgrade(move |socket| run_stream(socket, subscription, "all"))
}

pub async fn ws_job(
    ws: WebSocketUpgrade,
    Path(job_id): Path<String>,
    State(context): State<Arc<AppContext>>,
) -> impl IntoResponse {
    let subscription = context.broadcaster.subscribe_job(job_id);
    ws.on_upgrade(move |socket| run_stream(socket, subscription, "job"))
}

/// Pumps Bus events to one socket until either side closes. The client
/// never needs to send anything; we still poll the receive half so a
/// closed or reset connection is noticed promptly instead of leaking the
/// subscription until the next lagged-write error.
async fn run_stream(
    socket: WebSocket,
    mut subscription: crate::broadcaster::JobSubscription,
    scope: &'static str,
) {
    let labels = [(SCOPE_LABEL.to_string(), scope.to_string())];
    common_metrics::inc(WS_CONNECTIONS, &labels, 1);

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                let message = JobUpdateMessage::from(event);
                let Ok(json) = serde_json::to_string(&message) else { continue };
                if sink.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
                common_metrics::inc(WS_MESSAGES_SENT, &labels, 1);
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => continue,
                }
            }
        }
    }
}
