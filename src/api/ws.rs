// =============================================================================
// WebSocket Handler — Push-based snapshot updates
// =============================================================================
//
// Clients connect to `/api/v1/ws` and receive:
//   1. An immediate full Snapshot on connect (once one has been published).
//   2. A fresh Snapshot every 250 ms whenever `DataHub::version()` has
//      changed since the last push — a version-polling push loop rather
//      than pushing on every publish, so a slow client never backs up the
//      Engine.
// Ping/Pong and Close frames are handled the same as any other axum
// websocket endpoint in this style.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::api::ApiState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ApiState>>,
) -> impl IntoResponse {
    info!("WebSocket connection accepted — upgrading");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(socket: WebSocket, state: Arc<ApiState>) {
    let (mut sender, mut receiver) = socket.split();

    let mut last_sent_version: u64 = 0;
    if let Some(snapshot) = state.data_hub.latest() {
        if send_snapshot(&mut sender, snapshot.as_ref()).await.is_ok() {
            last_sent_version = state.data_hub.version();
        }
    }

    let mut push_interval = interval(Duration::from_millis(250));

    loop {
        tokio::select! {
            _ = push_interval.tick() => {
                let current_version = state.data_hub.version();
                if current_version != last_sent_version {
                    if let Some(snapshot) = state.data_hub.latest() {
                        match send_snapshot(&mut sender, snapshot.as_ref()).await {
                            Ok(()) => last_sent_version = current_version,
                            Err(e) => {
                                debug!(error = %e, "WebSocket send failed — disconnecting");
                                break;
                            }
                        }
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            debug!(error = %e, "failed to send Pong — disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket Close frame received — disconnecting");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Text/Binary/Pong from a read-only client carry no
                        // meaning here; ignored.
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error — disconnecting");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    info!("WebSocket connection closed");
}

async fn send_snapshot<S>(sender: &mut S, snapshot: &crate::snapshot::Snapshot) -> Result<(), axum::Error>
where
    S: futures_util::Sink<Message, Error = axum::Error> + Unpin,
{
    match serde_json::to_string(snapshot) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!(error = %e, "failed to serialize snapshot for websocket push");
            Ok(())
        }
    }
}
