//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::entity::ConnId;
use crate::game::{SessionEvent, SessionRequest};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler. Anyone may connect; identity comes from `join`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    info!(conn_id = %conn_id, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();

    let direct_rx = state.connections.register(conn_id);
    let broadcast_rx = state.match_handle.subscribe();

    let request_tx = state.match_handle.request_tx.clone();
    let hello = SessionRequest {
        conn_id,
        event: SessionEvent::Connected,
    };
    if request_tx.send(hello).await.is_err() {
        error!(conn_id = %conn_id, "Match loop is gone, dropping connection");
        state.connections.unregister(&conn_id);
        return;
    }

    run_session(conn_id, ws_sink, ws_stream, request_tx, direct_rx, broadcast_rx).await;

    state.connections.unregister(&conn_id);
    info!(conn_id = %conn_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    conn_id: ConnId,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    request_tx: mpsc::Sender<SessionRequest>,
    mut direct_rx: mpsc::UnboundedReceiver<ServerMsg>,
    mut broadcast_rx: broadcast::Receiver<ServerMsg>,
) {
    let rate_limiter = ConnectionRateLimiter::new();

    // Spawn writer task: direct replies and broadcasts -> WebSocket
    let writer_handle = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                direct = direct_rx.recv() => match direct {
                    Some(msg) => msg,
                    None => break,
                },
                shared = broadcast_rx.recv() => match shared {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(conn_id = %conn_id, lagged_count = n, "Client lagged, skipping {} messages", n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(conn_id = %conn_id, "Broadcast channel closed");
                        break;
                    }
                },
            };

            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(conn_id = %conn_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> match loop
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(conn_id = %conn_id, "Rate limited client message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => {
                        let request = SessionRequest {
                            conn_id,
                            event: SessionEvent::Message(client_msg),
                        };
                        if request_tx.send(request).await.is_err() {
                            debug!(conn_id = %conn_id, "Request channel closed");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(conn_id = %conn_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(conn_id = %conn_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(conn_id = %conn_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Signal disconnect to match loop
    let _ = request_tx
        .send(SessionRequest {
            conn_id,
            event: SessionEvent::Disconnected,
        })
        .await;

    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
