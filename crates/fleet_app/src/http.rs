//! HTTP listener: static client files, the websocket endpoint and the
//! instance directory.

use std::path::Path;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use fleet_cloud::{InstanceDirectory, InstanceSummary};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::hub::Connection;

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    /// New websocket clients, consumed by the tick loop.
    pub connections: mpsc::Sender<Connection>,
    pub directory: InstanceDirectory,
    /// Capacity of each client's outgoing frame queue.
    pub client_queue: usize,
}

/// Build the router. Unmatched paths fall through to the static directory.
pub fn router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/ws/", get(ws_handler))
        .route("/api/instances", get(list_instances))
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn list_instances(State(state): State<AppState>) -> Json<Vec<InstanceSummary>> {
    Json(state.directory.summaries())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Pump frames from the hub to one browser until either side goes away.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (connection, mut frames) = Connection::new(state.client_queue);
    let id = connection.id;
    if state.connections.send(connection).await.is_err() {
        debug!(client = %id, "simulation stopped, refusing client");
        return;
    }

    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    // Dropped by the hub.
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                };
                if let Err(err) = sender.send(Message::Binary(frame)).await {
                    warn!(client = %id, error = %err, "websocket write failed");
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(client = %id, error = %err, "websocket read failed");
                        break;
                    }
                }
            }
        }
    }
    info!(client = %id, "websocket closed");
}
