// ============================
// crates/backend-lib/src/ws_router.rs
// ============================
//! WebSocket router and connection plumbing.
//!
//! One mpsc channel per connection carries outbound traffic; a forwarder
//! task drains it into the socket sink so that broadcasts from other
//! connections and direct replies share one ordered writer. A `Shutdown`
//! on the channel closes the socket from the server side (logout, room
//! eviction).

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use smartdoor_common::{ClientMessage, ServerMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::handler::ConnectionHandler;
use crate::registry::Outbound;
use crate::AppState;

const OUTBOUND_BUFFER: usize = 32;

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    "ok"
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    counter!(crate::metrics::WS_CONNECTION).increment(1);
    gauge!(crate::metrics::WS_ACTIVE).increment(1.0);

    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Outbound>(OUTBOUND_BUFFER);

    let handler = ConnectionHandler::new(state, tx.clone());
    let connection_id = handler.connection_id();
    debug!(%connection_id, "websocket connected");

    // Forwarder: the only task writing to the sink. Shutdown closes the
    // socket from the server side.
    let send_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Message(msg) => {
                    let json = match serde_json::to_string(&msg) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(%connection_id, error = %e, "dropping unserializable message");
                            continue;
                        },
                    };
                    if sink.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                },
                Outbound::Shutdown => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                },
            }
        }
    });

    // Inbound loop: commands are handled sequentially so a connection's
    // own updates are applied in the order it sent them.
    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    if let Err(e) = handler.handle_message(client_msg).await {
                        // Infra failure aborts only the in-flight command.
                        warn!(%connection_id, error = %e, "command failed");
                    }
                },
                Err(e) => {
                    let _ = tx
                        .send(Outbound::Message(ServerMessage::MalformedMessage {
                            err_msg: e.to_string(),
                        }))
                        .await;
                },
            },
            Message::Close(_) => break,
            // Ping/pong are answered by axum; binary frames are not part
            // of the protocol.
            _ => {},
        }
    }

    handler.unregister();
    debug!(%connection_id, "websocket disconnected");

    counter!(crate::metrics::WS_DISCONNECTION).increment(1);
    gauge!(crate::metrics::WS_ACTIVE).decrement(1.0);

    send_task.abort();
}
