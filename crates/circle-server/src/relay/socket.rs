//! `GET /ws` upgrade and per-socket read/write loops.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use circle_core::UserId;
use circle_core::logging::targets;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, trace};

use super::{Relay, outbound_channel};
use crate::AppState;
use crate::error::ApiError;

const TARGET: &str = targets::RELAY;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SocketParams {
    user_id: Option<UserId>,
}

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<SocketParams>,
    State(state): State<AppState>,
) -> Response {
    let Some(user) = params.user_id.filter(|u| !u.as_str().trim().is_empty()) else {
        return ApiError::Unauthorized.into_response();
    };

    let relay = state.relay.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, user, relay))
}

async fn handle_socket(socket: WebSocket, user: UserId, relay: Arc<Relay>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = outbound_channel();
    let conn = relay.connect(user, tx);

    // The hub holds the only sender; unregistering ends this task.
    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if let Err(e) = sink.send(Message::Text(text)).await {
                debug!(target: TARGET, %conn, error = %e, "socket write failed");
                return;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => relay.handle_text(conn, text.as_str()),
            Ok(Message::Close(frame)) => {
                trace!(target: TARGET, %conn, ?frame, "close frame received");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(target: TARGET, %conn, error = %e, "socket read failed");
                break;
            }
        }
    }

    relay.disconnect(conn);
    let _ = writer.await;
}
