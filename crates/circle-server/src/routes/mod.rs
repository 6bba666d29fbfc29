//! REST surface.
//!
//! History is durable and served here; the socket only carries live frames.
//! Every handler acts as the [`CurrentUser`](crate::auth::CurrentUser)
//! named in the `x-user-id` header.

use axum::Router;
use axum::routing::{get, post};

use crate::AppState;
use crate::relay::socket::ws_handler;

mod circles;
mod dm;
mod notifications;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .route("/api/circles", post(circles::create))
        .route("/api/circles/my", get(circles::mine))
        .route("/api/circles/{id}", get(circles::show))
        .route("/api/circles/{id}/join", post(circles::join))
        .route("/api/circles/{id}/leave", post(circles::leave))
        .route(
            "/api/circles/{id}/messages",
            get(circles::messages).post(circles::post_message),
        )
        .route(
            "/api/dm/conversations",
            get(dm::conversations).post(dm::open),
        )
        .route(
            "/api/dm/conversations/{id}/messages",
            get(dm::messages).post(dm::send),
        )
        .route("/api/notifications", get(notifications::list))
        .route("/api/notifications/read-all", post(notifications::read_all))
        .route("/api/notifications/{id}/read", post(notifications::read))
}

async fn health() -> &'static str {
    "ok"
}
