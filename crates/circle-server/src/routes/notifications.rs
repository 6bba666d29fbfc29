use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use circle_core::{NotificationFeed, NotificationId};

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::ApiResult;

pub(super) async fn list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Json<NotificationFeed> {
    let notifications = state.store.notifications(&user);
    let unread_count = notifications.iter().filter(|n| !n.read).count() as u64;
    Json(NotificationFeed {
        notifications,
        unread_count,
    })
}

pub(super) async fn read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<NotificationId>,
) -> ApiResult<StatusCode> {
    state.store.mark_notification_read(&user, &id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn read_all(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> StatusCode {
    state.store.mark_all_read(&user);
    StatusCode::NO_CONTENT
}
