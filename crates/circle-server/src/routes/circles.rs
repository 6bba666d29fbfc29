use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use circle_core::logging::targets;
use circle_core::{ChatMessage, Circle, CircleId, NewCircle, NewMessage, NotificationKind};
use tracing::info;

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};

const TARGET: &str = targets::ROUTES;

pub(super) async fn mine(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Json<Vec<Circle>> {
    Json(state.store.circles_for_user(&user))
}

pub(super) async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<NewCircle>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Circle>)> {
    let Json(circle) = payload?;
    let circle = state.store.create_circle(&user, circle)?;
    state.relay.refresh_user(&user);

    info!(target: TARGET, circle = %circle.id, %user, "circle created");
    Ok((StatusCode::CREATED, Json(circle)))
}

pub(super) async fn show(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<CircleId>,
) -> ApiResult<Json<Circle>> {
    let circle = state.store.circle(&id)?;
    if circle.is_private && !state.store.is_member(&id, &user) {
        return Err(ApiError::Forbidden(format!("circle {id} is private")));
    }
    Ok(Json(circle))
}

pub(super) async fn join(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<CircleId>,
) -> ApiResult<Json<Circle>> {
    let already_member = state.store.is_member(&id, &user);
    let circle = state.store.join_circle(&id, &user)?;
    if already_member {
        return Ok(Json(circle));
    }

    state.relay.refresh_user(&user);
    if circle.created_by != user {
        state.store.push_notification(
            &circle.created_by,
            NotificationKind::CircleJoined,
            &format!("{user} joined {}", circle.name),
        );
    }

    info!(target: TARGET, circle = %id, %user, "joined circle");
    Ok(Json(circle))
}

pub(super) async fn leave(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<CircleId>,
) -> ApiResult<StatusCode> {
    state.store.leave_circle(&id, &user)?;
    state.relay.refresh_user(&user);

    info!(target: TARGET, circle = %id, %user, "left circle");
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn messages(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<CircleId>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    state.store.circle(&id)?;
    if !state.store.is_member(&id, &user) {
        return Err(ApiError::Forbidden(format!(
            "{user} is not a member of circle {id}"
        )));
    }
    Ok(Json(state.store.circle_messages(&id)?))
}

/// Persist a circle message and relay it, same as an inbound `chat` frame.
pub(super) async fn post_message(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<CircleId>,
    payload: Result<Json<NewMessage>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ChatMessage>)> {
    let Json(body) = payload?;
    let message = state.store.insert_chat_message(&id, &user, &body.content)?;
    state.relay.publish_chat(&message);
    Ok((StatusCode::CREATED, Json(message)))
}
