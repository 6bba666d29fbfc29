use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use circle_core::logging::targets;
use circle_core::{
    Conversation, ConversationId, DmMessage, NewMessage, NotificationKind, OpenConversation, UserId,
};
use tracing::debug;

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};

const TARGET: &str = targets::ROUTES;

/// Longest preview of a message body carried in a notification.
const PREVIEW_CHARS: usize = 80;

pub(super) async fn conversations(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Json<Vec<Conversation>> {
    Json(state.store.conversations_for_user(&user))
}

pub(super) async fn open(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    payload: Result<Json<OpenConversation>, JsonRejection>,
) -> ApiResult<Json<Conversation>> {
    let Json(body) = payload?;
    let conversation = state.store.open_conversation(&user, &body.user_id)?;
    Ok(Json(conversation))
}

fn participating(
    state: &AppState,
    user: &UserId,
    id: &ConversationId,
) -> ApiResult<Conversation> {
    let conversation = state.store.conversation(id)?;
    if !conversation.includes(user) {
        return Err(ApiError::Forbidden(format!(
            "{user} is not part of conversation {id}"
        )));
    }
    Ok(conversation)
}

pub(super) async fn messages(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ConversationId>,
) -> ApiResult<Json<Vec<DmMessage>>> {
    participating(&state, &user, &id)?;
    Ok(Json(state.store.conversation_messages(&id)?))
}

/// Persist a direct message and notify the recipient.
///
/// Live delivery happens when the sender follows up with a `dm` frame.
pub(super) async fn send(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ConversationId>,
    payload: Result<Json<NewMessage>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<DmMessage>)> {
    let Json(body) = payload?;
    let conversation = participating(&state, &user, &id)?;
    let message = state.store.insert_dm(&id, &user, &body.content)?;

    if let Some(recipient) = conversation.other_participant(&user) {
        state.store.push_notification(
            recipient,
            NotificationKind::DirectMessage,
            &format!("{user}: {}", preview(&message.content)),
        );
        debug!(target: TARGET, conversation = %id, %recipient, "dm notification queued");
    }

    Ok((StatusCode::CREATED, Json(message)))
}

fn preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_CHARS {
        return content.to_string();
    }
    let mut short: String = content.chars().take(PREVIEW_CHARS - 1).collect();
    short.push('…');
    short
}
