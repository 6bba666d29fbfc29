//! System of record for circles, messages and notifications.
//!
//! The relay and the REST routes only talk to the [`Store`] trait. The
//! workspace ships [`MemoryStore`]; a relational implementation plugs in
//! behind the same trait.

use std::collections::HashSet;

use circle_core::{
    ChatMessage, Circle, CircleId, Conversation, ConversationId, DmMessage, MessageId, NewCircle,
    Notification, NotificationId, NotificationKind, UserId,
};
use thiserror::Error;

mod memory;

pub use memory::MemoryStore;

/// Longest accepted message body, in characters.
pub const MAX_CONTENT_CHARS: usize = 4000;

/// Longest accepted circle name, in characters.
pub const MAX_CIRCLE_NAME_CHARS: usize = 100;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid input: {0}")]
    Invalid(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable storage operations used by the relay and the REST surface.
pub trait Store: Send + Sync {
    /// Create a circle; the creator becomes its first member.
    fn create_circle(&self, owner: &UserId, circle: NewCircle) -> StoreResult<Circle>;

    fn circle(&self, id: &CircleId) -> StoreResult<Circle>;

    /// Circles `user` belongs to, oldest first.
    fn circles_for_user(&self, user: &UserId) -> Vec<Circle>;

    fn circle_ids_for_user(&self, user: &UserId) -> HashSet<CircleId>;

    /// Add `user` to a public circle. Joining twice is a no-op.
    fn join_circle(&self, circle: &CircleId, user: &UserId) -> StoreResult<Circle>;

    fn leave_circle(&self, circle: &CircleId, user: &UserId) -> StoreResult<()>;

    fn is_member(&self, circle: &CircleId, user: &UserId) -> bool;

    /// Persist a circle message. The author must be a member.
    fn insert_chat_message(
        &self,
        circle: &CircleId,
        author: &UserId,
        content: &str,
    ) -> StoreResult<ChatMessage>;

    /// Messages of a circle, oldest first.
    fn circle_messages(&self, circle: &CircleId) -> StoreResult<Vec<ChatMessage>>;

    /// Open the conversation between two distinct users, reusing an
    /// existing one for the same pair.
    fn open_conversation(&self, a: &UserId, b: &UserId) -> StoreResult<Conversation>;

    fn conversation(&self, id: &ConversationId) -> StoreResult<Conversation>;

    fn conversations_for_user(&self, user: &UserId) -> Vec<Conversation>;

    /// Persist a direct message. The sender must be a participant.
    fn insert_dm(
        &self,
        conversation: &ConversationId,
        sender: &UserId,
        content: &str,
    ) -> StoreResult<DmMessage>;

    fn dm_message(&self, id: &MessageId) -> StoreResult<DmMessage>;

    /// Messages of a conversation, oldest first.
    fn conversation_messages(&self, conversation: &ConversationId) -> StoreResult<Vec<DmMessage>>;

    fn push_notification(
        &self,
        user: &UserId,
        kind: NotificationKind,
        body: &str,
    ) -> Notification;

    /// Notifications of `user`, newest first.
    fn notifications(&self, user: &UserId) -> Vec<Notification>;

    fn mark_notification_read(&self, user: &UserId, id: &NotificationId) -> StoreResult<()>;

    /// Returns how many notifications changed from unread to read.
    fn mark_all_read(&self, user: &UserId) -> usize;
}

/// Trim and bound-check a message body.
pub(crate) fn validate_content(content: &str) -> StoreResult<&str> {
    let content = content.trim();
    if content.is_empty() {
        return Err(StoreError::Invalid("message content is empty".into()));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(StoreError::Invalid(format!(
            "message content exceeds {MAX_CONTENT_CHARS} characters"
        )));
    }
    Ok(content)
}

pub(crate) fn validate_circle_name(name: &str) -> StoreResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::Invalid("circle name is empty".into()));
    }
    if name.chars().count() > MAX_CIRCLE_NAME_CHARS {
        return Err(StoreError::Invalid(format!(
            "circle name exceeds {MAX_CIRCLE_NAME_CHARS} characters"
        )));
    }
    Ok(name)
}
