//! Real-time message relay.
//!
//! Every socket is registered in the [`Hub`] together with the circles its
//! user belongs to. Inbound `chat` frames are persisted and fanned out to the
//! circle; inbound `dm` frames announce an already-persisted direct message
//! to both participants. Delivery is at-most-once: a frame for a socket that
//! is closing is dropped.

use std::collections::HashSet;
use std::sync::Arc;

use circle_core::logging::targets;
use circle_core::{
    ChatMessage, CircleId, ClientFrame, ConversationId, DmMessage, MessageId, ServerFrame, UserId,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::store::{Store, StoreError};

mod hub;
pub(crate) mod socket;

pub use hub::{ConnectionId, Hub, OUTBOUND_CAPACITY, Outbound, outbound_channel};

const TARGET: &str = targets::RELAY;

/// Why an inbound frame was rejected. Reported to the sender as an `error`
/// frame; the connection stays open.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Connection {0} is not registered")]
    UnknownConnection(ConnectionId),

    #[error("Frame claims user {claimed} but the connection belongs to {actual}")]
    IdentityMismatch { claimed: UserId, actual: UserId },

    #[error("Message {message} does not belong to conversation {conversation}")]
    WrongConversation {
        message: MessageId,
        conversation: ConversationId,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Routes inbound frames and fans outbound frames to live connections.
pub struct Relay {
    hub: Hub,
    store: Arc<dyn Store>,
}

impl Relay {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            hub: Hub::new(),
            store,
        }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Register a socket for `user`, subscribed to the circles they belong to.
    pub fn connect(&self, user: UserId, outbound: Outbound) -> ConnectionId {
        // Registered before the lookup so a concurrent refresh_user can't miss it.
        let id = self.hub.register(user.clone(), HashSet::new(), outbound);
        self.hub.set_circles(id, self.store.circle_ids_for_user(&user));
        info!(target: TARGET, conn = %id, %user, "client connected");
        id
    }

    pub fn disconnect(&self, id: ConnectionId) {
        if self.hub.unregister(id) {
            info!(target: TARGET, conn = %id, "client disconnected");
        }
    }

    /// Handle one inbound text frame. Failures are answered with an `error`
    /// frame to `conn` only.
    pub fn handle_text(&self, conn: ConnectionId, text: &str) {
        if let Err(e) = self.dispatch(conn, text) {
            warn!(target: TARGET, %conn, error = %e, "rejected inbound frame");
            self.hub.send_to(
                conn,
                &ServerFrame::Error {
                    message: e.to_string(),
                },
            );
        }
    }

    fn dispatch(&self, conn: ConnectionId, text: &str) -> Result<(), RelayError> {
        let frame = ClientFrame::decode(text)?;
        let user = self
            .hub
            .user_of(conn)
            .ok_or(RelayError::UnknownConnection(conn))?;

        match frame {
            ClientFrame::Chat {
                circle_id,
                user_id,
                content,
            } => {
                if user_id != user {
                    return Err(RelayError::IdentityMismatch {
                        claimed: user_id,
                        actual: user,
                    });
                }
                self.relay_chat(&circle_id, &user, &content)
            }
            ClientFrame::Dm {
                conversation_id,
                message_id,
            } => self.relay_dm(&conversation_id, &message_id, &user),
            ClientFrame::RefreshCircles => {
                let circles = self.store.circle_ids_for_user(&user);
                debug!(target: TARGET, %conn, circles = circles.len(), "refreshed circles");
                self.hub.set_circles(conn, circles);
                Ok(())
            }
        }
    }

    fn relay_chat(&self, circle: &CircleId, user: &UserId, content: &str) -> Result<(), RelayError> {
        let message = self.store.insert_chat_message(circle, user, content)?;
        self.publish_chat(&message);
        Ok(())
    }

    fn relay_dm(
        &self,
        conversation: &ConversationId,
        message: &MessageId,
        user: &UserId,
    ) -> Result<(), RelayError> {
        let conversation = self.store.conversation(conversation)?;
        if !conversation.includes(user) {
            return Err(StoreError::Forbidden(format!(
                "{user} is not part of conversation {}",
                conversation.id
            ))
            .into());
        }

        let message = self.store.dm_message(message)?;
        if message.conversation_id != conversation.id {
            return Err(RelayError::WrongConversation {
                message: message.id,
                conversation: conversation.id,
            });
        }

        self.publish_dm(&conversation.participants, &message);
        Ok(())
    }

    /// Fan a persisted circle message out to every connection following the
    /// circle, the author's own sockets included.
    pub fn publish_chat(&self, message: &ChatMessage) -> usize {
        self.hub.broadcast_to_circle(
            &message.circle_id,
            &ServerFrame::Chat {
                message: message.clone(),
            },
        )
    }

    /// Deliver a persisted direct message to every socket of both participants.
    pub fn publish_dm(&self, participants: &[UserId], message: &DmMessage) -> usize {
        self.hub.send_to_users(
            participants,
            &ServerFrame::Dm {
                message: message.clone(),
            },
        )
    }

    /// Re-derive circle subscriptions for all of `user`'s sockets after a
    /// membership change.
    pub fn refresh_user(&self, user: &UserId) {
        let circles = self.store.circle_ids_for_user(user);
        let updated = self.hub.set_circles_for_user(user, &circles);
        debug!(target: TARGET, %user, updated, "refreshed user circles");
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay").field("hub", &self.hub).finish()
    }
}
