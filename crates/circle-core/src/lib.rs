//! Core types for The Circle.
//!
//! This crate is shared by the relay server and its clients:
//!
//! - **Model**: circles, chat and direct messages, conversations, notifications
//! - **Protocol**: the JSON frames exchanged over the `/ws` socket
//! - **Signals**: a multi-subscriber observer used for client-side event delivery
//! - **History**: a de-duplicating, chronologically ordered message log
//! - **Logging**: tracing targets and subscriber setup
//!
//! # Example
//!
//! ```
//! use circle_core::{ClientFrame, CircleId, UserId};
//!
//! let frame = ClientFrame::Chat {
//!     circle_id: CircleId::new("c1"),
//!     user_id: UserId::new("u1"),
//!     content: "hi".into(),
//! };
//!
//! assert_eq!(
//!     frame.encode().unwrap(),
//!     r#"{"type":"chat","circleId":"c1","userId":"u1","content":"hi"}"#
//! );
//! ```

pub mod history;
pub mod logging;
pub mod model;
pub mod protocol;
pub mod signal;

pub use history::{MessageLog, Timeline};
pub use model::{
    ChatMessage, Circle, CircleId, Conversation, ConversationId, DmMessage, MessageId, NewCircle,
    NewMessage, Notification, NotificationFeed, NotificationId, NotificationKind,
    OpenConversation, UserId,
};
pub use protocol::{ClientFrame, FrameKind, ServerFrame};
pub use signal::{Signal, SlotId};
