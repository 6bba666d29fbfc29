//! Client networking for The Circle.
//!
//! This crate provides the client half of the real-time messaging system:
//!
//! - **WebSocket**: a [`ConnectionManager`] owning one reconnecting socket to
//!   the relay, with typed send and per-event-type handlers
//! - **REST**: [`CircleApi`] for durable history, circles, conversations and
//!   notifications
//! - **Notifications**: a [`NotificationPoller`] refreshing unread badges on a
//!   fixed interval, independent of the socket
//!
//! # Example
//!
//! ```ignore
//! use circle_core::{ClientFrame, MessageLog, UserId};
//! use circle_net::{CircleApi, ConnectionConfig, ConnectionManager};
//!
//! let me = UserId::new("u1");
//! let api = CircleApi::new("https://circle.example", me.clone())?;
//! let manager = ConnectionManager::new(
//!     ConnectionConfig::from_origin("https://circle.example", "/ws")?.user(&me),
//! );
//!
//! let log = Arc::new(Mutex::new(MessageLog::new()));
//! let live = log.clone();
//! let _chat = manager.on_chat(move |message| {
//!     live.lock().append(message.clone());
//! });
//! manager.connect();
//!
//! // History and live frames may overlap; the log de-duplicates by id.
//! let history = api.circle_messages(&circle_id).await?;
//! log.lock().merge_snapshot(history);
//! ```

mod error;
pub mod http;
pub mod notifications;
pub mod websocket;

pub use error::{NetworkError, Result};

// Re-export commonly used types at the crate root
pub use http::CircleApi;
pub use notifications::{DEFAULT_POLL_INTERVAL, NotificationPoller};
pub use websocket::{
    ConnectionConfig, ConnectionManager, ConnectionState, ReconnectConfig, Subscription,
};
