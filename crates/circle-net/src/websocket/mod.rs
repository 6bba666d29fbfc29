//! Reconnecting WebSocket connection to the relay.
//!
//! This module provides the client half of the real-time channel:
//! - Socket URL derived from the page origin (`wss` for `https`, `ws` otherwise)
//! - One managed socket per endpoint, reconnecting with capped exponential backoff
//! - A permanently-disconnected state after the attempt ceiling, with manual recovery
//! - Typed send of [`ClientFrame`](circle_core::ClientFrame)s, dropped when not open
//! - Additive per-type handlers for inbound [`ServerFrame`](circle_core::ServerFrame)s
//!
//! # Example
//!
//! ```ignore
//! use circle_net::websocket::{ConnectionConfig, ConnectionManager};
//!
//! let config = ConnectionConfig::from_origin("https://circle.example", "/ws")?
//!     .user(&user_id);
//! let manager = ConnectionManager::new(config);
//!
//! let _chat = manager.on_chat(|message| {
//!     println!("{}: {}", message.user_id, message.content);
//! });
//!
//! manager.state_changed().connect(|state| {
//!     println!("connection is {state}");
//! });
//!
//! manager.connect();
//! ```

mod backoff;
mod client;
mod endpoint;
mod handlers;
mod state;

pub use backoff::{ReconnectConfig, ReconnectDecision, ReconnectTracker};
pub use client::{ConnectionConfig, ConnectionManager};
pub use endpoint::{DEFAULT_SOCKET_PATH, endpoint_url};
pub use handlers::Subscription;
pub use state::ConnectionState;
