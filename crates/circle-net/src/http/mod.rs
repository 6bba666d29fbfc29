//! REST client for circles, direct messages and notifications.
//!
//! The socket only carries live updates; durable history comes from these
//! endpoints. A chat view typically loads a page with
//! [`CircleApi::circle_messages`], merges it into a
//! [`MessageLog`](circle_core::MessageLog) and appends socket frames to the
//! same log.

mod api;

pub use api::{CircleApi, USER_HEADER};
