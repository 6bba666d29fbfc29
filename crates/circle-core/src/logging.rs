//! Tracing setup and log targets.
//!
//! Every crate in the workspace logs through `tracing` with one of the
//! targets below, so a deployment can narrow output with `RUST_LOG`, e.g.
//! `RUST_LOG=info,circle_server::relay=debug`.

use tracing_subscriber::{EnvFilter, fmt};

/// Target names for log filtering.
pub mod targets {
    /// Signal emission.
    pub const SIGNAL: &str = "circle_core::signal";
    /// Client connection manager.
    pub const WEBSOCKET: &str = "circle_net::websocket";
    /// Client REST calls.
    pub const HTTP: &str = "circle_net::http";
    /// Notification polling.
    pub const NOTIFICATIONS: &str = "circle_net::notifications";
    /// Server relay fan-out and socket handling.
    pub const RELAY: &str = "circle_server::relay";
    /// Server REST routes.
    pub const ROUTES: &str = "circle_server::routes";
    /// Server store operations.
    pub const STORE: &str = "circle_server::store";
}

/// Install a global fmt subscriber filtered by `RUST_LOG`.
///
/// Falls back to `default_directive` when `RUST_LOG` is unset or invalid.
/// Calling this more than once is harmless: later calls leave the first
/// subscriber in place and return `false`.
pub fn init(default_directive: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    fmt().with_env_filter(filter).try_init().is_ok()
}
