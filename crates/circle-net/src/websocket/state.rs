//! Connection state reported by the connection manager.

use std::fmt;

/// Current state of the managed socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// A handshake is in progress.
    Connecting,
    /// Connected and ready to send/receive frames.
    Open,
    /// Not connected. A reconnect may be pending.
    #[default]
    Closed,
    /// Every reconnect attempt failed. Only [`reconnect`] recovers.
    ///
    /// [`reconnect`]: super::ConnectionManager::reconnect
    PermanentlyDisconnected,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Open => write!(f, "Open"),
            Self::Closed => write!(f, "Closed"),
            Self::PermanentlyDisconnected => write!(f, "Permanently disconnected"),
        }
    }
}
