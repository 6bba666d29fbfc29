//! Registry of live relay connections.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Utf8Bytes;
use circle_core::logging::targets;
use circle_core::{CircleId, ServerFrame, UserId};
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, trace, warn};

const TARGET: &str = targets::RELAY;

/// Frames buffered per connection before further frames are dropped.
pub const OUTBOUND_CAPACITY: usize = 256;

/// Outbound half of a connection: the socket writer drains this channel.
pub type Outbound = mpsc::Sender<Utf8Bytes>;

/// Create the bounded queue between the hub and one socket writer.
pub fn outbound_channel() -> (Outbound, mpsc::Receiver<Utf8Bytes>) {
    mpsc::channel(OUTBOUND_CAPACITY)
}

/// Unique identifier for a relay connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

struct Connection {
    user: UserId,
    circles: HashSet<CircleId>,
    outbound: Outbound,
}

impl Connection {
    /// Never waits: a full queue or a closed socket drops the frame.
    fn deliver(&self, id: ConnectionId, text: &Utf8Bytes) -> bool {
        match self.outbound.try_send(text.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(target: TARGET, conn = %id, user = %self.user, "outbound queue full, dropping frame");
                false
            }
            Err(TrySendError::Closed(_)) => {
                trace!(target: TARGET, conn = %id, "dropping frame for closed connection");
                false
            }
        }
    }
}

/// Tracks every open socket, who it belongs to and which circles it follows.
///
/// A user may hold several connections at once (one per tab or device).
#[derive(Default)]
pub struct Hub {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection and return its id.
    pub fn register(
        &self,
        user: UserId,
        circles: HashSet<CircleId>,
        outbound: Outbound,
    ) -> ConnectionId {
        let id = ConnectionId::next();
        debug!(target: TARGET, conn = %id, %user, circles = circles.len(), "connection registered");
        self.connections.write().insert(
            id,
            Connection {
                user,
                circles,
                outbound,
            },
        );
        id
    }

    /// Remove a connection. Dropping its sender ends the socket writer.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.connections.write().remove(&id).is_some();
        if removed {
            debug!(target: TARGET, conn = %id, "connection unregistered");
        }
        removed
    }

    pub fn user_of(&self, id: ConnectionId) -> Option<UserId> {
        self.connections.read().get(&id).map(|c| c.user.clone())
    }

    /// Replace the circle subscriptions of one connection.
    pub fn set_circles(&self, id: ConnectionId, circles: HashSet<CircleId>) -> bool {
        match self.connections.write().get_mut(&id) {
            Some(connection) => {
                connection.circles = circles;
                true
            }
            None => false,
        }
    }

    /// Replace the circle subscriptions of every connection owned by `user`.
    pub fn set_circles_for_user(&self, user: &UserId, circles: &HashSet<CircleId>) -> usize {
        let mut connections = self.connections.write();
        let mut updated = 0;
        for connection in connections.values_mut().filter(|c| &c.user == user) {
            connection.circles = circles.clone();
            updated += 1;
        }
        updated
    }

    pub fn circles_of(&self, id: ConnectionId) -> Option<HashSet<CircleId>> {
        self.connections.read().get(&id).map(|c| c.circles.clone())
    }

    /// Send `frame` to every connection following `circle`.
    ///
    /// Returns how many connections accepted the frame.
    pub fn broadcast_to_circle(&self, circle: &CircleId, frame: &ServerFrame) -> usize {
        let Some(text) = encode(frame) else {
            return 0;
        };

        let connections = self.connections.read();
        let delivered = connections
            .iter()
            .filter(|(_, c)| c.circles.contains(circle))
            .filter(|(id, c)| c.deliver(**id, &text))
            .count();

        debug!(target: TARGET, %circle, kind = %frame.kind(), delivered, "circle fan-out");
        delivered
    }

    /// Send `frame` to every connection owned by any of `users`.
    pub fn send_to_users(&self, users: &[UserId], frame: &ServerFrame) -> usize {
        let Some(text) = encode(frame) else {
            return 0;
        };

        let connections = self.connections.read();
        let delivered = connections
            .iter()
            .filter(|(_, c)| users.contains(&c.user))
            .filter(|(id, c)| c.deliver(**id, &text))
            .count();

        debug!(target: TARGET, users = users.len(), kind = %frame.kind(), delivered, "user fan-out");
        delivered
    }

    /// Send `frame` to a single connection.
    pub fn send_to(&self, id: ConnectionId, frame: &ServerFrame) -> bool {
        let Some(text) = encode(frame) else {
            return false;
        };

        self.connections
            .read()
            .get(&id)
            .is_some_and(|c| c.deliver(id, &text))
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Number of open connections owned by `user`.
    pub fn connections_of(&self, user: &UserId) -> usize {
        self.connections
            .read()
            .values()
            .filter(|c| &c.user == user)
            .count()
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("connections", &self.connection_count())
            .finish()
    }
}

/// Serialise once; recipients share the buffer.
fn encode(frame: &ServerFrame) -> Option<Utf8Bytes> {
    match frame.encode() {
        Ok(text) => Some(Utf8Bytes::from(text)),
        Err(e) => {
            error!(target: TARGET, kind = %frame.kind(), error = %e, "failed to encode frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use circle_core::{ChatMessage, MessageId};
    use tokio::sync::mpsc::Receiver;

    use super::*;

    fn chat(circle: &str, content: &str) -> ServerFrame {
        ServerFrame::Chat {
            message: ChatMessage {
                id: MessageId::new("m1"),
                circle_id: CircleId::new(circle),
                user_id: UserId::new("alice"),
                content: content.into(),
                created_at: Utc::now(),
            },
        }
    }

    fn circles(ids: &[&str]) -> HashSet<CircleId> {
        ids.iter().map(|id| CircleId::new(*id)).collect()
    }

    fn connect(hub: &Hub, user: &str, ids: &[&str]) -> (ConnectionId, Receiver<Utf8Bytes>) {
        let (tx, rx) = outbound_channel();
        (hub.register(UserId::new(user), circles(ids), tx), rx)
    }

    #[test]
    fn test_broadcast_reaches_circle_followers_only() {
        let hub = Hub::new();
        let (_, mut alice) = connect(&hub, "alice", &["c1"]);
        let (_, mut bob) = connect(&hub, "bob", &["c1", "c2"]);
        let (_, mut carol) = connect(&hub, "carol", &["c2"]);

        let frame = chat("c1", "hello");
        assert_eq!(hub.broadcast_to_circle(&CircleId::new("c1"), &frame), 2);

        let expected = frame.encode().unwrap();
        assert_eq!(alice.try_recv().unwrap().as_str(), expected);
        assert_eq!(bob.try_recv().unwrap().as_str(), expected);
        assert!(carol.try_recv().is_err());
    }

    #[test]
    fn test_send_to_users_covers_every_tab() {
        let hub = Hub::new();
        let (_, mut tab1) = connect(&hub, "alice", &[]);
        let (_, mut tab2) = connect(&hub, "alice", &[]);
        let (_, mut bob) = connect(&hub, "bob", &[]);
        let (_, mut eve) = connect(&hub, "eve", &[]);

        let delivered = hub.send_to_users(
            &[UserId::new("alice"), UserId::new("bob")],
            &chat("c1", "x"),
        );
        assert_eq!(delivered, 3);
        assert!(tab1.try_recv().is_ok());
        assert!(tab2.try_recv().is_ok());
        assert!(bob.try_recv().is_ok());
        assert!(eve.try_recv().is_err());
        assert_eq!(hub.connections_of(&UserId::new("alice")), 2);
    }

    #[test]
    fn test_closed_receiver_is_skipped() {
        let hub = Hub::new();
        let (_, rx) = connect(&hub, "alice", &["c1"]);
        let (_, mut bob) = connect(&hub, "bob", &["c1"]);
        drop(rx);

        assert_eq!(hub.broadcast_to_circle(&CircleId::new("c1"), &chat("c1", "x")), 1);
        assert!(bob.try_recv().is_ok());
    }

    #[test]
    fn test_unregister_and_circle_updates() {
        let hub = Hub::new();
        let (id, mut rx) = connect(&hub, "alice", &["c1"]);
        assert_eq!(hub.connection_count(), 1);
        assert_eq!(hub.user_of(id), Some(UserId::new("alice")));

        assert!(hub.set_circles(id, circles(&["c2"])));
        assert_eq!(hub.circles_of(id), Some(circles(&["c2"])));
        assert_eq!(hub.broadcast_to_circle(&CircleId::new("c1"), &chat("c1", "x")), 0);

        assert_eq!(
            hub.set_circles_for_user(&UserId::new("alice"), &circles(&["c1", "c3"])),
            1
        );
        assert_eq!(hub.broadcast_to_circle(&CircleId::new("c3"), &chat("c3", "x")), 1);
        assert!(rx.try_recv().is_ok());

        assert!(hub.unregister(id));
        assert!(!hub.unregister(id));
        assert!(!hub.send_to(id, &chat("c1", "x")));
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn test_stalled_connection_drops_overflow() {
        let hub = Hub::new();
        let (_, mut stalled) = connect(&hub, "alice", &["c1"]);
        let (_, mut bob) = connect(&hub, "bob", &["c1"]);
        let circle = CircleId::new("c1");

        for _ in 0..OUTBOUND_CAPACITY {
            assert_eq!(hub.broadcast_to_circle(&circle, &chat("c1", "x")), 2);
            assert!(bob.try_recv().is_ok());
        }

        // Alice's queue is full; bob keeps receiving.
        assert_eq!(hub.broadcast_to_circle(&circle, &chat("c1", "late")), 1);
        assert_eq!(hub.broadcast_to_circle(&circle, &chat("c1", "later")), 1);
        assert!(bob.try_recv().is_ok());

        let mut queued = 0;
        while stalled.try_recv().is_ok() {
            queued += 1;
        }
        assert_eq!(queued, OUTBOUND_CAPACITY);

        // Draining frees room again.
        assert_eq!(hub.broadcast_to_circle(&circle, &chat("c1", "again")), 2);
    }
}
