//! Reconnecting WebSocket connection manager.

use std::collections::HashMap;
use std::sync::Arc;

use circle_core::logging::targets;
use circle_core::{ChatMessage, ClientFrame, DmMessage, FrameKind, ServerFrame, Signal, UserId};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use super::backoff::{ReconnectConfig, ReconnectDecision, ReconnectTracker};
use super::endpoint::endpoint_url;
use super::handlers::{HandlerRegistry, Subscription};
use super::state::ConnectionState;
use crate::error::{NetworkError, Result};

const TARGET: &str = targets::WEBSOCKET;

/// Type alias for a connected WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for the managed connection.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// The WebSocket URL (ws:// or wss://).
    pub url: Url,
    /// Custom headers to send during the handshake.
    pub headers: HashMap<String, String>,
    /// Reconnect policy.
    pub reconnect: ReconnectConfig,
}

impl ConnectionConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            headers: HashMap::new(),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Parse a ws:// or wss:// URL.
    pub fn parse(url: &str) -> Result<Self> {
        Ok(Self::new(Url::parse(url)?))
    }

    /// Connect to `path` on the host serving `origin`, picking `wss` for
    /// `https` origins and `ws` otherwise.
    pub fn from_origin(origin: &str, path: &str) -> Result<Self> {
        Ok(Self::new(endpoint_url(origin, path)?))
    }

    /// Identify the connecting user to the relay.
    pub fn user(mut self, user: &UserId) -> Self {
        self.url.query_pairs_mut().append_pair("userId", user.as_str());
        self
    }

    /// Add a custom header for the WebSocket handshake.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn reconnect(mut self, config: ReconnectConfig) -> Self {
        self.reconnect = config;
        self
    }
}

/// Mutable connection bookkeeping, guarded by one lock.
struct Inner {
    state: ConnectionState,
    tracker: ReconnectTracker,
    /// Writer for the open socket. `None` whenever the socket is not open.
    outbound: Option<mpsc::UnboundedSender<String>>,
    /// Stop signal for the running connection task.
    stop: Option<watch::Sender<bool>>,
    running: bool,
    /// Bumped on every connect/shutdown; a task only mutates state while its
    /// generation is current.
    generation: u64,
    pending_reconnect: bool,
    scheduled_reconnects: u32,
}

struct Shared {
    config: ConnectionConfig,
    inner: Mutex<Inner>,
    handlers: Arc<HandlerRegistry>,
    state_changed: Signal<ConnectionState>,
    /// Cuts a pending reconnect delay short.
    retry_now: Notify,
}

impl Shared {
    fn set_state(&self, generation: u64, state: ConnectionState) {
        let changed = {
            let mut inner = self.inner.lock();
            if inner.generation != generation || inner.state == state {
                false
            } else {
                inner.state = state;
                true
            }
        };
        if changed {
            debug!(target: TARGET, %state, "connection state changed");
            self.state_changed.emit(state);
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.lock().generation == generation
    }

    fn dispatch(&self, text: &str) {
        match ServerFrame::decode(text) {
            Ok(frame) => {
                let kind = frame.kind();
                let handled = self.handlers.dispatch(frame);
                debug!(target: TARGET, %kind, handled, "dispatched frame");
            }
            Err(e) => {
                warn!(target: TARGET, error = %e, "dropping malformed frame");
            }
        }
    }
}

/// Owns the single live socket for one endpoint.
///
/// The manager survives transient network failures by reconnecting with
/// capped exponential backoff and gives UI code a stable surface that does
/// not change with the underlying connection:
///
/// - [`send`](Self::send) writes a frame if the socket is open and drops it
///   otherwise (no outbound queue)
/// - [`on`](Self::on) registers a handler for one frame kind; handlers are
///   additive and removed individually through their [`Subscription`]
/// - [`state`](Self::state) / [`is_connected`](Self::is_connected) reflect
///   open/close synchronously, and [`state_changed`](Self::state_changed)
///   notifies on every transition
///
/// No method returns an error or panics on network failure; failures are
/// logged.
///
/// # Example
///
/// ```ignore
/// let config = ConnectionConfig::from_origin("https://circle.example", "/ws")?
///     .user(&UserId::new("u1"));
/// let manager = ConnectionManager::new(config);
///
/// let _chat = manager.on_chat(|message| println!("{}: {}", message.user_id, message.content));
/// manager.connect();
///
/// manager.send(&ClientFrame::Chat {
///     circle_id: CircleId::new("c1"),
///     user_id: UserId::new("u1"),
///     content: "hi".into(),
/// });
/// ```
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        let tracker = ReconnectTracker::new(config.reconnect.clone());
        Self {
            shared: Arc::new(Shared {
                config,
                inner: Mutex::new(Inner {
                    state: ConnectionState::Closed,
                    tracker,
                    outbound: None,
                    stop: None,
                    running: false,
                    generation: 0,
                    pending_reconnect: false,
                    scheduled_reconnects: 0,
                }),
                handlers: Arc::new(HandlerRegistry::default()),
                state_changed: Signal::new(),
                retry_now: Notify::new(),
            }),
        }
    }

    /// Get the URL this manager connects to.
    pub fn url(&self) -> &Url {
        &self.shared.config.url
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// Emitted on every state transition.
    pub fn state_changed(&self) -> &Signal<ConnectionState> {
        &self.shared.state_changed
    }

    /// Consecutive reconnects scheduled since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.inner.lock().tracker.attempts()
    }

    /// Total reconnects ever scheduled by this manager.
    pub fn scheduled_reconnects(&self) -> u32 {
        self.shared.inner.lock().scheduled_reconnects
    }

    /// Whether a reconnect delay is currently pending.
    pub fn has_pending_reconnect(&self) -> bool {
        self.shared.inner.lock().pending_reconnect
    }

    /// Number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: FrameKind) -> usize {
        self.shared.handlers.signal(kind).connection_count()
    }

    /// Start the connection task.
    ///
    /// Does nothing while a connection task is already running, so repeated
    /// calls never open duplicate sockets. Must be called from within a
    /// Tokio runtime; otherwise the failure is logged and nothing happens.
    pub fn connect(&self) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                error!(target: TARGET, error = %e, "cannot connect outside a Tokio runtime");
                return;
            }
        };

        let (generation, stop_rx) = {
            let mut inner = self.shared.inner.lock();
            if inner.running {
                debug!(target: TARGET, "connect ignored, connection task already running");
                return;
            }
            let (stop_tx, stop_rx) = watch::channel(false);
            inner.running = true;
            inner.generation += 1;
            inner.stop = Some(stop_tx);
            (inner.generation, stop_rx)
        };

        info!(target: TARGET, url = %self.shared.config.url, "starting connection");
        handle.spawn(run(self.shared.clone(), generation, stop_rx));
    }

    /// Manually recover, typically from [`ConnectionState::PermanentlyDisconnected`].
    ///
    /// Clears the attempt counter. A pending reconnect delay is skipped so
    /// the next attempt starts immediately; otherwise a connection task is
    /// started if none is running.
    pub fn reconnect(&self) {
        let waiting = {
            let mut inner = self.shared.inner.lock();
            inner.tracker.reset();
            std::mem::take(&mut inner.pending_reconnect)
        };
        if waiting {
            debug!(target: TARGET, "skipping pending reconnect delay");
            self.shared.retry_now.notify_one();
        }
        self.connect();
    }

    /// Close the socket and stop reconnecting.
    ///
    /// A pending reconnect delay is cancelled and an open socket receives a
    /// normal close frame. Handlers stay registered, so a later
    /// [`connect`](Self::connect) resumes delivery.
    pub fn shutdown(&self) {
        let stop = {
            let mut inner = self.shared.inner.lock();
            if !inner.running {
                return;
            }
            inner.running = false;
            inner.generation += 1;
            inner.outbound = None;
            inner.pending_reconnect = false;
            inner.stop.take()
        };

        if let Some(stop) = stop {
            let _ = stop.send(true);
        }

        let changed = {
            let mut inner = self.shared.inner.lock();
            let changed = inner.state != ConnectionState::Closed;
            inner.state = ConnectionState::Closed;
            changed
        };
        if changed {
            self.shared.state_changed.emit(ConnectionState::Closed);
        }
        info!(target: TARGET, "connection shut down");
    }

    /// Serialize `frame` and write it if the socket is open.
    ///
    /// Returns `false` if the frame was dropped because the socket is not
    /// open. Dropped frames are never sent later.
    pub fn send(&self, frame: &ClientFrame) -> bool {
        let text = match frame.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(target: TARGET, error = %e, "failed to encode frame");
                return false;
            }
        };

        let inner = self.shared.inner.lock();
        match (&inner.outbound, inner.state) {
            (Some(tx), ConnectionState::Open) => {
                if tx.send(text).is_ok() {
                    true
                } else {
                    warn!(target: TARGET, "socket writer gone, dropping frame");
                    false
                }
            }
            (_, state) => {
                warn!(target: TARGET, %state, "socket not open, dropping frame");
                false
            }
        }
    }

    /// Register `handler` for every inbound frame of `kind`.
    pub fn on<F>(&self, kind: FrameKind, handler: F) -> Subscription
    where
        F: Fn(&ServerFrame) + Send + Sync + 'static,
    {
        let id = self.shared.handlers.signal(kind).connect(handler);
        Subscription::new(Arc::downgrade(&self.shared.handlers), kind, id)
    }

    pub fn on_chat<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        self.on(FrameKind::Chat, move |frame| {
            if let ServerFrame::Chat { message } = frame {
                handler(message);
            }
        })
    }

    pub fn on_dm<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&DmMessage) + Send + Sync + 'static,
    {
        self.on(FrameKind::Dm, move |frame| {
            if let ServerFrame::Dm { message } = frame {
                handler(message);
            }
        })
    }

    /// Register a handler for frames the relay rejected.
    pub fn on_error<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on(FrameKind::Error, move |frame| {
            if let ServerFrame::Error { message } = frame {
                handler(message);
            }
        })
    }

    /// Remove every registered handler.
    pub fn clear_handlers(&self) {
        self.shared.handlers.clear();
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.shared.config.url.as_str())
            .field("state", &self.state())
            .finish()
    }
}

/// Build the WebSocket request with custom headers.
fn build_request(config: &ConnectionConfig) -> Result<Request> {
    let mut request = config.url.as_str().into_client_request()?;

    let headers = request.headers_mut();
    for (name, value) in &config.headers {
        let header_name = http::header::HeaderName::try_from(name.as_str())?;
        let header_value = http::header::HeaderValue::try_from(value.as_str())?;
        headers.insert(header_name, header_value);
    }

    Ok(request)
}

/// Connection task: connect, serve the session, back off, repeat.
async fn run(shared: Arc<Shared>, generation: u64, mut stop: watch::Receiver<bool>) {
    loop {
        if *stop.borrow() || !shared.is_current(generation) {
            return;
        }
        shared.set_state(generation, ConnectionState::Connecting);

        let attempt = async {
            let request = build_request(&shared.config)?;
            let (stream, _response) = tokio_tungstenite::connect_async(request).await?;
            Ok::<_, NetworkError>(stream)
        };

        let outcome = tokio::select! {
            _ = stop.changed() => return,
            outcome = attempt => outcome,
        };

        match outcome {
            Ok(stream) => {
                if serve(&shared, generation, stream, &mut stop).await == SessionEnd::Stopped {
                    return;
                }
            }
            Err(e) => {
                warn!(target: TARGET, error = %e, "connection attempt failed");
            }
        }

        let decision = {
            let mut inner = shared.inner.lock();
            if inner.generation != generation {
                return;
            }
            inner.outbound = None;
            let decision = inner.tracker.on_close();
            if let ReconnectDecision::Retry { .. } = decision {
                inner.pending_reconnect = true;
                inner.scheduled_reconnects += 1;
            }
            decision
        };

        match decision {
            ReconnectDecision::Retry { attempt, delay } => {
                shared.set_state(generation, ConnectionState::Closed);
                info!(target: TARGET, attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");

                tokio::select! {
                    _ = stop.changed() => return,
                    _ = shared.retry_now.notified() => {}
                    _ = tokio::time::sleep(delay) => {}
                }

                let mut inner = shared.inner.lock();
                if inner.generation != generation {
                    return;
                }
                inner.pending_reconnect = false;
            }
            ReconnectDecision::GiveUp => {
                let max_attempts = {
                    let mut inner = shared.inner.lock();
                    if inner.generation != generation {
                        return;
                    }
                    inner.running = false;
                    inner.stop = None;
                    inner.tracker.config().max_attempts
                };
                warn!(target: TARGET, max_attempts, "reconnect attempts exhausted, giving up");
                shared.set_state(generation, ConnectionState::PermanentlyDisconnected);
                return;
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// The manager asked the socket to close.
    Stopped,
    /// The peer closed or the connection failed.
    Lost,
}

/// Pump one open socket until it closes.
async fn serve(
    shared: &Shared,
    generation: u64,
    stream: WsStream,
    stop: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    {
        let mut inner = shared.inner.lock();
        if inner.generation != generation {
            return SessionEnd::Stopped;
        }
        inner.outbound = Some(tx);
        inner.tracker.on_open();
    }
    shared.set_state(generation, ConnectionState::Open);
    info!(target: TARGET, url = %shared.config.url, "connected");

    let (mut write, mut read) = stream.split();

    let end = loop {
        tokio::select! {
            _ = stop.changed() => {
                let close = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "client shutdown".into(),
                };
                if let Err(e) = write.send(Message::Close(Some(close))).await {
                    debug!(target: TARGET, error = %e, "close frame not delivered");
                }
                break SessionEnd::Stopped;
            }

            Some(text) = rx.recv() => {
                if let Err(e) = write.send(Message::Text(text.into())).await {
                    warn!(target: TARGET, error = %e, "write failed");
                    break SessionEnd::Lost;
                }
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => shared.dispatch(text.as_str()),
                    Some(Ok(Message::Binary(data))) => {
                        debug!(target: TARGET, len = data.len(), "ignoring binary frame");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(target: TARGET, ?frame, "server closed connection");
                        break SessionEnd::Lost;
                    }
                    // Pings are answered by tungstenite.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(target: TARGET, error = %e, "read failed");
                        break SessionEnd::Lost;
                    }
                    None => break SessionEnd::Lost,
                }
            }
        }
    };

    if end == SessionEnd::Lost {
        {
            let mut inner = shared.inner.lock();
            if inner.generation == generation {
                inner.outbound = None;
            }
        }
        shared.set_state(generation, ConnectionState::Closed);
        info!(target: TARGET, "disconnected");
    }
    end
}
