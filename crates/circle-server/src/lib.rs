//! Relay server for The Circle.
//!
//! One process serves both halves of the messaging system:
//!
//! - **Relay**: `GET /ws?userId=...` sockets registered in a [`Hub`](relay::Hub);
//!   inbound `chat` frames are persisted and fanned out to the circle, inbound
//!   `dm` frames are announced to both participants
//! - **REST**: durable history, circles, conversations and notifications
//!   under `/api`
//!
//! Storage sits behind the [`Store`] trait; [`MemoryStore`] keeps everything
//! in process.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::{HeaderName, Method, header::CONTENT_TYPE};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info};

pub mod auth;
pub mod config;
pub mod error;
pub mod relay;
pub mod routes;
pub mod store;

pub use config::{ConfigError, ServerConfig};
pub use error::ApiError;
pub use relay::{ConnectionId, Hub, Relay};
pub use store::{MemoryStore, Store, StoreError};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub relay: Arc<Relay>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let relay = Arc::new(Relay::new(store.clone()));
        Self { store, relay }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the router with CORS applied.
pub fn app(state: AppState, config: &ServerConfig) -> Router {
    let origin = match &config.allowed_origin {
        Some(origin) => AllowOrigin::exact(origin.clone()),
        None => AllowOrigin::any(),
    };

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static(auth::USER_HEADER)])
        .max_age(Duration::from_secs(60 * 60));

    routes::router().layer(cors).with_state(state)
}

/// Serve `router` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Bind the configured address and serve an in-memory relay until Ctrl-C
/// or SIGTERM.
pub async fn start_server(config: ServerConfig) -> Result<(), ServerError> {
    info!("Initializing state...");
    let state = AppState::in_memory();
    let router = app(state, &config);

    let address = config.socket_addr();
    info!("Binding to {address}");
    let listener = TcpListener::bind(address).await?;
    info!("Server running on {}", listener.local_addr()?);

    serve(listener, router, shutdown_signal()).await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
