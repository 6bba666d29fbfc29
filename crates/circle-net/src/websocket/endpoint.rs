//! Derive the socket URL from the page origin.

use url::Url;

use crate::error::{NetworkError, Result};

/// Default socket path served by the relay.
pub const DEFAULT_SOCKET_PATH: &str = "/ws";

/// Build the WebSocket URL for `path` on the same host as `origin`.
///
/// `https` origins map to `wss`, `http` to `ws`. Origins already using a
/// WebSocket scheme are kept as-is. Any path or query on the origin is
/// discarded.
pub fn endpoint_url(origin: &str, path: &str) -> Result<Url> {
    let origin = Url::parse(origin)?;

    let scheme = match origin.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(NetworkError::InvalidUrl(format!(
                "unsupported origin scheme: {other}"
            )));
        }
    };

    let host = origin
        .host()
        .ok_or_else(|| NetworkError::InvalidUrl("origin has no host".into()))?;

    let mut url = Url::parse(&format!("{scheme}://{host}"))?;
    url.set_port(origin.port())
        .map_err(|_| NetworkError::InvalidUrl("cannot set port".into()))?;

    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    url.set_path(&path);

    Ok(url)
}
