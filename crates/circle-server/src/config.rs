use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use axum::http::HeaderValue;
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_PORT: u16 = 8080;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: IpAddr,
    pub port: u16,
    /// CORS origin allowed to call the API. `None` allows any origin.
    pub allowed_origin: Option<HeaderValue>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT)
    }
}

impl ServerConfig {
    pub fn new(bind_address: IpAddr, port: u16) -> Self {
        Self {
            bind_address,
            port,
            allowed_origin: None,
        }
    }

    /// Read `CIRCLE_BIND_ADDRESS`, `CIRCLE_PORT` and `CIRCLE_ALLOWED_ORIGIN`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let allowed_origin = match var("CIRCLE_ALLOWED_ORIGIN") {
            Some(origin) => Some(HeaderValue::from_str(&origin).map_err(|e| {
                ConfigError::Invalid {
                    key: "CIRCLE_ALLOWED_ORIGIN",
                    value: origin.clone(),
                    reason: e.to_string(),
                }
            })?),
            None => {
                info!("CIRCLE_ALLOWED_ORIGIN not set, allowing any origin");
                None
            }
        };

        Ok(Self {
            bind_address: try_load("CIRCLE_BIND_ADDRESS", "0.0.0.0")?,
            port: try_load("CIRCLE_PORT", "8080")?,
            allowed_origin,
        })
    }

    pub fn allowed_origin(mut self, origin: HeaderValue) -> Self {
        self.allowed_origin = Some(origin);
        self
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn try_load<T>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let value = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    value.trim().parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        ConfigError::Invalid {
            key,
            value,
            reason: e.to_string(),
        }
    })
}
