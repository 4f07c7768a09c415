//! # Configuration
//!
//! Operator configuration loaded from environment variables at startup and
//! patched at runtime from the operator ConfigMap.
//!
//! ## Module Structure
//!
//! - `operator.rs` - Tunables used by the reconciler (`OperatorConfig`)
//! - `server.rs` - HTTP server settings (`ServerConfig`)
//! - `shared.rs` - Copy-on-write handle shared between watches and reconciler
//! - `duration.rs` - Duration syntax used by ConfigMap values

mod duration;
mod operator;
mod server;
mod shared;

pub use duration::{parse_signed_duration, parse_std_duration};
pub use operator::OperatorConfig;
pub use server::ServerConfig;
pub use shared::SharedOperatorConfig;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },
    #[error("duration '{value}' must not be negative")]
    NegativeDuration { value: String },
    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
    #[error("invalid value for '{key}': {source}")]
    InvalidValue {
        key: String,
        #[source]
        source: Box<ConfigError>,
    },
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
