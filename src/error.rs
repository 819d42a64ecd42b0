//! Error types for the redis component.

use redis::RedisError;

/// Errors raised while configuring or running the component.
///
/// `InvalidConfig`, `Config` and `Registration` are startup errors; the
/// lifecycle hooks treat them as fatal. `Redis` carries operational failures
/// from the underlying client untouched.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config is invalid: {0}")]
    InvalidConfig(String),

    #[error("failed to read config section `{section}`: {source}")]
    Config {
        section: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to register metrics: {0}")]
    Registration(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    Encode(#[source] prometheus::Error),

    #[error(transparent)]
    Redis(#[from] RedisError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
