//! Error types for Weather Cube.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from fetching the current weather.
///
/// A fetch failure never stops the polling loop; the cycle is skipped.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Provider unreachable, timed out, or the body could not be read
    #[error("Request failed: {0}")]
    Request(String),

    /// Provider answered with a non-success HTTP status
    #[error("Provider returned HTTP {0}")]
    Status(u16),

    /// Response is missing `main.temp` or `weather[0].main`
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        // The request URL carries the API key.
        FetchError::Request(err.without_url().to_string())
    }
}

/// Errors from talking to the display over MQTT.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Subscribe to '{topic}' failed: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("Disconnect failed: {0}")]
    Disconnect(String),
}

/// Startup configuration errors. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Errors from the optional status page server.
#[derive(Debug, Error)]
pub enum StatusPageError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Failure to install the process signal handler.
#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("Failed to install signal handler: {0}")]
    Handler(#[from] ctrlc::Error),
}
