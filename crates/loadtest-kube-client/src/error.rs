//! Error types for API sessions.

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by operations against the target API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The object already exists (HTTP 409, reason `AlreadyExists`).
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The object, or the namespace it lives in, does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other failure status reported by the API server.
    #[error("API error {code} ({reason}): {message}")]
    Status {
        code: u16,
        reason: String,
        message: String,
    },

    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response or request body could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The resource type is not served by the API server.
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// The object lacks a field the operation needs.
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// The session stopped accepting requests.
    #[error("Session is closed")]
    Closed,
}

impl ApiError {
    /// True for the outcome a repeated create is expected to produce.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, ApiError::AlreadyExists(_))
    }

    /// True for the outcome a repeated delete (or a get of a missing object)
    /// is expected to produce.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

/// Errors that can occur while establishing a session.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// A kubeconfig or credential file could not be read.
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The kubeconfig is not valid YAML.
    #[error("Failed to parse kubeconfig: {0}")]
    Kubeconfig(#[from] serde_yaml::Error),

    /// The kubeconfig is well-formed but incomplete or inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An inline `*-data` field is not valid base64.
    #[error("Failed to decode '{field}': {source}")]
    Base64 {
        field: String,
        #[source]
        source: base64::DecodeError,
    },

    /// The HTTP client could not be built (bad client certificate, TLS setup).
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The API server did not answer the connectivity check.
    #[error("API server ping failed: {0}")]
    Ping(#[from] ApiError),

    /// The backend refused the connection.
    #[error("Connection refused: {0}")]
    Unavailable(String),
}
