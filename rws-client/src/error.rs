//! Error types for the RWS HTTP client

use thiserror::Error;

/// Errors that can occur during RWS HTTP communication
#[derive(Debug, Error)]
pub enum HttpError {
    /// Connection, send or receive failure (including timeouts)
    #[error("Network/HTTP error: {0}")]
    Transport(String),

    /// The controller answered with a status the caller did not accept
    #[error("HTTP response status not accepted: {method} {uri} returned {status}")]
    Status {
        method: &'static str,
        uri: String,
        status: u16,
        body: String,
    },

    /// The response could not be interpreted
    #[error("Response parsing error: {0}")]
    Parse(String),

    /// A URL could not be built from the connection options
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The TLS client configuration could not be built
    #[error("TLS configuration error: {0}")]
    Tls(String),
}

impl HttpError {
    /// HTTP status of a rejected response, if this error carries one
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Response body of a rejected response, if this error carries one
    pub fn body(&self) -> Option<&str> {
        match self {
            HttpError::Status { body, .. } => Some(body),
            _ => None,
        }
    }
}
