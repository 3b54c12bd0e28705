//! Error types for the rws-stream crate.

use rws_api::{ApiError, ProtocolError};
use rws_client::HttpError;

use crate::session::SessionState;

/// Errors from the streaming connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The stream could not be opened
    #[error("Failed to open stream {url}: {message}")]
    Connect {
        /// The stream URL
        url: String,
        /// What went wrong
        message: String,
    },

    /// Reading from an open stream failed
    #[error("Stream read failed: {0}")]
    Read(String),

    /// Closing the stream failed
    #[error("Stream close failed: {0}")]
    Close(String),
}

/// Errors from subscription session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Subscription negotiation with the controller failed
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The controller refused to change an active group's resources; the
    /// previous resources stay subscribed
    #[error("Subscription update failed: {0}")]
    Update(ApiError),

    /// An inbound frame was rejected; no event of it was delivered
    #[error("Frame rejected: {0}")]
    Frame(ProtocolError),

    /// The streaming connection failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The operation is not allowed in the session's current state
    #[error("Cannot {operation} a session in state {state}")]
    InvalidState {
        /// The attempted operation
        operation: &'static str,
        /// The state the session was in
        state: SessionState,
    },
}

impl SessionError {
    /// Whether the error ended the session
    ///
    /// A rejected frame, a refused update or a misuse of the session leaves it
    /// usable. Transport and negotiation failures do not.
    pub fn is_terminal(&self) -> bool {
        match self {
            SessionError::Api(ApiError::Validation(_)) => false,
            SessionError::Api(_) | SessionError::Transport(_) => true,
            SessionError::Update(_) | SessionError::Frame(_) | SessionError::InvalidState { .. } => {
                false
            }
        }
    }
}

impl From<HttpError> for SessionError {
    fn from(error: HttpError) -> Self {
        SessionError::Api(error.into())
    }
}

/// Convenience type alias for Results using SessionError.
pub type Result<T> = std::result::Result<T, SessionError>;
