use rws_client::HttpError;
use thiserror::Error;

use crate::mastership::MastershipError;

/// High-level API errors for Robot Web Services operations
///
/// Every operation of this crate reports one of these kinds. None of them is
/// retried internally; callers treat any of them as fatal to the operation that
/// raised it.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The controller's response or event stream violates the expected shape
    ///
    /// Covers missing XML nodes or attributes, non-numeric codes where a number
    /// is required, unexpected HTTP statuses and malformed frames.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Domain acquisition or release failed at the controller
    #[error(transparent)]
    Mastership(#[from] MastershipError),

    /// A caller-supplied value is outside its contract
    ///
    /// Raised before any network call is made.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Connect, send or receive failure, including timeouts
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Type alias for results that can return an ApiError
pub type Result<T> = std::result::Result<T, ApiError>;

/// Convert from HttpError to ApiError
impl From<HttpError> for ApiError {
    fn from(error: HttpError) -> Self {
        match error {
            HttpError::Transport(msg) | HttpError::Tls(msg) => ApiError::Transport(msg),
            HttpError::Status {
                method,
                uri,
                status,
                body,
            } => ApiError::Protocol(ProtocolError::with_context(
                format!("{} {} returned unexpected status {}", method, uri, status),
                body,
            )),
            HttpError::Parse(msg) => ApiError::Protocol(ProtocolError::new(msg)),
            HttpError::InvalidUrl { url, reason } => ApiError::Protocol(
                ProtocolError::with_context(format!("invalid URL: {}", reason), url),
            ),
        }
    }
}

/// A response or event that does not have the expected shape
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Protocol error: {message}")]
pub struct ProtocolError {
    /// What was expected and not found
    pub message: String,
    /// Raw content the error was detected in, for diagnosis
    pub context: Option<String>,
}

impl ProtocolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// A mandatory field was absent from a response or event
    pub fn missing_field(field: &str, context: impl Into<String>) -> Self {
        Self::with_context(format!("missing mandatory field '{}'", field), context)
    }
}

/// Error type for parameter validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Parameter '{parameter}' value '{value}' is out of range ({min}..={max})")]
    RangeError {
        parameter: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("Parameter '{parameter}' value '{value}' is invalid: {reason}")]
    InvalidValue {
        parameter: String,
        value: String,
        reason: String,
    },

    #[error("Required parameter '{parameter}' is missing")]
    MissingParameter { parameter: String },
}

impl ValidationError {
    pub fn range_error(
        parameter: &str,
        min: impl std::fmt::Display,
        max: impl std::fmt::Display,
        value: impl std::fmt::Display,
    ) -> Self {
        Self::RangeError {
            parameter: parameter.to_string(),
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }

    pub fn invalid_value(parameter: &str, value: impl std::fmt::Display, reason: &str) -> Self {
        Self::InvalidValue {
            parameter: parameter.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn missing(parameter: &str) -> Self {
        Self::MissingParameter {
            parameter: parameter.to_string(),
        }
    }
}
