//! Logging setup for applications built on the RWS crates
//!
//! The library crates only emit `tracing` events. An application installs a
//! subscriber once, early, through [`init_logging`] or
//! [`init_logging_from_env`].

use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Logging mode for different use cases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// No subscriber is installed
    Silent,
    /// Compact stderr output
    Development,
    /// Verbose output with thread ids and source locations
    Debug,
    /// One JSON object per event, for log collectors
    Json,
}

/// Logging configuration error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid environment variable: {0}")]
    InvalidEnv(String),
}

/// Install the process-wide subscriber for `mode`
///
/// Fails if a subscriber is already installed; the existing one is kept.
///
/// # Environment Variables
///
/// - `RWS_LOG_LEVEL`: Override log level (error, warn, info, debug, trace)
/// - `RWS_LOG_TARGET`: Restrict output to one target (e.g. "rws_stream")
///
/// ```rust,ignore
/// rws_stream::logging::init_logging(LoggingMode::Development)?;
/// ```
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    match mode {
        LoggingMode::Silent => Ok(()),
        LoggingMode::Development => {
            let filter = create_env_filter("info")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false)
                        .compact(),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
        LoggingMode::Debug => {
            let filter = create_env_filter("debug")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .pretty()
                        .with_thread_ids(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
        LoggingMode::Json => {
            let filter = create_env_filter("info")?;

            Registry::default()
                .with(fmt::layer().json().with_current_span(false))
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
    }
}

/// Initialize logging from the `RWS_LOG_MODE` environment variable
///
/// Accepts "silent", "development", "debug" and "json". Unset means Silent;
/// any other value is an error.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    let mode = match std::env::var("RWS_LOG_MODE") {
        Ok(value) => parse_mode(&value)?,
        Err(std::env::VarError::NotPresent) => LoggingMode::Silent,
        Err(e) => return Err(LoggingError::InvalidEnv(format!("RWS_LOG_MODE: {}", e))),
    };

    init_logging(mode)
}

fn parse_mode(value: &str) -> Result<LoggingMode, LoggingError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "silent" => Ok(LoggingMode::Silent),
        "development" => Ok(LoggingMode::Development),
        "debug" => Ok(LoggingMode::Debug),
        "json" => Ok(LoggingMode::Json),
        other => Err(LoggingError::InvalidEnv(format!(
            "RWS_LOG_MODE: unknown mode '{}'",
            other
        ))),
    }
}

/// Level from `RWS_LOG_LEVEL`, then `RUST_LOG`, then `default_level`,
/// optionally narrowed to `RWS_LOG_TARGET`
fn create_env_filter(default_level: &str) -> Result<EnvFilter, LoggingError> {
    let level = std::env::var("RWS_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default_level.to_string());

    let directives = match std::env::var("RWS_LOG_TARGET") {
        Ok(target) if !target.is_empty() && !level.contains('=') => format!("{}={}", target, level),
        _ => level,
    };

    EnvFilter::try_new(&directives)
        .map_err(|e| LoggingError::InvalidEnv(format!("log filter '{}': {}", directives, e)))
}

/// Check if a global subscriber has been installed
pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}
