//! Options for subscription sessions

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// WebSocket sub-protocol spoken by the RWS subscription endpoint
pub const DEFAULT_PROTOCOL: &str = "rws_subscription";

/// How long one receive waits for a frame before reporting idle
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Streaming options of a subscription session
///
/// HTTP credentials and timeouts come from the session's
/// [`ConnectionOptions`](rws_client::ConnectionOptions).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Value of the `Sec-WebSocket-Protocol` request header
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Upper bound on a single frame wait; also how quickly a close request
    /// is observed
    #[serde(default = "default_poll_interval")]
    pub poll_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            poll_interval: default_poll_interval(),
        }
    }
}

impl SessionOptions {
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

fn default_protocol() -> String {
    DEFAULT_PROTOCOL.to_string()
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}
