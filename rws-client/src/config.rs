//! Connection options for a Robot Web Services controller

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::HttpError;

/// Username of an unconfigured controller system
pub const DEFAULT_USERNAME: &str = "Default User";

/// Password of an unconfigured controller system
pub const DEFAULT_PASSWORD: &str = "robotics";

/// Where and how to reach the controller.
///
/// Timeouts apply uniformly to every HTTP call made through a client built
/// from these options, including subscription negotiation and mastership
/// requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Base URL of the controller, e.g. `https://192.168.125.1/`
    pub base_url: Url,
    pub username: String,
    pub password: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Delays between retries of a request answered with 503 Service Unavailable.
    /// Empty means no retries.
    #[serde(default)]
    pub retry_backoff: Vec<Duration>,
    /// Accept any server certificate on HTTPS and WSS connections.
    /// Controllers ship with self-signed certificates.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl ConnectionOptions {
    /// Options for the given base URL with default credentials and timeouts
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            retry_backoff: Vec::new(),
            accept_invalid_certs: false,
        }
    }

    /// Options for an HTTPS controller at `host:port`
    pub fn for_host(host: &str, port: u16) -> Result<Self, HttpError> {
        let raw = format!("https://{}:{}/", host, port);
        let base_url = Url::parse(&raw).map_err(|e| HttpError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(base_url))
    }

    /// Parse a base URL string into options
    pub fn parse(base_url: &str) -> Result<Self, HttpError> {
        let base_url = Url::parse(base_url).map_err(|e| HttpError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(base_url))
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration, write: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Vec<Duration>) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }
}
