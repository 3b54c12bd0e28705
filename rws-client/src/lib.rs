//! Private HTTP client for Robot Web Services controller communication
//!
//! This crate provides a minimal blocking HTTP client for talking to an ABB
//! robot controller over Robot Web Services. It keeps the session cookies the
//! controller hands out, authenticates every request, and knows the wire form
//! of the subscription endpoints used for event streaming.

mod config;
mod error;
mod tls;

pub use config::{ConnectionOptions, DEFAULT_PASSWORD, DEFAULT_USERNAME};
pub use error::HttpError;

use base64::Engine;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use url::Url;

/// Content type of every request body sent to the controller
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;v=2.0";

/// Representation requested for every response
pub const ACCEPT_XHTML: &str = "application/xhtml+xml;v=2.0";

/// Path of the subscription collection
pub const SUBSCRIPTION_PATH: &str = "/subscription";

/// Path segment preceding the subscription group id in a `Location` header
const POLL_SEGMENT: &str = "/poll/";

/// Status codes accepted by plain reads
const OK: &[u16] = &[200];

/// Status codes accepted by commands that may answer with or without content
const OK_OR_NO_CONTENT: &[u16] = &[200, 204];

/// A completed HTTP exchange with the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Value of the `Location` header, if present
    pub location: Option<String>,
    pub body: String,
}

/// Response from a subscription request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionResponse {
    /// Subscription group id assigned by the controller
    pub group_id: String,
    /// Full `Location` header the id was taken from
    pub location: String,
}

/// A minimal blocking HTTP client for one controller
#[derive(Debug, Clone)]
pub struct RwsClient {
    agent: ureq::Agent,
    options: Arc<ConnectionOptions>,
    tls: Option<Arc<rustls::ClientConfig>>,
    cookies: Arc<Mutex<BTreeMap<String, String>>>,
}

impl RwsClient {
    /// Create a client from connection options
    pub fn new(options: ConnectionOptions) -> Self {
        let mut builder = ureq::AgentBuilder::new()
            .timeout_connect(options.connect_timeout)
            .timeout_read(options.read_timeout)
            .timeout_write(options.write_timeout);

        let tls = match tls::client_config(&options) {
            Ok(tls) => tls,
            Err(e) => {
                warn!(error = %e, "keeping default certificate verification");
                None
            }
        };
        if let Some(config) = &tls {
            builder = builder.tls_config(config.clone());
        }

        Self {
            agent: builder.build(),
            options: Arc::new(options),
            tls,
            cookies: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// TLS configuration replacing the default certificate verification
    ///
    /// Set when the options accept invalid certificates. The event stream
    /// connects with the same configuration.
    pub fn tls_config(&self) -> Option<Arc<rustls::ClientConfig>> {
        self.tls.clone()
    }

    /// Send a request and require one of the `accepted` status codes.
    ///
    /// A 503 answer is retried once per entry of the configured retry backoff
    /// before the status is judged.
    pub fn send(
        &self,
        method: &'static str,
        path: &str,
        body: Option<&str>,
        accepted: &[u16],
    ) -> Result<HttpResponse, HttpError> {
        let url = self.resolve(path)?;
        let mut backoff = self.options.retry_backoff.iter();

        loop {
            let response = self.send_once(method, &url, body)?;

            if response.status == 503 {
                if let Some(delay) = backoff.next() {
                    warn!(uri = %path, delay_ms = delay.as_millis() as u64, "controller busy, retrying");
                    std::thread::sleep(*delay);
                    continue;
                }
            }

            if !accepted.contains(&response.status) {
                return Err(HttpError::Status {
                    method,
                    uri: path.to_string(),
                    status: response.status,
                    body: response.body,
                });
            }

            return Ok(response);
        }
    }

    /// GET a resource, requiring 200
    pub fn get(&self, path: &str) -> Result<HttpResponse, HttpError> {
        self.send("GET", path, None, OK)
    }

    /// POST a form body, accepting 200 or 204
    pub fn post(&self, path: &str, body: &str) -> Result<HttpResponse, HttpError> {
        self.send("POST", path, Some(body), OK_OR_NO_CONTENT)
    }

    /// PUT a form body, accepting 200 or 204
    pub fn put(&self, path: &str, body: &str) -> Result<HttpResponse, HttpError> {
        self.send("PUT", path, Some(body), OK_OR_NO_CONTENT)
    }

    /// DELETE a resource, accepting 200 or 204
    pub fn delete(&self, path: &str) -> Result<HttpResponse, HttpError> {
        self.send("DELETE", path, None, OK_OR_NO_CONTENT)
    }

    /// Create a subscription group from an encoded subscription body.
    ///
    /// The controller must answer 201 with a `Location` header pointing at the
    /// poll endpoint of the new group.
    pub fn subscribe(&self, body: &str) -> Result<SubscriptionResponse, HttpError> {
        let response = self.send("POST", SUBSCRIPTION_PATH, Some(body), &[201])?;

        let location = response.location.ok_or_else(|| {
            HttpError::Parse("Cannot get subscription group from HTTP response".to_string())
        })?;
        let group_id = group_id_from_location(&location).ok_or_else(|| {
            HttpError::Parse("Cannot get subscription group from HTTP response".to_string())
        })?;

        debug!(group_id = %group_id, "subscription group created");

        Ok(SubscriptionResponse { group_id, location })
    }

    /// Replace the resources of an existing subscription group
    pub fn update_subscription(&self, group_id: &str, body: &str) -> Result<(), HttpError> {
        self.put(&subscription_path(group_id), body)?;
        Ok(())
    }

    /// Delete a subscription group
    pub fn unsubscribe(&self, group_id: &str) -> Result<(), HttpError> {
        self.delete(&subscription_path(group_id))?;
        debug!(group_id = %group_id, "subscription group deleted");
        Ok(())
    }

    /// End the controller session and forget its cookies
    pub fn logout(&self) -> Result<(), HttpError> {
        self.send("GET", "/logout", None, OK_OR_NO_CONTENT)?;
        self.cookies_mut().clear();
        Ok(())
    }

    /// WebSocket URL of a subscription group's poll endpoint
    ///
    /// `location` is the `Location` header of the subscription response,
    /// absolute or relative to the base URL.
    pub fn stream_url(&self, location: &str) -> Result<Url, HttpError> {
        let mut url = self.resolve(location)?;
        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => {
                return Err(HttpError::InvalidUrl {
                    url: url.to_string(),
                    reason: format!("unsupported scheme '{}'", other),
                })
            }
        };
        url.set_scheme(scheme).map_err(|_| HttpError::InvalidUrl {
            url: url.to_string(),
            reason: format!("cannot switch scheme to '{}'", scheme),
        })?;
        Ok(url)
    }

    /// `Cookie` header value carrying the current session cookies
    pub fn cookie_header(&self) -> Option<String> {
        let cookies = self.cookies_mut();
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// `Authorization` header value for the configured credentials
    pub fn authorization_header(&self) -> String {
        let credentials = format!("{}:{}", self.options.username, self.options.password);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(credentials)
        )
    }

    fn send_once(
        &self,
        method: &'static str,
        url: &Url,
        body: Option<&str>,
    ) -> Result<HttpResponse, HttpError> {
        debug!(method, uri = %url.path(), "sending request");

        let mut request = self
            .agent
            .request_url(method, url)
            .set("Accept", ACCEPT_XHTML)
            .set("Authorization", &self.authorization_header());

        if let Some(cookie) = self.cookie_header() {
            request = request.set("Cookie", &cookie);
        }

        let result = match body {
            Some(body) => request
                .set("Content-Type", FORM_CONTENT_TYPE)
                .send_string(body),
            None => request.call(),
        };

        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(e)) => return Err(HttpError::Transport(e.to_string())),
        };

        self.store_cookies(&response.all("set-cookie"));

        let status = response.status();
        let location = response.header("location").map(str::to_string);
        let body = response
            .into_string()
            .map_err(|e| HttpError::Transport(e.to_string()))?;

        debug!(method, uri = %url.path(), status, "received response");

        Ok(HttpResponse {
            status,
            location,
            body,
        })
    }

    fn resolve(&self, path: &str) -> Result<Url, HttpError> {
        self.options
            .base_url
            .join(path)
            .map_err(|e| HttpError::InvalidUrl {
                url: path.to_string(),
                reason: e.to_string(),
            })
    }

    fn store_cookies(&self, headers: &[&str]) {
        if headers.is_empty() {
            return;
        }
        let mut cookies = self.cookies_mut();
        for header in headers {
            if let Some((name, value)) = parse_set_cookie(header) {
                cookies.insert(name, value);
            }
        }
    }

    fn cookies_mut(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.cookies.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn subscription_path(group_id: &str) -> String {
    format!("{}/{}", SUBSCRIPTION_PATH, group_id)
}

/// Extract the subscription group id that follows `/poll/` in a location
fn group_id_from_location(location: &str) -> Option<String> {
    let start = location.find(POLL_SEGMENT)? + POLL_SEGMENT.len();
    let id = location[start..].trim_end_matches('/');
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Split the leading `name=value` pair out of a `Set-Cookie` header
fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}
