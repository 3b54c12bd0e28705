//! Mastership arbitration for the cfg, motion and rapid domains
//!
//! Mastership is exclusive write permission over one controller domain. A
//! [`MastershipArbiter`] requests it from the controller and hands out a scoped
//! [`Mastership`] token. Dropping the token releases the domain; a release
//! failure during drop goes to a [`ReleaseReporter`] and is otherwise swallowed,
//! so an error from the guarded operation is never replaced by it.
//!
//! ```rust,ignore
//! use rws_api::mastership::{MastershipArbiter, MastershipDomain, MastershipMode};
//!
//! let arbiter = MastershipArbiter::new(client.clone());
//! arbiter.with_mastership(MastershipDomain::Rapid, |_token| {
//!     rws_api::rapid::start_execution(&client, MastershipMode::Explicit)
//! })?;
//! ```

use rws_client::{HttpError, RwsClient};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::error::ProtocolError;

/// A controller domain mastership can be requested for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MastershipDomain {
    Cfg,
    Motion,
    Rapid,
}

impl MastershipDomain {
    /// All domains, in wire-name order
    pub const ALL: [MastershipDomain; 3] = [
        MastershipDomain::Cfg,
        MastershipDomain::Motion,
        MastershipDomain::Rapid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MastershipDomain::Cfg => "cfg",
            MastershipDomain::Motion => "motion",
            MastershipDomain::Rapid => "rapid",
        }
    }

    pub fn request_path(&self) -> String {
        format!("/rw/mastership/{}/request", self.as_str())
    }

    pub fn release_path(&self) -> String {
        format!("/rw/mastership/{}/release", self.as_str())
    }
}

impl fmt::Display for MastershipDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MastershipDomain {
    type Err = ProtocolError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "cfg" => Ok(MastershipDomain::Cfg),
            "motion" => Ok(MastershipDomain::Motion),
            "rapid" => Ok(MastershipDomain::Rapid),
            other => Err(ProtocolError::with_context(
                "unexpected mastership domain",
                other,
            )),
        }
    }
}

/// How a write operation obtains mastership, passed as the `mastership` query parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MastershipMode {
    /// The controller takes and returns mastership around the single call
    Implicit,
    /// The caller already holds mastership (see [`MastershipArbiter`])
    Explicit,
}

impl MastershipMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MastershipMode::Implicit => "implicit",
            MastershipMode::Explicit => "explicit",
        }
    }
}

impl fmt::Display for MastershipMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which half of the mastership protocol failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MastershipAction {
    Request,
    Release,
}

impl fmt::Display for MastershipAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MastershipAction::Request => f.write_str("request"),
            MastershipAction::Release => f.write_str("release"),
        }
    }
}

/// Mastership acquisition or release failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MastershipError {
    /// The controller refused the call; `reason` is the response body, which
    /// names the current holder on conflict
    #[error("Mastership {action} for domain '{domain}' rejected (HTTP {status}): {reason}")]
    Rejected {
        domain: MastershipDomain,
        action: MastershipAction,
        status: u16,
        reason: String,
    },

    /// The domain is already held through this arbiter
    #[error("Mastership for domain '{domain}' is already held by this client")]
    AlreadyHeld { domain: MastershipDomain },

    /// The call never produced a controller answer
    #[error("Mastership {action} for domain '{domain}' failed: {message}")]
    Transport {
        domain: MastershipDomain,
        action: MastershipAction,
        message: String,
    },
}

impl MastershipError {
    pub fn domain(&self) -> MastershipDomain {
        match self {
            MastershipError::Rejected { domain, .. }
            | MastershipError::AlreadyHeld { domain }
            | MastershipError::Transport { domain, .. } => *domain,
        }
    }

    fn from_http(domain: MastershipDomain, action: MastershipAction, error: HttpError) -> Self {
        match error {
            HttpError::Status { status, body, .. } => {
                let reason = body.trim();
                MastershipError::Rejected {
                    domain,
                    action,
                    status,
                    reason: if reason.is_empty() {
                        "no reason given".to_string()
                    } else {
                        reason.to_string()
                    },
                }
            }
            other => MastershipError::Transport {
                domain,
                action,
                message: other.to_string(),
            },
        }
    }
}

/// The wire calls behind mastership
///
/// Implemented for [`RwsClient`]; tests substitute their own.
pub trait MastershipManager {
    fn request_mastership(&self, domain: MastershipDomain) -> Result<(), MastershipError>;
    fn release_mastership(&self, domain: MastershipDomain) -> Result<(), MastershipError>;
}

impl MastershipManager for RwsClient {
    fn request_mastership(&self, domain: MastershipDomain) -> Result<(), MastershipError> {
        self.post(&domain.request_path(), "")
            .map(|_| ())
            .map_err(|e| MastershipError::from_http(domain, MastershipAction::Request, e))
    }

    fn release_mastership(&self, domain: MastershipDomain) -> Result<(), MastershipError> {
        self.post(&domain.release_path(), "")
            .map(|_| ())
            .map_err(|e| MastershipError::from_http(domain, MastershipAction::Release, e))
    }
}

/// Side channel for release failures that happen while a token is dropped
pub trait ReleaseReporter: Send + Sync {
    fn report(&self, domain: MastershipDomain, error: &MastershipError);
}

/// Reports release failures as `tracing` errors
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ReleaseReporter for TracingReporter {
    fn report(&self, domain: MastershipDomain, error: &MastershipError) {
        error!(domain = %domain, error = %error, "failed to release mastership");
    }
}

/// Hands out mastership tokens and tracks which domains this client holds
///
/// The held-domain set is reserved before the request call and its lock is
/// never held across I/O.
pub struct MastershipArbiter<M: MastershipManager> {
    manager: M,
    held: Mutex<BTreeSet<MastershipDomain>>,
    reporter: Box<dyn ReleaseReporter>,
}

impl<M: MastershipManager> MastershipArbiter<M> {
    pub fn new(manager: M) -> Self {
        Self::with_reporter(manager, TracingReporter)
    }

    pub fn with_reporter(manager: M, reporter: impl ReleaseReporter + 'static) -> Self {
        Self {
            manager,
            held: Mutex::new(BTreeSet::new()),
            reporter: Box::new(reporter),
        }
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    /// Request mastership of `domain`
    ///
    /// Fails without a wire call when the domain is already held through this
    /// arbiter. A failed request is never followed by a release.
    pub fn acquire(&self, domain: MastershipDomain) -> Result<Mastership<'_, M>, MastershipError> {
        if !self.held_mut().insert(domain) {
            warn!(domain = %domain, "mastership already held");
            return Err(MastershipError::AlreadyHeld { domain });
        }

        debug!(domain = %domain, "requesting mastership");
        if let Err(e) = self.manager.request_mastership(domain) {
            self.held_mut().remove(&domain);
            warn!(domain = %domain, error = %e, "mastership request failed");
            return Err(e);
        }

        info!(domain = %domain, "mastership acquired");
        Ok(Mastership {
            arbiter: self,
            domain,
            released: false,
        })
    }

    /// Run `f` while holding mastership of `domain`
    ///
    /// The domain is released on every exit path. A release failure is
    /// reported and does not change the result of `f`.
    pub fn with_mastership<T, E, F>(&self, domain: MastershipDomain, f: F) -> Result<T, E>
    where
        F: FnOnce(&Mastership<'_, M>) -> Result<T, E>,
        E: From<MastershipError>,
    {
        let token = self.acquire(domain)?;
        f(&token)
    }

    pub fn is_held(&self, domain: MastershipDomain) -> bool {
        self.held_mut().contains(&domain)
    }

    pub fn held_domains(&self) -> Vec<MastershipDomain> {
        self.held_mut().iter().copied().collect()
    }

    fn release_domain(&self, domain: MastershipDomain) -> Result<(), MastershipError> {
        let result = self.manager.release_mastership(domain);
        self.held_mut().remove(&domain);
        if result.is_ok() {
            info!(domain = %domain, "mastership released");
        }
        result
    }

    fn held_mut(&self) -> MutexGuard<'_, BTreeSet<MastershipDomain>> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<M: MastershipManager + fmt::Debug> fmt::Debug for MastershipArbiter<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MastershipArbiter")
            .field("manager", &self.manager)
            .field("held", &self.held_domains())
            .finish()
    }
}

/// Scoped mastership of one domain
///
/// Holds the domain until dropped or explicitly released. Exactly one release
/// call is made for every token.
#[must_use = "mastership is released as soon as the token is dropped"]
pub struct Mastership<'a, M: MastershipManager> {
    arbiter: &'a MastershipArbiter<M>,
    domain: MastershipDomain,
    released: bool,
}

impl<'a, M: MastershipManager> Mastership<'a, M> {
    pub fn domain(&self) -> MastershipDomain {
        self.domain
    }

    /// Release now and return the outcome instead of reporting it
    pub fn release(mut self) -> Result<(), MastershipError> {
        self.released = true;
        self.arbiter.release_domain(self.domain)
    }
}

impl<'a, M: MastershipManager> Drop for Mastership<'a, M> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.arbiter.release_domain(self.domain) {
            self.arbiter.reporter.report(self.domain, &e);
        }
    }
}

impl<'a, M: MastershipManager> fmt::Debug for Mastership<'a, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mastership")
            .field("domain", &self.domain)
            .field("released", &self.released)
            .finish()
    }
}
