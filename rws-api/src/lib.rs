//! High-level Robot Web Services API for ABB robot controllers
//!
//! This crate provides typed access to the controller resources used by the
//! event streaming engine and by write-sensitive operations. It uses the
//! private `rws-client` crate for the underlying HTTP communication.
//!
//! # Subscriptions
//!
//! Resources are identified by a [`ResourceDescriptor`]. A [`SubscriptionSet`]
//! collects the descriptors' URIs with a priority, and each descriptor decodes
//! the [`EventFragment`]s addressed to it into an [`Event`]:
//!
//! ```rust
//! use rws_api::{ResourceDescriptor, SubscriptionPriority, SubscriptionSet};
//!
//! let di1 = ResourceDescriptor::io_signal("DI1");
//! let mut set = SubscriptionSet::new();
//! set.add_resource(&di1, SubscriptionPriority::Medium);
//!
//! assert_eq!(di1.uri(), "/rw/iosystem/signals/DI1;state");
//! assert_eq!(set.len(), 1);
//! ```
//!
//! # Mastership
//!
//! Writes to the cfg, motion and rapid domains are guarded by a scoped
//! [`Mastership`] token obtained from a [`MastershipArbiter`]. The token
//! releases the domain when it is dropped.

pub mod cfg;
pub mod ctrl;
pub mod error;
pub mod events;
pub mod mastership;
pub mod panel;
pub mod rapid;
pub mod resource;
pub mod retcode;
pub mod subscription;
pub mod xml;

pub use error::{ApiError, ProtocolError, Result, ValidationError};
pub use events::{Event, EventFragment};
pub use mastership::{
    Mastership, MastershipArbiter, MastershipDomain, MastershipError, MastershipManager,
    MastershipMode, ReleaseReporter, TracingReporter,
};
pub use resource::{RapidResource, ResourceDescriptor};
pub use subscription::{SubscriptionPriority, SubscriptionResource, SubscriptionSet};

pub use rws_client::{ConnectionOptions, RwsClient};
