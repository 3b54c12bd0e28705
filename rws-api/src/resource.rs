//! Subscribable controller resources
//!
//! A [`ResourceDescriptor`] identifies one resource a client can subscribe to.
//! It produces the URI used in the subscription request and decodes the event
//! fragments the controller sends back for that URI.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ProtocolError;
use crate::events::{Event, EventFragment, ELOG_MESSAGE_CLASS};

/// Location of a persistent RAPID variable
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RapidResource {
    pub task: String,
    pub module: String,
    pub name: String,
}

impl RapidResource {
    pub fn new(task: impl Into<String>, module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            module: module.into(),
            name: name.into(),
        }
    }

    /// Symbol URI of the variable, without a resource suffix
    pub fn symbol_uri(&self) -> String {
        format!(
            "/rw/rapid/symbol/RAPID/{}/{}/{}",
            self.task, self.module, self.name
        )
    }
}

/// A resource that can be subscribed to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceDescriptor {
    /// State of a named IO signal
    IoSignal { name: String },
    /// Value of a persistent RAPID variable
    RapidPersistentVariable(RapidResource),
    /// Messages of one event-log domain
    ElogDomain { domain: u32 },
    /// Start/stop of RAPID program execution
    RapidExecutionState,
    /// Controller state (motors on/off, stops, ...)
    ControllerState,
}

impl ResourceDescriptor {
    pub fn io_signal(name: impl Into<String>) -> Self {
        Self::IoSignal { name: name.into() }
    }

    pub fn rapid_persistent_variable(
        task: impl Into<String>,
        module: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::RapidPersistentVariable(RapidResource::new(task, module, name))
    }

    pub fn elog_domain(domain: u32) -> Self {
        Self::ElogDomain { domain }
    }

    /// Subscription URI of the resource
    pub fn uri(&self) -> String {
        match self {
            Self::IoSignal { name } => format!("/rw/iosystem/signals/{};state", name),
            Self::RapidPersistentVariable(resource) => format!("{};value", resource.symbol_uri()),
            Self::ElogDomain { domain } => format!("/rw/elog/{}", domain),
            Self::RapidExecutionState => "/rw/rapid/execution;ctrlexecstate".to_string(),
            Self::ControllerState => "/rw/panel/ctrl-state".to_string(),
        }
    }

    /// Class of the event fragments the controller sends for this resource
    pub fn event_class(&self) -> &'static str {
        match self {
            Self::IoSignal { .. } => "ios-signalstate-ev",
            Self::RapidPersistentVariable(_) => "rap-value-ev",
            Self::ElogDomain { .. } => ELOG_MESSAGE_CLASS,
            Self::RapidExecutionState => "rap-ctrlexecstate-ev",
            Self::ControllerState => "pnl-ctrlstate-ev",
        }
    }

    /// Whether a fragment's resource URI addresses this resource
    ///
    /// Exact comparison; there are no wildcard or prefix semantics.
    pub fn matches(&self, fragment_uri: &str) -> bool {
        fragment_uri == self.uri()
    }

    /// Decode a fragment addressed to this resource into a typed event
    pub fn decode(&self, fragment: &EventFragment<'_>) -> Result<Event, ProtocolError> {
        if fragment.class() != self.event_class() {
            return Err(ProtocolError::with_context(
                format!(
                    "event for {} has class '{}', expected '{}'",
                    self.uri(),
                    fragment.class(),
                    self.event_class()
                ),
                fragment.href(),
            ));
        }

        match self {
            Self::IoSignal { name } => Ok(Event::IoSignalState {
                signal: name.clone(),
                value: fragment.require_text_by_class("lvalue")?,
            }),
            Self::RapidPersistentVariable(resource) => Ok(Event::RapidVariable {
                resource: resource.clone(),
                value: fragment.text_by_class("value"),
            }),
            Self::ElogDomain { domain } => Ok(Event::Elog {
                domain: *domain,
                sequence_number: elog_sequence_number(fragment)?,
                payload: fragment.title().unwrap_or_default().to_string(),
            }),
            Self::RapidExecutionState => Ok(Event::RapidExecutionState {
                state: fragment.require_text_by_class("ctrlexecstate")?.parse()?,
            }),
            Self::ControllerState => Ok(Event::ControllerState {
                state: fragment.require_text_by_class("ctrlstate")?.parse()?,
            }),
        }
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

/// Sequence number from an event-log message link `/rw/elog/<domain>/<seqnum>`
fn elog_sequence_number(fragment: &EventFragment<'_>) -> Result<u32, ProtocolError> {
    let (_, sequence_number) = fragment.elog_parts().unwrap_or_default();
    sequence_number.parse().map_err(|_| {
        ProtocolError::with_context(
            "unable to find sequence number in event-log message URI",
            fragment.href(),
        )
    })
}
