//! Event fragments and the typed events decoded from them

use serde::{Deserialize, Serialize};
use xmltree::Element;

use crate::error::ProtocolError;
use crate::panel::ControllerState;
use crate::rapid::RapidExecutionState;
use crate::resource::RapidResource;
use crate::xml;

/// Class of event-log message fragments, whose self link carries a sequence number
pub const ELOG_MESSAGE_CLASS: &str = "elog-message-ev";

/// One event-bearing `<li>` element of a stream frame
///
/// Borrows the element from the parsed frame document. The self link is
/// mandatory and is resolved when the fragment is created.
#[derive(Debug, Clone, Copy)]
pub struct EventFragment<'a> {
    element: &'a Element,
    class: &'a str,
    href: &'a str,
}

impl<'a> EventFragment<'a> {
    /// Wrap a `<li>` element, locating its link
    ///
    /// The link is the child `<a rel="self">`, or the first child `<a>` when no
    /// link is marked as self.
    pub fn from_element(element: &'a Element) -> Result<Self, ProtocolError> {
        let anchors: Vec<&Element> = xml::child_elements(element)
            .filter(|child| child.name == "a")
            .collect();

        let anchor = anchors
            .iter()
            .copied()
            .find(|a| a.attributes.get("rel").map(String::as_str) == Some("self"))
            .or_else(|| anchors.first().copied())
            .ok_or_else(|| {
                ProtocolError::with_context(
                    "Cannot parse RWS event message: `li` element has no `a` element",
                    xml::describe(element),
                )
            })?;

        let href = anchor
            .attributes
            .get("href")
            .ok_or_else(|| ProtocolError::missing_field("href", xml::describe(anchor)))?;

        let class = element
            .attributes
            .get("class")
            .map(String::as_str)
            .unwrap_or_default();

        Ok(Self {
            element,
            class,
            href,
        })
    }

    pub fn element(&self) -> &'a Element {
        self.element
    }

    /// Semantic kind of the fragment, e.g. `ios-signalstate-ev`
    pub fn class(&self) -> &'a str {
        self.class
    }

    /// The fragment's link exactly as the controller sent it
    pub fn href(&self) -> &'a str {
        self.href
    }

    pub fn title(&self) -> Option<&'a str> {
        self.element.attributes.get("title").map(String::as_str)
    }

    /// URI of the subscribed resource this fragment is addressed to
    ///
    /// Equal to the link for every kind except event-log messages, whose link
    /// names the message (`/rw/elog/<domain>/<seqnum>`) and whose resource is
    /// the domain.
    pub fn resource_uri(&self) -> &'a str {
        match self.elog_parts() {
            Some((domain_uri, _)) => domain_uri,
            None => self.href,
        }
    }

    /// Domain URI and sequence number text of an event-log message link
    ///
    /// `None` for other kinds of fragment and for links without a `/`.
    pub fn elog_parts(&self) -> Option<(&'a str, &'a str)> {
        if self.class != ELOG_MESSAGE_CLASS {
            return None;
        }
        let path = self.href.split('?').next().unwrap_or(self.href);
        path.rsplit_once('/')
    }

    /// Trimmed text of the descendant tagged with `class`
    pub fn text_by_class(&self, class: &str) -> Option<String> {
        xml::find_text_by_class(self.element, class)
    }

    /// Like [`EventFragment::text_by_class`], failing when the field is absent or empty
    pub fn require_text_by_class(&self, class: &str) -> Result<String, ProtocolError> {
        xml::require_text_by_class(self.element, class)
    }
}

/// A typed change notification delivered to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// An IO signal changed value
    IoSignalState { signal: String, value: String },

    /// A persistent RAPID variable changed; the new value is included when the
    /// controller sends it
    RapidVariable {
        resource: RapidResource,
        value: Option<String>,
    },

    /// A message was written to an event-log domain
    Elog {
        domain: u32,
        sequence_number: u32,
        payload: String,
    },

    /// RAPID program execution started or stopped
    RapidExecutionState { state: RapidExecutionState },

    /// The controller changed state (motors on, guard stop, ...)
    ControllerState { state: ControllerState },
}
