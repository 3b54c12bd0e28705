//! Routing of event fragments to the resources they are addressed to

use rws_api::{Event, EventFragment, ProtocolError, ResourceDescriptor};
use tracing::{debug, trace};

use crate::frame::ParsedFrame;

/// Receives typed events from a session
///
/// Implemented for any `FnMut(&ResourceDescriptor, Event)` closure.
pub trait EventHandler {
    fn handle(&mut self, resource: &ResourceDescriptor, event: Event);
}

impl<F> EventHandler for F
where
    F: FnMut(&ResourceDescriptor, Event),
{
    fn handle(&mut self, resource: &ResourceDescriptor, event: Event) {
        self(resource, event)
    }
}

/// Matches fragments against registered resource descriptors
///
/// Descriptors are borrowed from the caller. They are scanned in registration
/// order and the first whose URI matches a fragment decodes it. If two
/// descriptors share a URI only the first one ever receives events.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher<'r> {
    descriptors: Vec<&'r ResourceDescriptor>,
}

impl<'r> Dispatcher<'r> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_descriptors(descriptors: impl IntoIterator<Item = &'r ResourceDescriptor>) -> Self {
        Self {
            descriptors: descriptors.into_iter().collect(),
        }
    }

    pub fn register(&mut self, descriptor: &'r ResourceDescriptor) -> &mut Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn descriptors(&self) -> &[&'r ResourceDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// First registered descriptor addressed by `fragment_uri`
    pub fn resolve(&self, fragment_uri: &str) -> Option<&'r ResourceDescriptor> {
        self.descriptors
            .iter()
            .copied()
            .find(|descriptor| descriptor.matches(fragment_uri))
    }

    /// Decode one fragment and hand its event to `handler`
    ///
    /// Returns whether a descriptor matched. An unmatched fragment is not an
    /// error.
    pub fn dispatch<H>(&self, fragment: &EventFragment<'_>, handler: &mut H) -> Result<bool, ProtocolError>
    where
        H: EventHandler + ?Sized,
    {
        match self.decode(fragment)? {
            Some((descriptor, event)) => {
                handler.handle(descriptor, event);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Decode every fragment of a frame, then deliver the events in order
    ///
    /// If any matched fragment fails to decode nothing is delivered. Returns
    /// the number of events delivered.
    pub fn dispatch_frame<H>(&self, frame: &ParsedFrame, handler: &mut H) -> Result<usize, ProtocolError>
    where
        H: EventHandler + ?Sized,
    {
        let mut events = Vec::with_capacity(frame.len());
        for fragment in frame.fragments() {
            if let Some(decoded) = self.decode(&fragment)? {
                events.push(decoded);
            }
        }

        let delivered = events.len();
        for (descriptor, event) in events {
            handler.handle(descriptor, event);
        }
        debug!(fragments = frame.len(), delivered, "frame dispatched");
        Ok(delivered)
    }

    fn decode(&self, fragment: &EventFragment<'_>) -> Result<Option<(&'r ResourceDescriptor, Event)>, ProtocolError> {
        let uri = fragment.resource_uri();
        match self.resolve(uri) {
            Some(descriptor) => Ok(Some((descriptor, descriptor.decode(fragment)?))),
            None => {
                trace!(uri = %uri, class = %fragment.class(), "no subscriber for fragment");
                Ok(None)
            }
        }
    }
}
