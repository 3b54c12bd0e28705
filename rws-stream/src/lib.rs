//! # rws-stream
//!
//! Event subscriptions for ABB robot controllers.
//!
//! A [`SubscriptionSession`] registers a set of resources with the controller,
//! opens the WebSocket stream the controller pushes their events on and routes
//! every event fragment to the [`ResourceDescriptor`](rws_api::ResourceDescriptor)
//! it belongs to. Frames are parsed by [`ParsedFrame`] and routed by a
//! [`Dispatcher`]; the stream itself sits behind the [`StreamConnector`] and
//! [`FrameTransport`] traits.

mod dispatcher;
mod error;
mod frame;
pub mod logging;
mod options;
mod session;
mod transport;

pub use dispatcher::{Dispatcher, EventHandler};
pub use error::{Result, SessionError, TransportError};
pub use frame::{FrameOpcode, Fragments, ParsedFrame, WebSocketFrame, FLAG_FIN, OPCODE_MASK};
pub use options::{SessionOptions, DEFAULT_POLL_INTERVAL, DEFAULT_PROTOCOL};
pub use session::{CloseHandle, ReceiveOutcome, SessionBuilder, SessionState, SubscriptionSession};
pub use transport::{
    FrameRead, FrameTransport, StreamConnector, StreamLocator, WebSocketConnector, WebSocketTransport,
};
