//! Subscription sessions
//!
//! A [`SubscriptionSession`] negotiates a subscription group with the
//! controller, holds the event stream of that group open and hands every event
//! it receives to an [`EventHandler`]. Its lifecycle is
//!
//! ```text
//! Unopened -> Requesting -> Active -> Closing -> Closed
//!                  |           |
//!                  +-> Failed <+
//! ```
//!
//! A session reads from one thread. Other threads stop it through a
//! [`CloseHandle`]; the request is observed within one poll interval.

use rws_api::{ResourceDescriptor, SubscriptionPriority, SubscriptionSet, ValidationError};
use rws_client::RwsClient;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use crate::dispatcher::{Dispatcher, EventHandler};
use crate::error::{Result, SessionError};
use crate::frame::{FrameOpcode, ParsedFrame, WebSocketFrame};
use crate::options::SessionOptions;
use crate::transport::{FrameRead, FrameTransport, StreamConnector, StreamLocator, WebSocketConnector};

/// Lifecycle state of a [`SubscriptionSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Unopened,
    Requesting,
    Active,
    Closing,
    Closed,
    Failed,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Unopened => "Unopened",
            SessionState::Requesting => "Requesting",
            SessionState::Active => "Active",
            SessionState::Closing => "Closing",
            SessionState::Closed => "Closed",
            SessionState::Failed => "Failed",
        }
    }

    /// Whether the session can no longer receive events
    pub fn is_finished(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of one [`SubscriptionSession::receive`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// A frame arrived and this many events were delivered
    Delivered(usize),
    /// No frame arrived within the poll interval
    Idle,
    /// The session is closed
    Closed,
}

/// Requests that a session close from another thread
#[derive(Debug, Clone)]
pub struct CloseHandle {
    flag: Arc<AtomicBool>,
}

impl CloseHandle {
    pub fn request_close(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_close_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// One subscription group and the event stream it is delivered on
///
/// Resource descriptors are borrowed for `'r` through the session's
/// [`Dispatcher`]. Dropping an active session closes it.
pub struct SubscriptionSession<'r, C: StreamConnector = WebSocketConnector> {
    client: RwsClient,
    dispatcher: Dispatcher<'r>,
    connector: C,
    options: SessionOptions,
    state: SessionState,
    group_id: Option<String>,
    transport: Option<C::Transport>,
    close_requested: Arc<AtomicBool>,
}

impl<'r> SubscriptionSession<'r, WebSocketConnector> {
    /// A session streaming over WebSocket with default options
    pub fn new(client: RwsClient, dispatcher: Dispatcher<'r>) -> Self {
        Self::with_connector(client, dispatcher, WebSocketConnector, SessionOptions::default())
    }
}

impl<'r, C: StreamConnector> SubscriptionSession<'r, C> {
    pub fn with_connector(
        client: RwsClient,
        dispatcher: Dispatcher<'r>,
        connector: C,
        options: SessionOptions,
    ) -> Self {
        Self {
            client,
            dispatcher,
            connector,
            options,
            state: SessionState::Unopened,
            group_id: None,
            transport: None,
            close_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Id of the subscription group while the controller holds it
    pub fn group_id(&self) -> Option<&str> {
        self.group_id.as_deref()
    }

    pub fn dispatcher(&self) -> &Dispatcher<'r> {
        &self.dispatcher
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            flag: Arc::clone(&self.close_requested),
        }
    }

    /// Create the subscription group for `set` and open its stream
    ///
    /// No retry is attempted. If the group is created but its stream cannot
    /// be opened, the group is deleted again before the error is returned.
    pub fn open(&mut self, set: &SubscriptionSet) -> Result<()> {
        if self.state != SessionState::Unopened {
            return Err(self.invalid_state("open"));
        }
        if set.is_empty() {
            return Err(SessionError::Api(ValidationError::missing("resources").into()));
        }

        self.state = SessionState::Requesting;
        debug!(resources = set.len(), "requesting subscription group");

        let response = match self.client.subscribe(&set.encode_body()) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "subscription request failed");
                self.state = SessionState::Failed;
                return Err(e.into());
            }
        };
        self.group_id = Some(response.group_id.clone());

        let url = match self.client.stream_url(&response.location) {
            Ok(url) => url,
            Err(e) => {
                warn!(group_id = %response.group_id, error = %e, "no stream location for group");
                self.fail();
                return Err(e.into());
            }
        };
        let locator = StreamLocator {
            group_id: response.group_id,
            url,
        };

        match self.connector.connect(&self.client, &locator, &self.options) {
            Ok(transport) => {
                self.transport = Some(transport);
                self.state = SessionState::Active;
                info!(group_id = %locator.group_id, url = %locator.url, "subscription session active");
                Ok(())
            }
            Err(e) => {
                warn!(group_id = %locator.group_id, error = %e, "failed to open event stream");
                self.fail();
                Err(e.into())
            }
        }
    }

    /// Wait for one frame and deliver its events to `handler`
    ///
    /// A rejected frame is returned as [`SessionError::Frame`] and leaves the
    /// session active. A transport failure fails the session.
    pub fn receive<H>(&mut self, handler: &mut H) -> Result<ReceiveOutcome>
    where
        H: EventHandler + ?Sized,
    {
        match self.state {
            SessionState::Active => {}
            SessionState::Closed => return Ok(ReceiveOutcome::Closed),
            _ => return Err(self.invalid_state("receive")),
        }

        if self.is_close_requested() {
            self.shutdown("close requested");
            return Ok(ReceiveOutcome::Closed);
        }

        let read = match self.transport.as_mut() {
            Some(transport) => transport.receive_frame(),
            None => Ok(FrameRead::Closed),
        };

        match read {
            Ok(FrameRead::Frame(frame)) => self.deliver(&frame, handler),
            Ok(FrameRead::Idle) => {
                if self.is_close_requested() {
                    self.shutdown("close requested");
                    return Ok(ReceiveOutcome::Closed);
                }
                Ok(ReceiveOutcome::Idle)
            }
            Ok(FrameRead::Closed) => {
                self.shutdown("stream closed by controller");
                Ok(ReceiveOutcome::Closed)
            }
            Err(e) => {
                error!(group_id = ?self.group_id, error = %e, "event stream failed");
                self.fail();
                Err(e.into())
            }
        }
    }

    /// Receive until the session closes or fails
    ///
    /// Rejected frames are logged and skipped.
    pub fn run<H>(&mut self, handler: &mut H) -> Result<()>
    where
        H: EventHandler + ?Sized,
    {
        loop {
            match self.receive(handler) {
                Ok(ReceiveOutcome::Closed) => return Ok(()),
                Ok(_) => {}
                Err(e) if !e.is_terminal() && self.state == SessionState::Active => {
                    warn!(error = %e, "skipping frame");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Replace the group's resources and the dispatcher routing their events
    ///
    /// On failure the previous registrations stay in place and the session
    /// stays active; the error is [`SessionError::Update`].
    pub fn update(&mut self, set: &SubscriptionSet, dispatcher: Dispatcher<'r>) -> Result<()> {
        if self.state != SessionState::Active {
            return Err(self.invalid_state("update"));
        }
        if set.is_empty() {
            return Err(SessionError::Api(ValidationError::missing("resources").into()));
        }

        if let Some(group_id) = self.group_id.as_deref() {
            self.client
                .update_subscription(group_id, &set.encode_body())
                .map_err(|e| SessionError::Update(e.into()))?;
            debug!(group_id = %group_id, resources = set.len(), "subscription group updated");
        }
        self.dispatcher = dispatcher;
        Ok(())
    }

    /// Delete the subscription group and close the stream
    ///
    /// Failures are logged. Calling this on a finished session does nothing.
    pub fn close(&mut self) {
        match self.state {
            SessionState::Unopened => self.state = SessionState::Closed,
            SessionState::Active => self.shutdown("closed by caller"),
            _ => {}
        }
    }

    /// Close the stream but leave the subscription group on the controller
    ///
    /// Returns the id of the abandoned group.
    pub fn detach(&mut self) -> Option<String> {
        if self.state != SessionState::Active {
            return None;
        }
        self.close_transport();
        self.state = SessionState::Closed;
        let group_id = self.group_id.take();
        info!(group_id = ?group_id, "subscription session detached");
        group_id
    }

    fn deliver<H>(&mut self, frame: &WebSocketFrame, handler: &mut H) -> Result<ReceiveOutcome>
    where
        H: EventHandler + ?Sized,
    {
        let opcode = frame.opcode();
        if opcode == FrameOpcode::Close {
            self.shutdown("stream closed by controller");
            return Ok(ReceiveOutcome::Closed);
        }
        if !opcode.is_data() {
            trace!(opcode = %opcode, "ignoring frame");
            return Ok(ReceiveOutcome::Idle);
        }

        let parsed = ParsedFrame::parse(&frame.content).map_err(|e| {
            warn!(error = %e, "rejecting frame");
            SessionError::Frame(e)
        })?;
        let delivered = self
            .dispatcher
            .dispatch_frame(&parsed, handler)
            .map_err(|e| {
                warn!(error = %e, "rejecting frame");
                SessionError::Frame(e)
            })?;

        Ok(ReceiveOutcome::Delivered(delivered))
    }

    fn shutdown(&mut self, reason: &str) {
        self.state = SessionState::Closing;
        self.unsubscribe();
        self.close_transport();
        self.state = SessionState::Closed;
        info!(reason, "subscription session closed");
    }

    fn fail(&mut self) {
        self.close_transport();
        self.unsubscribe();
        self.state = SessionState::Failed;
    }

    fn unsubscribe(&mut self) {
        if let Some(group_id) = self.group_id.take() {
            if let Err(e) = self.client.unsubscribe(&group_id) {
                warn!(group_id = %group_id, error = %e, "failed to delete subscription group");
            }
        }
    }

    fn close_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close() {
                debug!(error = %e, "stream did not close cleanly");
            }
        }
    }

    fn is_close_requested(&self) -> bool {
        self.close_requested.load(Ordering::SeqCst)
    }

    fn invalid_state(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState {
            operation,
            state: self.state,
        }
    }
}

impl<'r, C: StreamConnector> Drop for SubscriptionSession<'r, C> {
    fn drop(&mut self) {
        if self.state == SessionState::Active {
            self.close();
        }
    }
}

impl<'r, C: StreamConnector> fmt::Debug for SubscriptionSession<'r, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionSession")
            .field("state", &self.state)
            .field("group_id", &self.group_id)
            .field("resources", &self.dispatcher.len())
            .finish()
    }
}

/// Collects descriptors into a subscription set and a matching dispatcher
///
/// ```rust,no_run
/// use rws_api::{Event, ResourceDescriptor, SubscriptionPriority};
/// use rws_client::{ConnectionOptions, RwsClient};
/// use rws_stream::SessionBuilder;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RwsClient::new(ConnectionOptions::for_host("192.168.125.1", 443)?);
/// let di1 = ResourceDescriptor::io_signal("DI1");
///
/// let mut session = SessionBuilder::new()
///     .subscribe(&di1, SubscriptionPriority::Medium)
///     .open(client)?;
/// session.run(&mut |resource: &ResourceDescriptor, event: Event| {
///     println!("{}: {:?}", resource, event);
/// })?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct SessionBuilder<'r> {
    set: SubscriptionSet,
    dispatcher: Dispatcher<'r>,
    options: SessionOptions,
}

impl<'r> SessionBuilder<'r> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `descriptor` and route its events to the session handler
    pub fn subscribe(mut self, descriptor: &'r ResourceDescriptor, priority: SubscriptionPriority) -> Self {
        self.set.add_resource(descriptor, priority);
        self.dispatcher.register(descriptor);
        self
    }

    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn subscription_set(&self) -> &SubscriptionSet {
        &self.set
    }

    pub fn dispatcher(&self) -> &Dispatcher<'r> {
        &self.dispatcher
    }

    /// Open a WebSocket session for the collected resources
    pub fn open(self, client: RwsClient) -> Result<SubscriptionSession<'r>> {
        self.open_with(client, WebSocketConnector)
    }

    pub fn open_with<C: StreamConnector>(
        self,
        client: RwsClient,
        connector: C,
    ) -> Result<SubscriptionSession<'r, C>> {
        let mut session = SubscriptionSession::with_connector(client, self.dispatcher, connector, self.options);
        session.open(&self.set)?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rws_api::Event;
    use rws_client::ConnectionOptions;

    fn client() -> RwsClient {
        RwsClient::new(ConnectionOptions::parse("http://127.0.0.1:1").unwrap())
    }

    #[test]
    fn test_state_names() {
        assert_eq!(SessionState::Requesting.to_string(), "Requesting");
        assert!(SessionState::Failed.is_finished());
        assert!(!SessionState::Active.is_finished());
    }

    #[test]
    fn test_close_handle_shares_flag() {
        let session = SubscriptionSession::new(client(), Dispatcher::new());
        let handle = session.close_handle();
        let other = handle.clone();

        assert!(!other.is_close_requested());
        handle.request_close();
        assert!(other.is_close_requested());
        assert!(session.is_close_requested());
    }

    #[test]
    fn test_unopened_session_rejects_receive() {
        let mut session = SubscriptionSession::new(client(), Dispatcher::new());
        let error = session
            .receive(&mut |_: &ResourceDescriptor, _: Event| {})
            .unwrap_err();

        assert!(matches!(
            error,
            SessionError::InvalidState {
                operation: "receive",
                state: SessionState::Unopened
            }
        ));
    }

    #[test]
    fn test_empty_set_is_rejected_before_request() {
        let mut session = SubscriptionSession::new(client(), Dispatcher::new());
        let error = session.open(&SubscriptionSet::new()).unwrap_err();

        assert!(matches!(error, SessionError::Api(rws_api::ApiError::Validation(_))));
        assert_eq!(session.state(), SessionState::Unopened);
    }

    #[test]
    fn test_closing_unopened_session() {
        let mut session = SubscriptionSession::new(client(), Dispatcher::new());
        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.detach(), None);
    }

    #[test]
    fn test_builder_registers_each_descriptor_once() {
        let di1 = ResourceDescriptor::io_signal("DI1");
        let elog = ResourceDescriptor::elog_domain(0);
        let builder = SessionBuilder::new()
            .subscribe(&di1, SubscriptionPriority::Medium)
            .subscribe(&elog, SubscriptionPriority::Low);

        assert_eq!(builder.subscription_set().len(), 2);
        assert_eq!(builder.dispatcher().len(), 2);
        assert_eq!(
            builder.subscription_set().encode_body(),
            "resources=0&0=%2Frw%2Fiosystem%2Fsignals%2FDI1%3Bstate&0-p=1\
             &resources=1&1=%2Frw%2Felog%2F0&1-p=0"
        );
    }
}
