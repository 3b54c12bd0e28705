//! The streaming connection a session reads frames from
//!
//! [`StreamConnector`] opens a [`FrameTransport`] for a subscription group.
//! The production pair is [`WebSocketConnector`] / [`WebSocketTransport`] on
//! top of `tungstenite`; tests supply scripted implementations.

use rws_client::RwsClient;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, trace};
use tungstenite::client::IntoClientRequest;
use tungstenite::http::HeaderValue;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Connector, Message, WebSocket};
use url::Url;

use crate::error::TransportError;
use crate::frame::{FrameOpcode, WebSocketFrame, FLAG_FIN};
use crate::options::SessionOptions;

/// Where the controller streams a subscription group's events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamLocator {
    pub group_id: String,
    /// `ws://` or `wss://` URL of the group's poll endpoint
    pub url: Url,
}

/// Outcome of one bounded wait for a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameRead {
    Frame(WebSocketFrame),
    /// The poll interval elapsed without a frame
    Idle,
    /// The peer closed the stream
    Closed,
}

/// An open, exclusively owned stream of frames
pub trait FrameTransport {
    /// Wait at most one poll interval for the next data frame
    ///
    /// Ping and pong frames are handled by the transport and never returned.
    fn receive_frame(&mut self) -> Result<FrameRead, TransportError>;

    fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens the stream of a newly created subscription group
pub trait StreamConnector {
    type Transport: FrameTransport;

    fn connect(
        &self,
        client: &RwsClient,
        locator: &StreamLocator,
        options: &SessionOptions,
    ) -> Result<Self::Transport, TransportError>;
}

/// Connects to the controller's WebSocket poll endpoint
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl StreamConnector for WebSocketConnector {
    type Transport = WebSocketTransport<TcpStream>;

    fn connect(
        &self,
        client: &RwsClient,
        locator: &StreamLocator,
        options: &SessionOptions,
    ) -> Result<Self::Transport, TransportError> {
        let url = &locator.url;
        let connect_error = |message: String| TransportError::Connect {
            url: url.to_string(),
            message,
        };
        let http = client.options();

        let stream = connect_tcp(url, http.connect_timeout).map_err(connect_error)?;
        stream
            .set_read_timeout(Some(http.read_timeout))
            .and_then(|_| stream.set_write_timeout(Some(http.write_timeout)))
            .map_err(|e| connect_error(e.to_string()))?;
        let control = stream.try_clone().map_err(|e| connect_error(e.to_string()))?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| connect_error(e.to_string()))?;
        let headers = request.headers_mut();
        headers.insert(
            "Sec-WebSocket-Protocol",
            header_value(&options.protocol).map_err(connect_error)?,
        );
        headers.insert(
            "Authorization",
            header_value(&client.authorization_header()).map_err(connect_error)?,
        );
        if let Some(cookie) = client.cookie_header() {
            headers.insert("Cookie", header_value(&cookie).map_err(connect_error)?);
        }

        let (socket, response) =
            tungstenite::client_tls_with_config(request, stream, None, tls_connector(client))
                .map_err(|e| connect_error(e.to_string()))?;
        debug!(url = %url, status = response.status().as_u16(), "stream opened");

        // Reads are bounded by the poll interval from here on
        control
            .set_read_timeout(Some(poll_timeout(options.poll_interval)))
            .map_err(|e| connect_error(e.to_string()))?;

        Ok(WebSocketTransport::new(socket))
    }
}

/// A WebSocket stream of subscription frames
pub struct WebSocketTransport<S: Read + Write> {
    socket: WebSocket<MaybeTlsStream<S>>,
}

impl<S: Read + Write> WebSocketTransport<S> {
    pub fn new(socket: WebSocket<MaybeTlsStream<S>>) -> Self {
        Self { socket }
    }
}

impl<S: Read + Write> FrameTransport for WebSocketTransport<S> {
    fn receive_frame(&mut self) -> Result<FrameRead, TransportError> {
        loop {
            match self.socket.read() {
                Ok(Message::Text(text)) => {
                    return Ok(FrameRead::Frame(WebSocketFrame::text(text)));
                }
                Ok(Message::Binary(data)) => {
                    let content = String::from_utf8(data).map_err(|_| {
                        TransportError::Read("binary frame is not valid UTF-8".to_string())
                    })?;
                    let flags = FLAG_FIN | FrameOpcode::Binary.bits();
                    return Ok(FrameRead::Frame(WebSocketFrame::new(flags, content)));
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {
                    // Pongs to pings are queued by the read above and sent here
                    trace!("control frame received");
                    if let Err(e) = self.socket.flush() {
                        return map_read_error(e);
                    }
                }
                Ok(Message::Close(frame)) => {
                    debug!(reason = ?frame, "stream closed by controller");
                    return Ok(FrameRead::Closed);
                }
                Err(e) => return map_read_error(e),
            }
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        match self.socket.close(None) {
            Ok(()) => {}
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                return Ok(())
            }
            Err(e) => return Err(TransportError::Close(e.to_string())),
        }
        match self.socket.flush() {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(tungstenite::Error::Io(e)) if is_timeout(e.kind()) => Ok(()),
            Err(e) => Err(TransportError::Close(e.to_string())),
        }
    }
}

fn map_read_error(error: tungstenite::Error) -> Result<FrameRead, TransportError> {
    match error {
        tungstenite::Error::Io(e) if is_timeout(e.kind()) => Ok(FrameRead::Idle),
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            Ok(FrameRead::Closed)
        }
        other => Err(TransportError::Read(other.to_string())),
    }
}

fn is_timeout(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

fn poll_timeout(interval: Duration) -> Duration {
    interval.max(Duration::from_millis(1))
}

/// The client's TLS configuration, if it replaces the default verification
fn tls_connector(client: &RwsClient) -> Option<Connector> {
    client.tls_config().map(Connector::Rustls)
}

fn header_value(value: &str) -> Result<HeaderValue, String> {
    HeaderValue::from_str(value).map_err(|e| e.to_string())
}

fn connect_tcp(url: &Url, timeout: Duration) -> Result<TcpStream, String> {
    let host = url
        .host_str()
        .ok_or_else(|| "stream URL has no host".to_string())?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| "stream URL has no port".to_string())?;
    let addresses: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| e.to_string())?
        .collect();

    let mut last_error = format!("no address found for {}", host);
    for address in addresses {
        match TcpStream::connect_timeout(&address, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = e.to_string(),
        }
    }
    Err(last_error)
}
