//! Test helpers for session tests.
//!
//! This module provides:
//! - A scripted in-memory transport standing in for the controller's stream
//! - A connector that hands it out and records what the session asked for
//! - Frame fixtures shaped like the controller's event markup

#![allow(dead_code)]

use mockito::Server;
use rws_client::{ConnectionOptions, RwsClient};
use rws_stream::{
    FrameRead, FrameTransport, SessionOptions, StreamConnector, StreamLocator, TransportError,
    WebSocketFrame,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type ScriptedRead = Result<FrameRead, TransportError>;

/// Plays back a fixed sequence of reads, then stays idle
pub struct ScriptedTransport {
    reads: VecDeque<ScriptedRead>,
    closes: Arc<AtomicUsize>,
}

impl FrameTransport for ScriptedTransport {
    fn receive_frame(&mut self) -> Result<FrameRead, TransportError> {
        match self.reads.pop_front() {
            Some(read) => read,
            None => {
                std::thread::sleep(Duration::from_millis(1));
                Ok(FrameRead::Idle)
            }
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector handing out one [`ScriptedTransport`]
///
/// Clones share their counters, so a test keeps one clone to inspect after
/// moving the other into a session.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    reads: Arc<Mutex<Vec<ScriptedRead>>>,
    refuse: Option<String>,
    connects: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    locators: Arc<Mutex<Vec<StreamLocator>>>,
}

impl ScriptedConnector {
    pub fn new(reads: Vec<ScriptedRead>) -> Self {
        Self {
            reads: Arc::new(Mutex::new(reads)),
            ..Self::default()
        }
    }

    /// A connector whose connection attempt always fails
    pub fn refusing(message: &str) -> Self {
        Self {
            refuse: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn locators(&self) -> Vec<StreamLocator> {
        self.locators.lock().unwrap().clone()
    }
}

impl StreamConnector for ScriptedConnector {
    type Transport = ScriptedTransport;

    fn connect(
        &self,
        _client: &RwsClient,
        locator: &StreamLocator,
        _options: &SessionOptions,
    ) -> Result<ScriptedTransport, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.locators.lock().unwrap().push(locator.clone());

        if let Some(message) = &self.refuse {
            return Err(TransportError::Connect {
                url: locator.url.to_string(),
                message: message.clone(),
            });
        }

        let reads = std::mem::take(&mut *self.reads.lock().unwrap());
        Ok(ScriptedTransport {
            reads: reads.into(),
            closes: Arc::clone(&self.closes),
        })
    }
}

pub fn client_for(server: &Server) -> RwsClient {
    RwsClient::new(ConnectionOptions::parse(&server.url()).unwrap())
}

/// A text frame carrying one IO signal state event
pub fn signal_frame(name: &str, value: &str) -> ScriptedRead {
    Ok(FrameRead::Frame(WebSocketFrame::text(signal_markup(&[(name, value)]))))
}

/// Event markup as pushed by the controller for IO signal changes
pub fn signal_markup(signals: &[(&str, &str)]) -> String {
    let items: String = signals
        .iter()
        .map(|(name, value)| {
            format!(
                r#"<li class="ios-signalstate-ev" title="{name}"><a href="/rw/iosystem/signals/{name};state" rel="self"/><span class="lvalue">{value}</span></li>"#
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><html xmlns="http://www.w3.org/1999/xhtml"><head><base href="http://127.0.0.1/"/></head><body><div class="state"><a href="subscription/1" rel="group"></a><ul>{items}</ul></div></body></html>"#
    )
}

pub fn malformed_frame() -> ScriptedRead {
    Ok(FrameRead::Frame(WebSocketFrame::text(
        r#"<ul><li class="ios-signalstate-ev"><span class="lvalue">1</span></ul>"#,
    )))
}
