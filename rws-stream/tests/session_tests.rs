//! Integration tests for subscription sessions.
//!
//! The controller's HTTP side is a mockito server; its event stream is a
//! scripted transport. These tests cover:
//! - Subscription lifecycle (subscribe, receive events, unsubscribe)
//! - Failure while negotiating or streaming
//! - Closing, detaching and updating a live session

mod test_helpers;

use mockito::{Mock, Server, ServerGuard};
use rstest::rstest;
use rws_api::{ApiError, Event, ResourceDescriptor, SubscriptionPriority, SubscriptionSet};
use rws_stream::{
    Dispatcher, FrameRead, ReceiveOutcome, SessionBuilder, SessionError, SessionOptions,
    SessionState, SubscriptionSession, TransportError, WebSocketFrame,
};
use std::time::Duration;
use test_helpers::{
    client_for, malformed_frame, signal_frame, signal_markup, ScriptedConnector, ScriptedRead,
};

const DI1_MEDIUM: &str = "resources=0&0=%2Frw%2Fiosystem%2Fsignals%2FDI1%3Bstate&0-p=1";

fn mock_subscribe(server: &mut ServerGuard, body: &str) -> Mock {
    let location = format!("{}/poll/1", server.url());
    server
        .mock("POST", "/subscription")
        .match_body(body)
        .with_status(201)
        .with_header("location", &location)
        .expect(1)
        .create()
}

fn mock_unsubscribe(server: &mut ServerGuard, times: usize) -> Mock {
    server
        .mock("DELETE", "/subscription/1")
        .with_status(200)
        .expect(times)
        .create()
}

fn open_session<'r>(
    server: &Server,
    descriptors: &'r [ResourceDescriptor],
    connector: ScriptedConnector,
) -> SubscriptionSession<'r, ScriptedConnector> {
    let mut set = SubscriptionSet::new();
    for descriptor in descriptors {
        set.add_resource(descriptor, SubscriptionPriority::Medium);
    }
    let mut session = SubscriptionSession::with_connector(
        client_for(server),
        Dispatcher::from_descriptors(descriptors),
        connector,
        SessionOptions::default(),
    );
    session.open(&set).unwrap();
    session
}

fn recorder(events: &mut Vec<Event>) -> impl FnMut(&ResourceDescriptor, Event) + '_ {
    move |_: &ResourceDescriptor, event: Event| events.push(event)
}

#[test]
fn test_io_signal_event_reaches_handler() {
    let mut server = Server::new();
    let subscribe = mock_subscribe(&mut server, DI1_MEDIUM);
    let unsubscribe = mock_unsubscribe(&mut server, 1);

    let descriptors = vec![ResourceDescriptor::io_signal("DI1")];
    let connector = ScriptedConnector::new(vec![signal_frame("DI1", "1")]);
    let mut session = open_session(&server, &descriptors, connector.clone());

    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.group_id(), Some("1"));
    let locators = connector.locators();
    assert_eq!(locators.len(), 1);
    assert_eq!(locators[0].group_id, "1");
    assert_eq!(locators[0].url.scheme(), "ws");
    assert_eq!(locators[0].url.path(), "/poll/1");

    let mut received = Vec::new();
    let outcome = session
        .receive(&mut |resource: &ResourceDescriptor, event: Event| {
            received.push((resource.clone(), event))
        })
        .unwrap();

    assert_eq!(outcome, ReceiveOutcome::Delivered(1));
    assert_eq!(
        received,
        vec![(
            ResourceDescriptor::io_signal("DI1"),
            Event::IoSignalState {
                signal: "DI1".to_string(),
                value: "1".to_string()
            }
        )]
    );

    session.close();
    subscribe.assert();
    unsubscribe.assert();
}

#[test]
fn test_close_unsubscribes_exactly_once() {
    let mut server = Server::new();
    let _subscribe = mock_subscribe(&mut server, DI1_MEDIUM);
    let unsubscribe = mock_unsubscribe(&mut server, 1);

    let descriptors = vec![ResourceDescriptor::io_signal("DI1")];
    let connector = ScriptedConnector::new(Vec::new());
    {
        let mut session = open_session(&server, &descriptors, connector.clone());
        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.group_id(), None);
    }

    unsubscribe.assert();
    assert_eq!(connector.closes(), 1);
}

#[test]
fn test_failed_unsubscribe_still_closes() {
    let mut server = Server::new();
    let _subscribe = mock_subscribe(&mut server, DI1_MEDIUM);
    let unsubscribe = server
        .mock("DELETE", "/subscription/1")
        .with_status(500)
        .with_body("internal error")
        .expect(1)
        .create();

    let descriptors = vec![ResourceDescriptor::io_signal("DI1")];
    let connector = ScriptedConnector::new(Vec::new());
    let mut session = open_session(&server, &descriptors, connector.clone());

    session.close();

    unsubscribe.assert();
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(connector.closes(), 1);
}

#[test]
fn test_dropping_active_session_unsubscribes() {
    let mut server = Server::new();
    let _subscribe = mock_subscribe(&mut server, DI1_MEDIUM);
    let unsubscribe = mock_unsubscribe(&mut server, 1);

    let descriptors = vec![ResourceDescriptor::io_signal("DI1")];
    let connector = ScriptedConnector::new(Vec::new());
    drop(open_session(&server, &descriptors, connector.clone()));

    unsubscribe.assert();
    assert_eq!(connector.closes(), 1);
}

#[rstest]
#[case(400, "<html><body><span class=\"msg\">subscription limit reached</span></body></html>")]
#[case(200, "")]
fn test_rejected_subscription_fails_without_stream(#[case] status: usize, #[case] body: &str) {
    let mut server = Server::new();
    let subscribe = server
        .mock("POST", "/subscription")
        .with_status(status)
        .with_body(body)
        .expect(1)
        .create();
    let unsubscribe = mock_unsubscribe(&mut server, 0);

    let descriptors = vec![ResourceDescriptor::io_signal("DI1")];
    let connector = ScriptedConnector::new(Vec::new());
    let mut set = SubscriptionSet::new();
    set.add_io_signal("DI1", SubscriptionPriority::Medium);
    let mut session = SubscriptionSession::with_connector(
        client_for(&server),
        Dispatcher::from_descriptors(&descriptors),
        connector.clone(),
        SessionOptions::default(),
    );

    let error = session.open(&set).unwrap_err();

    assert!(matches!(error, SessionError::Api(ApiError::Protocol(_))));
    assert!(error.is_terminal());
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(connector.connects(), 0);
    subscribe.assert();
    unsubscribe.assert();
}

#[test]
fn test_subscription_without_location_fails() {
    let mut server = Server::new();
    let _subscribe = server.mock("POST", "/subscription").with_status(201).create();

    let descriptors = vec![ResourceDescriptor::io_signal("DI1")];
    let connector = ScriptedConnector::new(Vec::new());
    let mut session = SubscriptionSession::with_connector(
        client_for(&server),
        Dispatcher::from_descriptors(&descriptors),
        connector.clone(),
        SessionOptions::default(),
    );
    let set: SubscriptionSet = descriptors
        .iter()
        .map(|d| rws_api::SubscriptionResource::new(d.uri(), SubscriptionPriority::Low))
        .collect();

    let error = session.open(&set).unwrap_err();

    match error {
        SessionError::Api(ApiError::Protocol(e)) => {
            assert!(e.message.contains("Cannot get subscription group"))
        }
        other => panic!("Expected a protocol error, got {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(connector.connects(), 0);
}

#[test]
fn test_stream_connect_failure_deletes_group() {
    let mut server = Server::new();
    let _subscribe = mock_subscribe(&mut server, DI1_MEDIUM);
    let unsubscribe = mock_unsubscribe(&mut server, 1);

    let descriptors = vec![ResourceDescriptor::io_signal("DI1")];
    let connector = ScriptedConnector::refusing("upgrade rejected");
    let mut set = SubscriptionSet::new();
    set.add_io_signal("DI1", SubscriptionPriority::Medium);
    let mut session = SubscriptionSession::with_connector(
        client_for(&server),
        Dispatcher::from_descriptors(&descriptors),
        connector.clone(),
        SessionOptions::default(),
    );

    let error = session.open(&set).unwrap_err();

    assert!(matches!(
        error,
        SessionError::Transport(TransportError::Connect { .. })
    ));
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(connector.connects(), 1);
    unsubscribe.assert();
}

#[test]
fn test_session_cannot_be_opened_twice() {
    let mut server = Server::new();
    let _subscribe = mock_subscribe(&mut server, DI1_MEDIUM);
    let _unsubscribe = mock_unsubscribe(&mut server, 1);

    let descriptors = vec![ResourceDescriptor::io_signal("DI1")];
    let mut session = open_session(&server, &descriptors, ScriptedConnector::new(Vec::new()));

    let mut set = SubscriptionSet::new();
    set.add_io_signal("DI1", SubscriptionPriority::Medium);
    let error = session.open(&set).unwrap_err();

    assert!(matches!(
        error,
        SessionError::InvalidState {
            operation: "open",
            state: SessionState::Active
        }
    ));
}

#[test]
fn test_rejected_frame_keeps_session_active() {
    let mut server = Server::new();
    let _subscribe = mock_subscribe(&mut server, DI1_MEDIUM);
    let _unsubscribe = mock_unsubscribe(&mut server, 1);

    let descriptors = vec![ResourceDescriptor::io_signal("DI1")];
    let connector = ScriptedConnector::new(vec![malformed_frame(), signal_frame("DI1", "0")]);
    let mut session = open_session(&server, &descriptors, connector);

    let mut events = Vec::new();
    let error = session.receive(&mut recorder(&mut events)).unwrap_err();
    assert!(matches!(error, SessionError::Frame(_)));
    assert!(!error.is_terminal());
    assert_eq!(session.state(), SessionState::Active);

    let outcome = session.receive(&mut recorder(&mut events)).unwrap();
    assert_eq!(outcome, ReceiveOutcome::Delivered(1));
    assert_eq!(events.len(), 1);
}

#[test]
fn test_frame_with_undecodable_fragment_delivers_nothing() {
    let mut server = Server::new();
    let _subscribe = mock_subscribe(&mut server, DI1_MEDIUM);
    let _unsubscribe = mock_unsubscribe(&mut server, 1);

    let descriptors = vec![ResourceDescriptor::io_signal("DI1")];
    let content = signal_markup(&[("DI1", "1")]).replace(
        "</ul>",
        r#"<li class="ios-signalstate-ev"><a href="/rw/iosystem/signals/DI1;state" rel="self"/></li></ul>"#,
    );
    let connector = ScriptedConnector::new(vec![Ok(FrameRead::Frame(WebSocketFrame::text(content)))]);
    let mut session = open_session(&server, &descriptors, connector);

    let mut events = Vec::new();
    let error = session.receive(&mut recorder(&mut events)).unwrap_err();

    assert!(matches!(error, SessionError::Frame(_)));
    assert!(events.is_empty());
}

#[test]
fn test_events_delivered_in_stream_order() {
    let mut server = Server::new();
    let body = "resources=0&0=%2Frw%2Fiosystem%2Fsignals%2FDI1%3Bstate&0-p=1\
                &resources=1&1=%2Frw%2Fiosystem%2Fsignals%2FDI2%3Bstate&1-p=1";
    let _subscribe = mock_subscribe(&mut server, body);
    let _unsubscribe = mock_unsubscribe(&mut server, 1);

    let descriptors = vec![
        ResourceDescriptor::io_signal("DI1"),
        ResourceDescriptor::io_signal("DI2"),
    ];
    let frame = WebSocketFrame::text(signal_markup(&[("DI2", "1"), ("DI1", "1"), ("DI2", "0")]));
    let connector = ScriptedConnector::new(vec![
        Ok(FrameRead::Frame(frame)),
        signal_frame("DI1", "0"),
        Ok(FrameRead::Closed),
    ]);
    let mut session = open_session(&server, &descriptors, connector);

    let mut events = Vec::new();
    session.run(&mut recorder(&mut events)).unwrap();

    let values: Vec<String> = events
        .into_iter()
        .map(|event| match event {
            Event::IoSignalState { signal, value } => format!("{}={}", signal, value),
            other => panic!("unexpected event {:?}", other),
        })
        .collect();
    assert_eq!(values, vec!["DI2=1", "DI1=1", "DI2=0", "DI1=0"]);
}

#[rstest]
#[case::stream_end(Ok(FrameRead::Closed))]
#[case::close_frame(Ok(FrameRead::Frame(WebSocketFrame::close())))]
fn test_controller_close_ends_session(#[case] read: ScriptedRead) {
    let mut server = Server::new();
    let _subscribe = mock_subscribe(&mut server, DI1_MEDIUM);
    let unsubscribe = mock_unsubscribe(&mut server, 1);

    let descriptors = vec![ResourceDescriptor::io_signal("DI1")];
    let connector = ScriptedConnector::new(vec![read]);
    let mut session = open_session(&server, &descriptors, connector.clone());

    let mut events = Vec::new();
    let outcome = session.receive(&mut recorder(&mut events)).unwrap();

    assert_eq!(outcome, ReceiveOutcome::Closed);
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(
        session.receive(&mut recorder(&mut events)).unwrap(),
        ReceiveOutcome::Closed
    );
    unsubscribe.assert();
    assert_eq!(connector.closes(), 1);
}

#[test]
fn test_read_failure_fails_session() {
    let mut server = Server::new();
    let _subscribe = mock_subscribe(&mut server, DI1_MEDIUM);
    let unsubscribe = mock_unsubscribe(&mut server, 1);

    let descriptors = vec![ResourceDescriptor::io_signal("DI1")];
    let connector = ScriptedConnector::new(vec![
        signal_frame("DI1", "1"),
        Err(TransportError::Read("connection reset".to_string())),
        signal_frame("DI1", "0"),
    ]);
    let mut session = open_session(&server, &descriptors, connector);

    let mut events = Vec::new();
    let error = session.run(&mut recorder(&mut events)).unwrap_err();

    assert!(matches!(error, SessionError::Transport(TransportError::Read(_))));
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(events.len(), 1);
    unsubscribe.assert();

    let error = session.receive(&mut recorder(&mut events)).unwrap_err();
    assert!(matches!(
        error,
        SessionError::InvalidState {
            state: SessionState::Failed,
            ..
        }
    ));
}

#[test]
fn test_idle_poll_reports_idle() {
    let mut server = Server::new();
    let _subscribe = mock_subscribe(&mut server, DI1_MEDIUM);
    let _unsubscribe = mock_unsubscribe(&mut server, 1);

    let descriptors = vec![ResourceDescriptor::io_signal("DI1")];
    let connector = ScriptedConnector::new(vec![
        Ok(FrameRead::Idle),
        Ok(FrameRead::Frame(WebSocketFrame::new(0x89, ""))),
    ]);
    let mut session = open_session(&server, &descriptors, connector);

    let mut events = Vec::new();
    assert_eq!(
        session.receive(&mut recorder(&mut events)).unwrap(),
        ReceiveOutcome::Idle
    );
    assert_eq!(
        session.receive(&mut recorder(&mut events)).unwrap(),
        ReceiveOutcome::Idle
    );
    assert_eq!(session.state(), SessionState::Active);
}

#[test]
fn test_close_handle_stops_running_session() {
    let mut server = Server::new();
    let _subscribe = mock_subscribe(&mut server, DI1_MEDIUM);
    let unsubscribe = mock_unsubscribe(&mut server, 1);

    let descriptors = vec![ResourceDescriptor::io_signal("DI1")];
    let connector = ScriptedConnector::new(vec![signal_frame("DI1", "1")]);
    let mut session = open_session(&server, &descriptors, connector.clone());

    let handle = session.close_handle();
    let closer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        handle.request_close();
    });

    let mut events = Vec::new();
    session.run(&mut recorder(&mut events)).unwrap();
    closer.join().unwrap();

    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(events.len(), 1);
    unsubscribe.assert();
    assert_eq!(connector.closes(), 1);
}

#[test]
fn test_update_replaces_resources() {
    let mut server = Server::new();
    let _subscribe = mock_subscribe(&mut server, DI1_MEDIUM);
    let update = server
        .mock("PUT", "/subscription/1")
        .match_body("resources=0&0=%2Frw%2Fiosystem%2Fsignals%2FDI2%3Bstate&0-p=2")
        .with_status(200)
        .expect(1)
        .create();
    let _unsubscribe = mock_unsubscribe(&mut server, 1);

    let descriptors = vec![ResourceDescriptor::io_signal("DI1")];
    let replacement = vec![ResourceDescriptor::io_signal("DI2")];
    let connector = ScriptedConnector::new(vec![signal_frame("DI1", "1"), signal_frame("DI2", "1")]);
    let mut session = open_session(&server, &descriptors, connector);

    let mut set = SubscriptionSet::new();
    set.add_io_signal("DI2", SubscriptionPriority::High);
    session
        .update(&set, Dispatcher::from_descriptors(&replacement))
        .unwrap();
    update.assert();

    let mut events = Vec::new();
    assert_eq!(
        session.receive(&mut recorder(&mut events)).unwrap(),
        ReceiveOutcome::Delivered(0)
    );
    assert_eq!(
        session.receive(&mut recorder(&mut events)).unwrap(),
        ReceiveOutcome::Delivered(1)
    );
    assert_eq!(
        events,
        vec![Event::IoSignalState {
            signal: "DI2".to_string(),
            value: "1".to_string()
        }]
    );
}

#[test]
fn test_failed_update_keeps_previous_routing() {
    let mut server = Server::new();
    let _subscribe = mock_subscribe(&mut server, DI1_MEDIUM);
    let _update = server.mock("PUT", "/subscription/1").with_status(400).create();
    let _unsubscribe = mock_unsubscribe(&mut server, 1);

    let descriptors = vec![ResourceDescriptor::io_signal("DI1")];
    let replacement = vec![ResourceDescriptor::io_signal("DI2")];
    let connector = ScriptedConnector::new(vec![signal_frame("DI1", "1")]);
    let mut session = open_session(&server, &descriptors, connector);

    let mut set = SubscriptionSet::new();
    set.add_io_signal("DI2", SubscriptionPriority::Low);
    let error = session
        .update(&set, Dispatcher::from_descriptors(&replacement))
        .unwrap_err();
    assert!(matches!(error, SessionError::Update(ApiError::Protocol(_))));
    assert!(!error.is_terminal());
    assert_eq!(session.state(), SessionState::Active);

    let mut events = Vec::new();
    assert_eq!(
        session.receive(&mut recorder(&mut events)).unwrap(),
        ReceiveOutcome::Delivered(1)
    );
    assert_eq!(session.dispatcher().len(), 1);
}

#[test]
fn test_detach_leaves_group_on_controller() {
    let mut server = Server::new();
    let _subscribe = mock_subscribe(&mut server, DI1_MEDIUM);
    let unsubscribe = mock_unsubscribe(&mut server, 0);

    let descriptors = vec![ResourceDescriptor::io_signal("DI1")];
    let connector = ScriptedConnector::new(Vec::new());
    {
        let mut session = open_session(&server, &descriptors, connector.clone());
        assert_eq!(session.detach(), Some("1".to_string()));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.detach(), None);
    }

    unsubscribe.assert();
    assert_eq!(connector.closes(), 1);
}

#[test]
fn test_builder_opens_session() {
    let mut server = Server::new();
    let subscribe = mock_subscribe(
        &mut server,
        "resources=0&0=%2Frw%2Fiosystem%2Fsignals%2FDI1%3Bstate&0-p=1\
         &resources=1&1=%2Frw%2Felog%2F0&1-p=0",
    );
    let _unsubscribe = mock_unsubscribe(&mut server, 1);

    let di1 = ResourceDescriptor::io_signal("DI1");
    let elog = ResourceDescriptor::elog_domain(0);
    let connector = ScriptedConnector::new(vec![Ok(FrameRead::Frame(WebSocketFrame::text(
        r#"<ul><li class="elog-message-ev" title="Motors on"><a href="/rw/elog/0/42" rel="self"/></li></ul>"#,
    )))]);

    let mut session = SessionBuilder::new()
        .subscribe(&di1, SubscriptionPriority::Medium)
        .subscribe(&elog, SubscriptionPriority::Low)
        .options(SessionOptions::default().with_poll_interval(Duration::from_millis(10)))
        .open_with(client_for(&server), connector)
        .unwrap();
    subscribe.assert();

    let mut received = Vec::new();
    session
        .receive(&mut |resource: &ResourceDescriptor, event: Event| {
            received.push((resource.uri(), event))
        })
        .unwrap();

    assert_eq!(
        received,
        vec![(
            "/rw/elog/0".to_string(),
            Event::Elog {
                domain: 0,
                sequence_number: 42,
                payload: "Motors on".to_string()
            }
        )]
    );
    assert_eq!(session.options().poll_interval, Duration::from_millis(10));
}
