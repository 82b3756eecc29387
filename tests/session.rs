use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use dolly_forwarder::nfc::{
    HostError, InvalidationReason, NdefMessage, NdefRecord, NdefStatus, SessionEvent, SessionHost, SessionMode,
    SessionOperation, SessionOutcome, SessionState, TagSession, TagStatus,
};
use dolly_forwarder::{Forwarder, SessionPrompts, WriteLocation};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Begin(SessionMode, String),
    AlertMessage(String),
    Connect(u32),
    QueryStatus(u32),
    ReadMessage(u32),
    WriteMessage(u32, NdefMessage),
    RestartPolling(Duration),
    Invalidate(Option<String>),
}

/// Records every request; the test feeds the completions.
#[derive(Clone)]
struct RecordingHost {
    available: bool,
    calls: Rc<RefCell<Vec<Call>>>,
}

impl RecordingHost {
    fn new() -> Self {
        RecordingHost {
            available: true,
            calls: Rc::default(),
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl SessionHost for RecordingHost {
    type Tag = u32;

    fn reading_available(&self) -> bool {
        self.available
    }

    fn begin(&mut self, mode: SessionMode, prompt: &str) {
        self.record(Call::Begin(mode, prompt.to_string()));
    }

    fn set_alert_message(&mut self, message: &str) {
        self.record(Call::AlertMessage(message.to_string()));
    }

    fn connect(&mut self, tag: &u32) {
        self.record(Call::Connect(*tag));
    }

    fn query_status(&mut self, tag: &u32) {
        self.record(Call::QueryStatus(*tag));
    }

    fn read_message(&mut self, tag: &u32) {
        self.record(Call::ReadMessage(*tag));
    }

    fn write_message(&mut self, tag: &u32, message: NdefMessage) {
        self.record(Call::WriteMessage(*tag, message));
    }

    fn restart_polling(&mut self, delay: Duration) {
        self.record(Call::RestartPolling(delay));
    }

    fn invalidate(&mut self, message: Option<&str>) {
        self.record(Call::Invalidate(message.map(str::to_string)));
    }
}

type Alerts = Rc<RefCell<Vec<(String, String)>>>;

fn alert_log() -> (Alerts, impl FnMut(&str, &str) + 'static) {
    let alerts: Alerts = Rc::default();
    let sink = alerts.clone();
    (alerts, move |title: &str, message: &str| {
        sink.borrow_mut().push((title.to_string(), message.to_string()))
    })
}

fn read_write() -> TagStatus {
    TagStatus {
        ndef: NdefStatus::ReadWrite,
        capacity: 492,
    }
}

fn write_session(host: &RecordingHost, payload: Vec<u8>) -> (TagSession<RecordingHost>, Alerts) {
    let (alerts, sink) = alert_log();
    let session = TagSession::new(
        host.clone(),
        SessionOperation::write(move || Ok(payload.clone())),
        sink,
        SessionPrompts::default(),
    );
    (session, alerts)
}

/// Drive a session up to the status query on tag 7.
fn connect(session: &mut TagSession<RecordingHost>) {
    session.start();
    session.handle(SessionEvent::TagsDetected(vec![7]));
    assert_eq!(session.state(), SessionState::Connecting);
    session.handle(SessionEvent::Connected(Ok(())));
    assert_eq!(session.state(), SessionState::QueryingStatus);
}

#[test]
fn write_happy_path() {
    let host = RecordingHost::new();
    let (mut session, alerts) = write_session(&host, vec![1, 1, 48, 40, 0, 0, 0, b'A']);
    connect(&mut session);
    session.handle(SessionEvent::StatusQueried(Ok(read_write())));
    assert_eq!(session.state(), SessionState::Writing);
    session.handle(SessionEvent::MessageWritten(Ok(())));

    assert_eq!(session.state(), SessionState::Completed);
    assert!(session.host().is_none());
    assert!(alerts.borrow().is_empty());
    assert_eq!(
        host.calls(),
        vec![
            Call::Begin(SessionMode::Write, SessionPrompts::default().write),
            Call::Connect(7),
            Call::QueryStatus(7),
            Call::WriteMessage(7, NdefMessage::new(NdefRecord::dolly(vec![1, 1, 48, 40, 0, 0, 0, b'A']))),
            Call::Invalidate(Some("Write NDEF message successful.".to_string())),
        ]
    );
}

#[test]
fn collisions_restart_polling_each_time() {
    let host = RecordingHost::new();
    let (mut session, alerts) = write_session(&host, vec![0; 7]);
    session.start();

    for _ in 0..3 {
        session.handle(SessionEvent::TagsDetected(vec![1, 2]));
        assert_eq!(session.state(), SessionState::Polling);
    }
    session.handle(SessionEvent::TagsDetected(vec![]));
    assert_eq!(session.state(), SessionState::Polling);

    let calls = host.calls();
    let restarts = calls
        .iter()
        .filter(|call| **call == Call::RestartPolling(Duration::from_millis(500)))
        .count();
    assert_eq!(restarts, 3);
    assert!(!calls.iter().any(|call| matches!(call, Call::Connect(_))));
    assert!(calls.contains(&Call::AlertMessage(
        "More than 1 tag is detected, please remove all tags and try again.".to_string()
    )));
    assert!(alerts.borrow().is_empty());

    session.handle(SessionEvent::TagsDetected(vec![9]));
    assert_eq!(session.state(), SessionState::Connecting);
    assert_eq!(host.calls().last(), Some(&Call::Connect(9)));
}

#[test]
fn write_is_refused_by_tag_status() {
    let cases = [
        (NdefStatus::ReadOnly, "Tag is read only."),
        (NdefStatus::NotSupported, "Tag is not NDEF compliant."),
        (NdefStatus::Unrecognized(9), "Unknown NDEF tag status."),
    ];
    for (ndef, status) in cases {
        let host = RecordingHost::new();
        let (mut session, alerts) = write_session(&host, vec![0; 7]);
        connect(&mut session);
        session.handle(SessionEvent::StatusQueried(Ok(TagStatus { ndef, capacity: 492 })));

        assert_eq!(session.state(), SessionState::Invalidated);
        assert_eq!(alerts.borrow().len(), 1);
        assert_eq!(alerts.borrow()[0].1, status);
        let calls = host.calls();
        assert!(!calls.iter().any(|call| matches!(call, Call::WriteMessage(..))));
        assert_eq!(calls.last(), Some(&Call::Invalidate(Some(status.to_string()))));
    }
}

#[test]
fn read_is_gated_only_on_ndef_support() {
    let host = RecordingHost::new();
    let (alerts, sink) = alert_log();
    let mut session = TagSession::new(
        host.clone(),
        SessionOperation::read(|_| panic!("nothing to read")),
        sink,
        SessionPrompts::default(),
    );
    connect(&mut session);
    session.handle(SessionEvent::StatusQueried(Ok(TagStatus {
        ndef: NdefStatus::NotSupported,
        capacity: 0,
    })));

    assert_eq!(session.state(), SessionState::Invalidated);
    assert_eq!(
        *alerts.borrow(),
        vec![(
            "Tag is not NDEF compliant".to_string(),
            "Tag is not NDEF compliant.".to_string()
        )]
    );
    let calls = host.calls();
    assert!(!calls.iter().any(|call| matches!(call, Call::ReadMessage(_))));
    assert_eq!(
        calls.last(),
        Some(&Call::Invalidate(Some("Tag is not NDEF compliant.".to_string())))
    );

    let host = RecordingHost::new();
    let (alerts, sink) = alert_log();
    let mut session = TagSession::new(
        host.clone(),
        SessionOperation::read(|_| {}),
        sink,
        SessionPrompts::default(),
    );
    connect(&mut session);
    session.handle(SessionEvent::StatusQueried(Ok(TagStatus {
        ndef: NdefStatus::Unrecognized(9),
        capacity: 0,
    })));

    assert_eq!(session.state(), SessionState::Reading);
    assert!(alerts.borrow().is_empty());
    assert_eq!(host.calls().last(), Some(&Call::ReadMessage(7)));
}

#[test]
fn connect_failure_invalidates() {
    let host = RecordingHost::new();
    let (mut session, alerts) = write_session(&host, vec![0; 7]);
    session.start();
    session.handle(SessionEvent::TagsDetected(vec![7]));
    session.handle(SessionEvent::Connected(Err(HostError::ConnectionLost)));

    assert_eq!(session.state(), SessionState::Invalidated);
    assert_eq!(
        *alerts.borrow(),
        vec![(
            "Error connecting to tag".to_string(),
            "Unable to connect to tag. tag connection lost".to_string()
        )]
    );
    assert_eq!(
        host.calls().last(),
        Some(&Call::Invalidate(Some("Unable to connect to tag.".to_string())))
    );
}

#[test]
fn status_query_failure_invalidates() {
    let host = RecordingHost::new();
    let (mut session, alerts) = write_session(&host, vec![0; 7]);
    connect(&mut session);
    session.handle(SessionEvent::StatusQueried(Err(HostError::Timeout)));

    assert_eq!(session.state(), SessionState::Invalidated);
    assert_eq!(alerts.borrow().len(), 1);
    assert_eq!(
        host.calls().last(),
        Some(&Call::Invalidate(Some("Unable to query NDEF status of tag.".to_string())))
    );
}

#[test]
fn too_small_tag_is_not_written() {
    let host = RecordingHost::new();
    let (mut session, alerts) = write_session(&host, vec![0x41; 64]);
    connect(&mut session);
    session.handle(SessionEvent::StatusQueried(Ok(TagStatus {
        ndef: NdefStatus::ReadWrite,
        capacity: 45,
    })));

    assert_eq!(session.state(), SessionState::Invalidated);
    assert_eq!(alerts.borrow()[0].0, "Tag is too small");
    assert!(!host.calls().iter().any(|call| matches!(call, Call::WriteMessage(..))));
}

#[test]
fn write_failure_completes_with_failure() {
    let host = RecordingHost::new();
    let (mut session, alerts) = write_session(&host, vec![0; 7]);
    connect(&mut session);
    session.handle(SessionEvent::StatusQueried(Ok(read_write())));
    session.handle(SessionEvent::MessageWritten(Err(HostError::Transmit("CRC".to_string()))));

    assert_eq!(session.state(), SessionState::Completed);
    let message = "Write NDEF message fail: tag communication failed: CRC".to_string();
    assert_eq!(*alerts.borrow(), vec![("Write failed".to_string(), message.clone())]);
    assert_eq!(
        session.outcome(),
        Some(&SessionOutcome::Failed {
            title: "Write failed".to_string(),
            message: message.clone()
        })
    );
    assert_eq!(host.calls().last(), Some(&Call::Invalidate(Some(message))));
}

#[test]
fn read_hands_over_payload_once() {
    let host = RecordingHost::new();
    let (alerts, sink) = alert_log();
    let reads = Rc::new(RefCell::new(Vec::new()));
    let seen = reads.clone();
    let mut session = TagSession::new(
        host.clone(),
        SessionOperation::read(move |payload| seen.borrow_mut().push(payload)),
        sink,
        SessionPrompts::default(),
    );
    connect(&mut session);
    // Read-only tags can still be read.
    session.handle(SessionEvent::StatusQueried(Ok(TagStatus {
        ndef: NdefStatus::ReadOnly,
        capacity: 0,
    })));
    assert_eq!(session.state(), SessionState::Reading);
    session.handle(SessionEvent::MessageRead(Ok(Some(NdefMessage::new(NdefRecord::dolly(vec![
        1, 2, 3,
    ]))))));
    // Ignored once finished.
    session.handle(SessionEvent::MessageRead(Ok(Some(NdefMessage::new(NdefRecord::dolly(vec![
        4,
    ]))))));

    assert_eq!(session.state(), SessionState::Completed);
    assert_eq!(*reads.borrow(), vec![vec![1, 2, 3]]);
    assert!(alerts.borrow().is_empty());
    assert_eq!(host.calls()[0], Call::Begin(SessionMode::Read, SessionPrompts::default().read));
    assert_eq!(
        host.calls().last(),
        Some(&Call::Invalidate(Some("Found 1 NDEF message".to_string())))
    );
}

#[test]
fn empty_read_is_a_failure() {
    for result in [Ok(None), Ok(Some(NdefMessage::empty())), Err(HostError::ConnectionLost)] {
        let host = RecordingHost::new();
        let (alerts, sink) = alert_log();
        let mut session = TagSession::new(
            host.clone(),
            SessionOperation::read(|_| panic!("nothing to read")),
            sink,
            SessionPrompts::default(),
        );
        connect(&mut session);
        session.handle(SessionEvent::StatusQueried(Ok(read_write())));
        session.handle(SessionEvent::MessageRead(result));

        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(alerts.borrow().len(), 1);
        assert_eq!(alerts.borrow()[0].0, "Fail to read NDEF from tag");
    }
}

#[test]
fn benign_invalidation_is_silent() {
    for reason in [InvalidationReason::FirstTagRead, InvalidationReason::UserCanceled] {
        let host = RecordingHost::new();
        let (mut session, alerts) = write_session(&host, vec![0; 7]);
        session.start();
        session.handle(SessionEvent::Invalidated(reason.clone()));

        assert_eq!(session.state(), SessionState::Invalidated);
        assert!(alerts.borrow().is_empty());
        assert_eq!(session.outcome(), Some(&SessionOutcome::Ended(reason)));
        // The host already ended the session.
        assert!(!host.calls().iter().any(|call| matches!(call, Call::Invalidate(_))));
    }
}

#[test]
fn other_invalidation_alerts_once() {
    let host = RecordingHost::new();
    let (mut session, alerts) = write_session(&host, vec![0; 7]);
    connect(&mut session);
    session.handle(SessionEvent::Invalidated(InvalidationReason::Timeout));
    session.handle(SessionEvent::Invalidated(InvalidationReason::Timeout));

    assert_eq!(session.state(), SessionState::Invalidated);
    assert_eq!(
        *alerts.borrow(),
        vec![("Session Invalidated".to_string(), "Session timeout".to_string())]
    );
}

#[test]
fn unavailable_reader_never_begins() {
    let mut host = RecordingHost::new();
    host.available = false;
    let (mut session, alerts) = write_session(&host, vec![0; 7]);
    session.start();

    assert_eq!(session.state(), SessionState::Invalidated);
    assert!(host.calls().is_empty());
    assert_eq!(
        *alerts.borrow(),
        vec![(
            "Permissions Issue".to_string(),
            "NFC not available on this device".to_string()
        )]
    );
}

#[test]
fn forwarder_writes_the_latest_scan() {
    let host = RecordingHost::new();
    let forwarder = Forwarder::default();
    let (alerts, sink) = alert_log();
    let mut session = forwarder.write_session(host.clone(), WriteLocation::Hitch, sink);
    connect(&mut session);

    // Scanned after the session started but before the tag was ready.
    forwarder.scan("SEA-48X40-2-000777");
    session.handle(SessionEvent::StatusQueried(Ok(read_write())));

    let expected = forwarder.dolly().payload(WriteLocation::Hitch).unwrap();
    assert_eq!(&expected[..4], &[0x01, 2, 48, 40]);
    assert!(host
        .calls()
        .contains(&Call::WriteMessage(7, NdefMessage::new(NdefRecord::dolly(expected)))));
    assert!(alerts.borrow().is_empty());
}

#[test]
fn forwarder_without_scan_has_nothing_to_write() {
    let host = RecordingHost::new();
    let forwarder = Forwarder::default();
    let (alerts, sink) = alert_log();
    let mut session = forwarder.write_session(host.clone(), WriteLocation::Handlebar, sink);
    connect(&mut session);
    session.handle(SessionEvent::StatusQueried(Ok(read_write())));

    assert_eq!(session.state(), SessionState::Invalidated);
    assert_eq!(alerts.borrow()[0].0, "Nothing to write");
    assert!(!host.calls().iter().any(|call| matches!(call, Call::WriteMessage(..))));
}

#[test]
fn forwarder_keeps_last_read() {
    let host = RecordingHost::new();
    let forwarder = Forwarder::default();
    let payload = dolly_forwarder::Dolly::parse("SEA-48X40-4-000123")
        .payload(WriteLocation::Handlebar)
        .unwrap();

    let (_, sink) = alert_log();
    let mut session = forwarder.read_session(host.clone(), sink);
    connect(&mut session);
    session.handle(SessionEvent::StatusQueried(Ok(read_write())));
    session.handle(SessionEvent::MessageRead(Ok(Some(NdefMessage::new(NdefRecord::dolly(
        payload.clone(),
    ))))));

    let readout = forwarder.last_read().unwrap();
    assert_eq!(readout.payload(), &payload[..]);
    assert_eq!(readout.location_code(), Some(0x02));
    assert!(readout.error().is_none());
}
