//! Single tag read/write session.
//!
//! A [`TagSession`] drives one connect, status query, read or write, and
//! invalidate cycle on exactly one tag. It is fed [`SessionEvent`]s by its
//! host and reacts by issuing the next host request; it never blocks and
//! owns no thread. A session is used once: after it reaches
//! [`SessionState::Completed`] or [`SessionState::Invalidated`] the host
//! is dropped and further events are ignored. Retrying means building a new
//! session.

use std::time::Duration;

use super::host::{
    HostError, InvalidationReason, NdefStatus, SessionEvent, SessionHost, SessionMode, StatusSink, TagStatus,
};
use super::ndef::{NdefMessage, NdefRecord};
use crate::config::SessionPrompts;
use crate::payload::EncodeError;

/// Wait before polling again when several tags are in the field.
pub const COLLISION_RETRY_DELAY: Duration = Duration::from_millis(500);

pub const COLLISION_MESSAGE: &str = "More than 1 tag is detected, please remove all tags and try again.";

pub type PayloadSupplier = Box<dyn FnMut() -> Result<Vec<u8>, EncodeError>>;
pub type ReadConsumer = Box<dyn FnMut(Vec<u8>)>;

/// What to do with the tag once it is connected.
pub enum SessionOperation {
    /// Hand the payload of the first record to the consumer.
    Read(ReadConsumer),
    /// Ask the supplier for the payload when the tag is ready, not before.
    Write(PayloadSupplier),
}

impl SessionOperation {
    pub fn read(consumer: impl FnMut(Vec<u8>) + 'static) -> Self {
        SessionOperation::Read(Box::new(consumer))
    }

    pub fn write(supplier: impl FnMut() -> Result<Vec<u8>, EncodeError> + 'static) -> Self {
        SessionOperation::Write(Box::new(supplier))
    }

    pub fn mode(&self) -> SessionMode {
        match self {
            SessionOperation::Read(_) => SessionMode::Read,
            SessionOperation::Write(_) => SessionMode::Write,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Polling,
    TagDetected,
    Connecting,
    Connected,
    QueryingStatus,
    Reading,
    Writing,
    Completed,
    Invalidated,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Invalidated)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Succeeded { message: String },
    Failed { title: String, message: String },
    /// The host ended the session for a reason the operator need not see.
    Ended(InvalidationReason),
}

pub struct TagSession<H: SessionHost> {
    host: Option<H>,
    tag: Option<H::Tag>,
    operation: SessionOperation,
    alerts: Box<dyn StatusSink>,
    prompts: SessionPrompts,
    state: SessionState,
    outcome: Option<SessionOutcome>,
}

impl<H: SessionHost> TagSession<H> {
    pub fn new(
        host: H,
        operation: SessionOperation,
        alerts: impl StatusSink + 'static,
        prompts: SessionPrompts,
    ) -> Self {
        TagSession {
            host: Some(host),
            tag: None,
            operation,
            alerts: Box::new(alerts),
            prompts,
            state: SessionState::Idle,
            outcome: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// The host, until the session ends.
    pub fn host(&self) -> Option<&H> {
        self.host.as_ref()
    }

    pub fn host_mut(&mut self) -> Option<&mut H> {
        self.host.as_mut()
    }

    pub fn start(&mut self) {
        if self.state != SessionState::Idle {
            tracing::warn!(state = ?self.state, "session already started");
            return;
        }
        let Some(host) = self.host.as_mut() else {
            return;
        };

        if !host.reading_available() {
            tracing::warn!("NFC not available on this device");
            self.report("Permissions Issue", "NFC not available on this device");
            self.finish(SessionState::Invalidated);
            return;
        }

        let mode = self.operation.mode();
        let prompt = match mode {
            SessionMode::Read => &self.prompts.read,
            SessionMode::Write => &self.prompts.write,
        };
        tracing::info!(?mode, "starting tag session");
        host.begin(mode, prompt);
        self.transition(SessionState::Polling);
    }

    pub fn handle(&mut self, event: SessionEvent<H::Tag>) {
        if self.state.is_terminal() {
            tracing::debug!(event = event_name(&event), state = ?self.state, "ignoring event after session end");
            return;
        }

        match (self.state, event) {
            (_, SessionEvent::Invalidated(reason)) => self.on_invalidated(reason),
            (SessionState::Polling, SessionEvent::TagsDetected(tags)) => self.on_tags_detected(tags),
            (SessionState::Connecting, SessionEvent::Connected(result)) => self.on_connected(result),
            (SessionState::QueryingStatus, SessionEvent::StatusQueried(result)) => self.on_status(result),
            (SessionState::Reading, SessionEvent::MessageRead(result)) => self.on_read(result),
            (SessionState::Writing, SessionEvent::MessageWritten(result)) => self.on_written(result),
            (state, event) => {
                tracing::warn!(?state, event = event_name(&event), "unexpected session event");
            }
        }
    }

    fn on_tags_detected(&mut self, tags: Vec<H::Tag>) {
        if tags.len() > 1 {
            tracing::warn!(count = tags.len(), "more than one tag detected, restarting polling");
            if let Some(host) = self.host.as_mut() {
                host.set_alert_message(COLLISION_MESSAGE);
                host.restart_polling(COLLISION_RETRY_DELAY);
            }
            return;
        }

        let Some(tag) = tags.into_iter().next() else {
            tracing::debug!("detection reported no tags, still polling");
            return;
        };

        self.transition(SessionState::TagDetected);
        self.transition(SessionState::Connecting);
        if let Some(host) = self.host.as_mut() {
            host.connect(&tag);
        }
        self.tag = Some(tag);
    }

    fn on_connected(&mut self, result: Result<(), HostError>) {
        if let Err(err) = result {
            tracing::warn!(error = %err, "error connecting to tag");
            self.fail("Error connecting to tag", "Unable to connect to tag.", Some(&err));
            return;
        }

        self.transition(SessionState::Connected);
        self.transition(SessionState::QueryingStatus);
        if let (Some(host), Some(tag)) = (self.host.as_mut(), self.tag.as_ref()) {
            host.query_status(tag);
        }
    }

    fn on_status(&mut self, result: Result<TagStatus, HostError>) {
        let status = match result {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!(error = %err, "error querying tag");
                self.fail(
                    "Unable to query NDEF status of tag",
                    "Unable to query NDEF status of tag.",
                    Some(&err),
                );
                return;
            }
        };
        tracing::debug!(?status, "tag status");

        match (self.operation.mode(), status.ndef) {
            (_, NdefStatus::NotSupported) => {
                self.fail("Tag is not NDEF compliant", "Tag is not NDEF compliant.", None);
            }
            // Reading does not need write access.
            (SessionMode::Read, _) => {
                self.transition(SessionState::Reading);
                if let (Some(host), Some(tag)) = (self.host.as_mut(), self.tag.as_ref()) {
                    host.read_message(tag);
                }
            }
            (SessionMode::Write, NdefStatus::ReadWrite) => self.write(status.capacity),
            (SessionMode::Write, NdefStatus::ReadOnly) => {
                self.fail("Tag is read only", "Tag is read only.", None);
            }
            (SessionMode::Write, NdefStatus::Unrecognized(code)) => {
                tracing::warn!(code, "unknown NDEF tag status");
                self.fail("Unknown NDEF tag status", "Unknown NDEF tag status.", None);
            }
        }
    }

    fn write(&mut self, capacity: usize) {
        self.transition(SessionState::Writing);

        let SessionOperation::Write(supplier) = &mut self.operation else {
            return;
        };
        let payload = match supplier() {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, "no payload to write");
                self.fail("Nothing to write", &format!("Nothing to write: {err}."), None);
                return;
            }
        };

        let message = NdefMessage::new(NdefRecord::dolly(payload));
        let size = match message.to_bytes() {
            Ok(bytes) => bytes.len(),
            Err(err) => {
                self.fail("Nothing to write", &format!("Nothing to write: {err}."), None);
                return;
            }
        };
        // Zero means the host could not tell.
        if capacity != 0 && size > capacity {
            self.fail(
                "Tag is too small",
                &format!("Tag holds {capacity} bytes, the message needs {size}."),
                None,
            );
            return;
        }

        tracing::debug!(size, capacity, "writing NDEF message");
        if let (Some(host), Some(tag)) = (self.host.as_mut(), self.tag.as_ref()) {
            host.write_message(tag, message);
        }
    }

    fn on_written(&mut self, result: Result<(), HostError>) {
        match result {
            Ok(()) => {
                tracing::info!("write NDEF message successful");
                self.succeed("Write NDEF message successful.");
            }
            Err(err) => {
                tracing::warn!(error = %err, "write NDEF message failed");
                let message = format!("Write NDEF message fail: {err}");
                self.end_with_failure(SessionState::Completed, "Write failed", &message);
            }
        }
    }

    fn on_read(&mut self, result: Result<Option<NdefMessage>, HostError>) {
        let record = match result {
            Ok(message) => message.and_then(NdefMessage::into_record),
            Err(err) => {
                tracing::warn!(error = %err, "reading NDEF message failed");
                None
            }
        };

        let Some(record) = record else {
            self.end_with_failure(
                SessionState::Completed,
                "Fail to read NDEF from tag",
                "Fail to read NDEF from tag",
            );
            return;
        };

        if let SessionOperation::Read(consumer) = &mut self.operation {
            consumer(record.payload);
        }
        self.succeed("Found 1 NDEF message");
    }

    fn on_invalidated(&mut self, reason: InvalidationReason) {
        // The host has already ended the session, nothing to invalidate.
        self.tag = None;
        self.host = None;

        if reason.is_benign() {
            tracing::info!(%reason, "session ended");
            self.outcome = Some(SessionOutcome::Ended(reason));
        } else {
            let message = reason.to_string();
            tracing::warn!(reason = %message, "session invalidated");
            self.report("Session Invalidated", &message);
        }
        self.transition(SessionState::Invalidated);
    }

    fn succeed(&mut self, message: &str) {
        if let Some(host) = self.host.as_mut() {
            host.invalidate(Some(message));
        }
        self.outcome = Some(SessionOutcome::Succeeded {
            message: message.to_string(),
        });
        self.finish(SessionState::Completed);
    }

    /// Abort before the read or write happened.
    fn fail(&mut self, title: &str, status: &str, cause: Option<&HostError>) {
        let message = match cause {
            Some(cause) => format!("{status} {cause}"),
            None => status.to_string(),
        };
        if let Some(host) = self.host.as_mut() {
            host.invalidate(Some(status));
        }
        self.report(title, &message);
        self.finish(SessionState::Invalidated);
    }

    fn end_with_failure(&mut self, state: SessionState, title: &str, message: &str) {
        if let Some(host) = self.host.as_mut() {
            host.invalidate(Some(message));
        }
        self.report(title, message);
        self.finish(state);
    }

    fn report(&mut self, title: &str, message: &str) {
        self.alerts.alert(title, message);
        self.outcome = Some(SessionOutcome::Failed {
            title: title.to_string(),
            message: message.to_string(),
        });
    }

    fn finish(&mut self, state: SessionState) {
        self.tag = None;
        self.host = None;
        self.transition(state);
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(from = ?self.state, to = ?next, "session transition");
        self.state = next;
    }
}

fn event_name<T>(event: &SessionEvent<T>) -> &'static str {
    match event {
        SessionEvent::TagsDetected(_) => "tags-detected",
        SessionEvent::Connected(_) => "connected",
        SessionEvent::StatusQueried(_) => "status-queried",
        SessionEvent::MessageRead(_) => "message-read",
        SessionEvent::MessageWritten(_) => "message-written",
        SessionEvent::Invalidated(_) => "invalidated",
    }
}
