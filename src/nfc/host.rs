use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::ndef::NdefMessage;

/// What the session was started for. Hosts may use it to pick a prompt or
/// a polling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Read,
    Write,
}

/// NDEF capability of a connected tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NdefStatus {
    NotSupported,
    ReadOnly,
    ReadWrite,
    /// A status value this build does not know. Never written to.
    Unrecognized(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagStatus {
    pub ndef: NdefStatus,
    /// Usable NDEF bytes on the tag.
    pub capacity: usize,
}

/// Failure of a single host request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("tag connection lost")]
    ConnectionLost,
    #[error("tag did not answer in time")]
    Timeout,
    #[error("tag is not supported: {0}")]
    Unsupported(String),
    #[error("tag communication failed: {0}")]
    Transmit(String),
}

/// Why the host ended a session on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationReason {
    /// A single-read session finished normally.
    FirstTagRead,
    UserCanceled,
    Timeout,
    /// The device has no usable reader.
    ReaderUnavailable,
    Host(HostError),
}

impl InvalidationReason {
    /// Normal completion or cancellation, nothing to tell the operator.
    pub fn is_benign(&self) -> bool {
        matches!(self, InvalidationReason::FirstTagRead | InvalidationReason::UserCanceled)
    }
}

impl fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidationReason::FirstTagRead => f.write_str("Session ended after the first tag read"),
            InvalidationReason::UserCanceled => f.write_str("Session canceled by user"),
            InvalidationReason::Timeout => f.write_str("Session timeout"),
            InvalidationReason::ReaderUnavailable => f.write_str("NFC reader is not available"),
            InvalidationReason::Host(err) => write!(f, "{err}"),
        }
    }
}

/// Detections and completions delivered by a host to
/// [`TagSession::handle`](super::TagSession::handle).
#[derive(Debug)]
pub enum SessionEvent<T> {
    TagsDetected(Vec<T>),
    Connected(Result<(), HostError>),
    StatusQueried(Result<TagStatus, HostError>),
    MessageRead(Result<Option<NdefMessage>, HostError>),
    MessageWritten(Result<(), HostError>),
    Invalidated(InvalidationReason),
}

/// Platform contactless session.
///
/// Requests return immediately; the host reports the result later as a
/// [`SessionEvent`]. The controller never has more than one request
/// outstanding.
pub trait SessionHost {
    type Tag;

    fn reading_available(&self) -> bool;

    /// Start polling for tags, showing `prompt` to the operator.
    fn begin(&mut self, mode: SessionMode, prompt: &str);

    fn set_alert_message(&mut self, message: &str);

    fn connect(&mut self, tag: &Self::Tag);

    fn query_status(&mut self, tag: &Self::Tag);

    fn read_message(&mut self, tag: &Self::Tag);

    fn write_message(&mut self, tag: &Self::Tag, message: NdefMessage);

    /// Resume polling once `delay` has passed.
    fn restart_polling(&mut self, delay: Duration);

    /// End the session, optionally showing `message` as its final status.
    fn invalidate(&mut self, message: Option<&str>);
}

/// Where fatal and abnormal session conditions are reported.
pub trait StatusSink {
    fn alert(&mut self, title: &str, message: &str);
}

impl<F> StatusSink for F
where
    F: FnMut(&str, &str),
{
    fn alert(&mut self, title: &str, message: &str) {
        self(title, message)
    }
}
