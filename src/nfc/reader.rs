//! Session host over contactless readers that speak APDUs.
//!
//! [`CardHost`] turns the fire-and-forget requests of a [`TagSession`]
//! into blocking calls on a [`TagReader`] and queues the results as
//! events. [`run_session`] pumps those events until the session ends.

use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;

use super::card_trait::NfcCard;
use super::host::{HostError, InvalidationReason, SessionEvent, SessionHost, SessionMode};
use super::ndef::NdefMessage;
use super::session::TagSession;
use super::type2::Type2Tag;
use crate::config::ReaderConfig;

/// A card seen in a reader's field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagHandle {
    pub reader: String,
    pub atr: Vec<u8>,
}

pub trait TagReader {
    type Card: NfcCard;

    fn is_available(&self) -> bool;

    /// Cards currently in the field of any usable reader.
    fn present_tags(&mut self) -> Result<Vec<TagHandle>>;

    fn connect(&mut self, tag: &TagHandle) -> Result<Self::Card>;
}

pub struct CardHost<R: TagReader> {
    reader: R,
    config: ReaderConfig,
    tag: Option<Type2Tag<R::Card>>,
    uid: Option<Vec<u8>>,
    events: VecDeque<SessionEvent<TagHandle>>,
    polling: bool,
    resume_at: Option<Instant>,
    started: Option<Instant>,
    alert_message: Option<String>,
    final_message: Option<String>,
    ended: bool,
}

impl<R: TagReader> CardHost<R> {
    pub fn new(reader: R, config: ReaderConfig) -> Self {
        CardHost {
            reader,
            config,
            tag: None,
            uid: None,
            events: VecDeque::new(),
            polling: false,
            resume_at: None,
            started: None,
            alert_message: None,
            final_message: None,
            ended: false,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval()
    }

    pub fn alert_message(&self) -> Option<&str> {
        self.alert_message.as_deref()
    }

    pub fn final_message(&self) -> Option<&str> {
        self.final_message.as_deref()
    }

    /// UID of the connected tag, when the reader could report it.
    pub fn tag_uid(&self) -> Option<&[u8]> {
        self.uid.as_deref()
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// End the session as if the operator dismissed it.
    pub fn cancel(&mut self) {
        if !self.ended {
            self.end();
            self.events.push_back(SessionEvent::Invalidated(InvalidationReason::UserCanceled));
        }
    }

    /// The next completion or detection, polling the reader when nothing is
    /// queued. `None` means there is nothing to report yet.
    pub fn next_event(&mut self) -> Option<SessionEvent<TagHandle>> {
        if let Some(event) = self.events.pop_front() {
            return Some(event);
        }
        if self.ended {
            return None;
        }

        if let Some(started) = self.started {
            if started.elapsed() >= self.config.session_timeout() {
                tracing::info!("session timed out");
                self.end();
                return Some(SessionEvent::Invalidated(InvalidationReason::Timeout));
            }
        }

        if !self.polling {
            return None;
        }
        if let Some(resume_at) = self.resume_at {
            if Instant::now() < resume_at {
                return None;
            }
            self.resume_at = None;
        }

        match self.reader.present_tags() {
            Ok(tags) if tags.is_empty() => None,
            Ok(tags) => {
                tracing::debug!(count = tags.len(), "tags in field");
                self.polling = false;
                Some(SessionEvent::TagsDetected(tags))
            }
            Err(err) => {
                let error = format!("{err:#}");
                tracing::warn!(%error, "reader stopped responding");
                self.end();
                Some(SessionEvent::Invalidated(InvalidationReason::ReaderUnavailable))
            }
        }
    }

    fn end(&mut self) {
        self.ended = true;
        self.polling = false;
        self.tag = None;
        self.uid = None;
    }

    fn with_tag<T>(&mut self, op: impl FnOnce(&Type2Tag<R::Card>) -> Result<T>) -> Result<T, HostError> {
        let tag = self.tag.as_ref().ok_or(HostError::ConnectionLost)?;
        op(tag).map_err(|err| HostError::Transmit(format!("{err:#}")))
    }
}

impl<R: TagReader> SessionHost for CardHost<R> {
    type Tag = TagHandle;

    fn reading_available(&self) -> bool {
        self.reader.is_available()
    }

    fn begin(&mut self, mode: SessionMode, prompt: &str) {
        tracing::info!(?mode, prompt, "polling for tags");
        self.polling = true;
        self.started = Some(Instant::now());
    }

    fn set_alert_message(&mut self, message: &str) {
        tracing::info!(alert = message, "session alert");
        self.alert_message = Some(message.to_string());
    }

    fn connect(&mut self, tag: &TagHandle) {
        let result = match self.reader.connect(tag) {
            Ok(card) => {
                let card = Type2Tag::new(card);
                // Not every reader answers GET DATA; the session goes on without it.
                self.uid = match card.read_uid() {
                    Ok(uid) => Some(uid),
                    Err(err) => {
                        tracing::debug!(error = %err, "tag UID unavailable");
                        None
                    }
                };
                tracing::debug!(reader = %tag.reader, atr = ?tag.atr, uid = ?self.uid, "connected to tag");
                self.tag = Some(card);
                Ok(())
            }
            Err(err) => Err(HostError::Transmit(format!("{err:#}"))),
        };
        self.events.push_back(SessionEvent::Connected(result));
    }

    fn query_status(&mut self, _tag: &TagHandle) {
        let result = self.with_tag(|tag| tag.status());
        self.events.push_back(SessionEvent::StatusQueried(result));
    }

    fn read_message(&mut self, _tag: &TagHandle) {
        let result = self.with_tag(|tag| tag.read_ndef());
        self.events.push_back(SessionEvent::MessageRead(result));
    }

    fn write_message(&mut self, _tag: &TagHandle, message: NdefMessage) {
        let result = self.with_tag(|tag| tag.write_ndef(&message));
        self.events.push_back(SessionEvent::MessageWritten(result));
    }

    fn restart_polling(&mut self, delay: Duration) {
        self.tag = None;
        self.uid = None;
        self.polling = true;
        self.resume_at = Some(Instant::now() + delay);
    }

    fn invalidate(&mut self, message: Option<&str>) {
        if let Some(message) = message {
            tracing::info!(status = message, "session closed");
        }
        self.final_message = message.map(str::to_string);
        self.end();
    }
}

/// Start `session` and block until it ends.
pub fn run_session<R: TagReader>(session: &mut TagSession<CardHost<R>>) {
    session.start();
    while !session.is_finished() {
        let Some(host) = session.host_mut() else {
            break;
        };
        let interval = host.poll_interval();
        match host.next_event() {
            Some(event) => session.handle(event),
            None => thread::sleep(interval),
        }
    }
}

#[cfg(feature = "pcsc")]
pub use self::pcsc_reader::PcscReader;

#[cfg(feature = "pcsc")]
mod pcsc_reader {
    use std::ffi::CString;
    use std::time::Duration;

    use anyhow::{Context, Result};
    use pcsc::{Card, Context as PcscContext, Protocols, ReaderState, Scope, ShareMode, State};

    use super::{TagHandle, TagReader};
    use crate::config::ReaderConfig;

    /// PC/SC readers, one card per reader.
    pub struct PcscReader {
        ctx: PcscContext,
        config: ReaderConfig,
    }

    impl PcscReader {
        pub fn new(config: ReaderConfig) -> Result<Self> {
            let ctx = PcscContext::establish(Scope::User).context("failed to establish PC/SC context")?;
            Ok(PcscReader { ctx, config })
        }

        pub fn list_readers(&self) -> Result<Vec<String>> {
            Ok(self
                .reader_names()?
                .into_iter()
                .map(|name| name.to_string_lossy().into_owned())
                .collect())
        }

        fn reader_names(&self) -> Result<Vec<CString>> {
            let names = self.ctx.list_readers_owned().context("failed to list readers")?;
            Ok(names
                .into_iter()
                .filter(|name| self.config.accepts(&name.to_string_lossy()))
                .collect())
        }
    }

    impl TagReader for PcscReader {
        type Card = Card;

        fn is_available(&self) -> bool {
            match self.list_readers() {
                Ok(readers) => !readers.is_empty(),
                Err(err) => {
                    let error = format!("{err:#}");
                    tracing::warn!(%error, "no PC/SC reader");
                    false
                }
            }
        }

        fn present_tags(&mut self) -> Result<Vec<TagHandle>> {
            let mut states: Vec<ReaderState> = self
                .reader_names()?
                .into_iter()
                .map(|name| ReaderState::new(name, State::UNAWARE))
                .collect();
            if states.is_empty() {
                anyhow::bail!("no reader connected");
            }

            match self.ctx.get_status_change(Duration::ZERO, &mut states) {
                Ok(()) => {}
                Err(pcsc::Error::Timeout) => return Ok(Vec::new()),
                Err(err) => return Err(err).context("failed to query reader status"),
            }

            Ok(states
                .iter()
                .filter(|state| {
                    let event = state.event_state();
                    event.contains(State::PRESENT) && !event.contains(State::MUTE)
                })
                .map(|state| TagHandle {
                    reader: state.name().to_string_lossy().into_owned(),
                    atr: state.atr().to_vec(),
                })
                .collect())
        }

        fn connect(&mut self, tag: &TagHandle) -> Result<Card> {
            let name = CString::new(tag.reader.as_str()).context("reader name contains NUL")?;
            self.ctx
                .connect(&name, ShareMode::Shared, Protocols::ANY)
                .with_context(|| format!("failed to connect to the tag on {}", tag.reader))
        }
    }
}
