use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::config::ForwarderConfig;
use crate::dolly::{Dolly, WriteLocation};
use crate::nfc::host::{SessionHost, StatusSink};
use crate::nfc::session::{SessionOperation, TagSession};
use crate::payload;

/// What the UI shows for the current dolly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DollyInfo {
    raw_identifier: String,
    prefix: String,
    serial: String,
    category: String,
    category_code: u8,
    length: u32,
    width: u32,
    encodable: bool,
}

impl From<&Dolly> for DollyInfo {
    fn from(dolly: &Dolly) -> Self {
        DollyInfo {
            raw_identifier: dolly.raw_identifier().to_string(),
            prefix: dolly.prefix().to_string(),
            serial: dolly.serial().to_string(),
            category: dolly.category().name().to_string(),
            category_code: dolly.category().code(),
            length: dolly.length(),
            width: dolly.width(),
            encodable: dolly.is_encodable(),
        }
    }
}

/// Result of the last read session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagReadout {
    payload: Vec<u8>,
    location_code: Option<u8>,
    location: Option<String>,
    dolly: Option<DollyInfo>,
    error: Option<String>,
}

impl TagReadout {
    fn from_payload(payload: Vec<u8>) -> Self {
        match payload::decode(&payload) {
            Ok(decoded) => TagReadout {
                location_code: Some(decoded.location_code()),
                location: decoded.location().map(|location| location.name().to_string()),
                dolly: Some(DollyInfo::from(decoded.dolly())),
                error: None,
                payload,
            },
            Err(err) => {
                tracing::warn!(error = %err, len = payload.len(), "tag payload is not a dolly payload");
                TagReadout {
                    location_code: None,
                    location: None,
                    dolly: None,
                    error: Some(err.to_string()),
                    payload,
                }
            }
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn location_code(&self) -> Option<u8> {
        self.location_code
    }

    /// Name of the stored location, `None` for codes this build does not know.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn dolly(&self) -> Option<&DollyInfo> {
        self.dolly.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

#[derive(Default)]
struct ForwarderState {
    dolly: Dolly,
    last_read: Option<TagReadout>,
}

/// Scan and tag commands for the UI.
///
/// Write sessions ask for the payload only once the tag is ready, so a scan
/// made while the session is polling is the one that gets written.
pub struct Forwarder {
    config: ForwarderConfig,
    state: Rc<RefCell<ForwarderState>>,
}

impl Forwarder {
    pub fn new(config: ForwarderConfig) -> Self {
        Forwarder {
            config,
            state: Rc::default(),
        }
    }

    pub fn scan(&self, input: &str) -> DollyInfo {
        let dolly = Dolly::parse(input);
        tracing::info!(
            identifier = dolly.raw_identifier(),
            encodable = dolly.is_encodable(),
            "scanned dolly"
        );
        let info = DollyInfo::from(&dolly);
        self.state.borrow_mut().dolly = dolly;
        info
    }

    pub fn clear(&self) {
        tracing::debug!("clearing scanned dolly");
        self.state.borrow_mut().dolly = Dolly::empty();
    }

    pub fn dolly(&self) -> Dolly {
        self.state.borrow().dolly.clone()
    }

    pub fn snapshot(&self) -> DollyInfo {
        DollyInfo::from(&self.state.borrow().dolly)
    }

    pub fn write_session<H: SessionHost>(
        &self,
        host: H,
        location: WriteLocation,
        alerts: impl StatusSink + 'static,
    ) -> TagSession<H> {
        let state = Rc::clone(&self.state);
        let operation = SessionOperation::write(move || state.borrow().dolly.payload(location));
        TagSession::new(host, operation, alerts, self.config.prompts.clone())
    }

    pub fn read_session<H: SessionHost>(&self, host: H, alerts: impl StatusSink + 'static) -> TagSession<H> {
        let state = Rc::clone(&self.state);
        let operation = SessionOperation::read(move |payload| {
            state.borrow_mut().last_read = Some(TagReadout::from_payload(payload));
        });
        TagSession::new(host, operation, alerts, self.config.prompts.clone())
    }

    pub fn last_read(&self) -> Option<TagReadout> {
        self.state.borrow().last_read.clone()
    }
}

impl Default for Forwarder {
    fn default() -> Self {
        Self::new(ForwarderConfig::default())
    }
}
