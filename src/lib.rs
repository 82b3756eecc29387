//! Parse dolly QR identifiers and forward them onto NFC tags.

pub mod commands;
pub mod config;
pub mod dolly;
pub mod nfc;
pub mod payload;

pub use commands::{DollyInfo, Forwarder, TagReadout};
pub use config::{ForwarderConfig, ReaderConfig, SessionPrompts};
pub use dolly::{Dolly, DollyCategory, WriteLocation};
pub use payload::{DecodeError, DecodedPayload, EncodeError};
