//! Dolly records and the QR identifier parser.
//!
//! A dolly identifier looks like `SEA-48X40-3-000123`: prefix, dimensions
//! (length `X` width), category code and serial, optionally followed by
//! `:CODE`. The code segment is ignored.
//!
//! Parsing never fails. A wrong number of `-` or `X` segments produces a
//! record that cannot be written to a tag, while a bad category or
//! dimension value only degrades that field (to [`DollyCategory::Unknown`]
//! or `0`) and the record stays writable. Labels in the field rely on both
//! behaviours.

mod category;
mod location;

pub use category::DollyCategory;
pub use location::WriteLocation;

use std::num::IntErrorKind;

use crate::payload::{self, EncodeError};

pub const NO_SCAN: &str = "[NO SCAN]";
pub const NO_DATA: &str = "[NO DATA]";
pub const NO_ID: &str = "[NO ID]";
pub const INVALID_SEGMENTS: &str = "[INVALID SEGMENTS]";
pub const NO_SERIAL: &str = "[NONE]";

const CODE_DELIMITER: char = ':';
const SEGMENT_DELIMITER: char = '-';
const DIMENSION_DELIMITER: char = 'X';

/// One scanned dolly. Built once per scan and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dolly {
    raw_identifier: String,
    category: DollyCategory,
    length: u32,
    width: u32,
    prefix: String,
    serial: String,
    encodable: bool,
}

impl Dolly {
    /// The record shown before anything has been scanned, and after a clear.
    pub fn empty() -> Self {
        Dolly {
            raw_identifier: NO_SCAN.to_string(),
            category: DollyCategory::Unknown,
            length: 0,
            width: 0,
            prefix: NO_DATA.to_string(),
            serial: NO_ID.to_string(),
            encodable: false,
        }
    }

    fn invalid(raw_identifier: &str) -> Self {
        Dolly {
            raw_identifier: raw_identifier.to_string(),
            category: DollyCategory::Unknown,
            length: 0,
            width: 0,
            prefix: INVALID_SEGMENTS.to_string(),
            serial: NO_SERIAL.to_string(),
            encodable: false,
        }
    }

    /// Parse a scanned identifier. Total: every input yields a record.
    pub fn parse(input: &str) -> Self {
        if input.is_empty() {
            return Dolly::empty();
        }

        let identifier = input
            .split(CODE_DELIMITER)
            .find(|segment| !segment.is_empty())
            .unwrap_or("");

        let parts = segments(identifier, SEGMENT_DELIMITER);
        let [prefix, dims, category_code, serial] = parts[..] else {
            tracing::debug!(
                input,
                segments = parts.len(),
                "dolly identifier needs 4 '-' separated segments"
            );
            return Dolly::invalid(input);
        };

        let dimensions = segments(dims, DIMENSION_DELIMITER);
        let [length, width] = dimensions[..] else {
            tracing::debug!(input, dims, "dimensions need exactly one 'X' separator");
            return Dolly::invalid(input);
        };

        let category = category_code
            .parse::<u8>()
            .ok()
            .and_then(DollyCategory::from_code)
            .unwrap_or(DollyCategory::Unknown);

        let dolly = Dolly {
            raw_identifier: input.to_string(),
            category,
            length: dimension(length),
            width: dimension(width),
            prefix: prefix.to_string(),
            serial: serial.to_string(),
            encodable: true,
        };
        tracing::debug!(?dolly, "parsed dolly identifier");
        dolly
    }

    /// Rebuild a record from tag contents: the numeric fields come from the
    /// wire, prefix and serial from the stored identifier.
    pub(crate) fn from_wire(raw_identifier: String, category: DollyCategory, length: u8, width: u8) -> Self {
        let parsed = Dolly::parse(&raw_identifier);
        Dolly {
            raw_identifier,
            category,
            length: u32::from(length),
            width: u32::from(width),
            ..parsed
        }
    }

    pub fn raw_identifier(&self) -> &str {
        &self.raw_identifier
    }

    pub fn category(&self) -> DollyCategory {
        self.category
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn is_encodable(&self) -> bool {
        self.encodable
    }

    /// Tag payload for this dolly mounted at `location`.
    pub fn payload(&self, location: WriteLocation) -> Result<Vec<u8>, EncodeError> {
        payload::encode(self, location)
    }
}

impl Default for Dolly {
    fn default() -> Self {
        Dolly::empty()
    }
}

impl From<&str> for Dolly {
    fn from(input: &str) -> Self {
        Dolly::parse(input)
    }
}

// Text that is not a number reads as 0. Numbers too large for u32 saturate
// so the codec still refuses them.
fn dimension(text: &str) -> u32 {
    match text.parse::<u32>() {
        Ok(value) => value,
        Err(err) if *err.kind() == IntErrorKind::PosOverflow => u32::MAX,
        Err(_) => 0,
    }
}

// Empty pieces from doubled or dangling delimiters do not count as segments.
fn segments(text: &str, delimiter: char) -> Vec<&str> {
    text.split(delimiter).filter(|segment| !segment.is_empty()).collect()
}
