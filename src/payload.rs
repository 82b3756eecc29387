//! Binary layout of the dolly payload stored on a tag.
//!
//! ```text
//! 0        1          2       3      4..7       7..
//! location category   length  width  reserved   identifier (ASCII)
//! ```
//!
//! The reserved bytes are written as zero and ignored on read. The
//! identifier has no terminator; it runs to the end of the buffer.

use thiserror::Error;

use crate::dolly::{Dolly, DollyCategory, WriteLocation};

pub const HEADER_LEN: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("dolly identifier did not parse, nothing to write")]
    NotEncodable,
    #[error("identifier has a non-ASCII character at byte {index}")]
    NonAsciiIdentifier { index: usize },
    #[error("{field} {value} does not fit in one byte")]
    ValueOutOfRange { field: &'static str, value: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload is {len} bytes, header alone needs 7")]
    TooShort { len: usize },
    #[error("stored identifier has a non-ASCII byte at offset {index}")]
    NonAsciiIdentifier { index: usize },
}

/// Contents of a tag written by [`encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
    location_code: u8,
    dolly: Dolly,
}

impl DecodedPayload {
    /// Raw location byte, kept even when this build does not know it.
    pub fn location_code(&self) -> u8 {
        self.location_code
    }

    pub fn location(&self) -> Option<WriteLocation> {
        WriteLocation::from_code(self.location_code)
    }

    pub fn dolly(&self) -> &Dolly {
        &self.dolly
    }

    pub fn into_dolly(self) -> Dolly {
        self.dolly
    }
}

pub fn encode(dolly: &Dolly, location: WriteLocation) -> Result<Vec<u8>, EncodeError> {
    if !dolly.is_encodable() {
        return Err(EncodeError::NotEncodable);
    }

    let identifier = dolly.raw_identifier();
    if let Some(index) = identifier.bytes().position(|b| !b.is_ascii()) {
        return Err(EncodeError::NonAsciiIdentifier { index });
    }

    let length = byte_field("length", dolly.length())?;
    let width = byte_field("width", dolly.width())?;

    let mut data = Vec::with_capacity(HEADER_LEN + identifier.len());
    data.extend_from_slice(&[
        location.code(),
        dolly.category().code(),
        length,
        width,
        0,
        0,
        0,
    ]);
    data.extend_from_slice(identifier.as_bytes());

    tracing::debug!(
        %location,
        identifier,
        len = data.len(),
        "encoded dolly payload"
    );
    Ok(data)
}

pub fn decode(data: &[u8]) -> Result<DecodedPayload, DecodeError> {
    if data.len() < HEADER_LEN {
        return Err(DecodeError::TooShort { len: data.len() });
    }

    let trailer = &data[HEADER_LEN..];
    if let Some(index) = trailer.iter().position(|b| !b.is_ascii()) {
        return Err(DecodeError::NonAsciiIdentifier {
            index: HEADER_LEN + index,
        });
    }
    let identifier = String::from_utf8_lossy(trailer).into_owned();

    // Tags written by a newer encoder may carry categories we do not know.
    let category = DollyCategory::from_code(data[1]).unwrap_or_else(|| {
        tracing::debug!(code = data[1], "unknown category byte on tag");
        DollyCategory::Unknown
    });

    Ok(DecodedPayload {
        location_code: data[0],
        dolly: Dolly::from_wire(identifier, category, data[2], data[3]),
    })
}

fn byte_field(field: &'static str, value: u32) -> Result<u8, EncodeError> {
    u8::try_from(value).map_err(|_| EncodeError::ValueOutOfRange { field, value })
}
