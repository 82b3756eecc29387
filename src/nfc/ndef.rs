//! Single-record NDEF messages and the Type 2 tag TLV envelope.
//!
//! Dolly tags carry one NFC Forum well-known record of type `T` whose
//! payload is the raw dolly payload (not a Text record body: there is no
//! status byte or language code). Only the first record of a message is
//! looked at.

use thiserror::Error;

/// Record type of the dolly record.
pub const DOLLY_RECORD_TYPE: &[u8] = b"T";

const FLAG_MB: u8 = 0x80;
const FLAG_ME: u8 = 0x40;
const FLAG_CF: u8 = 0x20;
const FLAG_SR: u8 = 0x10;
const FLAG_IL: u8 = 0x08;
const TNF_MASK: u8 = 0x07;

const TLV_NULL: u8 = 0x00;
const TLV_NDEF: u8 = 0x03;
const TLV_TERMINATOR: u8 = 0xFE;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NdefError {
    #[error("NDEF record truncated: {0} missing")]
    Truncated(&'static str),
    #[error("chunked NDEF records are not supported")]
    Chunked,
    #[error("NDEF message of {0} bytes does not fit in a TLV")]
    TooLarge(usize),
    #[error("record type is {0} bytes, at most 255 allowed")]
    TypeTooLong(usize),
}

/// Type name format, the low three bits of the record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tnf {
    Empty,
    WellKnown,
    Media,
    AbsoluteUri,
    External,
    Unknown,
    Unchanged,
    Reserved,
}

impl Tnf {
    fn from_bits(bits: u8) -> Self {
        match bits & TNF_MASK {
            0x00 => Tnf::Empty,
            0x01 => Tnf::WellKnown,
            0x02 => Tnf::Media,
            0x03 => Tnf::AbsoluteUri,
            0x04 => Tnf::External,
            0x05 => Tnf::Unknown,
            0x06 => Tnf::Unchanged,
            _ => Tnf::Reserved,
        }
    }

    fn bits(self) -> u8 {
        match self {
            Tnf::Empty => 0x00,
            Tnf::WellKnown => 0x01,
            Tnf::Media => 0x02,
            Tnf::AbsoluteUri => 0x03,
            Tnf::External => 0x04,
            Tnf::Unknown => 0x05,
            Tnf::Unchanged => 0x06,
            Tnf::Reserved => 0x07,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdefRecord {
    pub tnf: Tnf,
    pub record_type: Vec<u8>,
    pub id: Vec<u8>,
    pub payload: Vec<u8>,
}

impl NdefRecord {
    pub fn well_known(record_type: &[u8], payload: Vec<u8>) -> Self {
        NdefRecord {
            tnf: Tnf::WellKnown,
            record_type: record_type.to_vec(),
            id: Vec::new(),
            payload,
        }
    }

    /// The record dolly tags are written with.
    pub fn dolly(payload: Vec<u8>) -> Self {
        Self::well_known(DOLLY_RECORD_TYPE, payload)
    }

    fn write_to(&self, flags: u8, out: &mut Vec<u8>) -> Result<(), NdefError> {
        let type_len =
            u8::try_from(self.record_type.len()).map_err(|_| NdefError::TypeTooLong(self.record_type.len()))?;
        let short = self.payload.len() < 256;

        let mut header = flags | self.tnf.bits();
        if short {
            header |= FLAG_SR;
        }
        if !self.id.is_empty() {
            header |= FLAG_IL;
        }

        out.push(header);
        out.push(type_len);
        if short {
            out.push(self.payload.len() as u8);
        } else {
            let len = u32::try_from(self.payload.len()).map_err(|_| NdefError::TooLarge(self.payload.len()))?;
            out.extend_from_slice(&len.to_be_bytes());
        }
        if !self.id.is_empty() {
            out.push(self.id.len() as u8);
        }
        out.extend_from_slice(&self.record_type);
        out.extend_from_slice(&self.id);
        out.extend_from_slice(&self.payload);
        Ok(())
    }
}

/// An NDEF message with at most one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NdefMessage {
    record: Option<NdefRecord>,
}

impl NdefMessage {
    pub fn new(record: NdefRecord) -> Self {
        NdefMessage { record: Some(record) }
    }

    pub fn empty() -> Self {
        NdefMessage { record: None }
    }

    pub fn record(&self) -> Option<&NdefRecord> {
        self.record.as_ref()
    }

    pub fn into_record(self) -> Option<NdefRecord> {
        self.record
    }

    pub fn is_empty(&self) -> bool {
        self.record.is_none()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, NdefError> {
        let mut out = Vec::new();
        match &self.record {
            Some(record) => record.write_to(FLAG_MB | FLAG_ME, &mut out)?,
            // Empty record: MB, ME, SR, TNF empty.
            None => out.extend_from_slice(&[FLAG_MB | FLAG_ME | FLAG_SR, 0x00, 0x00]),
        }
        Ok(out)
    }

    /// Parse the first record of `data`. Anything after it is ignored.
    pub fn parse(data: &[u8]) -> Result<Self, NdefError> {
        let mut cursor = Cursor { data, pos: 0 };

        let header = cursor.byte("header")?;
        if header & FLAG_CF != 0 {
            return Err(NdefError::Chunked);
        }
        let tnf = Tnf::from_bits(header);
        let type_len = cursor.byte("type length")? as usize;
        let payload_len = if header & FLAG_SR != 0 {
            cursor.byte("payload length")? as usize
        } else {
            let bytes = cursor.take(4, "payload length")?;
            u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
        };
        let id_len = if header & FLAG_IL != 0 {
            cursor.byte("id length")? as usize
        } else {
            0
        };

        let record_type = cursor.take(type_len, "type")?.to_vec();
        let id = cursor.take(id_len, "id")?.to_vec();
        let payload = cursor.take(payload_len, "payload")?.to_vec();

        if header & FLAG_ME == 0 {
            tracing::debug!("NDEF message has more than one record, using the first");
        }

        if tnf == Tnf::Empty {
            return Ok(NdefMessage::empty());
        }
        Ok(NdefMessage::new(NdefRecord {
            tnf,
            record_type,
            id,
            payload,
        }))
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn byte(&mut self, what: &'static str) -> Result<u8, NdefError> {
        Ok(self.take(1, what)?[0])
    }

    fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], NdefError> {
        let end = self.pos.checked_add(len).ok_or(NdefError::Truncated(what))?;
        let slice = self.data.get(self.pos..end).ok_or(NdefError::Truncated(what))?;
        self.pos = end;
        Ok(slice)
    }
}

/// Wrap an encoded NDEF message in an NDEF message TLV followed by a
/// terminator TLV, ready to be written from block 4 of a Type 2 tag.
pub fn wrap_tlv(message: &[u8]) -> Result<Vec<u8>, NdefError> {
    let mut tlv = Vec::with_capacity(message.len() + 5);
    tlv.push(TLV_NDEF);
    if message.len() < 0xFF {
        tlv.push(message.len() as u8);
    } else {
        let len = u16::try_from(message.len()).map_err(|_| NdefError::TooLarge(message.len()))?;
        tlv.push(0xFF);
        tlv.extend_from_slice(&len.to_be_bytes());
    }
    tlv.extend_from_slice(message);
    tlv.push(TLV_TERMINATOR);
    Ok(tlv)
}

/// Where the NDEF message TLV sits in a data area, if the area holds one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlvScan {
    /// A terminator TLV came before any NDEF TLV.
    Terminated,
    /// The bytes ran out between TLVs without an NDEF TLV.
    Absent,
    /// A TLV header or value runs past the bytes given.
    Incomplete { needed: usize },
    /// The message occupies `start..start + len`.
    Found { start: usize, len: usize },
}

/// Locate the NDEF message TLV in (a prefix of) the data area of a Type 2
/// tag.
pub fn scan_tlv(area: &[u8]) -> TlvScan {
    let mut i = 0;
    while i < area.len() {
        let tag = area[i];
        match tag {
            TLV_NULL => {
                i += 1;
                continue;
            }
            TLV_TERMINATOR => return TlvScan::Terminated,
            _ => {}
        }

        let Some(&first) = area.get(i + 1) else {
            return TlvScan::Incomplete { needed: i + 2 };
        };
        let (len, header) = if first == 0xFF {
            match (area.get(i + 2), area.get(i + 3)) {
                (Some(&hi), Some(&lo)) => (u16::from_be_bytes([hi, lo]) as usize, 4),
                _ => return TlvScan::Incomplete { needed: i + 4 },
            }
        } else {
            (first as usize, 2)
        };

        let start = i + header;
        if tag == TLV_NDEF {
            if start + len > area.len() {
                return TlvScan::Incomplete { needed: start + len };
            }
            return TlvScan::Found { start, len };
        }
        // Lock control, memory control and proprietary TLVs.
        i = start + len;
    }
    if i > area.len() {
        return TlvScan::Incomplete { needed: i };
    }
    TlvScan::Absent
}

/// Extract the NDEF message bytes from a fully read data area.
pub fn unwrap_tlv(area: &[u8]) -> Result<Option<&[u8]>, NdefError> {
    match scan_tlv(area) {
        TlvScan::Terminated | TlvScan::Absent => Ok(None),
        TlvScan::Incomplete { .. } => Err(NdefError::Truncated("TLV value")),
        TlvScan::Found { start, len } => Ok(Some(&area[start..start + len])),
    }
}
