//! NFC Forum Type 2 tags (NTAG21x and friends) over a PC/SC style APDU
//! transport.
//!
//! Memory is addressed in 4 byte blocks. Block 3 holds the capability
//! container, the NDEF data area starts at block 4.

use anyhow::{bail, Context, Result};

use super::card_trait::NfcCard;
use super::host::{NdefStatus, TagStatus};
use super::ndef::{self, NdefMessage, TlvScan};

pub const BLOCK_SIZE: usize = 4;
pub const CC_BLOCK: u8 = 0x03;
pub const DATA_START_BLOCK: u8 = 0x04;

const CC_MAGIC: u8 = 0xE1;
const ACCESS_READ_WRITE: u8 = 0x00;
const ACCESS_READ_ONLY: u8 = 0x0F;
// NDEF TLV header plus terminator, for 1 and 3 byte lengths.
const SHORT_TLV_OVERHEAD: usize = 3;
const LONG_TLV_OVERHEAD: usize = 5;
const SHORT_TLV_MAX: usize = 254;

/// Capability container, block 3 of the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityContainer {
    pub magic: u8,
    pub version: u8,
    pub size: u8,
    pub access: u8,
}

impl CapabilityContainer {
    pub fn from_block(block: [u8; BLOCK_SIZE]) -> Self {
        CapabilityContainer {
            magic: block[0],
            version: block[1],
            size: block[2],
            access: block[3],
        }
    }

    pub fn is_ndef_formatted(&self) -> bool {
        self.magic == CC_MAGIC
    }

    /// Data area size in bytes.
    pub fn data_area_len(&self) -> usize {
        self.size as usize * 8
    }

    /// Largest NDEF message, in bytes, that fits in the data area once
    /// wrapped in its TLV.
    pub fn message_capacity(&self) -> usize {
        let area = self.data_area_len();
        let short = area.saturating_sub(SHORT_TLV_OVERHEAD).min(SHORT_TLV_MAX);
        let long = area.saturating_sub(LONG_TLV_OVERHEAD);
        short.max(long)
    }

    pub fn status(&self) -> TagStatus {
        if !self.is_ndef_formatted() {
            return TagStatus {
                ndef: NdefStatus::NotSupported,
                capacity: 0,
            };
        }

        let ndef = match self.access {
            ACCESS_READ_WRITE => NdefStatus::ReadWrite,
            ACCESS_READ_ONLY => NdefStatus::ReadOnly,
            other => NdefStatus::Unrecognized(other),
        };
        TagStatus {
            ndef,
            capacity: self.message_capacity(),
        }
    }
}

pub struct Type2Tag<C: NfcCard> {
    card: C,
}

impl<C: NfcCard> Type2Tag<C> {
    pub fn new(card: C) -> Self {
        Type2Tag { card }
    }

    /// GET DATA for the UID: FF CA 00 00 00
    pub fn read_uid(&self) -> Result<Vec<u8>> {
        self.card
            .transmit(&[0xFF, 0xCA, 0x00, 0x00, 0x00])
            .context("UID read error")
    }

    /// READ BINARY of one block: FF B0 00 [block] 04
    pub fn read_block(&self, block: u8) -> Result<[u8; BLOCK_SIZE]> {
        let response = self
            .card
            .transmit(&[0xFF, 0xB0, 0x00, block, BLOCK_SIZE as u8])
            .with_context(|| format!("block {block} read error"))?;

        // Some readers return a whole 16 byte page group.
        match response.get(..BLOCK_SIZE) {
            Some(data) => Ok([data[0], data[1], data[2], data[3]]),
            None => bail!("short read at block {block}: {:02X?}", response),
        }
    }

    /// UPDATE BINARY of one block: FF D6 00 [block] 04 [data]
    pub fn write_block(&self, block: u8, data: &[u8; BLOCK_SIZE]) -> Result<()> {
        let mut apdu = vec![0xFF, 0xD6, 0x00, block, BLOCK_SIZE as u8];
        apdu.extend_from_slice(data);
        self.card
            .transmit(&apdu)
            .with_context(|| format!("block {block} write error"))?;
        Ok(())
    }

    pub fn capability_container(&self) -> Result<CapabilityContainer> {
        let block = self.read_block(CC_BLOCK).context("capability container read error")?;
        Ok(CapabilityContainer::from_block(block))
    }

    pub fn status(&self) -> Result<TagStatus> {
        Ok(self.capability_container()?.status())
    }

    /// Read the NDEF message from the data area. `None` when the tag holds
    /// no NDEF TLV.
    pub fn read_ndef(&self) -> Result<Option<NdefMessage>> {
        let cc = self.capability_container()?;
        if !cc.is_ndef_formatted() {
            bail!("invalid capability container: {:02X?}", cc);
        }

        let blocks = cc.data_area_len() / BLOCK_SIZE;
        let mut area = Vec::with_capacity(cc.data_area_len());
        for offset in 0..blocks {
            let block = block_address(offset)?;
            area.extend_from_slice(&self.read_block(block)?);

            match ndef::scan_tlv(&area) {
                TlvScan::Found { start, len } => {
                    tracing::debug!(blocks = offset + 1, len, "found NDEF TLV");
                    let message = NdefMessage::parse(&area[start..start + len])?;
                    return Ok(Some(message));
                }
                TlvScan::Terminated => {
                    tracing::debug!(blocks = offset + 1, "terminator before any NDEF TLV");
                    return Ok(None);
                }
                TlvScan::Absent | TlvScan::Incomplete { .. } => {}
            }
        }

        Ok(ndef::unwrap_tlv(&area)?
            .map(NdefMessage::parse)
            .transpose()?)
    }

    /// Write `message` to the data area, verifying every block by reading
    /// it back.
    pub fn write_ndef(&self, message: &NdefMessage) -> Result<()> {
        let cc = self.capability_container()?;
        if !cc.is_ndef_formatted() {
            bail!("tag is not NDEF formatted: {:02X?}", cc);
        }
        if cc.access != ACCESS_READ_WRITE {
            bail!("tag is read only (access 0x{:02X})", cc.access);
        }

        let tlv = ndef::wrap_tlv(&message.to_bytes()?)?;
        if tlv.len() > cc.data_area_len() {
            bail!(
                "NDEF message needs {} bytes, tag data area holds {}",
                tlv.len(),
                cc.data_area_len()
            );
        }

        for (offset, chunk) in tlv.chunks(BLOCK_SIZE).enumerate() {
            let block = block_address(offset)?;
            let mut data = [0u8; BLOCK_SIZE];
            data[..chunk.len()].copy_from_slice(chunk);

            self.write_block(block, &data)?;
            let written = self.read_block(block)?;
            if written != data {
                tracing::warn!(block, wrote = ?data, read = ?written, "write verification failed");
                bail!("write verification failed at block {block}");
            }
        }

        tracing::debug!(bytes = tlv.len(), "wrote NDEF TLV");
        Ok(())
    }
}

fn block_address(offset: usize) -> Result<u8> {
    u8::try_from(DATA_START_BLOCK as usize + offset).context("data area exceeds block address range")
}
