use anyhow::Result;

/// APDU transport to a contactless card.
///
/// Implementations return the response data with the `90 00` status word
/// stripped; any other status word is an error.
pub trait NfcCard {
    fn transmit(&self, apdu: &[u8]) -> Result<Vec<u8>>;
}

/// Split the status word off a raw reader response.
pub fn check_status(response: &[u8]) -> Result<Vec<u8>> {
    if response.len() < 2 {
        anyhow::bail!("invalid response from tag: {} bytes", response.len());
    }

    let (data, sw) = response.split_at(response.len() - 2);
    if sw != [0x90, 0x00] {
        anyhow::bail!("tag error: SW1=0x{:02X}, SW2=0x{:02X}", sw[0], sw[1]);
    }
    Ok(data.to_vec())
}

#[cfg(feature = "pcsc")]
impl NfcCard for pcsc::Card {
    fn transmit(&self, apdu: &[u8]) -> Result<Vec<u8>> {
        use anyhow::Context;

        let mut response_buffer = [0u8; pcsc::MAX_BUFFER_SIZE];
        let response = pcsc::Card::transmit(self, apdu, &mut response_buffer)
            .context("failed to communicate with the NFC tag")?;
        tracing::trace!(apdu = ?apdu, response = ?response, "APDU exchange");
        check_status(response)
    }
}
