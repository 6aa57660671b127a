//! Radiotap header handling
//!
//! Radiotap is the de-facto standard header prepended to 802.11 frames
//! when injecting or capturing in monitor mode.

use crate::error::{Result, WirelessError};
use byteorder::{ByteOrder, LittleEndian};

/// Radiotap "present" bits we care about
const PRESENT_TSFT: u32 = 1 << 0;
const PRESENT_FLAGS: u32 = 1 << 1;
const PRESENT_EXT: u32 = 1 << 31;

/// Flags field: frame includes FCS
pub const FLAG_FCS_AT_END: u8 = 0x10;

const FCS_LEN: usize = 4;

/// Radiotap header for injection or capture
#[derive(Debug, Clone)]
pub struct RadiotapHeader {
    data: Vec<u8>,
}

impl RadiotapHeader {
    /// Minimal radiotap header (8 bytes, no fields present)
    pub fn minimal() -> Self {
        Self {
            data: vec![
                0x00, // Header revision
                0x00, // Header pad
                0x08, 0x00, // Header length (8 bytes, LE)
                0x00, 0x00, 0x00, 0x00, // Present flags (none)
            ],
        }
    }

    /// Radiotap header with TX flags for injection
    pub fn for_injection() -> Self {
        // Present flags: bit 15 = TX flags, value NO_ACK
        Self {
            data: vec![
                0x00, // Header revision
                0x00, // Header pad
                0x0A, 0x00, // Header length (10 bytes, LE)
                0x00, 0x80, 0x00, 0x00, // Present flags: TX flags (bit 15)
                0x08, 0x00, // TX flags: NO_ACK
            ],
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Parse radiotap header from captured packet
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < 8 {
            return Err(WirelessError::capture("Radiotap header too short"));
        }

        if data[0] != 0 {
            return Err(WirelessError::capture(format!(
                "Unknown radiotap version: {}",
                data[0]
            )));
        }

        let len = LittleEndian::read_u16(&data[2..4]) as usize;
        if len < 8 || data.len() < len {
            return Err(WirelessError::capture(format!(
                "Radiotap header length {} invalid for {} captured bytes",
                len,
                data.len()
            )));
        }

        Ok((Self { data: data[..len].to_vec() }, len))
    }

    /// First present word
    pub fn present(&self) -> u32 {
        LittleEndian::read_u32(&self.data[4..8])
    }

    /// Offset of the first field, after all chained present words
    fn fields_offset(&self) -> Result<usize> {
        let mut offset = 4;
        loop {
            if self.data.len() < offset + 4 {
                return Err(WirelessError::capture("Truncated radiotap present bitmap"));
            }
            let word = LittleEndian::read_u32(&self.data[offset..offset + 4]);
            offset += 4;
            if word & PRESENT_EXT == 0 {
                return Ok(offset);
            }
        }
    }

    /// Value of the Flags field, if present
    pub fn flags(&self) -> Result<Option<u8>> {
        let present = self.present();
        if present & PRESENT_FLAGS == 0 {
            return Ok(None);
        }

        let mut offset = self.fields_offset()?;
        if present & PRESENT_TSFT != 0 {
            offset = align_up(offset, 8) + 8;
        }

        match self.data.get(offset) {
            Some(flags) => Ok(Some(*flags)),
            None => Err(WirelessError::capture("Radiotap flags field out of bounds")),
        }
    }

    /// Whether the captured frame carries a trailing FCS
    pub fn has_fcs(&self) -> Result<bool> {
        Ok(self.flags()?.map_or(false, |f| f & FLAG_FCS_AT_END != 0))
    }
}

impl Default for RadiotapHeader {
    fn default() -> Self {
        Self::minimal()
    }
}

fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) & !(align - 1)
}

/// Remove the radiotap header, and the FCS when the header says one is
/// present, from a captured buffer.
pub fn strip_radio_header(raw: &[u8]) -> Result<&[u8]> {
    let (header, len) = RadiotapHeader::parse(raw)?;
    let mut end = raw.len();
    if header.has_fcs()? {
        if end - len < FCS_LEN {
            return Err(WirelessError::capture("Frame shorter than its FCS"));
        }
        end -= FCS_LEN;
    }
    Ok(&raw[len..end])
}

/// Prepend a radiotap header to a bare 802.11 frame
pub fn encapsulate(header: &RadiotapHeader, frame: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(header.len() + frame.len());
    packet.extend_from_slice(header.as_bytes());
    packet.extend_from_slice(frame);
    packet
}
