//! 802.11 frame structures and types
//!
//! Parses the MAC header of captured data and management frames into a
//! [`CapturedFrame`], the normalized view the detector works with.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};

use crate::ccmp;
use crate::error::{Result, WirelessError};

/// MAC address (6 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Create from slice (must be 6 bytes)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != 6 {
            return Err(WirelessError::InvalidMac(format!(
                "Expected 6 bytes, got {}",
                slice.len()
            )));
        }
        let mut bytes = [0u8; 6];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Get as byte slice
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddress({})", self)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = WirelessError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 6 {
            return Err(WirelessError::InvalidMac(format!(
                "Expected 6 octets separated by ':', got '{}'",
                s
            )));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            bytes[i] = u8::from_str_radix(part, 16)
                .map_err(|_| WirelessError::InvalidMac(format!("Invalid hex octet: '{}'", part)))?;
        }

        Ok(Self(bytes))
    }
}

/// 802.11 Frame Type (2 bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// Management frames (beacons, probes, auth, deauth, etc.)
    Management = 0,
    /// Control frames (ACK, RTS, CTS, etc.)
    Control = 1,
    /// Data frames (actual payload)
    Data = 2,
    /// Extension (802.11ad)
    Extension = 3,
}

impl FrameType {
    /// Parse from frame control field
    pub fn from_frame_control(fc: u16) -> Self {
        match (fc >> 2) & 0x03 {
            0 => Self::Management,
            1 => Self::Control,
            2 => Self::Data,
            _ => Self::Extension,
        }
    }
}

/// 802.11 Frame Control field (2 bytes, little endian on the air)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameControl {
    raw: u16,
}

impl FrameControl {
    pub const TO_DS: u16 = 0x0100;
    pub const FROM_DS: u16 = 0x0200;
    pub const MORE_FRAGMENTS: u16 = 0x0400;
    pub const RETRY: u16 = 0x0800;
    pub const POWER_MGMT: u16 = 0x1000;
    /// Also used to tag frames we inject ourselves
    pub const MORE_DATA: u16 = 0x2000;
    pub const PROTECTED: u16 = 0x4000;
    pub const ORDER: u16 = 0x8000;

    pub fn new(raw: u16) -> Self {
        Self { raw }
    }

    /// Read the field from the first two bytes of a frame
    pub fn parse(frame: &[u8]) -> Result<Self> {
        if frame.len() < 2 {
            return Err(WirelessError::invalid_frame("Frame too short"));
        }
        Ok(Self::new(LittleEndian::read_u16(&frame[0..2])))
    }

    /// Get frame type
    pub fn frame_type(&self) -> FrameType {
        FrameType::from_frame_control(self.raw)
    }

    /// Subtype number (4 bits)
    pub fn subtype(&self) -> u8 {
        ((self.raw >> 4) & 0x0F) as u8
    }

    /// Data frame with a QoS control field
    pub fn is_qos_data(&self) -> bool {
        self.frame_type() == FrameType::Data && self.subtype() & 0x08 != 0
    }

    pub fn has(&self, flag: u16) -> bool {
        self.raw & flag != 0
    }

    pub fn to_ds(&self) -> bool {
        self.has(Self::TO_DS)
    }

    pub fn from_ds(&self) -> bool {
        self.has(Self::FROM_DS)
    }

    pub fn retry(&self) -> bool {
        self.has(Self::RETRY)
    }

    pub fn protected(&self) -> bool {
        self.has(Self::PROTECTED)
    }

    /// Get raw value
    pub fn raw(&self) -> u16 {
        self.raw
    }

    /// To little-endian bytes
    pub fn to_le_bytes(&self) -> [u8; 2] {
        self.raw.to_le_bytes()
    }
}

/// Which way a frame travels relative to the distribution system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Station to access point (ToDS)
    ToAp,
    /// Access point to station (FromDS)
    FromAp,
    /// Neither bit set: management traffic or IBSS data
    Direct,
    /// Both bits set: four-address mesh/WDS frame
    Wds,
}

impl Direction {
    pub fn from_frame_control(fc: FrameControl) -> Self {
        match (fc.to_ds(), fc.from_ds()) {
            (true, false) => Self::ToAp,
            (false, true) => Self::FromAp,
            (false, false) => Self::Direct,
            (true, true) => Self::Wds,
        }
    }
}

/// Length of the MAC header of a data or management frame.
///
/// Includes the fourth address of WDS frames, the QoS control field and the
/// HT control field when present, but not the CCMP header.
pub fn header_len(frame: &[u8]) -> Result<usize> {
    let fc = FrameControl::parse(frame)?;
    let mut len = match fc.frame_type() {
        FrameType::Data | FrameType::Management => 24,
        other => {
            return Err(WirelessError::invalid_frame(format!(
                "No MAC header layout for {:?} frames",
                other
            )))
        }
    };
    if fc.frame_type() == FrameType::Data && fc.to_ds() && fc.from_ds() {
        len += 6;
    }
    if fc.is_qos_data() {
        len += 2;
        if fc.has(FrameControl::ORDER) {
            len += 4;
        }
    }
    if frame.len() < len {
        return Err(WirelessError::invalid_frame(format!(
            "Header needs {} bytes, frame has {}",
            len,
            frame.len()
        )));
    }
    Ok(len)
}

/// 12-bit sequence number, fragment number masked out
pub fn extract_seq(frame: &[u8]) -> Result<u16> {
    if frame.len() < 24 {
        return Err(WirelessError::invalid_frame("Frame too short for sequence control"));
    }
    Ok(LittleEndian::read_u16(&frame[22..24]) >> 4)
}

/// QoS TID of a data frame, 0 for frames without QoS control
pub fn extract_priority(frame: &[u8]) -> Result<u8> {
    let fc = FrameControl::parse(frame)?;
    if !fc.is_qos_data() {
        return Ok(0);
    }
    let offset = if fc.to_ds() && fc.from_ds() { 30 } else { 24 };
    if frame.len() < offset + 2 {
        return Err(WirelessError::invalid_frame("Frame too short for QoS control"));
    }
    Ok(frame[offset] & 0x0F)
}

/// Normalized view of one captured data or management frame
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub frame_control: FrameControl,
    /// Address 1 (receiver)
    pub destination: MacAddress,
    /// Address 2 (transmitter)
    pub source: MacAddress,
    /// Address 3
    pub bssid: MacAddress,
    pub direction: Direction,
    pub seq: u16,
    pub retry: bool,
    pub protected: bool,
    /// CCMP packet number, present on protected frames
    pub iv: Option<u64>,
    /// Frame body; for protected frames this is the ciphertext plus MIC
    pub payload: Vec<u8>,
    /// Capture time
    pub timestamp: Duration,
    raw: Vec<u8>,
}

impl CapturedFrame {
    /// Parse a bare 802.11 frame (no radiotap header, no FCS).
    pub fn parse(frame: &[u8], timestamp: Duration) -> Result<Self> {
        let frame_control = FrameControl::parse(frame)?;
        let hdr_len = header_len(frame)?;
        let protected = frame_control.protected();

        let (iv, body_start) = if protected {
            (Some(ccmp::extract_iv(frame)?), hdr_len + ccmp::CCMP_HEADER_LEN)
        } else {
            (None, hdr_len)
        };

        Ok(Self {
            frame_control,
            destination: MacAddress::from_slice(&frame[4..10])?,
            source: MacAddress::from_slice(&frame[10..16])?,
            bssid: MacAddress::from_slice(&frame[16..22])?,
            direction: Direction::from_frame_control(frame_control),
            seq: extract_seq(frame)?,
            retry: frame_control.retry(),
            protected,
            iv,
            payload: frame[body_start..].to_vec(),
            timestamp,
            raw: frame.to_vec(),
        })
    }

    pub fn frame_type(&self) -> FrameType {
        self.frame_control.frame_type()
    }

    pub fn is_data(&self) -> bool {
        self.frame_type() == FrameType::Data
    }

    /// Split addresses into (station, access point) based on the DS bits
    pub fn station_and_ap(&self) -> (MacAddress, MacAddress) {
        if self.frame_control.from_ds() {
            (self.destination, self.source)
        } else {
            (self.source, self.destination)
        }
    }

    /// The full 802.11 frame as captured
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}
