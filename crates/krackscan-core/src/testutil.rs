//! Frame builders shared by the unit tests

use std::time::Duration;

use krackscan_wireless::{
    encrypt_ccmp, CapturedFrame, MacAddress, TemporalKey, ALL_ZERO_KEY, LLC_SNAP_PREFIX,
};

pub const AP: MacAddress = MacAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
pub const STA: MacAddress = MacAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);
pub const SESSION_KEY: TemporalKey = [0x42; 16];

/// Bare client-to-AP data frame: header plus an LLC/SNAP wrapped body
pub fn plain_frame(sta: MacAddress, seq: u16, retry: bool) -> Vec<u8> {
    let flags = if retry { 0x09 } else { 0x01 };
    let mut frame = vec![0x08, flags, 0x00, 0x00];
    frame.extend_from_slice(AP.as_bytes());
    frame.extend_from_slice(sta.as_bytes());
    frame.extend_from_slice(AP.as_bytes());
    frame.extend_from_slice(&(seq << 4).to_le_bytes());
    frame.extend_from_slice(&LLC_SNAP_PREFIX);
    frame.extend_from_slice(&[0x08, 0x06, 0x00, 0x01]);
    frame
}

pub fn encrypted_frame(
    sta: MacAddress,
    iv: u64,
    seq: u16,
    retry: bool,
    secs: u64,
    key: &TemporalKey,
) -> CapturedFrame {
    let bytes = encrypt_ccmp(&plain_frame(sta, seq, retry), iv, 0, key).unwrap();
    CapturedFrame::parse(&bytes, Duration::from_secs(secs)).unwrap()
}

pub fn protected_frame(iv: u64, seq: u16, retry: bool, secs: u64) -> CapturedFrame {
    encrypted_frame(STA, iv, seq, retry, secs, &SESSION_KEY)
}

pub fn zero_key_frame(iv: u64, seq: u16, secs: u64) -> CapturedFrame {
    encrypted_frame(STA, iv, seq, false, secs, &ALL_ZERO_KEY)
}
