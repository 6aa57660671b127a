//! # krackscan-wireless
//!
//! 802.11 plumbing for the key reinstallation detector: frame parsing,
//! radiotap handling, CCMP packet numbers and decryption, and a
//! monitor-mode transport over raw `AF_PACKET` sockets.
//!
//! ## Example
//!
//! ```no_run
//! use krackscan_wireless::{MonitorTransport, PacketSocket};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut monitor = MonitorTransport::new(PacketSocket::open("wlan0mon")?);
//! while let Some(frame) = monitor.receive()? {
//!     if let Some(iv) = frame.iv {
//!         println!("{} -> {} pn={}", frame.source, frame.destination, iv);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![cfg(target_os = "linux")]
#![warn(clippy::all)]

pub mod ccmp;
pub mod error;
pub mod frames;
pub mod monitor;
pub mod radiotap;
pub mod socket;

/// Tracing target for capture and injection events
pub const LOG_TARGET: &str = "krackscan::wifi";

pub use ccmp::{
    decrypt_ccmp, encrypt_ccmp, extract_iv, starts_with_llc_snap, TemporalKey, ALL_ZERO_KEY,
    LLC_SNAP_PREFIX,
};
pub use error::{Result, WirelessError};
pub use frames::{extract_seq, CapturedFrame, Direction, FrameControl, FrameType, MacAddress};
pub use monitor::{MonitorStats, MonitorTransport, RawLink};
pub use radiotap::{strip_radio_header, RadiotapHeader};
pub use socket::{check_privileges, PacketSocket};
