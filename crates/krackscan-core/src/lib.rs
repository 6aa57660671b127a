//! # krackscan-core
//!
//! Detects clients that reinstall their pairwise key when the 4-way
//! handshake message 3 is replayed (KRACK, CVE-2017-13077).
//!
//! The [`DetectionEngine`] reads frames from a [`MonitorTransport`], keeps
//! one [`ClientRecord`] per station and classifies each one as vulnerable
//! (packet number reuse or an all-zero key) or patched (no reuse across
//! several handshake retransmission intervals).
//!
//! [`MonitorTransport`]: krackscan_wireless::MonitorTransport

#![warn(clippy::all)]

pub mod cancel;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod ivs;
pub mod keys;

#[cfg(test)]
mod testutil;

pub use cancel::{cancel_flag, cancel_on_interrupt, CancelFlag};
pub use client::{ClientRecord, Evidence, TimingPolicy, Verdict, VulnStatus};
pub use config::DetectorConfig;
pub use engine::{ClientSummary, DetectionEngine, EngineOptions};
pub use error::{DetectError, Result};
pub use ivs::{IvRecord, IvTracker};
pub use keys::{CcmpKeyService, Decryption, KeySource};
