//! Frame-level transport over a monitor-mode link
//!
//! Injected frames are tagged with the MoreData flag so that our own
//! transmissions, echoed back by the capture path, can be told apart from
//! real traffic and discarded.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Result, WirelessError};
use crate::frames::{CapturedFrame, FrameControl, FrameType};
use crate::radiotap::{encapsulate, strip_radio_header, RadiotapHeader};
use crate::LOG_TARGET;

/// Byte-level access to a monitor interface.
///
/// Implemented by [`crate::PacketSocket`]; tests provide in-memory links.
pub trait RawLink {
    /// Transmit a complete packet (radiotap header included)
    fn transmit(&mut self, packet: &[u8]) -> Result<()>;

    /// Next captured packet, or `None` when nothing is queued
    fn receive(&mut self) -> Result<Option<Vec<u8>>>;

    /// Block until a packet is readable or `timeout` expires
    fn wait_readable(&mut self, timeout: Duration) -> Result<bool>;
}

/// Transport statistics
#[derive(Debug, Clone, Default)]
pub struct MonitorStats {
    pub packets_received: u64,
    pub frames_delivered: u64,
    pub echoes_dropped: u64,
    pub control_dropped: u64,
    pub malformed_dropped: u64,
    pub frames_sent: u64,
}

/// Sends and receives bare 802.11 frames on a monitor link
pub struct MonitorTransport<L: RawLink> {
    link: L,
    radiotap: RadiotapHeader,
    stats: MonitorStats,
}

impl<L: RawLink> MonitorTransport<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            radiotap: RadiotapHeader::for_injection(),
            stats: MonitorStats::default(),
        }
    }

    /// Inject a bare 802.11 frame, tagged so its echo is ignored
    pub fn send(&mut self, frame: &[u8]) -> Result<()> {
        let fc = FrameControl::parse(frame)?;
        let mut tagged = frame.to_vec();
        let tagged_fc = FrameControl::new(fc.raw() | FrameControl::MORE_DATA);
        tagged[..2].copy_from_slice(&tagged_fc.to_le_bytes());

        self.link.transmit(&encapsulate(&self.radiotap, &tagged))?;
        self.stats.frames_sent += 1;
        Ok(())
    }

    /// Next frame of interest, or `None` if the captured packet was
    /// filtered out or nothing was queued
    pub fn receive(&mut self) -> Result<Option<CapturedFrame>> {
        let Some(raw) = self.link.receive()? else {
            return Ok(None);
        };
        self.stats.packets_received += 1;

        let frame = match strip_radio_header(&raw) {
            Ok(frame) => frame,
            Err(e) => return self.drop_malformed(e, "dropping packet"),
        };

        let fc = match FrameControl::parse(frame) {
            Ok(fc) => fc,
            Err(e) => return self.drop_malformed(e, "dropping frame"),
        };

        if matches!(fc.frame_type(), FrameType::Control | FrameType::Extension) {
            self.stats.control_dropped += 1;
            return Ok(None);
        }
        if fc.has(FrameControl::MORE_DATA) {
            self.stats.echoes_dropped += 1;
            return Ok(None);
        }

        match CapturedFrame::parse(frame, now()) {
            Ok(parsed) => {
                self.stats.frames_delivered += 1;
                Ok(Some(parsed))
            }
            Err(e) => self.drop_malformed(e, "dropping frame"),
        }
    }

    // Malformed captures are counted and skipped; anything else is a real fault.
    fn drop_malformed(&mut self, err: WirelessError, what: &str) -> Result<Option<CapturedFrame>> {
        if !err.is_malformed_input() {
            return Err(err);
        }
        tracing::trace!(target: LOG_TARGET, error = %err, "{what}");
        self.stats.malformed_dropped += 1;
        Ok(None)
    }

    pub fn wait_readable(&mut self, timeout: Duration) -> Result<bool> {
        self.link.wait_readable(timeout)
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }
}

fn now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}
