//! Per-client vulnerability classification
//!
//! A client starts out [`VulnStatus::Unknown`]. Every protected data frame
//! it transmits is evaluated in this order:
//!
//! 1. the frame decrypted under the all-zero key: `Vulnerable`
//! 2. its packet number was already used by another frame: `Vulnerable`
//! 3. otherwise, if still `Unknown` and the packet number is a new maximum,
//!    count intervals of at least `2R + 1` seconds (R being the handshake
//!    retransmission interval) that passed without a reset. Once enough
//!    intervals have passed the client is considered `Patched`.
//!
//! `Vulnerable` and `Patched` are final.

use std::fmt;
use std::time::Duration;

use krackscan_logging::T_DETECT;
use krackscan_wireless::{CapturedFrame, MacAddress, TemporalKey};

use crate::ivs::IvTracker;

pub const DEFAULT_RETRANSMIT_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_PATCHED_AFTER: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VulnStatus {
    Unknown,
    Vulnerable,
    Patched,
}

impl VulnStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for VulnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Vulnerable => "vulnerable",
            Self::Patched => "patched",
        };
        f.write_str(s)
    }
}

/// Timing parameters of the patched heuristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingPolicy {
    /// How often the AP retransmits message 3 of the 4-way handshake
    pub retransmit_interval: Duration,
    /// Intervals without a packet number reset before giving up
    pub patched_after: u32,
}

impl TimingPolicy {
    /// Twice the retransmission interval, in case one message 3 is lost,
    /// plus a second of slack.
    pub fn progress_interval(&self) -> Duration {
        self.retransmit_interval * 2 + Duration::from_secs(1)
    }
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self {
            retransmit_interval: DEFAULT_RETRANSMIT_INTERVAL,
            patched_after: DEFAULT_PATCHED_AFTER,
        }
    }
}

/// Why a client changed status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evidence {
    AllZeroKey { iv: u64, seq: u16 },
    IvReuse { iv: u64, seq: u16 },
    NoResetIntervals(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub status: VulnStatus,
    pub evidence: Evidence,
}

#[derive(Debug, Clone)]
pub struct ClientRecord {
    mac: MacAddress,
    key: Option<TemporalKey>,
    status: VulnStatus,
    ivs: IvTracker,
    last_progress: Option<Duration>,
    no_reset_intervals: u32,
    frames_seen: u64,
}

impl ClientRecord {
    pub fn new(mac: MacAddress) -> Self {
        Self {
            mac,
            key: None,
            status: VulnStatus::Unknown,
            ivs: IvTracker::new(),
            last_progress: None,
            no_reset_intervals: 0,
            frames_seen: 0,
        }
    }

    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    pub fn status(&self) -> VulnStatus {
        self.status
    }

    pub fn key(&self) -> Option<&TemporalKey> {
        self.key.as_ref()
    }

    pub fn set_key(&mut self, key: TemporalKey) {
        self.key = Some(key);
    }

    pub fn ivs(&self) -> &IvTracker {
        &self.ivs
    }

    pub fn no_reset_intervals(&self) -> u32 {
        self.no_reset_intervals
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Feed one transmitted frame through the classifier.
    ///
    /// Returns the verdict when this frame moved the client out of
    /// `Unknown`. Frames without a packet number are ignored.
    pub fn observe(
        &mut self,
        frame: &CapturedFrame,
        all_zero_key: bool,
        policy: &TimingPolicy,
    ) -> Option<Verdict> {
        let iv = frame.iv?;
        self.frames_seen += 1;

        let verdict = if self.status.is_terminal() {
            None
        } else if all_zero_key {
            Some(Verdict {
                status: VulnStatus::Vulnerable,
                evidence: Evidence::AllZeroKey { iv, seq: frame.seq },
            })
        } else if self.ivs.is_reused(frame) {
            Some(Verdict {
                status: VulnStatus::Vulnerable,
                evidence: Evidence::IvReuse { iv, seq: frame.seq },
            })
        } else if self.ivs.is_new_highest(frame) {
            self.track_progress(frame.timestamp, policy)
        } else {
            None
        };

        if let Some(v) = verdict {
            self.status = v.status;
        }
        self.ivs.record_use(frame);
        verdict
    }

    fn track_progress(&mut self, now: Duration, policy: &TimingPolicy) -> Option<Verdict> {
        match self.last_progress {
            None => self.last_progress = Some(now),
            Some(prev) if now.saturating_sub(prev) >= policy.progress_interval() => {
                self.no_reset_intervals += 1;
                self.last_progress = Some(now);
                tracing::debug!(
                    target: T_DETECT,
                    client = %self.mac,
                    intervals = self.no_reset_intervals,
                    "no pairwise IV reset during the last interval"
                );
            }
            Some(_) => {}
        }

        (self.no_reset_intervals >= policy.patched_after).then_some(Verdict {
            status: VulnStatus::Patched,
            evidence: Evidence::NoResetIntervals(self.no_reset_intervals),
        })
    }
}
