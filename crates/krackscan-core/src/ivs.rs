//! Per-client memory of CCMP packet numbers

use std::collections::HashMap;
use std::time::Duration;

use krackscan_wireless::CapturedFrame;

/// Last observation of one packet number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvRecord {
    pub iv: u64,
    pub retry: bool,
    pub seq: u16,
    pub timestamp: Duration,
}

impl IvRecord {
    fn from_frame(iv: u64, frame: &CapturedFrame) -> Self {
        Self {
            iv,
            retry: frame.retry,
            seq: frame.seq,
            timestamp: frame.timestamp,
        }
    }

    /// A retried frame carrying the same sequence number is the same MPDU
    /// sent again, not a second frame encrypted under the same nonce.
    fn is_retransmitted_by(&self, frame: &CapturedFrame) -> bool {
        frame.retry && frame.seq == self.seq
    }
}

/// Packet numbers seen from one client. Frames without a packet number
/// are ignored by every operation.
#[derive(Debug, Default, Clone)]
pub struct IvTracker {
    records: HashMap<u64, IvRecord>,
    highest: Option<u64>,
}

impl IvTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.records.clear();
        self.highest = None;
    }

    pub fn record_use(&mut self, frame: &CapturedFrame) {
        let Some(iv) = frame.iv else { return };
        self.records.insert(iv, IvRecord::from_frame(iv, frame));
        self.highest = Some(self.highest.map_or(iv, |h| h.max(iv)));
    }

    /// True when the packet number was used before by a different frame
    pub fn is_reused(&self, frame: &CapturedFrame) -> bool {
        let Some(iv) = frame.iv else { return false };
        self.records
            .get(&iv)
            .map_or(false, |prev| !prev.is_retransmitted_by(frame))
    }

    /// True when nothing was recorded yet or the packet number exceeds all
    /// recorded ones
    pub fn is_new_highest(&self, frame: &CapturedFrame) -> bool {
        let Some(iv) = frame.iv else { return false };
        self.highest.map_or(true, |h| iv > h)
    }

    pub fn get(&self, iv: u64) -> Option<&IvRecord> {
        self.records.get(&iv)
    }

    pub fn highest(&self) -> Option<u64> {
        self.highest
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::protected_frame;

    #[test]
    fn first_frame_is_new_highest_and_not_reused() {
        let tracker = IvTracker::new();
        let frame = protected_frame(5, 10, false, 0);
        assert!(tracker.is_new_highest(&frame));
        assert!(!tracker.is_reused(&frame));
    }

    #[test]
    fn lower_or_equal_iv_is_not_new_highest() {
        let mut tracker = IvTracker::new();
        tracker.record_use(&protected_frame(5, 10, false, 0));
        tracker.record_use(&protected_frame(3, 11, false, 1));

        assert_eq!(tracker.highest(), Some(5));
        assert!(!tracker.is_new_highest(&protected_frame(5, 12, false, 2)));
        assert!(!tracker.is_new_highest(&protected_frame(4, 12, false, 2)));
        assert!(tracker.is_new_highest(&protected_frame(6, 12, false, 2)));
    }

    #[test]
    fn repeat_with_new_sequence_number_is_reuse() {
        let mut tracker = IvTracker::new();
        tracker.record_use(&protected_frame(6, 20, false, 0));
        assert!(tracker.is_reused(&protected_frame(6, 21, false, 1)));
        // Retry flag alone is not enough; the sequence number must match.
        assert!(tracker.is_reused(&protected_frame(6, 21, true, 1)));
    }

    #[test]
    fn retransmission_is_not_reuse() {
        let mut tracker = IvTracker::new();
        tracker.record_use(&protected_frame(6, 20, false, 0));
        assert!(!tracker.is_reused(&protected_frame(6, 20, true, 0)));
    }

    #[test]
    fn record_overwrites_previous_observation() {
        let mut tracker = IvTracker::new();
        tracker.record_use(&protected_frame(6, 20, false, 0));
        tracker.record_use(&protected_frame(6, 30, false, 4));
        assert_eq!(tracker.len(), 1);
        let record = tracker.get(6).unwrap();
        assert_eq!(record.seq, 30);
        assert_eq!(record.timestamp, Duration::from_secs(4));
    }

    #[test]
    fn reset_forgets_everything() {
        let mut tracker = IvTracker::new();
        tracker.record_use(&protected_frame(9, 1, false, 0));
        tracker.reset();
        assert!(tracker.is_empty());
        assert!(!tracker.is_reused(&protected_frame(9, 2, false, 1)));
        assert!(tracker.is_new_highest(&protected_frame(1, 2, false, 1)));
    }
}
