//! Wraparound-aware sequence number tracking.
//!
//! Incoming packets carry a 16-bit sequence counter that wraps at 65536.
//! [`SequenceTracker`] classifies each arrival relative to the expected next
//! value and keeps the loss/duplicate/reorder counters the stream reports.

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

/// Forward distances up to (and including) the half circle are treated as
/// forward progress; anything beyond is a packet from the past.
const HALF_SEQUENCE_SPACE: u16 = 1 << 15;

/// Bound on the set of sequence numbers we remember as lost. A burst that
/// blows past this is a stream discontinuity, not ordinary loss, so the set
/// is simply cleared.
const MAX_TRACKED_MISSING: usize = 1000;

/// Classification of one arriving sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// Exactly the expected next packet.
    InOrder,
    /// Ahead of the expected value; `lost` packets were skipped over and
    /// should be compensated before this packet's payload is used.
    Early { lost: u16 },
    /// Behind the expected value, filling a known hole. The payload is stale
    /// and must not be written.
    Late,
    /// Behind the expected value without a matching hole; a repeat of a
    /// packet already consumed.
    Duplicate,
}

/// Counters mutated on every packet ingestion.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SequenceStats {
    pub received: u64,
    pub lost: u64,
    pub duplicates: u64,
    pub out_of_order: u64,
}

/// Tracks the expected next sequence number and classifies arrivals.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    expected_next: Option<u16>,
    missing: HashSet<u16>,
    stats: SequenceStats,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `seq` against the expected next value and update counters.
    ///
    /// All arithmetic is modular over the 16-bit space: the forward distance
    /// is the smaller of the two directions around the circle, with the tie
    /// at the half-circle boundary resolving forward.
    pub fn classify(&mut self, seq: u16) -> Arrival {
        self.stats.received += 1;

        let expected = match self.expected_next {
            Some(expected) => expected,
            None => {
                // First packet seeds the tracker.
                self.expected_next = Some(seq.wrapping_add(1));
                return Arrival::InOrder;
            }
        };

        let ahead = seq.wrapping_sub(expected);
        if ahead == 0 {
            self.expected_next = Some(seq.wrapping_add(1));
            Arrival::InOrder
        } else if ahead <= HALF_SEQUENCE_SPACE {
            // Jumped ahead: everything in between is lost until a late
            // arrival proves otherwise.
            self.stats.lost += u64::from(ahead);
            for offset in 0..ahead {
                self.missing.insert(expected.wrapping_add(offset));
            }
            if self.missing.len() > MAX_TRACKED_MISSING {
                debug!(
                    "missing-sequence set exceeded {} entries, clearing",
                    MAX_TRACKED_MISSING
                );
                self.missing.clear();
            }
            self.expected_next = Some(seq.wrapping_add(1));
            Arrival::Early { lost: ahead }
        } else if self.missing.remove(&seq) {
            // A packet we had given up on arrived after all.
            self.stats.out_of_order += 1;
            self.stats.lost = self.stats.lost.saturating_sub(1);
            Arrival::Late
        } else {
            self.stats.duplicates += 1;
            Arrival::Duplicate
        }
    }

    pub fn stats(&self) -> SequenceStats {
        self.stats
    }

    /// Zero the counters, keeping the expected-next state.
    pub fn reset_stats(&mut self) {
        self.stats = SequenceStats::default();
    }

    /// Forget everything; tracking restarts from the next arriving packet.
    pub fn restart(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_order_sequence() {
        let mut tracker = SequenceTracker::new();
        for seq in 0..5u16 {
            assert_eq!(tracker.classify(seq), Arrival::InOrder);
        }
        let stats = tracker.stats();
        assert_eq!(stats.received, 5);
        assert_eq!(stats.lost, 0);
    }

    #[test]
    fn test_wraparound_is_in_order() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(tracker.classify(65535), Arrival::InOrder);
        assert_eq!(tracker.classify(0), Arrival::InOrder);
        assert_eq!(tracker.classify(1), Arrival::InOrder);
        assert_eq!(tracker.stats().lost, 0);
    }

    #[test]
    fn test_gap_reports_lost_count() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(tracker.classify(9), Arrival::InOrder);
        // expected 10, received 13: packets 10, 11, 12 were skipped
        assert_eq!(tracker.classify(13), Arrival::Early { lost: 3 });
        assert_eq!(tracker.stats().lost, 3);
    }

    #[test]
    fn test_gap_across_wraparound() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(tracker.classify(65534), Arrival::InOrder);
        assert_eq!(tracker.classify(1), Arrival::Early { lost: 2 });
        assert_eq!(tracker.stats().lost, 2);
    }

    #[test]
    fn test_late_fills_known_hole() {
        let mut tracker = SequenceTracker::new();
        tracker.classify(0);
        assert_eq!(tracker.classify(2), Arrival::Early { lost: 1 });
        assert_eq!(tracker.classify(1), Arrival::Late);
        let stats = tracker.stats();
        assert_eq!(stats.lost, 0);
        assert_eq!(stats.out_of_order, 1);
    }

    #[test]
    fn test_duplicate_of_consumed_slot() {
        let mut tracker = SequenceTracker::new();
        tracker.classify(0);
        tracker.classify(1);
        assert_eq!(tracker.classify(1), Arrival::Duplicate);
        assert_eq!(tracker.stats().duplicates, 1);
    }

    #[test]
    fn test_half_circle_tie_resolves_forward() {
        let mut tracker = SequenceTracker::new();
        tracker.classify(0);
        assert_eq!(
            tracker.classify(HALF_SEQUENCE_SPACE),
            Arrival::Early {
                lost: HALF_SEQUENCE_SPACE - 1
            }
        );
    }

    #[test]
    fn test_reset_stats_keeps_position() {
        let mut tracker = SequenceTracker::new();
        tracker.classify(0);
        tracker.classify(5);
        tracker.reset_stats();
        assert_eq!(tracker.stats(), SequenceStats::default());
        // expected-next survives: 6 is still in order
        assert_eq!(tracker.classify(6), Arrival::InOrder);
    }

    #[test]
    fn test_restart_reseeds_from_next_packet() {
        let mut tracker = SequenceTracker::new();
        tracker.classify(100);
        tracker.restart();
        assert_eq!(tracker.classify(7), Arrival::InOrder);
        assert_eq!(tracker.stats().received, 1);
    }
}
