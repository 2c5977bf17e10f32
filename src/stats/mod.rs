//! Statistics primitives backing the jitter buffer control loop.
//!
//! These types are deliberately free of any buffer or packet knowledge:
//!
//! - [`SequenceTracker`] - wraparound-aware packet sequence classification
//! - [`GapWindow`] - sliding time window of inter-packet arrival gaps
//! - [`StarveHistory`] - time-bounded record of starvation events
//! - [`TimeWeightedAvg`] - time-weighted running average of a sampled value
//!
//! All timestamps are monotonic microseconds supplied by the caller, so the
//! control loop stays deterministic under test.

pub mod sequence;
pub mod starve;
pub mod time_weighted;
pub mod timegap;

pub use sequence::{Arrival, SequenceStats, SequenceTracker};
pub use starve::StarveHistory;
pub use time_weighted::TimeWeightedAvg;
pub use timegap::GapWindow;

pub const USECS_PER_SECOND: u64 = 1_000_000;
