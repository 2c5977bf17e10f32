//! Configuration snapshot for an inbound stream.

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_FRAMES_OVER_DESIRED: usize = 10;
pub const DEFAULT_DYNAMIC_JITTER_BUFFERS: bool = true;
pub const DEFAULT_STATIC_DESIRED_JITTER_BUFFER_FRAMES: usize = 1;
pub const DEFAULT_USE_STDDEV_FOR_JITTER_CALC: bool = false;
pub const DEFAULT_WINDOW_STARVE_THRESHOLD: usize = 3;
pub const DEFAULT_WINDOW_SECONDS_FOR_DESIRED_CALC_ON_TOO_MANY_STARVES: u64 = 50;
pub const DEFAULT_WINDOW_SECONDS_FOR_DESIRED_REDUCTION: u64 = 10;

// Empirically tuned smoothing constants for the two depth estimators; kept
// configurable rather than baked in.
pub const DEFAULT_DESIRED_FRAMES_PADDING: usize = 1;
pub const DEFAULT_STDDEV_MULTIPLIER: f64 = 3.0;

/// Immutable configuration snapshot for one inbound stream.
///
/// `Copy` so the stream can swap the whole snapshot atomically and every
/// ingest/pop/tick works against one consistent view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Overflow slack: frames allowed above the desired depth before the
    /// stream proactively drops the oldest frames.
    pub max_frames_over_desired: usize,

    /// If false, the desired depth is pinned to
    /// `static_desired_jitter_buffer_frames` and the estimators run for
    /// telemetry only.
    pub dynamic_jitter_buffers: bool,

    pub static_desired_jitter_buffer_frames: usize,

    /// Selects the standard-deviation estimator over the max-gap estimator
    /// in dynamic mode.
    pub use_stddev_for_jitter_calc: bool,

    /// Starves within the lookback window that must be exceeded before the
    /// desired depth escalates.
    pub window_starve_threshold: usize,

    /// Lookback window (seconds) used for the escalation recomputation and
    /// for counting starves against the threshold.
    pub window_seconds_for_desired_calc_on_too_many_starves: u64,

    /// Starve-free duration (seconds) required before the desired depth may
    /// shrink toward the short-window estimate.
    pub window_seconds_for_desired_reduction: u64,

    /// Margin added to the max-gap estimate, in frames.
    pub desired_frames_padding: usize,

    /// `k` in the `mean + k * stddev` estimate.
    pub stddev_multiplier: f64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            max_frames_over_desired: DEFAULT_MAX_FRAMES_OVER_DESIRED,
            dynamic_jitter_buffers: DEFAULT_DYNAMIC_JITTER_BUFFERS,
            static_desired_jitter_buffer_frames: DEFAULT_STATIC_DESIRED_JITTER_BUFFER_FRAMES,
            use_stddev_for_jitter_calc: DEFAULT_USE_STDDEV_FOR_JITTER_CALC,
            window_starve_threshold: DEFAULT_WINDOW_STARVE_THRESHOLD,
            window_seconds_for_desired_calc_on_too_many_starves:
                DEFAULT_WINDOW_SECONDS_FOR_DESIRED_CALC_ON_TOO_MANY_STARVES,
            window_seconds_for_desired_reduction: DEFAULT_WINDOW_SECONDS_FOR_DESIRED_REDUCTION,
            desired_frames_padding: DEFAULT_DESIRED_FRAMES_PADDING,
            stddev_multiplier: DEFAULT_STDDEV_MULTIPLIER,
        }
    }
}
