//! Desired-depth estimation from inter-packet arrival gaps.
//!
//! Two independent estimates are always maintained:
//!
//! - **max-gap**: size the buffer to ride out the worst burst delay observed
//!   in the lookback window, plus a margin of `padding` frames.
//! - **stddev**: size the buffer to `mean + k * stddev` of the observed
//!   gaps, bounding underrun probability instead of chasing one outlier.
//!
//! Which estimate becomes the stream's desired depth is the controller's
//! call; both are kept current for diagnostics either way.

use crate::stats::timegap::GapWindow;

/// Gaps measured around the first packets of a stream reflect connection
/// setup, not steady-state jitter, and are discarded.
const NUM_INITIAL_GAPS_DISCARD: u32 = 3;

pub struct JitterEstimator {
    frame_duration_usecs: u64,
    /// Window used for escalation after repeated starves, and for both
    /// cached estimates.
    lookback_window: GapWindow,
    /// Shorter window consulted when the depth is allowed to relax.
    reduction_window: GapWindow,
    last_arrival: Option<u64>,
    discard_remaining: u32,
    desired_from_max_gap: usize,
    desired_from_stddev: usize,
}

impl JitterEstimator {
    pub fn new(frame_duration_usecs: u64, lookback_secs: u64, reduction_secs: u64) -> Self {
        assert!(frame_duration_usecs > 0, "frames must span nonzero time");
        Self {
            frame_duration_usecs,
            lookback_window: GapWindow::new(lookback_secs),
            reduction_window: GapWindow::new(reduction_secs),
            last_arrival: None,
            discard_remaining: NUM_INITIAL_GAPS_DISCARD,
            desired_from_max_gap: 1,
            desired_from_stddev: 1,
        }
    }

    pub fn set_windows(&mut self, lookback_secs: u64, reduction_secs: u64) {
        self.lookback_window.set_window_secs(lookback_secs);
        self.reduction_window.set_window_secs(reduction_secs);
    }

    /// Record a packet arrival; returns the measured gap when one was taken
    /// into the windows.
    pub fn record_arrival(
        &mut self,
        now: u64,
        padding_frames: usize,
        stddev_multiplier: f64,
    ) -> Option<u64> {
        let gap = self.last_arrival.map(|last| now.saturating_sub(last));
        self.last_arrival = Some(now);
        let gap = gap?;

        if self.discard_remaining > 0 {
            self.discard_remaining -= 1;
            return None;
        }

        self.lookback_window.add(now, gap);
        self.reduction_window.add(now, gap);
        self.recalculate(padding_frames, stddev_multiplier);
        Some(gap)
    }

    fn recalculate(&mut self, padding_frames: usize, stddev_multiplier: f64) {
        if let Some(max_gap) = self.lookback_window.max_gap() {
            self.desired_from_max_gap = self.frames_for(max_gap) + padding_frames;
        }
        if let (Some(mean), Some(stddev)) =
            (self.lookback_window.mean(), self.lookback_window.stddev())
        {
            let bound = mean + stddev_multiplier * stddev;
            self.desired_from_stddev = self.frames_for(bound.ceil() as u64);
        }
    }

    fn frames_for(&self, gap_usecs: u64) -> usize {
        (gap_usecs as f64 / self.frame_duration_usecs as f64).ceil() as usize
    }

    pub fn desired_from_max_gap(&self) -> usize {
        self.desired_from_max_gap
    }

    pub fn desired_from_stddev(&self) -> usize {
        self.desired_from_stddev
    }

    pub fn desired(&self, use_stddev: bool) -> usize {
        if use_stddev {
            self.desired_from_stddev
        } else {
            self.desired_from_max_gap
        }
    }

    /// Frames' worth of time elapsed since the last packet.
    ///
    /// At escalation time the packet that would end the starve is already
    /// overdue, so the true gap may exceed anything the window has recorded.
    pub fn frames_overdue(&self, now: u64) -> usize {
        match self.last_arrival {
            Some(last) => self.frames_for(now.saturating_sub(last)),
            None => 0,
        }
    }

    /// Depth the reduction window alone would justify right now.
    pub fn reduction_target(&mut self, now: u64) -> Option<usize> {
        self.reduction_window.prune(now);
        self.reduction_window.max_gap().map(|gap| self.frames_for(gap))
    }

    /// Age both windows; called from the periodic tick.
    pub fn prune(&mut self, now: u64) {
        self.lookback_window.prune(now);
        self.reduction_window.prune(now);
    }
}
