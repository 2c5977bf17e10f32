//! Sliding time window over inter-packet arrival gaps.

use std::collections::VecDeque;

use crate::stats::USECS_PER_SECOND;

/// A bounded, time-windowed collection of gap samples.
///
/// Each entry pairs an arrival timestamp with the gap (both in microseconds)
/// measured since the previous packet. Entries older than the window are
/// pruned on insert, or explicitly via [`prune`](Self::prune) from the
/// periodic tick. The window produces the two derived scalars the depth
/// estimators need: the maximum gap, and the mean plus spread.
#[derive(Debug)]
pub struct GapWindow {
    samples: VecDeque<(u64, u64)>,
    window_usecs: u64,
}

impl GapWindow {
    pub fn new(window_secs: u64) -> Self {
        Self {
            samples: VecDeque::new(),
            window_usecs: window_secs * USECS_PER_SECOND,
        }
    }

    /// Change the window length. Entries that fall outside the new window
    /// are dropped on the next insert or prune.
    pub fn set_window_secs(&mut self, window_secs: u64) {
        self.window_usecs = window_secs * USECS_PER_SECOND;
    }

    pub fn add(&mut self, now: u64, gap_usecs: u64) {
        self.prune(now);
        self.samples.push_back((now, gap_usecs));
    }

    /// Drop entries older than the window, measured back from `now`.
    pub fn prune(&mut self, now: u64) {
        let horizon = now.saturating_sub(self.window_usecs);
        while let Some(&(at, _)) = self.samples.front() {
            if at >= horizon {
                break;
            }
            self.samples.pop_front();
        }
    }

    pub fn max_gap(&self) -> Option<u64> {
        self.samples.iter().map(|&(_, gap)| gap).max()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: u64 = self.samples.iter().map(|&(_, gap)| gap).sum();
        Some(sum as f64 / self.samples.len() as f64)
    }

    /// Population standard deviation of the gaps in the window.
    pub fn stddev(&self) -> Option<f64> {
        let mean = self.mean()?;
        let variance = self
            .samples
            .iter()
            .map(|&(_, gap)| {
                let diff = gap as f64 - mean;
                diff * diff
            })
            .sum::<f64>()
            / self.samples.len() as f64;
        Some(variance.sqrt())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_gap_within_window() {
        let mut window = GapWindow::new(10);
        window.add(1_000_000, 5_000);
        window.add(2_000_000, 20_000);
        window.add(3_000_000, 10_000);
        assert_eq!(window.max_gap(), Some(20_000));
    }

    #[test]
    fn test_old_entries_expire() {
        let mut window = GapWindow::new(10);
        window.add(1_000_000, 50_000);
        window.add(12_000_000, 5_000);
        // the 50ms gap was observed more than 10s before the last insert
        assert_eq!(window.max_gap(), Some(5_000));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_prune_without_insert() {
        let mut window = GapWindow::new(1);
        window.add(0, 7_000);
        window.prune(5 * USECS_PER_SECOND);
        assert!(window.is_empty());
        assert_eq!(window.max_gap(), None);
    }

    #[test]
    fn test_mean_and_stddev() {
        let mut window = GapWindow::new(10);
        for (i, gap) in [2_000u64, 4_000, 4_000, 4_000, 5_000, 5_000, 7_000, 9_000]
            .iter()
            .enumerate()
        {
            window.add(i as u64 * 1_000, *gap);
        }
        let mean = window.mean().unwrap();
        let stddev = window.stddev().unwrap();
        assert!((mean - 5_000.0).abs() < f64::EPSILON);
        assert!((stddev - 2_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_sample_has_zero_spread() {
        let mut window = GapWindow::new(10);
        window.add(0, 3_000);
        assert_eq!(window.stddev(), Some(0.0));
    }

    #[test]
    fn test_shrinking_window_drops_entries() {
        let mut window = GapWindow::new(60);
        window.add(0, 9_000);
        window.add(30 * USECS_PER_SECOND, 1_000);
        window.set_window_secs(5);
        window.prune(30 * USECS_PER_SECOND);
        assert_eq!(window.max_gap(), Some(1_000));
    }
}
