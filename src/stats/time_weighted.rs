//! Time-weighted running average of a periodically sampled value.

/// Weights each sample by how long it was the current value.
///
/// The controller samples frames-available once per tick; the weighted
/// average over the accumulation window is what drives silent-frame
/// dropping, so a single-tick spike cannot trigger an audible drop.
#[derive(Debug, Default)]
pub struct TimeWeightedAvg {
    weighted_sum: f64,
    elapsed_usecs: u64,
    last: Option<(u64, f64)>,
}

impl TimeWeightedAvg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample(&mut self, now: u64, value: f64) {
        if let Some((at, held)) = self.last {
            let dt = now.saturating_sub(at);
            self.weighted_sum += held * dt as f64;
            self.elapsed_usecs += dt;
        }
        self.last = Some((now, value));
    }

    pub fn elapsed_usecs(&self) -> u64 {
        self.elapsed_usecs
    }

    pub fn average(&self) -> f64 {
        if self.elapsed_usecs == 0 {
            return self.last.map(|(_, value)| value).unwrap_or(0.0);
        }
        self.weighted_sum / self.elapsed_usecs as f64
    }

    /// Finish the current window: zero the accumulators but keep the newest
    /// sample as the starting point of the next window.
    pub fn start_new_window(&mut self) {
        self.weighted_sum = 0.0;
        self.elapsed_usecs = 0;
    }

    /// Drop all state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_by_duration() {
        let mut avg = TimeWeightedAvg::new();
        avg.sample(0, 10.0);
        avg.sample(3, 2.0);
        // 10 held for 3us, then 2 becomes current
        avg.sample(4, 2.0);
        // 10*3 + 2*1 over 4us
        assert!((avg.average() - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_no_elapsed_time_reports_last_value() {
        let mut avg = TimeWeightedAvg::new();
        assert_eq!(avg.average(), 0.0);
        avg.sample(100, 7.0);
        assert_eq!(avg.average(), 7.0);
    }

    #[test]
    fn test_start_new_window_carries_last_sample() {
        let mut avg = TimeWeightedAvg::new();
        avg.sample(0, 4.0);
        avg.sample(10, 8.0);
        avg.start_new_window();
        assert_eq!(avg.elapsed_usecs(), 0);
        // 8 was current at t=10 and is weighted into the next window
        avg.sample(20, 0.0);
        assert!((avg.average() - 8.0).abs() < f64::EPSILON);
    }
}
