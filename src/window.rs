//! Fixed-depth sliding windows and the smoothed statistics built on them.

use std::collections::VecDeque;

use crate::kinematics::KinematicSample;

/// Default window depth for velocity and tilt histories.
pub const DEFAULT_WINDOW_LEN: usize = 5;

/// Bounded FIFO of the most recent values, oldest first.
#[derive(Clone, Debug)]
pub struct SlidingWindow<T> {
    capacity: usize,
    values: VecDeque<T>,
}

impl<T> SlidingWindow<T> {
    /// Create a window holding at most `capacity` values (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a value, evicting the oldest one when full.
    pub fn push(&mut self, value: T) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Values in temporal order, most recent last.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.values.iter()
    }

    pub fn latest(&self) -> Option<&T> {
        self.values.back()
    }
}

impl<T: Copy + Into<f64>> SlidingWindow<T> {
    /// Mean over the values currently held, `None` when empty.
    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let sum: f64 = self.values.iter().map(|v| (*v).into()).sum();
        Some(sum / self.values.len() as f64)
    }
}

/// Smoothed motion statistics over the current window contents.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowStats {
    pub avg_vx: f64,
    pub avg_vy: f64,
    /// Mean of `hypot(horizontal_weight * vx, vy)` across the window.
    pub avg_speed: f64,
    pub avg_tilt_rate: f64,
    /// Number of samples the means were taken over.
    pub samples: usize,
}

/// Keeps the `vx`, `vy` and tilt-delta histories in lockstep.
#[derive(Clone, Debug)]
pub struct RollingAggregator {
    vx: SlidingWindow<f64>,
    vy: SlidingWindow<f64>,
    tilt_delta: SlidingWindow<f64>,
    horizontal_weight: f64,
}

impl RollingAggregator {
    pub fn new(window_len: usize, horizontal_weight: f64) -> Self {
        Self {
            vx: SlidingWindow::new(window_len),
            vy: SlidingWindow::new(window_len),
            tilt_delta: SlidingWindow::new(window_len),
            horizontal_weight,
        }
    }

    /// Record one sample and return the statistics over the updated windows.
    pub fn push(&mut self, sample: &KinematicSample) -> WindowStats {
        self.vx.push(sample.vx);
        self.vy.push(sample.vy);
        self.tilt_delta.push(sample.tilt_delta);
        self.summarize()
    }

    pub fn len(&self) -> usize {
        self.vx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vx.is_empty()
    }

    /// Recompute all statistics from scratch; `None` before the first push.
    pub fn stats(&self) -> Option<WindowStats> {
        if self.is_empty() {
            return None;
        }
        Some(self.summarize())
    }

    // Callers guarantee at least one sample is held.
    fn summarize(&self) -> WindowStats {
        let samples = self.vx.len();
        let n = samples as f64;
        let weight = self.horizontal_weight;

        let mut sum_vx = 0.0_f64;
        let mut sum_vy = 0.0_f64;
        let mut sum_speed = 0.0_f64;
        for (&vx, &vy) in self.vx.iter().zip(self.vy.iter()) {
            sum_vx += vx;
            sum_vy += vy;
            sum_speed += (weight * vx).hypot(vy);
        }
        let sum_tilt: f64 = self.tilt_delta.iter().sum();

        WindowStats {
            avg_vx: sum_vx / n,
            avg_vy: sum_vy / n,
            avg_speed: sum_speed / n,
            avg_tilt_rate: sum_tilt / n,
            samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(vx: f64, vy: f64, tilt_delta: f64) -> KinematicSample {
        KinematicSample {
            vx,
            vy,
            tilt_deg: 0.0,
            tilt_delta,
        }
    }

    #[test]
    fn window_grows_until_capacity_then_evicts_oldest() {
        let mut window = SlidingWindow::new(5);
        for i in 0..3 {
            window.push(i as f64);
        }
        assert_eq!(window.len(), 3);

        for i in 3..12 {
            window.push(i as f64);
            assert!(window.len() <= 5);
        }
        let held: Vec<f64> = window.iter().copied().collect();
        assert_eq!(held, vec![7.0, 8.0, 9.0, 10.0, 11.0]);
        assert_eq!(window.latest(), Some(&11.0));
    }

    #[test]
    fn mean_uses_only_held_samples() {
        let mut window = SlidingWindow::new(5);
        assert_eq!(window.mean(), None);
        window.push(2.0);
        window.push(4.0);
        assert_eq!(window.mean(), Some(3.0));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut window = SlidingWindow::new(0);
        window.push(1.0);
        window.push(2.0);
        assert_eq!(window.capacity(), 1);
        assert_eq!(window.mean(), Some(2.0));
    }

    #[test]
    fn stats_weight_horizontal_motion() {
        let mut agg = RollingAggregator::new(5, 1.8);
        let stats = agg.push(&sample(1.0, 0.0, 0.0));

        assert!((stats.avg_speed - 1.8).abs() < 1e-12);
        assert_eq!(stats.samples, 1);
    }

    #[test]
    fn speed_is_mean_of_per_sample_magnitudes() {
        let mut agg = RollingAggregator::new(5, 1.0);
        agg.push(&sample(3.0, 4.0, 0.0));
        agg.push(&sample(-3.0, -4.0, 0.0));

        let stats = agg.stats().expect("two samples");
        // Velocities cancel out but speed does not.
        assert_eq!(stats.avg_vx, 0.0);
        assert_eq!(stats.avg_vy, 0.0);
        assert!((stats.avg_speed - 5.0).abs() < 1e-12);
    }

    #[test]
    fn stats_track_most_recent_window() {
        let mut agg = RollingAggregator::new(2, 1.8);
        agg.push(&sample(0.0, 10.0, 30.0));
        agg.push(&sample(0.0, 0.0, 0.0));
        agg.push(&sample(0.0, 0.0, 0.0));

        let stats = agg.stats().expect("samples");
        assert_eq!(stats.samples, 2);
        assert_eq!(stats.avg_vy, 0.0);
        assert_eq!(stats.avg_tilt_rate, 0.0);
    }

    #[test]
    fn empty_aggregator_has_no_stats() {
        let agg = RollingAggregator::new(5, 1.8);
        assert!(agg.is_empty());
        assert!(agg.stats().is_none());
    }
}
