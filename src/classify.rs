//! Per-frame fall predicate.
//!
//! A frame is anomalous only when all three gates pass:
//! - magnitude: smoothed speed above the speed threshold
//! - direction: moving down, or strongly sideways
//! - posture: head low in frame, or shoulders rotating quickly
//!
//! The posture gate's tilt branch covers sideways and backward falls where the
//! head never drops below the low-head line.

use crate::window::WindowStats;

pub const DEFAULT_SPEED_THRESHOLD: f64 = 0.55;
pub const DEFAULT_DIRECTIONAL_THRESHOLD: f64 = 0.25;
pub const DEFAULT_HEAD_LOW_THRESHOLD: f64 = 0.78;
pub const DEFAULT_TILT_THRESHOLD_DEG: f64 = 12.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FallThresholds {
    pub speed: f64,
    /// Minimum `avg_vy`, or minimum `|avg_vx|`, for the direction gate.
    pub directional: f64,
    /// Normalized head `y` below which (numerically above) the head counts as low.
    pub head_low: f64,
    pub tilt_rate_deg: f64,
}

impl Default for FallThresholds {
    fn default() -> Self {
        Self {
            speed: DEFAULT_SPEED_THRESHOLD,
            directional: DEFAULT_DIRECTIONAL_THRESHOLD,
            head_low: DEFAULT_HEAD_LOW_THRESHOLD,
            tilt_rate_deg: DEFAULT_TILT_THRESHOLD_DEG,
        }
    }
}

/// Which gates passed for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GateReport {
    pub magnitude: bool,
    pub downward: bool,
    pub lateral: bool,
    pub head_low: bool,
    pub tilting: bool,
}

impl GateReport {
    pub fn direction(&self) -> bool {
        self.downward || self.lateral
    }

    pub fn posture(&self) -> bool {
        self.head_low || self.tilting
    }

    pub fn is_fall(&self) -> bool {
        self.magnitude && self.direction() && self.posture()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FallClassifier {
    thresholds: FallThresholds,
}

impl FallClassifier {
    pub fn new(thresholds: FallThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &FallThresholds {
        &self.thresholds
    }

    pub fn evaluate(&self, stats: &WindowStats, head_y: f64) -> GateReport {
        let t = &self.thresholds;
        GateReport {
            magnitude: stats.avg_speed > t.speed,
            downward: stats.avg_vy > t.directional,
            lateral: stats.avg_vx.abs() > t.directional,
            head_low: head_y > t.head_low,
            tilting: stats.avg_tilt_rate > t.tilt_rate_deg,
        }
    }

    pub fn is_anomalous(&self, stats: &WindowStats, head_y: f64) -> bool {
        self.evaluate(stats, head_y).is_fall()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(avg_vx: f64, avg_vy: f64, avg_speed: f64, avg_tilt_rate: f64) -> WindowStats {
        WindowStats {
            avg_vx,
            avg_vy,
            avg_speed,
            avg_tilt_rate,
            samples: 1,
        }
    }

    #[test]
    fn head_drop_is_a_fall() {
        let classifier = FallClassifier::default();
        assert!(classifier.is_anomalous(&stats(0.0, 3.5, 3.5, 0.0), 0.85));
    }

    #[test]
    fn fast_drop_with_head_high_and_no_tilt_is_not_a_fall() {
        let classifier = FallClassifier::default();
        let report = classifier.evaluate(&stats(0.0, 3.5, 3.5, 0.0), 0.5);
        assert!(report.magnitude);
        assert!(report.direction());
        assert!(!report.posture());
        assert!(!report.is_fall());
    }

    #[test]
    fn sideways_fall_passes_via_tilt() {
        let classifier = FallClassifier::default();
        let report = classifier.evaluate(&stats(-0.6, 0.0, 1.08, 20.0), 0.4);
        assert!(report.lateral);
        assert!(report.tilting);
        assert!(report.is_fall());
    }

    #[test]
    fn upward_motion_fails_direction_gate() {
        let classifier = FallClassifier::default();
        let report = classifier.evaluate(&stats(0.0, -2.0, 2.0, 0.0), 0.9);
        assert!(!report.direction());
        assert!(!report.is_fall());
    }

    #[test]
    fn slow_motion_fails_magnitude_gate() {
        let classifier = FallClassifier::default();
        assert!(!classifier.is_anomalous(&stats(0.0, 0.3, 0.3, 30.0), 0.9));
    }

    #[test]
    fn thresholds_are_strict() {
        let classifier = FallClassifier::default();
        let t = *classifier.thresholds();
        let at_limit = stats(t.directional, t.directional, t.speed, t.tilt_rate_deg);
        let report = classifier.evaluate(&at_limit, t.head_low);
        assert_eq!(report, GateReport::default());
    }
}
