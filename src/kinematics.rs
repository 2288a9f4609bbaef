//! Kinematic estimation between two consecutive pose frames.

use crate::PoseFrame;

/// Elapsed-time floor used when the clock did not advance between frames.
pub const DEFAULT_MIN_DT_SECS: f64 = 1e-6;

/// Instantaneous head motion and shoulder orientation for one frame pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KinematicSample {
    /// Horizontal head velocity, normalized units per second.
    pub vx: f64,
    /// Vertical head velocity. Positive means moving down in frame.
    pub vy: f64,
    /// Shoulder-line angle against horizontal, degrees.
    pub tilt_deg: f64,
    /// Absolute change of `tilt_deg` against the previous frame.
    pub tilt_delta: f64,
}

/// Angle of the left-to-right shoulder line in degrees, in `(-180, 180]`.
pub fn shoulder_tilt_deg(frame: &PoseFrame) -> f64 {
    let dy = frame.right_shoulder.y - frame.left_shoulder.y;
    let dx = frame.right_shoulder.x - frame.left_shoulder.x;
    dy.atan2(dx).to_degrees()
}

/// Estimate velocity and tilt change from `prev` to `current`.
///
/// A non-positive (or NaN) `dt_secs` is replaced by `min_dt_secs`, so a
/// duplicate timestamp yields a large but finite velocity. `prev_tilt_deg`
/// is the tilt recorded with the baseline; `None` gives a zero delta.
pub fn estimate(
    prev: &PoseFrame,
    current: &PoseFrame,
    prev_tilt_deg: Option<f64>,
    dt_secs: f64,
    min_dt_secs: f64,
) -> KinematicSample {
    let dt = if dt_secs > 0.0 { dt_secs } else { min_dt_secs };
    let tilt_deg = shoulder_tilt_deg(current);
    let tilt_delta = prev_tilt_deg.map_or(0.0, |prev_tilt| (tilt_deg - prev_tilt).abs());

    KinematicSample {
        vx: (current.head.x - prev.head.x) / dt,
        vy: (current.head.y - prev.head.y) / dt,
        tilt_deg,
        tilt_delta,
    }
}
