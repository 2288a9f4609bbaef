//! Guardian Lens
//!
//! This crate implements the decision core of a pose-based fall detector.
//!
//! # Architecture
//!
//! Each pose observation flows strictly downward through five stages:
//!
//! 1. **Kinematics**: two consecutive frames become head velocity and shoulder tilt.
//! 2. **Rolling windows**: fixed-depth histories produce smoothed statistics.
//! 3. **Classifier**: a magnitude, direction and posture gate per frame.
//! 4. **Debounce + state machine**: a hysteresis counter confirms a fall, then a
//!    cooldown suppresses re-triggering.
//! 5. **Dispatch**: the immutable `FallEvent` is fanned out to sinks on worker
//!    threads. This is the only point where work leaves the frame loop.
//!
//! # Module Structure
//!
//! - `kinematics`, `window`, `classify`, `detector`: the synchronous core
//! - `event`: the alert record handed to sinks
//! - `dispatch`: fire-and-forget sink fan-out (HTTP, audio command, MQTT, log)
//! - `ingest`: pose sources (JSON lines, synthetic `stub://` scenarios)
//! - `config`: layered file + environment configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod classify;
pub mod config;
pub mod detector;
pub mod dispatch;
pub mod event;
pub mod ingest;
pub mod kinematics;
pub mod window;

pub use classify::{FallClassifier, GateReport};
pub use config::{DetectorSettings, GuardianConfig};
pub use detector::{
    ConfirmationCounter, DetectorContext, DetectorState, FallDetector, FrameOutcome, Overlay,
};
pub use dispatch::{DispatchHandle, Dispatcher, EventSink};
pub use event::{EventIdentity, EventKind, FallEvent};
pub use ingest::{open_source, JsonLinesSource, PoseSource, Pulled, SourceReader, SyntheticSource};
pub use kinematics::{estimate, shoulder_tilt_deg, KinematicSample};
pub use window::{RollingAggregator, SlidingWindow, WindowStats};

// -------------------- Landmarks --------------------

/// MediaPipe Pose landmark index of the nose, used as the head position.
pub const LANDMARK_NOSE: usize = 0;
/// MediaPipe Pose landmark index of the left shoulder.
pub const LANDMARK_LEFT_SHOULDER: usize = 11;
/// MediaPipe Pose landmark index of the right shoulder.
pub const LANDMARK_RIGHT_SHOULDER: usize = 12;

/// Normalized image coordinate. `y` grows downward, so a larger `y` is lower in frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

/// The three landmarks the detector reads from a single observation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseFrame {
    pub head: Point,
    pub left_shoulder: Point,
    pub right_shoulder: Point,
}

impl PoseFrame {
    pub const fn new(head: Point, left_shoulder: Point, right_shoulder: Point) -> Self {
        Self {
            head,
            left_shoulder,
            right_shoulder,
        }
    }

    /// Pick head and shoulders out of a full MediaPipe landmark list.
    ///
    /// Returns `None` when the list is too short to contain both shoulders.
    pub fn from_landmarks(landmarks: &[Point]) -> Option<Self> {
        Some(Self {
            head: *landmarks.get(LANDMARK_NOSE)?,
            left_shoulder: *landmarks.get(LANDMARK_LEFT_SHOULDER)?,
            right_shoulder: *landmarks.get(LANDMARK_RIGHT_SHOULDER)?,
        })
    }
}

/// One tick of the upstream pose source.
///
/// `pose` is `None` when the estimator found no body in the frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoseObservation {
    /// Monotonic capture time, relative to an arbitrary origin.
    pub timestamp: Duration,
    pub pose: Option<PoseFrame>,
}

impl PoseObservation {
    pub fn detected(timestamp: Duration, pose: PoseFrame) -> Self {
        Self {
            timestamp,
            pose: Some(pose),
        }
    }

    pub fn empty(timestamp: Duration) -> Self {
        Self {
            timestamp,
            pose: None,
        }
    }
}
