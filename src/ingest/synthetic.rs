//! Synthetic pose scenarios for `stub://` sources.
//!
//! Scenarios are deterministic so replays and tests see identical streams:
//! - `idle`: a person standing with slight sway
//! - `fall`: standing, a fast forward fall to the floor, then lying still
//! - `sideways`: standing, then toppling sideways with the shoulders rotating

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

use super::PoseSource;
use crate::{Point, PoseFrame, PoseObservation};

const STANDING_FRAMES: u64 = 60;
const FALLING_FRAMES: u64 = 6;
const HEAD_STANDING_Y: f64 = 0.30;
const HEAD_FLOOR_Y: f64 = 0.90;
const SHOULDER_DROP: f64 = 0.15;
const SHOULDER_HALF_WIDTH: f64 = 0.10;
const SWAY_AMPLITUDE: f64 = 0.003;
const SIDEWAYS_END_X: f64 = 0.15;
const SIDEWAYS_ROTATION_DEG: f64 = 90.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scenario {
    Idle,
    Fall,
    Sideways,
}

impl Scenario {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "idle" => Ok(Scenario::Idle),
            "fall" => Ok(Scenario::Fall),
            "sideways" => Ok(Scenario::Sideways),
            other => Err(anyhow!(
                "unknown synthetic scenario '{}': expected idle, fall or sideways",
                other
            )),
        }
    }

    /// Frame index of the first falling frame, if the scenario has one.
    pub fn fall_starts_at(&self) -> Option<u64> {
        match self {
            Scenario::Idle => None,
            Scenario::Fall | Scenario::Sideways => Some(STANDING_FRAMES),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub scenario: Scenario,
    pub fps: u32,
    /// Total frames before the source reports exhaustion.
    pub frames: u64,
    /// Sleep between frames to match `fps`.
    pub realtime: bool,
}

impl SyntheticConfig {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            fps: 30,
            // About ten seconds after the fall, well inside one cooldown.
            frames: STANDING_FRAMES + FALLING_FRAMES + 300,
            realtime: false,
        }
    }

    pub fn from_uri(uri: &str) -> Result<Self> {
        let name = uri
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("synthetic source URI must start with stub://"))?;
        Ok(Self::new(Scenario::parse(name)?))
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_index: u64,
    started: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            frame_index: 0,
            started: None,
        }
    }

    fn timestamp(&self, index: u64) -> Duration {
        Duration::from_micros(index * 1_000_000 / u64::from(self.config.fps.max(1)))
    }

    fn pose_at(&self, index: u64) -> PoseFrame {
        let t = self.timestamp(index).as_secs_f64();
        let sway = SWAY_AMPLITUDE * (t * std::f64::consts::TAU).sin();

        // Fall progress in [0, 1].
        let progress = match self.config.scenario.fall_starts_at() {
            Some(start) if index >= start => {
                ((index - start + 1) as f64 / FALLING_FRAMES as f64).min(1.0)
            }
            _ => 0.0,
        };

        match self.config.scenario {
            Scenario::Idle | Scenario::Fall => {
                let head_y = HEAD_STANDING_Y + progress * (HEAD_FLOOR_Y - HEAD_STANDING_Y);
                upright(0.5 + sway, head_y)
            }
            Scenario::Sideways => {
                let head_x = 0.5 + sway + progress * (SIDEWAYS_END_X - 0.5);
                let angle = (progress * SIDEWAYS_ROTATION_DEG).to_radians();
                let center = Point::new(head_x, HEAD_STANDING_Y + SHOULDER_DROP);
                let (dx, dy) = (
                    SHOULDER_HALF_WIDTH * angle.cos(),
                    SHOULDER_HALF_WIDTH * angle.sin(),
                );
                PoseFrame::new(
                    Point::new(head_x, HEAD_STANDING_Y),
                    Point::new(center.x - dx, center.y + dy),
                    Point::new(center.x + dx, center.y - dy),
                )
            }
        }
    }
}

fn upright(head_x: f64, head_y: f64) -> PoseFrame {
    let shoulder_y = head_y + SHOULDER_DROP;
    PoseFrame::new(
        Point::new(head_x, head_y),
        Point::new(head_x - SHOULDER_HALF_WIDTH, shoulder_y),
        Point::new(head_x + SHOULDER_HALF_WIDTH, shoulder_y),
    )
}

impl PoseSource for SyntheticSource {
    fn describe(&self) -> String {
        format!(
            "synthetic:{:?} ({} frames @ {} fps)",
            self.config.scenario, self.config.frames, self.config.fps
        )
    }

    fn next_observation(&mut self) -> Result<Option<PoseObservation>> {
        if self.frame_index >= self.config.frames {
            return Ok(None);
        }
        let index = self.frame_index;
        self.frame_index += 1;

        let timestamp = self.timestamp(index);
        if self.config.realtime {
            let started = *self.started.get_or_insert_with(Instant::now);
            if let Some(wait) = timestamp.checked_sub(started.elapsed()) {
                std::thread::sleep(wait);
            }
        }

        Ok(Some(PoseObservation::detected(timestamp, self.pose_at(index))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::shoulder_tilt_deg;

    fn drain(config: SyntheticConfig) -> Vec<PoseObservation> {
        let mut source = SyntheticSource::new(config);
        let mut out = Vec::new();
        while let Some(obs) = source.next_observation().unwrap() {
            out.push(obs);
        }
        out
    }

    #[test]
    fn parses_scenario_uris() {
        assert_eq!(
            SyntheticConfig::from_uri("stub://fall").unwrap().scenario,
            Scenario::Fall
        );
        assert_eq!(
            SyntheticConfig::from_uri("stub://IDLE").unwrap().scenario,
            Scenario::Idle
        );
        assert!(SyntheticConfig::from_uri("file://fall").is_err());
    }

    #[test]
    fn emits_configured_frame_count_with_monotonic_time() {
        let obs = drain(SyntheticConfig {
            frames: 90,
            ..SyntheticConfig::new(Scenario::Idle)
        });
        assert_eq!(obs.len(), 90);
        assert!(obs.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(obs[30].timestamp, Duration::from_secs(1));
    }

    #[test]
    fn fall_ends_on_the_floor() {
        let obs = drain(SyntheticConfig::new(Scenario::Fall));
        let last = obs.last().and_then(|o| o.pose).expect("pose");
        assert!((last.head.y - HEAD_FLOOR_Y).abs() < 1e-9);
        assert!(shoulder_tilt_deg(&last).abs() < 1e-9);
    }

    #[test]
    fn sideways_rotates_shoulders() {
        let obs = drain(SyntheticConfig::new(Scenario::Sideways));
        let last = obs.last().and_then(|o| o.pose).expect("pose");
        assert!((shoulder_tilt_deg(&last) + SIDEWAYS_ROTATION_DEG).abs() < 1e-6);
        assert!(last.head.y < 0.78);
    }
}
