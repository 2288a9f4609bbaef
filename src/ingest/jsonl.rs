//! JSON-lines pose source.
//!
//! Each line is one observation:
//!
//! ```text
//! {"t": 0.10, "pose": {"head": [0.5, 0.85], "left_shoulder": [0.4, 0.6], "right_shoulder": [0.6, 0.6]}}
//! {"t": 0.13, "landmarks": [[0.5, 0.2], ...]}
//! {"t": 0.16, "pose": null}
//! ```
//!
//! `landmarks` is a full MediaPipe list; head and shoulders are picked by
//! index. `t` is seconds on a monotonic clock. Lines without `t` are stamped
//! with the time elapsed since the source was opened. Malformed lines are
//! logged and skipped.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::BufRead;
use std::time::{Duration, Instant};

use super::PoseSource;
use crate::{Point, PoseFrame, PoseObservation};

#[derive(Debug, Deserialize)]
struct PoseLine {
    t: Option<f64>,
    #[serde(default)]
    pose: Option<PoseFrame>,
    #[serde(default)]
    landmarks: Option<Vec<Point>>,
}

pub struct JsonLinesSource<R> {
    reader: R,
    label: String,
    opened: Instant,
    line: String,
    lines_read: u64,
    lines_skipped: u64,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R, label: impl Into<String>) -> Self {
        Self {
            reader,
            label: label.into(),
            opened: Instant::now(),
            line: String::new(),
            lines_read: 0,
            lines_skipped: 0,
        }
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    pub fn lines_skipped(&self) -> u64 {
        self.lines_skipped
    }

    fn parse_line(&self, raw: &str) -> std::result::Result<PoseObservation, String> {
        let parsed: PoseLine = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        let timestamp = match parsed.t {
            Some(t) => Duration::try_from_secs_f64(t)
                .map_err(|_| format!("timestamp {} is not a non-negative number of seconds", t))?,
            None => self.opened.elapsed(),
        };
        let pose = match (parsed.pose, parsed.landmarks) {
            (Some(pose), _) => Some(pose),
            (None, Some(landmarks)) => PoseFrame::from_landmarks(&landmarks),
            (None, None) => None,
        };
        Ok(PoseObservation { timestamp, pose })
    }
}

impl<R: BufRead> PoseSource for JsonLinesSource<R> {
    fn describe(&self) -> String {
        format!("json-lines:{}", self.label)
    }

    fn next_observation(&mut self) -> Result<Option<PoseObservation>> {
        loop {
            self.line.clear();
            let n = self
                .reader
                .read_line(&mut self.line)
                .with_context(|| format!("failed to read pose source {}", self.label))?;
            if n == 0 {
                return Ok(None);
            }
            self.lines_read += 1;

            let raw = self.line.trim();
            if raw.is_empty() {
                continue;
            }
            match self.parse_line(raw) {
                Ok(obs) => return Ok(Some(obs)),
                Err(reason) => {
                    self.lines_skipped += 1;
                    log::warn!(
                        "{}: skipping malformed line {}: {}",
                        self.label,
                        self.lines_read,
                        reason
                    );
                }
            }
        }
    }
}
