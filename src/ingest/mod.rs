//! Pose sources.
//!
//! This module provides the sources that feed `PoseObservation`s to the
//! detector loop:
//! - JSON lines from a file or stdin (output of an external pose estimator)
//! - Synthetic `stub://` scenarios (demos and tests)
//!
//! Sources are pulled one observation at a time. `Ok(None)` means the stream
//! is exhausted, which the loop treats as a clean shutdown. An observation
//! without landmarks is a transient gap, not an error.

pub mod jsonl;
pub mod reader;
pub mod synthetic;

use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::BufReader;

use crate::PoseObservation;

pub use jsonl::JsonLinesSource;
pub use reader::{Pulled, SourceReader};
pub use synthetic::{Scenario, SyntheticConfig, SyntheticSource};

pub trait PoseSource {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    /// Block until the next observation is available.
    fn next_observation(&mut self) -> Result<Option<PoseObservation>>;
}

/// Open a source from a URI.
///
/// - `stub://<scenario>`: synthetic scenario, paced in real time
/// - `-`: JSON lines on stdin
/// - anything else: a local JSON-lines file
pub fn open_source(uri: &str) -> Result<Box<dyn PoseSource>> {
    let uri = uri.trim();
    if uri.starts_with("stub://") {
        let config = SyntheticConfig {
            realtime: true,
            ..SyntheticConfig::from_uri(uri)?
        };
        return Ok(Box::new(SyntheticSource::new(config)));
    }
    if uri == "-" {
        return Ok(Box::new(JsonLinesSource::new(
            std::io::stdin().lock(),
            "stdin",
        )));
    }
    if uri.is_empty() || uri.contains("://") {
        return Err(anyhow!(
            "pose source must be stub://<scenario>, '-' or a local file path, got '{}'",
            uri
        ));
    }
    let file = File::open(uri).with_context(|| format!("failed to open pose source {}", uri))?;
    Ok(Box::new(JsonLinesSource::new(BufReader::new(file), uri)))
}
