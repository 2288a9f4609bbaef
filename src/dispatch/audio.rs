use anyhow::{anyhow, Context, Result};
use std::process::{Command, Stdio};

use super::EventSink;
use crate::event::FallEvent;

/// Runs the audio collaborator (prompt, record, upload) for one event.
///
/// Only the event id crosses this boundary, exported in an environment
/// variable; the collaborator names its recording after it. The worker waits
/// for the child to exit so failures can be logged.
pub struct AudioCommandSink {
    program: String,
    args: Vec<String>,
    event_id_env: String,
}

impl AudioCommandSink {
    pub fn new(command: &[String], event_id_env: impl Into<String>) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| anyhow!("audio command must name a program"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            event_id_env: event_id_env.into(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl EventSink for AudioCommandSink {
    fn name(&self) -> &'static str {
        "audio"
    }

    fn deliver(&self, event: &FallEvent) -> Result<()> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .env(&self.event_id_env, event.event_id())
            .stdin(Stdio::null())
            .status()
            .with_context(|| format!("failed to launch audio command {}", self.program))?;
        if !status.success() {
            return Err(anyhow!(
                "audio command {} exited with {}",
                self.program,
                status
            ));
        }
        Ok(())
    }
}
