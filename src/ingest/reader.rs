//! Background reader that decouples a blocking pose source from the frame loop.
//!
//! Sources such as stdin or a FIFO can block indefinitely inside
//! `next_observation`. The reader owns the source on its own thread and hands
//! observations over a bounded channel, so the loop can wait with a timeout
//! and still notice shutdown requests. A reader thread stuck in a read is
//! abandoned at process exit.

use anyhow::{anyhow, Result};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::PoseSource;
use crate::PoseObservation;

/// How far the reader may run ahead of the loop.
const READ_AHEAD: usize = 64;

type Pull = Result<Option<PoseObservation>>;

/// Result of waiting on the reader.
#[derive(Debug, PartialEq)]
pub enum Pulled {
    Observation(PoseObservation),
    /// The source reported end of stream.
    Exhausted,
    /// Nothing arrived within the timeout.
    Pending,
}

pub struct SourceReader {
    description: String,
    rx: Receiver<Pull>,
    _thread: JoinHandle<()>,
}

impl SourceReader {
    /// Open a source on a dedicated thread.
    ///
    /// `open` runs on the reader thread, so sources that are not `Send`
    /// (e.g. a locked stdin) can be used. Errors from `open` are returned here.
    pub fn spawn<F>(open: F) -> Result<Self>
    where
        F: FnOnce() -> Result<Box<dyn PoseSource>> + Send + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<String>>();
        let (tx, rx) = mpsc::sync_channel::<Pull>(READ_AHEAD);

        let thread = thread::Builder::new()
            .name("pose-reader".to_string())
            .spawn(move || {
                let mut source = match open() {
                    Ok(source) => source,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if ready_tx.send(Ok(source.describe())).is_err() {
                    return;
                }
                loop {
                    let pulled = source.next_observation();
                    let done = !matches!(pulled, Ok(Some(_)));
                    if tx.send(pulled).is_err() || done {
                        break;
                    }
                }
            })
            .map_err(|e| anyhow!("failed to spawn pose reader thread: {}", e))?;

        let description = ready_rx
            .recv()
            .map_err(|_| anyhow!("pose reader stopped before opening the source"))??;

        Ok(Self {
            description,
            rx,
            _thread: thread,
        })
    }

    pub fn describe(&self) -> &str {
        &self.description
    }

    /// Wait up to `timeout` for the next observation.
    ///
    /// Source read errors are passed through.
    pub fn next_timeout(&self, timeout: Duration) -> Result<Pulled> {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(Some(obs))) => Ok(Pulled::Observation(obs)),
            Ok(Ok(None)) => Ok(Pulled::Exhausted),
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => Ok(Pulled::Pending),
            Err(RecvTimeoutError::Disconnected) => {
                Err(anyhow!("pose reader thread stopped unexpectedly"))
            }
        }
    }
}
