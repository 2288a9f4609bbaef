//! Fire-and-forget fan-out of confirmed falls to external sinks.
//!
//! `Dispatcher::submit` spawns one worker thread per registered sink and
//! returns immediately. Workers share nothing but an `Arc<FallEvent>`.
//! Sink errors and panics are caught at the worker boundary and logged; they
//! never reach the frame loop and never touch detector state. There are no
//! retries and no cancellation: a launched worker runs to completion.
//!
//! Sinks:
//! - `HttpNotifySink`: POSTs the JSON record (feature: notify-http)
//! - `AudioCommandSink`: runs the audio collaborator with only the event id
//! - `MqttSink`: publishes the JSON record (feature: sink-mqtt)
//! - `LogSink`: pretty-prints the payload to the log

use anyhow::Result;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::event::FallEvent;

mod audio;
#[cfg(feature = "notify-http")]
mod http;
#[cfg(feature = "sink-mqtt")]
mod mqtt;

pub use audio::AudioCommandSink;
#[cfg(feature = "notify-http")]
pub use http::HttpNotifySink;
#[cfg(feature = "sink-mqtt")]
pub use mqtt::MqttSink;

/// A one-way consumer of confirmed fall events.
///
/// `deliver` runs on a dedicated worker thread and may block (network I/O,
/// child processes). Implementations own their own timeouts.
pub trait EventSink: Send + Sync {
    /// Sink identifier, used in logs and worker thread names.
    fn name(&self) -> &'static str;

    /// Whether a successful `deliver` means the far end accepted the event.
    /// Sinks that only enqueue (MQTT) return false.
    fn acknowledges(&self) -> bool {
        true
    }

    fn deliver(&self, event: &FallEvent) -> Result<()>;

    /// Release connections at shutdown, after in-flight deliveries are joined.
    fn close(&self) {}
}

/// Logs the pretty-printed payload of every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn deliver(&self, event: &FallEvent) -> Result<()> {
        log::info!("fall event payload:\n{}", event.to_json_pretty()?);
        Ok(())
    }
}

#[derive(Default)]
pub struct Dispatcher {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S: EventSink + 'static>(&mut self, sink: S) {
        self.sinks.push(Arc::new(sink));
    }

    pub fn with_sink<S: EventSink + 'static>(mut self, sink: S) -> Self {
        self.register(sink);
        self
    }

    pub fn sink_names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|sink| sink.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn close(&self) {
        for sink in &self.sinks {
            sink.close();
        }
    }

    /// Hand `event` to every sink on its own worker thread and return at once.
    ///
    /// Dropping the returned handle detaches the workers.
    pub fn submit(&self, event: FallEvent) -> DispatchHandle {
        let event = Arc::new(event);
        let mut workers = Vec::with_capacity(self.sinks.len());

        for sink in &self.sinks {
            let name = sink.name();
            let sink = Arc::clone(sink);
            let event_for_worker = Arc::clone(&event);
            let spawned = thread::Builder::new()
                .name(format!("sink-{}", name))
                .spawn(move || run_sink(sink.as_ref(), &event_for_worker));
            match spawned {
                Ok(join) => workers.push(Worker { sink: name, join }),
                Err(e) => log::error!(
                    "{} sink: failed to spawn worker for event {}: {}",
                    name,
                    event.event_id(),
                    e
                ),
            }
        }

        DispatchHandle {
            event_id: event.event_id().to_string(),
            workers,
        }
    }
}

fn run_sink(sink: &dyn EventSink, event: &FallEvent) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| sink.deliver(event))) {
        Ok(Ok(())) => {
            let outcome = if sink.acknowledges() {
                "delivered"
            } else {
                "queued"
            };
            log::info!("{} sink: {} event {}", sink.name(), outcome, event.event_id());
            true
        }
        Ok(Err(e)) => {
            log::warn!(
                "{} sink: failed to deliver event {}: {:#}",
                sink.name(),
                event.event_id(),
                e
            );
            false
        }
        Err(_) => {
            log::error!(
                "{} sink: panicked while delivering event {}",
                sink.name(),
                event.event_id()
            );
            false
        }
    }
}

struct Worker {
    sink: &'static str,
    join: JoinHandle<bool>,
}

/// In-flight deliveries for one event.
pub struct DispatchHandle {
    event_id: String,
    workers: Vec<Worker>,
}

impl DispatchHandle {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn is_finished(&self) -> bool {
        self.workers.iter().all(|worker| worker.join.is_finished())
    }

    /// Block until every worker has finished.
    pub fn join(self) -> DispatchReport {
        let mut report = DispatchReport::default();
        for worker in self.workers {
            match worker.join.join() {
                Ok(true) => report.delivered.push(worker.sink),
                Ok(false) | Err(_) => report.failed.push(worker.sink),
            }
        }
        report
    }
}

/// Per-sink outcome. `delivered` includes sinks that only queued the event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: Vec<&'static str>,
    pub failed: Vec<&'static str>,
}
