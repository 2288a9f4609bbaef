//! guardiand - Guardian Lens fall detection daemon
//!
//! This daemon:
//! 1. Pulls pose observations from the configured source (JSON lines or stub://)
//! 2. Runs the detector core on each observation, inline
//! 3. On a confirmed fall, hands the event to the dispatcher and moves on
//! 4. Logs overlay transitions and periodic health
//! 5. Stops on source exhaustion, a source error or Ctrl-C, then waits for
//!    in-flight dispatch. A second Ctrl-C exits immediately.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use guardian_lens::dispatch::{AudioCommandSink, LogSink};
use guardian_lens::{
    open_source, DispatchHandle, Dispatcher, FallDetector, FrameOutcome, GuardianConfig, Pulled,
    SourceReader,
};

#[cfg(feature = "notify-http")]
use guardian_lens::dispatch::HttpNotifySink;
#[cfg(feature = "sink-mqtt")]
use guardian_lens::dispatch::MqttSink;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);
const SOURCE_POLL_INTERVAL: Duration = Duration::from_millis(200);
const FORCED_EXIT_CODE: i32 = 130;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "GUARDIAN_CONFIG")]
    config: Option<String>,

    /// Pose source: stub://<idle|fall|sideways>, '-' for stdin, or a JSON-lines file.
    #[arg(long)]
    source: Option<String>,

    /// Do not launch the audio collaborator on confirmed falls.
    #[arg(long)]
    no_audio: bool,

    /// Stop after this many observations.
    #[arg(long)]
    max_frames: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = GuardianConfig::load_from(args.config.as_deref().map(Path::new))?;
    if let Some(source) = &args.source {
        cfg.source = source.clone();
    }
    if args.no_audio {
        cfg.audio.enabled = false;
    }

    let detector = FallDetector::new(cfg.detector.clone(), cfg.identity());
    let dispatcher = build_dispatcher(&cfg)?;
    let source_uri = cfg.source.clone();
    let source = SourceReader::spawn(move || open_source(&source_uri))?;

    log::info!(
        "guardiand running. device={} location={:?} source={}",
        cfg.device_id,
        cfg.location,
        source.describe()
    );
    log::info!(
        "speed>{} head_y>{} tilt>{}deg debounce={} window={} cooldown={}s",
        cfg.detector.speed_threshold,
        cfg.detector.head_low_threshold,
        cfg.detector.tilt_threshold_deg,
        cfg.detector.consistent_frames,
        cfg.detector.window_len,
        cfg.detector.cooldown.as_secs_f64()
    );
    log::info!("sinks: {}", dispatcher.sink_names().join(", "));

    let signals = Arc::new(AtomicU32::new(0));
    let signals_handler = signals.clone();
    ctrlc::set_handler(move || {
        if signals_handler.fetch_add(1, Ordering::SeqCst) > 0 {
            log::warn!("second interrupt, exiting without waiting for dispatch");
            std::process::exit(FORCED_EXIT_CODE);
        }
    })
    .map_err(|e| anyhow!("failed to install Ctrl-C handler: {}", e))?;

    let mut in_flight: Vec<DispatchHandle> = Vec::new();
    let result = run(
        &detector,
        &dispatcher,
        &source,
        &signals,
        args.max_frames,
        &mut in_flight,
    );

    for handle in in_flight {
        let event_id = handle.event_id().to_string();
        let report = handle.join();
        log::debug!(
            "event {} dispatch finished: delivered={:?} failed={:?}",
            event_id,
            report.delivered,
            report.failed
        );
    }
    dispatcher.close();
    result
}

/// The frame loop. Dispatch handles are pushed into `in_flight` so the caller
/// can join them whether the loop ends cleanly or on a source error.
fn run(
    detector: &FallDetector,
    dispatcher: &Dispatcher,
    source: &SourceReader,
    signals: &AtomicU32,
    max_frames: Option<u64>,
    in_flight: &mut Vec<DispatchHandle>,
) -> Result<()> {
    let mut ctx = detector.new_context();
    let mut last_overlay = ctx.overlay().to_string();
    let mut last_health_log = Instant::now();

    log::info!("{}", last_overlay);
    loop {
        if signals.load(Ordering::SeqCst) > 0 {
            log::info!("shutdown signal received");
            break;
        }
        if max_frames.is_some_and(|max| ctx.frames_seen() >= max) {
            log::info!("frame limit reached");
            break;
        }

        let obs = match source.next_timeout(SOURCE_POLL_INTERVAL) {
            Ok(Pulled::Observation(obs)) => obs,
            Ok(Pulled::Pending) => continue,
            Ok(Pulled::Exhausted) => {
                log::info!("pose source exhausted");
                break;
            }
            Err(e) => {
                log::error!("pose source failed: {:#}", e);
                return Err(e);
            }
        };

        if let FrameOutcome::Confirmed(event) = detector.process(&mut ctx, &obs) {
            in_flight.push(dispatcher.submit(event));
        }

        let overlay = ctx.overlay().to_string();
        if overlay != last_overlay {
            log::info!("{}", overlay);
            last_overlay = overlay;
        }

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            in_flight.retain(|handle| !handle.is_finished());
            log::info!(
                "frames={} evaluated={} events={} state={:?} dispatch_in_flight={}",
                ctx.frames_seen(),
                ctx.frames_evaluated(),
                ctx.events_confirmed(),
                ctx.state(),
                in_flight.len()
            );
            last_health_log = Instant::now();
        }
    }

    log::info!(
        "fall detection stopped after {} frames, {} events",
        ctx.frames_seen(),
        ctx.events_confirmed()
    );
    Ok(())
}

fn build_dispatcher(cfg: &GuardianConfig) -> Result<Dispatcher> {
    let mut dispatcher = Dispatcher::new().with_sink(LogSink);

    match &cfg.notify.url {
        #[cfg(feature = "notify-http")]
        Some(url) => dispatcher.register(HttpNotifySink::new(url.clone(), cfg.notify.timeout)),
        #[cfg(not(feature = "notify-http"))]
        Some(_) => log::warn!("notify.url set but the notify-http feature is disabled"),
        None => log::warn!("notify.url not set; remote notification disabled"),
    }

    if cfg.audio.enabled {
        dispatcher.register(AudioCommandSink::new(
            &cfg.audio.command,
            cfg.audio.event_id_env.clone(),
        )?);
    }

    if let Some(mqtt) = &cfg.mqtt {
        #[cfg(feature = "sink-mqtt")]
        dispatcher.register(MqttSink::connect(mqtt)?);
        #[cfg(not(feature = "sink-mqtt"))]
        log::warn!(
            "mqtt host {} configured but the sink-mqtt feature is disabled",
            mqtt.host
        );
    }

    Ok(dispatcher)
}
