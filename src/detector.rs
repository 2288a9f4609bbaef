//! Debounce counter and the Monitoring/Cooldown state machine.
//!
//! All mutable detection state lives in `DetectorContext`, which the loop
//! driver owns and passes to `FallDetector::process` on every frame. The
//! detector itself only holds immutable settings, so one detector can drive
//! any number of independent contexts (handy for replay and tests).
//!
//! Per frame:
//! 1. In `Cooldown`, only the expiry check runs. The pose is not read and the
//!    baseline stays frozen at the confirming frame.
//! 2. Frames without landmarks are skipped and keep the previous baseline.
//! 3. The first frame with landmarks only becomes the baseline.
//! 4. Otherwise: estimate, aggregate, classify, debounce. Reaching the
//!    debounce target confirms a fall and enters `Cooldown`.
//!
//! On cooldown expiry the counter is reset but the rolling windows keep their
//! pre-cooldown samples.

use std::fmt;
use std::time::Duration;

use crate::classify::{FallClassifier, GateReport};
use crate::config::DetectorSettings;
use crate::event::{EventIdentity, FallEvent};
use crate::kinematics::{estimate, shoulder_tilt_deg};
use crate::window::{RollingAggregator, WindowStats};
use crate::{PoseFrame, PoseObservation};

/// Hysteresis counter bounded to `[0, target]`.
///
/// A positive frame adds one (saturating at `target`), a negative frame
/// removes one (floor 0), so a single missed frame does not erase progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfirmationCounter {
    value: u32,
    target: u32,
}

impl ConfirmationCounter {
    pub fn new(target: u32) -> Self {
        Self {
            value: 0,
            target: target.max(1),
        }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    /// Record one frame's predicate. Returns true once the target is reached.
    pub fn record(&mut self, anomaly: bool) -> bool {
        self.value = if anomaly {
            (self.value + 1).min(self.target)
        } else {
            self.value.saturating_sub(1)
        };
        self.value >= self.target
    }

    pub fn reset(&mut self) {
        self.value = 0;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorState {
    Monitoring,
    /// Entered at `since` (source timestamp of the confirming frame).
    Cooldown { since: Duration },
}

impl DetectorState {
    pub fn is_cooldown(&self) -> bool {
        matches!(self, DetectorState::Cooldown { .. })
    }
}

/// Operator-facing display state. Mirrors `DetectorState` exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Overlay<'a> {
    Monitoring,
    FallAlert { timestamp: &'a str },
}

impl fmt::Display for Overlay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Overlay::Monitoring => write!(f, "Monitoring..."),
            Overlay::FallAlert { timestamp } => write!(f, "FALL DETECTED! Time: {}", timestamp),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Baseline {
    frame: PoseFrame,
    tilt_deg: f64,
    at: Duration,
}

/// Mutable detection state for one pose stream.
#[derive(Clone, Debug)]
pub struct DetectorContext {
    baseline: Option<Baseline>,
    aggregator: RollingAggregator,
    counter: ConfirmationCounter,
    state: DetectorState,
    last_timestamp: Option<String>,
    frames_seen: u64,
    frames_evaluated: u64,
    events_confirmed: u64,
}

impl DetectorContext {
    pub fn new(settings: &DetectorSettings) -> Self {
        Self {
            baseline: None,
            aggregator: RollingAggregator::new(settings.window_len, settings.horizontal_weight),
            counter: ConfirmationCounter::new(settings.consistent_frames),
            state: DetectorState::Monitoring,
            last_timestamp: None,
            frames_seen: 0,
            frames_evaluated: 0,
            events_confirmed: 0,
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn counter(&self) -> &ConfirmationCounter {
        &self.counter
    }

    pub fn aggregator(&self) -> &RollingAggregator {
        &self.aggregator
    }

    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    /// Wall-clock time of the most recent confirmed fall.
    pub fn last_timestamp(&self) -> Option<&str> {
        self.last_timestamp.as_deref()
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    pub fn frames_evaluated(&self) -> u64 {
        self.frames_evaluated
    }

    pub fn events_confirmed(&self) -> u64 {
        self.events_confirmed
    }

    pub fn overlay(&self) -> Overlay<'_> {
        match self.state {
            DetectorState::Monitoring => Overlay::Monitoring,
            DetectorState::Cooldown { .. } => Overlay::FallAlert {
                timestamp: self.last_timestamp.as_deref().unwrap_or_default(),
            },
        }
    }
}

/// What a single frame did to the context.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameOutcome {
    /// No landmarks in this frame; nothing changed.
    NoPose,
    /// First usable frame, stored as the baseline.
    Baseline,
    /// Frame classified; the fall was not (yet) confirmed.
    Evaluated {
        stats: WindowStats,
        gates: GateReport,
        counter: u32,
    },
    /// Fall confirmed on this frame; the detector is now in cooldown.
    Confirmed(FallEvent),
    /// In cooldown; the frame was consumed without classification.
    Suppressed { remaining: Duration },
    /// Cooldown expired on this frame; monitoring resumes with the next one.
    CooldownEnded,
}

impl FrameOutcome {
    pub fn event(&self) -> Option<&FallEvent> {
        match self {
            FrameOutcome::Confirmed(event) => Some(event),
            _ => None,
        }
    }

    pub fn into_event(self) -> Option<FallEvent> {
        match self {
            FrameOutcome::Confirmed(event) => Some(event),
            _ => None,
        }
    }
}

pub struct FallDetector {
    settings: DetectorSettings,
    classifier: FallClassifier,
    identity: EventIdentity,
}

impl FallDetector {
    pub fn new(settings: DetectorSettings, identity: EventIdentity) -> Self {
        let classifier = FallClassifier::new(settings.thresholds());
        Self {
            settings,
            classifier,
            identity,
        }
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    pub fn identity(&self) -> &EventIdentity {
        &self.identity
    }

    /// Fresh context in `Monitoring` with empty windows and no baseline.
    pub fn new_context(&self) -> DetectorContext {
        DetectorContext::new(&self.settings)
    }

    /// Advance `ctx` by one observation.
    pub fn process(&self, ctx: &mut DetectorContext, obs: &PoseObservation) -> FrameOutcome {
        ctx.frames_seen += 1;

        if let DetectorState::Cooldown { since } = ctx.state {
            let elapsed = obs.timestamp.saturating_sub(since);
            if elapsed >= self.settings.cooldown {
                ctx.state = DetectorState::Monitoring;
                ctx.counter.reset();
                log::info!("cooldown finished, resuming monitoring");
                return FrameOutcome::CooldownEnded;
            }
            return FrameOutcome::Suppressed {
                remaining: self.settings.cooldown - elapsed,
            };
        }

        let Some(pose) = obs.pose else {
            return FrameOutcome::NoPose;
        };

        let current = Baseline {
            frame: pose,
            tilt_deg: shoulder_tilt_deg(&pose),
            at: obs.timestamp,
        };
        let Some(prev) = ctx.baseline.replace(current) else {
            log::debug!("baseline acquired at t={:.3}s", obs.timestamp.as_secs_f64());
            return FrameOutcome::Baseline;
        };

        let dt = obs.timestamp.as_secs_f64() - prev.at.as_secs_f64();
        // A level baseline (0°) is a real reading: rotating away from it counts as tilt.
        let sample = estimate(
            &prev.frame,
            &pose,
            Some(prev.tilt_deg),
            dt,
            self.settings.min_dt_secs,
        );
        let stats = ctx.aggregator.push(&sample);
        let gates = self.classifier.evaluate(&stats, pose.head.y);
        ctx.frames_evaluated += 1;

        let confirmed = ctx.counter.record(gates.is_fall());
        log::debug!(
            "vx={:.3} vy={:.3} speed={:.3} tilt_rate={:.2} head_y={:.3} gates={:?} counter={}/{}",
            stats.avg_vx,
            stats.avg_vy,
            stats.avg_speed,
            stats.avg_tilt_rate,
            pose.head.y,
            gates,
            ctx.counter.value(),
            ctx.counter.target()
        );

        if !confirmed {
            return FrameOutcome::Evaluated {
                stats,
                gates,
                counter: ctx.counter.value(),
            };
        }

        ctx.counter.reset();
        let event = FallEvent::confirm(&self.identity);
        ctx.state = DetectorState::Cooldown {
            since: obs.timestamp,
        };
        ctx.last_timestamp = Some(event.timestamp().to_string());
        ctx.events_confirmed += 1;
        log::warn!(
            "FALL DETECTED at {} (event_id={})",
            event.timestamp(),
            event.event_id()
        );
        FrameOutcome::Confirmed(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Point;

    fn detector() -> FallDetector {
        FallDetector::new(
            DetectorSettings::default(),
            EventIdentity::new("gd001", "test bench"),
        )
    }

    fn pose(head_y: f64) -> PoseFrame {
        PoseFrame::new(
            Point::new(0.5, head_y),
            Point::new(0.4, 0.6),
            Point::new(0.6, 0.6),
        )
    }

    fn at(ms: u64, head_y: f64) -> PoseObservation {
        PoseObservation::detected(Duration::from_millis(ms), pose(head_y))
    }

    #[test]
    fn counter_saturates_and_floors() {
        let mut counter = ConfirmationCounter::new(2);
        assert!(!counter.record(false));
        assert_eq!(counter.value(), 0);
        assert!(!counter.record(true));
        assert!(counter.record(true));
        assert!(counter.record(true));
        assert_eq!(counter.value(), 2);
        assert!(!counter.record(false));
        assert_eq!(counter.value(), 1);
    }

    #[test]
    fn counter_hysteresis_survives_single_miss() {
        let mut counter = ConfirmationCounter::new(3);
        counter.record(true);
        counter.record(true);
        counter.record(false);
        assert_eq!(counter.value(), 1);
        counter.record(true);
        assert!(counter.record(true));
    }

    #[test]
    fn first_frame_becomes_baseline() {
        let det = detector();
        let mut ctx = det.new_context();
        assert_eq!(det.process(&mut ctx, &at(0, 0.5)), FrameOutcome::Baseline);
        assert!(ctx.has_baseline());
        assert!(ctx.aggregator().is_empty());
    }

    #[test]
    fn missing_landmarks_keep_baseline() {
        let det = detector();
        let mut ctx = det.new_context();
        det.process(&mut ctx, &at(0, 0.5));
        let outcome = det.process(&mut ctx, &PoseObservation::empty(Duration::from_millis(50)));
        assert_eq!(outcome, FrameOutcome::NoPose);

        // dt is measured from the retained baseline at t=0, not the gap frame.
        match det.process(&mut ctx, &at(100, 0.85)) {
            FrameOutcome::Evaluated { stats, gates, .. } => {
                assert!((stats.avg_vy - 3.5).abs() < 1e-9);
                assert!(gates.is_fall());
            }
            other => panic!("expected evaluation, got {:?}", other),
        }
    }

    #[test]
    fn head_drop_predicate_is_true() {
        let det = detector();
        let mut ctx = det.new_context();
        det.process(&mut ctx, &at(0, 0.5));
        match det.process(&mut ctx, &at(100, 0.85)) {
            FrameOutcome::Evaluated {
                stats,
                gates,
                counter,
            } => {
                assert!((stats.avg_vy - 3.5).abs() < 1e-9);
                assert!(stats.avg_speed > 0.55);
                assert!(gates.head_low);
                assert!(gates.is_fall());
                assert_eq!(counter, 1);
            }
            other => panic!("expected evaluation, got {:?}", other),
        }
    }

    #[test]
    fn two_anomalous_frames_confirm_once() {
        let det = detector();
        let mut ctx = det.new_context();
        det.process(&mut ctx, &at(0, 0.5));
        assert!(det.process(&mut ctx, &at(100, 0.85)).event().is_none());

        let outcome = det.process(&mut ctx, &at(200, 0.95));
        let event = outcome.into_event().expect("fall confirmed");
        assert_eq!(event.device_id(), "gd001");
        assert!(ctx.state().is_cooldown());
        assert_eq!(ctx.counter().value(), 0);
        assert_eq!(ctx.last_timestamp(), Some(event.timestamp()));

        let third = det.process(&mut ctx, &at(300, 0.99));
        assert!(matches!(third, FrameOutcome::Suppressed { .. }));
        assert_eq!(ctx.events_confirmed(), 1);
    }

    #[test]
    fn anomalous_frames_during_cooldown_leave_counter_alone() {
        let det = detector();
        let mut ctx = det.new_context();
        det.process(&mut ctx, &at(0, 0.5));
        det.process(&mut ctx, &at(100, 0.85));
        assert!(det.process(&mut ctx, &at(200, 0.95)).event().is_some());
        let evaluated = ctx.frames_evaluated();

        // Keep the head dropping hard, well inside the 30 s window.
        for (i, ms) in [300, 400, 1_000, 15_000, 29_900].into_iter().enumerate() {
            let outcome = det.process(&mut ctx, &at(ms, 0.96 + 0.01 * i as f64));
            assert!(matches!(outcome, FrameOutcome::Suppressed { .. }));
            assert_eq!(ctx.counter().value(), 0);
            assert_eq!(ctx.frames_evaluated(), evaluated);
            assert_eq!(
                ctx.state(),
                DetectorState::Cooldown {
                    since: Duration::from_millis(200)
                }
            );
        }
        assert_eq!(ctx.events_confirmed(), 1);
    }

    #[test]
    fn static_frames_never_confirm() {
        let det = detector();
        let mut ctx = det.new_context();
        for i in 0..100 {
            let outcome = det.process(&mut ctx, &at(i * 33, 0.5));
            assert!(outcome.event().is_none());
            assert_eq!(ctx.counter().value(), 0);
        }
        assert_eq!(ctx.state(), DetectorState::Monitoring);
        assert_eq!(ctx.frames_evaluated(), 99);
    }

    #[test]
    fn overlay_mirrors_state() {
        let det = detector();
        let mut ctx = det.new_context();
        assert_eq!(ctx.overlay().to_string(), "Monitoring...");

        det.process(&mut ctx, &at(0, 0.5));
        det.process(&mut ctx, &at(100, 0.85));
        let event = det
            .process(&mut ctx, &at(200, 0.95))
            .into_event()
            .expect("confirmed");
        assert_eq!(
            ctx.overlay().to_string(),
            format!("FALL DETECTED! Time: {}", event.timestamp())
        );
    }

    #[test]
    fn cooldown_expiry_resets_counter_but_keeps_windows() {
        let det = detector();
        let mut ctx = det.new_context();
        det.process(&mut ctx, &at(0, 0.5));
        det.process(&mut ctx, &at(100, 0.85));
        det.process(&mut ctx, &at(200, 0.95));
        let held = ctx.aggregator().len();

        let remaining = match det.process(&mut ctx, &at(29_000, 0.5)) {
            FrameOutcome::Suppressed { remaining } => remaining,
            other => panic!("expected suppression, got {:?}", other),
        };
        assert_eq!(remaining, Duration::from_millis(1_200));

        assert_eq!(
            det.process(&mut ctx, &at(30_200, 0.5)),
            FrameOutcome::CooldownEnded
        );
        assert_eq!(ctx.state(), DetectorState::Monitoring);
        assert_eq!(ctx.counter().value(), 0);
        assert_eq!(ctx.aggregator().len(), held);
        assert_eq!(ctx.overlay(), Overlay::Monitoring);
    }
}
