//! Kick detector: bias removal, magnitude + jerk trigger, capture and validation.
//!
//! The detector is driven one tick at a time through [`KickDetector::advance`],
//! so the capture window is a state rather than a blocking inner loop. Fed at
//! the nominal cadence it behaves exactly like the sequential loop: while a
//! capture is running nothing else can trigger, and a second kick inside the
//! window is lost.
use std::mem;

use crate::{
    calibration::{Baseline, Calibration, StabilizationGate},
    capture::{Capture, CaptureSummary},
    config::{millis, ClassificationConfig, Config, DetectorConfig, ValidationConfig},
    sensor::Sample,
    validation::{validate, Rejection},
};

/// Kick tiers by peak acceleration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KickClass {
    Contact,
    Light,
    Medium,
    Strong,
}

impl KickClass {
    #[must_use]
    pub fn classify(peak_g: f32, config: &ClassificationConfig) -> Self {
        if peak_g > config.strong_g {
            KickClass::Strong
        } else if peak_g >= config.medium_g {
            KickClass::Medium
        } else if peak_g >= config.light_g {
            KickClass::Light
        } else {
            KickClass::Contact
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            KickClass::Contact => "contact",
            KickClass::Light => "light",
            KickClass::Medium => "medium",
            KickClass::Strong => "strong",
        }
    }
}

/// An accepted kick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kick {
    pub start_ms: u64,
    pub sample_count: usize,
    pub peak_g: f32,
    /// Integrated speed before correction, in m/s.
    pub raw_speed: f32,
    /// Damped and clamped speed, in m/s.
    pub speed: f32,
    pub class: KickClass,
}

/// Net magnitude (g) and jerk (g/s) of one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    pub magnitude: f32,
    pub jerk: f32,
}

/// Turns raw samples into magnitude and jerk.
///
/// Jerk is a two-point difference against the previous magnitude, divided by
/// the nominal sample interval.
#[derive(Debug, Clone)]
pub struct MotionSampler {
    baseline: Baseline,
    interval_s: f32,
    last_magnitude: f32,
}

impl MotionSampler {
    #[must_use]
    pub fn new(baseline: Baseline, config: &DetectorConfig) -> Self {
        Self {
            baseline,
            interval_s: config.sample_interval.as_secs_f32(),
            last_magnitude: 0.0,
        }
    }

    /// Net magnitude of `sample`, in g. Does not touch the jerk state.
    #[must_use]
    pub fn net_magnitude(&self, sample: &Sample) -> f32 {
        self.baseline.remove(sample).norm()
    }

    pub fn measure(&mut self, sample: &Sample) -> Motion {
        let magnitude = self.net_magnitude(sample);
        let jerk = (magnitude - self.last_magnitude).abs() / self.interval_s;
        self.last_magnitude = magnitude;

        Motion { magnitude, jerk }
    }

    #[must_use]
    pub fn last_magnitude(&self) -> f32 {
        self.last_magnitude
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Settling,
    Idle,
    Capturing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureOutcome {
    Accepted(Kick),
    Rejected(Rejection),
}

/// What happened during one call to [`KickDetector::advance`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Phase after this tick.
    pub phase: Phase,
    /// A capture started on this tick.
    pub triggered: bool,
    /// A capture window closed on this tick.
    pub outcome: Option<CaptureOutcome>,
}

impl Tick {
    fn new(phase: Phase) -> Self {
        Self {
            phase,
            triggered: false,
            outcome: None,
        }
    }

    #[must_use]
    pub fn kick(&self) -> Option<&Kick> {
        match &self.outcome {
            Some(CaptureOutcome::Accepted(kick)) => Some(kick),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
enum TriggerState {
    Idle,
    Capturing(Capture),
}

pub struct KickDetector {
    kick_threshold_g: f32,
    kick_jerk_threshold: f32,
    debounce_ms: u64,
    window_ms: u64,
    validation: ValidationConfig,
    classification: ClassificationConfig,
    sampler: MotionSampler,
    gate: StabilizationGate,
    state: TriggerState,
    last_trigger_ms: Option<u64>,
}

impl KickDetector {
    #[must_use]
    pub fn new(config: &Config, calibration: Calibration) -> Self {
        let detector = &config.detector;

        Self {
            kick_threshold_g: detector.kick_threshold_g,
            kick_jerk_threshold: detector.kick_jerk_threshold,
            debounce_ms: millis(detector.min_time_between_kicks),
            window_ms: millis(detector.kick_window),
            validation: config.validation.clone(),
            classification: config.classification.clone(),
            sampler: MotionSampler::new(calibration.baseline, detector),
            gate: StabilizationGate::new(
                calibration.epoch_ms,
                millis(config.calibration.stabilization_time),
            ),
            state: TriggerState::Idle,
            last_trigger_ms: None,
        }
    }

    /// `true` once the stabilization period is over.
    pub fn is_armed(&mut self, now_ms: u64) -> bool {
        self.gate.is_ready(now_ms)
    }

    #[must_use]
    pub fn is_capturing(&self) -> bool {
        matches!(self.state, TriggerState::Capturing(_))
    }

    /// Start time of the most recent trigger, whether or not it was accepted.
    #[must_use]
    pub fn last_trigger_ms(&self) -> Option<u64> {
        self.last_trigger_ms
    }

    /// Feeds one tick. `sample` is `None` when the sensor had nothing new.
    ///
    /// An expired capture window is closed first, even without a sample. The
    /// sample of that tick is then handled as an idle sample.
    pub fn advance(&mut self, sample: Option<Sample>, now_ms: u64) -> Tick {
        if !self.gate.is_ready(now_ms) {
            return Tick::new(Phase::Settling);
        }

        let outcome = self.close_expired_capture(now_ms);

        let mut tick = match &mut self.state {
            TriggerState::Capturing(capture) => {
                if let Some(sample) = sample {
                    capture.add(self.sampler.net_magnitude(&sample), now_ms);
                }
                Tick::new(Phase::Capturing)
            }
            TriggerState::Idle => match sample {
                Some(sample) => self.observe(&sample, now_ms),
                None => Tick::new(Phase::Idle),
            },
        };

        tick.outcome = outcome;
        tick
    }

    fn observe(&mut self, sample: &Sample, now_ms: u64) -> Tick {
        let motion = self.sampler.measure(sample);

        if !self.should_trigger(&motion, now_ms) {
            return Tick::new(Phase::Idle);
        }

        // debounce runs from the start of this kick, whatever validation says
        self.last_trigger_ms = Some(now_ms);

        let mut capture = Capture::new(now_ms);
        capture.add(motion.magnitude, now_ms);
        self.state = TriggerState::Capturing(capture);

        tracing::debug!(
            magnitude = motion.magnitude,
            jerk = motion.jerk,
            now_ms,
            "kick triggered"
        );

        Tick {
            phase: Phase::Capturing,
            triggered: true,
            outcome: None,
        }
    }

    fn should_trigger(&self, motion: &Motion, now_ms: u64) -> bool {
        let debounced = self
            .last_trigger_ms
            .is_none_or(|last| now_ms.saturating_sub(last) >= self.debounce_ms);

        motion.magnitude > self.kick_threshold_g
            && motion.jerk > self.kick_jerk_threshold
            && debounced
    }

    fn close_expired_capture(&mut self, now_ms: u64) -> Option<CaptureOutcome> {
        let expired = matches!(
            &self.state,
            TriggerState::Capturing(capture) if capture.elapsed_ms(now_ms) >= self.window_ms
        );
        if !expired {
            return None;
        }

        let TriggerState::Capturing(capture) = mem::replace(&mut self.state, TriggerState::Idle)
        else {
            return None;
        };

        Some(self.finish(&capture.summary()))
    }

    fn finish(&self, summary: &CaptureSummary) -> CaptureOutcome {
        match validate(summary, &self.validation) {
            Ok(speed) => CaptureOutcome::Accepted(Kick {
                start_ms: summary.start_ms,
                sample_count: summary.sample_count,
                peak_g: summary.peak_g,
                raw_speed: summary.speed,
                speed,
                class: KickClass::classify(summary.peak_g, &self.classification),
            }),
            Err(rejection) => {
                tracing::debug!(
                    %rejection,
                    samples = summary.sample_count,
                    start_ms = summary.start_ms,
                    "capture rejected"
                );
                CaptureOutcome::Rejected(rejection)
            }
        }
    }
}
