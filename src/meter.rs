//! The control loop: calibrate, settle, then sample-detect-emit at a fixed cadence.
use std::time::Duration;

use crate::{
    calibration::{calibrate, Calibration},
    clock::Clock,
    config::Config,
    detector::{KickDetector, Tick},
    error::Result,
    sensor::SensorSource,
    telemetry::TelemetryEmitter,
    transport::Transport,
};

pub struct KickMeter<S, T, C> {
    source: S,
    clock: C,
    detector: KickDetector,
    emitter: TelemetryEmitter<T>,
    sample_interval: Duration,
    settle_poll: Duration,
}

impl<S, T, C> KickMeter<S, T, C>
where
    S: SensorSource,
    T: Transport,
    C: Clock,
{
    /// Calibrates against `source` and returns a meter ready to tick.
    ///
    /// Calibration failure is fatal: no meter is built without a baseline.
    pub fn start(config: &Config, mut source: S, transport: T, mut clock: C) -> Result<Self> {
        let calibration = calibrate(&mut source, &mut clock, &config.calibration)?;
        Ok(Self::with_calibration(config, source, transport, clock, calibration))
    }

    #[must_use]
    pub fn with_calibration(
        config: &Config,
        source: S,
        transport: T,
        clock: C,
        calibration: Calibration,
    ) -> Self {
        Self {
            source,
            clock,
            detector: KickDetector::new(config, calibration),
            emitter: TelemetryEmitter::new(transport),
            sample_interval: config.detector.sample_interval,
            settle_poll: config.calibration.settle_poll,
        }
    }

    /// One loop iteration, including its pacing delay.
    ///
    /// While settling, the sensor is not read and the loop sleeps in coarse
    /// steps. Afterwards each tick reads at most one sample.
    pub fn tick(&mut self) -> Result<Tick> {
        let now_ms = self.clock.now_ms();

        if !self.detector.is_armed(now_ms) {
            self.clock.sleep(self.settle_poll);
            return Ok(self.detector.advance(None, now_ms));
        }

        let sample = self.source.poll();
        let tick = self.detector.advance(sample, now_ms);

        if let Some(kick) = tick.kick() {
            self.emitter.emit(kick)?;
        }

        self.clock.sleep(self.sample_interval);
        Ok(tick)
    }

    /// Ticks until the source is closed.
    pub fn run(&mut self) -> Result<()> {
        while !self.source.is_closed() || self.detector.is_capturing() {
            self.tick()?;
        }

        tracing::info!(kicks = self.emitter.kicks_sent(), "sensor closed, stopping");
        Ok(())
    }

    /// Ticks until `deadline_ms` on the meter's clock.
    pub fn run_until(&mut self, deadline_ms: u64) -> Result<()> {
        while self.clock.now_ms() < deadline_ms {
            self.tick()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn detector(&self) -> &KickDetector {
        &self.detector
    }

    #[must_use]
    pub fn kicks_sent(&self) -> u64 {
        self.emitter.kicks_sent()
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        self.emitter.transport()
    }
}
