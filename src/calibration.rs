//! Resting-bias calibration and the settling gate that follows it.
use nalgebra::Vector3;

use crate::{
    clock::Clock,
    config::{millis, CalibrationConfig},
    error::{Error, Result},
    sensor::{Sample, SensorSource},
};

/// Mean resting acceleration, subtracted from every later reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline(Vector3<f32>);

impl Baseline {
    #[must_use]
    pub fn new(bias: Vector3<f32>) -> Self {
        Self(bias)
    }

    /// Per-axis mean of `samples`, `None` if there are none.
    #[must_use]
    pub fn from_samples(samples: &[Sample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let sum: Vector3<f32> = samples.iter().map(Sample::as_vector).sum();
        Some(Self(sum / samples.len() as f32))
    }

    #[must_use]
    pub fn bias(&self) -> Vector3<f32> {
        self.0
    }

    /// Net (motion-induced) acceleration of `sample`, in g.
    #[must_use]
    pub fn remove(&self, sample: &Sample) -> Vector3<f32> {
        sample.as_vector() - self.0
    }
}

/// Outcome of a calibration run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub baseline: Baseline,
    /// Completion time, the start of the stabilization period.
    pub epoch_ms: u64,
}

/// Averages `config.baseline_samples` readings into a [`Baseline`].
///
/// Each read waits for the sensor to report a sample, polling every
/// `poll_interval`, and is followed by the `pacing` delay. A wait longer than
/// `availability_timeout` fails with [`Error::CalibrationTimeout`]; a zero timeout
/// waits forever.
pub fn calibrate<S, C>(
    source: &mut S,
    clock: &mut C,
    config: &CalibrationConfig,
) -> Result<Calibration>
where
    S: SensorSource,
    C: Clock,
{
    let required = config.baseline_samples.max(1);
    let mut samples = Vec::with_capacity(required);

    while samples.len() < required {
        let sample = wait_for_sample(source, clock, config, samples.len(), required)?;
        samples.push(sample);
        clock.sleep(config.pacing);
    }

    let baseline = Baseline::from_samples(&samples).ok_or_else(|| {
        Error::SensorInit("calibration finished without samples".to_string())
    })?;
    let epoch_ms = clock.now_ms();

    let bias = baseline.bias();
    tracing::info!(
        x = bias.x,
        y = bias.y,
        z = bias.z,
        samples = required,
        "calibration complete"
    );

    Ok(Calibration { baseline, epoch_ms })
}

fn wait_for_sample<S, C>(
    source: &mut S,
    clock: &mut C,
    config: &CalibrationConfig,
    collected: usize,
    required: usize,
) -> Result<Sample>
where
    S: SensorSource,
    C: Clock,
{
    let timeout_ms = millis(config.availability_timeout);
    let started = clock.now_ms();

    loop {
        if let Some(sample) = source.poll() {
            return Ok(sample);
        }

        if source.is_closed() {
            return Err(Error::SensorInit(format!(
                "sensor closed during calibration ({collected} of {required} samples)"
            )));
        }

        if timeout_ms > 0 && clock.now_ms().saturating_sub(started) >= timeout_ms {
            return Err(Error::CalibrationTimeout {
                timeout: config.availability_timeout,
                collected,
                required,
            });
        }

        clock.sleep(config.poll_interval);
    }
}

/// One-way gate that opens once the settling time has passed.
#[derive(Debug, Clone, Copy)]
pub struct StabilizationGate {
    epoch_ms: u64,
    settle_ms: u64,
    ready: bool,
}

impl StabilizationGate {
    #[must_use]
    pub fn new(epoch_ms: u64, settle_ms: u64) -> Self {
        Self {
            epoch_ms,
            settle_ms,
            ready: false,
        }
    }

    /// Returns `true` once `settle_ms` have elapsed since the epoch, and keeps
    /// returning `true` from then on.
    pub fn is_ready(&mut self, now_ms: u64) -> bool {
        if !self.ready && now_ms.saturating_sub(self.epoch_ms) >= self.settle_ms {
            self.ready = true;
            tracing::info!(now_ms, "detection armed");
        }
        self.ready
    }
}
