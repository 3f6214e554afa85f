//! Accelerometer sources.
//!
//! The detector only needs two things from a sensor driver: a non-blocking
//! "is there a new sample?" poll and a read. Everything here adapts some input
//! (a driver thread, a recorded trace, a synthetic signal) to that contract.
use std::{
    fs,
    io::BufRead,
    path::Path,
    sync::mpsc::{self, TryRecvError},
    thread::{self, JoinHandle},
};

use nalgebra::Vector3;

use crate::{
    clock::Clock,
    error::{Error, Result},
};

/// One accelerometer reading, in g.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Sample {
    #[must_use]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub fn as_vector(&self) -> Vector3<f32> {
        Vector3::new(self.x, self.y, self.z)
    }
}

/// Boundary to the accelerometer driver.
pub trait SensorSource {
    /// Non-blocking check for a new sample.
    fn sample_available(&mut self) -> bool;

    /// Takes the pending sample, or `None` if there is none.
    fn read_sample(&mut self) -> Option<Sample>;

    /// `true` once the source will never produce another sample.
    fn is_closed(&self) -> bool {
        false
    }

    /// Reads a sample if one is available, without blocking.
    fn poll(&mut self) -> Option<Sample> {
        if self.sample_available() {
            self.read_sample()
        } else {
            None
        }
    }
}

impl<S: SensorSource + ?Sized> SensorSource for Box<S> {
    fn sample_available(&mut self) -> bool {
        (**self).sample_available()
    }

    fn read_sample(&mut self) -> Option<Sample> {
        (**self).read_sample()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

/// Parses a `x,y,z` line (commas and/or whitespace as separators).
pub fn parse_sample_line(line: &str, line_number: usize) -> Result<Sample> {
    let malformed = |reason: String| Error::MalformedSample {
        line: line_number,
        reason,
    };

    let fields = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|field| !field.is_empty())
        .map(|field| match field.parse::<f32>() {
            Ok(value) if value.is_finite() => Ok(value),
            Ok(_) => Err(malformed(format!("`{field}` is not a finite number"))),
            Err(e) => Err(malformed(format!("`{field}`: {e}"))),
        })
        .collect::<Result<Vec<_>>>()?;

    match fields.as_slice() {
        [x, y, z] => Ok(Sample::new(*x, *y, *z)),
        other => Err(malformed(format!("expected 3 axes, got {}", other.len()))),
    }
}

fn is_blank_or_comment(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.starts_with('#')
}

/// Replays a recorded trace, one sample per read.
#[derive(Debug, Clone)]
pub struct TraceSource {
    samples: Vec<Sample>,
    cursor: usize,
}

impl TraceSource {
    #[must_use]
    pub fn from_samples(samples: Vec<Sample>) -> Self {
        Self { samples, cursor: 0 }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let samples = contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !is_blank_or_comment(line))
            .map(|(index, line)| parse_sample_line(line, index + 1))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::from_samples(samples))
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::SensorInit(format!("cannot read trace {}: {e}", path.display())))?;

        let source = Self::parse(&contents)?;
        tracing::info!(path = %path.display(), samples = source.len(), "trace loaded");
        Ok(source)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl SensorSource for TraceSource {
    fn sample_available(&mut self) -> bool {
        self.cursor < self.samples.len()
    }

    fn read_sample(&mut self) -> Option<Sample> {
        let sample = self.samples.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(sample)
    }

    fn is_closed(&self) -> bool {
        self.cursor >= self.samples.len()
    }
}

/// Non-blocking source over samples pushed by a driver thread.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<Sample>,
    pending: Option<Sample>,
    disconnected: bool,
}

impl ChannelSource {
    #[must_use]
    pub fn new(rx: mpsc::Receiver<Sample>) -> Self {
        Self {
            rx,
            pending: None,
            disconnected: false,
        }
    }
}

impl SensorSource for ChannelSource {
    fn sample_available(&mut self) -> bool {
        if self.pending.is_none() && !self.disconnected {
            match self.rx.try_recv() {
                Ok(sample) => self.pending = Some(sample),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => self.disconnected = true,
            }
        }

        self.pending.is_some()
    }

    fn read_sample(&mut self) -> Option<Sample> {
        if self.pending.is_none() {
            self.sample_available();
        }
        self.pending.take()
    }

    fn is_closed(&self) -> bool {
        self.disconnected && self.pending.is_none()
    }
}

/// Starts a driver thread that parses `x,y,z` lines from `reader` and sends them
/// through `tx`. Malformed lines are logged and skipped; the thread exits at end
/// of input or when the receiving side is gone.
#[must_use]
pub fn spawn_reader<R>(reader: R, tx: mpsc::Sender<Sample>) -> JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    thread::spawn(move || {
        for (index, line) in reader.lines().enumerate() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    tracing::warn!(?err, "sensor input failed");
                    break;
                }
            };

            if is_blank_or_comment(&line) {
                continue;
            }

            match parse_sample_line(&line, index + 1) {
                Ok(sample) => {
                    if tx.send(sample).is_err() {
                        break;
                    }
                }
                Err(err) => tracing::warn!(%err, "skipping sample"),
            }
        }

        tracing::info!("sensor input closed");
    })
}

/// Synthetic signal evaluated at the clock's current time.
///
/// `signal` returns the sample present at a given millisecond, or `None` when
/// the sensor has nothing new at that instant.
pub struct SyntheticSource<C, F> {
    clock: C,
    signal: F,
    pending: Option<Sample>,
}

impl<C, F> SyntheticSource<C, F>
where
    C: Clock,
    F: FnMut(u64) -> Option<Sample>,
{
    #[must_use]
    pub fn new(clock: C, signal: F) -> Self {
        Self {
            clock,
            signal,
            pending: None,
        }
    }
}

impl<C, F> SensorSource for SyntheticSource<C, F>
where
    C: Clock,
    F: FnMut(u64) -> Option<Sample>,
{
    fn sample_available(&mut self) -> bool {
        if self.pending.is_none() {
            self.pending = (self.signal)(self.clock.now_ms());
        }
        self.pending.is_some()
    }

    fn read_sample(&mut self) -> Option<Sample> {
        if self.pending.is_none() {
            self.sample_available();
        }
        self.pending.take()
    }
}
