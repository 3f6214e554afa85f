//! Telemetry records and their fixed-size wire encoding.
//!
//! A record is a JSON object with exactly two numbers, e.g.
//! `{"accel":39.24,"speed":6.34}`. It is encoded into an intermediate buffer of
//! at most [`ENCODE_LIMIT`] bytes, then copied into a [`PAYLOAD_CAPACITY`] byte
//! transmission buffer.
use serde::{Deserialize, Serialize};

use crate::{
    config::GRAVITY,
    detector::Kick,
    error::{Error, Result},
    transport::Transport,
};

/// Size of the transmission buffer handed to the transport.
pub const PAYLOAD_CAPACITY: usize = 64;
/// Upper bound on the intermediate encoding.
pub const ENCODE_LIMIT: usize = 128;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TelemetryRecord {
    /// Peak acceleration, in m/s².
    pub accel: f32,
    /// Kick speed, in m/s.
    pub speed: f32,
}

impl TelemetryRecord {
    /// Record for a kick with peak `peak_g` (g) and corrected `speed` (m/s), both
    /// rounded to centi-units.
    #[must_use]
    pub fn new(peak_g: f32, speed: f32) -> Self {
        Self {
            accel: round_centi(peak_g * GRAVITY),
            speed: round_centi(speed),
        }
    }

    pub fn encode(&self) -> Result<Payload> {
        let encoded = serde_json::to_vec(self)?;
        if encoded.len() > ENCODE_LIMIT {
            return Err(Error::PayloadTooLarge {
                len: encoded.len(),
                limit: ENCODE_LIMIT,
            });
        }

        Payload::from_slice(&encoded)
    }
}

impl From<&Kick> for TelemetryRecord {
    fn from(kick: &Kick) -> Self {
        Self::new(kick.peak_g, kick.speed)
    }
}

fn round_centi(value: f32) -> f32 {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.is_finite() {
        rounded
    } else {
        value
    }
}

/// Fixed-size transmission buffer.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Payload {
    buf: [u8; PAYLOAD_CAPACITY],
    len: usize,
}

impl Payload {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > PAYLOAD_CAPACITY {
            return Err(Error::PayloadTooLarge {
                len: bytes.len(),
                limit: PAYLOAD_CAPACITY,
            });
        }

        let mut buf = [0; PAYLOAD_CAPACITY];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            buf,
            len: bytes.len(),
        })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Payload")
            .field(&String::from_utf8_lossy(self.as_bytes()))
            .finish()
    }
}

/// Hands accepted kicks to the transport, fire-and-forget.
pub struct TelemetryEmitter<T> {
    transport: T,
    kicks_sent: u64,
}

impl<T: Transport> TelemetryEmitter<T> {
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            kicks_sent: 0,
        }
    }

    pub fn emit(&mut self, kick: &Kick) -> Result<TelemetryRecord> {
        let record = TelemetryRecord::from(kick);
        let payload = record.encode()?;

        self.kicks_sent += 1;
        tracing::info!(
            kick = self.kicks_sent,
            class = kick.class.as_str(),
            accel = record.accel,
            speed = record.speed,
            central = self.transport.is_central_connected(),
            "kick"
        );

        self.transport.write_payload(payload.as_bytes());
        Ok(record)
    }

    #[must_use]
    pub fn kicks_sent(&self) -> u64 {
        self.kicks_sent
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{detector::KickClass, transport::RecordingTransport};

    fn kick(peak_g: f32, speed: f32) -> Kick {
        Kick {
            start_ms: 0,
            sample_count: 20,
            peak_g,
            raw_speed: speed / 0.85,
            speed,
            class: KickClass::Light,
        }
    }

    #[test]
    fn encodes_two_numeric_fields() {
        let payload = TelemetryRecord::new(4.0, 6.337_26).encode().unwrap();
        assert_eq!(payload.as_bytes(), br#"{"accel":39.24,"speed":6.34}"#);
    }

    #[test]
    fn payload_never_exceeds_transmission_buffer() {
        let extremes = [
            0.0,
            -0.0,
            1.0,
            -1.0,
            f32::MAX,
            f32::MIN,
            f32::MIN_POSITIVE,
            -f32::MIN_POSITIVE,
            f32::EPSILON,
            1.0e-45,
            -1.234_567_8e-38,
            123_456.79,
            f32::INFINITY,
            f32::NEG_INFINITY,
            f32::NAN,
        ];

        for accel in extremes {
            for speed in extremes {
                let record = TelemetryRecord { accel, speed };
                let payload = record.encode().unwrap();
                assert!(
                    payload.len() <= PAYLOAD_CAPACITY,
                    "{record:?} encoded to {} bytes",
                    payload.len()
                );
            }
        }
    }

    #[test]
    fn oversized_slice_is_refused() {
        let result = Payload::from_slice(&[b'x'; PAYLOAD_CAPACITY + 1]);
        assert!(matches!(
            result,
            Err(Error::PayloadTooLarge { len: 65, limit: 64 })
        ));
    }

    #[test]
    fn decoded_payload_matches_record() {
        let record = TelemetryRecord::new(6.2, 25.0);
        let decoded: TelemetryRecord =
            serde_json::from_slice(record.encode().unwrap().as_bytes()).unwrap();

        assert_eq!(decoded, record);
        assert!((decoded.speed - 25.0).abs() < f32::EPSILON);
    }

    #[test]
    fn emitter_writes_and_counts() {
        let mut emitter = TelemetryEmitter::new(RecordingTransport::default());

        let record = emitter.emit(&kick(4.0, 6.337_26)).unwrap();
        emitter.emit(&kick(7.1, 25.0)).unwrap();

        assert!((record.accel - 39.24).abs() < 1e-4);
        assert_eq!(emitter.kicks_sent(), 2);
        assert_eq!(emitter.transport().payloads().len(), 2);
        assert_eq!(
            emitter.transport().payloads()[1],
            br#"{"accel":69.65,"speed":25.0}"#.to_vec()
        );
    }
}
