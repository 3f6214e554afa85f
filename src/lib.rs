//! Kick detection for a body-worn accelerometer.
//!
//! Samples are bias-corrected against a resting baseline, a kick is triggered
//! when both the net magnitude and its jerk are high enough, and the following
//! window is integrated into a peak acceleration and an impact speed. Accepted
//! kicks leave as a two-field JSON payload of at most 64 bytes.
pub mod calibration;
pub mod capture;
pub mod clock;
pub mod config;
pub mod detector;
pub mod error;
pub mod meter;
pub mod sensor;
pub mod telemetry;
pub mod transport;
pub mod validation;

pub use error::{Error, Result};
