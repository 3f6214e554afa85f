//! Result and Error types for the crate.
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

/// Result containing an error variant from this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// IO error, this wraps a [`std::io::Error`]
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed, this wraps a [`toml::de::Error`]
    #[error(transparent)]
    #[diagnostic(help("check the config file against kickmeter.toml"))]
    ConfigParse(#[from] toml::de::Error),

    /// Telemetry record could not be encoded, this wraps a [`serde_json::Error`]
    #[error(transparent)]
    Encode(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    #[diagnostic(help("check the config file against kickmeter.toml"))]
    InvalidConfig(String),

    #[error("failed to initialize sensor: {0}")]
    SensorInit(String),

    #[error("failed to initialize transport: {0}")]
    TransportInit(String),

    #[error("no sample became available within {timeout:?} during calibration ({collected} of {required} collected)")]
    #[diagnostic(help("is the accelerometer connected and streaming?"))]
    CalibrationTimeout {
        timeout: Duration,
        collected: usize,
        required: usize,
    },

    #[error("encoded telemetry is {len} bytes, exceeding the {limit} byte limit")]
    PayloadTooLarge { len: usize, limit: usize },

    #[error("malformed sample on line {line}: {reason}")]
    MalformedSample { line: usize, reason: String },
}
