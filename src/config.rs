//! Runtime configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) gives the
//! stock detector: 20-sample baseline, 3 s settling, 3 g / 50 g/s trigger,
//! 1 s debounce and a 200 ms capture window.
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds};

use crate::error::{Error, Result};

/// Environment variable holding the path of the config file.
pub const CONFIG_ENV: &str = "KICKMETER_CONFIG";
/// Config file picked up from the working directory when [`CONFIG_ENV`] is unset.
pub const DEFAULT_CONFIG_FILE: &str = "kickmeter.toml";

/// Standard gravity, used to convert g into m/s².
pub const GRAVITY: f32 = 9.81;

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub calibration: CalibrationConfig,
    pub detector: DetectorConfig,
    pub validation: ValidationConfig,
    pub classification: ClassificationConfig,
    pub sensor: SensorConfig,
    pub transport: TransportConfig,
}

impl Config {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the detector cannot run with.
    pub fn validate(&self) -> Result<()> {
        // jerk is divided by the nominal interval
        if self.detector.sample_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "detector.sample_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Loads the config named by [`CONFIG_ENV`], then [`DEFAULT_CONFIG_FILE`] if it
    /// exists, falling back to the defaults.
    pub fn locate() -> Result<Self> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            tracing::info!(path = %PathBuf::from(&path).display(), "loading config");
            return Self::load(path);
        }

        let fallback = Path::new(DEFAULT_CONFIG_FILE);
        if fallback.exists() {
            tracing::info!(path = %fallback.display(), "loading config");
            return Self::load(fallback);
        }

        tracing::info!("no config file found, using defaults");
        Ok(Self::default())
    }
}

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct CalibrationConfig {
    /// Number of resting samples averaged into the baseline.
    pub baseline_samples: usize,
    /// Delay between two baseline reads.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub pacing: Duration,
    /// How long to wait for each baseline sample. Zero waits forever.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub availability_timeout: Duration,
    /// Sleep between two availability polls while waiting for a baseline sample.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub poll_interval: Duration,
    /// Settling time after calibration before detection is armed.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub stabilization_time: Duration,
    /// Coarse sleep used while the stabilization gate is closed.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub settle_poll: Duration,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            baseline_samples: 20,
            pacing: Duration::from_millis(50),
            availability_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(1),
            stabilization_time: Duration::from_millis(3000),
            settle_poll: Duration::from_millis(100),
        }
    }
}

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorConfig {
    /// Nominal tick cadence, also the time base of the jerk estimate.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub sample_interval: Duration,
    /// Net magnitude (g) a sample must exceed to trigger.
    pub kick_threshold_g: f32,
    /// Jerk (g/s) a sample must exceed to trigger.
    pub kick_jerk_threshold: f32,
    /// Debounce window, measured from the start of the previous triggered kick.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub min_time_between_kicks: Duration,
    /// Length of the capture window after a trigger.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub kick_window: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(10),
            kick_threshold_g: 3.0,
            kick_jerk_threshold: 50.0,
            min_time_between_kicks: Duration::from_millis(1000),
            kick_window: Duration::from_millis(200),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationConfig {
    /// A capture needs strictly more samples than this.
    pub min_samples: usize,
    /// Integrated speed (m/s) a capture must strictly exceed.
    pub min_speed: f32,
    /// Peak acceleration (g) a capture must strictly exceed.
    pub min_peak_g: f32,
    /// Damping applied to the integrated speed of an accepted capture.
    pub speed_correction: f32,
    /// Ceiling on the reported speed (m/s).
    pub max_speed: f32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_samples: 5,
            min_speed: 1.0,
            min_peak_g: 3.5,
            speed_correction: 0.85,
            max_speed: 25.0,
        }
    }
}

/// Peak acceleration (g) lower bounds of the kick tiers.
#[derive(Deserialize, Debug, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct ClassificationConfig {
    pub light_g: f32,
    pub medium_g: f32,
    pub strong_g: f32,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            light_g: 4.0,
            medium_g: 5.0,
            strong_g: 6.5,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default, deny_unknown_fields)]
pub struct SensorConfig {
    pub source: SourceConfig,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// `x,y,z` lines on standard input, read by a driver thread.
    #[default]
    Stdin,
    /// Replay of a recorded trace file.
    Trace { path: PathBuf },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct TransportConfig {
    pub socket_path: PathBuf,
    /// Also print every payload to stdout.
    pub echo_stdout: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/tmp/kickmeter.sock"),
            echo_stdout: true,
        }
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
#[must_use]
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[test]
    fn empty_file_gives_stock_detector() {
        let config = Config::from_toml_str("").unwrap();

        assert_eq!(config.calibration.baseline_samples, 20);
        assert_eq!(config.calibration.pacing, Duration::from_millis(50));
        assert_eq!(config.calibration.stabilization_time, Duration::from_secs(3));
        assert_eq!(config.detector.sample_interval, Duration::from_millis(10));
        assert_eq!(config.detector.min_time_between_kicks, Duration::from_secs(1));
        assert_eq!(config.detector.kick_window, Duration::from_millis(200));
        assert!((config.detector.kick_threshold_g - 3.0).abs() < f32::EPSILON);
        assert!((config.validation.max_speed - 25.0).abs() < f32::EPSILON);
        assert_eq!(config.sensor.source, SourceConfig::Stdin);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [detector]
            kick_window = 300
            kick_threshold_g = 2.5

            [calibration]
            availability_timeout = 500

            [sensor.source]
            kind = "trace"
            path = "kicks.csv"
            "#,
        )
        .unwrap();

        assert_eq!(config.detector.kick_window, Duration::from_millis(300));
        assert!((config.detector.kick_threshold_g - 2.5).abs() < f32::EPSILON);
        assert!((config.detector.kick_jerk_threshold - 50.0).abs() < f32::EPSILON);
        assert_eq!(
            config.calibration.availability_timeout,
            Duration::from_millis(500)
        );
        assert_eq!(
            config.sensor.source,
            SourceConfig::Trace {
                path: PathBuf::from("kicks.csv")
            }
        );
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let config = Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/kickmeter.toml")).unwrap();

        assert_eq!(config.calibration.availability_timeout, Duration::from_secs(2));
        assert_eq!(config.detector.kick_window, Duration::from_millis(200));
        assert_eq!(config.sensor.source, SourceConfig::Stdin);
        assert!(config.transport.echo_stdout);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(Config::from_toml_str("[detector]\nkick_treshold_g = 3.0\n").is_err());
    }

    #[test]
    fn zero_sample_interval_is_rejected() {
        let result = Config::from_toml_str("[detector]\nsample_interval = 0\n");
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[validation]\nmin_samples = 8").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.validation.min_samples, 8);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(dir.path().join("nope.toml"));
        assert!(matches!(result, Err(crate::Error::Io(_))));
    }
}
