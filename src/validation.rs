//! Plausibility checks on a finished capture.
use std::fmt;

use crate::{capture::CaptureSummary, config::ValidationConfig};

/// Why a capture was discarded. Rejections are expected false positives, not
/// faults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    TooFewSamples { count: usize },
    TooSlow { speed: f32 },
    TooWeak { peak_g: f32 },
    NotFinite { speed: f32, peak_g: f32 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::TooFewSamples { count } => write!(f, "only {count} samples"),
            Rejection::TooSlow { speed } => write!(f, "speed {speed:.2} m/s"),
            Rejection::TooWeak { peak_g } => write!(f, "peak {peak_g:.2} g"),
            Rejection::NotFinite { speed, peak_g } => {
                write!(f, "non-finite measurement (speed {speed}, peak {peak_g})")
            }
        }
    }
}

/// Accepts a capture with more than `min_samples` samples, a speed above
/// `min_speed` and a peak above `min_peak_g`, returning the corrected speed:
/// damped by `speed_correction` and clamped to `[0, max_speed]`.
pub fn validate(summary: &CaptureSummary, config: &ValidationConfig) -> Result<f32, Rejection> {
    if summary.sample_count <= config.min_samples {
        return Err(Rejection::TooFewSamples {
            count: summary.sample_count,
        });
    }

    if !summary.speed.is_finite() || !summary.peak_g.is_finite() {
        return Err(Rejection::NotFinite {
            speed: summary.speed,
            peak_g: summary.peak_g,
        });
    }

    if summary.speed <= config.min_speed {
        return Err(Rejection::TooSlow {
            speed: summary.speed,
        });
    }

    if summary.peak_g <= config.min_peak_g {
        return Err(Rejection::TooWeak {
            peak_g: summary.peak_g,
        });
    }

    Ok((summary.speed * config.speed_correction).clamp(0.0, config.max_speed))
}
