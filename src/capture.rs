//! Capture window: peak tracking and trapezoidal integration of the impact.
use crate::config::GRAVITY;

/// What a finished capture window measured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureSummary {
    pub start_ms: u64,
    pub sample_count: usize,
    /// Largest net magnitude seen in the window, in g.
    pub peak_g: f32,
    /// Integrated net acceleration, in m/s.
    pub speed: f32,
}

/// A kick being captured.
///
/// The first sample seeds the integrator and adds no area; every later sample
/// adds `(current + previous) / 2 * dt` with `dt` the real time between them.
#[derive(Debug, Clone)]
pub struct Capture {
    start_ms: u64,
    sample_count: usize,
    peak_g: f32,
    speed: f32,
    /// Previous sample as (m/s², arrival time in ms).
    previous: Option<(f32, u64)>,
}

impl Capture {
    #[must_use]
    pub fn new(start_ms: u64) -> Self {
        Self {
            start_ms,
            sample_count: 0,
            peak_g: 0.0,
            speed: 0.0,
            previous: None,
        }
    }

    /// Adds one sample of net magnitude `magnitude_g` arriving at `now_ms`.
    pub fn add(&mut self, magnitude_g: f32, now_ms: u64) {
        let accel = magnitude_g * GRAVITY;

        if let Some((previous, previous_ms)) = self.previous {
            let dt = now_ms.saturating_sub(previous_ms) as f32 / 1000.0;
            self.speed += (accel + previous) / 2.0 * dt;
        }

        self.previous = Some((accel, now_ms));
        self.peak_g = self.peak_g.max(magnitude_g);
        self.sample_count += 1;
    }

    #[must_use]
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.start_ms)
    }

    #[must_use]
    pub fn summary(&self) -> CaptureSummary {
        CaptureSummary {
            start_ms: self.start_ms,
            sample_count: self.sample_count,
            peak_g: self.peak_g,
            speed: self.speed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_only_seeds() {
        let mut capture = Capture::new(100);
        capture.add(4.0, 100);

        let summary = capture.summary();
        assert_eq!(summary.sample_count, 1);
        assert!((summary.peak_g - 4.0).abs() < f32::EPSILON);
        assert!(summary.speed.abs() < f32::EPSILON);
    }

    #[test]
    fn constant_signal_integrates_over_window_minus_one_interval() {
        let a = 4.0;
        let dt_ms = 10;
        let window_ms = 200;

        let mut capture = Capture::new(0);
        for t in (0..window_ms).step_by(dt_ms as usize) {
            capture.add(a, t);
        }

        let summary = capture.summary();
        let expected = a * GRAVITY * (window_ms - dt_ms) as f32 / 1000.0;
        assert_eq!(summary.sample_count, 20);
        assert!((summary.speed - expected).abs() < 1e-3, "{}", summary.speed);
    }

    #[test]
    fn uses_real_inter_sample_time() {
        let mut capture = Capture::new(0);
        capture.add(1.0, 0);
        // a late sample: 30 ms gap instead of the nominal 10 ms
        capture.add(3.0, 30);

        let expected = (1.0 + 3.0) / 2.0 * GRAVITY * 0.03;
        assert!((capture.summary().speed - expected).abs() < 1e-5);
    }

    #[test]
    fn tracks_peak_in_g() {
        let mut capture = Capture::new(0);
        for (t, magnitude) in [(0, 3.5), (10, 6.2), (20, 4.1)] {
            capture.add(magnitude, t);
        }

        assert!((capture.summary().peak_g - 6.2).abs() < f32::EPSILON);
        assert_eq!(capture.elapsed_ms(150), 150);
    }
}
