//! Clock arithmetic for the three export timelines.
//!
//! An export reconciles three independent clocks:
//! - the render-frame index produced by the host renderer,
//! - the output timestamp written into the container (re-zeroed at the
//!   start of the export range),
//! - the sample position inside the decoded source audio.
//!
//! This module holds the conversions between them so the feed, the audio
//! trim stage and the session agree on rounding.

/// Maps render-frame indices onto output timestamps for one export.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameClock {
    fps: f64,
    frame_index_offset: i64,
}

impl FrameClock {
    /// Create a clock for an export that starts at `range_start_secs`.
    ///
    /// The offset is `range_start_secs * fps` rounded to the nearest frame,
    /// so a range starting at 2.0s at 30fps re-zeros frame 60.
    pub fn new(fps: f64, range_start_secs: f64) -> Self {
        Self {
            fps,
            frame_index_offset: (range_start_secs * fps).round() as i64,
        }
    }

    /// Frame rate in Hz.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Render-frame index that maps to t = 0.
    pub fn frame_index_offset(&self) -> i64 {
        self.frame_index_offset
    }

    /// Duration of one output frame in seconds.
    pub fn frame_duration_secs(&self) -> f64 {
        1.0 / self.fps
    }

    /// Output timestamp for a render-frame index.
    ///
    /// Negative for indices before the export range; callers drop those.
    pub fn timestamp_secs(&self, render_frame_index: i64) -> f64 {
        (render_frame_index - self.frame_index_offset) as f64 / self.fps
    }

    /// Number of frames needed to cover `duration_secs`.
    pub fn frames_for_duration(&self, duration_secs: f64) -> u64 {
        if duration_secs <= 0.0 {
            return 0;
        }
        (duration_secs * self.fps).ceil() as u64
    }
}

/// Sample position (floored) of `secs` at `sample_rate` Hz.
///
/// Floors toward negative infinity so positions before the buffer origin
/// stay negative.
pub fn sample_position(secs: f64, sample_rate: u32) -> i64 {
    (secs * sample_rate as f64).floor() as i64
}

/// Seconds covered by `frames` audio frames at `sample_rate` Hz.
pub fn samples_to_secs(frames: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    frames as f64 / sample_rate as f64
}

/// Length mismatch between two tracks of the same export.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeasurement {
    /// Duration of the reference track (seconds).
    pub reference_secs: f64,
    /// Duration of the measured track (seconds).
    pub measured_secs: f64,
}

impl DriftMeasurement {
    /// Drift in seconds (positive = measured is longer).
    pub fn drift_secs(&self) -> f64 {
        self.measured_secs - self.reference_secs
    }

    /// Drift in milliseconds.
    pub fn drift_ms(&self) -> f64 {
        self.drift_secs() * 1000.0
    }

    /// Whether drift exceeds an acceptable threshold.
    pub fn exceeds_threshold_ms(&self, threshold_ms: f64) -> bool {
        self.drift_ms().abs() > threshold_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_offset_rezeros_range_start() {
        let clock = FrameClock::new(30.0, 2.0);
        assert_eq!(clock.frame_index_offset(), 60);
        assert_eq!(clock.timestamp_secs(60), 0.0);
        assert!((clock.timestamp_secs(90) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_offset_rounds_fractional_start() {
        // 0.1 * 30 is 3.0000000000000004 in binary floating point
        let clock = FrameClock::new(30.0, 0.1);
        assert_eq!(clock.frame_index_offset(), 3);
    }

    #[test]
    fn test_frames_for_duration() {
        let clock = FrameClock::new(60.0, 0.0);
        assert_eq!(clock.frames_for_duration(1.0), 60);
        assert_eq!(clock.frames_for_duration(1.01), 61);
        assert_eq!(clock.frames_for_duration(-1.0), 0);
    }

    #[test]
    fn test_sample_position_floors_negative() {
        assert_eq!(sample_position(2.0, 48_000), 96_000);
        assert_eq!(sample_position(-0.5 / 48_000.0, 48_000), -1);
        assert_eq!(samples_to_secs(24_000, 48_000), 0.5);
    }

    #[test]
    fn test_drift_measurement() {
        let drift = DriftMeasurement {
            reference_secs: 3.0,
            measured_secs: 3.05,
        };
        assert!((drift.drift_ms() - 50.0).abs() < 1e-6);
        assert!(drift.exceeds_threshold_ms(10.0));
        assert!(!drift.exceeds_threshold_ms(100.0));
    }

    proptest! {
        #[test]
        fn timestamps_are_non_negative_and_monotonic(
            fps in 1u32..240,
            start_frames in -1000i64..1000,
            steps in proptest::collection::vec(1i64..10, 1..50),
        ) {
            let fps = fps as f64;
            let clock = FrameClock::new(fps, start_frames as f64 / fps);
            let mut index = clock.frame_index_offset();
            let mut last = clock.timestamp_secs(index);
            prop_assert!(last >= 0.0);
            for step in steps {
                index += step;
                let ts = clock.timestamp_secs(index);
                prop_assert!(ts >= 0.0);
                prop_assert!(ts > last);
                last = ts;
            }
        }
    }
}
