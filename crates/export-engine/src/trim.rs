//! Audio trim-and-mix stage.
//!
//! Cuts the export range out of the decoded source, shifted by the audio
//! calibration offset, and applies the export volume. The output always
//! spans the full export range; parts with no source audio stay silent.

use framecast_common::clock::sample_position;
use framecast_common::error::{ExportError, ExportResult};
use framecast_export_model::{SourceAudioBuffer, TrimmedAudioBuffer};

/// Trim `source` to `[range_start, range_end)` of project time.
///
/// `calibration_offset` is the project time at which the first source sample
/// plays. Output length is `floor((range_end - range_start) * sample_rate)`.
pub fn trim(
    source: &SourceAudioBuffer,
    range_start: f64,
    range_end: f64,
    calibration_offset: f64,
    volume: f64,
) -> ExportResult<TrimmedAudioBuffer> {
    let duration = range_end - range_start;
    if !(duration > 0.0) {
        return Err(ExportError::invalid_range(range_start, range_end));
    }

    let sample_rate = source.sample_rate();
    let output_frames = (duration * sample_rate as f64).floor() as usize;
    let mut output =
        TrimmedAudioBuffer::silent(sample_rate, source.channel_count(), output_frames);

    let start_pos = sample_position(range_start - calibration_offset, sample_rate);
    let end_pos = sample_position(range_end - calibration_offset, sample_rate);

    let src_start = start_pos.max(0);
    let src_end = end_pos.min(source.frame_count() as i64);
    if src_end <= src_start {
        tracing::debug!(
            range_start,
            range_end,
            calibration_offset,
            "Export range does not overlap source audio"
        );
        return Ok(output);
    }

    let dst_start = (-start_pos).max(0) as usize;
    if dst_start >= output_frames {
        return Ok(output);
    }

    // Floor rounding of both window edges can make the source window one
    // frame longer than the output.
    let copy_len = ((src_end - src_start) as usize).min(output_frames - dst_start);
    let src_start = src_start as usize;
    let gain = volume as f32;

    for ch in 0..source.channel_count() {
        let (Some(src), Some(dst)) = (source.channel(ch), output.channel_mut(ch)) else {
            continue;
        };
        let src = &src[src_start..src_start + copy_len];
        let dst = &mut dst[dst_start..dst_start + copy_len];
        for (out, sample) in dst.iter_mut().zip(src) {
            *out = sample * gain;
        }
    }

    tracing::debug!(
        output_frames,
        copied_frames = copy_len,
        dst_start,
        src_start,
        "Trimmed source audio"
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use framecast_common::error::ErrorKind;
    use proptest::prelude::*;

    /// Source whose samples encode their own index, so copies are checkable.
    fn ramp_source(sample_rate: u32, secs: f64, channels: usize) -> SourceAudioBuffer {
        let frames = (secs * sample_rate as f64) as usize;
        let channels = (0..channels)
            .map(|ch| {
                (0..frames)
                    .map(|i| ((i % 1000) as f32 / 1000.0) * if ch == 0 { 1.0 } else { -1.0 })
                    .collect()
            })
            .collect();
        SourceAudioBuffer::new(sample_rate, channels).unwrap()
    }

    #[test]
    fn test_range_inside_source() {
        let source = ramp_source(48_000, 10.0, 2);
        let out = trim(&source, 2.0, 5.0, 0.0, 1.0).unwrap();
        assert_eq!(out.frame_count(), 144_000);
        for ch in 0..2 {
            assert_eq!(
                out.channel(ch).unwrap(),
                &source.channel(ch).unwrap()[96_000..240_000]
            );
        }
    }

    #[test]
    fn test_range_before_source_pads_front() {
        let source = ramp_source(48_000, 10.0, 1);
        let out = trim(&source, -1.0, 1.0, 0.0, 1.0).unwrap();
        assert_eq!(out.frame_count(), 96_000);
        let samples = out.channel(0).unwrap();
        assert!(samples[..48_000].iter().all(|s| *s == 0.0));
        assert_eq!(&samples[48_000..], &source.channel(0).unwrap()[..48_000]);
    }

    #[test]
    fn test_calibration_offset_shifts_window() {
        let source = ramp_source(1_000, 5.0, 1);
        // Source starts playing at t = 1.5, so t = 2.0 is source sample 500.
        let out = trim(&source, 2.0, 3.0, 1.5, 1.0).unwrap();
        assert_eq!(out.channel(0).unwrap(), &source.channel(0).unwrap()[500..1500]);
    }

    #[test]
    fn test_range_past_end_pads_back() {
        let source = ramp_source(1_000, 2.0, 1);
        let out = trim(&source, 1.5, 3.0, 0.0, 1.0).unwrap();
        assert_eq!(out.frame_count(), 1_500);
        let samples = out.channel(0).unwrap();
        assert_eq!(&samples[..500], &source.channel(0).unwrap()[1_500..]);
        assert!(samples[500..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_no_overlap_is_silent() {
        let source = ramp_source(1_000, 2.0, 2);
        let out = trim(&source, 5.0, 6.0, 0.0, 1.0).unwrap();
        assert_eq!(out.frame_count(), 1_000);
        assert_eq!(out.channel_count(), 2);
        assert!(out.is_silent());
    }

    #[test]
    fn test_zero_volume_is_silent() {
        let source = ramp_source(1_000, 2.0, 2);
        let out = trim(&source, 0.0, 1.0, 0.0, 0.0).unwrap();
        assert_eq!(out.frame_count(), 1_000);
        assert_eq!(out.channel_count(), 2);
        assert!(out.is_silent());
    }

    #[test]
    fn test_volume_scales_samples() {
        let source = SourceAudioBuffer::new(4, vec![vec![0.5, -0.25, 0.125, 1.0]]).unwrap();
        let out = trim(&source, 0.0, 1.0, 0.0, 2.0).unwrap();
        assert_eq!(out.channel(0).unwrap(), &[1.0, -0.5, 0.25, 2.0]);
    }

    #[test]
    fn test_invalid_range() {
        let source = ramp_source(1_000, 1.0, 1);
        for (start, end) in [(1.0, 1.0), (2.0, 1.0), (0.0, f64::NAN)] {
            let err = trim(&source, start, end, 0.0, 1.0).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRange);
        }
    }

    #[test]
    fn test_window_longer_than_output_is_clamped() {
        // calibrated window floors to 3 frames while the output holds 2
        let source = SourceAudioBuffer::new(10, vec![vec![1.0; 10]]).unwrap();
        let out = trim(&source, 0.19, 0.41, 0.0, 1.0).unwrap();
        assert_eq!(out.frame_count(), 2);
        assert_eq!(out.channel(0).unwrap(), &[1.0, 1.0]);
    }

    proptest! {
        #[test]
        fn output_length_is_floor_of_duration(
            start in -5.0f64..5.0,
            len in 0.001f64..5.0,
            offset in -3.0f64..3.0,
            sample_rate in prop::sample::select(vec![8_000u32, 22_050, 44_100, 48_000]),
        ) {
            let source = SourceAudioBuffer::new(sample_rate, vec![vec![0.1; sample_rate as usize]]).unwrap();
            let end = start + len;
            let out = trim(&source, start, end, offset, 1.0).unwrap();
            prop_assert_eq!(out.frame_count(), ((end - start) * sample_rate as f64).floor() as usize);
        }

        #[test]
        fn trim_is_idempotent(
            start in -2.0f64..4.0,
            len in 0.01f64..3.0,
            offset in -1.0f64..1.0,
            volume in 0.0f64..2.0,
        ) {
            let source = ramp_source(2_000, 3.0, 2);
            let a = trim(&source, start, start + len, offset, volume).unwrap();
            let b = trim(&source, start, start + len, offset, volume).unwrap();
            prop_assert_eq!(a, b);
        }

        #[test]
        fn range_outside_source_is_silent(
            gap in 0.01f64..10.0,
            len in 0.01f64..3.0,
            offset in -5.0f64..5.0,
            before in any::<bool>(),
        ) {
            let source = ramp_source(1_000, 2.0, 1);
            let source_end = source.duration_secs() + offset;
            let (start, end) = if before {
                (offset - gap - len, offset - gap)
            } else {
                (source_end + gap, source_end + gap + len)
            };
            let out = trim(&source, start, end, offset, 1.0).unwrap();
            prop_assert!(out.is_silent());
        }
    }
}
