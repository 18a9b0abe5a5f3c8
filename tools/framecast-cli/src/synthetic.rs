//! Synthetic test pattern renderer.
//!
//! Stands in for a real renderer so exports can be driven from the command
//! line: SMPTE-style color bars with a white marker sweeping left to right
//! once per second, so dropped or duplicated frames are visible.

use framecast_export_model::{RasterFrame, RasterError, BYTES_PER_PIXEL};

const BARS: [[u8; 4]; 7] = [
    [192, 192, 192, 255],
    [192, 192, 0, 255],
    [0, 192, 192, 255],
    [0, 192, 0, 255],
    [192, 0, 192, 255],
    [192, 0, 0, 255],
    [0, 0, 192, 255],
];

/// Render the pattern for one render-frame index.
pub fn render_frame(
    width: u32,
    height: u32,
    render_frame_index: i64,
    fps: f64,
) -> Result<RasterFrame, RasterError> {
    let w = width as usize;
    let h = height as usize;
    let mut pixels = vec![0u8; w * h * BYTES_PER_PIXEL];

    let bar_width = w.div_ceil(BARS.len()).max(1);
    for (i, px) in pixels.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
        let x = i % w;
        px.copy_from_slice(&BARS[(x / bar_width).min(BARS.len() - 1)]);
    }

    let marker_x = marker_column(width, render_frame_index, fps);
    let marker_w = (w / 40).max(1);
    for y in 0..h {
        for x in marker_x..(marker_x + marker_w).min(w) {
            let i = (y * w + x) * BYTES_PER_PIXEL;
            pixels[i..i + BYTES_PER_PIXEL].copy_from_slice(&[255, 255, 255, 255]);
        }
    }

    RasterFrame::new(width, height, pixels)
}

/// Left edge of the sweeping marker.
fn marker_column(width: u32, render_frame_index: i64, fps: f64) -> usize {
    let frames_per_sweep = fps.round().max(1.0) as i64;
    let phase = render_frame_index.rem_euclid(frames_per_sweep) as f64 / frames_per_sweep as f64;
    ((phase * width as f64) as usize).min(width.saturating_sub(1) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_has_requested_size() {
        let frame = render_frame(64, 36, 0, 30.0).unwrap();
        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 36);
    }

    #[test]
    fn test_marker_moves_between_frames() {
        let a = render_frame(120, 10, 0, 30.0).unwrap();
        let b = render_frame(120, 10, 15, 30.0).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.pixel(0, 0), Some([255, 255, 255, 255]));
        assert_eq!(b.pixel(60, 5), Some([255, 255, 255, 255]));
    }

    #[test]
    fn test_pattern_repeats_every_second() {
        let a = render_frame(80, 8, 3, 24.0).unwrap();
        let b = render_frame(80, 8, 27, 24.0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_negative_index_is_valid() {
        assert!(render_frame(16, 16, -5, 30.0).is_ok());
    }

    #[test]
    fn test_tiny_frame() {
        let frame = render_frame(1, 1, 7, 30.0).unwrap();
        assert_eq!(frame.pixel(0, 0), Some([255, 255, 255, 255]));
    }
}
