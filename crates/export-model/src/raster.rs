//! Raster frames from the renderer and the fixed-size encode surface.

/// Bytes per RGBA pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Errors constructing raster data.
#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("pixel buffer holds {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    SizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("raster dimensions must be non-zero, got {width}x{height}")]
    EmptyDimensions { width: u32, height: u32 },
}

/// One rendered frame, tightly packed RGBA8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterFrame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RasterFrame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, RasterError> {
        if width == 0 || height == 0 {
            return Err(RasterError::EmptyDimensions { width, height });
        }
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if pixels.len() != expected {
            return Err(RasterError::SizeMismatch {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Frame of a single solid color.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self, RasterError> {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * BYTES_PER_PIXEL);
        for _ in 0..count {
            pixels.extend_from_slice(&rgba);
        }
        Self::new(width, height, pixels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// RGBA value at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.pixels[i..i + BYTES_PER_PIXEL]);
        Some(px)
    }
}

/// Encode surface sized to the scaled output resolution.
///
/// Created once per session and reused for every frame. Each draw replaces
/// the whole surface so no pixels leak between frames.
#[derive(Debug, Clone)]
pub struct RasterSurface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Draw `frame` at the origin.
    ///
    /// The surface is cleared to opaque black first; frames larger than the
    /// surface are clipped at the right and bottom edges.
    pub fn draw(&mut self, frame: &RasterFrame) {
        for px in self.pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
            px.copy_from_slice(&[0, 0, 0, 255]);
        }

        let rows = self.height.min(frame.height) as usize;
        let row_bytes = self.width.min(frame.width) as usize * BYTES_PER_PIXEL;
        let dst_stride = self.width as usize * BYTES_PER_PIXEL;
        let src_stride = frame.width as usize * BYTES_PER_PIXEL;

        for row in 0..rows {
            let dst = row * dst_stride;
            let src = row * src_stride;
            self.pixels[dst..dst + row_bytes]
                .copy_from_slice(&frame.pixels[src..src + row_bytes]);
        }
    }

    /// Raw RGBA bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    /// FNV-1a hash of the surface contents.
    pub fn checksum(&self) -> u64 {
        let mut hash = 0xcbf29ce484222325u64;
        for byte in &self.pixels {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_frame_rejects_wrong_buffer_length() {
        let err = RasterFrame::new(2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(err, RasterError::SizeMismatch { expected: 16, .. }));
        assert!(RasterFrame::new(0, 2, vec![]).is_err());
    }

    #[test]
    fn test_pixel_lookup() {
        let frame = RasterFrame::filled(3, 2, [10, 20, 30, 255]).unwrap();
        assert_eq!(frame.pixel(2, 1), Some([10, 20, 30, 255]));
        assert_eq!(frame.pixel(3, 0), None);
    }

    #[test]
    fn test_draw_clips_larger_frame() {
        let mut surface = RasterSurface::new(2, 2);
        let frame = RasterFrame::filled(4, 4, [255, 0, 0, 255]).unwrap();
        surface.draw(&frame);
        assert!(surface
            .as_bytes()
            .chunks_exact(4)
            .all(|px| px == [255, 0, 0, 255]));
    }

    #[test]
    fn test_draw_smaller_frame_leaves_black_border() {
        let mut surface = RasterSurface::new(3, 1);
        surface.draw(&RasterFrame::filled(1, 1, [9, 9, 9, 255]).unwrap());
        assert_eq!(&surface.as_bytes()[0..4], &[9, 9, 9, 255]);
        assert_eq!(&surface.as_bytes()[4..8], &[0, 0, 0, 255]);
    }

    #[test]
    fn test_redraw_replaces_previous_frame() {
        let mut surface = RasterSurface::new(2, 2);
        surface.draw(&RasterFrame::filled(2, 2, [1, 2, 3, 255]).unwrap());
        let first = surface.checksum();
        surface.draw(&RasterFrame::filled(1, 1, [1, 2, 3, 255]).unwrap());
        assert_ne!(surface.checksum(), first);
        surface.draw(&RasterFrame::filled(2, 2, [1, 2, 3, 255]).unwrap());
        assert_eq!(surface.checksum(), first);
    }

    proptest! {
        #[test]
        fn prop_draw_copies_overlap_and_blacks_out_rest(
            sw in 1u32..12, sh in 1u32..12, fw in 1u32..12, fh in 1u32..12, shade in 1u8..255,
        ) {
            let mut surface = RasterSurface::new(sw, sh);
            surface.draw(&RasterFrame::filled(fw, fh, [shade, shade, shade, 255]).unwrap());
            prop_assert_eq!(surface.as_bytes().len(), (sw * sh) as usize * BYTES_PER_PIXEL);
            for (i, px) in surface.as_bytes().chunks_exact(BYTES_PER_PIXEL).enumerate() {
                let (x, y) = (i as u32 % sw, i as u32 / sw);
                let expected = if x < fw && y < fh { shade } else { 0 };
                prop_assert_eq!(px, &[expected, expected, expected, 255][..]);
            }
        }
    }
}
