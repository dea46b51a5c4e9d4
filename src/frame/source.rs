// Frame production seam.
//
// A `FrameSource` samples a rendering surface into a pooled pixel buffer.
// The pipeline guarantees at most one render call is in flight at a time
// (the render gate), so implementations do not need their own locking.
// Sources that wrap a single-threaded UI surface dispatch to that thread
// internally and block the render call until the surface has been drawn.

use anyhow::Result;

use super::pool::{PixelBuffer, BYTES_PER_PIXEL};

/// Device orientation of the surface being captured. The screen-mode
/// pipeline stamps the matching rotation onto the output video track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
}

impl Orientation {
    /// Rotation to apply to the output track, in degrees.
    pub fn rotation_degrees(self) -> i32 {
        match self {
            Orientation::Portrait => 0,
            Orientation::PortraitUpsideDown => 180,
            Orientation::LandscapeLeft => -90,
            Orientation::LandscapeRight => 90,
        }
    }
}

/// Produces raw frames by rendering the current surface content into a
/// pixel buffer sized to the output resolution (logical size × scale).
pub trait FrameSource: Send {
    fn render(&mut self, target: &mut PixelBuffer) -> Result<()>;

    fn orientation(&self) -> Orientation {
        Orientation::Portrait
    }
}

/// Copies top-down source rows into `target` bottom-up, matching the
/// encoder's row order. `src` must hold exactly one frame at the target's
/// resolution.
pub fn copy_rows_flipped(src: &[u8], target: &mut PixelBuffer) -> Result<()> {
    let row_len = target.bytes_per_row();
    let height = target.height() as usize;
    if src.len() != row_len * height {
        anyhow::bail!(
            "source size {} does not match {}x{} frame",
            src.len(),
            target.width(),
            target.height()
        );
    }

    let dst = target.data_mut();
    for (row, chunk) in src.chunks_exact(row_len).enumerate() {
        let flipped = height - 1 - row;
        dst[flipped * row_len..(flipped + 1) * row_len].copy_from_slice(chunk);
    }
    Ok(())
}

/// Synthetic source for the demo binary and tests: a sliding gradient so
/// consecutive frames differ.
pub struct TestPatternSource {
    tick: u32,
    orientation: Orientation,
}

impl TestPatternSource {
    pub fn new() -> Self {
        Self {
            tick: 0,
            orientation: Orientation::Portrait,
        }
    }

    pub fn with_orientation(orientation: Orientation) -> Self {
        Self { tick: 0, orientation }
    }
}

impl Default for TestPatternSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for TestPatternSource {
    fn render(&mut self, target: &mut PixelBuffer) -> Result<()> {
        let width = target.width() as usize;
        let shift = self.tick;
        for (i, px) in target.data_mut().chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
            let x = (i % width) as u32;
            let y = (i / width) as u32;
            px[0] = (x.wrapping_add(shift) & 0xff) as u8; // B
            px[1] = (y.wrapping_add(shift) & 0xff) as u8; // G
            px[2] = (shift & 0xff) as u8; // R
            px[3] = 0xff; // A
        }
        self.tick = self.tick.wrapping_add(1);
        Ok(())
    }

    fn orientation(&self) -> Orientation {
        self.orientation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::pool::PixelBufferPool;

    #[test]
    fn rotation_per_orientation() {
        assert_eq!(Orientation::Portrait.rotation_degrees(), 0);
        assert_eq!(Orientation::PortraitUpsideDown.rotation_degrees(), 180);
        assert_eq!(Orientation::LandscapeLeft.rotation_degrees(), -90);
        assert_eq!(Orientation::LandscapeRight.rotation_degrees(), 90);
    }

    #[test]
    fn flip_reverses_row_order() {
        let pool = PixelBufferPool::new(2, 3, 1).unwrap();
        let mut buf = pool.acquire().unwrap();

        // Three rows tagged 1, 2, 3.
        let mut src = Vec::new();
        for row in 1u8..=3 {
            src.extend(std::iter::repeat(row).take(2 * BYTES_PER_PIXEL));
        }

        copy_rows_flipped(&src, &mut buf).unwrap();

        let row_len = buf.bytes_per_row();
        assert!(buf.data()[..row_len].iter().all(|&b| b == 3));
        assert!(buf.data()[2 * row_len..].iter().all(|&b| b == 1));
    }

    #[test]
    fn flip_rejects_mismatched_source() {
        let pool = PixelBufferPool::new(2, 2, 1).unwrap();
        let mut buf = pool.acquire().unwrap();
        assert!(copy_rows_flipped(&[0u8; 3], &mut buf).is_err());
    }

    #[test]
    fn test_pattern_fills_frame_and_varies() {
        let pool = PixelBufferPool::new(8, 8, 1).unwrap();
        let mut source = TestPatternSource::new();

        let mut buf = pool.acquire().unwrap();
        source.render(&mut buf).unwrap();
        let first = buf.data().to_vec();

        source.render(&mut buf).unwrap();
        assert_ne!(first, buf.data(), "consecutive frames should differ");
    }
}
