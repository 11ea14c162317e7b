//! RGB24 → 32-bit framebuffer blit

use crate::capture::buffer::BYTES_PER_PIXEL;
use crate::capture::FrameFormat;
use crate::error::ConfigError;

use super::surface::{SurfaceGeometry, SURFACE_BYTES_PER_PIXEL};

/// Rejected blit inputs: a source frame or surface smaller than the plan expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BlitError {
    #[error("source frame holds {got} bytes, need {need}")]
    SourceTooShort { need: usize, got: usize },
    #[error("surface holds {got} bytes, need {need}")]
    SurfaceTooShort { need: usize, got: usize },
}

/// Precomputed copy of a capture crop into the top-left corner of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlitPlan {
    width: usize,
    height: usize,
    src_stride: usize,
    dst_stride: usize,
}

impl BlitPlan {
    /// Build a plan, rejecting empty crops and crops that do not fit the surface.
    pub fn new(frame: &FrameFormat, surface: SurfaceGeometry) -> Result<Self, ConfigError> {
        if frame.width == 0 || frame.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "empty capture crop {}x{}",
                frame.width, frame.height
            )));
        }
        if surface.stride < surface.width {
            return Err(ConfigError::Invalid(format!(
                "surface stride {} narrower than its {}-pixel width",
                surface.stride, surface.width
            )));
        }
        if frame.width > surface.width || frame.height > surface.height {
            return Err(ConfigError::CropExceedsDisplay {
                crop_width: frame.width,
                crop_height: frame.height,
                display_width: surface.width,
                display_height: surface.height,
            });
        }
        if frame.stride < frame.row_bytes() {
            return Err(ConfigError::Invalid(format!(
                "frame stride {} shorter than a {}-pixel row",
                frame.stride, frame.width
            )));
        }

        Ok(Self {
            width: frame.width as usize,
            height: frame.height as usize,
            src_stride: frame.stride,
            dst_stride: surface.row_bytes(),
        })
    }

    fn src_needed(&self) -> usize {
        match self.height {
            0 => 0,
            h => (h - 1) * self.src_stride + self.width * BYTES_PER_PIXEL,
        }
    }

    fn dst_needed(&self) -> usize {
        match self.height {
            0 => 0,
            h => (h - 1) * self.dst_stride + self.width * SURFACE_BYTES_PER_PIXEL,
        }
    }

    /// Copy one frame. Channel order is swapped (src byte 2 lands in dst byte 0) and the
    /// fourth byte is zeroed. Nothing outside the crop rectangle is written.
    pub fn blit(&self, src: &[u8], dst: &mut [u8]) -> Result<(), BlitError> {
        let need = self.src_needed();
        if src.len() < need {
            return Err(BlitError::SourceTooShort {
                need,
                got: src.len(),
            });
        }
        let need = self.dst_needed();
        if dst.len() < need {
            return Err(BlitError::SurfaceTooShort {
                need,
                got: dst.len(),
            });
        }

        let src_row_bytes = self.width * BYTES_PER_PIXEL;
        let dst_row_bytes = self.width * SURFACE_BYTES_PER_PIXEL;

        for (src_row, dst_row) in src
            .chunks(self.src_stride)
            .zip(dst.chunks_mut(self.dst_stride))
            .take(self.height)
        {
            for (s, d) in src_row[..src_row_bytes]
                .chunks_exact(BYTES_PER_PIXEL)
                .zip(dst_row[..dst_row_bytes].chunks_exact_mut(SURFACE_BYTES_PER_PIXEL))
            {
                d[0] = s[2];
                d[1] = s[1];
                d[2] = s[0];
                d[3] = 0;
            }
        }
        Ok(())
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(width: u32, height: u32) -> SurfaceGeometry {
        SurfaceGeometry::packed(width, height)
    }

    #[test]
    fn test_channel_swap() {
        let frame = FrameFormat::rgb24_tight(1, 1);
        let plan = BlitPlan::new(&frame, geometry(1, 1)).unwrap();
        let mut dst = [0xffu8; 4];

        plan.blit(&[0x10, 0x20, 0x30], &mut dst).unwrap();
        assert_eq!(dst, [0x30, 0x20, 0x10, 0x00]);
    }

    #[test]
    fn test_only_crop_region_changes() {
        const BG: u8 = 0xa5;
        let frame = FrameFormat::rgb24(1280, 720);
        let surface = geometry(1920, 1080);
        let plan = BlitPlan::new(&frame, surface).unwrap();

        let src = vec![0x11u8; frame.capacity()];
        let mut dst = vec![BG; surface.len()];
        plan.blit(&src, &mut dst).unwrap();

        for (y, row) in dst.chunks(surface.row_bytes()).enumerate() {
            for (x, px) in row.chunks(4).enumerate() {
                if x < 1280 && y < 720 {
                    assert_eq!(px, &[0x11, 0x11, 0x11, 0x00], "inside at ({x}, {y})");
                } else {
                    assert_eq!(px, &[BG; 4], "outside at ({x}, {y})");
                }
            }
        }
    }

    #[test]
    fn test_source_stride_padding_ignored() {
        // 2x2 crop stored with 32-pixel rows; padding bytes must never reach the surface.
        let frame = FrameFormat::rgb24(2, 2);
        let plan = BlitPlan::new(&frame, geometry(3, 2)).unwrap();

        let mut src = vec![0xeeu8; frame.capacity()];
        src[..6].copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        src[frame.stride..frame.stride + 6].copy_from_slice(&[7, 8, 9, 10, 11, 12]);

        let mut dst = vec![0u8; 3 * 2 * 4];
        plan.blit(&src, &mut dst).unwrap();

        assert_eq!(
            dst,
            vec![
                3, 2, 1, 0, 6, 5, 4, 0, 0, 0, 0, 0, //
                9, 8, 7, 0, 12, 11, 10, 0, 0, 0, 0, 0,
            ]
        );
    }

    #[test]
    fn test_surface_stride_wider_than_width() {
        let frame = FrameFormat::rgb24_tight(1, 2);
        let surface = SurfaceGeometry {
            width: 1,
            height: 2,
            stride: 2,
        };
        let plan = BlitPlan::new(&frame, surface).unwrap();
        let mut dst = vec![0x55u8; surface.len()];
        plan.blit(&[1, 2, 3, 4, 5, 6], &mut dst).unwrap();
        assert_eq!(dst, vec![3, 2, 1, 0, 0x55, 0x55, 0x55, 0x55, 6, 5, 4, 0, 0x55, 0x55, 0x55, 0x55]);
    }

    #[test]
    fn test_crop_larger_than_surface_rejected() {
        let frame = FrameFormat::rgb24(1920, 1080);
        let err = BlitPlan::new(&frame, geometry(1280, 720)).unwrap_err();
        assert!(matches!(err, ConfigError::CropExceedsDisplay { .. }));
    }

    #[test]
    fn test_degenerate_geometry_rejected() {
        for frame in [FrameFormat::rgb24(0, 4), FrameFormat::rgb24(4, 0)] {
            let err = BlitPlan::new(&frame, geometry(0, 4)).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{frame:?}");
        }

        let narrow = SurfaceGeometry {
            width: 4,
            height: 4,
            stride: 2,
        };
        let err = BlitPlan::new(&FrameFormat::rgb24_tight(2, 2), narrow).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_short_source_rejected() {
        let frame = FrameFormat::rgb24_tight(4, 4);
        let plan = BlitPlan::new(&frame, geometry(4, 4)).unwrap();
        let mut dst = vec![0u8; 64];
        let err = plan.blit(&[0u8; 10], &mut dst).unwrap_err();
        assert_eq!(err, BlitError::SourceTooShort { need: 48, got: 10 });
        assert!(dst.iter().all(|&b| b == 0));
    }
}
