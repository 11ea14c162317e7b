/// Bytes per pixel of every display surface we drive.
pub const SURFACE_BYTES_PER_PIXEL: usize = 4;

/// Screen dimensions. `stride` is the row pitch in pixels and may exceed `width`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceGeometry {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
}

impl SurfaceGeometry {
    /// Rows with no padding.
    pub fn packed(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            stride: width,
        }
    }

    pub fn row_bytes(&self) -> usize {
        self.stride as usize * SURFACE_BYTES_PER_PIXEL
    }

    /// Total bytes of the visible area.
    pub fn len(&self) -> usize {
        self.row_bytes() * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A writable screen: rows of 4-byte pixels that live as long as the surface.
pub trait DisplaySurface: Send {
    fn geometry(&self) -> SurfaceGeometry;

    fn pixels_mut(&mut self) -> &mut [u8];
}

/// Heap-backed surface for headless runs and tests.
#[derive(Debug, Clone)]
pub struct MemorySurface {
    geometry: SurfaceGeometry,
    pixels: Vec<u8>,
}

impl MemorySurface {
    pub fn new(width: u32, height: u32) -> Self {
        let geometry = SurfaceGeometry::packed(width, height);
        Self {
            geometry,
            pixels: vec![0; geometry.len()],
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// The four bytes of pixel (x, y).
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = y as usize * self.geometry.row_bytes() + x as usize * SURFACE_BYTES_PER_PIXEL;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.pixels[offset..offset + SURFACE_BYTES_PER_PIXEL]);
        px
    }
}

impl DisplaySurface for MemorySurface {
    fn geometry(&self) -> SurfaceGeometry {
        self.geometry
    }

    fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }
}

/// Fill the whole surface with a vertical/horizontal gradient so the area
/// around the camera picture stays recognisable.
pub fn paint_gradient(surface: &mut dyn DisplaySurface) {
    let geometry = surface.geometry();
    if geometry.is_empty() {
        return;
    }
    let height = geometry.height.max(1) as usize;
    let width_bytes = (geometry.width.max(1) as usize) * SURFACE_BYTES_PER_PIXEL;
    let visible = geometry.width as usize;

    for (y, row) in surface
        .pixels_mut()
        .chunks_mut(geometry.row_bytes())
        .take(geometry.height as usize)
        .enumerate()
    {
        for (x, px) in row
            .chunks_exact_mut(SURFACE_BYTES_PER_PIXEL)
            .take(visible)
            .enumerate()
        {
            px[0] = (y * 255 / height) as u8;
            px[1] = (x * SURFACE_BYTES_PER_PIXEL * 255 / width_bytes) as u8;
            px[2] = 128;
            px[3] = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_sizes() {
        let geometry = SurfaceGeometry {
            width: 1920,
            height: 1080,
            stride: 1984,
        };
        assert_eq!(geometry.row_bytes(), 1984 * 4);
        assert_eq!(geometry.len(), 1984 * 4 * 1080);
        assert!(!geometry.is_empty());
    }

    #[test]
    fn test_gradient_corners() {
        let mut surface = MemorySurface::new(100, 50);
        paint_gradient(&mut surface);

        assert_eq!(surface.pixel(0, 0), [0, 0, 128, 0]);
        // Last row/column approach but never reach 255.
        assert_eq!(surface.pixel(99, 49), [(49 * 255 / 50) as u8, (396 * 255 / 400) as u8, 128, 0]);
        assert_eq!(surface.pixel(50, 25)[2], 128);
    }
}
