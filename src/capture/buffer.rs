use std::time::Instant;

/// Row alignment the capture hardware pads frame width to, in pixels.
pub const WIDTH_ALIGN: u32 = 32;
/// Row count alignment the capture hardware pads frame height to.
pub const HEIGHT_ALIGN: u32 = 16;
/// Packed RGB24.
pub const BYTES_PER_PIXEL: usize = 3;

/// Round `value` up to the next multiple of `align` (a power of two).
pub const fn align_up(value: u32, align: u32) -> u32 {
    (value + align - 1) & !(align - 1)
}

/// Layout of one captured frame: the crop region plus the padded storage around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    /// Logical crop width in pixels.
    pub width: u32,
    /// Logical crop height in pixels.
    pub height: u32,
    /// Bytes per stored row, including alignment padding.
    pub stride: usize,
    /// Stored rows, including alignment padding.
    pub padded_height: u32,
}

impl FrameFormat {
    /// Packed RGB24 with width padded to 32 pixels and height to 16 rows.
    pub fn rgb24(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            stride: align_up(width, WIDTH_ALIGN) as usize * BYTES_PER_PIXEL,
            padded_height: align_up(height, HEIGHT_ALIGN),
        }
    }

    /// Packed RGB24 with no padding at all.
    pub fn rgb24_tight(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            stride: width as usize * BYTES_PER_PIXEL,
            padded_height: height,
        }
    }

    /// Bytes of the crop region within one row.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Total bytes a buffer must hold.
    pub fn capacity(&self) -> usize {
        self.stride * self.padded_height as usize
    }
}

/// One pre-allocated frame slot cycled between the source and the display consumer.
///
/// Ownership of the value is the ownership of the slot: whoever holds the
/// `CaptureBuffer` is the only party that may touch its pixels.
#[derive(Debug)]
pub struct CaptureBuffer {
    id: usize,
    data: Box<[u8]>,
    format: FrameFormat,
    /// Sequence number assigned by the source when the slot was last filled.
    pub sequence: u64,
    /// Monotonic time the slot was last filled.
    pub captured_at: Instant,
}

impl CaptureBuffer {
    pub fn new(id: usize, format: FrameFormat) -> Self {
        Self {
            id,
            data: vec![0u8; format.capacity()].into_boxed_slice(),
            format,
            sequence: 0,
            captured_at: Instant::now(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn format(&self) -> &FrameFormat {
        &self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Stamp the slot as freshly filled.
    pub fn mark_filled(&mut self, sequence: u64) {
        self.sequence = sequence;
        self.captured_at = Instant::now();
    }

    /// Copy a driver frame with its own row stride into the crop region of this slot.
    ///
    /// Rows or bytes the driver frame lacks are left as they were.
    pub fn fill_from(&mut self, src: &[u8], src_stride: usize) {
        let row_bytes = self.format.row_bytes().min(src_stride);
        let stride = self.format.stride;
        let rows = self.format.height as usize;

        for (src_row, dst_row) in src
            .chunks(src_stride)
            .zip(self.data.chunks_mut(stride))
            .take(rows)
        {
            let n = row_bytes.min(src_row.len());
            dst_row[..n].copy_from_slice(&src_row[..n]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(1280, 32), 1280);
        assert_eq!(align_up(1281, 32), 1312);
        assert_eq!(align_up(720, 16), 720);
        assert_eq!(align_up(1, 16), 16);
    }

    #[test]
    fn test_padded_format() {
        let format = FrameFormat::rgb24(1000, 500);
        assert_eq!(format.stride, 1024 * 3);
        assert_eq!(format.padded_height, 512);
        assert_eq!(format.row_bytes(), 3000);
        assert_eq!(format.capacity(), 1024 * 3 * 512);
    }

    #[test]
    fn test_fill_from_respects_strides() {
        let format = FrameFormat::rgb24(2, 2);
        let mut buf = CaptureBuffer::new(0, format);

        // Driver rows are 8 bytes: 6 pixel bytes + 2 padding.
        let src = [1, 2, 3, 4, 5, 6, 0xee, 0xee, 7, 8, 9, 10, 11, 12, 0xee, 0xee];
        buf.fill_from(&src, 8);

        assert_eq!(&buf.data()[..6], &[1, 2, 3, 4, 5, 6]);
        assert_eq!(&buf.data()[format.stride..format.stride + 6], &[7, 8, 9, 10, 11, 12]);
        assert!(buf.data()[6..format.stride].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_mark_filled_updates_sequence() {
        let mut buf = CaptureBuffer::new(3, FrameFormat::rgb24_tight(4, 4));
        buf.mark_filled(17);
        assert_eq!(buf.id(), 3);
        assert_eq!(buf.sequence, 17);
    }
}
