//! Linux fbdev surface mapped straight into process memory

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::Path;

use memmap2::{MmapMut, MmapOptions};
use tracing::{info, instrument};

use super::surface::{DisplaySurface, SurfaceGeometry, SURFACE_BYTES_PER_PIXEL};
use crate::error::DisplayError;
use sys::{fb_get_fscreeninfo, fb_get_vscreeninfo, FbFixScreenInfo, FbVarScreenInfo};

#[allow(dead_code)]
mod sys {
    use libc::{c_char, c_ulong};

    #[repr(C)]
    #[derive(Debug, Default, Clone, Copy)]
    pub struct FbBitfield {
        pub offset: u32,
        pub length: u32,
        pub msb_right: u32,
    }

    /// `struct fb_var_screeninfo` from `<linux/fb.h>`.
    #[repr(C)]
    #[derive(Debug, Default, Clone, Copy)]
    pub struct FbVarScreenInfo {
        pub xres: u32,
        pub yres: u32,
        pub xres_virtual: u32,
        pub yres_virtual: u32,
        pub xoffset: u32,
        pub yoffset: u32,
        pub bits_per_pixel: u32,
        pub grayscale: u32,
        pub red: FbBitfield,
        pub green: FbBitfield,
        pub blue: FbBitfield,
        pub transp: FbBitfield,
        pub nonstd: u32,
        pub activate: u32,
        pub height: u32,
        pub width: u32,
        pub accel_flags: u32,
        pub pixclock: u32,
        pub left_margin: u32,
        pub right_margin: u32,
        pub upper_margin: u32,
        pub lower_margin: u32,
        pub hsync_len: u32,
        pub vsync_len: u32,
        pub sync: u32,
        pub vmode: u32,
        pub rotate: u32,
        pub colorspace: u32,
        pub reserved: [u32; 4],
    }

    /// `struct fb_fix_screeninfo` from `<linux/fb.h>`.
    #[repr(C)]
    #[derive(Debug, Default, Clone, Copy)]
    pub struct FbFixScreenInfo {
        pub id: [c_char; 16],
        pub smem_start: c_ulong,
        pub smem_len: u32,
        pub type_: u32,
        pub type_aux: u32,
        pub visual: u32,
        pub xpanstep: u16,
        pub ypanstep: u16,
        pub ywrapstep: u16,
        pub line_length: u32,
        pub mmio_start: c_ulong,
        pub mmio_len: u32,
        pub accel: u32,
        pub capabilities: u16,
        pub reserved: [u16; 2],
    }

    pub const FBIOGET_VSCREENINFO: u32 = 0x4600;
    pub const FBIOGET_FSCREENINFO: u32 = 0x4602;

    nix::ioctl_read_bad!(fb_get_vscreeninfo, FBIOGET_VSCREENINFO, FbVarScreenInfo);
    nix::ioctl_read_bad!(fb_get_fscreeninfo, FBIOGET_FSCREENINFO, FbFixScreenInfo);
}

/// Memory-mapped `/dev/fbN`. The mapping is released on drop.
pub struct FbDevSurface {
    geometry: SurfaceGeometry,
    map: MmapMut,
    _file: File,
}

impl FbDevSurface {
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DisplayError> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        let fd = file.as_raw_fd();

        let mut vinfo = FbVarScreenInfo::default();
        let mut finfo = FbFixScreenInfo::default();
        // SAFETY: both structs mirror the kernel layouts and outlive the calls.
        unsafe {
            fb_get_fscreeninfo(fd, &mut finfo)?;
            fb_get_vscreeninfo(fd, &mut vinfo)?;
        }

        info!(
            "Framebuffer: resolution {}x{} with {}bpp",
            vinfo.xres, vinfo.yres, vinfo.bits_per_pixel
        );

        if vinfo.bits_per_pixel as usize != SURFACE_BYTES_PER_PIXEL * 8 {
            return Err(DisplayError::UnsupportedDepth(vinfo.bits_per_pixel));
        }
        if vinfo.xres == 0 || vinfo.yres == 0 {
            return Err(DisplayError::EmptyResolution);
        }

        let stride = match finfo.line_length as usize / SURFACE_BYTES_PER_PIXEL {
            0 => vinfo.xres,
            pitch => (pitch as u32).max(vinfo.xres),
        };
        let geometry = SurfaceGeometry {
            width: vinfo.xres,
            height: vinfo.yres,
            stride,
        };

        // SAFETY: the framebuffer is only written through this mapping while we own it.
        let map = unsafe { MmapOptions::new().len(geometry.len()).map_mut(&file)? };

        Ok(Self {
            geometry,
            map,
            _file: file,
        })
    }
}

impl DisplaySurface for FbDevSurface {
    fn geometry(&self) -> SurfaceGeometry {
        self.geometry
    }

    fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.map[..]
    }
}
