pub mod blit;
pub mod fbdev;
pub mod surface;

pub use blit::{BlitError, BlitPlan};
pub use fbdev::FbDevSurface;
pub use surface::{paint_gradient, DisplaySurface, MemorySurface, SurfaceGeometry};
