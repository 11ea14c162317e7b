pub mod buffer;
pub mod producer;
pub mod source;
pub mod synthetic;
pub mod v4l2;

pub use buffer::{CaptureBuffer, FrameFormat};
pub use producer::CaptureProducer;
pub use source::{BufferReturner, FrameSource};
pub use synthetic::SyntheticSource;
pub use v4l2::V4l2Source;
