//! Error types shared across the capture, pool and display layers.

use thiserror::Error;

use crate::capture::CaptureBuffer;

/// Buffer accounting failures between producer and consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// A wait succeeded but the filled queue had nothing in it.
    #[error("filled queue empty after a satisfied wait")]
    EmptyQueue,

    /// More buffers were enqueued than the pool holds.
    #[error("filled queue overflow while enqueuing buffer {id}")]
    QueueFull { id: usize },

    /// A buffer was released without being held by the consumer.
    #[error("buffer {id} released twice")]
    DoubleRelease { id: usize },

    /// A buffer id outside the pool was seen.
    #[error("buffer {id} does not belong to this pool")]
    UnknownBuffer { id: usize },
}

impl PoolError {
    /// Whether the error means the pool ledger can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PoolError::EmptyQueue)
    }
}

/// A filled slot the queue refused, handed back so the caller can requeue it.
#[derive(Debug, Error)]
#[error("filled buffer rejected: {error}")]
pub struct RejectedBuffer {
    pub buffer: CaptureBuffer,
    #[source]
    pub error: PoolError,
}

/// Errors raised by a hardware frame source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("capture device I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("device {path} does not support video capture")]
    NotACaptureDevice { path: String },

    #[error("device refused format: wanted {wanted}, got {got}")]
    FormatRejected { wanted: String, got: String },

    #[error("source already started")]
    AlreadyStarted,

    #[error("source delivery thread is gone")]
    Disconnected,

    #[error("delivery thread panicked")]
    ThreadPanicked,
}

/// Errors raised while opening or mapping a display surface.
#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("display device I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("display ioctl failed: {0}")]
    Ioctl(#[from] nix::Error),

    #[error("unsupported display depth: {0} bpp (need 32)")]
    UnsupportedDepth(u32),

    #[error("display reports an empty resolution")]
    EmptyResolution,
}

/// Configuration that cannot drive a pipeline.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(
        "capture crop {crop_width}x{crop_height} does not fit display {display_width}x{display_height}"
    )]
    CropExceedsDisplay {
        crop_width: u32,
        crop_height: u32,
        display_width: u32,
        display_height: u32,
    },
}

/// Top-level pipeline error.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Display(#[from] DisplayError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
