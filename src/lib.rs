pub mod capture;
pub mod display;
pub mod error;
pub mod pipeline;
pub mod telemetry;
pub mod utils;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use error::{ConfigError, PipelineError};

/// Environment prefix for overrides, e.g. `CAMBLIT__CAPTURE__FPS=60`.
pub const ENV_PREFIX: &str = "CAMBLIT";
/// Config file read when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "camblit.toml";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub capture: CaptureConfig,
    pub display: DisplayConfig,
    pub pipeline: PipelineConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureBackend {
    V4l2,
    Synthetic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub backend: CaptureBackend,
    /// Empty means auto-detect.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Exposure time. A shutter slower than the frame period lowers the frame rate.
    pub shutter_speed_us: u32,
    pub buffer_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Framebuffer device; `memory` renders into an off-screen buffer of `width`x`height`.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub paint_background: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pin the display loop to this CPU core.
    pub consumer_core: Option<usize>,
    /// Exit after this many displayed frames.
    pub max_frames: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub report_interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backend: CaptureBackend::V4l2,
            device: "/dev/video0".into(),
            width: 1280,
            height: 720,
            fps: 30,
            shutter_speed_us: 15_000,
            buffer_count: pipeline::DEFAULT_POOL_SIZE,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            device: "/dev/fb0".into(),
            width: 1920,
            height: 1080,
            paint_background: true,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            report_interval_ms: 1000,
        }
    }
}

impl AppConfig {
    /// Defaults, then the TOML file (if present), then `CAMBLIT__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

        let config: AppConfig = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let capture = &self.capture;
        if capture.width == 0 || capture.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "capture resolution {}x{} is empty",
                capture.width, capture.height
            )));
        }
        if capture.fps == 0 {
            return Err(ConfigError::Invalid("capture fps must be positive".into()));
        }
        if capture.buffer_count < 2 {
            return Err(ConfigError::Invalid(format!(
                "need at least 2 capture buffers, got {}",
                capture.buffer_count
            )));
        }
        if self.telemetry.report_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "report interval must be positive".into(),
            ));
        }
        Ok(())
    }
}
