use std::path::Path;

use tracing::{debug, info, warn};
use v4l::{capability::Flags, video::Capture, Device, FourCC};

use crate::error::SourceError;

/// Detected capture device info
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundDevice {
    pub path: String,
    pub card: String,
}

/// Find the first capture device that can deliver packed RGB24.
pub fn auto_detect_device() -> Result<FoundDevice, SourceError> {
    info!("Auto-detecting capture devices...");

    for i in 0..10 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }

        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            debug!("{} is not a capture device", path);
            continue;
        }

        if let Ok(formats) = dev.enum_formats() {
            if formats.iter().any(|fmt| fmt.fourcc == FourCC::new(b"RGB3")) {
                info!("Found RGB24 device: {} - {}", path, caps.card);
                return Ok(FoundDevice {
                    path,
                    card: caps.card,
                });
            }
        }
    }

    Err(SourceError::NotACaptureDevice {
        path: "/dev/video[0-9]".into(),
    })
}

/// Pin the calling thread to `core`. Returns false if the core does not exist or pinning failed.
pub fn pin_current_thread(core: usize) -> bool {
    let Some(core_id) = core_affinity::get_core_ids()
        .and_then(|ids| ids.into_iter().find(|id| id.id == core))
    else {
        warn!("CPU core {} not available for pinning", core);
        return false;
    };

    let pinned = core_affinity::set_for_current(core_id);
    if pinned {
        info!("Display loop pinned to core {}", core);
    } else {
        warn!("Failed to pin display loop to core {}", core);
    }
    pinned
}
