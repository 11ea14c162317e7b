//! V4L2 capture source delivering packed RGB24 into pool slots

use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::control::{Control, Value};
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::buffer::{align_up, CaptureBuffer, FrameFormat, HEIGHT_ALIGN, WIDTH_ALIGN};
use super::producer::CaptureProducer;
use super::source::{BufferReturner, Delivery, FrameSource};
use crate::error::SourceError;
use crate::CaptureConfig;

const RGB24: &[u8; 4] = b"RGB3";
const V4L2_CID_EXPOSURE_AUTO: u32 = 0x009a_0901;
const V4L2_CID_EXPOSURE_ABSOLUTE: u32 = 0x009a_0902;
const V4L2_EXPOSURE_MANUAL: i64 = 1;
/// How long a dequeue may block before the delivery thread rechecks for shutdown.
const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(500);

/// Camera source on a V4L2 capture device.
pub struct V4l2Source {
    device: Option<Device>,
    config: CaptureConfig,
    driver_stride: usize,
    delivery: Option<Delivery>,
}

impl V4l2Source {
    /// Open the device and negotiate format, frame rate and exposure.
    #[instrument(skip(config), fields(device = %config.device))]
    pub fn open(config: CaptureConfig) -> Result<Self, SourceError> {
        info!("Initializing V4L2 capture: {}", config.device);

        let device = Device::with_path(&config.device)?;

        let caps = device.query_caps()?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(SourceError::NotACaptureDevice {
                path: config.device.clone(),
            });
        }

        let mut fmt = device.format()?;
        fmt.width = align_up(config.width, WIDTH_ALIGN);
        fmt.height = align_up(config.height, HEIGHT_ALIGN);
        fmt.fourcc = FourCC::new(RGB24);
        let fmt = device.set_format(&fmt)?;

        if fmt.fourcc != FourCC::new(RGB24) || fmt.width < config.width || fmt.height < config.height
        {
            return Err(SourceError::FormatRejected {
                wanted: format!("{}x{} RGB3", config.width, config.height),
                got: format!("{}x{} {}", fmt.width, fmt.height, fmt.fourcc),
            });
        }
        info!(
            "Camera: resolution {}x{} (buffer {}x{})",
            config.width, config.height, fmt.width, fmt.height
        );

        let driver_stride = if fmt.stride == 0 {
            fmt.width as usize * 3
        } else {
            fmt.stride as usize
        };

        let params = device.set_params(&Parameters::with_fps(config.fps))?;
        debug!(
            "Frame interval: {}/{}",
            params.interval.numerator, params.interval.denominator
        );

        Self::set_exposure(&device, config.shutter_speed_us);

        Ok(Self {
            device: Some(device),
            config,
            driver_stride,
            delivery: None,
        })
    }

    /// Manual exposure in microseconds. The driver may lower the frame rate to fit it.
    fn set_exposure(device: &Device, shutter_speed_us: u32) {
        let manual = Control {
            id: V4L2_CID_EXPOSURE_AUTO,
            value: Value::Integer(V4L2_EXPOSURE_MANUAL),
        };
        if let Err(e) = device.set_control(manual) {
            warn!("Failed to disable auto exposure: {}", e);
            return;
        }

        // V4L2 absolute exposure is in 100 µs units.
        let exposure = Control {
            id: V4L2_CID_EXPOSURE_ABSOLUTE,
            value: Value::Integer(i64::from(shutter_speed_us / 100).max(1)),
        };
        if let Err(e) = device.set_control(exposure) {
            warn!("Failed to set shutter speed: {}", e);
        }
    }

    /// Layout of the pool slots this source fills.
    pub fn frame_format(&self) -> FrameFormat {
        FrameFormat::rgb24(self.config.width, self.config.height)
    }
}

impl FrameSource for V4l2Source {
    fn start(
        &mut self,
        buffers: Vec<CaptureBuffer>,
        mut producer: CaptureProducer,
    ) -> Result<BufferReturner, SourceError> {
        let device = self.device.take().ok_or(SourceError::AlreadyStarted)?;
        let buffer_count = buffers.len() as u32;

        let (returner, free) = BufferReturner::channel(buffers.len());
        for buffer in buffers {
            returner.release(buffer)?;
        }

        let driver_stride = self.driver_stride;
        let (ready_tx, ready_rx) = flume::bounded::<Result<(), SourceError>>(1);

        let delivery = Delivery::spawn("v4l2-capture", &returner, free, move |free| {
            let mut stream = match MmapStream::with_buffers(&device, Type::VideoCapture, buffer_count)
            {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }
            };
            stream.set_timeout(DEQUEUE_TIMEOUT);
            let _ = ready_tx.send(Ok(()));
            info!("Capture stream started with {} buffers", buffer_count);

            while let Some(mut buffer) = free.next() {
                // Keep pulling until a frame lands or we are told to stop.
                let delivered = loop {
                    match stream.next() {
                        Ok((data, _meta)) => {
                            buffer.fill_from(data, driver_stride);
                            break true;
                        }
                        Err(e) => {
                            if free.stopping() {
                                break false;
                            }
                            warn!("Capture error: {}", e);
                            std::thread::sleep(Duration::from_millis(10));
                        }
                    }
                };
                if !delivered {
                    break;
                }
                if let Err(rejected) = producer.on_buffer_filled(buffer) {
                    free.put_back(rejected.buffer);
                    break;
                }
            }
            info!("Capture stream stopped");
        })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(SourceError::ThreadPanicked),
        }

        self.delivery = Some(delivery);
        Ok(returner)
    }

    fn stop(&mut self) -> Result<(), SourceError> {
        match self.delivery.take() {
            Some(mut delivery) => delivery.stop(),
            None => Ok(()),
        }
    }
}
