use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use camblit::capture::synthetic::pattern_pixel;
use camblit::capture::{
    BufferReturner, CaptureBuffer, CaptureProducer, FrameFormat, FrameSource, SyntheticSource,
};
use camblit::display::{paint_gradient, DisplaySurface, MemorySurface};
use camblit::error::{PoolError, SourceError};
use camblit::pipeline::{FramePool, Pipeline, PipelineSettings};
use camblit::{ConfigError, PipelineError};

fn settings(format: FrameFormat, max_frames: Option<u64>) -> PipelineSettings {
    PipelineSettings {
        format,
        pool_size: 3,
        report_interval: Duration::from_secs(1),
        max_frames,
    }
}

/// Delivers one slot that does not belong to the pool from its own thread, then goes quiet.
struct ForeignSource {
    format: FrameFormat,
    _free: Option<flume::Receiver<CaptureBuffer>>,
    worker: Option<JoinHandle<()>>,
}

impl FrameSource for ForeignSource {
    fn start(
        &mut self,
        buffers: Vec<CaptureBuffer>,
        mut producer: CaptureProducer,
    ) -> Result<BufferReturner, SourceError> {
        let (returner, free) = BufferReturner::channel(buffers.len());
        for buffer in buffers {
            returner.release(buffer)?;
        }
        self._free = Some(free);

        let format = self.format;
        self.worker = Some(thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            let _ = producer.on_buffer_filled(CaptureBuffer::new(99, format));
        }));
        Ok(returner)
    }

    fn stop(&mut self) -> Result<(), SourceError> {
        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| SourceError::ThreadPanicked),
            None => Ok(()),
        }
    }
}

/// Keeps one slot back and only queues it while being stopped.
struct LateSource {
    producer: Option<CaptureProducer>,
    held: Option<CaptureBuffer>,
    _free: Option<flume::Receiver<CaptureBuffer>>,
}

impl FrameSource for LateSource {
    fn start(
        &mut self,
        mut buffers: Vec<CaptureBuffer>,
        producer: CaptureProducer,
    ) -> Result<BufferReturner, SourceError> {
        let (returner, free) = BufferReturner::channel(buffers.len());
        self.held = buffers.pop();
        for buffer in buffers {
            returner.release(buffer)?;
        }
        self._free = Some(free);
        self.producer = Some(producer);
        Ok(returner)
    }

    fn stop(&mut self) -> Result<(), SourceError> {
        if let (Some(producer), Some(buffer)) = (self.producer.as_mut(), self.held.take()) {
            producer
                .on_buffer_filled(buffer)
                .map_err(|_| SourceError::Disconnected)?;
        }
        Ok(())
    }
}

#[test]
fn test_synthetic_frames_reach_surface_in_order() {
    let format = FrameFormat::rgb24(32, 16);
    let mut surface = MemorySurface::new(64, 48);
    paint_gradient(&mut surface);
    let background = surface.clone();

    let source = SyntheticSource::new(format, 30).unpaced();
    let mut pipeline =
        Pipeline::start(Box::new(source), surface, settings(format, Some(50))).unwrap();
    let summary = pipeline.run().unwrap();

    assert_eq!(summary.stats.displayed, 50);
    assert_eq!(summary.stats.dropped, 0);
    assert_eq!(summary.counts.total(), summary.pool_size);

    // Frame 50 (pattern index 49) is the last one drawn.
    let surface = pipeline.consumer().surface();
    for (x, y) in [(0, 0), (31, 0), (5, 9), (31, 15)] {
        let [r, g, b] = pattern_pixel(x, y, 49);
        assert_eq!(surface.pixel(x, y), [b, g, r, 0], "pixel ({x}, {y})");
    }
    for (x, y) in [(32, 0), (63, 15), (0, 16), (63, 47)] {
        assert_eq!(surface.pixel(x, y), background.pixel(x, y), "pixel ({x}, {y})");
    }
}

#[test]
fn test_shutdown_unblocks_running_pipeline() {
    let format = FrameFormat::rgb24(16, 16);
    let source = SyntheticSource::new(format, 200);
    let mut pipeline =
        Pipeline::start(Box::new(source), MemorySurface::new(16, 16), settings(format, None))
            .unwrap();

    let shutdown = pipeline.shutdown_handle();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        shutdown.shutdown();
    });

    let summary = pipeline.run().unwrap();
    stopper.join().unwrap();

    assert!(summary.stats.displayed > 0);
    assert_eq!(summary.counts.total(), 3);
}

#[test]
fn test_shutdown_while_source_is_idle() {
    // A source that delivers nothing: the loop must still exit on shutdown.
    let format = FrameFormat::rgb24(16, 16);
    let source = SyntheticSource::new(format, 30).with_frame_limit(0);
    let mut pipeline =
        Pipeline::start(Box::new(source), MemorySurface::new(16, 16), settings(format, None))
            .unwrap();

    let shutdown = pipeline.shutdown_handle();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        shutdown.shutdown();
    });

    let summary = pipeline.run().unwrap();
    stopper.join().unwrap();
    assert_eq!(summary.stats.displayed, 0);
    assert_eq!(summary.counts.at_source, 3);
}

#[test]
fn test_foreign_buffer_from_source_ends_run_with_error() {
    let format = FrameFormat::rgb24(16, 16);
    let source = ForeignSource {
        format,
        _free: None,
        worker: None,
    };
    let mut pipeline =
        Pipeline::start(Box::new(source), MemorySurface::new(16, 16), settings(format, None))
            .unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = done_tx.send(pipeline.run());
    });

    let result = done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("display loop never returned");
    assert!(matches!(
        result,
        Err(PipelineError::Pool(PoolError::UnknownBuffer { id: 99 }))
    ));
}

#[test]
fn test_slot_queued_during_stop_is_returned() {
    let format = FrameFormat::rgb24(16, 16);
    let source = LateSource {
        producer: None,
        held: None,
        _free: None,
    };
    let mut pipeline =
        Pipeline::start(Box::new(source), MemorySurface::new(16, 16), settings(format, Some(0)))
            .unwrap();

    let summary = pipeline.run().unwrap();
    assert_eq!(summary.stats.displayed, 0);
    assert_eq!(summary.counts.queued, 0);
    assert_eq!(summary.counts.at_source, 3);
    assert_eq!(pipeline.consumer().queue().queued(), 0);
}

#[test]
fn test_crop_larger_than_display_fails_at_start() {
    let format = FrameFormat::rgb24(1280, 720);
    let source = SyntheticSource::new(format, 30);
    let result = Pipeline::start(Box::new(source), MemorySurface::new(640, 480), settings(format, None));

    assert!(matches!(
        result,
        Err(PipelineError::Config(ConfigError::CropExceedsDisplay { .. }))
    ));
}

#[test]
fn test_blit_only_touches_top_left_region() {
    let format = FrameFormat::rgb24(1280, 720);
    let mut surface = MemorySurface::new(1920, 1080);
    paint_gradient(&mut surface);
    let before = surface.clone();

    let source = SyntheticSource::new(format, 30).unpaced();
    let mut pipeline =
        Pipeline::start(Box::new(source), surface, settings(format, Some(2))).unwrap();
    pipeline.run().unwrap();

    let after = pipeline.consumer().surface();
    let geometry = after.geometry();
    for y in 0..geometry.height {
        for x in 0..geometry.width {
            if x >= 1280 || y >= 720 {
                assert_eq!(after.pixel(x, y), before.pixel(x, y), "pixel ({x}, {y})");
            } else {
                assert_eq!(after.pixel(x, y)[3], 0);
            }
        }
    }
}

#[test]
fn test_concurrent_cycling_keeps_order_and_buffers() {
    const FRAMES: u64 = 20_000;
    let format = FrameFormat::rgb24_tight(4, 4);
    let (buffers, filled, mut consumer) = FramePool::new(3, format).split();
    let (returner, free) = BufferReturner::channel(3);
    for buffer in buffers {
        returner.release(buffer).unwrap();
    }

    let producer = thread::spawn(move || {
        let mut producer = CaptureProducer::new(filled);
        for _ in 0..FRAMES {
            let buffer = free.recv().unwrap();
            producer.on_buffer_filled(buffer).unwrap();
        }
        free
    });

    let mut expected = 1;
    while expected <= FRAMES {
        consumer.wait().unwrap();
        let buffer = consumer.dequeue_filled().unwrap();
        assert_eq!(buffer.sequence, expected);
        consumer.release_to_producer(buffer, &returner).unwrap();
        expected += 1;
    }

    let free = producer.join().unwrap();
    assert_eq!(free.len(), 3);
    assert_eq!(consumer.counts().at_source, 3);
    assert_eq!(consumer.totals(), (FRAMES, FRAMES));
    assert_eq!(consumer.signal().pending(), 0);
}
