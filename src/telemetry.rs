//! Floating-window frame rate meter

use std::time::Duration;

/// Default report window.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// One emitted measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRateReport {
    pub frames: u32,
    pub elapsed: Duration,
    pub fps: f64,
}

/// Accumulates per-frame durations and reports once the window is exceeded.
///
/// The window floats: it closes on the first frame that pushes the total past
/// the interval, so it is always slightly longer than the interval.
#[derive(Debug, Clone)]
pub struct FrameRateMeter {
    interval: Duration,
    elapsed: Duration,
    frames: u32,
}

impl FrameRateMeter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            elapsed: Duration::ZERO,
            frames: 0,
        }
    }

    /// Add one frame that took `iteration`. Returns a report when the window closes.
    pub fn record(&mut self, iteration: Duration) -> Option<FrameRateReport> {
        self.elapsed += iteration;
        self.frames += 1;

        if self.elapsed <= self.interval {
            return None;
        }

        let report = FrameRateReport {
            frames: self.frames,
            elapsed: self.elapsed,
            fps: f64::from(self.frames) / self.elapsed.as_secs_f64(),
        };
        self.elapsed = Duration::ZERO;
        self.frames = 0;
        Some(report)
    }

    /// (frames, elapsed) in the current window.
    pub fn pending(&self) -> (u32, Duration) {
        (self.frames, self.elapsed)
    }
}

impl Default for FrameRateMeter {
    fn default() -> Self {
        Self::new(DEFAULT_REPORT_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1/30 s rounded up to the next nanosecond.
    const FRAME_30HZ: Duration = Duration::from_nanos(33_333_334);

    #[test]
    fn test_reports_30hz_after_30_frames() {
        let mut meter = FrameRateMeter::default();

        for _ in 0..29 {
            assert!(meter.record(FRAME_30HZ).is_none());
        }
        let report = meter.record(FRAME_30HZ).expect("window should close");

        assert_eq!(report.frames, 30);
        assert!((report.fps - 30.0).abs() < 1e-3, "fps = {}", report.fps);
        assert_eq!(meter.pending(), (0, Duration::ZERO));
    }

    #[test]
    fn test_exact_interval_does_not_report() {
        let mut meter = FrameRateMeter::new(Duration::from_millis(100));
        assert!(meter.record(Duration::from_millis(100)).is_none());
        let report = meter.record(Duration::from_millis(1)).unwrap();
        assert_eq!(report.frames, 2);
        assert_eq!(report.elapsed, Duration::from_millis(101));
    }

    #[test]
    fn test_single_slow_frame_reports_alone() {
        let mut meter = FrameRateMeter::default();
        let report = meter.record(Duration::from_secs(2)).unwrap();
        assert_eq!(report.frames, 1);
        assert!((report.fps - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_consecutive_windows() {
        let mut meter = FrameRateMeter::default();
        let step = Duration::from_millis(20);
        let reports: Vec<_> = (0..200).filter_map(|_| meter.record(step)).collect();

        // Each window closes on its 51st frame (1.02 s).
        assert_eq!(reports.len(), 3);
        for report in reports {
            assert_eq!(report.frames, 51);
            assert!((report.fps - 50.0).abs() < 1e-9);
        }
    }
}
