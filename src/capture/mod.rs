//! Frame sampling on a runtime-adjustable interval.
//!
//! The scheduler loop is deliberately plain: capture, screen, publish,
//! wait. The wait is sliced into one-second chunks and re-reads the shared
//! interval each chunk, so an operator change takes effect within roughly
//! a second instead of after the old interval has run out.

pub mod control;

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::frame::CapturedFrame;
use crate::quality::{self, FrameQuality};
use crate::source::FrameSource;

const HEALTH_LOG_PERIOD: Duration = Duration::from_secs(30);
const WAIT_SLICE: Duration = Duration::from_secs(1);

/// Rejected interval value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidInterval {
    pub value: u64,
}

impl std::fmt::Display for InvalidInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "capture interval must be at least 1 second (got {})",
            self.value
        )
    }
}

impl std::error::Error for InvalidInterval {}

/// Sampling interval shared between the scheduler and the control
/// endpoint. A single mutex-guarded value; readers never see a torn or
/// zero interval.
pub struct CaptureInterval {
    secs: Mutex<u64>,
}

impl CaptureInterval {
    pub fn new(secs: u64) -> Result<Self, InvalidInterval> {
        if secs == 0 {
            return Err(InvalidInterval { value: secs });
        }
        Ok(Self {
            secs: Mutex::new(secs),
        })
    }

    pub fn get(&self) -> u64 {
        *self.secs.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, secs: u64) -> Result<(), InvalidInterval> {
        if secs == 0 {
            return Err(InvalidInterval { value: secs });
        }
        let mut guard = self.secs.lock().unwrap_or_else(|e| e.into_inner());
        if *guard != secs {
            log::info!("capture interval changed: {}s -> {}s", *guard, secs);
        }
        *guard = secs;
        Ok(())
    }
}

/// Where captured frames go. The MQTT publisher implements this; tests
/// use the in-memory sink.
pub trait FrameSink {
    fn publish_frame(&mut self, frame: &CapturedFrame) -> Result<()>;
}

/// Sink that keeps frames in memory instead of publishing them.
#[derive(Default)]
pub struct InMemoryFrameSink {
    pub frames: Vec<CapturedFrame>,
}

impl FrameSink for InMemoryFrameSink {
    fn publish_frame(&mut self, frame: &CapturedFrame) -> Result<()> {
        self.frames.push(frame.clone());
        Ok(())
    }
}

/// Counters reported by the periodic health log.
#[derive(Clone, Copy, Debug, Default)]
pub struct CaptureStats {
    pub captured: u64,
    pub published: u64,
    pub dropped_degenerate: u64,
    pub failures: u64,
}

/// The samplerd main loop.
pub struct CaptureScheduler<S: FrameSink> {
    source: FrameSource,
    sink: S,
    interval: Arc<CaptureInterval>,
    stats: CaptureStats,
    last_health_log: Instant,
}

impl<S: FrameSink> CaptureScheduler<S> {
    pub fn new(source: FrameSource, sink: S, interval: Arc<CaptureInterval>) -> Self {
        Self {
            source,
            sink,
            interval,
            stats: CaptureStats::default(),
            last_health_log: Instant::now(),
        }
    }

    /// Sample until `shutdown` is raised.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        log::info!(
            "sampling '{}' every {}s",
            self.source.descriptor(),
            self.interval.get()
        );
        while !shutdown.load(Ordering::SeqCst) {
            let started = Instant::now();
            self.tick();
            self.maybe_log_health();
            self.wait_next(shutdown, started);
        }
        log::info!(
            "capture stopped: {} captured, {} published, {} degenerate, {} failures",
            self.stats.captured,
            self.stats.published,
            self.stats.dropped_degenerate,
            self.stats.failures
        );
    }

    /// One capture attempt. Failures are counted and logged, never fatal;
    /// the source reconnects on its own schedule.
    fn tick(&mut self) {
        match self.source.capture_frame() {
            Ok(Some(payload)) => {
                self.stats.captured += 1;
                match quality::assess(&payload) {
                    FrameQuality::Usable => self.publish(payload),
                    FrameQuality::Degenerate(kind) => {
                        self.stats.dropped_degenerate += 1;
                        log::debug!("dropping degenerate frame: {kind}");
                    }
                }
            }
            Ok(None) => {
                log::info!("source '{}' reached end of pass", self.source.descriptor());
            }
            Err(err) => {
                self.stats.failures += 1;
                log::warn!("capture failed: {err:#}");
            }
        }
    }

    fn publish(&mut self, payload: Vec<u8>) {
        let frame = match CapturedFrame::stamp_now(payload) {
            Ok(frame) => frame,
            Err(err) => {
                self.stats.failures += 1;
                log::warn!("failed to stamp frame: {err:#}");
                return;
            }
        };
        match self.sink.publish_frame(&frame) {
            Ok(()) => self.stats.published += 1,
            Err(err) => {
                self.stats.failures += 1;
                log::warn!("failed to publish frame: {err:#}");
            }
        }
    }

    fn wait_next(&self, shutdown: &AtomicBool, tick_started: Instant) {
        loop {
            if shutdown.load(Ordering::SeqCst) {
                return;
            }
            let target = Duration::from_secs(self.interval.get());
            match sleep_slice(target, tick_started.elapsed()) {
                Some(slice) => std::thread::sleep(slice),
                None => return,
            }
        }
    }

    fn maybe_log_health(&mut self) {
        if self.last_health_log.elapsed() < HEALTH_LOG_PERIOD {
            return;
        }
        self.last_health_log = Instant::now();
        let source = self.source.stats();
        log::info!(
            "capture health: {} captured, {} published, {} degenerate, {} capture failures, source {} frames / {} failures",
            self.stats.captured,
            self.stats.published,
            self.stats.dropped_degenerate,
            self.stats.failures,
            source.frames,
            source.failures
        );
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    /// Hand the sink back so the caller can shut it down after `run`.
    pub fn into_sink(self) -> S {
        self.sink
    }
}

/// Next sleep toward `target`, capped at one second so interval changes
/// land quickly. `None` when the tick is due.
fn sleep_slice(target: Duration, elapsed: Duration) -> Option<Duration> {
    if elapsed >= target {
        return None;
    }
    Some((target - elapsed).min(WAIT_SLICE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FrameSource;

    #[test]
    fn zero_interval_is_rejected() {
        assert!(CaptureInterval::new(0).is_err());
        let interval = CaptureInterval::new(5).unwrap();
        assert_eq!(
            interval.set(0),
            Err(InvalidInterval { value: 0 })
        );
        assert_eq!(interval.get(), 5);
    }

    #[test]
    fn interval_updates_are_visible_to_readers() {
        let interval = Arc::new(CaptureInterval::new(5).unwrap());
        interval.set(2).unwrap();
        assert_eq!(interval.get(), 2);
    }

    #[test]
    fn sleep_slices_never_exceed_one_second() {
        let five = Duration::from_secs(5);
        assert_eq!(
            sleep_slice(five, Duration::ZERO),
            Some(Duration::from_secs(1))
        );
        assert_eq!(
            sleep_slice(five, Duration::from_millis(4600)),
            Some(Duration::from_millis(400))
        );
    }

    #[test]
    fn sleep_ends_when_the_tick_is_due() {
        let five = Duration::from_secs(5);
        assert_eq!(sleep_slice(five, five), None);
        // Shrinking the interval below the elapsed time fires immediately.
        assert_eq!(sleep_slice(Duration::from_secs(2), Duration::from_secs(3)), None);
    }

    #[test]
    fn usable_frames_are_stamped_and_published() {
        let source = FrameSource::open("stub://scene").unwrap();
        let interval = Arc::new(CaptureInterval::new(1).unwrap());
        let mut scheduler = CaptureScheduler::new(source, InMemoryFrameSink::default(), interval);
        scheduler.tick();
        scheduler.tick();
        assert_eq!(scheduler.stats().published, 2);
        assert_eq!(scheduler.sink.frames.len(), 2);
        assert_eq!(scheduler.sink.frames[0].captured_at.len(), 20);
        assert!(scheduler.sink.frames[0].captured_at.ends_with('Z'));
    }

    #[test]
    fn degenerate_frames_are_dropped_before_the_queue() {
        let source = FrameSource::open("stub://flat").unwrap();
        let interval = Arc::new(CaptureInterval::new(1).unwrap());
        let mut scheduler = CaptureScheduler::new(source, InMemoryFrameSink::default(), interval);
        scheduler.tick();
        assert_eq!(scheduler.stats().captured, 1);
        assert_eq!(scheduler.stats().dropped_degenerate, 1);
        assert!(scheduler.sink.frames.is_empty());
    }

    #[test]
    fn run_exits_on_shutdown() {
        let source = FrameSource::open("stub://scene").unwrap();
        let interval = Arc::new(CaptureInterval::new(1).unwrap());
        let mut scheduler = CaptureScheduler::new(source, InMemoryFrameSink::default(), interval);
        let shutdown = AtomicBool::new(true);
        scheduler.run(&shutdown);
        assert_eq!(scheduler.stats().captured, 0);
    }
}
