use crate::camera::{CaptureOutcome, FrameSource};
use crate::config::CaptureConfig;
use crate::error::{CameraError, Result};
use crate::exchange::CapturePort;
use crate::frame::Frame;
use crate::lifecycle::{LoopEnd, LoopReport, LoopRole, StopSignal};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Counters kept while the capture loop runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames_published: u64,
    pub not_ready_retries: u64,
}

impl CaptureStats {
    fn record_published(&mut self) {
        self.frames_published += 1;
    }

    fn record_not_ready(&mut self) {
        self.not_ready_retries += 1;
    }
}

/// Producer loop: camera -> next rotation slot, for a fixed wall-clock budget
pub struct CaptureLoop {
    camera: Box<dyn FrameSource>,
    port: CapturePort,
    run_for: Duration,
    retry_interval: Duration,
    stop: StopSignal,
    stats: CaptureStats,
}

impl CaptureLoop {
    pub fn new(camera: Box<dyn FrameSource>, port: CapturePort, config: &CaptureConfig) -> Self {
        Self {
            camera,
            port,
            run_for: config.run_duration(),
            retry_interval: config.retry_interval(),
            stop: StopSignal::Never,
            stats: CaptureStats::default(),
        }
    }

    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn stats(&self) -> &CaptureStats {
        &self.stats
    }

    /// Block until the camera yields a frame.
    ///
    /// "Not ready" is retried without limit, sleeping `retry_interval` between
    /// attempts. Returns `Ok(None)` only when the supervisor stops the loop.
    pub fn capture_blocking(&mut self) -> std::result::Result<Option<Frame>, CameraError> {
        loop {
            match self.camera.capture_frame()? {
                CaptureOutcome::Frame(frame) => return Ok(Some(frame)),
                CaptureOutcome::NotReady => {
                    self.stats.record_not_ready();
                    trace!("Camera not ready, retrying");
                    if self.stop.sleep(self.retry_interval) {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// One iteration: capture, then publish into the next slot.
    /// Returns the slot written, or `None` if stopped while waiting.
    pub fn step(&mut self) -> Result<Option<usize>> {
        let frame = match self.capture_blocking()? {
            Some(frame) => frame,
            None => return Ok(None),
        };

        let slot = self.port.publish(&frame)?;
        self.stats.record_published();
        Ok(Some(slot))
    }

    /// Run until the budget is spent, the supervisor stops the loop, or the
    /// camera fails. An iteration that starts before the deadline completes.
    pub fn run(mut self) -> LoopReport {
        info!(
            "Capture loop started: {}s budget, frame shape {}",
            self.run_for.as_secs(),
            self.port.geometry()
        );

        let started = Instant::now();
        let ended_by = loop {
            if started.elapsed() >= self.run_for {
                break LoopEnd::Deadline;
            }
            if self.stop.is_stopped() {
                break LoopEnd::Stopped;
            }

            match self.step() {
                Ok(Some(slot)) => {
                    if self.stats.frames_published % 100 == 0 {
                        debug!(
                            "Published {} frames (latest into slot {})",
                            self.stats.frames_published, slot
                        );
                    }
                }
                Ok(None) => break LoopEnd::Stopped,
                Err(e) => {
                    error!("Capture loop failed: {}", e);
                    break LoopEnd::Failed(e.to_string());
                }
            }
        };

        if let Err(e) = self.camera.close() {
            warn!("Failed to close camera: {}", e);
        }

        let report = LoopReport {
            role: LoopRole::Capture,
            ended_by,
            elapsed: started.elapsed(),
            frames: self.stats.frames_published,
            secondary: self.stats.not_ready_retries,
        };

        info!(
            "Capture loop finished ({}): {} frames published, {} not-ready retries",
            report.ended_by, report.frames, report.secondary
        );

        report
    }
}
