use crate::config::RelayConfig;
use crate::error::ExchangeError;
use crate::exchange::{RelayOutcome, RelayPort};
use crate::frame::Frame;
use crate::lifecycle::{LoopEnd, LoopReport, LoopRole, StopSignal};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Copies the newest pool frame into the display slot, at most once per
/// presenter request and no more often than `interval`
pub struct RelayLoop {
    port: RelayPort,
    frame_count: u64,
    interval: Duration,
    poll_interval: Duration,
    stop: StopSignal,
    scratch: Frame,
    relayed: u64,
    idle_polls: u64,
}

impl RelayLoop {
    pub fn new(port: RelayPort, config: &RelayConfig) -> Self {
        let samples = port.geometry().samples();
        Self {
            port,
            frame_count: config.frame_count,
            interval: config.interval(),
            poll_interval: config.poll_interval(),
            stop: StopSignal::Never,
            scratch: Frame::zeroed(samples),
            relayed: 0,
            idle_polls: 0,
        }
    }

    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn relayed(&self) -> u64 {
        self.relayed
    }

    /// Check the update flag once; no sleeping
    pub fn step(&mut self) -> Result<RelayOutcome, ExchangeError> {
        let outcome = self.port.relay_if_requested(&mut self.scratch)?;
        match outcome {
            RelayOutcome::Relayed { slot } => {
                self.relayed += 1;
                debug!(
                    "Relayed frame {}/{} from slot {}",
                    self.relayed, self.frame_count, slot
                );
            }
            RelayOutcome::NotRequested => self.idle_polls += 1,
        }
        Ok(outcome)
    }

    /// Run until `frame_count` frames were relayed. Both locks are released
    /// before any sleep, and a stop request cuts a sleep short.
    pub fn run(mut self) -> LoopReport {
        info!(
            "Relay loop started: {} frames, {}ms throttle",
            self.frame_count,
            self.interval.as_millis()
        );

        let started = Instant::now();
        let ended_by = loop {
            if self.relayed >= self.frame_count {
                break LoopEnd::FrameCount;
            }
            if self.stop.is_stopped() {
                break LoopEnd::Stopped;
            }

            // Stop is rechecked at the top of the loop
            match self.step() {
                Ok(RelayOutcome::Relayed { .. }) => {
                    self.stop.sleep(self.interval);
                }
                Ok(RelayOutcome::NotRequested) => {
                    self.stop.sleep(self.poll_interval);
                }
                Err(e) => {
                    error!("Relay loop failed: {}", e);
                    break LoopEnd::Failed(e.to_string());
                }
            }
        };

        let report = LoopReport {
            role: LoopRole::Relay,
            ended_by,
            elapsed: started.elapsed(),
            frames: self.relayed,
            secondary: self.idle_polls,
        };

        info!(
            "Relay loop finished ({}): {} frames relayed in {:.1}s",
            report.ended_by,
            report.frames,
            report.elapsed.as_secs_f64()
        );

        report
    }
}
