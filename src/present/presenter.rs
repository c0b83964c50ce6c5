use super::input::{InputEvent, InputSource};
use super::sink::FrameSink;
use crate::config::PresentConfig;
use crate::error::Result;
use crate::exchange::PresentPort;
use crate::frame::{Frame, FrameGeometry, Image};
use crate::lifecycle::{LoopEnd, LoopReport, LoopRole};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// What one presenter iteration did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentStep {
    /// The display contents were claimed and handed to the sink for storage
    pub persisted: bool,
    /// Frame counter value of this iteration
    pub sequence: u64,
}

/// Consumer loop: shows the display slot and persists each relayed frame once
pub struct PresentLoop {
    port: PresentPort,
    geometry: FrameGeometry,
    sink: Box<dyn FrameSink>,
    input: Box<dyn InputSource>,
    idle_interval: Duration,
    held: Frame,
    frame_counter: u64,
    persisted: u64,
}

impl PresentLoop {
    pub fn new(
        port: PresentPort,
        sink: Box<dyn FrameSink>,
        input: Box<dyn InputSource>,
        config: &PresentConfig,
    ) -> Self {
        let geometry = port.geometry();
        Self {
            port,
            geometry,
            sink,
            input,
            idle_interval: config.idle_interval(),
            held: Frame::zeroed(geometry.samples()),
            frame_counter: 0,
            persisted: 0,
        }
    }

    /// Claim, render, maybe persist. Sleeps `idle_interval` when there was
    /// nothing new to claim.
    pub fn step(&mut self) -> Result<PresentStep> {
        let persisted = self.port.claim(&mut self.held)?;
        if !persisted {
            thread::sleep(self.idle_interval);
        }

        let image = Image::reshape(&self.held, self.geometry)?;
        self.sink.render(&image)?;

        let sequence = self.frame_counter;
        if persisted {
            let path = self.sink.persist(&image, sequence)?;
            self.persisted += 1;
            debug!("Persisted frame {} as {}", sequence, path.display());
        }
        self.frame_counter += 1;

        Ok(PresentStep {
            persisted,
            sequence,
        })
    }

    /// Run until a quit event or an error. In process mode the supervisor
    /// ends this loop once capture and relay are done.
    pub fn run(mut self) -> LoopReport {
        info!("Present loop started: frame shape {}", self.geometry);

        let started = Instant::now();
        let ended_by = loop {
            if let Err(e) = self.step() {
                error!("Present loop failed: {}", e);
                break LoopEnd::Failed(e.to_string());
            }

            match self.input.poll_event() {
                Ok(Some(InputEvent::Quit)) => {
                    info!("Quit requested");
                    break LoopEnd::Quit;
                }
                Ok(Some(InputEvent::Stop)) => break LoopEnd::Stopped,
                Ok(Some(InputEvent::Key(key))) => debug!("Key '{}' ignored", key),
                Ok(None) => {}
                Err(e) => warn!("Input polling failed: {}", e),
            }
        };

        let report = LoopReport {
            role: LoopRole::Present,
            ended_by,
            elapsed: started.elapsed(),
            frames: self.frame_counter,
            secondary: self.persisted,
        };

        info!(
            "Present loop finished ({}): {} frames rendered, {} persisted",
            report.ended_by, report.frames, report.secondary
        );

        report
    }
}
