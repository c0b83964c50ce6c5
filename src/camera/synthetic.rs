use super::interface::{CameraControl, CaptureOutcome, FrameSource};
use super::parameters::{apply_to_state, Parameter, ParameterState, ParameterValue};
use crate::error::CameraError;
use crate::frame::{Frame, FrameGeometry};
use std::collections::BTreeMap;
use tracing::{debug, info, trace};

/// Settings for the test-pattern camera
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticCameraConfig {
    pub width: u32,
    pub height: u32,
    /// Report "not ready" on every n-th attempt (0 = always ready)
    pub not_ready_every: u32,
}

impl Default for SyntheticCameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            not_ready_every: 0,
        }
    }
}

/// Camera producing a solid colour that changes with every frame
pub struct SyntheticCamera {
    config: SyntheticCameraConfig,
    parameters: BTreeMap<Parameter, ParameterState>,
    frames_captured: u64,
    attempts: u64,
    open: bool,
}

impl SyntheticCamera {
    pub fn open(config: SyntheticCameraConfig) -> Result<Self, CameraError> {
        if config.width == 0 || config.height == 0 {
            return Err(CameraError::Device {
                details: format!(
                    "synthetic camera cannot open at {}x{}",
                    config.width, config.height
                ),
            });
        }

        info!(
            "Opened synthetic camera ({}x{}, not ready every {} attempts)",
            config.width, config.height, config.not_ready_every
        );

        let width = config.width as f64;
        let height = config.height as f64;
        let mut parameters = BTreeMap::new();
        parameters.insert(Parameter::Width, ParameterState::manual(width, width, width));
        parameters.insert(Parameter::Height, ParameterState::manual(height, height, height));
        parameters.insert(Parameter::Focus, ParameterState::manual(0.0, 1000.0, 100.0));
        parameters.insert(
            Parameter::Shutter,
            ParameterState {
                min: 1.0,
                max: 1000.0,
                now: 33.0,
                is_auto: true,
            },
        );
        parameters.insert(Parameter::Gain, ParameterState::manual(0.0, 100.0, 0.0));
        parameters.insert(
            Parameter::WhiteBalanceRed,
            ParameterState::manual(0.0, 255.0, 128.0),
        );
        parameters.insert(
            Parameter::WhiteBalanceBlue,
            ParameterState::manual(0.0, 255.0, 128.0),
        );

        Ok(Self {
            config,
            parameters,
            frames_captured: 0,
            attempts: 0,
            open: true,
        })
    }

    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry::rgb(self.config.height as usize, self.config.width as usize)
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured
    }

    /// Pixel pattern for frame `index`: red ramps up, blue ramps down
    pub fn pattern(geometry: FrameGeometry, index: u64) -> Frame {
        let ramp = (index % 256) as f32;
        let pixel = [ramp, 128.0, 255.0 - ramp];
        let mut frame = Frame::zeroed(geometry.samples());

        for chunk in frame.as_mut_slice().chunks_mut(geometry.channels) {
            for (c, sample) in chunk.iter_mut().enumerate() {
                *sample = pixel.get(c).copied().unwrap_or(255.0);
            }
        }
        frame
    }
}

impl FrameSource for SyntheticCamera {
    fn capture_frame(&mut self) -> Result<CaptureOutcome, CameraError> {
        if !self.open {
            return Err(CameraError::Closed);
        }

        self.attempts += 1;
        let every = self.config.not_ready_every as u64;
        if every > 0 && self.attempts % every == 0 {
            trace!("Synthetic camera not ready (attempt {})", self.attempts);
            return Ok(CaptureOutcome::NotReady);
        }

        let frame = Self::pattern(self.geometry(), self.frames_captured);
        self.frames_captured += 1;
        Ok(CaptureOutcome::Frame(frame))
    }

    fn close(&mut self) -> Result<(), CameraError> {
        if self.open {
            debug!(
                "Closing synthetic camera after {} frames",
                self.frames_captured
            );
            self.open = false;
        }
        Ok(())
    }
}

impl CameraControl for SyntheticCamera {
    fn get_parameter(&self, parameter: Parameter) -> Result<ParameterState, CameraError> {
        self.parameters
            .get(&parameter)
            .copied()
            .ok_or(CameraError::UnsupportedParameter { parameter })
    }

    fn set_parameter(
        &mut self,
        parameter: Parameter,
        value: ParameterValue,
    ) -> Result<ParameterState, CameraError> {
        if matches!(parameter, Parameter::Width | Parameter::Height) {
            // Frame size is fixed once the exchange has been sized from it
            return Err(CameraError::ReadOnly { parameter });
        }

        let state = self
            .parameters
            .get_mut(&parameter)
            .ok_or(CameraError::UnsupportedParameter { parameter })?;
        apply_to_state(parameter, state, value)
    }
}
