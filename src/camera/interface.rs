use super::parameters::{Parameter, ParameterState, ParameterValue};
use crate::error::CameraError;
use crate::frame::{Frame, FrameGeometry};
use tracing::info;

/// Result of one capture attempt
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    Frame(Frame),
    /// The device has no frame yet; try again shortly
    NotReady,
}

/// The only camera capability the capture loop depends on
pub trait FrameSource: Send {
    /// Try to take one frame of the discovered geometry
    fn capture_frame(&mut self) -> Result<CaptureOutcome, CameraError>;

    /// Release the device. Capturing after close fails.
    fn close(&mut self) -> Result<(), CameraError> {
        Ok(())
    }
}

/// Named parameter access, one get/set pair per [`Parameter`]
pub trait CameraControl {
    fn get_parameter(&self, parameter: Parameter) -> Result<ParameterState, CameraError>;

    /// Apply `value` and return the state read back from the device
    fn set_parameter(
        &mut self,
        parameter: Parameter,
        value: ParameterValue,
    ) -> Result<ParameterState, CameraError>;
}

/// Query the frame geometry once, before any loop starts
pub fn discover_geometry(camera: &dyn CameraControl) -> Result<FrameGeometry, CameraError> {
    let width = camera.get_parameter(Parameter::Width)?.now;
    let height = camera.get_parameter(Parameter::Height)?.now;

    if width < 1.0 || height < 1.0 {
        return Err(CameraError::Device {
            details: format!("camera reported an empty frame size {}x{}", width, height),
        });
    }

    let geometry = FrameGeometry::rgb(height as usize, width as usize);
    info!("Discovered camera frame shape: {}", geometry);
    Ok(geometry)
}
