mod interface;
mod parameters;
mod synthetic;

pub use interface::{discover_geometry, CaptureOutcome, CameraControl, FrameSource};
pub use parameters::{
    apply_parameter_overrides, Parameter, ParameterSetting, ParameterState, ParameterValue,
};
pub use synthetic::{SyntheticCamera, SyntheticCameraConfig};
