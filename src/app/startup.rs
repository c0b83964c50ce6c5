use crate::camera::{apply_parameter_overrides, discover_geometry, SyntheticCamera};
use crate::config::{CamrelayConfig, PresentConfig};
use crate::error::Result;
use crate::exchange::FrameExchange;
use crate::lifecycle::StopSignal;
use crate::present::{ImageDirectorySink, InputChain, KeyboardInput, StopInput};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything created before the loops start
pub struct Prepared {
    pub camera: SyntheticCamera,
    pub exchange: Arc<FrameExchange>,
}

/// Open the camera, apply parameter overrides, read the frame shape and
/// allocate the shared exchange for it
pub fn prepare(config: &CamrelayConfig) -> Result<Prepared> {
    info!("Opening camera");
    let mut camera = SyntheticCamera::open(config.camera.synthetic())?;

    if !config.camera.parameters.is_empty() {
        let applied = apply_parameter_overrides(&mut camera, &config.camera.parameters);
        info!(
            "Applied {}/{} camera parameter overrides",
            applied,
            config.camera.parameters.len()
        );
    }

    let geometry = discover_geometry(&camera)?;
    let exchange = FrameExchange::allocate(geometry)?;

    Ok(Prepared { camera, exchange })
}

pub fn build_sink(config: &PresentConfig) -> Result<ImageDirectorySink> {
    let preview = config.preview_path.as_ref().map(PathBuf::from);
    let sink = ImageDirectorySink::create(config.output_dir(), &config.file_prefix, preview)?;
    Ok(sink)
}

/// Presenter input: the supervisor stop first, then the keyboard when enabled
/// and attached to a terminal
pub fn build_input(config: &PresentConfig, stop: StopSignal) -> InputChain {
    let input = InputChain::new().with(Box::new(StopInput::new(stop)));

    if !config.keyboard {
        return input;
    }
    if !std::io::stdin().is_terminal() {
        info!("Standard input is not a terminal, keyboard quit disabled");
        return input;
    }

    match KeyboardInput::enable(config.input_poll()) {
        Ok(keyboard) => input.with(Box::new(keyboard)),
        Err(e) => {
            warn!("Keyboard input unavailable: {}", e);
            input
        }
    }
}
