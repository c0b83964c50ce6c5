pub mod app;
pub mod camera;
pub mod capture;
pub mod config;
pub mod error;
pub mod exchange;
pub mod frame;
pub mod lifecycle;
pub mod present;
pub mod relay;
pub mod shm;

pub use app::Supervisor;
pub use camera::{CameraControl, FrameSource, SyntheticCamera};
pub use capture::CaptureLoop;
pub use config::{CamrelayConfig, RunMode};
pub use error::{CamrelayError, Result};
pub use exchange::{ExchangePorts, FrameExchange, RelayOutcome, UpdateFlag};
pub use frame::{Frame, FrameGeometry, Image};
pub use lifecycle::{LoopEnd, LoopReport, LoopRole, StopSignal};
pub use present::{FrameSink, ImageDirectorySink, InputSource, PresentLoop};
pub use relay::RelayLoop;
