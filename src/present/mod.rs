//! Presenter loop and its collaborators: the frame sink and the input sources.

mod input;
mod presenter;
mod sink;

pub use input::{InputChain, InputEvent, InputSource, KeyboardInput, StopInput};
pub use presenter::{PresentLoop, PresentStep};
pub use sink::{FrameSink, ImageDirectorySink};
