//! Producer loop: keeps the newest camera frame in the shared pool.

mod core;

pub use self::core::{CaptureLoop, CaptureStats};
