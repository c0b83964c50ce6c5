//! Latest-frame handoff between the capture, relay and present loops.
//!
//! The exchange lives in one shared mapping:
//!
//! ```text
//! | header: lock A | lock B | ring index | update flag | pool 0 | pool 1 | pool 2 | display |
//! ```
//!
//! Lock A guards the pool and the ring index, lock B guards the display slot
//! and the update flag. Nothing outside this module touches the mapping; each
//! loop receives only the port for its own role.

mod cells;
mod layout;
mod ports;

#[cfg(test)]
mod tests;

pub use cells::UpdateFlag;
pub use layout::{FrameExchange, POOL_SLOTS, ROTATION};
pub use ports::{CapturePort, ExchangePorts, PresentPort, RelayOutcome, RelayPort};
