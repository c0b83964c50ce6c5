use std::sync::atomic::{AtomicU32, Ordering};
use tracing::warn;

/// Handshake between relay and presenter, stored as 0/1 in shared memory.
///
/// `Unclaimed` (0): the display slot holds contents the presenter has not
/// claimed yet. `Requested` (1): the presenter claimed them and the relay
/// should refresh the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateFlag {
    Unclaimed = 0,
    Requested = 1,
}

impl UpdateFlag {
    pub fn raw(self) -> u32 {
        self as u32
    }

    fn from_raw(raw: u32) -> Self {
        match raw {
            0 => UpdateFlag::Unclaimed,
            1 => UpdateFlag::Requested,
            other => {
                // Only this module writes the cell; any other value means corruption
                warn!("Update flag holds unexpected value {}, treating as requested", other);
                UpdateFlag::Requested
            }
        }
    }
}

/// Typed view of a shared `u32`. Only reachable through a held lock guard.
pub(crate) struct FlagCell<'a>(pub(crate) &'a AtomicU32);

impl FlagCell<'_> {
    pub(crate) fn get(&self) -> UpdateFlag {
        UpdateFlag::from_raw(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, flag: UpdateFlag) {
        self.0.store(flag.raw(), Ordering::Release);
    }
}

/// Slot number of the newest complete pool frame, in `0..ROTATION`
pub(crate) struct IndexCell<'a>(pub(crate) &'a AtomicU32);

impl IndexCell<'_> {
    pub(crate) fn get(&self) -> usize {
        self.0.load(Ordering::Acquire) as usize
    }

    pub(crate) fn set(&self, index: usize) {
        self.0.store(index as u32, Ordering::Release);
    }
}
