//! Process-shared memory primitives.
//!
//! A [`SharedRegion`] is an anonymous `MAP_SHARED` mapping: it is inherited by
//! forked children at the same address, so every pointer into it stays valid in
//! the whole process group. [`ProcessMutex`] is a pthread mutex living inside
//! such a region, acquired through a guard that unlocks on drop.

mod mutex;
mod region;

pub use mutex::{ProcessMutex, ProcessMutexGuard};
pub use region::SharedRegion;
