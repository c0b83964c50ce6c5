use super::{FrameExchange, UpdateFlag};
use crate::error::ExchangeError;
use crate::frame::{Frame, FrameGeometry};
use std::sync::Arc;
use tracing::trace;

/// Handle bundle for each loop: every role sees only the cells and locks it uses
#[derive(Clone)]
pub struct ExchangePorts {
    pub capture: CapturePort,
    pub relay: RelayPort,
    pub present: PresentPort,
}

impl ExchangePorts {
    pub(crate) fn new(exchange: Arc<FrameExchange>) -> Self {
        Self {
            capture: CapturePort {
                exchange: Arc::clone(&exchange),
            },
            relay: RelayPort {
                exchange: Arc::clone(&exchange),
            },
            present: PresentPort { exchange },
        }
    }
}

/// Producer side: pool slots, ring index, lock A
#[derive(Clone)]
pub struct CapturePort {
    exchange: Arc<FrameExchange>,
}

impl CapturePort {
    pub fn geometry(&self) -> FrameGeometry {
        self.exchange.geometry()
    }

    /// Copy `frame` into the next rotation slot and make it the newest.
    /// Returns the slot written.
    pub fn publish(&self, frame: &Frame) -> Result<usize, ExchangeError> {
        let expected = self.exchange.geometry().samples();
        if frame.len() != expected {
            return Err(ExchangeError::SlotSize {
                expected,
                actual: frame.len(),
            });
        }

        self.publish_with(|slot| slot.copy_from_slice(frame.as_slice()))
    }

    /// Fill the next rotation slot with `write` while lock A is held, then
    /// advance the ring index inside the same critical section
    pub fn publish_with<F>(&self, write: F) -> Result<usize, ExchangeError>
    where
        F: FnOnce(&mut [f32]),
    {
        let mut pool = self.exchange.lock_pool()?;
        let next = pool.next_index();
        write(pool.slot_mut(next));
        pool.set_ring_index(next);
        trace!("Published frame into slot {}", next);
        Ok(next)
    }
}

/// What one relay step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Pool slot `slot` was copied into the display slot
    Relayed { slot: usize },
    /// The presenter has not asked for a refresh
    NotRequested,
}

/// Relay side: everything, locked B then A
#[derive(Clone)]
pub struct RelayPort {
    exchange: Arc<FrameExchange>,
}

impl RelayPort {
    pub fn geometry(&self) -> FrameGeometry {
        self.exchange.geometry()
    }

    /// If the presenter requested a refresh, copy the newest pool frame into
    /// the display slot and clear the request.
    ///
    /// Lock B is held for the whole step; lock A only around the pool read,
    /// which goes through `scratch` so the producer is not stalled by the
    /// display write.
    pub fn relay_if_requested(&self, scratch: &mut Frame) -> Result<RelayOutcome, ExchangeError> {
        let mut display = self.exchange.lock_display()?;
        if display.update_flag() != UpdateFlag::Requested {
            return Ok(RelayOutcome::NotRequested);
        }

        let slot = {
            let pool = self.exchange.lock_pool()?;
            let slot = pool.ring_index();
            scratch.copy_from(pool.slot(slot));
            slot
        };

        display.frame_mut().copy_from_slice(scratch.as_slice());
        display.set_update_flag(UpdateFlag::Unclaimed);
        trace!("Relayed pool slot {} to display", slot);

        Ok(RelayOutcome::Relayed { slot })
    }
}

/// Presenter side: display slot, update flag, lock B
#[derive(Clone)]
pub struct PresentPort {
    exchange: Arc<FrameExchange>,
}

impl PresentPort {
    pub fn geometry(&self) -> FrameGeometry {
        self.exchange.geometry()
    }

    /// Copy the display slot into `into`. If its contents were unclaimed, claim
    /// them (flag -> requested) and return `true`: the caller should persist.
    pub fn claim(&self, into: &mut Frame) -> Result<bool, ExchangeError> {
        let mut display = self.exchange.lock_display()?;
        into.copy_from(display.frame());

        let should_persist = display.update_flag() == UpdateFlag::Unclaimed;
        if should_persist {
            display.set_update_flag(UpdateFlag::Requested);
        }

        Ok(should_persist)
    }
}
