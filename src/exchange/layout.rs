use super::cells::{FlagCell, IndexCell};
use super::ports::ExchangePorts;
use super::UpdateFlag;
use crate::error::{ExchangeError, GeometryError};
use crate::frame::{Frame, FrameGeometry};
use crate::shm::{ProcessMutex, ProcessMutexGuard, SharedRegion};
use std::mem;
use std::ptr;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use tracing::{debug, info};

/// Number of pool slots allocated for the capture loop
pub const POOL_SLOTS: usize = 3;

/// Modulus of the ring index. One pool slot stays outside the rotation.
pub const ROTATION: usize = POOL_SLOTS - 1;

const SLOT_ALIGN: usize = 64;

#[repr(C)]
struct Header {
    lock_a: libc::pthread_mutex_t,
    lock_b: libc::pthread_mutex_t,
    ring_index: AtomicU32,
    update_flag: AtomicU32,
}

/// Slot stride and total mapping size, `None` on overflow
fn layout_sizes(data_offset: usize, frame_bytes: usize) -> Option<(usize, usize)> {
    let slot_stride = frame_bytes.checked_next_multiple_of(SLOT_ALIGN)?;
    let total = slot_stride
        .checked_mul(POOL_SLOTS + 1)?
        .checked_add(data_offset)?;
    Some((slot_stride, total))
}

/// Shared pool, display slot, cells and the two locks for one run
pub struct FrameExchange {
    region: SharedRegion,
    geometry: FrameGeometry,
    data_offset: usize,
    slot_stride: usize,
    lock_a: ProcessMutex,
    lock_b: ProcessMutex,
}

impl FrameExchange {
    /// Allocate every shared entity for frames of `geometry`.
    ///
    /// Must run before any loop is forked; the mapping is inherited by children.
    pub fn allocate(geometry: FrameGeometry) -> Result<Arc<Self>, ExchangeError> {
        geometry.validate()?;

        let data_offset = mem::size_of::<Header>().next_multiple_of(SLOT_ALIGN);
        let (slot_stride, total) = geometry
            .checked_bytes()
            .and_then(|frame_bytes| layout_sizes(data_offset, frame_bytes))
            .ok_or(GeometryError::TooLarge {
                height: geometry.height,
                width: geometry.width,
                channels: geometry.channels,
            })?;

        let region = SharedRegion::anonymous(total)?;
        let header = region.at(0) as *mut Header;

        let (lock_a, lock_b) = unsafe {
            let lock_a = ProcessMutex::init(ptr::addr_of_mut!((*header).lock_a), "lock A")?;
            let lock_b = ProcessMutex::init(ptr::addr_of_mut!((*header).lock_b), "lock B")?;
            (lock_a, lock_b)
        };

        let exchange = Self {
            region,
            geometry,
            data_offset,
            slot_stride,
            lock_a,
            lock_b,
        };

        // First publish lands in slot 0
        IndexCell(exchange.ring_index_cell()).set(ROTATION - 1);
        FlagCell(exchange.update_flag_cell()).set(UpdateFlag::Unclaimed);

        info!(
            "Allocated frame exchange: {} pool slots + display of {} ({} bytes each, {} bytes total)",
            POOL_SLOTS, geometry, slot_stride, total
        );

        Ok(Arc::new(exchange))
    }

    /// Split into the per-role handle bundles
    pub fn ports(self: &Arc<Self>) -> ExchangePorts {
        ExchangePorts::new(Arc::clone(self))
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    /// Current ring index, read under lock A
    pub fn ring_index(&self) -> Result<usize, ExchangeError> {
        Ok(self.lock_pool()?.ring_index())
    }

    /// Current update flag, read under lock B
    pub fn update_flag(&self) -> Result<UpdateFlag, ExchangeError> {
        Ok(self.lock_display()?.update_flag())
    }

    /// Force the update flag, under lock B
    pub fn set_update_flag(&self, flag: UpdateFlag) -> Result<(), ExchangeError> {
        self.lock_display()?.set_update_flag(flag);
        Ok(())
    }

    /// Copy of pool slot `slot`, taken under lock A
    pub fn read_pool_slot(&self, slot: usize) -> Result<Frame, ExchangeError> {
        let pool = self.lock_pool()?;
        Ok(Frame::from_samples(pool.slot(slot).to_vec()))
    }

    /// Copy of the display slot, taken under lock B
    pub fn read_display(&self) -> Result<Frame, ExchangeError> {
        let display = self.lock_display()?;
        Ok(Frame::from_samples(display.frame().to_vec()))
    }

    pub(crate) fn lock_pool(&self) -> Result<PoolGuard<'_>, ExchangeError> {
        let lock = self.lock_a.lock()?;
        Ok(PoolGuard {
            exchange: self,
            _lock: lock,
        })
    }

    pub(crate) fn lock_display(&self) -> Result<DisplayGuard<'_>, ExchangeError> {
        let lock = self.lock_b.lock()?;
        Ok(DisplayGuard {
            exchange: self,
            _lock: lock,
        })
    }

    fn header(&self) -> *mut Header {
        self.region.at(0) as *mut Header
    }

    fn ring_index_cell(&self) -> &AtomicU32 {
        unsafe { &*ptr::addr_of!((*self.header()).ring_index) }
    }

    fn update_flag_cell(&self) -> &AtomicU32 {
        unsafe { &*ptr::addr_of!((*self.header()).update_flag) }
    }

    /// Start of slot `slot`; the display slot sits after the pool
    fn slot_ptr(&self, slot: usize) -> *mut f32 {
        assert!(slot <= POOL_SLOTS, "slot {} out of range", slot);
        self.region.at(self.data_offset + slot * self.slot_stride) as *mut f32
    }

    /// # Safety
    /// Caller holds the lock guarding `slot`.
    unsafe fn slot_slice(&self, slot: usize) -> &[f32] {
        std::slice::from_raw_parts(self.slot_ptr(slot), self.geometry.samples())
    }

    /// # Safety
    /// Caller holds the lock guarding `slot` and no other borrow of it is live.
    #[allow(clippy::mut_from_ref)]
    unsafe fn slot_slice_mut(&self, slot: usize) -> &mut [f32] {
        std::slice::from_raw_parts_mut(self.slot_ptr(slot), self.geometry.samples())
    }
}

/// Lock A held: access to the pool slots and the ring index
pub(crate) struct PoolGuard<'a> {
    exchange: &'a FrameExchange,
    _lock: ProcessMutexGuard<'a>,
}

impl PoolGuard<'_> {
    pub(crate) fn ring_index(&self) -> usize {
        IndexCell(self.exchange.ring_index_cell()).get()
    }

    /// Slot the next publish writes into
    pub(crate) fn next_index(&self) -> usize {
        (self.ring_index() + 1) % ROTATION
    }

    pub(crate) fn set_ring_index(&mut self, index: usize) {
        debug_assert!(index < ROTATION, "ring index {} outside rotation", index);
        IndexCell(self.exchange.ring_index_cell()).set(index);
    }

    pub(crate) fn slot(&self, slot: usize) -> &[f32] {
        assert!(slot < POOL_SLOTS, "pool slot {} out of range", slot);
        unsafe { self.exchange.slot_slice(slot) }
    }

    pub(crate) fn slot_mut(&mut self, slot: usize) -> &mut [f32] {
        assert!(slot < POOL_SLOTS, "pool slot {} out of range", slot);
        unsafe { self.exchange.slot_slice_mut(slot) }
    }
}

/// Lock B held: access to the display slot and the update flag
pub(crate) struct DisplayGuard<'a> {
    exchange: &'a FrameExchange,
    _lock: ProcessMutexGuard<'a>,
}

impl DisplayGuard<'_> {
    pub(crate) fn frame(&self) -> &[f32] {
        unsafe { self.exchange.slot_slice(POOL_SLOTS) }
    }

    pub(crate) fn frame_mut(&mut self) -> &mut [f32] {
        unsafe { self.exchange.slot_slice_mut(POOL_SLOTS) }
    }

    pub(crate) fn update_flag(&self) -> UpdateFlag {
        FlagCell(self.exchange.update_flag_cell()).get()
    }

    pub(crate) fn set_update_flag(&mut self, flag: UpdateFlag) {
        debug!("Update flag -> {:?}", flag);
        FlagCell(self.exchange.update_flag_cell()).set(flag);
    }
}
