use crate::error::ExchangeError;
use std::ptr::{self, NonNull};
use tracing::{debug, warn};

/// Anonymous shared mapping, zero filled, never resized
pub struct SharedRegion {
    ptr: NonNull<u8>,
    len: usize,
}

// The mapping is plain memory; synchronisation is the caller's job.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Map `len` bytes shared with any child forked after this call
    pub fn anonymous(len: usize) -> Result<Self, ExchangeError> {
        if len == 0 {
            return Err(ExchangeError::Map {
                bytes: len,
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty mapping"),
            });
        }

        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if addr == libc::MAP_FAILED {
            return Err(ExchangeError::Map {
                bytes: len,
                source: std::io::Error::last_os_error(),
            });
        }

        let ptr = NonNull::new(addr as *mut u8).ok_or_else(|| ExchangeError::Map {
            bytes: len,
            source: std::io::Error::new(std::io::ErrorKind::Other, "mmap returned null"),
        })?;

        debug!("Mapped {} bytes of shared memory at {:p}", len, ptr);
        Ok(Self { ptr, len })
    }

    /// Pointer to byte `offset` of the mapping.
    ///
    /// # Panics
    /// If `offset` is past the end of the mapping.
    pub fn at(&self, offset: usize) -> *mut u8 {
        assert!(offset <= self.len, "offset {} past mapping of {}", offset, self.len);
        unsafe { self.ptr.as_ptr().add(offset) }
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        let rc = unsafe { libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len) };
        if rc != 0 {
            warn!(
                "Failed to unmap shared region: {}",
                std::io::Error::last_os_error()
            );
        }
    }
}
