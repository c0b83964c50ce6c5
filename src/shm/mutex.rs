use crate::error::ExchangeError;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use tracing::{trace, warn};

/// A pthread mutex placed in shared memory with `PTHREAD_PROCESS_SHARED`.
///
/// On Linux the mutex is also robust: if a process dies while holding it, the
/// next locker takes it over instead of deadlocking the rest of the group.
pub struct ProcessMutex {
    raw: *mut libc::pthread_mutex_t,
    name: &'static str,
}

unsafe impl Send for ProcessMutex {}
unsafe impl Sync for ProcessMutex {}

impl ProcessMutex {
    /// Initialise a mutex in place.
    ///
    /// # Safety
    /// `raw` must point to suitably aligned memory that outlives the returned
    /// value and is not yet used as a mutex by any process.
    pub unsafe fn init(
        raw: *mut libc::pthread_mutex_t,
        name: &'static str,
    ) -> Result<Self, ExchangeError> {
        let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
        check_init(name, libc::pthread_mutexattr_init(attr.as_mut_ptr()))?;

        let result = init_with_attr(raw, attr.as_mut_ptr(), name);
        libc::pthread_mutexattr_destroy(attr.as_mut_ptr());
        result?;

        Ok(Self { raw, name })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Block until the mutex is held; the guard releases it on every exit path
    pub fn lock(&self) -> Result<ProcessMutexGuard<'_>, ExchangeError> {
        let rc = unsafe { libc::pthread_mutex_lock(self.raw) };
        match rc {
            0 => {}
            #[cfg(target_os = "linux")]
            libc::EOWNERDEAD => {
                warn!("{} was held by a process that died; recovering", self.name);
                let rc = unsafe { libc::pthread_mutex_consistent(self.raw) };
                if rc != 0 {
                    unsafe { libc::pthread_mutex_unlock(self.raw) };
                    return Err(ExchangeError::Unrecoverable {
                        lock: self.name,
                        errno: rc,
                    });
                }
            }
            errno => {
                return Err(ExchangeError::Lock {
                    lock: self.name,
                    errno,
                })
            }
        }

        trace!("{} acquired", self.name);
        Ok(ProcessMutexGuard {
            mutex: self,
            _not_send: PhantomData,
        })
    }
}

unsafe fn init_with_attr(
    raw: *mut libc::pthread_mutex_t,
    attr: *mut libc::pthread_mutexattr_t,
    name: &'static str,
) -> Result<(), ExchangeError> {
    check_init(
        name,
        libc::pthread_mutexattr_setpshared(attr, libc::PTHREAD_PROCESS_SHARED),
    )?;
    #[cfg(target_os = "linux")]
    check_init(
        name,
        libc::pthread_mutexattr_setrobust(attr, libc::PTHREAD_MUTEX_ROBUST),
    )?;
    check_init(name, libc::pthread_mutex_init(raw, attr))
}

fn check_init(lock: &'static str, rc: libc::c_int) -> Result<(), ExchangeError> {
    if rc == 0 {
        Ok(())
    } else {
        Err(ExchangeError::LockInit { lock, errno: rc })
    }
}

/// Held lock. Must be dropped on the thread that acquired it.
pub struct ProcessMutexGuard<'a> {
    mutex: &'a ProcessMutex,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ProcessMutexGuard<'_> {
    fn drop(&mut self) {
        let rc = unsafe { libc::pthread_mutex_unlock(self.mutex.raw) };
        if rc != 0 {
            warn!("Failed to release {}: errno {}", self.mutex.name, rc);
        } else {
            trace!("{} released", self.mutex.name);
        }
    }
}
