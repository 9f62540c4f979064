//! Process-shared mutex and condition variable living inside the segment.
//!
//! The standard library's `Mutex`/`Condvar` cannot be placed in shared
//! memory, so this module drives the pthread primitives directly, the
//! same raw-libc escape hatch used elsewhere for platform calls that have
//! no safe wrapper. The mutex is robust: if a lock holder dies, the next
//! locker recovers the mutex instead of deadlocking every process
//! attached to the car.

use crate::error::ShmError;
use std::time::Duration;

/// The synchronization header at the start of every car segment.
///
/// Must be the first field of the shared record and must only ever be
/// initialized once, by the creating process, before the magic word is
/// published.
#[repr(C)]
pub(crate) struct SyncBlock {
    mutex: libc::pthread_mutex_t,
    cond: libc::pthread_cond_t,
}

/// Convert a nonzero pthread return code into a `LockInit` error.
fn init_err(rc: libc::c_int) -> ShmError {
    ShmError::LockInit(std::io::Error::from_raw_os_error(rc))
}

impl SyncBlock {
    /// Initialize the mutex and condition variable in place.
    ///
    /// # Safety
    /// `block` must point into a writable `MAP_SHARED` mapping large
    /// enough for a `SyncBlock`, and no other process may be using the
    /// block yet.
    pub(crate) unsafe fn init(block: *mut SyncBlock) -> Result<(), ShmError> {
        unsafe {
            let mut mattr: libc::pthread_mutexattr_t = std::mem::zeroed();
            let rc = libc::pthread_mutexattr_init(&mut mattr);
            if rc != 0 {
                return Err(init_err(rc));
            }
            let rc = libc::pthread_mutexattr_setpshared(&mut mattr, libc::PTHREAD_PROCESS_SHARED);
            if rc != 0 {
                libc::pthread_mutexattr_destroy(&mut mattr);
                return Err(init_err(rc));
            }
            let rc = libc::pthread_mutexattr_setrobust(&mut mattr, libc::PTHREAD_MUTEX_ROBUST);
            if rc != 0 {
                libc::pthread_mutexattr_destroy(&mut mattr);
                return Err(init_err(rc));
            }
            let rc = libc::pthread_mutex_init(&raw mut (*block).mutex, &mattr);
            libc::pthread_mutexattr_destroy(&mut mattr);
            if rc != 0 {
                return Err(init_err(rc));
            }

            let mut cattr: libc::pthread_condattr_t = std::mem::zeroed();
            let rc = libc::pthread_condattr_init(&mut cattr);
            if rc != 0 {
                return Err(init_err(rc));
            }
            let rc = libc::pthread_condattr_setpshared(&mut cattr, libc::PTHREAD_PROCESS_SHARED);
            if rc != 0 {
                libc::pthread_condattr_destroy(&mut cattr);
                return Err(init_err(rc));
            }
            // Timed waits measure against the monotonic clock so a wall
            // clock step cannot stretch or collapse a timeout.
            let rc = libc::pthread_condattr_setclock(&mut cattr, libc::CLOCK_MONOTONIC);
            if rc != 0 {
                libc::pthread_condattr_destroy(&mut cattr);
                return Err(init_err(rc));
            }
            let rc = libc::pthread_cond_init(&raw mut (*block).cond, &cattr);
            libc::pthread_condattr_destroy(&mut cattr);
            if rc != 0 {
                return Err(init_err(rc));
            }
        }
        Ok(())
    }

    /// Acquire the mutex, recovering it if the previous holder died.
    ///
    /// # Safety
    /// `block` must point at an initialized `SyncBlock` in a live mapping.
    pub(crate) unsafe fn lock(block: *mut SyncBlock) {
        unsafe {
            let mutex = &raw mut (*block).mutex;
            match libc::pthread_mutex_lock(mutex) {
                0 => {}
                libc::EOWNERDEAD => {
                    // A lock holder crashed; the record is a handful of
                    // scalar flags, so mark the mutex usable and carry on.
                    libc::pthread_mutex_consistent(mutex);
                }
                rc => panic!("pthread_mutex_lock on a validated segment failed: {rc}"),
            }
        }
    }

    /// Release the mutex.
    ///
    /// # Safety
    /// The calling thread must hold the mutex.
    pub(crate) unsafe fn unlock(block: *mut SyncBlock) {
        unsafe {
            libc::pthread_mutex_unlock(&raw mut (*block).mutex);
        }
    }

    /// Wake every waiter in every attached process.
    ///
    /// # Safety
    /// `block` must point at an initialized `SyncBlock` in a live mapping.
    pub(crate) unsafe fn broadcast(block: *mut SyncBlock) {
        unsafe {
            libc::pthread_cond_broadcast(&raw mut (*block).cond);
        }
    }

    /// Release the mutex, wait for a broadcast or the timeout, and
    /// re-acquire. Returns `true` when woken by a broadcast.
    ///
    /// # Safety
    /// The calling thread must hold the mutex.
    pub(crate) unsafe fn wait_timeout(block: *mut SyncBlock, timeout: Duration) -> bool {
        unsafe {
            let mut now = libc::timespec {
                tv_sec: 0,
                tv_nsec: 0,
            };
            libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut now);

            let nanos = now.tv_nsec as i64 + timeout.subsec_nanos() as i64;
            let deadline = libc::timespec {
                tv_sec: now.tv_sec
                    + timeout.as_secs() as libc::time_t
                    + (nanos / 1_000_000_000) as libc::time_t,
                tv_nsec: nanos % 1_000_000_000,
            };

            let mutex = &raw mut (*block).mutex;
            match libc::pthread_cond_timedwait(&raw mut (*block).cond, mutex, &deadline) {
                0 => true,
                libc::ETIMEDOUT => false,
                libc::EOWNERDEAD => {
                    libc::pthread_mutex_consistent(mutex);
                    true
                }
                rc => panic!("pthread_cond_timedwait on a validated segment failed: {rc}"),
            }
        }
    }
}
