//! Segment lifecycle and the scoped lock guard.

use crate::error::ShmError;
use crate::state::{CAR_SHM_MAGIC, CAR_SHM_SIZE, CarData, CarSharedState};
use crate::sync::SyncBlock;
use lift_common::config::CarConfig;
use lift_common::consts::SHM_NAME_PREFIX;
use memmap2::{MmapMut, MmapOptions};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{shm_open, shm_unlink};
use nix::sys::stat::Mode;
use nix::unistd::ftruncate;
use std::fs::File;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{Ordering, fence};
use std::time::Duration;
use tracing::info;

/// Shared-memory name for a car: `/car<name>`.
fn segment_name(car_name: &str) -> String {
    format!("{SHM_NAME_PREFIX}{car_name}")
}

/// A mapped car state segment.
///
/// The car process holds the owning handle (created the segment, unlinks
/// it on drop); control utilities and the car's network thread hold
/// attached handles. Any number of threads may share one handle; all
/// access is funneled through the in-segment mutex.
pub struct CarStateSegment {
    car_name: String,
    shm_name: String,
    ptr: *mut CarSharedState,
    owner: bool,
    /// Keeps the mapping alive; the pointer above points into it.
    _mmap: MmapMut,
}

// The raw pointer targets a MAP_SHARED mapping whose contents are only
// ever touched under the in-segment process-shared mutex.
unsafe impl Send for CarStateSegment {}
unsafe impl Sync for CarStateSegment {}

impl CarStateSegment {
    /// Create and initialize the segment for a car.
    ///
    /// Any stale segment left behind by an unclean shutdown is unlinked
    /// first. The magic word is published last, behind a release fence,
    /// so an attacher never observes a half-initialized record. Failure
    /// here is fatal to the car process.
    pub fn create(config: &CarConfig) -> Result<Self, ShmError> {
        let shm_name = segment_name(&config.name);

        // A previous car process may have died without unlinking.
        let _ = shm_unlink(shm_name.as_str());

        let fd = shm_open(
            shm_name.as_str(),
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Mode::from_bits_truncate(0o600),
        )
        .map_err(|e| match e {
            Errno::EEXIST => ShmError::AlreadyExists {
                name: config.name.clone(),
            },
            other => ShmError::Sys(other),
        })?;

        let cleanup = |err: ShmError| {
            let _ = shm_unlink(shm_name.as_str());
            err
        };

        ftruncate(&fd, CAR_SHM_SIZE as libc::off_t).map_err(|e| cleanup(ShmError::Sys(e)))?;

        let file = File::from(fd);
        let mut mmap = unsafe { MmapOptions::new().map_mut(&file) }
            .map_err(|e| cleanup(ShmError::Io(e)))?;

        let ptr = mmap.as_mut_ptr().cast::<CarSharedState>();
        unsafe {
            SyncBlock::init(&raw mut (*ptr).sync).map_err(&cleanup)?;
            (&raw mut (*ptr).data).write(CarData::new(config.lowest, config.highest));
            // Publish the magic only after the record is fully built.
            fence(Ordering::Release);
            (&raw mut (*ptr).magic).write(CAR_SHM_MAGIC);
        }

        info!(segment = %shm_name, "created shared car state");
        Ok(Self {
            car_name: config.name.clone(),
            shm_name,
            ptr,
            owner: true,
            _mmap: mmap,
        })
    }

    /// Attach to an existing car's segment by car name.
    pub fn attach(car_name: &str) -> Result<Self, ShmError> {
        let shm_name = segment_name(car_name);

        let fd = shm_open(shm_name.as_str(), OFlag::O_RDWR, Mode::empty()).map_err(|e| match e {
            Errno::ENOENT => ShmError::NotFound {
                name: car_name.to_string(),
            },
            other => ShmError::Sys(other),
        })?;

        let file = File::from(fd);
        let len = file.metadata()?.len() as usize;
        if len < std::mem::size_of::<CarSharedState>() {
            return Err(ShmError::InvalidLayout {
                name: car_name.to_string(),
            });
        }

        let mut mmap = unsafe { MmapOptions::new().map_mut(&file) }?;
        let ptr = mmap.as_mut_ptr().cast::<CarSharedState>();

        let magic = unsafe { (&raw const (*ptr).magic).read_volatile() };
        fence(Ordering::Acquire);
        if magic != CAR_SHM_MAGIC {
            return Err(ShmError::InvalidLayout {
                name: car_name.to_string(),
            });
        }

        Ok(Self {
            car_name: car_name.to_string(),
            shm_name,
            ptr,
            owner: false,
            _mmap: mmap,
        })
    }

    /// The car this segment belongs to.
    pub fn car_name(&self) -> &str {
        &self.car_name
    }

    /// Acquire the segment lock for scoped exclusive access.
    pub fn lock(&self) -> CarStateGuard<'_> {
        unsafe { SyncBlock::lock(&raw mut (*self.ptr).sync) };
        CarStateGuard {
            segment: self,
            _not_send: PhantomData,
        }
    }

    /// Run `f` with shared read access under the lock.
    pub fn with_lock<R>(&self, f: impl FnOnce(&CarData) -> R) -> R {
        let guard = self.lock();
        f(&guard)
    }

    /// Run `f` with exclusive access under the lock, then broadcast.
    ///
    /// Every mutation path goes through here (or through an explicit
    /// guard broadcast) so waiting observers never miss a transition.
    pub fn update<R>(&self, f: impl FnOnce(&mut CarData) -> R) -> R {
        let mut guard = self.lock();
        let result = f(&mut guard);
        guard.broadcast();
        result
    }
}

impl Drop for CarStateSegment {
    fn drop(&mut self) {
        if self.owner {
            let _ = shm_unlink(self.shm_name.as_str());
            info!(segment = %self.shm_name, "unlinked shared car state");
        }
    }
}

/// Scoped exclusive access to a car's shared fields.
///
/// Dereferences to [`CarData`]; dropping the guard releases the mutex.
/// Mutating through the guard does *not* broadcast by itself; callers
/// signal explicitly (or use [`CarStateSegment::update`]) once a
/// coherent transition is in place.
pub struct CarStateGuard<'a> {
    segment: &'a CarStateSegment,
    // pthread mutexes must be released on the locking thread.
    _not_send: PhantomData<*mut ()>,
}

impl CarStateGuard<'_> {
    /// Wake every waiter in every attached process.
    pub fn broadcast(&mut self) {
        unsafe { SyncBlock::broadcast(&raw mut (*self.segment.ptr).sync) };
    }

    /// Release the lock, wait for a broadcast or `timeout`, re-acquire.
    ///
    /// Returns `true` when woken by a broadcast, `false` on timeout.
    pub fn wait_timeout(&mut self, timeout: Duration) -> bool {
        unsafe { SyncBlock::wait_timeout(&raw mut (*self.segment.ptr).sync, timeout) }
    }
}

impl Deref for CarStateGuard<'_> {
    type Target = CarData;

    fn deref(&self) -> &CarData {
        unsafe { &(*self.segment.ptr).data }
    }
}

impl DerefMut for CarStateGuard<'_> {
    fn deref_mut(&mut self) -> &mut CarData {
        unsafe { &mut (*self.segment.ptr).data }
    }
}

impl Drop for CarStateGuard<'_> {
    fn drop(&mut self) {
        unsafe { SyncBlock::unlock(&raw mut (*self.segment.ptr).sync) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lift_common::door::DoorStatus;
    use lift_common::floor::FloorLabel;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    fn floor(s: &str) -> FloorLabel {
        s.parse().unwrap()
    }

    /// Unique car names so parallel tests never collide on a segment.
    fn test_config(suffix: &str) -> CarConfig {
        CarConfig::new(
            format!("test{}_{}", std::process::id(), suffix),
            floor("1"),
            floor("10"),
            100,
        )
        .unwrap()
    }

    #[test]
    fn create_initializes_defaults() {
        let segment = CarStateSegment::create(&test_config("defaults")).unwrap();
        segment.with_lock(|state| {
            assert_eq!(state.current_floor(), floor("1"));
            assert_eq!(state.destination_floor(), floor("1"));
            assert_eq!(state.lowest_floor(), floor("1"));
            assert_eq!(state.highest_floor(), floor("10"));
            assert_eq!(state.door_status(), DoorStatus::Closed);
            assert!(!state.emergency_mode());
        });
    }

    #[test]
    fn attach_sees_writes_from_the_owner() {
        let config = test_config("attach");
        let owner = CarStateSegment::create(&config).unwrap();
        let attached = CarStateSegment::attach(&config.name).unwrap();

        owner.update(|state| state.set_destination_floor(floor("7")));
        assert_eq!(
            attached.with_lock(|state| state.destination_floor()),
            floor("7")
        );
    }

    #[test]
    fn attach_missing_car_is_not_found() {
        let missing = format!("test{}_missing", std::process::id());
        assert!(matches!(
            CarStateSegment::attach(&missing),
            Err(ShmError::NotFound { .. })
        ));
    }

    #[test]
    fn owner_drop_unlinks_the_segment() {
        let config = test_config("unlink");
        let owner = CarStateSegment::create(&config).unwrap();
        drop(owner);
        assert!(matches!(
            CarStateSegment::attach(&config.name),
            Err(ShmError::NotFound { .. })
        ));
    }

    #[test]
    fn create_replaces_a_stale_segment() {
        let config = test_config("stale");
        let first = CarStateSegment::create(&config).unwrap();
        first.update(|state| state.set_destination_floor(floor("9")));

        // Simulate a crashed car: forget the owner so nothing unlinks,
        // then create again.
        std::mem::forget(first);
        let second = CarStateSegment::create(&config).unwrap();
        assert_eq!(
            second.with_lock(|state| state.destination_floor()),
            floor("1")
        );
    }

    #[test]
    fn broadcast_wakes_a_waiting_thread() {
        let config = test_config("condvar");
        let segment = Arc::new(CarStateSegment::create(&config).unwrap());
        let observed = Arc::new(AtomicBool::new(false));

        let waiter = {
            let segment = Arc::clone(&segment);
            let observed = Arc::clone(&observed);
            std::thread::spawn(move || {
                let mut guard = segment.lock();
                let deadline = std::time::Instant::now() + Duration::from_secs(2);
                while !guard.open_button() {
                    if std::time::Instant::now() >= deadline {
                        return;
                    }
                    guard.wait_timeout(Duration::from_millis(100));
                }
                observed.store(true, Ordering::SeqCst);
            })
        };

        // Give the waiter time to block, then mutate + broadcast.
        std::thread::sleep(Duration::from_millis(50));
        segment.update(|state| state.set_open_button(true));

        waiter.join().unwrap();
        assert!(observed.load(Ordering::SeqCst));
    }

    #[test]
    fn wait_timeout_expires_without_a_broadcast() {
        let segment = CarStateSegment::create(&test_config("timeout")).unwrap();
        let mut guard = segment.lock();
        let start = std::time::Instant::now();
        let woken = guard.wait_timeout(Duration::from_millis(50));
        assert!(!woken);
        assert!(start.elapsed() >= Duration::from_millis(45));
    }
}
