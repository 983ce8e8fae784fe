use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::lock::ReentrantLock;

use super::LockRegistry;

/// A per-key lock plus the number of callers that reserved it.
///
/// `reservations` is only changed while the owning registry's map guard is
/// held; the atomic is there so the count can live beside the lock.
pub(crate) struct ManagedLock {
    pub(crate) key: String,
    pub(crate) lock: ReentrantLock,
    reservations: AtomicUsize,
}

impl ManagedLock {
    pub(crate) fn new(key: &str) -> Self {
        ManagedLock {
            key: key.to_string(),
            lock: ReentrantLock::named(key),
            reservations: AtomicUsize::new(0),
        }
    }

    pub(crate) fn reserve(&self) {
        self.reservations.fetch_add(1, Ordering::Relaxed);
    }

    /// Drops one reservation and returns how many remain, or `None` if there
    /// was nothing to release.
    pub(crate) fn release(&self) -> Option<usize> {
        let current = self.reservations.load(Ordering::Relaxed);
        if current == 0 {
            return None;
        }
        self.reservations.store(current - 1, Ordering::Relaxed);
        Some(current - 1)
    }

    pub(crate) fn reservations(&self) -> usize {
        self.reservations.load(Ordering::Relaxed)
    }
}

/// Proof that the current thread reserved and locked one key.
///
/// The handle points at the exact lock instance it acquired, so releasing it
/// never depends on what the registry maps the key to at that moment.
/// Dropping a handle releases it into the registry that issued it; use
/// [`LockRegistry::unlock_and_release`] to observe release errors.
///
/// Like `MutexGuard`, a handle cannot leave the thread that locked it:
///
/// ```compile_fail
/// use metalock::LockRegistry;
///
/// let registry = LockRegistry::new();
/// let handle = registry.reserve_and_lock("k", 1).unwrap();
/// std::thread::scope(|s| {
///     s.spawn(move || drop(handle));
/// });
/// ```
pub struct LockHandle<'a> {
    pub(crate) registry: &'a LockRegistry,
    pub(crate) serial: u64,
    pub(crate) lock: Arc<ManagedLock>,
    pub(crate) released: bool,
    _not_send: PhantomData<*const ()>,
}

impl<'a> LockHandle<'a> {
    pub(crate) fn new(registry: &'a LockRegistry, serial: u64, lock: Arc<ManagedLock>) -> Self {
        LockHandle {
            registry,
            serial,
            lock,
            released: false,
            _not_send: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        &self.lock.key
    }

    /// Serial of the invocation that acquired this handle.
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

impl Drop for LockHandle<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = self.registry.release_lock(self.serial, &self.lock) {
            tracing::error!(
                namespace = %self.registry.namespace(),
                serial = self.serial,
                key = %self.lock.key,
                %err,
                "failed to release lock handle"
            );
        }
    }
}

impl fmt::Debug for LockHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockHandle")
            .field("key", &self.lock.key)
            .field("serial", &self.serial)
            .finish()
    }
}
