//! Keyed lock registry.
//!
//! The registry lazily creates one [`ReentrantLock`](crate::ReentrantLock) per
//! key and forgets it again once nobody holds or waits for it. Callers first
//! *reserve* a key under the registry's map guard, then block on the key's own
//! lock outside that guard. An entry with outstanding reservations is never
//! removed, so every caller that reserved a key ends up waiting on the same
//! lock instance.

mod managed;
mod snapshot;

use std::collections::HashMap;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::RegistryConfig;
use crate::events::{LockEventKind, LockEvents};
use crate::lock::{Lock, LockError};

#[cfg(feature = "emitter")]
use crate::events::LockEvent;

pub(crate) use managed::ManagedLock;
pub use managed::LockHandle;
pub use snapshot::{LockEntrySnapshot, RegistrySnapshot};

/// Registry of named locks.
///
/// Share it between threads with an `Arc`; every method takes `&self`.
/// Independent registries never block each other, even for equal keys.
pub struct LockRegistry {
    config: RegistryConfig,
    locks: Mutex<HashMap<String, Arc<ManagedLock>>>,
    serial: AtomicU64,
    events: LockEvents,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        LockRegistry {
            serial: AtomicU64::new(config.serial_base),
            events: LockEvents::new(config.namespace.clone(), config.emit_events),
            locks: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    /// Next invocation correlation number. Strictly increasing per registry.
    pub fn next_serial(&self) -> u64 {
        self.serial.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Reserve `key` and block until its lock is held by the current thread.
    pub fn reserve_and_lock(&self, key: &str, serial: u64) -> Result<LockHandle<'_>, LockError> {
        self.events.record(serial, LockEventKind::Locking, key);
        let managed = self.reserve(key)?;

        if let Err(err) = managed.lock.lock() {
            self.abandon(&managed, serial);
            return Err(err);
        }

        self.events.record(serial, LockEventKind::Locked, key);
        Ok(LockHandle::new(self, serial, managed))
    }

    /// Like [`reserve_and_lock`](Self::reserve_and_lock), but gives up after
    /// `timeout`. The reservation is withdrawn before the error is returned.
    pub fn reserve_and_lock_timeout(
        &self,
        key: &str,
        serial: u64,
        timeout: Duration,
    ) -> Result<LockHandle<'_>, LockError> {
        self.events.record(serial, LockEventKind::Locking, key);
        let managed = self.reserve(key)?;

        match managed.lock.lock_timeout(timeout) {
            Ok(true) => {
                self.events.record(serial, LockEventKind::Locked, key);
                Ok(LockHandle::new(self, serial, managed))
            }
            Ok(false) => {
                self.abandon(&managed, serial);
                self.events.record(serial, LockEventKind::TimedOut, key);
                Err(LockError::Timeout {
                    key: key.to_string(),
                    waited: timeout,
                })
            }
            Err(err) => {
                self.abandon(&managed, serial);
                Err(err)
            }
        }
    }

    /// Unlock the handle's lock, then drop its reservation. The entry leaves
    /// the registry when that was the last reservation.
    ///
    /// A handle issued by another registry is refused with
    /// [`LockError::NotReserved`] and released into its own registry.
    pub fn unlock_and_release(&self, mut handle: LockHandle<'_>) -> Result<(), LockError> {
        if !ptr::eq(handle.registry, self) {
            return Err(LockError::NotReserved {
                key: handle.key().to_string(),
            });
        }
        handle.released = true;
        self.release_lock(handle.serial, &handle.lock)
    }

    /// Number of keys currently reserved by at least one caller.
    ///
    /// The probes read the map even if a thread panicked while holding the
    /// registry guard; [`is_poisoned`](Self::is_poisoned) tells that apart.
    /// Operations that lock or release keys fail with
    /// [`LockError::Poisoned`] instead.
    pub fn len(&self) -> usize {
        self.peek().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.peek().contains_key(key)
    }

    /// Outstanding reservations for `key`; 0 when the key is absent.
    pub fn reservations(&self, key: &str) -> usize {
        self.peek()
            .get(key)
            .map_or(0, |managed| managed.reservations())
    }

    /// Whether a thread panicked while holding the registry guard.
    pub fn is_poisoned(&self) -> bool {
        self.locks.is_poisoned()
    }

    pub fn snapshot(&self) -> Result<RegistrySnapshot, LockError> {
        let locks = self.guard()?;
        let mut entries = Vec::with_capacity(locks.len());
        for managed in locks.values() {
            entries.push(LockEntrySnapshot {
                key: managed.key.clone(),
                reservations: managed.reservations(),
                locked: managed.lock.is_locked()?,
                waiting: managed.lock.queue_len()?,
            });
        }
        drop(locks);

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(RegistrySnapshot {
            namespace: self.config.namespace.clone(),
            locks: entries,
        })
    }

    /// Subscribe to one kind of lock event. Returns an id for
    /// [`remove_listener`](Self::remove_listener).
    ///
    /// The emitting thread waits for the listener to finish, so a listener
    /// must not acquire keys from this registry.
    #[cfg(feature = "emitter")]
    pub fn on_event<F>(&self, kind: LockEventKind, listener: F) -> Result<String, LockError>
    where
        F: Fn(LockEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, listener)
    }

    #[cfg(feature = "emitter")]
    pub fn remove_listener(&self, listener_id: &str) -> Result<bool, LockError> {
        self.events.remove(listener_id)
    }

    pub(crate) fn default_timeout(&self) -> Option<Duration> {
        self.config.default_timeout()
    }

    fn guard(&self) -> Result<MutexGuard<'_, HashMap<String, Arc<ManagedLock>>>, LockError> {
        self.locks
            .lock()
            .map_err(|_| LockError::Poisoned("lock registry map poisoned".into()))
    }

    fn peek(&self) -> MutexGuard<'_, HashMap<String, Arc<ManagedLock>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reserve(&self, key: &str) -> Result<Arc<ManagedLock>, LockError> {
        let mut locks = self.guard()?;
        let managed = locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(ManagedLock::new(key)));
        managed.reserve();
        Ok(Arc::clone(managed))
    }

    /// Check that `managed` is still this registry's entry, unlock it, then
    /// withdraw the reservation. Nothing is unlocked for an unknown entry.
    pub(crate) fn release_lock(
        &self,
        serial: u64,
        managed: &Arc<ManagedLock>,
    ) -> Result<(), LockError> {
        if !is_registered(&*self.guard()?, managed) {
            return Err(LockError::NotReserved {
                key: managed.key.clone(),
            });
        }

        self.events
            .record(serial, LockEventKind::Unlocking, &managed.key);
        managed.lock.unlock()?;
        self.events
            .record(serial, LockEventKind::Unlocked, &managed.key);

        self.withdraw(managed, serial)
    }

    /// Withdraw a reservation whose lock was never taken, keeping the
    /// caller's original error.
    fn abandon(&self, managed: &Arc<ManagedLock>, serial: u64) {
        if let Err(err) = self.withdraw(managed, serial) {
            tracing::error!(
                namespace = %self.config.namespace,
                serial,
                key = %managed.key,
                %err,
                "failed to withdraw reservation"
            );
        }
    }

    /// Drop one reservation of `managed`, removing it from the map when none
    /// remain. Decrement and removal happen under one guard acquisition, so a
    /// concurrent `reserve` of the same key either sees the old entry with a
    /// positive count or creates a fresh one.
    fn withdraw(&self, managed: &Arc<ManagedLock>, serial: u64) -> Result<(), LockError> {
        let removed = {
            let mut locks = self.guard()?;
            if !is_registered(&locks, managed) {
                return Err(LockError::NotReserved {
                    key: managed.key.clone(),
                });
            }

            match managed.release() {
                Some(0) => {
                    locks.remove(&managed.key);
                    true
                }
                Some(_) => false,
                None => {
                    return Err(LockError::NotReserved {
                        key: managed.key.clone(),
                    })
                }
            }
        };

        if removed {
            self.events
                .record(serial, LockEventKind::Removed, &managed.key);
        }
        Ok(())
    }
}

fn is_registered(locks: &HashMap<String, Arc<ManagedLock>>, managed: &Arc<ManagedLock>) -> bool {
    locks
        .get(&managed.key)
        .is_some_and(|current| Arc::ptr_eq(current, managed))
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new()
    }
}
