//! Deadlock-free acquisition of key sets.
//!
//! Every request sorts its keys and takes them in ascending order, so two
//! callers asking for overlapping sets can never wait on each other in a
//! cycle. Release runs in the exact reverse order.

use std::time::Duration;

use crate::lock::LockError;
use crate::registry::{LockHandle, LockRegistry};

/// The sorted, de-duplicated keys of one protected invocation.
///
/// A request is consumed by acquisition; build a new one for every
/// lock/unlock cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionRequest {
    serial: u64,
    keys: Vec<String>,
}

impl AcquisitionRequest {
    pub fn new<I, K>(serial: u64, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        keys.sort_unstable();
        keys.dedup();
        AcquisitionRequest { serial, keys }
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Keys in acquisition order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Scoped guard over a fully acquired key set.
///
/// Dropping the set releases every key in reverse acquisition order; use
/// [`release`](Self::release) to observe release errors. The set stays on the
/// thread that acquired it:
///
/// ```compile_fail
/// use metalock::LockRegistry;
///
/// let registry = LockRegistry::new();
/// let set = registry.acquire(["k"]).unwrap();
/// std::thread::scope(|s| {
///     s.spawn(move || drop(set));
/// });
/// ```
#[must_use = "dropping a LockSet releases its locks immediately"]
pub struct LockSet<'a> {
    registry: &'a LockRegistry,
    serial: u64,
    held: Vec<LockHandle<'a>>,
}

impl<'a> LockSet<'a> {
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Held keys in acquisition order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.held.iter().map(LockHandle::key)
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Release every key, last acquired first. All keys are attempted even
    /// if one fails; the first failure is returned.
    pub fn release(mut self) -> Result<(), LockError> {
        self.release_held()
    }

    fn release_held(&mut self) -> Result<(), LockError> {
        let mut first_error = None;
        while let Some(handle) = self.held.pop() {
            if let Err(err) = self.registry.unlock_and_release(handle) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for LockSet<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.release_held() {
            tracing::error!(
                namespace = %self.registry.namespace(),
                serial = self.serial,
                %err,
                "failed to release lock set"
            );
        }
    }
}

impl LockRegistry {
    /// Acquire all `keys` in sorted order, waiting as long as it takes (or up
    /// to the configured default timeout per key).
    ///
    /// If acquisition fails part-way, keys already taken are released in
    /// reverse order before the error is returned.
    pub fn acquire<I, K>(&self, keys: I) -> Result<LockSet<'_>, LockError>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let request = AcquisitionRequest::new(self.next_serial(), keys);
        self.acquire_with(request, self.default_timeout())
    }

    /// Acquire all `keys`, waiting at most `timeout` for each one.
    pub fn acquire_timeout<I, K>(
        &self,
        keys: I,
        timeout: Duration,
    ) -> Result<LockSet<'_>, LockError>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let request = AcquisitionRequest::new(self.next_serial(), keys);
        self.acquire_with(request, Some(timeout))
    }

    pub fn acquire_request(&self, request: AcquisitionRequest) -> Result<LockSet<'_>, LockError> {
        self.acquire_with(request, self.default_timeout())
    }

    pub fn acquire_request_timeout(
        &self,
        request: AcquisitionRequest,
        timeout: Duration,
    ) -> Result<LockSet<'_>, LockError> {
        self.acquire_with(request, Some(timeout))
    }

    /// Run `body` while holding every key in `keys`.
    ///
    /// Whatever `body` returns is handed back unchanged once all keys are
    /// released. If `body` panics, the keys are released while unwinding.
    pub fn run<I, K, F, T>(&self, keys: I, body: F) -> Result<T, LockError>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
        F: FnOnce() -> T,
    {
        let set = self.acquire(keys)?;
        let value = body();
        set.release()?;
        Ok(value)
    }

    /// [`run`](Self::run) with a per-key wait limit.
    pub fn run_timeout<I, K, F, T>(
        &self,
        keys: I,
        timeout: Duration,
        body: F,
    ) -> Result<T, LockError>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
        F: FnOnce() -> T,
    {
        let set = self.acquire_timeout(keys, timeout)?;
        let value = body();
        set.release()?;
        Ok(value)
    }

    pub(crate) fn run_request<F, T>(
        &self,
        request: AcquisitionRequest,
        body: F,
    ) -> Result<T, LockError>
    where
        F: FnOnce() -> T,
    {
        let set = self.acquire_request(request)?;
        let value = body();
        set.release()?;
        Ok(value)
    }

    fn acquire_with(
        &self,
        request: AcquisitionRequest,
        timeout: Option<Duration>,
    ) -> Result<LockSet<'_>, LockError> {
        let AcquisitionRequest { serial, keys } = request;
        let mut set = LockSet {
            registry: self,
            serial,
            held: Vec::with_capacity(keys.len()),
        };

        for key in &keys {
            // On error `set` is dropped, releasing what was already taken.
            let handle = match timeout {
                Some(timeout) => self.reserve_and_lock_timeout(key, serial, timeout)?,
                None => self.reserve_and_lock(key, serial)?,
            };
            set.held.push(handle);
        }

        Ok(set)
    }
}
