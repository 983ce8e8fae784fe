use std::time::Duration;

use super::LockError;

/// Trait for a single lock instance.
///
/// Implementations provide blocking lock, bounded lock, non-blocking try-lock,
/// and unlock. Unlocking from a thread that does not hold the lock is a
/// programming error and fails with [`LockError::NotOwner`].
pub trait Lock: Send + Sync {
    /// Acquire the lock, blocking until it becomes available.
    fn lock(&self) -> Result<(), LockError>;

    /// Acquire the lock, waiting at most `timeout`.
    /// Returns `Ok(true)` if acquired, `Ok(false)` if the wait timed out.
    /// A timeout too large to form a deadline waits indefinitely.
    fn lock_timeout(&self, timeout: Duration) -> Result<bool, LockError>;

    /// Try to acquire the lock without blocking.
    /// Returns `Ok(true)` if acquired, `Ok(false)` if held by another thread.
    fn try_lock(&self) -> Result<bool, LockError>;

    /// Release one hold of the lock.
    fn unlock(&self) -> Result<(), LockError>;
}
