use std::fmt;
use std::sync::PoisonError;
use std::time::Duration;

/// Error type for lock operations.
///
/// Failures of the code running under a lock are never reported through this
/// type; they are handed back to the caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// An internal guard was poisoned (a thread panicked while holding it).
    Poisoned(String),
    /// The calling thread tried to unlock a lock it does not hold.
    NotOwner { key: String },
    /// A handle was released but its reservation is not tracked by this registry
    /// (released twice, or handed to a different registry).
    NotReserved { key: String },
    /// A bounded acquisition gave up waiting.
    Timeout { key: String, waited: Duration },
}

impl LockError {
    pub(crate) fn poisoned<T>(err: PoisonError<T>) -> Self {
        LockError::Poisoned(err.to_string())
    }

    /// The lock key this error refers to, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            LockError::Poisoned(_) => None,
            LockError::NotOwner { key }
            | LockError::NotReserved { key }
            | LockError::Timeout { key, .. } => Some(key),
        }
    }
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockError::Poisoned(msg) => write!(f, "lock poisoned: {}", msg),
            LockError::NotOwner { key } => {
                write!(f, "lock {} is not held by the current thread", key)
            }
            LockError::NotReserved { key } => {
                write!(f, "lock {} has no reservation in this registry", key)
            }
            LockError::Timeout { key, waited } => {
                write!(f, "timed out after {:?} waiting for lock {}", waited, key)
            }
        }
    }
}

impl std::error::Error for LockError {}
