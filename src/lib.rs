//! Named mutual exclusion.
//!
//! Serialize operations that share a logical key ("the same user", "the same
//! record") while operations on unrelated keys run concurrently, without
//! declaring the set of keys up front.
//!
//! ```
//! use metalock::LockRegistry;
//!
//! let registry = LockRegistry::new();
//! let saved = registry
//!     .run(["Record§SomeKey"], || "SomeValue".to_string())
//!     .unwrap();
//! assert_eq!(saved, "SomeValue");
//! assert!(registry.is_empty());
//! ```

mod acquisition;
mod adapter;
mod config;
mod events;
mod key;
mod lock;
mod registry;

pub use acquisition::{AcquisitionRequest, LockSet};
pub use adapter::{LockedOperation, MetaLock, NameLock};
pub use config::{RegistryConfig, DEFAULT_SERIAL_BASE};
pub use events::{LockEvent, LockEventKind};
pub use key::{lock_key, LockKey, KEY_SEPARATOR, NULL_VALUE};
pub use lock::{Lock, LockError, ReentrantLock};
pub use registry::{LockEntrySnapshot, LockHandle, LockRegistry, RegistrySnapshot};
