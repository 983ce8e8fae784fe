mod error;
mod lock;
mod reentrant;

pub use error::LockError;
pub use lock::Lock;
pub use reentrant::ReentrantLock;
