//! Declarative lock requirements for an operation.
//!
//! An operation declares which locks it needs once, by name and by the names
//! of its own parameters; each call then passes its argument values and the
//! body to run. Keys are derived per call and acquired through the registry's
//! sorted set protocol.
//!
//! ```
//! use metalock::{LockRegistry, LockedOperation, MetaLock};
//!
//! let registry = LockRegistry::new();
//! let add_money = LockedOperation::new("add_money", ["first_name", "last_name", "amount"])
//!     .with_meta_lock(MetaLock::new("User", ["first_name", "last_name"]));
//!
//! let args = [Some("Paul"), Some("Smith"), Some("33")];
//! assert_eq!(add_money.keys(&args), vec!["User§Paul§Smith".to_string()]);
//!
//! let total = add_money.call(&registry, &args, || 33 + 100).unwrap();
//! assert_eq!(total, 133);
//! ```

use crate::acquisition::AcquisitionRequest;
use crate::key::{lock_key, LockKey};
use crate::lock::LockError;
use crate::registry::LockRegistry;

/// A lock keyed on a name plus the values of selected parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaLock {
    name: String,
    params: Vec<String>,
}

impl MetaLock {
    pub fn new<P, S>(name: impl Into<String>, params: P) -> Self
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MetaLock {
            name: name.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn key<V: AsRef<str>>(&self, call_params: &[&str], args: &[Option<V>]) -> String {
        let lock_params: Vec<&str> = self.params.iter().map(String::as_str).collect();
        lock_key(&self.name, &lock_params, call_params, args)
    }
}

/// Locks keyed on fixed names only, independent of arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameLock {
    names: Vec<String>,
}

impl NameLock {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NameLock {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    fn keys(&self) -> impl Iterator<Item = String> + '_ {
        self.names
            .iter()
            .map(|name| LockKey::new(name).into_string())
    }
}

/// An operation together with the locks every call of it must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedOperation {
    name: String,
    params: Vec<String>,
    meta_locks: Vec<MetaLock>,
    name_locks: Vec<NameLock>,
}

impl LockedOperation {
    /// `params` are the operation's parameter names, in call order.
    pub fn new<P, S>(name: impl Into<String>, params: P) -> Self
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LockedOperation {
            name: name.into(),
            params: params.into_iter().map(Into::into).collect(),
            meta_locks: Vec::new(),
            name_locks: Vec::new(),
        }
    }

    pub fn with_meta_lock(mut self, lock: MetaLock) -> Self {
        self.meta_locks.push(lock);
        self
    }

    pub fn with_name_lock(mut self, lock: NameLock) -> Self {
        self.name_locks.push(lock);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Keys for one call, in declaration order (not yet sorted).
    pub fn keys<V: AsRef<str>>(&self, args: &[Option<V>]) -> Vec<String> {
        let call_params: Vec<&str> = self.params.iter().map(String::as_str).collect();
        let mut keys: Vec<String> = self
            .meta_locks
            .iter()
            .map(|lock| lock.key(&call_params, args))
            .collect();
        keys.extend(self.name_locks.iter().flat_map(NameLock::keys));
        keys
    }

    /// Run `body` under this operation's locks and return its value unchanged.
    pub fn call<V, F, T>(
        &self,
        registry: &LockRegistry,
        args: &[Option<V>],
        body: F,
    ) -> Result<T, LockError>
    where
        V: AsRef<str>,
        F: FnOnce() -> T,
    {
        let request = AcquisitionRequest::new(registry.next_serial(), self.keys(args));
        let serial = request.serial();
        registry.run_request(request, || {
            tracing::debug!(serial, operation = %self.name, "Before");
            let value = body();
            tracing::debug!(serial, operation = %self.name, "After");
            value
        })
    }

    /// Like [`call`](Self::call) for fallible bodies: the body's error is
    /// returned as is, and lock errors are converted into the caller's error
    /// type.
    pub fn try_call<V, F, T, E>(
        &self,
        registry: &LockRegistry,
        args: &[Option<V>],
        body: F,
    ) -> Result<T, E>
    where
        V: AsRef<str>,
        F: FnOnce() -> Result<T, E>,
        E: From<LockError>,
    {
        let request = AcquisitionRequest::new(registry.next_serial(), self.keys(args));
        let serial = request.serial();
        registry.run_request(request, || {
            tracing::debug!(serial, operation = %self.name, "Before");
            let result = body();
            match result {
                Ok(_) => tracing::debug!(serial, operation = %self.name, "After"),
                Err(_) => tracing::debug!(serial, operation = %self.name, "Error"),
            }
            result
        })?
    }
}
