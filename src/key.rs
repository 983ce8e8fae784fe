//! Lock key construction.
//!
//! A key is a lock name followed by zero or more values, joined with
//! [`KEY_SEPARATOR`]. Separator and escape characters inside a name or value
//! are escaped, so two different (name, values) tuples never produce the same
//! key. Names and values without those characters render verbatim:
//!
//! ```
//! use metalock::LockKey;
//!
//! let key = LockKey::new("User").value("Paul").value("Smith");
//! assert_eq!(key.as_str(), "User§Paul§Smith");
//! ```

use std::fmt;

pub const KEY_SEPARATOR: char = '§';

/// Rendered in place of an absent argument value.
pub const NULL_VALUE: &str = "null";

const ESCAPE: char = '\\';

/// A rendered lock key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockKey(String);

impl LockKey {
    pub fn new(name: impl AsRef<str>) -> Self {
        let mut key = String::new();
        push_escaped(&mut key, name.as_ref());
        LockKey(key)
    }

    /// Append one value component.
    pub fn value(mut self, value: impl AsRef<str>) -> Self {
        self.0.push(KEY_SEPARATOR);
        push_escaped(&mut self.0, value.as_ref());
        self
    }

    /// Append an absent value, rendered as [`NULL_VALUE`].
    pub fn null(self) -> Self {
        self.value(NULL_VALUE)
    }

    pub fn optional(self, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.value(value),
            None => self.null(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LockKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<LockKey> for String {
    fn from(key: LockKey) -> Self {
        key.0
    }
}

fn push_escaped(out: &mut String, part: &str) {
    for c in part.chars() {
        if c == KEY_SEPARATOR || c == ESCAPE {
            out.push(ESCAPE);
        }
        out.push(c);
    }
}

/// Build the key for lock `name` from the arguments of one call.
///
/// `lock_params` are the parameter names the lock is keyed on, in order;
/// `call_params` and `args` describe the actual call. Lock params the call
/// does not have are skipped, so a lock with no matching params is keyed on
/// its bare name. An absent argument renders as [`NULL_VALUE`].
pub fn lock_key<V: AsRef<str>>(
    name: &str,
    lock_params: &[&str],
    call_params: &[&str],
    args: &[Option<V>],
) -> String {
    let mut key = LockKey::new(name);
    for param in lock_params {
        if let Some(index) = call_params.iter().position(|p| p == param) {
            let value: Option<&str> = args
                .get(index)
                .and_then(Option::as_ref)
                .map(|value| value.as_ref());
            key = key.optional(value);
        }
    }
    key.into_string()
}
