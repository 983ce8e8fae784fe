use serde::{Deserialize, Serialize};

/// Point-in-time view of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntrySnapshot {
    pub key: String,
    /// Callers holding or waiting for the key.
    pub reservations: usize,
    pub locked: bool,
    /// Callers blocked on the key's lock.
    pub waiting: usize,
}

/// Point-in-time view of a whole registry, entries sorted by key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub namespace: String,
    pub locks: Vec<LockEntrySnapshot>,
}

impl RegistrySnapshot {
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&LockEntrySnapshot> {
        self.locks
            .binary_search_by(|entry| entry.key.as_str().cmp(key))
            .ok()
            .map(|index| &self.locks[index])
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
