//! Lock transition events.
//!
//! Every transition is traced at `trace` level under the registry's namespace.
//! With the `emitter` feature, listeners registered through
//! [`LockRegistry::on_event`](crate::LockRegistry::on_event) receive a
//! [`LockEvent`] for the kinds they subscribed to. Events are observational:
//! nothing a listener does feeds back into locking decisions.

use std::fmt;

use serde::{Deserialize, Serialize};

#[cfg(feature = "emitter")]
use std::sync::atomic::{AtomicUsize, Ordering};
#[cfg(feature = "emitter")]
use std::sync::Mutex;

#[cfg(feature = "emitter")]
use event_emitter_rs::EventEmitter;

#[cfg(feature = "emitter")]
use crate::lock::LockError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockEventKind {
    /// About to reserve the key and wait for its lock.
    Locking,
    Locked,
    Unlocking,
    Unlocked,
    /// The last reservation was released and the entry left the registry.
    Removed,
    /// A bounded wait gave up; the reservation was withdrawn.
    TimedOut,
}

impl LockEventKind {
    pub const ALL: [LockEventKind; 6] = [
        LockEventKind::Locking,
        LockEventKind::Locked,
        LockEventKind::Unlocking,
        LockEventKind::Unlocked,
        LockEventKind::Removed,
        LockEventKind::TimedOut,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LockEventKind::Locking => "locking",
            LockEventKind::Locked => "locked",
            LockEventKind::Unlocking => "unlocking",
            LockEventKind::Unlocked => "unlocked",
            LockEventKind::Removed => "removed",
            LockEventKind::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for LockEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lock transition, tagged with the invocation serial that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEvent {
    pub serial: u64,
    pub kind: LockEventKind,
    pub key: String,
}

pub(crate) struct LockEvents {
    namespace: String,
    #[cfg_attr(not(feature = "emitter"), allow(dead_code))]
    enabled: bool,
    #[cfg(feature = "emitter")]
    emitter: Mutex<EventEmitter>,
    #[cfg(feature = "emitter")]
    listeners: AtomicUsize,
}

impl LockEvents {
    pub(crate) fn new(namespace: impl Into<String>, enabled: bool) -> Self {
        LockEvents {
            namespace: namespace.into(),
            enabled,
            #[cfg(feature = "emitter")]
            emitter: Mutex::new(EventEmitter::new()),
            #[cfg(feature = "emitter")]
            listeners: AtomicUsize::new(0),
        }
    }

    pub(crate) fn record(&self, serial: u64, kind: LockEventKind, key: &str) {
        tracing::trace!(namespace = %self.namespace, serial, key, "{}", kind);

        #[cfg(feature = "emitter")]
        self.dispatch(LockEvent {
            serial,
            kind,
            key: key.to_string(),
        });
    }

    #[cfg(feature = "emitter")]
    pub(crate) fn on<F>(&self, kind: LockEventKind, listener: F) -> Result<String, LockError>
    where
        F: Fn(LockEvent) + Send + Sync + 'static,
    {
        let mut emitter = self
            .emitter
            .lock()
            .map_err(|_| LockError::Poisoned("lock event emitter poisoned".into()))?;
        let id = emitter.on(kind.as_str(), move |event: LockEvent| listener(event));
        self.listeners.fetch_add(1, Ordering::AcqRel);
        Ok(id)
    }

    #[cfg(feature = "emitter")]
    pub(crate) fn remove(&self, listener_id: &str) -> Result<bool, LockError> {
        let mut emitter = self
            .emitter
            .lock()
            .map_err(|_| LockError::Poisoned("lock event emitter poisoned".into()))?;
        let removed = emitter.remove_listener(listener_id).is_some();
        if removed {
            self.listeners.fetch_sub(1, Ordering::AcqRel);
        }
        Ok(removed)
    }

    #[cfg(feature = "emitter")]
    fn dispatch(&self, event: LockEvent) {
        if !self.enabled || self.listeners.load(Ordering::Acquire) == 0 {
            return;
        }

        let name = event.kind.as_str();
        let handles = match self.emitter.lock() {
            Ok(mut emitter) => emitter.emit(name, event),
            Err(_) => {
                tracing::warn!(namespace = %self.namespace, "lock event emitter poisoned");
                return;
            }
        };

        // Listeners run on their own threads; joining keeps delivery in emission order.
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!(
                    namespace = %self.namespace,
                    event = name,
                    "lock event listener panicked"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_serialize_as_snake_case() {
        let event = LockEvent {
            serial: 1_000_001,
            kind: LockEventKind::TimedOut,
            key: "Record§SomeKey".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"serial":1000001,"kind":"timed_out","key":"Record§SomeKey"}"#
        );
        let parsed: LockEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn display_matches_event_name() {
        for kind in LockEventKind::ALL {
            assert_eq!(kind.to_string(), kind.as_str());
        }
    }

    #[cfg(feature = "emitter")]
    #[test]
    fn listeners_receive_only_their_kind() {
        use std::sync::{Arc, Mutex};

        let events = LockEvents::new("test", true);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        events
            .on(LockEventKind::Locked, move |event| {
                sink.lock().unwrap().push(event)
            })
            .unwrap();

        events.record(1, LockEventKind::Locking, "a");
        events.record(1, LockEventKind::Locked, "a");
        events.record(2, LockEventKind::Locked, "b");

        let seen = seen.lock().unwrap();
        let keys: Vec<&str> = seen.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[cfg(feature = "emitter")]
    #[test]
    fn disabled_events_are_not_delivered() {
        use std::sync::atomic::AtomicUsize;
        use std::sync::Arc;

        let events = LockEvents::new("quiet", false);
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        events
            .on(LockEventKind::Locking, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        events.record(1, LockEventKind::Locking, "a");
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[cfg(feature = "emitter")]
    #[test]
    fn removed_listener_stops_receiving() {
        use std::sync::atomic::AtomicUsize;
        use std::sync::Arc;

        let events = LockEvents::new("test", true);
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let id = events
            .on(LockEventKind::Removed, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        events.record(1, LockEventKind::Removed, "a");
        assert!(events.remove(&id).unwrap());
        assert!(!events.remove(&id).unwrap());
        events.record(2, LockEventKind::Removed, "a");

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
