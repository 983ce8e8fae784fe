use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Base of the invocation serial numbers; the first issued serial is one above it.
pub const DEFAULT_SERIAL_BASE: u64 = 1_000_000;

/// Settings for a [`LockRegistry`](crate::LockRegistry).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use metalock::RegistryConfig;
///
/// let config = RegistryConfig::from_json(r#"{ "namespace": "billing" }"#).unwrap();
/// assert_eq!(config.namespace, "billing");
/// assert_eq!(config.default_timeout(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Label attached to every trace event of the registry.
    pub namespace: String,
    pub serial_base: u64,
    /// Per-key wait limit applied by `acquire`/`run` when set.
    /// `None` waits indefinitely.
    pub default_timeout_ms: Option<u64>,
    /// Deliver lock events to registered listeners.
    pub emit_events: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            serial_base: DEFAULT_SERIAL_BASE,
            default_timeout_ms: None,
            emit_events: true,
        }
    }
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn serial_base(mut self, base: u64) -> Self {
        self.serial_base = base;
        self
    }

    /// Millisecond precision; timeouts beyond `u64::MAX` ms are clamped.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn emit_events(mut self, emit: bool) -> Self {
        self.emit_events = emit;
        self
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }
}
