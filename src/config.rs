//! Bridge configuration.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Source of "now" for the built-in date bindings.
///
/// Injectable so tests can pin the clock to a fixed instant.
pub type ClockSource = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Configuration for an [`Installer`](crate::installer::Installer).
///
/// # Examples
///
/// ```
/// use hostbridge::config::BridgeConfig;
/// use chrono::{TimeZone, Utc};
///
/// let epoch = Utc.timestamp_opt(0, 0).unwrap();
/// let config = BridgeConfig::default()
///     .with_namespace("app")
///     .with_clock(move || epoch);
/// assert_eq!(config.namespace(), "app");
/// ```
#[derive(Clone)]
pub struct BridgeConfig {
    namespace: String,
    clock: ClockSource,
}

impl BridgeConfig {
    /// Default name of the global the exports object is bound to.
    pub const DEFAULT_NAMESPACE: &'static str = "host";

    /// Create a config with the default namespace and the system clock.
    pub fn new() -> Self {
        Self {
            namespace: Self::DEFAULT_NAMESPACE.to_string(),
            clock: Arc::new(Utc::now),
        }
    }

    /// Set the name of the global the exports object is bound to.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Replace the clock used by the built-in date bindings.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// The configured namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// A shared handle to the configured clock.
    pub fn clock(&self) -> ClockSource {
        Arc::clone(&self.clock)
    }

    /// Read the current instant from the configured clock.
    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}
