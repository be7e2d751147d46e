//! Connection-related data models.
//!
//! This module defines the configuration a caller hands to the opener. It is built by
//! the configuration layer before any connection is established and never mutated here.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options for the instrumentation decorator, in the order they were given.
///
/// The keys are collector-specific; connection establishment only checks for emptiness
/// and passes them through to the selected [`Instrumentation`](crate::db::Instrumentation).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentationOptions(Vec<(String, String)>);

impl InstrumentationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    /// Builder-style variant of [`push`](Self::push).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    /// Last value given for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for InstrumentationOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Configuration for establishing one database connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionDetails {
    /// Driver name override. Empty means the dialect adapter's default driver.
    pub driver: String,
    /// Wrap the native driver with the instrumentation decorator.
    pub use_instrumented_driver: bool,
    pub instrumented_driver_options: InstrumentationOptions,
    /// Maximum open connections. 0 keeps the driver default.
    pub pool: u32,
    /// Maximum idle connections. 0 keeps the driver default.
    ///
    /// sqlx pools have no idle-count cap, so a non-zero value is only recorded and
    /// reported by `Database::max_idle_conns`; it does not limit idle connections.
    pub idle_pool: u32,
    /// Zero keeps the driver default. Serialized as e.g. `"5m"`.
    #[serde(with = "humantime_serde")]
    pub conn_max_lifetime: Duration,
    /// Zero keeps the driver default.
    #[serde(with = "humantime_serde")]
    pub conn_max_idle_time: Duration,
}

impl ConnectionDetails {
    /// Driver name to use given the adapter's default.
    pub fn effective_driver<'a>(&'a self, default_driver: &'a str) -> &'a str {
        if self.driver.is_empty() {
            default_driver
        } else {
            &self.driver
        }
    }
}

/// Per-dialect view of the configuration, as supplied by the calling dialect adapter.
pub trait DialectConfig: Send + Sync {
    fn details(&self) -> &ConnectionDetails;

    /// Driver name the adapter uses when [`ConnectionDetails::driver`] is empty.
    fn default_driver(&self) -> &str;
}
