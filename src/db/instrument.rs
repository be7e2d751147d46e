//! Driver instrumentation and driver resolution.
//!
//! [`DriverResolver::resolve`] decides which registered driver a connection uses. With
//! instrumentation enabled it wraps the dialect's native driver in the configured
//! [`Instrumentation`] and registers the result once per driver family under
//! `instrumented-sql-driver-<family>`. Cockroach shares the PostgreSQL entry and MariaDB
//! shares the MySQL entry, and the options of the first registration stay in effect
//! for the lifetime of the registry.

use crate::db::driver::{Driver, native_driver};
use crate::db::dsn::parse_duration;
use crate::db::registry::DriverRegistry;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionDetails, Dialect, DriverFamily, InstrumentationOptions};
use log::LevelFilter;
use sqlx::ConnectOptions;
use sqlx::any::AnyConnectOptions;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const INSTRUMENTED_DRIVER_PREFIX: &str = "instrumented-sql-driver";

/// Registry name of the instrumented driver for a family.
pub fn instrumented_driver_name(family: DriverFamily) -> String {
    format!("{INSTRUMENTED_DRIVER_PREFIX}-{family}")
}

/// Non-fatal misconfiguration detected while resolving a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigWarning {
    /// Instrumentation is off but options were supplied.
    OptionsWithoutInstrumentation,
    /// Instrumentation is on but no options were supplied.
    InstrumentationWithoutOptions,
}

impl ConfigWarning {
    pub fn message(&self) -> &'static str {
        match self {
            Self::OptionsWithoutInstrumentation => {
                "SQL driver instrumentation is disabled but `ConnectionDetails.InstrumentedDriverOptions` is not empty. Please double-check if this is a error."
            }
            Self::InstrumentationWithoutOptions => {
                "SQL driver instrumentation was enabled but no options have been passed to `ConnectionDetails.InstrumentedDriverOptions`. Instrumentation will therefore not result in any output."
            }
        }
    }
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Receives configuration warnings.
pub trait WarningSink: Send + Sync {
    fn warn(&self, warning: ConfigWarning);
}

/// Emits warnings as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWarnings;

impl WarningSink for TracingWarnings {
    fn warn(&self, warning: ConfigWarning) {
        warn!(kind = ?warning, "{}", warning.message());
    }
}

/// Driver decorator that observes the statements a driver executes.
pub trait Instrumentation: Send + Sync {
    fn instrument(
        &self,
        driver: Arc<dyn Driver>,
        options: &InstrumentationOptions,
    ) -> Arc<dyn Driver>;
}

/// Statement and slow-statement logging provided by sqlx.
///
/// Recognized options: `log_statements` and `log_slow_statements` (a log level or
/// `off`), `slow_statement_threshold` (a duration such as `500ms`).
#[derive(Debug, Default, Clone, Copy)]
pub struct StatementLogging;

impl Instrumentation for StatementLogging {
    fn instrument(
        &self,
        driver: Arc<dyn Driver>,
        options: &InstrumentationOptions,
    ) -> Arc<dyn Driver> {
        Arc::new(InstrumentedDriver::new(
            driver,
            StatementLogSettings::from_options(options),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementLogSettings {
    pub statements: LevelFilter,
    pub slow_statements: LevelFilter,
    pub slow_threshold: Duration,
}

impl Default for StatementLogSettings {
    fn default() -> Self {
        Self {
            statements: LevelFilter::Debug,
            slow_statements: LevelFilter::Warn,
            slow_threshold: Duration::from_secs(1),
        }
    }
}

impl StatementLogSettings {
    /// Build settings from instrumentation options. Invalid values keep the default.
    pub fn from_options(options: &InstrumentationOptions) -> Self {
        let mut settings = Self::default();
        for (key, value) in options.iter() {
            match key {
                "log_statements" => match LevelFilter::from_str(value) {
                    Ok(level) => settings.statements = level,
                    Err(_) => warn!(option = key, value, "Ignoring invalid log level"),
                },
                "log_slow_statements" => match LevelFilter::from_str(value) {
                    Ok(level) => settings.slow_statements = level,
                    Err(_) => warn!(option = key, value, "Ignoring invalid log level"),
                },
                "slow_statement_threshold" => match parse_duration(value) {
                    Some(threshold) => settings.slow_threshold = threshold,
                    None => warn!(option = key, value, "Ignoring invalid duration"),
                },
                _ => debug!(option = key, "Ignoring option not used by statement logging"),
            }
        }
        settings
    }
}

/// A driver whose connections log their statements.
#[derive(Debug)]
pub struct InstrumentedDriver {
    inner: Arc<dyn Driver>,
    settings: StatementLogSettings,
}

impl InstrumentedDriver {
    pub fn new(inner: Arc<dyn Driver>, settings: StatementLogSettings) -> Self {
        Self { inner, settings }
    }

    pub fn settings(&self) -> &StatementLogSettings {
        &self.settings
    }
}

impl Driver for InstrumentedDriver {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn connect_options(&self, dsn: &str) -> DbResult<AnyConnectOptions> {
        Ok(self
            .inner
            .connect_options(dsn)?
            .log_statements(self.settings.statements)
            .log_slow_statements(self.settings.slow_statements, self.settings.slow_threshold))
    }
}

/// Outcome of driver resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDriver {
    /// Registry name to open connections with.
    pub driver_name: String,
    /// Effective driver name before canonicalization.
    pub dialect: String,
}

#[derive(Clone)]
pub struct DriverResolver {
    registry: Arc<DriverRegistry>,
    instrumentation: Arc<dyn Instrumentation>,
    warnings: Arc<dyn WarningSink>,
}

impl DriverResolver {
    /// Create a resolver using [`StatementLogging`] and [`TracingWarnings`].
    pub fn new(registry: Arc<DriverRegistry>) -> Self {
        Self {
            registry,
            instrumentation: Arc::new(StatementLogging),
            warnings: Arc::new(TracingWarnings),
        }
    }

    pub fn with_instrumentation(mut self, instrumentation: Arc<dyn Instrumentation>) -> Self {
        self.instrumentation = instrumentation;
        self
    }

    pub fn with_warnings(mut self, warnings: Arc<dyn WarningSink>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn registry(&self) -> &Arc<DriverRegistry> {
        &self.registry
    }

    /// Resolve the driver for `details`, registering the instrumented driver if needed.
    ///
    /// Fails only when the native driver cannot be built (SQLite without its feature)
    /// or when instrumentation is requested for a name that does not canonicalize.
    pub fn resolve(
        &self,
        details: &ConnectionDetails,
        default_driver: &str,
    ) -> DbResult<ResolvedDriver> {
        let driver_name = details.effective_driver(default_driver).to_string();
        let dialect = driver_name.clone();
        let options = &details.instrumented_driver_options;

        if !details.use_instrumented_driver {
            if !options.is_empty() {
                self.warnings
                    .warn(ConfigWarning::OptionsWithoutInstrumentation);
            }
            return Ok(ResolvedDriver {
                driver_name,
                dialect,
            });
        }

        if options.is_empty() {
            self.warnings
                .warn(ConfigWarning::InstrumentationWithoutOptions);
        }

        let canonical = Dialect::canonicalize(&driver_name)
            .ok_or_else(|| DbError::unsupported_dialect(&driver_name))?;
        let native = native_driver(canonical)?;
        let instrumented_name = instrumented_driver_name(canonical.family());

        let registered = self.registry.register_once(&instrumented_name, || {
            self.instrumentation.instrument(native, options)
        });
        if registered {
            info!(
                driver = %instrumented_name,
                dialect = %canonical,
                "Registered instrumented driver"
            );
        }

        Ok(ResolvedDriver {
            driver_name: instrumented_name,
            dialect,
        })
    }
}

impl std::fmt::Debug for DriverResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverResolver")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
