//! Connection establishment.
//!
//! This module provides:
//! - Connection string normalization
//! - Native drivers and the driver registry
//! - Instrumented driver resolution
//! - Database handles and the connection opener
//! - Pool dispatch macro for reducing code duplication

pub mod driver;
pub mod dsn;
pub mod handle;
pub mod instrument;
#[macro_use]
pub mod macros;
pub mod opener;
pub mod registry;

pub use driver::{Driver, MySqlDriver, PostgresDriver, native_driver, sqlite_driver};
#[cfg(feature = "sqlite")]
pub use driver::SqliteDriver;
pub use handle::{Connection, Database, DbPool, PoolLimits};
pub use instrument::{
    ConfigWarning, DriverResolver, INSTRUMENTED_DRIVER_PREFIX, Instrumentation,
    InstrumentedDriver, ResolvedDriver, StatementLogSettings, StatementLogging, TracingWarnings,
    WarningSink, instrumented_driver_name,
};
pub use opener::ConnectionOpener;
pub use registry::DriverRegistry;
