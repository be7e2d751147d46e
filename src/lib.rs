//! dbconnect
//!
//! Connection establishment for PostgreSQL, CockroachDB, MySQL, MariaDB and SQLite:
//! dialect canonicalization, a driver registry with once-per-family instrumented
//! drivers, and an opener that picks between a native PostgreSQL pool and a generic
//! driver-managed pool.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{Config, DatabaseConfig, PoolGate};
pub use db::{Connection, ConnectionOpener, Database, DriverRegistry};
pub use error::{DbError, DbResult};
pub use models::{ConnectionDetails, Dialect, DialectConfig};
