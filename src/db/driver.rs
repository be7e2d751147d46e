//! Low-level drivers.
//!
//! A [`Driver`] turns a connection string into sqlx connect options. The native drivers
//! normalize their dialect's connection string formats; decorators such as the
//! instrumented driver wrap another driver and adjust the options it produces.

use crate::db::dsn;
use crate::error::{DbError, DbResult};
use crate::models::{Dialect, DriverFamily};
use sqlx::any::AnyConnectOptions;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

pub trait Driver: Send + Sync + std::fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Build connect options for `dsn`. Must not perform I/O.
    fn connect_options(&self, dsn: &str) -> DbResult<AnyConnectOptions>;
}

fn any_options(url: &str) -> DbResult<AnyConnectOptions> {
    AnyConnectOptions::from_str(url).map_err(|e| {
        DbError::invalid_connection_string(format!("Unable to parse connection URL: {e}"))
    })
}

/// PostgreSQL and CockroachDB.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDriver;

impl Driver for PostgresDriver {
    fn name(&self) -> &str {
        "postgres"
    }

    fn connect_options(&self, dsn: &str) -> DbResult<AnyConnectOptions> {
        let mut url = dsn::postgres_url(dsn)?;
        // pool_* keys configure the native pool only
        let ignored = dsn::take_native_pool_params(&mut url)?;
        if ignored != dsn::NativePoolParams::default() {
            debug!("Ignoring native pool parameters outside the native pool path");
        }
        any_options(url.as_str())
    }
}

/// MySQL and MariaDB.
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlDriver;

impl Driver for MySqlDriver {
    fn name(&self) -> &str {
        "mysql"
    }

    fn connect_options(&self, dsn: &str) -> DbResult<AnyConnectOptions> {
        any_options(dsn::mysql_url(dsn)?.as_str())
    }
}

/// Embedded SQLite. Obtain it through [`sqlite_driver`].
#[cfg(feature = "sqlite")]
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDriver;

#[cfg(feature = "sqlite")]
impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        "sqlite3"
    }

    fn connect_options(&self, dsn: &str) -> DbResult<AnyConnectOptions> {
        any_options(&dsn::sqlite_url(dsn))
    }
}

/// Factory for the embedded SQLite driver.
///
/// Fails when the crate was built without the `sqlite` feature.
pub fn sqlite_driver() -> DbResult<Arc<dyn Driver>> {
    #[cfg(feature = "sqlite")]
    {
        Ok(Arc::new(SqliteDriver))
    }
    #[cfg(not(feature = "sqlite"))]
    {
        Err(DbError::driver_unavailable(
            crate::models::dialect::NAME_SQLITE,
            "SQLite support was not compiled in (enable the `sqlite` feature)",
        ))
    }
}

/// Native driver for a dialect's family.
pub fn native_driver(dialect: Dialect) -> DbResult<Arc<dyn Driver>> {
    match dialect.family() {
        DriverFamily::Postgres => Ok(Arc::new(PostgresDriver)),
        DriverFamily::MySql => Ok(Arc::new(MySqlDriver)),
        DriverFamily::Sqlite => sqlite_driver(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_driver_by_family() {
        assert_eq!(native_driver(Dialect::Cockroach).unwrap().name(), "postgres");
        assert_eq!(native_driver(Dialect::MariaDB).unwrap().name(), "mysql");
    }

    #[test]
    fn test_postgres_driver_accepts_key_value() {
        let driver = PostgresDriver;
        assert!(driver.connect_options("host=x dbname=y").is_ok());
        assert!(driver.connect_options("host=x dbname=y pool_min_conns=5").is_ok());
        assert!(driver.connect_options("host=x dbname").is_err());
    }

    #[test]
    fn test_mysql_driver_accepts_go_dsn() {
        let driver = MySqlDriver;
        assert!(driver.connect_options("root:pw@tcp(localhost:3306)/app").is_ok());
        assert!(driver.connect_options("mariadb://root@localhost/app").is_ok());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_factory() {
        let driver = sqlite_driver().unwrap();
        assert_eq!(driver.name(), "sqlite3");
        assert!(driver.connect_options(":memory:").is_ok());
    }

    #[cfg(not(feature = "sqlite"))]
    #[test]
    fn test_sqlite_factory_unavailable() {
        assert!(matches!(
            sqlite_driver(),
            Err(DbError::DriverUnavailable { .. })
        ));
    }
}
