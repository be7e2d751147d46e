//! Database handles.
//!
//! A [`Database`] is a lazily connected pool plus the settings it was opened with.
//! [`Connection`] is what the opener returns: either a plain handle, or a handle
//! backed by a native PostgreSQL pool that the caller also receives directly.

use crate::db::driver::Driver;
use crate::error::DbResult;
use crate::impl_db_dispatch;
use crate::models::{ConnectionDetails, Dialect};
use sqlx::Connection as _;
use sqlx::any::install_default_drivers;
use sqlx::pool::PoolOptions;
use sqlx::{Any, AnyPool, PgPool};
use std::borrow::Cow;
use std::time::Duration;
use tracing::debug;

/// Pool settings applied to a handle. `None` keeps the sqlx default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolLimits {
    pub max_open: Option<u32>,
    /// sqlx has no idle cap, so a non-zero value is only recorded. `Some(0)` closes
    /// released connections instead of keeping them idle.
    pub max_idle: Option<u32>,
    pub max_lifetime: Option<Duration>,
    pub max_idle_time: Option<Duration>,
}

impl PoolLimits {
    /// Take the non-zero limits from `details`.
    ///
    /// An idle limit above the open limit is lowered to the open limit.
    pub fn from_details(details: &ConnectionDetails) -> Self {
        let max_open = (details.pool > 0).then_some(details.pool);
        let max_idle = (details.idle_pool > 0).then(|| match max_open {
            Some(open) => details.idle_pool.min(open),
            None => details.idle_pool,
        });

        Self {
            max_open,
            max_idle,
            max_lifetime: (!details.conn_max_lifetime.is_zero())
                .then_some(details.conn_max_lifetime),
            max_idle_time: (!details.conn_max_idle_time.is_zero())
                .then_some(details.conn_max_idle_time),
        }
    }

    /// Limits of a handle wrapping a native pool: nothing is kept idle on top of it.
    pub fn native() -> Self {
        Self {
            max_idle: Some(0),
            ..Self::default()
        }
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub(crate) fn pool_options<DB: sqlx::Database>(&self) -> PoolOptions<DB> {
        let mut options = PoolOptions::<DB>::new();
        if let Some(max_open) = self.max_open {
            options = options.max_connections(max_open);
        }
        if let Some(lifetime) = self.max_lifetime {
            options = options.max_lifetime(lifetime);
        }
        if let Some(idle_time) = self.max_idle_time {
            options = options.idle_timeout(idle_time);
        }
        if self.max_idle == Some(0) {
            options = options
                .min_connections(0)
                .after_release(|_, _| Box::pin(async { Ok(false) }));
        }
        options
    }
}

/// Pool behind a [`Database`].
#[derive(Debug, Clone)]
pub enum DbPool {
    /// Opened through a registered driver.
    Any(AnyPool),
    /// Native PostgreSQL pool.
    Postgres(PgPool),
}

impl DbPool {
    pub async fn close(&self) {
        impl_db_dispatch!(self, {
            Any(pool) => pool.close().await,
            Postgres(pool) => pool.close().await,
        })
    }

    pub fn is_closed(&self) -> bool {
        impl_db_dispatch!(self, {
            Any(pool) => pool.is_closed(),
            Postgres(pool) => pool.is_closed(),
        })
    }

    /// Connections currently open, idle or in use.
    pub fn size(&self) -> u32 {
        impl_db_dispatch!(self, {
            Any(pool) => pool.size(),
            Postgres(pool) => pool.size(),
        })
    }

    pub fn num_idle(&self) -> usize {
        impl_db_dispatch!(self, {
            Any(pool) => pool.num_idle(),
            Postgres(pool) => pool.num_idle(),
        })
    }
}

/// An opened database handle. No connection is made until first use.
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
    dialect: Option<Dialect>,
    driver_name: String,
    limits: PoolLimits,
}

impl Database {
    /// Open a handle through `driver`. Must be called within a Tokio runtime.
    pub(crate) fn open_driver(
        driver: &dyn Driver,
        driver_name: &str,
        dialect: &str,
        dsn: &str,
        limits: PoolLimits,
    ) -> DbResult<Self> {
        install_default_drivers();
        let options = driver.connect_options(dsn)?;
        debug!(driver = %driver_name, limits = ?limits, "Creating lazy pool");
        let pool = limits.pool_options::<Any>().connect_lazy_with(options);

        Ok(Self {
            pool: DbPool::Any(pool),
            dialect: Dialect::canonicalize(dialect),
            driver_name: driver_name.to_string(),
            limits,
        })
    }

    /// Wrap a native PostgreSQL pool.
    pub(crate) fn from_native(pool: PgPool, dialect: Dialect) -> Self {
        Self {
            pool: DbPool::Postgres(pool),
            dialect: Some(dialect),
            driver_name: dialect.name().to_string(),
            limits: PoolLimits::native(),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn any_pool(&self) -> Option<&AnyPool> {
        match &self.pool {
            DbPool::Any(pool) => Some(pool),
            DbPool::Postgres(_) => None,
        }
    }

    /// Canonical dialect, if the driver name is a known alias.
    pub fn dialect(&self) -> Option<Dialect> {
        self.dialect
    }

    /// Registry name of the driver this handle was opened with.
    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    pub fn limits(&self) -> &PoolLimits {
        &self.limits
    }

    pub fn max_idle_conns(&self) -> Option<u32> {
        self.limits.max_idle
    }

    /// Rewrite `?` placeholders for this handle's dialect.
    pub fn rebind<'q>(&self, query: &'q str) -> Cow<'q, str> {
        match self.dialect {
            Some(dialect) => dialect.placeholder_style().rebind(query),
            None => Cow::Borrowed(query),
        }
    }

    /// Acquire a connection and check that the server answers.
    pub async fn ping(&self) -> DbResult<()> {
        impl_db_dispatch!(&self.pool, {
            Any(pool) => {
                let mut conn = pool.acquire().await?;
                conn.ping().await?
            },
            Postgres(pool) => {
                let mut conn = pool.acquire().await?;
                conn.ping().await?
            },
        });
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Result of opening a connection.
#[derive(Debug, Clone)]
pub enum Connection {
    Generic(Database),
    /// The handle and `pool` share the same native pool.
    Pooled { database: Database, pool: PgPool },
}

impl Connection {
    pub fn database(&self) -> &Database {
        match self {
            Self::Generic(database) | Self::Pooled { database, .. } => database,
        }
    }

    pub fn into_database(self) -> Database {
        match self {
            Self::Generic(database) | Self::Pooled { database, .. } => database,
        }
    }

    pub fn native_pool(&self) -> Option<&PgPool> {
        match self {
            Self::Generic(_) => None,
            Self::Pooled { pool, .. } => Some(pool),
        }
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self, Self::Pooled { .. })
    }

    /// Close the handle and, for pooled connections, the native pool with it.
    pub async fn close(&self) {
        self.database().close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(pool: u32, idle_pool: u32) -> ConnectionDetails {
        ConnectionDetails {
            pool,
            idle_pool,
            ..ConnectionDetails::default()
        }
    }

    #[test]
    fn test_limits_zero_means_default() {
        let limits = PoolLimits::from_details(&ConnectionDetails::default());
        assert!(limits.is_default());
        assert_eq!(limits.max_open, None);
        assert_eq!(limits.max_idle, None);
    }

    #[test]
    fn test_limits_non_zero_applied() {
        let mut details = details(10, 2);
        details.conn_max_lifetime = Duration::from_secs(300);
        details.conn_max_idle_time = Duration::from_secs(60);

        let limits = PoolLimits::from_details(&details);
        assert_eq!(limits.max_open, Some(10));
        assert_eq!(limits.max_idle, Some(2));
        assert_eq!(limits.max_lifetime, Some(Duration::from_secs(300)));
        assert_eq!(limits.max_idle_time, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_limits_idle_capped_to_open() {
        let limits = PoolLimits::from_details(&details(3, 8));
        assert_eq!(limits.max_idle, Some(3));

        let limits = PoolLimits::from_details(&details(0, 8));
        assert_eq!(limits.max_idle, Some(8));
    }

    #[test]
    fn test_pool_options_follow_limits() {
        let defaults = PoolOptions::<Any>::new();
        let options = PoolLimits::default().pool_options::<Any>();
        assert_eq!(options.get_max_connections(), defaults.get_max_connections());
        assert_eq!(options.get_idle_timeout(), defaults.get_idle_timeout());

        let mut details = details(7, 0);
        details.conn_max_idle_time = Duration::from_secs(5);
        let options = PoolLimits::from_details(&details).pool_options::<Any>();
        assert_eq!(options.get_max_connections(), 7);
        assert_eq!(options.get_idle_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(options.get_max_lifetime(), defaults.get_max_lifetime());
    }

    #[test]
    fn test_native_limits() {
        let limits = PoolLimits::native();
        assert_eq!(limits.max_idle, Some(0));
        assert!(!limits.is_default());
        assert_eq!(limits.pool_options::<Any>().get_min_connections(), 0);
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_open_driver_is_lazy_and_pings() {
        let driver = crate::db::driver::SqliteDriver;
        let database = Database::open_driver(
            &driver,
            "sqlite3",
            "sqlite3",
            "sqlite::memory:",
            PoolLimits::default(),
        )
        .unwrap();

        assert_eq!(database.pool().size(), 0);
        assert_eq!(database.dialect(), Some(Dialect::SQLite));
        assert_eq!(database.rebind("SELECT ?"), "SELECT ?");

        database.ping().await.unwrap();
        assert!(database.pool().size() >= 1);

        database.close().await;
        assert!(database.pool().is_closed());
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_zero_idle_closes_released_connections() {
        let driver = crate::db::driver::SqliteDriver;
        let database = Database::open_driver(
            &driver,
            "sqlite3",
            "sqlite3",
            "sqlite::memory:",
            PoolLimits::native(),
        )
        .unwrap();

        database.ping().await.unwrap();
        assert_eq!(database.pool().num_idle(), 0);
        database.close().await;
    }

    #[tokio::test]
    async fn test_unknown_dialect_keeps_placeholders() {
        let driver = crate::db::driver::MySqlDriver;
        let database = Database::open_driver(
            &driver,
            "custom-mysql",
            "custom-mysql",
            "mysql://root@localhost/app",
            PoolLimits::default(),
        )
        .unwrap();

        assert_eq!(database.dialect(), None);
        assert_eq!(database.driver_name(), "custom-mysql");
        assert_eq!(database.rebind("SELECT ?"), "SELECT ?");
        assert!(database.any_pool().is_some());
        database.close().await;
    }
}
