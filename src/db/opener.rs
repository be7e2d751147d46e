//! Connection opener.
//!
//! Chooses between two ways of building a handle:
//!
//! - **Pool path**: PostgreSQL-family dialects whose connection string asks for a
//!   native pool get a [`PgPool`] configured from the string's `pool_*` parameters.
//!   The returned handle keeps no idle connections of its own.
//! - **Generic path**: everything else is opened through the resolved driver in the
//!   registry, with the non-zero limits from [`ConnectionDetails`] applied.
//!
//! Both paths are lazy. Use [`Database::ping`] to check connectivity.

use crate::config::PoolGate;
use crate::db::dsn::{self, has_pool_marker, mask_connection_string};
use crate::db::handle::{Connection, Database, PoolLimits};
use crate::db::instrument::{DriverResolver, Instrumentation, ResolvedDriver, WarningSink};
use crate::db::registry::DriverRegistry;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionDetails, Dialect, DialectConfig};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ConnectionOpener {
    resolver: DriverResolver,
    pool_gate: PoolGate,
}

impl ConnectionOpener {
    /// Create an opener backed by `registry`.
    pub fn new(registry: Arc<DriverRegistry>) -> Self {
        Self {
            resolver: DriverResolver::new(registry),
            pool_gate: PoolGate::default(),
        }
    }

    pub fn with_pool_gate(mut self, pool_gate: PoolGate) -> Self {
        self.pool_gate = pool_gate;
        self
    }

    pub fn with_instrumentation(mut self, instrumentation: Arc<dyn Instrumentation>) -> Self {
        self.resolver = self.resolver.with_instrumentation(instrumentation);
        self
    }

    pub fn with_warnings(mut self, warnings: Arc<dyn WarningSink>) -> Self {
        self.resolver = self.resolver.with_warnings(warnings);
        self
    }

    pub fn registry(&self) -> &Arc<DriverRegistry> {
        self.resolver.registry()
    }

    pub fn pool_gate(&self) -> PoolGate {
        self.pool_gate
    }

    /// Dialect of the native pool if `dsn` opened with `default_driver` takes the pool path.
    ///
    /// The dialect comes from the adapter's default driver, never from an override.
    fn pool_path_dialect(&self, default_driver: &str, dsn: &str) -> Option<Dialect> {
        let dialect = Dialect::canonicalize(default_driver)
            .filter(|dialect| dialect.supports_native_pool())?;
        match self.pool_gate {
            PoolGate::MarkerAndDialect => has_pool_marker(dsn).then_some(dialect),
            PoolGate::DialectOnly => Some(dialect),
        }
    }

    pub fn takes_pool_path(&self, default_driver: &str, dsn: &str) -> bool {
        self.pool_path_dialect(default_driver, dsn).is_some()
    }

    /// Open a database handle for `config`. Must be called within a Tokio runtime.
    ///
    /// Driver resolution (and with it instrumented driver registration) always happens
    /// first, whichever path is taken afterwards.
    pub fn open(&self, config: &dyn DialectConfig, dsn: &str) -> DbResult<Connection> {
        let details = config.details();
        let default_driver = config.default_driver();
        let resolved = self.resolver.resolve(details, default_driver)?;

        match self.pool_path_dialect(default_driver, dsn) {
            Some(pool_dialect) => {
                let dialect = Dialect::canonicalize(&resolved.dialect).unwrap_or(pool_dialect);
                self.open_pooled(dialect, dsn)
            }
            None => self.open_generic(&resolved, details, dsn),
        }
    }

    fn open_pooled(&self, dialect: Dialect, dsn: &str) -> DbResult<Connection> {
        let mut url = dsn::postgres_url(dsn)?;
        let params = dsn::take_native_pool_params(&mut url)?;
        let connect_options = PgConnectOptions::from_str(url.as_str())
            .map_err(|e| DbError::native_pool(e.to_string()))?;

        let mut pool_options = PgPoolOptions::new();
        if let Some(max_conns) = params.max_conns {
            pool_options = pool_options.max_connections(max_conns);
        }
        if let Some(min_conns) = params.min_conns {
            let max_conns = pool_options.get_max_connections();
            if min_conns > max_conns {
                return Err(DbError::invalid_connection_string(format!(
                    "pool_min_conns ({min_conns}) cannot exceed the pool maximum ({max_conns})"
                )));
            }
            pool_options = pool_options.min_connections(min_conns);
        }
        if let Some(lifetime) = params.max_conn_lifetime {
            pool_options = pool_options.max_lifetime(lifetime);
        }
        if let Some(idle_time) = params.max_conn_idle_time {
            pool_options = pool_options.idle_timeout(idle_time);
        }

        info!(
            dialect = %dialect,
            connection = %mask_connection_string(dsn),
            params = ?params,
            "Opening database through native pool"
        );
        let pool = pool_options.connect_lazy_with(connect_options);

        Ok(Connection::Pooled {
            database: Database::from_native(pool.clone(), dialect),
            pool,
        })
    }

    fn open_generic(
        &self,
        resolved: &ResolvedDriver,
        details: &ConnectionDetails,
        dsn: &str,
    ) -> DbResult<Connection> {
        let driver = self
            .registry()
            .get(&resolved.driver_name)
            .ok_or_else(|| DbError::open(DbError::unknown_driver(&resolved.driver_name)))?;
        let limits = PoolLimits::from_details(details);

        info!(
            driver = %resolved.driver_name,
            dialect = %resolved.dialect,
            connection = %mask_connection_string(dsn),
            "Opening database"
        );
        let database = Database::open_driver(
            driver.as_ref(),
            &resolved.driver_name,
            &resolved.dialect,
            dsn,
            limits,
        )
        .map_err(DbError::open)?;

        Ok(Connection::Generic(database))
    }
}

impl Default for ConnectionOpener {
    /// An opener backed by the process-wide registry.
    fn default() -> Self {
        Self::new(DriverRegistry::global())
    }
}
