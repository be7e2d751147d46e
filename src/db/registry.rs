//! Driver registry.
//!
//! Maps driver names to driver implementations. Entries are never removed. The
//! process-wide instance is [`DriverRegistry::global`]; tests and embedders that need
//! isolation create their own and hand it to the opener.
//!
//! All reads and writes go through one mutex, so [`DriverRegistry::register_once`]
//! performs its check and its insert as a single step.

use crate::db::driver::{Driver, MySqlDriver, PostgresDriver, sqlite_driver};
use crate::error::{DbError, DbResult};
use crate::models::dialect::{
    NAME_COCKROACH, NAME_MARIADB, NAME_MYSQL, NAME_POSTGRESQL, NAME_SQLITE,
};
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use tracing::debug;

static GLOBAL: LazyLock<Arc<DriverRegistry>> =
    LazyLock::new(|| Arc::new(DriverRegistry::with_native_drivers()));

pub struct DriverRegistry {
    drivers: Mutex<BTreeMap<String, Arc<dyn Driver>>>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            drivers: Mutex::new(BTreeMap::new()),
        }
    }

    /// Create a registry holding the native drivers under their usual names.
    ///
    /// SQLite is only registered when its factory succeeds.
    pub fn with_native_drivers() -> Self {
        let registry = Self::new();
        {
            let mut drivers = registry.lock();
            let postgres: Arc<dyn Driver> = Arc::new(PostgresDriver);
            for name in [NAME_POSTGRESQL, "pgx", NAME_COCKROACH] {
                drivers.insert(name.to_string(), Arc::clone(&postgres));
            }
            let mysql: Arc<dyn Driver> = Arc::new(MySqlDriver);
            for name in [NAME_MYSQL, NAME_MARIADB] {
                drivers.insert(name.to_string(), Arc::clone(&mysql));
            }
            match sqlite_driver() {
                Ok(sqlite) => {
                    for name in [NAME_SQLITE, "sqlite"] {
                        drivers.insert(name.to_string(), Arc::clone(&sqlite));
                    }
                }
                Err(e) => debug!(error = %e, "SQLite driver not registered"),
            }
        }
        registry
    }

    /// The process-wide registry.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    // The map is never left half-updated, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Arc<dyn Driver>>> {
        self.drivers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a driver under `name`. Registering a name twice is an error.
    pub fn register(&self, name: &str, driver: Arc<dyn Driver>) -> DbResult<()> {
        let mut drivers = self.lock();
        if drivers.contains_key(name) {
            return Err(DbError::duplicate_driver(name));
        }
        debug!(driver = %name, "Registering driver");
        drivers.insert(name.to_string(), driver);
        Ok(())
    }

    /// Register the driver built by `factory` unless `name` is already present.
    ///
    /// The factory runs under the registry lock and only when the name is absent.
    /// Returns true if this call registered the driver.
    pub fn register_once<F>(&self, name: &str, factory: F) -> bool
    where
        F: FnOnce() -> Arc<dyn Driver>,
    {
        let mut drivers = self.lock();
        if drivers.contains_key(name) {
            debug!(driver = %name, "Driver already registered");
            return false;
        }
        debug!(driver = %name, "Registering driver");
        drivers.insert(name.to_string(), factory());
        true
    }

    /// Check whether a driver is registered under `name`.
    pub fn has(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Driver>> {
        self.lock().get(name).cloned()
    }

    /// Sorted names of all registered drivers.
    pub fn drivers(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.drivers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_registry_creation() {
        let registry = DriverRegistry::new();
        assert!(registry.is_empty());
        assert!(!registry.has("postgres"));
        assert!(registry.get("postgres").is_none());
    }

    #[test]
    fn test_native_drivers_registered() {
        let registry = DriverRegistry::with_native_drivers();
        for name in ["postgres", "pgx", "cockroach", "mysql", "mariadb"] {
            assert!(registry.has(name), "missing {name}");
        }
        #[cfg(feature = "sqlite")]
        assert!(registry.has("sqlite3"));
    }

    #[test]
    fn test_register_duplicate_is_error() {
        let registry = DriverRegistry::new();
        registry.register("pg", Arc::new(PostgresDriver)).unwrap();
        let result = registry.register("pg", Arc::new(PostgresDriver));
        assert!(matches!(result, Err(DbError::DuplicateDriver { .. })));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_once_runs_factory_once() {
        let registry = DriverRegistry::new();
        let calls = AtomicUsize::new(0);
        let factory = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Arc::new(MySqlDriver) as Arc<dyn Driver>
        };

        assert!(registry.register_once("wrapped-mysql", factory));
        assert!(!registry.register_once("wrapped-mysql", factory));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.drivers(), vec!["wrapped-mysql".to_string()]);
    }

    #[test]
    fn test_drivers_sorted() {
        let registry = DriverRegistry::new();
        registry.register("b", Arc::new(MySqlDriver)).unwrap();
        registry.register("a", Arc::new(PostgresDriver)).unwrap();
        assert_eq!(registry.drivers(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_global_is_shared() {
        assert!(Arc::ptr_eq(&DriverRegistry::global(), &DriverRegistry::global()));
        assert!(DriverRegistry::global().has("postgres"));
    }
}
