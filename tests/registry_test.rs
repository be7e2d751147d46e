//! Concurrency tests for instrumented driver registration.
//!
//! Many callers racing to open the first instrumented connection must end up sharing
//! one registry entry per driver family, and the decorator must be built only once.

use dbconnect::db::{
    ConnectionOpener, Driver, DriverRegistry, DriverResolver, Instrumentation, StatementLogging,
};
use dbconnect::models::{ConnectionDetails, DialectConfig, InstrumentationOptions};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts how often a driver gets decorated.
#[derive(Default)]
struct CountingInstrumentation {
    calls: AtomicUsize,
}

impl Instrumentation for CountingInstrumentation {
    fn instrument(
        &self,
        driver: Arc<dyn Driver>,
        options: &InstrumentationOptions,
    ) -> Arc<dyn Driver> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        StatementLogging.instrument(driver, options)
    }
}

fn instrumented_details() -> ConnectionDetails {
    ConnectionDetails {
        use_instrumented_driver: true,
        instrumented_driver_options: InstrumentationOptions::new().with("log_statements", "info"),
        ..ConnectionDetails::default()
    }
}

#[test]
fn test_concurrent_resolves_register_once() {
    let registry = Arc::new(DriverRegistry::new());
    let instrumentation = Arc::new(CountingInstrumentation::default());
    let resolver = DriverResolver::new(Arc::clone(&registry))
        .with_instrumentation(instrumentation.clone());
    let details = instrumented_details();

    let names: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let resolver = &resolver;
                let details = &details;
                let default_driver = if i % 2 == 0 { "postgres" } else { "cockroach" };
                scope.spawn(move || resolver.resolve(details, default_driver).unwrap())
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap().driver_name)
            .collect()
    });

    assert!(names.iter().all(|n| n == "instrumented-sql-driver-postgres"));
    assert_eq!(registry.drivers(), vec!["instrumented-sql-driver-postgres"]);
    assert_eq!(instrumentation.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_families_get_separate_entries() {
    let registry = Arc::new(DriverRegistry::new());
    let instrumentation = Arc::new(CountingInstrumentation::default());
    let resolver = DriverResolver::new(Arc::clone(&registry))
        .with_instrumentation(instrumentation.clone());
    let details = instrumented_details();

    for driver in ["postgres", "pgx", "cockroach", "mysql", "mariadb"] {
        resolver.resolve(&details, driver).unwrap();
    }

    assert_eq!(
        registry.drivers(),
        vec!["instrumented-sql-driver-mysql", "instrumented-sql-driver-postgres"]
    );
    assert_eq!(instrumentation.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_registered_entry_survives_later_options() {
    let registry = Arc::new(DriverRegistry::new());
    let resolver = DriverResolver::new(Arc::clone(&registry));

    resolver.resolve(&instrumented_details(), "mysql").unwrap();
    let first = registry.get("instrumented-sql-driver-mysql").unwrap();

    let mut details = instrumented_details();
    details.instrumented_driver_options = InstrumentationOptions::new().with("log_statements", "off");
    resolver.resolve(&details, "mariadb").unwrap();
    let second = registry.get("instrumented-sql-driver-mysql").unwrap();

    assert!(Arc::ptr_eq(&first, &second));
}

struct PostgresAdapter(ConnectionDetails);

impl DialectConfig for PostgresAdapter {
    fn details(&self) -> &ConnectionDetails {
        &self.0
    }

    fn default_driver(&self) -> &str {
        "postgres"
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_opens_share_registration() {
    let registry = Arc::new(DriverRegistry::with_native_drivers());
    let native_count = registry.len();
    let instrumentation = Arc::new(CountingInstrumentation::default());
    let opener = Arc::new(
        ConnectionOpener::new(Arc::clone(&registry)).with_instrumentation(instrumentation.clone()),
    );
    let adapter = Arc::new(PostgresAdapter(instrumented_details()));

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let opener = Arc::clone(&opener);
            let adapter = Arc::clone(&adapter);
            tokio::spawn(async move {
                let connection = opener
                    .open(adapter.as_ref(), "postgres://app@localhost/app")
                    .unwrap();
                let name = connection.database().driver_name().to_string();
                connection.close().await;
                name
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap(), "instrumented-sql-driver-postgres");
    }

    assert_eq!(registry.len(), native_count + 1);
    assert_eq!(instrumentation.calls.load(Ordering::SeqCst), 1);
}
