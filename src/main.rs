//! dbconnect - connectivity check.
//!
//! Opens a database the same way the library does for an application, checks that it
//! answers and reports which path was taken.

use dbconnect::config::Config;
use dbconnect::db::ConnectionOpener;
use dbconnect::error::DbError;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse_args();

    // Initialize logging
    init_tracing(&config);

    let db_config = config.database_config()?;
    info!(
        dialect = %db_config.dialect,
        connection = %db_config.masked_connection_string(),
        pool_gate = %config.pool_gate,
        "Starting dbconnect v{}",
        env!("CARGO_PKG_VERSION")
    );

    let opener = ConnectionOpener::default().with_pool_gate(config.pool_gate);
    let connection = opener.open(&db_config, &db_config.connection_string)?;
    let database = connection.database();

    info!(
        pooled = connection.is_pooled(),
        driver = %database.driver_name(),
        limits = ?database.limits(),
        "Database handle opened"
    );

    let timeout = config.connect_timeout_duration();
    let result = match tokio::time::timeout(timeout, database.ping()).await {
        Ok(result) => result,
        Err(_) => Err(DbError::timeout("connect", timeout.as_secs())),
    };

    connection.close().await;

    match result {
        Ok(()) => {
            info!("Database is reachable");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, suggestion = ?e.suggestion(), "Connectivity check failed");
            Err(e.into())
        }
    }
}
