//! Pool dispatch macro.
//!
//! Expands to a `match` over the [`DbPool`](crate::db::DbPool) variants so each
//! backend arm stays readable at the call site.

/// Macro for generating database dispatch match arms.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(pool, {
///     Any(p) => p.close().await,
///     Postgres(p) => p.close().await,
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($pool:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $pool {
            $(
                $crate::db::handle::DbPool::$variant($p) => $body,
            )+
        }
    };
}

pub use impl_db_dispatch;
