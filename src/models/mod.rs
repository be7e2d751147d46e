//! Data models for connection establishment.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod dialect;

// Re-export commonly used types
pub use connection::{ConnectionDetails, DialectConfig, InstrumentationOptions};
pub use dialect::{Dialect, DriverFamily, PlaceholderStyle};
