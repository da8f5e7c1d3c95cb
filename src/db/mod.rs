//! Database access layer: per-backend adapters, the adapter registry, and
//! the retry wrapper that sits in front of every operation.

pub mod adapter;
pub mod mssql;
pub mod mysql;
pub mod postgres;
pub mod registry;
pub mod retry;
pub mod types;

pub use adapter::DriverAdapter;
pub use registry::ConnectionRegistry;
pub use retry::{RetryPolicy, run_with_retry};
