//! Multi-database access core.
//!
//! Serves read-only SQL against MySQL/MariaDB, PostgreSQL and SQL Server
//! instances resolved from environment-style configuration. Connection
//! pools are created lazily, cached per endpoint, and retried with
//! exponential backoff on transient failures; mutating statements are
//! blocked before a connection is ever opened.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod safety;

pub use config::ConfigResolver;
pub use error::{DbError, DbResult};
pub use orchestrator::{RequestOrchestrator, ToolOutcome};
