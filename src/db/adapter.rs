//! Backend dispatch.

use crate::db::mssql::SqlServerAdapter;
use crate::db::mysql::MySqlAdapter;
use crate::db::postgres::PostgresAdapter;
use crate::error::DbResult;
use crate::models::{BackendType, ConnectionConfig, QueryOutput, TableDescription};

/// One lazily-connected backend instance. Constructed per cache key by the
/// registry; the first query opens the pool.
#[derive(Debug)]
pub enum DriverAdapter {
    MySql(MySqlAdapter),
    Postgres(PostgresAdapter),
    SqlServer(SqlServerAdapter),
}

impl DriverAdapter {
    pub fn new(config: ConnectionConfig) -> Self {
        match config.backend {
            BackendType::MySql | BackendType::MariaDb => Self::MySql(MySqlAdapter::new(config)),
            BackendType::PostgreSql => Self::Postgres(PostgresAdapter::new(config)),
            BackendType::SqlServer => Self::SqlServer(SqlServerAdapter::new(config)),
        }
    }

    pub async fn query(&self, sql: &str) -> DbResult<QueryOutput> {
        match self {
            Self::MySql(a) => a.query(sql).await,
            Self::Postgres(a) => a.query(sql).await,
            Self::SqlServer(a) => a.query(sql).await,
        }
    }

    pub async fn list_tables(&self) -> DbResult<Vec<String>> {
        match self {
            Self::MySql(a) => a.list_tables().await,
            Self::Postgres(a) => a.list_tables().await,
            Self::SqlServer(a) => a.list_tables().await,
        }
    }

    pub async fn describe_table(&self, table: &str) -> DbResult<TableDescription> {
        match self {
            Self::MySql(a) => a.describe_table(table).await,
            Self::Postgres(a) => a.describe_table(table).await,
            Self::SqlServer(a) => a.describe_table(table).await,
        }
    }

    /// Probe liveness without surfacing the error.
    pub async fn health_check(&self) -> bool {
        match self {
            Self::MySql(a) => a.health_check().await,
            Self::Postgres(a) => a.health_check().await,
            Self::SqlServer(a) => a.health_check().await,
        }
    }

    pub async fn close(&self) {
        match self {
            Self::MySql(a) => a.close().await,
            Self::Postgres(a) => a.close().await,
            Self::SqlServer(a) => a.close().await,
        }
    }
}
