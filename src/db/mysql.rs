//! MySQL / MariaDB adapter.
//!
//! MariaDB speaks the MySQL wire protocol, so both backends share this
//! adapter; only the default port and option names differ upstream.

use std::time::Instant;

use sqlx::MySqlPool;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlSslMode};
use sqlx::Row;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::{
    POOL_ACQUIRE_TIMEOUT, POOL_IDLE_TIMEOUT, POOL_MAX_CONNECTIONS, POOL_MIN_CONNECTIONS,
};
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, IndexEntry, QueryOutput, TableColumn, TableDescription};

#[derive(Debug)]
pub struct MySqlAdapter {
    config: ConnectionConfig,
    pool: OnceCell<MySqlPool>,
}

impl MySqlAdapter {
    /// Construction is cheap; no connection is made until the first query.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            pool: OnceCell::new(),
        }
    }

    async fn pool(&self) -> DbResult<&MySqlPool> {
        self.pool
            .get_or_try_init(|| async {
                info!(endpoint = %self.config.endpoint(), "Opening MySQL pool");
                let mut options = MySqlConnectOptions::new()
                    .host(&self.config.host)
                    .port(self.config.effective_port())
                    .charset(
                        self.config
                            .options
                            .get("charset")
                            .map(String::as_str)
                            .unwrap_or("utf8mb4"),
                    );
                if let Some(user) = &self.config.user {
                    options = options.username(user);
                }
                if let Some(password) = &self.config.password {
                    options = options.password(password);
                }
                if let Some(database) = &self.config.database {
                    options = options.database(database);
                }
                if let Some(ssl) = self.config.options.get("ssl") {
                    options = options.ssl_mode(if ssl == "true" {
                        MySqlSslMode::Required
                    } else {
                        MySqlSslMode::Disabled
                    });
                }

                MySqlPoolOptions::new()
                    .min_connections(POOL_MIN_CONNECTIONS)
                    .max_connections(POOL_MAX_CONNECTIONS)
                    .acquire_timeout(POOL_ACQUIRE_TIMEOUT)
                    .idle_timeout(POOL_IDLE_TIMEOUT)
                    .test_before_acquire(true)
                    .connect_with(options)
                    .await
                    .map_err(DbError::from)
            })
            .await
    }

    pub async fn query(&self, sql: &str) -> DbResult<QueryOutput> {
        let pool = self.pool().await?;
        let start = Instant::now();
        let rows = sqlx::query(sql).fetch_all(pool).await?;
        let execution_time_ms = start.elapsed().as_millis() as u64;
        debug!(rows = rows.len(), elapsed_ms = execution_time_ms, "MySQL query done");

        let columns = rows.first().map(RowToJson::column_metadata).unwrap_or_default();
        Ok(QueryOutput {
            rows: rows.iter().map(RowToJson::to_json_map).collect(),
            columns,
            rows_affected: None,
            execution_time_ms,
        })
    }

    pub async fn list_tables(&self) -> DbResult<Vec<String>> {
        let pool = self.pool().await?;
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = DATABASE() ORDER BY table_name",
        )
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn describe_table(&self, table: &str) -> DbResult<TableDescription> {
        let pool = self.pool().await?;

        let column_rows = sqlx::query(
            "SELECT column_name AS column_name, data_type AS data_type, \
                    is_nullable AS is_nullable, column_default AS column_default, \
                    column_key AS column_key \
             FROM information_schema.columns \
             WHERE table_schema = DATABASE() AND table_name = ? \
             ORDER BY ordinal_position",
        )
        .bind(table)
        .fetch_all(pool)
        .await?;

        if column_rows.is_empty() {
            return Err(DbError::driver(
                format!("table '{}' not found", table),
                None,
            ));
        }

        let columns = column_rows
            .iter()
            .map(|row| {
                Ok(TableColumn {
                    name: row.try_get("column_name")?,
                    data_type: row.try_get("data_type")?,
                    nullable: row.try_get::<String, _>("is_nullable")? == "YES",
                    default: row.try_get("column_default")?,
                    primary_key: row.try_get::<String, _>("column_key")? == "PRI",
                })
            })
            .collect::<DbResult<Vec<_>>>()?;

        let index_rows = sqlx::query(
            "SELECT index_name AS index_name, column_name AS column_name, \
                    non_unique AS non_unique \
             FROM information_schema.statistics \
             WHERE table_schema = DATABASE() AND table_name = ? \
             ORDER BY index_name, seq_in_index",
        )
        .bind(table)
        .fetch_all(pool)
        .await?;

        let mut indexes: Vec<IndexEntry> = Vec::new();
        for row in &index_rows {
            let name: String = row.try_get("index_name")?;
            let column: String = row.try_get("column_name")?;
            let non_unique: i64 = row.try_get("non_unique")?;
            match indexes.iter_mut().find(|i| i.name == name) {
                Some(entry) => entry.columns.push(column),
                None => indexes.push(IndexEntry {
                    name,
                    columns: vec![column],
                    unique: non_unique == 0,
                }),
            }
        }

        Ok(TableDescription {
            table: table.to_string(),
            columns,
            indexes,
        })
    }

    pub async fn health_check(&self) -> bool {
        match self.pool().await {
            Ok(pool) => sqlx::query("SELECT 1").execute(pool).await.is_ok(),
            Err(_) => false,
        }
    }

    pub async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
        }
    }
}
