//! PostgreSQL adapter.

use std::time::Instant;

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
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
pub struct PostgresAdapter {
    config: ConnectionConfig,
    pool: OnceCell<PgPool>,
}

impl PostgresAdapter {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            pool: OnceCell::new(),
        }
    }

    async fn pool(&self) -> DbResult<&PgPool> {
        self.pool
            .get_or_try_init(|| async {
                info!(endpoint = %self.config.endpoint(), "Opening PostgreSQL pool");
                let mut options = PgConnectOptions::new()
                    .host(&self.config.host)
                    .port(self.config.effective_port());
                if let Some(user) = &self.config.user {
                    options = options.username(user);
                }
                if let Some(password) = &self.config.password {
                    options = options.password(password);
                }
                if let Some(database) = &self.config.database {
                    options = options.database(database);
                }
                if let Some(sslmode) = self.config.options.get("sslmode") {
                    let mode = sslmode
                        .parse::<PgSslMode>()
                        .map_err(|e| DbError::config(format!("invalid sslmode: {}", e)))?;
                    options = options.ssl_mode(mode);
                }
                if let Some(name) = self.config.options.get("application_name") {
                    options = options.application_name(name);
                }

                PgPoolOptions::new()
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
        debug!(rows = rows.len(), elapsed_ms = execution_time_ms, "PostgreSQL query done");

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
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
        )
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn describe_table(&self, table: &str) -> DbResult<TableDescription> {
        let pool = self.pool().await?;

        let column_rows = sqlx::query(
            "SELECT c.column_name::text AS column_name, c.data_type::text AS data_type, \
                    c.is_nullable::text AS is_nullable, c.column_default::text AS column_default, \
                    EXISTS ( \
                        SELECT 1 FROM information_schema.table_constraints tc \
                        JOIN information_schema.key_column_usage kcu \
                          ON tc.constraint_name = kcu.constraint_name \
                         AND tc.table_schema = kcu.table_schema \
                        WHERE tc.constraint_type = 'PRIMARY KEY' \
                          AND tc.table_schema = c.table_schema \
                          AND tc.table_name = c.table_name \
                          AND kcu.column_name = c.column_name \
                    ) AS is_primary \
             FROM information_schema.columns c \
             WHERE c.table_schema = 'public' AND c.table_name = $1 \
             ORDER BY c.ordinal_position",
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
                    primary_key: row.try_get("is_primary")?,
                })
            })
            .collect::<DbResult<Vec<_>>>()?;

        let index_rows = sqlx::query(
            "SELECT i.relname::text AS index_name, \
                    array_agg(a.attname::text ORDER BY k.ordinality) AS column_names, \
                    ix.indisunique AS is_unique \
             FROM pg_index ix \
             JOIN pg_class i ON i.oid = ix.indexrelid \
             JOIN pg_class t ON t.oid = ix.indrelid \
             JOIN pg_namespace n ON n.oid = t.relnamespace \
             CROSS JOIN LATERAL unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ordinality) \
             JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum \
             WHERE n.nspname = 'public' AND t.relname = $1 \
             GROUP BY i.relname, ix.indisunique \
             ORDER BY i.relname",
        )
        .bind(table)
        .fetch_all(pool)
        .await?;

        let indexes = index_rows
            .iter()
            .map(|row| {
                Ok(IndexEntry {
                    name: row.try_get("index_name")?,
                    columns: row.try_get("column_names")?,
                    unique: row.try_get("is_unique")?,
                })
            })
            .collect::<DbResult<Vec<_>>>()?;

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
