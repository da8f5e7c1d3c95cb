//! SQL Server adapter.
//!
//! sqlx has no TDS driver, so this backend runs on tiberius with a bb8
//! pool in front of it. Parameter placeholders use the `@P1` TDS form.

use std::time::Instant;

use bb8::{Pool, RunError};
use bb8_tiberius::ConnectionManager;
use tiberius::{AuthMethod, Config, EncryptionLevel};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::{
    POOL_ACQUIRE_TIMEOUT, POOL_IDLE_TIMEOUT, POOL_MAX_CONNECTIONS, POOL_MIN_CONNECTIONS,
};
use crate::db::types::mssql as decode;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, IndexEntry, QueryOutput, TableColumn, TableDescription};

type MssqlPool = Pool<ConnectionManager>;

#[derive(Debug)]
pub struct SqlServerAdapter {
    config: ConnectionConfig,
    pool: OnceCell<MssqlPool>,
}

impl SqlServerAdapter {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            pool: OnceCell::new(),
        }
    }

    fn tds_config(&self) -> Config {
        let mut cfg = Config::new();
        cfg.host(&self.config.host);
        cfg.port(self.config.effective_port());
        if let Some(user) = &self.config.user {
            let password = self.config.password.as_deref().unwrap_or("");
            cfg.authentication(AuthMethod::sql_server(user, password));
        }
        if let Some(database) = &self.config.database {
            cfg.database(database);
        }
        let encrypt = self.config.options.get("encrypt").map(String::as_str) == Some("true");
        cfg.encryption(if encrypt {
            EncryptionLevel::Required
        } else {
            EncryptionLevel::NotSupported
        });
        if self.config.options.get("trustServerCertificate").map(String::as_str) == Some("true") {
            cfg.trust_cert();
        }
        cfg
    }

    async fn pool(&self) -> DbResult<&MssqlPool> {
        self.pool
            .get_or_try_init(|| async {
                info!(endpoint = %self.config.endpoint(), "Opening SQL Server pool");
                let manager = ConnectionManager::new(self.tds_config());
                Pool::builder()
                    .max_size(POOL_MAX_CONNECTIONS)
                    .min_idle(Some(POOL_MIN_CONNECTIONS))
                    .connection_timeout(POOL_ACQUIRE_TIMEOUT)
                    .idle_timeout(Some(POOL_IDLE_TIMEOUT))
                    .build(manager)
                    .await
                    .map_err(|e| DbError::connection(e.to_string()))
            })
            .await
    }

    async fn acquire(&self) -> DbResult<bb8::PooledConnection<'_, ConnectionManager>> {
        let pool = self.pool().await?;
        pool.get().await.map_err(|e| match e {
            RunError::TimedOut => DbError::connection("connection pool acquire timed out"),
            RunError::User(e) => DbError::connection(e.to_string()),
        })
    }

    pub async fn query(&self, sql: &str) -> DbResult<QueryOutput> {
        let mut conn = self.acquire().await?;
        let start = Instant::now();
        let rows = conn.query(sql, &[]).await?.into_first_result().await?;
        let execution_time_ms = start.elapsed().as_millis() as u64;
        debug!(rows = rows.len(), elapsed_ms = execution_time_ms, "SQL Server query done");

        let columns = rows.first().map(decode::column_metadata).unwrap_or_default();
        Ok(QueryOutput {
            rows: rows.iter().map(decode::row_to_json_map).collect(),
            columns,
            rows_affected: None,
            execution_time_ms,
        })
    }

    pub async fn list_tables(&self) -> DbResult<Vec<String>> {
        let mut conn = self.acquire().await?;
        let rows = conn
            .query(
                "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
                 WHERE TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME",
                &[],
            )
            .await?
            .into_first_result()
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.try_get::<&str, _>(0).ok().flatten())
            .map(String::from)
            .collect())
    }

    pub async fn describe_table(&self, table: &str) -> DbResult<TableDescription> {
        let mut conn = self.acquire().await?;

        let column_rows = conn
            .query(
                "SELECT c.COLUMN_NAME, c.DATA_TYPE, c.IS_NULLABLE, c.COLUMN_DEFAULT, \
                        CASE WHEN pk.COLUMN_NAME IS NULL THEN 0 ELSE 1 END AS IS_PRIMARY \
                 FROM INFORMATION_SCHEMA.COLUMNS c \
                 LEFT JOIN ( \
                     SELECT kcu.TABLE_NAME, kcu.COLUMN_NAME \
                     FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu \
                     JOIN INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
                       ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME \
                     WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY' \
                 ) pk ON pk.TABLE_NAME = c.TABLE_NAME AND pk.COLUMN_NAME = c.COLUMN_NAME \
                 WHERE c.TABLE_NAME = @P1 \
                 ORDER BY c.ORDINAL_POSITION",
                &[&table],
            )
            .await?
            .into_first_result()
            .await?;

        if column_rows.is_empty() {
            return Err(DbError::driver(
                format!("table '{}' not found", table),
                None,
            ));
        }

        let mut columns = Vec::with_capacity(column_rows.len());
        for row in &column_rows {
            columns.push(TableColumn {
                name: required_str(row, "COLUMN_NAME")?,
                data_type: required_str(row, "DATA_TYPE")?,
                nullable: row.try_get::<&str, _>("IS_NULLABLE")?.unwrap_or("NO") == "YES",
                default: row.try_get::<&str, _>("COLUMN_DEFAULT")?.map(String::from),
                primary_key: row.try_get::<i32, _>("IS_PRIMARY")?.unwrap_or(0) == 1,
            });
        }

        let index_rows = conn
            .query(
                "SELECT i.name AS index_name, c.name AS column_name, i.is_unique \
                 FROM sys.indexes i \
                 JOIN sys.index_columns ic \
                   ON ic.object_id = i.object_id AND ic.index_id = i.index_id \
                 JOIN sys.columns c \
                   ON c.object_id = ic.object_id AND c.column_id = ic.column_id \
                 WHERE i.object_id = OBJECT_ID(@P1) AND i.name IS NOT NULL \
                 ORDER BY i.name, ic.key_ordinal",
                &[&table],
            )
            .await?
            .into_first_result()
            .await?;

        let mut indexes: Vec<IndexEntry> = Vec::new();
        for row in &index_rows {
            let name = required_str(row, "index_name")?;
            let column = required_str(row, "column_name")?;
            let unique = row.try_get::<bool, _>("is_unique")?.unwrap_or(false);
            match indexes.iter_mut().find(|i| i.name == name) {
                Some(entry) => entry.columns.push(column),
                None => indexes.push(IndexEntry {
                    name,
                    columns: vec![column],
                    unique,
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
        match self.acquire().await {
            Ok(mut conn) => conn.simple_query("SELECT 1").await.is_ok(),
            Err(_) => false,
        }
    }

    /// bb8 has no explicit close; the pool's connections are torn down when
    /// the last reference drops, which the registry guarantees on eviction.
    pub async fn close(&self) {}
}

fn required_str(row: &tiberius::Row, column: &str) -> DbResult<String> {
    row.try_get::<&str, _>(column)?
        .map(String::from)
        .ok_or_else(|| DbError::internal(format!("unexpected NULL in catalog column '{}'", column)))
}
