//! Request orchestration.
//!
//! One entry point per operation. Each request resolves its target, passes
//! the safety gate, then runs through the retry executor. Failures never
//! cross this boundary as `Err`; they come back as a [`ToolOutcome`] with
//! `is_error` set and the message redacted, so a calling agent always gets
//! text it can act on.

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{ConfigResolver, connection_string};
use crate::db::{ConnectionRegistry, RetryPolicy, run_with_retry};
use crate::error::{DbError, DbResult};
use crate::models::{
    AliasSummary, BackendType, ConnectionConfig, ConnectionOverride, redact_credentials,
};
use crate::safety;

/// Outcome of one operation, ready for the calling transport.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    fn ok(value: &impl Serialize) -> Self {
        match serde_json::to_string_pretty(value) {
            Ok(content) => Self {
                content,
                is_error: false,
            },
            Err(e) => Self::error(&DbError::internal(format!("serialization failed: {}", e))),
        }
    }

    fn error(err: &DbError) -> Self {
        Self {
            content: redact_credentials(&err.to_string()),
            is_error: true,
        }
    }
}

pub struct RequestOrchestrator {
    registry: ConnectionRegistry,
    resolver: ConfigResolver,
    retry: RetryPolicy,
}

impl RequestOrchestrator {
    pub fn new(resolver: ConfigResolver) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            resolver,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(resolver: ConfigResolver, retry: RetryPolicy) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            resolver,
            retry,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Run one read statement against the chosen instance.
    pub async fn execute(
        &self,
        backend: BackendType,
        alias: Option<&str>,
        connection: Option<&ConnectionOverride>,
        sql: &str,
    ) -> ToolOutcome {
        match self.execute_inner(backend, alias, connection, sql).await {
            Ok(output) => ToolOutcome::ok(&output),
            Err(e) => ToolOutcome::error(&e),
        }
    }

    async fn execute_inner(
        &self,
        backend: BackendType,
        alias: Option<&str>,
        connection: Option<&ConnectionOverride>,
        sql: &str,
    ) -> DbResult<crate::models::QueryOutput> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(DbError::driver("query must not be empty", None));
        }

        let config = self.resolve_target(backend, alias, connection)?;
        // The gate runs after resolution but before any connection exists:
        // a blocked statement must not consume a pool slot.
        safety::ensure_read_only(sql)?;
        safety::ensure_single_statement(sql)?;

        info!(backend = %backend, alias = alias.unwrap_or("-"), endpoint = %config.endpoint(), "Executing query");
        debug!(sql, "Statement");

        run_with_retry(&self.registry, &config, &self.retry, |adapter| {
            let sql = sql.to_string();
            async move { adapter.query(&sql).await }
        })
        .await
    }

    /// List tables in the instance's current database.
    pub async fn list_tables(
        &self,
        backend: BackendType,
        alias: Option<&str>,
        connection: Option<&ConnectionOverride>,
    ) -> ToolOutcome {
        let result: DbResult<Vec<String>> = async {
            let config = self.resolve_target(backend, alias, connection)?;
            info!(backend = %backend, endpoint = %config.endpoint(), "Listing tables");
            run_with_retry(&self.registry, &config, &self.retry, |adapter| async move {
                adapter.list_tables().await
            })
            .await
        }
        .await;
        match result {
            Ok(tables) => ToolOutcome::ok(&tables),
            Err(e) => ToolOutcome::error(&e),
        }
    }

    /// Describe one table: columns, defaults, primary key, indexes.
    pub async fn describe_table(
        &self,
        backend: BackendType,
        alias: Option<&str>,
        connection: Option<&ConnectionOverride>,
        table: &str,
    ) -> ToolOutcome {
        let table = table.trim();
        let result: DbResult<crate::models::TableDescription> = async {
            if table.is_empty() {
                return Err(DbError::driver("table name must not be empty", None));
            }
            let config = self.resolve_target(backend, alias, connection)?;
            info!(backend = %backend, table, endpoint = %config.endpoint(), "Describing table");
            run_with_retry(&self.registry, &config, &self.retry, |adapter| {
                let table = table.to_string();
                async move { adapter.describe_table(&table).await }
            })
            .await
        }
        .await;
        match result {
            Ok(description) => ToolOutcome::ok(&description),
            Err(e) => ToolOutcome::error(&e),
        }
    }

    /// List the configured aliases for a backend without connecting.
    pub async fn list_configured(&self, backend: BackendType) -> ToolOutcome {
        match self.resolver.resolve(backend) {
            Ok(table) => {
                let summaries: Vec<AliasSummary> = table
                    .iter()
                    .map(|(alias, config)| AliasSummary {
                        alias: alias.to_string(),
                        host: config.host.clone(),
                        port: config.effective_port(),
                        database: config.database.clone(),
                        user: config.user.clone(),
                    })
                    .collect();
                ToolOutcome::ok(&summaries)
            }
            Err(e) => ToolOutcome::error(&e),
        }
    }

    /// Probe whether the target instance is reachable. Never errors on the
    /// probe itself: an unreachable backend reports `healthy: false`.
    pub async fn health_check(
        &self,
        backend: BackendType,
        alias: Option<&str>,
        connection: Option<&ConnectionOverride>,
    ) -> ToolOutcome {
        match self.resolve_target(backend, alias, connection) {
            Ok(config) => {
                info!(backend = %backend, endpoint = %config.endpoint(), "Health check");
                let adapter = self.registry.get(&config).await;
                let healthy = adapter.health_check().await;
                ToolOutcome::ok(&serde_json::json!({ "healthy": healthy }))
            }
            Err(e) => ToolOutcome::error(&e),
        }
    }

    /// Close every pooled connection. Called once on shutdown.
    pub async fn shutdown(&self) {
        info!("Shutting down, closing all pools");
        self.registry.close_all().await;
    }

    /// Turn backend + alias + optional override into a concrete config.
    fn resolve_target(
        &self,
        backend: BackendType,
        alias: Option<&str>,
        connection: Option<&ConnectionOverride>,
    ) -> DbResult<ConnectionConfig> {
        // A full URL override bypasses alias resolution entirely.
        if let Some(ConnectionOverride::Url(url)) = connection {
            return connection_string::parse(url, backend);
        }

        let table = self.resolver.resolve(backend)?;
        let config = match alias {
            Some(alias) => table.get(alias).ok_or_else(|| {
                DbError::unknown_alias(backend, alias, table.describe_aliases())
            })?,
            None => {
                table
                    .first()
                    .map(|(_, config)| config)
                    .ok_or_else(|| {
                        let prefix = backend.env_prefix();
                        DbError::config(format!(
                            "no {} connections configured: set {}_CONNECTIONS, {}_DB1_HOST or {}_HOST",
                            backend, prefix, prefix, prefix
                        ))
                    })?
            }
        };

        match connection {
            Some(ConnectionOverride::Fields(fields)) => {
                let merged = config.merged_with(fields);
                merged.validate()?;
                Ok(merged)
            }
            _ => Ok(config.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn orchestrator(vars: &[(&str, &str)]) -> RequestOrchestrator {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RequestOrchestrator::new(ConfigResolver::from_vars(vars))
    }

    #[tokio::test]
    async fn test_resolve_target_prefers_url_override() {
        let o = orchestrator(&[("MYSQL_DB1_HOST", "configured")]);
        let config = o
            .resolve_target(
                BackendType::MySql,
                Some("db1"),
                Some(&ConnectionOverride::Url(
                    "mysql://app:pw@elsewhere:3306/other".to_string(),
                )),
            )
            .unwrap();
        assert_eq!(config.host, "elsewhere");
    }

    #[tokio::test]
    async fn test_resolve_target_merges_field_overrides() {
        let o = orchestrator(&[
            ("POSTGRESQL_DB1_HOST", "warehouse"),
            ("POSTGRESQL_DB1_DATABASE", "analytics"),
        ]);
        let config = o
            .resolve_target(
                BackendType::PostgreSql,
                None,
                Some(&ConnectionOverride::Fields(
                    crate::models::FieldOverrides {
                        database: Some("staging".to_string()),
                        ..Default::default()
                    },
                )),
            )
            .unwrap();
        assert_eq!(config.host, "warehouse");
        assert_eq!(config.database.as_deref(), Some("staging"));
    }

    #[tokio::test]
    async fn test_unknown_alias_lists_configured_aliases() {
        let o = orchestrator(&[
            ("MYSQL_DB1_HOST", "a"),
            ("MYSQL_DB2_HOST", "b"),
        ]);
        let err = o
            .resolve_target(BackendType::MySql, Some("prod"), None)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("prod"));
        assert!(msg.contains("db1 (a:3306)"));
        assert!(msg.contains("db2 (b:3306)"));
    }

    #[tokio::test]
    async fn test_no_configuration_names_the_variables() {
        let o = orchestrator(&[]);
        let err = o
            .resolve_target(BackendType::SqlServer, None, None)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("SQLSERVER_CONNECTIONS"));
        assert!(msg.contains("SQLSERVER_HOST"));
    }

    #[tokio::test]
    async fn test_blocked_statement_opens_no_connection() {
        let o = orchestrator(&[("MYSQL_DB1_HOST", "db.internal")]);
        let outcome = o
            .execute(BackendType::MySql, Some("db1"), None, "DROP TABLE users")
            .await;
        assert!(outcome.is_error);
        assert!(outcome.content.contains("DROP"));
        assert!(outcome.content.contains("read-only by policy"));
        assert!(o.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let o = orchestrator(&[("MYSQL_DB1_HOST", "db.internal")]);
        let outcome = o.execute(BackendType::MySql, None, None, "   ").await;
        assert!(outcome.is_error);
        assert!(outcome.content.contains("must not be empty"));
    }

    #[tokio::test]
    async fn test_health_check_with_nothing_configured_is_an_error() {
        let o = orchestrator(&[]);
        let outcome = o.health_check(BackendType::MySql, None, None).await;
        assert!(outcome.is_error);
        assert!(outcome.content.contains("MYSQL_CONNECTIONS"));
        assert!(o.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_health_check_unknown_alias_reports_configured_ones() {
        let o = orchestrator(&[("POSTGRESQL_DB1_HOST", "pg.internal")]);
        let outcome = o
            .health_check(BackendType::PostgreSql, Some("prod"), None)
            .await;
        assert!(outcome.is_error);
        assert!(outcome.content.contains("db1 (pg.internal:5432)"));
    }

    #[tokio::test]
    async fn test_list_configured_excludes_credentials() {
        let o = orchestrator(&[(
            "MYSQL_CONNECTIONS",
            "primary=mysql://app:hunter2@a:3306/one",
        )]);
        let outcome = o.list_configured(BackendType::MySql).await;
        assert!(!outcome.is_error);
        assert!(outcome.content.contains("primary"));
        assert!(!outcome.content.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_list_configured_with_nothing_set_is_empty_list() {
        let o = orchestrator(&[]);
        let outcome = o.list_configured(BackendType::MariaDb).await;
        assert!(!outcome.is_error);
        assert_eq!(outcome.content.trim(), "[]");
    }
}
