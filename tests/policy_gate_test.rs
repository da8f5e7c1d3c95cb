//! Integration tests for the read-only statement policy.
//!
//! These run against the orchestrator with a fully configured resolver but
//! without any database: a blocked statement must fail before a connection
//! is ever attempted, so no live backend is needed.

use std::collections::HashMap;

use multidb::models::BackendType;
use multidb::safety::MUTATING_KEYWORDS;
use multidb::{ConfigResolver, RequestOrchestrator};

fn orchestrator(vars: &[(&str, &str)]) -> RequestOrchestrator {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    RequestOrchestrator::new(ConfigResolver::from_vars(vars))
}

#[tokio::test]
async fn test_every_mutating_keyword_is_blocked_for_every_backend() {
    let o = orchestrator(&[
        ("MYSQL_DB1_HOST", "mysql.internal"),
        ("MARIADB_DB1_HOST", "mariadb.internal"),
        ("POSTGRESQL_DB1_HOST", "pg.internal"),
        ("SQLSERVER_DB1_HOST", "mssql.internal"),
    ]);

    for backend in BackendType::ALL {
        for keyword in MUTATING_KEYWORDS {
            let sql = format!("{} whatever", keyword);
            let outcome = o.execute(backend, None, None, &sql).await;
            assert!(outcome.is_error, "{backend}/{keyword}");
            assert!(outcome.content.contains(keyword), "{backend}/{keyword}");
        }
    }

    // None of the blocked statements may have created an adapter.
    assert!(o.registry().is_empty().await);
}

#[tokio::test]
async fn test_policy_message_instructs_agent_to_defer_to_user() {
    let o = orchestrator(&[("MYSQL_DB1_HOST", "db.internal")]);
    let outcome = o
        .execute(BackendType::MySql, None, None, "TRUNCATE audit_log")
        .await;
    assert!(outcome.is_error);
    assert!(outcome.content.contains("read-only by policy"));
    assert!(outcome.content.contains("ask the user"));
}

#[tokio::test]
async fn test_trivia_does_not_hide_a_mutating_statement() {
    let o = orchestrator(&[("POSTGRESQL_DB1_HOST", "pg.internal")]);
    for sql in [
        ";;DROP TABLE users",
        "  -- routine cleanup\nDELETE FROM sessions",
        "/* admin */ ALTER TABLE t ADD COLUMN c int",
        "drop table users",
    ] {
        let outcome = o.execute(BackendType::PostgreSql, None, None, sql).await;
        assert!(outcome.is_error, "{sql}");
    }
    assert!(o.registry().is_empty().await);
}

#[tokio::test]
async fn test_keyword_like_identifiers_reach_resolution_not_policy() {
    // The statement passes the gate; with no alias configured the failure
    // is a configuration error, never a policy one.
    let o = orchestrator(&[]);
    let outcome = o
        .execute(BackendType::MySql, None, None, "SELECT \"createdAt\" FROM t")
        .await;
    assert!(outcome.is_error);
    assert!(!outcome.content.contains("read-only by policy"));
    assert!(outcome.content.contains("no mysql connections configured"));
}

#[tokio::test]
async fn test_unknown_alias_reports_before_policy_runs_after_resolution() {
    let o = orchestrator(&[("MYSQL_DB1_HOST", "a"), ("MYSQL_DB2_HOST", "b")]);
    let outcome = o
        .execute(BackendType::MySql, Some("prod"), None, "DROP TABLE x")
        .await;
    // Resolution happens first, so the unknown alias wins over the policy.
    assert!(outcome.is_error);
    assert!(outcome.content.contains("Unknown mysql alias 'prod'"));
    assert!(outcome.content.contains("db1 (a:3306)"));
    assert!(outcome.content.contains("db2 (b:3306)"));
}

#[tokio::test]
async fn test_multiple_statements_in_one_request_rejected() {
    let o = orchestrator(&[("MYSQL_DB1_HOST", "db.internal")]);
    let outcome = o
        .execute(BackendType::MySql, None, None, "SELECT 1; SELECT 2")
        .await;
    assert!(outcome.is_error);
    assert!(outcome.content.contains("multiple statements"));
    assert!(o.registry().is_empty().await);
}

#[tokio::test]
async fn test_error_content_never_leaks_credentials() {
    let o = orchestrator(&[]);
    // Malformed option in the override URL fails validation; the echoed
    // message must not contain the password.
    let outcome = o
        .execute(
            BackendType::PostgreSql,
            None,
            Some(&multidb::models::ConnectionOverride::Url(
                "postgresql://app:hunter2@db:5432/sales?fetchSize=100".to_string(),
            )),
            "SELECT 1",
        )
        .await;
    assert!(outcome.is_error);
    assert!(!outcome.content.contains("hunter2"));
}
