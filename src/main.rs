//! multidb - Command-line entry point.
//!
//! One-shot runner: resolves the target instance from the environment,
//! executes a single operation and prints the JSON result.

use clap::Parser;
use multidb::models::{BackendType, ConnectionOverride};
use multidb::{ConfigResolver, RequestOrchestrator, ToolOutcome};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Parser)]
#[command(name = "multidb", version, about = "Read-only SQL access to configured database instances")]
struct Cli {
    /// Backend to target: mysql, mariadb, postgresql or sqlserver
    #[arg(value_enum)]
    backend: BackendType,

    /// SQL statement to execute
    query: Option<String>,

    /// Named instance to use; defaults to the first configured one
    #[arg(long)]
    alias: Option<String>,

    /// Connection URL overriding the configured instances
    #[arg(long, value_name = "URL")]
    connection: Option<String>,

    /// List tables in the target database instead of running a query
    #[arg(long, conflicts_with = "query")]
    list_tables: bool,

    /// Describe a table (columns and indexes) instead of running a query
    #[arg(long, value_name = "TABLE", conflicts_with = "query")]
    describe: Option<String>,

    /// List the configured aliases for the backend without connecting
    #[arg(long, conflicts_with_all = ["query", "list_tables", "describe"])]
    list_configured: bool,

    /// Probe whether the target instance is reachable
    #[arg(long, conflicts_with_all = ["query", "list_tables", "describe", "list_configured"])]
    health_check: bool,

    /// Log level when RUST_LOG is not set
    #[arg(long, env = "MULTIDB_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "MULTIDB_JSON_LOGS")]
    json_logs: bool,
}

/// Initialize the tracing subscriber for logging.
fn init_tracing(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        subscriber.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    let orchestrator = RequestOrchestrator::new(ConfigResolver::from_env());
    let connection = cli.connection.clone().map(ConnectionOverride::Url);
    let alias = cli.alias.as_deref();

    let outcome = tokio::select! {
        outcome = run(&cli, &orchestrator, alias, connection.as_ref()) => outcome,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            orchestrator.shutdown().await;
            std::process::exit(130);
        }
    };

    orchestrator.shutdown().await;

    println!("{}", outcome.content);
    if outcome.is_error {
        std::process::exit(1);
    }
}

async fn run(
    cli: &Cli,
    orchestrator: &RequestOrchestrator,
    alias: Option<&str>,
    connection: Option<&ConnectionOverride>,
) -> ToolOutcome {
    if cli.list_configured {
        return orchestrator.list_configured(cli.backend).await;
    }
    if cli.health_check {
        return orchestrator.health_check(cli.backend, alias, connection).await;
    }
    if cli.list_tables {
        return orchestrator.list_tables(cli.backend, alias, connection).await;
    }
    if let Some(table) = &cli.describe {
        return orchestrator
            .describe_table(cli.backend, alias, connection, table)
            .await;
    }
    match &cli.query {
        Some(query) => orchestrator.execute(cli.backend, alias, connection, query).await,
        None => ToolOutcome {
            content: "No operation given: pass a query, --list-tables, --describe, --list-configured or --health-check"
                .to_string(),
            is_error: true,
        },
    }
}
