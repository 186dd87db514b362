//! sqlcall - Main entry point.
//!
//! Runs one procedure call or SQL request against MySQL and prints the
//! result envelope as JSON on stdout. Logs go to stderr.

use sqlcall::config::{Command, Config};
use sqlcall::db::{ConnectionPoolManager, QueryExecutor, QueryOptions};
use sqlcall::models::QueryParams;
use sqlcall::{DbError, ResultEnvelope};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<(), serde_json::Error> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", text);
    Ok(())
}

async fn run_command(
    executor: &QueryExecutor<ConnectionPoolManager>,
    command: Command,
    pretty: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Call {
            procedure,
            params,
            dedicated,
        } => {
            let envelope = if dedicated {
                let mut conn = executor.acquire_connection().await?;
                let result = executor.call(&procedure, &params, Some(&mut conn)).await;
                executor.release_after(conn, result).await?
            } else {
                executor.call(&procedure, &params, None).await?
            };
            print_json(&envelope, pretty)?;
        }
        Command::Query {
            sql,
            params,
            multi,
            dedicated,
        } => {
            let params: QueryParams = params.into_iter().collect();
            let envelope: ResultEnvelope = if dedicated {
                let mut conn = executor.acquire_connection().await?;
                let options = QueryOptions {
                    allow_multi_statement: multi,
                    connection: Some(&mut conn),
                };
                let result = executor.query(&sql, &params, options).await;
                executor.release_after(conn, result).await?
            } else {
                let options = QueryOptions {
                    allow_multi_statement: multi,
                    connection: None,
                };
                executor.query(&sql, &params, options).await?
            };
            print_json(&envelope, pretty)?;
        }
        Command::Exists { sql, params } => {
            let params: QueryParams = params.into_iter().collect();
            let found = executor.exists(&sql, &params, None).await?;
            print_json(&serde_json::json!({ "exists": found }), pretty)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse_args();

    // Initialize logging
    init_tracing(&config);

    info!("Starting sqlcall v{}", env!("CARGO_PKG_VERSION"));

    let db_config = config.database_config()?;
    let pool = ConnectionPoolManager::connect(&db_config)
        .await
        .inspect_err(|e: &DbError| {
            error!(error = %e, suggestion = ?e.suggestion(), "Could not connect");
        })?;
    info!(
        server_version = pool.server_version().unwrap_or("unknown"),
        "Connected"
    );
    let executor = QueryExecutor::new(pool);

    let result = run_command(&executor, config.command, config.pretty).await;
    executor.shutdown().await;

    if let Err(e) = result {
        if let Some(db_err) = e.downcast_ref::<DbError>() {
            error!(
                error = %db_err,
                suggestion = ?db_err.suggestion(),
                sql_state = ?db_err.sql_state(),
                "Request failed"
            );
        }
        return Err(e);
    }

    Ok(())
}
