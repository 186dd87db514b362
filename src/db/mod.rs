//! Database access layer.
//!
//! This module provides:
//! - Connection pool management (`pool`) and the MySQL session adapter (`mysql`)
//! - The driver seam the executor is written against (`driver`)
//! - Procedure call building and placeholder rewriting
//! - Statement inspection, result classification and type mappings
//! - Query execution (`executor`)
//! - A scripted provider for tests (`mock`)

pub mod classifier;
pub mod driver;
pub mod executor;
pub mod mock;
pub mod mysql;
pub mod placeholders;
pub mod pool;
pub mod procedure;
pub mod statement;
pub mod types;

pub use classifier::{PayloadAssembler, classify};
pub use driver::{ConnectionProvider, ExecutionMode, SqlConnection};
pub use executor::{QueryExecutor, QueryOptions};
pub use mock::{RecordedRequest, ScriptedConnection, ScriptedProvider};
pub use mysql::MySqlSession;
pub use pool::ConnectionPoolManager;
pub use procedure::CallStatement;
pub use statement::{ResultPlan, StatementShape, count_statement_terminators};

/// Executor backed by the MySQL pool.
pub type MySqlExecutor = QueryExecutor<ConnectionPoolManager>;
