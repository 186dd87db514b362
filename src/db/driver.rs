//! Driver seam.
//!
//! The executor talks to the database only through these two traits. The MySQL
//! implementation lives in [`crate::db::pool`] and [`crate::db::mysql`]; tests
//! use [`crate::db::mock`].

use crate::error::DbResult;
use crate::models::{RawPayload, SqlValue};
use async_trait::async_trait;

/// How a request is sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One prepared statement with `?` values bound server-side.
    Prepared,
    /// Text protocol, several statements allowed, values inlined client-side.
    MultiStatement,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prepared => write!(f, "prepared"),
            Self::MultiStatement => write!(f, "multi-statement"),
        }
    }
}

/// One exclusive database session.
///
/// Session state (user variables, open transactions) lives as long as the
/// value does.
#[async_trait]
pub trait SqlConnection: Send + Sized {
    /// Run `sql` with positional `values` and tag every statement's outcome.
    async fn run(
        &mut self,
        sql: &str,
        values: &[SqlValue],
        mode: ExecutionMode,
    ) -> DbResult<RawPayload>;

    /// Release the session: pooled sessions go back to the pool, standalone
    /// ones are closed.
    async fn close(self) -> DbResult<()>;
}

/// Source of connections for the executor.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    type Connection: SqlConnection;

    /// Borrow a pooled connection for one operation.
    async fn checkout(&self) -> DbResult<Self::Connection>;

    /// Open a connection outside the pool for multi-step work that needs
    /// connection affinity.
    async fn connect(&self) -> DbResult<Self::Connection>;

    /// Close the pool, waiting for borrowed connections to come back.
    async fn close(&self);
}
