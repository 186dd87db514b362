//! sqlcall
//!
//! A MySQL execution layer for repositories built on stored procedures. It
//! calls procedures with IN/OUT parameters, runs ad-hoc SQL behind a
//! multi-statement guard, and returns every result as a [`ResultEnvelope`]
//! that separates row sets from write acknowledgements.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{Config, DatabaseConfig};
pub use db::{ConnectionPoolManager, MySqlExecutor, QueryExecutor, QueryOptions};
pub use error::{DbError, DbResult};
pub use models::{QueryParams, ResultEnvelope, SqlParameter, SqlValue};
