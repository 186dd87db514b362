//! Data models for the SQL execution layer.
//!
//! This module re-exports all model types used throughout the crate.

pub mod query;
pub mod result;

// Re-export commonly used types
pub use query::{Direction, QueryParams, SqlParameter, SqlValue};
pub use result::{
    ColumnMetadata, RawPayload, ResultEnvelope, Row, RowSet, StatementResult, WriteSummary,
};
