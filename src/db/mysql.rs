//! MySQL session adapter.
//!
//! Turns the sqlx result stream into tagged statement results. sqlx reports
//! each row as it arrives and each statement end as a `MySqlQueryResult`
//! carrying the OK/EOF counters; [`PayloadAssembler`] decides what those ends
//! mean.

use crate::db::classifier::PayloadAssembler;
use crate::db::driver::{ExecutionMode, SqlConnection};
use crate::db::placeholders::inline_positional;
use crate::db::statement::ResultPlan;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{RawPayload, SqlValue, WriteSummary};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use futures_util::stream::BoxStream;
use sqlx::mysql::{MySqlArguments, MySqlConnection, MySqlQueryResult, MySqlRow};
use sqlx::pool::PoolConnection;
use sqlx::{Connection, Either, MySql};

/// A MySQL session, either borrowed from the pool or opened standalone.
#[derive(Debug)]
pub enum MySqlSession {
    Pooled(PoolConnection<MySql>),
    Standalone(MySqlConnection),
}

impl MySqlSession {
    fn connection(&mut self) -> &mut MySqlConnection {
        match self {
            Self::Pooled(conn) => &mut **conn,
            Self::Standalone(conn) => conn,
        }
    }
}

#[async_trait]
impl SqlConnection for MySqlSession {
    async fn run(
        &mut self,
        sql: &str,
        values: &[SqlValue],
        mode: ExecutionMode,
    ) -> DbResult<RawPayload> {
        let mut assembler = PayloadAssembler::new(ResultPlan::for_sql(sql));
        let conn = self.connection();

        match mode {
            ExecutionMode::Prepared => {
                let mut query = sqlx::query(sql);
                for value in values {
                    query = bind_value(query, value);
                }
                // Query::fetch_many is deprecated but is the only way to see
                // every result set a CALL produces.
                #[allow(deprecated)]
                let stream = query.fetch_many(&mut *conn);
                drain(stream, &mut assembler).await?;
            }
            ExecutionMode::MultiStatement => {
                let script = inline_positional(sql, values, render_literal)?;
                let stream = sqlx::raw_sql(&script).fetch_many(&mut *conn);
                drain(stream, &mut assembler).await?;
            }
        }

        Ok(assembler.finish())
    }

    async fn close(self) -> DbResult<()> {
        match self {
            // Dropping returns the connection to the pool
            Self::Pooled(conn) => {
                drop(conn);
                Ok(())
            }
            Self::Standalone(conn) => conn.close().await.map_err(DbError::from),
        }
    }
}

async fn drain(
    mut stream: BoxStream<'_, Result<Either<MySqlQueryResult, MySqlRow>, sqlx::Error>>,
    assembler: &mut PayloadAssembler,
) -> DbResult<()> {
    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(done) => assembler.end_statement(write_summary(&done)),
            Either::Right(row) => {
                // User variables and CONCAT() results often arrive as binary
                // strings, so try UTF-8 before falling back to base64.
                let json = row.to_json_map_with_options(true);
                assembler.push_row(json, || row.get_column_metadata());
            }
        }
    }
    Ok(())
}

fn write_summary(done: &MySqlQueryResult) -> WriteSummary {
    WriteSummary::new(done.rows_affected(), done.last_insert_id())
}

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_value<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    value: &'q SqlValue,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::UInt(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::String(v) => query.bind(v.as_str()),
        SqlValue::Bytes(v) => query.bind(v.as_slice()),
        SqlValue::DateTime(v) => query.bind(*v),
        SqlValue::Json(v) => query.bind(sqlx::types::Json(v)),
    }
}

/// Render a value as a MySQL literal for the text protocol.
///
/// Text is sent as a hex literal with an explicit charset introducer, so no
/// character of user data ever needs escaping.
pub(crate) fn render_literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(true) => "TRUE".to_string(),
        SqlValue::Bool(false) => "FALSE".to_string(),
        SqlValue::Int(v) => v.to_string(),
        SqlValue::UInt(v) => v.to_string(),
        SqlValue::Float(v) if v.is_finite() => format!("{:?}", v),
        SqlValue::Float(_) => "NULL".to_string(),
        SqlValue::String(v) => format!("_utf8mb4 X'{}'", hex(v.as_bytes())),
        SqlValue::Bytes(v) => format!("X'{}'", hex(v)),
        SqlValue::DateTime(v) => format!("'{}'", v.format("%Y-%m-%d %H:%M:%S%.6f")),
        SqlValue::Json(v) => format!(
            "CAST(_utf8mb4 X'{}' AS JSON)",
            hex(v.to_string().as_bytes())
        ),
    }
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
            let _ = write!(out, "{:02X}", b);
            out
        })
}
