//! Query execution engine.
//!
//! This module provides the three operations collaborators use:
//! - `call`: stored procedure with IN/OUT parameters
//! - `query`: ad-hoc SQL with `:name` placeholders, optionally a script
//! - `exists`: whether a read returns any row
//!
//! # Connections
//!
//! Each operation borrows a pooled connection for its duration unless the
//! caller passes one in. A procedure call and the read-back of its OUT
//! parameters always run on the same connection, because the values live in
//! session variables.
//!
//! Timeouts and retries are left to the driver configuration.

use crate::db::classifier::classify;
use crate::db::driver::{ConnectionProvider, ExecutionMode, SqlConnection};
use crate::db::placeholders::expand_named;
use crate::db::procedure::CallStatement;
use crate::db::statement::ensure_single_statement;
use crate::error::DbResult;
use crate::models::{QueryParams, ResultEnvelope, SqlParameter};
use tracing::{debug, warn};

/// Options for [`QueryExecutor::query`].
pub struct QueryOptions<'c, C> {
    /// Accept SQL containing several statements.
    pub allow_multi_statement: bool,
    /// Run on this connection instead of borrowing one from the pool.
    pub connection: Option<&'c mut C>,
}

impl<C> Default for QueryOptions<'_, C> {
    fn default() -> Self {
        Self {
            allow_multi_statement: false,
            connection: None,
        }
    }
}

impl<'c, C> QueryOptions<'c, C> {
    /// Allow a multi-statement script.
    pub fn multi_statement() -> Self {
        Self {
            allow_multi_statement: true,
            connection: None,
        }
    }

    /// Run on a caller-owned connection.
    pub fn on(connection: &'c mut C) -> Self {
        Self {
            allow_multi_statement: false,
            connection: Some(connection),
        }
    }
}

/// Runs procedures and SQL against a connection provider.
#[derive(Debug)]
pub struct QueryExecutor<P> {
    provider: P,
}

impl<P: ConnectionProvider> QueryExecutor<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Open an exclusive connection outside the pool.
    ///
    /// Pass it to `call`/`query`/`exists` to run several operations in one
    /// session, and hand it back with [`Self::release_connection`].
    pub async fn acquire_connection(&self) -> DbResult<P::Connection> {
        self.provider.connect().await
    }

    /// Close a connection obtained from [`Self::acquire_connection`].
    pub async fn release_connection(&self, connection: P::Connection) -> DbResult<()> {
        connection.close().await
    }

    /// Close `connection` and hand back the result of the work done on it.
    ///
    /// An operation error wins over a failure to close; the close failure is
    /// then only logged.
    pub async fn release_after<T>(
        &self,
        connection: P::Connection,
        result: DbResult<T>,
    ) -> DbResult<T> {
        let released = self.release_connection(connection).await;
        match (result, released) {
            (Err(err), Err(close_err)) => {
                warn!(error = %close_err, "Failed to close connection after error");
                Err(err)
            }
            (Err(err), Ok(())) => Err(err),
            (Ok(_), Err(close_err)) => Err(close_err),
            (Ok(value), Ok(())) => Ok(value),
        }
    }

    /// Drain and close the pool.
    pub async fn shutdown(&self) {
        self.provider.close().await;
    }

    /// Call a stored procedure.
    ///
    /// IN values are bound in order; OUT parameters are read back after the
    /// call and returned in `output_parameters` keyed without the `@` prefix.
    pub async fn call(
        &self,
        procedure: &str,
        parameters: &[SqlParameter],
        connection: Option<&mut P::Connection>,
    ) -> DbResult<ResultEnvelope> {
        let call = CallStatement::build(procedure, parameters)?;
        ensure_single_statement(&call.sql, false)?;

        debug!(
            procedure = %procedure,
            in_params = call.in_values.len(),
            out_params = call.out_names.len(),
            "Calling procedure"
        );

        let mut pooled;
        let conn = match connection {
            Some(conn) => conn,
            None => {
                pooled = self.provider.checkout().await?;
                &mut pooled
            }
        };

        let payload = conn
            .run(&call.sql, &call.in_values, ExecutionMode::Prepared)
            .await?;
        let mut envelope = classify(payload);

        if let Some(select) = call.output_select() {
            let outputs = classify(conn.run(&select, &[], ExecutionMode::Prepared).await?);
            envelope.output_parameters = call.collect_outputs(outputs.rows().first());
        }

        debug!(
            procedure = %procedure,
            data_sets = envelope.data_sets.len(),
            "Procedure finished"
        );
        Ok(envelope)
    }

    /// Run SQL with `:name` placeholders.
    ///
    /// Unless `options.allow_multi_statement` is set, SQL with more than one
    /// statement terminator is rejected before a connection is touched.
    pub async fn query(
        &self,
        sql: &str,
        params: &QueryParams,
        options: QueryOptions<'_, P::Connection>,
    ) -> DbResult<ResultEnvelope> {
        ensure_single_statement(sql, options.allow_multi_statement)?;
        let positional = expand_named(sql, params)?;
        let mode = if options.allow_multi_statement {
            ExecutionMode::MultiStatement
        } else {
            ExecutionMode::Prepared
        };

        debug!(
            sql = %positional.sql,
            params = positional.values.len(),
            mode = %mode,
            "Executing query"
        );

        let mut pooled;
        let conn = match options.connection {
            Some(conn) => conn,
            None => {
                pooled = self.provider.checkout().await?;
                &mut pooled
            }
        };

        let payload = conn.run(&positional.sql, &positional.values, mode).await?;
        Ok(classify(payload))
    }

    /// Whether `sql` returns at least one row.
    ///
    /// This is a read followed by whatever the caller does next; concurrent
    /// writers can change the answer in between.
    pub async fn exists(
        &self,
        sql: &str,
        params: &QueryParams,
        connection: Option<&mut P::Connection>,
    ) -> DbResult<bool> {
        let options = QueryOptions {
            allow_multi_statement: false,
            connection,
        };
        let envelope = self.query(sql, params, options).await?;
        Ok(!envelope.rows().is_empty())
    }
}
