//! Statement-level SQL inspection.
//!
//! Two questions are answered here before anything reaches the server:
//! - Does the text look like more than one statement? (multi-statement guard)
//! - Which statements are expected to return rows? (result planning)
//!
//! The guard is a naive terminator count, not a parser. Result
//! planning uses [sqlparser](https://docs.rs/sqlparser/) with the MySQL dialect
//! and falls back to [`ResultPlan::Unknown`] whenever the text does not parse.

use crate::error::{DbError, DbResult};
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use tracing::{debug, warn};

/// Count statement terminators in `sql`.
///
/// Every `;` counts, including ones inside string literals or comments, so the
/// count can only over-report.
pub fn count_statement_terminators(sql: &str) -> usize {
    sql.bytes().filter(|b| *b == b';').count()
}

/// Reject SQL that looks like several statements unless scripts are allowed.
pub fn ensure_single_statement(sql: &str, allow_multi_statement: bool) -> DbResult<()> {
    if allow_multi_statement {
        return Ok(());
    }

    let terminators = count_statement_terminators(sql);
    if terminators > 1 {
        warn!(
            terminators = terminators,
            "Rejected SQL with multiple statements"
        );
        return Err(DbError::multi_statement_not_allowed(terminators));
    }
    Ok(())
}

/// Whether `sql` is a single `CALL` statement.
pub fn is_procedure_call(sql: &str) -> bool {
    let keyword: String = sql
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    keyword.eq_ignore_ascii_case("CALL") && count_statement_terminators(sql) <= 1
}

/// Expected result of one statement in a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementShape {
    /// Produces a row set, possibly empty.
    Rows,
    /// Produces only an OK packet.
    Write,
}

/// How the results of one request should be tagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultPlan {
    /// A single CALL: every boundary but the final one closes a row set.
    Procedure,
    /// A script whose statements have known shapes, in order.
    Script(Vec<StatementShape>),
    /// Shape unknown: a boundary closes a row set only if rows were seen.
    Unknown,
}

impl ResultPlan {
    /// Derive a plan from SQL text.
    pub fn for_sql(sql: &str) -> Self {
        if is_procedure_call(sql) {
            return Self::Procedure;
        }

        let statements = match Parser::parse_sql(&MySqlDialect {}, sql) {
            Ok(statements) if !statements.is_empty() => statements,
            Ok(_) => return Self::Unknown,
            Err(e) => {
                debug!(error = %e, "SQL not parseable, result shapes will be inferred");
                return Self::Unknown;
            }
        };

        // A CALL inside a script can yield any number of row sets.
        if statements
            .iter()
            .any(|stmt| matches!(stmt, Statement::Call { .. }))
        {
            return Self::Unknown;
        }

        Self::Script(statements.iter().map(shape_of).collect())
    }
}

/// Classify a parsed statement by whether it returns rows.
fn shape_of(stmt: &Statement) -> StatementShape {
    match stmt {
        Statement::Query(query) if selects_into(query) => StatementShape::Write,
        Statement::Query(_) => StatementShape::Rows,
        Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowDatabases { .. }
        | Statement::ShowSchemas { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowVariables { .. }
        | Statement::ShowStatus { .. }
        | Statement::ShowCollation { .. }
        | Statement::ShowViews { .. }
        | Statement::ShowCharset(_)
        | Statement::ShowObjects(_)
        | Statement::Analyze(_)
        | Statement::OptimizeTable { .. }
        | Statement::ExplainTable { .. }
        | Statement::Explain { .. } => StatementShape::Rows,
        _ => StatementShape::Write,
    }
}

/// `SELECT ... INTO` stores its result instead of returning it.
fn selects_into(query: &Query) -> bool {
    matches!(query.body.as_ref(), SetExpr::Select(select) if select.into.is_some())
}
