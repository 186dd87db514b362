//! Result classification.
//!
//! Two steps turn what the server sends back into a [`ResultEnvelope`]:
//!
//! 1. [`PayloadAssembler`] groups a driver's event stream (rows, then a
//!    statement boundary carrying the OK/EOF counters) into tagged
//!    [`StatementResult`]s. The protocol ends *every* statement with such a
//!    boundary, including row-returning ones, so a [`ResultPlan`] decides what
//!    each boundary means.
//! 2. [`classify`] folds the tagged results into data sets and the last write
//!    summary.

use crate::db::statement::{ResultPlan, StatementShape};
use crate::models::{
    ColumnMetadata, RawPayload, ResultEnvelope, Row, RowSet, StatementResult, WriteSummary,
};

/// Rows and counters seen up to one statement boundary.
#[derive(Debug)]
struct Boundary {
    rows: RowSet,
    summary: WriteSummary,
}

/// Builds a [`RawPayload`] from a stream of driver events.
#[derive(Debug)]
pub struct PayloadAssembler {
    plan: ResultPlan,
    pending: RowSet,
    boundaries: Vec<Boundary>,
}

impl PayloadAssembler {
    pub fn new(plan: ResultPlan) -> Self {
        Self {
            plan,
            pending: RowSet::default(),
            boundaries: Vec::new(),
        }
    }

    /// Record a row of the current statement.
    ///
    /// `columns` is only evaluated for the first row of a statement.
    pub fn push_row(&mut self, row: Row, columns: impl FnOnce() -> Vec<ColumnMetadata>) {
        if self.pending.rows.is_empty() {
            self.pending.columns = columns();
        }
        self.pending.rows.push(row);
    }

    /// Record the end of the current statement.
    pub fn end_statement(&mut self, summary: WriteSummary) {
        let rows = std::mem::take(&mut self.pending);
        self.boundaries.push(Boundary { rows, summary });
    }

    /// Resolve every boundary against the plan.
    pub fn finish(mut self) -> RawPayload {
        let mut results = Vec::with_capacity(self.boundaries.len() + 1);
        let last = self.boundaries.len().saturating_sub(1);

        for (idx, boundary) in self.boundaries.into_iter().enumerate() {
            let expects_rows = match &self.plan {
                // Only the trailing OK packet of a CALL is a write outcome.
                ResultPlan::Procedure => idx < last,
                ResultPlan::Script(shapes) => match shapes.get(idx) {
                    Some(shape) => *shape == StatementShape::Rows,
                    None => !boundary.rows.is_empty(),
                },
                ResultPlan::Unknown => !boundary.rows.is_empty(),
            };

            // A boundary that carried rows closes a result set, whatever the
            // plan said; its counters are not a write outcome.
            if expects_rows || !boundary.rows.is_empty() {
                results.push(StatementResult::Rows(boundary.rows));
            } else {
                results.push(StatementResult::WriteAck(boundary.summary));
            }
        }

        // Rows after the final boundary: stream ended without a terminator.
        if !self.pending.rows.is_empty() {
            results.push(StatementResult::Rows(std::mem::take(&mut self.pending)));
        }

        RawPayload::new(results)
    }
}

/// Split a payload into ordered data sets and the most recent write summary.
///
/// An empty payload is one empty table. Earlier write summaries in the same
/// payload are overwritten by later ones.
pub fn classify(payload: RawPayload) -> ResultEnvelope {
    let mut envelope = ResultEnvelope::default();

    if payload.is_empty() {
        envelope.data_sets.push(Vec::new());
        envelope.columns.push(Vec::new());
        return envelope;
    }

    for result in payload.results {
        match result {
            StatementResult::Rows(set) => {
                envelope.columns.push(set.columns);
                envelope.data_sets.push(set.rows);
            }
            StatementResult::WriteAck(summary) => {
                envelope.last_write_summary = Some(summary);
            }
        }
    }

    envelope
}
