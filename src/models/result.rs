//! Result data models.
//!
//! A driver reports each executed statement as a [`StatementResult`]; the
//! classifier folds the ordered list of them into a [`ResultEnvelope`].

use crate::error::{DbError, DbResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// A single row keyed by column name.
pub type Row = serde_json::Map<String, JsonValue>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    /// Database-specific type (e.g., "INT", "VARCHAR", "JSON")
    pub type_name: String,
    pub nullable: bool,
}

impl ColumnMetadata {
    /// Create new column metadata.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            nullable,
        }
    }
}

/// Rows produced by one statement, with the columns that describe them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<Row>,
}

impl RowSet {
    /// Build a row set from rows alone, deriving column names from the first row.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let columns = rows
            .first()
            .map(|row| {
                row.keys()
                    .map(|name| ColumnMetadata::new(name.as_str(), "", true))
                    .collect()
            })
            .unwrap_or_default();
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Outcome of a write statement (the server's OK packet).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteSummary {
    pub affected_rows: u64,
    pub insert_id: u64,
    /// Always 0 for an OK packet.
    pub field_count: u64,
    /// Not every driver surfaces the fields below.
    pub info: Option<String>,
    pub server_status: Option<u16>,
    pub warning_status: Option<u16>,
}

impl WriteSummary {
    pub fn new(affected_rows: u64, insert_id: u64) -> Self {
        Self {
            affected_rows,
            insert_id,
            ..Self::default()
        }
    }
}

/// What one statement produced, tagged by the driver adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementResult {
    Rows(RowSet),
    WriteAck(WriteSummary),
}

/// Everything a driver returned for one SQL request, in execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPayload {
    pub results: Vec<StatementResult>,
}

impl RawPayload {
    pub fn new(results: Vec<StatementResult>) -> Self {
        Self { results }
    }

    /// A payload holding a single row set.
    pub fn rows(rows: Vec<Row>) -> Self {
        Self::new(vec![StatementResult::Rows(RowSet::from_rows(rows))])
    }

    /// A payload holding a single write acknowledgement.
    pub fn write(summary: WriteSummary) -> Self {
        Self::new(vec![StatementResult::WriteAck(summary)])
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Normalized result of one `call`, `query` or `exists` execution.
///
/// `data_sets` keeps statement execution order. `last_write_summary` holds only
/// the most recent write acknowledgement; earlier ones from the same script are
/// dropped. `output_parameters` is filled only by procedure calls with OUT
/// parameters and is keyed without the `@` prefix.
///
/// Binary-typed values (`BINARY`, `VARBINARY`, `BLOB`, and user variables or
/// expressions the server reports as binary strings) are returned as text when
/// they hold valid UTF-8 and as base64 otherwise. Callers storing arbitrary
/// bytes should encode them themselves (e.g. `HEX()`) to get one stable form.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    pub data_sets: Vec<Vec<Row>>,
    /// Column metadata for each entry of `data_sets`.
    pub columns: Vec<Vec<ColumnMetadata>>,
    pub last_write_summary: Option<WriteSummary>,
    pub output_parameters: HashMap<String, JsonValue>,
}

impl ResultEnvelope {
    /// Raw value of an output parameter. Accepts `name` or `@name`.
    pub fn output(&self, name: &str) -> Option<&JsonValue> {
        self.output_parameters.get(name.trim_start_matches('@'))
    }

    /// Output parameter converted to `T`.
    pub fn output_as<T: DeserializeOwned>(&self, name: &str) -> DbResult<T> {
        let value = self.require_output(name)?;
        serde_json::from_value(value.clone()).map_err(|e| {
            DbError::decode(format!("Output parameter '{}' has unexpected shape: {}", name, e))
        })
    }

    /// Output parameter holding a JSON document, parsed into `T`.
    ///
    /// Procedures usually hand back JSON as text; a value that is already
    /// structured is converted directly.
    pub fn output_json<T: DeserializeOwned>(&self, name: &str) -> DbResult<T> {
        let value = self.require_output(name)?;
        let parsed = match value {
            JsonValue::String(text) => serde_json::from_str(text),
            other => serde_json::from_value(other.clone()),
        };
        parsed.map_err(|e| {
            DbError::decode(format!("Output parameter '{}' is not valid JSON: {}", name, e))
        })
    }

    fn require_output(&self, name: &str) -> DbResult<&JsonValue> {
        self.output(name).ok_or_else(|| {
            DbError::invalid_input(format!("Output parameter '{}' was not declared", name))
        })
    }

    /// Rows of the statement at `index`.
    pub fn data_set(&self, index: usize) -> Option<&[Row]> {
        self.data_sets.get(index).map(Vec::as_slice)
    }

    /// The flat table: rows of the first statement, empty when none.
    pub fn rows(&self) -> &[Row] {
        self.data_set(0).unwrap_or(&[])
    }

    /// Rows of the statement at `index` converted to `T`.
    pub fn data_as<T: DeserializeOwned>(&self, index: usize) -> DbResult<Vec<T>> {
        let rows = self.data_set(index).ok_or_else(|| {
            DbError::invalid_input(format!(
                "No data set at index {} (result has {})",
                index,
                self.data_sets.len()
            ))
        })?;
        rows.iter()
            .map(|row| {
                serde_json::from_value(JsonValue::Object(row.clone()))
                    .map_err(|e| DbError::decode(format!("Row in data set {}: {}", index, e)))
            })
            .collect()
    }

    pub fn affected_rows(&self) -> Option<u64> {
        self.last_write_summary.as_ref().map(|s| s.affected_rows)
    }

    pub fn last_insert_id(&self) -> Option<u64> {
        self.last_write_summary.as_ref().map(|s| s.insert_id)
    }
}
