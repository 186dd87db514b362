//! Stored-procedure call building.
//!
//! IN parameters become positional `?` placeholders bound in order; OUT
//! parameters become session variables (`@name`) written by the procedure and
//! read back with a follow-up `SELECT` on the same connection.

use crate::error::{DbError, DbResult};
use crate::models::{Row, SqlParameter, SqlValue};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};

/// SQL for one procedure invocation plus what is needed to read OUT values.
#[derive(Debug, Clone, PartialEq)]
pub struct CallStatement {
    /// `CALL proc(?, @out, ...);`
    pub sql: String,
    /// Values for the `?` placeholders, in order.
    pub in_values: Vec<SqlValue>,
    /// Session variables holding OUT values, `@`-prefixed, in declaration order.
    pub out_names: Vec<String>,
}

impl CallStatement {
    /// Build the CALL text for `procedure` with `parameters` in argument order.
    ///
    /// Each OUT variable stays at its declared position; OUT parameters are not
    /// moved after the IN placeholders. `parameters` must therefore follow the
    /// procedure's signature, e.g. `(IN a, OUT total, IN b)` becomes
    /// `CALL proc(?, @total, ?);`.
    pub fn build(procedure: &str, parameters: &[SqlParameter]) -> DbResult<Self> {
        validate_procedure_name(procedure)?;

        let mut args = Vec::with_capacity(parameters.len());
        let mut in_values = Vec::new();
        let mut out_names = Vec::new();
        let mut seen_out = HashSet::new();

        for param in parameters {
            if param.is_output() {
                validate_identifier(&param.name, "OUT parameter name")?;
                if !seen_out.insert(param.name.to_ascii_lowercase()) {
                    return Err(DbError::invalid_input(format!(
                        "OUT parameter '{}' is declared more than once",
                        param.name
                    )));
                }
                let variable = format!("@{}", param.name);
                args.push(variable.clone());
                out_names.push(variable);
            } else {
                args.push("?".to_string());
                in_values.push(param.bound_value());
            }
        }

        Ok(Self {
            sql: format!("CALL {}({});", procedure, args.join(", ")),
            in_values,
            out_names,
        })
    }

    pub fn has_outputs(&self) -> bool {
        !self.out_names.is_empty()
    }

    /// Statement reading the OUT session variables, if any were declared.
    pub fn output_select(&self) -> Option<String> {
        self.has_outputs()
            .then(|| format!("SELECT {};", self.out_names.join(", ")))
    }

    /// Map the row returned by [`Self::output_select`] to `name -> value`.
    ///
    /// Keys lose their `@` prefix. A variable missing from the row maps to null,
    /// so the result always has one entry per OUT parameter.
    pub fn collect_outputs(&self, row: Option<&Row>) -> HashMap<String, JsonValue> {
        self.out_names
            .iter()
            .map(|variable| {
                let value = row
                    .and_then(|r| r.get(variable.as_str()))
                    .cloned()
                    .unwrap_or(JsonValue::Null);
                (variable.trim_start_matches('@').to_string(), value)
            })
            .collect()
    }
}

/// Procedure names are interpolated into SQL, so only `name` or `schema.name`
/// made of identifier characters is accepted.
fn validate_procedure_name(procedure: &str) -> DbResult<()> {
    let parts: Vec<&str> = procedure.split('.').collect();
    if parts.len() > 2 {
        return Err(DbError::invalid_input(format!(
            "Invalid procedure name '{}': expected 'name' or 'schema.name'",
            procedure
        )));
    }
    parts
        .iter()
        .try_for_each(|part| validate_identifier(part, "procedure name"))
}

fn validate_identifier(name: &str, what: &str) -> DbResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if valid {
        Ok(())
    } else {
        Err(DbError::invalid_input(format!(
            "Invalid {} '{}': only letters, digits, '_' and '$' are allowed",
            what, name
        )))
    }
}
