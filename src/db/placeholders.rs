//! Placeholder rewriting for MySQL SQL text.
//!
//! Ad-hoc SQL uses `:name` placeholders bound from a [`QueryParams`] map. The
//! server only understands positional `?`, so named placeholders are rewritten
//! to `?` with an ordered value list. The multi-statement path goes through the
//! text protocol, which has no bind step, so there `?` slots are replaced by
//! rendered literals instead.
//!
//! Quoted strings, backtick identifiers and comments are skipped.

use crate::error::{DbError, DbResult};
use crate::models::{QueryParams, SqlValue};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    Backtick,
    LineComment,
    BlockComment,
}

/// A placeholder found in normal SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placeholder<'a> {
    Positional,
    Named(&'a str),
}

/// SQL rewritten to positional placeholders, with values in bind order.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionalSql {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// Rewrite `:name` placeholders to `?`, collecting values in order.
///
/// A name missing from `params` binds NULL. A name used twice is bound twice.
/// Positional `?` placeholders are rejected because they have no name to look up.
pub fn expand_named(sql: &str, params: &QueryParams) -> DbResult<PositionalSql> {
    let mut values = Vec::new();
    let rewritten = rewrite(sql, |placeholder| match placeholder {
        Placeholder::Named(name) => {
            let value = match params.get(name) {
                Some(value) => value.clone(),
                None => {
                    warn!(placeholder = %name, "No value supplied for placeholder, binding NULL");
                    SqlValue::Null
                }
            };
            values.push(value);
            Ok(Some("?".to_string()))
        }
        Placeholder::Positional => Err(DbError::invalid_input(
            "Positional '?' placeholders are not supported here; use ':name' placeholders",
        )),
    })?;

    Ok(PositionalSql {
        sql: rewritten,
        values,
    })
}

/// Replace each positional `?` with the literal rendered for the matching value.
pub fn inline_positional(
    sql: &str,
    values: &[SqlValue],
    render: impl Fn(&SqlValue) -> String,
) -> DbResult<String> {
    let mut next = 0usize;
    let rewritten = rewrite(sql, |placeholder| match placeholder {
        Placeholder::Positional => {
            let value = values.get(next).ok_or_else(|| {
                DbError::invalid_input(format!(
                    "SQL has more '?' placeholders than the {} values supplied",
                    values.len()
                ))
            })?;
            next += 1;
            Ok(Some(render(value)))
        }
        Placeholder::Named(_) => Ok(None),
    })?;

    if next != values.len() {
        return Err(DbError::invalid_input(format!(
            "{} values supplied but SQL has {} '?' placeholders",
            values.len(),
            next
        )));
    }
    Ok(rewritten)
}

/// Walk `sql`, letting `replace` substitute placeholders found outside literals.
///
/// `replace` returns `Some(text)` to substitute or `None` to keep the original.
fn rewrite<'a>(
    sql: &'a str,
    mut replace: impl FnMut(Placeholder<'a>) -> DbResult<Option<String>>,
) -> DbResult<String> {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut copied = 0usize;
    let mut state = State::Normal;
    let mut idx = 0usize;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b'`' => state = State::Backtick,
                b'#' => state = State::LineComment,
                b'-' if is_line_comment_start(bytes, idx) => state = State::LineComment,
                b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                    state = State::BlockComment;
                    idx += 1;
                }
                b'?' => {
                    if let Some(text) = replace(Placeholder::Positional)? {
                        out.push_str(&sql[copied..idx]);
                        out.push_str(&text);
                        copied = idx + 1;
                    }
                }
                b':' => {
                    if let Some(end) = named_placeholder_end(bytes, idx) {
                        let name = &sql[idx + 1..end];
                        if let Some(text) = replace(Placeholder::Named(name))? {
                            out.push_str(&sql[copied..idx]);
                            out.push_str(&text);
                            copied = end;
                        }
                        idx = end;
                        continue;
                    }
                }
                _ => {}
            },
            State::SingleQuoted | State::DoubleQuoted => {
                let quote = if state == State::SingleQuoted {
                    b'\''
                } else {
                    b'"'
                };
                if b == b'\\' {
                    idx += 1; // skip escaped character
                } else if b == quote {
                    if bytes.get(idx + 1) == Some(&quote) {
                        idx += 1; // skip doubled quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::Backtick => {
                if b == b'`' {
                    if bytes.get(idx + 1) == Some(&b'`') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment => {
                if b == b'*' && bytes.get(idx + 1) == Some(&b'/') {
                    state = State::Normal;
                    idx += 1;
                }
            }
        }
        idx += 1;
    }

    out.push_str(&sql[copied.min(sql.len())..]);
    Ok(out)
}

/// MySQL only treats `--` as a comment when followed by whitespace.
fn is_line_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx + 1) == Some(&b'-')
        && bytes
            .get(idx + 2)
            .is_none_or(|c| c.is_ascii_whitespace())
}

/// End index (exclusive) of a `:name` placeholder starting at `idx`.
///
/// `::` casts and `:=` assignments are not placeholders.
fn named_placeholder_end(bytes: &[u8], idx: usize) -> Option<usize> {
    if idx > 0 && bytes[idx - 1] == b':' {
        return None;
    }
    let first = *bytes.get(idx + 1)?;
    if !(first.is_ascii_alphabetic() || first == b'_') {
        return None;
    }
    let mut end = idx + 2;
    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
        end += 1;
    }
    Some(end)
}
