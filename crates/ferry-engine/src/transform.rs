//! Transform stage: reshape a source row for the destination entity.
//!
//! Pure: the output depends only on the row and the mapping. Entries are
//! applied in mapping order and the first failing entry names the row's error.

use std::fmt::Write as _;

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Number, Value};

use ferry_core::mapping::{ColumnMapping, MappingEntry, TransformKind};
use ferry_core::row::{RawRow, RowFields, TransformedRow};

use crate::error::TransformError;

/// Applies a job's column mapping to raw rows.
#[derive(Debug, Clone)]
pub struct RowTransformer {
    mapping: ColumnMapping,
}

impl RowTransformer {
    #[must_use]
    pub const fn new(mapping: ColumnMapping) -> Self {
        Self { mapping }
    }

    /// Shape `row` for the destination.
    ///
    /// Source fields missing from the row read as `null`.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError`] for the first entry whose transform cannot be
    /// applied to the row's value.
    pub fn transform(&self, row: &RawRow) -> Result<TransformedRow, TransformError> {
        let mut fields = RowFields::new();
        for entry in self.mapping.entries() {
            let source = row.fields.get(&entry.source_field).unwrap_or(&Value::Null);
            let value = apply(&entry.transform, source).map_err(|reason| TransformError {
                dest_field: entry.dest_field.clone(),
                source_field: entry.source_field.clone(),
                reason,
            })?;
            fields.insert(entry.dest_field.clone(), value);
        }
        Ok(TransformedRow {
            key: row.key.clone(),
            fields,
        })
    }

    /// Source fields the mapping reads.
    pub fn source_fields(&self) -> impl Iterator<Item = &str> {
        self.mapping
            .entries()
            .iter()
            .filter(|entry| !entry.transform.ignores_source())
            .map(|entry: &MappingEntry| entry.source_field.as_str())
    }
}

fn apply(kind: &TransformKind, value: &Value) -> Result<Value, String> {
    match kind {
        TransformKind::Constant { value: constant } => return Ok(constant.clone()),
        TransformKind::DefaultValue { value: default } => {
            return Ok(if is_blank(value) {
                default.clone()
            } else {
                value.clone()
            });
        }
        _ => {}
    }
    if value.is_null() {
        return Ok(Value::Null);
    }

    match kind {
        TransformKind::Copy => Ok(value.clone()),
        TransformKind::Trim => with_str(value, |s| s.trim().to_string()),
        TransformKind::Uppercase => with_str(value, str::to_uppercase),
        TransformKind::Lowercase => with_str(value, str::to_lowercase),
        TransformKind::Prefix { value: prefix } => {
            Ok(Value::String(format!("{prefix}{}", scalar_text(value)?)))
        }
        TransformKind::Suffix { value: suffix } => {
            Ok(Value::String(format!("{}{suffix}", scalar_text(value)?)))
        }
        TransformKind::Replace { from, to } => with_str(value, |s| s.replace(from.as_str(), to)),
        TransformKind::Truncate { max_chars } => {
            with_str(value, |s| s.chars().take(*max_chars).collect())
        }
        TransformKind::ToString => to_string(value),
        TransformKind::ToNumber => to_number(value),
        TransformKind::ToBoolean => to_boolean(value),
        TransformKind::DateFormat { from, to } => date_format(value, from, to),
        TransformKind::ValueMap { entries, fallback } => {
            let lookup = scalar_text(value)?;
            entries
                .get(&lookup)
                .or(fallback.as_ref())
                .cloned()
                .ok_or_else(|| format!("no value_map entry for '{lookup}'"))
        }
        TransformKind::Constant { .. } | TransformKind::DefaultValue { .. } => Ok(value.clone()),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn with_str(value: &Value, f: impl FnOnce(&str) -> String) -> Result<Value, String> {
    match value {
        Value::String(s) => Ok(Value::String(f(s))),
        other => Err(format!("expected string, found {}", type_name(other))),
    }
}

/// Text form of a string, number, or boolean.
fn scalar_text(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("expected a scalar value, found {}", type_name(other))),
    }
}

fn to_string(value: &Value) -> Result<Value, String> {
    scalar_text(value).map(Value::String)
}

fn to_number(value: &Value) -> Result<Value, String> {
    match value {
        Value::Number(_) => Ok(value.clone()),
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(int) = trimmed.parse::<i64>() {
                return Ok(Value::Number(int.into()));
            }
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("'{s}' is not a number"))
        }
        other => Err(format!("expected string or number, found {}", type_name(other))),
    }
}

fn to_boolean(value: &Value) -> Result<Value, String> {
    match value {
        Value::Bool(_) => Ok(value.clone()),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(Value::Bool(false)),
            Some(1) => Ok(Value::Bool(true)),
            _ => Err(format!("{n} is not a boolean (expected 0 or 1)")),
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Ok(Value::Bool(true)),
            "false" | "no" | "n" | "0" => Ok(Value::Bool(false)),
            _ => Err(format!("'{s}' is not a boolean")),
        },
        other => Err(format!("expected string, number or boolean, found {}", type_name(other))),
    }
}

fn date_format(value: &Value, from: &str, to: &str) -> Result<Value, String> {
    let Value::String(s) = value else {
        return Err(format!("expected string, found {}", type_name(value)));
    };
    let mut out = String::new();
    let written = if let Ok(dt) = NaiveDateTime::parse_from_str(s, from) {
        write!(out, "{}", dt.format(to))
    } else if let Ok(date) = NaiveDate::parse_from_str(s, from) {
        write!(out, "{}", date.format(to))
    } else {
        return Err(format!("'{s}' does not match date format '{from}'"));
    };
    written.map_err(|_| format!("cannot render '{s}' with date format '{to}'"))?;
    Ok(Value::String(out))
}
