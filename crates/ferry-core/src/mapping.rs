//! Column mappings.
//!
//! A mapping is an ordered list of `source_field → dest_field` entries, each with
//! one transform drawn from a closed set of named, parameterized kinds. Keeping
//! the set closed keeps the transform stage pure and deterministic.
//!
//! JSON shape of one entry:
//!
//! ```json
//! { "source_field": "full_name", "dest_field": "Name",
//!   "transform": { "kind": "truncate", "params": { "max_chars": 80 } } }
//! ```

use std::collections::{BTreeMap, HashMap};

use chrono::format::{Item, StrftimeItems};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::CoreError;

/// Named transform applied to one source value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "params", rename_all = "snake_case")]
pub enum TransformKind {
    /// Pass the value through unchanged.
    #[default]
    Copy,
    /// Strip leading and trailing whitespace from a string.
    Trim,
    Uppercase,
    Lowercase,
    /// Ignore the source value and always write `value`.
    Constant { value: Value },
    /// Write `value` when the source is null, missing, or an empty string.
    DefaultValue { value: Value },
    Prefix { value: String },
    Suffix { value: String },
    /// Replace every occurrence of `from` with `to`.
    Replace { from: String, to: String },
    /// Keep at most `max_chars` characters.
    Truncate { max_chars: usize },
    /// Render numbers and booleans as strings.
    ToString,
    /// Parse strings as numbers.
    ToNumber,
    /// Parse `true/false/yes/no/1/0` strings and 0/1 numbers as booleans.
    ToBoolean,
    /// Re-format a date string from one chrono format to another.
    DateFormat { from: String, to: String },
    /// Look the stringified value up in `entries`; unmatched values use
    /// `fallback`, or fail when no fallback is given.
    ValueMap {
        entries: BTreeMap<String, Value>,
        #[serde(default)]
        fallback: Option<Value>,
    },
}

impl TransformKind {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Trim => "trim",
            Self::Uppercase => "uppercase",
            Self::Lowercase => "lowercase",
            Self::Constant { .. } => "constant",
            Self::DefaultValue { .. } => "default_value",
            Self::Prefix { .. } => "prefix",
            Self::Suffix { .. } => "suffix",
            Self::Replace { .. } => "replace",
            Self::Truncate { .. } => "truncate",
            Self::ToString => "to_string",
            Self::ToNumber => "to_number",
            Self::ToBoolean => "to_boolean",
            Self::DateFormat { .. } => "date_format",
            Self::ValueMap { .. } => "value_map",
        }
    }

    /// Whether the transform produces a value without reading the source field.
    #[must_use]
    pub const fn ignores_source(&self) -> bool {
        matches!(self, Self::Constant { .. })
    }

    /// Reject parameters that could never succeed.
    fn validate_params(&self) -> Result<(), String> {
        match self {
            Self::Truncate { max_chars: 0 } => Err("truncate max_chars must be at least 1".into()),
            Self::Replace { from, .. } if from.is_empty() => {
                Err("replace 'from' must not be empty".into())
            }
            Self::DateFormat { from, to } if from.trim().is_empty() || to.trim().is_empty() => {
                Err("date_format 'from' and 'to' must not be empty".into())
            }
            Self::DateFormat { from, to } if !is_valid_format(from) || !is_valid_format(to) => {
                Err("date_format contains an unknown format specifier".into())
            }
            Self::ValueMap { entries, .. } if entries.is_empty() => {
                Err("value_map must have at least one entry".into())
            }
            _ => Ok(()),
        }
    }
}

fn is_valid_format(fmt: &str) -> bool {
    !StrftimeItems::new(fmt).any(|item| matches!(item, Item::Error))
}

/// One column of a mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MappingEntry {
    pub source_field: String,
    pub dest_field: String,
    #[serde(default)]
    pub transform: TransformKind,
}

impl MappingEntry {
    #[must_use]
    pub fn copy(source_field: &str, dest_field: &str) -> Self {
        Self {
            source_field: source_field.to_string(),
            dest_field: dest_field.to_string(),
            transform: TransformKind::Copy,
        }
    }

    #[must_use]
    pub fn with_transform(source_field: &str, dest_field: &str, transform: TransformKind) -> Self {
        Self {
            source_field: source_field.to_string(),
            dest_field: dest_field.to_string(),
            transform,
        }
    }
}

/// Ordered column mapping. Immutable for the lifetime of a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ColumnMapping(Vec<MappingEntry>);

impl ColumnMapping {
    #[must_use]
    pub const fn new(entries: Vec<MappingEntry>) -> Self {
        Self(entries)
    }

    #[must_use]
    pub fn entries(&self) -> &[MappingEntry] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Validate the mapping for submission.
    ///
    /// Requires at least one entry, non-blank field names, unique destination
    /// fields, and satisfiable transform parameters.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` naming the first offending entry.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.0.is_empty() {
            return Err(CoreError::Validation(
                "mapping must contain at least one entry".into(),
            ));
        }

        let mut seen: HashMap<&str, usize> = HashMap::with_capacity(self.0.len());
        for (idx, entry) in self.0.iter().enumerate() {
            let position = idx + 1;
            if entry.dest_field.trim().is_empty() {
                return Err(CoreError::Validation(format!(
                    "mapping entry {position}: dest_field must not be blank"
                )));
            }
            if entry.source_field.trim().is_empty() && !entry.transform.ignores_source() {
                return Err(CoreError::Validation(format!(
                    "mapping entry {position} ('{}'): source_field must not be blank",
                    entry.dest_field
                )));
            }
            if let Some(first) = seen.insert(entry.dest_field.as_str(), position) {
                return Err(CoreError::Validation(format!(
                    "duplicate destination field '{}' (entries {first} and {position})",
                    entry.dest_field
                )));
            }
            entry.transform.validate_params().map_err(|reason| {
                CoreError::Validation(format!(
                    "mapping entry {position} ('{}'): {reason}",
                    entry.dest_field
                ))
            })?;
        }
        Ok(())
    }
}

impl From<Vec<MappingEntry>> for ColumnMapping {
    fn from(entries: Vec<MappingEntry>) -> Self {
        Self(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn empty_mapping_is_rejected() {
        let err = ColumnMapping::default().validate().unwrap_err();
        assert!(matches!(err, CoreError::Validation(msg) if msg.contains("at least one")));
    }

    #[test]
    fn duplicate_destination_is_rejected() {
        let mapping = ColumnMapping::new(vec![
            MappingEntry::copy("first_name", "Name"),
            MappingEntry::copy("last_name", "Name"),
        ]);
        let err = mapping.validate().unwrap_err();
        assert_eq!(
            err,
            CoreError::Validation("duplicate destination field 'Name' (entries 1 and 2)".into())
        );
    }

    #[test]
    fn same_source_to_two_destinations_is_allowed() {
        let mapping = ColumnMapping::new(vec![
            MappingEntry::copy("email", "Email"),
            MappingEntry::with_transform("email", "EmailLower", TransformKind::Lowercase),
        ]);
        assert!(mapping.validate().is_ok());
    }

    #[test]
    fn blank_source_allowed_only_for_constant() {
        let constant = ColumnMapping::new(vec![MappingEntry::with_transform(
            "",
            "Origin",
            TransformKind::Constant {
                value: json!("legacy"),
            },
        )]);
        assert!(constant.validate().is_ok());

        let copy = ColumnMapping::new(vec![MappingEntry::copy(" ", "Origin")]);
        assert!(copy.validate().is_err());
    }

    #[test]
    fn unsatisfiable_params_are_rejected() {
        let mapping = ColumnMapping::new(vec![MappingEntry::with_transform(
            "bio",
            "Bio",
            TransformKind::Truncate { max_chars: 0 },
        )]);
        let err = mapping.validate().unwrap_err();
        assert!(matches!(err, CoreError::Validation(msg) if msg.contains("max_chars")));
    }

    #[test]
    fn bad_date_format_specifier_is_rejected() {
        let mapping = ColumnMapping::new(vec![MappingEntry::with_transform(
            "joined",
            "JoinedOn",
            TransformKind::DateFormat {
                from: "%Y-%m-%d".into(),
                to: "%Q".into(),
            },
        )]);
        assert!(mapping.validate().is_err());
    }

    #[test]
    fn transform_defaults_to_copy_when_omitted() {
        let mapping: ColumnMapping =
            serde_json::from_value(json!([{ "source_field": "a", "dest_field": "A" }])).unwrap();
        assert_eq!(mapping.entries()[0].transform, TransformKind::Copy);
    }

    #[test]
    fn tagged_transform_json_shape() {
        let entry = MappingEntry::with_transform(
            "full_name",
            "Name",
            TransformKind::Truncate { max_chars: 80 },
        );
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            value,
            json!({
                "source_field": "full_name",
                "dest_field": "Name",
                "transform": { "kind": "truncate", "params": { "max_chars": 80 } }
            })
        );
    }

    #[test]
    fn unit_kinds_parse_without_params() {
        let kind: TransformKind = serde_json::from_value(json!({ "kind": "uppercase" })).unwrap();
        assert_eq!(kind, TransformKind::Uppercase);
        assert_eq!(kind.name(), "uppercase");
    }
}
