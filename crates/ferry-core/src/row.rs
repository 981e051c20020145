//! Row shapes exchanged between pipeline stages.
//!
//! Rows are JSON objects keyed by field name. Every row carries the source row
//! key it was extracted under, so outcomes and retry batches can refer back to it.

use serde::{Deserialize, Serialize};

/// Field name → value object for one row.
pub type RowFields = serde_json::Map<String, serde_json::Value>;

/// A row as read from the source entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    /// Natural key reported by the source, or a positional `#<ordinal>` key.
    pub key: String,
    pub fields: RowFields,
}

/// A row shaped for the destination entity by a column mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformedRow {
    /// Source row key carried through from the matching [`RawRow`].
    pub key: String,
    pub fields: RowFields,
}

/// Build the positional key used when a source row has no natural key.
#[must_use]
pub fn positional_key(ordinal: u64) -> String {
    format!("#{ordinal}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_keys_are_one_based_ordinals() {
        assert_eq!(positional_key(1), "#1");
        assert_eq!(positional_key(250), "#250");
    }
}
