//! Column mapping files.
//!
//! JSON files hold either the entry array itself or `{"mapping": [...]}`; TOML
//! files hold `[[mapping]]` tables:
//!
//! ```toml
//! [[mapping]]
//! source_field = "full_name"
//! dest_field = "Name"
//! transform = { kind = "truncate", params = { max_chars = 80 } }
//! ```

use std::path::Path;

use anyhow::Context;
use ferry_core::mapping::ColumnMapping;
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonMappingFile {
    Bare(ColumnMapping),
    Wrapped { mapping: ColumnMapping },
}

#[derive(Deserialize)]
struct TomlMappingFile {
    mapping: ColumnMapping,
}

/// Read and parse a mapping file. Validation is left to submission.
pub fn load_mapping(path: &Path) -> anyhow::Result<ColumnMapping> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read mapping file {}", path.display()))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    parse_mapping(&contents, is_toml)
        .with_context(|| format!("invalid mapping file {}", path.display()))
}

fn parse_mapping(contents: &str, is_toml: bool) -> anyhow::Result<ColumnMapping> {
    if is_toml {
        let file: TomlMappingFile = toml::from_str(contents)?;
        return Ok(file.mapping);
    }
    let file: JsonMappingFile = serde_json::from_str(contents)?;
    Ok(match file {
        JsonMappingFile::Bare(mapping) | JsonMappingFile::Wrapped { mapping } => mapping,
    })
}
