//! ID prefix constants.
//!
//! IDs are generated by the database as `{prefix}-{8 hex chars}`, e.g. `job-3fa9c01b`.

pub const PREFIX_ENVIRONMENT: &str = "env";
pub const PREFIX_JOB: &str = "job";
pub const PREFIX_RUN: &str = "run";
pub const PREFIX_OUTCOME: &str = "out";

/// Every prefix in use, for exhaustive tests.
pub const ALL_PREFIXES: &[&str] = &[PREFIX_ENVIRONMENT, PREFIX_JOB, PREFIX_RUN, PREFIX_OUTCOME];

/// Check whether `id` looks like an ID with the given prefix.
#[must_use]
pub fn has_prefix(id: &str, prefix: &str) -> bool {
    id.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|hex| !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()))
}
