use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One configured instance of the CRM platform, usable as source or destination.
///
/// Immutable once created except for `password_configured`. The secret itself
/// is never stored here.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Environment {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub username: String,
    pub password_configured: bool,
    pub created_at: DateTime<Utc>,
}
