//! # ferry-client
//!
//! Access to CRM environments.
//!
//! The engine talks to environments only through the [`EnvironmentClient`]
//! trait, obtained per environment from a [`ClientProvider`]. Two
//! implementations ship here:
//! - [`HttpEnvironmentClient`]: the platform's REST API over reqwest
//! - [`memory::MemoryEnvironment`]: in-process, scriptable, deterministic

mod error;
mod http;
mod http_client;
pub mod memory;

pub use error::{ClientError, WriteError};
pub use http_client::{HttpClientProvider, HttpEnvironmentClient};

use std::sync::Arc;

use async_trait::async_trait;
use ferry_core::entities::Environment;
use ferry_core::row::RowFields;
use serde::{Deserialize, Serialize};

// ── Types ──────────────────────────────────────────────────────────

/// One column of an entity, as described by the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityField {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
}

/// A row as returned by the source, before key assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRow {
    /// Natural key, when the entity has one.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub fields: RowFields,
}

/// One page of rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub rows: Vec<SourceRow>,
    #[serde(default)]
    pub next_page_token: Option<String>,
    /// Total rows matching the request, if the environment reports it.
    #[serde(default)]
    pub total_count: Option<u64>,
}

/// Parameters of one paged read.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    pub page_token: Option<&'a str>,
    /// Restrict the read to these source row keys.
    pub key_filter: Option<&'a [String]>,
    pub page_size: u32,
}

// ── Seams ──────────────────────────────────────────────────────────

/// Read and write access to one environment.
#[async_trait]
pub trait EnvironmentClient: Send + Sync {
    /// Describe the fields of `entity`.
    async fn list_entity_fields(&self, entity: &str) -> Result<Vec<EntityField>, ClientError>;

    /// Fetch one page of rows of `entity`.
    async fn page_entity_rows(
        &self,
        entity: &str,
        request: PageRequest<'_>,
    ) -> Result<Page, ClientError>;

    /// Create one row in `entity`.
    async fn write_entity_row(&self, entity: &str, row: &RowFields) -> Result<(), WriteError>;
}

/// Builds an [`EnvironmentClient`] for a stored environment record.
pub trait ClientProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ClientError`] if the environment cannot be reached with the
    /// available configuration (e.g. no credentials).
    fn client_for(&self, environment: &Environment) -> Result<Arc<dyn EnvironmentClient>, ClientError>;
}
