//! In-process environments.
//!
//! [`MemoryEnvironment`] holds entities as plain row lists and can be scripted
//! to fail writes, fail a page read, misreport totals, or slow down, which
//! makes pipeline and scheduler behavior reproducible without a network.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use ferry_core::entities::Environment;
use ferry_core::row::RowFields;
use serde_json::Value;

use crate::error::{ClientError, WriteError};
use crate::{ClientProvider, EntityField, EnvironmentClient, Page, PageRequest, SourceRow};

/// What a source reports as `total_count` on each page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TotalReport {
    /// The number of rows matching the request.
    #[default]
    Actual,
    /// Nothing.
    Unknown,
    /// A fixed, possibly wrong, number.
    Fixed(u64),
}

/// A page read as observed by the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedPageRequest {
    pub entity: String,
    pub page_token: Option<String>,
    pub key_filter: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
struct WriteRule {
    field: String,
    value: Value,
    error: WriteError,
    remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct EntityData {
    fields: Vec<EntityField>,
    rows: Vec<SourceRow>,
    written: Vec<RowFields>,
}

#[derive(Debug, Default)]
struct State {
    entities: HashMap<String, EntityData>,
    write_rules: Vec<WriteRule>,
    failing_page_request: Option<(usize, String)>,
    total_report: TotalReport,
    page_delay: Duration,
    write_delay: Duration,
    page_requests: Vec<RecordedPageRequest>,
    write_attempts: usize,
    in_flight: usize,
    max_in_flight: usize,
}

#[derive(Debug, Default)]
pub struct MemoryEnvironment {
    state: Mutex<State>,
}

impl MemoryEnvironment {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the rows of `entity`. Field descriptions are derived from the
    /// first row.
    pub fn seed_rows(&self, entity: &str, rows: Vec<SourceRow>) {
        let fields = rows
            .first()
            .map(|row| {
                row.fields
                    .iter()
                    .map(|(name, value)| EntityField {
                        name: name.clone(),
                        field_type: json_type(value).to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        let mut state = self.state();
        let data = state.entities.entry(entity.to_string()).or_default();
        data.rows = rows;
        data.fields = fields;
    }

    /// Fail every write whose `field` equals `value` with `error`.
    ///
    /// With `times`, the rule fails that many writes and then lets them through.
    pub fn fail_writes_where(&self, field: &str, value: Value, error: WriteError, times: Option<u32>) {
        self.state().write_rules.push(WriteRule {
            field: field.to_string(),
            value,
            error,
            remaining: times,
        });
    }

    /// Remove all write rules.
    pub fn clear_write_rules(&self) {
        self.state().write_rules.clear();
    }

    /// Fail the `nth` page read (1-based, counted across entities).
    pub fn fail_page_request(&self, nth: usize, message: &str) {
        self.state().failing_page_request = Some((nth, message.to_string()));
    }

    pub fn report_total(&self, report: TotalReport) {
        self.state().total_report = report;
    }

    pub fn set_page_delay(&self, delay: Duration) {
        self.state().page_delay = delay;
    }

    pub fn set_write_delay(&self, delay: Duration) {
        self.state().write_delay = delay;
    }

    /// Rows successfully written to `entity`, in completion order.
    #[must_use]
    pub fn written(&self, entity: &str) -> Vec<RowFields> {
        self.state()
            .entities
            .get(entity)
            .map(|data| data.written.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn page_requests(&self) -> Vec<RecordedPageRequest> {
        self.state().page_requests.clone()
    }

    /// Write calls received, successful or not.
    #[must_use]
    pub fn write_attempts(&self) -> usize {
        self.state().write_attempts
    }

    /// Highest number of writes observed in flight at once.
    #[must_use]
    pub fn max_concurrent_writes(&self) -> usize {
        self.state().max_in_flight
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl EnvironmentClient for MemoryEnvironment {
    async fn list_entity_fields(&self, entity: &str) -> Result<Vec<EntityField>, ClientError> {
        let state = self.state();
        state
            .entities
            .get(entity)
            .map(|data| data.fields.clone())
            .ok_or_else(|| ClientError::Api {
                status: 404,
                message: format!("unknown entity '{entity}'"),
            })
    }

    async fn page_entity_rows(
        &self,
        entity: &str,
        request: PageRequest<'_>,
    ) -> Result<Page, ClientError> {
        let delay = self.state().page_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        state.page_requests.push(RecordedPageRequest {
            entity: entity.to_string(),
            page_token: request.page_token.map(String::from),
            key_filter: request.key_filter.map(<[String]>::to_vec),
        });
        if let Some((nth, message)) = &state.failing_page_request {
            if state.page_requests.len() == *nth {
                return Err(ClientError::Api {
                    status: 503,
                    message: message.clone(),
                });
            }
        }

        let total_report = state.total_report;
        let data = state.entities.get(entity).ok_or_else(|| ClientError::Api {
            status: 404,
            message: format!("unknown entity '{entity}'"),
        })?;
        let matching: Vec<&SourceRow> = data
            .rows
            .iter()
            .filter(|row| match request.key_filter {
                Some(keys) => row.key.as_ref().is_some_and(|k| keys.contains(k)),
                None => true,
            })
            .collect();

        let offset = match request.page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| ClientError::Parse(format!("bad page token '{token}'")))?,
            None => 0,
        };
        let page_size = usize::try_from(request.page_size).unwrap_or(usize::MAX).max(1);
        let end = offset.saturating_add(page_size).min(matching.len());
        let rows = matching
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|row| (*row).clone())
            .collect();
        let next_page_token = (end < matching.len()).then(|| end.to_string());
        let total_count = match total_report {
            TotalReport::Actual => Some(matching.len() as u64),
            TotalReport::Unknown => None,
            TotalReport::Fixed(n) => Some(n),
        };

        Ok(Page {
            rows,
            next_page_token,
            total_count,
        })
    }

    async fn write_entity_row(&self, entity: &str, row: &RowFields) -> Result<(), WriteError> {
        let delay = {
            let mut state = self.state();
            state.write_attempts += 1;
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            state.write_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        state.in_flight -= 1;
        let failure = state.write_rules.iter_mut().find_map(|rule| {
            if row.get(&rule.field) != Some(&rule.value) {
                return None;
            }
            match rule.remaining.as_mut() {
                Some(0) => None,
                Some(n) => {
                    *n -= 1;
                    Some(rule.error.clone())
                }
                None => Some(rule.error.clone()),
            }
        });
        if let Some(err) = failure {
            return Err(err);
        }
        state
            .entities
            .entry(entity.to_string())
            .or_default()
            .written
            .push(row.clone());
        Ok(())
    }
}

/// [`ClientProvider`] over registered in-memory environments.
#[derive(Default)]
pub struct MemoryProvider {
    environments: Mutex<HashMap<String, Arc<MemoryEnvironment>>>,
}

impl MemoryProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `client` for the environment with id `environment_id`.
    pub fn register(&self, environment_id: &str, client: Arc<MemoryEnvironment>) {
        self.environments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(environment_id.to_string(), client);
    }
}

impl ClientProvider for MemoryProvider {
    fn client_for(&self, environment: &Environment) -> Result<Arc<dyn EnvironmentClient>, ClientError> {
        self.environments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&environment.id)
            .map(|client| Arc::clone(client) as Arc<dyn EnvironmentClient>)
            .ok_or_else(|| ClientError::Unavailable {
                environment_id: environment.id.clone(),
                reason: "no in-memory environment registered".into(),
            })
    }
}
