//! REST implementation of [`EnvironmentClient`].
//!
//! Wire contract, relative to the environment's base URL:
//! - `GET  /api/entities/{entity}/fields` → `{"fields": [{"name", "type"}]}`
//! - `GET  /api/entities/{entity}/rows?page_size=N[&page_token=T][&keys=a,b]`
//!   → `{"rows": [{"key"?, "fields"}], "next_page_token"?, "total_count"?}`
//! - `POST /api/entities/{entity}/rows` with the row fields as the JSON body
//!
//! Requests authenticate with HTTP basic auth.

use std::sync::Arc;

use async_trait::async_trait;
use ferry_config::{CredentialsConfig, HttpConfig};
use ferry_core::entities::Environment;
use ferry_core::row::RowFields;

use crate::error::{ClientError, WriteError};
use crate::http::{check_response, classify_write_response, classify_write_transport};
use crate::{ClientProvider, EntityField, EnvironmentClient, Page, PageRequest};

#[derive(serde::Deserialize)]
struct FieldsResponse {
    fields: Vec<EntityField>,
}

pub struct HttpEnvironmentClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl HttpEnvironmentClient {
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the underlying `reqwest::Client` fails to build.
    pub fn new(
        environment: &Environment,
        password: &str,
        config: &HttpConfig,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            http,
            base_url: environment.base_url.trim_end_matches('/').to_string(),
            username: environment.username.clone(),
            password: password.to_string(),
        })
    }

    fn entity_url(&self, entity: &str, tail: &str) -> String {
        format!(
            "{}/api/entities/{}/{tail}",
            self.base_url,
            urlencoding::encode(entity)
        )
    }
}

/// Build the query string of a paged read.
fn rows_query(request: &PageRequest<'_>) -> String {
    let mut query = format!("page_size={}", request.page_size);
    if let Some(token) = request.page_token {
        query.push_str("&page_token=");
        query.push_str(&urlencoding::encode(token));
    }
    if let Some(keys) = request.key_filter {
        let joined = keys
            .iter()
            .map(|k| urlencoding::encode(k).into_owned())
            .collect::<Vec<_>>()
            .join(",");
        query.push_str("&keys=");
        query.push_str(&joined);
    }
    query
}

#[async_trait]
impl EnvironmentClient for HttpEnvironmentClient {
    async fn list_entity_fields(&self, entity: &str) -> Result<Vec<EntityField>, ClientError> {
        let url = self.entity_url(entity, "fields");
        let resp = check_response(
            self.http
                .get(&url)
                .basic_auth(&self.username, Some(&self.password))
                .send()
                .await?,
        )
        .await?;
        let data: FieldsResponse = resp
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("fields of '{entity}': {e}")))?;
        Ok(data.fields)
    }

    async fn page_entity_rows(
        &self,
        entity: &str,
        request: PageRequest<'_>,
    ) -> Result<Page, ClientError> {
        let url = format!("{}?{}", self.entity_url(entity, "rows"), rows_query(&request));
        tracing::debug!(entity, page_token = ?request.page_token, "fetching page");
        let resp = check_response(
            self.http
                .get(&url)
                .basic_auth(&self.username, Some(&self.password))
                .send()
                .await?,
        )
        .await?;
        resp.json()
            .await
            .map_err(|e| ClientError::Parse(format!("rows of '{entity}': {e}")))
    }

    async fn write_entity_row(&self, entity: &str, row: &RowFields) -> Result<(), WriteError> {
        let url = self.entity_url(entity, "rows");
        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(row)
            .send()
            .await
            .map_err(|e| classify_write_transport(&e))?;
        classify_write_response(resp).await
    }
}

/// Builds [`HttpEnvironmentClient`]s using secrets from configuration.
pub struct HttpClientProvider {
    http: HttpConfig,
    credentials: CredentialsConfig,
}

impl HttpClientProvider {
    #[must_use]
    pub const fn new(http: HttpConfig, credentials: CredentialsConfig) -> Self {
        Self { http, credentials }
    }
}

impl ClientProvider for HttpClientProvider {
    fn client_for(&self, environment: &Environment) -> Result<Arc<dyn EnvironmentClient>, ClientError> {
        let password = self.credentials.password_for(&environment.id).ok_or_else(|| {
            ClientError::MissingCredentials {
                environment_id: environment.id.clone(),
            }
        })?;
        if !environment.password_configured {
            tracing::warn!(
                environment_id = %environment.id,
                "environment is not flagged as password-configured; using configured secret anyway"
            );
        }
        Ok(Arc::new(HttpEnvironmentClient::new(environment, password, &self.http)?))
    }
}
