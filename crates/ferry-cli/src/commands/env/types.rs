use ferry_config::CredentialsConfig;
use ferry_core::entities::Environment;
use ferry_db::error::DatabaseError;
use serde::Serialize;

/// An environment plus whether this machine holds its secret.
#[derive(Debug, Serialize)]
pub struct EnvironmentView {
    #[serde(flatten)]
    pub environment: Environment,
    pub credentials_available: bool,
}

impl EnvironmentView {
    pub fn new(environment: Environment, credentials: &CredentialsConfig) -> Self {
        let credentials_available = credentials.password_for(&environment.id).is_some();
        Self {
            environment,
            credentials_available,
        }
    }
}

pub fn lookup_error(id: &str) -> impl FnOnce(DatabaseError) -> anyhow::Error {
    let id = id.to_string();
    move |error| match error {
        DatabaseError::NoResult => anyhow::anyhow!("environment not found: {id}"),
        other => anyhow::Error::new(other).context(format!("failed to load environment {id}")),
    }
}
