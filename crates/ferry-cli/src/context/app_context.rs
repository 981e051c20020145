use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use ferry_client::HttpClientProvider;
use ferry_config::FerryConfig;
use ferry_db::store::FerryStore;
use ferry_engine::{EngineSettings, JobScheduler};

/// Shared application resources initialized once at startup.
pub struct AppContext {
    pub store: Arc<FerryStore>,
    pub config: FerryConfig,
}

impl AppContext {
    /// Open (creating if needed) the project database.
    pub async fn init(project_root: &Path, config: FerryConfig) -> anyhow::Result<Self> {
        let db_path = config.storage.db_path_in(project_root);
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create state directory {}", parent.display())
            })?;
        }

        let store = FerryStore::open_local(&db_path.to_string_lossy())
            .await
            .with_context(|| format!("failed to open ferry database at {}", db_path.display()))?;
        tracing::debug!(db = %db_path.display(), "ferry database opened");

        Ok(Self {
            store: Arc::new(store),
            config,
        })
    }

    /// Scheduler that records submissions, leaving runs queued for a worker.
    #[must_use]
    pub fn recording_scheduler(&self) -> JobScheduler {
        JobScheduler::submit_only(
            Arc::clone(&self.store),
            Arc::new(self.client_provider()),
            EngineSettings::from(&self.config),
        )
    }

    /// Scheduler that runs queued jobs in this process.
    #[must_use]
    pub fn dispatching_scheduler(&self) -> JobScheduler {
        JobScheduler::new(
            Arc::clone(&self.store),
            Arc::new(self.client_provider()),
            EngineSettings::from(&self.config),
        )
    }

    fn client_provider(&self) -> HttpClientProvider {
        HttpClientProvider::new(self.config.http.clone(), self.config.credentials.clone())
    }
}
