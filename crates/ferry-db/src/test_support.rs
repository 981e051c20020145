//! Shared test utilities for ferry-db unit tests.

use ferry_core::entities::{Environment, Job, JobRun, JobSpec};
use ferry_core::mapping::{ColumnMapping, MappingEntry};

use crate::store::FerryStore;

/// In-memory store.
pub async fn test_store() -> FerryStore {
    FerryStore::open_local(":memory:").await.unwrap()
}

/// Create two environments named "Source" and "Dest".
pub async fn seed_environments(store: &FerryStore) -> (Environment, Environment) {
    let src = store
        .create_environment("Source", "https://src.example.com", "migrator", true)
        .await
        .unwrap();
    let dest = store
        .create_environment("Dest", "https://dest.example.com", "migrator", false)
        .await
        .unwrap();
    (src, dest)
}

pub fn sample_spec(src: &Environment, dest: &Environment) -> JobSpec {
    JobSpec {
        name: None,
        source_environment_id: src.id.clone(),
        dest_environment_id: dest.id.clone(),
        source_entity: "contact".into(),
        dest_entity: "Contact".into(),
        mapping: ColumnMapping::new(vec![
            MappingEntry::copy("name", "Name"),
            MappingEntry::copy("email", "Email"),
        ]),
    }
}

/// Seed environments and create one queued job.
pub async fn seed_job(store: &FerryStore) -> (Job, JobRun) {
    let (src, dest) = seed_environments(store).await;
    let spec = sample_spec(&src, &dest);
    store.create_job(&spec, &spec.display_name()).await.unwrap()
}
