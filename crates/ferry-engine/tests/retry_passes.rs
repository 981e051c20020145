//! Retry passes: batch membership, attempt numbering, counter rebasing.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use ferry_client::memory::{MemoryEnvironment, MemoryProvider};
use ferry_client::{SourceRow, WriteError};
use ferry_core::entities::{Job, JobSpec};
use ferry_core::enums::{FailedStage, JobStatus, OutcomeStatus, RunKind};
use ferry_core::mapping::{ColumnMapping, MappingEntry};
use ferry_db::store::FerryStore;
use ferry_engine::{EngineError, EngineSettings, JobScheduler};

struct Setup {
    store: Arc<FerryStore>,
    scheduler: JobScheduler,
    source: Arc<MemoryEnvironment>,
    dest: Arc<MemoryEnvironment>,
    spec: JobSpec,
}

async fn setup(rows: Vec<SourceRow>) -> Setup {
    let store = Arc::new(FerryStore::open_local(":memory:").await.unwrap());
    let src = store
        .create_environment("Legacy CRM", "https://legacy.example.com", "migrator", true)
        .await
        .unwrap();
    let dest_env = store
        .create_environment("New CRM", "https://crm.example.com", "migrator", true)
        .await
        .unwrap();
    let source = Arc::new(MemoryEnvironment::new());
    source.seed_rows("contact", rows);
    let dest = Arc::new(MemoryEnvironment::new());
    let provider = MemoryProvider::new();
    provider.register(&src.id, Arc::clone(&source));
    provider.register(&dest_env.id, Arc::clone(&dest));

    let spec = JobSpec {
        name: Some("contacts".into()),
        source_environment_id: src.id,
        dest_environment_id: dest_env.id,
        source_entity: "contact".into(),
        dest_entity: "Contact".into(),
        mapping: ColumnMapping::new(vec![
            MappingEntry::copy("name", "Name"),
            MappingEntry::copy("email", "Email"),
        ]),
    };
    let scheduler = JobScheduler::new(Arc::clone(&store), Arc::new(provider), EngineSettings::default());
    Setup {
        store,
        scheduler,
        source,
        dest,
        spec,
    }
}

fn contacts(n: usize, keyed: bool) -> Vec<SourceRow> {
    (1..=n)
        .map(|i| SourceRow {
            key: keyed.then(|| format!("c-{i}")),
            fields: json!({ "name": format!("Contact {i}"), "email": format!("contact{i}@example.com") })
                .as_object()
                .cloned()
                .unwrap(),
        })
        .collect()
}

fn reject(dest: &MemoryEnvironment, i: usize) {
    dest.fail_writes_where(
        "Email",
        json!(format!("contact{i}@example.com")),
        WriteError::permanent("destination rejected row (422: invalid owner)"),
        None,
    );
}

impl Setup {
    async fn settle(&self) {
        tokio::time::timeout(Duration::from_secs(10), self.scheduler.wait_idle())
            .await
            .expect("scheduler did not go idle");
    }

    async fn job(&self, id: &str) -> Job {
        self.scheduler.get(id).await.unwrap()
    }

    async fn batch_keys(&self, id: &str) -> Vec<String> {
        let mut keys = self.store.get_retry_batch(id).await.unwrap().keys();
        keys.sort();
        keys
    }
}

#[tokio::test]
async fn retry_of_clean_job_is_rejected() {
    let s = setup(contacts(5, true)).await;
    let id = s.scheduler.submit(s.spec.clone()).await.unwrap();
    s.settle().await;
    assert_eq!(s.job(&id).await.status, JobStatus::Completed);

    let err = s.scheduler.retry_failed(&id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(msg) if msg.contains("no failed rows")));
    assert_eq!(s.store.list_runs(&id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn retry_of_unfinished_job_is_rejected() {
    let s = setup(contacts(100, true)).await;
    s.dest.set_write_delay(Duration::from_millis(2));
    let id = s.scheduler.submit(s.spec.clone()).await.unwrap();
    let err = s.scheduler.retry_failed(&id).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
    s.settle().await;
}

#[tokio::test]
async fn retry_pass_clears_fixed_rows() {
    let s = setup(contacts(20, true)).await;
    for i in [3, 9, 14] {
        reject(&s.dest, i);
    }
    let id = s.scheduler.submit(s.spec.clone()).await.unwrap();
    s.settle().await;
    assert_eq!(s.job(&id).await.status, JobStatus::CompletedWithErrors);
    assert_eq!(s.batch_keys(&id).await, vec!["c-14", "c-3", "c-9"]);

    s.dest.clear_write_rules();
    let run_id = s.scheduler.retry_failed(&id).await.unwrap();
    s.settle().await;

    let job = s.job(&id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.current_run_id.as_deref(), Some(run_id.as_str()));
    assert_eq!(job.total_rows, Some(20));
    assert_eq!(job.processed_rows, 20);
    assert_eq!(job.successful_rows, 20);
    assert_eq!(job.failed_row_count, 0);
    assert!(s.batch_keys(&id).await.is_empty());
    assert_eq!(s.dest.written("Contact").len(), 20);

    let run = s.store.get_run(&run_id).await.unwrap();
    assert_eq!(run.kind, RunKind::Retry);
    assert_eq!(run.scope_size, Some(3));
    assert_eq!(run.processed_rows, 3);

    let attempts: Vec<(u32, OutcomeStatus)> = s
        .store
        .outcomes_for_key(&id, "c-9")
        .await
        .unwrap()
        .into_iter()
        .map(|o| (o.attempt, o.status))
        .collect();
    assert_eq!(
        attempts,
        vec![(1, OutcomeStatus::Failed), (2, OutcomeStatus::Success)]
    );
}

#[tokio::test]
async fn retry_reads_only_batch_keys() {
    let s = setup(contacts(50, true)).await;
    reject(&s.dest, 7);
    let id = s.scheduler.submit(s.spec.clone()).await.unwrap();
    s.settle().await;
    let requests_before = s.source.page_requests().len();

    s.dest.clear_write_rules();
    s.scheduler.retry_failed(&id).await.unwrap();
    s.settle().await;

    let retry_requests = &s.source.page_requests()[requests_before..];
    assert_eq!(retry_requests.len(), 1);
    assert_eq!(retry_requests[0].key_filter, Some(vec!["c-7".to_string()]));
    assert_eq!(s.dest.write_attempts(), 51);
}

#[tokio::test]
async fn repeated_failure_bumps_attempt_and_stays_in_batch() {
    let s = setup(contacts(10, true)).await;
    reject(&s.dest, 4);
    reject(&s.dest, 6);
    let id = s.scheduler.submit(s.spec.clone()).await.unwrap();
    s.settle().await;

    // Fix one of the two; the other keeps failing.
    s.dest.clear_write_rules();
    reject(&s.dest, 6);
    s.scheduler.retry_failed(&id).await.unwrap();
    s.settle().await;

    let job = s.job(&id).await;
    assert_eq!(job.status, JobStatus::CompletedWithErrors);
    assert_eq!(job.total_rows, Some(10));
    assert_eq!(job.processed_rows, 10);
    assert_eq!(job.successful_rows, 9);
    assert_eq!(job.failed_row_count, 1);

    let batch = s.store.get_retry_batch(&id).await.unwrap();
    assert_eq!(batch.keys(), vec!["c-6"]);
    assert_eq!(batch.entries[0].attempt, 2);
    assert_eq!(batch.entries[0].failed_stage, FailedStage::Load);

    // And once more.
    s.scheduler.retry_failed(&id).await.unwrap();
    s.settle().await;
    let batch = s.store.get_retry_batch(&id).await.unwrap();
    assert_eq!(batch.entries[0].attempt, 3);
    assert_eq!(s.store.outcomes_for_key(&id, "c-6").await.unwrap().len(), 3);
}

#[tokio::test]
async fn transient_failures_exhaust_tries_then_retry_later() {
    let s = setup(contacts(5, true)).await;
    s.dest.fail_writes_where(
        "Email",
        json!("contact2@example.com"),
        WriteError::Transient {
            message: "server error (503)".into(),
            retry_after: Some(Duration::from_millis(1)),
        },
        Some(3),
    );
    let scheduler = JobScheduler::new(
        Arc::clone(&s.store),
        {
            let provider = MemoryProvider::new();
            provider.register(&s.spec.source_environment_id, Arc::clone(&s.source));
            provider.register(&s.spec.dest_environment_id, Arc::clone(&s.dest));
            Arc::new(provider)
        },
        EngineSettings {
            retry: ferry_config::RetryConfig {
                max_attempts: 3,
                base_delay_ms: 1,
                max_delay_ms: 5,
            },
            ..EngineSettings::default()
        },
    );

    let id = scheduler.submit(s.spec.clone()).await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), scheduler.wait_idle())
        .await
        .unwrap();
    let outcome = &s.store.outcomes_for_key(&id, "c-2").await.unwrap()[0];
    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert_eq!(outcome.load_tries, 3);
    assert!(outcome.error_message.as_deref().unwrap().contains("gave up after 3 tries"));

    // The rule is spent; the retry pass goes through on its first try.
    scheduler.retry_failed(&id).await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), scheduler.wait_idle())
        .await
        .unwrap();
    let job = scheduler.get(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let outcomes = s.store.outcomes_for_key(&id, "c-2").await.unwrap();
    assert_eq!(outcomes[1].load_tries, 1);
}

#[tokio::test]
async fn positional_keys_retry_by_full_scan() {
    let s = setup(contacts(6, false)).await;
    reject(&s.dest, 3);
    let id = s.scheduler.submit(s.spec.clone()).await.unwrap();
    s.settle().await;
    assert_eq!(s.batch_keys(&id).await, vec!["#3"]);

    s.dest.clear_write_rules();
    s.scheduler.retry_failed(&id).await.unwrap();
    s.settle().await;

    let job = s.job(&id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(s.dest.written("Contact").len(), 6);
    assert_eq!(s.dest.write_attempts(), 7);
}

#[tokio::test]
async fn cancelled_job_can_retry_its_failures() {
    let s = setup(contacts(200, true)).await;
    reject(&s.dest, 1);
    s.dest.set_write_delay(Duration::from_millis(2));
    let id = s.scheduler.submit(s.spec.clone()).await.unwrap();

    tokio::time::timeout(Duration::from_secs(10), async {
        while s.job(&id).await.failed_row_count == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();
    s.scheduler.cancel(&id).await.unwrap();
    s.settle().await;
    assert_eq!(s.job(&id).await.status, JobStatus::Cancelled);

    s.dest.clear_write_rules();
    s.dest.set_write_delay(Duration::ZERO);
    s.scheduler.retry_failed(&id).await.unwrap();
    s.settle().await;
    let job = s.job(&id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.failed_row_count, 0);
    assert!(s.batch_keys(&id).await.is_empty());
}

#[tokio::test]
async fn cancelled_retry_pass_keeps_unreached_rows_failed() {
    let s = setup(contacts(5, true)).await;
    for i in 1..=5 {
        reject(&s.dest, i);
    }
    let id = s.scheduler.submit(s.spec.clone()).await.unwrap();
    s.settle().await;
    assert_eq!(s.job(&id).await.failed_row_count, 5);

    // Four writes fit the default slots; the fifth row waits behind them.
    s.dest.clear_write_rules();
    s.dest.set_write_delay(Duration::from_millis(200));
    s.scheduler.retry_failed(&id).await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), async {
        while s.job(&id).await.status != JobStatus::Running {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    s.scheduler.cancel(&id).await.unwrap();
    s.settle().await;

    let job = s.job(&id).await;
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.total_rows, Some(5));
    assert_eq!(job.processed_rows, 5);
    assert_eq!(job.successful_rows + job.failed_row_count, 5);
    assert!(job.failed_row_count > 0);
    assert_eq!(s.batch_keys(&id).await.len() as u64, job.failed_row_count);

    let runs = s.store.list_runs(&id).await.unwrap();
    let retry = runs.iter().find(|run| run.kind == RunKind::Retry).unwrap();
    assert_eq!(retry.status, JobStatus::Cancelled);
    assert_eq!(retry.processed_rows, job.successful_rows);

    // The rows left behind are still retryable.
    s.dest.set_write_delay(Duration::ZERO);
    s.scheduler.retry_failed(&id).await.unwrap();
    s.settle().await;
    let job = s.job(&id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.failed_row_count, 0);
    assert!(s.batch_keys(&id).await.is_empty());
}
