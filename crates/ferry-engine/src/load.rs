//! Load stage: write one transformed row to the destination.
//!
//! Transient failures are retried in-process with capped exponential backoff;
//! permanent failures return immediately. Either way the row ends up in the
//! job's retry batch.

use std::sync::Arc;
use std::time::Duration;

use ferry_client::{EnvironmentClient, WriteError};
use ferry_config::RetryConfig;
use ferry_core::row::TransformedRow;
use tokio_util::sync::CancellationToken;

use crate::error::LoadError;

/// Writes rows to one destination entity.
#[derive(Clone)]
pub struct RowLoader {
    client: Arc<dyn EnvironmentClient>,
    entity: String,
    retry: RetryConfig,
}

impl RowLoader {
    #[must_use]
    pub fn new(client: Arc<dyn EnvironmentClient>, entity: &str, retry: RetryConfig) -> Self {
        Self {
            client,
            entity: entity.to_string(),
            retry,
        }
    }

    /// Delay before try `next_try` (2-based), honoring a server hint.
    fn backoff(&self, next_try: u32, hint: Option<Duration>) -> Duration {
        let exp = next_try.saturating_sub(2).min(31);
        let delay = self.retry.base_delay().saturating_mul(1_u32 << exp);
        delay.max(hint.unwrap_or_default()).min(self.retry.max_delay())
    }

    /// Write `row`, retrying transient failures up to the try ceiling.
    ///
    /// Returns the number of tries used. A cancel observed while backing off
    /// gives up with the last transient failure.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] when the row could not be written.
    pub async fn write(&self, row: &TransformedRow, cancel: &CancellationToken) -> Result<u32, LoadError> {
        let max_tries = self.retry.max_attempts.max(1);
        let mut tries = 0;
        loop {
            tries += 1;
            let err = match self.client.write_entity_row(&self.entity, &row.fields).await {
                Ok(()) => return Ok(tries),
                Err(err) => err,
            };
            if !err.is_transient() || tries >= max_tries {
                return Err(LoadError::from_write(err, tries));
            }
            let hint = match &err {
                WriteError::Transient { retry_after, .. } => *retry_after,
                WriteError::Permanent { .. } => None,
            };

            let delay = self.backoff(tries + 1, hint);
            tracing::warn!(
                row_key = %row.key,
                try_number = tries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "transient write failure, backing off"
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(LoadError::from_write(err, tries)),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_client::memory::MemoryEnvironment;
    use ferry_core::row::RowFields;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn row(email: &str) -> TransformedRow {
        let mut fields = RowFields::new();
        fields.insert("Email".into(), json!(email));
        TransformedRow {
            key: "c-1".into(),
            fields,
        }
    }

    fn loader(env: &Arc<MemoryEnvironment>) -> RowLoader {
        RowLoader::new(env.clone(), "Contact", RetryConfig::default())
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let env = Arc::new(MemoryEnvironment::new());
        let loader = loader(&env);
        assert_eq!(loader.backoff(2, None), Duration::from_millis(200));
        assert_eq!(loader.backoff(3, None), Duration::from_millis(400));
        assert_eq!(loader.backoff(10, None), Duration::from_secs(5));
        assert_eq!(loader.backoff(2, Some(Duration::from_secs(2))), Duration::from_secs(2));
        assert_eq!(loader.backoff(2, Some(Duration::from_secs(60))), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_retried_until_it_clears() {
        let env = Arc::new(MemoryEnvironment::new());
        env.fail_writes_where("Email", json!("a@x.io"), WriteError::transient("server error (503)"), Some(2));
        let tries = loader(&env)
            .write(&row("a@x.io"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(tries, 3);
        assert_eq!(env.written("Contact").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_gives_up_at_ceiling() {
        let env = Arc::new(MemoryEnvironment::new());
        env.fail_writes_where("Email", json!("a@x.io"), WriteError::transient("timeout"), None);
        let err = loader(&env)
            .write(&row("a@x.io"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LoadError::Transient {
                message: "timeout".into(),
                tries: 3
            }
        );
        assert_eq!(env.write_attempts(), 3);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let env = Arc::new(MemoryEnvironment::new());
        env.fail_writes_where(
            "Email",
            json!("bad"),
            WriteError::permanent("destination rejected row (422: invalid email)"),
            None,
        );
        let err = loader(&env)
            .write(&row("bad"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.tries(), 1);
        assert_eq!(env.write_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_stops_retrying() {
        let env = Arc::new(MemoryEnvironment::new());
        env.fail_writes_where("Email", json!("a@x.io"), WriteError::transient("timeout"), None);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = loader(&env).write(&row("a@x.io"), &cancel).await.unwrap_err();
        assert_eq!(err.tries(), 1);
    }
}
