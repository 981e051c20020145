//! Extract stage: page rows out of the source entity.
//!
//! A [`RowExtractor`] is a lazy, finite, one-shot sequence. Each call to
//! [`RowExtractor::next_batch`] issues at most the page reads needed to produce
//! the next non-empty batch; once the source is exhausted, or a page read has
//! failed, it only ever returns `None`.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use ferry_client::{EnvironmentClient, PageRequest};
use ferry_core::row::{RawRow, positional_key};

use crate::error::SequenceError;

/// Keys per paged request when reading a key-filtered scope.
pub const KEY_CHUNK_SIZE: usize = 100;

/// Which source rows a run reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyScope {
    /// The whole entity.
    All,
    /// Only these source row keys.
    Keys(Vec<String>),
}

/// One chunk of paged requests: a key filter (or none) and the next token.
#[derive(Debug)]
struct Cursor {
    filter: Option<Vec<String>>,
    next_token: Option<String>,
}

pub struct RowExtractor {
    client: Arc<dyn EnvironmentClient>,
    entity: String,
    page_size: u32,
    pending: VecDeque<Cursor>,
    /// Client-side filter; `None` reads everything.
    allowed: Option<HashSet<String>>,
    seen: HashSet<String>,
    ordinal: u64,
    pages_read: u64,
    first_total: Option<u64>,
    finished: bool,
}

impl RowExtractor {
    #[must_use]
    pub fn new(
        client: Arc<dyn EnvironmentClient>,
        entity: &str,
        scope: KeyScope,
        page_size: u32,
    ) -> Self {
        let (pending, allowed) = match scope {
            KeyScope::All => (
                VecDeque::from([Cursor {
                    filter: None,
                    next_token: None,
                }]),
                None,
            ),
            // Positional keys are only stable over a full scan, so a scope
            // holding any of them reads everything and filters locally.
            KeyScope::Keys(keys) if keys.iter().any(|k| k.starts_with('#')) => {
                tracing::debug!(entity, keys = keys.len(), "scope has positional keys, scanning entity");
                (
                    VecDeque::from([Cursor {
                        filter: None,
                        next_token: None,
                    }]),
                    Some(keys.into_iter().collect()),
                )
            }
            KeyScope::Keys(keys) => {
                let pending = keys
                    .chunks(KEY_CHUNK_SIZE)
                    .map(|chunk| Cursor {
                        filter: Some(chunk.to_vec()),
                        next_token: None,
                    })
                    .collect();
                (pending, Some(keys.into_iter().collect()))
            }
        };

        Self {
            client,
            entity: entity.to_string(),
            page_size,
            pending,
            allowed,
            seen: HashSet::new(),
            ordinal: 0,
            pages_read: 0,
            first_total: None,
            finished: false,
        }
    }

    /// Total row count reported with the first page, if any.
    #[must_use]
    pub const fn reported_total(&self) -> Option<u64> {
        self.first_total
    }

    #[must_use]
    pub const fn pages_read(&self) -> u64 {
        self.pages_read
    }

    /// Next non-empty batch of rows, or `None` once the sequence is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError`] if a page cannot be read. The sequence is
    /// finished afterwards.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<RawRow>>, SequenceError> {
        while !self.finished {
            let Some(cursor) = self.pending.front() else {
                self.finished = true;
                break;
            };
            let request = PageRequest {
                page_token: cursor.next_token.as_deref(),
                key_filter: cursor.filter.as_deref(),
                page_size: self.page_size,
            };
            let result = self.client.page_entity_rows(&self.entity, request).await;
            self.pages_read += 1;
            let page = match result {
                Ok(page) => page,
                Err(source) => {
                    self.finished = true;
                    return Err(SequenceError {
                        entity: self.entity.clone(),
                        page: self.pages_read,
                        source,
                    });
                }
            };
            tracing::debug!(
                entity = %self.entity,
                page = self.pages_read,
                rows = page.rows.len(),
                "page read"
            );
            if self.pages_read == 1 {
                self.first_total = page.total_count;
            }

            match page.next_page_token {
                Some(token) => {
                    if let Some(cursor) = self.pending.front_mut() {
                        cursor.next_token = Some(token);
                    }
                }
                None => {
                    self.pending.pop_front();
                }
            }

            let mut batch = Vec::with_capacity(page.rows.len());
            for row in page.rows {
                self.ordinal += 1;
                let key = row.key.unwrap_or_else(|| positional_key(self.ordinal));
                if let Some(allowed) = &self.allowed {
                    if !allowed.contains(&key) || !self.seen.insert(key.clone()) {
                        continue;
                    }
                }
                batch.push(RawRow {
                    key,
                    fields: row.fields,
                });
            }
            if !batch.is_empty() {
                return Ok(Some(batch));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_client::SourceRow;
    use ferry_client::memory::{MemoryEnvironment, TotalReport};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn rows(n: usize, keyed: bool) -> Vec<SourceRow> {
        (1..=n)
            .map(|i| SourceRow {
                key: keyed.then(|| format!("c-{i}")),
                fields: json!({ "n": i }).as_object().cloned().unwrap(),
            })
            .collect()
    }

    async fn drain(extractor: &mut RowExtractor) -> Vec<String> {
        let mut keys = Vec::new();
        while let Some(batch) = extractor.next_batch().await.unwrap() {
            keys.extend(batch.into_iter().map(|row| row.key));
        }
        keys
    }

    #[tokio::test]
    async fn pages_through_entity_and_reports_first_total() {
        let env = Arc::new(MemoryEnvironment::new());
        env.seed_rows("contact", rows(25, true));
        let mut extractor = RowExtractor::new(env.clone(), "contact", KeyScope::All, 10);

        let keys = drain(&mut extractor).await;
        assert_eq!(keys.len(), 25);
        assert_eq!(keys[0], "c-1");
        assert_eq!(extractor.reported_total(), Some(25));
        assert_eq!(extractor.pages_read(), 3);

        // One-shot: exhausted sequences do not restart.
        assert!(extractor.next_batch().await.unwrap().is_none());
        assert_eq!(env.page_requests().len(), 3);
    }

    #[tokio::test]
    async fn unknown_total_stays_unknown() {
        let env = Arc::new(MemoryEnvironment::new());
        env.seed_rows("contact", rows(3, true));
        env.report_total(TotalReport::Unknown);
        let mut extractor = RowExtractor::new(env, "contact", KeyScope::All, 10);
        drain(&mut extractor).await;
        assert_eq!(extractor.reported_total(), None);
    }

    #[tokio::test]
    async fn rows_without_keys_get_positional_keys() {
        let env = Arc::new(MemoryEnvironment::new());
        env.seed_rows("contact", rows(3, false));
        let mut extractor = RowExtractor::new(env, "contact", KeyScope::All, 2);
        assert_eq!(drain(&mut extractor).await, vec!["#1", "#2", "#3"]);
    }

    #[tokio::test]
    async fn key_scope_is_chunked_and_enforced() {
        let env = Arc::new(MemoryEnvironment::new());
        env.seed_rows("contact", rows(300, true));
        let wanted: Vec<String> = (1..=150).map(|i| format!("c-{}", i * 2)).collect();
        let mut extractor =
            RowExtractor::new(env.clone(), "contact", KeyScope::Keys(wanted.clone()), 100);

        let keys = drain(&mut extractor).await;
        assert_eq!(keys, wanted);
        let requests = env.page_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].key_filter.as_ref().map(Vec::len), Some(100));
        assert_eq!(requests[1].key_filter.as_ref().map(Vec::len), Some(50));
    }

    #[tokio::test]
    async fn positional_scope_scans_and_filters_locally() {
        let env = Arc::new(MemoryEnvironment::new());
        env.seed_rows("contact", rows(5, false));
        let scope = KeyScope::Keys(vec!["#2".into(), "#5".into()]);
        let mut extractor = RowExtractor::new(env.clone(), "contact", scope, 10);
        assert_eq!(drain(&mut extractor).await, vec!["#2", "#5"]);
        assert_eq!(env.page_requests()[0].key_filter, None);
    }

    #[tokio::test]
    async fn empty_scope_reads_nothing() {
        let env = Arc::new(MemoryEnvironment::new());
        env.seed_rows("contact", rows(5, true));
        let mut extractor = RowExtractor::new(env.clone(), "contact", KeyScope::Keys(vec![]), 10);
        assert!(extractor.next_batch().await.unwrap().is_none());
        assert!(env.page_requests().is_empty());
    }

    #[tokio::test]
    async fn page_failure_ends_the_sequence() {
        let env = Arc::new(MemoryEnvironment::new());
        env.seed_rows("contact", rows(30, true));
        env.fail_page_request(2, "source unavailable");
        let mut extractor = RowExtractor::new(env, "contact", KeyScope::All, 10);

        assert_eq!(extractor.next_batch().await.unwrap().map(|b| b.len()), Some(10));
        let err = extractor.next_batch().await.unwrap_err();
        assert_eq!(err.page, 2);
        assert!(err.to_string().contains("source unavailable"));
        assert!(extractor.next_batch().await.unwrap().is_none());
    }
}
