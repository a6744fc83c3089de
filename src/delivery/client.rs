//! Delivery client with bounded retries

use std::future::Future;
use tracing::{debug, error, info, warn};

use super::backoff::{Backoff, RetryPolicy, TokioBackoff};
use super::document::Document;
use super::elastic::ElasticStore;
use super::target::IndexTarget;
use super::{BulkOperation, DocumentStore};
use crate::config::ElasticConfig;
use crate::types::Record;
use crate::{IndexerError, Result};

/// Per-batch delivery counts.
///
/// `success_count + fail_count` always equals the number of records passed
/// to [`DeliveryClient::deliver_batch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub success_count: usize,
    pub fail_count: usize,
}

/// Writes records to a document store, absorbing every failure.
///
/// Transport failures are retried up to `max_attempts` in total, waiting
/// `base_delay * 2^attempt` between attempts. Validation failures and store
/// rejections are final on the first attempt.
pub struct DeliveryClient<S = ElasticStore, B = TokioBackoff> {
    store: S,
    target: IndexTarget,
    policy: RetryPolicy,
    backoff: B,
}

impl DeliveryClient<ElasticStore, TokioBackoff> {
    /// Build an Elasticsearch client and check the cluster answers.
    ///
    /// An error here means the store is unreachable; callers run without
    /// delivery in that case.
    pub async fn connect(config: &ElasticConfig) -> Result<Self> {
        let store = ElasticStore::from_config(config)?;
        store.ping().await?;
        info!("Connected to Elasticsearch at {}", store.base_url());

        Ok(Self::new(store, config.target(), config.retry_policy(), TokioBackoff))
    }
}

impl<S: DocumentStore, B: Backoff> DeliveryClient<S, B> {
    pub fn new(store: S, target: IndexTarget, policy: RetryPolicy, backoff: B) -> Self {
        Self { store, target, policy, backoff }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn target(&self) -> &IndexTarget {
        &self.target
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Deliver one record, returning whether the store accepted it
    pub async fn deliver(&self, record: &Record) -> bool {
        let document = match Document::from_record(record) {
            Ok(document) => document,
            Err(e) => {
                error!("Dropping packet {}: {}", record.sequence_number(), e);
                return false;
            }
        };

        let target = self.target.resolve();
        match self.with_retry("index", || self.store.index(&target, &document)).await {
            Ok(()) => {
                debug!("Indexed packet {} into {}", record.sequence_number(), target);
                true
            }
            Err(e) => {
                error!("Failed to index packet {}: {}", record.sequence_number(), e);
                false
            }
        }
    }

    /// Deliver records in one bulk request.
    ///
    /// Records without a usable timestamp are counted as failed and left out
    /// of the request. A request that fails as a whole is retried as a whole;
    /// documents the store rejects inside an accepted request are counted
    /// individually and not retried.
    pub async fn deliver_batch(&self, records: &[Record]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        if records.is_empty() {
            return outcome;
        }

        let target = self.target.resolve();
        let mut operations = Vec::with_capacity(records.len());
        for record in records {
            match Document::from_record(record) {
                Ok(document) => operations.push(BulkOperation { target: target.clone(), document }),
                Err(e) => {
                    error!("Dropping packet {}: {}", record.sequence_number(), e);
                    outcome.fail_count += 1;
                }
            }
        }

        if operations.is_empty() {
            return outcome;
        }

        match self.with_retry("bulk", || self.store.bulk(&operations)).await {
            Ok(response) => {
                let succeeded = response.succeeded.min(operations.len());
                let failed = operations.len() - succeeded;
                if failed > 0 {
                    warn!("{}", IndexerError::PartialBatch { succeeded, failed });
                    for failure in &response.failures {
                        debug!(
                            "Bulk item {} rejected with status {}: {}",
                            failure.position, failure.status, failure.reason
                        );
                    }
                }
                outcome.success_count += succeeded;
                outcome.fail_count += failed;
            }
            Err(e) => {
                error!("Bulk delivery of {} documents failed: {}", operations.len(), e);
                outcome.fail_count += operations.len();
            }
        }

        outcome
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut attempt_once: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match attempt_once().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < self.policy.max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        "{} attempt {}/{} failed: {}; retrying in {:?}",
                        operation,
                        attempt + 1,
                        self.policy.max_attempts,
                        e,
                        delay
                    );
                    self.backoff.wait(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
