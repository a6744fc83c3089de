//! Record delivery to a remote document store
//!
//! [`DeliveryClient`] turns records into [`Document`]s and writes them to a
//! [`DocumentStore`], retrying transport failures with exponential backoff.
//! Failures never escape the client: callers receive a boolean for single
//! deliveries and counts for batches.

pub mod backoff;
pub mod client;
pub mod document;
pub mod elastic;
pub mod target;

pub use backoff::{Backoff, RetryPolicy, TokioBackoff};
pub use client::{BatchOutcome, DeliveryClient};
pub use document::Document;
pub use elastic::ElasticStore;
pub use target::IndexTarget;

use crate::Result;

/// One document addressed to a target, as submitted in a bulk request
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOperation {
    pub target: String,
    pub document: Document,
}

/// A document the store refused inside an otherwise successful bulk call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkFailure {
    /// Position of the operation in the submitted batch
    pub position: usize,
    pub status: u16,
    pub reason: String,
}

/// Outcome of a bulk call that reached the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkResponse {
    pub succeeded: usize,
    pub failures: Vec<BulkFailure>,
}

/// Trait for document stores
///
/// Implementations report connectivity problems as
/// [`IndexerError::Transport`](crate::IndexerError::Transport) so the client
/// can retry them; any other error is final for the request.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Index one document into `target`
    async fn index(&self, target: &str, document: &Document) -> Result<()>;

    /// Submit many documents in one request.
    ///
    /// Returns:
    /// - `Ok(response)` - request accepted, with per-document outcomes
    /// - `Err(e)` - the request as a whole failed
    async fn bulk(&self, operations: &[BulkOperation]) -> Result<BulkResponse>;

    /// Check the store is reachable
    async fn ping(&self) -> Result<()>;
}
