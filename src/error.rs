//! Error types for capture decoding and record delivery.
//!
//! Every fallible operation in the crate returns [`IndexerError`]. The variants
//! follow the failure scopes of the pipeline:
//!
//! - **Source errors** ([`IndexerError::SourceUnavailable`]) abort the whole run
//! - **Frame errors** ([`IndexerError::FrameDecode`]) skip a single frame
//! - **Record errors** ([`IndexerError::Validation`]) drop a single record
//! - **Store errors** ([`IndexerError::Transport`], [`IndexerError::Rejected`],
//!   [`IndexerError::UnreadableResponse`], [`IndexerError::PartialBatch`]) are
//!   absorbed by the delivery client
//! - **Setup errors** ([`IndexerError::Config`], [`IndexerError::MetricsServer`])
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use pcap_indexer::IndexerError;
//!
//! let error = IndexerError::transport("connection refused");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for indexer operations.
pub type Result<T, E = IndexerError> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for indexer operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum IndexerError {
    #[error("Capture source unavailable: {path}: {reason}")]
    SourceUnavailable {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Failed to decode frame: {details}")]
    FrameDecode { details: String },

    #[error("Record validation failed for '{field}': {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("Store transport error: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Store rejected request with status {status}: {reason}")]
    Rejected { status: u16, reason: String },

    /// The store answered with a success status but the body could not be
    /// read or parsed. The request may have been applied, so it is never
    /// retried.
    #[error("Store answered status {status} with an unreadable body: {reason}")]
    UnreadableResponse {
        status: u16,
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Bulk request partially failed: {succeeded} succeeded, {failed} failed")]
    PartialBatch { succeeded: usize, failed: usize },

    #[error("Invalid configuration value for {key}: {details}")]
    Config { key: String, details: String },

    #[error("Metrics server error on {addr}")]
    MetricsServer {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

impl IndexerError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            IndexerError::Transport { .. } => true,
            IndexerError::SourceUnavailable { .. } => false,
            IndexerError::FrameDecode { .. } => false,
            IndexerError::Validation { .. } => false,
            IndexerError::Rejected { .. } => false,
            IndexerError::UnreadableResponse { .. } => false,
            IndexerError::PartialBatch { .. } => false,
            IndexerError::Config { .. } => false,
            IndexerError::MetricsServer { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            IndexerError::SourceUnavailable { .. } => vec![
                "Check the capture file exists and is readable",
                "Verify the file is a pcap or pcapng capture",
                "Re-export the capture if the container is truncated",
            ],
            IndexerError::FrameDecode { .. } => vec![
                "Inspect the frame with a packet analyzer",
                "Check the capture snap length is large enough for headers",
            ],
            IndexerError::Validation { .. } => vec![
                "Check the capture timestamps are within a valid range",
                "Verify the capture clock was set when recording",
            ],
            IndexerError::Transport { .. } => vec![
                "Check the store URL is reachable",
                "Verify the store cluster health",
                "Increase the request timeout",
            ],
            IndexerError::Rejected { .. } => vec![
                "Check the store credentials",
                "Verify the index mapping accepts the document fields",
                "Check the target index name is valid",
            ],
            IndexerError::UnreadableResponse { .. } => vec![
                "Check the store URL points at Elasticsearch and not a proxy error page",
                "Verify document counts in the target index before re-running",
            ],
            IndexerError::PartialBatch { .. } => vec![
                "Inspect per-document failure reasons in the logs",
                "Reduce the batch size",
            ],
            IndexerError::Config { .. } => vec![
                "Check the environment variable spelling and value",
                "Unset the variable to use the default",
            ],
            IndexerError::MetricsServer { .. } => vec![
                "Choose a free port with METRICS_PORT",
                "Check no other exporter is bound to the port",
            ],
        }
    }

    /// Helper constructor for source errors with path context.
    pub fn source_unavailable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        IndexerError::SourceUnavailable { path: path.into(), reason: reason.into(), source: None }
    }

    /// Helper constructor for source errors with an underlying cause.
    pub fn source_unavailable_with_source(
        path: impl Into<PathBuf>,
        reason: impl Into<String>,
        source: BoxError,
    ) -> Self {
        IndexerError::SourceUnavailable {
            path: path.into(),
            reason: reason.into(),
            source: Some(source),
        }
    }

    /// Helper constructor for frame decode errors.
    pub fn frame_decode(details: impl Into<String>) -> Self {
        IndexerError::FrameDecode { details: details.into() }
    }

    /// Helper constructor for record validation errors.
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        IndexerError::Validation { field, reason: reason.into() }
    }

    /// Helper constructor for transport errors.
    pub fn transport(reason: impl Into<String>) -> Self {
        IndexerError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport errors with source.
    pub fn transport_with_source(reason: impl Into<String>, source: BoxError) -> Self {
        IndexerError::Transport { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for success responses whose body is unusable.
    pub fn unreadable_response(status: u16, reason: impl Into<String>, source: BoxError) -> Self {
        IndexerError::UnreadableResponse { status, reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for configuration errors.
    pub fn config(key: impl Into<String>, details: impl Into<String>) -> Self {
        IndexerError::Config { key: key.into(), details: details.into() }
    }
}

impl From<reqwest::Error> for IndexerError {
    fn from(err: reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            "connection failed".to_string()
        } else {
            "request failed".to_string()
        };
        IndexerError::Transport { reason, source: Some(Box::new(err)) }
    }
}
