//! Decode captured network traffic and index it into a document store.
//!
//! pcap-indexer reads a pcap or pcapng capture, classifies every frame into a
//! normalized [`Record`], writes the records to Elasticsearch and exposes
//! Prometheus counters about what it saw and delivered.
//!
//! # Features
//!
//! - **Decoding**: Ethernet, raw IP, IPv4/IPv6, TCP/UDP/ICMP and ARP
//! - **Resilient delivery**: bounded exponential retries, single and bulk paths
//! - **Degraded mode**: decoding and metrics keep running without a store
//! - **Metrics**: lock-free counters served at `/metrics`
//!
//! ## Example
//!
//! ```rust,no_run
//! use pcap_indexer::{Config, MetricsRegistry, PcapIndexer, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> pcap_indexer::Result<()> {
//!     let config = Config::from_env()?;
//!     let metrics = MetricsRegistry::new();
//!     let mut capture = PcapIndexer::open("capture.pcap")?;
//!
//!     let summary = match PcapIndexer::connect(&config).await {
//!         Ok(client) => {
//!             Pipeline::new(&metrics).with_client(&client).run_capture(&mut capture).await?
//!         }
//!         Err(_) => Pipeline::new(&metrics).run_capture(&mut capture).await?,
//!     };
//!
//!     println!("{} packets, {} delivered", summary.processed, summary.succeeded);
//!     Ok(())
//! }
//! ```

mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

pub mod capture;
pub mod config;
pub mod decode;
pub mod delivery;
pub mod metrics;
pub mod pipeline;

// Core exports
pub use error::*;
pub use types::*;

pub use capture::{CaptureFormat, CaptureReader};
pub use config::{Config, ElasticConfig};
pub use decode::FrameDecoder;
pub use delivery::{BatchOutcome, DeliveryClient, DocumentStore, ElasticStore, IndexTarget};
pub use metrics::{DeliveryStatus, MetricsRegistry, MetricsServer};
pub use pipeline::{Pipeline, RunSummary};

/// Entry point for opening captures and connecting to the store.
///
/// # Examples
///
/// ```rust,no_run
/// use pcap_indexer::PcapIndexer;
///
/// # fn main() -> pcap_indexer::Result<()> {
/// for record in PcapIndexer::open("capture.pcap")? {
///     let record = record?;
///     println!("{} {:?}", record.transport_protocol(), record.source_address());
/// }
/// # Ok(())
/// # }
/// ```
pub struct PcapIndexer;

impl PcapIndexer {
    /// Open a capture file.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::SourceUnavailable`] if the file cannot be read
    /// or is neither pcap nor pcapng.
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<CaptureReader> {
        CaptureReader::open(path)
    }

    /// Connect to the configured Elasticsearch cluster.
    ///
    /// The cluster is pinged once; an error means the store is unreachable
    /// and the caller should run without delivery.
    pub async fn connect(config: &Config) -> Result<DeliveryClient> {
        DeliveryClient::connect(&config.elastic).await
    }
}
