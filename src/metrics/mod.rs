//! Operational counters and their scrape endpoint
//!
//! | Series                           | Type      | Label      |
//! |----------------------------------|-----------|------------|
//! | `pcap_packets_total`             | counter   | `protocol` |
//! | `pcap_bytes_total`               | counter   | `protocol` |
//! | `pcap_elastic_write_total`       | counter   | `status`   |
//! | `pcap_packet_processing_seconds` | histogram | `protocol` |

pub mod registry;
pub mod server;

pub use registry::{DeliveryStatus, MetricsRegistry, PROCESSING_BUCKETS};
pub use server::MetricsServer;
