//! Lock-free counter registry

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::types::TransportProtocol;

const PROTOCOLS: usize = TransportProtocol::ALL.len();

/// Upper bounds in seconds of the processing time histogram buckets
pub const PROCESSING_BUCKETS: [f64; 11] =
    [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Outcome label of a delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryStatus {
    Success,
    Fail,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 2] = [DeliveryStatus::Success, DeliveryStatus::Fail];

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Success => "success",
            DeliveryStatus::Fail => "fail",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Process-wide counters, only ever incremented.
///
/// One value is created at startup and shared by reference between the
/// pipeline and the exposition endpoint. Every counter is an atomic, so
/// scrapes never block the pipeline.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    packets: [AtomicU64; PROTOCOLS],
    bytes: [AtomicU64; PROTOCOLS],
    deliveries: [AtomicU64; 2],
    processing: [ProcessingHistogram; PROTOCOLS],
}

/// Per-protocol processing time; bucket counts are not cumulative
#[derive(Debug, Default)]
struct ProcessingHistogram {
    buckets: [AtomicU64; PROCESSING_BUCKETS.len()],
    count: AtomicU64,
    sum_nanos: AtomicU64,
}

impl ProcessingHistogram {
    fn observe(&self, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        if let Some(bucket) = PROCESSING_BUCKETS.iter().position(|bound| secs <= *bound) {
            self.buckets[bucket].fetch_add(1, Ordering::Relaxed);
        }
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.sum_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one processed packet and its length
    pub fn record_packet(&self, protocol: TransportProtocol, byte_length: u64) {
        self.packets[protocol.index()].fetch_add(1, Ordering::Relaxed);
        self.bytes[protocol.index()].fetch_add(byte_length, Ordering::Relaxed);
    }

    /// Count `count` delivery outcomes
    pub fn record_delivery(&self, status: DeliveryStatus, count: u64) {
        self.deliveries[status.index()].fetch_add(count, Ordering::Relaxed);
    }

    /// Observe the time spent processing one packet
    pub fn observe_processing(&self, protocol: TransportProtocol, elapsed: Duration) {
        self.processing[protocol.index()].observe(elapsed);
    }

    pub fn packets(&self, protocol: TransportProtocol) -> u64 {
        self.packets[protocol.index()].load(Ordering::Relaxed)
    }

    pub fn bytes(&self, protocol: TransportProtocol) -> u64 {
        self.bytes[protocol.index()].load(Ordering::Relaxed)
    }

    pub fn deliveries(&self, status: DeliveryStatus) -> u64 {
        self.deliveries[status.index()].load(Ordering::Relaxed)
    }

    /// Number of processing time observations for `protocol`
    pub fn processing_count(&self, protocol: TransportProtocol) -> u64 {
        self.processing[protocol.index()].count.load(Ordering::Relaxed)
    }

    /// Render every series in the Prometheus text exposition format
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(1024);

        let _ = writeln!(out, "# HELP pcap_packets_total Total packets processed");
        let _ = writeln!(out, "# TYPE pcap_packets_total counter");
        for protocol in TransportProtocol::ALL {
            let _ = writeln!(
                out,
                "pcap_packets_total{{protocol=\"{}\"}} {}",
                protocol,
                self.packets(protocol)
            );
        }

        let _ = writeln!(out, "# HELP pcap_bytes_total Total bytes processed");
        let _ = writeln!(out, "# TYPE pcap_bytes_total counter");
        for protocol in TransportProtocol::ALL {
            let _ = writeln!(
                out,
                "pcap_bytes_total{{protocol=\"{}\"}} {}",
                protocol,
                self.bytes(protocol)
            );
        }

        let _ = writeln!(out, "# HELP pcap_elastic_write_total Elasticsearch write attempts");
        let _ = writeln!(out, "# TYPE pcap_elastic_write_total counter");
        for status in DeliveryStatus::ALL {
            let _ = writeln!(
                out,
                "pcap_elastic_write_total{{status=\"{}\"}} {}",
                status.as_str(),
                self.deliveries(status)
            );
        }

        let _ = writeln!(out, "# HELP pcap_packet_processing_seconds Time spent processing packets");
        let _ = writeln!(out, "# TYPE pcap_packet_processing_seconds histogram");
        for protocol in TransportProtocol::ALL {
            let histogram = &self.processing[protocol.index()];
            let mut cumulative = 0;
            for (bound, bucket) in PROCESSING_BUCKETS.iter().zip(&histogram.buckets) {
                cumulative += bucket.load(Ordering::Relaxed);
                let _ = writeln!(
                    out,
                    "pcap_packet_processing_seconds_bucket{{protocol=\"{}\",le=\"{}\"}} {}",
                    protocol, bound, cumulative
                );
            }
            let count = histogram.count.load(Ordering::Relaxed);
            let sum = histogram.sum_nanos.load(Ordering::Relaxed) as f64 / 1e9;
            let _ = writeln!(
                out,
                "pcap_packet_processing_seconds_bucket{{protocol=\"{}\",le=\"+Inf\"}} {}",
                protocol, count
            );
            let _ = writeln!(out, "pcap_packet_processing_seconds_sum{{protocol=\"{}\"}} {}", protocol, sum);
            let _ = writeln!(out, "pcap_packet_processing_seconds_count{{protocol=\"{}\"}} {}", protocol, count);
        }

        out
    }
}
