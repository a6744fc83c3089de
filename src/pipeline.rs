//! Pipeline driver: capture → metrics → delivery
//!
//! Records are processed strictly in order. Without a delivery client the
//! pipeline still decodes and counts every packet but records no delivery
//! outcomes.
//!
//! Processing time per packet covers its metrics update and delivery. A
//! batched packet is charged an equal share of its bulk request.

use std::time::Instant;
use tracing::{debug, info};

use crate::capture::CaptureReader;
use crate::delivery::{Backoff, DeliveryClient, DocumentStore, ElasticStore, TokioBackoff};
use crate::metrics::{DeliveryStatus, MetricsRegistry};
use crate::types::Record;
use crate::Result;

/// Records between progress log lines
pub const PROGRESS_INTERVAL: u64 = 1000;

/// Totals of one pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Frames the capture reader could not decode
    pub skipped: u64,
}

/// Drives records through metrics and delivery
pub struct Pipeline<'a, S = ElasticStore, B = TokioBackoff> {
    client: Option<&'a DeliveryClient<S, B>>,
    metrics: &'a MetricsRegistry,
    batch_size: usize,
    progress_interval: u64,
}

impl<'a> Pipeline<'a> {
    /// Pipeline without delivery
    pub fn new(metrics: &'a MetricsRegistry) -> Self {
        Self { client: None, metrics, batch_size: 1, progress_interval: PROGRESS_INTERVAL }
    }
}

impl<'a, S: DocumentStore, B: Backoff> Pipeline<'a, S, B> {
    /// Deliver through `client`
    pub fn with_client<S2, B2>(self, client: &'a DeliveryClient<S2, B2>) -> Pipeline<'a, S2, B2> {
        Pipeline {
            client: Some(client),
            metrics: self.metrics,
            batch_size: self.batch_size,
            progress_interval: self.progress_interval,
        }
    }

    /// Group records into bulk requests of `batch_size`; 1 delivers one by one
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    pub fn is_degraded(&self) -> bool {
        self.client.is_none()
    }

    /// Run over a whole capture, reporting its skipped frames
    pub async fn run_capture(&self, reader: &mut CaptureReader) -> Result<RunSummary> {
        let result = self.run(reader.by_ref()).await;
        let skipped = reader.skipped_frames();
        result.map(|summary| RunSummary { skipped, ..summary })
    }

    /// Process every record in order.
    ///
    /// Stops at the first source error, after delivering any records already
    /// buffered for a batch.
    pub async fn run<I>(&self, records: I) -> Result<RunSummary>
    where
        I: IntoIterator<Item = Result<Record>>,
    {
        let mut summary = RunSummary::default();
        let mut pending: Vec<Record> = Vec::with_capacity(self.batch_size);

        if self.is_degraded() {
            info!("No document store, running without delivery");
        }

        for item in records {
            let record = match item {
                Ok(record) => record,
                Err(e) => {
                    self.flush(&mut pending, &mut summary).await;
                    return Err(e);
                }
            };

            let started = Instant::now();
            let protocol = record.transport_protocol();
            self.metrics.record_packet(protocol, record.byte_length());
            summary.processed += 1;

            match self.client {
                Some(client) if self.batch_size == 1 => {
                    let delivered = client.deliver(&record).await;
                    self.tally(&mut summary, delivered as u64, (!delivered) as u64);
                    self.metrics.observe_processing(protocol, started.elapsed());
                }
                Some(_) => {
                    pending.push(record);
                    if pending.len() >= self.batch_size {
                        self.flush(&mut pending, &mut summary).await;
                    }
                }
                None => self.metrics.observe_processing(protocol, started.elapsed()),
            }

            if summary.processed % self.progress_interval == 0 {
                info!(
                    "Processed {} packets (success: {}, failed: {})",
                    summary.processed, summary.succeeded, summary.failed
                );
            }
        }

        self.flush(&mut pending, &mut summary).await;

        info!(
            "Processing complete: {} packets (success: {}, failed: {})",
            summary.processed, summary.succeeded, summary.failed
        );
        Ok(summary)
    }

    async fn flush(&self, pending: &mut Vec<Record>, summary: &mut RunSummary) {
        let Some(client) = self.client else { return };
        if pending.is_empty() {
            return;
        }

        let started = Instant::now();
        let outcome = client.deliver_batch(pending).await;
        let share = started.elapsed() / u32::try_from(pending.len()).unwrap_or(u32::MAX);
        for record in pending.iter() {
            self.metrics.observe_processing(record.transport_protocol(), share);
        }
        debug!(
            "Batch of {} delivered: {} ok, {} failed",
            pending.len(),
            outcome.success_count,
            outcome.fail_count
        );
        self.tally(summary, outcome.success_count as u64, outcome.fail_count as u64);
        pending.clear();
    }

    fn tally(&self, summary: &mut RunSummary, succeeded: u64, failed: u64) {
        if succeeded > 0 {
            self.metrics.record_delivery(DeliveryStatus::Success, succeeded);
        }
        if failed > 0 {
            self.metrics.record_delivery(DeliveryStatus::Fail, failed);
        }
        summary.succeeded += succeeded;
        summary.failed += failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::backoff::RecordingBackoff;
    use crate::delivery::{IndexTarget, RetryPolicy};
    use crate::test_utils::{self, MockStore, StoreBehavior};
    use crate::types::{DecodedFrame, Layers, TransportProtocol};
    use crate::IndexerError;
    use anyhow::Result;

    fn client(behavior: StoreBehavior) -> DeliveryClient<MockStore, RecordingBackoff> {
        DeliveryClient::new(
            MockStore::new(behavior),
            IndexTarget::fixed("pcap-packets"),
            RetryPolicy::default(),
            RecordingBackoff::default(),
        )
    }

    fn mixed_capture() -> Result<CaptureReader> {
        Ok(CaptureReader::from_bytes(test_utils::ethernet_pcap(
            &test_utils::mixed_capture_frames(),
        ))?)
    }

    fn record(seq: u64) -> Record {
        Record::new(
            seq,
            DecodedFrame { capture_timestamp: 1.0, byte_length: 10, layers: Layers::Unrecognized },
        )
    }

    #[tokio::test]
    async fn three_frame_capture_is_counted_and_delivered() -> Result<()> {
        let metrics = MetricsRegistry::new();
        let client = client(StoreBehavior::Healthy);
        let mut reader = mixed_capture()?;

        let summary = Pipeline::new(&metrics).with_client(&client).run_capture(&mut reader).await?;

        assert_eq!(summary, RunSummary { processed: 3, succeeded: 3, failed: 0, skipped: 0 });
        assert_eq!(metrics.packets(TransportProtocol::Tcp), 1);
        assert_eq!(metrics.bytes(TransportProtocol::Tcp), 100);
        assert_eq!(metrics.bytes(TransportProtocol::Udp), 64);
        assert_eq!(metrics.bytes(TransportProtocol::Other), 40);
        assert_eq!(metrics.deliveries(DeliveryStatus::Success), 3);
        assert_eq!(metrics.processing_count(TransportProtocol::Tcp), 1);
        assert_eq!(metrics.processing_count(TransportProtocol::Other), 1);

        let timestamps: Vec<_> =
            client.store().indexed().into_iter().map(|(_, doc)| doc.timestamp).collect();
        assert_eq!(
            timestamps,
            vec![
                "2023-11-14T22:13:20.000000Z",
                "2023-11-14T22:13:21.000000Z",
                "2023-11-14T22:13:22.000000Z",
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn missing_store_still_counts_packets() -> Result<()> {
        let metrics = MetricsRegistry::new();
        let mut reader = mixed_capture()?;

        let pipeline = Pipeline::new(&metrics);
        assert!(pipeline.is_degraded());
        let summary = pipeline.run_capture(&mut reader).await?;

        assert_eq!(summary.processed, 3);
        assert_eq!(summary.succeeded + summary.failed, 0);
        assert_eq!(metrics.packets(TransportProtocol::Tcp), 1);
        assert_eq!(metrics.packets(TransportProtocol::Udp), 1);
        assert_eq!(metrics.packets(TransportProtocol::Other), 1);
        assert_eq!(metrics.deliveries(DeliveryStatus::Success), 0);
        assert_eq!(metrics.deliveries(DeliveryStatus::Fail), 0);
        Ok(())
    }

    #[tokio::test]
    async fn failing_store_counts_one_failure_per_record() -> Result<()> {
        let metrics = MetricsRegistry::new();
        let client = client(StoreBehavior::Unreachable);

        let summary =
            Pipeline::new(&metrics).with_client(&client).run(vec![Ok(record(1))]).await?;

        assert_eq!(summary.failed, 1);
        assert_eq!(metrics.deliveries(DeliveryStatus::Fail), 1);
        assert_eq!(client.store().index_calls(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn batches_are_flushed_at_size_and_at_end() -> Result<()> {
        let metrics = MetricsRegistry::new();
        let client = client(StoreBehavior::Healthy);
        let records: Vec<_> = (1..=5).map(|i| Ok(record(i))).collect();

        let summary = Pipeline::new(&metrics)
            .with_client(&client)
            .with_batch_size(2)
            .run(records)
            .await?;

        assert_eq!(summary.succeeded, 5);
        assert_eq!(client.store().bulk_calls(), 3);
        assert_eq!(client.store().index_calls(), 0);
        assert_eq!(metrics.deliveries(DeliveryStatus::Success), 5);
        assert_eq!(metrics.processing_count(TransportProtocol::Other), 5);
        Ok(())
    }

    #[tokio::test]
    async fn partial_batches_update_both_outcome_counters() -> Result<()> {
        let metrics = MetricsRegistry::new();
        let client = client(StoreBehavior::RejectEvery(3));
        let records: Vec<_> = (1..=6).map(|i| Ok(record(i))).collect();

        let summary = Pipeline::new(&metrics)
            .with_client(&client)
            .with_batch_size(6)
            .run(records)
            .await?;

        assert_eq!((summary.succeeded, summary.failed), (4, 2));
        assert_eq!(metrics.deliveries(DeliveryStatus::Success), 4);
        assert_eq!(metrics.deliveries(DeliveryStatus::Fail), 2);
        Ok(())
    }

    #[tokio::test]
    async fn source_error_aborts_after_flushing_pending_records() {
        let metrics = MetricsRegistry::new();
        let client = client(StoreBehavior::Healthy);
        let records = vec![
            Ok(record(1)),
            Err(IndexerError::source_unavailable("capture.pcap", "truncated")),
            Ok(record(3)),
        ];

        let result =
            Pipeline::new(&metrics).with_client(&client).with_batch_size(10).run(records).await;

        assert!(matches!(result, Err(IndexerError::SourceUnavailable { .. })));
        assert_eq!(client.store().indexed().len(), 1);
        assert_eq!(metrics.packets(TransportProtocol::Other), 1);
    }

    #[tokio::test]
    async fn skipped_frames_are_reported() -> Result<()> {
        let metrics = MetricsRegistry::new();
        let frames = vec![test_utils::opaque_frame(60), vec![0u8; 4], test_utils::opaque_frame(60)];
        let mut reader = CaptureReader::from_bytes(test_utils::ethernet_pcap(&frames))?;

        let summary = Pipeline::new(&metrics).run_capture(&mut reader).await?;
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.skipped, 1);
        Ok(())
    }
}
