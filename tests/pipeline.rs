//! End-to-end runs: capture file → decoder → metrics → stub Elasticsearch.

mod support;

use anyhow::{Context, Result, ensure};
use pcap_indexer::delivery::{RetryPolicy, TokioBackoff};
use pcap_indexer::{
    CaptureReader, DeliveryClient, DeliveryStatus, ElasticStore, IndexTarget, IndexerError,
    MetricsRegistry, MetricsServer, PcapIndexer, Pipeline, RunSummary, TransportProtocol,
};
use std::sync::Arc;
use std::time::Duration;
use support::{StubElastic, StubMode};

fn client(stub: &StubElastic) -> Result<DeliveryClient> {
    Ok(DeliveryClient::new(
        ElasticStore::new(stub.url(), Duration::from_secs(5))?,
        IndexTarget::fixed("pcap-packets"),
        RetryPolicy { max_attempts: 3, base_delay: Duration::ZERO },
        TokioBackoff,
    ))
}

#[tokio::test]
async fn capture_is_indexed_in_order() -> Result<()> {
    let stub = StubElastic::start(StubMode::Healthy).await;
    let client = client(&stub)?;
    let metrics = MetricsRegistry::new();
    let mut capture = CaptureReader::from_bytes(support::mixed_capture())?;

    let summary = Pipeline::new(&metrics).with_client(&client).run_capture(&mut capture).await?;
    assert_eq!(summary, RunSummary { processed: 3, succeeded: 3, failed: 0, skipped: 0 });

    let docs = stub.documents();
    let protocols: Vec<_> = docs.iter().map(|d| d["l4_protocol"].clone()).collect();
    let lengths: Vec<_> = docs.iter().map(|d| d["packet_length"].clone()).collect();
    let timestamps: Vec<_> = docs.iter().map(|d| d["timestamp"].clone()).collect();
    assert_eq!(protocols, vec!["tcp", "udp", "other"]);
    assert_eq!(lengths, vec![100, 64, 40]);
    assert_eq!(
        timestamps,
        vec!["2023-11-14T22:13:20.000000Z", "2023-11-14T22:13:21.000000Z", "2023-11-14T22:13:22.000000Z"]
    );

    assert_eq!(docs[0]["src_ip"], "10.0.0.1");
    assert_eq!(docs[0]["dst_port"], 80);
    assert_eq!(docs[1]["dst_ip"], "10.0.0.3");
    assert_eq!(docs[1]["src_port"], 5353);
    assert!(docs[2]["src_ip"].is_null());

    assert_eq!(metrics.deliveries(DeliveryStatus::Success), 3);
    Ok(())
}

#[tokio::test]
async fn bulk_mode_accounts_partial_failures() -> Result<()> {
    let stub = StubElastic::start(StubMode::RejectOdd).await;
    let client = client(&stub)?;
    let metrics = MetricsRegistry::new();
    let mut capture = CaptureReader::from_bytes(support::mixed_capture())?;

    let summary = Pipeline::new(&metrics)
        .with_client(&client)
        .with_batch_size(100)
        .run_capture(&mut capture)
        .await?;

    assert_eq!((summary.succeeded, summary.failed), (2, 1));
    assert_eq!(stub.writes(), 1);
    assert_eq!(metrics.deliveries(DeliveryStatus::Success), 2);
    assert_eq!(metrics.deliveries(DeliveryStatus::Fail), 1);
    Ok(())
}

#[tokio::test]
async fn unavailable_store_fails_every_record_after_retries() -> Result<()> {
    let stub = StubElastic::start(StubMode::Unavailable).await;
    let client = client(&stub)?;
    let metrics = MetricsRegistry::new();
    let mut capture = CaptureReader::from_bytes(support::mixed_capture())?;

    let summary = Pipeline::new(&metrics).with_client(&client).run_capture(&mut capture).await?;

    assert_eq!((summary.processed, summary.failed), (3, 3));
    assert_eq!(stub.writes(), 9);
    assert_eq!(metrics.deliveries(DeliveryStatus::Fail), 3);
    assert_eq!(metrics.packets(TransportProtocol::Tcp), 1);
    Ok(())
}

#[tokio::test]
async fn degraded_run_is_visible_through_the_metrics_endpoint() -> Result<()> {
    let metrics = Arc::new(MetricsRegistry::new());
    let server = MetricsServer::start("127.0.0.1:0".parse()?, Arc::clone(&metrics)).await?;
    let mut capture = CaptureReader::from_bytes(support::mixed_capture())?;

    let summary = Pipeline::new(&metrics).run_capture(&mut capture).await?;
    ensure!(summary.processed == 3, "unexpected summary {summary:?}");

    let body = reqwest::get(format!("http://{}/metrics", server.local_addr()))
        .await?
        .text()
        .await?;
    for line in [
        "pcap_packets_total{protocol=\"tcp\"} 1",
        "pcap_packets_total{protocol=\"udp\"} 1",
        "pcap_packets_total{protocol=\"other\"} 1",
        "pcap_bytes_total{protocol=\"tcp\"} 100",
        "pcap_bytes_total{protocol=\"other\"} 40",
        "pcap_elastic_write_total{status=\"success\"} 0",
        "pcap_elastic_write_total{status=\"fail\"} 0",
        "pcap_packet_processing_seconds_count{protocol=\"tcp\"} 1",
        "pcap_packet_processing_seconds_count{protocol=\"arp\"} 0",
    ] {
        ensure!(body.contains(line), "missing '{line}' in:\n{body}");
    }

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn capture_file_is_read_from_disk() -> Result<()> {
    let path = std::env::temp_dir().join(format!("pcap-indexer-{}.pcap", std::process::id()));
    std::fs::write(&path, support::mixed_capture()).context("writing capture")?;

    let metrics = MetricsRegistry::new();
    let mut capture = PcapIndexer::open(&path)?;
    let summary = Pipeline::new(&metrics).run_capture(&mut capture).await;
    std::fs::remove_file(&path)?;

    assert_eq!(summary?.processed, 3);
    assert_eq!(capture.path(), path.as_path());
    Ok(())
}

#[test]
fn missing_capture_is_source_unavailable() {
    let err = PcapIndexer::open("/definitely/not/here.pcap").err();
    assert!(matches!(err, Some(IndexerError::SourceUnavailable { .. })));
}
