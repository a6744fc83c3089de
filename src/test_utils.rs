//! Test utilities for building synthetic frames and capture files
//!
//! Frames are built with etherparse so header checksums and lengths are
//! valid, and capture files are written in memory with pcap-file. A scripted
//! [`MockStore`] stands in for Elasticsearch.

#![cfg(any(test, feature = "benchmark"))]

use etherparse::PacketBuilder;
use pcap_file::DataLink;
use pcap_file::pcap::{PcapHeader, PcapPacket, PcapWriter};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::delivery::{BulkFailure, BulkOperation, BulkResponse, Document, DocumentStore};
use crate::{IndexerError, Result};

const SRC_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
const DST_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x02];
const ETHERNET_HEADER_LEN: usize = 14;

/// Address and port of one side of a synthetic transport header
#[derive(Debug, Clone, Copy)]
pub struct Endpoint {
    pub address: IpAddr,
    pub port: u16,
}

impl Endpoint {
    pub fn v4(octets: [u8; 4], port: u16) -> Self {
        Self { address: IpAddr::V4(Ipv4Addr::from(octets)), port }
    }

    pub fn v6(address: Ipv6Addr, port: u16) -> Self {
        Self { address: IpAddr::V6(address), port }
    }
}

fn ip_builder(src: IpAddr, dst: IpAddr) -> etherparse::PacketBuilderStep<etherparse::IpHeaders> {
    let base = PacketBuilder::ethernet2(SRC_MAC, DST_MAC);
    match (src, dst) {
        (IpAddr::V4(s), IpAddr::V4(d)) => base.ipv4(s.octets(), d.octets(), 64),
        (IpAddr::V6(s), IpAddr::V6(d)) => base.ipv6(s.octets(), d.octets(), 64),
        _ => panic!("endpoints must share an address family"),
    }
}

/// Payload that pads a frame with `header_len` bytes of headers to `frame_len`
fn padding(header_len: usize, frame_len: usize) -> Vec<u8> {
    vec![0xab; frame_len.saturating_sub(header_len)]
}

/// Ethernet/IP/TCP frame, padded with payload up to `frame_len` bytes
pub fn tcp_frame(src: Endpoint, dst: Endpoint, frame_len: usize) -> Vec<u8> {
    let builder = ip_builder(src.address, dst.address).tcp(src.port, dst.port, 1, 65535);
    let payload = padding(builder.size(0), frame_len);
    let mut frame = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut frame, &payload).expect("tcp frame should build");
    frame
}

/// Ethernet/IP/UDP frame, padded with payload up to `frame_len` bytes
pub fn udp_frame(src: Endpoint, dst: Endpoint, frame_len: usize) -> Vec<u8> {
    let builder = ip_builder(src.address, dst.address).udp(src.port, dst.port);
    let payload = padding(builder.size(0), frame_len);
    let mut frame = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut frame, &payload).expect("udp frame should build");
    frame
}

/// Ethernet/IPv4/ICMP echo request
pub fn icmp_echo_frame(src: [u8; 4], dst: [u8; 4]) -> Vec<u8> {
    let builder = PacketBuilder::ethernet2(SRC_MAC, DST_MAC).ipv4(src, dst, 64).icmpv4_echo_request(7, 1);
    let payload = [0u8; 8];
    let mut frame = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut frame, &payload).expect("icmp frame should build");
    frame
}

/// Ethernet/IPv6/ICMPv6 echo request
pub fn icmpv6_echo_frame(src: Ipv6Addr, dst: Ipv6Addr) -> Vec<u8> {
    let builder = PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
        .ipv6(src.octets(), dst.octets(), 64)
        .icmpv6_echo_request(7, 1);
    let payload = [0u8; 8];
    let mut frame = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut frame, &payload).expect("icmpv6 frame should build");
    frame
}

/// Ethernet/ARP request from `sender` asking for `target`
pub fn arp_frame(sender: [u8; 4], target: [u8; 4]) -> Vec<u8> {
    let mut frame = ethernet_header(0x0806);
    frame.extend_from_slice(&arp_body(sender, target));
    frame
}

/// ARP request behind one 802.1Q tag carrying `vlan_id`
pub fn vlan_arp_frame(vlan_id: u16, sender: [u8; 4], target: [u8; 4]) -> Vec<u8> {
    let mut frame = ethernet_header(0x8100);
    frame.extend_from_slice(&(vlan_id & 0x0fff).to_be_bytes());
    frame.extend_from_slice(&0x0806u16.to_be_bytes());
    frame.extend_from_slice(&arp_body(sender, target));
    frame
}

fn arp_body(sender: [u8; 4], target: [u8; 4]) -> Vec<u8> {
    let mut body = Vec::with_capacity(28);
    body.extend_from_slice(&[0x00, 0x01, 0x08, 0x00, 0x06, 0x04, 0x00, 0x01]);
    body.extend_from_slice(&SRC_MAC);
    body.extend_from_slice(&sender);
    body.extend_from_slice(&[0u8; 6]);
    body.extend_from_slice(&target);
    body
}

/// Ethernet frame with a local experimental ethertype and zeroed payload
pub fn opaque_frame(frame_len: usize) -> Vec<u8> {
    let mut frame = ethernet_header(0x88b5);
    frame.resize(frame_len.max(ETHERNET_HEADER_LEN), 0);
    frame
}

fn ethernet_header(ether_type: u16) -> Vec<u8> {
    let mut header = Vec::with_capacity(ETHERNET_HEADER_LEN);
    header.extend_from_slice(&DST_MAC);
    header.extend_from_slice(&SRC_MAC);
    header.extend_from_slice(&ether_type.to_be_bytes());
    header
}

/// Write frames into an in-memory classic pcap file.
///
/// Each entry is `(timestamp, wire length, captured bytes)`.
pub fn pcap_bytes(link_type: DataLink, frames: &[(Duration, u32, Vec<u8>)]) -> Vec<u8> {
    let header = PcapHeader { datalink: link_type, ..Default::default() };
    let mut writer =
        PcapWriter::with_header(Vec::new(), header).expect("pcap header should write");
    for (timestamp, original_length, data) in frames {
        writer
            .write_packet(&PcapPacket::new(*timestamp, *original_length, data))
            .expect("pcap packet should write");
    }
    writer.into_writer()
}

/// Write Ethernet frames into an in-memory pcap file, using the captured
/// length as wire length and one-second spaced timestamps.
pub fn ethernet_pcap(frames: &[Vec<u8>]) -> Vec<u8> {
    let entries: Vec<_> = frames
        .iter()
        .enumerate()
        .map(|(i, data)| {
            (Duration::from_secs(1_700_000_000 + i as u64), data.len() as u32, data.clone())
        })
        .collect();
    pcap_bytes(DataLink::ETHERNET, &entries)
}

/// The three-frame capture used across pipeline tests: TCP 100 bytes,
/// UDP 64 bytes, unrecognized 40 bytes.
pub fn mixed_capture_frames() -> Vec<Vec<u8>> {
    vec![
        tcp_frame(Endpoint::v4([10, 0, 0, 1], 1234), Endpoint::v4([10, 0, 0, 2], 80), 100),
        udp_frame(Endpoint::v4([10, 0, 0, 1], 5353), Endpoint::v4([10, 0, 0, 3], 53), 64),
        opaque_frame(40),
    ]
}

/// Scripted behavior of a [`MockStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBehavior {
    /// Accept everything
    Healthy,
    /// Every request fails with a transport error
    Unreachable,
    /// Every request is refused with status 400
    Rejecting,
    /// The first `n` requests fail with a transport error
    FailFirst(usize),
    /// Bulk requests reject every `n`th document
    RejectEvery(usize),
}

/// In-memory document store that counts calls and keeps accepted documents
#[derive(Debug)]
pub struct MockStore {
    behavior: StoreBehavior,
    requests: AtomicUsize,
    index_calls: AtomicUsize,
    bulk_calls: AtomicUsize,
    indexed: Mutex<Vec<(String, Document)>>,
}

impl MockStore {
    pub fn new(behavior: StoreBehavior) -> Self {
        Self {
            behavior,
            requests: AtomicUsize::new(0),
            index_calls: AtomicUsize::new(0),
            bulk_calls: AtomicUsize::new(0),
            indexed: Mutex::new(Vec::new()),
        }
    }

    pub fn index_calls(&self) -> usize {
        self.index_calls.load(Ordering::SeqCst)
    }

    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    /// Accepted documents with their target, in arrival order
    pub fn indexed(&self) -> Vec<(String, Document)> {
        self.indexed.lock().map(|docs| docs.clone()).unwrap_or_default()
    }

    fn admit(&self) -> Result<()> {
        let request = self.requests.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            StoreBehavior::Unreachable => Err(IndexerError::transport("connection refused")),
            StoreBehavior::FailFirst(n) if request < n => {
                Err(IndexerError::transport("connection reset"))
            }
            StoreBehavior::Rejecting => Err(IndexerError::Rejected {
                status: 400,
                reason: "mapper_parsing_exception".to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn accept(&self, target: &str, document: &Document) {
        if let Ok(mut docs) = self.indexed.lock() {
            docs.push((target.to_string(), document.clone()));
        }
    }
}

#[async_trait::async_trait]
impl DocumentStore for MockStore {
    async fn index(&self, target: &str, document: &Document) -> Result<()> {
        self.index_calls.fetch_add(1, Ordering::SeqCst);
        self.admit()?;
        self.accept(target, document);
        Ok(())
    }

    async fn bulk(&self, operations: &[BulkOperation]) -> Result<BulkResponse> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        self.admit()?;

        let mut response = BulkResponse::default();
        for (position, op) in operations.iter().enumerate() {
            match self.behavior {
                StoreBehavior::RejectEvery(n) if (position + 1) % n == 0 => {
                    response.failures.push(BulkFailure {
                        position,
                        status: 400,
                        reason: "document rejected".to_string(),
                    });
                }
                _ => {
                    self.accept(&op.target, &op.document);
                    response.succeeded += 1;
                }
            }
        }
        Ok(response)
    }

    async fn ping(&self) -> Result<()> {
        self.admit()
    }
}
