//! Frame decoding into normalized records
//!
//! The decoder slices a raw frame with etherparse and classifies it into one
//! of the fixed [`Layers`] combinations, highest precedence first:
//!
//! 1. IPv4/IPv6 header, refined by TCP, UDP or ICMP inside it
//! 2. ARP body on Ethernet, including behind 802.1Q/802.1ad tags
//! 3. Nothing recognized
//!
//! Timestamp and length are copied from the frame in every branch. Slicing
//! is lax: a frame cut short by the capture snap length still classifies by
//! the headers that survived. Only a frame too short for its link header is
//! a decode error, and it never affects other frames.

pub mod arp;

use etherparse::{
    Ethernet2HeaderSlice, LaxNetSlice, LaxSlicedPacket, SingleVlanHeaderSlice, TransportSlice,
};
use pcap_file::DataLink;
use tracing::trace;

use crate::types::{AddressPair, DecodedFrame, Layers, PortPair, RawFrame, Transport};
use crate::{IndexerError, Result};

/// 802.1Q, 802.1ad and the legacy double-tag ether type
const VLAN_TAG_TYPES: [u16; 3] = [0x8100, 0x88a8, 0x9100];

/// Stateless frame decoder
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDecoder;

impl FrameDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode one frame.
    ///
    /// Fails with [`IndexerError::FrameDecode`] when the frame is too short
    /// for its link header or an ARP body is truncated.
    pub fn decode(&self, frame: &RawFrame<'_>) -> Result<DecodedFrame> {
        let layers = match frame.link_type {
            DataLink::ETHERNET => classify_ethernet(frame.data)?,
            DataLink::RAW | DataLink::IPV4 | DataLink::IPV6 => classify_ip(frame.data)?,
            other => {
                trace!("Unsupported link type {:?}, frame left unclassified", other);
                Layers::Unrecognized
            }
        };

        Ok(DecodedFrame {
            capture_timestamp: frame.timestamp_secs(),
            byte_length: frame.original_length as u64,
            layers,
        })
    }
}

fn classify_ethernet(data: &[u8]) -> Result<Layers> {
    let sliced = LaxSlicedPacket::from_ethernet(data)
        .map_err(|e| IndexerError::frame_decode(format!("ethernet slicing: {}", e)))?;

    if let Some(layers) = network_layers(&sliced) {
        return Ok(layers);
    }
    if let Some((err, layer)) = &sliced.stop_err {
        trace!("Slicing stopped at {:?}: {}", layer, err);
    }

    // etherparse leaves ARP as an opaque ether payload
    let (ether_type, body) = innermost_ether_payload(data)?;
    if ether_type == arp::ETHERTYPE_ARP {
        let addresses = arp::parse_arp(body).map_err(IndexerError::frame_decode)?;
        return Ok(Layers::Arp { addresses });
    }

    Ok(Layers::Unrecognized)
}

/// Ether type and payload after the Ethernet header and any VLAN tags
fn innermost_ether_payload(data: &[u8]) -> Result<(u16, &[u8])> {
    let header = Ethernet2HeaderSlice::from_slice(data)
        .map_err(|e| IndexerError::frame_decode(format!("ethernet header: {}", e)))?;
    let mut ether_type = u16::from(header.ether_type());
    let mut rest = &data[header.slice().len()..];

    while VLAN_TAG_TYPES.contains(&ether_type) {
        let tag = SingleVlanHeaderSlice::from_slice(rest)
            .map_err(|e| IndexerError::frame_decode(format!("vlan tag: {}", e)))?;
        ether_type = u16::from(tag.ether_type());
        rest = &rest[tag.slice().len()..];
    }

    Ok((ether_type, rest))
}

fn classify_ip(data: &[u8]) -> Result<Layers> {
    let sliced = LaxSlicedPacket::from_ip(data)
        .map_err(|e| IndexerError::frame_decode(format!("ip slicing: {}", e)))?;

    Ok(network_layers(&sliced).unwrap_or(Layers::Unrecognized))
}

fn network_layers(sliced: &LaxSlicedPacket<'_>) -> Option<Layers> {
    let addresses = match &sliced.net {
        Some(LaxNetSlice::Ipv4(ipv4)) => {
            let header = ipv4.header();
            AddressPair::new(header.source_addr(), header.destination_addr())
        }
        Some(LaxNetSlice::Ipv6(ipv6)) => {
            let header = ipv6.header();
            AddressPair::new(header.source_addr(), header.destination_addr())
        }
        _ => return None,
    };

    let transport = match &sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => Transport::Tcp(PortPair {
            source: tcp.source_port(),
            destination: tcp.destination_port(),
        }),
        Some(TransportSlice::Udp(udp)) => Transport::Udp(PortPair {
            source: udp.source_port(),
            destination: udp.destination_port(),
        }),
        Some(TransportSlice::Icmpv4(_)) | Some(TransportSlice::Icmpv6(_)) => Transport::Icmp,
        _ => Transport::Other,
    };

    Some(Layers::Network { addresses, transport })
}
