//! Normalized packet summary produced for every decoded frame

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use crate::{IndexerError, Result};

/// Protocol classification tag carried by every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    Tcp,
    Udp,
    Icmp,
    Arp,
    #[default]
    Other,
}

impl TransportProtocol {
    /// Every tag, in label order
    pub const ALL: [TransportProtocol; 5] = [
        TransportProtocol::Tcp,
        TransportProtocol::Udp,
        TransportProtocol::Icmp,
        TransportProtocol::Arp,
        TransportProtocol::Other,
    ];

    /// Lowercase label used in documents and metric labels
    pub fn as_str(self) -> &'static str {
        match self {
            TransportProtocol::Tcp => "tcp",
            TransportProtocol::Udp => "udp",
            TransportProtocol::Icmp => "icmp",
            TransportProtocol::Arp => "arp",
            TransportProtocol::Other => "other",
        }
    }

    /// Position of this tag in [`TransportProtocol::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source and destination address of one layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressPair {
    pub source: IpAddr,
    pub destination: IpAddr,
}

impl AddressPair {
    pub fn new(source: impl Into<IpAddr>, destination: impl Into<IpAddr>) -> Self {
        Self { source: source.into(), destination: destination.into() }
    }
}

/// Source and destination port of a TCP or UDP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPair {
    pub source: u16,
    pub destination: u16,
}

/// Transport layer found inside a network layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp(PortPair),
    Udp(PortPair),
    Icmp,
    Other,
}

/// Recognized layer combination of a frame, in classification precedence.
///
/// Ports only exist inside [`Layers::Network`], so a record can never carry a
/// port without an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layers {
    /// IPv4 or IPv6 header, with whatever transport it carries
    Network { addresses: AddressPair, transport: Transport },

    /// Address resolution without a network layer. Addresses are absent when
    /// the ARP body does not describe IPv4 protocol addresses.
    Arp { addresses: Option<AddressPair> },

    /// Nothing recognized
    Unrecognized,
}

impl Layers {
    /// Classification tag of this layer combination
    pub fn protocol(&self) -> TransportProtocol {
        match self {
            Layers::Network { transport: Transport::Tcp(_), .. } => TransportProtocol::Tcp,
            Layers::Network { transport: Transport::Udp(_), .. } => TransportProtocol::Udp,
            Layers::Network { transport: Transport::Icmp, .. } => TransportProtocol::Icmp,
            Layers::Network { transport: Transport::Other, .. } => TransportProtocol::Other,
            Layers::Arp { .. } => TransportProtocol::Arp,
            Layers::Unrecognized => TransportProtocol::Other,
        }
    }

    fn addresses(&self) -> Option<AddressPair> {
        match self {
            Layers::Network { addresses, .. } => Some(*addresses),
            Layers::Arp { addresses } => *addresses,
            Layers::Unrecognized => None,
        }
    }

    fn ports(&self) -> Option<PortPair> {
        match self {
            Layers::Network { transport: Transport::Tcp(ports), .. }
            | Layers::Network { transport: Transport::Udp(ports), .. } => Some(*ports),
            _ => None,
        }
    }
}

/// Decoder output for one frame, before it is placed in the capture sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedFrame {
    /// Seconds since the epoch, fractional
    pub capture_timestamp: f64,
    /// Total frame length
    pub byte_length: u64,
    pub layers: Layers,
}

/// Protocol-classified summary of one captured frame.
///
/// Records are immutable; the capture source assigns `sequence_number` and
/// the decoder supplies everything else.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    sequence_number: u64,
    capture_timestamp: f64,
    layers: Layers,
    byte_length: u64,
}

impl Record {
    /// Place a decoded frame at a 1-based position in the capture
    pub fn new(sequence_number: u64, decoded: DecodedFrame) -> Self {
        Self {
            sequence_number,
            capture_timestamp: decoded.capture_timestamp,
            layers: decoded.layers,
            byte_length: decoded.byte_length,
        }
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn capture_timestamp(&self) -> f64 {
        self.capture_timestamp
    }

    pub fn layers(&self) -> &Layers {
        &self.layers
    }

    pub fn source_address(&self) -> Option<IpAddr> {
        self.layers.addresses().map(|a| a.source)
    }

    pub fn destination_address(&self) -> Option<IpAddr> {
        self.layers.addresses().map(|a| a.destination)
    }

    pub fn source_port(&self) -> Option<u16> {
        self.layers.ports().map(|p| p.source)
    }

    pub fn destination_port(&self) -> Option<u16> {
        self.layers.ports().map(|p| p.destination)
    }

    pub fn transport_protocol(&self) -> TransportProtocol {
        self.layers.protocol()
    }

    pub fn byte_length(&self) -> u64 {
        self.byte_length
    }

    /// Capture time as a UTC instant.
    ///
    /// Fails with a validation error when the timestamp is not a finite,
    /// non-negative value representable as a calendar date.
    pub fn captured_at(&self) -> Result<DateTime<Utc>> {
        let ts = self.capture_timestamp;
        if !ts.is_finite() || ts < 0.0 {
            return Err(IndexerError::validation("timestamp", format!("unusable value {ts}")));
        }

        let secs = ts.trunc();
        let nanos = (((ts - secs) * 1e9).round() as u32).min(999_999_999);
        if secs > i64::MAX as f64 {
            return Err(IndexerError::validation("timestamp", format!("{ts} is out of range")));
        }

        DateTime::<Utc>::from_timestamp(secs as i64, nanos).ok_or_else(|| {
            IndexerError::validation("timestamp", format!("{ts} is out of range"))
        })
    }

    /// ISO-8601 presentation of the capture time, derived on demand
    pub fn iso_timestamp(&self) -> Result<String> {
        Ok(self.captured_at()?.to_rfc3339_opts(SecondsFormat::Micros, true))
    }
}
