//! Core types for captured frames and decoded packet records.
//!
//! - [`RawFrame`] borrows one frame straight out of the capture container
//! - [`Layers`] is the closed set of layer combinations the decoder recognizes
//! - [`Record`] is the immutable, sequence-numbered summary handed to delivery
//!   and metrics
//!
//! ## Usage Example
//!
//! ```rust
//! use pcap_indexer::types::{
//!     AddressPair, DecodedFrame, Layers, PortPair, Record, Transport, TransportProtocol,
//! };
//! use std::net::Ipv4Addr;
//!
//! let record = Record::new(1, DecodedFrame {
//!     capture_timestamp: 1_700_000_000.0,
//!     byte_length: 100,
//!     layers: Layers::Network {
//!         addresses: AddressPair::new(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)),
//!         transport: Transport::Tcp(PortPair { source: 1234, destination: 80 }),
//!     },
//! });
//!
//! assert_eq!(record.transport_protocol(), TransportProtocol::Tcp);
//! assert_eq!(record.destination_port(), Some(80));
//! assert_eq!(record.iso_timestamp().unwrap(), "2023-11-14T22:13:20.000000Z");
//! ```

mod frame;
mod record;

pub use frame::RawFrame;
pub use record::{
    AddressPair, DecodedFrame, Layers, PortPair, Record, Transport, TransportProtocol,
};
