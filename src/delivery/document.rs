//! Delivery document built from a record

use serde::Serialize;

use crate::Result;
use crate::types::{Record, TransportProtocol};

/// JSON document written to the store for one record.
///
/// The field set is fixed: the derived ISO-8601 string under both
/// `timestamp` and `@timestamp`, addresses, ports, protocol and length.
/// The sequence number stays in logs only. Absent addresses and ports
/// serialize as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub timestamp: String,
    #[serde(rename = "@timestamp")]
    pub at_timestamp: String,
    pub src_ip: Option<String>,
    pub dst_ip: Option<String>,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub l4_protocol: TransportProtocol,
    pub packet_length: u64,
}

impl Document {
    /// Build the document for a record.
    ///
    /// Fails with a validation error when the record has no usable timestamp.
    pub fn from_record(record: &Record) -> Result<Self> {
        let timestamp = record.iso_timestamp()?;

        Ok(Self {
            at_timestamp: timestamp.clone(),
            timestamp,
            src_ip: record.source_address().map(|a| a.to_string()),
            dst_ip: record.destination_address().map(|a| a.to_string()),
            src_port: record.source_port(),
            dst_port: record.destination_port(),
            l4_protocol: record.transport_protocol(),
            packet_length: record.byte_length(),
        })
    }
}
