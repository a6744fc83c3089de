//! Raw captured frame as yielded by the capture container

use pcap_file::DataLink;
use std::time::Duration;

/// One captured unit of traffic, borrowed from the capture buffer.
///
/// This is the input of the frame decoder. The byte slice may be shorter
/// than `original_length` when the capture used a small snap length.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    /// Capture time as an offset from the Unix epoch
    pub timestamp: Duration,

    /// Captured bytes, starting at the link layer
    pub data: &'a [u8],

    /// Length of the frame on the wire
    pub original_length: u32,

    /// Link layer of `data`
    pub link_type: DataLink,
}

impl<'a> RawFrame<'a> {
    /// Create an Ethernet frame whose wire length equals the captured length
    pub fn ethernet(timestamp: Duration, data: &'a [u8]) -> Self {
        Self { timestamp, data, original_length: data.len() as u32, link_type: DataLink::ETHERNET }
    }

    /// Capture time in fractional seconds since the epoch
    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp.as_secs_f64()
    }
}
