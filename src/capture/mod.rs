//! Capture file access
//!
//! [`CaptureReader`] turns a pcap or pcapng file into a lazy sequence of
//! [`Record`](crate::types::Record)s.

pub mod format;
pub mod reader;

pub use format::CaptureFormat;
pub use reader::CaptureReader;
