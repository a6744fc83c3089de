//! Capture file reader producing decoded records
//!
//! The whole file is loaded into memory when opened, then frames are decoded
//! lazily one at a time. Frames that fail to decode are skipped with a
//! warning; container errors end the sequence with
//! [`IndexerError::SourceUnavailable`].
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use pcap_indexer::capture::CaptureReader;
//!
//! fn summarize() -> pcap_indexer::Result<()> {
//!     let mut reader = CaptureReader::open("capture.pcap")?;
//!     while let Some(record) = reader.next_record()? {
//!         println!("#{} {} {} bytes",
//!             record.sequence_number(),
//!             record.transport_protocol(),
//!             record.byte_length());
//!     }
//!     println!("{} frames skipped", reader.skipped_frames());
//!     Ok(())
//! }
//! ```

use pcap_file::DataLink;
use pcap_file::pcap::PcapReader;
use pcap_file::pcapng::blocks::interface_description::{
    InterfaceDescriptionBlock, InterfaceDescriptionOption,
};
use pcap_file::pcapng::{Block, PcapNgReader};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use super::format::CaptureFormat;
use crate::decode::FrameDecoder;
use crate::types::{DecodedFrame, RawFrame, Record};
use crate::{IndexerError, Result};

/// Timestamp resolution when an interface carries no `if_tsresol` option
const DEFAULT_TS_RESOLUTION: u8 = 6;

enum Container {
    Pcap(PcapReader<Cursor<Vec<u8>>>),
    PcapNg {
        reader: PcapNgReader<Cursor<Vec<u8>>>,
        /// Interfaces of the current section, indexed by interface id
        interfaces: Vec<Interface>,
    },
}

#[derive(Debug, Clone, Copy)]
struct Interface {
    link_type: DataLink,
    ts_resolution: u8,
}

impl Interface {
    fn from_block(block: &InterfaceDescriptionBlock<'_>) -> Self {
        let ts_resolution = block
            .options
            .iter()
            .find_map(|option| match option {
                InterfaceDescriptionOption::IfTsResol(resolution) => Some(*resolution),
                _ => None,
            })
            .unwrap_or(DEFAULT_TS_RESOLUTION);

        Self { link_type: block.linktype, ts_resolution }
    }

    /// Convert an enhanced packet timestamp to time since the epoch.
    ///
    /// pcap-file hands the raw 64-bit tick count over as nanoseconds. A tick
    /// is `10^-r` seconds, or `2^-(r & 0x7f)` seconds when the high bit of
    /// the resolution `r` is set.
    fn timestamp(&self, raw: Duration) -> Duration {
        const NANOS_PER_SEC: u128 = 1_000_000_000;
        let ticks = raw.as_nanos();
        let resolution = u32::from(self.ts_resolution);

        let nanos = if resolution & 0x80 != 0 {
            (ticks * NANOS_PER_SEC) >> (resolution & 0x7f)
        } else if resolution <= 9 {
            ticks * 10u128.pow(9 - resolution)
        } else {
            10u128.checked_pow(resolution - 9).map_or(0, |divisor| ticks / divisor)
        };

        let secs = u64::try_from(nanos / NANOS_PER_SEC).unwrap_or(u64::MAX);
        Duration::new(secs, (nanos % NANOS_PER_SEC) as u32)
    }
}

/// Lazy, single-pass sequence of records from one capture file
pub struct CaptureReader {
    path: PathBuf,
    format: CaptureFormat,
    container: Container,
    decoder: FrameDecoder,
    frames_read: u64,
    skipped_frames: u64,
    finished: bool,
}

impl CaptureReader {
    /// Open a pcap or pcapng file for reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            IndexerError::source_unavailable_with_source(path, "cannot read file", Box::new(e))
        })?;

        Self::from_bytes_with_path(data, path.to_path_buf())
    }

    /// Create a reader over an in-memory capture (for testing)
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with_path(data, PathBuf::from("<memory>"))
    }

    fn from_bytes_with_path(data: Vec<u8>, path: PathBuf) -> Result<Self> {
        let size = data.len();
        let format = CaptureFormat::detect(&data).ok_or_else(|| {
            IndexerError::source_unavailable(&path, "not a pcap or pcapng capture")
        })?;

        let container = match format {
            CaptureFormat::Pcap => {
                let reader = PcapReader::new(Cursor::new(data)).map_err(|e| {
                    IndexerError::source_unavailable_with_source(
                        &path,
                        "invalid pcap header",
                        Box::new(e),
                    )
                })?;
                debug!("pcap link type {:?}", reader.header().datalink);
                Container::Pcap(reader)
            }
            CaptureFormat::PcapNg => {
                let reader = PcapNgReader::new(Cursor::new(data)).map_err(|e| {
                    IndexerError::source_unavailable_with_source(
                        &path,
                        "invalid pcapng section header",
                        Box::new(e),
                    )
                })?;
                Container::PcapNg { reader, interfaces: Vec::new() }
            }
        };

        info!("Opened {} capture {} ({} bytes)", format, path.display(), size);

        Ok(Self {
            path,
            format,
            container,
            decoder: FrameDecoder::new(),
            frames_read: 0,
            skipped_frames: 0,
            finished: false,
        })
    }

    /// Path the capture was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Detected container format
    pub fn format(&self) -> CaptureFormat {
        self.format
    }

    /// Number of frames consumed so far, decoded or skipped
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Number of frames skipped because they failed to decode
    pub fn skipped_frames(&self) -> u64 {
        self.skipped_frames
    }

    /// Read and decode the next frame.
    ///
    /// Returns:
    /// - `Ok(Some(record))` - next decoded record
    /// - `Ok(None)` - end of capture
    /// - `Err(e)` - the container is corrupt; the sequence is over
    ///
    /// Sequence numbers follow frame position, so a skipped frame still
    /// consumes its number.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        if self.finished {
            return Ok(None);
        }

        loop {
            let decoded = match self.next_decoded() {
                Ok(Some(decoded)) => decoded,
                Ok(None) => {
                    self.finished = true;
                    debug!(
                        "End of capture after {} frames ({} skipped)",
                        self.frames_read, self.skipped_frames
                    );
                    return Ok(None);
                }
                Err(e) => {
                    self.finished = true;
                    return Err(e);
                }
            };

            self.frames_read += 1;
            let sequence_number = self.frames_read;

            match decoded {
                Ok(frame) => {
                    trace!("Frame {}: {:?}", sequence_number, frame.layers);
                    return Ok(Some(Record::new(sequence_number, frame)));
                }
                Err(e) => {
                    self.skipped_frames += 1;
                    warn!("Error processing packet {}: {}", sequence_number, e);
                }
            }
        }
    }

    /// Pull the next frame out of the container and decode it.
    ///
    /// The outer result is the container, the inner one the frame.
    fn next_decoded(&mut self) -> Result<Option<Result<DecodedFrame>>> {
        let path = &self.path;
        let decoder = &self.decoder;

        match &mut self.container {
            Container::Pcap(reader) => {
                let link_type = reader.header().datalink;
                match reader.next_packet() {
                    None => Ok(None),
                    Some(Err(e)) => Err(container_error(path, e)),
                    Some(Ok(packet)) => {
                        let frame = RawFrame {
                            timestamp: packet.timestamp,
                            data: &packet.data,
                            original_length: packet.orig_len,
                            link_type,
                        };
                        Ok(Some(decoder.decode(&frame)))
                    }
                }
            }
            Container::PcapNg { reader, interfaces } => loop {
                let block = match reader.next_block() {
                    None => return Ok(None),
                    Some(Err(e)) => return Err(container_error(path, e)),
                    Some(Ok(block)) => block,
                };

                match block {
                    Block::SectionHeader(_) => interfaces.clear(),
                    Block::InterfaceDescription(block) => {
                        let interface = Interface::from_block(&block);
                        trace!("Interface {}: {:?}", interfaces.len(), interface);
                        interfaces.push(interface);
                    }
                    Block::EnhancedPacket(packet) => {
                        let Some(interface) = interfaces.get(packet.interface_id as usize) else {
                            return Ok(Some(Err(IndexerError::frame_decode(format!(
                                "packet references unknown interface {}",
                                packet.interface_id
                            )))));
                        };
                        let frame = RawFrame {
                            timestamp: interface.timestamp(packet.timestamp),
                            data: &packet.data,
                            original_length: packet.original_len,
                            link_type: interface.link_type,
                        };
                        return Ok(Some(decoder.decode(&frame)));
                    }
                    Block::SimplePacket(packet) => {
                        let Some(interface) = interfaces.first() else {
                            return Ok(Some(Err(IndexerError::frame_decode(
                                "simple packet before any interface description",
                            ))));
                        };
                        let frame = RawFrame {
                            timestamp: Duration::ZERO,
                            data: &packet.data,
                            original_length: packet.original_len,
                            link_type: interface.link_type,
                        };
                        return Ok(Some(decoder.decode(&frame)));
                    }
                    _ => {}
                }
            },
        }
    }
}

fn container_error(path: &Path, err: pcap_file::PcapError) -> IndexerError {
    IndexerError::source_unavailable_with_source(path, "corrupt capture container", Box::new(err))
}

impl Iterator for CaptureReader {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

impl std::iter::FusedIterator for CaptureReader {}
