//! Capture container detection

use std::fmt;

const PCAPNG_SECTION_MAGIC: u32 = 0x0A0D_0D0A;
const PCAP_MAGICS: [u32; 2] = [
    0xA1B2_C3D4, // microsecond resolution
    0xA1B2_3C4D, // nanosecond resolution
];

/// Container format of a capture file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFormat {
    /// Classic libpcap
    Pcap,
    /// pcap next generation
    PcapNg,
}

impl CaptureFormat {
    /// Detect the container from the leading magic number, in either byte order
    pub fn detect(data: &[u8]) -> Option<Self> {
        let head: [u8; 4] = data.get(..4)?.try_into().ok()?;
        let le = u32::from_le_bytes(head);
        let be = u32::from_be_bytes(head);

        if le == PCAPNG_SECTION_MAGIC {
            Some(CaptureFormat::PcapNg)
        } else if PCAP_MAGICS.contains(&le) || PCAP_MAGICS.contains(&be) {
            Some(CaptureFormat::Pcap)
        } else {
            None
        }
    }
}

impl fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureFormat::Pcap => f.write_str("pcap"),
            CaptureFormat::PcapNg => f.write_str("pcapng"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_both_byte_orders() {
        assert_eq!(CaptureFormat::detect(&[0xd4, 0xc3, 0xb2, 0xa1, 0, 0]), Some(CaptureFormat::Pcap));
        assert_eq!(CaptureFormat::detect(&[0xa1, 0xb2, 0xc3, 0xd4]), Some(CaptureFormat::Pcap));
        assert_eq!(CaptureFormat::detect(&[0x4d, 0x3c, 0xb2, 0xa1]), Some(CaptureFormat::Pcap));
        assert_eq!(CaptureFormat::detect(&[0x0a, 0x0d, 0x0d, 0x0a]), Some(CaptureFormat::PcapNg));
    }

    #[test]
    fn rejects_unknown_or_short_input() {
        assert_eq!(CaptureFormat::detect(b"GIF89a"), None);
        assert_eq!(CaptureFormat::detect(&[0xd4, 0xc3]), None);
        assert_eq!(CaptureFormat::detect(&[]), None);
    }
}
