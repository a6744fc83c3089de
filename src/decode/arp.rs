//! Address resolution body parsing
//!
//! etherparse stops at the Ethernet header for ARP frames, so the body is read
//! here. Layout (RFC 826):
//!
//! ```text
//! htype(2) ptype(2) hlen(1) plen(1) oper(2)
//! sender hw(hlen) sender proto(plen) target hw(hlen) target proto(plen)
//! ```

use std::net::Ipv4Addr;

use crate::types::AddressPair;

pub const ETHERTYPE_ARP: u16 = 0x0806;
const ETHERTYPE_IPV4: u16 = 0x0800;
const FIXED_LEN: usize = 8;

/// Parse an ARP body into its sender/target protocol addresses.
///
/// Returns `Ok(None)` for a well-formed body whose protocol space is not IPv4.
pub fn parse_arp(body: &[u8]) -> Result<Option<AddressPair>, String> {
    if body.len() < FIXED_LEN {
        return Err(format!("ARP header too short: {} bytes", body.len()));
    }

    let protocol_type = u16::from_be_bytes([body[2], body[3]]);
    let hardware_size = body[4] as usize;
    let protocol_size = body[5] as usize;

    let required = FIXED_LEN + 2 * (hardware_size + protocol_size);
    if body.len() < required {
        return Err(format!("ARP body too short: {} of {} bytes", body.len(), required));
    }

    if protocol_type != ETHERTYPE_IPV4 || protocol_size != 4 {
        return Ok(None);
    }

    let sender_at = FIXED_LEN + hardware_size;
    let target_at = sender_at + protocol_size + hardware_size;
    let sender = ipv4_at(body, sender_at);
    let target = ipv4_at(body, target_at);

    Ok(Some(AddressPair::new(sender, target)))
}

fn ipv4_at(body: &[u8], at: usize) -> Ipv4Addr {
    Ipv4Addr::new(body[at], body[at + 1], body[at + 2], body[at + 3])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    const REQUEST: [u8; 28] = [
        0x00, 0x01, // Hardware type: Ethernet
        0x08, 0x00, // Protocol type: IPv4
        0x06, // Hardware size
        0x04, // Protocol size
        0x00, 0x01, // Operation: Request
        0x00, 0x11, 0x22, 0x33, 0x44, 0x55, // Sender MAC
        0xc0, 0xa8, 0x01, 0x01, // Sender IP: 192.168.1.1
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // Target MAC
        0xc0, 0xa8, 0x01, 0x02, // Target IP: 192.168.1.2
    ];

    #[test]
    fn parses_ipv4_request() {
        let pair = parse_arp(&REQUEST).unwrap().expect("IPv4 ARP carries addresses");
        assert_eq!(pair.source, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(pair.destination, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 2)));
    }

    #[test]
    fn trailing_padding_is_ignored() {
        let mut padded = REQUEST.to_vec();
        padded.extend_from_slice(&[0u8; 18]);
        assert!(parse_arp(&padded).unwrap().is_some());
    }

    #[test]
    fn non_ipv4_protocol_space_has_no_addresses() {
        let mut other = REQUEST;
        other[2] = 0x86;
        other[3] = 0xdd;
        assert_eq!(parse_arp(&other).unwrap(), None);
    }

    #[test]
    fn truncated_body_is_an_error() {
        assert!(parse_arp(&REQUEST[..4]).is_err());
        assert!(parse_arp(&REQUEST[..20]).is_err());
    }
}
