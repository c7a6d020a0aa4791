use std::net::IpAddr;

use etherparse::{IpNumber, NetSlice, SlicedPacket, TransportSlice};
use pcap_parser::Linktype;

use super::error::UdpError;

/// UDP datagram borrowed from a captured frame.
#[derive(Debug, Clone, Copy)]
pub struct UdpPacket<'a> {
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
    pub payload: &'a [u8],
}

impl UdpPacket<'_> {
    /// True when either endpoint uses `port`.
    pub fn touches_port(&self, port: u16) -> bool {
        self.src_port == port || self.dst_port == port
    }
}

/// Parse a UDP packet from a link-layer frame.
///
/// Returns `Ok(None)` when the payload is not UDP. A fragment of a UDP
/// datagram is an error so that the caller can report it.
pub fn parse_udp_packet(
    linktype: Linktype,
    data: &[u8],
) -> Result<Option<UdpPacket<'_>>, UdpError> {
    let sliced = match linktype {
        Linktype::ETHERNET => {
            SlicedPacket::from_ethernet(data).map_err(|e| UdpError::Slice(e.to_string()))?
        }
        Linktype::RAW => SlicedPacket::from_ip(data).map_err(|e| UdpError::Slice(e.to_string()))?,
        _ => return Ok(None),
    };

    let net = sliced.net.ok_or(UdpError::MissingNetworkLayer)?;
    let udp = match sliced.transport {
        Some(TransportSlice::Udp(udp)) => udp,
        Some(_) => return Ok(None),
        None => {
            return match net.ip_payload_ref() {
                Some(ip) if ip.fragmented && ip.ip_number == IpNumber::UDP => {
                    Err(UdpError::Fragmented {
                        total_len: data.len(),
                    })
                }
                _ => Ok(None),
            };
        }
    };

    let (src_ip, dst_ip) = match net {
        NetSlice::Ipv4(ref ipv4) => (
            IpAddr::V4(ipv4.header().source_addr()),
            IpAddr::V4(ipv4.header().destination_addr()),
        ),
        NetSlice::Ipv6(ref ipv6) => (
            IpAddr::V6(ipv6.header().source_addr()),
            IpAddr::V6(ipv6.header().destination_addr()),
        ),
    };

    Ok(Some(UdpPacket {
        src_ip,
        src_port: udp.source_port(),
        dst_ip,
        dst_port: udp.destination_port(),
        payload: udp.payload(),
    }))
}
