use std::fs;
use std::net::SocketAddrV4;
use std::path::Path;

use etherparse::PacketBuilder;
use thiserror::Error;

use super::layout;

/// Errors returned while synthesizing a capture.
#[derive(Debug, Error)]
pub enum CaptureWriteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot build frame: {0}")]
    Frame(String),
}

/// One link-layer frame and its capture timestamp in microseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub ts_us: u64,
    pub data: Vec<u8>,
}

/// Wraps a UDP payload in Ethernet + IPv4 + UDP headers.
///
/// Multicast destinations get the matching `01:00:5e` group MAC.
///
/// # Examples
/// ```
/// use mocapwire_core::ethernet_udp_frame;
/// use std::net::{Ipv4Addr, SocketAddrV4};
///
/// let src = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 1511);
/// let dst = SocketAddrV4::new(Ipv4Addr::new(239, 255, 42, 99), 1511);
/// let frame = ethernet_udp_frame(src, dst, &[7, 0, 0, 0]).unwrap();
/// assert_eq!(frame.len(), 14 + 20 + 8 + 4);
/// assert_eq!(&frame[..3], &[0x01, 0x00, 0x5e]);
/// ```
pub fn ethernet_udp_frame(
    src: SocketAddrV4,
    dst: SocketAddrV4,
    payload: &[u8],
) -> Result<Vec<u8>, CaptureWriteError> {
    let builder = PacketBuilder::ethernet2(layout::SOURCE_MAC, dest_mac(dst))
        .ipv4(src.ip().octets(), dst.ip().octets(), layout::IPV4_TTL)
        .udp(src.port(), dst.port());
    let mut frame = Vec::with_capacity(builder.size(payload.len()));
    builder
        .write(&mut frame, payload)
        .map_err(|err| CaptureWriteError::Frame(err.to_string()))?;
    Ok(frame)
}

fn dest_mac(dst: SocketAddrV4) -> [u8; 6] {
    if !dst.ip().is_multicast() {
        return layout::UNICAST_DEST_MAC;
    }
    let octets = dst.ip().octets();
    let prefix = layout::IPV4_MULTICAST_MAC_PREFIX;
    [
        prefix[0],
        prefix[1],
        prefix[2],
        octets[1] & 0x7f,
        octets[2],
        octets[3],
    ]
}

/// Serializes frames as a single-interface Ethernet pcapng capture.
pub fn encode_pcapng(frames: &[CapturedFrame]) -> Vec<u8> {
    let mut output = Vec::new();
    push_block(&mut output, layout::PCAPNG_SECTION_HEADER, &section_header_body());
    push_block(
        &mut output,
        layout::PCAPNG_INTERFACE_DESCRIPTION,
        &interface_description_body(),
    );
    for frame in frames {
        push_block(
            &mut output,
            layout::PCAPNG_ENHANCED_PACKET,
            &enhanced_packet_body(frame),
        );
    }
    output
}

/// Writes `frames` to `path` as pcapng, creating parent directories.
pub fn write_pcapng(path: &Path, frames: &[CapturedFrame]) -> Result<(), CaptureWriteError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, encode_pcapng(frames))?;
    Ok(())
}

fn push_block(output: &mut Vec<u8>, block_type: u32, body: &[u8]) {
    let total_len = (layout::PCAPNG_BLOCK_OVERHEAD + body.len()) as u32;
    output.extend_from_slice(&block_type.to_be_bytes());
    output.extend_from_slice(&total_len.to_be_bytes());
    output.extend_from_slice(body);
    output.extend_from_slice(&total_len.to_be_bytes());
}

fn section_header_body() -> Vec<u8> {
    let mut body = Vec::with_capacity(16);
    body.extend_from_slice(&layout::PCAPNG_BYTE_ORDER_MAGIC.to_be_bytes());
    body.extend_from_slice(&1u16.to_be_bytes());
    body.extend_from_slice(&0u16.to_be_bytes());
    // section length unknown
    body.extend_from_slice(&(-1i64).to_be_bytes());
    body
}

fn interface_description_body() -> Vec<u8> {
    let mut body = Vec::with_capacity(8);
    body.extend_from_slice(&layout::LINKTYPE_ETHERNET.to_be_bytes());
    body.extend_from_slice(&0u16.to_be_bytes());
    body.extend_from_slice(&layout::PCAPNG_SNAPLEN.to_be_bytes());
    body
}

fn enhanced_packet_body(frame: &CapturedFrame) -> Vec<u8> {
    let cap_len = frame.data.len() as u32;
    let pad_len = (4 - (frame.data.len() % 4)) % 4;
    let mut body = Vec::with_capacity(20 + frame.data.len() + pad_len);
    body.extend_from_slice(&0u32.to_be_bytes());
    body.extend_from_slice(&((frame.ts_us >> 32) as u32).to_be_bytes());
    body.extend_from_slice(&(frame.ts_us as u32).to_be_bytes());
    body.extend_from_slice(&cap_len.to_be_bytes());
    body.extend_from_slice(&cap_len.to_be_bytes());
    body.extend_from_slice(&frame.data);
    body.resize(body.len() + pad_len, 0);
    body
}

#[cfg(test)]
mod tests {
    use super::{CapturedFrame, encode_pcapng, ethernet_udp_frame};
    use crate::analysis::udp::parse_udp_packet;
    use pcap_parser::Linktype;
    use std::net::{Ipv4Addr, SocketAddrV4};

    #[test]
    fn unicast_frame_parses_back_to_udp() {
        let src = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 1510);
        let dst = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 50_000);
        let frame = ethernet_udp_frame(src, dst, &[1, 0, 0, 0]).unwrap();
        assert_eq!(&frame[..6], &[0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);

        let udp = parse_udp_packet(Linktype::ETHERNET, &frame).unwrap().unwrap();
        assert_eq!(udp.src_port, 1510);
        assert_eq!(udp.dst_port, 50_000);
        assert_eq!(udp.payload, &[1, 0, 0, 0]);
    }

    #[test]
    fn multicast_mac_keeps_low_23_bits() {
        let src = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 1511);
        let dst = SocketAddrV4::new(Ipv4Addr::new(239, 255, 42, 99), 1511);
        let frame = ethernet_udp_frame(src, dst, &[]).unwrap();
        assert_eq!(&frame[..6], &[0x01, 0x00, 0x5e, 0x7f, 42, 99]);
    }

    #[test]
    fn blocks_are_padded_to_four_bytes() {
        let bytes = encode_pcapng(&[CapturedFrame {
            ts_us: 1,
            data: vec![0xaa; 5],
        }]);
        // SHB 28 + IDB 20 + EPB (12 + 20 + 8)
        assert_eq!(bytes.len(), 28 + 20 + 40);
        assert_eq!(bytes.len() % 4, 0);
        assert_eq!(&bytes[..4], &[0x0a, 0x0d, 0x0d, 0x0a]);
    }
}
