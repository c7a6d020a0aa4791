//! UDP extraction from captured link-layer frames.

pub mod error;
pub mod parser;

pub use parser::{UdpPacket, parse_udp_packet};
