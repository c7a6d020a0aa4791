//! Capture file constants.

pub const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];
pub const PCAP_READER_BUFFER_SIZE: usize = 65_536;

pub const PCAPNG_SECTION_HEADER: u32 = 0x0A0D_0D0A;
pub const PCAPNG_INTERFACE_DESCRIPTION: u32 = 0x0000_0001;
pub const PCAPNG_ENHANCED_PACKET: u32 = 0x0000_0006;
pub const PCAPNG_BYTE_ORDER_MAGIC: u32 = 0x1A2B_3C4D;
pub const PCAPNG_BLOCK_OVERHEAD: usize = 12;
pub const PCAPNG_SNAPLEN: u32 = 65_535;
pub const LINKTYPE_ETHERNET: u16 = 1;

/// Default pcapng timestamp resolution (microseconds).
pub const PCAPNG_DEFAULT_TSRESOL: u8 = 6;
pub const TSRESOL_POWER_OF_TWO: u8 = 0x80;

pub const SOURCE_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
pub const UNICAST_DEST_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x02];
pub const IPV4_MULTICAST_MAC_PREFIX: [u8; 3] = [0x01, 0x00, 0x5e];
pub const IPV4_TTL: u8 = 64;
