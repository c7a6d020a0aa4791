//! Wire constants for the mocap streaming protocol.
//!
//! All multi-byte fields are little-endian and unaligned. Offsets reported in
//! faults are relative to the first byte of the packet header.

pub const HEADER_LEN: usize = 4;
pub const MESSAGE_ID_RANGE: std::ops::Range<usize> = 0..2;
pub const PAYLOAD_LEN_RANGE: std::ops::Range<usize> = 2..4;

pub const NAT_CONNECT: u16 = 0;
pub const NAT_SERVERINFO: u16 = 1;
pub const NAT_REQUEST: u16 = 2;
pub const NAT_RESPONSE: u16 = 3;
pub const NAT_REQUEST_MODELDEF: u16 = 4;
pub const NAT_MODELDEF: u16 = 5;
pub const NAT_REQUEST_FRAMEOFDATA: u16 = 6;
pub const NAT_FRAMEOFDATA: u16 = 7;
pub const NAT_MESSAGESTRING: u16 = 8;
pub const NAT_DISCONNECT: u16 = 9;
pub const NAT_KEEPALIVE: u16 = 10;
pub const NAT_UNRECOGNIZED_REQUEST: u16 = 100;

pub const DESCRIPTION_MARKERSET: u32 = 0;
pub const DESCRIPTION_RIGID_BODY: u32 = 1;
pub const DESCRIPTION_SKELETON: u32 = 2;
pub const DESCRIPTION_FORCE_PLATE: u32 = 3;
pub const DESCRIPTION_DEVICE: u32 = 4;
pub const DESCRIPTION_CAMERA: u32 = 5;
pub const DESCRIPTION_ASSET: u32 = 6;

pub const SERVER_NAME_LEN: usize = 256;
pub const SERVER_INFO_LEN: usize = SERVER_NAME_LEN + 4 + 4;
pub const RESPONSE_CODE_LEN: usize = 4;

pub const VEC3_LEN: usize = 12;
pub const QUAT_LEN: usize = 16;

pub const FORCE_PLATE_CAL_ROWS: usize = 12;
pub const FORCE_PLATE_CAL_COLS: usize = 12;
pub const FORCE_PLATE_CORNERS: usize = 4;

/// Rigid-body descriptions above this many markers are treated as corrupt.
pub const MAX_RIGID_BODY_MARKERS: u64 = 16_000;
/// Counts travel as signed 32-bit integers; anything above is corrupt.
pub const MAX_COUNT: u64 = i32::MAX as u64;

/// Bytes from the end of a frame payload to its 16-bit flags field
/// (flags + end-of-data marker).
pub const FRAME_FLAGS_FROM_END: usize = 6;
pub const END_OF_DATA_LEN: usize = 4;

pub const TRACKING_VALID_BIT: u16 = 0x01;
pub const RESIDUAL_SCALE: f32 = 1000.0;

pub const TIMECODE_HOUR_SHIFT: u32 = 24;
pub const TIMECODE_MINUTE_SHIFT: u32 = 16;
pub const TIMECODE_SECOND_SHIFT: u32 = 8;

pub const BITSTREAM_COMMAND: &str = "Bitstream";

pub const PORT_COMMAND: u16 = 1510;
pub const PORT_DATA: u16 = 1511;
pub const MULTICAST_ADDRESS: [u8; 4] = [239, 255, 42, 99];
