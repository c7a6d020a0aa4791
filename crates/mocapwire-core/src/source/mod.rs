//! Packet sources feeding the capture pipeline.

pub mod pcap;
pub mod synthetic;

pub use pcap::PcapFileSource;
use pcap::error::PcapSourceError;
pub use pcap::writer::{
    CaptureWriteError, CapturedFrame, encode_pcapng, ethernet_udp_frame, write_pcapng,
};
pub use synthetic::{SessionError, SessionPlan, synthetic_session};

use pcap_parser::Linktype;
use thiserror::Error;

/// One captured link-layer frame.
#[derive(Debug, Clone)]
pub struct PacketEvent {
    /// Capture time in seconds since the Unix epoch, when known.
    pub ts: Option<f64>,
    pub linktype: Linktype,
    pub data: Vec<u8>,
}

/// Anything that yields captured frames in order.
pub trait PacketSource {
    fn next_packet(&mut self) -> Result<Option<PacketEvent>, SourceError>;
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("capture parse error: {0}")]
    Pcap(String),
}

impl From<PcapSourceError> for SourceError {
    fn from(value: PcapSourceError) -> Self {
        match value {
            PcapSourceError::Io(err) => SourceError::Io(err),
            other => SourceError::Pcap(other.to_string()),
        }
    }
}

/// Replays a fixed list of events; handy for feeding the pipeline in tests.
#[derive(Debug, Default)]
pub struct VecSource {
    events: std::collections::VecDeque<PacketEvent>,
}

impl VecSource {
    pub fn new(events: Vec<PacketEvent>) -> Self {
        Self {
            events: events.into(),
        }
    }
}

impl PacketSource for VecSource {
    fn next_packet(&mut self) -> Result<Option<PacketEvent>, SourceError> {
        Ok(self.events.pop_front())
    }
}
