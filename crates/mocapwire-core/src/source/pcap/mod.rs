//! PCAP/PCAPNG capture files.
//!
//! Reading goes through `PcapFileSource`, which emits raw link-layer packet
//! events for the analysis pipeline. `writer` goes the other way and
//! synthesizes pcapng captures of protocol traffic for fixtures and tests.

pub mod clock;
pub mod error;
pub mod layout;
pub mod parser;
pub mod writer;

pub use parser::PcapFileSource;
