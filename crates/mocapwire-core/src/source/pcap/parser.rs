use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use pcap_parser::{
    Block, LegacyPcapReader, Linktype, PcapBlockOwned, PcapError, PcapNGReader,
    traits::PcapReaderIterator,
};
use tracing::debug;

use crate::source::{PacketEvent, PacketSource, SourceError};

use super::clock::InterfaceClock;
use super::error::PcapSourceError;
use super::layout;

/// Packet source over a `.pcap` or `.pcapng` file, chosen by magic bytes.
pub struct PcapFileSource {
    inner: PcapReader,
}

enum PcapReader {
    Legacy {
        reader: LegacyPcapReader<File>,
        blocks: u64,
        linktype: Option<Linktype>,
        nanosecond: bool,
    },
    Ng {
        reader: PcapNGReader<File>,
        blocks: u64,
        linktypes: Vec<Linktype>,
        clocks: Vec<InterfaceClock>,
    },
}

impl PcapFileSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path).map_err(SourceError::from)?;
        let inner = create_reader(file).map_err(SourceError::from)?;
        Ok(Self { inner })
    }
}

impl PacketSource for PcapFileSource {
    fn next_packet(&mut self) -> Result<Option<PacketEvent>, SourceError> {
        let event = match &mut self.inner {
            PcapReader::Legacy {
                reader,
                blocks,
                linktype,
                nanosecond,
            } => next_event(reader, "pcap", blocks, |block| match block {
                PcapBlockOwned::LegacyHeader(header) => {
                    *linktype = Some(header.network);
                    *nanosecond = header.is_nanosecond_precision();
                    None
                }
                PcapBlockOwned::Legacy(packet) => {
                    let fraction = if *nanosecond { 1e-9 } else { 1e-6 };
                    Some(PacketEvent {
                        ts: Some(packet.ts_sec as f64 + packet.ts_usec as f64 * fraction),
                        linktype: linktype.unwrap_or(Linktype::ETHERNET),
                        data: packet.data.to_vec(),
                    })
                }
                _ => None,
            }),
            PcapReader::Ng {
                reader,
                blocks,
                linktypes,
                clocks,
            } => next_event(reader, "pcapng", blocks, |block| match block {
                PcapBlockOwned::NG(Block::InterfaceDescription(intf)) => {
                    linktypes.push(intf.linktype);
                    clocks.push(InterfaceClock::new(intf.if_tsresol));
                    None
                }
                PcapBlockOwned::NG(Block::EnhancedPacket(packet)) => {
                    let clock = clocks
                        .get(packet.if_id as usize)
                        .copied()
                        .unwrap_or_default();
                    Some(PacketEvent {
                        ts: clock.seconds(packet.ts_high, packet.ts_low),
                        linktype: linktypes
                            .get(packet.if_id as usize)
                            .copied()
                            .unwrap_or(Linktype::ETHERNET),
                        data: packet.data.to_vec(),
                    })
                }
                _ => None,
            }),
        };
        event.map_err(SourceError::from)
    }
}

fn create_reader(mut file: File) -> Result<PcapReader, PcapSourceError> {
    let mut magic = Vec::with_capacity(layout::PCAPNG_MAGIC.len());
    (&mut file)
        .take(layout::PCAPNG_MAGIC.len() as u64)
        .read_to_end(&mut magic)?;
    if magic.len() < layout::PCAPNG_MAGIC.len() {
        return Err(PcapSourceError::TooShort { len: magic.len() });
    }
    file.rewind()?;

    if magic == layout::PCAPNG_MAGIC {
        let reader = PcapNGReader::new(layout::PCAP_READER_BUFFER_SIZE, file).map_err(|e| {
            PcapSourceError::Open {
                format: "pcapng",
                message: e.to_string(),
            }
        })?;
        Ok(PcapReader::Ng {
            reader,
            blocks: 0,
            linktypes: Vec::new(),
            clocks: Vec::new(),
        })
    } else {
        let reader = LegacyPcapReader::new(layout::PCAP_READER_BUFFER_SIZE, file).map_err(|e| {
            PcapSourceError::Open {
                format: "pcap",
                message: e.to_string(),
            }
        })?;
        Ok(PcapReader::Legacy {
            reader,
            blocks: 0,
            linktype: None,
            nanosecond: false,
        })
    }
}

/// Pulls blocks until `on_block` turns one into a packet event. `blocks`
/// counts consumed blocks so errors can say where the file went bad.
fn next_event<R, F>(
    reader: &mut R,
    format: &'static str,
    blocks: &mut u64,
    mut on_block: F,
) -> Result<Option<PacketEvent>, PcapSourceError>
where
    R: PcapReaderIterator,
    F: FnMut(PcapBlockOwned<'_>) -> Option<PacketEvent>,
{
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                let event = on_block(block);
                reader.consume(offset);
                *blocks += 1;
                if event.is_some() {
                    return Ok(event);
                }
            }
            Err(PcapError::Eof) => return Ok(None),
            Err(PcapError::Incomplete(_)) => {
                debug!(format, "refilling capture buffer");
                reader.refill().map_err(|e| PcapSourceError::Block {
                    format,
                    block: *blocks,
                    message: e.to_string(),
                })?;
            }
            Err(e) => {
                return Err(PcapSourceError::Block {
                    format,
                    block: *blocks,
                    message: e.to_string(),
                });
            }
        }
    }
}
