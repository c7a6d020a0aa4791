use std::collections::BTreeMap;

use crate::protocols::natnet::{DecodeError, DecodedPacket, Message, ProtocolVersion};
use crate::{DescriptionSummary, FaultSummary, FrameRecord, ServerSummary, StreamSummary};

use super::ts_to_rfc3339;

const MAX_FAULT_EXAMPLES: usize = 3;
const HEADER_FAULT_CONTEXT: &str = "datagram tail";

/// Accumulates decoded packets into the stream part of a report.
pub(crate) struct StreamStats {
    summary: StreamSummary,
    descriptions: Vec<DescriptionSummary>,
    faults: BTreeMap<&'static str, FaultStats>,
    frames: Option<Vec<FrameRecord>>,
}

struct FaultStats {
    severity: &'static str,
    message: &'static str,
    count: u64,
    examples: Vec<String>,
}

pub(crate) struct StreamOutcome {
    pub summary: StreamSummary,
    pub descriptions: Vec<DescriptionSummary>,
    pub faults: Vec<FaultSummary>,
    pub frames: Option<Vec<FrameRecord>>,
}

impl StreamStats {
    pub(crate) fn new(include_frames: bool) -> Self {
        Self {
            summary: StreamSummary::default(),
            descriptions: Vec::new(),
            faults: BTreeMap::new(),
            frames: include_frames.then(Vec::new),
        }
    }

    pub(crate) fn record(&mut self, ts: Option<f64>, result: Result<DecodedPacket, DecodeError>) {
        match result {
            Ok(packet) => self.record_packet(ts, packet),
            Err(fault) => {
                self.summary.header_errors += 1;
                self.record_fault(HEADER_FAULT_CONTEXT, ts, &fault);
            }
        }
    }

    fn record_packet(&mut self, ts: Option<f64>, packet: DecodedPacket) {
        self.summary.packets_decoded += 1;
        let kind = packet
            .message
            .as_ref()
            .map(Message::kind_name)
            .unwrap_or_else(|| packet.header.kind_name());
        *self.summary.messages.entry(kind.to_string()).or_default() += 1;

        for fault in &packet.faults {
            self.record_fault(kind, ts, fault);
        }

        match packet.message {
            Some(Message::ServerInfo(info)) => {
                self.summary.server = Some(ServerSummary {
                    app_name: info.app_name.to_string(),
                    app_version: info.app_version.to_string(),
                    protocol_version: info.protocol_version.to_string(),
                });
            }
            Some(Message::ModelDef(set)) => {
                self.descriptions = set.records.iter().map(DescriptionSummary::from).collect();
            }
            Some(Message::FrameOfData(frame)) => {
                self.record_frame(frame.frame_number, frame.suffix.timecode.to_string());
                if let Some(frames) = self.frames.as_mut() {
                    frames.push(FrameRecord {
                        captured_at: ts_to_rfc3339(ts),
                        frame: *frame,
                    });
                }
            }
            Some(Message::FrameSkipped) => self.summary.frames_skipped += 1,
            _ => {}
        }
    }

    fn record_frame(&mut self, frame_number: u32, timecode: String) {
        let summary = &mut self.summary;
        summary.frames_decoded += 1;
        if let Some(previous) = summary.last_frame {
            if frame_number > previous {
                summary.frame_gaps += u64::from(frame_number - previous - 1);
            }
        }
        summary.first_frame.get_or_insert(frame_number);
        summary.last_frame = Some(frame_number);
        if summary.first_timecode.is_none() {
            summary.first_timecode = Some(timecode.clone());
        }
        summary.last_timecode = Some(timecode);
    }

    fn record_fault(&mut self, context: &str, ts: Option<f64>, fault: &DecodeError) {
        let entry = self.faults.entry(fault.code()).or_insert_with(|| FaultStats {
            severity: fault.severity(),
            message: fault_message(fault),
            count: 0,
            examples: Vec::new(),
        });
        entry.count += 1;
        if entry.examples.len() < MAX_FAULT_EXAMPLES {
            let when = ts_to_rfc3339(ts).unwrap_or_else(|| "unknown time".to_string());
            entry.examples.push(format!("{context} @ {when}: {fault}"));
        }
    }

    pub(crate) fn finish(self, version: ProtocolVersion) -> StreamOutcome {
        let mut summary = self.summary;
        if !version.is_wildcard() {
            summary.protocol_version = Some(version.to_string());
        }

        let mut faults: Vec<FaultSummary> = self
            .faults
            .into_iter()
            .map(|(id, stats)| FaultSummary {
                id: id.to_string(),
                severity: stats.severity.to_string(),
                message: stats.message.to_string(),
                count: stats.count,
                examples: stats.examples,
            })
            .collect();
        // ids are already ordered; stable sort keeps that within a severity
        faults.sort_by_key(|fault| fault.severity != "error");

        StreamOutcome {
            summary,
            descriptions: self.descriptions,
            faults,
            frames: self.frames,
        }
    }
}

fn fault_message(fault: &DecodeError) -> &'static str {
    match fault {
        DecodeError::BufferOverrun { .. } => "Read past the end of the packet payload",
        DecodeError::CorruptCount { .. } => "Element count exceeds its sanity ceiling",
        DecodeError::TruncatedRecord { .. } => "Model definition cut off mid-record",
        DecodeError::UnknownMessage { .. } => "Unassigned message id",
        DecodeError::UnknownDescriptorType { .. } => "Description skipped by its declared size",
        DecodeError::UnknownFrameSection { .. } => "Frame section size mismatch",
        DecodeError::TrailingOrShortData { .. } => "Payload length differs from bytes consumed",
    }
}
