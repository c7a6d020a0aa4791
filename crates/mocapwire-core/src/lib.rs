//! mocapwire core library: motion-capture stream decoding and offline replay.
//!
//! The protocol layer decodes the versioned binary streaming protocol spoken
//! by optical motion-capture servers: a 4-byte header, then a payload whose
//! layout is gated by the negotiated protocol version. Decoding is
//! byte-oriented, bounds-checked and side-effect free; faults are returned as
//! values and never abort more than the packet they occur in.
//!
//! Around it sits the offline pipeline used by the CLI: packet sources read
//! captures, the analysis layer extracts UDP datagrams on the command and data
//! ports, feeds them to one `PacketDecoder`, and aggregates a deterministic
//! report.
//!
//! Invariants:
//! - No decode path reads outside the packet's declared payload.
//! - The protocol version is committed only by server info or a confirmed
//!   bitstream change, and every decoder sharing a `StreamContext` sees it.
//! - Report outputs are deterministic and stable across runs.
//!
//! Version française (résumé):
//! Cette crate décode le protocole binaire versionné des serveurs de capture
//! de mouvement et rejoue des captures hors ligne : sources -> extraction UDP
//! -> décodeur de paquets -> rapport déterministe. Aucune lecture ne dépasse
//! la longueur déclarée d'un paquet ; une erreur n'affecte que ce paquet.
//!
//! # Examples
//! ```no_run
//! use std::path::Path;
//!
//! use mocapwire_core::{AnalysisOptions, analyze_pcap_file};
//!
//! let report = analyze_pcap_file(Path::new("capture.pcapng"), &AnalysisOptions::default())?;
//! println!("frames decoded: {}", report.stream.frames_decoded);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

mod analysis;
mod protocols;
mod source;

pub use analysis::{AnalysisError, AnalysisOptions, analyze_pcap_file, analyze_source};
pub use protocols::natnet;
pub use protocols::natnet::model::{
    DescriptionRecord, DescriptionSet, FrameFlags, FrameSnapshot, MarkerFlags, MarkerId, Name,
    Quat, Response, ServerInfo, Timecode, Vec3,
};
pub use protocols::natnet::{
    BitstreamState, ControlKind, DecodeError, DecodedPacket, EncodeError, Message, PacketDecoder,
    PacketHeader, ProtocolVersion, RecordKind, StreamContext, VersionParseError,
    build_bitstream_request, build_control_packet, build_packet, build_request_packet,
    decode_packet,
};
pub use source::{
    CaptureWriteError, CapturedFrame, PacketEvent, PacketSource, PcapFileSource, SessionError,
    SessionPlan, SourceError, VecSource, encode_pcapng, ethernet_udp_frame, synthetic_session,
    write_pcapng,
};

/// Current report schema version.
pub const REPORT_VERSION: u32 = 1;
/// Default timestamp used when no capture time is available.
pub const DEFAULT_GENERATED_AT: &str = "1970-01-01T00:00:00Z";

/// Aggregated replay report with deterministic ordering.
///
/// # Examples
/// ```
/// use mocapwire_core::make_stub_report;
///
/// let report = make_stub_report("capture.pcapng", 123);
/// assert_eq!(report.report_version, mocapwire_core::REPORT_VERSION);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Report schema version (not the binary version).
    pub report_version: u32,
    /// Tool identification metadata.
    pub tool: ToolInfo,
    /// RFC3339 timestamp representing the report generation time.
    pub generated_at: String,

    /// Input capture metadata.
    pub input: InputInfo,

    /// Optional capture summary (may be empty when unavailable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_summary: Option<CaptureSummary>,
    /// Protocol-level view of the replayed stream.
    pub stream: StreamSummary,
    /// Flow summaries in stable order.
    pub flows: Vec<FlowSummary>,
    /// Entries of the last model definition seen, in wire order.
    pub descriptions: Vec<DescriptionSummary>,
    /// Decode faults aggregated by id, errors first.
    pub faults: Vec<FaultSummary>,
    /// Every decoded frame, only when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames: Option<Vec<FrameRecord>>,
}

impl Report {
    /// Total number of fault occurrences across all ids.
    pub fn fault_count(&self) -> u64 {
        self.faults.iter().map(|fault| fault.count).sum()
    }
}

/// Tool metadata embedded in reports.
///
/// # Examples
/// ```
/// use mocapwire_core::ToolInfo;
///
/// let tool = ToolInfo {
///     name: "mocapwire".to_string(),
///     version: "0.1.0".to_string(),
/// };
/// assert_eq!(tool.name, "mocapwire");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name (e.g., "mocapwire").
    pub name: String,
    /// Tool version (semver).
    pub version: String,
}

/// Input capture metadata embedded in reports.
///
/// # Examples
/// ```
/// use mocapwire_core::InputInfo;
///
/// let input = InputInfo {
///     path: "capture.pcapng".to_string(),
///     bytes: 1024,
/// };
/// assert_eq!(input.bytes, 1024);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputInfo {
    /// Input path as provided to the analyzer.
    pub path: String,
    /// Input size in bytes.
    pub bytes: u64,
}

/// Basic capture summary (timestamps may be absent).
///
/// # Examples
/// ```
/// use mocapwire_core::CaptureSummary;
///
/// let summary = CaptureSummary {
///     packets_total: 10,
///     datagrams_matched: 8,
///     time_start: None,
///     time_end: None,
/// };
/// assert_eq!(summary.packets_total, 10);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSummary {
    /// Total packet count observed in the capture.
    pub packets_total: u64,
    /// UDP datagrams on the command or data port.
    pub datagrams_matched: u64,
    /// RFC3339 timestamp of the first packet (if known).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_start: Option<String>,
    /// RFC3339 timestamp of the last packet (if known).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_end: Option<String>,
}

/// Protocol-level summary of a replayed stream.
///
/// # Examples
/// ```
/// use mocapwire_core::StreamSummary;
///
/// let stream = StreamSummary::default();
/// assert_eq!(stream.frames_decoded, 0);
/// assert!(stream.protocol_version.is_none());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamSummary {
    /// Version in force at the end of the replay; absent while still the wildcard.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<String>,
    /// Last server info announced on the command channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerSummary>,
    /// Packets whose header could be read.
    pub packets_decoded: u64,
    /// Datagram tails too short to hold a packet header.
    pub header_errors: u64,
    /// Packet count per message kind (e.g. `frame_of_data`).
    pub messages: BTreeMap<String, u64>,
    /// Frames decoded without a fatal fault.
    pub frames_decoded: u64,
    /// Frames dropped while a bitstream change was pending.
    pub frames_skipped: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_frame: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_frame: Option<u32>,
    /// Frame numbers missing between consecutive decoded frames.
    pub frame_gaps: u64,
    /// `HH:MM:SS:FF.sub` of the first decoded frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_timecode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_timecode: Option<String>,
}

/// Server identification taken from the handshake.
///
/// # Examples
/// ```
/// use mocapwire_core::ServerSummary;
///
/// let server = ServerSummary {
///     app_name: "Motive".to_string(),
///     app_version: "3.1.0.0".to_string(),
///     protocol_version: "3.1.0.0".to_string(),
/// };
/// assert_eq!(server.app_name, "Motive");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSummary {
    pub app_name: String,
    pub app_version: String,
    pub protocol_version: String,
}

/// Flow-level summary for a UDP endpoint pair.
///
/// # Examples
/// ```
/// use mocapwire_core::FlowSummary;
///
/// let flow = FlowSummary {
///     channel: "data".to_string(),
///     src: "10.0.0.1:1511".to_string(),
///     dst: "239.255.42.99:1511".to_string(),
///     datagrams: 120,
///     packets: 120,
///     bytes: 48_000,
///     dps: None,
///     bps: None,
/// };
/// assert_eq!(flow.channel, "data");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSummary {
    /// Protocol channel the flow was matched on (`command` or `data`).
    pub channel: String,
    /// Source endpoint in `ip:port` form.
    pub src: String,
    /// Destination endpoint in `ip:port` form.
    pub dst: String,
    /// UDP datagrams seen on this flow.
    pub datagrams: u64,
    /// Protocol packets carried by those datagrams.
    pub packets: u64,
    /// UDP payload bytes.
    pub bytes: u64,
    /// Datagrams per second over the capture duration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dps: Option<f64>,
    /// Bytes per second over the capture duration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bps: Option<f64>,
}

/// One entry of a model definition.
///
/// # Examples
/// ```
/// use mocapwire_core::DescriptionSummary;
///
/// let entry = DescriptionSummary {
///     kind: "rigid_body".to_string(),
///     id: Some(3),
///     name: Some("wand".to_string()),
/// };
/// assert_eq!(entry.id, Some(3));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptionSummary {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl From<&DescriptionRecord> for DescriptionSummary {
    fn from(record: &DescriptionRecord) -> Self {
        Self {
            kind: record.kind_name().to_string(),
            id: record.id(),
            name: record.name().map(Name::to_string),
        }
    }
}

/// Decode faults sharing one stable id.
///
/// # Examples
/// ```
/// use mocapwire_core::FaultSummary;
///
/// let fault = FaultSummary {
///     id: "MW-BUFFER-OVERRUN".to_string(),
///     severity: "error".to_string(),
///     message: "Read past the end of the packet payload".to_string(),
///     count: 1,
///     examples: vec!["frame_of_data @ 1970-01-01T00:00:00Z: ...".to_string()],
/// };
/// assert_eq!(fault.count, 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultSummary {
    /// Stable fault identifier (e.g., `MW-CORRUPT-COUNT`).
    pub id: String,
    /// Severity label (`error` or `warning`).
    pub severity: String,
    /// Human-readable description of the fault class.
    pub message: String,
    /// Number of occurrences aggregated into this summary.
    pub count: u64,
    /// At most three example contexts, formatted as `kind @ ts: detail`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

/// A decoded frame with its capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<String>,
    pub frame: FrameSnapshot,
}

/// Build a stub report with base fields filled and empty aggregates.
///
/// # Examples
/// ```
/// use mocapwire_core::make_stub_report;
///
/// let report = make_stub_report("capture.pcapng", 123);
/// assert_eq!(report.report_version, mocapwire_core::REPORT_VERSION);
/// assert!(report.faults.is_empty());
/// ```
pub fn make_stub_report(input_path: &str, input_bytes: u64) -> Report {
    Report {
        report_version: REPORT_VERSION,
        tool: ToolInfo {
            name: "mocapwire".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        generated_at: DEFAULT_GENERATED_AT.to_string(),
        input: InputInfo {
            path: input_path.to_string(),
            bytes: input_bytes,
        },
        capture_summary: None,
        stream: StreamSummary::default(),
        flows: vec![],
        descriptions: vec![],
        faults: vec![],
        frames: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_omits_optional_fields_when_none() {
        let mut report = make_stub_report("capture.pcapng", 1);
        report.capture_summary = Some(CaptureSummary {
            packets_total: 1,
            datagrams_matched: 1,
            time_start: None,
            time_end: None,
        });
        report.flows = vec![FlowSummary {
            channel: "command".to_string(),
            src: "10.0.0.1:1510".to_string(),
            dst: "10.0.0.2:50000".to_string(),
            datagrams: 1,
            packets: 1,
            bytes: 268,
            dps: None,
            bps: None,
        }];
        report.descriptions = vec![DescriptionSummary {
            kind: "markerset".to_string(),
            id: None,
            name: Some("all".to_string()),
        }];

        let value = serde_json::to_value(&report).expect("report json");
        let capture = value.get("capture_summary").expect("capture_summary");
        assert!(capture.get("time_start").is_none());
        assert!(capture.get("time_end").is_none());

        let stream = value.get("stream").expect("stream");
        assert!(stream.get("protocol_version").is_none());
        assert!(stream.get("first_frame").is_none());
        assert!(stream.get("server").is_none());

        let flow = &value["flows"][0];
        assert!(flow.get("dps").is_none());
        assert!(flow.get("bps").is_none());

        assert!(value["descriptions"][0].get("id").is_none());
        assert!(value.get("frames").is_none());
    }

    #[test]
    fn fault_count_sums_occurrences() {
        let mut report = make_stub_report("capture.pcapng", 1);
        report.faults = vec![
            FaultSummary {
                id: "MW-CORRUPT-COUNT".to_string(),
                severity: "error".to_string(),
                message: String::new(),
                count: 2,
                examples: vec![],
            },
            FaultSummary {
                id: "MW-UNKNOWN-MESSAGE".to_string(),
                severity: "warning".to_string(),
                message: String::new(),
                count: 3,
                examples: vec![],
            },
        ];
        assert_eq!(report.fault_count(), 5);
    }

    #[test]
    fn report_round_trips_through_json() {
        let mut report = make_stub_report("capture.pcapng", 10);
        report.stream.messages.insert("server_info".to_string(), 1);
        report.frames = Some(vec![FrameRecord {
            captured_at: None,
            frame: FrameSnapshot {
                frame_number: 7,
                ..FrameSnapshot::default()
            },
        }]);

        let json = serde_json::to_string(&report).expect("serialize");
        let back: Report = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.stream.messages.get("server_info"), Some(&1));
        assert_eq!(back.frames.as_ref().map(Vec::len), Some(1));
    }
}
