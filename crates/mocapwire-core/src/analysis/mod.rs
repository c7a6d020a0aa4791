use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{debug, info, warn};

use crate::protocols::natnet::{PacketDecoder, ProtocolVersion, layout};
use crate::source::{PacketEvent, PacketSource, PcapFileSource, SourceError};
use crate::{CaptureSummary, DEFAULT_GENERATED_AT, Report, make_stub_report};

mod flows;
mod stream;
pub mod udp;

use flows::{Channel, FlowKey, FlowStats, add_flow_stats, build_flow_summaries};
use stream::StreamStats;
use udp::error::UdpError;
use udp::parse_udp_packet;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

/// Knobs for replaying a capture.
///
/// # Examples
/// ```
/// use mocapwire_core::{AnalysisOptions, ProtocolVersion};
///
/// let options = AnalysisOptions {
///     initial_version: Some(ProtocolVersion::new(3, 1, 0, 0)),
///     ..AnalysisOptions::default()
/// };
/// assert_eq!(options.command_port, 1510);
/// assert_eq!(options.data_port, 1511);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisOptions {
    pub command_port: u16,
    pub data_port: u16,
    /// Version assumed until the capture announces one; wildcard when `None`.
    pub initial_version: Option<ProtocolVersion>,
    /// Keep every decoded frame in the report.
    pub include_frames: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            command_port: layout::PORT_COMMAND,
            data_port: layout::PORT_DATA,
            initial_version: None,
            include_frames: false,
        }
    }
}

pub fn analyze_pcap_file(path: &Path, options: &AnalysisOptions) -> Result<Report, AnalysisError> {
    let source = PcapFileSource::open(path)?;
    analyze_source(path, source, options)
}

/// Replays `source` through one decoder and aggregates a report.
///
/// Every UDP datagram whose source or destination port is the command or data
/// port is decoded in capture order, so server info seen on the command
/// channel sets the version used for later frames. `path` only labels the
/// report; its size is recorded when it exists on disk.
pub fn analyze_source<S: PacketSource>(
    path: &Path,
    mut source: S,
    options: &AnalysisOptions,
) -> Result<Report, AnalysisError> {
    let decoder = match options.initial_version {
        Some(version) => PacketDecoder::with_version(version),
        None => PacketDecoder::new(),
    };
    let mut packets_total = 0u64;
    let mut datagrams_matched = 0u64;
    let mut first_ts = None;
    let mut last_ts = None;
    let mut flow_stats: HashMap<FlowKey, FlowStats> = HashMap::new();
    let mut stream = StreamStats::new(options.include_frames);

    while let Some(PacketEvent { ts, linktype, data }) = source.next_packet()? {
        packets_total += 1;
        update_ts_bounds(&mut first_ts, &mut last_ts, ts);
        let udp = match parse_udp_packet(linktype, &data) {
            Ok(Some(udp)) => udp,
            Ok(None) => continue,
            Err(err @ UdpError::Fragmented { .. }) => {
                warn!(packet = packets_total, %err, "skipping fragment");
                continue;
            }
            Err(err) => {
                debug!(packet = packets_total, %err, "skipping undecodable frame");
                continue;
            }
        };
        let channel = if udp.touches_port(options.command_port) {
            Channel::Command
        } else if udp.touches_port(options.data_port) {
            Channel::Data
        } else {
            continue;
        };

        datagrams_matched += 1;
        let results = decoder.decode_datagram(udp.payload);
        let packets = results.iter().filter(|result| result.is_ok()).count() as u64;
        add_flow_stats(&mut flow_stats, channel, &udp, packets);
        for result in results {
            stream.record(ts, result);
        }
    }

    let input_bytes = path.metadata().map(|meta| meta.len()).unwrap_or_default();
    let mut report = make_stub_report(&path.display().to_string(), input_bytes);
    report.capture_summary = Some(CaptureSummary {
        packets_total,
        datagrams_matched,
        time_start: ts_to_rfc3339(first_ts),
        time_end: ts_to_rfc3339(last_ts),
    });
    report.generated_at = report
        .capture_summary
        .as_ref()
        .and_then(|summary| summary.time_end.clone().or(summary.time_start.clone()))
        .unwrap_or_else(|| DEFAULT_GENERATED_AT.to_string());

    let duration_s = match (first_ts, last_ts) {
        (Some(start), Some(end)) if end > start => Some(end - start),
        _ => None,
    };

    let outcome = stream.finish(decoder.version());
    info!(
        packets = packets_total,
        datagrams = datagrams_matched,
        frames = outcome.summary.frames_decoded,
        faults = outcome.faults.len(),
        "capture replayed"
    );
    report.stream = outcome.summary;
    report.descriptions = outcome.descriptions;
    report.faults = outcome.faults;
    report.frames = outcome.frames;
    report.flows = build_flow_summaries(flow_stats, duration_s);
    Ok(report)
}

fn update_ts_bounds(first: &mut Option<f64>, last: &mut Option<f64>, ts: Option<f64>) {
    let ts = match ts {
        Some(ts) => ts,
        None => return,
    };
    match first {
        None => *first = Some(ts),
        Some(existing) => {
            if ts < *existing {
                *first = Some(ts);
            }
        }
    }
    match last {
        None => *last = Some(ts),
        Some(existing) => {
            if ts > *existing {
                *last = Some(ts);
            }
        }
    }
}

fn ts_to_rfc3339(ts: Option<f64>) -> Option<String> {
    let ts = ts?;
    let nanos = (ts * 1_000_000_000.0) as i128;
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
}
