use std::sync::Arc;
use std::thread;

use mocapwire_core::natnet::{encode_frame, encode_server_info, layout};
use mocapwire_core::{
    AnalysisOptions, BitstreamState, FrameFlags, FrameSnapshot, Message, PacketDecoder,
    ProtocolVersion, ServerInfo, SessionPlan, StreamContext, analyze_pcap_file,
    build_bitstream_request, build_packet, synthetic_session, write_pcapng,
};
use tempfile::TempDir;

fn frame_packet(frame: &FrameSnapshot, version: ProtocolVersion) -> Vec<u8> {
    build_packet(layout::NAT_FRAMEOFDATA, &encode_frame(frame, version)).unwrap()
}

#[test]
fn handshake_then_zero_count_frame() {
    let decoder = PacketDecoder::new();
    let info = ServerInfo {
        app_name: "Motive".into(),
        app_version: ProtocolVersion::new(3, 1, 0, 0),
        protocol_version: ProtocolVersion::new(3, 1, 0, 0),
    };
    let handshake = build_packet(layout::NAT_SERVERINFO, &encode_server_info(&info)).unwrap();

    let decoded = decoder.decode(&handshake).unwrap();
    assert_eq!(decoded.message, Some(Message::ServerInfo(info)));
    assert_eq!(decoder.version(), ProtocolVersion::new(3, 1, 0, 0));

    let frame = FrameSnapshot {
        frame_number: 1,
        ..FrameSnapshot::default()
    };
    let packet = frame_packet(&frame, decoder.version());
    let decoded = decoder.decode(&packet).unwrap();
    assert!(decoded.faults.is_empty(), "{:?}", decoded.faults);
    assert_eq!(decoded.consumed, packet.len());
    match decoded.message {
        Some(Message::FrameOfData(snapshot)) => {
            assert_eq!(snapshot.frame_number, 1);
            assert!(snapshot.is_empty());
        }
        other => panic!("expected a frame, got {other:?}"),
    }
}

#[test]
fn decoders_sharing_a_context_follow_a_bitstream_change() {
    let context = Arc::new(StreamContext::new(ProtocolVersion::new(3, 1, 0, 0)));
    let command = PacketDecoder::with_context(Arc::clone(&context));
    let data = PacketDecoder::with_context(Arc::clone(&context));

    let requested = ProtocolVersion::new(4, 1, 0, 0);
    let request = build_bitstream_request(command.context(), requested).unwrap();
    assert!(request.starts_with(&[layout::NAT_REQUEST as u8, 0]));
    assert_eq!(
        context.bitstream_state(),
        BitstreamState::ChangePending { requested }
    );

    let stale = frame_packet(&FrameSnapshot::default(), ProtocolVersion::new(3, 1, 0, 0));
    let mut confirming = FrameSnapshot {
        frame_number: 500,
        ..FrameSnapshot::default()
    };
    confirming.suffix.flags = FrameFlags::BITSTREAM_CHANGED;
    let confirming = frame_packet(&confirming, requested);

    let worker = thread::spawn(move || {
        let skipped = data.decode(&stale).unwrap();
        let confirmed = data.decode(&confirming).unwrap();
        (skipped, confirmed)
    });
    let (skipped, confirmed) = worker.join().unwrap();

    assert_eq!(skipped.message, Some(Message::FrameSkipped));
    assert!(confirmed.faults.is_empty(), "{:?}", confirmed.faults);
    assert!(matches!(
        confirmed.message,
        Some(Message::FrameOfData(ref frame)) if frame.frame_number == 500
    ));
    assert_eq!(command.version(), requested);
    assert_eq!(context.bitstream_state(), BitstreamState::Stable);
}

#[test]
fn capture_replay_reports_stream_state() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("session.pcapng");
    let plan = SessionPlan {
        frames: 30,
        first_frame: 100,
        dropped_frames: vec![110, 111, 112],
        ..SessionPlan::default()
    };
    write_pcapng(&path, &synthetic_session(&plan).unwrap()).unwrap();

    let report = analyze_pcap_file(&path, &AnalysisOptions::default()).unwrap();

    assert!(report.faults.is_empty(), "{:?}", report.faults);
    let capture = report.capture_summary.as_ref().unwrap();
    assert_eq!(capture.packets_total, 4 + 27);
    assert_eq!(capture.datagrams_matched, 4 + 27);
    assert!(capture.time_start.is_some());
    assert_eq!(report.generated_at, capture.time_end.clone().unwrap());

    let stream = &report.stream;
    assert_eq!(stream.protocol_version.as_deref(), Some("3.1.0.0"));
    assert_eq!(stream.server.as_ref().unwrap().app_name, "Motive");
    assert_eq!(stream.frames_decoded, 27);
    assert_eq!(stream.first_frame, Some(100));
    assert_eq!(stream.last_frame, Some(129));
    assert_eq!(stream.frame_gaps, 3);
    assert_eq!(stream.first_timecode.as_deref(), Some("10:00:00:00.0"));
    for kind in ["connect", "server_info", "request_model_def", "model_def"] {
        assert_eq!(stream.messages.get(kind), Some(&1), "{kind}");
    }
    assert_eq!(stream.messages.get("frame_of_data"), Some(&27));

    let kinds: Vec<&str> = report.descriptions.iter().map(|d| d.kind.as_str()).collect();
    assert_eq!(kinds, ["markerset", "rigid_body"]);
    assert_eq!(report.descriptions[1].id, Some(1));

    assert_eq!(report.flows.len(), 3);
    assert!(report.flows.iter().any(|flow| flow.dst == "239.255.42.99:1511"));
    assert!(report.frames.is_none());
}

#[test]
fn capture_replay_is_clean_across_versions() {
    let temp = TempDir::new().unwrap();
    for (major, minor) in [(2, 5), (2, 11), (3, 0), (4, 1)] {
        let version = ProtocolVersion::new(major, minor, 0, 0);
        let path = temp.path().join(format!("session_{major}_{minor}.pcapng"));
        let plan = SessionPlan {
            version,
            frames: 5,
            ..SessionPlan::default()
        };
        write_pcapng(&path, &synthetic_session(&plan).unwrap()).unwrap();

        let options = AnalysisOptions {
            include_frames: true,
            ..AnalysisOptions::default()
        };
        let report = analyze_pcap_file(&path, &options).unwrap();
        assert!(report.faults.is_empty(), "{version}: {:?}", report.faults);
        assert_eq!(report.stream.frames_decoded, 5, "{version}");

        let frames = report.frames.unwrap();
        let first = &frames[0].frame;
        assert_eq!(first.rigid_bodies.len(), 1);
        assert_eq!(first.marker_sets[0].markers.len(), 3);
        assert_eq!(first.labeled_markers.len(), 3);
        assert!(frames[0].captured_at.is_some());
    }
}

#[test]
fn corrupt_frame_is_contained_to_its_packet() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("corrupt.pcapng");
    let plan = SessionPlan {
        frames: 3,
        ..SessionPlan::default()
    };
    let mut frames = synthetic_session(&plan).unwrap();

    // first data frame: blow up the markerset count
    let eth_ip_udp = 14 + 20 + 8;
    let count_offset = eth_ip_udp + layout::HEADER_LEN + 4;
    let corrupted = &mut frames[4].data;
    corrupted[count_offset..count_offset + 4].copy_from_slice(&u32::MAX.to_le_bytes());
    write_pcapng(&path, &frames).unwrap();

    let report = analyze_pcap_file(&path, &AnalysisOptions::default()).unwrap();
    assert_eq!(report.stream.frames_decoded, 2);
    assert_eq!(report.stream.messages.get("frame_of_data"), Some(&3));
    assert_eq!(report.faults.len(), 1);
    assert_eq!(report.faults[0].id, "MW-CORRUPT-COUNT");
    assert_eq!(report.faults[0].severity, "error");
    assert_eq!(report.fault_count(), 1);
}
