use std::sync::Arc;

use tracing::{debug, info, warn};

use super::descriptions::decode_descriptions;
use super::error::{DecodeError, RecordKind};
use super::frame::decode_frame;
use super::layout;
use super::model::{DescriptionSet, FrameFlags, FrameSnapshot, Name, Response, ServerInfo};
use super::reader::ByteCursor;
use super::version::{BitstreamState, ProtocolVersion, StreamContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub message_id: u16,
    pub payload_len: u16,
}

impl PacketHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = ByteCursor::new(bytes);
        cursor.require(layout::HEADER_LEN)?;
        Ok(Self {
            message_id: cursor.read_u16()?,
            payload_len: cursor.read_u16()?,
        })
    }

    /// Header plus declared payload; the next packet starts here.
    pub fn declared_total(&self) -> usize {
        layout::HEADER_LEN + usize::from(self.payload_len)
    }

    /// Message kind announced by the id, `unknown` when unassigned.
    pub fn kind_name(&self) -> &'static str {
        match self.message_id {
            layout::NAT_CONNECT => "connect",
            layout::NAT_SERVERINFO => "server_info",
            layout::NAT_REQUEST => "request",
            layout::NAT_RESPONSE => "response",
            layout::NAT_REQUEST_MODELDEF => "request_model_def",
            layout::NAT_MODELDEF => "model_def",
            layout::NAT_REQUEST_FRAMEOFDATA => "request_frame_of_data",
            layout::NAT_FRAMEOFDATA => "frame_of_data",
            layout::NAT_MESSAGESTRING => "message_string",
            layout::NAT_DISCONNECT => "disconnect",
            layout::NAT_KEEPALIVE => "keep_alive",
            layout::NAT_UNRECOGNIZED_REQUEST => "unrecognized_request",
            _ => "unknown",
        }
    }
}

/// Decoded packet body.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Connect,
    ServerInfo(ServerInfo),
    /// Command string, if the request carried one.
    Request(Option<Name>),
    Response(Response),
    RequestModelDef,
    ModelDef(DescriptionSet),
    RequestFrameOfData,
    FrameOfData(Box<FrameSnapshot>),
    /// Frame dropped while a bitstream change is pending.
    FrameSkipped,
    MessageString(Name),
    Disconnect,
    KeepAlive,
    UnrecognizedRequest,
    Unknown { message_id: u16, payload: Vec<u8> },
}

impl Message {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Message::Connect => "connect",
            Message::ServerInfo(_) => "server_info",
            Message::Request(_) => "request",
            Message::Response(_) => "response",
            Message::RequestModelDef => "request_model_def",
            Message::ModelDef(_) => "model_def",
            Message::RequestFrameOfData => "request_frame_of_data",
            Message::FrameOfData(_) => "frame_of_data",
            Message::FrameSkipped => "frame_skipped",
            Message::MessageString(_) => "message_string",
            Message::Disconnect => "disconnect",
            Message::KeepAlive => "keep_alive",
            Message::UnrecognizedRequest => "unrecognized_request",
            Message::Unknown { .. } => "unknown",
        }
    }
}

/// Result of decoding one packet.
///
/// `message` is `None` when a fatal fault aborted the body; model definitions
/// keep the records decoded before the fault. `consumed` counts bytes read
/// from the header on; resume at [`DecodedPacket::declared_total`] instead.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPacket {
    pub header: PacketHeader,
    pub message: Option<Message>,
    pub faults: Vec<DecodeError>,
    pub consumed: usize,
}

impl DecodedPacket {
    pub fn declared_total(&self) -> usize {
        self.header.declared_total()
    }

    pub fn has_fatal(&self) -> bool {
        self.faults.iter().any(DecodeError::is_fatal)
    }
}

/// Decodes one packet under a fixed `version`.
///
/// Pure: server info is decoded but not committed anywhere, and frames are
/// never skipped. Only a header shorter than four bytes is an `Err`.
///
/// # Examples
/// ```
/// use mocapwire_core::{decode_packet, Message, ProtocolVersion};
///
/// let packet = [8, 0, 3, 0, b'h', b'i', 0];
/// let decoded = decode_packet(&packet, ProtocolVersion::WILDCARD).unwrap();
/// assert_eq!(decoded.message, Some(Message::MessageString("hi".into())));
/// assert_eq!(decoded.declared_total(), 7);
/// assert!(decoded.faults.is_empty());
/// ```
pub fn decode_packet(bytes: &[u8], version: ProtocolVersion) -> Result<DecodedPacket, DecodeError> {
    let header = PacketHeader::parse(bytes)?;
    Ok(decode_body(bytes, header, version))
}

fn decode_body(bytes: &[u8], header: PacketHeader, version: ProtocolVersion) -> DecodedPacket {
    let mut cursor = ByteCursor::with_bounds(bytes, layout::HEADER_LEN, header.declared_total());
    let mut faults = Vec::new();
    debug!(
        message_id = header.message_id,
        payload_len = header.payload_len,
        %version,
        "decoding packet"
    );

    let message = match dispatch(&mut cursor, header, version, &mut faults) {
        Ok(message) => Some(message),
        Err(err) => {
            faults.push(err);
            None
        }
    };

    let consumed = cursor.position();
    let fatal = faults.iter().any(DecodeError::is_fatal);
    if !fatal && consumed != header.declared_total() {
        faults.push(DecodeError::TrailingOrShortData {
            record: payload_record(header.message_id),
            message_id: header.message_id,
            declared: header.declared_total(),
            consumed,
        });
    }

    DecodedPacket {
        header,
        message,
        faults,
        consumed,
    }
}

/// Record a length mismatch is reported against; frames end with the suffix.
fn payload_record(message_id: u16) -> RecordKind {
    match message_id {
        layout::NAT_SERVERINFO => RecordKind::ServerInfo,
        layout::NAT_REQUEST => RecordKind::Request,
        layout::NAT_RESPONSE => RecordKind::Response,
        layout::NAT_MESSAGESTRING => RecordKind::MessageString,
        layout::NAT_MODELDEF => RecordKind::DescriptionSet,
        layout::NAT_FRAMEOFDATA => RecordKind::FrameSuffix,
        _ => RecordKind::Payload,
    }
}

fn dispatch(
    cursor: &mut ByteCursor<'_>,
    header: PacketHeader,
    version: ProtocolVersion,
    faults: &mut Vec<DecodeError>,
) -> Result<Message, DecodeError> {
    let message = match header.message_id {
        layout::NAT_CONNECT => Message::Connect,
        layout::NAT_DISCONNECT => Message::Disconnect,
        layout::NAT_KEEPALIVE => Message::KeepAlive,
        layout::NAT_REQUEST_MODELDEF => Message::RequestModelDef,
        layout::NAT_REQUEST_FRAMEOFDATA => Message::RequestFrameOfData,
        layout::NAT_UNRECOGNIZED_REQUEST => Message::UnrecognizedRequest,
        layout::NAT_SERVERINFO => {
            Message::ServerInfo(cursor.scoped(RecordKind::ServerInfo, read_server_info)?)
        }
        layout::NAT_REQUEST => cursor.scoped(RecordKind::Request, |c| {
            if c.remaining() == 0 {
                Ok(Message::Request(None))
            } else {
                Ok(Message::Request(Some(c.read_string()?)))
            }
        })?,
        layout::NAT_RESPONSE => cursor.scoped(RecordKind::Response, |c| {
            if usize::from(header.payload_len) == layout::RESPONSE_CODE_LEN {
                Ok(Message::Response(Response::Code(c.read_i32()?)))
            } else {
                Ok(Message::Response(Response::Text(c.read_string()?)))
            }
        })?,
        layout::NAT_MESSAGESTRING => {
            Message::MessageString(cursor.scoped(RecordKind::MessageString, |c| c.read_string())?)
        }
        layout::NAT_MODELDEF => Message::ModelDef(decode_descriptions(cursor, version, faults)),
        layout::NAT_FRAMEOFDATA => {
            Message::FrameOfData(Box::new(decode_frame(cursor, version, faults)?))
        }
        message_id => {
            faults.push(DecodeError::UnknownMessage {
                record: RecordKind::Payload,
                message_id,
                offset: cursor.position(),
                length: usize::from(header.payload_len),
            });
            let payload = cursor.read_bytes(cursor.remaining())?.to_vec();
            Message::Unknown {
                message_id,
                payload,
            }
        }
    };
    Ok(message)
}

fn read_server_info(cursor: &mut ByteCursor<'_>) -> Result<ServerInfo, DecodeError> {
    cursor.require(layout::SERVER_INFO_LEN)?;
    let app_name = cursor.read_fixed_string(layout::SERVER_NAME_LEN)?;
    let mut app_version = [0u8; 4];
    app_version.copy_from_slice(cursor.read_bytes(4)?);
    let mut protocol_version = [0u8; 4];
    protocol_version.copy_from_slice(cursor.read_bytes(4)?);
    Ok(ServerInfo {
        app_name,
        app_version: ProtocolVersion::from_bytes(app_version),
        protocol_version: ProtocolVersion::from_bytes(protocol_version),
    })
}

/// Version to decode a confirming frame with.
///
/// When another decoder sharing the context confirmed first, the version it
/// committed is read back instead of the one seen before the race.
fn confirm_pending_change(context: &StreamContext, seen: ProtocolVersion) -> ProtocolVersion {
    match context.confirm_bitstream_change() {
        Some(committed) => {
            info!(from = %seen, to = %committed, "bitstream change confirmed");
            committed
        }
        None => context.version(),
    }
}

/// Target of a `Bitstream,<major>.<minor>.<revision>` command.
///
/// The third number is the revision and the build is left at zero, matching
/// [`build_bitstream_request`](super::writer::build_bitstream_request).
fn bitstream_request_version(command: &Name) -> Option<ProtocolVersion> {
    let text = command.as_str()?;
    let (verb, target) = text.split_once(',')?;
    if !verb.trim().eq_ignore_ascii_case(layout::BITSTREAM_COMMAND) {
        return None;
    }
    let mut parts = target.trim().split('.').map(|part| part.trim().parse::<u8>());
    let major = parts.next()?.ok()?;
    let minor = parts.next()?.ok()?;
    let revision = match parts.next() {
        Some(part) => part.ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(ProtocolVersion::new(major, minor, 0, revision))
}

/// Stateful decoder for one server session.
///
/// Reads the negotiated version from a shared [`StreamContext`], commits the
/// version announced by server info, and drops frames while a bitstream
/// change is pending. Several decoders (e.g. one per channel, on different
/// threads) may share one context.
#[derive(Debug, Clone, Default)]
pub struct PacketDecoder {
    context: Arc<StreamContext>,
}

impl PacketDecoder {
    /// Decoder starting at the wildcard version.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(version: ProtocolVersion) -> Self {
        Self::with_context(Arc::new(StreamContext::new(version)))
    }

    pub fn with_context(context: Arc<StreamContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<StreamContext> {
        &self.context
    }

    pub fn version(&self) -> ProtocolVersion {
        self.context.version()
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedPacket, DecodeError> {
        let header = PacketHeader::parse(bytes)?;

        let mut version = self.context.version();
        let pending = match self.context.bitstream_state() {
            BitstreamState::ChangePending { requested }
                if header.message_id == layout::NAT_FRAMEOFDATA =>
            {
                Some(requested)
            }
            _ => None,
        };
        if let Some(requested) = pending {
            if frame_confirms_change(bytes, header) {
                version = confirm_pending_change(&self.context, version);
            } else {
                warn!(
                    %requested,
                    payload_len = header.payload_len,
                    "skipping frame while bitstream change is pending"
                );
                return Ok(DecodedPacket {
                    header,
                    message: Some(Message::FrameSkipped),
                    faults: Vec::new(),
                    consumed: header.declared_total(),
                });
            }
        }

        let decoded = decode_body(bytes, header, version);
        if let Some(Message::Request(Some(command))) = &decoded.message {
            if let Some(requested) = bitstream_request_version(command) {
                info!(%requested, "bitstream change requested");
                self.context.begin_bitstream_change(requested);
            }
        }
        if let Some(Message::ServerInfo(info)) = &decoded.message {
            let previous = self.context.version();
            self.context.commit_version(info.protocol_version);
            if previous != info.protocol_version {
                info!(
                    server = %info.app_name,
                    version = %info.protocol_version,
                    "protocol version committed"
                );
            }
        }
        for fault in &decoded.faults {
            warn!(code = fault.code(), "{fault}");
        }
        Ok(decoded)
    }

    /// Decodes every packet in a datagram, stepping by declared lengths.
    ///
    /// Stops after the first packet whose header cannot be read.
    pub fn decode_datagram(&self, bytes: &[u8]) -> Vec<Result<DecodedPacket, DecodeError>> {
        let mut out = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            match self.decode(&bytes[offset..]) {
                Ok(packet) => {
                    offset += packet.declared_total();
                    out.push(Ok(packet));
                }
                Err(err) => {
                    out.push(Err(err));
                    break;
                }
            }
        }
        out
    }
}

/// Peeks the suffix flags, which sit a fixed distance before the declared end.
fn frame_confirms_change(bytes: &[u8], header: PacketHeader) -> bool {
    let end = header.declared_total();
    let Some(offset) = end.checked_sub(layout::FRAME_FLAGS_FROM_END) else {
        return false;
    };
    if offset < layout::HEADER_LEN {
        return false;
    }
    ByteCursor::with_bounds(bytes, 0, end)
        .peek_u16_at(offset)
        .map(FrameFlags::from_bits_retain)
        .is_some_and(|flags| flags.contains(FrameFlags::BITSTREAM_CHANGED))
}

#[cfg(test)]
mod tests {
    use super::{
        Message, PacketDecoder, bitstream_request_version, confirm_pending_change, decode_packet,
    };
    use crate::protocols::natnet::error::{DecodeError, RecordKind};
    use crate::protocols::natnet::layout;
    use crate::protocols::natnet::model::{
        FrameFlags, FrameSnapshot, Name, Quat, Response, RigidBodyPose, ServerInfo, Vec3,
    };
    use crate::protocols::natnet::version::{BitstreamState, ProtocolVersion, StreamContext};
    use crate::protocols::natnet::writer::{
        build_bitstream_request, build_packet, build_request_packet, encode_frame, encode_response,
        encode_server_info,
    };

    fn server_info(version: ProtocolVersion) -> Vec<u8> {
        let info = ServerInfo {
            app_name: "Motive".into(),
            app_version: ProtocolVersion::new(3, 1, 0, 0),
            protocol_version: version,
        };
        build_packet(layout::NAT_SERVERINFO, &encode_server_info(&info)).unwrap()
    }

    fn frame_packet(frame: &FrameSnapshot, version: ProtocolVersion) -> Vec<u8> {
        build_packet(layout::NAT_FRAMEOFDATA, &encode_frame(frame, version)).unwrap()
    }

    #[test]
    fn server_info_then_empty_frame() {
        let decoder = PacketDecoder::new();
        let v3_1 = ProtocolVersion::new(3, 1, 0, 0);

        let info = decoder.decode(&server_info(v3_1)).unwrap();
        assert!(info.faults.is_empty());
        assert_eq!(decoder.version(), v3_1);

        let frame = FrameSnapshot {
            frame_number: 4242,
            ..FrameSnapshot::default()
        };
        let packet = frame_packet(&frame, v3_1);
        let decoded = decoder.decode(&packet).unwrap();
        assert!(decoded.faults.is_empty(), "{:?}", decoded.faults);
        assert_eq!(decoded.consumed, packet.len());
        let Some(Message::FrameOfData(snapshot)) = decoded.message else {
            panic!("expected a frame");
        };
        assert_eq!(snapshot.frame_number, 4242);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn tracking_flags_appear_at_2_6() {
        let v2_6 = ProtocolVersion::new(2, 6, 0, 0);
        let frame = FrameSnapshot {
            frame_number: 1,
            rigid_bodies: vec![RigidBodyPose {
                id: 1,
                position: Vec3::new(1.0, 2.0, 3.0),
                orientation: Quat::IDENTITY,
                legacy_markers: Some(Vec::new()),
                mean_error: Some(0.5),
                tracking_valid: Some(false),
            }],
            ..FrameSnapshot::default()
        };
        let packet = frame_packet(&frame, v2_6);

        let new = decode_packet(&packet, v2_6).unwrap();
        let old = decode_packet(&packet, ProtocolVersion::new(2, 5, 0, 0)).unwrap();
        assert_eq!(new.declared_total(), packet.len());
        assert_eq!(old.declared_total(), packet.len());

        let Some(Message::FrameOfData(new_frame)) = &new.message else {
            panic!("2.6 decode failed: {:?}", new.faults);
        };
        let Some(Message::FrameOfData(old_frame)) = &old.message else {
            panic!("2.5 decode failed: {:?}", old.faults);
        };
        assert_eq!(new_frame.rigid_bodies[0].tracking_valid, Some(false));
        assert_eq!(old_frame.rigid_bodies[0].tracking_valid, None);
        assert!(new.faults.is_empty());
        assert_eq!(
            old.faults,
            vec![DecodeError::TrailingOrShortData {
                record: RecordKind::FrameSuffix,
                message_id: layout::NAT_FRAMEOFDATA,
                declared: packet.len(),
                consumed: packet.len() - 2,
            }]
        );
    }

    #[test]
    fn bitstream_change_skips_until_confirmed() {
        let v4_1 = ProtocolVersion::new(4, 1, 0, 0);
        let v3_1 = ProtocolVersion::new(3, 1, 0, 0);
        let decoder = PacketDecoder::with_version(v4_1);
        build_bitstream_request(decoder.context(), v3_1).unwrap();

        // still laid out as 4.1, no confirmation bit
        let stale = frame_packet(&FrameSnapshot::default(), v4_1);
        let skipped = decoder.decode(&stale).unwrap();
        assert_eq!(skipped.message, Some(Message::FrameSkipped));
        assert_eq!(skipped.consumed, stale.len());
        assert_eq!(decoder.version(), v4_1);

        let mut confirming = FrameSnapshot {
            frame_number: 9,
            ..FrameSnapshot::default()
        };
        confirming.suffix.flags = FrameFlags::BITSTREAM_CHANGED;
        let packet = frame_packet(&confirming, v3_1);
        let decoded = decoder.decode(&packet).unwrap();
        assert!(decoded.faults.is_empty(), "{:?}", decoded.faults);
        assert!(matches!(decoded.message, Some(Message::FrameOfData(ref f)) if f.frame_number == 9));
        assert_eq!(decoder.version(), v3_1);
        assert_eq!(decoder.context().bitstream_state(), BitstreamState::Stable);
    }

    #[test]
    fn decoded_bitstream_request_starts_a_change() {
        let v4_1 = ProtocolVersion::new(4, 1, 0, 0);
        let v3_1 = ProtocolVersion::new(3, 1, 0, 0);
        let decoder = PacketDecoder::with_version(v4_1);

        let request = build_request_packet("Bitstream,3.1.0").unwrap();
        let decoded = decoder.decode(&request).unwrap();
        assert_eq!(decoded.message, Some(Message::Request(Some("Bitstream,3.1.0".into()))));
        assert_eq!(
            decoder.context().bitstream_state(),
            BitstreamState::ChangePending { requested: v3_1 }
        );
        assert_eq!(decoder.version(), v4_1);

        // other commands leave the context alone
        let stable = PacketDecoder::with_version(v4_1);
        stable.decode(&build_request_packet("TimelinePlay").unwrap()).unwrap();
        assert_eq!(stable.context().bitstream_state(), BitstreamState::Stable);
    }

    #[test]
    fn bitstream_command_parses_major_minor_revision() {
        let parse = |text: &str| bitstream_request_version(&Name::from(text));
        assert_eq!(parse("Bitstream,3.1.0"), Some(ProtocolVersion::new(3, 1, 0, 0)));
        assert_eq!(parse("bitstream, 4.1.2"), Some(ProtocolVersion::new(4, 1, 0, 2)));
        assert_eq!(parse("Bitstream,2.9"), Some(ProtocolVersion::new(2, 9, 0, 0)));
        assert_eq!(parse("Bitstream,3.1.0.0"), None);
        assert_eq!(parse("Bitstream,3.x"), None);
        assert_eq!(parse("Bitstream"), None);
        assert_eq!(parse("SetPlaybackTakeName,3.1.0"), None);
        assert_eq!(bitstream_request_version(&Name::from(vec![0xff, b','])), None);
    }

    #[test]
    fn confirmation_lost_to_another_decoder_uses_committed_version() {
        let v4_1 = ProtocolVersion::new(4, 1, 0, 0);
        let v3_1 = ProtocolVersion::new(3, 1, 0, 0);
        let context = StreamContext::new(v4_1);
        context.begin_bitstream_change(v3_1);

        // the winner confirms between our state check and our confirmation
        assert_eq!(context.confirm_bitstream_change(), Some(v3_1));
        assert_eq!(confirm_pending_change(&context, v4_1), v3_1);

        context.begin_bitstream_change(v4_1);
        assert_eq!(confirm_pending_change(&context, v3_1), v4_1);
        assert_eq!(context.bitstream_state(), BitstreamState::Stable);
    }

    #[test]
    fn response_code_and_text() {
        let code = build_packet(layout::NAT_RESPONSE, &encode_response(&Response::Code(-1))).unwrap();
        let decoded = decode_packet(&code, ProtocolVersion::WILDCARD).unwrap();
        assert_eq!(decoded.message, Some(Message::Response(Response::Code(-1))));

        let text = build_packet(
            layout::NAT_RESPONSE,
            &encode_response(&Response::Text("OK done".into())),
        )
        .unwrap();
        let decoded = decode_packet(&text, ProtocolVersion::WILDCARD).unwrap();
        assert_eq!(
            decoded.message,
            Some(Message::Response(Response::Text("OK done".into())))
        );
    }

    #[test]
    fn unknown_message_is_kept_opaque() {
        let packet = build_packet(55, &[1, 2, 3]).unwrap();
        let decoded = decode_packet(&packet, ProtocolVersion::WILDCARD).unwrap();
        assert_eq!(
            decoded.message,
            Some(Message::Unknown {
                message_id: 55,
                payload: vec![1, 2, 3],
            })
        );
        assert_eq!(
            decoded.faults,
            vec![DecodeError::UnknownMessage {
                record: RecordKind::Payload,
                message_id: 55,
                offset: layout::HEADER_LEN,
                length: 3,
            }]
        );
    }

    #[test]
    fn short_header_is_an_error() {
        let err = decode_packet(&[7, 0, 1], ProtocolVersion::WILDCARD).unwrap_err();
        assert_eq!(
            err,
            DecodeError::BufferOverrun {
                record: RecordKind::PacketHeader,
                offset: 0,
                needed: 4,
                available: 3,
            }
        );
    }

    #[test]
    fn truncated_frame_has_no_message() {
        let v = ProtocolVersion::new(3, 1, 0, 0);
        let packet = frame_packet(&FrameSnapshot::default(), v);
        let decoded = decode_packet(&packet[..packet.len() - 1], v).unwrap();
        assert_eq!(decoded.message, None);
        assert_eq!(decoded.declared_total(), packet.len());
        assert!(matches!(
            decoded.faults.as_slice(),
            [DecodeError::BufferOverrun {
                record: RecordKind::FrameSuffix,
                ..
            }]
        ));
    }

    #[test]
    fn control_payload_is_a_length_mismatch() {
        let packet = build_packet(layout::NAT_KEEPALIVE, &[0, 0]).unwrap();
        let decoded = decode_packet(&packet, ProtocolVersion::WILDCARD).unwrap();
        assert_eq!(decoded.message, Some(Message::KeepAlive));
        assert_eq!(
            decoded.faults,
            vec![DecodeError::TrailingOrShortData {
                record: RecordKind::Payload,
                message_id: layout::NAT_KEEPALIVE,
                declared: 6,
                consumed: 4,
            }]
        );
    }

    #[test]
    fn datagram_walks_by_declared_length() {
        let mut datagram = build_packet(layout::NAT_MESSAGESTRING, b"a\0").unwrap();
        // declares 6 payload bytes but its string ends after 2
        datagram.extend(build_packet(layout::NAT_MESSAGESTRING, b"bc\0xyz").unwrap());
        datagram.extend(build_packet(layout::NAT_KEEPALIVE, &[]).unwrap());

        let decoder = PacketDecoder::new();
        let packets = decoder.decode_datagram(&datagram);
        assert_eq!(packets.len(), 3);
        let kinds: Vec<_> = packets
            .iter()
            .map(|p| p.as_ref().unwrap().message.as_ref().unwrap().kind_name())
            .collect();
        assert_eq!(kinds, ["message_string", "message_string", "keep_alive"]);
        assert!(matches!(
            packets[1].as_ref().unwrap().faults.as_slice(),
            [DecodeError::TrailingOrShortData {
                record: RecordKind::MessageString,
                consumed: 7,
                ..
            }]
        ));
    }

    #[test]
    fn server_info_with_short_payload_overruns() {
        let packet = build_packet(layout::NAT_SERVERINFO, &[0; 100]).unwrap();
        let decoder = PacketDecoder::new();
        let decoded = decoder.decode(&packet).unwrap();
        assert_eq!(decoded.message, None);
        assert!(decoder.version().is_wildcard());
        assert!(matches!(
            decoded.faults.as_slice(),
            [DecodeError::BufferOverrun {
                record: RecordKind::ServerInfo,
                needed: 264,
                available: 100,
                ..
            }]
        ));
    }

    mod proptest_tests {
        use super::super::PacketDecoder;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(300))]

            #[test]
            fn prop_arbitrary_datagrams_never_panic(
                data in proptest::collection::vec(any::<u8>(), 0usize..512),
            ) {
                let decoder = PacketDecoder::new();
                let packets = decoder.decode_datagram(&data);
                prop_assert!(packets.len() <= data.len() / 4 + 1);
            }
        }
    }
}
