//! Packet encoders.
//!
//! Control and request packets are what a transport sends on the command
//! channel. The payload encoders mirror the decoders field for field under
//! the same version gates; they back the capture fixtures and the tests.

use thiserror::Error;

use super::layout;
use super::model::{
    AnalogData, AssetData, AssetMarker, DescriptionRecord, DescriptionSet, FrameSnapshot,
    FrameSuffix, LabeledMarker, MarkerDescription, Name, Quat, Response, RigidBodyDescription,
    RigidBodyPose, ServerInfo, Vec3,
};
use super::version::{ProtocolVersion, StreamContext};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("message {message_id}: payload of {len} bytes does not fit the 16-bit length field")]
    PayloadTooLarge { message_id: u16, len: usize },
}

/// Payload-free messages a client sends on the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Connect,
    Disconnect,
    KeepAlive,
    RequestModelDef,
    RequestFrameOfData,
}

impl ControlKind {
    pub fn message_id(self) -> u16 {
        match self {
            ControlKind::Connect => layout::NAT_CONNECT,
            ControlKind::Disconnect => layout::NAT_DISCONNECT,
            ControlKind::KeepAlive => layout::NAT_KEEPALIVE,
            ControlKind::RequestModelDef => layout::NAT_REQUEST_MODELDEF,
            ControlKind::RequestFrameOfData => layout::NAT_REQUEST_FRAMEOFDATA,
        }
    }
}

/// Prefixes `payload` with the 4-byte packet header.
pub fn build_packet(message_id: u16, payload: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let len = u16::try_from(payload.len()).map_err(|_| EncodeError::PayloadTooLarge {
        message_id,
        len: payload.len(),
    })?;
    let mut packet = Vec::with_capacity(layout::HEADER_LEN + payload.len());
    packet.extend_from_slice(&message_id.to_le_bytes());
    packet.extend_from_slice(&len.to_le_bytes());
    packet.extend_from_slice(payload);
    Ok(packet)
}

/// Header-only packet for `kind`.
///
/// # Examples
/// ```
/// use mocapwire_core::{build_control_packet, ControlKind};
///
/// assert_eq!(build_control_packet(ControlKind::KeepAlive), vec![10, 0, 0, 0]);
/// ```
pub fn build_control_packet(kind: ControlKind) -> Vec<u8> {
    let mut packet = Vec::with_capacity(layout::HEADER_LEN);
    packet.extend_from_slice(&kind.message_id().to_le_bytes());
    packet.extend_from_slice(&0u16.to_le_bytes());
    packet
}

/// REQUEST packet carrying a NUL-terminated command string.
pub fn build_request_packet(command: &str) -> Result<Vec<u8>, EncodeError> {
    let mut writer = PayloadWriter::new();
    writer.put_string(command);
    build_packet(layout::NAT_REQUEST, writer.as_bytes())
}

/// Requests a bitstream version change and marks `context` as pending.
///
/// Frames decoded through `context` are skipped from here on until one
/// carries the bitstream-changed flag.
pub fn build_bitstream_request(
    context: &StreamContext,
    version: ProtocolVersion,
) -> Result<Vec<u8>, EncodeError> {
    let command = format!(
        "{},{}.{}.{}",
        layout::BITSTREAM_COMMAND,
        version.major,
        version.minor,
        version.revision
    );
    let packet = build_request_packet(&command)?;
    context.begin_bitstream_change(version);
    Ok(packet)
}

/// Growable little-endian payload buffer.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.put_bytes(&value.to_le_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.put_bytes(&value.to_le_bytes());
    }

    pub fn put_i32(&mut self, value: i32) {
        self.put_bytes(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.put_bytes(&value.to_le_bytes());
    }

    pub fn put_f32(&mut self, value: f32) {
        self.put_bytes(&value.to_le_bytes());
    }

    pub fn put_f64(&mut self, value: f64) {
        self.put_bytes(&value.to_le_bytes());
    }

    pub fn put_count(&mut self, count: usize) {
        self.put_u32(count as u32);
    }

    pub fn put_vec3(&mut self, v: Vec3) {
        self.put_f32(v.x);
        self.put_f32(v.y);
        self.put_f32(v.z);
    }

    pub fn put_quat(&mut self, q: Quat) {
        self.put_f32(q.x);
        self.put_f32(q.y);
        self.put_f32(q.z);
        self.put_f32(q.w);
    }

    /// Writes `text` up to its first NUL, then the terminator.
    pub fn put_string(&mut self, text: impl AsRef<[u8]>) {
        let bytes = text.as_ref();
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        self.put_bytes(&bytes[..end]);
        self.buf.push(0);
    }

    fn placeholder_u32(&mut self) -> usize {
        let at = self.buf.len();
        self.put_u32(0);
        at
    }

    fn patch_u32(&mut self, at: usize, value: u32) {
        self.buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Count-prefixed frame section, with the 4.1 byte count when `version` has it.
    fn put_section(
        &mut self,
        version: ProtocolVersion,
        count: usize,
        body: impl FnOnce(&mut PayloadWriter),
    ) {
        self.put_count(count);
        let size_at = version.at_least(4, 1).then(|| self.placeholder_u32());
        let start = self.buf.len();
        body(self);
        if let Some(at) = size_at {
            let size = (self.buf.len() - start) as u32;
            self.patch_u32(at, size);
        }
    }
}

pub fn encode_server_info(info: &ServerInfo) -> Vec<u8> {
    let mut writer = PayloadWriter::new();
    let mut name = [0u8; layout::SERVER_NAME_LEN];
    let bytes = info.app_name.as_bytes();
    let len = bytes.len().min(layout::SERVER_NAME_LEN - 1);
    name[..len].copy_from_slice(&bytes[..len]);
    writer.put_bytes(&name);
    writer.put_bytes(&info.app_version.to_bytes());
    writer.put_bytes(&info.protocol_version.to_bytes());
    writer.into_bytes()
}

/// A text response of exactly three characters encodes to four bytes and
/// reads back as a result code.
pub fn encode_response(response: &Response) -> Vec<u8> {
    let mut writer = PayloadWriter::new();
    match response {
        Response::Code(code) => writer.put_i32(*code),
        Response::Text(text) => writer.put_string(text),
    }
    writer.into_bytes()
}

pub fn encode_descriptions(set: &DescriptionSet, version: ProtocolVersion) -> Vec<u8> {
    let mut writer = PayloadWriter::new();
    writer.put_count(set.records.len());
    for record in &set.records {
        writer.put_u32(record.tag());
        let size_at = writer.placeholder_u32();
        let start = writer.len();
        put_description(&mut writer, record, version);
        let size = (writer.len() - start) as u32;
        writer.patch_u32(size_at, size);
    }
    writer.into_bytes()
}

fn put_description(w: &mut PayloadWriter, record: &DescriptionRecord, version: ProtocolVersion) {
    match record {
        DescriptionRecord::MarkerSet(d) => {
            w.put_string(&d.name);
            w.put_count(d.markers.len());
            for marker in &d.markers {
                w.put_string(marker);
            }
        }
        DescriptionRecord::RigidBody(d) => put_rigid_body_description(w, d, version),
        DescriptionRecord::Skeleton(d) => {
            w.put_string(&d.name);
            w.put_i32(d.id);
            w.put_count(d.rigid_bodies.len());
            for body in &d.rigid_bodies {
                put_rigid_body_description(w, body, version);
            }
        }
        DescriptionRecord::ForcePlate(d) => {
            w.put_i32(d.id);
            w.put_string(&d.serial);
            w.put_f32(d.width);
            w.put_f32(d.length);
            w.put_vec3(d.origin);
            for row in &d.calibration {
                for value in row {
                    w.put_f32(*value);
                }
            }
            for corner in &d.corners {
                w.put_vec3(*corner);
            }
            w.put_i32(d.plate_type);
            w.put_i32(d.channel_data_type);
            w.put_count(d.channels.len());
            for channel in &d.channels {
                w.put_string(channel);
            }
        }
        DescriptionRecord::Device(d) => {
            w.put_i32(d.id);
            w.put_string(&d.name);
            w.put_string(&d.serial);
            w.put_i32(d.device_type);
            w.put_i32(d.channel_data_type);
            w.put_count(d.channels.len());
            for channel in &d.channels {
                w.put_string(channel);
            }
        }
        DescriptionRecord::Camera(d) => {
            w.put_string(&d.name);
            w.put_vec3(d.position);
            w.put_quat(d.orientation);
        }
        DescriptionRecord::Asset(d) => {
            w.put_string(&d.name);
            w.put_i32(d.asset_type);
            w.put_i32(d.id);
            w.put_count(d.rigid_bodies.len());
            for body in &d.rigid_bodies {
                put_rigid_body_description(w, body, version);
            }
            w.put_count(d.markers.len());
            for marker in &d.markers {
                put_marker_description(w, marker);
            }
        }
    }
}

fn put_rigid_body_description(
    w: &mut PayloadWriter,
    d: &RigidBodyDescription,
    version: ProtocolVersion,
) {
    if version.at_least(2, 0) {
        w.put_string(d.name.as_ref().map(Name::as_bytes).unwrap_or_default());
    }
    w.put_i32(d.id);
    w.put_i32(d.parent_id);
    w.put_vec3(d.offset);
    if version.at_least(3, 0) {
        w.put_count(d.markers.len());
        for marker in &d.markers {
            w.put_vec3(marker.position);
        }
        for marker in &d.markers {
            w.put_i32(marker.label);
        }
        if version.at_least(4, 0) {
            for marker in &d.markers {
                w.put_string(marker.name.as_ref().map(Name::as_bytes).unwrap_or_default());
            }
        }
    }
}

fn put_marker_description(w: &mut PayloadWriter, d: &MarkerDescription) {
    w.put_string(&d.name);
    w.put_i32(d.id);
    w.put_vec3(d.position);
    w.put_f32(d.size);
    w.put_u16(d.params);
}

pub fn encode_frame(frame: &FrameSnapshot, version: ProtocolVersion) -> Vec<u8> {
    let mut w = PayloadWriter::new();
    w.put_u32(frame.frame_number);

    w.put_section(version, frame.marker_sets.len(), |w| {
        for set in &frame.marker_sets {
            w.put_string(&set.name);
            w.put_count(set.markers.len());
            for marker in &set.markers {
                w.put_vec3(*marker);
            }
        }
    });

    w.put_section(version, frame.legacy_markers.len(), |w| {
        for marker in &frame.legacy_markers {
            w.put_vec3(*marker);
        }
    });

    w.put_section(version, frame.rigid_bodies.len(), |w| {
        for body in &frame.rigid_bodies {
            put_rigid_body_pose(w, body, version, true);
        }
    });

    if version.at_least(2, 1) {
        w.put_section(version, frame.skeletons.len(), |w| {
            for skeleton in &frame.skeletons {
                w.put_i32(skeleton.id);
                w.put_count(skeleton.rigid_bodies.len());
                for body in &skeleton.rigid_bodies {
                    put_rigid_body_pose(w, body, version, false);
                }
            }
        });
    }

    if version.at_least(4, 1) {
        w.put_section(version, frame.assets.len(), |w| {
            for asset in &frame.assets {
                put_asset(w, asset);
            }
        });
    }

    if version.at_least(2, 3) {
        w.put_section(version, frame.labeled_markers.len(), |w| {
            for marker in &frame.labeled_markers {
                put_labeled_marker(w, marker, version);
            }
        });
    }

    if version.at_least(2, 9) {
        w.put_section(version, frame.force_plates.len(), |w| {
            for plate in &frame.force_plates {
                put_analog(w, plate);
            }
        });
    }

    if version.at_least(2, 11) {
        w.put_section(version, frame.devices.len(), |w| {
            for device in &frame.devices {
                put_analog(w, device);
            }
        });
    }

    put_suffix(&mut w, &frame.suffix, version);
    w.into_bytes()
}

fn put_rigid_body_pose(
    w: &mut PayloadWriter,
    body: &RigidBodyPose,
    version: ProtocolVersion,
    legacy_block: bool,
) {
    w.put_i32(body.id);
    w.put_vec3(body.position);
    w.put_quat(body.orientation);
    if legacy_block && version.before(3, 0) {
        let markers = body.legacy_markers.as_deref().unwrap_or_default();
        w.put_count(markers.len());
        for marker in markers {
            w.put_vec3(marker.position);
        }
        if version.at_least(2, 0) {
            for marker in markers {
                w.put_i32(marker.id.unwrap_or_default());
            }
            for marker in markers {
                w.put_f32(marker.size.unwrap_or_default());
            }
        }
    }
    if version.at_least(2, 0) {
        w.put_f32(body.mean_error.unwrap_or_default());
    }
    if version.at_least(2, 6) {
        w.put_u16(tracking_params(body.tracking_valid));
    }
}

fn tracking_params(valid: Option<bool>) -> u16 {
    if valid.unwrap_or(false) {
        layout::TRACKING_VALID_BIT
    } else {
        0
    }
}

fn put_asset(w: &mut PayloadWriter, asset: &AssetData) {
    w.put_i32(asset.id);
    w.put_count(asset.rigid_bodies.len());
    for body in &asset.rigid_bodies {
        w.put_i32(body.id);
        w.put_vec3(body.position);
        w.put_quat(body.orientation);
        w.put_f32(body.mean_error.unwrap_or_default());
        w.put_u16(tracking_params(body.tracking_valid));
    }
    w.put_count(asset.markers.len());
    for marker in &asset.markers {
        put_asset_marker(w, marker);
    }
}

fn put_asset_marker(w: &mut PayloadWriter, marker: &AssetMarker) {
    w.put_i32(marker.id);
    w.put_vec3(marker.position);
    w.put_f32(marker.size);
    w.put_u16(marker.params);
    w.put_f32(marker.residual);
}

fn put_labeled_marker(w: &mut PayloadWriter, marker: &LabeledMarker, version: ProtocolVersion) {
    w.put_u32(marker.id.packed());
    w.put_vec3(marker.position);
    w.put_f32(marker.size);
    if version.at_least(2, 6) {
        w.put_u16(marker.flags.bits());
    }
    if version.at_least(3, 0) {
        w.put_f32(marker.residual.unwrap_or_default() / layout::RESIDUAL_SCALE);
    }
}

fn put_analog(w: &mut PayloadWriter, data: &AnalogData) {
    w.put_i32(data.id);
    w.put_count(data.channels.len());
    for channel in &data.channels {
        w.put_count(channel.len());
        for sample in channel {
            w.put_f32(*sample);
        }
    }
}

fn put_suffix(w: &mut PayloadWriter, suffix: &FrameSuffix, version: ProtocolVersion) {
    w.put_u32(suffix.timecode.raw());
    w.put_u32(suffix.timecode.subframe);
    if version.at_least(2, 7) {
        w.put_f64(suffix.timestamp);
    } else {
        w.put_f32(suffix.timestamp as f32);
    }
    if version.at_least(3, 0) {
        let stamps = suffix.high_res.unwrap_or_default();
        w.put_u64(stamps.mid_exposure);
        w.put_u64(stamps.camera_data_received);
        w.put_u64(stamps.transmit);
    }
    w.put_u16(suffix.flags.bits());
    w.put_u32(suffix.end_marker);
}
