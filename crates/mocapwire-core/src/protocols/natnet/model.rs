//! Decoded protocol values.
//!
//! Everything here is created per packet and handed to the consumer; nothing
//! is retained by the decoder.

use std::borrow::Cow;
use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::layout;
use super::version::ProtocolVersion;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Orientation quaternion in wire order `(x, y, z, w)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub const IDENTITY: Quat = Quat::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Marker identity packed into a 32-bit source id: model (asset) id in the
/// high 16 bits, member id in the low 16 bits.
///
/// # Examples
/// ```
/// use mocapwire_core::MarkerId;
///
/// let id = MarkerId::from_packed(0x0003_0011);
/// assert_eq!((id.model_id, id.marker_id), (3, 17));
/// assert_eq!(id.packed(), 0x0003_0011);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkerId {
    pub model_id: u16,
    pub marker_id: u16,
}

impl MarkerId {
    pub const fn new(model_id: u16, marker_id: u16) -> Self {
        Self {
            model_id,
            marker_id,
        }
    }

    pub const fn from_packed(raw: u32) -> Self {
        Self {
            model_id: (raw >> 16) as u16,
            marker_id: (raw & 0xffff) as u16,
        }
    }

    pub const fn packed(self) -> u32 {
        ((self.model_id as u32) << 16) | self.marker_id as u32
    }
}

/// SMPTE-style timecode sliced out of a 32-bit word, plus the subframe.
///
/// # Examples
/// ```
/// use mocapwire_core::Timecode;
///
/// let tc = Timecode::from_raw(0x0B14_1E32, 3);
/// assert_eq!((tc.hours, tc.minutes, tc.seconds, tc.frame), (11, 20, 30, 50));
/// assert_eq!(tc.to_string(), "11:20:30:50.3");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timecode {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub frame: u8,
    pub subframe: u32,
}

impl Timecode {
    pub const fn from_raw(raw: u32, subframe: u32) -> Self {
        Self {
            hours: (raw >> layout::TIMECODE_HOUR_SHIFT) as u8,
            minutes: (raw >> layout::TIMECODE_MINUTE_SHIFT) as u8,
            seconds: (raw >> layout::TIMECODE_SECOND_SHIFT) as u8,
            frame: raw as u8,
            subframe,
        }
    }

    pub const fn raw(self) -> u32 {
        ((self.hours as u32) << layout::TIMECODE_HOUR_SHIFT)
            | ((self.minutes as u32) << layout::TIMECODE_MINUTE_SHIFT)
            | ((self.seconds as u32) << layout::TIMECODE_SECOND_SHIFT)
            | self.frame as u32
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}:{:02}.{}",
            self.hours, self.minutes, self.seconds, self.frame, self.subframe
        )
    }
}

bitflags! {
    /// Per-marker state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct MarkerFlags: u16 {
        const OCCLUDED = 0x01;
        const POINT_CLOUD_SOLVED = 0x02;
        const MODEL_SOLVED = 0x04;
        const HAS_MODEL = 0x08;
        const UNLABELED = 0x10;
        const ACTIVE = 0x20;
    }
}

impl MarkerFlags {
    /// Bits defined before protocol 3.0.
    pub const LEGACY: MarkerFlags = MarkerFlags::OCCLUDED
        .union(MarkerFlags::POINT_CLOUD_SOLVED)
        .union(MarkerFlags::MODEL_SOLVED);

    /// Interprets a raw params field under `version`.
    pub fn decode(raw: u16, version: ProtocolVersion) -> Self {
        let flags = MarkerFlags::from_bits_retain(raw);
        if version.at_least(3, 0) {
            flags
        } else {
            flags & MarkerFlags::LEGACY
        }
    }
}

bitflags! {
    /// Frame-level state bits from the frame suffix.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct FrameFlags: u16 {
        const RECORDING = 0x01;
        const TRACKED_MODELS_CHANGED = 0x02;
        const LIVE_MODE = 0x04;
        const BITSTREAM_CHANGED = 0x08;
    }
}

/// Text field as sent on the wire, without its terminator.
///
/// Names are kept as raw bytes so records re-encode exactly; display and
/// JSON output replace invalid UTF-8 sequences.
///
/// # Examples
/// ```
/// use mocapwire_core::Name;
///
/// let name = Name::from(vec![b'C', 0xE9]);
/// assert_eq!(name.as_bytes(), &[b'C', 0xE9]);
/// assert_eq!(name.to_string(), "C\u{FFFD}");
/// assert_eq!(Name::from("wand"), "wand");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Name(Vec<u8>);

impl Name {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The text, when it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0.escape_ascii())
    }
}

impl AsRef<[u8]> for Name {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for Name {
    fn from(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }
}

impl From<String> for Name {
    fn from(text: String) -> Self {
        Self(text.into_bytes())
    }
}

impl From<&[u8]> for Name {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Name {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string_lossy())
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Name::from)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerSetDescription {
    pub name: Name,
    pub markers: Vec<Name>,
}

/// Marker attached to a rigid-body description (protocol 3.0+).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBodyMarkerDescription {
    pub position: Vec3,
    pub label: i32,
    /// Present from protocol 4.0.
    pub name: Option<Name>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBodyDescription {
    /// Present from protocol 2.0.
    pub name: Option<Name>,
    pub id: i32,
    pub parent_id: i32,
    pub offset: Vec3,
    pub markers: Vec<RigidBodyMarkerDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkeletonDescription {
    pub name: Name,
    pub id: i32,
    pub rigid_bodies: Vec<RigidBodyDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForcePlateDescription {
    pub id: i32,
    pub serial: Name,
    pub width: f32,
    pub length: f32,
    pub origin: Vec3,
    pub calibration: [[f32; layout::FORCE_PLATE_CAL_COLS]; layout::FORCE_PLATE_CAL_ROWS],
    pub corners: [Vec3; layout::FORCE_PLATE_CORNERS],
    pub plate_type: i32,
    pub channel_data_type: i32,
    pub channels: Vec<Name>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescription {
    pub id: i32,
    pub name: Name,
    pub serial: Name,
    pub device_type: i32,
    pub channel_data_type: i32,
    pub channels: Vec<Name>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraDescription {
    pub name: Name,
    pub position: Vec3,
    pub orientation: Quat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerDescription {
    pub name: Name,
    pub id: i32,
    pub position: Vec3,
    pub size: f32,
    pub params: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDescription {
    pub name: Name,
    pub asset_type: i32,
    pub id: i32,
    pub rigid_bodies: Vec<RigidBodyDescription>,
    pub markers: Vec<MarkerDescription>,
}

/// One entry of a model-definition payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DescriptionRecord {
    MarkerSet(MarkerSetDescription),
    RigidBody(RigidBodyDescription),
    Skeleton(SkeletonDescription),
    ForcePlate(ForcePlateDescription),
    Device(DeviceDescription),
    Camera(CameraDescription),
    Asset(AssetDescription),
}

impl DescriptionRecord {
    pub fn tag(&self) -> u32 {
        match self {
            DescriptionRecord::MarkerSet(_) => layout::DESCRIPTION_MARKERSET,
            DescriptionRecord::RigidBody(_) => layout::DESCRIPTION_RIGID_BODY,
            DescriptionRecord::Skeleton(_) => layout::DESCRIPTION_SKELETON,
            DescriptionRecord::ForcePlate(_) => layout::DESCRIPTION_FORCE_PLATE,
            DescriptionRecord::Device(_) => layout::DESCRIPTION_DEVICE,
            DescriptionRecord::Camera(_) => layout::DESCRIPTION_CAMERA,
            DescriptionRecord::Asset(_) => layout::DESCRIPTION_ASSET,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            DescriptionRecord::MarkerSet(_) => "markerset",
            DescriptionRecord::RigidBody(_) => "rigid_body",
            DescriptionRecord::Skeleton(_) => "skeleton",
            DescriptionRecord::ForcePlate(_) => "force_plate",
            DescriptionRecord::Device(_) => "device",
            DescriptionRecord::Camera(_) => "camera",
            DescriptionRecord::Asset(_) => "asset",
        }
    }

    pub fn name(&self) -> Option<&Name> {
        match self {
            DescriptionRecord::MarkerSet(d) => Some(&d.name),
            DescriptionRecord::RigidBody(d) => d.name.as_ref(),
            DescriptionRecord::Skeleton(d) => Some(&d.name),
            DescriptionRecord::ForcePlate(d) => Some(&d.serial),
            DescriptionRecord::Device(d) => Some(&d.name),
            DescriptionRecord::Camera(d) => Some(&d.name),
            DescriptionRecord::Asset(d) => Some(&d.name),
        }
    }

    pub fn id(&self) -> Option<i32> {
        match self {
            DescriptionRecord::MarkerSet(_) | DescriptionRecord::Camera(_) => None,
            DescriptionRecord::RigidBody(d) => Some(d.id),
            DescriptionRecord::Skeleton(d) => Some(d.id),
            DescriptionRecord::ForcePlate(d) => Some(d.id),
            DescriptionRecord::Device(d) => Some(d.id),
            DescriptionRecord::Asset(d) => Some(d.id),
        }
    }
}

/// Description records in stream order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DescriptionSet {
    pub records: Vec<DescriptionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerSetData {
    pub name: Name,
    pub markers: Vec<Vec3>,
}

/// Marker carried inside a rigid-body entry before protocol 3.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LegacyRigidBodyMarker {
    pub position: Vec3,
    /// Present from protocol 2.0.
    pub id: Option<i32>,
    /// Present from protocol 2.0.
    pub size: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBodyPose {
    pub id: i32,
    pub position: Vec3,
    pub orientation: Quat,
    /// Only in top-level rigid-body entries before protocol 3.0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_markers: Option<Vec<LegacyRigidBodyMarker>>,
    /// Present from protocol 2.0.
    pub mean_error: Option<f32>,
    /// Bit 0 of the tracking params, present from protocol 2.6.
    pub tracking_valid: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkeletonData {
    pub id: i32,
    pub rigid_bodies: Vec<RigidBodyPose>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssetMarker {
    pub id: i32,
    pub position: Vec3,
    pub size: f32,
    pub params: u16,
    pub residual: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetData {
    pub id: i32,
    pub rigid_bodies: Vec<RigidBodyPose>,
    pub markers: Vec<AssetMarker>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledMarker {
    pub id: MarkerId,
    pub position: Vec3,
    pub size: f32,
    /// Empty before protocol 2.6.
    pub flags: MarkerFlags,
    /// Scaled by 1000; present from protocol 3.0.
    pub residual: Option<f32>,
}

/// Force plate or device samples: one vector of frames per channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogData {
    pub id: i32,
    pub channels: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HighResTimestamps {
    pub mid_exposure: u64,
    pub camera_data_received: u64,
    pub transmit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameSuffix {
    pub timecode: Timecode,
    /// Seconds; sent as f32 before protocol 2.7.
    pub timestamp: f64,
    /// Present from protocol 3.0.
    pub high_res: Option<HighResTimestamps>,
    pub flags: FrameFlags,
    /// End-of-data marker, not validated.
    pub end_marker: u32,
}

/// Everything carried by one frame-of-data packet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameSnapshot {
    pub frame_number: u32,
    pub marker_sets: Vec<MarkerSetData>,
    pub legacy_markers: Vec<Vec3>,
    pub rigid_bodies: Vec<RigidBodyPose>,
    pub skeletons: Vec<SkeletonData>,
    pub assets: Vec<AssetData>,
    pub labeled_markers: Vec<LabeledMarker>,
    pub force_plates: Vec<AnalogData>,
    pub devices: Vec<AnalogData>,
    pub suffix: FrameSuffix,
}

impl FrameSnapshot {
    pub fn is_empty(&self) -> bool {
        self.marker_sets.is_empty()
            && self.legacy_markers.is_empty()
            && self.rigid_bodies.is_empty()
            && self.skeletons.is_empty()
            && self.assets.is_empty()
            && self.labeled_markers.is_empty()
            && self.force_plates.is_empty()
            && self.devices.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub app_name: Name,
    pub app_version: ProtocolVersion,
    pub protocol_version: ProtocolVersion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Code(i32),
    Text(Name),
}
