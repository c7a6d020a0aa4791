use std::fmt;

use thiserror::Error;

/// Record being decoded when a fault was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    PacketHeader,
    /// Body of a control or unassigned message.
    Payload,
    ServerInfo,
    Request,
    Response,
    MessageString,
    DescriptionSet,
    MarkerSetDescription,
    RigidBodyDescription,
    SkeletonDescription,
    ForcePlateDescription,
    DeviceDescription,
    CameraDescription,
    AssetDescription,
    MarkerDescription,
    FramePrefix,
    MarkerSets,
    LegacyMarkers,
    RigidBodies,
    Skeletons,
    Assets,
    LabeledMarkers,
    ForcePlates,
    Devices,
    FrameSuffix,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::PacketHeader => "packet header",
            RecordKind::Payload => "payload",
            RecordKind::ServerInfo => "server info",
            RecordKind::Request => "request",
            RecordKind::Response => "response",
            RecordKind::MessageString => "message string",
            RecordKind::DescriptionSet => "description set",
            RecordKind::MarkerSetDescription => "markerset description",
            RecordKind::RigidBodyDescription => "rigid body description",
            RecordKind::SkeletonDescription => "skeleton description",
            RecordKind::ForcePlateDescription => "force plate description",
            RecordKind::DeviceDescription => "device description",
            RecordKind::CameraDescription => "camera description",
            RecordKind::AssetDescription => "asset description",
            RecordKind::MarkerDescription => "marker description",
            RecordKind::FramePrefix => "frame prefix",
            RecordKind::MarkerSets => "markerset data",
            RecordKind::LegacyMarkers => "legacy marker data",
            RecordKind::RigidBodies => "rigid body data",
            RecordKind::Skeletons => "skeleton data",
            RecordKind::Assets => "asset data",
            RecordKind::LabeledMarkers => "labeled marker data",
            RecordKind::ForcePlates => "force plate data",
            RecordKind::Devices => "device data",
            RecordKind::FrameSuffix => "frame suffix",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Faults raised while decoding a packet.
///
/// Offsets are relative to the first byte of the packet header. Fatal faults
/// abort the current packet only; the next packet still starts at the
/// header's declared length.
///
/// # Examples
/// ```
/// use mocapwire_core::{DecodeError, RecordKind};
///
/// let err = DecodeError::BufferOverrun {
///     record: RecordKind::RigidBodies,
///     offset: 12,
///     needed: 4,
///     available: 2,
/// };
/// assert!(err.is_fatal());
/// assert!(err.to_string().contains("need 4 bytes"));
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("buffer overrun in {record} at offset {offset}: need {needed} bytes, {available} remaining")]
    BufferOverrun {
        record: RecordKind,
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("corrupt count in {record} at offset {offset}: {count} exceeds limit {limit}")]
    CorruptCount {
        record: RecordKind,
        offset: usize,
        count: u64,
        limit: u64,
    },
    #[error(
        "truncated {record} (description #{index}) at offset {offset}: need {needed} bytes, {available} before payload end"
    )]
    TruncatedRecord {
        record: RecordKind,
        index: usize,
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("unknown message id {message_id}: {record} at offset {offset} ({length} bytes)")]
    UnknownMessage {
        record: RecordKind,
        message_id: u16,
        offset: usize,
        length: usize,
    },
    #[error("unknown description type {tag} in {record} at offset {offset}: skipped {skipped} bytes")]
    UnknownDescriptorType {
        record: RecordKind,
        tag: u32,
        offset: usize,
        skipped: usize,
    },
    #[error("unknown content in {record} at offset {offset}: declared {declared} bytes, decoded {decoded}")]
    UnknownFrameSection {
        record: RecordKind,
        offset: usize,
        declared: usize,
        decoded: usize,
    },
    #[error(
        "{record} of message {message_id} ends at offset {consumed} but {declared} bytes were declared"
    )]
    TrailingOrShortData {
        record: RecordKind,
        message_id: u16,
        declared: usize,
        consumed: usize,
    },
}

impl DecodeError {
    /// Fatal faults abort the current packet; the rest are diagnostics.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DecodeError::BufferOverrun { .. }
                | DecodeError::CorruptCount { .. }
                | DecodeError::TruncatedRecord { .. }
        )
    }

    /// Stable identifier used in report fault summaries.
    pub fn code(&self) -> &'static str {
        match self {
            DecodeError::BufferOverrun { .. } => "MW-BUFFER-OVERRUN",
            DecodeError::CorruptCount { .. } => "MW-CORRUPT-COUNT",
            DecodeError::TruncatedRecord { .. } => "MW-TRUNCATED-RECORD",
            DecodeError::UnknownMessage { .. } => "MW-UNKNOWN-MESSAGE",
            DecodeError::UnknownDescriptorType { .. } => "MW-UNKNOWN-DESCRIPTOR",
            DecodeError::UnknownFrameSection { .. } => "MW-UNKNOWN-FRAME-SECTION",
            DecodeError::TrailingOrShortData { .. } => "MW-LENGTH-MISMATCH",
        }
    }

    pub fn severity(&self) -> &'static str {
        if self.is_fatal() { "error" } else { "warning" }
    }

    /// Re-labels an overrun raised inside description `index` as a truncated record.
    pub(crate) fn into_truncated(self, index: usize) -> Self {
        match self {
            DecodeError::BufferOverrun {
                record,
                offset,
                needed,
                available,
            } => DecodeError::TruncatedRecord {
                record,
                index,
                offset,
                needed,
                available,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DecodeError, RecordKind};

    #[test]
    fn overrun_becomes_truncated_record() {
        let err = DecodeError::BufferOverrun {
            record: RecordKind::SkeletonDescription,
            offset: 40,
            needed: 4,
            available: 1,
        };
        let truncated = err.into_truncated(3);
        assert_eq!(
            truncated,
            DecodeError::TruncatedRecord {
                record: RecordKind::SkeletonDescription,
                index: 3,
                offset: 40,
                needed: 4,
                available: 1,
            }
        );
        assert!(truncated.is_fatal());
    }

    #[test]
    fn diagnostics_are_not_fatal() {
        let err = DecodeError::TrailingOrShortData {
            record: RecordKind::FrameSuffix,
            message_id: 7,
            declared: 100,
            consumed: 96,
        };
        assert!(!err.is_fatal());
        assert_eq!(err.severity(), "warning");
        assert_eq!(err.code(), "MW-LENGTH-MISMATCH");
    }

    #[test]
    fn diagnostics_name_their_location() {
        let trailing = DecodeError::TrailingOrShortData {
            record: RecordKind::FrameSuffix,
            message_id: 7,
            declared: 100,
            consumed: 96,
        };
        assert_eq!(
            trailing.to_string(),
            "frame suffix of message 7 ends at offset 96 but 100 bytes were declared"
        );
        let unknown = DecodeError::UnknownMessage {
            record: RecordKind::Payload,
            message_id: 55,
            offset: 4,
            length: 3,
        };
        assert_eq!(
            unknown.to_string(),
            "unknown message id 55: payload at offset 4 (3 bytes)"
        );
        let skipped = DecodeError::UnknownDescriptorType {
            record: RecordKind::DescriptionSet,
            tag: 42,
            offset: 4,
            skipped: 5,
        };
        assert_eq!(
            skipped.to_string(),
            "unknown description type 42 in description set at offset 4: skipped 5 bytes"
        );
    }
}
