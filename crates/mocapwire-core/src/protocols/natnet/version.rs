use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Negotiated protocol version `[major.minor.build.revision]`.
///
/// `major == 0` is the wildcard: every version-gated field is treated as
/// present. The all-zero default is therefore the wildcard as well, which is
/// how a decoder behaves before any server info has been seen.
///
/// # Examples
/// ```
/// use mocapwire_core::ProtocolVersion;
///
/// let v = ProtocolVersion::new(2, 6, 0, 0);
/// assert!(v.at_least(2, 6));
/// assert!(!v.at_least(3, 0));
/// assert!(ProtocolVersion::WILDCARD.at_least(9, 9));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
    pub build: u8,
    pub revision: u8,
}

impl ProtocolVersion {
    pub const WILDCARD: ProtocolVersion = ProtocolVersion::new(0, 0, 0, 0);

    pub const fn new(major: u8, minor: u8, build: u8, revision: u8) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2], bytes[3])
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        [self.major, self.minor, self.build, self.revision]
    }

    pub const fn is_wildcard(self) -> bool {
        self.major == 0
    }

    /// True when fields introduced in `major.minor` are on the wire.
    pub fn at_least(self, major: u8, minor: u8) -> bool {
        self.is_wildcard() || (self.major, self.minor) >= (major, minor)
    }

    /// True when fields removed in `major.minor` are still on the wire.
    pub fn before(self, major: u8, minor: u8) -> bool {
        self.is_wildcard() || (self.major, self.minor) < (major, minor)
    }

    fn pack(self) -> u32 {
        u32::from_le_bytes(self.to_bytes())
    }

    fn unpack(raw: u32) -> Self {
        Self::from_bytes(raw.to_le_bytes())
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    #[error("expected 2 to 4 dot-separated components, got {count}")]
    ComponentCount { count: usize },
    #[error("invalid version component '{component}'")]
    InvalidComponent { component: String },
}

impl FromStr for ProtocolVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if !(2..=4).contains(&parts.len()) {
            return Err(VersionParseError::ComponentCount { count: parts.len() });
        }
        let mut bytes = [0u8; 4];
        for (slot, part) in bytes.iter_mut().zip(&parts) {
            *slot = part
                .parse::<u8>()
                .map_err(|_| VersionParseError::InvalidComponent {
                    component: (*part).to_string(),
                })?;
        }
        Ok(Self::from_bytes(bytes))
    }
}

/// Bitstream renegotiation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitstreamState {
    Stable,
    ChangePending { requested: ProtocolVersion },
}

/// Version state shared by every decoder of one server session.
///
/// Single writer (the handshake / renegotiation path), many readers. Writes
/// use release ordering and reads acquire ordering, so a decoder on another
/// thread that observes a committed version also observes everything the
/// committing thread did before it.
#[derive(Debug, Default)]
pub struct StreamContext {
    version: AtomicU32,
    pending: AtomicBool,
    requested: AtomicU32,
}

impl StreamContext {
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            version: AtomicU32::new(version.pack()),
            pending: AtomicBool::new(false),
            requested: AtomicU32::new(0),
        }
    }

    pub fn version(&self) -> ProtocolVersion {
        ProtocolVersion::unpack(self.version.load(Ordering::Acquire))
    }

    pub fn commit_version(&self, version: ProtocolVersion) {
        self.version.store(version.pack(), Ordering::Release);
    }

    pub fn bitstream_state(&self) -> BitstreamState {
        if self.pending.load(Ordering::Acquire) {
            BitstreamState::ChangePending {
                requested: ProtocolVersion::unpack(self.requested.load(Ordering::Acquire)),
            }
        } else {
            BitstreamState::Stable
        }
    }

    /// Enters `ChangePending`; frames are skipped until one confirms the change.
    pub fn begin_bitstream_change(&self, requested: ProtocolVersion) {
        self.requested.store(requested.pack(), Ordering::Release);
        self.pending.store(true, Ordering::Release);
    }

    /// Abandons a pending change, e.g. when the request could not be sent.
    pub fn cancel_bitstream_change(&self) {
        self.pending.store(false, Ordering::Release);
    }

    /// Leaves `ChangePending`, committing the requested version. Returns the
    /// committed version, or `None` if no change was pending.
    pub fn confirm_bitstream_change(&self) -> Option<ProtocolVersion> {
        if !self.pending.swap(false, Ordering::AcqRel) {
            return None;
        }
        let requested = ProtocolVersion::unpack(self.requested.load(Ordering::Acquire));
        self.commit_version(requested);
        Some(requested)
    }
}

#[cfg(test)]
mod tests {
    use super::{BitstreamState, ProtocolVersion, StreamContext, VersionParseError};

    #[test]
    fn at_least_compares_major_then_minor() {
        let v = ProtocolVersion::new(2, 11, 0, 0);
        assert!(v.at_least(2, 9));
        assert!(v.at_least(2, 11));
        assert!(!v.at_least(2, 12));
        assert!(!v.at_least(3, 0));
        assert!(ProtocolVersion::new(3, 0, 0, 0).at_least(2, 11));
    }

    #[test]
    fn before_is_the_complement_for_concrete_versions() {
        let v = ProtocolVersion::new(2, 5, 0, 0);
        assert!(v.before(3, 0));
        assert!(v.before(2, 6));
        assert!(!v.before(2, 5));
        assert!(!ProtocolVersion::new(3, 0, 0, 0).before(3, 0));
    }

    #[test]
    fn wildcard_passes_every_gate() {
        let v = ProtocolVersion::WILDCARD;
        assert!(v.at_least(4, 1));
        assert!(v.at_least(255, 255));
        assert!(v.before(2, 0));
    }

    #[test]
    fn parse_short_and_full_forms() {
        assert_eq!(
            "3.1".parse::<ProtocolVersion>().unwrap(),
            ProtocolVersion::new(3, 1, 0, 0)
        );
        assert_eq!(
            "4.1.2.3".parse::<ProtocolVersion>().unwrap(),
            ProtocolVersion::new(4, 1, 2, 3)
        );
        assert_eq!(
            "4".parse::<ProtocolVersion>().unwrap_err(),
            VersionParseError::ComponentCount { count: 1 }
        );
        assert!(matches!(
            "3.x".parse::<ProtocolVersion>().unwrap_err(),
            VersionParseError::InvalidComponent { .. }
        ));
    }

    #[test]
    fn display_is_dotted_quad() {
        assert_eq!(ProtocolVersion::new(3, 1, 0, 2).to_string(), "3.1.0.2");
    }

    #[test]
    fn context_commits_and_confirms() {
        let ctx = StreamContext::default();
        assert!(ctx.version().is_wildcard());

        ctx.commit_version(ProtocolVersion::new(3, 1, 0, 0));
        assert_eq!(ctx.version(), ProtocolVersion::new(3, 1, 0, 0));
        assert_eq!(ctx.confirm_bitstream_change(), None);

        let requested = ProtocolVersion::new(4, 1, 0, 0);
        ctx.begin_bitstream_change(requested);
        assert_eq!(
            ctx.bitstream_state(),
            BitstreamState::ChangePending { requested }
        );
        assert_eq!(ctx.version(), ProtocolVersion::new(3, 1, 0, 0));

        assert_eq!(ctx.confirm_bitstream_change(), Some(requested));
        assert_eq!(ctx.bitstream_state(), BitstreamState::Stable);
        assert_eq!(ctx.version(), requested);
    }

    #[test]
    fn context_is_shared_across_threads() {
        let ctx = std::sync::Arc::new(StreamContext::default());
        let writer = std::sync::Arc::clone(&ctx);
        std::thread::spawn(move || writer.commit_version(ProtocolVersion::new(3, 0, 0, 0)))
            .join()
            .unwrap();
        assert_eq!(ctx.version(), ProtocolVersion::new(3, 0, 0, 0));
    }
}
