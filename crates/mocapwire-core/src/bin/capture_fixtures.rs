//! Writes demo captures of a streaming session.
//!
//! Usage: `capture_fixtures [OUTPUT_DIR]` (default `fixtures`). One capture is
//! written per protocol version so decoders can be exercised across the
//! version gates without live hardware.

use std::path::PathBuf;

use mocapwire_core::{ProtocolVersion, SessionPlan, synthetic_session, write_pcapng};

const VERSIONS: [(u8, u8); 4] = [(2, 5), (3, 0), (3, 1), (4, 1)];

fn main() -> Result<(), String> {
    let root = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("fixtures"));

    for (major, minor) in VERSIONS {
        let plan = SessionPlan {
            version: ProtocolVersion::new(major, minor, 0, 0),
            frames: 240,
            dropped_frames: vec![100, 101],
            ..SessionPlan::default()
        };
        let frames = synthetic_session(&plan).map_err(|err| err.to_string())?;
        let path = root.join(format!("session_v{major}_{minor}.pcapng"));
        write_pcapng(&path, &frames)
            .map_err(|err| format!("failed to write {}: {}", path.display(), err))?;
        println!("wrote {} ({} packets)", path.display(), frames.len());
    }
    Ok(())
}
