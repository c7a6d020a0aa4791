//! Synthetic capture of a short streaming session.
//!
//! Produces the frames a sniffer would see while a client connects to a
//! server, asks for the model definitions and then receives a run of frames
//! on the multicast data channel. Used by the fixture binary and by tests.

use std::net::{Ipv4Addr, SocketAddrV4};

use thiserror::Error;

use crate::protocols::natnet::model::{
    DescriptionRecord, DescriptionSet, FrameFlags, FrameSnapshot, FrameSuffix, HighResTimestamps,
    LabeledMarker, MarkerFlags, MarkerId, MarkerSetData, MarkerSetDescription, Name, Quat,
    RigidBodyDescription, RigidBodyMarkerDescription, RigidBodyPose, ServerInfo, Timecode, Vec3,
};
use crate::protocols::natnet::{
    ControlKind, EncodeError, ProtocolVersion, build_control_packet, build_packet,
    encode_descriptions, encode_frame, encode_server_info, layout,
};

use super::pcap::writer::{CaptureWriteError, CapturedFrame, ethernet_udp_frame};

const SERVER_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 10, 2);
const CLIENT_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 10, 20);
const CLIENT_PORT: u16 = 52_000;
const FRAME_RATE: u32 = 120;
const WAND_MARKERS: u16 = 3;
const WAND_ID: i32 = 1;
const WAND_NAME: &str = "wand";
const HIGH_RES_TICKS_PER_FRAME: u64 = 83_333;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot encode packet: {0}")]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Capture(#[from] CaptureWriteError),
}

/// Shape of a synthetic session.
///
/// # Examples
/// ```
/// use mocapwire_core::{SessionPlan, synthetic_session};
///
/// let plan = SessionPlan {
///     frames: 4,
///     ..SessionPlan::default()
/// };
/// // connect, server info, model request, model definitions, then frames
/// assert_eq!(synthetic_session(&plan).unwrap().len(), 4 + 4);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPlan {
    pub version: ProtocolVersion,
    pub frames: u32,
    pub first_frame: u32,
    /// Frame numbers never sent, to exercise gap accounting.
    pub dropped_frames: Vec<u32>,
    pub start_us: u64,
}

impl Default for SessionPlan {
    fn default() -> Self {
        Self {
            version: ProtocolVersion::new(3, 1, 0, 0),
            frames: 120,
            first_frame: 1,
            dropped_frames: Vec::new(),
            start_us: 1_700_000_000_000_000,
        }
    }
}

/// Builds the captured frames of the session described by `plan`.
pub fn synthetic_session(plan: &SessionPlan) -> Result<Vec<CapturedFrame>, SessionError> {
    let server_cmd = SocketAddrV4::new(SERVER_IP, layout::PORT_COMMAND);
    let client = SocketAddrV4::new(CLIENT_IP, CLIENT_PORT);
    let server_data = SocketAddrV4::new(SERVER_IP, layout::PORT_DATA);
    let group = SocketAddrV4::new(Ipv4Addr::from(layout::MULTICAST_ADDRESS), layout::PORT_DATA);

    let info = ServerInfo {
        app_name: "Motive".into(),
        app_version: ProtocolVersion::new(3, 1, 0, 0),
        protocol_version: plan.version,
    };
    let model = encode_descriptions(&model_definitions(plan.version), plan.version);

    let mut timeline = Timeline {
        ts_us: plan.start_us,
        frames: Vec::new(),
    };
    timeline.push(client, server_cmd, &build_control_packet(ControlKind::Connect), 500)?;
    let handshake = build_packet(layout::NAT_SERVERINFO, &encode_server_info(&info))?;
    timeline.push(server_cmd, client, &handshake, 500)?;
    let request = build_control_packet(ControlKind::RequestModelDef);
    timeline.push(client, server_cmd, &request, 500)?;
    let model = build_packet(layout::NAT_MODELDEF, &model)?;
    timeline.push(server_cmd, client, &model, 10_000)?;

    let frame_us = 1_000_000 / u64::from(FRAME_RATE);
    for index in 0..plan.frames {
        let number = plan.first_frame.wrapping_add(index);
        if plan.dropped_frames.contains(&number) {
            timeline.ts_us += frame_us;
            continue;
        }
        let payload = encode_frame(&frame(number, plan.first_frame), plan.version);
        let packet = build_packet(layout::NAT_FRAMEOFDATA, &payload)?;
        timeline.push(server_data, group, &packet, frame_us)?;
    }
    Ok(timeline.frames)
}

struct Timeline {
    ts_us: u64,
    frames: Vec<CapturedFrame>,
}

impl Timeline {
    fn push(
        &mut self,
        src: SocketAddrV4,
        dst: SocketAddrV4,
        payload: &[u8],
        step_us: u64,
    ) -> Result<(), SessionError> {
        self.frames.push(CapturedFrame {
            ts_us: self.ts_us,
            data: ethernet_udp_frame(src, dst, payload)?,
        });
        self.ts_us += step_us;
        Ok(())
    }
}

fn wand_marker_offset(index: u16) -> Vec3 {
    Vec3::new(f32::from(index) * 0.05, 0.0, 0.0)
}

fn model_definitions(version: ProtocolVersion) -> DescriptionSet {
    let named = version.at_least(4, 0);
    let markers = (1..=WAND_MARKERS)
        .map(|index| RigidBodyMarkerDescription {
            position: wand_marker_offset(index),
            label: i32::from(index),
            name: named.then(|| format!("{WAND_NAME}_{index}").into()),
        })
        .collect();
    DescriptionSet {
        records: vec![
            DescriptionRecord::MarkerSet(MarkerSetDescription {
                name: WAND_NAME.into(),
                markers: (1..=WAND_MARKERS)
                    .map(|index| Name::from(format!("{WAND_NAME}_{index}")))
                    .collect(),
            }),
            DescriptionRecord::RigidBody(RigidBodyDescription {
                name: version.at_least(2, 0).then(|| WAND_NAME.into()),
                id: WAND_ID,
                parent_id: -1,
                offset: Vec3::default(),
                markers,
            }),
        ],
    }
}

fn frame(number: u32, first: u32) -> FrameSnapshot {
    let elapsed = number.wrapping_sub(first);
    let t = elapsed as f32 / FRAME_RATE as f32;
    let origin = Vec3::new(t.sin() * 0.5, 1.0, t.cos() * 0.5);
    let markers: Vec<Vec3> = (1..=WAND_MARKERS)
        .map(|index| {
            let offset = wand_marker_offset(index);
            Vec3::new(origin.x + offset.x, origin.y, origin.z)
        })
        .collect();
    let labeled = markers
        .iter()
        .zip(1..=WAND_MARKERS)
        .map(|(position, index)| LabeledMarker {
            id: MarkerId::new(WAND_ID as u16, index),
            position: *position,
            size: 0.014,
            flags: MarkerFlags::MODEL_SOLVED | MarkerFlags::HAS_MODEL,
            residual: Some(0.25),
        })
        .collect();
    let seconds = elapsed / FRAME_RATE;

    FrameSnapshot {
        frame_number: number,
        marker_sets: vec![MarkerSetData {
            name: WAND_NAME.into(),
            markers,
        }],
        rigid_bodies: vec![RigidBodyPose {
            id: WAND_ID,
            position: origin,
            orientation: Quat::IDENTITY,
            legacy_markers: None,
            mean_error: Some(0.0004),
            tracking_valid: Some(true),
        }],
        labeled_markers: labeled,
        suffix: FrameSuffix {
            timecode: Timecode {
                hours: 10,
                minutes: (seconds / 60 % 60) as u8,
                seconds: (seconds % 60) as u8,
                frame: (elapsed % FRAME_RATE) as u8,
                subframe: 0,
            },
            timestamp: f64::from(elapsed) / f64::from(FRAME_RATE),
            high_res: Some(HighResTimestamps {
                mid_exposure: u64::from(elapsed) * HIGH_RES_TICKS_PER_FRAME,
                camera_data_received: u64::from(elapsed) * HIGH_RES_TICKS_PER_FRAME + 1_000,
                transmit: u64::from(elapsed) * HIGH_RES_TICKS_PER_FRAME + 1_500,
            }),
            flags: FrameFlags::empty(),
            end_marker: 0,
        },
        ..FrameSnapshot::default()
    }
}

#[cfg(test)]
mod tests {
    use super::{SessionPlan, synthetic_session};
    use crate::protocols::natnet::ProtocolVersion;

    #[test]
    fn dropped_frames_are_not_emitted() {
        let plan = SessionPlan {
            frames: 10,
            dropped_frames: vec![3, 4],
            ..SessionPlan::default()
        };
        let frames = synthetic_session(&plan).unwrap();
        assert_eq!(frames.len(), 4 + 8);
        assert!(frames.windows(2).all(|w| w[0].ts_us < w[1].ts_us));
    }

    #[test]
    fn every_version_builds() {
        for version in [
            ProtocolVersion::new(2, 5, 0, 0),
            ProtocolVersion::new(3, 0, 0, 0),
            ProtocolVersion::new(4, 1, 0, 0),
        ] {
            let plan = SessionPlan {
                version,
                frames: 2,
                ..SessionPlan::default()
            };
            assert_eq!(synthetic_session(&plan).unwrap().len(), 6);
        }
    }
}
