use super::error::{DecodeError, RecordKind};
use super::layout;
use super::model::{
    AnalogData, AssetData, AssetMarker, FrameFlags, FrameSnapshot, FrameSuffix,
    HighResTimestamps, LabeledMarker, LegacyRigidBodyMarker, MarkerFlags, MarkerId,
    MarkerSetData, RigidBodyPose, SkeletonData, Timecode, Vec3,
};
use super::reader::ByteCursor;
use super::version::ProtocolVersion;

/// Decodes a frame-of-data payload.
///
/// Sections appear on the wire in this order: frame number, markersets,
/// legacy markers, rigid bodies, skeletons (2.1+), assets (4.1+), labeled
/// markers (2.3+), force plates (2.9+), devices (2.11+), suffix. From 4.1
/// each counted section also declares its byte size; disagreements are
/// pushed onto `faults` as [`DecodeError::UnknownFrameSection`].
pub fn decode_frame(
    cursor: &mut ByteCursor<'_>,
    version: ProtocolVersion,
    faults: &mut Vec<DecodeError>,
) -> Result<FrameSnapshot, DecodeError> {
    let frame_number = cursor.scoped(RecordKind::FramePrefix, |c| c.read_u32())?;

    let marker_sets = section(cursor, version, RecordKind::MarkerSets, faults, |c, count| {
        let mut sets = Vec::with_capacity(c.capacity_for(count, 5));
        for _ in 0..count {
            let name = c.read_string()?;
            let markers = read_positions(c)?;
            sets.push(MarkerSetData { name, markers });
        }
        Ok(sets)
    })?;

    let legacy_markers = section(cursor, version, RecordKind::LegacyMarkers, faults, |c, count| {
        read_vec3s(c, count)
    })?;

    let rigid_bodies = section(cursor, version, RecordKind::RigidBodies, faults, |c, count| {
        let mut bodies = Vec::with_capacity(c.capacity_for(count, 32));
        for _ in 0..count {
            bodies.push(read_rigid_body(c, version, true)?);
        }
        Ok(bodies)
    })?;

    let skeletons = if version.at_least(2, 1) {
        section(cursor, version, RecordKind::Skeletons, faults, |c, count| {
            let mut skeletons = Vec::with_capacity(c.capacity_for(count, 8));
            for _ in 0..count {
                let id = c.read_i32()?;
                let bodies = c.read_count(layout::MAX_COUNT)?;
                let mut rigid_bodies = Vec::with_capacity(c.capacity_for(bodies, 32));
                for _ in 0..bodies {
                    rigid_bodies.push(read_rigid_body(c, version, false)?);
                }
                skeletons.push(SkeletonData { id, rigid_bodies });
            }
            Ok(skeletons)
        })?
    } else {
        Vec::new()
    };

    let assets = if version.at_least(4, 1) {
        section(cursor, version, RecordKind::Assets, faults, |c, count| {
            let mut assets = Vec::with_capacity(c.capacity_for(count, 12));
            for _ in 0..count {
                assets.push(read_asset(c)?);
            }
            Ok(assets)
        })?
    } else {
        Vec::new()
    };

    let labeled_markers = if version.at_least(2, 3) {
        section(cursor, version, RecordKind::LabeledMarkers, faults, |c, count| {
            let mut markers = Vec::with_capacity(c.capacity_for(count, 20));
            for _ in 0..count {
                markers.push(read_labeled_marker(c, version)?);
            }
            Ok(markers)
        })?
    } else {
        Vec::new()
    };

    let force_plates = if version.at_least(2, 9) {
        section(cursor, version, RecordKind::ForcePlates, faults, read_analog_set)?
    } else {
        Vec::new()
    };

    let devices = if version.at_least(2, 11) {
        section(cursor, version, RecordKind::Devices, faults, read_analog_set)?
    } else {
        Vec::new()
    };

    let suffix = cursor.scoped(RecordKind::FrameSuffix, |c| read_suffix(c, version))?;

    Ok(FrameSnapshot {
        frame_number,
        marker_sets,
        legacy_markers,
        rigid_bodies,
        skeletons,
        assets,
        labeled_markers,
        force_plates,
        devices,
        suffix,
    })
}

/// Reads a count-prefixed section and, from 4.1, checks it against its
/// declared byte size. A short body is padded out to the declared size.
fn section<T>(
    cursor: &mut ByteCursor<'_>,
    version: ProtocolVersion,
    record: RecordKind,
    faults: &mut Vec<DecodeError>,
    body: impl FnOnce(&mut ByteCursor<'_>, usize) -> Result<T, DecodeError>,
) -> Result<T, DecodeError> {
    cursor.scoped(record, |c| {
        let count = c.read_count(layout::MAX_COUNT)?;
        let declared = if version.at_least(4, 1) {
            Some(c.read_u32()? as usize)
        } else {
            None
        };
        let start = c.position();
        let out = body(c, count)?;
        if let Some(declared) = declared {
            let decoded = c.position() - start;
            if decoded != declared {
                faults.push(DecodeError::UnknownFrameSection {
                    record,
                    offset: start,
                    declared,
                    decoded,
                });
                if decoded < declared {
                    c.skip(declared - decoded)?;
                }
            }
        }
        Ok(out)
    })
}

fn read_vec3s(cursor: &mut ByteCursor<'_>, count: usize) -> Result<Vec<Vec3>, DecodeError> {
    cursor.require(count.saturating_mul(layout::VEC3_LEN))?;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(cursor.read_vec3()?);
    }
    Ok(out)
}

fn read_positions(cursor: &mut ByteCursor<'_>) -> Result<Vec<Vec3>, DecodeError> {
    let count = cursor.read_count(layout::MAX_COUNT)?;
    read_vec3s(cursor, count)
}

/// Rigid-body entry. `legacy_block` is set for top-level bodies, which carry
/// their own marker arrays before 3.0.
fn read_rigid_body(
    cursor: &mut ByteCursor<'_>,
    version: ProtocolVersion,
    legacy_block: bool,
) -> Result<RigidBodyPose, DecodeError> {
    let id = cursor.read_i32()?;
    let position = cursor.read_vec3()?;
    let orientation = cursor.read_quat()?;
    let legacy_markers = if legacy_block && version.before(3, 0) {
        Some(read_legacy_markers(cursor, version)?)
    } else {
        None
    };
    let mean_error = if version.at_least(2, 0) {
        Some(cursor.read_f32()?)
    } else {
        None
    };
    let tracking_valid = if version.at_least(2, 6) {
        Some(cursor.read_u16()? & layout::TRACKING_VALID_BIT != 0)
    } else {
        None
    };
    Ok(RigidBodyPose {
        id,
        position,
        orientation,
        legacy_markers,
        mean_error,
        tracking_valid,
    })
}

/// Positions, then (2.0+) ids, then sizes, as three consecutive arrays.
fn read_legacy_markers(
    cursor: &mut ByteCursor<'_>,
    version: ProtocolVersion,
) -> Result<Vec<LegacyRigidBodyMarker>, DecodeError> {
    let count = cursor.read_count(layout::MAX_COUNT)?;
    let with_ids = version.at_least(2, 0);
    let positions_len = count.saturating_mul(layout::VEC3_LEN);
    let column_len = if with_ids { count.saturating_mul(4) } else { 0 };

    let mut positions = cursor.sub_cursor(positions_len)?;
    let mut ids = cursor.sub_cursor_at(positions_len, column_len)?;
    let mut sizes = cursor.sub_cursor_at(positions_len.saturating_add(column_len), column_len)?;

    let mut markers = Vec::with_capacity(count);
    for _ in 0..count {
        let position = positions.read_vec3()?;
        let (id, size) = if with_ids {
            (Some(ids.read_i32()?), Some(sizes.read_f32()?))
        } else {
            (None, None)
        };
        markers.push(LegacyRigidBodyMarker { position, id, size });
    }
    cursor.reconcile(&sizes);
    Ok(markers)
}

fn read_asset(cursor: &mut ByteCursor<'_>) -> Result<AssetData, DecodeError> {
    let id = cursor.read_i32()?;

    let count = cursor.read_count(layout::MAX_COUNT)?;
    let mut rigid_bodies = Vec::with_capacity(cursor.capacity_for(count, 38));
    for _ in 0..count {
        let id = cursor.read_i32()?;
        let position = cursor.read_vec3()?;
        let orientation = cursor.read_quat()?;
        let mean_error = cursor.read_f32()?;
        let params = cursor.read_u16()?;
        rigid_bodies.push(RigidBodyPose {
            id,
            position,
            orientation,
            legacy_markers: None,
            mean_error: Some(mean_error),
            tracking_valid: Some(params & layout::TRACKING_VALID_BIT != 0),
        });
    }

    let count = cursor.read_count(layout::MAX_COUNT)?;
    let mut markers = Vec::with_capacity(cursor.capacity_for(count, 26));
    for _ in 0..count {
        markers.push(AssetMarker {
            id: cursor.read_i32()?,
            position: cursor.read_vec3()?,
            size: cursor.read_f32()?,
            params: cursor.read_u16()?,
            residual: cursor.read_f32()?,
        });
    }

    Ok(AssetData {
        id,
        rigid_bodies,
        markers,
    })
}

fn read_labeled_marker(
    cursor: &mut ByteCursor<'_>,
    version: ProtocolVersion,
) -> Result<LabeledMarker, DecodeError> {
    let id = MarkerId::from_packed(cursor.read_u32()?);
    let position = cursor.read_vec3()?;
    let size = cursor.read_f32()?;
    let flags = if version.at_least(2, 6) {
        MarkerFlags::decode(cursor.read_u16()?, version)
    } else {
        MarkerFlags::empty()
    };
    let residual = if version.at_least(3, 0) {
        Some(cursor.read_f32()? * layout::RESIDUAL_SCALE)
    } else {
        None
    };
    Ok(LabeledMarker {
        id,
        position,
        size,
        flags,
        residual,
    })
}

/// Force plates and devices share one shape: id, then per channel a counted
/// run of samples.
fn read_analog_set(
    cursor: &mut ByteCursor<'_>,
    count: usize,
) -> Result<Vec<AnalogData>, DecodeError> {
    let mut out = Vec::with_capacity(cursor.capacity_for(count, 8));
    for _ in 0..count {
        let id = cursor.read_i32()?;
        let channel_count = cursor.read_count(layout::MAX_COUNT)?;
        let mut channels = Vec::with_capacity(cursor.capacity_for(channel_count, 4));
        for _ in 0..channel_count {
            let frames = cursor.read_count(layout::MAX_COUNT)?;
            cursor.require(frames.saturating_mul(4))?;
            let mut samples = Vec::with_capacity(frames);
            for _ in 0..frames {
                samples.push(cursor.read_f32()?);
            }
            channels.push(samples);
        }
        out.push(AnalogData { id, channels });
    }
    Ok(out)
}

fn read_suffix(
    cursor: &mut ByteCursor<'_>,
    version: ProtocolVersion,
) -> Result<FrameSuffix, DecodeError> {
    let raw_timecode = cursor.read_u32()?;
    let subframe = cursor.read_u32()?;
    let timestamp = if version.at_least(2, 7) {
        cursor.read_f64()?
    } else {
        f64::from(cursor.read_f32()?)
    };
    let high_res = if version.at_least(3, 0) {
        Some(HighResTimestamps {
            mid_exposure: cursor.read_u64()?,
            camera_data_received: cursor.read_u64()?,
            transmit: cursor.read_u64()?,
        })
    } else {
        None
    };
    let flags = FrameFlags::from_bits_retain(cursor.read_u16()?);
    let end_marker = cursor.read_u32()?;
    Ok(FrameSuffix {
        timecode: Timecode::from_raw(raw_timecode, subframe),
        timestamp,
        high_res,
        flags,
        end_marker,
    })
}

#[cfg(test)]
mod tests {
    use super::decode_frame;
    use crate::protocols::natnet::error::{DecodeError, RecordKind};
    use crate::protocols::natnet::model::{
        AnalogData, AssetData, AssetMarker, FrameFlags, FrameSnapshot, FrameSuffix,
        HighResTimestamps, LabeledMarker, LegacyRigidBodyMarker, MarkerFlags, MarkerId,
        MarkerSetData, Quat, RigidBodyPose, SkeletonData, Timecode, Vec3,
    };
    use crate::protocols::natnet::reader::ByteCursor;
    use crate::protocols::natnet::version::ProtocolVersion;
    use crate::protocols::natnet::writer::{PayloadWriter, encode_frame};

    fn decode(
        bytes: &[u8],
        version: ProtocolVersion,
    ) -> (Result<FrameSnapshot, DecodeError>, Vec<DecodeError>, usize) {
        let mut faults = Vec::new();
        let mut cursor = ByteCursor::new(bytes);
        let frame = decode_frame(&mut cursor, version, &mut faults);
        (frame, faults, cursor.position())
    }

    fn pose(id: i32) -> RigidBodyPose {
        RigidBodyPose {
            id,
            position: Vec3::new(1.0, 2.0, 3.0),
            orientation: Quat::new(0.0, 0.0, 0.7071, 0.7071),
            legacy_markers: None,
            mean_error: Some(0.25),
            tracking_valid: Some(true),
        }
    }

    /// Frame with every section populated, as a 4.1 server would send it.
    fn full_frame() -> FrameSnapshot {
        FrameSnapshot {
            frame_number: 1234,
            marker_sets: vec![MarkerSetData {
                name: "actor".into(),
                markers: vec![Vec3::new(0.1, 0.2, 0.3), Vec3::new(0.4, 0.5, 0.6)],
            }],
            legacy_markers: vec![Vec3::new(9.0, 9.0, 9.0)],
            rigid_bodies: vec![pose(1), pose(2)],
            skeletons: vec![SkeletonData {
                id: 5,
                rigid_bodies: vec![pose(6)],
            }],
            assets: vec![AssetData {
                id: 8,
                rigid_bodies: vec![pose(9)],
                markers: vec![AssetMarker {
                    id: 10,
                    position: Vec3::new(1.0, 1.0, 1.0),
                    size: 0.02,
                    params: 0x11,
                    residual: 0.5,
                }],
            }],
            labeled_markers: vec![LabeledMarker {
                id: MarkerId::new(3, 17),
                position: Vec3::new(0.0, 1.0, 0.0),
                size: 0.014,
                flags: MarkerFlags::MODEL_SOLVED | MarkerFlags::HAS_MODEL,
                residual: Some(0.5),
            }],
            force_plates: vec![AnalogData {
                id: 1,
                channels: vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            }],
            devices: vec![AnalogData {
                id: 2,
                channels: vec![vec![7.5]],
            }],
            suffix: FrameSuffix {
                timecode: Timecode::from_raw(0x0B14_1E32, 1),
                timestamp: 12.5,
                high_res: Some(HighResTimestamps {
                    mid_exposure: 100,
                    camera_data_received: 200,
                    transmit: 300,
                }),
                flags: FrameFlags::RECORDING | FrameFlags::LIVE_MODE,
                end_marker: 0,
            },
        }
    }

    #[test]
    fn decodes_every_section_at_v4_1() {
        let v = ProtocolVersion::new(4, 1, 0, 0);
        let bytes = encode_frame(&full_frame(), v);
        let (frame, faults, end) = decode(&bytes, v);
        assert!(faults.is_empty(), "{faults:?}");
        assert_eq!(end, bytes.len());
        assert_eq!(frame.unwrap(), full_frame());
    }

    #[test]
    fn residual_is_scaled_on_decode() {
        let v = ProtocolVersion::new(3, 1, 0, 0);
        let mut w = PayloadWriter::new();
        w.put_u32(1);
        w.put_u32(0);
        w.put_u32(0);
        w.put_u32(0);
        w.put_u32(0);
        // one labeled marker
        w.put_u32(1);
        w.put_u32(MarkerId::new(1, 2).packed());
        w.put_vec3(Vec3::default());
        w.put_f32(0.01);
        w.put_u16(0x08);
        w.put_f32(0.002);
        w.put_u32(0);
        w.put_u32(0);
        // suffix
        w.put_bytes(&[0; 8 + 8 + 24]);
        w.put_u16(0);
        w.put_u32(0);
        let bytes = w.into_bytes();

        let (frame, faults, end) = decode(&bytes, v);
        let frame = frame.unwrap();
        assert!(faults.is_empty());
        assert_eq!(end, bytes.len());
        let marker = frame.labeled_markers[0];
        assert_eq!((marker.id.model_id, marker.id.marker_id), (1, 2));
        assert_eq!(marker.flags, MarkerFlags::HAS_MODEL);
        assert_eq!(marker.residual, Some(0.002 * 1000.0));
    }

    #[test]
    fn legacy_rigid_body_markers_before_v3() {
        let v = ProtocolVersion::new(2, 5, 0, 0);
        let mut body = pose(4);
        body.tracking_valid = None;
        body.legacy_markers = Some(vec![
            LegacyRigidBodyMarker {
                position: Vec3::new(1.0, 0.0, 0.0),
                id: Some(11),
                size: Some(0.01),
            },
            LegacyRigidBodyMarker {
                position: Vec3::new(0.0, 1.0, 0.0),
                id: Some(12),
                size: Some(0.02),
            },
        ]);
        let frame = FrameSnapshot {
            frame_number: 3,
            rigid_bodies: vec![body.clone()],
            ..FrameSnapshot::default()
        };
        let bytes = encode_frame(&frame, v);
        let (decoded, faults, end) = decode(&bytes, v);
        let decoded = decoded.unwrap();
        assert!(faults.is_empty());
        assert_eq!(end, bytes.len());
        assert_eq!(decoded.rigid_bodies, vec![body]);
    }

    #[test]
    fn v1_rigid_bodies_have_positions_only() {
        let v = ProtocolVersion::new(1, 4, 0, 0);
        let mut body = pose(4);
        body.mean_error = None;
        body.tracking_valid = None;
        body.legacy_markers = Some(vec![LegacyRigidBodyMarker {
            position: Vec3::new(1.0, 0.0, 0.0),
            id: None,
            size: None,
        }]);
        let frame = FrameSnapshot {
            rigid_bodies: vec![body.clone()],
            ..FrameSnapshot::default()
        };
        let bytes = encode_frame(&frame, v);
        let (decoded, faults, _) = decode(&bytes, v);
        assert!(faults.is_empty());
        assert_eq!(decoded.unwrap().rigid_bodies, vec![body]);
    }

    #[test]
    fn legacy_marker_arrays_past_the_end_overrun() {
        let v = ProtocolVersion::new(2, 0, 0, 0);
        let mut w = PayloadWriter::new();
        w.put_u32(1);
        w.put_u32(0);
        w.put_u32(0);
        w.put_u32(1);
        w.put_i32(1);
        w.put_vec3(Vec3::default());
        w.put_quat(Quat::IDENTITY);
        w.put_u32(1000);
        let bytes = w.into_bytes();

        let (frame, _, _) = decode(&bytes, v);
        assert!(matches!(
            frame.unwrap_err(),
            DecodeError::BufferOverrun {
                record: RecordKind::RigidBodies,
                needed: 12_000,
                ..
            }
        ));
    }

    #[test]
    fn short_section_is_skipped_to_declared_size() {
        let v = ProtocolVersion::new(4, 1, 0, 0);
        let mut frame = FrameSnapshot::default();
        frame.legacy_markers.push(Vec3::new(1.0, 2.0, 3.0));
        let mut bytes = encode_frame(&frame, v);
        // frame number, markerset count + size, then legacy count + size
        let size_at = 4 + 8 + 4;
        bytes[size_at..size_at + 4].copy_from_slice(&16u32.to_le_bytes());
        bytes.splice(size_at + 4 + 12..size_at + 4 + 12, [0xAA; 4]);

        let (decoded, faults, end) = decode(&bytes, v);
        assert_eq!(decoded.unwrap().legacy_markers, frame.legacy_markers);
        assert_eq!(end, bytes.len());
        assert_eq!(
            faults,
            vec![DecodeError::UnknownFrameSection {
                record: RecordKind::LegacyMarkers,
                offset: size_at + 4,
                declared: 16,
                decoded: 12,
            }]
        );
    }

    #[test]
    fn sections_are_version_gated() {
        let frame = full_frame();
        let v2_0 = ProtocolVersion::new(2, 0, 0, 0);
        let bytes = encode_frame(&frame, v2_0);
        let (decoded, faults, end) = decode(&bytes, v2_0);
        let decoded = decoded.unwrap();
        assert!(faults.is_empty());
        assert_eq!(end, bytes.len());
        assert!(decoded.skeletons.is_empty());
        assert!(decoded.labeled_markers.is_empty());
        assert!(decoded.force_plates.is_empty());
        assert!(decoded.devices.is_empty());
        assert!(decoded.assets.is_empty());
        assert_eq!(decoded.suffix.high_res, None);
        assert_eq!(decoded.suffix.timestamp, 12.5);
    }

    #[test]
    fn wildcard_decodes_the_superset() {
        let mut frame = full_frame();
        frame.rigid_bodies[0].legacy_markers = Some(vec![LegacyRigidBodyMarker {
            position: Vec3::new(1.0, 0.0, 0.0),
            id: Some(1),
            size: Some(0.5),
        }]);
        frame.rigid_bodies[1].legacy_markers = Some(Vec::new());
        let bytes = encode_frame(&frame, ProtocolVersion::WILDCARD);
        let (decoded, faults, end) = decode(&bytes, ProtocolVersion::WILDCARD);
        assert!(faults.is_empty(), "{faults:?}");
        assert_eq!(end, bytes.len());
        let decoded = decoded.unwrap();
        assert_eq!(decoded, frame);

        for concrete in [
            ProtocolVersion::new(1, 0, 0, 0),
            ProtocolVersion::new(2, 5, 0, 0),
            ProtocolVersion::new(2, 11, 0, 0),
            ProtocolVersion::new(3, 1, 0, 0),
            ProtocolVersion::new(4, 1, 0, 0),
        ] {
            let bytes = encode_frame(&frame, concrete);
            let (narrow, _, _) = decode(&bytes, concrete);
            let narrow = narrow.unwrap();
            assert!(narrow.rigid_bodies[0].legacy_markers.is_none() || decoded.rigid_bodies[0].legacy_markers.is_some());
            assert!(narrow.rigid_bodies[0].mean_error.is_none() || decoded.rigid_bodies[0].mean_error.is_some());
            assert!(narrow.rigid_bodies[0].tracking_valid.is_none() || decoded.rigid_bodies[0].tracking_valid.is_some());
            assert!(narrow.labeled_markers.len() <= decoded.labeled_markers.len());
            assert!(narrow.assets.len() <= decoded.assets.len());
            assert!(narrow.suffix.high_res.is_none() || decoded.suffix.high_res.is_some());
        }
    }

    mod proptest_tests {
        use super::{decode, full_frame};
        use crate::protocols::natnet::version::ProtocolVersion;
        use crate::protocols::natnet::writer::encode_frame;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(300))]

            #[test]
            fn prop_arbitrary_bytes_never_panic(
                data in proptest::collection::vec(any::<u8>(), 0usize..512),
                major in 0u8..6,
                minor in 0u8..12,
            ) {
                let version = ProtocolVersion::new(major, minor, 0, 0);
                let _ = decode(&data, version);
            }
        }

        #[test]
        fn every_truncation_is_a_fatal_fault() {
            for version in [
                ProtocolVersion::new(2, 5, 0, 0),
                ProtocolVersion::new(3, 1, 0, 0),
                ProtocolVersion::new(4, 1, 0, 0),
                ProtocolVersion::WILDCARD,
            ] {
                let bytes = encode_frame(&full_frame(), version);
                for cut in 0..bytes.len() {
                    let (frame, _, _) = decode(&bytes[..cut], version);
                    let err = frame.expect_err("truncated frame decoded");
                    assert!(err.is_fatal(), "cut at {cut}: {err}");
                }
            }
        }
    }
}
