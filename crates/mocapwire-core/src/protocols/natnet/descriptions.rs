use tracing::debug;

use super::error::{DecodeError, RecordKind};
use super::layout;
use super::model::{
    AssetDescription, CameraDescription, DescriptionRecord, DescriptionSet, DeviceDescription,
    ForcePlateDescription, MarkerDescription, MarkerSetDescription, Name, RigidBodyDescription,
    RigidBodyMarkerDescription, SkeletonDescription, Vec3,
};
use super::reader::ByteCursor;
use super::version::ProtocolVersion;

/// Decodes a model-definition payload.
///
/// Records are returned in stream order. A fatal fault inside record `i`
/// ends the walk: records `0..i` are returned and the fault is pushed onto
/// `faults` as a [`DecodeError::TruncatedRecord`] (or `CorruptCount`).
/// Records of an unknown type are skipped by their declared size.
pub fn decode_descriptions(
    cursor: &mut ByteCursor<'_>,
    version: ProtocolVersion,
    faults: &mut Vec<DecodeError>,
) -> DescriptionSet {
    let mut set = DescriptionSet::default();
    let count = match cursor.scoped(RecordKind::DescriptionSet, |c| {
        c.read_count(layout::MAX_COUNT)
    }) {
        Ok(count) => count,
        Err(err) => {
            faults.push(err);
            return set;
        }
    };
    // tag + size + an empty markerset
    set.records = Vec::with_capacity(cursor.capacity_for(count, 13));

    for index in 0..count {
        let entry_offset = cursor.position();
        let header = cursor.scoped(RecordKind::DescriptionSet, |c| {
            Ok((c.read_u32()?, c.read_u32()? as usize))
        });
        let (tag, declared) = match header {
            Ok(header) => header,
            Err(err) => {
                faults.push(err.into_truncated(index));
                break;
            }
        };

        let body_start = cursor.position();
        match decode_record(cursor, tag, version) {
            Ok(Some(record)) => {
                let decoded = cursor.position() - body_start;
                if decoded != declared {
                    debug!(
                        kind = record.kind_name(),
                        index, declared, decoded, "description size hint disagrees with decoded extent"
                    );
                }
                set.records.push(record);
            }
            Ok(None) => {
                if let Err(err) = cursor.scoped(RecordKind::DescriptionSet, |c| c.skip(declared)) {
                    faults.push(err.into_truncated(index));
                    break;
                }
                faults.push(DecodeError::UnknownDescriptorType {
                    record: RecordKind::DescriptionSet,
                    tag,
                    offset: entry_offset,
                    skipped: declared,
                });
            }
            Err(err) => {
                faults.push(err.into_truncated(index));
                break;
            }
        }
    }

    set
}

/// `Ok(None)` when there is no layout for `tag` under `version`.
fn decode_record(
    cursor: &mut ByteCursor<'_>,
    tag: u32,
    version: ProtocolVersion,
) -> Result<Option<DescriptionRecord>, DecodeError> {
    let record = match tag {
        layout::DESCRIPTION_MARKERSET => DescriptionRecord::MarkerSet(
            cursor.scoped(RecordKind::MarkerSetDescription, read_markerset)?,
        ),
        layout::DESCRIPTION_RIGID_BODY => {
            DescriptionRecord::RigidBody(read_rigid_body(cursor, version)?)
        }
        layout::DESCRIPTION_SKELETON => DescriptionRecord::Skeleton(
            cursor.scoped(RecordKind::SkeletonDescription, |c| read_skeleton(c, version))?,
        ),
        layout::DESCRIPTION_FORCE_PLATE if version.at_least(3, 0) => DescriptionRecord::ForcePlate(
            cursor.scoped(RecordKind::ForcePlateDescription, read_force_plate)?,
        ),
        layout::DESCRIPTION_DEVICE if version.at_least(3, 0) => DescriptionRecord::Device(
            cursor.scoped(RecordKind::DeviceDescription, read_device)?,
        ),
        layout::DESCRIPTION_CAMERA => DescriptionRecord::Camera(
            cursor.scoped(RecordKind::CameraDescription, read_camera)?,
        ),
        layout::DESCRIPTION_ASSET => DescriptionRecord::Asset(
            cursor.scoped(RecordKind::AssetDescription, |c| read_asset(c, version))?,
        ),
        _ => return Ok(None),
    };
    Ok(Some(record))
}

fn read_names(cursor: &mut ByteCursor<'_>) -> Result<Vec<Name>, DecodeError> {
    let count = cursor.read_count(layout::MAX_COUNT)?;
    let mut names = Vec::with_capacity(cursor.capacity_for(count, 1));
    for _ in 0..count {
        names.push(cursor.read_string()?);
    }
    Ok(names)
}

fn read_markerset(cursor: &mut ByteCursor<'_>) -> Result<MarkerSetDescription, DecodeError> {
    let name = cursor.read_string()?;
    let markers = read_names(cursor)?;
    Ok(MarkerSetDescription { name, markers })
}

fn read_rigid_body(
    cursor: &mut ByteCursor<'_>,
    version: ProtocolVersion,
) -> Result<RigidBodyDescription, DecodeError> {
    cursor.scoped(RecordKind::RigidBodyDescription, |c| {
        let name = if version.at_least(2, 0) {
            Some(c.read_string()?)
        } else {
            None
        };
        let id = c.read_i32()?;
        let parent_id = c.read_i32()?;
        let offset = c.read_vec3()?;
        let markers = if version.at_least(3, 0) {
            read_rigid_body_markers(c, version)?
        } else {
            Vec::new()
        };
        Ok(RigidBodyDescription {
            name,
            id,
            parent_id,
            offset,
            markers,
        })
    })
}

/// Positions, labels and (4.0+) names are stored as three consecutive arrays.
fn read_rigid_body_markers(
    cursor: &mut ByteCursor<'_>,
    version: ProtocolVersion,
) -> Result<Vec<RigidBodyMarkerDescription>, DecodeError> {
    let count = cursor.read_count(layout::MAX_RIGID_BODY_MARKERS)?;
    let positions_len = count * layout::VEC3_LEN;
    let labels_len = count * 4;

    let mut positions = cursor.sub_cursor(positions_len)?;
    let mut labels = cursor.sub_cursor_at(positions_len, labels_len)?;
    let mut names = cursor.fork();
    names.skip(positions_len + labels_len)?;
    let with_names = version.at_least(4, 0);

    let mut markers = Vec::with_capacity(count);
    for _ in 0..count {
        let position = positions.read_vec3()?;
        let label = labels.read_i32()?;
        let name = if with_names {
            Some(names.read_string()?)
        } else {
            None
        };
        markers.push(RigidBodyMarkerDescription {
            position,
            label,
            name,
        });
    }
    cursor.reconcile(&names);
    Ok(markers)
}

fn read_skeleton(
    cursor: &mut ByteCursor<'_>,
    version: ProtocolVersion,
) -> Result<SkeletonDescription, DecodeError> {
    let name = cursor.read_string()?;
    let id = cursor.read_i32()?;
    let count = cursor.read_count(layout::MAX_COUNT)?;
    let mut rigid_bodies = Vec::with_capacity(cursor.capacity_for(count, 20));
    for _ in 0..count {
        rigid_bodies.push(read_rigid_body(cursor, version)?);
    }
    Ok(SkeletonDescription {
        name,
        id,
        rigid_bodies,
    })
}

fn read_force_plate(cursor: &mut ByteCursor<'_>) -> Result<ForcePlateDescription, DecodeError> {
    let id = cursor.read_i32()?;
    let serial = cursor.read_string()?;
    let width = cursor.read_f32()?;
    let length = cursor.read_f32()?;
    let origin = cursor.read_vec3()?;
    let mut calibration = [[0f32; layout::FORCE_PLATE_CAL_COLS]; layout::FORCE_PLATE_CAL_ROWS];
    for row in calibration.iter_mut() {
        for value in row.iter_mut() {
            *value = cursor.read_f32()?;
        }
    }
    let mut corners = [Vec3::default(); layout::FORCE_PLATE_CORNERS];
    for corner in corners.iter_mut() {
        *corner = cursor.read_vec3()?;
    }
    let plate_type = cursor.read_i32()?;
    let channel_data_type = cursor.read_i32()?;
    let channels = read_names(cursor)?;
    Ok(ForcePlateDescription {
        id,
        serial,
        width,
        length,
        origin,
        calibration,
        corners,
        plate_type,
        channel_data_type,
        channels,
    })
}

fn read_device(cursor: &mut ByteCursor<'_>) -> Result<DeviceDescription, DecodeError> {
    let id = cursor.read_i32()?;
    let name = cursor.read_string()?;
    let serial = cursor.read_string()?;
    let device_type = cursor.read_i32()?;
    let channel_data_type = cursor.read_i32()?;
    let channels = read_names(cursor)?;
    Ok(DeviceDescription {
        id,
        name,
        serial,
        device_type,
        channel_data_type,
        channels,
    })
}

fn read_camera(cursor: &mut ByteCursor<'_>) -> Result<CameraDescription, DecodeError> {
    Ok(CameraDescription {
        name: cursor.read_string()?,
        position: cursor.read_vec3()?,
        orientation: cursor.read_quat()?,
    })
}

fn read_asset(
    cursor: &mut ByteCursor<'_>,
    version: ProtocolVersion,
) -> Result<AssetDescription, DecodeError> {
    let name = cursor.read_string()?;
    let asset_type = cursor.read_i32()?;
    let id = cursor.read_i32()?;

    let count = cursor.read_count(layout::MAX_COUNT)?;
    let mut rigid_bodies = Vec::with_capacity(cursor.capacity_for(count, 20));
    for _ in 0..count {
        rigid_bodies.push(read_rigid_body(cursor, version)?);
    }

    let count = cursor.read_count(layout::MAX_COUNT)?;
    let mut markers = Vec::with_capacity(cursor.capacity_for(count, 23));
    for _ in 0..count {
        markers.push(cursor.scoped(RecordKind::MarkerDescription, |c| {
            Ok(MarkerDescription {
                name: c.read_string()?,
                id: c.read_i32()?,
                position: c.read_vec3()?,
                size: c.read_f32()?,
                params: c.read_u16()?,
            })
        })?);
    }

    Ok(AssetDescription {
        name,
        asset_type,
        id,
        rigid_bodies,
        markers,
    })
}
