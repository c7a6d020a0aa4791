use super::error::{DecodeError, RecordKind};
use super::layout;
use super::model::{Name, Quat, Vec3};

/// Bounds-checked little-endian read cursor over one packet.
///
/// Every read checks `position + size <= limit` before touching the buffer.
/// Positions are absolute offsets into the packet, so faults report where
/// in the packet they happened. `limit` never exceeds the buffer length.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
    limit: usize,
    record: RecordKind,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            limit: buf.len(),
            record: RecordKind::PacketHeader,
        }
    }

    /// Cursor over `buf[start..limit]`, clipped to the buffer length.
    pub fn with_bounds(buf: &'a [u8], start: usize, limit: usize) -> Self {
        let limit = limit.min(buf.len());
        Self {
            buf,
            pos: start.min(limit),
            limit,
            record: RecordKind::PacketHeader,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn remaining(&self) -> usize {
        self.limit - self.pos
    }

    pub fn record(&self) -> RecordKind {
        self.record
    }

    /// Runs `f` with faults attributed to `record`, restoring the outer kind after.
    pub fn scoped<T>(
        &mut self,
        record: RecordKind,
        f: impl FnOnce(&mut Self) -> Result<T, DecodeError>,
    ) -> Result<T, DecodeError> {
        let outer = std::mem::replace(&mut self.record, record);
        let out = f(self);
        self.record = outer;
        out
    }

    fn overrun(&self, needed: usize) -> DecodeError {
        DecodeError::BufferOverrun {
            record: self.record,
            offset: self.pos,
            needed,
            available: self.remaining(),
        }
    }

    pub fn require(&self, needed: usize) -> Result<(), DecodeError> {
        if needed > self.remaining() {
            return Err(self.overrun(needed));
        }
        Ok(())
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        self.require(n)?;
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        self.read_bytes(n).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        self.read_array::<1>().map(|b| b[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        self.read_array().map(u32::from_le_bytes)
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        self.read_array().map(i32::from_le_bytes)
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        self.read_array().map(u64::from_le_bytes)
    }

    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        self.read_array().map(f32::from_le_bytes)
    }

    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        self.read_array().map(f64::from_le_bytes)
    }

    pub fn read_vec3(&mut self) -> Result<Vec3, DecodeError> {
        self.require(layout::VEC3_LEN)?;
        Ok(Vec3 {
            x: self.read_f32()?,
            y: self.read_f32()?,
            z: self.read_f32()?,
        })
    }

    pub fn read_quat(&mut self) -> Result<Quat, DecodeError> {
        self.require(layout::QUAT_LEN)?;
        Ok(Quat {
            x: self.read_f32()?,
            y: self.read_f32()?,
            z: self.read_f32()?,
            w: self.read_f32()?,
        })
    }

    /// Reads a NUL-terminated string, returning it with the bytes consumed
    /// (terminator included).
    ///
    /// The terminator must lie inside the limit; a string running into the
    /// limit is an overrun of one byte past what remains.
    pub fn read_string_with_len(&mut self) -> Result<(Name, usize), DecodeError> {
        let window = &self.buf[self.pos..self.limit];
        let Some(nul) = window.iter().position(|&b| b == 0) else {
            return Err(self.overrun(window.len() + 1));
        };
        let name = Name::from(&window[..nul]);
        let consumed = nul + 1;
        self.pos += consumed;
        Ok((name, consumed))
    }

    pub fn read_string(&mut self) -> Result<Name, DecodeError> {
        self.read_string_with_len().map(|(name, _)| name)
    }

    /// Reads a fixed-width, NUL-padded text field.
    pub fn read_fixed_string(&mut self, width: usize) -> Result<Name, DecodeError> {
        let bytes = self.read_bytes(width)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(Name::from(&bytes[..end]))
    }

    /// Reads a 32-bit element count, rejecting values above `max`.
    pub fn read_count(&mut self, max: u64) -> Result<usize, DecodeError> {
        let offset = self.pos;
        let count = u64::from(self.read_u32()?);
        if count > max {
            return Err(DecodeError::CorruptCount {
                record: self.record,
                offset,
                count,
                limit: max,
            });
        }
        Ok(count as usize)
    }

    /// Capacity for `count` elements of at least `min_size` bytes each,
    /// bounded by what the remaining bytes could hold.
    pub fn capacity_for(&self, count: usize, min_size: usize) -> usize {
        count.min(self.remaining() / min_size.max(1))
    }

    /// Independent cursor over the next `len` bytes; the parent does not move.
    ///
    /// Used for records that store parallel arrays back to back. After the
    /// sub-cursors are drained, [`ByteCursor::reconcile`] snaps the parent to
    /// the end of the last one.
    pub fn sub_cursor(&self, len: usize) -> Result<ByteCursor<'a>, DecodeError> {
        self.require(len)?;
        Ok(Self {
            buf: self.buf,
            pos: self.pos,
            limit: self.pos + len,
            record: self.record,
        })
    }

    /// Like [`ByteCursor::sub_cursor`], but the region starts `skip` bytes ahead.
    pub fn sub_cursor_at(&self, skip: usize, len: usize) -> Result<ByteCursor<'a>, DecodeError> {
        self.require(skip.saturating_add(len))?;
        Ok(Self {
            buf: self.buf,
            pos: self.pos + skip,
            limit: self.pos + skip + len,
            record: self.record,
        })
    }

    /// Cursor starting at the current position that may run to the parent limit.
    pub fn fork(&self) -> ByteCursor<'a> {
        self.clone()
    }

    /// Moves the cursor to `other`'s position.
    pub fn reconcile(&mut self, other: &ByteCursor<'a>) {
        debug_assert!(other.pos >= self.pos && other.pos <= self.limit);
        self.pos = other.pos.clamp(self.pos, self.limit);
    }

    /// Reads a u16 at an absolute offset without moving the cursor.
    pub fn peek_u16_at(&self, offset: usize) -> Option<u16> {
        let end = offset.checked_add(2)?;
        if end > self.limit {
            return None;
        }
        let bytes = self.buf.get(offset..end)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }
}
