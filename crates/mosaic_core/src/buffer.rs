//! # Byte Buffer
//!
//! Growable byte storage with independent read and write cursors.
//!
//! ## Design
//!
//! - All typed access is little-endian
//! - Writes grow the buffer, reads never do
//! - Absolute `set_*`/`get_*` accessors enable the reserve-then-backfill
//!   pattern used by every framed serializer in the workspace: reserve a
//!   header slot, stream the body, patch the header once the body length
//!   is known

/// Growable byte storage with independent read and write cursors.
///
/// The written region is `[0, write_offset)`; the unread region is
/// `[read_offset, write_offset)`. Cursor-relative reads return `None`
/// instead of running past the written region, so callers can treat a
/// short buffer as "wait for more bytes".
#[derive(Clone, Debug, Default)]
pub struct ByteBuffer {
    /// Backing storage. Always at least `write_offset` bytes long.
    data: Vec<u8>,
    /// Next byte to read.
    read_offset: usize,
    /// Next byte to write.
    write_offset: usize,
}

impl ByteBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            data: Vec::new(),
            read_offset: 0,
            write_offset: 0,
        }
    }

    /// Creates an empty buffer with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            read_offset: 0,
            write_offset: 0,
        }
    }

    /// Creates a buffer over a received chunk.
    ///
    /// The read cursor starts at 0 and the write cursor at the end, so the
    /// whole chunk is readable and appending continues past it.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
            read_offset: 0,
            write_offset: bytes.len(),
        }
    }

    /// Returns the current read cursor.
    #[inline]
    #[must_use]
    pub const fn read_offset(&self) -> usize {
        self.read_offset
    }

    /// Returns the current write cursor.
    #[inline]
    #[must_use]
    pub const fn write_offset(&self) -> usize {
        self.write_offset
    }

    /// Returns the number of written bytes not yet read.
    #[inline]
    #[must_use]
    pub const fn remaining_bytes(&self) -> usize {
        self.write_offset.saturating_sub(self.read_offset)
    }

    /// Advances the write cursor by `count` bytes and returns the prior
    /// offset, growing the buffer as needed.
    ///
    /// The reserved bytes are zeroed; patch them later with the absolute
    /// `set_*` accessors.
    pub fn increment_write_offset(&mut self, count: usize) -> usize {
        let prior = self.write_offset;
        self.write_offset += count;
        self.ensure(self.write_offset);
        prior
    }

    /// Advances the read cursor by `count` bytes and returns the prior
    /// offset.
    ///
    /// The cursor is clamped to the written region.
    pub fn increment_read_offset(&mut self, count: usize) -> usize {
        let prior = self.read_offset;
        self.read_offset = (self.read_offset + count).min(self.write_offset);
        prior
    }

    /// Resets both cursors without releasing storage.
    pub fn reset(&mut self) {
        self.read_offset = 0;
        self.write_offset = 0;
    }

    /// Returns the written region as a slice.
    #[inline]
    #[must_use]
    pub fn written(&self) -> &[u8] {
        &self.data[..self.write_offset]
    }

    /// Materializes the written region.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.data[..self.write_offset].to_vec()
    }

    /// Grows the backing storage so `[0, end)` is addressable.
    fn ensure(&mut self, end: usize) {
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
    }

    // -------------------------------------------------------------------
    // Cursor-relative writes
    // -------------------------------------------------------------------

    /// Writes a single byte at the write cursor.
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        let at = self.increment_write_offset(1);
        self.data[at] = value;
    }

    /// Writes a u32 in little-endian at the write cursor.
    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        let at = self.increment_write_offset(4);
        self.data[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Writes an i32 in little-endian at the write cursor.
    #[inline]
    pub fn write_i32(&mut self, value: i32) {
        let at = self.increment_write_offset(4);
        self.data[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Writes a u64 in little-endian at the write cursor.
    #[inline]
    pub fn write_u64(&mut self, value: u64) {
        let at = self.increment_write_offset(8);
        self.data[at..at + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Writes an f32 in little-endian at the write cursor.
    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    /// Appends a raw slice at the write cursor.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        let at = self.increment_write_offset(bytes.len());
        self.data[at..at + bytes.len()].copy_from_slice(bytes);
    }

    /// Appends a slice, optionally prefixed with its u32 length.
    pub fn write_buffer(&mut self, bytes: &[u8], length_prefixed: bool) {
        if length_prefixed {
            self.write_u32(bytes.len() as u32);
        }
        self.write_bytes(bytes);
    }

    // -------------------------------------------------------------------
    // Cursor-relative reads
    // -------------------------------------------------------------------

    /// Reads a single byte, or `None` past the written region.
    #[inline]
    pub fn read_u8(&mut self) -> Option<u8> {
        if self.remaining_bytes() < 1 {
            return None;
        }
        let value = self.data[self.read_offset];
        self.read_offset += 1;
        Some(value)
    }

    /// Reads a little-endian u32, or `None` past the written region.
    #[inline]
    pub fn read_u32(&mut self) -> Option<u32> {
        let value = self.get_u32(self.read_offset)?;
        self.read_offset += 4;
        Some(value)
    }

    /// Reads a little-endian i32, or `None` past the written region.
    #[inline]
    pub fn read_i32(&mut self) -> Option<i32> {
        let value = self.get_i32(self.read_offset)?;
        self.read_offset += 4;
        Some(value)
    }

    /// Reads a little-endian u64, or `None` past the written region.
    #[inline]
    pub fn read_u64(&mut self) -> Option<u64> {
        let value = self.get_u64(self.read_offset)?;
        self.read_offset += 8;
        Some(value)
    }

    /// Reads a little-endian f32, or `None` past the written region.
    #[inline]
    pub fn read_f32(&mut self) -> Option<f32> {
        self.read_u32().map(f32::from_bits)
    }

    /// Reads `count` raw bytes, or `None` past the written region.
    pub fn read_bytes(&mut self, count: usize) -> Option<Vec<u8>> {
        if self.remaining_bytes() < count {
            return None;
        }
        let at = self.read_offset;
        self.read_offset += count;
        Some(self.data[at..at + count].to_vec())
    }

    /// Reads a u32 length prefix followed by that many bytes.
    ///
    /// The cursor does not move unless both parts are present.
    pub fn read_buffer(&mut self) -> Option<Vec<u8>> {
        let length = self.get_u32(self.read_offset)? as usize;
        if self.remaining_bytes() < 4 + length {
            return None;
        }
        self.read_offset += 4;
        self.read_bytes(length)
    }

    // -------------------------------------------------------------------
    // Absolute accessors
    // -------------------------------------------------------------------

    /// Writes a little-endian u32 at an absolute offset, growing the
    /// written region to cover it.
    pub fn set_u32(&mut self, offset: usize, value: u32) {
        self.cover(offset + 4);
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Writes a little-endian i32 at an absolute offset, growing the
    /// written region to cover it.
    pub fn set_i32(&mut self, offset: usize, value: i32) {
        self.cover(offset + 4);
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Writes a little-endian u64 at an absolute offset, growing the
    /// written region to cover it.
    pub fn set_u64(&mut self, offset: usize, value: u64) {
        self.cover(offset + 8);
        self.data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Writes a little-endian f32 at an absolute offset, growing the
    /// written region to cover it.
    pub fn set_f32(&mut self, offset: usize, value: f32) {
        self.set_u32(offset, value.to_bits());
    }

    /// Reads a little-endian u32 at an absolute offset inside the written
    /// region, or `None` outside it.
    #[inline]
    #[must_use]
    pub fn get_u32(&self, offset: usize) -> Option<u32> {
        let bytes = self.data.get(offset..offset + 4)?;
        if offset + 4 > self.write_offset {
            return None;
        }
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a little-endian i32 at an absolute offset inside the written
    /// region, or `None` outside it.
    #[inline]
    #[must_use]
    pub fn get_i32(&self, offset: usize) -> Option<i32> {
        self.get_u32(offset).map(|v| v as i32)
    }

    /// Reads a little-endian u64 at an absolute offset inside the written
    /// region, or `None` outside it.
    #[inline]
    #[must_use]
    pub fn get_u64(&self, offset: usize) -> Option<u64> {
        if offset + 8 > self.write_offset {
            return None;
        }
        let bytes = self.data.get(offset..offset + 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Some(u64::from_le_bytes(raw))
    }

    /// Reads a little-endian f32 at an absolute offset inside the written
    /// region, or `None` outside it.
    #[inline]
    #[must_use]
    pub fn get_f32(&self, offset: usize) -> Option<f32> {
        self.get_u32(offset).map(f32::from_bits)
    }

    /// Extends the written region (and storage) up to `end`.
    fn cover(&mut self, end: usize) {
        self.ensure(end);
        if end > self.write_offset {
            self.write_offset = end;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_round_trip() {
        let mut buf = ByteBuffer::new();
        buf.write_u8(7);
        buf.write_u32(0xDEAD_BEEF);
        buf.write_i32(-42);
        buf.write_u64(u64::MAX - 1);
        buf.write_f32(1.5);

        assert_eq!(buf.read_u8(), Some(7));
        assert_eq!(buf.read_u32(), Some(0xDEAD_BEEF));
        assert_eq!(buf.read_i32(), Some(-42));
        assert_eq!(buf.read_u64(), Some(u64::MAX - 1));
        assert_eq!(buf.read_f32(), Some(1.5));
        assert_eq!(buf.remaining_bytes(), 0);
        assert_eq!(buf.read_u8(), None);
    }

    #[test]
    fn test_little_endian_layout() {
        let mut buf = ByteBuffer::new();
        buf.write_u32(0x0102_0304);
        assert_eq!(buf.written(), &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_reserve_and_backfill() {
        let mut buf = ByteBuffer::new();
        let header_at = buf.increment_write_offset(4);
        buf.write_bytes(b"payload");
        buf.set_u32(header_at, buf.write_offset() as u32);

        assert_eq!(buf.get_u32(header_at), Some(11));
        assert_eq!(&buf.written()[4..], b"payload");
    }

    #[test]
    fn test_length_prefixed_buffer() {
        let mut buf = ByteBuffer::new();
        buf.write_buffer(b"abc", true);
        buf.write_buffer(b"raw", false);

        assert_eq!(buf.read_buffer(), Some(b"abc".to_vec()));
        assert_eq!(buf.read_bytes(3), Some(b"raw".to_vec()));
    }

    #[test]
    fn test_read_buffer_waits_for_missing_bytes() {
        let mut buf = ByteBuffer::new();
        buf.write_u32(10);
        buf.write_bytes(b"short");

        let before = buf.read_offset();
        assert_eq!(buf.read_buffer(), None);
        assert_eq!(buf.read_offset(), before);
    }

    #[test]
    fn test_from_bytes_cursors() {
        let mut buf = ByteBuffer::from_bytes(&[1, 0, 0, 0]);
        assert_eq!(buf.remaining_bytes(), 4);
        assert_eq!(buf.read_u32(), Some(1));
        buf.write_u8(9);
        assert_eq!(buf.write_offset(), 5);
    }

    #[test]
    fn test_absolute_get_stops_at_written_region() {
        let mut buf = ByteBuffer::new();
        buf.write_u8(1);
        assert_eq!(buf.get_u32(0), None);
    }

    #[test]
    fn test_absolute_accessors() {
        let mut buf = ByteBuffer::new();
        buf.set_u64(0, u64::MAX - 5);
        buf.set_i32(8, -17);
        buf.set_f32(12, 2.25);

        assert_eq!(buf.write_offset(), 16);
        assert_eq!(buf.get_u64(0), Some(u64::MAX - 5));
        assert_eq!(buf.get_i32(8), Some(-17));
        assert_eq!(buf.get_f32(12), Some(2.25));
        assert_eq!(buf.get_u64(9), None);
    }

    #[test]
    fn test_reset_keeps_storage() {
        let mut buf = ByteBuffer::new();
        buf.write_u64(99);
        buf.reset();
        assert_eq!(buf.remaining_bytes(), 0);
        assert_eq!(buf.write_offset(), 0);
        buf.write_u8(1);
        assert_eq!(buf.written(), &[1]);
    }
}
