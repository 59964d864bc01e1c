//! # Frame Header
//!
//! Validation and cursor discipline for the 8-byte frame header. Callers
//! drain a chunk of back-to-back frames with:
//!
//! ```text
//! while framing::validate(&buf) {
//!     // read one frame, cursor lands on the next
//! }
//! ```
//!
//! An incomplete frame is not an error: `validate` goes `false` and the
//! caller waits for more bytes.

use mosaic_core::ByteBuffer;

/// Parsed frame header: total length (header included) and kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WireHeader {
    /// Total frame length in bytes, this header included.
    pub length: u32,
    /// Raw kind discriminant.
    pub kind: u32,
}

impl WireHeader {
    /// Encoded size of the header in bytes.
    pub const SIZE: usize = 8;
}

/// Whether a complete frame starts at the buffer's read cursor.
///
/// True iff at least [`WireHeader::SIZE`] bytes remain, the declared
/// length covers at least the header itself, and the declared length
/// does not run past the written region. Never mutates the buffer.
#[must_use]
pub fn validate(buf: &ByteBuffer) -> bool {
    let remaining = buf.remaining_bytes();
    if remaining < WireHeader::SIZE {
        return false;
    }
    buf.get_u32(buf.read_offset())
        .is_some_and(|length| (WireHeader::SIZE..=remaining).contains(&(length as usize)))
}

/// Reads the header without advancing the read cursor.
///
/// `None` when no complete frame starts at the cursor.
#[must_use]
pub fn peek_header(buf: &ByteBuffer) -> Option<WireHeader> {
    if !validate(buf) {
        return None;
    }
    let at = buf.read_offset();
    Some(WireHeader {
        length: buf.get_u32(at)?,
        kind: buf.get_u32(at + 4)?,
    })
}

/// Reads the header and advances the read cursor past it.
///
/// `None` when no complete frame starts at the cursor; the cursor does
/// not move in that case.
pub fn read_header(buf: &mut ByteBuffer) -> Option<WireHeader> {
    let header = peek_header(buf)?;
    buf.increment_read_offset(WireHeader::SIZE);
    Some(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(length: u32, kind: u32, body: &[u8]) -> ByteBuffer {
        let mut buf = ByteBuffer::new();
        buf.write_u32(length);
        buf.write_u32(kind);
        buf.write_bytes(body);
        buf
    }

    #[test]
    fn test_validate_needs_header_bytes() {
        assert!(!validate(&ByteBuffer::new()));
        assert!(!validate(&ByteBuffer::from_bytes(&[0u8; 7])));
    }

    #[test]
    fn test_validate_rejects_undersized_length() {
        // A frame cannot be shorter than its own header.
        let buf = frame(4, 1, &[]);
        assert!(!validate(&buf));
    }

    #[test]
    fn test_validate_rejects_truncated_frame() {
        let buf = frame(16, 1, &[0u8; 4]);
        assert!(!validate(&buf));
    }

    #[test]
    fn test_peek_does_not_advance() {
        let buf = frame(12, 2, &[9, 9, 9, 9]);
        let header = peek_header(&buf).unwrap();
        assert_eq!(header, WireHeader { length: 12, kind: 2 });
        assert_eq!(buf.read_offset(), 0);
    }

    #[test]
    fn test_read_advances_past_header_only() {
        let mut buf = frame(12, 2, &[9, 9, 9, 9]);
        let header = read_header(&mut buf).unwrap();
        assert_eq!(header.length, 12);
        assert_eq!(buf.read_offset(), WireHeader::SIZE);
    }

    #[test]
    fn test_read_on_incomplete_keeps_cursor() {
        let mut buf = frame(64, 1, &[0u8; 4]);
        assert!(read_header(&mut buf).is_none());
        assert_eq!(buf.read_offset(), 0);
    }
}
