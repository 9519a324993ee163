//! A growable, endian-aware byte buffer with `java.nio`-style cursor/limit
//! semantics, used as the single reusable scratch space for marshalling and
//! unmarshalling D-Bus messages.

use crate::error::{Error, ErrorKind, Result};
use crate::protocol::Endianness;

/// Maximum length of a single array, per the D-Bus specification.
pub const MAX_ARRAY_LENGTH: u32 = 1 << 26;
/// Maximum length of a message body, per the D-Bus specification.
pub const MAX_BODY_LENGTH: u32 = 1 << 27;

/// A contiguous byte region with a cursor and a limit.
///
/// The buffer starts out in "write mode": `reserve`/`write_*` append bytes
/// and advance `cursor`. Calling [`Buffer::flip`] switches to "read mode",
/// where `read_*` consumes bytes up to `limit` and advances `cursor` the
/// same way. [`Buffer::clear`] resets it back to a fresh write buffer while
/// retaining its allocation.
#[derive(Debug, Default)]
pub struct Buffer {
    data: Vec<u8>,
    cursor: usize,
    limit: usize,
    endianness: Endianness,
}

impl Buffer {
    /// Construct a new, empty buffer in native endianness.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Construct a new, empty buffer with at least the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            cursor: 0,
            limit: 0,
            endianness: Endianness::NATIVE,
        }
    }

    /// The endianness currently in effect for multi-byte reads and writes.
    #[inline]
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Change the endianness used by subsequent multi-byte reads and writes.
    #[inline]
    pub fn set_endianness(&mut self, endianness: Endianness) {
        self.endianness = endianness;
    }

    /// The current cursor position.
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move the cursor to an explicit position.
    ///
    /// Used by the message codec to seek back and back-patch a previously
    /// written length field.
    #[inline]
    pub fn set_cursor(&mut self, cursor: usize) {
        self.cursor = cursor;
    }

    /// The current read limit (the number of initialized, readable bytes).
    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Switch from write mode to read mode: the limit becomes the current
    /// write position and the cursor rewinds to the start.
    pub fn flip(&mut self) {
        self.limit = self.cursor;
        self.cursor = 0;
    }

    /// Reset the buffer to an empty write buffer, retaining its allocation.
    pub fn clear(&mut self) {
        self.cursor = 0;
        self.limit = self.data.capacity();
        self.data.clear();
    }

    /// The bytes between the cursor and the limit.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.cursor..self.limit]
    }

    /// The full slice of bytes written so far (cursor to limit after a
    /// [`flip`][Buffer::flip], or `0..cursor` while still writing).
    pub fn as_slice(&self) -> &[u8] {
        if self.limit > 0 {
            &self.data[..self.limit]
        } else {
            &self.data[..self.cursor]
        }
    }

    /// Number of unread bytes remaining before `limit`.
    #[inline]
    pub fn remaining_len(&self) -> usize {
        self.limit.saturating_sub(self.cursor)
    }

    /// Ensure there is room for `additional` more bytes, growing the backing
    /// allocation by doubling if necessary.
    fn reserve(&mut self, additional: usize) {
        let required = self.cursor + additional;

        if required <= self.data.len() {
            return;
        }

        if required > self.data.capacity() {
            let mut new_capacity = self.data.capacity().max(64);

            while new_capacity < required {
                new_capacity = new_capacity.saturating_mul(2);
            }

            self.data.reserve(new_capacity - self.data.len());
        }

        self.data.resize(required, 0);
    }

    /// Append raw bytes at the cursor, growing the buffer as needed.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.reserve(bytes.len());
        self.data[self.cursor..self.cursor + bytes.len()].copy_from_slice(bytes);
        self.cursor += bytes.len();
    }

    /// Append `len` zero bytes at the cursor.
    pub fn write_zeros(&mut self, len: usize) {
        self.reserve(len);
        for byte in &mut self.data[self.cursor..self.cursor + len] {
            *byte = 0;
        }
        self.cursor += len;
    }

    /// Overwrite `bytes.len()` bytes starting at the given absolute
    /// position, without moving the cursor. Used for length back-patching.
    pub fn write_bytes_at(&mut self, at: usize, bytes: &[u8]) {
        self.data[at..at + bytes.len()].copy_from_slice(bytes);
    }

    /// Read exactly `len` bytes, advancing the cursor.
    pub fn read_bytes(&mut self, len: usize) -> Result<&[u8]> {
        if self.cursor + len > self.limit {
            return Err(Error::new(ErrorKind::TruncatedMessage));
        }

        let start = self.cursor;
        self.cursor += len;
        Ok(&self.data[start..self.cursor])
    }

    /// Pad the write cursor with zero bytes until `(cursor - origin)` is a
    /// multiple of `align`.
    pub fn align_write(&mut self, origin: usize, align: usize) {
        let padding = padding_to(self.cursor - origin, align);

        if padding > 0 {
            self.write_zeros(padding);
        }
    }

    /// Skip padding bytes on read until `(cursor - origin)` is a multiple of
    /// `align`, asserting that every skipped byte is zero.
    pub fn align_read(&mut self, origin: usize, align: usize) -> Result<()> {
        let padding = padding_to(self.cursor - origin, align);

        if padding == 0 {
            return Ok(());
        }

        let bytes = self.read_bytes(padding)?;

        if bytes.iter().any(|&b| b != 0) {
            return Err(Error::new(ErrorKind::BadAlignment));
        }

        Ok(())
    }
}

/// Distance to pad `len` forward so that it becomes a multiple of `align`.
#[inline]
pub fn padding_to(len: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    let mask = align - 1;
    (align - (len & mask)) & mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_on_write() {
        let mut buf = Buffer::new();
        buf.write_bytes(&[1, 2, 3, 4]);
        assert_eq!(buf.cursor(), 4);
        buf.flip();
        assert_eq!(buf.remaining(), &[1, 2, 3, 4]);
    }

    #[test]
    fn align_write_pads_with_zeros() {
        let mut buf = Buffer::new();
        buf.write_bytes(&[1]);
        buf.align_write(0, 4);
        assert_eq!(buf.cursor(), 4);
        buf.flip();
        assert_eq!(buf.remaining(), &[1, 0, 0, 0]);
    }

    #[test]
    fn align_read_rejects_nonzero_padding() {
        let mut buf = Buffer::new();
        buf.write_bytes(&[1, 1, 1, 1]);
        buf.flip();
        buf.read_bytes(1).unwrap();
        assert!(buf.align_read(0, 4).is_err());
    }

    #[test]
    fn clear_resets_but_keeps_allocation() {
        let mut buf = Buffer::new();
        buf.write_bytes(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let capacity = buf.data.capacity();
        buf.clear();
        assert_eq!(buf.cursor(), 0);
        assert_eq!(buf.data.capacity(), capacity);
    }
}
