//! Byte Reader / Writer
//!
//! Little-endian primitives shared by every encoder in the protocol.
//! The writer appends to a growable buffer; the reader is a cursor over a
//! borrowed slice that fails with [`DecodeError`] instead of panicking on
//! short or malformed input.

/// Why a packet was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Ran out of bytes mid-field
    #[error("truncated: needed {needed} bytes at offset {offset}")]
    Truncated {
        /// Offset where the read started
        offset: usize,
        /// Bytes the field needed
        needed: usize,
    },
    /// Bytes left over after a complete packet
    #[error("{0} trailing bytes after packet")]
    TrailingBytes(usize),
    /// Unknown framing byte
    #[error("unknown codec tag {0}")]
    UnknownCodec(u8),
    /// A flag word had bits this version does not understand
    #[error("unknown flag bits {bits:#x} in {field}")]
    UnknownFlags {
        /// Which flag field
        field: &'static str,
        /// Offending bits
        bits: u32,
    },
    /// A length or count exceeded its limit
    #[error("{field} count {count} exceeds limit {limit}")]
    TooLarge {
        /// Which field
        field: &'static str,
        /// Value read
        count: u64,
        /// Maximum accepted
        limit: u64,
    },
    /// A value was structurally invalid
    #[error("invalid {0}")]
    Invalid(&'static str),
    /// The run-length layer was malformed
    #[error("malformed run-length data at offset {0}")]
    BadRun(usize),
}

/// Append-only little-endian writer.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: Vec::with_capacity(capacity) }
    }

    /// Bytes written so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when nothing was written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Writes a u32 in little-endian format.
    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an i32 in little-endian format.
    #[inline]
    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes raw bytes.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Finish and take the buffer.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a received buffer.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Start reading at offset 0.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Take the next `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated { offset: self.pos, needed: n });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Reads a little-endian u32.
    #[inline]
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Reads a little-endian i32.
    #[inline]
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    /// Reads a u32 count and checks it against `limit`.
    pub fn read_count(&mut self, field: &'static str, limit: u32) -> Result<u32, DecodeError> {
        let count = self.read_u32()?;
        if count > limit {
            return Err(DecodeError::TooLarge { field, count: count as u64, limit: limit as u64 });
        }
        Ok(count)
    }

    /// Fail unless every byte was consumed.
    pub fn finish(&self) -> Result<(), DecodeError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_round_trip() {
        let mut w = ByteWriter::new();
        w.write_u8(7);
        w.write_u32(0xdead_beef);
        w.write_i32(-42);
        w.write_bytes(b"xy");
        let buf = w.into_inner();
        assert_eq!(buf.len(), 1 + 4 + 4 + 2);

        let mut r = ByteReader::new(&buf);
        assert_eq!(r.read_u8().unwrap(), 7);
        assert_eq!(r.read_u32().unwrap(), 0xdead_beef);
        assert_eq!(r.read_i32().unwrap(), -42);
        assert_eq!(r.read_bytes(2).unwrap(), b"xy");
        r.finish().unwrap();
    }

    #[test]
    fn test_little_endian() {
        let mut w = ByteWriter::new();
        w.write_u32(1);
        assert_eq!(w.into_inner(), vec![1, 0, 0, 0]);
    }

    #[test]
    fn test_truncated() {
        let mut r = ByteReader::new(&[1, 2, 3]);
        assert_eq!(r.read_u32(), Err(DecodeError::Truncated { offset: 0, needed: 4 }));
        // Failed read consumes nothing
        assert_eq!(r.remaining(), 3);
    }

    #[test]
    fn test_trailing_and_count() {
        let mut w = ByteWriter::new();
        w.write_u32(10);
        w.write_u8(0);
        let buf = w.into_inner();
        let mut r = ByteReader::new(&buf);
        assert!(matches!(r.read_count("items", 5), Err(DecodeError::TooLarge { count: 10, .. })));
        let mut r = ByteReader::new(&buf);
        assert_eq!(r.read_count("items", 10).unwrap(), 10);
        assert_eq!(r.finish(), Err(DecodeError::TrailingBytes(1)));
    }
}
