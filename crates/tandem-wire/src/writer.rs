//! Growable little-endian byte writer.

use crate::context::WireContext;
use crate::error::WireError;

/// Appends wire primitives to an owned buffer.
///
/// Fixed-width writes cannot fail. Length-prefixed writes fail with
/// [`WireError::LengthOverflow`] when the length does not fit its prefix.
///
/// # Examples
///
/// ```
/// use tandem_wire::{ByteReader, ByteWriter};
///
/// let mut w = ByteWriter::new();
/// w.write_i32(-5);
/// w.write_str("haul").unwrap();
///
/// let bytes = w.into_bytes();
/// let mut r = ByteReader::new(&bytes);
/// assert_eq!(r.read_i32().unwrap(), -5);
/// assert_eq!(r.read_str().unwrap(), "haul");
/// ```
#[derive(Clone, Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
    context: WireContext,
}

impl ByteWriter {
    /// Create an empty writer with a default context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty writer carrying `context`.
    pub fn with_context(context: WireContext) -> Self {
        Self {
            buf: Vec::new(),
            context,
        }
    }

    /// The side-channel context.
    pub fn context(&self) -> &WireContext {
        &self.context
    }

    /// Mutable access to the side-channel context.
    pub fn context_mut(&mut self) -> &mut WireContext {
        &mut self.context
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the writer, returning its buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Write a signed byte.
    pub fn write_i8(&mut self, v: i8) {
        self.buf.push(v as u8);
    }

    /// Write a bool as one byte (0 or 1).
    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    /// Write a little-endian u16.
    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a little-endian i16.
    pub fn write_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a little-endian u32.
    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a little-endian i32.
    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a little-endian u64.
    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a little-endian i64.
    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a little-endian f32.
    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a little-endian f64.
    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a u16 element count, failing if `len` does not fit.
    pub fn write_len_u16(&mut self, len: usize) -> Result<(), WireError> {
        let v = u16::try_from(len).map_err(|_| WireError::LengthOverflow {
            len,
            max: u16::MAX as usize,
        })?;
        self.write_u16(v);
        Ok(())
    }

    /// Write a length-prefixed byte blob (u32 length + bytes).
    pub fn write_bytes(&mut self, b: &[u8]) -> Result<(), WireError> {
        let len = u32::try_from(b.len()).map_err(|_| WireError::LengthOverflow {
            len: b.len(),
            max: u32::MAX as usize,
        })?;
        self.write_u32(len);
        self.buf.extend_from_slice(b);
        Ok(())
    }

    /// Write a length-prefixed UTF-8 string (u32 length + bytes).
    pub fn write_str(&mut self, s: &str) -> Result<(), WireError> {
        self.write_bytes(s.as_bytes())
    }

    /// Append raw bytes with no prefix.
    pub fn write_raw(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_values_are_little_endian() {
        let mut w = ByteWriter::new();
        w.write_u16(0x0102);
        w.write_i32(-2);
        assert_eq!(w.as_slice(), &[0x02, 0x01, 0xFE, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn blob_is_u32_prefixed() {
        let mut w = ByteWriter::new();
        w.write_bytes(&[9, 8]).unwrap();
        assert_eq!(w.into_bytes(), vec![2, 0, 0, 0, 9, 8]);
    }

    #[test]
    fn u16_count_overflow_is_rejected() {
        let mut w = ByteWriter::new();
        let err = w.write_len_u16(70_000).unwrap_err();
        assert_eq!(
            err,
            WireError::LengthOverflow {
                len: 70_000,
                max: 65_535
            }
        );
        assert!(w.is_empty());
    }
}
