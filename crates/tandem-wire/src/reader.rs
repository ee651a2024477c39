//! Bounds-checked little-endian byte reader.

use crate::context::WireContext;
use crate::error::WireError;
use crate::MAX_BLOB_LEN;

/// Reads wire primitives from a borrowed byte slice.
///
/// Every read is bounds-checked; running off the end yields
/// [`WireError::Truncated`] rather than a panic, since the bytes may come
/// from a buggy or malicious peer.
#[derive(Clone, Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    offset: usize,
    context: WireContext,
}

impl<'a> ByteReader<'a> {
    /// Read from `data` with a default context.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_context(data, WireContext::default())
    }

    /// Read from `data` carrying `context`.
    pub fn with_context(data: &'a [u8], context: WireContext) -> Self {
        Self {
            data,
            offset: 0,
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

    /// Current read offset.
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Whether every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Fail if any bytes are left unread.
    pub fn finish(&self) -> Result<(), WireError> {
        match self.remaining() {
            0 => Ok(()),
            count => Err(WireError::TrailingBytes { count }),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(out)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    /// Read a signed byte.
    pub fn read_i8(&mut self) -> Result<i8, WireError> {
        Ok(self.read_u8()? as i8)
    }

    /// Read a bool, rejecting bytes other than 0 and 1.
    pub fn read_bool(&mut self) -> Result<bool, WireError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            byte => Err(WireError::InvalidBool { byte }),
        }
    }

    /// Read a little-endian u16.
    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    /// Read a little-endian i16.
    pub fn read_i16(&mut self) -> Result<i16, WireError> {
        Ok(i16::from_le_bytes(self.take_array()?))
    }

    /// Read a little-endian u32.
    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    /// Read a little-endian i32.
    pub fn read_i32(&mut self) -> Result<i32, WireError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    /// Read a little-endian u64.
    pub fn read_u64(&mut self) -> Result<u64, WireError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    /// Read a little-endian i64.
    pub fn read_i64(&mut self) -> Result<i64, WireError> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    /// Read a little-endian f32.
    pub fn read_f32(&mut self) -> Result<f32, WireError> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    /// Read a little-endian f64.
    pub fn read_f64(&mut self) -> Result<f64, WireError> {
        Ok(f64::from_le_bytes(self.take_array()?))
    }

    /// Read a u16 element count.
    pub fn read_len_u16(&mut self) -> Result<usize, WireError> {
        Ok(self.read_u16()? as usize)
    }

    /// Read a length-prefixed byte blob, borrowing from the input.
    pub fn read_bytes(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.read_u32()? as usize;
        if len > MAX_BLOB_LEN {
            return Err(WireError::LengthOverflow {
                len,
                max: MAX_BLOB_LEN,
            });
        }
        self.take(len)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_str(&mut self) -> Result<String, WireError> {
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| WireError::InvalidUtf8)
    }

    /// Consume and return every remaining byte.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let out = &self.data[self.offset..];
        self.offset = self.data.len();
        out
    }
}
