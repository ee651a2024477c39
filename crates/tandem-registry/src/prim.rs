//! Primitive kinds and their fixed encodings.

use tandem_wire::{ByteReader, ByteWriter};

use crate::error::{DecodeError, EncodeError};
use crate::value::Value;

/// A primitive wire type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimKind {
    /// One byte, 0 or 1.
    Bool,
    /// Unsigned 8-bit.
    U8,
    /// Signed 8-bit.
    I8,
    /// Unsigned 16-bit.
    U16,
    /// Signed 16-bit.
    I16,
    /// Unsigned 32-bit.
    U32,
    /// Signed 32-bit.
    I32,
    /// Unsigned 64-bit.
    U64,
    /// Signed 64-bit.
    I64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// u32-prefixed UTF-8 string.
    Str,
    /// u32-prefixed byte blob.
    Bytes,
}

impl PrimKind {
    /// Lower-case name used in diagnostics and fingerprints.
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::U8 => "u8",
            Self::I8 => "i8",
            Self::U16 => "u16",
            Self::I16 => "i16",
            Self::U32 => "u32",
            Self::I32 => "i32",
            Self::U64 => "u64",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Str => "string",
            Self::Bytes => "bytes",
        }
    }

    /// Whether this kind can represent an enum discriminant.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::U8 | Self::I8 | Self::U16 | Self::I16 | Self::U32 | Self::I32 | Self::U64 | Self::I64
        )
    }

    /// Encode `value`, which must be exactly this primitive.
    pub(crate) fn write(self, w: &mut ByteWriter, value: &Value) -> Result<(), EncodeError> {
        match (self, value) {
            (Self::Bool, Value::Bool(v)) => w.write_bool(*v),
            (Self::U8, Value::U8(v)) => w.write_u8(*v),
            (Self::I8, Value::I8(v)) => w.write_i8(*v),
            (Self::U16, Value::U16(v)) => w.write_u16(*v),
            (Self::I16, Value::I16(v)) => w.write_i16(*v),
            (Self::U32, Value::U32(v)) => w.write_u32(*v),
            (Self::I32, Value::I32(v)) => w.write_i32(*v),
            (Self::U64, Value::U64(v)) => w.write_u64(*v),
            (Self::I64, Value::I64(v)) => w.write_i64(*v),
            (Self::F32, Value::F32(v)) => w.write_f32(*v),
            (Self::F64, Value::F64(v)) => w.write_f64(*v),
            (Self::Str, Value::Str(v)) => w.write_str(v)?,
            (Self::Bytes, Value::Bytes(v)) => w.write_bytes(v)?,
            (kind, other) => {
                return Err(EncodeError::TypeMismatch {
                    expected: kind.name().to_string(),
                    found: other.describe(),
                })
            }
        }
        Ok(())
    }

    /// Decode one value of this primitive.
    pub(crate) fn read(self, r: &mut ByteReader<'_>) -> Result<Value, DecodeError> {
        Ok(match self {
            Self::Bool => Value::Bool(r.read_bool()?),
            Self::U8 => Value::U8(r.read_u8()?),
            Self::I8 => Value::I8(r.read_i8()?),
            Self::U16 => Value::U16(r.read_u16()?),
            Self::I16 => Value::I16(r.read_i16()?),
            Self::U32 => Value::U32(r.read_u32()?),
            Self::I32 => Value::I32(r.read_i32()?),
            Self::U64 => Value::U64(r.read_u64()?),
            Self::I64 => Value::I64(r.read_i64()?),
            Self::F32 => Value::F32(r.read_f32()?),
            Self::F64 => Value::F64(r.read_f64()?),
            Self::Str => Value::Str(r.read_str()?),
            Self::Bytes => Value::Bytes(r.read_bytes()?.to_vec()),
        })
    }

    /// Encode an enum discriminant in this integer representation.
    ///
    /// Fails if the discriminant does not fit.
    pub(crate) fn write_discriminant(
        self,
        w: &mut ByteWriter,
        d: i64,
        ty: &str,
    ) -> Result<(), EncodeError> {
        let out_of_range = || EncodeError::BadDiscriminant {
            ty: ty.to_string(),
            discriminant: d,
        };
        match self {
            Self::U8 => w.write_u8(u8::try_from(d).map_err(|_| out_of_range())?),
            Self::I8 => w.write_i8(i8::try_from(d).map_err(|_| out_of_range())?),
            Self::U16 => w.write_u16(u16::try_from(d).map_err(|_| out_of_range())?),
            Self::I16 => w.write_i16(i16::try_from(d).map_err(|_| out_of_range())?),
            Self::U32 => w.write_u32(u32::try_from(d).map_err(|_| out_of_range())?),
            Self::I32 => w.write_i32(i32::try_from(d).map_err(|_| out_of_range())?),
            Self::U64 => w.write_u64(u64::try_from(d).map_err(|_| out_of_range())?),
            Self::I64 => w.write_i64(d),
            _ => return Err(out_of_range()),
        }
        Ok(())
    }

    /// Decode an enum discriminant stored in this integer representation.
    pub(crate) fn read_discriminant(self, r: &mut ByteReader<'_>) -> Result<i64, DecodeError> {
        Ok(match self {
            Self::U8 => r.read_u8()? as i64,
            Self::I8 => r.read_i8()? as i64,
            Self::U16 => r.read_u16()? as i64,
            Self::I16 => r.read_i16()? as i64,
            Self::U32 => r.read_u32()? as i64,
            Self::I32 => r.read_i32()? as i64,
            // Values above i64::MAX cannot be registered discriminants.
            Self::U64 => i64::try_from(r.read_u64()?).unwrap_or(i64::MIN),
            Self::I64 => r.read_i64()?,
            _ => {
                return Err(DecodeError::UnknownType {
                    ty: self.name().to_string(),
                })
            }
        })
    }
}
