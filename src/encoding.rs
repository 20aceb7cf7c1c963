//! Encoding: the [`ProtoSink`] writer and the size functions that mirror it.
//!
//! Every `write_<kind>` method has a matching `<kind>_size` function returning the
//! exact number of bytes it writes, and every `write_packed_<kind>` a matching
//! `packed_<kind>_data_size`. Generated `compute_size` and `encode_raw` bodies are
//! built from the same per-kind rule, so the two always agree.

use crate::Protobuf;
use crate::enums::EnumValue;
use crate::wire::{self, FIXED32_SIZE, FIXED64_SIZE};

/// Append-only wire-format writer over a reusable `Vec<u8>`.
#[derive(Debug, Default, Clone)]
pub struct ProtoSink {
    buf: Vec<u8>,
}

impl ProtoSink {
    pub const fn new() -> Self {
        ProtoSink { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        ProtoSink {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Wraps an existing buffer; new bytes are appended after its current contents.
    pub fn from_vec(buf: Vec<u8>) -> Self {
        ProtoSink { buf }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Discards written bytes, keeping the allocation.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn reserve(&mut self, additional: usize) {
        self.buf.reserve(additional);
    }

    #[inline]
    pub fn write_raw_byte(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    #[inline]
    pub fn write_raw_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a precomputed tag (`field_number << 3 | wire_type`).
    #[inline]
    pub fn write_raw_tag(&mut self, tag: u32) {
        if tag < 0x80 {
            self.buf.push(tag as u8);
        } else {
            wire::encode_varint(tag as u64, &mut self.buf);
        }
    }

    #[inline]
    pub fn write_varint32(&mut self, value: u32) {
        wire::encode_varint(value as u64, &mut self.buf);
    }

    #[inline]
    pub fn write_varint64(&mut self, value: u64) {
        wire::encode_varint(value, &mut self.buf);
    }

    #[inline]
    pub fn write_int32(&mut self, value: i32) {
        // Negative values are sign-extended to ten bytes.
        wire::encode_varint(value as i64 as u64, &mut self.buf);
    }

    #[inline]
    pub fn write_int64(&mut self, value: i64) {
        wire::encode_varint(value as u64, &mut self.buf);
    }

    #[inline]
    pub fn write_uint32(&mut self, value: u32) {
        self.write_varint32(value);
    }

    #[inline]
    pub fn write_uint64(&mut self, value: u64) {
        self.write_varint64(value);
    }

    #[inline]
    pub fn write_sint32(&mut self, value: i32) {
        self.write_varint32(wire::zigzag_encode32(value));
    }

    #[inline]
    pub fn write_sint64(&mut self, value: i64) {
        self.write_varint64(wire::zigzag_encode64(value));
    }

    #[inline]
    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(value as u8);
    }

    #[inline]
    pub fn write_enum<E>(&mut self, value: EnumValue<E>) {
        self.write_int32(value.number());
    }

    #[inline]
    pub fn write_fixed32(&mut self, value: u32) {
        wire::encode_fixed32(value, &mut self.buf);
    }

    #[inline]
    pub fn write_fixed64(&mut self, value: u64) {
        wire::encode_fixed64(value, &mut self.buf);
    }

    #[inline]
    pub fn write_sfixed32(&mut self, value: i32) {
        self.write_fixed32(value as u32);
    }

    #[inline]
    pub fn write_sfixed64(&mut self, value: i64) {
        self.write_fixed64(value as u64);
    }

    #[inline]
    pub fn write_float(&mut self, value: f32) {
        self.write_fixed32(value.to_bits());
    }

    #[inline]
    pub fn write_double(&mut self, value: f64) {
        self.write_fixed64(value.to_bits());
    }

    #[inline]
    pub fn write_bytes(&mut self, value: &[u8]) {
        wire::encode_length_delimited(value, &mut self.buf);
    }

    #[inline]
    pub fn write_string(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
    }

    /// Writes the length prefix and body of a nested message.
    ///
    /// Uses the size cached by the last [`Protobuf::compute_size`] call on `message`.
    #[inline]
    pub fn write_message<M: Protobuf>(&mut self, message: &M) {
        self.write_varint32(message.cached_size() as u32);
        message.encode_raw(self);
    }
}

macro_rules! packed_writers {
    ($($write_packed:ident, $write:ident, $ty:ty;)*) => {
        impl ProtoSink {
            $(
                /// Writes the concatenated values of a packed field, without tag or length.
                pub fn $write_packed(&mut self, values: &[$ty]) {
                    for &value in values {
                        self.$write(value);
                    }
                }
            )*
        }
    };
}

packed_writers! {
    write_packed_int32, write_int32, i32;
    write_packed_int64, write_int64, i64;
    write_packed_uint32, write_uint32, u32;
    write_packed_uint64, write_uint64, u64;
    write_packed_sint32, write_sint32, i32;
    write_packed_sint64, write_sint64, i64;
    write_packed_bool, write_bool, bool;
    write_packed_fixed32, write_fixed32, u32;
    write_packed_fixed64, write_fixed64, u64;
    write_packed_sfixed32, write_sfixed32, i32;
    write_packed_sfixed64, write_sfixed64, i64;
    write_packed_float, write_float, f32;
    write_packed_double, write_double, f64;
}

impl ProtoSink {
    pub fn write_packed_enum<E>(&mut self, values: &[EnumValue<E>]) {
        for &value in values {
            self.write_enum(value);
        }
    }
}

#[inline]
pub const fn tag_size(field_number: u32) -> usize {
    wire::tag_size(field_number)
}

#[inline]
pub const fn varint32_size(value: u32) -> usize {
    wire::varint_size(value as u64)
}

#[inline]
pub const fn varint64_size(value: u64) -> usize {
    wire::varint_size(value)
}

#[inline]
pub const fn int32_size(value: i32) -> usize {
    wire::varint_size(value as i64 as u64)
}

#[inline]
pub const fn int64_size(value: i64) -> usize {
    wire::varint_size(value as u64)
}

#[inline]
pub const fn uint32_size(value: u32) -> usize {
    varint32_size(value)
}

#[inline]
pub const fn uint64_size(value: u64) -> usize {
    varint64_size(value)
}

#[inline]
pub const fn sint32_size(value: i32) -> usize {
    varint32_size(wire::zigzag_encode32(value))
}

#[inline]
pub const fn sint64_size(value: i64) -> usize {
    varint64_size(wire::zigzag_encode64(value))
}

#[inline]
pub const fn bool_size(_value: bool) -> usize {
    1
}

#[inline]
pub fn enum_size<E>(value: EnumValue<E>) -> usize {
    int32_size(value.number())
}

#[inline]
pub const fn fixed32_size(_value: u32) -> usize {
    FIXED32_SIZE
}

#[inline]
pub const fn fixed64_size(_value: u64) -> usize {
    FIXED64_SIZE
}

#[inline]
pub const fn sfixed32_size(_value: i32) -> usize {
    FIXED32_SIZE
}

#[inline]
pub const fn sfixed64_size(_value: i64) -> usize {
    FIXED64_SIZE
}

#[inline]
pub const fn float_size(_value: f32) -> usize {
    FIXED32_SIZE
}

#[inline]
pub const fn double_size(_value: f64) -> usize {
    FIXED64_SIZE
}

/// Size of a length-delimited payload of `len` bytes, prefix included.
#[inline]
pub const fn length_delimited_size(len: usize) -> usize {
    wire::varint_size(len as u64) + len
}

#[inline]
pub const fn bytes_size(value: &[u8]) -> usize {
    length_delimited_size(value.len())
}

#[inline]
pub const fn string_size(value: &str) -> usize {
    length_delimited_size(value.len())
}

/// Size of a nested message whose body is `message_size` bytes, prefix included.
#[inline]
pub const fn message_size(message_size: usize) -> usize {
    length_delimited_size(message_size)
}

macro_rules! packed_sizes {
    (varint: $($packed_size:ident, $size:ident, $ty:ty;)*) => {
        $(
            /// Size of the packed payload, without tag or length prefix.
            pub fn $packed_size(values: &[$ty]) -> usize {
                values.iter().map(|&value| $size(value)).sum()
            }
        )*
    };
    (fixed: $($packed_size:ident, $width:expr, $ty:ty;)*) => {
        $(
            /// Size of the packed payload, without tag or length prefix.
            pub const fn $packed_size(values: &[$ty]) -> usize {
                values.len() * $width
            }
        )*
    };
}

packed_sizes! {
    varint:
    packed_int32_data_size, int32_size, i32;
    packed_int64_data_size, int64_size, i64;
    packed_uint32_data_size, uint32_size, u32;
    packed_uint64_data_size, uint64_size, u64;
    packed_sint32_data_size, sint32_size, i32;
    packed_sint64_data_size, sint64_size, i64;
}

packed_sizes! {
    fixed:
    packed_bool_data_size, 1, bool;
    packed_fixed32_data_size, FIXED32_SIZE, u32;
    packed_fixed64_data_size, FIXED64_SIZE, u64;
    packed_sfixed32_data_size, FIXED32_SIZE, i32;
    packed_sfixed64_data_size, FIXED64_SIZE, i64;
    packed_float_data_size, FIXED32_SIZE, f32;
    packed_double_data_size, FIXED64_SIZE, f64;
}

pub fn packed_enum_data_size<E>(values: &[EnumValue<E>]) -> usize {
    values.iter().map(|&value| enum_size(value)).sum()
}
