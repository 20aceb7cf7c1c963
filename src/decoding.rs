//! Decoding: the [`ProtoSource`] reader.
//!
//! A `ProtoSource` is a cursor over a borrowed byte slice with a stack of nested
//! limits. Entering a length-delimited sub-message pushes a limit; [`ProtoSource::read_tag`]
//! returns `0` once the cursor reaches the innermost limit, which is how generated
//! `merge_from` loops know a message has ended. All reads are bounds checked against
//! that limit, never against the end of the whole buffer.

use crate::Protobuf;
use crate::containers::UnknownFields;
use crate::enums::EnumValue;
use crate::error::DecodeError;
use crate::wire::{self, FIXED32_SIZE, FIXED64_SIZE, WireType};

/// Nesting depth of sub-messages and groups allowed before decoding fails.
pub const DEFAULT_RECURSION_LIMIT: u32 = 100;

#[derive(Debug, Clone)]
pub struct ProtoSource<'a> {
    buf: &'a [u8],
    pos: usize,
    limit: usize,
    depth: u32,
    recursion_limit: u32,
    last_tag_start: usize,
}

impl<'a> ProtoSource<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        ProtoSource {
            buf,
            pos: 0,
            limit: buf.len(),
            depth: 0,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            last_tag_start: 0,
        }
    }

    pub fn with_recursion_limit(mut self, recursion_limit: u32) -> Self {
        self.recursion_limit = recursion_limit;
        self
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn bytes_until_limit(&self) -> usize {
        self.limit - self.pos
    }

    pub fn is_at_limit(&self) -> bool {
        self.pos == self.limit
    }

    #[inline]
    fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..self.limit]
    }

    #[inline]
    fn advance(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if n > self.bytes_until_limit() {
            return Err(DecodeError::Truncated);
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.buf[start..self.pos])
    }

    /// Restricts reads to the next `len` bytes, returning the previous limit for
    /// [`pop_limit`](Self::pop_limit).
    pub fn push_limit(&mut self, len: usize) -> Result<usize, DecodeError> {
        let remaining = self.bytes_until_limit();
        if len > remaining {
            return Err(DecodeError::LengthOverrun {
                len: len as u64,
                remaining,
            });
        }
        let old = self.limit;
        self.limit = self.pos + len;
        Ok(old)
    }

    /// Restores a limit returned by [`push_limit`](Self::push_limit). Any bytes left
    /// before the current limit are skipped.
    pub fn pop_limit(&mut self, old_limit: usize) {
        self.pos = self.limit;
        self.limit = old_limit;
    }

    /// Reads the next field tag, or returns `0` at the current limit.
    pub fn read_tag(&mut self) -> Result<u32, DecodeError> {
        if self.pos == self.limit {
            return Ok(0);
        }
        self.last_tag_start = self.pos;
        let raw = self.read_raw_varint64()?;
        let tag = u32::try_from(raw).map_err(|_| DecodeError::InvalidTag(raw))?;
        if wire::tag_field_number(tag) == 0 {
            return Err(DecodeError::InvalidTag(raw));
        }
        WireType::try_from(wire::tag_wire_type(tag))?;
        Ok(tag)
    }

    #[inline]
    pub fn read_raw_varint64(&mut self) -> Result<u64, DecodeError> {
        let (value, len) = wire::decode_varint(self.remaining())?;
        self.pos += len;
        Ok(value)
    }

    #[inline]
    pub fn read_raw_varint32(&mut self) -> Result<u32, DecodeError> {
        self.read_raw_varint64().map(|value| value as u32)
    }

    #[inline]
    pub fn read_int32(&mut self) -> Result<i32, DecodeError> {
        self.read_raw_varint64().map(|value| value as i32)
    }

    #[inline]
    pub fn read_int64(&mut self) -> Result<i64, DecodeError> {
        self.read_raw_varint64().map(|value| value as i64)
    }

    #[inline]
    pub fn read_uint32(&mut self) -> Result<u32, DecodeError> {
        self.read_raw_varint32()
    }

    #[inline]
    pub fn read_uint64(&mut self) -> Result<u64, DecodeError> {
        self.read_raw_varint64()
    }

    #[inline]
    pub fn read_sint32(&mut self) -> Result<i32, DecodeError> {
        self.read_raw_varint32().map(wire::zigzag_decode32)
    }

    #[inline]
    pub fn read_sint64(&mut self) -> Result<i64, DecodeError> {
        self.read_raw_varint64().map(wire::zigzag_decode64)
    }

    #[inline]
    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        self.read_raw_varint64().map(|value| value != 0)
    }

    #[inline]
    pub fn read_enum<E>(&mut self) -> Result<EnumValue<E>, DecodeError> {
        self.read_int32().map(EnumValue::from_number)
    }

    #[inline]
    pub fn read_fixed32(&mut self) -> Result<u32, DecodeError> {
        let value = wire::decode_fixed32(self.remaining())?;
        self.pos += FIXED32_SIZE;
        Ok(value)
    }

    #[inline]
    pub fn read_fixed64(&mut self) -> Result<u64, DecodeError> {
        let value = wire::decode_fixed64(self.remaining())?;
        self.pos += FIXED64_SIZE;
        Ok(value)
    }

    #[inline]
    pub fn read_sfixed32(&mut self) -> Result<i32, DecodeError> {
        self.read_fixed32().map(|value| value as i32)
    }

    #[inline]
    pub fn read_sfixed64(&mut self) -> Result<i64, DecodeError> {
        self.read_fixed64().map(|value| value as i64)
    }

    #[inline]
    pub fn read_float(&mut self) -> Result<f32, DecodeError> {
        self.read_fixed32().map(f32::from_bits)
    }

    #[inline]
    pub fn read_double(&mut self) -> Result<f64, DecodeError> {
        self.read_fixed64().map(f64::from_bits)
    }

    /// Reads a length prefix and checks it against the bytes left before the limit.
    pub fn read_length(&mut self) -> Result<usize, DecodeError> {
        let len = self.read_raw_varint64()?;
        let remaining = self.bytes_until_limit();
        if len > remaining as u64 {
            return Err(DecodeError::LengthOverrun { len, remaining });
        }
        Ok(len as usize)
    }

    /// Reads a length-delimited payload as a borrowed slice.
    pub fn read_bytes_slice(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_length()?;
        self.advance(len)
    }

    /// Replaces the contents of `out`, reusing its allocation.
    pub fn read_bytes_into(&mut self, out: &mut Vec<u8>) -> Result<(), DecodeError> {
        let bytes = self.read_bytes_slice()?;
        out.clear();
        out.extend_from_slice(bytes);
        Ok(())
    }

    /// Replaces the contents of `out` with a UTF-8 checked string, reusing its allocation.
    pub fn read_string_into(&mut self, out: &mut String) -> Result<(), DecodeError> {
        let bytes = self.read_bytes_slice()?;
        let text = core::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
        out.clear();
        out.push_str(text);
        Ok(())
    }

    fn enter(&mut self) -> Result<(), DecodeError> {
        if self.depth >= self.recursion_limit {
            return Err(DecodeError::RecursionLimitExceeded(self.recursion_limit));
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Merges a length-delimited sub-message into `message`.
    pub fn read_message<M: Protobuf>(&mut self, message: &mut M) -> Result<(), DecodeError> {
        let len = self.read_length()?;
        self.enter()?;
        let old_limit = self.push_limit(len)?;
        message.merge_from(self)?;
        self.pop_limit(old_limit);
        self.leave();
        Ok(())
    }

    /// Skips the payload of a field whose tag was just read.
    pub fn skip_field(&mut self, tag: u32) -> Result<(), DecodeError> {
        let field_number = wire::tag_field_number(tag);
        tracing::trace!(field_number, wire_type = wire::tag_wire_type(tag), "skipping field");
        match WireType::try_from(wire::tag_wire_type(tag))? {
            WireType::Varint => {
                self.read_raw_varint64()?;
            }
            WireType::Fixed64 => {
                self.advance(FIXED64_SIZE)?;
            }
            WireType::LengthDelimited => {
                let len = self.read_length()?;
                self.advance(len)?;
            }
            WireType::Fixed32 => {
                self.advance(FIXED32_SIZE)?;
            }
            WireType::StartGroup => self.skip_group(field_number)?,
            WireType::EndGroup => return Err(DecodeError::UnexpectedEndGroup(field_number)),
        }
        Ok(())
    }

    fn skip_group(&mut self, field_number: u32) -> Result<(), DecodeError> {
        self.enter()?;
        loop {
            let tag = self.read_tag()?;
            if tag == 0 {
                return Err(DecodeError::UnterminatedGroup(field_number));
            }
            if wire::tag_wire_type(tag) == wire::WIRETYPE_END_GROUP {
                let end_number = wire::tag_field_number(tag);
                if end_number != field_number {
                    return Err(DecodeError::UnexpectedEndGroup(end_number));
                }
                break;
            }
            self.skip_field(tag)?;
        }
        self.leave();
        Ok(())
    }

    /// Skips the field whose tag was just read and appends its raw bytes, tag
    /// included, to `unknown`.
    pub fn read_unknown_field(
        &mut self,
        tag: u32,
        unknown: &mut UnknownFields,
    ) -> Result<(), DecodeError> {
        let start = self.last_tag_start;
        self.skip_field(tag)?;
        unknown.extend_from_raw(&self.buf[start..self.pos]);
        Ok(())
    }

    fn read_packed_fixed<T>(
        &mut self,
        out: &mut Vec<T>,
        width: usize,
        mut read: impl FnMut(&mut Self) -> Result<T, DecodeError>,
    ) -> Result<(), DecodeError> {
        let len = self.read_length()?;
        if len % width != 0 {
            return Err(DecodeError::MalformedPackedField);
        }
        out.reserve(len / width);
        let old_limit = self.push_limit(len)?;
        while !self.is_at_limit() {
            out.push(read(self)?);
        }
        self.pop_limit(old_limit);
        Ok(())
    }

    fn read_packed_varint<T>(
        &mut self,
        out: &mut Vec<T>,
        mut read: impl FnMut(&mut Self) -> Result<T, DecodeError>,
    ) -> Result<(), DecodeError> {
        let len = self.read_length()?;
        let old_limit = self.push_limit(len)?;
        while !self.is_at_limit() {
            // A varint running past the packed payload surfaces as Truncated.
            let value = read(self).map_err(|err| match err {
                DecodeError::Truncated => DecodeError::MalformedPackedField,
                other => other,
            })?;
            out.push(value);
        }
        self.pop_limit(old_limit);
        Ok(())
    }

    pub fn read_packed_enum<E>(&mut self, out: &mut Vec<EnumValue<E>>) -> Result<(), DecodeError> {
        self.read_packed_varint(out, |source| source.read_enum())
    }
}

macro_rules! packed_readers {
    (varint: $($read_packed:ident, $read:ident, $ty:ty;)*) => {
        impl ProtoSource<'_> {
            $(
                /// Appends the values of a packed payload to `out`.
                pub fn $read_packed(&mut self, out: &mut Vec<$ty>) -> Result<(), DecodeError> {
                    self.read_packed_varint(out, Self::$read)
                }
            )*
        }
    };
    (fixed: $($read_packed:ident, $read:ident, $width:expr, $ty:ty;)*) => {
        impl ProtoSource<'_> {
            $(
                /// Appends the values of a packed payload to `out`.
                pub fn $read_packed(&mut self, out: &mut Vec<$ty>) -> Result<(), DecodeError> {
                    self.read_packed_fixed(out, $width, Self::$read)
                }
            )*
        }
    };
}

packed_readers! {
    varint:
    read_packed_int32, read_int32, i32;
    read_packed_int64, read_int64, i64;
    read_packed_uint32, read_uint32, u32;
    read_packed_uint64, read_uint64, u64;
    read_packed_sint32, read_sint32, i32;
    read_packed_sint64, read_sint64, i64;
    read_packed_bool, read_bool, bool;
}

packed_readers! {
    fixed:
    read_packed_fixed32, read_fixed32, FIXED32_SIZE, u32;
    read_packed_fixed64, read_fixed64, FIXED64_SIZE, u64;
    read_packed_sfixed32, read_sfixed32, FIXED32_SIZE, i32;
    read_packed_sfixed64, read_sfixed64, FIXED64_SIZE, i64;
    read_packed_float, read_float, FIXED32_SIZE, f32;
    read_packed_double, read_double, FIXED64_SIZE, f64;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::ProtoSink;
    use crate::wire::make_tag;

    #[test]
    fn reads_scalars_until_limit() {
        let mut sink = ProtoSink::new();
        sink.write_raw_tag(make_tag(1, WireType::Varint));
        sink.write_int32(-7);
        sink.write_raw_tag(make_tag(2, WireType::Fixed64));
        sink.write_double(2.5);
        sink.write_raw_tag(make_tag(3, WireType::LengthDelimited));
        sink.write_string("abc");
        let bytes = sink.into_inner();

        let mut source = ProtoSource::new(&bytes);
        assert_eq!(source.read_tag().unwrap(), make_tag(1, WireType::Varint));
        assert_eq!(source.read_int32().unwrap(), -7);
        assert_eq!(source.read_tag().unwrap(), make_tag(2, WireType::Fixed64));
        assert_eq!(source.read_double().unwrap(), 2.5);
        assert_eq!(source.read_tag().unwrap(), make_tag(3, WireType::LengthDelimited));
        let mut text = String::with_capacity(16);
        source.read_string_into(&mut text).unwrap();
        assert_eq!(text, "abc");
        assert_eq!(source.read_tag().unwrap(), 0);
    }

    #[test]
    fn rejects_invalid_tags() {
        assert_eq!(
            ProtoSource::new(&[0x00]).read_tag(),
            Err(DecodeError::InvalidTag(0))
        );
        assert_eq!(
            ProtoSource::new(&[0x0E]).read_tag(),
            Err(DecodeError::InvalidWireType(6))
        );
        assert_eq!(
            ProtoSource::new(&[0x0F]).read_tag(),
            Err(DecodeError::InvalidWireType(7))
        );
        let mut oversized = Vec::new();
        wire::encode_varint(1 << 35, &mut oversized);
        assert_eq!(
            ProtoSource::new(&oversized).read_tag(),
            Err(DecodeError::InvalidTag(1 << 35))
        );
    }

    #[test]
    fn limits_bound_reads() {
        let bytes = [0x96, 0x01, 0x05];
        let mut source = ProtoSource::new(&bytes);
        let old = source.push_limit(1).unwrap();
        assert_eq!(source.read_uint32(), Err(DecodeError::Truncated));
        source.pop_limit(old);
        assert_eq!(source.position(), 1);

        let mut source = ProtoSource::new(&bytes);
        let old = source.push_limit(2).unwrap();
        assert_eq!(source.read_uint32().unwrap(), 150);
        assert_eq!(source.read_tag().unwrap(), 0);
        source.pop_limit(old);
        assert_eq!(source.read_uint32().unwrap(), 5);

        let mut source = ProtoSource::new(&bytes);
        assert!(matches!(
            source.push_limit(4),
            Err(DecodeError::LengthOverrun { len: 4, remaining: 3 })
        ));
    }

    #[test]
    fn length_prefix_past_end() {
        let mut source = ProtoSource::new(&[0x0A, 0x05, b'a']);
        source.read_tag().unwrap();
        assert_eq!(
            source.read_bytes_slice(),
            Err(DecodeError::LengthOverrun { len: 5, remaining: 1 })
        );
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut source = ProtoSource::new(&[0x02, 0xC3, 0x28]);
        let mut out = String::new();
        assert_eq!(source.read_string_into(&mut out), Err(DecodeError::InvalidUtf8));
    }

    #[test]
    fn unknown_fields_are_captured_verbatim() {
        let mut sink = ProtoSink::new();
        sink.write_raw_tag(make_tag(7, WireType::Varint));
        sink.write_uint64(300);
        sink.write_raw_tag(make_tag(8, WireType::StartGroup));
        sink.write_raw_tag(make_tag(1, WireType::Fixed32));
        sink.write_fixed32(9);
        sink.write_raw_tag(make_tag(8, WireType::EndGroup));
        sink.write_raw_tag(make_tag(9, WireType::LengthDelimited));
        sink.write_bytes(b"xyz");
        let bytes = sink.into_inner();

        let mut source = ProtoSource::new(&bytes);
        let mut unknown = UnknownFields::new();
        loop {
            let tag = source.read_tag().unwrap();
            if tag == 0 {
                break;
            }
            source.read_unknown_field(tag, &mut unknown).unwrap();
        }
        assert_eq!(unknown.as_bytes(), bytes.as_slice());
    }

    #[test]
    fn mismatched_group_end_fails() {
        let mut sink = ProtoSink::new();
        sink.write_raw_tag(make_tag(8, WireType::StartGroup));
        sink.write_raw_tag(make_tag(9, WireType::EndGroup));
        let bytes = sink.into_inner();
        let mut source = ProtoSource::new(&bytes);
        let tag = source.read_tag().unwrap();
        assert_eq!(source.skip_field(tag), Err(DecodeError::UnexpectedEndGroup(9)));

        let bytes = [make_tag(8, WireType::StartGroup) as u8];
        let mut source = ProtoSource::new(&bytes);
        let tag = source.read_tag().unwrap();
        assert_eq!(source.skip_field(tag), Err(DecodeError::UnterminatedGroup(8)));
    }

    #[test]
    fn deep_groups_hit_recursion_limit() {
        let start = make_tag(1, WireType::StartGroup) as u8;
        let end = make_tag(1, WireType::EndGroup) as u8;
        let depth = 5;
        let mut bytes = vec![start; depth];
        bytes.extend(core::iter::repeat_n(end, depth));

        let mut source = ProtoSource::new(&bytes).with_recursion_limit(4);
        let tag = source.read_tag().unwrap();
        assert_eq!(source.skip_field(tag), Err(DecodeError::RecursionLimitExceeded(4)));

        let mut source = ProtoSource::new(&bytes).with_recursion_limit(5);
        let tag = source.read_tag().unwrap();
        assert_eq!(source.skip_field(tag), Ok(()));
        assert_eq!(source.read_tag().unwrap(), 0);
    }

    #[test]
    fn packed_payloads() {
        let mut sink = ProtoSink::new();
        let values = [3i32, 270, 86942];
        let mut payload = ProtoSink::new();
        payload.write_packed_int32(&values);
        sink.write_bytes(payload.as_bytes());
        assert_eq!(sink.as_bytes(), &[0x06, 0x03, 0x8E, 0x02, 0x9E, 0xA7, 0x05]);

        let bytes = sink.into_inner();
        let mut out = vec![1];
        ProtoSource::new(&bytes).read_packed_int32(&mut out).unwrap();
        assert_eq!(out, [1, 3, 270, 86942]);

        let mut floats = Vec::new();
        assert_eq!(
            ProtoSource::new(&[0x03, 0, 0, 0]).read_packed_float(&mut floats),
            Err(DecodeError::MalformedPackedField)
        );
        assert_eq!(
            ProtoSource::new(&[0x01, 0x80]).read_packed_uint64(&mut Vec::new()),
            Err(DecodeError::MalformedPackedField)
        );
    }
}
