//! Wire-format primitives.
//!
//! Every value that reaches the byte stream goes through these functions: tag
//! composition, base-128 varints, zigzag mapping for the signed variants, the
//! little-endian fixed-width encodings and length-delimited framing. They are pure
//! and stateless; [`ProtoSink`](crate::encoding::ProtoSink) and
//! [`ProtoSource`](crate::decoding::ProtoSource) are thin cursors over them.
//!
//! # Example
//!
//! ```
//! use tightbuf::wire::{self, WireType};
//!
//! let tag = wire::make_tag(1, WireType::Varint);
//! assert_eq!(tag, 0x08);
//! assert_eq!(wire::tag_field_number(tag), 1);
//!
//! let mut out = Vec::new();
//! wire::encode_varint(150, &mut out);
//! assert_eq!(out, [0x96, 0x01]);
//! assert_eq!(wire::decode_varint(&out).unwrap(), (150, 2));
//! ```

use crate::error::DecodeError;

pub const WIRETYPE_VARINT: u32 = 0;
pub const WIRETYPE_FIXED64: u32 = 1;
pub const WIRETYPE_LENGTH_DELIMITED: u32 = 2;
pub const WIRETYPE_START_GROUP: u32 = 3;
pub const WIRETYPE_END_GROUP: u32 = 4;
pub const WIRETYPE_FIXED32: u32 = 5;

pub const TAG_TYPE_BITS: u32 = 3;
pub const TAG_TYPE_MASK: u32 = (1 << TAG_TYPE_BITS) - 1;

pub const MIN_FIELD_NUMBER: u32 = 1;
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

/// Field numbers reserved for the protobuf implementation itself.
pub const RESERVED_FIELD_NUMBERS: core::ops::RangeInclusive<u32> = 19000..=19999;

pub const MAX_VARINT_LEN: usize = 10;
pub const FIXED32_SIZE: usize = 4;
pub const FIXED64_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    StartGroup = 3,
    EndGroup = 4,
    Fixed32 = 5,
}

impl WireType {
    pub const fn from_u32(value: u32) -> Option<WireType> {
        match value {
            WIRETYPE_VARINT => Some(WireType::Varint),
            WIRETYPE_FIXED64 => Some(WireType::Fixed64),
            WIRETYPE_LENGTH_DELIMITED => Some(WireType::LengthDelimited),
            WIRETYPE_START_GROUP => Some(WireType::StartGroup),
            WIRETYPE_END_GROUP => Some(WireType::EndGroup),
            WIRETYPE_FIXED32 => Some(WireType::Fixed32),
            _ => None,
        }
    }

    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for WireType {
    type Error = DecodeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        WireType::from_u32(value).ok_or(DecodeError::InvalidWireType(value))
    }
}

#[inline]
pub const fn make_tag(field_number: u32, wire_type: WireType) -> u32 {
    (field_number << TAG_TYPE_BITS) | wire_type as u32
}

#[inline]
pub const fn tag_wire_type(tag: u32) -> u32 {
    tag & TAG_TYPE_MASK
}

#[inline]
pub const fn tag_field_number(tag: u32) -> u32 {
    tag >> TAG_TYPE_BITS
}

/// Size of the encoded tag for `field_number`, independent of the wire type.
#[inline]
pub const fn tag_size(field_number: u32) -> usize {
    varint_size(make_tag(field_number, WireType::Varint) as u64)
}

#[inline]
pub const fn zigzag_encode32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

#[inline]
pub const fn zigzag_decode32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

#[inline]
pub const fn zigzag_encode64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

#[inline]
pub const fn zigzag_decode64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

#[inline]
pub const fn varint_size(value: u64) -> usize {
    // Every 7 significant bits need one byte; zero still takes one byte.
    let bits = 64 - (value | 1).leading_zeros() as usize;
    (bits + 6) / 7
}

#[inline]
pub fn encode_varint(mut value: u64, out: &mut Vec<u8>) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Decodes a varint from the front of `buf`, returning the value and the number of
/// bytes consumed.
#[inline]
pub fn decode_varint(buf: &[u8]) -> Result<(u64, usize), DecodeError> {
    let mut value = 0u64;
    for (i, &byte) in buf.iter().take(MAX_VARINT_LEN).enumerate() {
        if i == MAX_VARINT_LEN - 1 && byte > 1 {
            // Tenth byte may only carry the 64th bit.
            return Err(DecodeError::MalformedVarint);
        }
        value |= ((byte & 0x7F) as u64) << (7 * i);
        if byte < 0x80 {
            return Ok((value, i + 1));
        }
    }
    if buf.len() >= MAX_VARINT_LEN {
        Err(DecodeError::MalformedVarint)
    } else {
        Err(DecodeError::Truncated)
    }
}

/// Decodes a varint and keeps the low 32 bits, as required for `int32`, `uint32` and
/// `enum` values written by 64-bit encoders.
#[inline]
pub fn decode_varint32(buf: &[u8]) -> Result<(u32, usize), DecodeError> {
    decode_varint(buf).map(|(value, len)| (value as u32, len))
}

#[inline]
pub fn encode_fixed32(value: u32, out: &mut Vec<u8>) {
    out.extend_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn encode_fixed64(value: u64, out: &mut Vec<u8>) {
    out.extend_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn decode_fixed32(buf: &[u8]) -> Result<u32, DecodeError> {
    let bytes: [u8; FIXED32_SIZE] = buf
        .get(..FIXED32_SIZE)
        .ok_or(DecodeError::Truncated)?
        .try_into()
        .map_err(|_| DecodeError::Truncated)?;
    Ok(u32::from_le_bytes(bytes))
}

#[inline]
pub fn decode_fixed64(buf: &[u8]) -> Result<u64, DecodeError> {
    let bytes: [u8; FIXED64_SIZE] = buf
        .get(..FIXED64_SIZE)
        .ok_or(DecodeError::Truncated)?
        .try_into()
        .map_err(|_| DecodeError::Truncated)?;
    Ok(u64::from_le_bytes(bytes))
}

/// Writes a varint length prefix followed by `payload`.
pub fn encode_length_delimited(payload: &[u8], out: &mut Vec<u8>) {
    encode_varint(payload.len() as u64, out);
    out.extend_from_slice(payload);
}

/// Splits a length-delimited frame off the front of `buf`, returning the payload and
/// the total number of bytes consumed including the prefix.
pub fn decode_length_delimited(buf: &[u8]) -> Result<(&[u8], usize), DecodeError> {
    let (len, prefix) = decode_varint(buf)?;
    let remaining = buf.len() - prefix;
    if len > remaining as u64 {
        return Err(DecodeError::LengthOverrun { len, remaining });
    }
    let end = prefix + len as usize;
    Ok((&buf[prefix..end], end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn tag_roundtrip_for_all_wire_types() {
        let wire_types = [
            WireType::Varint,
            WireType::Fixed64,
            WireType::LengthDelimited,
            WireType::StartGroup,
            WireType::EndGroup,
            WireType::Fixed32,
        ];
        for field_number in [MIN_FIELD_NUMBER, 2, 15, 16, 2047, 2048, MAX_FIELD_NUMBER] {
            for wire_type in wire_types {
                let tag = make_tag(field_number, wire_type);
                assert_eq!(tag_field_number(tag), field_number);
                assert_eq!(tag_wire_type(tag), wire_type as u32);
                assert_eq!(WireType::try_from(tag_wire_type(tag)).unwrap(), wire_type);
            }
        }
    }

    #[test]
    fn invalid_wire_types_are_rejected() {
        assert_eq!(WireType::try_from(6), Err(DecodeError::InvalidWireType(6)));
        assert_eq!(WireType::try_from(7), Err(DecodeError::InvalidWireType(7)));
    }

    #[test]
    fn tag_sizes() {
        assert_eq!(tag_size(1), 1);
        assert_eq!(tag_size(15), 1);
        assert_eq!(tag_size(16), 2);
        assert_eq!(tag_size(2047), 2);
        assert_eq!(tag_size(2048), 3);
        assert_eq!(tag_size(MAX_FIELD_NUMBER), 5);
    }

    #[test]
    fn known_varint_encodings() {
        let cases: &[(u64, &[u8])] = &[
            (0, &[0x00]),
            (1, &[0x01]),
            (127, &[0x7F]),
            (128, &[0x80, 0x01]),
            (150, &[0x96, 0x01]),
            (300, &[0xAC, 0x02]),
            (
                u64::MAX,
                &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01],
            ),
        ];
        for &(value, bytes) in cases {
            let mut out = Vec::new();
            encode_varint(value, &mut out);
            assert_eq!(out, bytes, "encoding {value}");
            assert_eq!(varint_size(value), bytes.len());
            assert_eq!(decode_varint(bytes).unwrap(), (value, bytes.len()));
        }
    }

    #[test]
    fn random_varint_roundtrip() {
        let mut rng = rand::thread_rng();
        let mut out = Vec::new();
        for _ in 0..10_000 {
            // Spread values over all byte lengths.
            let value: u64 = rng.r#gen::<u64>() >> rng.gen_range(0..64);
            out.clear();
            encode_varint(value, &mut out);
            assert_eq!(out.len(), varint_size(value));
            assert_eq!(decode_varint(&out).unwrap(), (value, out.len()));

            let small = value as u32;
            out.clear();
            encode_varint(small as u64, &mut out);
            assert_eq!(decode_varint32(&out).unwrap(), (small, out.len()));
        }
    }

    #[test]
    fn random_zigzag_roundtrip() {
        let mut rng = rand::thread_rng();
        for _ in 0..10_000 {
            let v32: i32 = rng.r#gen();
            assert_eq!(zigzag_decode32(zigzag_encode32(v32)), v32);
            let v64: i64 = rng.r#gen();
            assert_eq!(zigzag_decode64(zigzag_encode64(v64)), v64);
        }
        for v in [i32::MIN, -1, 0, 1, i32::MAX] {
            assert_eq!(zigzag_decode32(zigzag_encode32(v)), v);
        }
        for v in [i64::MIN, -1, 0, 1, i64::MAX] {
            assert_eq!(zigzag_decode64(zigzag_encode64(v)), v);
        }
    }

    #[test]
    fn zigzag_known_values() {
        assert_eq!(zigzag_encode32(0), 0);
        assert_eq!(zigzag_encode32(-1), 1);
        assert_eq!(zigzag_encode32(1), 2);
        assert_eq!(zigzag_encode32(-2), 3);
        assert_eq!(zigzag_encode32(i32::MAX), 0xFFFF_FFFE);
        assert_eq!(zigzag_encode32(i32::MIN), 0xFFFF_FFFF);
        assert_eq!(zigzag_encode64(i64::MIN), u64::MAX);
    }

    #[test]
    fn truncated_varint() {
        assert_eq!(decode_varint(&[]), Err(DecodeError::Truncated));
        assert_eq!(decode_varint(&[0x80]), Err(DecodeError::Truncated));
        assert_eq!(decode_varint(&[0xFF, 0xFF, 0xFF]), Err(DecodeError::Truncated));
    }

    #[test]
    fn overlong_varint() {
        let eleven = [0xFFu8; 11];
        assert_eq!(decode_varint(&eleven), Err(DecodeError::MalformedVarint));
        let ten_with_overflow = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x02];
        assert_eq!(
            decode_varint(&ten_with_overflow),
            Err(DecodeError::MalformedVarint)
        );
    }

    #[test]
    fn fixed_width_little_endian() {
        let mut out = Vec::new();
        encode_fixed32(0x0102_0304, &mut out);
        assert_eq!(out, [0x04, 0x03, 0x02, 0x01]);
        assert_eq!(decode_fixed32(&out).unwrap(), 0x0102_0304);

        out.clear();
        encode_fixed64(0x0102_0304_0506_0708, &mut out);
        assert_eq!(out, [0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(decode_fixed64(&out).unwrap(), 0x0102_0304_0506_0708);

        assert_eq!(decode_fixed32(&[1, 2, 3]), Err(DecodeError::Truncated));
        assert_eq!(decode_fixed64(&[1, 2, 3, 4, 5, 6, 7]), Err(DecodeError::Truncated));
    }

    #[test]
    fn length_delimited_framing() {
        let mut out = Vec::new();
        encode_length_delimited(b"testing", &mut out);
        assert_eq!(out[0], 7);
        let (payload, consumed) = decode_length_delimited(&out).unwrap();
        assert_eq!(payload, b"testing");
        assert_eq!(consumed, 8);

        assert_eq!(
            decode_length_delimited(&[5, b'a', b'b']),
            Err(DecodeError::LengthOverrun {
                len: 5,
                remaining: 2
            })
        );
    }
}
