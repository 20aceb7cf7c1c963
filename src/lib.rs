//! # tightbuf
//!
//! A Protocol Buffers runtime for generated message types, together with the
//! `protoc-gen-tightbuf` compiler plugin that generates them.
//!
//! Generated messages are plain structs with private fields and accessor methods.
//! They implement [`Protobuf`], which gives them the two-pass encoder
//! (`compute_size` then `encode_raw`) and the tag-dispatch decoder, and through the
//! blanket [`ProtobufExt`] the convenience entry points:
//!
//! ```ignore
//! use tightbuf::ProtobufExt;
//!
//! let mut point = demo::Point::new();
//! point.set_x(150);
//! let bytes = point.encode_vec();
//! assert_eq!(bytes, [0x08, 0x96, 0x01]);
//! assert_eq!(demo::Point::decode(&bytes)?, point);
//! ```
//!
//! Messages are built for reuse: [`Clear`] resets a message while keeping its
//! strings, vectors and nested messages allocated, so decoding into a cleared message
//! in a loop allocates only when a payload outgrows what earlier payloads needed.
//!
//! ## Modules
//!
//! - [`wire`]: tags, varints, zigzag and fixed-width primitives
//! - [`encoding`] / [`decoding`]: the [`ProtoSink`] writer and [`ProtoSource`] reader
//! - [`base`], [`containers`], [`enums`]: storage types used by generated fields
//! - `codegen` (feature `codegen`): the schema compiler behind the plugin binary

pub mod base;
pub mod containers;
pub mod decoding;
pub mod encoding;
pub mod enums;
pub mod error;
pub mod hashing;
pub mod test_utils;
pub mod wire;

#[cfg(feature = "codegen")]
pub mod codegen;

use core::fmt::Debug;

pub use base::{CachedSize, Clear, MessageField, RepeatedField};
pub use containers::UnknownFields;
pub use decoding::ProtoSource;
pub use encoding::ProtoSink;
pub use enums::{EnumValue, ProtoEnum};
pub use error::{DecodeError, EncodeError, ReadError};
pub use hashing::FieldHash;

/// Implemented by every generated message type.
///
/// Encoding is two-pass: [`compute_size`](Protobuf::compute_size) walks the message
/// once, storing the size of every nested message along the way, and
/// [`encode_raw`](Protobuf::encode_raw) then writes the bytes using those stored
/// sizes for length prefixes. `encode_raw` is only valid directly after
/// `compute_size` on an unmodified message; [`ProtobufExt`] takes care of the
/// sequencing.
pub trait Protobuf: Clear + Default + Clone + PartialEq + Debug {
    /// Fully qualified schema name, e.g. `demo.shapes.Point`.
    const NAME: &'static str;

    /// Computes and caches the encoded size in bytes.
    fn compute_size(&self) -> usize;

    /// The size stored by the last call to [`compute_size`](Protobuf::compute_size).
    fn cached_size(&self) -> usize;

    /// Writes the encoded fields to `sink`, without a length prefix.
    fn encode_raw(&self, sink: &mut ProtoSink);

    /// Merges fields read from `source` until its current limit.
    ///
    /// Singular fields are overwritten, repeated fields appended to, and nested
    /// messages merged recursively.
    fn merge_from(&mut self, source: &mut ProtoSource<'_>) -> Result<(), DecodeError>;

    /// Whether all `required` fields, including those of nested messages, are set.
    fn is_initialized(&self) -> bool {
        true
    }
}

pub trait ProtobufExt: Protobuf {
    /// Encodes into a new vector. Missing required fields are not checked.
    fn encode_vec(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_to_vec(&mut out);
        out
    }

    /// Appends the encoding to `out`.
    fn encode_to_vec(&self, out: &mut Vec<u8>) {
        let size = self.compute_size();
        let mut sink = ProtoSink::from_vec(core::mem::take(out));
        sink.reserve(size);
        self.encode_raw(&mut sink);
        *out = sink.into_inner();
    }

    /// Encodes with a varint length prefix, for streams of messages.
    fn encode_length_delimited_vec(&self) -> Vec<u8> {
        let size = self.compute_size();
        let mut sink = ProtoSink::with_capacity(encoding::length_delimited_size(size));
        sink.write_varint32(size as u32);
        self.encode_raw(&mut sink);
        sink.into_inner()
    }

    /// Encodes, failing if required fields are missing.
    fn try_encode_vec(&self) -> Result<Vec<u8>, EncodeError> {
        if !self.is_initialized() {
            return Err(EncodeError::MissingRequiredFields(Self::NAME));
        }
        Ok(self.encode_vec())
    }

    /// Decodes a complete message, failing if required fields are missing.
    fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut message = Self::default();
        message.merge_from_bytes(bytes)?;
        if !message.is_initialized() {
            return Err(DecodeError::MissingRequiredFields(Self::NAME));
        }
        Ok(message)
    }

    /// Decodes one length-prefixed message from the front of `bytes`, returning it
    /// with the number of bytes consumed.
    fn decode_length_delimited(bytes: &[u8]) -> Result<(Self, usize), DecodeError> {
        let (payload, consumed) = wire::decode_length_delimited(bytes)?;
        Ok((Self::decode(payload)?, consumed))
    }

    /// Merges `bytes` into `self`.
    fn merge_from_bytes(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        let mut source = ProtoSource::new(bytes);
        self.merge_from(&mut source)
    }

    /// Clears `self`, keeping allocations, and decodes `bytes` into it.
    fn clear_and_merge_from_bytes(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        self.clear();
        self.merge_from_bytes(bytes)
    }

    /// Reads `reader` to the end and decodes the contents.
    fn decode_from_read<R: std::io::Read>(mut reader: R) -> Result<Self, ReadError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(Self::decode(&bytes)?)
    }
}

impl<T: Protobuf> ProtobufExt for T {}
