//! Test utilities for tightbuf - available to downstream crates for testing.

use crate::{Protobuf, ProtobufExt};

/// Assert that a message can be encoded and decoded without loss, and that the
/// computed size matches the encoded length.
pub fn assert_roundtrip<T: Protobuf>(msg: &T) -> Vec<u8> {
    let data = msg.encode_vec();
    assert_eq!(
        msg.cached_size(),
        data.len(),
        "{}: computed size differs from encoded length",
        T::NAME
    );

    let mut roundtrip_msg = T::default();
    roundtrip_msg
        .merge_from_bytes(&data)
        .unwrap_or_else(|err| panic!("{}: decode failed: {err}", T::NAME));

    println!("Encoded {} ({} bytes)", T::NAME, data.len());

    assert_eq!(&roundtrip_msg, msg, "{}: decoded message differs", T::NAME);
    data
}

/// Like [`assert_roundtrip`], and also requires re-encoding the decoded message to
/// reproduce the original bytes. Only meaningful for messages without map entries,
/// whose encoding order is unspecified.
pub fn assert_bytes_roundtrip<T: Protobuf>(msg: &T) -> Vec<u8> {
    let data = assert_roundtrip(msg);
    let decoded = T::decode(&data)
        .unwrap_or_else(|err| panic!("{}: decode failed: {err}", T::NAME));
    assert_eq!(decoded.encode_vec(), data, "{}: re-encoding differs", T::NAME);
    data
}
