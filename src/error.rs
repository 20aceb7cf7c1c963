/// Failure while decoding wire-format bytes.
///
/// Every variant describes malformed input; unknown but well-formed fields are never
/// an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("truncated input: unexpected end of buffer")]
    Truncated,
    #[error("malformed varint: more than 10 bytes or overflows 64 bits")]
    MalformedVarint,
    #[error("invalid tag {0:#x}")]
    InvalidTag(u64),
    #[error("invalid wire type {0}")]
    InvalidWireType(u32),
    #[error("length-delimited field of {len} bytes exceeds the {remaining} bytes remaining")]
    LengthOverrun { len: u64, remaining: usize },
    #[error("end-group tag for field {0} without a matching start-group")]
    UnexpectedEndGroup(u32),
    #[error("group for field {0} is not terminated")]
    UnterminatedGroup(u32),
    #[error("packed field payload is not a whole number of elements")]
    MalformedPackedField,
    #[error("message nesting exceeds the recursion limit of {0}")]
    RecursionLimitExceeded(u32),
    #[error("string field contains invalid UTF-8")]
    InvalidUtf8,
    #[error("message {0} is missing required fields")]
    MissingRequiredFields(&'static str),
}

/// Failure while encoding a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("message {0} is missing required fields")]
    MissingRequiredFields(&'static str),
}

/// Failure while decoding from an [`std::io::Read`] source.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}
