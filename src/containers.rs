//! Storage for fields the schema does not know about.
//!
//! [`UnknownFields`] keeps the raw wire bytes of every unrecognised field, tag
//! included, in arrival order. Re-encoding appends them verbatim after the known
//! fields, so data written by a newer schema version passes through unchanged.

use core::fmt;

#[derive(Default, Clone, PartialEq, Eq, Hash)]
pub struct UnknownFields(Vec<u8>);

impl UnknownFields {
    pub const fn new() -> Self {
        UnknownFields(Vec::new())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Appends already-encoded field bytes (tag and payload).
    pub fn extend_from_raw(&mut self, raw: &[u8]) {
        self.0.extend_from_slice(raw);
    }
}

impl fmt::Debug for UnknownFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnknownFields({} bytes)", self.0.len())
    }
}
