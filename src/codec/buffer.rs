//! Serialized Buffer Module
//!
//! An owned, encoded value. Ownership moves explicitly at every handoff;
//! the type is not `Clone`, copies go through `duplicate`.

use tracing::trace;

// == Serialized Buffer ==
/// Bytes of one encoded value.
#[derive(Debug, PartialEq, Eq)]
pub struct SerializedBuffer {
    bytes: Box<[u8]>,
}

impl SerializedBuffer {
    /// Takes ownership of encoded bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into_boxed_slice(),
        }
    }

    /// Encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Makes an independent copy with its own allocation.
    pub fn duplicate(&self) -> Self {
        Self {
            bytes: self.bytes.clone(),
        }
    }

    /// Releases the buffer. Consuming `self` makes later reads a compile error.
    pub fn release(self) {
        trace!(len = self.bytes.len(), "released serialized buffer");
    }

    pub(crate) fn into_boxed_slice(self) -> Box<[u8]> {
        self.bytes
    }
}

impl AsRef<[u8]> for SerializedBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}
