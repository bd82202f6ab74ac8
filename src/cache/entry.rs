//! Cache Entry Module
//!
//! Defines the structure for individual cache entries.

use chrono::{DateTime, Utc};

use crate::codec::SerializedBuffer;
use crate::shape::Descriptor;

// == Cache Entry ==
/// A stored buffer together with the descriptor needed to decode it.
#[derive(Debug)]
pub struct CacheEntry {
    /// The store's own copy of the encoded value
    pub buffer: SerializedBuffer,
    /// Shape of the encoded value
    pub descriptor: Descriptor,
    /// When the entry was inserted
    pub inserted_at: DateTime<Utc>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry, taking ownership of the buffer.
    pub fn new(buffer: SerializedBuffer, descriptor: Descriptor) -> Self {
        Self {
            buffer,
            descriptor,
            inserted_at: Utc::now(),
        }
    }

    /// Size of the stored buffer in bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Fresh copy of the stored buffer for handing to a caller.
    pub fn checkout(&self) -> (SerializedBuffer, Descriptor) {
        (self.buffer.duplicate(), self.descriptor)
    }
}
