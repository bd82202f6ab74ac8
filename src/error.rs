//! Error types for the cache
//!
//! Provides unified error handling using thiserror, plus the C status codes
//! the boundary reports them as.

use thiserror::Error;

use crate::shape::Descriptor;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// Descriptor was never registered in this registry
    #[error("Unknown descriptor: {0}")]
    UnknownDescriptor(Descriptor),

    /// Shape description rejected at registration
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    /// Value does not match the shape it is encoded against
    #[error("Encode error: {0}")]
    Encode(String),

    /// Buffer is truncated or malformed for the shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// Address stability could not be guaranteed
    #[error("Pin failure: {0}")]
    PinFailure(String),

    /// Handle, pointer or length is not usable
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Store used before `init`
    #[error("Store not initialized")]
    NotReady,

    /// Key not found in cache
    #[error("Key not found: {0}")]
    KeyNotFound(String),
}

// == C Status Codes ==
/// Status codes returned by every `extern "C"` entry point.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcacheStatus {
    /// Operation completed successfully
    Ok = 0,
    /// Descriptor not registered in this process
    UnknownDescriptor = 1,
    /// Shape description rejected
    InvalidShape = 2,
    /// Value or payload does not match its shape
    EncodeError = 3,
    /// Buffer truncated or malformed
    DecodeError = 4,
    /// Address could not be pinned
    PinFailure = 5,
    /// Null pointer, zero length or unknown buffer
    InvalidHandle = 6,
    /// `ccache_init` has not been called
    NotReady = 7,
    /// Key not present
    KeyNotFound = 8,
    /// A panic was caught before it could unwind into the caller
    Panic = 99,
}

impl From<&CacheError> for CcacheStatus {
    fn from(err: &CacheError) -> Self {
        match err {
            CacheError::UnknownDescriptor(_) => CcacheStatus::UnknownDescriptor,
            CacheError::InvalidShape(_) => CcacheStatus::InvalidShape,
            CacheError::Encode(_) => CcacheStatus::EncodeError,
            CacheError::Decode(_) => CcacheStatus::DecodeError,
            CacheError::PinFailure(_) => CcacheStatus::PinFailure,
            CacheError::InvalidHandle(_) => CcacheStatus::InvalidHandle,
            CacheError::NotReady => CcacheStatus::NotReady,
            CacheError::KeyNotFound(_) => CcacheStatus::KeyNotFound,
        }
    }
}

impl<T> From<Result<T>> for CcacheStatus {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(_) => CcacheStatus::Ok,
            Err(err) => CcacheStatus::from(&err),
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
