//! ccache - A cross-runtime object cache
//!
//! Stores structured values as compact encoded buffers, keyed by string, and
//! exposes them to a host runtime through a C boundary. Type information
//! travels separately from the bytes as a `Descriptor` issued by the shape
//! registry.

pub mod api;
pub mod boundary;
pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod logging;
pub mod shape;

pub use api::ffi;
pub use api::Ccache;
pub use boundary::RawBuffer;
pub use codec::{Codec, Record, Value};
pub use config::Config;
pub use error::{CacheError, CcacheStatus, Result};
pub use shape::{Descriptor, Kind, Shape, ShapeRegistry};
