//! C boundary
//!
//! `extern "C"` entry points over one process-wide `Ccache`. Every function
//! returns a `CcacheStatus`; no panic or Rust error crosses into the host.
//!
//! Keys are passed as pointer + length of UTF-8 bytes; a zero length is the
//! empty key whatever the pointer. Buffers are returned as a `RawBuffer`
//! out-parameter, owned by the library, and handed back by id with
//! `ccache_buffer_release` exactly once.

use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;

use tracing::{debug, error};

use crate::api::Ccache;
use crate::boundary::RawBuffer;
use crate::cache::StatsReport;
use crate::codec::{SerializedBuffer, Value};
use crate::config::Config;
use crate::error::{CacheError, CcacheStatus, Result};
use crate::logging;
use crate::shape::{Descriptor, Shape};

static CACHE: OnceLock<Ccache> = OnceLock::new();

/// The process-wide cache, built from the environment on first use.
pub fn global() -> &'static Ccache {
    CACHE.get_or_init(|| Ccache::from_config(&Config::from_env()))
}

// == Helpers ==

/// Runs `f`, turning errors and panics into a status code.
fn guard(op: &'static str, f: impl FnOnce() -> Result<()>) -> CcacheStatus {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => CcacheStatus::Ok,
        Ok(Err(err)) => {
            debug!(op, error = %err, "call failed");
            CcacheStatus::from(&err)
        }
        Err(_) => {
            error!(op, "panic caught at C boundary");
            CcacheStatus::Panic
        }
    }
}

/// Copies `len` host bytes at `ptr` through a pin.
unsafe fn import_raw(cache: &Ccache, ptr: *const u8, len: usize) -> Result<SerializedBuffer> {
    if ptr.is_null() {
        return Err(CacheError::InvalidHandle("null data pointer".to_string()));
    }
    let pin = cache.marshaller().pin_raw(ptr, len)?;
    cache.marshaller().import_buffer(&pin.handle(), len)
}

unsafe fn read_key(cache: &Ccache, ptr: *const u8, len: usize) -> Result<String> {
    if len == 0 {
        return Ok(String::new());
    }
    if ptr.is_null() {
        return Err(CacheError::InvalidHandle("null key pointer".to_string()));
    }
    let bytes = import_raw(cache, ptr, len)?;
    let key = std::str::from_utf8(bytes.as_bytes())
        .map(str::to_owned)
        .map_err(|e| CacheError::InvalidHandle(format!("key is not UTF-8: {}", e)));
    bytes.release();
    key
}

fn check_out<T>(ptr: *mut T, name: &str) -> Result<()> {
    if ptr.is_null() {
        return Err(CacheError::InvalidHandle(format!("null {}", name)));
    }
    Ok(())
}

/// Hands `buffer` to the host through `buffer_out`.
unsafe fn hand_out(cache: &Ccache, buffer: SerializedBuffer, buffer_out: *mut RawBuffer) -> Result<()> {
    *buffer_out = cache.marshaller().into_raw(buffer)?;
    Ok(())
}

// == Lifecycle ==

/// Initialize the cache: installs logging and readies the store.
///
/// Safe to call more than once; later calls keep existing entries.
#[no_mangle]
pub extern "C" fn ccache_init() -> CcacheStatus {
    guard("init", || {
        let cache = global();
        logging::init(&cache.config().log_filter);
        cache.init();
        Ok(())
    })
}

// == Shapes ==

/// Register a shape from its JSON description.
///
/// # Safety
/// - `json` must point to `len` readable bytes.
/// - `descriptor_out` must be a valid pointer to a `u64`.
#[no_mangle]
pub unsafe extern "C" fn ccache_register_shape(
    json: *const u8,
    len: usize,
    descriptor_out: *mut u64,
) -> CcacheStatus {
    guard("register_shape", || {
        check_out(descriptor_out, "descriptor_out")?;
        let cache = global();
        let bytes = import_raw(cache, json, len)?;
        let shape = Shape::from_json(bytes.as_bytes());
        bytes.release();

        let descriptor = cache.register(shape?)?;
        *descriptor_out = descriptor.as_raw();
        Ok(())
    })
}

// == Store ==

/// Store an encoded buffer under a key.
///
/// The buffer is copied before this returns and checked against the shape
/// behind `descriptor`. A payload that does not match returns
/// `EncodeError` and leaves any previous entry in place.
///
/// # Safety
/// - `key` must point to `key_len` readable bytes.
/// - `data` must point to `data_len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn ccache_insert(
    key: *const u8,
    key_len: usize,
    data: *const u8,
    data_len: usize,
    descriptor: u64,
) -> CcacheStatus {
    guard("insert", || {
        let cache = global();
        let key = read_key(cache, key, key_len)?;
        if data.is_null() {
            return Err(CacheError::InvalidHandle("null data pointer".to_string()));
        }

        let pin = cache.marshaller().pin_raw(data, data_len)?;
        cache.insert_encoded(&key, &pin.handle(), data_len, Descriptor::from_raw(descriptor))
    })
}

/// Fetch a copy of the buffer stored under a key.
///
/// On success `*buffer_out` holds a buffer owned by the library and
/// `*descriptor_out` the descriptor it was stored with.
///
/// # Safety
/// - `key` must point to `key_len` readable bytes.
/// - `buffer_out` and `descriptor_out` must be valid for writes.
/// - The returned buffer must be freed with `ccache_buffer_release`.
#[no_mangle]
pub unsafe extern "C" fn ccache_get(
    key: *const u8,
    key_len: usize,
    buffer_out: *mut RawBuffer,
    descriptor_out: *mut u64,
) -> CcacheStatus {
    guard("get", || {
        check_out(buffer_out, "buffer_out")?;
        check_out(descriptor_out, "descriptor_out")?;

        let cache = global();
        let key = read_key(cache, key, key_len)?;
        let (buffer, descriptor) = cache.store().get(&key)?;
        hand_out(cache, buffer, buffer_out)?;
        *descriptor_out = descriptor.as_raw();
        Ok(())
    })
}

/// Remove the entry under a key.
///
/// # Safety
/// `key` must point to `key_len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn ccache_remove(key: *const u8, key_len: usize) -> CcacheStatus {
    guard("remove", || {
        let cache = global();
        let key = read_key(cache, key, key_len)?;
        cache.remove(&key)
    })
}

/// Number of entries; 0 before `ccache_init`.
#[no_mangle]
pub extern "C" fn ccache_len() -> usize {
    panic::catch_unwind(|| global().len()).unwrap_or(0)
}

/// Free a buffer returned by this library, by its id.
///
/// An id that was never handed out, or was already released, is refused
/// with `InvalidHandle` and nothing is freed.
#[no_mangle]
pub extern "C" fn ccache_buffer_release(id: u64) -> CcacheStatus {
    guard("buffer_release", || global().marshaller().release_raw(id))
}

// == JSON Bridge ==

/// Encode a JSON object against the shape behind `descriptor`.
///
/// # Safety
/// - `json` must point to `len` readable bytes.
/// - `buffer_out` must be valid for writes.
/// - The returned buffer must be freed with `ccache_buffer_release`.
#[no_mangle]
pub unsafe extern "C" fn ccache_encode_json(
    descriptor: u64,
    json: *const u8,
    len: usize,
    buffer_out: *mut RawBuffer,
) -> CcacheStatus {
    guard("encode_json", || {
        check_out(buffer_out, "buffer_out")?;

        let cache = global();
        let descriptor = Descriptor::from_raw(descriptor);
        let shape = cache.registry().resolve(descriptor)?;

        let bytes = import_raw(cache, json, len)?;
        let parsed = serde_json::from_slice::<serde_json::Value>(bytes.as_bytes());
        bytes.release();
        let json = parsed.map_err(|e| CacheError::Encode(format!("invalid JSON: {}", e)))?;

        let value = Value::from_json(&json, &shape).map_err(CacheError::Encode)?;
        let buffer = cache.marshaller().codec().encode(&value, descriptor)?;
        hand_out(cache, buffer, buffer_out)
    })
}

/// Decode a buffer into a UTF-8 JSON object.
///
/// # Safety
/// - `data` must point to `len` readable bytes.
/// - `json_out` must be valid for writes.
/// - The returned buffer must be freed with `ccache_buffer_release`.
#[no_mangle]
pub unsafe extern "C" fn ccache_decode_json(
    descriptor: u64,
    data: *const u8,
    len: usize,
    json_out: *mut RawBuffer,
) -> CcacheStatus {
    guard("decode_json", || {
        check_out(json_out, "json_out")?;

        let cache = global();
        let buffer = import_raw(cache, data, len)?;
        let value = cache
            .marshaller()
            .import_value(buffer, Descriptor::from_raw(descriptor))?;

        let json = serde_json::to_vec(&value.to_json())
            .map_err(|e| CacheError::Decode(e.to_string()))?;
        hand_out(cache, SerializedBuffer::new(json), json_out)
    })
}

/// Current statistics as a UTF-8 JSON object.
///
/// # Safety
/// - `json_out` must be valid for writes.
/// - The returned buffer must be freed with `ccache_buffer_release`.
#[no_mangle]
pub unsafe extern "C" fn ccache_stats_json(json_out: *mut RawBuffer) -> CcacheStatus {
    guard("stats_json", || {
        check_out(json_out, "json_out")?;

        let cache = global();
        let report = StatsReport::from(cache.stats());
        let json = serde_json::to_vec(&report).map_err(|e| CacheError::Encode(e.to_string()))?;
        hand_out(cache, SerializedBuffer::new(json), json_out)
    })
}
