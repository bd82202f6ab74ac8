//! Boundary Marshaller Module
//!
//! The only place where addresses and buffers cross between the host's
//! memory and memory owned by this library.
//!
//! Rules enforced here:
//! - an address is readable only through a handle whose pin is live;
//! - a handle is never kept: `import_buffer` copies before returning;
//! - raw buffers handed out are tracked and freed exactly once.

mod ledger;
mod pin;

pub use pin::PinGuard;

use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::codec::{Codec, SerializedBuffer, Value};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::shape::Descriptor;

use ledger::BufferLedger;
use pin::{PinTable, PinnedRegion};

// == Boundary Handle ==
/// Non-owning, call-scoped reference to a pinned region.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryHandle {
    /// Start address of the region
    pub addr: usize,
    /// Length of the region in bytes
    pub len: usize,
    /// Id of the pin keeping the region valid
    pub pin: u64,
}

// == Raw Buffer ==
/// A boundary-owned buffer handed to the host. `id` is what releases it.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBuffer {
    /// Release token, never reused within a process
    pub id: u64,
    /// Start of the bytes
    pub data: *mut u8,
    /// Length in bytes
    pub len: usize,
}

impl RawBuffer {
    /// An empty slot for out-parameters.
    pub const fn empty() -> Self {
        Self {
            id: 0,
            data: std::ptr::null_mut(),
            len: 0,
        }
    }
}

// == Exported Value ==
/// An encoded value pinned for the duration of one outbound call.
///
/// Dropping it releases the pin, then frees the encoded bytes.
#[derive(Debug)]
pub struct ExportedValue<'m> {
    // Declared first: the pin must be released before `buffer` is freed
    pin: PinGuard<'m>,
    buffer: SerializedBuffer,
    descriptor: Descriptor,
}

impl ExportedValue<'_> {
    pub fn handle(&self) -> BoundaryHandle {
        self.pin.handle()
    }

    pub fn descriptor(&self) -> Descriptor {
        self.descriptor
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

// == Marshaller ==
/// Converts between host addresses and library-owned buffers.
#[derive(Debug)]
pub struct Marshaller {
    codec: Codec,
    max_buffer_len: usize,
    max_pins: usize,
    pins: Mutex<PinTable>,
    ledger: Mutex<BufferLedger>,
}

impl Marshaller {
    // == Constructor ==
    pub fn new(codec: Codec, config: &Config) -> Self {
        Self {
            codec,
            max_buffer_len: config.max_buffer_len,
            max_pins: config.max_pins,
            pins: Mutex::new(PinTable::default()),
            ledger: Mutex::new(BufferLedger::default()),
        }
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    // == Pinning ==
    /// Pins a borrowed slice. The borrow keeps the memory alive and unmoved
    /// for as long as the guard exists.
    pub fn pin_slice<'a>(&'a self, bytes: &'a [u8]) -> Result<PinGuard<'a>> {
        let region = PinnedRegion {
            addr: bytes.as_ptr() as usize,
            len: bytes.len(),
        };
        self.acquire_pin(region)
    }

    /// Pins a region owned by the host.
    ///
    /// # Safety
    /// `ptr` must point to at least `len` readable bytes that stay valid and
    /// unmoved until the returned guard is dropped.
    pub unsafe fn pin_raw(&self, ptr: *const u8, len: usize) -> Result<PinGuard<'_>> {
        if ptr.is_null() {
            return Err(CacheError::PinFailure(
                "cannot pin a null address".to_string(),
            ));
        }
        self.acquire_pin(PinnedRegion {
            addr: ptr as usize,
            len,
        })
    }

    fn acquire_pin(&self, region: PinnedRegion) -> Result<PinGuard<'_>> {
        // A poisoned table cannot vouch for any address
        let mut pins = self
            .pins
            .lock()
            .map_err(|_| CacheError::PinFailure("pin table is poisoned".to_string()))?;

        if pins.len() >= self.max_pins {
            warn!(live = pins.len(), "pin limit reached");
            return Err(CacheError::PinFailure(format!(
                "{} pins already live",
                pins.len()
            )));
        }

        let id = pins.acquire(region);
        Ok(PinGuard::new(
            self,
            BoundaryHandle {
                addr: region.addr,
                len: region.len,
                pin: id,
            },
        ))
    }

    pub(crate) fn unpin(&self, id: u64) {
        // Releasing must succeed even after a panic elsewhere poisoned the lock
        let mut pins = self.pins.lock().unwrap_or_else(|e| e.into_inner());
        if !pins.release(id) {
            warn!(pin = id, "released a pin that was not live");
        }
    }

    /// Number of live pins.
    pub fn live_pins(&self) -> usize {
        self.pins.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    // == Export Value ==
    /// Encodes `value` and pins the encoded bytes for one outbound call.
    pub fn export_value(&self, value: &Value, descriptor: Descriptor) -> Result<ExportedValue<'_>> {
        let buffer = self.codec.encode(value, descriptor)?;

        // SAFETY: the bytes live in `buffer`'s heap allocation, which does
        // not move when `buffer` moves and is freed only after `pin` drops.
        let pin = unsafe { self.pin_raw(buffer.as_bytes().as_ptr(), buffer.len())? };

        Ok(ExportedValue {
            pin,
            buffer,
            descriptor,
        })
    }

    // == Import Buffer ==
    /// Copies `len` bytes from a pinned region into a library-owned buffer.
    ///
    /// Fails with `InvalidHandle` for a zero or oversized length, or when the
    /// handle's pin is not live or does not cover `len` bytes.
    pub fn import_buffer(&self, handle: &BoundaryHandle, len: usize) -> Result<SerializedBuffer> {
        if len == 0 {
            return Err(CacheError::InvalidHandle("zero-length buffer".to_string()));
        }
        if len > self.max_buffer_len {
            return Err(CacheError::InvalidHandle(format!(
                "length {} exceeds limit of {} bytes",
                len, self.max_buffer_len
            )));
        }

        // Held across the copy: the pin cannot be released mid-read
        let pins = self.pins.lock().unwrap_or_else(|e| e.into_inner());
        let region = pins.get(handle.pin).ok_or_else(|| {
            CacheError::InvalidHandle(format!("pin {} is not live", handle.pin))
        })?;
        if region.addr != handle.addr || len > region.len {
            return Err(CacheError::InvalidHandle(format!(
                "{} bytes at {:#x} are outside pin {}",
                len, handle.addr, handle.pin
            )));
        }

        // SAFETY: a live pin guarantees `region` is readable and unmoved,
        // and `len <= region.len`.
        let bytes = unsafe { std::slice::from_raw_parts(region.addr as *const u8, len) }.to_vec();
        drop(pins);

        Ok(SerializedBuffer::new(bytes))
    }

    // == Import Value ==
    /// Decodes a buffer for the caller and releases it.
    pub fn import_value(&self, buffer: SerializedBuffer, descriptor: Descriptor) -> Result<Value> {
        let value = self.codec.decode(&buffer, descriptor);
        buffer.release();
        value
    }

    // == Raw Buffers ==
    /// Hands a buffer to the host as a raw pointer, length and id.
    ///
    /// The host must give the id back through `release_raw` exactly once.
    pub fn into_raw(&self, buffer: SerializedBuffer) -> Result<RawBuffer> {
        if buffer.is_empty() {
            return Err(CacheError::InvalidHandle(
                "empty buffers are not handed out".to_string(),
            ));
        }

        let len = buffer.len();
        let data = Box::into_raw(buffer.into_boxed_slice()).cast::<u8>();
        let id = self.lock_ledger().record(data as usize, len);
        Ok(RawBuffer { id, data, len })
    }

    /// Frees the raw buffer issued under `id`.
    ///
    /// Unknown ids and second releases fail with `InvalidHandle` and free
    /// nothing. Ids are never reused, so a stale release cannot reach a
    /// newer buffer that happens to sit at the same address.
    pub fn release_raw(&self, id: u64) -> Result<()> {
        let allocation = self.lock_ledger().take(id).ok_or_else(|| {
            warn!(buffer = id, "refused release of unknown buffer");
            CacheError::InvalidHandle(format!("buffer {} is not live", id))
        })?;

        // SAFETY: the ledger entry was recorded by `into_raw` for this exact
        // allocation and has just been removed, so this is the only free.
        drop(unsafe {
            Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                allocation.addr as *mut u8,
                allocation.len,
            ))
        });
        Ok(())
    }

    /// Whether the buffer issued under `id` has not been released yet.
    pub fn is_live(&self, id: u64) -> bool {
        self.lock_ledger().contains(id)
    }

    /// Number of raw buffers not yet released.
    pub fn outstanding_buffers(&self) -> usize {
        self.lock_ledger().len()
    }

    fn lock_ledger(&self) -> MutexGuard<'_, BufferLedger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Marshaller {
    fn drop(&mut self) {
        // Freeing memory the host may still read is worse than leaking it
        let outstanding = self.outstanding_buffers();
        if outstanding > 0 {
            debug!(outstanding, "marshaller dropped with unreleased buffers");
        }
    }
}
