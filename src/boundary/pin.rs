//! Pin Table Module
//!
//! Records which memory regions are currently exposed to the other side of
//! the boundary. A region may only be read through a handle whose pin is
//! still live.

use std::collections::HashMap;
use std::marker::PhantomData;

use crate::boundary::{BoundaryHandle, Marshaller};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PinnedRegion {
    pub addr: usize,
    pub len: usize,
}

// == Pin Table ==
/// Live pins keyed by id, so pins of the same or overlapping regions stay
/// independent and can be released in any order.
#[derive(Debug, Default)]
pub(crate) struct PinTable {
    next_id: u64,
    live: HashMap<u64, PinnedRegion>,
}

impl PinTable {
    /// Records a pin and returns its id. Ids start at 1.
    pub fn acquire(&mut self, region: PinnedRegion) -> u64 {
        self.next_id += 1;
        self.live.insert(self.next_id, region);
        self.next_id
    }

    pub fn release(&mut self, id: u64) -> bool {
        self.live.remove(&id).is_some()
    }

    pub fn get(&self, id: u64) -> Option<PinnedRegion> {
        self.live.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }
}

// == Pin Guard ==
/// Scoped pin. The region stays registered until the guard is dropped,
/// on every exit path.
#[derive(Debug)]
pub struct PinGuard<'a> {
    marshaller: &'a Marshaller,
    handle: BoundaryHandle,
    _region: PhantomData<&'a [u8]>,
}

impl<'a> PinGuard<'a> {
    pub(crate) fn new(marshaller: &'a Marshaller, handle: BoundaryHandle) -> Self {
        Self {
            marshaller,
            handle,
            _region: PhantomData,
        }
    }

    /// Transient handle for the pinned region. Valid only while the guard lives.
    pub fn handle(&self) -> BoundaryHandle {
        self.handle
    }
}

impl Drop for PinGuard<'_> {
    fn drop(&mut self) {
        self.marshaller.unpin(self.handle.pin);
    }
}
