//! Ledger of boundary-owned buffers handed out as raw pointers.
//!
//! Every raw buffer given to a foreign caller gets an id that is never
//! reused, and must come back through `take` exactly once. Addresses are
//! not identities: the allocator hands a freed address straight back, so a
//! stale release has to be told apart by id.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Allocation {
    pub addr: usize,
    pub len: usize,
}

#[derive(Debug, Default)]
pub(crate) struct BufferLedger {
    next_id: u64,
    /// Buffer id to its outstanding allocation
    live: HashMap<u64, Allocation>,
}

impl BufferLedger {
    /// Records an allocation and returns its id. Ids start at 1.
    pub fn record(&mut self, addr: usize, len: usize) -> u64 {
        self.next_id += 1;
        self.live.insert(self.next_id, Allocation { addr, len });
        self.next_id
    }

    /// Removes and returns the allocation behind `id`, if still live.
    pub fn take(&mut self, id: u64) -> Option<Allocation> {
        self.live.remove(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.live.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }
}
