//! Shape Registry Module
//!
//! Process-wide table mapping descriptors to shapes. Entries are appended
//! once per distinct shape and never removed or mutated, so a descriptor
//! stays valid for as long as its registry lives.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::error::{CacheError, Result};
use crate::shape::{Descriptor, Shape};

static REGISTRY_SEQUENCE: AtomicU32 = AtomicU32::new(1);

/// Tag drawn once per process run. A restarted process gets a new one even
/// when it reuses the PID.
fn run_tag() -> u32 {
    static TAG: OnceLock<u32> = OnceLock::new();
    *TAG.get_or_init(|| {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();
        hash_run(std::process::id(), nanos)
    })
}

/// Folds the PID and start time through a randomly keyed hasher.
fn hash_run(pid: u32, nanos: u128) -> u32 {
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u32(pid);
    hasher.write_u128(nanos);
    let hash = hasher.finish();
    (hash ^ (hash >> 32)) as u32
}

/// Next generation of this run. Distinct for every registry in the process
/// and never 0.
fn next_generation() -> u32 {
    loop {
        let sequence = REGISTRY_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let generation = run_tag().wrapping_add(sequence);
        if generation != 0 {
            return generation;
        }
    }
}

#[derive(Debug, Default)]
struct Slots {
    /// Slot `i` holds the shape of descriptor slot `i + 1`
    shapes: Vec<Arc<Shape>>,
    /// Structural identity to slot
    index: HashMap<Arc<Shape>, u32>,
}

// == Shape Registry ==
/// Registry of shapes, addressed by opaque descriptors.
#[derive(Debug)]
pub struct ShapeRegistry {
    generation: u32,
    slots: RwLock<Slots>,
}

impl ShapeRegistry {
    // == Constructor ==
    /// Creates an empty registry with a fresh generation tag.
    ///
    /// Descriptors issued by one registry never resolve in another, which is
    /// what rejects tokens carried over from a different process.
    pub fn new() -> Self {
        Self {
            generation: next_generation(),
            slots: RwLock::new(Slots::default()),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static Arc<ShapeRegistry> {
        static GLOBAL: OnceLock<Arc<ShapeRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(ShapeRegistry::new()))
    }

    // == Register ==
    /// Registers a shape and returns its descriptor.
    ///
    /// Idempotent: a structurally identical shape returns the descriptor
    /// issued the first time.
    pub fn register(&self, shape: Shape) -> Result<Descriptor> {
        shape.validate()?;

        if let Some(slot) = self.read_slots().index.get(&shape) {
            return Ok(Descriptor::new(self.generation, *slot));
        }

        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        // Another thread may have registered it between the two locks
        if let Some(slot) = slots.index.get(&shape) {
            return Ok(Descriptor::new(self.generation, *slot));
        }

        let slot = u32::try_from(slots.shapes.len() + 1)
            .map_err(|_| CacheError::InvalidShape("registry is full".to_string()))?;
        let shape = Arc::new(shape);
        slots.shapes.push(shape.clone());
        slots.index.insert(shape.clone(), slot);

        let descriptor = Descriptor::new(self.generation, slot);
        debug!(shape = %shape.name, %descriptor, "registered shape");
        Ok(descriptor)
    }

    // == Resolve ==
    /// Returns the shape behind a descriptor.
    pub fn resolve(&self, descriptor: Descriptor) -> Result<Arc<Shape>> {
        if descriptor.generation() != self.generation || descriptor.slot() == 0 {
            return Err(CacheError::UnknownDescriptor(descriptor));
        }

        let index = descriptor.slot() as usize - 1;
        self.read_slots()
            .shapes
            .get(index)
            .cloned()
            .ok_or(CacheError::UnknownDescriptor(descriptor))
    }

    /// Number of distinct shapes registered.
    pub fn len(&self) -> usize {
        self.read_slots().shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_slots(&self) -> std::sync::RwLockReadGuard<'_, Slots> {
        // Slots are append-only, so a poisoned lock still holds consistent data
        self.slots.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ShapeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Kind;
    use std::collections::HashSet;
    use std::thread;

    fn person() -> Shape {
        Shape::new("Person")
            .field("Name", Kind::Text)
            .field("Age", Kind::I64)
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = ShapeRegistry::new();
        let descriptor = registry.register(person()).unwrap();

        assert_ne!(descriptor.as_raw(), 0);
        assert_eq!(*registry.resolve(descriptor).unwrap(), person());
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = ShapeRegistry::new();
        let first = registry.register(person()).unwrap();
        let second = registry.register(person()).unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve(first).unwrap(), registry.resolve(second).unwrap());
    }

    #[test]
    fn test_field_order_is_part_of_identity() {
        let registry = ShapeRegistry::new();
        let swapped = Shape::new("Person")
            .field("Age", Kind::I64)
            .field("Name", Kind::Text);

        let a = registry.register(person()).unwrap();
        let b = registry.register(swapped).unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_resolve_unknown_slot() {
        let registry = ShapeRegistry::new();
        registry.register(person()).unwrap();

        let bogus = Descriptor::new(registry.generation, 42);
        assert_eq!(
            registry.resolve(bogus),
            Err(CacheError::UnknownDescriptor(bogus))
        );
    }

    #[test]
    fn test_resolve_foreign_registry() {
        let ours = ShapeRegistry::new();
        let theirs = ShapeRegistry::new();
        let descriptor = theirs.register(person()).unwrap();

        assert!(matches!(
            ours.resolve(descriptor),
            Err(CacheError::UnknownDescriptor(_))
        ));
    }

    #[test]
    fn test_resolve_zero() {
        let registry = ShapeRegistry::new();
        assert!(registry.resolve(Descriptor::from_raw(0)).is_err());
    }

    #[test]
    fn test_register_rejects_invalid_shape() {
        let registry = ShapeRegistry::new();
        let result = registry.register(Shape::new(""));
        assert!(matches!(result, Err(CacheError::InvalidShape(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_register_same_shape() {
        let registry = ShapeRegistry::new();
        let descriptors: Vec<Descriptor> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| registry.register(person()).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(descriptors.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registries_never_share_generation() {
        let generations: HashSet<u32> = (0..64).map(|_| ShapeRegistry::new().generation).collect();
        assert_eq!(generations.len(), 64);
        assert!(!generations.contains(&0));
    }

    #[test]
    fn test_run_hash_differs_for_same_pid_and_clock() {
        // A restart under the same PID with an identical clock reading
        assert_ne!(hash_run(1, 0), hash_run(1, 0));
    }

    #[test]
    fn test_descriptor_from_previous_run_is_unknown() {
        let registry = ShapeRegistry::new();
        let descriptor = registry.register(person()).unwrap();

        let previous_run = hash_run(std::process::id(), 0).wrapping_add(1).max(1);
        assert_ne!(previous_run, registry.generation);
        let stale = Descriptor::new(previous_run, descriptor.slot());
        assert_eq!(
            registry.resolve(stale),
            Err(CacheError::UnknownDescriptor(stale))
        );
    }
}
