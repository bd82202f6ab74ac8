//! API Module
//!
//! The `Ccache` facade wiring registry, codec, marshaller and store together,
//! and the `extern "C"` surface built on it.
//!
//! # Entry points
//! - `ccache_init` - Initialize the store (and logging)
//! - `ccache_register_shape` - Register a shape from its JSON description
//! - `ccache_insert` / `ccache_get` / `ccache_remove` - Store operations
//! - `ccache_buffer_release` - Free a buffer returned by the library
//! - `ccache_encode_json` / `ccache_decode_json` - Codec for hosts
//! - `ccache_stats_json` / `ccache_len` - Introspection

pub mod ffi;

use std::sync::Arc;

use tracing::info;

use crate::boundary::{BoundaryHandle, Marshaller};
use crate::cache::{CacheStats, CacheStore};
use crate::codec::{Codec, Record, Value};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::shape::{Descriptor, Shape, ShapeRegistry};

// == Ccache ==
/// A cache instance: the four components behind one handle.
#[derive(Debug)]
pub struct Ccache {
    config: Config,
    marshaller: Marshaller,
    store: CacheStore,
}

impl Ccache {
    /// Creates a cache over the given registry. The store starts uninitialized.
    pub fn new(config: Config, registry: Arc<ShapeRegistry>) -> Self {
        let marshaller = Marshaller::new(Codec::new(registry), &config);
        let store = CacheStore::new(config.initial_capacity);
        Self {
            config,
            marshaller,
            store,
        }
    }

    /// Creates a cache over the process-wide registry.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.clone(), ShapeRegistry::global().clone())
    }

    // == Init ==
    /// Readies the store. Idempotent.
    pub fn init(&self) {
        self.store.init();
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ShapeRegistry> {
        self.marshaller.codec().registry()
    }

    pub fn marshaller(&self) -> &Marshaller {
        &self.marshaller
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Registers a shape in this cache's registry.
    pub fn register(&self, shape: Shape) -> Result<Descriptor> {
        let name = shape.name.clone();
        let descriptor = self.registry().register(shape)?;
        info!(shape = %name, %descriptor, "shape available");
        Ok(descriptor)
    }

    // == Insert Value ==
    /// Encodes `value`, copies it across the boundary and stores it.
    ///
    /// The pin on the encoded bytes is held only while the store copies them.
    pub fn insert_value(&self, key: &str, value: &Value, descriptor: Descriptor) -> Result<()> {
        let exported = self.marshaller.export_value(value, descriptor)?;
        let handle = exported.handle();
        let buffer = self.marshaller.import_buffer(&handle, handle.len)?;
        self.store.insert(key, buffer, exported.descriptor())
    }

    // == Insert Encoded ==
    /// Stores a buffer the host already encoded.
    ///
    /// The bytes are copied out of the pinned region first, then checked
    /// against the descriptor's shape; a non-conforming payload is an
    /// `Encode` error and the prior entry for `key` stays intact.
    pub fn insert_encoded(
        &self,
        key: &str,
        handle: &BoundaryHandle,
        len: usize,
        descriptor: Descriptor,
    ) -> Result<()> {
        let buffer = self.marshaller.import_buffer(handle, len)?;
        self.marshaller
            .codec()
            .decode(&buffer, descriptor)
            .map_err(|err| match err {
                CacheError::Decode(msg) => CacheError::Encode(msg),
                other => other,
            })?;
        self.store.insert(key, buffer, descriptor)
    }

    // == Get Value ==
    /// Fetches and decodes the value under `key`.
    pub fn get_value(&self, key: &str) -> Result<(Value, Descriptor)> {
        let (buffer, descriptor) = self.store.get(key)?;
        let value = self.marshaller.import_value(buffer, descriptor)?;
        Ok((value, descriptor))
    }

    // == Typed Records ==
    /// Stores a typed record, registering its shape on first use.
    pub fn insert<T: Record>(&self, key: &str, record: &T) -> Result<Descriptor> {
        let descriptor = self.registry().register(T::shape())?;
        self.insert_value(key, &record.to_value(), descriptor)?;
        Ok(descriptor)
    }

    /// Fetches a typed record. Fails with `Decode` if the entry has a
    /// different shape.
    pub fn get<T: Record>(&self, key: &str) -> Result<T> {
        let (buffer, descriptor) = self.store.get(key)?;
        let record = self.marshaller.codec().decode_record(&buffer, descriptor);
        buffer.release();
        record
    }

    /// Removes the entry under `key`.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.store.remove(key)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Kind;

    crate::record! {
        #[derive(Debug, Clone, PartialEq)]
        struct Person {
            name: String,
            age: i64,
        }
    }

    crate::record! {
        #[derive(Debug, Clone, PartialEq)]
        struct Entity {
            x: f32,
            y: f32,
        }
    }

    crate::record! {
        #[derive(Debug, Clone, PartialEq)]
        struct World {
            entities: Vec<Entity>,
        }
    }

    fn cache() -> Ccache {
        let cache = Ccache::new(Config::default(), Arc::new(ShapeRegistry::new()));
        cache.init();
        cache
    }

    fn person_shape() -> Shape {
        Shape::new("Person")
            .field("Name", Kind::Text)
            .field("Age", Kind::I64)
    }

    #[test]
    fn test_person_scenario() {
        let cache = cache();
        let descriptor = cache.register(person_shape()).unwrap();
        let mike = Value::record([("Name", Value::Text("mike".into())), ("Age", Value::I64(123))]);

        cache.insert_value("a", &mike, descriptor).unwrap();
        let (value, got) = cache.get_value("a").unwrap();

        assert_eq!(value, mike);
        assert_eq!(got, descriptor);
        assert_eq!(cache.marshaller().live_pins(), 0);
    }

    #[test]
    fn test_not_ready_before_init() {
        let cache = Ccache::new(Config::default(), Arc::new(ShapeRegistry::new()));
        let result = cache.insert(
            "a",
            &Person {
                name: "mike".into(),
                age: 1,
            },
        );
        assert_eq!(result, Err(CacheError::NotReady));
        assert_eq!(cache.marshaller().live_pins(), 0);
    }

    #[test]
    fn test_typed_round_trip() {
        let cache = cache();
        let world = World {
            entities: vec![Entity { x: 0.0, y: 4.0 }, Entity { x: 10.0, y: 20.5 }],
        };

        cache.insert("some-key", &world).unwrap();
        assert_eq!(cache.get::<World>("some-key").unwrap(), world);
    }

    #[test]
    fn test_typed_get_wrong_shape() {
        let cache = cache();
        cache.insert("p", &Person { name: "a".into(), age: 2 }).unwrap();

        assert!(matches!(cache.get::<World>("p"), Err(CacheError::Decode(_))));
    }

    #[test]
    fn test_overwrite_returns_second_value() {
        let cache = cache();
        cache.insert("k", &Person { name: "first".into(), age: 1 }).unwrap();
        cache.insert("k", &Person { name: "second".into(), age: 2 }).unwrap();

        assert_eq!(cache.get::<Person>("k").unwrap().name, "second");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_missing_key() {
        let cache = cache();
        assert!(matches!(cache.get_value("missing"), Err(CacheError::KeyNotFound(_))));
    }

    #[test]
    fn test_encode_error_keeps_prior_entry() {
        let cache = cache();
        let descriptor = cache.register(person_shape()).unwrap();
        let mike = Value::record([("Name", Value::Text("mike".into())), ("Age", Value::I64(123))]);
        cache.insert_value("a", &mike, descriptor).unwrap();

        let bad = Value::record([("Name", Value::I64(5)), ("Age", Value::I64(1))]);
        assert!(matches!(
            cache.insert_value("a", &bad, descriptor),
            Err(CacheError::Encode(_))
        ));
        assert_eq!(cache.get_value("a").unwrap().0, mike);
    }

    #[test]
    fn test_insert_encoded_validates_payload() {
        let cache = cache();
        let descriptor = cache.register(person_shape()).unwrap();
        let garbage = [0xffu8, 0x00, 0x01];

        let pin = cache.marshaller().pin_slice(&garbage).unwrap();
        let result = cache.insert_encoded("g", &pin.handle(), garbage.len(), descriptor);
        assert!(matches!(result, Err(CacheError::Encode(_))));
        assert!(!cache.store().contains("g").unwrap());
    }

    #[test]
    fn test_insert_encoded_accepts_valid_payload() {
        let cache = cache();
        let descriptor = cache.register(person_shape()).unwrap();
        let mike = Value::record([("Name", Value::Text("mike".into())), ("Age", Value::I64(123))]);
        let encoded = cache.marshaller().codec().encode(&mike, descriptor).unwrap();

        let pin = cache.marshaller().pin_slice(encoded.as_bytes()).unwrap();
        cache
            .insert_encoded("m", &pin.handle(), encoded.len(), descriptor)
            .unwrap();
        drop(pin);

        assert_eq!(cache.get_value("m").unwrap().0, mike);
    }
}
