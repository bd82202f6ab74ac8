//! Codec Module
//!
//! Encodes values into compact buffers and back, using the shape behind a
//! descriptor. Buffers hold only field values; type information always
//! travels separately as the descriptor.

mod buffer;
mod record;
mod value;
mod wire;


pub use buffer::SerializedBuffer;
pub use record::{Bytes, FieldValue, Record};
pub use value::Value;

use std::sync::Arc;

use crate::error::{CacheError, Result};
use crate::shape::{Descriptor, Shape, ShapeRegistry};

// == Codec ==
/// Encoder/decoder bound to a shape registry.
#[derive(Debug, Clone)]
pub struct Codec {
    registry: Arc<ShapeRegistry>,
}

impl Codec {
    pub fn new(registry: Arc<ShapeRegistry>) -> Self {
        Self { registry }
    }

    /// Codec over the process-wide registry.
    pub fn global() -> Self {
        Self::new(ShapeRegistry::global().clone())
    }

    pub fn registry(&self) -> &Arc<ShapeRegistry> {
        &self.registry
    }

    // == Encode ==
    /// Encodes `value` with the shape behind `descriptor`.
    ///
    /// Fails with `Encode` when a field is missing, unknown or of the wrong
    /// kind.
    pub fn encode(&self, value: &Value, descriptor: Descriptor) -> Result<SerializedBuffer> {
        let shape = self.registry.resolve(descriptor)?;
        encode_with_shape(value, &shape)
    }

    // == Decode ==
    /// Decodes a buffer with the shape behind `descriptor`.
    ///
    /// Fails with `Decode` on truncated or malformed input.
    pub fn decode(&self, bytes: impl AsRef<[u8]>, descriptor: Descriptor) -> Result<Value> {
        let shape = self.registry.resolve(descriptor)?;
        decode_with_shape(bytes.as_ref(), &shape)
    }

    /// Encodes a typed record, registering its shape on first use.
    pub fn encode_record<T: Record>(&self, record: &T) -> Result<(SerializedBuffer, Descriptor)> {
        let descriptor = self.registry.register(T::shape())?;
        let buffer = self.encode(&record.to_value(), descriptor)?;
        Ok((buffer, descriptor))
    }

    /// Decodes a typed record, checking the descriptor belongs to `T`.
    pub fn decode_record<T: Record>(
        &self,
        bytes: impl AsRef<[u8]>,
        descriptor: Descriptor,
    ) -> Result<T> {
        let expected = self.registry.register(T::shape())?;
        if expected != descriptor {
            return Err(CacheError::Decode(format!(
                "descriptor {} does not describe {}",
                descriptor,
                T::shape().name
            )));
        }
        let value = self.decode(bytes, descriptor)?;
        T::from_value(value).map_err(CacheError::Decode)
    }
}

/// Encodes against an already resolved shape.
pub fn encode_with_shape(value: &Value, shape: &Shape) -> Result<SerializedBuffer> {
    wire::encode_struct(value, shape)
        .map(SerializedBuffer::new)
        .map_err(CacheError::Encode)
}

/// Decodes against an already resolved shape.
pub fn decode_with_shape(bytes: &[u8], shape: &Shape) -> Result<Value> {
    wire::decode_struct(bytes, shape).map_err(CacheError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Kind;

    fn person() -> Shape {
        Shape::new("Person")
            .field("Name", Kind::Text)
            .field("Age", Kind::I64)
    }

    fn mike() -> Value {
        Value::record([("Name", Value::Text("mike".into())), ("Age", Value::I64(123))])
    }

    crate::record! {
        #[derive(Debug, PartialEq)]
        struct Point {
            x: i32,
            y: i32,
        }
    }

    #[test]
    fn test_encode_decode_through_descriptor() {
        let codec = Codec::new(Arc::new(ShapeRegistry::new()));
        let descriptor = codec.registry().register(person()).unwrap();

        let buffer = codec.encode(&mike(), descriptor).unwrap();
        assert_eq!(codec.decode(&buffer, descriptor).unwrap(), mike());
    }

    #[test]
    fn test_encode_unknown_descriptor() {
        let codec = Codec::new(Arc::new(ShapeRegistry::new()));
        let result = codec.encode(&mike(), Descriptor::from_raw(1));
        assert!(matches!(result, Err(CacheError::UnknownDescriptor(_))));
    }

    #[test]
    fn test_encode_mismatch_is_encode_error() {
        let codec = Codec::new(Arc::new(ShapeRegistry::new()));
        let descriptor = codec.registry().register(person()).unwrap();

        let result = codec.encode(&Value::record([("Name", Value::Bool(true))]), descriptor);
        assert!(matches!(result, Err(CacheError::Encode(_))));
    }

    #[test]
    fn test_decode_truncated_is_decode_error() {
        let codec = Codec::new(Arc::new(ShapeRegistry::new()));
        let descriptor = codec.registry().register(person()).unwrap();
        let buffer = codec.encode(&mike(), descriptor).unwrap();

        let result = codec.decode(&buffer.as_bytes()[..buffer.len() - 1], descriptor);
        assert!(matches!(result, Err(CacheError::Decode(_))));
    }

    #[test]
    fn test_record_round_trip() {
        let codec = Codec::new(Arc::new(ShapeRegistry::new()));
        let (buffer, descriptor) = codec.encode_record(&Point { x: -3, y: 7 }).unwrap();

        let point: Point = codec.decode_record(&buffer, descriptor).unwrap();
        assert_eq!(point, Point { x: -3, y: 7 });
    }

    crate::record! {
        #[derive(Debug, PartialEq)]
        struct Attachment {
            label: String,
            data: Bytes,
        }
    }

    #[test]
    fn test_record_with_bytes_round_trip() {
        let codec = Codec::new(Arc::new(ShapeRegistry::new()));
        let attachment = Attachment {
            label: "raw".to_string(),
            data: Bytes(vec![9, 0, 7]),
        };
        let (buffer, descriptor) = codec.encode_record(&attachment).unwrap();

        let decoded: Attachment = codec.decode_record(&buffer, descriptor).unwrap();
        assert_eq!(decoded, attachment);
    }

    #[test]
    fn test_decode_record_wrong_descriptor() {
        let codec = Codec::new(Arc::new(ShapeRegistry::new()));
        let descriptor = codec.registry().register(person()).unwrap();
        let buffer = codec.encode(&mike(), descriptor).unwrap();

        let result: Result<Point> = codec.decode_record(&buffer, descriptor);
        assert!(matches!(result, Err(CacheError::Decode(_))));
    }
}
