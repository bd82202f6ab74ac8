//! Binary encoding/decoding of values against a shape.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! value  := tag payload
//! bool   := u8 (0 or 1)
//! i32/u32/f32 := 4 bytes, i64/u64/f64 := 8 bytes
//! text/bytes  := u32 length, then `length` bytes
//! seq    := u32 count, then `count` values
//! struct := each field value in shape order (no names)
//! ```
//!
//! The shape is never written; it arrives out of band with the descriptor.

use crate::codec::Value;
use crate::shape::{Kind, Shape};

const TAG_BOOL: u8 = 0x01;
const TAG_I32: u8 = 0x02;
const TAG_I64: u8 = 0x03;
const TAG_U32: u8 = 0x04;
const TAG_U64: u8 = 0x05;
const TAG_F32: u8 = 0x06;
const TAG_F64: u8 = 0x07;
const TAG_TEXT: u8 = 0x08;
const TAG_BYTES: u8 = 0x09;
const TAG_SEQ: u8 = 0x0a;
const TAG_STRUCT: u8 = 0x0b;

fn tag_of(kind: &Kind) -> u8 {
    match kind {
        Kind::Bool => TAG_BOOL,
        Kind::I32 => TAG_I32,
        Kind::I64 => TAG_I64,
        Kind::U32 => TAG_U32,
        Kind::U64 => TAG_U64,
        Kind::F32 => TAG_F32,
        Kind::F64 => TAG_F64,
        Kind::Text => TAG_TEXT,
        Kind::Bytes => TAG_BYTES,
        Kind::Seq { .. } => TAG_SEQ,
        Kind::Struct { .. } => TAG_STRUCT,
    }
}

/// Encodes a struct value against `shape`.
pub(crate) fn encode_struct(value: &Value, shape: &Shape) -> Result<Vec<u8>, String> {
    let mut encoder = Encoder::default();
    encoder.write_struct(value, shape)?;
    Ok(encoder.buffer)
}

/// Decodes a struct value of `shape`, rejecting trailing bytes.
pub(crate) fn decode_struct(bytes: &[u8], shape: &Shape) -> Result<Value, String> {
    let mut decoder = Decoder::new(bytes);
    let value = decoder.read_struct(shape)?;
    if decoder.remaining() != 0 {
        return Err(format!(
            "{} trailing bytes after {}",
            decoder.remaining(),
            shape.name
        ));
    }
    Ok(value)
}

// == Encoder ==
#[derive(Default)]
struct Encoder {
    buffer: Vec<u8>,
}

impl Encoder {
    fn write_len(&mut self, len: usize) -> Result<(), String> {
        let len = u32::try_from(len).map_err(|_| format!("length {} exceeds u32", len))?;
        self.buffer.extend_from_slice(&len.to_le_bytes());
        Ok(())
    }

    fn write_struct(&mut self, value: &Value, shape: &Shape) -> Result<(), String> {
        let Value::Struct(fields) = value else {
            return Err(format!(
                "{}: expected struct, found {}",
                shape.name,
                value.kind_name()
            ));
        };

        if let Some(extra) = fields
            .keys()
            .find(|name| !shape.fields.iter().any(|f| &f.name == *name))
        {
            return Err(format!("{}: field '{}' is not in the shape", shape.name, extra));
        }

        self.buffer.push(TAG_STRUCT);
        for field in &shape.fields {
            let field_value = fields
                .get(&field.name)
                .ok_or_else(|| format!("{}: missing field '{}'", shape.name, field.name))?;
            self.write_value(field_value, &field.kind)
                .map_err(|e| format!("{}.{}: {}", shape.name, field.name, e))?;
        }
        Ok(())
    }

    fn write_value(&mut self, value: &Value, kind: &Kind) -> Result<(), String> {
        match (value, kind) {
            (Value::Struct(_), Kind::Struct { shape }) => return self.write_struct(value, shape),
            (Value::Bool(v), Kind::Bool) => {
                self.buffer.push(TAG_BOOL);
                self.buffer.push(u8::from(*v));
            }
            (Value::I32(v), Kind::I32) => {
                self.buffer.push(TAG_I32);
                self.buffer.extend_from_slice(&v.to_le_bytes());
            }
            (Value::I64(v), Kind::I64) => {
                self.buffer.push(TAG_I64);
                self.buffer.extend_from_slice(&v.to_le_bytes());
            }
            (Value::U32(v), Kind::U32) => {
                self.buffer.push(TAG_U32);
                self.buffer.extend_from_slice(&v.to_le_bytes());
            }
            (Value::U64(v), Kind::U64) => {
                self.buffer.push(TAG_U64);
                self.buffer.extend_from_slice(&v.to_le_bytes());
            }
            (Value::F32(v), Kind::F32) => {
                self.buffer.push(TAG_F32);
                self.buffer.extend_from_slice(&v.to_le_bytes());
            }
            (Value::F64(v), Kind::F64) => {
                self.buffer.push(TAG_F64);
                self.buffer.extend_from_slice(&v.to_le_bytes());
            }
            (Value::Text(v), Kind::Text) => {
                self.buffer.push(TAG_TEXT);
                self.write_len(v.len())?;
                self.buffer.extend_from_slice(v.as_bytes());
            }
            (Value::Bytes(v), Kind::Bytes) => {
                self.buffer.push(TAG_BYTES);
                self.write_len(v.len())?;
                self.buffer.extend_from_slice(v);
            }
            (Value::Seq(items), Kind::Seq { element }) => {
                self.buffer.push(TAG_SEQ);
                self.write_len(items.len())?;
                for (i, item) in items.iter().enumerate() {
                    self.write_value(item, element)
                        .map_err(|e| format!("[{}]: {}", i, e))?;
                }
            }
            _ => {
                return Err(format!(
                    "expected {}, found {}",
                    kind.name(),
                    value.kind_name()
                ))
            }
        }
        Ok(())
    }
}

// == Decoder ==
struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], String> {
        if self.remaining() < n {
            return Err(format!(
                "truncated: need {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.remaining()
            ));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], String> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_len(&mut self) -> Result<usize, String> {
        Ok(u32::from_le_bytes(self.take_array()?) as usize)
    }

    fn expect_tag(&mut self, kind: &Kind) -> Result<(), String> {
        let offset = self.pos;
        let [tag] = self.take_array::<1>()?;
        if tag != tag_of(kind) {
            return Err(format!(
                "tag {:#04x} at offset {} does not match {}",
                tag,
                offset,
                kind.name()
            ));
        }
        Ok(())
    }

    fn read_struct(&mut self, shape: &Shape) -> Result<Value, String> {
        let offset = self.pos;
        let [tag] = self.take_array::<1>()?;
        if tag != TAG_STRUCT {
            return Err(format!(
                "tag {:#04x} at offset {} does not match struct {}",
                tag, offset, shape.name
            ));
        }

        let mut fields = std::collections::BTreeMap::new();
        for field in &shape.fields {
            let value = self
                .read_value(&field.kind)
                .map_err(|e| format!("{}.{}: {}", shape.name, field.name, e))?;
            fields.insert(field.name.clone(), value);
        }
        Ok(Value::Struct(fields))
    }

    fn read_value(&mut self, kind: &Kind) -> Result<Value, String> {
        if let Kind::Struct { shape } = kind {
            return self.read_struct(shape);
        }

        self.expect_tag(kind)?;
        let value = match kind {
            Kind::Bool => match self.take_array::<1>()? {
                [0] => Value::Bool(false),
                [1] => Value::Bool(true),
                [other] => return Err(format!("invalid bool byte {:#04x}", other)),
            },
            Kind::I32 => Value::I32(i32::from_le_bytes(self.take_array()?)),
            Kind::I64 => Value::I64(i64::from_le_bytes(self.take_array()?)),
            Kind::U32 => Value::U32(u32::from_le_bytes(self.take_array()?)),
            Kind::U64 => Value::U64(u64::from_le_bytes(self.take_array()?)),
            Kind::F32 => Value::F32(f32::from_le_bytes(self.take_array()?)),
            Kind::F64 => Value::F64(f64::from_le_bytes(self.take_array()?)),
            Kind::Text => {
                let len = self.read_len()?;
                let raw = self.take(len)?;
                let text = std::str::from_utf8(raw).map_err(|e| format!("invalid utf-8: {}", e))?;
                Value::Text(text.to_string())
            }
            Kind::Bytes => {
                let len = self.read_len()?;
                Value::Bytes(self.take(len)?.to_vec())
            }
            Kind::Seq { element } => {
                let count = self.read_len()?;
                // Every element carries at least its tag byte
                if count > self.remaining() {
                    return Err(format!(
                        "sequence of {} elements exceeds remaining {} bytes",
                        count,
                        self.remaining()
                    ));
                }
                let mut items = Vec::with_capacity(count);
                for i in 0..count {
                    items.push(
                        self.read_value(element)
                            .map_err(|e| format!("[{}]: {}", i, e))?,
                    );
                }
                Value::Seq(items)
            }
            Kind::Struct { .. } => unreachable!("handled above"),
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> Shape {
        Shape::new("Person")
            .field("Name", Kind::Text)
            .field("Age", Kind::I64)
    }

    fn mike() -> Value {
        Value::record([("Name", Value::Text("mike".into())), ("Age", Value::I64(123))])
    }

    #[test]
    fn test_person_layout() {
        let bytes = encode_struct(&mike(), &person()).unwrap();

        let mut expected = vec![TAG_STRUCT, TAG_TEXT, 4, 0, 0, 0];
        expected.extend_from_slice(b"mike");
        expected.push(TAG_I64);
        expected.extend_from_slice(&123i64.to_le_bytes());
        assert_eq!(bytes, expected);

        assert_eq!(decode_struct(&bytes, &person()).unwrap(), mike());
    }

    #[test]
    fn test_field_names_not_encoded() {
        let bytes = encode_struct(&mike(), &person()).unwrap();
        assert!(!bytes.windows(4).any(|w| w == b"Name"));
    }

    #[test]
    fn test_encode_kind_mismatch() {
        let value = Value::record([("Name", Value::I64(1)), ("Age", Value::I64(123))]);
        let err = encode_struct(&value, &person()).unwrap_err();
        assert!(err.contains("Person.Name"));
        assert!(err.contains("expected text, found i64"));
    }

    #[test]
    fn test_encode_missing_and_extra_fields() {
        let missing = Value::record([("Name", Value::Text("mike".into()))]);
        assert!(encode_struct(&missing, &person())
            .unwrap_err()
            .contains("missing field 'Age'"));

        let extra = Value::record([
            ("Name", Value::Text("mike".into())),
            ("Age", Value::I64(1)),
            ("Email", Value::Text("m@x".into())),
        ]);
        assert!(encode_struct(&extra, &person())
            .unwrap_err()
            .contains("'Email' is not in the shape"));
    }

    #[test]
    fn test_decode_truncated() {
        let bytes = encode_struct(&mike(), &person()).unwrap();
        for cut in 0..bytes.len() {
            assert!(
                decode_struct(&bytes[..cut], &person()).is_err(),
                "prefix of {} bytes decoded",
                cut
            );
        }
    }

    #[test]
    fn test_decode_trailing_bytes() {
        let mut bytes = encode_struct(&mike(), &person()).unwrap();
        bytes.push(0);
        assert!(decode_struct(&bytes, &person())
            .unwrap_err()
            .contains("trailing"));
    }

    #[test]
    fn test_decode_tag_mismatch() {
        let mut bytes = encode_struct(&mike(), &person()).unwrap();
        bytes[1] = TAG_BYTES;
        let err = decode_struct(&bytes, &person()).unwrap_err();
        assert!(err.contains("does not match text"));
    }

    #[test]
    fn test_decode_invalid_bool() {
        let shape = Shape::new("Flag").field("on", Kind::Bool);
        let err = decode_struct(&[TAG_STRUCT, TAG_BOOL, 2], &shape).unwrap_err();
        assert!(err.contains("invalid bool"));
    }

    #[test]
    fn test_decode_oversized_sequence_count() {
        let shape = Shape::new("List").field("items", Kind::seq(Kind::U32));
        let mut bytes = vec![TAG_STRUCT, TAG_SEQ];
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        let err = decode_struct(&bytes, &shape).unwrap_err();
        assert!(err.contains("exceeds remaining"));
    }

    #[test]
    fn test_nested_round_trip() {
        let entity = Shape::new("Entity")
            .field("x", Kind::F32)
            .field("y", Kind::F32);
        let world = Shape::new("World").field("entities", Kind::seq(Kind::structure(entity)));

        let value = Value::record([(
            "entities",
            Value::Seq(vec![
                Value::record([("x", Value::F32(0.0)), ("y", Value::F32(4.0))]),
                Value::record([("x", Value::F32(10.0)), ("y", Value::F32(20.5))]),
            ]),
        )]);

        let bytes = encode_struct(&value, &world).unwrap();
        assert_eq!(decode_struct(&bytes, &world).unwrap(), value);
    }
}
