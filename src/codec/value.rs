//! Dynamic values and their JSON bridge.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value as Json};

use crate::shape::{Kind, Shape};

/// A value of any registered shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Seq(Vec<Value>),
    Struct(BTreeMap<String, Value>),
}

impl Value {
    /// Builds a struct value from `(field, value)` pairs.
    pub fn record<'a>(fields: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        Value::Struct(
            fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        )
    }

    /// Looks up a field of a struct value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            Value::Struct(fields) => fields.get(field),
            _ => None,
        }
    }

    /// Short name of the runtime kind, matching `Kind::name`.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Seq(_) => "seq",
            Value::Struct(_) => "struct",
        }
    }

    // == JSON Bridge ==
    /// Converts a JSON document into a value of `shape`.
    ///
    /// Used by hosts that cannot build binary buffers themselves. Every shape
    /// field must be present and no other keys are allowed.
    pub fn from_json(json: &Json, shape: &Shape) -> Result<Value, String> {
        from_json_struct(json, shape)
    }

    /// Converts the value into JSON.
    ///
    /// Bytes become arrays of numbers; non-finite floats become `null`.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Bool(v) => Json::Bool(*v),
            Value::I32(v) => Json::from(*v),
            Value::I64(v) => Json::from(*v),
            Value::U32(v) => Json::from(*v),
            Value::U64(v) => Json::from(*v),
            Value::F32(v) => Number::from_f64(f64::from(*v)).map_or(Json::Null, Json::Number),
            Value::F64(v) => Number::from_f64(*v).map_or(Json::Null, Json::Number),
            Value::Text(v) => Json::String(v.clone()),
            Value::Bytes(v) => Json::Array(v.iter().map(|b| Json::from(*b)).collect()),
            Value::Seq(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Struct(fields) => Json::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect::<Map<String, Json>>(),
            ),
        }
    }
}

fn from_json_struct(json: &Json, shape: &Shape) -> Result<Value, String> {
    let object = json
        .as_object()
        .ok_or_else(|| format!("{}: expected object", shape.name))?;

    if let Some(extra) = object
        .keys()
        .find(|key| !shape.fields.iter().any(|f| &f.name == *key))
    {
        return Err(format!("{}: unknown field '{}'", shape.name, extra));
    }

    let mut fields = BTreeMap::new();
    for field in &shape.fields {
        let raw = object
            .get(&field.name)
            .ok_or_else(|| format!("{}: missing field '{}'", shape.name, field.name))?;
        let value = from_json_kind(raw, &field.kind)
            .map_err(|e| format!("{}.{}: {}", shape.name, field.name, e))?;
        fields.insert(field.name.clone(), value);
    }
    Ok(Value::Struct(fields))
}

fn from_json_kind(json: &Json, kind: &Kind) -> Result<Value, String> {
    let mismatch = || format!("expected {}, found {}", kind.name(), json);

    let value = match kind {
        Kind::Bool => Value::Bool(json.as_bool().ok_or_else(mismatch)?),
        Kind::I32 => Value::I32(
            json.as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(mismatch)?,
        ),
        Kind::I64 => Value::I64(json.as_i64().ok_or_else(mismatch)?),
        Kind::U32 => Value::U32(
            json.as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(mismatch)?,
        ),
        Kind::U64 => Value::U64(json.as_u64().ok_or_else(mismatch)?),
        Kind::F32 => Value::F32(json.as_f64().ok_or_else(mismatch)? as f32),
        Kind::F64 => Value::F64(json.as_f64().ok_or_else(mismatch)?),
        Kind::Text => Value::Text(json.as_str().ok_or_else(mismatch)?.to_string()),
        Kind::Bytes => Value::Bytes(
            json.as_array()
                .ok_or_else(mismatch)?
                .iter()
                .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()
                .ok_or_else(mismatch)?,
        ),
        Kind::Seq { element } => Value::Seq(
            json.as_array()
                .ok_or_else(mismatch)?
                .iter()
                .enumerate()
                .map(|(i, item)| from_json_kind(item, element).map_err(|e| format!("[{}]: {}", i, e)))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Kind::Struct { shape } => from_json_struct(json, shape)?,
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person() -> Shape {
        Shape::new("Person")
            .field("Name", Kind::Text)
            .field("Age", Kind::I64)
    }

    #[test]
    fn test_from_json_person() {
        let value = Value::from_json(&json!({"Name": "mike", "Age": 123}), &person()).unwrap();
        assert_eq!(
            value,
            Value::record([("Name", Value::Text("mike".into())), ("Age", Value::I64(123))])
        );
    }

    #[test]
    fn test_from_json_missing_field() {
        let err = Value::from_json(&json!({"Name": "mike"}), &person()).unwrap_err();
        assert!(err.contains("missing field 'Age'"));
    }

    #[test]
    fn test_from_json_unknown_field() {
        let err = Value::from_json(&json!({"Name": "mike", "Age": 1, "Extra": 2}), &person())
            .unwrap_err();
        assert!(err.contains("unknown field 'Extra'"));
    }

    #[test]
    fn test_from_json_out_of_range() {
        let shape = Shape::new("Small").field("v", Kind::I32);
        let err = Value::from_json(&json!({"v": 1u64 << 40}), &shape).unwrap_err();
        assert!(err.contains("expected i32"));
    }

    #[test]
    fn test_from_json_bytes_and_seq() {
        let shape = Shape::new("Blob")
            .field("raw", Kind::Bytes)
            .field("tags", Kind::seq(Kind::Text));
        let value = Value::from_json(&json!({"raw": [0, 255], "tags": ["a", "b"]}), &shape).unwrap();

        assert_eq!(value.get("raw"), Some(&Value::Bytes(vec![0, 255])));
        assert_eq!(
            value.get("tags"),
            Some(&Value::Seq(vec![Value::Text("a".into()), Value::Text("b".into())]))
        );
    }

    #[test]
    fn test_to_json_round_trip() {
        let doc = json!({"Name": "mike", "Age": 123});
        let value = Value::from_json(&doc, &person()).unwrap();
        assert_eq!(value.to_json(), doc);
    }

    #[test]
    fn test_to_json_non_finite_float() {
        assert_eq!(Value::F64(f64::NAN).to_json(), Json::Null);
    }
}
