//! Compile-time bindings between Rust types and shapes.
//!
//! `FieldValue` converts a Rust type to and from `Value`; `Record` adds the
//! shape of a struct. The `record!` macro generates both for plain structs.

use crate::codec::Value;
use crate::shape::{Kind, Shape};

/// A Rust type that maps onto one `Kind`.
pub trait FieldValue: Sized {
    fn kind() -> Kind;
    fn to_value(&self) -> Value;
    fn from_value(value: Value) -> Result<Self, String>;
}

/// A Rust struct with a registered shape.
pub trait Record: FieldValue {
    fn shape() -> Shape;
}

macro_rules! scalar_field {
    ($ty:ty, $kind:ident) => {
        impl FieldValue for $ty {
            fn kind() -> Kind {
                Kind::$kind
            }

            fn to_value(&self) -> Value {
                Value::$kind(self.clone())
            }

            fn from_value(value: Value) -> Result<Self, String> {
                match value {
                    Value::$kind(v) => Ok(v),
                    other => Err(format!(
                        "expected {}, found {}",
                        Kind::$kind.name(),
                        other.kind_name()
                    )),
                }
            }
        }
    };
}

scalar_field!(bool, Bool);
scalar_field!(i32, I32);
scalar_field!(i64, I64);
scalar_field!(u32, U32);
scalar_field!(u64, U64);
scalar_field!(f32, F32);
scalar_field!(f64, F64);
scalar_field!(String, Text);

/// Raw bytes field. `Vec<u8>` would map to a sequence of integers; this
/// maps to `Kind::Bytes`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bytes(pub Vec<u8>);

impl From<Vec<u8>> for Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes(bytes)
    }
}

impl AsRef<[u8]> for Bytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FieldValue for Bytes {
    fn kind() -> Kind {
        Kind::Bytes
    }

    fn to_value(&self) -> Value {
        Value::Bytes(self.0.clone())
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Bytes(bytes) => Ok(Bytes(bytes)),
            other => Err(format!(
                "expected {}, found {}",
                Kind::Bytes.name(),
                other.kind_name()
            )),
        }
    }
}

impl<T: FieldValue> FieldValue for Vec<T> {
    fn kind() -> Kind {
        Kind::seq(T::kind())
    }

    fn to_value(&self) -> Value {
        Value::Seq(self.iter().map(FieldValue::to_value).collect())
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Seq(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| T::from_value(item).map_err(|e| format!("[{}]: {}", i, e)))
                .collect(),
            other => Err(format!("expected seq, found {}", other.kind_name())),
        }
    }
}

/// Declares a struct and implements `FieldValue` and `Record` for it.
///
/// ```
/// ccache::record! {
///     #[derive(Debug, PartialEq)]
///     pub struct Person {
///         pub name: String,
///         pub age: i64,
///     }
/// }
///
/// use ccache::codec::Record;
/// assert_eq!(Person::shape().fields.len(), 2);
/// ```
#[macro_export]
macro_rules! record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $($fvis:vis $field:ident : $ty:ty),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $($fvis $field: $ty),*
        }

        impl $crate::codec::FieldValue for $name {
            fn kind() -> $crate::shape::Kind {
                $crate::shape::Kind::Struct {
                    shape: <Self as $crate::codec::Record>::shape(),
                }
            }

            fn to_value(&self) -> $crate::codec::Value {
                #[allow(unused_mut)]
                let mut fields = ::std::collections::BTreeMap::new();
                $(
                    fields.insert(
                        stringify!($field).to_string(),
                        $crate::codec::FieldValue::to_value(&self.$field),
                    );
                )*
                $crate::codec::Value::Struct(fields)
            }

            fn from_value(value: $crate::codec::Value) -> ::std::result::Result<Self, String> {
                #[allow(unused_mut, unused_variables)]
                let mut fields = match value {
                    $crate::codec::Value::Struct(fields) => fields,
                    other => {
                        return Err(format!(
                            "{}: expected struct, found {}",
                            stringify!($name),
                            other.kind_name()
                        ))
                    }
                };
                Ok(Self {
                    $(
                        $field: {
                            let raw = fields.remove(stringify!($field)).ok_or_else(|| {
                                format!("{}: missing field '{}'", stringify!($name), stringify!($field))
                            })?;
                            <$ty as $crate::codec::FieldValue>::from_value(raw).map_err(|e| {
                                format!("{}.{}: {}", stringify!($name), stringify!($field), e)
                            })?
                        },
                    )*
                })
            }
        }

        impl $crate::codec::Record for $name {
            fn shape() -> $crate::shape::Shape {
                $crate::shape::Shape::new(stringify!($name))
                    $(.field(stringify!($field), <$ty as $crate::codec::FieldValue>::kind()))*
            }
        }
    };
}
