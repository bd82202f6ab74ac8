//! Shape Module
//!
//! Runtime descriptions of value layouts and the registry that hands out
//! boundary-safe descriptors for them.

mod registry;

pub use registry::ShapeRegistry;

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

// == Kind ==
/// The kind of a single field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Kind {
    Bool,
    I32,
    I64,
    U32,
    U64,
    F32,
    F64,
    Text,
    Bytes,
    /// Variable-length sequence of one element kind
    Seq { element: Box<Kind> },
    /// Nested structured value
    Struct { shape: Shape },
}

impl Kind {
    /// Short name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Kind::Bool => "bool",
            Kind::I32 => "i32",
            Kind::I64 => "i64",
            Kind::U32 => "u32",
            Kind::U64 => "u64",
            Kind::F32 => "f32",
            Kind::F64 => "f64",
            Kind::Text => "text",
            Kind::Bytes => "bytes",
            Kind::Seq { .. } => "seq",
            Kind::Struct { .. } => "struct",
        }
    }

    /// Convenience constructor for `Seq`.
    pub fn seq(element: Kind) -> Self {
        Kind::Seq {
            element: Box::new(element),
        }
    }

    /// Convenience constructor for `Struct`.
    pub fn structure(shape: Shape) -> Self {
        Kind::Struct { shape }
    }
}

// == Field ==
/// A named field inside a shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(flatten)]
    pub kind: Kind,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: Kind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

// == Shape ==
/// Structural description of a record: its name and ordered fields.
///
/// Two shapes are the same shape when name, field names, field order and
/// field kinds all match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    pub name: String,
    pub fields: Vec<Field>,
}

impl Shape {
    /// Starts an empty shape.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Appends a field, builder style.
    pub fn field(mut self, name: impl Into<String>, kind: Kind) -> Self {
        self.fields.push(Field::new(name, kind));
        self
    }

    /// Parses a shape from its JSON description.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::InvalidShape(e.to_string()))
    }

    /// Rejects empty names and duplicate field names, recursively.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(CacheError::InvalidShape("shape name is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(CacheError::InvalidShape(format!(
                    "{}: field name is empty",
                    self.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(CacheError::InvalidShape(format!(
                    "{}: duplicate field '{}'",
                    self.name, field.name
                )));
            }
            validate_kind(&field.kind)?;
        }
        Ok(())
    }
}

fn validate_kind(kind: &Kind) -> Result<()> {
    match kind {
        Kind::Seq { element } => validate_kind(element),
        Kind::Struct { shape } => shape.validate(),
        _ => Ok(()),
    }
}

// == Descriptor ==
/// Opaque, fixed-size handle to a registered shape.
///
/// High 32 bits carry the issuing registry's generation tag, low 32 bits
/// the 1-based slot. Zero is never issued.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Descriptor(u64);

impl Descriptor {
    pub(crate) fn new(generation: u32, slot: u32) -> Self {
        Self((u64::from(generation) << 32) | u64::from(slot))
    }

    /// Rebuilds a descriptor from a raw token received over the boundary.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw token for passing over the boundary.
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    pub(crate) fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub(crate) fn slot(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}
