//! Loosely typed uniform values as they arrive from a definition, and the
//! strongly typed buffers they are normalized into.

use serde::de::{self, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use std::fmt;

use super::types::ScalarKind;

/// A raw value from the definition file.
///
/// Only the numeric variants and sequences of them can be normalized; the
/// rest exist so the normalizer can name what it was given.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RawValue {
    Float(f64),
    Int(i64),
    Uint(u64),
    Sequence(Vec<RawValue>),
    Bool(bool),
    Text(String),
    #[default]
    Null,
    Mapping,
}

impl RawValue {
    /// Human readable kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            RawValue::Float(_) => "float",
            RawValue::Int(_) => "int",
            RawValue::Uint(_) => "uint",
            RawValue::Sequence(_) => "sequence",
            RawValue::Bool(_) => "bool",
            RawValue::Text(_) => "string",
            RawValue::Null => "null",
            RawValue::Mapping => "mapping",
        }
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Float(v)
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        RawValue::Int(v)
    }
}

impl From<u64> for RawValue {
    fn from(v: u64) -> Self {
        RawValue::Uint(v)
    }
}

impl<T: Into<RawValue>> From<Vec<T>> for RawValue {
    fn from(v: Vec<T>) -> Self {
        RawValue::Sequence(v.into_iter().map(Into::into).collect())
    }
}

struct RawValueVisitor;

impl<'de> Visitor<'de> for RawValueVisitor {
    type Value = RawValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number or a sequence of numbers")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<RawValue, E> {
        Ok(RawValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<RawValue, E> {
        Ok(RawValue::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<RawValue, E> {
        Ok(RawValue::Uint(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<RawValue, E> {
        Ok(RawValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<RawValue, E> {
        Ok(RawValue::Text(v.to_string()))
    }

    fn visit_unit<E: de::Error>(self) -> Result<RawValue, E> {
        Ok(RawValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<RawValue, E> {
        Ok(RawValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<RawValue, D::Error> {
        RawValue::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<RawValue, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(RawValue::Sequence(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<RawValue, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(RawValue::Mapping)
    }
}

impl<'de> Deserialize<'de> for RawValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RawValueVisitor)
    }
}

/// A normalized uniform: a flat run of scalars of one kind.
///
/// The length is always a whole number of elements of the declared vector
/// width.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(Vec<f32>),
    Int(Vec<i32>),
    Uint(Vec<u32>),
}

impl UniformValue {
    pub fn scalar_kind(&self) -> ScalarKind {
        match self {
            UniformValue::Float(_) => ScalarKind::Float,
            UniformValue::Int(_) => ScalarKind::Int,
            UniformValue::Uint(_) => ScalarKind::Uint,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            UniformValue::Float(v) => v.len(),
            UniformValue::Int(v) => v.len(),
            UniformValue::Uint(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Little-endian bytes of the whole value.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            UniformValue::Float(v) => bytemuck::cast_slice(v),
            UniformValue::Int(v) => bytemuck::cast_slice(v),
            UniformValue::Uint(v) => bytemuck::cast_slice(v),
        }
    }
}
