//! The format-agnostic contract between application code and a wire.
//!
//! A [`Wire`] wraps one byte cursor and hands out a value sink
//! ([`ValueOut`]) for writing and a value source ([`ValueIn`]) for reading.
//! Both are views borrowing the wire exclusively, so one wire models a
//! single sequential pass; callers serialise access themselves.
//!
//! Operations a format cannot express return
//! [`WireError::Unsupported`](crate::WireError::Unsupported) immediately.
//! [`Wire::capabilities`] lists them up front so callers can choose another
//! encoding before writing anything.

use alloc::{collections::BTreeMap, string::String, vec::Vec};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use crate::{
    bytes::Bytes,
    comparator::OrdinalKey,
    error::Result,
    values::{Byteable, IntValue, LongArrayValues, LongValue},
};

pub mod query;

/// Anything that names a field.
pub trait WireKey {
    fn name(&self) -> &str;
}

impl WireKey for str {
    fn name(&self) -> &str {
        self
    }
}

impl WireKey for String {
    fn name(&self) -> &str {
        self
    }
}

impl WireKey for OrdinalKey {
    fn name(&self) -> &str {
        self.as_str()
    }
}

impl<K: WireKey + ?Sized> WireKey for &K {
    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Optional operations a format may or may not implement.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `bytes` as Base64 text.
    Base64Bytes,
    /// Embedding lock-guarded text references.
    Binding,
    Sequence,
    Structured,
    TypeName,
    /// Binary payloads without a text encoding.
    RawBytes,
    /// Type literals resolved by a class translator.
    TypeLiteral,
    Map,
    Comments,
    /// Copying a decoded document into another wire.
    CopyTo,
    /// Length-prefixed documents.
    LengthPrefix,
    /// Fields written without a name.
    AnonymousField,
}

/// The set of capabilities a wire supports.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Capabilities(&'static [Capability]);

impl Capabilities {
    #[must_use]
    pub const fn new(supported: &'static [Capability]) -> Self {
        Self(supported)
    }

    #[must_use]
    pub fn supports(self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn iter(self) -> impl Iterator<Item = Capability> {
        self.0.iter().copied()
    }
}

/// What [`ValueIn::read_as`] should produce.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(any(test, feature = "serde"), derive(serde::Serialize, serde::Deserialize))]
pub enum ValueKind {
    /// A generic tree of nested sequences and structures with text leaves.
    Structured,
    /// Text read into a caller-supplied buffer when one is given.
    TextBuilder,
    Text,
    Int64,
    Int32,
    Int16,
    Int8,
    Float32,
    Float64,
    Char,
    Bytes,
    Map,
}

/// A decoded or to-be-encoded value.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(any(test, feature = "serde"), derive(serde::Serialize, serde::Deserialize))]
pub enum WireValue {
    Null,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Char(char),
    Text(String),
    Bytes(Vec<u8>),
    Sequence(Vec<WireValue>),
    Structured(Vec<(String, WireValue)>),
    Map(BTreeMap<OrdinalKey, WireValue>),
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        Self::Text(value.into())
    }
}

impl From<i64> for WireValue {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<i32> for WireValue {
    fn from(value: i32) -> Self {
        Self::Int32(value)
    }
}

impl From<bool> for WireValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// The write side of a wire.
///
/// Every scalar write emits any pending separator, then the pending field
/// name, then the value. Writing `None` through [`bool`](Self::bool) or
/// [`text`](Self::text) emits nothing and drops the pending field.
pub trait ValueOut: Sized {
    /// Names the next value.
    fn write_field<K: WireKey + ?Sized>(&mut self, key: &K) -> &mut Self;

    /// The next value has no name, e.g. a sequence element.
    fn leaf(&mut self) -> &mut Self {
        self
    }

    fn bool(&mut self, value: Option<bool>) -> Result<()>;
    fn text(&mut self, value: Option<&str>) -> Result<()>;
    fn int8(&mut self, value: i8) -> Result<()>;
    fn uint8(&mut self, value: u8) -> Result<()>;
    fn int16(&mut self, value: i16) -> Result<()>;
    fn uint16(&mut self, value: u16) -> Result<()>;
    fn int32(&mut self, value: i32) -> Result<()>;
    fn uint32(&mut self, value: u32) -> Result<()>;
    fn int64(&mut self, value: i64) -> Result<()>;
    fn float32(&mut self, value: f32) -> Result<()>;
    fn float64(&mut self, value: f64) -> Result<()>;
    /// A single code point.
    fn utf8(&mut self, value: char) -> Result<()>;
    fn date(&mut self, value: NaiveDate) -> Result<()>;
    fn time(&mut self, value: NaiveTime) -> Result<()>;
    fn date_time(&mut self, value: DateTime<Utc>) -> Result<()>;
    fn uuid(&mut self, value: Uuid) -> Result<()>;
    /// A binary payload in the format's text encoding.
    fn bytes(&mut self, value: &[u8]) -> Result<()>;
    /// A binary payload embedded as-is.
    fn raw_bytes(&mut self, value: &[u8]) -> Result<()>;
    /// A type tag that prefixes the next value.
    fn type_name(&mut self, name: &str) -> Result<()>;
    fn type_literal(&mut self, name: &str) -> Result<()>;
    fn comment(&mut self, text: &str) -> Result<()>;

    /// Writes a lock-guarded `i32` record holding `value`. Readers bind to
    /// it with [`ValueIn::bound_int32`].
    fn int32_for_binding(&mut self, value: i32) -> Result<()>;
    fn int64_for_binding(&mut self, value: i64) -> Result<()>;
    /// Writes a zeroed lock-guarded array with room for `capacity` values.
    fn int64_array_for_binding(&mut self, capacity: usize) -> Result<()>;

    fn sequence<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>;

    fn structured<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>;

    fn map(&mut self, value: &BTreeMap<OrdinalKey, WireValue>) -> Result<()>;

    /// A structure prefixed by its type tag.
    fn typed_structured<F>(&mut self, type_name: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.type_name(type_name)?;
        self.structured(f)
    }

    /// Writes any [`WireValue`]. `Null` behaves like `text(None)`.
    fn object(&mut self, value: &WireValue) -> Result<()> {
        match value {
            WireValue::Null => self.text(None),
            WireValue::Bool(v) => self.bool(Some(*v)),
            WireValue::Int8(v) => self.int8(*v),
            WireValue::Int16(v) => self.int16(*v),
            WireValue::Int32(v) => self.int32(*v),
            WireValue::Int64(v) => self.int64(*v),
            WireValue::Float32(v) => self.float32(*v),
            WireValue::Float64(v) => self.float64(*v),
            WireValue::Char(v) => self.utf8(*v),
            WireValue::Text(v) => self.text(Some(v.as_str())),
            WireValue::Bytes(v) => self.bytes(v),
            WireValue::Sequence(items) => self.sequence(|out| {
                items.iter().try_for_each(|item| out.leaf().object(item))
            }),
            WireValue::Structured(fields) => self.structured(|out| {
                fields
                    .iter()
                    .try_for_each(|(name, item)| out.write_field(name).object(item))
            }),
            WireValue::Map(map) => self.map(map),
        }
    }
}

/// The read side of a wire.
pub trait ValueIn: Sized {
    /// The format's lock-guarded `i32` reference.
    type IntRef: IntValue + Byteable;
    type LongRef: LongValue + Byteable;
    type LongArrayRef: LongArrayValues + Byteable;

    /// Positions the source at the value of field `key`.
    ///
    /// # Errors
    ///
    /// [`WireError::UnorderedField`](crate::WireError::UnorderedField) if
    /// the next field has another name. The cursor is left where it was.
    fn read_field<K: WireKey + ?Sized>(&mut self, key: &K) -> Result<&mut Self>;

    /// Consumes a null marker if one is next.
    fn is_null(&mut self) -> Result<bool>;
    fn bool(&mut self) -> Result<bool>;
    /// `None` when the value is null.
    fn text(&mut self) -> Result<Option<String>>;
    /// Replaces the contents of `buf`; returns `false` when the value is
    /// null, leaving `buf` empty.
    fn text_to(&mut self, buf: &mut String) -> Result<bool>;
    fn int8(&mut self) -> Result<i8>;
    fn uint8(&mut self) -> Result<u8>;
    fn int16(&mut self) -> Result<i16>;
    fn uint16(&mut self) -> Result<u16>;
    fn int32(&mut self) -> Result<i32>;
    fn uint32(&mut self) -> Result<u32>;
    fn int64(&mut self) -> Result<i64>;
    fn float32(&mut self) -> Result<f32>;
    fn float64(&mut self) -> Result<f64>;
    fn date(&mut self) -> Result<NaiveDate>;
    fn time(&mut self) -> Result<NaiveTime>;
    fn date_time(&mut self) -> Result<DateTime<Utc>>;
    fn uuid(&mut self) -> Result<Uuid>;
    fn bytes(&mut self) -> Result<Vec<u8>>;
    fn type_name(&mut self) -> Result<String>;

    /// Binds `slot` to the `i32` record at the cursor and moves past it. An
    /// empty slot gets a fresh reference; an occupied one is re-pointed.
    fn bound_int32(&mut self, slot: &mut Option<Self::IntRef>) -> Result<()>;
    fn bound_int64(&mut self, slot: &mut Option<Self::LongRef>) -> Result<()>;
    fn bound_int64_array(&mut self, slot: &mut Option<Self::LongArrayRef>) -> Result<()>;

    fn sequence<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>;

    /// Whether another element follows inside a sequence.
    fn has_next_sequence_item(&mut self) -> Result<bool>;

    fn structured<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>;

    fn map(&mut self) -> Result<BTreeMap<OrdinalKey, WireValue>>;

    /// Whether any input is left.
    fn has_next(&mut self) -> bool;

    /// Reads the next value as `kind`. `using` may carry a buffer to reuse,
    /// e.g. a `WireValue::Text` for [`ValueKind::TextBuilder`].
    fn read_as(&mut self, kind: ValueKind, using: Option<WireValue>) -> Result<WireValue>;
}

/// A byte cursor paired with a value sink and a value source.
pub trait Wire {
    type Out<'w>: ValueOut
    where
        Self: 'w;
    type In<'w>: ValueIn
    where
        Self: 'w;

    /// A sink whose next value is named `key`.
    fn write<K: WireKey + ?Sized>(&mut self, key: &K) -> Self::Out<'_>;
    /// A sink for an unnamed value.
    fn write_value(&mut self) -> Self::Out<'_>;
    /// A source positioned at the value of field `key`.
    fn read<K: WireKey + ?Sized>(&mut self, key: &K) -> Result<Self::In<'_>>;
    /// Reads whatever field comes next, storing its name in `name`.
    fn read_any_field(&mut self, name: &mut String) -> Result<Self::In<'_>>;
    /// A source at the cursor, without reading a field name.
    fn read_value(&mut self) -> Self::In<'_>;

    /// Resets the cursor and all sink/source state for a new write pass.
    fn clear(&mut self);
    /// Rewinds reading to the start of what was written.
    fn flip(&mut self);
    fn bytes(&self) -> &Bytes;
    fn capabilities(&self) -> Capabilities;
}
