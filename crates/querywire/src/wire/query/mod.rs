//! The `key=value&key2=value2` text wire.
//!
//! ```text
//! id=7&name=Ada%20Lovelace&tags=[math,poetry,]&pos={x=1,y=2}&shape=Circle {r=3}
//! ```
//!
//! Top-level fields are separated by `&`, elements of `[...]` and fields of
//! `{...}` by `,`. A sequence that received any element carries a trailing
//! `,` before its `]`. Text values and field names are `%XX` escaped so they
//! never contain structure; see [`QueryWireOptions`]. A type tag is followed
//! by a single space and then its value. Empty text is written as
//! `!!empty` so it survives inside containers, and `!!null ` marks a null.
//! Lock-guarded references are embedded verbatim as `!!atomic { ... }`
//! records.

use alloc::{format, string::String, vec::Vec};
use core::fmt;

use bstr::ByteSlice;

use super::{Capabilities, Capability, Wire, WireKey};
use crate::{bytes::Bytes, error::Result, options::QueryWireOptions};

mod escape;
mod value_in;
mod value_out;

#[cfg(test)]
mod tests;

pub use value_in::QueryValueIn;
pub use value_out::QueryValueOut;

const CAPABILITIES: Capabilities = Capabilities::new(&[
    Capability::Base64Bytes,
    Capability::Binding,
    Capability::Sequence,
    Capability::Structured,
    Capability::TypeName,
]);

/// What must be written before the next value.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum Separator {
    #[default]
    None,
    /// `&` between top-level fields.
    Field,
    /// `,` between elements of a container.
    Element,
    /// A single space after a type tag.
    Space,
}

impl Separator {
    fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::None => b"",
            Self::Field => b"&",
            Self::Element => b",",
            Self::Space => b" ",
        }
    }
}

/// Sink state for one nesting level. Containers swap in a fresh state and
/// put the outer one back when their callback returns.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct OutState {
    pub(crate) separator: Separator,
    pub(crate) field_name: Option<String>,
    pub(crate) nested: bool,
}

impl OutState {
    fn nested() -> Self {
        Self {
            nested: true,
            ..Self::default()
        }
    }
}

/// A query-text wire over one [`Bytes`] cursor.
///
/// ```rust
/// use querywire::{QueryWire, ValueIn, ValueOut, Wire};
///
/// let mut wire = QueryWire::new(128);
/// wire.write("a").int32(1).unwrap();
/// wire.write("b").text(Some("hello")).unwrap();
/// assert_eq!(wire.to_string(), "a=1&b=hello");
///
/// assert_eq!(wire.read("a").unwrap().int32().unwrap(), 1);
/// assert_eq!(wire.read("b").unwrap().text().unwrap().as_deref(), Some("hello"));
/// ```
#[derive(Debug)]
pub struct QueryWire {
    bytes: Bytes,
    options: QueryWireOptions,
    out: OutState,
    /// Container nesting of the source.
    depth: usize,
    /// Scratch space for raw tokens.
    token: Vec<u8>,
}

impl QueryWire {
    /// A wire over a fresh heap store of `capacity` bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_options(capacity, QueryWireOptions::default())
    }

    #[must_use]
    pub fn with_options(capacity: usize, options: QueryWireOptions) -> Self {
        Self::wrap(Bytes::with_capacity(capacity), options)
    }

    /// A wire over an existing cursor, e.g. one reading a mapped file.
    #[must_use]
    pub fn wrap(bytes: Bytes, options: QueryWireOptions) -> Self {
        Self {
            bytes,
            options,
            out: OutState::default(),
            depth: 0,
            token: Vec::new(),
        }
    }

    #[must_use]
    pub fn options(&self) -> QueryWireOptions {
        self.options
    }

    pub fn bytes_mut(&mut self) -> &mut Bytes {
        &mut self.bytes
    }

    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// Everything written so far, regardless of the read position.
    #[must_use]
    pub fn as_text(&self) -> String {
        let mut raw = Vec::with_capacity(self.bytes.write_position());
        match self.bytes.store().read_into(0, self.bytes.write_position(), &mut raw) {
            Ok(()) => raw.to_str_lossy().into_owned(),
            Err(err) => format!("<{err}>"),
        }
    }
}

impl Wire for QueryWire {
    type Out<'w> = QueryValueOut<'w>;
    type In<'w> = QueryValueIn<'w>;

    fn write<K: WireKey + ?Sized>(&mut self, key: &K) -> QueryValueOut<'_> {
        self.out.field_name = Some(key.name().into());
        QueryValueOut::new(self)
    }

    fn write_value(&mut self) -> QueryValueOut<'_> {
        QueryValueOut::new(self)
    }

    fn read<K: WireKey + ?Sized>(&mut self, key: &K) -> Result<QueryValueIn<'_>> {
        let mut input = QueryValueIn::new(self);
        crate::wire::ValueIn::read_field(&mut input, key)?;
        Ok(input)
    }

    fn read_any_field(&mut self, name: &mut String) -> Result<QueryValueIn<'_>> {
        let mut input = QueryValueIn::new(self);
        *name = input.read_name()?;
        Ok(input)
    }

    fn read_value(&mut self) -> QueryValueIn<'_> {
        QueryValueIn::new(self)
    }

    fn clear(&mut self) {
        self.bytes.clear();
        self.out = OutState::default();
        self.depth = 0;
    }

    fn flip(&mut self) {
        self.bytes.flip();
        self.depth = 0;
    }

    fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }
}

impl fmt::Display for QueryWire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}
