//! A query-string wire codec and lock-guarded text references over shared
//! byte regions.
//!
//! [`QueryWire`] writes and reads typed fields as
//! `key=value&key2=value2`, with `[...]` sequences and `{...}` structures.
//! [`IntTextReference`] and its siblings keep an integer as fixed-width
//! decimal text inside the same bytes, so several threads or processes
//! mapping one [`BytesStore`] can update it in place.
//!
//! ```rust
//! use querywire::{IntValue, QueryWire, ValueIn, ValueOut, Wire};
//!
//! let mut wire = QueryWire::new(256);
//! wire.write("name").text(Some("counter")).unwrap();
//! wire.write("hits").int32_for_binding(0).unwrap();
//!
//! assert_eq!(wire.read("name").unwrap().text().unwrap().as_deref(), Some("counter"));
//! let mut hits = None;
//! wire.read("hits").unwrap().bound_int32(&mut hits).unwrap();
//! let hits = hits.unwrap();
//! hits.add_and_get(2).unwrap();
//! assert_eq!(hits.get().unwrap(), 2);
//! ```

#![allow(missing_docs)]
extern crate alloc;

mod bytes;
mod comparator;
mod error;
mod options;
mod values;
mod wire;

#[cfg(test)]
mod tests;

pub use bytes::{Bytes, BytesStore, StopCharTester};
pub use comparator::{OrdinalKey, compare_text, text_eq};
pub use error::{FaultKind, Result, WireError};
pub use options::QueryWireOptions;
pub use values::{
    Byteable, IntTextReference, IntValue, LongArrayTextReference, LongArrayValues, LongTextReference, LongValue,
};
pub use wire::{
    Capabilities, Capability, ValueIn, ValueKind, ValueOut, Wire, WireKey, WireValue,
    query::{QueryValueIn, QueryValueOut, QueryWire},
};
