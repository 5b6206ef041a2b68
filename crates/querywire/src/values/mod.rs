//! Lock-guarded integers stored as fixed-width decimal text inside a shared
//! byte region.
//!
//! A record is written once (usually by a wire sink) and can then be bound
//! by any number of reference objects, in this process or in another one
//! mapping the same file. Every read and write goes through the record's
//! lock word; see [`IntTextReference`] for the exact layout.

use alloc::{string::String, sync::Arc, vec::Vec};

use crate::{bytes::BytesStore, error::Result};

mod array;
mod lock;
mod scalar;

pub use array::LongArrayTextReference;
pub use scalar::{IntTextReference, LongTextReference};

/// A shared `i32`.
pub trait IntValue {
    fn get(&self) -> Result<i32>;
    fn set(&self, value: i32) -> Result<()>;
    /// Adds `delta` and returns the new value.
    fn add_and_get(&self, delta: i32) -> Result<i32>;
    /// Stores `value` if the current value is `expected`. Only a value
    /// mismatch returns `false`; contention never does.
    fn compare_and_swap(&self, expected: i32, value: i32) -> Result<bool>;

    fn get_volatile(&self) -> Result<i32> {
        self.get()
    }

    fn set_ordered(&self, value: i32) -> Result<()> {
        self.set(value)
    }

    fn add_atomic(&self, delta: i32) -> Result<i32> {
        self.add_and_get(delta)
    }
}

/// A shared `i64`.
pub trait LongValue {
    fn get(&self) -> Result<i64>;
    fn set(&self, value: i64) -> Result<()>;
    fn add_and_get(&self, delta: i64) -> Result<i64>;
    fn compare_and_swap(&self, expected: i64, value: i64) -> Result<bool>;

    fn get_volatile(&self) -> Result<i64> {
        self.get()
    }

    fn set_ordered(&self, value: i64) -> Result<()> {
        self.set(value)
    }

    fn add_atomic(&self, delta: i64) -> Result<i64> {
        self.add_and_get(delta)
    }
}

/// A shared fixed-capacity array of `i64` with a high-water mark.
pub trait LongArrayValues {
    fn capacity(&self) -> usize;
    fn used(&self) -> Result<usize>;
    fn set_used(&self, used: usize) -> Result<()>;
    fn get_at(&self, index: usize) -> Result<i64>;
    /// Stores `value` at `index`, raising `used` to `index + 1` if needed.
    fn set_at(&self, index: usize, value: i64) -> Result<()>;
    fn add_at(&self, index: usize, delta: i64) -> Result<i64>;
    fn compare_and_swap_at(&self, index: usize, expected: i64, value: i64) -> Result<bool>;

    /// Reads `0..used` under a single lock acquisition per element.
    fn to_vec(&self) -> Result<Vec<i64>> {
        (0..self.used()?).map(|i| self.get_at(i)).collect()
    }
}

/// A view onto a fixed-length slice of a [`BytesStore`].
pub trait Byteable: Sized {
    /// Attaches a new reference to the record at `offset`.
    ///
    /// # Errors
    ///
    /// [`WireError::InvalidArgument`](crate::WireError::InvalidArgument) if
    /// `length` is not the record's length or its lock word cannot be
    /// updated atomically at that offset.
    fn bind(store: Arc<BytesStore>, offset: usize, length: usize) -> Result<Self>;

    /// Re-points an existing reference at another record.
    fn rebind(&mut self, store: Arc<BytesStore>, offset: usize, length: usize) -> Result<()> {
        *self = Self::bind(store, offset, length)?;
        Ok(())
    }

    fn store(&self) -> &Arc<BytesStore>;
    fn offset(&self) -> usize;
    /// Length of the bound record in bytes.
    fn max_size(&self) -> usize;
}

/// Spaces needed before a record so its lock word at `lock` lands where the
/// store can update it atomically.
pub(crate) fn lock_padding(position: usize, lock: usize) -> usize {
    (0..8).find(|pad| (position + pad + lock) % 8 <= 4).unwrap_or(0)
}

pub(crate) fn padded(pad: usize, record: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pad + record.len());
    out.resize(pad, b' ');
    out.extend_from_slice(record);
    out
}

/// Formats `value` as exactly `digits` characters, sign first.
pub(crate) fn fixed_decimal(value: i64, digits: usize) -> Result<String> {
    let text = alloc::format!("{value:0digits$}");
    if text.len() == digits {
        Ok(text)
    } else {
        Err(crate::WireError::IllegalState(alloc::format!(
            "value {value} does not fit in {digits} characters"
        )))
    }
}
