use alloc::{format, string::String, sync::Arc, vec::Vec};
use core::fmt;

use tracing::trace;

use super::{Byteable, LongArrayValues, fixed_decimal, lock::TextLock, lock_padding, padded};
use crate::{
    bytes::{Bytes, BytesStore},
    error::{Result, WireError},
};

const DIGITS: usize = 20;
const LOCK: usize = 10;
const CAPACITY: usize = 27;
const USED: usize = 55;
const VALUES: usize = 87;
/// Each element after the first is preceded by `", "`.
const STRIDE: usize = DIGITS + 2;
const TAIL: &str = " ] }";

/// A shared array of `i64` laid out as
/// `{ locked: false, capacity: <20>, used: <20>, values: [ <20>, <20> ] }`.
///
/// Every field is a 20 character decimal. `used` is a high-water mark that
/// [`set_at`](LongArrayValues::set_at) raises; elements past it still exist
/// and read as whatever was stored there. The whole array shares one lock
/// word at offset 10.
#[derive(Clone)]
pub struct LongArrayTextReference {
    store: Arc<BytesStore>,
    offset: usize,
    capacity: usize,
}

impl LongArrayTextReference {
    /// Length in bytes of an array record with room for `capacity` values,
    /// saturating at `usize::MAX`.
    #[must_use]
    pub fn length_for(capacity: usize) -> usize {
        Self::checked_length(capacity).unwrap_or(usize::MAX)
    }

    fn checked_length(capacity: usize) -> Option<usize> {
        capacity
            .checked_mul(DIGITS)?
            .checked_add(capacity.saturating_sub(1).checked_mul(2)?)?
            .checked_add(VALUES + TAIL.len())
    }

    /// Reads the capacity field of the record at `offset` and returns the
    /// record's total length.
    ///
    /// # Errors
    ///
    /// Malformed or negative capacity fields are errors, as is a capacity
    /// whose record would run past the end of the store.
    pub fn peek_length(store: &BytesStore, offset: usize) -> Result<usize> {
        store.check(offset, VALUES)?;
        let capacity = store.parse_long(offset + CAPACITY)?;
        let capacity = usize::try_from(capacity)
            .map_err(|_| WireError::IllegalState(format!("negative array capacity {capacity}")))?;
        let length = Self::checked_length(capacity)
            .ok_or_else(|| WireError::IllegalState(format!("array capacity {capacity} is too large")))?;
        store.check(offset, length)?;
        Ok(length)
    }

    /// Appends a zeroed array record with room for `capacity` values and
    /// returns the offset it starts at.
    pub fn write(bytes: &mut Bytes, capacity: usize) -> Result<usize> {
        let length = Self::checked_length(capacity)
            .ok_or_else(|| WireError::InvalidArgument(format!("array capacity {capacity} is too large")))?;
        let capacity_text = fixed_decimal(
            i64::try_from(capacity)
                .map_err(|_| WireError::InvalidArgument(format!("array capacity {capacity} is too large")))?,
            DIGITS,
        )?;
        let zero = fixed_decimal(0, DIGITS)?;

        let mut record = String::with_capacity(length);
        record.push_str("{ locked: false, capacity: ");
        record.push_str(&capacity_text);
        record.push_str(", used: ");
        record.push_str(&zero);
        record.push_str(", values: [ ");
        for i in 0..capacity {
            if i > 0 {
                record.push_str(", ");
            }
            record.push_str(&zero);
        }
        record.push_str(TAIL);
        debug_assert_eq!(record.len(), length);

        let pad = lock_padding(bytes.write_position(), LOCK);
        let offset = bytes.write_position() + pad;
        bytes.write_bytes(&padded(pad, record.as_bytes()))?;
        Ok(offset)
    }

    /// Binds to the record at `offset`, taking its length from the record.
    pub fn bind_at(store: Arc<BytesStore>, offset: usize) -> Result<Self> {
        let length = Self::peek_length(&store, offset)?;
        Self::bind(store, offset, length)
    }

    fn lock(&self) -> TextLock<'_> {
        TextLock::new(&self.store, self.offset + LOCK)
    }

    fn slot(&self, index: usize) -> Result<usize> {
        if index >= self.capacity {
            return Err(WireError::InvalidArgument(format!(
                "index {index} is out of bounds for capacity {}",
                self.capacity
            )));
        }
        Ok(self.offset + VALUES + index * STRIDE)
    }

    fn read_used(&self) -> Result<usize> {
        let used = self.store.parse_long(self.offset + USED)?;
        usize::try_from(used).map_err(|_| WireError::IllegalState(format!("negative used count {used}")))
    }

    fn write_used(&self, used: usize) -> Result<()> {
        // `used` never exceeds `capacity`, which was written as an i64.
        let used = i64::try_from(used).map_err(|_| WireError::IllegalState(format!("used count {used}")))?;
        self.store.append_fixed(self.offset + USED, used, DIGITS)
    }

    fn raise_used(&self, index: usize) -> Result<()> {
        if self.read_used()? <= index {
            self.write_used(index + 1)?;
        }
        Ok(())
    }
}

impl Byteable for LongArrayTextReference {
    fn bind(store: Arc<BytesStore>, offset: usize, length: usize) -> Result<Self> {
        let expected = Self::peek_length(&store, offset)?;
        if length != expected {
            return Err(WireError::InvalidArgument(format!(
                "array record length must be {expected}, got {length}"
            )));
        }
        store.check_word(offset + LOCK)?;
        let capacity = (length - VALUES - TAIL.len() + 2) / STRIDE;
        trace!(offset, length, capacity, "bound array reference");
        Ok(Self {
            store,
            offset,
            capacity,
        })
    }

    fn store(&self) -> &Arc<BytesStore> {
        &self.store
    }

    fn offset(&self) -> usize {
        self.offset
    }

    fn max_size(&self) -> usize {
        Self::length_for(self.capacity)
    }
}

impl LongArrayValues for LongArrayTextReference {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn used(&self) -> Result<usize> {
        self.lock().with_lock(|| self.read_used())
    }

    fn set_used(&self, used: usize) -> Result<()> {
        if used > self.capacity {
            return Err(WireError::InvalidArgument(format!(
                "used count {used} exceeds capacity {}",
                self.capacity
            )));
        }
        self.lock().with_lock(|| self.write_used(used))
    }

    fn get_at(&self, index: usize) -> Result<i64> {
        let slot = self.slot(index)?;
        self.lock().with_lock(|| self.store.parse_long(slot))
    }

    fn set_at(&self, index: usize, value: i64) -> Result<()> {
        let slot = self.slot(index)?;
        self.lock().with_lock(|| {
            self.store.append_fixed(slot, value, DIGITS)?;
            self.raise_used(index)
        })
    }

    fn add_at(&self, index: usize, delta: i64) -> Result<i64> {
        let slot = self.slot(index)?;
        self.lock().with_lock(|| {
            let next = self.store.parse_long(slot)?.wrapping_add(delta);
            self.store.append_fixed(slot, next, DIGITS)?;
            self.raise_used(index)?;
            Ok(next)
        })
    }

    fn compare_and_swap_at(&self, index: usize, expected: i64, value: i64) -> Result<bool> {
        let slot = self.slot(index)?;
        self.lock().with_lock(|| {
            if self.store.parse_long(slot)? != expected {
                return Ok(false);
            }
            self.store.append_fixed(slot, value, DIGITS)?;
            self.raise_used(index)?;
            Ok(true)
        })
    }

    fn to_vec(&self) -> Result<Vec<i64>> {
        self.lock().with_lock(|| {
            let used = self.read_used()?.min(self.capacity);
            (0..used)
                .map(|i| self.store.parse_long(self.offset + VALUES + i * STRIDE))
                .collect()
        })
    }
}

impl fmt::Display for LongArrayTextReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_vec() {
            Ok(values) => write!(f, "values: {values:?}"),
            Err(err) => write!(f, "values: <{err}>"),
        }
    }
}

impl fmt::Debug for LongArrayTextReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LongArrayTextReference")
            .field("offset", &self.offset)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
