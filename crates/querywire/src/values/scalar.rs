use alloc::{format, sync::Arc};
use core::fmt;

use tracing::trace;

use super::{
    Byteable, IntValue, LongValue, fixed_decimal, lock::TextLock, lock_padding, padded,
};
use crate::{
    bytes::{Bytes, BytesStore},
    error::{Result, WireError},
};

/// Fixed layout of a single-value record.
struct Layout {
    template: &'static str,
    lock: usize,
    value: usize,
    digits: usize,
}

const INT_LAYOUT: Layout = Layout {
    template: "!!atomic { locked: false, value: 0000000000 }",
    lock: 19,
    value: 33,
    digits: 10,
};

const LONG_LAYOUT: Layout = Layout {
    template: "!!atomic { locked: false, value: 00000000000000000000 }",
    lock: 19,
    value: 33,
    digits: 20,
};

/// One bound record; the typed references below are thin wrappers.
#[derive(Clone)]
struct TextScalar {
    store: Arc<BytesStore>,
    offset: usize,
    layout: &'static Layout,
}

impl TextScalar {
    fn write(bytes: &mut Bytes, layout: &Layout, value: i64) -> Result<usize> {
        let digits = fixed_decimal(value, layout.digits)?;
        let mut record = layout.template.as_bytes().to_vec();
        record[layout.value..layout.value + layout.digits].copy_from_slice(digits.as_bytes());

        let pad = lock_padding(bytes.write_position(), layout.lock);
        let offset = bytes.write_position() + pad;
        bytes.write_bytes(&padded(pad, &record))?;
        Ok(offset)
    }

    fn bind(store: Arc<BytesStore>, offset: usize, length: usize, layout: &'static Layout) -> Result<Self> {
        if length != layout.template.len() {
            return Err(WireError::InvalidArgument(format!(
                "record length must be {}, got {length}",
                layout.template.len()
            )));
        }
        store.check(offset, length)?;
        store.check_word(offset + layout.lock)?;
        trace!(offset, length, "bound text reference");
        Ok(Self { store, offset, layout })
    }

    fn lock(&self) -> TextLock<'_> {
        TextLock::new(&self.store, self.offset + self.layout.lock)
    }

    fn read(&self) -> Result<i64> {
        self.store.parse_long(self.offset + self.layout.value)
    }

    fn store_value(&self, value: i64) -> Result<()> {
        self.store
            .append_fixed(self.offset + self.layout.value, value, self.layout.digits)
    }

    fn get(&self) -> Result<i64> {
        self.lock().with_lock(|| self.read())
    }

    fn set(&self, value: i64) -> Result<()> {
        self.lock().with_lock(|| self.store_value(value))
    }

    fn update(&self, f: impl FnOnce(i64) -> Result<i64>) -> Result<i64> {
        self.lock().with_lock(|| {
            let next = f(self.read()?)?;
            self.store_value(next)?;
            Ok(next)
        })
    }

    fn compare_and_swap(&self, expected: i64, value: i64) -> Result<bool> {
        self.lock().with_lock(|| {
            if self.read()? != expected {
                return Ok(false);
            }
            self.store_value(value)?;
            Ok(true)
        })
    }
}

fn narrow(value: i64) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| WireError::IllegalState(format!("stored value {value} is out of range for i32")))
}

/// A shared `i32` held in the record
/// `!!atomic { locked: false, value: 0000000000 }`.
///
/// The record is 45 bytes. The lock word occupies offsets 19..23 and the
/// value is zero-padded decimal at offsets 33..43. A negative value keeps its
/// `-` in the first digit position, so values below `-999_999_999` cannot be
/// stored.
///
/// ```rust
/// use querywire::{Bytes, IntTextReference, IntValue};
///
/// let mut bytes = Bytes::with_capacity(64);
/// let offset = IntTextReference::write(&mut bytes, 5).unwrap();
/// let counter = IntTextReference::bind_at(bytes.store().clone(), offset).unwrap();
/// assert_eq!(counter.add_and_get(3).unwrap(), 8);
/// ```
#[derive(Clone)]
pub struct IntTextReference(TextScalar);

impl IntTextReference {
    /// Length of the record in bytes.
    pub const LENGTH: usize = INT_LAYOUT.template.len();
    /// Characters available for the value, sign included.
    pub const DIGITS: usize = INT_LAYOUT.digits;

    /// Appends a record holding `value` and returns the offset it starts at.
    /// Up to three spaces may precede the record so its lock word can be
    /// updated atomically.
    ///
    /// # Errors
    ///
    /// [`WireError::IllegalState`] if `value` does not fit the field, or a
    /// bounds error if `bytes` is full. Nothing is written on error.
    pub fn write(bytes: &mut Bytes, value: i32) -> Result<usize> {
        TextScalar::write(bytes, &INT_LAYOUT, i64::from(value))
    }

    /// Binds to the record at `offset`.
    pub fn bind_at(store: Arc<BytesStore>, offset: usize) -> Result<Self> {
        Self::bind(store, offset, Self::LENGTH)
    }
}

impl Byteable for IntTextReference {
    fn bind(store: Arc<BytesStore>, offset: usize, length: usize) -> Result<Self> {
        TextScalar::bind(store, offset, length, &INT_LAYOUT).map(Self)
    }

    fn store(&self) -> &Arc<BytesStore> {
        &self.0.store
    }

    fn offset(&self) -> usize {
        self.0.offset
    }

    fn max_size(&self) -> usize {
        Self::LENGTH
    }
}

impl IntValue for IntTextReference {
    fn get(&self) -> Result<i32> {
        narrow(self.0.get()?)
    }

    fn set(&self, value: i32) -> Result<()> {
        self.0.set(i64::from(value))
    }

    fn add_and_get(&self, delta: i32) -> Result<i32> {
        let next = self
            .0
            .update(|current| Ok(i64::from(narrow(current)?.wrapping_add(delta))))?;
        narrow(next)
    }

    fn compare_and_swap(&self, expected: i32, value: i32) -> Result<bool> {
        self.0.compare_and_swap(i64::from(expected), i64::from(value))
    }
}

/// A shared `i64` held in the record
/// `!!atomic { locked: false, value: 00000000000000000000 }`.
///
/// Same lock and value offsets as [`IntTextReference`] with a 20 digit
/// field, which fits every `i64`.
#[derive(Clone)]
pub struct LongTextReference(TextScalar);

impl LongTextReference {
    pub const LENGTH: usize = LONG_LAYOUT.template.len();

    pub fn write(bytes: &mut Bytes, value: i64) -> Result<usize> {
        TextScalar::write(bytes, &LONG_LAYOUT, value)
    }

    pub fn bind_at(store: Arc<BytesStore>, offset: usize) -> Result<Self> {
        Self::bind(store, offset, Self::LENGTH)
    }
}

impl Byteable for LongTextReference {
    fn bind(store: Arc<BytesStore>, offset: usize, length: usize) -> Result<Self> {
        TextScalar::bind(store, offset, length, &LONG_LAYOUT).map(Self)
    }

    fn store(&self) -> &Arc<BytesStore> {
        &self.0.store
    }

    fn offset(&self) -> usize {
        self.0.offset
    }

    fn max_size(&self) -> usize {
        Self::LENGTH
    }
}

impl LongValue for LongTextReference {
    fn get(&self) -> Result<i64> {
        self.0.get()
    }

    fn set(&self, value: i64) -> Result<()> {
        self.0.set(value)
    }

    fn add_and_get(&self, delta: i64) -> Result<i64> {
        self.0.update(|current| Ok(current.wrapping_add(delta)))
    }

    fn compare_and_swap(&self, expected: i64, value: i64) -> Result<bool> {
        self.0.compare_and_swap(expected, value)
    }
}

impl fmt::Display for IntTextReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Ok(value) => write!(f, "value: {value}"),
            Err(err) => write!(f, "value: <{err}>"),
        }
    }
}

impl fmt::Display for LongTextReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Ok(value) => write!(f, "value: {value}"),
            Err(err) => write!(f, "value: <{err}>"),
        }
    }
}

impl fmt::Debug for TextScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextScalar")
            .field("offset", &self.offset)
            .field("length", &self.layout.template.len())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for IntTextReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IntTextReference").field(&self.0).finish()
    }
}

impl fmt::Debug for LongTextReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LongTextReference").field(&self.0).finish()
    }
}
