//! Fixed-capacity shared memory with in-place decimal and word operations.
//!
//! A [`BytesStore`] is the region every cursor and text reference points
//! into. It is shared behind an `Arc` and never resized, so an offset handed
//! out once stays valid for the lifetime of the store.
//!
//! Every access goes through an atomic: single bytes through `AtomicU8`,
//! lock words through the `AtomicU64` that contains them. The base address is
//! always 8-byte aligned (heap stores are allocated as `u64` words, mapped
//! stores are page aligned), so a 4-byte word at offset `o` can be updated
//! atomically whenever `o % 8 <= 4`.

use alloc::{boxed::Box, format, vec::Vec};
use core::{
    fmt,
    ptr::NonNull,
    sync::atomic::{AtomicU8, AtomicU64, Ordering},
};
#[cfg(feature = "mmap")]
use std::{fs::OpenOptions, path::Path};

#[cfg(feature = "mmap")]
use memmap2::{MmapMut, MmapOptions};

use crate::error::{Result, WireError};

const WORD: usize = 8;

enum Backing {
    Heap(Box<[AtomicU64]>),
    #[cfg(feature = "mmap")]
    Mapped(MmapMut),
}

/// Shared, bounds-checked byte region.
pub struct BytesStore {
    ptr: NonNull<u8>,
    capacity: usize,
    backing: Backing,
}

// SAFETY: the region is only touched through atomic operations and the
// backing allocation (or mapping) lives exactly as long as the store.
unsafe impl Send for BytesStore {}
// SAFETY: see above; concurrent `&BytesStore` access never creates plain
// references into the region.
unsafe impl Sync for BytesStore {}

impl BytesStore {
    /// Allocates a zeroed heap store of `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let words: Box<[AtomicU64]> = (0..capacity.div_ceil(WORD))
            .map(|_| AtomicU64::new(0))
            .collect();
        // `AtomicU64` is an `UnsafeCell`, so writes through this pointer are
        // permitted while the box is shared.
        let ptr = NonNull::new(words.as_ptr().cast::<u8>().cast_mut()).unwrap_or(NonNull::dangling());
        Self {
            ptr,
            capacity,
            backing: Backing::Heap(words),
        }
    }

    /// Allocates a heap store holding a copy of `data`.
    #[must_use]
    pub fn from_bytes(data: &[u8]) -> Self {
        let store = Self::with_capacity(data.len());
        for (offset, b) in data.iter().enumerate() {
            store.byte(offset).store(*b, Ordering::Relaxed);
        }
        store
    }

    /// Maps `capacity` bytes of the file at `path`, creating and sizing it as
    /// needed. Every mapping of the same file observes the same bytes, which
    /// is how separate processes share text references.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Io`] when the file cannot be opened, resized or
    /// mapped.
    #[cfg(feature = "mmap")]
    pub fn map_file<P: AsRef<Path>>(path: P, capacity: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mapped_len = capacity.div_ceil(WORD) * WORD;
        if file.metadata()?.len() < mapped_len as u64 {
            file.set_len(mapped_len as u64)?;
        }

        // SAFETY: the file is open read/write and sized to `mapped_len`;
        // concurrent modification by other mappings is the point of the
        // store and is only ever observed through atomics.
        let mut mmap = unsafe { MmapOptions::new().len(mapped_len).map_mut(&file)? };
        let ptr = NonNull::new(mmap.as_mut_ptr()).unwrap_or(NonNull::dangling());
        tracing::trace!(capacity, "mapped shared store");
        Ok(Self {
            ptr,
            capacity,
            backing: Backing::Mapped(mmap),
        })
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn is_mapped(&self) -> bool {
        match &self.backing {
            Backing::Heap(_) => false,
            #[cfg(feature = "mmap")]
            Backing::Mapped(_) => true,
        }
    }

    /// Flushes a mapped store to its file. Heap stores have nothing to flush.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Io`] if the kernel rejects the flush.
    pub fn flush(&self) -> Result<()> {
        match &self.backing {
            Backing::Heap(_) => Ok(()),
            #[cfg(feature = "mmap")]
            Backing::Mapped(mmap) => Ok(mmap.flush()?),
        }
    }

    pub(crate) fn check(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.capacity => Ok(()),
            _ => Err(WireError::BufferOverflow {
                offset,
                len,
                capacity: self.capacity,
            }),
        }
    }

    #[inline]
    fn byte(&self, offset: usize) -> &AtomicU8 {
        debug_assert!(offset < self.capacity);
        // SAFETY: callers bounds-check `offset`; the region outlives `self`
        // and `AtomicU8` has no alignment requirement.
        unsafe { AtomicU8::from_ptr(self.ptr.as_ptr().add(offset)) }
    }

    /// Locates the aligned word holding the 4 bytes at `offset` and the
    /// shift of those bytes inside it.
    fn word(&self, offset: usize) -> Result<(&AtomicU64, usize)> {
        self.check(offset, 4)?;
        let start = offset & !(WORD - 1);
        let shift = offset - start;
        if shift > WORD - 4 {
            return Err(WireError::InvalidArgument(format!(
                "4-byte word at offset {offset} crosses an 8-byte boundary"
            )));
        }
        // SAFETY: `start` is 8-aligned because the base is, and the backing
        // allocation is rounded up to whole words so `start + 8` is in it.
        let word = unsafe { AtomicU64::from_ptr(self.ptr.as_ptr().add(start).cast::<u64>()) };
        Ok((word, shift))
    }

    /// Fails unless the 4 bytes at `offset` can be updated atomically.
    pub(crate) fn check_word(&self, offset: usize) -> Result<()> {
        self.word(offset).map(|_| ())
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8> {
        self.check(offset, 1)?;
        Ok(self.byte(offset).load(Ordering::Relaxed))
    }

    pub fn write_u8(&self, offset: usize, value: u8) -> Result<()> {
        self.check(offset, 1)?;
        self.byte(offset).store(value, Ordering::Relaxed);
        Ok(())
    }

    pub fn write_slice(&self, offset: usize, data: &[u8]) -> Result<()> {
        self.check(offset, data.len())?;
        for (i, b) in data.iter().enumerate() {
            self.byte(offset + i).store(*b, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Appends the bytes in `offset..offset + len` to `out`.
    pub fn read_into(&self, offset: usize, len: usize, out: &mut Vec<u8>) -> Result<()> {
        self.check(offset, len)?;
        out.extend((offset..offset + len).map(|i| self.byte(i).load(Ordering::Relaxed)));
        Ok(())
    }

    /// Reads the 4 bytes at `offset` with acquire ordering.
    pub fn read_volatile_u32(&self, offset: usize) -> Result<u32> {
        let (word, shift) = self.word(offset)?;
        Ok(extract(word.load(Ordering::Acquire), shift))
    }

    /// Stores the 4 bytes at `offset` with release ordering, leaving the
    /// neighbouring bytes of the containing word untouched.
    pub fn write_ordered_u32(&self, offset: usize, value: u32) -> Result<()> {
        let (word, shift) = self.word(offset)?;
        let mut current = word.load(Ordering::Relaxed);
        loop {
            let next = splice(current, shift, value);
            match word.compare_exchange_weak(current, next, Ordering::Release, Ordering::Relaxed) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Replaces the 4 bytes at `offset` with `value` if they equal
    /// `expected`. Only a mismatch of those 4 bytes makes this return
    /// `false`; concurrent changes to the rest of the word are retried.
    pub fn compare_and_swap_u32(&self, offset: usize, expected: u32, value: u32) -> Result<bool> {
        let (word, shift) = self.word(offset)?;
        let mut current = word.load(Ordering::Acquire);
        loop {
            if extract(current, shift) != expected {
                return Ok(false);
            }
            let next = splice(current, shift, value);
            match word.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return Ok(true),
                Err(actual) => current = actual,
            }
        }
    }

    /// Parses a decimal integer (optional leading spaces and `-`) starting
    /// at `offset`, stopping at the first non-digit.
    pub fn parse_long(&self, offset: usize) -> Result<i64> {
        let mut pos = offset;
        while pos < self.capacity && self.byte(pos).load(Ordering::Relaxed) == b' ' {
            pos += 1;
        }
        let negative = pos < self.capacity && self.byte(pos).load(Ordering::Relaxed) == b'-';
        if negative {
            pos += 1;
        }

        let start = pos;
        let mut magnitude: i64 = 0;
        while pos < self.capacity {
            let b = self.byte(pos).load(Ordering::Relaxed);
            if !b.is_ascii_digit() {
                break;
            }
            let digit = i64::from(b - b'0');
            // Accumulate negatively so i64::MIN parses.
            magnitude = magnitude
                .checked_mul(10)
                .and_then(|m| m.checked_sub(digit))
                .ok_or_else(|| WireError::IllegalState(format!("decimal at offset {offset} overflows i64")))?;
            pos += 1;
        }

        if pos == start {
            let found = if pos < self.capacity {
                Some(char::from(self.byte(pos).load(Ordering::Relaxed)))
            } else {
                None
            };
            return Err(WireError::malformed("a decimal digit", found));
        }

        if negative {
            Ok(magnitude)
        } else {
            magnitude
                .checked_neg()
                .ok_or_else(|| WireError::IllegalState(format!("decimal at offset {offset} overflows i64")))
        }
    }

    /// Writes `value` at `offset` as exactly `digits` characters: a `-` for
    /// negative values followed by zero-padded decimal digits.
    ///
    /// # Errors
    ///
    /// [`WireError::IllegalState`] if `value` needs more than `digits`
    /// characters; nothing is written in that case.
    pub fn append_fixed(&self, offset: usize, value: i64, digits: usize) -> Result<()> {
        self.check(offset, digits)?;

        let mut magnitude = value.unsigned_abs();
        let mut buf = [b'0'; 20];
        let mut used = 0;
        while magnitude > 0 {
            buf[buf.len() - 1 - used] = b'0' + (magnitude % 10) as u8;
            magnitude /= 10;
            used += 1;
        }
        let needed = used.max(1) + usize::from(value < 0);
        if needed > digits {
            return Err(WireError::IllegalState(format!(
                "value {value} does not fit in {digits} characters"
            )));
        }

        let mut pos = offset + digits;
        for i in 0..used {
            pos -= 1;
            self.byte(pos).store(buf[buf.len() - 1 - i], Ordering::Relaxed);
        }
        let sign_slot = usize::from(value < 0);
        while pos > offset + sign_slot {
            pos -= 1;
            self.byte(pos).store(b'0', Ordering::Relaxed);
        }
        if value < 0 {
            self.byte(offset).store(b'-', Ordering::Relaxed);
        }
        Ok(())
    }
}

#[inline]
fn extract(word: u64, shift: usize) -> u32 {
    let b = word.to_ne_bytes();
    u32::from_ne_bytes([b[shift], b[shift + 1], b[shift + 2], b[shift + 3]])
}

#[inline]
fn splice(word: u64, shift: usize, value: u32) -> u64 {
    let mut b = word.to_ne_bytes();
    b[shift..shift + 4].copy_from_slice(&value.to_ne_bytes());
    u64::from_ne_bytes(b)
}

impl fmt::Debug for BytesStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backing = match &self.backing {
            Backing::Heap(words) => format!("heap({} words)", words.len()),
            #[cfg(feature = "mmap")]
            Backing::Mapped(mmap) => format!("mapped({} bytes)", mmap.len()),
        };
        f.debug_struct("BytesStore")
            .field("capacity", &self.capacity)
            .field("backing", &backing)
            .finish()
    }
}
