//! Busy-wait lock over a 4-byte word inside a text record.
//!
//! The word overlays the `false` of `locked: false`. Unlocked it holds the
//! bytes `fals`; locked it holds ` tru`, so the record then reads
//! `locked:  true`. Any other content means the record is corrupt or was
//! never written, and no operation may proceed on it.
//!
//! The lock is not reentrant and has no timeout: a holder that dies inside
//! the critical section leaves the record locked for every other mapping.
//! Recovering such a record means rewriting it from above this layer.

use alloc::format;
use core::hint::spin_loop;

use tracing::warn;

use crate::{
    bytes::BytesStore,
    error::{Result, WireError},
};

pub(crate) const UNLOCKED: u32 = u32::from_ne_bytes(*b"fals");
pub(crate) const LOCKED: u32 = u32::from_ne_bytes(*b" tru");

/// The lock word of one record.
#[derive(Copy, Clone)]
pub(crate) struct TextLock<'a> {
    store: &'a BytesStore,
    offset: usize,
}

impl<'a> TextLock<'a> {
    pub(crate) fn new(store: &'a BytesStore, offset: usize) -> Self {
        Self { store, offset }
    }

    fn check(&self, word: u32) -> Result<()> {
        if word == UNLOCKED || word == LOCKED {
            return Ok(());
        }
        let bytes = word.to_ne_bytes();
        warn!(offset = self.offset, word = ?bstr::BStr::new(&bytes), "corrupt lock word");
        Err(WireError::IllegalState(format!(
            "lock word at offset {} is neither locked nor unlocked",
            self.offset
        )))
    }

    /// Runs `body` while holding the lock. The lock is released whether or
    /// not `body` succeeds.
    pub(crate) fn with_lock<T>(&self, body: impl FnOnce() -> Result<T>) -> Result<T> {
        self.check(self.store.read_volatile_u32(self.offset)?)?;
        while !self.store.compare_and_swap_u32(self.offset, UNLOCKED, LOCKED)? {
            // Another writer may have scribbled over the word while we spun.
            self.check(self.store.read_volatile_u32(self.offset)?)?;
            spin_loop();
        }

        let result = body();
        self.store.write_ordered_u32(self.offset, UNLOCKED)?;
        result
    }

    #[cfg(test)]
    pub(crate) fn is_locked(&self) -> Result<bool> {
        let word = self.store.read_volatile_u32(self.offset)?;
        self.check(word)?;
        Ok(word == LOCKED)
    }
}
