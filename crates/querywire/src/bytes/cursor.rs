use alloc::{format, string::String, sync::Arc, vec::Vec};
use core::fmt::{self, Write as _};

use bstr::ByteSlice;

use super::{BytesStore, StopCharTester};
use crate::error::{Result, WireError};

/// A positioned cursor over a [`BytesStore`].
///
/// Writes append at `write_position`; reads consume from `read_position`
/// up to `write_position`, which doubles as the read limit. Both positions
/// are plain cursor state and are not shared with other cursors over the
/// same store.
#[derive(Debug, Clone)]
pub struct Bytes {
    store: Arc<BytesStore>,
    read_position: usize,
    write_position: usize,
}

impl Bytes {
    /// A cursor over a fresh heap store of `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::wrap(Arc::new(BytesStore::with_capacity(capacity)))
    }

    /// An empty cursor writing from the start of `store`.
    #[must_use]
    pub fn wrap(store: Arc<BytesStore>) -> Self {
        Self {
            store,
            read_position: 0,
            write_position: 0,
        }
    }

    /// A cursor that reads the first `len` bytes already present in `store`.
    ///
    /// # Errors
    ///
    /// [`WireError::BufferOverflow`] if `len` exceeds the store.
    pub fn readable(store: Arc<BytesStore>, len: usize) -> Result<Self> {
        store.check(0, len)?;
        Ok(Self {
            store,
            read_position: 0,
            write_position: len,
        })
    }

    /// A cursor ready to read `text`.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let store = Arc::new(BytesStore::from_bytes(text.as_bytes()));
        Self {
            store,
            read_position: 0,
            write_position: text.len(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<BytesStore> {
        &self.store
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    #[must_use]
    pub fn read_position(&self) -> usize {
        self.read_position
    }

    #[must_use]
    pub fn write_position(&self) -> usize {
        self.write_position
    }

    /// Bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.write_position - self.read_position
    }

    /// Moves the read cursor, e.g. to rewind after a speculative read.
    ///
    /// # Errors
    ///
    /// [`WireError::InvalidArgument`] if `position` is past the written data.
    pub fn set_read_position(&mut self, position: usize) -> Result<()> {
        if position > self.write_position {
            return Err(WireError::InvalidArgument(format!(
                "read position {position} is past write position {}",
                self.write_position
            )));
        }
        self.read_position = position;
        Ok(())
    }

    /// Forgets everything written so far.
    pub fn clear(&mut self) {
        self.read_position = 0;
        self.write_position = 0;
    }

    /// Rewinds reading to the start of the written data.
    pub fn flip(&mut self) {
        self.read_position = 0;
    }

    /// Skips `len` readable bytes.
    ///
    /// # Errors
    ///
    /// [`WireError::BufferUnderflow`] if fewer than `len` bytes remain.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        if len > self.remaining() {
            return Err(WireError::BufferUnderflow {
                len,
                remaining: self.remaining(),
            });
        }
        self.read_position += len;
        Ok(())
    }

    /// The next byte, without consuming it. `None` at end of input.
    #[must_use]
    pub fn peek_u8(&self) -> Option<u8> {
        if self.remaining() == 0 {
            return None;
        }
        self.store.read_u8(self.read_position).ok()
    }

    /// Consumes and returns the next byte. `None` at end of input.
    pub fn read_u8(&mut self) -> Option<u8> {
        let b = self.peek_u8()?;
        self.read_position += 1;
        Some(b)
    }

    /// Decodes the next code point without consuming it. Invalid UTF-8
    /// decodes as U+FFFD.
    #[must_use]
    pub fn peek_char(&self) -> Option<char> {
        self.decode_at(self.read_position).map(|(c, _)| c)
    }

    fn decode_at(&self, position: usize) -> Option<(char, usize)> {
        if position >= self.write_position {
            return None;
        }
        let lead = self.store.read_u8(position).ok()?;
        if lead.is_ascii() {
            return Some((char::from(lead), 1));
        }
        let width = match lead {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => return Some((char::REPLACEMENT_CHARACTER, 1)),
        };
        let width = width.min(self.write_position - position);
        let mut buf = Vec::with_capacity(4);
        self.store.read_into(position, width, &mut buf).ok()?;
        match buf.to_str() {
            Ok(s) => s.chars().next().map(|c| (c, width)),
            Err(_) => Some((char::REPLACEMENT_CHARACTER, 1)),
        }
    }

    /// Advances past whitespace code points.
    pub fn skip_whitespace(&mut self) {
        while let Some((c, width)) = self.decode_at(self.read_position) {
            if !c.is_whitespace() {
                break;
            }
            self.read_position += width;
        }
    }

    /// Returns `true` if the readable bytes start with `text`, compared
    /// ASCII case-insensitively. Never consumes.
    #[must_use]
    pub fn peek_str_ignore_case(&self, text: &str) -> bool {
        if text.is_empty() {
            return true;
        }
        if self.remaining() < text.len() {
            return false;
        }
        text.bytes().enumerate().all(|(i, expected)| {
            self.store
                .read_u8(self.read_position + i)
                .is_ok_and(|b| b.eq_ignore_ascii_case(&expected))
        })
    }

    /// Appends the raw bytes of the next token to `out`, stopping before the
    /// first byte `tester` accepts. Every stop character is ASCII, so
    /// multi-byte sequences never end a token.
    pub fn read_token_into(&mut self, out: &mut Vec<u8>, tester: StopCharTester) {
        while let Some(b) = self.peek_u8() {
            if b.is_ascii() && tester.is_stop_char(Some(char::from(b))) {
                break;
            }
            out.push(b);
            self.read_position += 1;
        }
    }

    /// Replaces `out` with the next token decoded as UTF-8. The stop
    /// character is left unread.
    pub fn parse_utf8(&mut self, out: &mut String, tester: StopCharTester) {
        let mut raw = Vec::new();
        self.read_token_into(&mut raw, tester);
        out.clear();
        out.push_str(&raw.to_str_lossy());
    }

    /// Appends `data` at the write position.
    ///
    /// # Errors
    ///
    /// [`WireError::BufferOverflow`] if the store is too small; nothing is
    /// written in that case.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.store.write_slice(self.write_position, data)?;
        self.write_position += data.len();
        Ok(())
    }

    pub fn write_u8(&mut self, b: u8) -> Result<()> {
        self.store.write_u8(self.write_position, b)?;
        self.write_position += 1;
        Ok(())
    }

    pub fn append_str(&mut self, text: &str) -> Result<()> {
        self.write_bytes(text.as_bytes())
    }

    /// Appends the `Display` form of `value`.
    pub fn append_display(&mut self, value: impl fmt::Display) -> Result<()> {
        let mut adapter = Appender {
            bytes: self,
            error: None,
        };
        if write!(adapter, "{value}").is_err() {
            return Err(adapter.error.take().unwrap_or_else(|| {
                WireError::IllegalState(String::from("formatter failed"))
            }));
        }
        Ok(())
    }

    /// Copies the readable range out of the store.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.remaining());
        if let Err(err) = self.store.read_into(self.read_position, self.remaining(), &mut out) {
            tracing::warn!(%err, "readable range lies outside the store");
            out.clear();
        }
        out
    }
}

struct Appender<'a> {
    bytes: &'a mut Bytes,
    error: Option<WireError>,
}

impl fmt::Write for Appender<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.bytes.append_str(s).map_err(|e| {
            self.error = Some(e);
            fmt::Error
        })
    }
}

impl fmt::Display for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.to_vec().as_bstr(), f)
    }
}
