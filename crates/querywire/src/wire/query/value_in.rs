use alloc::{collections::BTreeMap, format, string::String, sync::Arc, vec::Vec};
use core::str::FromStr;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use bstr::ByteSlice;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::{debug, trace};
use uuid::Uuid;

use super::{QueryWire, escape::unescape};
use crate::{
    bytes::{BytesStore, StopCharTester},
    comparator::{OrdinalKey, text_eq},
    error::{Result, WireError},
    values::{Byteable, IntTextReference, LongArrayTextReference, LongTextReference},
    wire::{ValueIn, ValueKind, WireKey, WireValue},
};

const NULL_MARKER: &str = "!!null ";
/// Stands in for empty text, which would otherwise vanish between separators.
pub(super) const EMPTY_MARKER: &str = "!!empty";
/// Containers nested deeper than this are rejected before recursing.
const MAX_DEPTH: usize = 128;

/// The source of a [`QueryWire`].
#[derive(Debug)]
pub struct QueryValueIn<'w> {
    wire: &'w mut QueryWire,
}

impl<'w> QueryValueIn<'w> {
    pub(super) fn new(wire: &'w mut QueryWire) -> Self {
        Self { wire }
    }

    fn nested(&self) -> bool {
        self.wire.depth > 0
    }

    fn peek(&self) -> Option<char> {
        self.wire.bytes.peek_char()
    }

    /// Reads the raw bytes of the next token into the scratch buffer.
    fn token(&mut self, tester: StopCharTester) {
        let wire = &mut *self.wire;
        wire.token.clear();
        wire.bytes.read_token_into(&mut wire.token, tester);
    }

    /// The scratch token with `%XX` escapes decoded.
    fn decoded(&self) -> Result<String> {
        let raw = unescape(&self.wire.token, self.wire.options.strict_escapes)?;
        Ok(raw.to_str_lossy().into_owned())
    }

    /// Consumes the separator that ends the current value, if present.
    fn finish_value(&mut self) {
        let separator = if self.nested() { b',' } else { b'&' };
        if self.wire.bytes.peek_u8() == Some(separator) {
            self.wire.bytes.read_u8();
        }
    }

    /// Reads a field name and the `=` after it.
    pub(super) fn read_name(&mut self) -> Result<String> {
        self.wire.bytes.skip_whitespace();
        self.token(StopCharTester::field_name(self.nested()));
        let name = self.decoded()?;
        match self.wire.bytes.peek_u8() {
            Some(b'=' | b'&') => {
                self.wire.bytes.read_u8();
            }
            _ => {}
        }
        Ok(name)
    }

    /// Reads one value token, consuming its terminating separator.
    fn value_token(&mut self) {
        self.wire.bytes.skip_whitespace();
        self.token(StopCharTester::value(self.nested()));
        self.finish_value();
    }

    /// Like [`value_token`](Self::value_token) for readers that cannot
    /// return null.
    fn required_token(&mut self) -> Result<()> {
        if self.is_null()? {
            return Err(WireError::IllegalState(String::from("value is null")));
        }
        self.value_token();
        Ok(())
    }

    /// Decodes the scratch token as text, mapping the empty-text marker.
    fn decoded_text(&self) -> Result<String> {
        if self.wire.token == EMPTY_MARKER.as_bytes() {
            return Ok(String::new());
        }
        self.decoded()
    }

    fn parse<T: FromStr>(&mut self, what: &'static str) -> Result<T> {
        self.required_token()?;
        let text = self.wire.token.to_str_lossy();
        text.trim()
            .parse()
            .map_err(|_| WireError::parse(what, &*text))
    }

    fn narrow<T: TryFrom<i64>>(&mut self, what: &'static str) -> Result<T> {
        let value = self.int64()?;
        T::try_from(value).map_err(|_| WireError::IllegalState(format!("{value} is out of range for {what}")))
    }

    fn expect(&mut self, open: char, expected: &'static str) -> Result<()> {
        self.wire.bytes.skip_whitespace();
        match self.peek() {
            Some(c) if c == open => {
                self.wire.bytes.read_u8();
                Ok(())
            }
            found => Err(WireError::malformed(expected, found)),
        }
    }

    /// Runs `f` one level deeper between `open` and `close`.
    fn container<T, F>(&mut self, open: char, close: char, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.expect(open, if open == '[' { "[" } else { "{" })?;
        if self.wire.depth >= MAX_DEPTH {
            return Err(WireError::IllegalState(format!("nesting deeper than {MAX_DEPTH}")));
        }
        trace!(%open, depth = self.wire.depth, "enter container");
        self.wire.depth += 1;
        let result = f(self);
        self.wire.depth -= 1;
        let value = result?;

        self.wire.bytes.skip_whitespace();
        match self.peek() {
            Some(c) if c == close => {
                self.wire.bytes.read_u8();
            }
            found => return Err(WireError::malformed(if close == ']' { "]" } else { "}" }, found)),
        }
        trace!(%close, depth = self.wire.depth, "exit container");
        self.finish_value();
        Ok(value)
    }

    /// Binds `slot` to the record at the cursor and moves past it.
    fn bind<R: Byteable>(
        &mut self,
        slot: &mut Option<R>,
        length: impl FnOnce(&BytesStore, usize) -> Result<usize>,
    ) -> Result<()> {
        self.wire.bytes.skip_whitespace();
        let offset = self.wire.bytes.read_position();
        let store = Arc::clone(self.wire.bytes.store());
        let len = length(&store, offset)?;
        if len > self.wire.bytes.remaining() {
            return Err(WireError::BufferUnderflow {
                len,
                remaining: self.wire.bytes.remaining(),
            });
        }
        match slot {
            Some(reference) => reference.rebind(store, offset, len)?,
            None => *slot = Some(R::bind(store, offset, len)?),
        }
        self.wire.bytes.skip(len)?;
        if self.wire.bytes.peek_u8() == Some(b',') {
            self.wire.bytes.read_u8();
        } else {
            self.finish_value();
        }
        Ok(())
    }

    /// Reads any value as a generic tree with text leaves.
    fn read_tree(&mut self) -> Result<WireValue> {
        if self.is_null()? {
            return Ok(WireValue::Null);
        }
        self.wire.bytes.skip_whitespace();
        match self.peek() {
            Some('[') => self.sequence(|input| {
                let mut items = Vec::new();
                while input.has_next_sequence_item()? {
                    let start = input.wire.bytes.read_position();
                    let item = input.read_tree()?;
                    if input.wire.bytes.read_position() == start {
                        return Err(WireError::malformed("]", input.peek()));
                    }
                    items.push(item);
                }
                Ok(WireValue::Sequence(items))
            }),
            Some('{') => self.structured(|input| {
                let mut fields = Vec::new();
                loop {
                    input.wire.bytes.skip_whitespace();
                    if matches!(input.peek(), None | Some('}')) {
                        break;
                    }
                    let start = input.wire.bytes.read_position();
                    let name = input.read_name()?;
                    let value = input.read_tree()?;
                    if input.wire.bytes.read_position() == start {
                        return Err(WireError::malformed("}", input.peek()));
                    }
                    fields.push((name, value));
                }
                Ok(WireValue::Structured(fields))
            }),
            _ => Ok(self.text()?.map_or(WireValue::Null, WireValue::Text)),
        }
    }
}

impl ValueIn for QueryValueIn<'_> {
    type IntRef = IntTextReference;
    type LongRef = LongTextReference;
    type LongArrayRef = LongArrayTextReference;

    fn read_field<K: WireKey + ?Sized>(&mut self, key: &K) -> Result<&mut Self> {
        let start = self.wire.bytes.read_position();
        let name = self.read_name()?;
        if name.is_empty() || text_eq(&name, key.name()) {
            return Ok(self);
        }
        self.wire.bytes.set_read_position(start)?;
        debug!(expected = key.name(), found = %name, "unordered field");
        Err(WireError::UnorderedField {
            key: key.name().into(),
            found: name,
        })
    }

    fn is_null(&mut self) -> Result<bool> {
        self.wire.bytes.skip_whitespace();
        if !self.wire.bytes.peek_str_ignore_case(NULL_MARKER) {
            return Ok(false);
        }
        self.wire.bytes.skip(NULL_MARKER.len())?;
        self.value_token();
        Ok(true)
    }

    fn bool(&mut self) -> Result<bool> {
        self.required_token()?;
        let token = self.wire.token.trim_ascii();
        if token.eq_ignore_ascii_case(b"true") {
            Ok(true)
        } else if token.eq_ignore_ascii_case(b"false") {
            Ok(false)
        } else {
            Err(WireError::parse("bool", token.to_str_lossy()))
        }
    }

    fn text(&mut self) -> Result<Option<String>> {
        if self.is_null()? {
            return Ok(None);
        }
        self.value_token();
        self.decoded_text().map(Some)
    }

    fn text_to(&mut self, buf: &mut String) -> Result<bool> {
        buf.clear();
        if self.is_null()? {
            return Ok(false);
        }
        self.value_token();
        buf.push_str(&self.decoded_text()?);
        Ok(true)
    }

    fn int8(&mut self) -> Result<i8> {
        self.narrow("i8")
    }

    fn uint8(&mut self) -> Result<u8> {
        self.narrow("u8")
    }

    fn int16(&mut self) -> Result<i16> {
        self.narrow("i16")
    }

    fn uint16(&mut self) -> Result<u16> {
        self.narrow("u16")
    }

    fn int32(&mut self) -> Result<i32> {
        self.narrow("i32")
    }

    fn uint32(&mut self) -> Result<u32> {
        self.narrow("u32")
    }

    fn int64(&mut self) -> Result<i64> {
        self.parse("int64")
    }

    fn float32(&mut self) -> Result<f32> {
        self.parse("float32")
    }

    fn float64(&mut self) -> Result<f64> {
        self.parse("float64")
    }

    fn date(&mut self) -> Result<NaiveDate> {
        self.parse("date")
    }

    fn time(&mut self) -> Result<NaiveTime> {
        self.parse("time")
    }

    fn date_time(&mut self) -> Result<DateTime<Utc>> {
        self.required_token()?;
        let text = self.wire.token.to_str_lossy();
        DateTime::parse_from_rfc3339(text.trim())
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| WireError::parse("date_time", &*text))
    }

    fn uuid(&mut self) -> Result<Uuid> {
        self.required_token()?;
        let text = self.wire.token.to_str_lossy();
        Uuid::try_parse(text.trim()).map_err(|_| WireError::parse("uuid", &*text))
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        self.required_token()?;
        STANDARD
            .decode(self.wire.token.trim_ascii())
            .map_err(|_| WireError::parse("base64", self.wire.token.to_str_lossy()))
    }

    fn type_name(&mut self) -> Result<String> {
        self.wire.bytes.skip_whitespace();
        self.token(StopCharTester::TypeName);
        Ok(self.wire.token.to_str_lossy().into_owned())
    }

    fn bound_int32(&mut self, slot: &mut Option<IntTextReference>) -> Result<()> {
        self.bind(slot, |_, _| Ok(IntTextReference::LENGTH))
    }

    fn bound_int64(&mut self, slot: &mut Option<LongTextReference>) -> Result<()> {
        self.bind(slot, |_, _| Ok(LongTextReference::LENGTH))
    }

    fn bound_int64_array(&mut self, slot: &mut Option<LongArrayTextReference>) -> Result<()> {
        self.bind(slot, LongArrayTextReference::peek_length)
    }

    fn sequence<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.container('[', ']', f)
    }

    /// Anything other than `]` (or the end of input) counts as another item,
    /// so malformed input surfaces in the following value read.
    fn has_next_sequence_item(&mut self) -> Result<bool> {
        self.wire.bytes.skip_whitespace();
        match self.wire.bytes.peek_u8() {
            Some(b',') => {
                self.wire.bytes.read_u8();
                Ok(true)
            }
            Some(b']') | None => Ok(false),
            Some(_) => Ok(true),
        }
    }

    fn structured<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.container('{', '}', f)
    }

    fn map(&mut self) -> Result<BTreeMap<OrdinalKey, WireValue>> {
        debug!(operation = "map", "unsupported by query wire");
        Err(WireError::Unsupported("map"))
    }

    fn has_next(&mut self) -> bool {
        self.wire.bytes.remaining() > 0
    }

    fn read_as(&mut self, kind: ValueKind, using: Option<WireValue>) -> Result<WireValue> {
        if self.is_null()? {
            return Ok(WireValue::Null);
        }
        Ok(match kind {
            ValueKind::Structured => self.read_tree()?,
            ValueKind::TextBuilder => {
                let mut buf = match using {
                    Some(WireValue::Text(buf)) => buf,
                    _ => String::new(),
                };
                self.text_to(&mut buf)?;
                WireValue::Text(buf)
            }
            ValueKind::Text => self.text()?.map_or(WireValue::Null, WireValue::Text),
            ValueKind::Int64 => WireValue::Int64(self.int64()?),
            ValueKind::Int32 => WireValue::Int32(self.int32()?),
            ValueKind::Int16 => WireValue::Int16(self.int16()?),
            ValueKind::Int8 => WireValue::Int8(self.int8()?),
            ValueKind::Float32 => WireValue::Float32(self.float32()?),
            ValueKind::Float64 => WireValue::Float64(self.float64()?),
            ValueKind::Char => self
                .text()?
                .and_then(|text| text.chars().next())
                .map_or(WireValue::Null, WireValue::Char),
            ValueKind::Bytes => WireValue::Bytes(self.bytes()?),
            ValueKind::Map => WireValue::Map(self.map()?),
        })
    }
}
