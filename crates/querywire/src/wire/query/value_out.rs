use alloc::collections::BTreeMap;
use core::{fmt, mem};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use tracing::{debug, trace};
use uuid::Uuid;

use super::{OutState, QueryWire, Separator, escape::escape, value_in::EMPTY_MARKER};
use crate::{
    comparator::OrdinalKey,
    error::{Result, WireError},
    values::{IntTextReference, LongArrayTextReference, LongTextReference, fixed_decimal},
    wire::{ValueOut, WireKey, WireValue},
};

/// The sink of a [`QueryWire`].
#[derive(Debug)]
pub struct QueryValueOut<'w> {
    wire: &'w mut QueryWire,
}

impl<'w> QueryValueOut<'w> {
    pub(super) fn new(wire: &'w mut QueryWire) -> Self {
        Self { wire }
    }

    /// Pending separator, then the pending field name.
    fn prefix(&mut self) -> Result<()> {
        let wire = &mut *self.wire;
        wire.bytes.write_bytes(wire.out.separator.as_bytes())?;
        wire.out.separator = Separator::None;
        if let Some(name) = wire.out.field_name.take() {
            if wire.options.escape_text {
                wire.bytes.append_str(&escape(&name))?;
            } else {
                wire.bytes.append_str(&name)?;
            }
            wire.bytes.write_u8(b'=')?;
        }
        Ok(())
    }

    fn suffix(&mut self) {
        let out = &mut self.wire.out;
        out.separator = if out.nested {
            Separator::Element
        } else {
            Separator::Field
        };
    }

    fn display(&mut self, value: impl fmt::Display) -> Result<()> {
        self.prefix()?;
        self.wire.bytes.append_display(value)?;
        self.suffix();
        Ok(())
    }

    fn escaped(&mut self, text: &str) -> Result<()> {
        self.prefix()?;
        if text.is_empty() {
            self.wire.bytes.append_str(EMPTY_MARKER)?;
        } else if self.wire.options.escape_text {
            self.wire.bytes.append_str(&escape(text))?;
        } else {
            self.wire.bytes.append_str(text)?;
        }
        self.suffix();
        Ok(())
    }

    /// Runs `f` one level deeper between `open` and `close`.
    fn container<F>(&mut self, open: u8, close: u8, trailing: bool, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.prefix()?;
        self.wire.bytes.write_u8(open)?;
        trace!(open = %char::from(open), "enter container");

        let outer = mem::replace(&mut self.wire.out, OutState::nested());
        let start = self.wire.bytes.write_position();
        let result = f(self);
        self.wire.out = outer;
        result?;

        if trailing && self.wire.bytes.write_position() > start {
            self.wire.bytes.write_u8(b',')?;
        }
        self.wire.bytes.write_u8(close)?;
        trace!(close = %char::from(close), "exit container");
        self.suffix();
        Ok(())
    }

    fn unsupported(what: &'static str) -> Result<()> {
        debug!(operation = what, "unsupported by query wire");
        Err(WireError::Unsupported(what))
    }
}

impl ValueOut for QueryValueOut<'_> {
    fn write_field<K: WireKey + ?Sized>(&mut self, key: &K) -> &mut Self {
        self.wire.out.field_name = Some(key.name().into());
        self
    }

    fn bool(&mut self, value: Option<bool>) -> Result<()> {
        match value {
            Some(v) => self.display(v),
            None => {
                self.wire.out.field_name = None;
                Ok(())
            }
        }
    }

    fn text(&mut self, value: Option<&str>) -> Result<()> {
        match value {
            Some(v) => self.escaped(v),
            None => {
                self.wire.out.field_name = None;
                Ok(())
            }
        }
    }

    fn int8(&mut self, value: i8) -> Result<()> {
        self.display(value)
    }

    fn uint8(&mut self, value: u8) -> Result<()> {
        self.display(value)
    }

    fn int16(&mut self, value: i16) -> Result<()> {
        self.display(value)
    }

    fn uint16(&mut self, value: u16) -> Result<()> {
        self.display(value)
    }

    fn int32(&mut self, value: i32) -> Result<()> {
        self.display(value)
    }

    fn uint32(&mut self, value: u32) -> Result<()> {
        self.display(value)
    }

    fn int64(&mut self, value: i64) -> Result<()> {
        self.display(value)
    }

    fn float32(&mut self, value: f32) -> Result<()> {
        self.display(value)
    }

    fn float64(&mut self, value: f64) -> Result<()> {
        self.display(value)
    }

    fn utf8(&mut self, value: char) -> Result<()> {
        let mut buf = [0; 4];
        self.escaped(value.encode_utf8(&mut buf))
    }

    fn date(&mut self, value: NaiveDate) -> Result<()> {
        self.display(value)
    }

    fn time(&mut self, value: NaiveTime) -> Result<()> {
        self.display(value)
    }

    fn date_time(&mut self, value: DateTime<Utc>) -> Result<()> {
        self.display(value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    fn uuid(&mut self, value: Uuid) -> Result<()> {
        self.display(value.hyphenated())
    }

    fn bytes(&mut self, value: &[u8]) -> Result<()> {
        self.display(STANDARD.encode(value))
    }

    fn raw_bytes(&mut self, _value: &[u8]) -> Result<()> {
        Self::unsupported("raw_bytes")
    }

    fn type_name(&mut self, name: &str) -> Result<()> {
        self.prefix()?;
        self.wire.bytes.append_str(name)?;
        self.wire.out.separator = Separator::Space;
        Ok(())
    }

    fn type_literal(&mut self, _name: &str) -> Result<()> {
        Self::unsupported("type_literal")
    }

    fn comment(&mut self, _text: &str) -> Result<()> {
        Self::unsupported("comment")
    }

    fn int32_for_binding(&mut self, value: i32) -> Result<()> {
        // Reject before the field name goes out.
        fixed_decimal(i64::from(value), IntTextReference::DIGITS)?;
        self.prefix()?;
        IntTextReference::write(&mut self.wire.bytes, value)?;
        self.suffix();
        Ok(())
    }

    fn int64_for_binding(&mut self, value: i64) -> Result<()> {
        self.prefix()?;
        LongTextReference::write(&mut self.wire.bytes, value)?;
        self.suffix();
        Ok(())
    }

    fn int64_array_for_binding(&mut self, capacity: usize) -> Result<()> {
        self.prefix()?;
        LongArrayTextReference::write(&mut self.wire.bytes, capacity)?;
        self.suffix();
        Ok(())
    }

    fn sequence<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.container(b'[', b']', true, f)
    }

    fn structured<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        self.container(b'{', b'}', false, f)
    }

    fn map(&mut self, _value: &BTreeMap<OrdinalKey, WireValue>) -> Result<()> {
        Self::unsupported("map")
    }
}
