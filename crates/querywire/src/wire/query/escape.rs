//! `%XX` escaping of text values and field names.

use alloc::{borrow::Cow, string::String, vec::Vec};

use crate::error::{Result, WireError};

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Characters that would otherwise be read back as structure, skipped as
/// whitespace, or mistaken for a `!!` marker.
fn needs_escape(c: char) -> bool {
    matches!(c, '%' | '&' | '=' | ',' | '[' | ']' | '{' | '}' | '!') || c.is_whitespace() || c.is_control()
}

pub(crate) fn escape(text: &str) -> Cow<'_, str> {
    if !text.chars().any(needs_escape) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    let mut buf = [0; 4];
    for c in text.chars() {
        if !needs_escape(c) {
            out.push(c);
            continue;
        }
        for b in c.encode_utf8(&mut buf).bytes() {
            out.push('%');
            out.push(char::from(HEX[usize::from(b >> 4)]));
            out.push(char::from(HEX[usize::from(b & 0xF)]));
        }
    }
    Cow::Owned(out)
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decodes `%XX` sequences. A `%` without two hex digits after it is kept
/// as-is unless `strict` is set.
pub(crate) fn unescape(raw: &[u8], strict: bool) -> Result<Cow<'_, [u8]>> {
    if !raw.contains(&b'%') {
        return Ok(Cow::Borrowed(raw));
    }
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' {
            let hi = raw.get(i + 1).copied().and_then(hex_value);
            let lo = raw.get(i + 2).copied().and_then(hex_value);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push((hi << 4) | lo);
                i += 3;
                continue;
            }
            if strict {
                let found = raw
                    .iter()
                    .skip(i + 1)
                    .find(|b| hex_value(**b).is_none())
                    .map(|b| char::from(*b));
                return Err(WireError::malformed("two hex digits after %", found));
            }
        }
        out.push(raw[i]);
        i += 1;
    }
    Ok(Cow::Owned(out))
}
