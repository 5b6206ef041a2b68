//! Canonical ordering of text keys.

use alloc::string::String;
use core::{cmp::Ordering, fmt};

/// Orders text first by its length in code points, then code point by code
/// point.
///
/// ```rust
/// use core::cmp::Ordering;
/// use querywire::compare_text;
///
/// assert_eq!(compare_text("zz", "aaa"), Ordering::Less);
/// assert_eq!(compare_text("ab", "aa"), Ordering::Greater);
/// ```
#[must_use]
pub fn compare_text(a: &str, b: &str) -> Ordering {
    a.chars()
        .count()
        .cmp(&b.chars().count())
        .then_with(|| a.chars().cmp(b.chars()))
}

/// Ordinal equality, i.e. `compare_text(a, b) == Ordering::Equal`.
#[inline]
#[must_use]
pub fn text_eq(a: &str, b: &str) -> bool {
    a == b
}

/// A text key ordered by [`compare_text`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(any(test, feature = "serde"), derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(any(test, feature = "serde"), serde(transparent))]
pub struct OrdinalKey(pub String);

impl OrdinalKey {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for OrdinalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_text(&self.0, &other.0)
    }
}

impl PartialOrd for OrdinalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<&str> for OrdinalKey {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<String> for OrdinalKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for OrdinalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
