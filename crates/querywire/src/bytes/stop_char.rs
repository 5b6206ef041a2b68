/// Decides where a text token ends.
///
/// Testers see one code point at a time; `None` is the end-of-input
/// sentinel and always stops a token. The stop character itself is never
/// consumed by the tokenizer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StopCharTester {
    /// Field names at the top level: `&`, `=`, end.
    QueryFieldName,
    /// Values at the top level: `&`, end.
    QueryValue,
    /// Field names inside `{...}`: also stops at `,` and `}`.
    NestedFieldName,
    /// Values inside `[...]` or `{...}`: also stops at `,`, `]` and `}`.
    NestedValue,
    /// A type tag, terminated by whitespace or any value terminator.
    TypeName,
}

impl StopCharTester {
    #[inline]
    #[must_use]
    pub fn is_stop_char(self, ch: Option<char>) -> bool {
        let Some(ch) = ch else {
            return true;
        };
        match self {
            Self::QueryFieldName => matches!(ch, '&' | '='),
            Self::QueryValue => ch == '&',
            Self::NestedFieldName => matches!(ch, '&' | '=' | ',' | '}'),
            Self::NestedValue => matches!(ch, '&' | ',' | ']' | '}'),
            Self::TypeName => ch.is_whitespace() || matches!(ch, '&' | ',' | ']' | '}'),
        }
    }

    pub(crate) fn field_name(nested: bool) -> Self {
        if nested {
            Self::NestedFieldName
        } else {
            Self::QueryFieldName
        }
    }

    pub(crate) fn value(nested: bool) -> Self {
        if nested { Self::NestedValue } else { Self::QueryValue }
    }
}
