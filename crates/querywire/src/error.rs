use alloc::string::String;

use thiserror::Error;

/// The fault taxonomy every [`WireError`] belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FaultKind {
    /// A caller passed an argument the operation cannot accept.
    InvalidArgument,
    /// The stored data or the requested conversion is inconsistent.
    IllegalState,
    /// The input does not follow the wire grammar.
    Malformed,
    /// The wire format does not implement the operation.
    Unsupported,
    /// A named read found a different field.
    UnorderedField,
    /// A cursor or store access went out of bounds.
    Bounds,
    /// The operating system failed to provide a shared region.
    Io,
}

#[derive(Error, Debug)]
pub enum WireError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("illegal state: {0}")]
    IllegalState(String),
    #[error("expected {expected} but got {}", describe(.found))]
    Malformed {
        expected: &'static str,
        found: Option<char>,
    },
    #[error("cannot parse {what} from {text:?}")]
    Parse { what: &'static str, text: String },
    #[error("{0} is not supported by this wire format")]
    Unsupported(&'static str),
    #[error("unordered fields not supported yet, key={key}, was={found}")]
    UnorderedField { key: String, found: String },
    #[error("{len} bytes at offset {offset} exceed capacity {capacity}")]
    BufferOverflow {
        offset: usize,
        len: usize,
        capacity: usize,
    },
    #[error("cannot read {len} bytes, only {remaining} remaining")]
    BufferUnderflow { len: usize, remaining: usize },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    /// Returns the taxonomy bucket of this error.
    #[must_use]
    pub fn kind(&self) -> FaultKind {
        match self {
            Self::InvalidArgument(_) => FaultKind::InvalidArgument,
            Self::IllegalState(_) => FaultKind::IllegalState,
            Self::Malformed { .. } | Self::Parse { .. } => FaultKind::Malformed,
            Self::Unsupported(_) => FaultKind::Unsupported,
            Self::UnorderedField { .. } => FaultKind::UnorderedField,
            Self::BufferOverflow { .. } | Self::BufferUnderflow { .. } => FaultKind::Bounds,
            Self::Io(_) => FaultKind::Io,
        }
    }

    pub(crate) fn malformed(expected: &'static str, found: Option<char>) -> Self {
        Self::Malformed { expected, found }
    }

    pub(crate) fn parse(what: &'static str, text: impl Into<String>) -> Self {
        Self::Parse {
            what,
            text: text.into(),
        }
    }
}

/// Renders the offending character and its code point, `-1` at end of input.
fn describe(found: &Option<char>) -> String {
    match found {
        Some(c) => alloc::format!("{c:?} ({})", u32::from(*c)),
        None => String::from("end of input (-1)"),
    }
}

pub type Result<T, E = WireError> = core::result::Result<T, E>;
