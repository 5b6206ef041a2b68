/// Configuration options for [`QueryWire`](crate::QueryWire).
///
/// # Examples
///
/// ```rust
/// use querywire::{QueryWire, QueryWireOptions};
///
/// let wire = QueryWire::with_options(
///     256,
///     QueryWireOptions {
///         strict_escapes: true,
///         ..Default::default()
///     },
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWireOptions {
    /// Whether text values and field names are percent-escaped on write.
    ///
    /// Every byte that would otherwise be read back as structure (`%`, `&`,
    /// `=`, `,`, `[`, `]`, `{`, `}`, `!`), whitespace and control bytes are
    /// written as `%XX` with upper-case hex digits. Reads always decode
    /// `%XX`, so turning this off only makes sense when the caller knows the
    /// text is free of reserved bytes.
    ///
    /// # Default
    ///
    /// `true`
    pub escape_text: bool,

    /// Whether a `%` that is not followed by two hex digits is an error.
    ///
    /// When `false` the `%` and whatever follows it are kept literally.
    ///
    /// # Default
    ///
    /// `false`
    pub strict_escapes: bool,
}

impl Default for QueryWireOptions {
    fn default() -> Self {
        Self {
            escape_text: true,
            strict_escapes: false,
        }
    }
}
