//! Macro syntax error types

/// Error returned when a macro token cannot be split into name and context
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MacroSyntaxError {
    /// Nothing before the context separator
    #[error("macro name is empty")]
    EmptyName,
    /// Name contains a character outside `A-Z`, `0-9`, `_` and `.`
    #[error("invalid character {ch:?} in macro name at offset {offset}")]
    InvalidNameChar {
        /// Offending character
        ch: char,
        /// Byte offset in the raw token
        offset: usize,
    },
    /// Token starts with `{$` but has no closing `}`
    #[error("macro is missing its closing brace")]
    Unterminated,
    /// Quoted context has no closing quote
    #[error("quoted macro context is not terminated")]
    UnterminatedQuote,
    /// Something other than whitespace follows a quoted context
    #[error("unexpected characters after quoted context at offset {offset}")]
    TrailingCharacters {
        /// Byte offset in the raw token
        offset: usize,
    },
}
