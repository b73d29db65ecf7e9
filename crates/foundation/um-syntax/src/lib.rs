//! User macro token parsing
//!
//! Splits a user macro such as `{$NAME}` or `{$NAME:context}` into its name
//! and optional context. The surrounding `{$` `}` delimiters are optional.

mod error;

pub use error::MacroSyntaxError;

use std::borrow::Cow;
use std::fmt;

/// Length of the `{$` opening delimiter
const OPEN_LEN: usize = 2;

/// A parsed user macro reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroToken<'src> {
    /// Macro name without delimiters
    pub name: &'src str,
    /// Context after the first `:`, unquoted if it was quoted
    pub context: Option<Cow<'src, str>>,
}

impl MacroToken<'_> {
    /// Context as a plain string slice
    #[must_use]
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }
}

/// Renders the delimited form, quoting the context when needed
///
/// The output parses back to an equal token, except for a context that
/// starts with `"` and also has a backslash at its end or before a `"`.
/// No quoted or unquoted form can express such a context.
impl fmt::Display for MacroToken<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.context() {
            None => write!(formatter, "{{${}}}", self.name),
            Some(context) if needs_quoting(context) => write!(
                formatter,
                "{{${}:\"{}\"}}",
                self.name,
                context.replace('"', "\\\"")
            ),
            Some(context) => write!(formatter, "{{${}:{}}}", self.name, context),
        }
    }
}

/// Returns true for characters allowed in a macro name
#[must_use]
pub fn is_name_char(ch: char) -> bool {
    ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_' || ch == '.'
}

/// Parse a raw macro token into name and context
///
/// # Errors
///
/// Returns a [`MacroSyntaxError`] if the name is empty or contains
/// disallowed characters, if the delimiters are unbalanced, or if a quoted
/// context is malformed.
pub fn parse_user_macro(raw: &str) -> Result<MacroToken<'_>, MacroSyntaxError> {
    let (body, base) = match raw.strip_prefix("{$") {
        Some(rest) => (
            rest.strip_suffix('}').ok_or(MacroSyntaxError::Unterminated)?,
            OPEN_LEN,
        ),
        None => (raw, 0),
    };

    let (name, context) = match body.split_once(':') {
        Some((name, context)) => (name, Some(context)),
        None => (body, None),
    };

    if name.is_empty() {
        return Err(MacroSyntaxError::EmptyName);
    }
    if let Some((offset, ch)) = name.char_indices().find(|&(_, ch)| !is_name_char(ch)) {
        return Err(MacroSyntaxError::InvalidNameChar {
            ch,
            offset: base + offset,
        });
    }

    let context = context
        .map(|text| parse_context(text, base + name.len() + 1))
        .transpose()?;

    Ok(MacroToken { name, context })
}

/// Parse the context part; `offset` is its position in the raw token
fn parse_context(text: &str, offset: usize) -> Result<Cow<'_, str>, MacroSyntaxError> {
    let Some(quoted) = text.strip_prefix('"') else {
        return Ok(Cow::Borrowed(text));
    };

    let mut escaped = false;
    for (index, ch) in quoted.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => {
                let tail = &quoted[index + 1..];
                if let Some(pos) = tail.find(|ch: char| !ch.is_whitespace()) {
                    return Err(MacroSyntaxError::TrailingCharacters {
                        offset: offset + 1 + index + 1 + pos,
                    });
                }
                let inner = &quoted[..index];
                return Ok(if inner.contains("\\\"") {
                    Cow::Owned(inner.replace("\\\"", "\""))
                } else {
                    Cow::Borrowed(inner)
                });
            }
            _ => {}
        }
    }

    Err(MacroSyntaxError::UnterminatedQuote)
}

/// Quoting is required for a leading `"` and cosmetic for `}`; the latter
/// is dropped when escaping could not be read back
fn needs_quoting(context: &str) -> bool {
    context.starts_with('"') || (context.contains('}') && escapes_cleanly(context))
}

/// True if `\"` escaping of `context` survives a parse
fn escapes_cleanly(context: &str) -> bool {
    !context.ends_with('\\') && !context.contains("\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_name() {
        let token = parse_user_macro("{$SNMP_COMMUNITY}").unwrap();
        assert_eq!(token.name, "SNMP_COMMUNITY");
        assert_eq!(token.context(), None);
    }

    #[test]
    fn test_bare_body_with_context() {
        let token = parse_user_macro("LOW_SPACE_LIMIT:/var").unwrap();
        assert_eq!(token.name, "LOW_SPACE_LIMIT");
        assert_eq!(token.context(), Some("/var"));
    }

    #[test]
    fn test_context_is_taken_verbatim() {
        let token = parse_user_macro("{$IF.NAME:eth0:1 }").unwrap();
        assert_eq!(token.name, "IF.NAME");
        assert_eq!(token.context(), Some("eth0:1 "));
    }

    #[test]
    fn test_empty_context_differs_from_none() {
        let token = parse_user_macro("{$A:}").unwrap();
        assert_eq!(token.context(), Some(""));
    }

    #[test]
    fn test_quoted_context() {
        let token = parse_user_macro(r#"{$PATH:"C:\\data \"x\""}"#).unwrap();
        assert_eq!(token.context(), Some(r#"C:\\data "x""#));

        let borrowed = parse_user_macro(r#"{$PATH:"a}b"  }"#).unwrap();
        assert!(matches!(borrowed.context, Some(Cow::Borrowed("a}b"))));
    }

    #[test]
    fn test_invalid_tokens() {
        assert_eq!(parse_user_macro("{$}"), Err(MacroSyntaxError::EmptyName));
        assert_eq!(parse_user_macro(":ctx"), Err(MacroSyntaxError::EmptyName));
        assert_eq!(parse_user_macro("{$NAME"), Err(MacroSyntaxError::Unterminated));
        assert_eq!(
            parse_user_macro("{$lower}"),
            Err(MacroSyntaxError::InvalidNameChar { ch: 'l', offset: 2 })
        );
        assert_eq!(
            parse_user_macro("BAD NAME"),
            Err(MacroSyntaxError::InvalidNameChar { ch: ' ', offset: 3 })
        );
        assert_eq!(
            parse_user_macro(r#"{$A:"open}"#),
            Err(MacroSyntaxError::UnterminatedQuote)
        );
        assert_eq!(
            parse_user_macro(r#"{$A:"x"y}"#),
            Err(MacroSyntaxError::TrailingCharacters { offset: 7 })
        );
    }

    #[test]
    fn test_display_quotes_when_needed() {
        let token = parse_user_macro(r#"{$A:"x}\"y"}"#).unwrap();
        let rendered = token.to_string();
        assert_eq!(rendered, r#"{$A:"x}\"y"}"#);
        assert_eq!(parse_user_macro(&rendered).unwrap(), token);

        assert_eq!(parse_user_macro("B:ctx").unwrap().to_string(), "{$B:ctx}");

        let trailing_backslash = MacroToken {
            name: "A",
            context: Some(Cow::Borrowed("x}\\")),
        };
        let rendered = trailing_backslash.to_string();
        assert_eq!(rendered, r"{$A:x}\}");
        assert_eq!(parse_user_macro(&rendered).unwrap(), trailing_backslash);

        let escaped_quote = MacroToken {
            name: "A",
            context: Some(Cow::Borrowed(r#"a\"}"#)),
        };
        assert_eq!(parse_user_macro(&escaped_quote.to_string()).unwrap(), escaped_quote);
    }
}
