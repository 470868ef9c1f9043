//! Textual framings and their delimiters.
//!
//! ```text
//! row            1,'Ann',30
//! row set        [1,'Ann',30],[2,'Bo',41]
//! message        {id:1,name:'Ann',age:30}
//! message batch  [{id:1,name:'Ann',age:30};{id:2,name:'Bo',age:41}]
//! predicate      id=1 AND name='Ann'        (WHERE)
//!                age=31, name='Bo'          (SET)
//! ```
//!
//! String literals are enclosed in single quotes and carry no escapes.
//! Splitting ignores delimiters inside quotes, so a literal may contain
//! commas, brackets or braces but never a single quote.

use crate::error::ProtocolError;

/// Separates field values in a row and `name:value` pairs in a message.
pub const FIELD_SEPARATOR: &str = ",";

/// Separates a field name from its value in a message.
pub const PAIR_SEPARATOR: char = ':';

/// Joins rows inside a row set.
pub const ROW_DELIMITER: &str = "],[";

/// Joins messages inside a message batch.
pub const MESSAGE_DELIMITER: &str = ";";

/// Joins rows of a multi-row insert body.
pub const INSERT_ROW_DELIMITER: &str = "),(";

/// Absence in row and predicate framings.
pub const NULL_LITERAL: &str = "NULL";

/// Absence in message framing.
pub const NULL_MESSAGE_LITERAL: &str = "null";

/// Quote enclosing string-like literals.
pub const QUOTE: char = '\'';

/// The framing a value is encoded into or decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Framing {
    Row,
    Message,
    Predicate,
}

impl Framing {
    pub fn name(&self) -> &'static str {
        match self {
            Framing::Row => "row",
            Framing::Message => "message",
            Framing::Predicate => "predicate",
        }
    }

    /// Literal written for an absent value.
    pub fn null_literal(&self) -> &'static str {
        match self {
            Framing::Row | Framing::Predicate => NULL_LITERAL,
            Framing::Message => NULL_MESSAGE_LITERAL,
        }
    }
}

/// Joins predicate terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    /// `" AND "`, for WHERE clauses.
    Where,
    /// `", "`, for SET clauses.
    Set,
}

impl Conjunction {
    pub fn separator(&self) -> &'static str {
        match self {
            Conjunction::Where => " AND ",
            Conjunction::Set => ", ",
        }
    }
}

/// Splits `text` on `delimiter`, ignoring delimiters inside quotes.
///
/// Segments are trimmed of surrounding whitespace.
pub fn split_top_level<'a>(
    text: &'a str,
    delimiter: &str,
    framing: &'static str,
) -> Result<Vec<&'a str>, ProtocolError> {
    let bytes = text.as_bytes();
    let delim = delimiter.as_bytes();
    let mut segments = Vec::new();
    let mut in_quote = false;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == QUOTE as u8 {
            in_quote = !in_quote;
            i += 1;
        } else if !in_quote && bytes[i..].starts_with(delim) {
            segments.push(text[start..i].trim());
            i += delim.len();
            start = i;
        } else {
            i += 1;
        }
    }

    if in_quote {
        return Err(ProtocolError::malformed(
            framing,
            "unterminated string literal",
        ));
    }
    segments.push(text[start..].trim());
    Ok(segments)
}

/// Strips one pair of enclosing characters from trimmed `text`.
pub fn strip_enclosing<'a>(
    text: &'a str,
    open: char,
    close: char,
    framing: &'static str,
) -> Result<&'a str, ProtocolError> {
    let trimmed = text.trim();
    trimmed
        .strip_prefix(open)
        .and_then(|rest| rest.strip_suffix(close))
        .ok_or_else(|| {
            ProtocolError::malformed(framing, format!("expected enclosing '{}' and '{}'", open, close))
        })
}

/// Splits one row into its field texts.
pub fn split_row(row: &str) -> Result<Vec<&str>, ProtocolError> {
    split_top_level(row, FIELD_SEPARATOR, "row")
}

/// Splits a bracketed row set into row texts. `[]` holds no rows.
pub fn split_row_set(text: &str) -> Result<Vec<&str>, ProtocolError> {
    let inner = strip_enclosing(text, '[', ']', "row set")?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    split_top_level(inner, ROW_DELIMITER, "row set")
}

/// Encloses encoded rows into a row set.
pub fn join_row_set<S: AsRef<str>>(rows: &[S]) -> String {
    join_enclosed(rows, ROW_DELIMITER)
}

/// Splits a bracketed message batch into message texts. `[]` holds none.
pub fn split_message_batch(text: &str) -> Result<Vec<&str>, ProtocolError> {
    let inner = strip_enclosing(text, '[', ']', "message batch")?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    split_top_level(inner, MESSAGE_DELIMITER, "message batch")
}

/// Encloses encoded messages into a message batch.
pub fn join_message_batch<S: AsRef<str>>(messages: &[S]) -> String {
    join_enclosed(messages, MESSAGE_DELIMITER)
}

/// Splits one braced message into its `name:value` pair texts.
pub fn split_message(text: &str) -> Result<Vec<&str>, ProtocolError> {
    let inner = strip_enclosing(text, '{', '}', "message")?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    split_top_level(inner, FIELD_SEPARATOR, "message")
}

/// Splits a `name:value` pair at the first separator.
pub fn split_pair(pair: &str) -> Result<(&str, &str), ProtocolError> {
    pair.split_once(PAIR_SEPARATOR)
        .map(|(name, value)| (name.trim(), value.trim()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| ProtocolError::malformed("message", format!("invalid pair {:?}", pair)))
}

fn join_enclosed<S: AsRef<str>>(parts: &[S], delimiter: &str) -> String {
    let mut out = String::from("[");
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push_str(delimiter);
        }
        out.push_str(part.as_ref());
    }
    out.push(']');
    out
}
