//! Attribute tokenizing for a single raw tag.
//!
//! The parser is a character state machine over the raw tag text, e.g.
//! `<a href="x" id='y'>`. Values are stored verbatim: a backslash before the
//! closing quote keeps the value open but stays in the captured value.

use std::collections::BTreeMap;

use crate::error::{ErrorPhase, ParseError};

/// Attribute name to value mapping. Boolean attributes map to `None`.
pub type Attributes = BTreeMap<String, Option<String>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    TagName,
    SeekingName,
    ReadingName,
    SeekingValue,
    ReadingValue(char),
}

/// Parse the attributes of the first tag in `tag`.
///
/// Scanning stops at the first `>` outside a quoted value, so the raw
/// content of a collapsed leaf can be passed as-is. Input that does not
/// start with `<` is treated as a bare attribute list.
pub fn parse_attributes(tag: &str) -> Result<Attributes, ParseError> {
    let mut attrs = Attributes::new();
    let mut state = if tag.starts_with('<') {
        State::TagName
    } else {
        State::SeekingName
    };
    let mut name = String::new();
    let mut value = String::new();

    for (index, c) in tag.chars().enumerate() {
        match state {
            State::TagName => {
                if c == '>' {
                    return Ok(attrs);
                }
                if c.is_whitespace() {
                    state = State::SeekingName;
                }
            }
            State::SeekingName => match c {
                '>' => return Ok(attrs),
                '/' => {}
                '=' => return Err(wild('=', index)),
                '"' | '\'' => return Err(wild(c, index)),
                _ if c.is_whitespace() => {}
                _ => {
                    name.push(c);
                    state = State::ReadingName;
                }
            },
            State::ReadingName => match c {
                '=' => state = State::SeekingValue,
                '>' => {
                    commit(&mut attrs, &mut name, None);
                    return Ok(attrs);
                }
                '/' => {
                    commit(&mut attrs, &mut name, None);
                    state = State::SeekingName;
                }
                '"' | '\'' => return Err(wild(c, index)),
                _ if c.is_whitespace() => state = State::SeekingValue,
                _ => name.push(c),
            },
            State::SeekingValue => match c {
                '"' | '\'' => {
                    value.clear();
                    state = State::ReadingValue(c);
                }
                '=' => {}
                '>' => {
                    commit(&mut attrs, &mut name, None);
                    return Ok(attrs);
                }
                '/' => {
                    commit(&mut attrs, &mut name, None);
                    state = State::SeekingName;
                }
                _ if c.is_whitespace() => {}
                _ => {
                    // No value follows: the pending name was a boolean attribute.
                    commit(&mut attrs, &mut name, None);
                    name.push(c);
                    state = State::ReadingName;
                }
            },
            State::ReadingValue(quote) => {
                if c == quote && !value.ends_with('\\') {
                    let captured = core::mem::take(&mut value);
                    commit(&mut attrs, &mut name, Some(captured));
                    state = State::SeekingName;
                } else {
                    value.push(c);
                }
            }
        }
    }

    match state {
        State::ReadingName | State::SeekingValue => commit(&mut attrs, &mut name, None),
        State::ReadingValue(quote) => {
            return Err(ParseError::new(
                ErrorPhase::Attributes,
                "UNTERMINATED_VALUE",
                format!("attribute value opened with {} is never closed", quote),
            )
            .with_offset(tag.chars().count()));
        }
        State::TagName | State::SeekingName => {}
    }
    Ok(attrs)
}

/// Look up a valued attribute.
pub fn value_of<'a>(attrs: &'a Attributes, name: &str) -> Option<&'a str> {
    attrs.get(name).and_then(|value| value.as_deref())
}

fn commit(attrs: &mut Attributes, name: &mut String, value: Option<String>) {
    let name = core::mem::take(name);
    if name.is_empty() {
        return;
    }
    // First occurrence wins, as in HTML.
    attrs.entry(name).or_insert(value);
}

fn wild(c: char, index: usize) -> ParseError {
    let code = if c == '=' { "WILD_EQUALS" } else { "WILD_QUOTE" };
    ParseError::new(
        ErrorPhase::Attributes,
        code,
        format!("wild {} discovered at position {}", c, index),
    )
    .with_offset(index)
}
