//! Minimal display formats: `"[FirstName] [LastName]"`
//!
//! A format is literal text with bracketed property paths. Paths may cross
//! entity references (`[Owner.FirstName]`). A null anywhere along a path
//! renders as empty text.

use crate::error::{Error, Result};
use crate::identity::EntityId;
use crate::model::Model;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Token(String),
}

/// A parsed display format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    source: String,
    segments: Vec<Segment>,
}

impl Format {
    /// Parse a format string
    ///
    /// `[[` and `]]` escape literal brackets.
    pub fn parse(source: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidFormat {
            format: source.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '[' if chars.peek() == Some(&'[') => {
                    chars.next();
                    literal.push('[');
                }
                ']' if chars.peek() == Some(&']') => {
                    chars.next();
                    literal.push(']');
                }
                '[' => {
                    let mut token = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some('[') => return Err(invalid("nested '['")),
                            Some(t) => token.push(t),
                            None => return Err(invalid("unterminated '['")),
                        }
                    }
                    let token = token.trim().to_string();
                    if token.is_empty() {
                        return Err(invalid("empty token"));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Token(token));
                }
                ']' => return Err(invalid("unmatched ']'")),
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// The original format string
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the format references any property
    pub fn has_tokens(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Token(_)))
    }

    /// Property paths referenced by the format, in order of appearance
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Token(path) => Some(path.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Render the format against an entity
    pub fn evaluate(&self, model: &Model, entity: EntityId) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Token(path) => out.push_str(&render_path(model, entity, path)?),
            }
        }
        Ok(out)
    }
}

fn render_path(model: &Model, entity: EntityId, path: &str) -> Result<String> {
    let mut current = entity;
    let mut steps = path.split('.').map(str::trim).peekable();

    while let Some(step) = steps.next() {
        let value = model.get(current, step)?;
        if steps.peek().is_none() {
            return match value {
                Value::Entity(related) => model.display(related),
                other => Ok(other.to_string()),
            };
        }
        match value {
            Value::Entity(related) => current = related,
            Value::Null => return Ok(String::new()),
            other => {
                return Err(Error::invalid_path(
                    path,
                    format!("'{}' is a {}, not an entity reference", step, other.type_name()),
                ))
            }
        }
    }
    Ok(String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tokens_and_literals() {
        let format = Format::parse("[FirstName] [LastName]").unwrap();
        assert!(format.has_tokens());
        assert_eq!(format.paths().collect::<Vec<_>>(), vec!["FirstName", "LastName"]);
    }

    #[test]
    fn test_plain_text_has_no_tokens() {
        let format = Format::parse("Phone number").unwrap();
        assert!(!format.has_tokens());
        assert_eq!(format.source(), "Phone number");
    }

    #[test]
    fn test_escaped_brackets() {
        let format = Format::parse("[[draft]] [Title]").unwrap();
        assert_eq!(format.paths().collect::<Vec<_>>(), vec!["Title"]);
    }

    #[test]
    fn test_invalid_formats() {
        assert!(Format::parse("[Unclosed").is_err());
        assert!(Format::parse("Stray]").is_err());
        assert!(Format::parse("[]").is_err());
        assert!(Format::parse("[A[B]]").is_err());
    }
}
