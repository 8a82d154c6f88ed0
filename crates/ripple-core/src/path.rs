//! Dependency path expressions
//!
//! Rules name the properties they depend on with a compact syntax:
//!
//! - `"FirstName,LastName"` or `"{FirstName,LastName}"` - sibling properties
//! - `"Owner.FirstName"` - a property reached through an entity reference
//! - `"MatchedUser{IsArchived,FullName}"` - several properties of a related entity
//!
//! Parsing yields the leaf paths as step names; [`Model::resolve_paths`]
//! turns them into [`PropertyPath`]s bound to property handles.

use crate::error::{Error, Result};
use crate::identity::{EntityId, PropertyId, TypeId};
use crate::model::Model;

/// A chain of properties starting at a root type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyPath {
    pub(crate) root: TypeId,
    pub(crate) steps: Vec<PropertyId>,
    pub(crate) expression: String,
}

impl PropertyPath {
    /// The type the first step is declared on (or inherited by)
    pub fn root(&self) -> TypeId {
        self.root
    }

    /// Property handles from the root outward
    pub fn steps(&self) -> &[PropertyId] {
        &self.steps
    }

    /// The last property of the path
    pub fn leaf(&self) -> Option<PropertyId> {
        self.steps.last().copied()
    }

    /// The dotted form of the path, e.g. `Owner.FirstName`
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Entities reached from `from` after following the first `depth` steps
    ///
    /// List-valued steps fan out to every referenced entity; nulls end that
    /// branch.
    pub fn navigate(&self, model: &Model, from: EntityId, depth: usize) -> Vec<EntityId> {
        let mut frontier = vec![from];
        for step in self.steps.iter().take(depth) {
            let mut next = Vec::new();
            for entity in frontier {
                if let Some(value) = model.peek(entity, *step) {
                    for related in value.entities() {
                        if !next.contains(&related) {
                            next.push(related);
                        }
                    }
                }
            }
            frontier = next;
        }
        frontier
    }
}

/// Parse a dependency expression into leaf paths (lists of step names)
pub fn parse_paths(expression: &str) -> Result<Vec<Vec<String>>> {
    if expression.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut parser = PathParser {
        input: expression,
        pos: 0,
    };
    let mut out = Vec::new();
    parser.parse_list(&[], &mut out)?;
    parser.skip_ws();
    if parser.pos != expression.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(out)
}

struct PathParser<'a> {
    input: &'a str,
    pos: usize,
}

impl PathParser<'_> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn error(&self, reason: &str) -> Error {
        Error::invalid_path(self.input, format!("{} at offset {}", reason, self.pos))
    }

    fn ident(&mut self) -> Result<String> {
        self.skip_ws();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$')
        {
            self.bump();
        }
        if start == self.pos {
            return Err(self.error("expected a property name"));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_list(&mut self, prefix: &[String], out: &mut Vec<Vec<String>>) -> Result<()> {
        loop {
            self.parse_item(prefix, out)?;
            self.skip_ws();
            if self.peek() == Some(',') {
                self.bump();
            } else {
                return Ok(());
            }
        }
    }

    fn parse_item(&mut self, prefix: &[String], out: &mut Vec<Vec<String>>) -> Result<()> {
        let mut steps = prefix.to_vec();
        self.skip_ws();

        if self.peek() != Some('{') {
            loop {
                steps.push(self.ident()?);
                self.skip_ws();
                if self.peek() == Some('.') {
                    self.bump();
                } else {
                    break;
                }
            }
        }

        self.skip_ws();
        if self.peek() == Some('{') {
            self.bump();
            self.parse_list(&steps, out)?;
            self.skip_ws();
            if self.peek() != Some('}') {
                return Err(self.error("expected '}'"));
            }
            self.bump();
        } else if !out.contains(&steps) {
            out.push(steps);
        }
        Ok(())
    }
}

impl Model {
    /// Resolve one path of step names against a root type
    pub fn resolve_path(&self, root: TypeId, steps: &[String]) -> Result<PropertyPath> {
        let expression = steps.join(".");
        let mut current = root;
        let mut resolved = Vec::with_capacity(steps.len());

        for (i, name) in steps.iter().enumerate() {
            let property = self.property(current, name).ok_or_else(|| {
                Error::invalid_path(
                    expression.as_str(),
                    format!("'{}' is not a property of '{}'", name, self.type_name(current)),
                )
            })?;
            resolved.push(property);

            if i + 1 < steps.len() {
                let meta = &self.properties[property.index()];
                current = meta.value_type.entity_type().ok_or_else(|| {
                    Error::invalid_path(
                        expression.as_str(),
                        format!("'{}' does not reference an entity type", name),
                    )
                })?;
            }
        }

        if resolved.is_empty() {
            return Err(Error::invalid_path(expression, "empty path"));
        }
        Ok(PropertyPath {
            root,
            steps: resolved,
            expression,
        })
    }

    /// Parse and resolve a dependency expression against a root type
    pub fn resolve_paths(&self, root: TypeId, expression: &str) -> Result<Vec<PropertyPath>> {
        parse_paths(expression)?
            .iter()
            .map(|steps| self.resolve_path(root, steps))
            .collect()
    }
}
