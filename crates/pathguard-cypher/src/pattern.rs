//! Typed model of a Cypher match pattern.
//!
//! All quoting and escaping happens in this module. The path builder only
//! assembles [`NodePattern`]s and [`RelPattern`]s; text is produced by the
//! `Display` impls below.

use std::fmt::{self, Write};

use pathguard_core::{Direction, PropertyMap, Value};

use crate::error::{PathError, Result};

/// A node clause: `(ident:Label {key: value})`.
#[derive(Debug, Clone, PartialEq)]
pub struct NodePattern {
    pub ident: String,
    pub label: Option<String>,
    pub filters: PropertyMap,
}

impl NodePattern {
    pub fn new(ident: impl Into<String>, label: Option<&str>) -> Self {
        Self {
            ident: ident.into(),
            label: label.map(str::to_string),
            filters: PropertyMap::new(),
        }
    }

    pub fn with_filters(mut self, filters: PropertyMap) -> Self {
        self.filters = filters;
        self
    }
}

impl fmt::Display for NodePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char('(')?;
        write_identifier(f, &self.ident)?;
        if let Some(label) = &self.label {
            f.write_char(':')?;
            write_identifier(f, label)?;
        }
        if !self.filters.is_empty() {
            f.write_char(' ')?;
            write_map(f, &self.filters)?;
        }
        f.write_char(')')
    }
}

/// An anonymous relationship clause: `-[:TYPE {key: value}]->`.
#[derive(Debug, Clone, PartialEq)]
pub struct RelPattern {
    pub rel_type: String,
    pub properties: PropertyMap,
    pub direction: Direction,
}

impl fmt::Display for RelPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.direction == Direction::Incoming {
            f.write_char('<')?;
        }
        f.write_str("-[:")?;
        write_identifier(f, &self.rel_type)?;
        if !self.properties.is_empty() {
            f.write_char(' ')?;
            write_map(f, &self.properties)?;
        }
        f.write_str("]-")?;
        if self.direction == Direction::Outgoing {
            f.write_char('>')?;
        }
        Ok(())
    }
}

/// One hop: `source -[rel]-> target`.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub source: NodePattern,
    pub rel: RelPattern,
    pub target: NodePattern,
}

/// An ordered chain of fragments sharing their boundary nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pattern {
    pub fragments: Vec<Fragment>,
}

impl Pattern {
    /// Render the chain, writing each fragment's source clause only once.
    ///
    /// Fragment `n`'s source clause is dropped for `n > 0`. It must render to
    /// exactly the text of fragment `n - 1`'s target clause, otherwise the
    /// chain is rejected.
    pub fn render(&self) -> Result<String> {
        let Some(first) = self.fragments.first() else {
            return Err(PathError::EmptyPath);
        };

        let mut out = first.source.to_string();
        let mut previous_target: Option<String> = None;
        for (index, fragment) in self.fragments.iter().enumerate() {
            if let Some(previous) = &previous_target {
                if *previous != fragment.source.to_string() {
                    return Err(PathError::Discontinuous { index });
                }
            }
            let target = fragment.target.to_string();
            // Infallible for String.
            let _ = write!(out, " {} {}", fragment.rel, target);
            previous_target = Some(target);
        }
        Ok(out)
    }
}

/// Render a value as a Cypher literal.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(x) if x.is_finite() => format!("{x:?}"),
        Value::Float(_) => "null".to_string(),
        Value::String(s) => quote(s),
    }
}

/// Double-quote a string, escaping backslashes and both quote characters.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Whether `name` can be written without backticks.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A label, type, or key as Cypher text, backticked when needed.
pub fn identifier(name: &str) -> String {
    if is_plain_identifier(name) {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

fn write_identifier(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    f.write_str(&identifier(name))
}

fn write_map(f: &mut fmt::Formatter<'_>, map: &PropertyMap) -> fmt::Result {
    f.write_char('{')?;
    for (i, (key, value)) in map.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write_identifier(f, key)?;
        write!(f, ": {}", literal(value))?;
    }
    f.write_char('}')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters(pairs: &[(&str, Value)]) -> PropertyMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn literals() {
        assert_eq!(literal(&Value::Null), "null");
        assert_eq!(literal(&Value::Bool(true)), "true");
        assert_eq!(literal(&Value::Int(-4)), "-4");
        assert_eq!(literal(&Value::Float(2.0)), "2.0");
        assert_eq!(literal(&Value::Float(f64::NAN)), "null");
        assert_eq!(literal(&Value::from("plain")), "\"plain\"");
    }

    #[test]
    fn quotes_are_escaped() {
        assert_eq!(quote(r#"O'Brien "Bob""#), r#""O\'Brien \"Bob\"""#);
        assert_eq!(quote(r"back\slash"), r#""back\\slash""#);
    }

    #[test]
    fn node_clause() {
        let node = NodePattern::new("source0", Some("User"))
            .with_filters(filters(&[("pk", Value::Int(1)), ("is_staff", Value::Bool(true))]));
        assert_eq!(node.to_string(), "(source0:User {is_staff: true, pk: 1})");
        assert_eq!(NodePattern::new("target0", None).to_string(), "(target0)");
    }

    #[test]
    fn odd_identifiers_are_backticked() {
        assert_eq!(identifier("Book"), "Book");
        assert_eq!(identifier("a`b"), "`a``b`");
        let node = NodePattern::new("n", Some("Odd Label"))
            .with_filters(filters(&[("first-name", Value::from("x"))]));
        assert_eq!(node.to_string(), "(n:`Odd Label` {`first-name`: \"x\"})");
    }

    #[test]
    fn relationship_directions() {
        let mut rel = RelPattern {
            rel_type: "BOOKS".to_string(),
            properties: PropertyMap::new(),
            direction: Direction::Outgoing,
        };
        assert_eq!(rel.to_string(), "-[:BOOKS]->");
        rel.direction = Direction::Incoming;
        assert_eq!(rel.to_string(), "<-[:BOOKS]-");
        rel.direction = Direction::Either;
        assert_eq!(rel.to_string(), "-[:BOOKS]-");
    }

    #[test]
    fn render_rejects_discontinuous_chain() {
        let rel = RelPattern {
            rel_type: "R".to_string(),
            properties: PropertyMap::new(),
            direction: Direction::Outgoing,
        };
        let pattern = Pattern {
            fragments: vec![
                Fragment {
                    source: NodePattern::new("source0", Some("A")),
                    rel: rel.clone(),
                    target: NodePattern::new("target0", Some("B")),
                },
                Fragment {
                    source: NodePattern::new("target9", Some("B")),
                    rel,
                    target: NodePattern::new("target1", Some("C")),
                },
            ],
        };
        assert_eq!(pattern.render(), Err(PathError::Discontinuous { index: 1 }));
        assert_eq!(Pattern::default().render(), Err(PathError::EmptyPath));
    }
}
