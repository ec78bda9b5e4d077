//! Interpolation expressions.
//!
//! Attribute values and text content may embed expressions between the
//! configured delimiters: `Hello {{ context.user.name }}!`. An expression is
//! either a dotted identifier path or a quoted string literal; there are no
//! operators. A value that is exactly one expression evaluates to the raw
//! [`Value`], anything else concatenates display strings.

use crate::config::Delimiters;
use crate::context::Value;
use crate::error::ExpressionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Path(String),
    Literal(String),
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let source = source.trim();
        if source.is_empty() {
            return Err(ExpressionError::Empty);
        }

        for quote in ['\'', '"'] {
            if let Some(body) = source.strip_prefix(quote) {
                return body
                    .strip_suffix(quote)
                    .filter(|inner| !inner.contains(quote))
                    .map(|inner| Expression::Literal(inner.to_string()))
                    .ok_or_else(|| ExpressionError::InvalidIdentifier(source.to_string()));
            }
        }

        if is_identifier(source) {
            Ok(Expression::Path(source.to_string()))
        } else {
            Err(ExpressionError::InvalidIdentifier(source.to_string()))
        }
    }
}

fn is_identifier(source: &str) -> bool {
    source.split('.').all(|segment| {
        !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '-'))
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    Expr(Expression),
}

/// A parsed attribute value or text node containing at least one expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpolation {
    parts: Vec<Part>,
}

impl Interpolation {
    /// Parse `source`. Returns `Ok(None)` when it contains no interpolation.
    pub fn parse(source: &str, delimiters: &Delimiters) -> Result<Option<Self>, ExpressionError> {
        let (open, close) = (delimiters.open.as_str(), delimiters.close.as_str());
        let mut parts = Vec::new();
        let mut rest = source;
        let mut consumed = 0;

        while let Some(start) = rest.find(open) {
            if start > 0 {
                parts.push(Part::Text(rest[..start].to_string()));
            }
            let body_start = start + open.len();
            let end = rest[body_start..]
                .find(close)
                .ok_or(ExpressionError::Unterminated(consumed + start))?;
            let body = &rest[body_start..body_start + end];
            parts.push(Part::Expr(Expression::parse(body)?));

            let advance = body_start + end + close.len();
            consumed += advance;
            rest = &rest[advance..];
        }

        if !parts.iter().any(|p| matches!(p, Part::Expr(_))) {
            return Ok(None);
        }
        if !rest.is_empty() {
            parts.push(Part::Text(rest.to_string()));
        }
        Ok(Some(Self { parts }))
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Identifier paths referenced, first occurrence order, without duplicates.
    pub fn identifiers(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for part in &self.parts {
            if let Part::Expr(Expression::Path(path)) = part {
                if !out.contains(path) {
                    out.push(path.clone());
                }
            }
        }
        out
    }

    /// Evaluate with `lookup` resolving identifier paths.
    pub fn evaluate(&self, lookup: impl Fn(&str) -> Value) -> Value {
        let eval = |expr: &Expression| match expr {
            Expression::Path(path) => lookup(path),
            Expression::Literal(text) => Value::from(text.as_str()),
        };

        if let [Part::Expr(expr)] = self.parts.as_slice() {
            return eval(expr);
        }

        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Expr(expr) => out.push_str(&eval(expr).to_display_string()),
            }
        }
        Value::from(out)
    }
}

/// Where a node's child context comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextSelector {
    /// A path relative to the declaring scope's context. Empty means the
    /// declaring context itself.
    Relative(String),
    /// A path below the context of the observable resource `resource`
    /// published by an ancestor control.
    Alias { resource: String, path: String },
}

impl ContextSelector {
    /// Parse a relative-context attribute. Both `items.0` and `{{ items.0 }}`
    /// are accepted; a leading `context_key` segment is dropped.
    pub fn relative(
        source: &str,
        delimiters: &Delimiters,
        context_key: &str,
    ) -> Result<Self, ExpressionError> {
        let path = single_identifier(source, delimiters)?;
        let path = if path == context_key {
            String::new()
        } else {
            path.strip_prefix(context_key)
                .and_then(|rest| rest.strip_prefix('.'))
                .map(str::to_string)
                .unwrap_or(path)
        };
        Ok(ContextSelector::Relative(path))
    }

    /// Parse a context-source attribute: the first segment names the
    /// resource, the remainder is a path below its context.
    pub fn alias(source: &str, delimiters: &Delimiters) -> Result<Self, ExpressionError> {
        let path = single_identifier(source, delimiters)?;
        let (resource, rest) = path.split_once('.').unwrap_or((path.as_str(), ""));
        Ok(ContextSelector::Alias {
            resource: resource.to_string(),
            path: rest.to_string(),
        })
    }
}

fn single_identifier(source: &str, delimiters: &Delimiters) -> Result<String, ExpressionError> {
    match Interpolation::parse(source, delimiters)? {
        Some(interpolation) => {
            let mut identifiers = interpolation.identifiers();
            let only_expr = interpolation.parts.len() == 1;
            if identifiers.len() != 1 || !only_expr {
                return Err(ExpressionError::IdentifierCount {
                    expected: 1,
                    found: identifiers.len(),
                });
            }
            Ok(identifiers.remove(0))
        }
        None => match Expression::parse(source)? {
            Expression::Path(path) => Ok(path),
            Expression::Literal(_) => Err(ExpressionError::IdentifierCount {
                expected: 1,
                found: 0,
            }),
        },
    }
}
