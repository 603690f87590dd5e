//! Property expression engine
//!
//! Scalar property values may embed `${…}` fragments written in a small
//! expression language (member access, indexed access, literals, a fixed
//! standard library). A scalar parses into one of three shapes:
//!
//! - **Literal**: no `${…}` token; evaluates to itself.
//! - **Single**: the whole scalar is one token; the result keeps its type.
//! - **Composite**: tokens interleaved with text; the result is always a
//!   string.
//!
//! Dependency extraction reports the `resources.<name>` and `refs.<name>`
//! roots a fragment touches; those drive the deployment DAG.

mod eval;
mod parser;
mod properties;
mod scope;

pub use parser::Expr;
pub use properties::{Properties, PropertyNode};
pub use scope::Scope;

use std::collections::BTreeSet;

use serde_json::Value;

use parser::Literal;

/// Token opening a `${…}` fragment
pub const START_TOKEN: &str = "${";

/// Errors raised while parsing or evaluating expressions; every variant
/// carries the offending source text
///
/// Every variant has a field named `source` holding the offending source
/// text (not a wrapped error), so `Display`/`Error` are implemented by hand
/// instead of via `#[derive(thiserror::Error)]` — thiserror treats any field
/// literally named `source` as the error's `#[source]`, which would require
/// it to implement `std::error::Error`.
#[derive(Debug)]
pub enum ExpressionError {
    Parse { source: String, message: String },

    UndefinedSymbol { symbol: String, source: String },

    TypeMismatch {
        source: String,
        expected: &'static str,
        found: &'static str,
    },

    IndexOutOfRange {
        source: String,
        index: i64,
        len: usize,
    },

    UnknownFunction { source: String, function: String },

    Function {
        source: String,
        function: String,
        message: String,
    },
}

impl std::fmt::Display for ExpressionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpressionError::Parse { source, message } => {
                write!(f, "failed parsing expression '{source}': {message}")
            }
            ExpressionError::UndefinedSymbol { symbol, source } => {
                write!(f, "undefined symbol '{symbol}' in expression '{source}'")
            }
            ExpressionError::TypeMismatch {
                source,
                expected,
                found,
            } => write!(
                f,
                "type mismatch in expression '{source}': expected {expected}, found {found}"
            ),
            ExpressionError::IndexOutOfRange { source, index, len } => write!(
                f,
                "index {index} out of range (len {len}) in expression '{source}'"
            ),
            ExpressionError::UnknownFunction { source, function } => {
                write!(f, "unknown function '{function}' in expression '{source}'")
            }
            ExpressionError::Function {
                source,
                function,
                message,
            } => write!(
                f,
                "invalid call to '{function}' in expression '{source}': {message}"
            ),
        }
    }
}

impl std::error::Error for ExpressionError {}

/// A parsed scalar property value
#[derive(Debug, Clone)]
pub enum Expression {
    /// A scalar with no `${…}` token
    Literal(Value),
    /// A scalar that is exactly one `${…}` token
    Single { source: String, expr: Expr },
    /// Literal text interleaved with one or more `${…}` tokens
    Composite {
        source: String,
        segments: Vec<Segment>,
    },
}

/// One piece of a composite expression
#[derive(Debug, Clone)]
pub enum Segment {
    Text(String),
    Expr { source: String, expr: Expr },
}

impl Expression {
    /// Classify and parse a scalar property value
    pub fn parse(value: &Value) -> Result<Expression, ExpressionError> {
        let Value::String(text) = value else {
            return Ok(Expression::Literal(value.clone()));
        };

        let fragments = find_fragments(text);
        if fragments.is_empty() {
            return Ok(Expression::Literal(value.clone()));
        }

        if fragments.len() == 1 {
            let (start, end, inner) = &fragments[0];
            if *start == 0 && *end == text.len() {
                return Ok(Expression::Single {
                    source: inner.trim().to_string(),
                    expr: parse_fragment(inner)?,
                });
            }
        }

        let mut segments = Vec::new();
        let mut cursor = 0;
        for (start, end, inner) in &fragments {
            if *start > cursor {
                segments.push(Segment::Text(text[cursor..*start].to_string()));
            }
            segments.push(Segment::Expr {
                source: inner.trim().to_string(),
                expr: parse_fragment(inner)?,
            });
            cursor = *end;
        }
        if cursor < text.len() {
            segments.push(Segment::Text(text[cursor..].to_string()));
        }

        Ok(Expression::Composite {
            source: text.clone(),
            segments,
        })
    }

    /// Original source text of this expression
    pub fn source(&self) -> String {
        match self {
            Expression::Literal(value) => eval::stringify(value),
            Expression::Single { source, .. } => source.clone(),
            Expression::Composite { source, .. } => source.clone(),
        }
    }

    /// Evaluate against a scope; Single keeps the result type, Composite
    /// splices stringified results into the surrounding text
    pub fn evaluate(&self, scope: &Scope) -> Result<Value, ExpressionError> {
        match self {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Single { source, expr } => eval::eval(expr, scope, source),
            Expression::Composite { segments, .. } => {
                let mut out = String::new();
                for segment in segments {
                    match segment {
                        Segment::Text(text) => out.push_str(text),
                        Segment::Expr { source, expr } => {
                            out.push_str(&eval::stringify(&eval::eval(expr, scope, source)?));
                        }
                    }
                }
                Ok(Value::String(out))
            }
        }
    }

    /// The `resources.<name>` and `refs.<name>` roots this expression reads
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut deps = BTreeSet::new();
        match self {
            Expression::Literal(_) => {}
            Expression::Single { expr, .. } => collect_dependencies(expr, &mut deps),
            Expression::Composite { segments, .. } => {
                for segment in segments {
                    if let Segment::Expr { expr, .. } = segment {
                        collect_dependencies(expr, &mut deps);
                    }
                }
            }
        }
        deps
    }
}

// Byte spans of ${…} fragments; the inner text excludes the delimiters.
// Brace depth is tracked so map literals inside a fragment survive. An
// unterminated fragment turns the rest of the string into literal text.
fn find_fragments(input: &str) -> Vec<(usize, usize, String)> {
    let bytes = input.as_bytes();
    let mut fragments = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            let mut depth = 1usize;
            let mut j = i + 2;
            while j < bytes.len() && depth > 0 {
                match bytes[j] {
                    b'{' => depth += 1,
                    b'}' => depth -= 1,
                    _ => {}
                }
                j += 1;
            }
            if depth == 0 {
                fragments.push((i, j, input[i + 2..j - 1].to_string()));
                i = j;
                continue;
            }
            break;
        }
        i += 1;
    }
    fragments
}

fn parse_fragment(inner: &str) -> Result<Expr, ExpressionError> {
    parser::parse(inner).map_err(|message| ExpressionError::Parse {
        source: inner.trim().to_string(),
        message,
    })
}

// A member or index access directly on the `resources` / `refs` roots yields
// exactly one dependency node; other roots yield none.
fn collect_dependencies(expr: &Expr, deps: &mut BTreeSet<String>) {
    match expr {
        Expr::Member { object, field } => {
            if let Expr::Ident(root) = object.as_ref() {
                if root == "resources" || root == "refs" {
                    deps.insert(format!("{root}.{field}"));
                    return;
                }
            }
            collect_dependencies(object, deps);
        }
        Expr::Index { object, index } => {
            if let Expr::Ident(root) = object.as_ref() {
                if root == "resources" || root == "refs" {
                    if let Expr::Literal(Literal::String(key)) = index.as_ref() {
                        deps.insert(format!("{root}.{key}"));
                        return;
                    }
                }
            }
            collect_dependencies(object, deps);
            collect_dependencies(index, deps);
        }
        Expr::List(items) => {
            for item in items {
                collect_dependencies(item, deps);
            }
        }
        Expr::Map(entries) => {
            for (_, value) in entries {
                collect_dependencies(value, deps);
            }
        }
        Expr::Call { args, .. } => {
            for arg in args {
                collect_dependencies(arg, deps);
            }
        }
        Expr::Literal(_) | Expr::Ident(_) => {}
    }
}
