//! Expression evaluation and the fixed standard library

use serde_json::{Map, Number, Value};

use super::parser::{Expr, Literal};
use super::scope::Scope;
use super::ExpressionError;

pub(crate) fn eval(expr: &Expr, scope: &Scope, source: &str) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Literal(literal) => Ok(literal_value(literal)),
        Expr::List(items) => {
            let values = items
                .iter()
                .map(|item| eval(item, scope, source))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(values))
        }
        Expr::Map(entries) => {
            let mut object = Map::new();
            for (key, value) in entries {
                object.insert(key.clone(), eval(value, scope, source)?);
            }
            Ok(Value::Object(object))
        }
        Expr::Ident(name) => scope.root(name).ok_or_else(|| ExpressionError::UndefinedSymbol {
            symbol: name.clone(),
            source: source.to_string(),
        }),
        Expr::Member { object, field } => {
            let value = eval(object, scope, source)?;
            match value {
                Value::Object(map) => {
                    map.get(field)
                        .cloned()
                        .ok_or_else(|| ExpressionError::UndefinedSymbol {
                            symbol: field.clone(),
                            source: source.to_string(),
                        })
                }
                other => Err(ExpressionError::TypeMismatch {
                    source: source.to_string(),
                    expected: "object",
                    found: type_name(&other),
                }),
            }
        }
        Expr::Index { object, index } => {
            let value = eval(object, scope, source)?;
            let index = eval(index, scope, source)?;
            match (value, index) {
                (Value::Array(items), Value::Number(n)) => {
                    let position = n.as_i64().ok_or_else(|| ExpressionError::TypeMismatch {
                        source: source.to_string(),
                        expected: "integer index",
                        found: "float",
                    })?;
                    let len = items.len();
                    usize::try_from(position)
                        .ok()
                        .and_then(|i| items.get(i).cloned())
                        .ok_or(ExpressionError::IndexOutOfRange {
                            source: source.to_string(),
                            index: position,
                            len,
                        })
                }
                (Value::Object(map), Value::String(key)) => {
                    map.get(&key)
                        .cloned()
                        .ok_or_else(|| ExpressionError::UndefinedSymbol {
                            symbol: key,
                            source: source.to_string(),
                        })
                }
                (indexed, _) => Err(ExpressionError::TypeMismatch {
                    source: source.to_string(),
                    expected: "list or object",
                    found: type_name(&indexed),
                }),
            }
        }
        Expr::Call { function, args } => {
            let args = args
                .iter()
                .map(|arg| eval(arg, scope, source))
                .collect::<Result<Vec<_>, _>>()?;
            call_function(function, &args, source)
        }
    }
}

/// Splice rule for composite expressions: strings splice verbatim, everything
/// else uses its JSON rendering
pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::String(s) => Value::String(s.clone()),
        Literal::Int(i) => Value::Number(Number::from(*i)),
        Literal::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

// Fixed standard library: string and list helpers
fn call_function(name: &str, args: &[Value], source: &str) -> Result<Value, ExpressionError> {
    match name {
        "size" => {
            let [value] = expect_args::<1>(name, args, source)?;
            let len = match value {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                other => {
                    return Err(function_error(name, source, format!("cannot size a {}", type_name(other))))
                }
            };
            Ok(Value::Number(Number::from(len as i64)))
        }
        "upper" => {
            let [value] = expect_args::<1>(name, args, source)?;
            Ok(Value::String(string_arg(name, value, source)?.to_uppercase()))
        }
        "lower" => {
            let [value] = expect_args::<1>(name, args, source)?;
            Ok(Value::String(string_arg(name, value, source)?.to_lowercase()))
        }
        "trim" => {
            let [value] = expect_args::<1>(name, args, source)?;
            Ok(Value::String(string_arg(name, value, source)?.trim().to_string()))
        }
        "replace" => {
            let [text, from, to] = expect_args::<3>(name, args, source)?;
            let text = string_arg(name, text, source)?;
            let from = string_arg(name, from, source)?;
            let to = string_arg(name, to, source)?;
            Ok(Value::String(text.replace(from, to)))
        }
        "split" => {
            let [text, separator] = expect_args::<2>(name, args, source)?;
            let text = string_arg(name, text, source)?;
            let separator = string_arg(name, separator, source)?;
            Ok(Value::Array(
                text.split(separator)
                    .map(|part| Value::String(part.to_string()))
                    .collect(),
            ))
        }
        "join" => {
            let [items, separator] = expect_args::<2>(name, args, source)?;
            let Value::Array(items) = items else {
                return Err(function_error(name, source, "first argument must be a list"));
            };
            let separator = string_arg(name, separator, source)?;
            let parts: Vec<String> = items.iter().map(stringify).collect();
            Ok(Value::String(parts.join(separator)))
        }
        "first" => {
            let [items] = expect_args::<1>(name, args, source)?;
            list_element(name, items, 0, source)
        }
        "last" => {
            let [items] = expect_args::<1>(name, args, source)?;
            let Value::Array(list) = items else {
                return Err(function_error(name, source, "argument must be a list"));
            };
            list_element(name, items, list.len().saturating_sub(1), source)
        }
        _ => Err(ExpressionError::UnknownFunction {
            source: source.to_string(),
            function: name.to_string(),
        }),
    }
}

fn expect_args<'a, const N: usize>(
    name: &str,
    args: &'a [Value],
    source: &str,
) -> Result<[&'a Value; N], ExpressionError> {
    if args.len() != N {
        return Err(function_error(
            name,
            source,
            format!("expected {N} argument(s), found {}", args.len()),
        ));
    }
    let mut out = [&Value::Null; N];
    for (slot, arg) in out.iter_mut().zip(args.iter()) {
        *slot = arg;
    }
    Ok(out)
}

fn string_arg<'a>(name: &str, value: &'a Value, source: &str) -> Result<&'a str, ExpressionError> {
    value
        .as_str()
        .ok_or_else(|| function_error(name, source, format!("expected a string, found {}", type_name(value))))
}

fn list_element(name: &str, items: &Value, index: usize, source: &str) -> Result<Value, ExpressionError> {
    let Value::Array(list) = items else {
        return Err(function_error(name, source, "argument must be a list"));
    };
    list.get(index).cloned().ok_or(ExpressionError::IndexOutOfRange {
        source: source.to_string(),
        index: index as i64,
        len: list.len(),
    })
}

fn function_error(name: &str, source: &str, message: impl Into<String>) -> ExpressionError {
    ExpressionError::Function {
        source: source.to_string(),
        function: name.to_string(),
        message: message.into(),
    }
}
