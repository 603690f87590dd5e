//! nom parser for the `${…}` mini-language
//!
//! The language accepts member access (`a.b.c`), indexed access (`a[0]`,
//! `a['kebab-key']`), string/list/map literals, and calls into a fixed
//! standard library.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0, none_of},
    combinator::{all_consuming, map, map_res, opt, recognize},
    error::ParseError,
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
    IResult,
};

/// Expression AST
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    List(Vec<Expr>),
    Map(Vec<(String, Expr)>),
    Ident(String),
    Member { object: Box<Expr>, field: String },
    Index { object: Box<Expr>, index: Box<Expr> },
    Call { function: String, args: Vec<Expr> },
}

/// Scalar literals
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

/// Parse a complete expression; trailing input is an error
pub fn parse(input: &str) -> Result<Expr, String> {
    match all_consuming(terminated(parse_expr, multispace0))(input) {
        Ok((_, expr)) => Ok(expr),
        Err(e) => Err(e.to_string()),
    }
}

// Whitespace wrapper
fn ws<'a, F, O, E: ParseError<&'a str>>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O, E>
where
    F: FnMut(&'a str) -> IResult<&'a str, O, E>,
{
    delimited(multispace0, inner, multispace0)
}

fn parse_expr(input: &str) -> IResult<&str, Expr> {
    parse_postfix(input)
}

// Member and index accesses chain off a primary expression
fn parse_postfix(input: &str) -> IResult<&str, Expr> {
    let (mut rest, mut expr) = preceded(multispace0, parse_primary)(input)?;
    loop {
        if let Ok((next, field)) =
            preceded(ws(char::<&str, nom::error::Error<&str>>('.')), parse_identifier)(rest)
        {
            expr = Expr::Member {
                object: Box::new(expr),
                field,
            };
            rest = next;
            continue;
        }
        if let Ok((next, index)) = delimited(
            ws(char::<&str, nom::error::Error<&str>>('[')),
            parse_expr,
            ws(char(']')),
        )(rest)
        {
            expr = Expr::Index {
                object: Box::new(expr),
                index: Box::new(index),
            };
            rest = next;
            continue;
        }
        break;
    }
    Ok((rest, expr))
}

fn parse_primary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(parse_string_literal, Expr::Literal),
        map(parse_number, Expr::Literal),
        parse_list,
        parse_map,
        parse_call_or_ident,
        delimited(ws(char('(')), parse_expr, ws(char(')'))),
    ))(input)
}

// Parse identifiers (variables, function names)
fn parse_identifier(input: &str) -> IResult<&str, String> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0(alt((alphanumeric1, tag("_")))),
        )),
        String::from,
    )(input)
}

// Parse integers and floats
fn parse_number(input: &str) -> IResult<&str, Literal> {
    map_res(
        recognize(tuple((
            opt(char('-')),
            digit1,
            opt(tuple((char('.'), digit1))),
        ))),
        |s: &str| {
            if s.contains('.') {
                s.parse::<f64>().map(Literal::Float).map_err(|_| "invalid float")
            } else {
                s.parse::<i64>().map(Literal::Int).map_err(|_| "invalid integer")
            }
        },
    )(input)
}

// Parse string literals with escape sequences
fn parse_string_literal(input: &str) -> IResult<&str, Literal> {
    map(parse_quoted_string, Literal::String)(input)
}

fn parse_quoted_string(input: &str) -> IResult<&str, String> {
    alt((
        // Double-quoted strings
        map(
            delimited(
                char('"'),
                many0(alt((
                    map(tag("\\\""), |_| '"'),
                    map(tag("\\\\"), |_| '\\'),
                    map(tag("\\n"), |_| '\n'),
                    map(tag("\\t"), |_| '\t'),
                    map(tag("\\r"), |_| '\r'),
                    map(none_of("\"\\"), |c| c),
                ))),
                char('"'),
            ),
            |chars| chars.into_iter().collect(),
        ),
        // Single-quoted strings (simpler)
        map(
            delimited(char('\''), take_while(|c| c != '\''), char('\'')),
            |s: &str| s.to_string(),
        ),
    ))(input)
}

// Parse list literals: [item1, item2, ...]
fn parse_list(input: &str) -> IResult<&str, Expr> {
    map(
        delimited(
            ws(char('[')),
            separated_list0(ws(char(',')), parse_expr),
            ws(char(']')),
        ),
        Expr::List,
    )(input)
}

// Parse map literals: {'key': value, ...}
fn parse_map(input: &str) -> IResult<&str, Expr> {
    map(
        delimited(
            ws(char('{')),
            separated_list0(
                ws(char(',')),
                separated_pair(parse_map_key, ws(char(':')), parse_expr),
            ),
            ws(char('}')),
        ),
        Expr::Map,
    )(input)
}

fn parse_map_key(input: &str) -> IResult<&str, String> {
    preceded(multispace0, alt((parse_quoted_string, parse_identifier)))(input)
}

// Identifiers become calls when followed by an argument list; the keyword
// literals true/false/null are resolved here so they never shadow members
fn parse_call_or_ident(input: &str) -> IResult<&str, Expr> {
    let (rest, name) = parse_identifier(input)?;
    if let Ok((after_args, args)) = delimited(
        ws(char::<&str, nom::error::Error<&str>>('(')),
        separated_list0(ws(char(',')), parse_expr),
        ws(char(')')),
    )(rest)
    {
        return Ok((
            after_args,
            Expr::Call {
                function: name,
                args,
            },
        ));
    }
    let expr = match name.as_str() {
        "true" => Expr::Literal(Literal::Bool(true)),
        "false" => Expr::Literal(Literal::Bool(false)),
        "null" => Expr::Literal(Literal::Null),
        _ => Expr::Ident(name),
    };
    Ok((rest, expr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_member_chain() {
        let expr = parse("resources.database.status.outputs").unwrap();
        let Expr::Member { object, field } = expr else {
            panic!("expected member access");
        };
        assert_eq!(field, "outputs");
        let Expr::Member { object, field } = *object else {
            panic!("expected member access");
        };
        assert_eq!(field, "status");
        let Expr::Member { object, field } = *object else {
            panic!("expected member access");
        };
        assert_eq!(field, "database");
        assert_eq!(*object, Expr::Ident("resources".to_string()));
    }

    #[test]
    fn parses_indexed_access() {
        let expr = parse("items[0]").unwrap();
        assert_eq!(
            expr,
            Expr::Index {
                object: Box::new(Expr::Ident("items".to_string())),
                index: Box::new(Expr::Literal(Literal::Int(0))),
            }
        );
    }

    #[test]
    fn parses_string_key_index() {
        let expr = parse("refs['my-config']").unwrap();
        assert_eq!(
            expr,
            Expr::Index {
                object: Box::new(Expr::Ident("refs".to_string())),
                index: Box::new(Expr::Literal(Literal::String("my-config".to_string()))),
            }
        );
    }

    #[test]
    fn parses_literals() {
        assert_eq!(parse("42").unwrap(), Expr::Literal(Literal::Int(42)));
        assert_eq!(parse("-1.5").unwrap(), Expr::Literal(Literal::Float(-1.5)));
        assert_eq!(parse("true").unwrap(), Expr::Literal(Literal::Bool(true)));
        assert_eq!(parse("null").unwrap(), Expr::Literal(Literal::Null));
        assert_eq!(
            parse(r#""a\"b""#).unwrap(),
            Expr::Literal(Literal::String("a\"b".to_string()))
        );
        assert_eq!(
            parse("'hello'").unwrap(),
            Expr::Literal(Literal::String("hello".to_string()))
        );
    }

    #[test]
    fn parses_list_and_map_literals() {
        let expr = parse("['a', 1]").unwrap();
        assert_eq!(
            expr,
            Expr::List(vec![
                Expr::Literal(Literal::String("a".to_string())),
                Expr::Literal(Literal::Int(1)),
            ])
        );

        let expr = parse("{'k': 'v', other: 2}").unwrap();
        assert_eq!(
            expr,
            Expr::Map(vec![
                ("k".to_string(), Expr::Literal(Literal::String("v".to_string()))),
                ("other".to_string(), Expr::Literal(Literal::Int(2))),
            ])
        );
    }

    #[test]
    fn parses_function_calls() {
        let expr = parse("join(parameters.names, ',')").unwrap();
        let Expr::Call { function, args } = expr else {
            panic!("expected call");
        };
        assert_eq!(function, "join");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn parses_postfix_on_call_result() {
        let expr = parse("split('a,b', ',')[1]").unwrap();
        assert!(matches!(expr, Expr::Index { .. }));
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse("a.b ???").is_err());
        assert!(parse("").is_err());
    }
}
