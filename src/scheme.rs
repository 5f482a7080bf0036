//! Tokenizer and parser.
//!
//! Source text is first split into token slices by [`tokenize`] and then
//! assembled into [`Expression`] trees by [`parse`], [`parse_expression`] or
//! [`parse_program`]. The parser keeps an explicit stack of open
//! combinations instead of recursing, so nesting depth is bounded only by
//! memory.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_till, take_till1, take_while1},
    character::complete::char,
    combinator::{all_consuming, recognize},
    multi::{many0, many0_count},
    number::complete::recognize_float,
    sequence::{pair, preceded},
};
use std::rc::Rc;

use tracing::debug;

use crate::ast::{Expression, IntegerType, Number};
use crate::{Error, ParseError, ParseErrorKind};

/// A `;` comment running to the end of the line
fn comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(char(';'), take_till(|c: char| c == '\n' || c == '\r'))).parse(input)
}

/// Whitespace and comments between tokens
fn trivia(input: &str) -> IResult<&str, usize> {
    many0_count(alt((take_while1(char::is_whitespace), comment))).parse(input)
}

/// A parenthesis or an atom running up to the next delimiter
fn token(input: &str) -> IResult<&str, &str> {
    alt((
        tag("("),
        tag(")"),
        take_till1(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | ';')),
    ))
    .parse(input)
}

/// Split source text into tokens.
///
/// Parentheses are always tokens of their own, everything from `;` to the end
/// of the line is dropped and the rest is split on whitespace. Never fails.
pub fn tokenize(source: &str) -> Vec<&str> {
    many0(preceded(trivia, token))
        .parse(source)
        .map(|(_, tokens)| tokens)
        .unwrap_or_default()
}

/// A decimal float literal spanning the whole input (`-5.32`, `.5`, `1e10`)
fn float_literal(input: &str) -> IResult<&str, &str> {
    all_consuming(recognize_float).parse(input)
}

/// Classify an atom as an integer, a float or a symbol.
///
/// Integers are tried first, then decimal floats; anything else, including
/// malformed literals such as `1.2.3.4`, is a symbol.
pub fn number_or_symbol(atom: &str) -> Expression {
    if let Ok(n) = atom.parse::<IntegerType>() {
        return Expression::Number(Number::Integer(n));
    }
    if float_literal(atom).is_ok()
        && let Ok(f) = atom.parse::<f64>()
    {
        return Expression::Number(Number::Float(f));
    }
    Expression::Symbol(atom.to_owned())
}

/// Parse one expression starting at `start`; returns it with the index of the next token
fn parse_from(tokens: &[&str], start: usize) -> Result<(Expression, usize), Error> {
    let mut open: Vec<Vec<Expression>> = Vec::new();

    for (position, &token) in tokens.iter().enumerate().skip(start) {
        let completed = match token {
            "(" => {
                open.push(Vec::new());
                continue;
            }
            ")" => match open.pop() {
                Some(elements) => Expression::Combination(Rc::new(elements)),
                None => {
                    return Err(ParseError::new(
                        ParseErrorKind::UnexpectedClose,
                        format!("unexpected ')' at token {position}"),
                        Some(position),
                    )
                    .into());
                }
            },
            atom => number_or_symbol(atom),
        };

        match open.last_mut() {
            Some(parent) => parent.push(completed),
            None => return Ok((completed, position + 1)),
        }
    }

    if start >= tokens.len() {
        Err(ParseError::new(ParseErrorKind::Empty, "no tokens to parse", None).into())
    } else {
        Err(ParseError::new(
            ParseErrorKind::Incomplete,
            format!("unexpected end of input: {} unclosed '('", open.len()),
            None,
        )
        .into())
    }
}

/// Parse one expression from the front of `tokens`, returning the unconsumed rest.
pub fn parse_expression<'t, 's>(tokens: &'t [&'s str]) -> Result<(Expression, &'t [&'s str]), Error> {
    let (expression, next) = parse_from(tokens, 0)?;
    Ok((expression, &tokens[next..]))
}

/// Parse exactly one expression that consumes every token.
pub fn parse(tokens: &[&str]) -> Result<Expression, Error> {
    let (expression, next) = parse_from(tokens, 0)?;
    if let Some(extra) = tokens.get(next) {
        return Err(ParseError::new(
            ParseErrorKind::TrailingContent,
            format!("unexpected remaining input starting at '{extra}'"),
            Some(next),
        )
        .into());
    }
    debug!(%expression, "parsed expression");
    Ok(expression)
}

/// Parse every top-level expression in `tokens`; no tokens is an empty program.
pub fn parse_program(tokens: &[&str]) -> Result<Vec<Expression>, Error> {
    let mut program = Vec::new();
    let mut next = 0;
    while next < tokens.len() {
        let (expression, after) = parse_from(tokens, next)?;
        program.push(expression);
        next = after;
    }
    debug!(count = program.len(), "parsed program");
    Ok(program)
}

/// Tokenize and parse a single expression from source text.
pub fn parse_source(source: &str) -> Result<Expression, Error> {
    parse(&tokenize(source))
}
