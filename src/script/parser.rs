//! Expression Parser
//!
//! Parses value scripts into an [`Expr`] tree.
//!
//! # Grammar
//!
//! ```text
//! sum     := product (('+' | '-') product)*
//! product := unary (('*' | '/') unary)*
//! unary   := '-' unary | atom
//! atom    := number | params.<ident> | doc['<field>'][.value] | '(' sum ')'
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0, one_of},
    combinator::{map, map_res, opt, recognize},
    multi::fold_many0,
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

use crate::index::ScriptError;
use crate::script::ast::{BinaryOp, Expr};

/// Parse a script source into an expression
pub fn parse_expression(input: &str) -> Result<Expr, ScriptError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ScriptError::Parse("Empty script".to_string()));
    }

    match parse_sum(input) {
        Ok((remaining, expr)) => {
            if remaining.trim().is_empty() {
                Ok(expr)
            } else {
                Err(ScriptError::Parse(format!(
                    "Unexpected input after expression: '{}'",
                    remaining.trim()
                )))
            }
        }
        Err(e) => Err(ScriptError::Parse(format!("Parse error: {:?}", e))),
    }
}

/// Parse additions and subtractions, left associative
fn parse_sum(input: &str) -> IResult<&str, Expr> {
    let (input, first) = parse_product(input)?;
    fold_many0(
        pair(delimited(multispace0, one_of("+-"), multispace0), parse_product),
        move || first.clone(),
        fold_binary,
    )(input)
}

/// Parse multiplications and divisions, left associative
fn parse_product(input: &str) -> IResult<&str, Expr> {
    let (input, first) = parse_unary(input)?;
    fold_many0(
        pair(delimited(multispace0, one_of("*/"), multispace0), parse_unary),
        move || first.clone(),
        fold_binary,
    )(input)
}

fn fold_binary(lhs: Expr, (op, rhs): (char, Expr)) -> Expr {
    match BinaryOp::from_char(op) {
        Some(op) => Expr::binary(op, lhs, rhs),
        None => lhs,
    }
}

/// Parse unary minus
fn parse_unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(
            preceded(pair(char('-'), multispace0), parse_unary),
            |inner| Expr::Neg(Box::new(inner)),
        ),
        parse_atom,
    ))(input)
}

fn parse_atom(input: &str) -> IResult<&str, Expr> {
    alt((
        map(parse_number, Expr::Number),
        map(parse_param, Expr::Param),
        map(parse_field, Expr::Field),
        parse_parens,
    ))(input)
}

/// Parse a parenthesized sub-expression
fn parse_parens(input: &str) -> IResult<&str, Expr> {
    delimited(
        pair(char('('), multispace0),
        parse_sum,
        pair(multispace0, char(')')),
    )(input)
}

/// Parse `params.name`
fn parse_param(input: &str) -> IResult<&str, String> {
    map(preceded(tag("params."), parse_identifier), str::to_string)(input)
}

/// Parse `doc['field']`, `doc["field"]`, optionally followed by `.value`
fn parse_field(input: &str) -> IResult<&str, String> {
    let (input, _) = tag("doc")(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char('[')(input)?;
    let (input, _) = multispace0(input)?;
    let (input, name) = alt((parse_quoted('\''), parse_quoted('"')))(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char(']')(input)?;
    let (input, _) = opt(tag(".value"))(input)?;
    Ok((input, name))
}

fn parse_quoted(quote: char) -> impl FnMut(&str) -> IResult<&str, String> {
    move |input| {
        let (input, _) = char(quote)(input)?;
        let (input, content) = take_while1(|c| c != quote)(input)?;
        let (input, _) = char(quote)(input)?;
        Ok((input, content.to_string()))
    }
}

/// Parse identifier (parameter names)
fn parse_identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input)
}

/// Parse unsigned floating point number with optional exponent
fn parse_number(input: &str) -> IResult<&str, f64> {
    map_res(
        recognize(tuple((
            digit1,
            opt(pair(char('.'), digit1)),
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        ))),
        |s: &str| s.parse::<f64>(),
    )(input)
}
