// Forge Build Automation
// Copyright (C) 2026 The Forge Authors
//
// This program is licensed under the GPLv3.0 license (https://www.gnu.org/licenses/gpl-3.0.txt)

use std::error::Error;
use std::fmt;

use nom::branch::alt;
use nom::bytes::complete::{is_not, tag, tag_no_case};
use nom::character::complete::{char, digit0, digit1, multispace0};
use nom::combinator::{all_consuming, map, opt, recognize, value};
use nom::multi::{many0, separated_list0};
use nom::sequence::{delimited, preceded, separated_pair, terminated, tuple};
use nom::IResult;

/// A typed define value.
///
/// Values are produced by parsing `-D NAME=EXPR` arguments and the
/// `--stdin-defines` payload, and are serialized back to their literal
/// textual representation when exported to a subforge child.  For every
/// value, parsing its `Display` output yields the value back.  The one
/// exception is the empty set, which prints as `{}` and parses as the
/// empty map.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

#[derive(Debug)]
pub struct ValueParseError(pub String);

impl Error for ValueParseError {}
impl fmt::Display for ValueParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Value {
    /// Parse a define value string.
    ///
    /// Case-insensitive `true`/`false` parse as booleans, integers as
    /// integers, floats as floats.  A string starting with one of
    /// `'"[({` is parsed as a literal expression; a syntax error there is
    /// an error rather than a fallback.  Anything else is taken as a raw
    /// string.
    pub fn parse(s: &str) -> Result<Value, ValueParseError> {
        let trimmed = s.trim();

        if trimmed.eq_ignore_ascii_case("true") {
            return Ok(Value::Bool(true));
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Ok(Value::Bool(false));
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Ok(Value::Int(i));
        }
        if let Ok(x) = trimmed.parse::<f64>() {
            return Ok(Value::Float(x));
        }

        match trimmed.chars().next() {
            Some('\'') | Some('"') | Some('[') | Some('(') | Some('{') => {
                match all_consuming(terminated(literal, multispace0))(trimmed) {
                    Ok((_, v)) => Ok(v),
                    Err(e) => Err(ValueParseError(format!(
                        "Syntax error in literal value '{}': {}",
                        trimmed, e
                    ))),
                }
            }
            _ => Ok(Value::Str(trimmed.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(true) => write!(f, "true"),
            Value::Bool(false) => write!(f, "false"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => write_quoted(f, s),
            Value::List(items) => {
                write!(f, "[")?;
                write_joined(f, items)?;
                write!(f, "]")
            }
            Value::Tuple(items) => {
                write!(f, "(")?;
                write_joined(f, items)?;
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Value::Set(items) => {
                write!(f, "{{")?;
                write_joined(f, items)?;
                write!(f, "}}")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (idx, (k, v)) in entries.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for ch in s.chars() {
        match ch {
            '\\' => write!(f, "\\\\")?,
            '"' => write!(f, "\\\"")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            _ => write!(f, "{}", ch)?,
        }
    }
    write!(f, "\"")
}

fn literal(input: &str) -> IResult<&str, Value> {
    preceded(
        multispace0,
        alt((
            bool_lit,
            string_lit,
            list_lit,
            tuple_lit,
            set_or_map_lit,
            number_lit,
        )),
    )(input)
}

fn ws_comma(input: &str) -> IResult<&str, char> {
    delimited(multispace0, char(','), multispace0)(input)
}

fn bool_lit(input: &str) -> IResult<&str, Value> {
    alt((
        value(Value::Bool(true), tag_no_case("true")),
        value(Value::Bool(false), tag_no_case("false")),
    ))(input)
}

fn number_lit(input: &str) -> IResult<&str, Value> {
    let (rest, text) = recognize(tuple((
        opt(alt((char('+'), char('-')))),
        digit1,
        opt(tuple((char('.'), digit0))),
        opt(tuple((
            alt((char('e'), char('E'))),
            opt(alt((char('+'), char('-')))),
            digit1,
        ))),
    )))(input)?;

    if let Ok(i) = text.parse::<i64>() {
        return Ok((rest, Value::Int(i)));
    }
    match text.parse::<f64>() {
        Ok(x) => Ok((rest, Value::Float(x))),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Float,
        ))),
    }
}

fn string_lit(input: &str) -> IResult<&str, Value> {
    map(alt((double_quoted, single_quoted)), Value::Str)(input)
}

fn double_quoted(input: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        map(
            opt(nom::bytes::complete::escaped_transform(
                is_not("\\\""),
                '\\',
                escape_char,
            )),
            |s: Option<String>| s.unwrap_or_default(),
        ),
        char('"'),
    )(input)
}

fn single_quoted(input: &str) -> IResult<&str, String> {
    delimited(
        char('\''),
        map(
            opt(nom::bytes::complete::escaped_transform(
                is_not("\\'"),
                '\\',
                escape_char,
            )),
            |s: Option<String>| s.unwrap_or_default(),
        ),
        char('\''),
    )(input)
}

fn escape_char(input: &str) -> IResult<&str, &str> {
    alt((
        value("\\", tag("\\")),
        value("\"", tag("\"")),
        value("'", tag("'")),
        value("\n", tag("n")),
        value("\t", tag("t")),
        value("\r", tag("r")),
    ))(input)
}

fn list_lit(input: &str) -> IResult<&str, Value> {
    let (input, _) = char('[')(input)?;
    let (input, items) = separated_list0(ws_comma, literal)(input)?;
    let (input, _) = opt(ws_comma)(input)?;
    let (input, _) = preceded(multispace0, char(']'))(input)?;
    Ok((input, Value::List(items)))
}

fn tuple_lit(input: &str) -> IResult<&str, Value> {
    let (input, _) = char('(')(input)?;
    let (input, mut items) = separated_list0(ws_comma, literal)(input)?;
    let (input, trailing) = opt(ws_comma)(input)?;
    let (input, _) = preceded(multispace0, char(')'))(input)?;

    // A parenthesized expression without a trailing comma is not a tuple
    if items.len() == 1 && trailing.is_none() {
        return Ok((input, items.pop().unwrap()));
    }
    Ok((input, Value::Tuple(items)))
}

fn set_or_map_lit(input: &str) -> IResult<&str, Value> {
    let (input, _) = char('{')(input)?;

    let (after_ws, _) = multispace0(input)?;
    if let Ok((rest, _)) = char::<&str, nom::error::Error<&str>>('}')(after_ws) {
        return Ok((rest, Value::Map(Vec::new())));
    }

    let (input, first) = literal(input)?;
    let (input, colon) = opt(preceded(multispace0, char(':')))(input)?;

    match colon {
        Some(_) => {
            let (input, first_val) = literal(input)?;
            let (input, more) = many0(preceded(
                ws_comma,
                separated_pair(literal, preceded(multispace0, char(':')), literal),
            ))(input)?;
            let (input, _) = opt(ws_comma)(input)?;
            let (input, _) = preceded(multispace0, char('}'))(input)?;

            let mut entries = Vec::with_capacity(more.len() + 1);
            entries.push((first, first_val));
            entries.extend(more);
            Ok((input, Value::Map(dedup_entries(entries))))
        }
        None => {
            let (input, more) = many0(preceded(ws_comma, literal))(input)?;
            let (input, _) = opt(ws_comma)(input)?;
            let (input, _) = preceded(multispace0, char('}'))(input)?;

            let mut items = Vec::with_capacity(more.len() + 1);
            items.push(first);
            items.extend(more);
            Ok((input, Value::Set(dedup_items(items))))
        }
    }
}

fn dedup_items(items: Vec<Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn dedup_entries(entries: Vec<(Value, Value)>) -> Vec<(Value, Value)> {
    let mut out: Vec<(Value, Value)> = Vec::new();
    for (k, v) in entries {
        match out.iter_mut().find(|(existing, _)| *existing == k) {
            Some(slot) => slot.1 = v,
            None => out.push((k, v)),
        }
    }
    out
}
