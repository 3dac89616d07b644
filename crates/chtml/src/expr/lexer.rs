// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Surface lexers for interpolation and loop headers.
//!
//! [`lex_interpolation`] splits a text or attribute value into literal runs
//! and `${…}` expression bodies. Braces nest freely inside an expression and
//! string literals are respected, so `${ {a: "}"} }` lexes as one item.
//! [`lex_loop`] scans the `c:for` header forms `X in EXPR` and
//! `X, I in EXPR`.

use nom::{
    bytes::complete::{tag, take_while1},
    character::complete::{char, multispace0, multispace1},
    combinator::opt,
    sequence::{delimited, preceded},
    IResult, Parser,
};
use nom_locate::LocatedSpan;
use thiserror::Error;

type Input<'a> = LocatedSpan<&'a str>;

/// A positioned lexing failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{msg} at offset {pos}")]
pub struct ExprError {
    /// Description of the failure.
    pub msg: String,
    /// Byte offset into the lexed text.
    pub pos: usize,
}

/// One item of an interpolated string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    /// A literal run outside `${…}`.
    Text {
        /// The literal text.
        text: String,
        /// Byte offset of the run.
        pos: usize,
    },
    /// The interior of one `${…}`.
    Expr {
        /// The expression source (without the delimiters).
        text: String,
        /// Byte offset of the interior.
        pos: usize,
    },
}

/// Splits `input` into text and expression items.
///
/// Inputs without `${` produce a single `Text` item (the caller treats the
/// string verbatim). An unmatched `${` or an unterminated string literal
/// aborts with a positioned error.
pub fn lex_interpolation(input: &str) -> Result<Vec<Item>, ExprError> {
    let bytes = input.as_bytes();
    let mut items = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            if i > text_start {
                items.push(Item::Text { text: input[text_start..i].to_string(), pos: text_start });
            }
            let body_start = i + 2;
            let body_end = scan_expr_body(input, body_start)?;
            items.push(Item::Expr {
                text: input[body_start..body_end].to_string(),
                pos: body_start,
            });
            i = body_end + 1;
            text_start = i;
        } else {
            i += 1;
        }
    }
    if text_start < bytes.len() || items.is_empty() {
        items.push(Item::Text { text: input[text_start..].to_string(), pos: text_start });
    }
    Ok(items)
}

/// True if the input contains at least one `${…}` opener.
pub fn has_interpolation(input: &str) -> bool {
    input.contains("${")
}

// Scans the body of a `${…}` starting just after the opening brace and
// returns the offset of the matching `}`.
fn scan_expr_body(input: &str, start: usize) -> Result<usize, ExprError> {
    let bytes = input.as_bytes();
    let mut depth = 1usize;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            quote @ (b'"' | b'\'') => {
                i = scan_string(input, i, quote)?;
            }
            _ => {}
        }
        i += 1;
    }
    Err(ExprError { msg: "unclosed ${ expression".to_string(), pos: start.saturating_sub(2) })
}

// Returns the offset of the closing quote.
fn scan_string(input: &str, start: usize, quote: u8) -> Result<usize, ExprError> {
    let bytes = input.as_bytes();
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            c if c == quote => return Ok(i),
            _ => i += 1,
        }
    }
    Err(ExprError { msg: "unterminated string literal".to_string(), pos: start })
}

/// A parsed `c:for` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopHeader {
    /// Loop variable bound to each element.
    pub var: String,
    /// Optional index (or map key) variable.
    pub idx: Option<String>,
    /// Source text of the collection expression.
    pub expr: String,
    /// Byte offset of the collection expression within the header.
    pub expr_pos: usize,
}

fn loop_ident(i: Input) -> IResult<Input, Input> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_').parse(i)
}

fn loop_header(i: Input) -> IResult<Input, (Input, Option<Input>)> {
    let (i, _) = multispace0(i)?;
    let (i, var) = loop_ident(i)?;
    let (i, idx) = opt(preceded(
        delimited(multispace0, char(','), multispace0),
        loop_ident,
    ))
    .parse(i)?;
    let (i, _) = delimited(multispace1, tag("in"), multispace1).parse(i)?;
    Ok((i, (var, idx)))
}

/// Scans a `c:for` loop header.
pub fn lex_loop(input: &str) -> Result<LoopHeader, ExprError> {
    let span = Input::new(input);
    match loop_header(span) {
        Ok((rest, (var, idx))) => {
            let expr = rest.fragment().trim_end();
            if expr.is_empty() {
                return Err(ExprError {
                    msg: "c:for header is missing a collection expression".to_string(),
                    pos: rest.location_offset(),
                });
            }
            Ok(LoopHeader {
                var: var.fragment().to_string(),
                idx: idx.map(|s| s.fragment().to_string()),
                expr: expr.to_string(),
                expr_pos: rest.location_offset(),
            })
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(ExprError {
            msg: "expected `VAR in EXPR` or `VAR, IDX in EXPR`".to_string(),
            pos: e.input.location_offset(),
        }),
        Err(nom::Err::Incomplete(_)) => Err(ExprError {
            msg: "unexpected end of loop header".to_string(),
            pos: input.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_single_item() {
        let items = lex_interpolation("hello world").unwrap();
        assert_eq!(items, vec![Item::Text { text: "hello world".into(), pos: 0 }]);
    }

    #[test]
    fn test_mixed_items_with_positions() {
        let items = lex_interpolation("a${x}b${y}").unwrap();
        assert_eq!(
            items,
            vec![
                Item::Text { text: "a".into(), pos: 0 },
                Item::Expr { text: "x".into(), pos: 3 },
                Item::Text { text: "b".into(), pos: 5 },
                Item::Expr { text: "y".into(), pos: 8 },
            ]
        );
    }

    #[test]
    fn test_nested_braces_and_strings() {
        let items = lex_interpolation(r#"${ {a: "}"} }"#).unwrap();
        assert_eq!(items.len(), 1);
        match &items[0] {
            Item::Expr { text, .. } => assert_eq!(text, r#" {a: "}"} "#),
            other => panic!("expected expr item, got {other:?}"),
        }
    }

    #[test]
    fn test_unclosed_expression() {
        let err = lex_interpolation("ab${unclosed").unwrap_err();
        assert_eq!(err.pos, 2);
        assert!(err.msg.contains("unclosed"));
    }

    #[test]
    fn test_unterminated_string() {
        let err = lex_interpolation(r#"${"oops}"#).unwrap_err();
        assert!(err.msg.contains("unterminated"));
    }

    #[test]
    fn test_dollar_without_brace_is_text() {
        let items = lex_interpolation("cost: $5").unwrap();
        assert_eq!(items, vec![Item::Text { text: "cost: $5".into(), pos: 0 }]);
    }

    #[test]
    fn test_empty_input() {
        let items = lex_interpolation("").unwrap();
        assert_eq!(items, vec![Item::Text { text: String::new(), pos: 0 }]);
    }

    #[test]
    fn test_loop_simple() {
        let header = lex_loop("w in words").unwrap();
        assert_eq!(header.var, "w");
        assert_eq!(header.idx, None);
        assert_eq!(header.expr, "words");
        assert_eq!(header.expr_pos, 5);
    }

    #[test]
    fn test_loop_with_index() {
        let header = lex_loop("item, i in  list.entries").unwrap();
        assert_eq!(header.var, "item");
        assert_eq!(header.idx.as_deref(), Some("i"));
        assert_eq!(header.expr, "list.entries");
    }

    #[test]
    fn test_loop_rejects_malformed_header() {
        assert!(lex_loop("in xs").is_err());
        assert!(lex_loop("x over xs").is_err());
        assert!(lex_loop("x in ").is_err());
    }
}
