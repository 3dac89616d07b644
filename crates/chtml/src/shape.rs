// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Structural type descriptors.
//!
//! A [`Shape`] describes the structure of a template value. Shapes come from
//! three places: declared argument defaults, `c:as="…"` annotations, and the
//! static checker's inference over expressions. They form a small lattice
//! whose least-upper-bound is [`Shape::merge`].
//!
//! # Shape literal syntax
//!
//! - Atoms: `any`, `bool`, `string`, `number`, `html`
//! - Arrays: `[T]`
//! - Structs: `{name: string, age: number}`
//! - Maps: `{_: T}` (uniform value type, arbitrary keys)

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::{map, opt},
    multi::separated_list0,
    sequence::{delimited, preceded},
    IResult, Parser,
};
use nom_locate::LocatedSpan;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

type Input<'a> = LocatedSpan<&'a str>;

/// Algebraic type descriptor for template values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shape {
    /// Unknown or heterogeneous.
    Any,
    /// Boolean.
    Bool,
    /// Integer or floating point number.
    Number,
    /// Text.
    String,
    /// A rendered HTML node.
    Html,
    /// An attribute name/value pair produced by `<c:attr>`.
    HtmlAttr,
    /// Homogeneous sequence.
    Array(Box<Shape>),
    /// Struct, map, or unshaped bag.
    ///
    /// `fields` set and `elem` unset is a struct; `fields` unset and `elem`
    /// set is a map with uniform values; both unset is an unshaped object.
    Object {
        /// Named fields of a struct type.
        fields: Option<BTreeMap<String, Shape>>,
        /// Uniform value type of a map type.
        elem: Option<Box<Shape>>,
    },
}

impl Shape {
    /// Shorthand for an array shape.
    pub fn array(elem: Shape) -> Self {
        Shape::Array(Box::new(elem))
    }

    /// Shorthand for a struct shape.
    pub fn object(fields: BTreeMap<String, Shape>) -> Self {
        Shape::Object { fields: Some(fields), elem: None }
    }

    /// Shorthand for a map shape with uniform values.
    pub fn map_of(elem: Shape) -> Self {
        Shape::Object { fields: None, elem: Some(Box::new(elem)) }
    }

    /// An object with no declared structure.
    pub fn unshaped() -> Self {
        Shape::Object { fields: None, elem: None }
    }

    /// True for `Object` shapes whose `elem` is set and `fields` is not.
    pub fn is_map_type(&self) -> bool {
        matches!(self, Shape::Object { fields: None, elem: Some(_) })
    }

    /// Least-upper-bound of two shapes.
    ///
    /// Equal shapes merge to themselves. Arrays merge elementwise, structs
    /// merge to the intersection of their fields merged pointwise, and
    /// everything else widens to `Any`.
    pub fn merge(&self, other: &Shape) -> Shape {
        if self == other {
            return self.clone();
        }
        match (self, other) {
            (Shape::Array(a), Shape::Array(b)) => Shape::array(a.merge(b)),
            (
                Shape::Object { fields: Some(fa), elem: None },
                Shape::Object { fields: Some(fb), elem: None },
            ) => {
                let mut fields = BTreeMap::new();
                for (k, va) in fa {
                    if let Some(vb) = fb.get(k) {
                        fields.insert(k.clone(), va.merge(vb));
                    }
                }
                Shape::object(fields)
            }
            _ => Shape::Any,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Any => write!(f, "any"),
            Shape::Bool => write!(f, "bool"),
            Shape::Number => write!(f, "number"),
            Shape::String => write!(f, "string"),
            Shape::Html => write!(f, "html"),
            Shape::HtmlAttr => write!(f, "attr"),
            Shape::Array(elem) => write!(f, "[{}]", elem),
            Shape::Object { fields: Some(fields), .. } => {
                write!(f, "{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Shape::Object { fields: None, elem: Some(elem) } => write!(f, "{{_: {}}}", elem),
            Shape::Object { fields: None, elem: None } => write!(f, "{{}}"),
        }
    }
}

/// Error produced by [`parse_shape`] for malformed shape literals.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid shape literal at offset {pos}: {msg}")]
pub struct ShapeParseError {
    /// Description of the problem.
    pub msg: String,
    /// Byte offset into the literal text.
    pub pos: usize,
}

/// Parses a shape literal such as `[string]` or `{_: number}`.
pub fn parse_shape(text: &str) -> Result<Shape, ShapeParseError> {
    let input = Input::new(text);
    match shape_expr(input) {
        Ok((rest, shape)) => {
            if rest.fragment().trim().is_empty() {
                Ok(shape)
            } else {
                Err(ShapeParseError {
                    msg: format!("unexpected trailing input {:?}", rest.fragment().trim()),
                    pos: rest.location_offset(),
                })
            }
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(ShapeParseError {
            msg: "expected a shape".to_string(),
            pos: e.input.location_offset(),
        }),
        Err(nom::Err::Incomplete(_)) => Err(ShapeParseError {
            msg: "unexpected end of input".to_string(),
            pos: text.len(),
        }),
    }
}

fn shape_expr(i: Input) -> IResult<Input, Shape> {
    preceded(multispace0, alt((array_shape, object_shape, atom_shape))).parse(i)
}

fn atom_shape(i: Input) -> IResult<Input, Shape> {
    let (rest, name) = take_while1(|c: char| c.is_ascii_alphanumeric()).parse(i)?;
    let shape = match *name.fragment() {
        "any" => Shape::Any,
        "bool" => Shape::Bool,
        "string" => Shape::String,
        "number" => Shape::Number,
        "html" => Shape::Html,
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                name,
                nom::error::ErrorKind::Tag,
            )))
        }
    };
    Ok((rest, shape))
}

fn array_shape(i: Input) -> IResult<Input, Shape> {
    map(
        delimited(char('['), shape_expr, preceded(multispace0, char(']'))),
        |elem| Shape::array(elem),
    )
    .parse(i)
}

fn object_shape(i: Input) -> IResult<Input, Shape> {
    let (i, _) = char('{').parse(i)?;
    let (i, pairs) =
        separated_list0(preceded(multispace0, char(',')), shape_field).parse(i)?;
    let (i, _) = preceded(multispace0, opt(char(','))).parse(i)?;
    let (i, _) = preceded(multispace0, char('}')).parse(i)?;

    // A lone `_` key denotes a map type; in any other combination `_` is an
    // ordinary field name.
    if pairs.len() == 1 && pairs[0].0 == "_" {
        return Ok((i, Shape::map_of(pairs.into_iter().next().unwrap().1)));
    }
    if pairs.is_empty() {
        return Ok((i, Shape::unshaped()));
    }
    Ok((i, Shape::object(pairs.into_iter().collect())))
}

fn shape_field(i: Input) -> IResult<Input, (String, Shape)> {
    let (i, _) = multispace0(i)?;
    let (i, key) =
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-').parse(i)?;
    let (i, _) = preceded(multispace0, char(':')).parse(i)?;
    let (i, shape) = shape_expr(i)?;
    Ok((i, (key.fragment().to_string(), shape)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_atoms() {
        assert_eq!(parse_shape("any").unwrap(), Shape::Any);
        assert_eq!(parse_shape(" string ").unwrap(), Shape::String);
        assert_eq!(parse_shape("number").unwrap(), Shape::Number);
        assert!(parse_shape("integer").is_err());
    }

    #[test]
    fn test_parse_array_and_nesting() {
        assert_eq!(parse_shape("[string]").unwrap(), Shape::array(Shape::String));
        assert_eq!(
            parse_shape("[[number]]").unwrap(),
            Shape::array(Shape::array(Shape::Number))
        );
    }

    #[test]
    fn test_parse_struct() {
        let shape = parse_shape("{name: string, age: number}").unwrap();
        match &shape {
            Shape::Object { fields: Some(fields), elem: None } => {
                assert_eq!(fields.get("name"), Some(&Shape::String));
                assert_eq!(fields.get("age"), Some(&Shape::Number));
            }
            other => panic!("expected struct shape, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_map_type() {
        let shape = parse_shape("{_: number}").unwrap();
        assert!(shape.is_map_type());
        assert_eq!(shape, Shape::map_of(Shape::Number));

        // `_` next to other keys is an ordinary field.
        let mixed = parse_shape("{_: number, x: string}").unwrap();
        assert!(!mixed.is_map_type());
    }

    #[test]
    fn test_parse_empty_object() {
        assert_eq!(parse_shape("{}").unwrap(), Shape::unshaped());
    }

    #[test]
    fn test_parse_trailing_garbage() {
        let err = parse_shape("string]").unwrap_err();
        assert_eq!(err.pos, 6);
    }

    #[test]
    fn test_merge_equal_and_widening() {
        assert_eq!(Shape::String.merge(&Shape::String), Shape::String);
        assert_eq!(Shape::String.merge(&Shape::Number), Shape::Any);
        assert_eq!(
            Shape::array(Shape::String).merge(&Shape::array(Shape::String)),
            Shape::array(Shape::String)
        );
        assert_eq!(
            Shape::array(Shape::String).merge(&Shape::array(Shape::Number)),
            Shape::array(Shape::Any)
        );
    }

    #[test]
    fn test_merge_structs_intersects_fields() {
        let a = parse_shape("{name: string, age: number}").unwrap();
        let b = parse_shape("{name: string, email: string}").unwrap();
        let merged = a.merge(&b);
        assert_eq!(merged, parse_shape("{name: string}").unwrap());
    }

    #[test]
    fn test_display_round_trip() {
        for lit in ["any", "[string]", "{_: number}", "{a: bool, b: [any]}", "{}"] {
            let shape = parse_shape(lit).unwrap();
            assert_eq!(parse_shape(&shape.to_string()).unwrap(), shape);
        }
    }
}
