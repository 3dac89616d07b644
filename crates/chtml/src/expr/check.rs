// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Conservative static shape inference.
//!
//! The checker runs at parse time over every compiled expression. It is
//! deliberately forgiving: unknown identifiers infer `Any` without
//! complaint, and only structurally impossible operations (member access on
//! a number, indexing a bool) produce a [`TypeError`]. Errors carry a byte
//! position relative to the expression text; the parser translates that into
//! a template location.

use super::ast::{BinaryOp, ExprKind, ExprNode, UnaryOp};
use crate::shape::{parse_shape, Shape};
use std::collections::HashMap;
use thiserror::Error;

/// A static type violation found by the checker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{msg}")]
pub struct TypeError {
    /// Human-readable description.
    pub msg: String,
    /// Byte offset into the expression text.
    pub pos: usize,
    /// The member being accessed, when the error is a member access.
    pub member_name: Option<String>,
    /// Source text of the object expression, when applicable.
    pub object_expr: Option<String>,
}

impl TypeError {
    fn new(msg: impl Into<String>, pos: usize) -> Self {
        Self { msg: msg.into(), pos, member_name: None, object_expr: None }
    }
}

/// Known variable shapes during checking.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    syms: HashMap<String, Shape>,
}

impl SymbolTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from a shape map.
    pub fn from_map(syms: HashMap<String, Shape>) -> Self {
        Self { syms }
    }

    /// Looks up a symbol.
    pub fn get(&self, name: &str) -> Option<&Shape> {
        self.syms.get(name)
    }

    /// Binds a symbol, returning the shadowed shape for [`restore`](Self::restore).
    pub fn bind(&mut self, name: &str, shape: Shape) -> Option<Shape> {
        self.syms.insert(name.to_string(), shape)
    }

    /// Restores a binding saved by [`bind`](Self::bind).
    pub fn restore(&mut self, name: &str, prev: Option<Shape>) {
        match prev {
            Some(s) => {
                self.syms.insert(name.to_string(), s);
            }
            None => {
                self.syms.remove(name);
            }
        }
    }
}

/// Infers the shape of an expression.
pub fn check(node: &ExprNode, src: &str, symbols: &mut SymbolTable) -> Result<Shape, TypeError> {
    match &node.kind {
        ExprKind::Nil => Ok(Shape::Any),
        ExprKind::Bool(_) => Ok(Shape::Bool),
        ExprKind::Int(_) | ExprKind::Float(_) => Ok(Shape::Number),
        ExprKind::Str(_) => Ok(Shape::String),
        ExprKind::Ident(name) => Ok(symbols.get(name).cloned().unwrap_or(Shape::Any)),
        ExprKind::Member { base, name } => {
            let base_shape = check(base, src, symbols)?;
            member_shape(&base_shape, name, base, src, node.pos)
        }
        ExprKind::Index { base, index } => {
            let base_shape = check(base, src, symbols)?;
            let index_shape = check(index, src, symbols)?;
            match &base_shape {
                Shape::Any => Ok(Shape::Any),
                Shape::Array(elem) => match index_shape {
                    Shape::Number | Shape::Any => Ok((**elem).clone()),
                    other => Err(TypeError::new(
                        format!(
                            "cannot index {} with {}",
                            base.text(src),
                            other
                        ),
                        node.pos,
                    )),
                },
                Shape::Object { fields, elem } => {
                    if let ExprKind::Str(key) = &index.kind {
                        if let Some(fields) = fields {
                            return Ok(fields.get(key).cloned().unwrap_or(Shape::Any));
                        }
                    }
                    match elem {
                        Some(elem) => Ok((**elem).clone()),
                        None => Ok(Shape::Any),
                    }
                }
                other => Err(TypeError::new(
                    format!("cannot index {} of shape {}", base.text(src), other),
                    node.pos,
                )),
            }
        }
        ExprKind::Array(items) => {
            let mut elem = None;
            for item in items {
                let s = check(item, src, symbols)?;
                elem = Some(match elem {
                    None => s,
                    Some(prev) => Shape::merge(&prev, &s),
                });
            }
            Ok(Shape::array(elem.unwrap_or(Shape::Any)))
        }
        ExprKind::Map(pairs) => {
            // A single `_` key denotes a map type; otherwise `_` is a field.
            if pairs.len() == 1 && pairs[0].0 == "_" {
                let elem = check(&pairs[0].1, src, symbols)?;
                return Ok(Shape::map_of(elem));
            }
            let mut fields = std::collections::BTreeMap::new();
            for (k, v) in pairs {
                fields.insert(k.clone(), check(v, src, symbols)?);
            }
            Ok(Shape::object(fields))
        }
        ExprKind::Unary { op, operand } => {
            check(operand, src, symbols)?;
            Ok(match op {
                UnaryOp::Not => Shape::Bool,
                UnaryOp::Neg => Shape::Number,
            })
        }
        ExprKind::Binary { op, lhs, rhs } => {
            let l = check(lhs, src, symbols)?;
            let r = check(rhs, src, symbols)?;
            Ok(match op {
                BinaryOp::Add => match (&l, &r) {
                    (Shape::String, Shape::String) => Shape::String,
                    (Shape::Number, Shape::Number) => Shape::Number,
                    (Shape::Html, _) | (_, Shape::Html) => Shape::Html,
                    _ => Shape::Any,
                },
                BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => Shape::Number,
                _ => Shape::Bool,
            })
        }
        ExprKind::Ternary { cond, then, otherwise } => {
            check(cond, src, symbols)?;
            let a = check(then, src, symbols)?;
            let b = check(otherwise, src, symbols)?;
            if a == b {
                Ok(a)
            } else if a == Shape::Html || b == Shape::Html {
                Ok(Shape::Html)
            } else {
                Ok(Shape::Any)
            }
        }
        ExprKind::Call { name, args } => check_call(name, args, src, symbols, node.pos),
        ExprKind::Let { name, value } => {
            let shape = check(value, src, symbols)?;
            symbols.bind(name, shape.clone());
            Ok(shape)
        }
        ExprKind::Seq(stmts) => {
            let mut bound: Vec<(String, Option<Shape>)> = Vec::new();
            let mut last = Shape::Any;
            let mut result = Ok(());
            for stmt in stmts {
                match &stmt.kind {
                    ExprKind::Let { name, value } => match check(value, src, symbols) {
                        Ok(shape) => {
                            let prev = symbols.bind(name, shape.clone());
                            bound.push((name.clone(), prev));
                            last = shape;
                        }
                        Err(e) => {
                            result = Err(e);
                            break;
                        }
                    },
                    _ => match check(stmt, src, symbols) {
                        Ok(shape) => last = shape,
                        Err(e) => {
                            result = Err(e);
                            break;
                        }
                    },
                }
            }
            for (name, prev) in bound.into_iter().rev() {
                symbols.restore(&name, prev);
            }
            result.map(|_| last)
        }
    }
}

fn member_shape(
    base_shape: &Shape,
    name: &str,
    base: &ExprNode,
    src: &str,
    pos: usize,
) -> Result<Shape, TypeError> {
    match base_shape {
        Shape::Any => Ok(Shape::Any),
        Shape::Object { fields: Some(fields), .. } => {
            // Missing fields are Any, silently: optional arguments are
            // routinely probed with `c:if`.
            Ok(fields.get(name).cloned().unwrap_or(Shape::Any))
        }
        Shape::Object { fields: None, elem: Some(elem) } => Ok((**elem).clone()),
        Shape::Object { fields: None, elem: None } => Ok(Shape::Any),
        Shape::Array(elem) => {
            if name.parse::<usize>().is_ok() {
                Ok((**elem).clone())
            } else {
                Err(TypeError {
                    msg: format!(
                        "cannot access member '{}' on {} of shape {}",
                        name,
                        base.text(src),
                        base_shape
                    ),
                    pos,
                    member_name: Some(name.to_string()),
                    object_expr: Some(base.text(src).to_string()),
                })
            }
        }
        other => Err(TypeError {
            msg: format!(
                "cannot access member '{}' on {} of shape {}",
                name,
                base.text(src),
                other
            ),
            pos,
            member_name: Some(name.to_string()),
            object_expr: Some(base.text(src).to_string()),
        }),
    }
}

fn check_call(
    name: &str,
    args: &[ExprNode],
    src: &str,
    symbols: &mut SymbolTable,
    pos: usize,
) -> Result<Shape, TypeError> {
    match name {
        "cast" | "new" => {
            let shape_arg = if name == "cast" {
                if let Some(first) = args.first() {
                    check(first, src, symbols)?;
                }
                args.get(1)
            } else {
                args.first()
            };
            let Some(arg) = shape_arg else {
                return Err(TypeError::new(format!("{}() is missing its shape argument", name), pos));
            };
            let text = arg.text(src).trim();
            if name == "new" && text == "any" {
                return Ok(Shape::Any);
            }
            parse_shape(text).map_err(|e| TypeError::new(e.msg, arg.pos + e.pos))
        }
        "type" => match args.first() {
            Some(arg) => check(arg, src, symbols),
            None => Ok(Shape::Any),
        },
        "duration" | "len" => {
            for arg in args {
                check(arg, src, symbols)?;
            }
            Ok(Shape::Number)
        }
        "formatDuration" => {
            for arg in args {
                check(arg, src, symbols)?;
            }
            Ok(Shape::String)
        }
        "combine" => {
            let mut shapes = Vec::with_capacity(args.len());
            for arg in args {
                shapes.push(check(arg, src, symbols)?);
            }
            match shapes.len() {
                0 => Ok(Shape::Any),
                1 => Ok(shapes.into_iter().next().unwrap()),
                _ => {
                    if shapes.iter().all(|s| *s == Shape::String) {
                        Ok(Shape::String)
                    } else {
                        Ok(Shape::Any)
                    }
                }
            }
        }
        "filter" | "sort" | "reverse" | "unique" | "take" => {
            let Some(first) = args.first() else {
                return Err(TypeError::new(format!("{}() takes at least 1 argument", name), pos));
            };
            let arr_shape = check(first, src, symbols)?;
            if args.len() > 1 {
                let elem_shape = match &arr_shape {
                    Shape::Array(elem) => (**elem).clone(),
                    _ => Shape::Any,
                };
                let prev = symbols.bind("#", elem_shape);
                let checked = check(&args[1], src, symbols);
                symbols.restore("#", prev);
                checked?;
            }
            Ok(arr_shape)
        }
        _ => {
            for arg in args {
                check(arg, src, symbols)?;
            }
            Ok(Shape::Any)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse::parse_program;

    fn infer(src: &str, symbols: &mut SymbolTable) -> Result<Shape, TypeError> {
        let ast = parse_program(src).unwrap();
        check(&ast, src, symbols)
    }

    fn infer_ok(src: &str) -> Shape {
        infer(src, &mut SymbolTable::new()).unwrap()
    }

    fn struct_syms(fields: &[(&str, Shape)]) -> SymbolTable {
        let mut table = SymbolTable::new();
        for (name, shape) in fields {
            table.bind(name, shape.clone());
        }
        table
    }

    #[test]
    fn test_literals() {
        assert_eq!(infer_ok("1"), Shape::Number);
        assert_eq!(infer_ok("1.5"), Shape::Number);
        assert_eq!(infer_ok("true"), Shape::Bool);
        assert_eq!(infer_ok("'x'"), Shape::String);
        assert_eq!(infer_ok("nil"), Shape::Any);
    }

    #[test]
    fn test_unknown_identifier_is_any() {
        assert_eq!(infer_ok("mystery"), Shape::Any);
        assert_eq!(infer_ok("mystery.deep"), Shape::Any);
    }

    #[test]
    fn test_member_on_struct() {
        let obj = parse_shape("{name: string}").unwrap();
        let mut syms = struct_syms(&[("obj", obj)]);
        assert_eq!(infer("obj.name", &mut syms).unwrap(), Shape::String);
        // Missing field on a struct is Any, silently.
        assert_eq!(infer("obj.missing", &mut syms).unwrap(), Shape::Any);
    }

    #[test]
    fn test_member_on_map_type_returns_elem() {
        let map = parse_shape("{_: number}").unwrap();
        let mut syms = struct_syms(&[("m", map)]);
        assert_eq!(infer("m.anything", &mut syms).unwrap(), Shape::Number);
    }

    #[test]
    fn test_member_on_scalar_errors() {
        let mut syms = struct_syms(&[("x", Shape::Number)]);
        let err = infer("x.bar", &mut syms).unwrap_err();
        assert_eq!(err.msg, "cannot access member 'bar' on x of shape number");
        assert_eq!(err.member_name.as_deref(), Some("bar"));
        assert_eq!(err.object_expr.as_deref(), Some("x"));
        assert_eq!(err.pos, 0);
    }

    #[test]
    fn test_array_member_access() {
        let mut syms = struct_syms(&[("xs", Shape::array(Shape::String))]);
        assert_eq!(infer("xs[0]", &mut syms).unwrap(), Shape::String);
        assert_eq!(infer("xs.0", &mut syms).unwrap(), Shape::String);
        let err = infer("xs.first", &mut syms).unwrap_err();
        assert!(err.msg.contains("cannot access member 'first'"));
    }

    #[test]
    fn test_array_literal_inference() {
        assert_eq!(infer_ok("[1, 2]"), Shape::array(Shape::Number));
        assert_eq!(infer_ok("[1, 'x']"), Shape::array(Shape::Any));
        assert_eq!(infer_ok("[]"), Shape::array(Shape::Any));
    }

    #[test]
    fn test_map_literal_context_sensitivity() {
        assert_eq!(infer_ok("{_: 1}"), Shape::map_of(Shape::Number));
        let mixed = infer_ok("{_: 1, x: 'y'}");
        assert!(!mixed.is_map_type());
        assert_eq!(
            infer_ok("{data: [1, 2, 3]}"),
            parse_shape("{data: [number]}").unwrap()
        );
    }

    #[test]
    fn test_ternary_shapes() {
        assert_eq!(infer_ok("c ? 1 : 2"), Shape::Number);
        assert_eq!(infer_ok("c ? 1 : 'x'"), Shape::Any);
    }

    #[test]
    fn test_cast_shapes() {
        assert_eq!(infer_ok("cast(x, string)"), Shape::String);
        assert_eq!(infer_ok("cast(x, [string])"), Shape::array(Shape::String));
        let map = infer_ok("cast(x, {_: number})");
        assert!(map.is_map_type());
    }

    #[test]
    fn test_builtin_shapes() {
        assert_eq!(infer_ok("duration('5s')"), Shape::Number);
        assert_eq!(infer_ok("formatDuration(x)"), Shape::String);
        assert_eq!(infer_ok("combine('a', 'b')"), Shape::String);
        assert_eq!(infer_ok("combine('a', 1)"), Shape::Any);
        assert_eq!(infer_ok("combine([1])"), Shape::array(Shape::Number));
        let mut syms = struct_syms(&[("xs", Shape::array(Shape::Number))]);
        assert_eq!(infer("filter(xs, # > 2)", &mut syms).unwrap(), Shape::array(Shape::Number));
        assert_eq!(infer("sort(xs)", &mut syms).unwrap(), Shape::array(Shape::Number));
    }

    #[test]
    fn test_let_threads_symbols() {
        assert_eq!(infer_ok("let x = 'a'; x"), Shape::String);
        let mut syms = SymbolTable::new();
        infer("let tmp = 1; tmp", &mut syms).unwrap();
        assert!(syms.get("tmp").is_none());
    }

    #[test]
    fn test_error_position_is_expression_relative() {
        let mut syms = struct_syms(&[("n", Shape::Number)]);
        let err = infer("1 + n.bad", &mut syms).unwrap_err();
        assert_eq!(err.pos, 4);
    }
}
