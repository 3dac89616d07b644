// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Expression programs and interpolation.
//!
//! An [`Expr`] is the compiled form of a text node or attribute value.
//! Strings without `${…}` stay raw and render verbatim; interpolated strings
//! compile once into a program that concatenates its pieces through the
//! universal `combine(…)` built-in. Conditions additionally understand the
//! `EXPR is SHAPE as IDENT` surface form ([`CondExpr`]).

/// Expression AST.
pub mod ast;
/// Static shape checker.
pub mod check;
/// Tree-walking evaluator and built-ins.
pub mod eval;
/// Interpolation and loop-header lexers.
pub mod lexer;
/// Expression grammar.
pub mod parse;

pub use check::{check, SymbolTable, TypeError};
pub use eval::{Env, EvalError};
pub use lexer::{lex_interpolation, lex_loop, ExprError, Item, LoopHeader};

use crate::shape::Shape;
use crate::value::Value;
use ast::{ExprKind, ExprNode};
use std::rc::Rc;

/// A compiled expression program together with its source text.
#[derive(Debug, Clone)]
pub struct Program {
    ast: Rc<ExprNode>,
    src: String,
}

impl Program {
    /// The root AST node.
    pub fn ast(&self) -> &ExprNode {
        &self.ast
    }

    /// The program text the AST positions index into.
    pub fn src(&self) -> &str {
        &self.src
    }

    /// Evaluates the program.
    pub fn eval(&self, env: &mut Env) -> Result<Value, EvalError> {
        eval::eval(&self.ast, &self.src, env)
    }

    /// Statically checks the program.
    pub fn check(&self, symbols: &mut SymbolTable) -> Result<Shape, TypeError> {
        check::check(&self.ast, &self.src, symbols)
    }
}

/// A text or attribute value, compiled once at parse time.
#[derive(Debug, Clone, Default)]
pub enum Expr {
    /// No value at all.
    #[default]
    Empty,
    /// Literal text without `${…}`; used verbatim.
    Raw(String),
    /// An interpolated or direct expression program.
    Program(Program),
}

impl Expr {
    /// Compiles a possibly-interpolated string.
    ///
    /// Inputs without `${…}` stay [`Expr::Raw`]. A single `${…}` with no
    /// surrounding text compiles to its inner program directly; mixed inputs
    /// compile to a synthetic `combine(…)` call whose arguments keep their
    /// original byte positions.
    pub fn compile(text: &str) -> Result<Expr, ExprError> {
        if text.is_empty() {
            return Ok(Expr::Empty);
        }
        let items = lex_interpolation(text)?;
        if items.iter().all(|item| matches!(item, Item::Text { .. })) {
            return Ok(Expr::Raw(text.to_string()));
        }

        let mut args = Vec::new();
        for item in items {
            match item {
                Item::Text { text: t, pos } => {
                    if !t.is_empty() {
                        let len = t.len();
                        args.push(ExprNode::new(ExprKind::Str(t), pos, len));
                    }
                }
                Item::Expr { text: body, pos } => {
                    let mut node = parse::parse_program(&body)
                        .map_err(|e| ExprError { msg: e.msg, pos: pos + e.pos })?;
                    node.shift(pos);
                    args.push(node);
                }
            }
        }
        let ast = if args.len() == 1 {
            args.pop().unwrap()
        } else {
            ExprNode::new(
                ExprKind::Call { name: "combine".to_string(), args },
                0,
                text.len(),
            )
        };
        Ok(Expr::Program(Program { ast: Rc::new(ast), src: text.to_string() }))
    }

    /// Compiles an expression body found at `pos` within `full`.
    ///
    /// Used for `c:for` collection expressions, where the header text around
    /// the expression must stay addressable for error positions.
    pub(crate) fn compile_at(full: &str, body: &str, pos: usize) -> Result<Expr, ExprError> {
        let mut node = parse::parse_program(body)
            .map_err(|e| ExprError { msg: e.msg, pos: pos + e.pos })?;
        node.shift(pos);
        Ok(Expr::Program(Program { ast: Rc::new(node), src: full.to_string() }))
    }

    /// True when no value was provided.
    pub fn is_empty(&self) -> bool {
        matches!(self, Expr::Empty)
    }

    /// The original source text.
    pub fn raw_string(&self) -> &str {
        match self {
            Expr::Empty => "",
            Expr::Raw(s) => s,
            Expr::Program(p) => p.src(),
        }
    }

    /// Evaluates the value against an environment.
    pub fn value(&self, env: &mut Env) -> Result<Value, EvalError> {
        match self {
            Expr::Empty => Ok(Value::Null),
            Expr::Raw(s) => Ok(Value::String(s.clone())),
            Expr::Program(p) => p.eval(env),
        }
    }

    /// Statically checks the value's shape.
    pub fn check(&self, symbols: &mut SymbolTable) -> Result<Shape, TypeError> {
        match self {
            Expr::Empty => Ok(Shape::Any),
            Expr::Raw(_) => Ok(Shape::String),
            Expr::Program(p) => p.check(symbols),
        }
    }
}

/// A condition with optional shape-matching metadata.
///
/// `c:if="val is {name: string} as v"` tests `val` against the shape and,
/// on a match, binds `v` for the subtree.
#[derive(Debug, Clone, Default)]
pub struct CondExpr {
    /// The condition expression.
    pub expr: Expr,
    /// Shape to match when the `is` form is used.
    pub shape: Option<Shape>,
    /// Name to bind the matched value to, from `as IDENT`.
    pub bind_var: Option<String>,
}

impl CondExpr {
    /// Compiles a condition attribute value.
    ///
    /// Conditions are expressions: both the bare `c:if="EXPR"` form and the
    /// interpolated `c:if="${EXPR}"` form parse with the condition grammar
    /// (allowing `is SHAPE as IDENT`). Only text mixed with interpolation
    /// falls back to an ordinary combine program.
    pub fn compile(text: &str) -> Result<CondExpr, ExprError> {
        let items = lex_interpolation(text)?;
        let exprs: Vec<&Item> = items
            .iter()
            .filter(|item| matches!(item, Item::Expr { .. }))
            .collect();
        let only_whitespace_text = items.iter().all(|item| match item {
            Item::Text { text, .. } => text.trim().is_empty(),
            Item::Expr { .. } => true,
        });

        let (body, base) = match (exprs.as_slice(), only_whitespace_text) {
            ([Item::Expr { text: body, pos }], true) => (body.as_str(), *pos),
            ([], _) => (text, 0),
            _ => {
                return Ok(CondExpr {
                    expr: Expr::compile(text)?,
                    shape: None,
                    bind_var: None,
                })
            }
        };

        let (mut node, shape, bind_var) = parse::parse_cond_program(body)
            .map_err(|e| ExprError { msg: e.msg, pos: base + e.pos })?;
        node.shift(base);
        Ok(CondExpr {
            expr: Expr::Program(Program { ast: Rc::new(node), src: text.to_string() }),
            shape,
            bind_var,
        })
    }

    /// True for the bare `c:else` form.
    pub fn is_empty(&self) -> bool {
        self.expr.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_raw() {
        let expr = Expr::compile("plain text").unwrap();
        assert!(matches!(expr, Expr::Raw(_)));
        assert_eq!(expr.raw_string(), "plain text");
        assert_eq!(
            expr.value(&mut Env::new()).unwrap(),
            Value::String("plain text".into())
        );
    }

    #[test]
    fn test_compile_empty() {
        let expr = Expr::compile("").unwrap();
        assert!(expr.is_empty());
        assert_eq!(expr.value(&mut Env::new()).unwrap(), Value::Null);
    }

    #[test]
    fn test_single_interpolation_compiles_directly() {
        let expr = Expr::compile("${1 + 2}").unwrap();
        assert_eq!(expr.value(&mut Env::new()).unwrap(), Value::Int(3));
    }

    #[test]
    fn test_mixed_interpolation_combines() {
        let mut env = Env::new();
        env.set("name", Value::String("world".into()));
        let expr = Expr::compile("hello ${name}!").unwrap();
        assert_eq!(
            expr.value(&mut env).unwrap(),
            Value::String("hello world!".into())
        );
    }

    #[test]
    fn test_adjacent_interpolations_concatenate() {
        let expr = Expr::compile(r#"${"a"}${"b"}"#).unwrap();
        assert_eq!(expr.value(&mut Env::new()).unwrap(), Value::String("ab".into()));
    }

    #[test]
    fn test_compile_error_positions_are_absolute() {
        // The bad token sits at offset 9 of the whole attribute value.
        let err = Expr::compile("abc${1 + @}").unwrap_err();
        assert_eq!(err.pos, 9);
    }

    #[test]
    fn test_interpolated_value_keeps_structure() {
        let expr = Expr::compile("${{data: [1, 2, 3]}}").unwrap();
        match expr.value(&mut Env::new()).unwrap() {
            Value::Map(entries) => {
                assert!(entries.contains_key("data"));
            }
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn test_cond_compile_bare_literal() {
        // `c:if="false"` is the boolean literal, not the string "false".
        let cond = CondExpr::compile("false").unwrap();
        assert!(matches!(cond.expr, Expr::Program(_)));
        assert_eq!(cond.expr.value(&mut Env::new()).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_cond_compile_bare_expression() {
        let cond = CondExpr::compile("x > 2").unwrap();
        assert!(cond.shape.is_none());
        let mut env = Env::new();
        env.set("x", Value::Int(3));
        assert!(cond.expr.value(&mut env).unwrap().is_truthy());
        env.set("x", Value::Int(1));
        assert!(!cond.expr.value(&mut env).unwrap().is_truthy());
    }

    #[test]
    fn test_cond_compile_shape_match() {
        let cond = CondExpr::compile("${val is [number] as nums}").unwrap();
        assert_eq!(cond.shape, Some(Shape::array(Shape::Number)));
        assert_eq!(cond.bind_var.as_deref(), Some("nums"));
        // The bare form carries the same metadata.
        let bare = CondExpr::compile("val is [number] as nums").unwrap();
        assert_eq!(bare.shape, Some(Shape::array(Shape::Number)));
        assert_eq!(bare.bind_var.as_deref(), Some("nums"));
    }

    #[test]
    fn test_cond_compile_expression() {
        let mut env = Env::new();
        env.set("n", Value::Int(3));
        let cond = CondExpr::compile("${n > 2}").unwrap();
        assert!(cond.shape.is_none());
        assert!(cond.expr.value(&mut env).unwrap().is_truthy());
    }

    #[test]
    fn test_check_shifted_positions() {
        // A member-access error inside the second interpolation reports its
        // position relative to the whole value.
        let expr = Expr::compile("x ${a} y ${n.bad}").unwrap();
        let mut symbols = SymbolTable::new();
        symbols.bind("n", Shape::Number);
        let err = expr.check(&mut symbols).unwrap_err();
        assert_eq!(err.pos, 11);
    }
}
