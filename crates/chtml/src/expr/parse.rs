// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Expression grammar.
//!
//! Recursive-descent parser over a small token stream. Precedence, loosest
//! to tightest: `?:`, `||`, `&&`, `== !=`, `< <= > >=`, `+ -`, `* / %`,
//! unary `! -`, postfix `.member` / `[index]` / calls. Programs are one or
//! more `;`-separated statements where a statement is either `let NAME =
//! EXPR` or an expression; the program evaluates to the last statement.

use super::ast::{BinaryOp, ExprKind, ExprNode, UnaryOp};
use super::lexer::ExprError;
use crate::shape::{parse_shape, Shape};

#[derive(Debug, Clone, PartialEq)]
enum TokKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokKind,
    pos: usize,
    len: usize,
}

const PUNCTS2: &[&str] = &["==", "!=", "<=", ">=", "&&", "||"];
const PUNCTS1: &[&str] = &[
    "(", ")", "[", "]", "{", "}", ",", ":", ";", ".", "?", "+", "-", "*", "/", "%", "!",
    "=", "<", ">",
];

fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let bytes = src.as_bytes();
    let mut toks = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let mut is_float = false;
            if i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1].is_ascii_digit() {
                is_float = true;
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text = &src[start..i];
            let kind = if is_float {
                TokKind::Float(text.parse().map_err(|_| ExprError {
                    msg: format!("invalid number literal {:?}", text),
                    pos: start,
                })?)
            } else {
                match text.parse::<i64>() {
                    Ok(n) => TokKind::Int(n),
                    Err(_) => TokKind::Float(text.parse().map_err(|_| ExprError {
                        msg: format!("invalid number literal {:?}", text),
                        pos: start,
                    })?),
                }
            };
            toks.push(Token { kind, pos: start, len: i - start });
            continue;
        }
        if c.is_ascii_alphabetic() || c == b'_' || c == b'#' {
            let start = i;
            if c == b'#' {
                i += 1;
            } else {
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_')
                {
                    i += 1;
                }
            }
            toks.push(Token {
                kind: TokKind::Ident(src[start..i].to_string()),
                pos: start,
                len: i - start,
            });
            continue;
        }
        if c == b'"' || c == b'\'' {
            let start = i;
            let (text, end) = lex_string(src, i, c)?;
            toks.push(Token { kind: TokKind::Str(text), pos: start, len: end - start });
            i = end;
            continue;
        }
        if c.is_ascii() {
            if i + 1 < bytes.len() && bytes[i + 1].is_ascii() {
                let two = &src[i..i + 2];
                if let Some(p) = PUNCTS2.iter().find(|p| **p == two) {
                    toks.push(Token { kind: TokKind::Punct(p), pos: i, len: 2 });
                    i += 2;
                    continue;
                }
            }
            let one = &src[i..i + 1];
            if let Some(p) = PUNCTS1.iter().find(|p| **p == one) {
                toks.push(Token { kind: TokKind::Punct(p), pos: i, len: 1 });
                i += 1;
                continue;
            }
        }
        return Err(ExprError {
            msg: format!("unexpected character {:?}", src[i..].chars().next().unwrap()),
            pos: i,
        });
    }
    toks.push(Token { kind: TokKind::Eof, pos: src.len(), len: 0 });
    Ok(toks)
}

// Returns the unescaped string and the offset one past the closing quote.
fn lex_string(src: &str, start: usize, quote: u8) -> Result<(String, usize), ExprError> {
    let bytes = src.as_bytes();
    let mut out = String::new();
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => match bytes.get(i + 1) {
                None => break,
                Some(b'n') => {
                    out.push('\n');
                    i += 2;
                }
                Some(b't') => {
                    out.push('\t');
                    i += 2;
                }
                Some(b'r') => {
                    out.push('\r');
                    i += 2;
                }
                Some(&b) if b.is_ascii() => {
                    out.push(b as char);
                    i += 2;
                }
                Some(_) => {
                    out.push('\\');
                    i += 1;
                }
            },
            c if c == quote => return Ok((out, i + 1)),
            _ => {
                let ch = src[i..].chars().next().unwrap();
                out.push(ch);
                i += ch.len_utf8();
            }
        }
    }
    Err(ExprError { msg: "unterminated string literal".to_string(), pos: start })
}

struct Parser<'a> {
    src: &'a str,
    toks: Vec<Token>,
    i: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Result<Self, ExprError> {
        Ok(Self { src, toks: tokenize(src)?, i: 0 })
    }

    fn peek(&self) -> &Token {
        &self.toks[self.i]
    }

    fn advance(&mut self) -> Token {
        let tok = self.toks[self.i].clone();
        if self.i + 1 < self.toks.len() {
            self.i += 1;
        }
        tok
    }

    fn at_punct(&self, p: &str) -> bool {
        matches!(&self.peek().kind, TokKind::Punct(q) if *q == p)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.at_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> Result<Token, ExprError> {
        if self.at_punct(p) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("expected {:?}", p)))
        }
    }

    fn at_ident(&self, name: &str) -> bool {
        matches!(&self.peek().kind, TokKind::Ident(id) if id == name)
    }

    fn unexpected(&self, what: &str) -> ExprError {
        let tok = self.peek();
        let found = match &tok.kind {
            TokKind::Eof => "end of expression".to_string(),
            _ => format!("{:?}", &self.src[tok.pos..tok.pos + tok.len]),
        };
        ExprError { msg: format!("{}, found {}", what, found), pos: tok.pos }
    }

    fn span_from(&self, start: usize) -> (usize, usize) {
        // End position of the previous (already consumed) token.
        let prev = &self.toks[self.i.saturating_sub(1)];
        (start, (prev.pos + prev.len).saturating_sub(start))
    }

    fn parse_program(&mut self) -> Result<ExprNode, ExprError> {
        let start = self.peek().pos;
        let mut stmts = Vec::new();
        loop {
            if matches!(self.peek().kind, TokKind::Eof) {
                break;
            }
            stmts.push(self.parse_statement()?);
            if !self.eat_punct(";") {
                break;
            }
        }
        if !matches!(self.peek().kind, TokKind::Eof) {
            return Err(self.unexpected("expected end of expression"));
        }
        match stmts.len() {
            0 => Err(ExprError { msg: "empty expression".to_string(), pos: 0 }),
            1 if !matches!(stmts[0].kind, ExprKind::Let { .. }) => {
                Ok(stmts.into_iter().next().unwrap())
            }
            _ => {
                let (pos, len) = self.span_from(start);
                Ok(ExprNode::new(ExprKind::Seq(stmts), pos, len))
            }
        }
    }

    fn parse_statement(&mut self) -> Result<ExprNode, ExprError> {
        if self.at_ident("let") {
            let start = self.advance().pos;
            let name = match self.advance() {
                Token { kind: TokKind::Ident(id), .. } => id,
                _ => return Err(self.unexpected("expected identifier after `let`")),
            };
            self.expect_punct("=")?;
            let value = self.parse_expr()?;
            let (pos, len) = self.span_from(start);
            Ok(ExprNode::new(ExprKind::Let { name, value: Box::new(value) }, pos, len))
        } else {
            self.parse_expr()
        }
    }

    fn parse_expr(&mut self) -> Result<ExprNode, ExprError> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Result<ExprNode, ExprError> {
        let cond = self.parse_binary(0)?;
        if !self.eat_punct("?") {
            return Ok(cond);
        }
        let then = self.parse_ternary()?;
        self.expect_punct(":")?;
        let otherwise = self.parse_ternary()?;
        let (pos, len) = self.span_from(cond.pos);
        Ok(ExprNode::new(
            ExprKind::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            pos,
            len,
        ))
    }

    // Precedence-climbing over the binary operator tiers.
    fn parse_binary(&mut self, min_tier: usize) -> Result<ExprNode, ExprError> {
        const TIERS: &[&[(&str, BinaryOp)]] = &[
            &[("||", BinaryOp::Or)],
            &[("&&", BinaryOp::And)],
            &[("==", BinaryOp::Eq), ("!=", BinaryOp::Ne)],
            &[
                ("<=", BinaryOp::Le),
                (">=", BinaryOp::Ge),
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
            ],
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
            &[("*", BinaryOp::Mul), ("/", BinaryOp::Div), ("%", BinaryOp::Mod)],
        ];
        if min_tier >= TIERS.len() {
            return self.parse_unary();
        }
        let mut lhs = self.parse_binary(min_tier + 1)?;
        'outer: loop {
            for (sym, op) in TIERS[min_tier] {
                if self.at_punct(sym) {
                    self.advance();
                    let rhs = self.parse_binary(min_tier + 1)?;
                    let (pos, len) = self.span_from(lhs.pos);
                    lhs = ExprNode::new(
                        ExprKind::Binary { op: *op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
                        pos,
                        len,
                    );
                    continue 'outer;
                }
            }
            break;
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<ExprNode, ExprError> {
        for (sym, op) in [("!", UnaryOp::Not), ("-", UnaryOp::Neg)] {
            if self.at_punct(sym) {
                let start = self.advance().pos;
                let operand = self.parse_unary()?;
                let (pos, len) = self.span_from(start);
                return Ok(ExprNode::new(
                    ExprKind::Unary { op, operand: Box::new(operand) },
                    pos,
                    len,
                ));
            }
        }
        let primary = self.parse_primary()?;
        self.finish_postfix(primary)
    }

    fn finish_postfix(&mut self, mut node: ExprNode) -> Result<ExprNode, ExprError> {
        loop {
            if self.eat_punct(".") {
                let name = match self.advance() {
                    Token { kind: TokKind::Ident(id), .. } => id,
                    Token { kind: TokKind::Int(n), .. } => n.to_string(),
                    _ => return Err(self.unexpected("expected member name after `.`")),
                };
                let (pos, len) = self.span_from(node.pos);
                node = ExprNode::new(
                    ExprKind::Member { base: Box::new(node), name },
                    pos,
                    len,
                );
            } else if self.eat_punct("[") {
                let index = self.parse_expr()?;
                self.expect_punct("]")?;
                let (pos, len) = self.span_from(node.pos);
                node = ExprNode::new(
                    ExprKind::Index { base: Box::new(node), index: Box::new(index) },
                    pos,
                    len,
                );
            } else {
                return Ok(node);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<ExprNode, ExprError> {
        let tok = self.peek().clone();
        match tok.kind {
            TokKind::Int(n) => {
                self.advance();
                Ok(ExprNode::new(ExprKind::Int(n), tok.pos, tok.len))
            }
            TokKind::Float(n) => {
                self.advance();
                Ok(ExprNode::new(ExprKind::Float(n), tok.pos, tok.len))
            }
            TokKind::Str(s) => {
                self.advance();
                Ok(ExprNode::new(ExprKind::Str(s), tok.pos, tok.len))
            }
            TokKind::Ident(id) => {
                self.advance();
                let kind = match id.as_str() {
                    "true" => ExprKind::Bool(true),
                    "false" => ExprKind::Bool(false),
                    "nil" | "null" => ExprKind::Nil,
                    _ => {
                        if self.at_punct("(") {
                            return self.parse_call(id, tok.pos);
                        }
                        ExprKind::Ident(id)
                    }
                };
                Ok(ExprNode::new(kind, tok.pos, tok.len))
            }
            TokKind::Punct("(") => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect_punct(")")?;
                Ok(inner)
            }
            TokKind::Punct("[") => {
                self.advance();
                let mut items = Vec::new();
                if !self.at_punct("]") {
                    loop {
                        items.push(self.parse_expr()?);
                        if !self.eat_punct(",") {
                            break;
                        }
                        if self.at_punct("]") {
                            break;
                        }
                    }
                }
                self.expect_punct("]")?;
                let (pos, len) = self.span_from(tok.pos);
                Ok(ExprNode::new(ExprKind::Array(items), pos, len))
            }
            TokKind::Punct("{") => {
                self.advance();
                let mut pairs = Vec::new();
                if !self.at_punct("}") {
                    loop {
                        let key = match self.advance() {
                            Token { kind: TokKind::Ident(id), .. } => id,
                            Token { kind: TokKind::Str(s), .. } => s,
                            _ => return Err(self.unexpected("expected map key")),
                        };
                        self.expect_punct(":")?;
                        let value = self.parse_expr()?;
                        pairs.push((key, value));
                        if !self.eat_punct(",") {
                            break;
                        }
                        if self.at_punct("}") {
                            break;
                        }
                    }
                }
                self.expect_punct("}")?;
                let (pos, len) = self.span_from(tok.pos);
                Ok(ExprNode::new(ExprKind::Map(pairs), pos, len))
            }
            _ => Err(self.unexpected("expected an expression")),
        }
    }

    fn parse_call(&mut self, name: String, start: usize) -> Result<ExprNode, ExprError> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        if !self.at_punct(")") {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat_punct(",") {
                    break;
                }
            }
        }
        self.expect_punct(")")?;
        let (pos, len) = self.span_from(start);
        let call = ExprNode::new(ExprKind::Call { name, args }, pos, len);
        self.finish_postfix(call)
    }
}

/// Parses a complete expression program.
pub fn parse_program(src: &str) -> Result<ExprNode, ExprError> {
    Parser::new(src)?.parse_program()
}

/// Parses a condition program with the optional `is SHAPE as IDENT` suffix.
pub fn parse_cond_program(
    src: &str,
) -> Result<(ExprNode, Option<Shape>, Option<String>), ExprError> {
    let mut p = Parser::new(src)?;
    let expr = p.parse_expr()?;

    if !p.at_ident("is") {
        if !matches!(p.peek().kind, TokKind::Eof) {
            return Err(p.unexpected("expected end of condition"));
        }
        return Ok((expr, None, None));
    }
    p.advance();

    // The shape literal runs until a top-level `as` or the end of input.
    let shape_start = p.peek().pos;
    let mut depth = 0usize;
    let mut shape_end = src.len();
    let mut bind_var = None;
    loop {
        let tok = p.peek().clone();
        match &tok.kind {
            TokKind::Eof => break,
            TokKind::Punct("{") | TokKind::Punct("[") => depth += 1,
            TokKind::Punct("}") | TokKind::Punct("]") => depth = depth.saturating_sub(1),
            TokKind::Ident(id) if id == "as" && depth == 0 => {
                shape_end = tok.pos;
                p.advance();
                let name = match p.advance() {
                    Token { kind: TokKind::Ident(id), .. } => id,
                    _ => return Err(p.unexpected("expected identifier after `as`")),
                };
                bind_var = Some(name);
                if !matches!(p.peek().kind, TokKind::Eof) {
                    return Err(p.unexpected("expected end of condition"));
                }
                break;
            }
            _ => {}
        }
        p.advance();
    }

    let shape_src = &src[shape_start..shape_end];
    let shape = parse_shape(shape_src).map_err(|e| ExprError {
        msg: e.msg,
        pos: shape_start + e.pos,
    })?;
    Ok((expr, Some(shape), bind_var))
}
