// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Tree-walking expression evaluator.
//!
//! The evaluator sits behind a narrow seam: compile once (the parser already
//! produced the AST), evaluate against an [`Env`], and report positioned
//! errors. Unknown identifiers evaluate to `Null` so templates can probe
//! optional arguments; structurally impossible operations (member access on
//! a number, arithmetic on a map) are errors.

use super::ast::{BinaryOp, ExprKind, ExprNode, UnaryOp};
use crate::shape::parse_shape;
use crate::value::{any_plus, convert_to_shape, shape_of, zero_value, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// A positioned evaluation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{msg}")]
pub struct EvalError {
    /// Description of the failure.
    pub msg: String,
    /// Byte offset into the program text.
    pub pos: usize,
}

impl EvalError {
    fn new(msg: impl Into<String>, pos: usize) -> Self {
        Self { msg: msg.into(), pos }
    }
}

/// Variable environment for one render.
#[derive(Debug, Clone, Default)]
pub struct Env {
    vars: HashMap<String, Value>,
}

impl Env {
    /// Creates an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an environment from a variable map.
    pub fn from_vars(vars: HashMap<String, Value>) -> Self {
        Self { vars }
    }

    /// Looks up a variable.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Sets a variable unconditionally.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Binds a variable, returning the previous binding for later
    /// [`restore`](Self::restore).
    pub fn bind(&mut self, name: &str, value: Value) -> Option<Value> {
        self.vars.insert(name.to_string(), value)
    }

    /// Restores a binding saved by [`bind`](Self::bind).
    pub fn restore(&mut self, name: &str, prev: Option<Value>) {
        match prev {
            Some(v) => {
                self.vars.insert(name.to_string(), v);
            }
            None => {
                self.vars.remove(name);
            }
        }
    }

    /// A snapshot of all variables.
    pub fn vars(&self) -> &HashMap<String, Value> {
        &self.vars
    }
}

/// Evaluates an expression tree against an environment.
///
/// `src` is the program text the AST was parsed from; built-ins that consume
/// literal syntax (`cast`, `new`) slice it through node spans.
pub fn eval(node: &ExprNode, src: &str, env: &mut Env) -> Result<Value, EvalError> {
    match &node.kind {
        ExprKind::Nil => Ok(Value::Null),
        ExprKind::Bool(b) => Ok(Value::Bool(*b)),
        ExprKind::Int(n) => Ok(Value::Int(*n)),
        ExprKind::Float(n) => Ok(Value::Float(*n)),
        ExprKind::Str(s) => Ok(Value::String(s.clone())),
        ExprKind::Ident(name) => Ok(env.get(name).cloned().unwrap_or(Value::Null)),
        ExprKind::Member { base, name } => {
            let base_val = eval(base, src, env)?;
            member(&base_val, name, base.text(src), node.pos)
        }
        ExprKind::Index { base, index } => {
            let base_val = eval(base, src, env)?;
            let index_val = eval(index, src, env)?;
            match (&base_val, &index_val) {
                (Value::Null | Value::Unset, _) => Ok(Value::Null),
                (Value::Array(items), Value::Int(i)) => {
                    Ok(usize::try_from(*i)
                        .ok()
                        .and_then(|i| items.get(i))
                        .cloned()
                        .unwrap_or(Value::Null))
                }
                (Value::Map(entries), Value::String(k)) => {
                    Ok(entries.get(k).cloned().unwrap_or(Value::Null))
                }
                _ => Err(EvalError::new(
                    format!(
                        "cannot index {} with {}",
                        base_val.kind_name(),
                        index_val.kind_name()
                    ),
                    node.pos,
                )),
            }
        }
        ExprKind::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval(item, src, env)?);
            }
            Ok(Value::Array(out))
        }
        ExprKind::Map(pairs) => {
            let mut out = BTreeMap::new();
            for (k, v) in pairs {
                out.insert(k.clone(), eval(v, src, env)?);
            }
            Ok(Value::Map(out))
        }
        ExprKind::Unary { op, operand } => {
            let v = eval(operand, src, env)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!v.is_truthy())),
                UnaryOp::Neg => match v {
                    Value::Int(n) => Ok(Value::Int(-n)),
                    Value::Float(n) => Ok(Value::Float(-n)),
                    other => Err(EvalError::new(
                        format!("cannot negate {}", other.kind_name()),
                        node.pos,
                    )),
                },
            }
        }
        ExprKind::Binary { op, lhs, rhs } => binary(*op, lhs, rhs, src, env, node.pos),
        ExprKind::Ternary { cond, then, otherwise } => {
            if eval(cond, src, env)?.is_truthy() {
                eval(then, src, env)
            } else {
                eval(otherwise, src, env)
            }
        }
        ExprKind::Call { name, args } => call(name, args, src, env, node.pos),
        ExprKind::Let { name, value } => {
            // Bare `let` outside a sequence: bind and yield the value.
            let v = eval(value, src, env)?;
            env.set(name.clone(), v.clone());
            Ok(v)
        }
        ExprKind::Seq(stmts) => {
            let mut bound: Vec<(String, Option<Value>)> = Vec::new();
            let mut last = Value::Null;
            let mut result = Ok(());
            for stmt in stmts {
                match &stmt.kind {
                    ExprKind::Let { name, value } => match eval(value, src, env) {
                        Ok(v) => {
                            let prev = env.bind(name, v.clone());
                            bound.push((name.clone(), prev));
                            last = v;
                        }
                        Err(e) => {
                            result = Err(e);
                            break;
                        }
                    },
                    _ => match eval(stmt, src, env) {
                        Ok(v) => last = v,
                        Err(e) => {
                            result = Err(e);
                            break;
                        }
                    },
                }
            }
            for (name, prev) in bound.into_iter().rev() {
                env.restore(&name, prev);
            }
            result.map(|_| last)
        }
    }
}

fn member(base: &Value, name: &str, base_text: &str, pos: usize) -> Result<Value, EvalError> {
    match base {
        Value::Null | Value::Unset => Ok(Value::Null),
        Value::Map(entries) => Ok(entries.get(name).cloned().unwrap_or(Value::Null)),
        Value::Array(items) => match name.parse::<usize>() {
            Ok(i) => Ok(items.get(i).cloned().unwrap_or(Value::Null)),
            Err(_) => Err(EvalError::new(
                format!(
                    "cannot access member '{}' on {} of shape {}",
                    name,
                    base_text,
                    shape_of(base)
                ),
                pos,
            )),
        },
        other => Err(EvalError::new(
            format!(
                "cannot access member '{}' on {} of shape {}",
                name,
                base_text,
                shape_of(other)
            ),
            pos,
        )),
    }
}

fn binary(
    op: BinaryOp,
    lhs: &ExprNode,
    rhs: &ExprNode,
    src: &str,
    env: &mut Env,
    pos: usize,
) -> Result<Value, EvalError> {
    // Short-circuit forms first.
    match op {
        BinaryOp::And => {
            let l = eval(lhs, src, env)?;
            if !l.is_truthy() {
                return Ok(Value::Bool(false));
            }
            return Ok(Value::Bool(eval(rhs, src, env)?.is_truthy()));
        }
        BinaryOp::Or => {
            let l = eval(lhs, src, env)?;
            if l.is_truthy() {
                return Ok(Value::Bool(true));
            }
            return Ok(Value::Bool(eval(rhs, src, env)?.is_truthy()));
        }
        _ => {}
    }

    let l = eval(lhs, src, env)?;
    let r = eval(rhs, src, env)?;
    match op {
        BinaryOp::Add => Ok(any_plus(l, r)),
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            arithmetic(op, &l, &r, pos)
        }
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(&l, &r))),
        BinaryOp::Ne => Ok(Value::Bool(!loose_eq(&l, &r))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ord = ordering(&l, &r).ok_or_else(|| {
                EvalError::new(
                    format!(
                        "cannot compare {} with {}",
                        l.kind_name(),
                        r.kind_name()
                    ),
                    pos,
                )
            })?;
            let ok = match op {
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::Le => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            };
            Ok(Value::Bool(ok))
        }
        BinaryOp::And | BinaryOp::Or => unreachable!(),
    }
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value, pos: usize) -> Result<Value, EvalError> {
    if let (Value::Int(a), Value::Int(b)) = (l, r) {
        return match op {
            BinaryOp::Sub => Ok(Value::Int(a.wrapping_sub(*b))),
            BinaryOp::Mul => Ok(Value::Int(a.wrapping_mul(*b))),
            BinaryOp::Div => a
                .checked_div(*b)
                .map(Value::Int)
                .ok_or_else(|| EvalError::new("division by zero", pos)),
            BinaryOp::Mod => a
                .checked_rem(*b)
                .map(Value::Int)
                .ok_or_else(|| EvalError::new("division by zero", pos)),
            _ => unreachable!(),
        };
    }
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => Ok(Value::Float(match op {
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Mod => a % b,
            _ => unreachable!(),
        })),
        _ => Err(EvalError::new(
            format!(
                "cannot apply '{}' to {} and {}",
                op.symbol(),
                l.kind_name(),
                r.kind_name()
            ),
            pos,
        )),
    }
}

fn loose_eq(l: &Value, r: &Value) -> bool {
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => l == r,
    }
}

// Total-ish ordering: numbers and strings compare natively, everything else
// compares by textual rendition.
fn ordering(l: &Value, r: &Value) -> Option<Ordering> {
    match (l, r) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    }
}

fn compare_for_sort(l: &Value, r: &Value) -> Ordering {
    ordering(l, r).unwrap_or_else(|| l.repr().cmp(&r.repr()))
}

fn call(
    name: &str,
    args: &[ExprNode],
    src: &str,
    env: &mut Env,
    pos: usize,
) -> Result<Value, EvalError> {
    let arity = |n: usize| -> Result<(), EvalError> {
        if args.len() == n {
            Ok(())
        } else {
            Err(EvalError::new(
                format!("{}() takes {} argument(s), got {}", name, n, args.len()),
                pos,
            ))
        }
    };

    match name {
        "combine" => {
            let mut acc = Value::Null;
            for arg in args {
                let v = eval(arg, src, env)?;
                acc = any_plus(acc, v);
            }
            Ok(acc)
        }
        "cast" => {
            arity(2)?;
            let v = eval(&args[0], src, env)?;
            let shape = parse_shape(args[1].text(src)).map_err(|e| {
                EvalError::new(e.msg, args[1].pos + e.pos)
            })?;
            convert_to_shape(v, &shape).map_err(|msg| EvalError::new(msg, pos))
        }
        "type" => {
            arity(1)?;
            let v = eval(&args[0], src, env)?;
            Ok(Value::String(shape_of(&v).to_string()))
        }
        "duration" => {
            arity(1)?;
            match eval(&args[0], src, env)? {
                Value::String(s) => parse_duration(&s)
                    .map(Value::Int)
                    .ok_or_else(|| EvalError::new(format!("invalid duration {:?}", s), pos)),
                Value::Int(n) => Ok(Value::Int(n)),
                other => Err(EvalError::new(
                    format!("duration() expects a string, got {}", other.kind_name()),
                    pos,
                )),
            }
        }
        "formatDuration" => {
            arity(1)?;
            match eval(&args[0], src, env)? {
                Value::Int(n) => Ok(Value::String(format_duration(n))),
                Value::Float(n) => Ok(Value::String(format_duration(n as i64))),
                other => Err(EvalError::new(
                    format!("formatDuration() expects a number, got {}", other.kind_name()),
                    pos,
                )),
            }
        }
        "len" => {
            arity(1)?;
            let n = match eval(&args[0], src, env)? {
                Value::Null | Value::Unset => 0,
                Value::Array(items) => items.len(),
                Value::Map(entries) => entries.len(),
                Value::String(s) => s.chars().count(),
                other => {
                    return Err(EvalError::new(
                        format!("len() expects a collection, got {}", other.kind_name()),
                        pos,
                    ))
                }
            };
            Ok(Value::Int(n as i64))
        }
        "filter" => {
            let items = list_arg(name, args, src, env, pos)?;
            let mut out = Vec::new();
            if args.len() > 1 {
                for item in items {
                    if with_element(env, item.clone(), |env| eval(&args[1], src, env))?
                        .is_truthy()
                    {
                        out.push(item);
                    }
                }
            } else {
                out.extend(items.into_iter().filter(|v| !v.is_null()));
            }
            Ok(Value::Array(out))
        }
        "sort" => {
            let items = list_arg(name, args, src, env, pos)?;
            let mut keyed: Vec<(Value, Value)> = Vec::with_capacity(items.len());
            for item in items {
                let key = if args.len() > 1 {
                    with_element(env, item.clone(), |env| eval(&args[1], src, env))?
                } else {
                    item.clone()
                };
                keyed.push((key, item));
            }
            keyed.sort_by(|(ka, _), (kb, _)| compare_for_sort(ka, kb));
            Ok(Value::Array(keyed.into_iter().map(|(_, v)| v).collect()))
        }
        "reverse" => {
            let mut items = list_arg(name, args, src, env, pos)?;
            items.reverse();
            Ok(Value::Array(items))
        }
        "unique" => {
            let items = list_arg(name, args, src, env, pos)?;
            let mut out: Vec<Value> = Vec::new();
            for item in items {
                if !out.contains(&item) {
                    out.push(item);
                }
            }
            Ok(Value::Array(out))
        }
        "take" => {
            arity(2)?;
            let items = list_arg(name, &args[..1], src, env, pos)?;
            let n = match eval(&args[1], src, env)? {
                Value::Int(n) => n.max(0) as usize,
                other => {
                    return Err(EvalError::new(
                        format!("take() expects a number, got {}", other.kind_name()),
                        pos,
                    ))
                }
            };
            Ok(Value::Array(items.into_iter().take(n).collect()))
        }
        "new" => {
            arity(1)?;
            let text = args[0].text(src).trim();
            if text == "any" {
                return Ok(Value::Unset);
            }
            let shape = parse_shape(text)
                .map_err(|e| EvalError::new(e.msg, args[0].pos + e.pos))?;
            Ok(zero_value(&shape))
        }
        _ => Err(EvalError::new(format!("unknown function {}()", name), pos)),
    }
}

// Evaluates the first argument of a list built-in, accepting nil as empty.
fn list_arg(
    name: &str,
    args: &[ExprNode],
    src: &str,
    env: &mut Env,
    pos: usize,
) -> Result<Vec<Value>, EvalError> {
    if args.is_empty() {
        return Err(EvalError::new(format!("{}() takes at least 1 argument", name), pos));
    }
    match eval(&args[0], src, env)? {
        Value::Array(items) => Ok(items),
        Value::Null | Value::Unset => Ok(Vec::new()),
        other => Err(EvalError::new(
            format!("{}() expects a list, got {}", name, other.kind_name()),
            pos,
        )),
    }
}

// Runs `f` with `#` bound to the current element.
fn with_element<T>(
    env: &mut Env,
    element: Value,
    f: impl FnOnce(&mut Env) -> Result<T, EvalError>,
) -> Result<T, EvalError> {
    let prev = env.bind("#", element);
    let result = f(env);
    env.restore("#", prev);
    result
}

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Parses a Go-style duration string (`"300ms"`, `"1h30m"`, `"1.5s"`) into
/// nanoseconds.
pub fn parse_duration(s: &str) -> Option<i64> {
    let s = s.trim();
    let (neg, mut rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s),
    };
    if rest.is_empty() {
        return None;
    }
    if rest == "0" {
        return Some(0);
    }
    let mut total: f64 = 0.0;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_end == 0 {
            return None;
        }
        let num: f64 = rest[..num_end].parse().ok()?;
        rest = &rest[num_end..];
        let (unit_nanos, unit_len) = if rest.starts_with("ns") {
            (1.0, 2)
        } else if rest.starts_with("µs") {
            (1e3, "µs".len())
        } else if rest.starts_with("us") {
            (1e3, 2)
        } else if rest.starts_with("ms") {
            (1e6, 2)
        } else if rest.starts_with('s') {
            (1e9, 1)
        } else if rest.starts_with('m') {
            (60e9, 1)
        } else if rest.starts_with('h') {
            (3600e9, 1)
        } else {
            return None;
        };
        rest = &rest[unit_len..];
        total += num * unit_nanos;
    }
    let nanos = total as i64;
    Some(if neg { -nanos } else { nanos })
}

/// Formats nanoseconds as a compact duration string (`"1m30s"`, `"300ms"`).
pub fn format_duration(nanos: i64) -> String {
    if nanos == 0 {
        return "0s".to_string();
    }
    let neg = nanos < 0;
    let n = nanos.unsigned_abs();
    let mut out = String::new();
    if neg {
        out.push('-');
    }
    if n < 1_000 {
        out.push_str(&format!("{}ns", n));
    } else if n < 1_000_000 {
        out.push_str(&trim_frac(n as f64 / 1e3, "µs"));
    } else if n < NANOS_PER_SEC as u64 {
        out.push_str(&trim_frac(n as f64 / 1e6, "ms"));
    } else {
        let total_secs = n / NANOS_PER_SEC as u64;
        let frac_nanos = n % NANOS_PER_SEC as u64;
        let hours = total_secs / 3600;
        let mins = (total_secs % 3600) / 60;
        let secs = total_secs % 60;
        if hours > 0 {
            out.push_str(&format!("{}h", hours));
        }
        if mins > 0 || hours > 0 {
            out.push_str(&format!("{}m", mins));
        }
        out.push_str(&trim_frac(secs as f64 + frac_nanos as f64 / 1e9, "s"));
    }
    out
}

fn trim_frac(v: f64, unit: &str) -> String {
    let mut s = format!("{:.3}", v);
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    format!("{}{}", s, unit)
}
