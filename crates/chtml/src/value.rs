// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Dynamic values flowing through rendering.
//!
//! A [`Value`] is what an expression evaluates to and what a component render
//! returns: a scalar, a list, a map, an HTML subtree, or an attribute pair.
//! This module also hosts the operations the renderer leans on everywhere:
//! truthiness, the polymorphic [`any_plus`] concatenation, structural shape
//! inference ([`shape_of`]) and matching, and coercion to a declared shape
//! ([`convert_to_shape`]).

use crate::html::{render_html, HtmlNode};
use crate::shape::Shape;
use lazy_static::lazy_static;
use regex::Regex;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;

lazy_static! {
    static ref CAMEL_BOUNDARY: Regex = Regex::new(r"([a-z0-9])([A-Z])").unwrap();
}

/// A dynamic template value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value.
    Null,
    /// Declared-but-unset sentinel produced by `new(any)`.
    ///
    /// Coercion and truthiness treat it as `Null`; the input schema uses it
    /// to record an argument with no default.
    Unset,
    /// Boolean.
    Bool(bool),
    /// Integer number.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Text.
    String(String),
    /// Ordered sequence.
    Array(Vec<Value>),
    /// String-keyed map with deterministic (sorted) iteration order.
    Map(BTreeMap<String, Value>),
    /// Rendered HTML subtree.
    Html(HtmlNode),
    /// Attribute pair produced by `<c:attr>`.
    Attr {
        /// Attribute name.
        name: String,
        /// Attribute value.
        value: String,
    },
}

impl Value {
    /// Short kind name used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Unset => "unset",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::Float(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "list",
            Value::Map(_) => "map",
            Value::Html(_) => "html",
            Value::Attr { .. } => "attr",
        }
    }

    /// True for `Null` and the unset sentinel.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null | Value::Unset)
    }

    /// Truthiness used by `c:if`.
    ///
    /// False: `false`, `0`, the empty string, `nil`, empty list, empty map,
    /// empty html. Everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null | Value::Unset => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
            Value::Html(node) => !node.is_empty(),
            Value::Attr { .. } => true,
        }
    }

    /// Numeric view, if the value is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Plain-text rendition of the value.
    ///
    /// Scalars print directly, HTML serializes, containers print as JSON.
    pub fn repr(&self) -> String {
        match self {
            Value::Null | Value::Unset => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(n) => n.to_string(),
            Value::String(s) => s.clone(),
            Value::Html(node) => render_html(node),
            Value::Attr { name, value } => format!("{}=\"{}\"", name, value),
            Value::Array(_) | Value::Map(_) => {
                serde_json::to_string(self).unwrap_or_default()
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null | Value::Unset => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(items) => items.serialize(serializer),
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Value::Html(node) => serializer.serialize_str(&render_html(node)),
            Value::Attr { name, value } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(name, value)?;
                map.end()
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ),
        }
    }
}

/// Converts an attribute key to snake_case for argument binding.
///
/// `maxItems`, `max-items`, and `max.items` all become `max_items`.
pub fn snake_case(key: &str) -> String {
    let spaced = CAMEL_BOUNDARY.replace_all(key, "${1}_${2}");
    spaced.to_lowercase().replace(['-', '.'], "_")
}

/// The universal concatenation used to fold rendered siblings.
///
/// Strings concatenate, numbers add, HTML siblings aggregate into a document
/// wrapper, lists append, maps union (right wins), and heterogeneous mixes
/// fall back to concatenated text.
pub fn any_plus(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Null | Value::Unset, b) => b,
        (a, Value::Null | Value::Unset) => a,
        (Value::Int(x), Value::Int(y)) => Value::Int(x.wrapping_add(y)),
        (Value::Int(x), Value::Float(y)) => Value::Float(x as f64 + y),
        (Value::Float(x), Value::Int(y)) => Value::Float(x + y as f64),
        (Value::Float(x), Value::Float(y)) => Value::Float(x + y),
        (Value::String(mut x), Value::String(y)) => {
            x.push_str(&y);
            Value::String(x)
        }
        (Value::Html(x), Value::Html(y)) => {
            let mut doc = HtmlNode::document();
            doc.append(x);
            doc.append(y);
            Value::Html(doc)
        }
        (Value::Html(x), other) => {
            let mut doc = HtmlNode::document();
            doc.append(x);
            doc.append(HtmlNode::text(other.repr()));
            Value::Html(doc)
        }
        (other, Value::Html(y)) => {
            let mut doc = HtmlNode::document();
            doc.append(HtmlNode::text(other.repr()));
            doc.append(y);
            Value::Html(doc)
        }
        (Value::Array(mut x), Value::Array(y)) => {
            x.extend(y);
            Value::Array(x)
        }
        (Value::Map(mut x), Value::Map(y)) => {
            x.extend(y);
            Value::Map(x)
        }
        (a, b) => {
            let mut s = a.repr();
            s.push_str(&b.repr());
            Value::String(s)
        }
    }
}

/// Converts an arbitrary value into an output HTML node.
pub fn value_to_html(v: Value) -> HtmlNode {
    match v {
        Value::Html(node) => node,
        Value::Null | Value::Unset => HtmlNode::text(""),
        other => HtmlNode::text(other.repr()),
    }
}

/// Infers the structural shape of a runtime value.
pub fn shape_of(v: &Value) -> Shape {
    match v {
        Value::Null | Value::Unset => Shape::Any,
        Value::Bool(_) => Shape::Bool,
        Value::Int(_) | Value::Float(_) => Shape::Number,
        Value::String(_) => Shape::String,
        Value::Html(_) => Shape::Html,
        Value::Attr { .. } => Shape::HtmlAttr,
        Value::Array(items) => {
            let elem = items
                .iter()
                .map(shape_of)
                .reduce(|a, b| a.merge(&b))
                .unwrap_or(Shape::Any);
            Shape::array(elem)
        }
        Value::Map(entries) => Shape::object(
            entries.iter().map(|(k, v)| (k.clone(), shape_of(v))).collect(),
        ),
    }
}

/// Tests structural conformance of a value against a shape, without
/// coercion. Used by the `EXPR is SHAPE` condition form.
pub fn match_shape(v: &Value, shape: &Shape) -> bool {
    match shape {
        Shape::Any => true,
        Shape::Bool => matches!(v, Value::Bool(_)),
        Shape::Number => matches!(v, Value::Int(_) | Value::Float(_)),
        Shape::String => matches!(v, Value::String(_)),
        Shape::Html => matches!(v, Value::Html(_)),
        Shape::HtmlAttr => matches!(v, Value::Attr { .. }),
        Shape::Array(elem) => match v {
            Value::Array(items) => items.iter().all(|item| match_shape(item, elem)),
            _ => false,
        },
        Shape::Object { fields: Some(fields), .. } => match v {
            Value::Map(entries) => fields.iter().all(|(k, field_shape)| {
                entries.get(k).is_some_and(|fv| match_shape(fv, field_shape))
            }),
            _ => false,
        },
        Shape::Object { fields: None, elem: Some(elem) } => match v {
            Value::Map(entries) => entries.values().all(|ev| match_shape(ev, elem)),
            _ => false,
        },
        Shape::Object { fields: None, elem: None } => matches!(v, Value::Map(_)),
    }
}

/// The zero value of a shape, used to fill missing struct fields.
pub fn zero_value(shape: &Shape) -> Value {
    match shape {
        Shape::Any => Value::Null,
        Shape::Bool => Value::Bool(false),
        Shape::Number => Value::Int(0),
        Shape::String => Value::String(String::new()),
        Shape::Html => Value::Html(HtmlNode::text("")),
        Shape::HtmlAttr => Value::Attr { name: String::new(), value: String::new() },
        Shape::Array(_) => Value::Array(Vec::new()),
        Shape::Object { fields: Some(fields), .. } => Value::Map(
            fields.iter().map(|(k, s)| (k.clone(), zero_value(s))).collect(),
        ),
        Shape::Object { .. } => Value::Map(BTreeMap::new()),
    }
}

/// Checks that a value can be coerced to a shape.
///
/// This is the validation half of the `c:as` pipeline; a failure here
/// becomes a `CastError` before any conversion happens.
pub fn validate_shape(v: &Value, shape: &Shape) -> Result<(), String> {
    convert_to_shape(v.clone(), shape).map(|_| ())
}

/// Coerces a value to a declared shape.
///
/// Numeric note: strings that fail `i64` parsing widen to `f64`, while
/// values that were already numeric keep their representation.
pub fn convert_to_shape(v: Value, shape: &Shape) -> Result<Value, String> {
    let v = if v == Value::Unset { Value::Null } else { v };
    match shape {
        Shape::Any => Ok(v),
        Shape::String => Ok(Value::String(v.repr())),
        Shape::Bool => match v {
            Value::Bool(b) => Ok(Value::Bool(b)),
            Value::Null => Ok(Value::Bool(false)),
            other => Err(format!("cannot convert {} to bool", other.kind_name())),
        },
        Shape::Number => match v {
            Value::Int(n) => Ok(Value::Int(n)),
            Value::Float(n) => Ok(Value::Float(n)),
            Value::Null => Ok(Value::Int(0)),
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Ok(Value::Int(0))
                } else if let Ok(n) = trimmed.parse::<i64>() {
                    Ok(Value::Int(n))
                } else if let Ok(n) = trimmed.parse::<f64>() {
                    Ok(Value::Float(n))
                } else {
                    Err(format!("cannot parse {:?} as number", s))
                }
            }
            other => Err(format!("cannot convert {} to number", other.kind_name())),
        },
        Shape::Array(elem) => match v {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(convert_to_shape(item, elem)?);
                }
                Ok(Value::Array(out))
            }
            Value::Null => Ok(Value::Array(Vec::new())),
            other => Err(format!("cannot convert {} to {}", other.kind_name(), shape)),
        },
        Shape::Object { fields: Some(fields), .. } => {
            let mut entries = match v {
                Value::Map(entries) => entries,
                Value::Null => BTreeMap::new(),
                Value::String(s) if s.trim().is_empty() => BTreeMap::new(),
                other => {
                    return Err(format!(
                        "cannot convert {} to {}",
                        other.kind_name(),
                        shape
                    ))
                }
            };
            let mut out = BTreeMap::new();
            for (k, field_shape) in fields {
                let field = match entries.remove(k) {
                    Some(fv) => convert_to_shape(fv, field_shape)
                        .map_err(|e| format!("field {:?}: {}", k, e))?,
                    None => zero_value(field_shape),
                };
                out.insert(k.clone(), field);
            }
            // Extra keys are preserved as-is.
            out.extend(entries);
            Ok(Value::Map(out))
        }
        Shape::Object { fields: None, elem: Some(elem) } => match v {
            Value::Map(entries) => {
                let mut out = BTreeMap::new();
                for (k, ev) in entries {
                    let ev = convert_to_shape(ev, elem)
                        .map_err(|e| format!("key {:?}: {}", k, e))?;
                    out.insert(k, ev);
                }
                Ok(Value::Map(out))
            }
            Value::Null => Ok(Value::Map(BTreeMap::new())),
            Value::String(s) if s.trim().is_empty() => Ok(Value::Map(BTreeMap::new())),
            other => Err(format!("cannot convert {} to {}", other.kind_name(), shape)),
        },
        Shape::Object { fields: None, elem: None } => match v {
            Value::Map(entries) => Ok(Value::Map(entries)),
            Value::Null => Ok(Value::Map(BTreeMap::new())),
            Value::String(s) if s.trim().is_empty() => Ok(Value::Map(BTreeMap::new())),
            other => Err(format!("cannot convert {} to object", other.kind_name())),
        },
        Shape::Html => match v {
            Value::Html(node) => Ok(Value::Html(node)),
            other => Ok(Value::Html(HtmlNode::text(other.repr()))),
        },
        Shape::HtmlAttr => match v {
            Value::Attr { name, value } => Ok(Value::Attr { name, value }),
            other => Err(format!("cannot convert {} to attr", other.kind_name())),
        },
    }
}
