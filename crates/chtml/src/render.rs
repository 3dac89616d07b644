// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Recursive template renderer.
//!
//! [`ChtmlComponent`] wraps a parsed [`Document`] with per-instance caches:
//! loop nodes own one sub-component per iteration (reused by index across
//! renders, extras disposed), import nodes own the imported child component,
//! and a shared `hidden` set carries conditional suppression along sibling
//! chains. A component instance is therefore not safe for concurrent
//! renders; parse once and wrap multiple times for parallelism.

use crate::component::{builtin_import, Component, Scope};
use crate::error::{
    BoxError, CastError, ComponentError, DecodeError, ImportNotAllowed,
    UnrecognizedArgumentError,
};
use crate::expr::{Env, EvalError};
use crate::html::{HtmlAttribute, HtmlNode};
use crate::parser::{Attribute, Document, NodeId, NodeKind};
use crate::shape::Shape;
use crate::span::{Source, Span};
use crate::value::{
    any_plus, convert_to_shape, match_shape, shape_of, snake_case, validate_shape,
    value_to_html, Value,
};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

// Elements on which false-ish boolean attributes are suppressed entirely.
const BOOL_SUPPRESS_ELEMENTS: &[&str] =
    &["input", "option", "button", "select", "textarea", "fieldset", "optgroup"];
const BOOL_SUPPRESS_ATTRS: &[&str] = &["checked", "selected", "disabled"];

/// `c:for` evaluated to something that cannot be iterated.
#[derive(Debug, Clone, Error)]
#[error("c:for expression must return a list or a map, got {kind}")]
pub struct LoopTypeError {
    /// Kind name of the offending value.
    pub kind: &'static str,
}

/// Rendering knobs for a component instance.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Emit comment nodes into the output.
    pub render_comments: bool,
}

/// A renderable CHTML component wrapping a parsed document.
pub struct ChtmlComponent {
    doc: Rc<Document>,
    root: NodeId,
    render_comments: bool,
    emit_doctype: bool,
    loop_entry: bool,
    loops: HashMap<NodeId, Vec<ChtmlComponent>>,
    imports: HashMap<NodeId, Box<dyn Component>>,
    hidden: Rc<RefCell<HashSet<NodeId>>>,
    env: Env,
}

impl fmt::Debug for ChtmlComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChtmlComponent")
            .field("doc", &self.doc)
            .field("root", &self.root)
            .field("loops", &self.loops.len())
            .field("imports", &self.imports.len())
            .finish()
    }
}

impl ChtmlComponent {
    /// Wraps a parsed document as the outermost component.
    pub fn new(doc: Rc<Document>) -> Self {
        Self::with_options(doc, RenderOptions::default())
    }

    /// Wraps a parsed document with explicit options.
    pub fn with_options(doc: Rc<Document>, options: RenderOptions) -> Self {
        let root = doc.root();
        Self {
            doc,
            root,
            render_comments: options.render_comments,
            emit_doctype: true,
            loop_entry: false,
            loops: HashMap::new(),
            imports: HashMap::new(),
            hidden: Rc::new(RefCell::new(HashSet::new())),
            env: Env::new(),
        }
    }

    /// Wraps a document rendered as a child of another component.
    ///
    /// Nested components never emit doctype nodes, so composing templates
    /// cannot produce duplicate doctypes.
    pub fn nested(doc: Rc<Document>) -> Self {
        let mut comp = Self::new(doc);
        comp.emit_doctype = false;
        comp
    }

    /// Wraps a single subtree, aggregating like a `<c>` node.
    ///
    /// Used at parse time to evaluate `<c:arg>` defaults with HTML bodies.
    pub(crate) fn subtree(doc: Rc<Document>, node: NodeId) -> Self {
        let mut comp = Self::new(doc);
        comp.root = node;
        comp.loop_entry = true;
        comp.emit_doctype = false;
        comp
    }

    // A fresh sub-component for one loop iteration, sharing the importer,
    // comment flag, and hidden set, with an empty child map of its own.
    fn make_loop_child(&self, node: NodeId) -> ChtmlComponent {
        ChtmlComponent {
            doc: self.doc.clone(),
            root: node,
            render_comments: self.render_comments,
            emit_doctype: self.emit_doctype,
            loop_entry: true,
            loops: HashMap::new(),
            imports: HashMap::new(),
            hidden: self.hidden.clone(),
            env: Env::new(),
        }
    }

    fn render_iteration(
        &mut self,
        env: Env,
        scope: &dyn Scope,
    ) -> Result<Value, ComponentError> {
        self.env = env;
        self.render_node(self.root, scope)
    }

    fn err_at(&self, err: impl Into<BoxError>, id: NodeId) -> ComponentError {
        ComponentError::new(err, self.doc.path_of(id), &self.doc.node(id).source)
    }

    fn eval_err(&self, e: EvalError, id: NodeId) -> ComponentError {
        let pos = e.pos;
        self.err_at(e, id).with_expr_offset(pos)
    }

    fn eval_err_attr(&self, e: EvalError, id: NodeId, attr: &Attribute) -> ComponentError {
        let pos = e.pos;
        ComponentError::new(e, self.doc.path_of(id), &attr.source).with_expr_offset(pos)
    }

    fn render_node(&mut self, id: NodeId, scope: &dyn Scope) -> Result<Value, ComponentError> {
        let doc = self.doc.clone();
        let node = doc.node(id);
        let skip_directives = self.loop_entry && id == self.root;

        let mut cond_bind: Option<(String, Option<Value>)> = None;
        if !skip_directives {
            // A preceding truthy branch suppressed this node: unmark, skip.
            if self.hidden.borrow_mut().remove(&id) {
                return Ok(Value::Null);
            }
            if let Some(cond) = node.cond.clone() {
                let mut taken = true;
                let mut bind_value = None;
                if !cond.expr.is_empty() {
                    let value = cond
                        .expr
                        .value(&mut self.env)
                        .map_err(|e| self.eval_err(e, id))?;
                    match &cond.shape {
                        Some(shape) => {
                            taken = match_shape(&value, shape);
                            if taken {
                                bind_value = Some(value);
                            }
                        }
                        None => taken = value.is_truthy(),
                    }
                }
                if taken {
                    let mut next = node.next_cond;
                    while let Some(n) = next {
                        self.hidden.borrow_mut().insert(n);
                        self.dispose_children_under(n)?;
                        next = doc.node(n).next_cond;
                    }
                    if let (Some(var), Some(value)) = (&cond.bind_var, bind_value) {
                        let prev = self.env.bind(var, value);
                        cond_bind = Some((var.clone(), prev));
                    }
                } else {
                    self.dispose_children_under(id)?;
                    return Ok(Value::Null);
                }
            }
        }

        let result = if !skip_directives && !node.loop_expr.is_empty() {
            self.render_loop(id, scope)
        } else {
            self.render_kind(id, scope)
        };

        if let Some((var, prev)) = cond_bind {
            self.env.restore(&var, prev);
        }
        result
    }

    fn render_kind(&mut self, id: NodeId, scope: &dyn Scope) -> Result<Value, ComponentError> {
        let doc = self.doc.clone();
        let node = doc.node(id);
        let value = match node.kind {
            NodeKind::Text => {
                node.data.value(&mut self.env).map_err(|e| self.eval_err(e, id))?
            }
            NodeKind::Comment => {
                if self.render_comments {
                    let body = node
                        .data
                        .value(&mut self.env)
                        .map_err(|e| self.eval_err(e, id))?;
                    Value::Html(HtmlNode::comment(body.repr()))
                } else {
                    Value::Null
                }
            }
            NodeKind::Doctype => {
                if self.emit_doctype {
                    Value::Html(HtmlNode::doctype(node.name.clone()))
                } else {
                    Value::Null
                }
            }
            NodeKind::Document => self.render_children_fold(id, scope, true)?,
            NodeKind::Element => self.render_element(id, scope)?,
            NodeKind::Import => self.render_import(id, scope)?,
            NodeKind::C => self.render_c(id, scope)?,
        };

        if let Some(shape) = &node.render_shape {
            if let Err(reason) = validate_shape(&value, shape) {
                return Err(self.err_at(
                    CastError {
                        expected: shape.clone(),
                        actual: shape_of(&value),
                        reason,
                    },
                    id,
                ));
            }
            return convert_to_shape(value, shape).map_err(|reason| {
                self.err_at(
                    CastError {
                        expected: shape.clone(),
                        actual: Shape::Any,
                        reason,
                    },
                    id,
                )
            });
        }
        Ok(value)
    }

    fn render_loop(&mut self, id: NodeId, scope: &dyn Scope) -> Result<Value, ComponentError> {
        let doc = self.doc.clone();
        let node = doc.node(id);
        let coll = node
            .loop_expr
            .value(&mut self.env)
            .map_err(|e| self.eval_err(e, id))?;

        let items: Vec<(Value, Value)> = match coll {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Value::Int(i as i64), v))
                .collect(),
            // BTreeMap iterates in lexicographic key order, which keeps map
            // loops deterministic.
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| (Value::String(k), v))
                .collect(),
            Value::Null | Value::Unset => Vec::new(),
            other => {
                return Err(self.err_at(LoopTypeError { kind: other.kind_name() }, id))
            }
        };

        let count = items.len();
        let parent_vars = self.env.vars().clone();
        let mut acc = Value::Null;
        for (i, (idx_val, elem)) in items.into_iter().enumerate() {
            if self.loops.get(&id).map_or(0, Vec::len) <= i {
                let child = self.make_loop_child(id);
                self.loops.entry(id).or_default().push(child);
            }
            let mut vars = parent_vars.clone();
            vars.insert(node.loop_var.clone(), elem);
            if let Some(idx_name) = &node.loop_idx {
                vars.insert(idx_name.clone(), idx_val);
            }
            if let Some(entries) = self.loops.get_mut(&id) {
                let value = entries[i].render_iteration(Env::from_vars(vars), scope)?;
                acc = any_plus(acc, value);
            }
        }

        // Children beyond the current iteration count are disposed.
        let extras = match self.loops.get_mut(&id) {
            Some(entries) if entries.len() > count => entries.split_off(count),
            _ => Vec::new(),
        };
        for mut extra in extras {
            extra.dispose()?;
        }
        Ok(acc)
    }

    fn render_element(&mut self, id: NodeId, scope: &dyn Scope) -> Result<Value, ComponentError> {
        let doc = self.doc.clone();
        let node = doc.node(id);
        let mut out = HtmlNode::element(node.name.clone());

        for attr in &node.attrs {
            let value = if attr.val.is_empty() {
                Value::String(String::new())
            } else {
                attr.val
                    .value(&mut self.env)
                    .map_err(|e| self.eval_err_attr(e, id, attr))?
            };
            if suppress_bool_attr(&node.name, &attr.key, &value) {
                continue;
            }
            let text = match &value {
                Value::Bool(true) if is_bool_attr(&node.name, &attr.key) => String::new(),
                other => other.repr(),
            };
            out.attrs.push(HtmlAttribute { name: attr.key.clone(), value: text });
        }

        for child in doc.children_of(id) {
            match self.render_node(child, scope)? {
                Value::Null | Value::Unset => {}
                // `<c:attr>` results append to the element's attributes.
                Value::Attr { name, value } => {
                    out.attrs.push(HtmlAttribute { name, value })
                }
                other => out.append(value_to_html(other)),
            }
        }
        Ok(Value::Html(out))
    }

    fn render_children_fold(
        &mut self,
        id: NodeId,
        scope: &dyn Scope,
        drop_attrs: bool,
    ) -> Result<Value, ComponentError> {
        let doc = self.doc.clone();
        let mut acc = Value::Null;
        for child in doc.children_of(id) {
            match self.render_node(child, scope)? {
                Value::Null | Value::Unset => {}
                Value::Attr { .. } if drop_attrs => {}
                value => acc = any_plus(acc, value),
            }
        }
        Ok(acc)
    }

    fn render_import(&mut self, id: NodeId, scope: &dyn Scope) -> Result<Value, ComponentError> {
        let doc = self.doc.clone();
        let node = doc.node(id);
        let name = node.name.clone();

        let mut vars: HashMap<String, Value> = HashMap::new();
        for attr in &node.attrs {
            let value = if attr.val.is_empty() {
                Value::String(String::new())
            } else {
                attr.val
                    .value(&mut self.env)
                    .map_err(|e| self.eval_err_attr(e, id, attr))?
            };
            vars.insert(snake_case(&attr.key), value);
        }

        let kids = doc.children_of(id);
        if !kids.is_empty() {
            let mut content = Value::Null;
            for child in kids {
                match self.render_node(child, scope)? {
                    Value::Attr { name, value } => {
                        vars.insert(snake_case(&name), Value::String(value));
                    }
                    Value::Null | Value::Unset => {}
                    value => content = any_plus(content, value),
                }
            }
            if !matches!(content, Value::Null) {
                vars.insert("_".to_string(), content);
            }
        }

        if !self.imports.contains_key(&id) {
            let comp = match builtin_import(&name) {
                Some(c) => c,
                None => match doc.importer() {
                    Some(importer) => {
                        tracing::debug!(name = %name, "importing component");
                        importer.import(&name).map_err(|e| self.wrap_err(e, id))?
                    }
                    None => return Err(self.err_at(ImportNotAllowed, id)),
                },
            };
            self.imports.insert(id, comp);
        }

        if let Some(Shape::Object { fields: Some(fields), .. }) =
            self.imports.get(&id).and_then(|c| c.input_shape())
        {
            let keys: Vec<String> = vars.keys().cloned().collect();
            for key in keys {
                let Some(field_shape) = fields.get(&key) else {
                    return Err(self.err_at(UnrecognizedArgumentError { name: key }, id));
                };
                let Some(value) = vars.remove(&key) else { continue };
                let coerced = match (field_shape, value) {
                    // An attribute present with an empty value means true
                    // when the component expects a boolean.
                    (Shape::Bool, Value::String(s)) if s.is_empty() => Value::Bool(true),
                    (Shape::Bool, Value::String(s)) => {
                        return Err(self.err_at(
                            DecodeError {
                                key,
                                reason: format!("cannot convert string {:?} to bool", s),
                            },
                            id,
                        ))
                    }
                    (shape, value) => convert_to_shape(value, shape).map_err(|reason| {
                        self.err_at(DecodeError { key: key.clone(), reason }, id)
                    })?,
                };
                vars.insert(key, coerced);
            }
        }

        let child_scope = scope.spawn(vars);
        let comp = match self.imports.get_mut(&id) {
            Some(c) => c,
            None => return Err(self.err_at(ImportNotAllowed, id)),
        };
        comp.render(child_scope.as_ref())
            .map_err(|e| {
                ComponentError::new(e, doc.path_of(id), &doc.node(id).source)
            })
    }

    fn render_c(&mut self, id: NodeId, scope: &dyn Scope) -> Result<Value, ComponentError> {
        let doc = self.doc.clone();
        let node = doc.node(id);
        let mut acc = self.render_children_fold(id, scope, false)?;

        if let Some(var) = &node.var_name {
            if let Some(shape) = &node.var_shape {
                if let Err(reason) = validate_shape(&acc, shape) {
                    return Err(self.err_at(
                        CastError {
                            expected: shape.clone(),
                            actual: shape_of(&acc),
                            reason,
                        },
                        id,
                    ));
                }
                acc = convert_to_shape(acc, shape).map_err(|reason| {
                    self.err_at(
                        CastError {
                            expected: shape.clone(),
                            actual: Shape::Any,
                            reason,
                        },
                        id,
                    )
                })?;
            }
            // First write wins: a non-nil binding is never overwritten.
            let unset = self.env.get(var).map_or(true, Value::is_null);
            if unset {
                self.env.set(var.clone(), acc);
            }
            return Ok(Value::Null);
        }
        Ok(acc)
    }

    fn wrap_err(&self, err: ComponentError, id: NodeId) -> ComponentError {
        ComponentError::new(err, self.doc.path_of(id), &self.doc.node(id).source)
    }

    fn dispose_children_under(&mut self, id: NodeId) -> Result<(), ComponentError> {
        for nid in self.doc.clone().descendants(id) {
            if let Some(comps) = self.loops.remove(&nid) {
                for mut comp in comps {
                    comp.dispose()?;
                }
            }
            if let Some(mut comp) = self.imports.remove(&nid) {
                comp.dispose()?;
            }
        }
        Ok(())
    }
}

fn is_bool_attr(element: &str, attr: &str) -> bool {
    BOOL_SUPPRESS_ELEMENTS.contains(&element) && BOOL_SUPPRESS_ATTRS.contains(&attr)
}

fn suppress_bool_attr(element: &str, attr: &str, value: &Value) -> bool {
    if !is_bool_attr(element, attr) {
        return false;
    }
    matches!(value, Value::Bool(false) | Value::Int(0))
        || matches!(value, Value::Float(f) if *f == 0.0)
}

impl Component for ChtmlComponent {
    fn render(&mut self, scope: &dyn Scope) -> Result<Value, ComponentError> {
        let doc = self.doc.clone();
        let vars = scope.vars();
        if scope.dry_run() {
            for key in vars.keys() {
                if !doc.input_schema().contains_key(key) {
                    let source = Source::new(doc.file(), Span::default());
                    return Err(ComponentError::new(
                        UnrecognizedArgumentError { name: key.clone() },
                        "",
                        &source,
                    ));
                }
            }
        }

        let mut env_vars: HashMap<String, Value> = doc
            .input_schema()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        env_vars.extend(vars);
        self.env = Env::from_vars(env_vars);
        self.render_node(self.root, scope)
    }

    fn dispose(&mut self) -> Result<(), ComponentError> {
        let mut first_err = None;
        for (_, comps) in self.loops.drain() {
            for mut comp in comps {
                if let Err(e) = comp.dispose() {
                    first_err.get_or_insert(e);
                }
            }
        }
        for (_, mut comp) in self.imports.drain() {
            if let Err(e) = comp.dispose() {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn input_shape(&self) -> Option<Shape> {
        Some(Shape::object(
            self.doc
                .input_schema()
                .iter()
                .map(|(k, v)| (k.clone(), shape_of(v)))
                .collect(),
        ))
    }
}
