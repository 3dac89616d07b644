// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Template parser: HTML5 tree construction plus directives.
//!
//! The parser drives the token stream into a [`Document`] arena. On top of
//! vanilla tree construction it:
//!
//! - consumes directive attributes (`c:if`, `c:else-if`, `c:else`, `c:for`,
//!   `c:as`, `var`) while inserting elements, linking conditional chains
//!   across adjacent siblings;
//! - promotes `<c:NAME>` elements to [`NodeKind::Import`] nodes and `<c>` to
//!   neutral [`NodeKind::C`] grouping nodes;
//! - extracts root-level `<c:arg>` declarations into the input schema,
//!   evaluating each default at parse time;
//! - runs the static shape checker over every compiled expression, then a
//!   dry-run render that validates imports.
//!
//! Parse problems are aggregated into one [`ParseError`]; the tree is built
//! leniently, so a single bad expression does not hide later errors.

use crate::component::{BaseScope, Component, DryRunScope, Importer};
use crate::error::{ComponentError, ParseError};
use crate::expr::{lex_interpolation, lex_loop, CondExpr, Env, Expr, Item, SymbolTable, TypeError};
use crate::html::VOID_ELEMENTS;
use crate::render::ChtmlComponent;
use crate::shape::{parse_shape, Shape};
use crate::span::{LineIndex, Source};
use crate::token::{AttrToken, TagToken, Token, Tokenizer};
use crate::value::{shape_of, snake_case, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Index of a node within a [`Document`] arena.
pub type NodeId = usize;

/// Node classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The arena root.
    Document,
    /// A regular HTML element.
    Element,
    /// Character data (possibly interpolated).
    Text,
    /// An HTML comment.
    Comment,
    /// `<!DOCTYPE …>`.
    Doctype,
    /// A `<c:NAME>` component reference.
    Import,
    /// The neutral `<c>` grouping element (also used for `<c:arg>` bodies).
    C,
}

/// An attribute surviving on a parsed node.
#[derive(Debug, Clone)]
pub struct Attribute {
    /// Attribute namespace (currently always empty).
    pub namespace: String,
    /// Lowercased attribute name.
    pub key: String,
    /// Compiled value.
    pub val: Expr,
    /// Location of the attribute in the template.
    pub source: Source,
}

/// A node in the parsed template tree.
///
/// Structural links are [`NodeId`] indices into the owning document, which
/// keeps parent and conditional-chain back-references non-owning.
#[derive(Debug, Clone)]
pub struct Node {
    /// What kind of node this is.
    pub kind: NodeKind,
    /// Element tag name, import component name, or doctype name.
    pub name: String,
    /// Text/comment content; for imports, the original `c:NAME` tag name.
    pub data: Expr,
    /// Element namespace (currently always empty).
    pub namespace: String,
    /// Parent node.
    pub parent: Option<NodeId>,
    /// First child.
    pub first_child: Option<NodeId>,
    /// Last child.
    pub last_child: Option<NodeId>,
    /// Previous sibling.
    pub prev_sibling: Option<NodeId>,
    /// Next sibling.
    pub next_sibling: Option<NodeId>,
    /// Remaining (non-directive) attributes, in source order.
    pub attrs: Vec<Attribute>,
    /// Condition from `c:if`/`c:else-if`/`c:else`; `None` when undirected.
    pub cond: Option<CondExpr>,
    /// Previous member of the conditional chain.
    pub prev_cond: Option<NodeId>,
    /// Next member of the conditional chain.
    pub next_cond: Option<NodeId>,
    /// Collection expression from `c:for`; `Empty` when the node does not
    /// loop.
    pub loop_expr: Expr,
    /// Loop element variable.
    pub loop_var: String,
    /// Optional loop index (or map key) variable.
    pub loop_idx: Option<String>,
    /// Variable name from `var="…"` on `<c>`, snake-cased.
    pub var_name: Option<String>,
    /// Declared shape for the bound variable (`c:as` alongside `var`).
    pub var_shape: Option<Shape>,
    /// Declared shape for the node's rendered output (`c:as` elsewhere).
    pub render_shape: Option<Shape>,
    /// Location of the node in the template.
    pub source: Source,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            kind: NodeKind::Document,
            name: String::new(),
            data: Expr::Empty,
            namespace: String::new(),
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
            attrs: Vec::new(),
            cond: None,
            prev_cond: None,
            next_cond: None,
            loop_expr: Expr::Empty,
            loop_var: String::new(),
            loop_idx: None,
            var_name: None,
            var_shape: None,
            render_shape: None,
            source: Source::default(),
        }
    }
}

impl Node {
    /// True for whitespace-only text nodes, which conditional-chain linking
    /// skips over.
    pub fn is_whitespace_text(&self) -> bool {
        self.kind == NodeKind::Text
            && match &self.data {
                Expr::Empty => true,
                Expr::Raw(s) => s.trim().is_empty(),
                Expr::Program(_) => false,
            }
    }
}

/// A parsed template: node arena plus input schema.
#[derive(Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    input_schema: BTreeMap<String, Value>,
    file: String,
    importer: Option<Rc<dyn Importer>>,
}

impl Document {
    /// The arena root node id.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Borrows a node by id.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Declared arguments mapped to their default values. Always contains
    /// the implicit `_` child-content slot.
    pub fn input_schema(&self) -> &BTreeMap<String, Value> {
        &self.input_schema
    }

    /// The template file name, empty when parsed from a string.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// The importer configured at parse time.
    pub fn importer(&self) -> Option<&Rc<dyn Importer>> {
        self.importer.as_ref()
    }

    /// Child ids of a node, in order.
    pub fn children_of(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.nodes[id].first_child;
        while let Some(c) = cur {
            out.push(c);
            cur = self.nodes[c].next_sibling;
        }
        out
    }

    /// A node and all its descendants, preorder.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = vec![id];
        let mut i = 0;
        while i < out.len() {
            let children = self.children_of(out[i]);
            out.extend(children);
            i += 1;
        }
        out
    }

    /// Slash-separated element chain from the root to a node.
    pub fn path_of(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut cur = Some(id);
        while let Some(c) = cur {
            let node = &self.nodes[c];
            match node.kind {
                NodeKind::Element | NodeKind::C => parts.push(node.name.clone()),
                NodeKind::Import => parts.push(format!("c:{}", node.name)),
                _ => {}
            }
            cur = node.parent;
        }
        parts.reverse();
        parts.join("/")
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("file", &self.file)
            .field("nodes", &self.nodes.len())
            .field("input_schema", &self.input_schema)
            .finish()
    }
}

/// Parses a template from a string.
///
/// The importer resolves `<c:NAME>` references at parse time (for `<c:arg>`
/// defaults and import validation) and at render time.
pub fn parse(
    source: &str,
    importer: Option<Rc<dyn Importer>>,
) -> Result<Rc<Document>, ParseError> {
    parse_with_source("", source, importer)
}

/// Parses a template, retaining the file name for error messages.
pub fn parse_with_source(
    file: &str,
    source: &str,
    importer: Option<Rc<dyn Importer>>,
) -> Result<Rc<Document>, ParseError> {
    tracing::debug!(file, len = source.len(), "parsing template");
    let mut builder = TreeBuilder::new(file, source, importer);
    builder.run();
    let args = builder.extract_args();

    let TreeBuilder { file, importer, nodes, mut errors, .. } = builder;
    let temp = Rc::new(Document {
        nodes,
        root: 0,
        input_schema: BTreeMap::new(),
        file,
        importer,
    });

    // Evaluate `<c:arg>` defaults against the (schema-less) tree.
    let mut schema = BTreeMap::new();
    schema.insert("_".to_string(), Value::Unset);
    for (id, arg_name) in args {
        match eval_arg_default(&temp, id) {
            Ok(value) => {
                schema.insert(snake_case(&arg_name), value);
            }
            Err(e) => errors.push(e),
        }
    }

    let mut doc = Rc::try_unwrap(temp).unwrap_or_else(|rc| (*rc).clone());
    doc.input_schema = schema;
    let doc = Rc::new(doc);

    errors.extend(check_document(&doc));

    // Dry-run render: validates imports and directive usage. Skipped when
    // earlier passes already failed, to avoid cascading duplicates.
    if errors.is_empty() {
        let mut comp = ChtmlComponent::new(doc.clone());
        let outcome = comp.render(&DryRunScope::new(Default::default()));
        if let Err(e) = comp.dispose() {
            errors.push(e);
        }
        if let Err(e) = outcome {
            errors.push(e);
        }
    }

    if errors.is_empty() {
        Ok(doc)
    } else {
        tracing::debug!(count = errors.len(), "template has parse errors");
        Err(ParseError::new(errors))
    }
}

fn eval_arg_default(doc: &Rc<Document>, id: NodeId) -> Result<Value, ComponentError> {
    let node = doc.node(id);
    let kids = doc.children_of(id);
    if kids.is_empty() {
        return Ok(Value::Unset);
    }
    if kids.len() == 1 && doc.node(kids[0]).kind == NodeKind::Text {
        return match &doc.node(kids[0]).data {
            Expr::Raw(s) => Ok(Value::String(s.trim().to_string())),
            expr => expr
                .value(&mut Env::new())
                .map_err(|e| ComponentError::new(e.clone(), "", &node.source).with_expr_offset(e.pos)),
        };
    }
    let mut comp = ChtmlComponent::subtree(doc.clone(), id);
    let result = comp.render(&BaseScope::empty());
    let _ = comp.dispose();
    result
}

fn check_document(doc: &Document) -> Vec<ComponentError> {
    let mut symbols = SymbolTable::new();
    for (name, default) in doc.input_schema() {
        symbols.bind(name, shape_of(default));
    }
    let mut errors = Vec::new();
    for child in doc.children_of(doc.root()) {
        check_node(doc, child, &mut symbols, &mut errors);
    }
    errors
}

fn check_node(
    doc: &Document,
    id: NodeId,
    symbols: &mut SymbolTable,
    errors: &mut Vec<ComponentError>,
) {
    let node = doc.node(id);
    let mut restores: Vec<(String, Option<Shape>)> = Vec::new();

    if let Some(cond) = &node.cond {
        if let Err(e) = cond.expr.check(symbols) {
            errors.push(type_error_at(e, &node.source));
        }
        if let Some(var) = &cond.bind_var {
            let shape = cond.shape.clone().unwrap_or(Shape::Any);
            restores.push((var.clone(), symbols.bind(var, shape)));
        }
    }

    if !node.loop_expr.is_empty() {
        let coll_shape = match node.loop_expr.check(symbols) {
            Ok(s) => s,
            Err(e) => {
                errors.push(type_error_at(e, &node.source));
                Shape::Any
            }
        };
        let (elem_shape, idx_shape) = match coll_shape {
            Shape::Array(elem) => (*elem, Shape::Number),
            Shape::Object { elem: Some(elem), .. } => (*elem, Shape::String),
            Shape::Object { .. } => (Shape::Any, Shape::String),
            _ => (Shape::Any, Shape::Any),
        };
        restores.push((node.loop_var.clone(), symbols.bind(&node.loop_var, elem_shape)));
        if let Some(idx) = &node.loop_idx {
            restores.push((idx.clone(), symbols.bind(idx, idx_shape)));
        }
    }

    for attr in &node.attrs {
        if let Err(e) = attr.val.check(symbols) {
            errors.push(type_error_at(e, &attr.source));
        }
    }
    if matches!(node.kind, NodeKind::Text | NodeKind::Comment) {
        if let Err(e) = node.data.check(symbols) {
            errors.push(type_error_at(e, &node.source));
        }
    }

    for child in doc.children_of(id) {
        check_node(doc, child, symbols, errors);
    }

    for (name, prev) in restores.into_iter().rev() {
        symbols.restore(&name, prev);
    }

    // `<c var>` bindings stay visible for the rest of the document.
    if node.kind == NodeKind::C {
        if let Some(var) = &node.var_name {
            symbols.bind(var, node.var_shape.clone().unwrap_or(Shape::Any));
        }
    }
}

fn type_error_at(e: TypeError, source: &Source) -> ComponentError {
    let pos = e.pos;
    ComponentError::new(e, "", source).with_expr_offset(pos)
}

// Incoming start tags that implicitly close the open element, per the
// HTML5 implied-end-tag rules the templates actually rely on.
fn closes_implied(open: &str, incoming: &str) -> bool {
    match open {
        "p" => matches!(
            incoming,
            "address" | "article" | "aside" | "blockquote" | "div" | "dl" | "fieldset"
                | "footer" | "form" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "header"
                | "hr" | "main" | "nav" | "ol" | "p" | "pre" | "section" | "table" | "ul"
        ),
        "li" => incoming == "li",
        "dt" | "dd" => matches!(incoming, "dt" | "dd"),
        "option" => matches!(incoming, "option" | "optgroup"),
        "tr" => incoming == "tr",
        "td" | "th" => matches!(incoming, "td" | "th" | "tr"),
        _ => false,
    }
}

struct TreeBuilder<'a> {
    src: &'a str,
    file: String,
    index: LineIndex,
    nodes: Vec<Node>,
    // Open elements: (node id, full tag name as written).
    stack: Vec<(NodeId, String)>,
    errors: Vec<ComponentError>,
    importer: Option<Rc<dyn Importer>>,
}

impl<'a> TreeBuilder<'a> {
    fn new(file: &str, src: &'a str, importer: Option<Rc<dyn Importer>>) -> Self {
        let root = Node { kind: NodeKind::Document, ..Default::default() };
        Self {
            src,
            file: file.to_string(),
            index: LineIndex::new(src),
            nodes: vec![root],
            stack: Vec::new(),
            errors: Vec::new(),
            importer,
        }
    }

    fn run(&mut self) {
        let mut tokenizer = Tokenizer::new(self.src);
        while let Some(token) = tokenizer.next_token() {
            match token {
                Token::Text { text, offset, len } => self.add_text(text, offset, len),
                Token::Comment { text, offset, len } => self.add_comment(text, offset, len),
                Token::Doctype { name, offset, len } => self.add_doctype(name, offset, len),
                Token::StartTag(tag) => self.add_element(tag),
                Token::EndTag { name, .. } => self.close_element(&name),
            }
        }
        self.stack.clear();
    }

    fn source_at(&self, offset: usize, len: usize) -> Source {
        Source::new(self.file.clone(), self.index.span(self.src, offset, len))
    }

    fn error_at(&mut self, err: impl Into<crate::error::BoxError>, offset: usize, len: usize) {
        let source = self.source_at(offset, len.max(1));
        self.errors.push(ComponentError::new(err, "", &source));
    }

    fn parent(&self) -> NodeId {
        self.stack.last().map(|(id, _)| *id).unwrap_or(0)
    }

    fn append(&mut self, parent: NodeId, mut node: Node) -> NodeId {
        let id = self.nodes.len();
        node.parent = Some(parent);
        node.prev_sibling = self.nodes[parent].last_child;
        if let Some(prev) = node.prev_sibling {
            self.nodes[prev].next_sibling = Some(id);
        }
        if self.nodes[parent].first_child.is_none() {
            self.nodes[parent].first_child = Some(id);
        }
        self.nodes[parent].last_child = Some(id);
        self.nodes.push(node);
        id
    }

    fn add_text(&mut self, text: String, offset: usize, len: usize) {
        let data = match Expr::compile(&text) {
            Ok(expr) => expr,
            Err(e) => {
                let pos = e.pos;
                self.error_at(e, offset + pos, 1);
                Expr::Raw(text)
            }
        };
        let node = Node {
            kind: NodeKind::Text,
            data,
            source: self.source_at(offset, len),
            ..Default::default()
        };
        let parent = self.parent();
        self.append(parent, node);
    }

    fn add_comment(&mut self, text: String, offset: usize, len: usize) {
        let data = match Expr::compile(&text) {
            Ok(expr) => expr,
            Err(e) => {
                let pos = e.pos;
                self.error_at(e, offset + pos, 1);
                Expr::Raw(text)
            }
        };
        let node = Node {
            kind: NodeKind::Comment,
            data,
            source: self.source_at(offset, len),
            ..Default::default()
        };
        let parent = self.parent();
        self.append(parent, node);
    }

    fn add_doctype(&mut self, name: String, offset: usize, len: usize) {
        let node = Node {
            kind: NodeKind::Doctype,
            name,
            source: self.source_at(offset, len),
            ..Default::default()
        };
        let parent = self.parent();
        self.append(parent, node);
    }

    fn add_element(&mut self, tag: TagToken) {
        while let Some((_, open_name)) = self.stack.last() {
            if closes_implied(open_name, &tag.name) {
                self.stack.pop();
            } else {
                break;
            }
        }

        let (kind, local_name, data) = if tag.name == "c" {
            (NodeKind::C, "c".to_string(), Expr::Empty)
        } else if tag.name == "c:arg" {
            (NodeKind::C, "c:arg".to_string(), Expr::Empty)
        } else if let Some(import_name) = tag.name.strip_prefix("c:") {
            (
                NodeKind::Import,
                import_name.to_string(),
                Expr::Raw(tag.name.clone()),
            )
        } else {
            (NodeKind::Element, tag.name.clone(), Expr::Empty)
        };

        let mut node = Node {
            kind,
            name: local_name,
            data,
            source: self.source_at(tag.offset, tag.len),
            ..Default::default()
        };

        let mut link_chain = false;
        let mut as_shape: Option<Shape> = None;
        for attr in &tag.attrs {
            match attr.name.as_str() {
                "c:if" => node.cond = self.compile_cond(attr),
                "c:else-if" => {
                    node.cond = self.compile_cond(attr);
                    link_chain = true;
                }
                "c:else" => {
                    node.cond = Some(CondExpr::default());
                    link_chain = true;
                }
                "c:for" => self.compile_loop(&mut node, attr),
                "c:as" => match parse_shape(&attr.value) {
                    Ok(shape) => as_shape = Some(shape),
                    Err(e) => {
                        let pos = e.pos;
                        self.error_at(e, attr.value_offset + pos, 1);
                    }
                },
                "var" if kind == NodeKind::C && node.name == "c" => {
                    node.var_name = Some(snake_case(&attr.value));
                }
                _ => {
                    let val = if attr.has_value {
                        match Expr::compile(&attr.value) {
                            Ok(expr) => expr,
                            Err(e) => {
                                let pos = e.pos;
                                self.error_at(e, attr.value_offset + pos, 1);
                                Expr::Raw(attr.value.clone())
                            }
                        }
                    } else {
                        Expr::Empty
                    };
                    node.attrs.push(Attribute {
                        namespace: String::new(),
                        key: attr.name.clone(),
                        val,
                        source: self.source_at(attr.offset, attr.len),
                    });
                }
            }
        }
        if node.var_name.is_some() {
            node.var_shape = as_shape;
        } else {
            node.render_shape = as_shape;
        }

        let parent = self.parent();
        if link_chain {
            match self.find_chain_predecessor(parent) {
                Some(prev) => node.prev_cond = Some(prev),
                None => self.error_at(
                    ChainError { tag: tag.name.clone() },
                    tag.offset,
                    tag.len,
                ),
            }
        }

        let id = self.append(parent, node);
        if let Some(prev) = self.nodes[id].prev_cond {
            self.nodes[prev].next_cond = Some(id);
        }

        let is_void = kind == NodeKind::Element && VOID_ELEMENTS.contains(&tag.name.as_str());
        if !tag.self_closing && !is_void {
            self.stack.push((id, tag.name));
        }
    }

    fn compile_cond(&mut self, attr: &AttrToken) -> Option<CondExpr> {
        match CondExpr::compile(&attr.value) {
            Ok(cond) => Some(cond),
            Err(e) => {
                let pos = e.pos;
                self.error_at(e, attr.value_offset + pos, 1);
                None
            }
        }
    }

    fn compile_loop(&mut self, node: &mut Node, attr: &AttrToken) {
        // Accept both `x in xs` and the fully wrapped `${x in xs}` form.
        let (header_text, base) = match lex_interpolation(&attr.value) {
            Ok(items) => {
                let exprs: Vec<&Item> =
                    items.iter().filter(|i| matches!(i, Item::Expr { .. })).collect();
                let only_ws = items.iter().all(|i| match i {
                    Item::Text { text, .. } => text.trim().is_empty(),
                    Item::Expr { .. } => true,
                });
                match (exprs.as_slice(), only_ws) {
                    ([Item::Expr { text, pos }], true) => (text.clone(), *pos),
                    _ => (attr.value.clone(), 0),
                }
            }
            Err(e) => {
                let pos = e.pos;
                self.error_at(e, attr.value_offset + pos, 1);
                return;
            }
        };

        let header = match lex_loop(&header_text) {
            Ok(h) => h,
            Err(e) => {
                let pos = e.pos;
                self.error_at(e, attr.value_offset + base + pos, 1);
                return;
            }
        };
        match Expr::compile_at(&attr.value, &header.expr, base + header.expr_pos) {
            Ok(expr) => {
                node.loop_expr = expr;
                node.loop_var = header.var;
                node.loop_idx = header.idx;
            }
            Err(e) => {
                let pos = e.pos;
                self.error_at(e, attr.value_offset + pos, 1);
            }
        }
    }

    // Finds the previous non-whitespace sibling under `parent` that carries
    // a condition, for `c:else-if`/`c:else` linking.
    fn find_chain_predecessor(&self, parent: NodeId) -> Option<NodeId> {
        let mut cur = self.nodes[parent].last_child;
        while let Some(id) = cur {
            let node = &self.nodes[id];
            if node.is_whitespace_text() {
                cur = node.prev_sibling;
                continue;
            }
            return node.cond.as_ref().map(|_| id);
        }
        None
    }

    fn close_element(&mut self, name: &str) {
        let found = self.stack.iter().rposition(|(_, n)| n == name);
        if let Some(i) = found {
            self.stack.truncate(i);
        }
        // Stray end tags are ignored, as per HTML5.
    }

    // Extracts `<c:arg>` declarations, detaching them from the tree.
    // Returns (node id, declared name) pairs for default evaluation.
    fn extract_args(&mut self) -> Vec<(NodeId, String)> {
        let mut args = Vec::new();
        let arg_ids: Vec<NodeId> = (0..self.nodes.len())
            .filter(|&id| self.nodes[id].kind == NodeKind::C && self.nodes[id].name == "c:arg")
            .collect();

        for id in arg_ids {
            let node = &self.nodes[id];
            let source = node.source.clone();
            let parent = node.parent;

            if self.has_arg_ancestor(id) {
                self.errors.push(ComponentError::new(
                    ArgPlacementError::Nested,
                    "",
                    &source,
                ));
                continue;
            }
            if parent != Some(0) {
                self.errors.push(ComponentError::new(
                    ArgPlacementError::NotAtRoot,
                    "",
                    &source,
                ));
                continue;
            }

            let name = self.nodes[id]
                .attrs
                .iter()
                .find(|a| a.key == "name")
                .map(|a| a.val.raw_string().to_string())
                .unwrap_or_default();
            if name.is_empty() {
                self.errors.push(ComponentError::new(
                    ArgPlacementError::MissingName,
                    "",
                    &source,
                ));
                continue;
            }

            self.detach(id);
            args.push((id, name));
        }
        args
    }

    fn has_arg_ancestor(&self, id: NodeId) -> bool {
        let mut cur = self.nodes[id].parent;
        while let Some(p) = cur {
            let node = &self.nodes[p];
            if node.kind == NodeKind::C && node.name == "c:arg" {
                return true;
            }
            cur = node.parent;
        }
        false
    }

    fn detach(&mut self, id: NodeId) {
        let (parent, prev, next) = {
            let node = &self.nodes[id];
            (node.parent, node.prev_sibling, node.next_sibling)
        };
        if let Some(p) = parent {
            if self.nodes[p].first_child == Some(id) {
                self.nodes[p].first_child = next;
            }
            if self.nodes[p].last_child == Some(id) {
                self.nodes[p].last_child = prev;
            }
        }
        if let Some(prev) = prev {
            self.nodes[prev].next_sibling = next;
        }
        if let Some(next) = next {
            self.nodes[next].prev_sibling = prev;
        }
        let node = &mut self.nodes[id];
        node.parent = None;
        node.prev_sibling = None;
        node.next_sibling = None;
    }
}

/// A `c:else`/`c:else-if` with no preceding conditional sibling.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{tag} has no preceding c:if sibling")]
pub struct ChainError {
    /// The offending tag name.
    pub tag: String,
}

/// Misplaced or malformed `<c:arg>` declarations.
#[derive(Debug, Clone, Copy, thiserror::Error)]
pub enum ArgPlacementError {
    /// `<c:arg>` nested inside another `<c:arg>`.
    #[error("nested <c:arg> is not allowed")]
    Nested,
    /// `<c:arg>` somewhere other than the document root.
    #[error("<c:arg> must be declared at the document root")]
    NotAtRoot,
    /// `<c:arg>` without a name attribute.
    #[error("<c:arg> requires a name attribute")]
    MissingName,
}
