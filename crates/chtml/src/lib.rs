// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]

//! # CHTML
//!
//! Component-oriented template engine built atop HTML5 syntax.
//!
//! A template is valid HTML augmented with three families of directives:
//! control-flow attributes (`c:if`, `c:else-if`, `c:else`, `c:for`),
//! interpolation (`${expr}` in text and attribute values), and component
//! composition (`<c:NAME>` imports, `<c:arg>`/`<c:attr>` declarations, and
//! `<c>` variable-binding elements). Templates parse into a typed node tree,
//! compile into components with a declared input schema, and render into an
//! HTML tree or a structured data value.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chtml::{parse, BaseScope, ChtmlComponent, Component, FileImporter, render_html};
//!
//! let importer = FileImporter::new("./templates");
//! let doc = parse("<h1>${title}</h1>", Some(importer))?;
//! let mut page = ChtmlComponent::new(doc);
//! let scope = BaseScope::from_json(serde_json::json!({ "title": "Hello" }));
//! let html = render_html(&chtml::value_to_html(page.render(&scope)?));
//! ```
//!
//! ## Architecture
//!
//! - **Tokenizer** (`token`): offset-tagged HTML5 token stream
//! - **Parser** (`parser`): tree construction plus directive lexing,
//!   conditional chains, input schema extraction, and the static checker
//! - **Expressions** (`expr`): interpolation lexer, grammar, shape checker,
//!   and the tree-walking evaluator behind a narrow seam
//! - **Renderer** (`render`): recursive evaluation with per-instance child
//!   caches for loops and imports
//! - **Components** (`component`): `Component`/`Scope`/`Importer` traits and
//!   the filesystem/memory importers
//!
//! ## Thread Safety
//!
//! A component instance mutates per-render caches and is not safe for
//! concurrent renders. Parse once and wrap the document in one component
//! per thread of use.

/// Component, scope, and importer abstractions.
pub mod component;
/// Error types and source-context reporting.
pub mod error;
/// Expression programs: lexing, parsing, checking, evaluation.
pub mod expr;
/// Output HTML tree and serializer.
pub mod html;
/// Template parser and document model.
pub mod parser;
/// Recursive renderer.
pub mod render;
/// Structural shape algebra.
pub mod shape;
/// Source spans and line indexing.
pub mod span;
/// HTML token stream.
pub mod token;
/// Dynamic values and coercion.
pub mod value;

pub use component::{
    AttrComponent, BaseScope, Component, DryRunScope, FileImporter, Importer,
    MemoryImporter, Scope,
};
pub use error::{
    CastError, ComponentError, ComponentNotFound, DecodeError, ImportNotAllowed,
    ParseError, SourceContext, UnrecognizedArgumentError,
};
pub use expr::{CondExpr, Env, EvalError, Expr, SymbolTable, TypeError};
pub use html::{render_html, HtmlAttribute, HtmlNode, HtmlNodeKind};
pub use parser::{parse, parse_with_source, Attribute, Document, Node, NodeId, NodeKind};
pub use render::{ChtmlComponent, RenderOptions};
pub use shape::{parse_shape, Shape};
pub use span::{Source, Span};
pub use value::{
    any_plus, convert_to_shape, match_shape, shape_of, snake_case, value_to_html, Value,
};

#[cfg(test)]
mod tests;
