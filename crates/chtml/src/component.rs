// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Component, scope, and importer abstractions.
//!
//! A [`Component`] is anything renderable; CHTML documents become components
//! through [`crate::render::ChtmlComponent`], and custom components can be
//! supplied by an [`Importer`]. A [`Scope`] carries the variables of one
//! render; `spawn` derives the child scope handed to imports.
//!
//! # Importer Implementations
//!
//! - [`MemoryImporter`]: resolves component names from in-memory sources
//!   (testing, embedding)
//! - [`FileImporter`]: resolves `name` to `name.chtml` under a root
//!   directory, with canonicalization and an escape check
//!
//! Both parse lazily and cache the parsed document per name, so importing a
//! component N times parses it once.

use crate::error::{ComponentError, ComponentNotFound};
use crate::parser::{parse_with_source, Document};
use crate::render::ChtmlComponent;
use crate::shape::Shape;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use thiserror::Error;

impl std::fmt::Debug for dyn Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Component")
    }
}

/// A renderable unit.
pub trait Component {
    /// Renders the component against a scope.
    fn render(&mut self, scope: &dyn Scope) -> Result<Value, ComponentError>;

    /// Releases per-instance resources. Cascades through child components.
    fn dispose(&mut self) -> Result<(), ComponentError> {
        Ok(())
    }

    /// The declared input schema as a struct shape, if any.
    fn input_shape(&self) -> Option<Shape> {
        None
    }

    /// The declared output shape, if any.
    fn output_shape(&self) -> Option<Shape> {
        None
    }
}

/// A variable-binding environment passed into [`Component::render`].
pub trait Scope {
    /// The variables of this scope.
    fn vars(&self) -> HashMap<String, Value>;

    /// Derives a child scope with the given variables, preserving the
    /// scope's mode (a dry-run scope spawns dry-run children).
    fn spawn(&self, vars: HashMap<String, Value>) -> Box<dyn Scope>;

    /// True when the render validates inputs without any caller-visible
    /// side effects mattering.
    fn dry_run(&self) -> bool {
        false
    }
}

/// A plain scope over a variable map.
#[derive(Debug, Clone, Default)]
pub struct BaseScope {
    vars: HashMap<String, Value>,
}

impl BaseScope {
    /// Creates a scope holding the given variables.
    pub fn new(vars: HashMap<String, Value>) -> Self {
        Self { vars }
    }

    /// A scope with no variables.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a scope from a JSON object, the usual way callers marshal
    /// context data.
    pub fn from_json(json: serde_json::Value) -> Self {
        match Value::from(json) {
            Value::Map(entries) => Self::new(entries.into_iter().collect()),
            _ => Self::empty(),
        }
    }
}

impl Scope for BaseScope {
    fn vars(&self) -> HashMap<String, Value> {
        self.vars.clone()
    }

    fn spawn(&self, vars: HashMap<String, Value>) -> Box<dyn Scope> {
        Box::new(BaseScope::new(vars))
    }
}

/// A validating scope: rendering checks every provided variable against the
/// component's input schema and raises
/// [`crate::error::UnrecognizedArgumentError`] for unknown names.
#[derive(Debug, Clone, Default)]
pub struct DryRunScope {
    vars: HashMap<String, Value>,
}

impl DryRunScope {
    /// Creates a dry-run scope holding the given variables.
    pub fn new(vars: HashMap<String, Value>) -> Self {
        Self { vars }
    }
}

impl Scope for DryRunScope {
    fn vars(&self) -> HashMap<String, Value> {
        self.vars.clone()
    }

    fn spawn(&self, vars: HashMap<String, Value>) -> Box<dyn Scope> {
        Box::new(DryRunScope::new(vars))
    }

    fn dry_run(&self) -> bool {
        true
    }
}

/// Resolves `<c:NAME>` references to components.
pub trait Importer {
    /// Returns a fresh component instance for `name`.
    fn import(&self, name: &str) -> Result<Box<dyn Component>, ComponentError>;
}

/// `<c:attr name="…">` without a name argument.
#[derive(Debug, Clone, Copy, Error, Default)]
#[error("c:attr requires a name argument")]
pub struct AttrNameMissing;

/// Two components importing each other (directly or transitively).
#[derive(Debug, Clone, Error)]
#[error("import cycle detected at {name:?}")]
pub struct ImportCycleError {
    /// The component where the cycle closed.
    pub name: String,
}

/// A component name that resolved outside the allowed root, or to an
/// unreadable file.
#[derive(Debug, Clone, Error)]
#[error("cannot resolve component {name:?}: {reason}")]
pub struct ResolveError {
    /// The requested component name.
    pub name: String,
    /// Why resolution failed.
    pub reason: String,
}

/// The built-in `<c:attr>` component: produces an attribute pair that the
/// enclosing element appends to its attribute list.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttrComponent;

impl Component for AttrComponent {
    fn render(&mut self, scope: &dyn Scope) -> Result<Value, ComponentError> {
        let vars = scope.vars();
        let name = vars.get("name").map(Value::repr).unwrap_or_default();
        if name.is_empty() {
            return Err(ComponentError::bare(AttrNameMissing));
        }
        let value = vars.get("_").map(Value::repr).unwrap_or_default();
        Ok(Value::Attr { name, value })
    }
}

/// Resolves built-in component names handled without an importer.
pub(crate) fn builtin_import(name: &str) -> Option<Box<dyn Component>> {
    match name {
        "attr" => Some(Box::new(AttrComponent)),
        _ => None,
    }
}

/// In-memory component source store.
///
/// Primarily used for unit tests and embedding templates in binaries.
pub struct MemoryImporter {
    templates: RefCell<HashMap<String, String>>,
    docs: RefCell<HashMap<String, Rc<Document>>>,
    loading: RefCell<HashSet<String>>,
    this: Weak<MemoryImporter>,
}

impl MemoryImporter {
    /// Creates an empty importer.
    ///
    /// Returned as `Rc` because nested templates resolve their own imports
    /// through the same instance.
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            templates: RefCell::new(HashMap::new()),
            docs: RefCell::new(HashMap::new()),
            loading: RefCell::new(HashSet::new()),
            this: this.clone(),
        })
    }

    /// Registers a template source under a component name.
    pub fn add_template(&self, name: &str, source: &str) {
        self.templates.borrow_mut().insert(name.to_string(), source.to_string());
        self.docs.borrow_mut().remove(name);
    }
}

impl Importer for MemoryImporter {
    fn import(&self, name: &str) -> Result<Box<dyn Component>, ComponentError> {
        if let Some(doc) = self.docs.borrow().get(name).cloned() {
            return Ok(Box::new(ChtmlComponent::nested(doc)));
        }
        let source = self
            .templates
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| {
                ComponentError::bare(ComponentNotFound { name: name.to_string() })
            })?;
        if !self.loading.borrow_mut().insert(name.to_string()) {
            return Err(ComponentError::bare(ImportCycleError { name: name.to_string() }));
        }
        let this = self.this.upgrade().expect("importer outlives its components");
        let result = parse_with_source(&format!("{}.chtml", name), &source, Some(this));
        self.loading.borrow_mut().remove(name);

        let doc = result.map_err(ComponentError::bare)?;
        tracing::debug!(name, "imported component from memory");
        self.docs.borrow_mut().insert(name.to_string(), doc.clone());
        Ok(Box::new(ChtmlComponent::nested(doc)))
    }
}

/// Filesystem-backed importer.
///
/// `<c:NAME>` resolves to `NAME.chtml` under the root directory. Resolved
/// paths are canonicalized and must stay inside the root, which rejects
/// symlink and `..` traversal.
pub struct FileImporter {
    root: PathBuf,
    docs: RefCell<HashMap<String, Rc<Document>>>,
    loading: RefCell<HashSet<String>>,
    this: Weak<FileImporter>,
}

impl FileImporter {
    /// Creates an importer rooted at a template directory.
    pub fn new<P: AsRef<Path>>(root: P) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            root: root.as_ref().to_path_buf(),
            docs: RefCell::new(HashMap::new()),
            loading: RefCell::new(HashSet::new()),
            this: this.clone(),
        })
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, ComponentError> {
        let mut path = self.root.join(name);
        if path.extension().is_none() {
            path.set_extension("chtml");
        }
        if !path.is_file() {
            return Err(ComponentError::bare(ComponentNotFound { name: name.to_string() }));
        }
        let canonical = path.canonicalize().map_err(|e| {
            ComponentError::bare(ResolveError { name: name.to_string(), reason: e.to_string() })
        })?;
        let canonical_root = self.root.canonicalize().map_err(|e| {
            ComponentError::bare(ResolveError { name: name.to_string(), reason: e.to_string() })
        })?;
        if !canonical.starts_with(&canonical_root) {
            return Err(ComponentError::bare(ResolveError {
                name: name.to_string(),
                reason: "path escapes the template root".to_string(),
            }));
        }
        tracing::debug!(name, path = %canonical.display(), "resolved component");
        Ok(canonical)
    }
}

impl Importer for FileImporter {
    fn import(&self, name: &str) -> Result<Box<dyn Component>, ComponentError> {
        if let Some(doc) = self.docs.borrow().get(name).cloned() {
            return Ok(Box::new(ChtmlComponent::nested(doc)));
        }
        let path = self.resolve(name)?;
        let source = std::fs::read_to_string(&path).map_err(|e| {
            ComponentError::bare(ResolveError { name: name.to_string(), reason: e.to_string() })
        })?;
        if !self.loading.borrow_mut().insert(name.to_string()) {
            return Err(ComponentError::bare(ImportCycleError { name: name.to_string() }));
        }
        let this = self.this.upgrade().expect("importer outlives its components");
        let result =
            parse_with_source(&path.to_string_lossy(), &source, Some(this));
        self.loading.borrow_mut().remove(name);

        let doc = result.map_err(ComponentError::bare)?;
        self.docs.borrow_mut().insert(name.to_string(), doc.clone());
        Ok(Box::new(ChtmlComponent::nested(doc)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_base_scope_spawn() {
        let scope = BaseScope::new(
            [("a".to_string(), Value::Int(1))].into_iter().collect(),
        );
        assert!(!scope.dry_run());
        let child = scope.spawn([("b".to_string(), Value::Int(2))].into_iter().collect());
        assert_eq!(child.vars().get("b"), Some(&Value::Int(2)));
        assert!(child.vars().get("a").is_none());
    }

    #[test]
    fn test_dry_run_scope_spawns_dry_run() {
        let scope = DryRunScope::new(HashMap::new());
        assert!(scope.dry_run());
        assert!(scope.spawn(HashMap::new()).dry_run());
    }

    #[test]
    fn test_base_scope_from_json() {
        let scope = BaseScope::from_json(serde_json::json!({"n": 3, "s": "x"}));
        assert_eq!(scope.vars().get("n"), Some(&Value::Int(3)));
        assert_eq!(scope.vars().get("s"), Some(&Value::String("x".into())));
    }

    #[test]
    fn test_attr_component() {
        let mut comp = AttrComponent;
        let scope = BaseScope::new(
            [
                ("name".to_string(), Value::String("class".into())),
                ("_".to_string(), Value::String("wide".into())),
            ]
            .into_iter()
            .collect(),
        );
        assert_eq!(
            comp.render(&scope).unwrap(),
            Value::Attr { name: "class".into(), value: "wide".into() }
        );
    }

    #[test]
    fn test_attr_component_requires_name() {
        let mut comp = AttrComponent;
        let err = comp.render(&BaseScope::empty()).unwrap_err();
        assert!(err.is::<AttrNameMissing>());
    }

    #[test]
    fn test_memory_importer_not_found() {
        let importer = MemoryImporter::new();
        let err = importer.import("missing").unwrap_err();
        match err.find::<ComponentNotFound>() {
            Some(e) => assert_eq!(e.name, "missing"),
            None => panic!("expected ComponentNotFound, got {err}"),
        }
    }

    #[test]
    fn test_memory_importer_parses_and_caches() {
        let importer = MemoryImporter::new();
        importer.add_template("hello", "<p>hi</p>");
        let mut comp = importer.import("hello").unwrap();
        let out = comp.render(&BaseScope::empty()).unwrap();
        assert_eq!(crate::value::value_to_html(out).children.len(), 1);
        // Second import reuses the parsed document.
        assert!(importer.docs.borrow().contains_key("hello"));
        importer.import("hello").unwrap();
    }

    #[test]
    fn test_memory_importer_detects_cycles() {
        let importer = MemoryImporter::new();
        importer.add_template("a", "<c:b></c:b>");
        importer.add_template("b", "<c:a></c:a>");
        let err = importer.import("a").unwrap_err();
        assert!(err.is::<ImportCycleError>());
    }

    #[test]
    fn test_file_importer_resolves_and_renders() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("card.chtml"), "<div class=\"card\">x</div>").unwrap();
        let importer = FileImporter::new(dir.path());
        let mut comp = importer.import("card").unwrap();
        let out = comp.render(&BaseScope::empty()).unwrap();
        match out {
            Value::Html(node) => {
                assert!(crate::html::render_html(&node).contains("card"));
            }
            other => panic!("expected html, got {other:?}"),
        }
    }

    #[test]
    fn test_file_importer_not_found() {
        let dir = TempDir::new().unwrap();
        let importer = FileImporter::new(dir.path());
        let err = importer.import("missing").unwrap_err();
        assert!(err.is::<ComponentNotFound>());
    }

    #[test]
    fn test_file_importer_rejects_escapes() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("templates");
        fs::create_dir(&root).unwrap();
        fs::write(dir.path().join("secret.chtml"), "<p>no</p>").unwrap();
        let importer = FileImporter::new(&root);
        let err = importer.import("../secret").unwrap_err();
        assert!(err.is::<ResolveError>() || err.is::<ComponentNotFound>());
    }
}
