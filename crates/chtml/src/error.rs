// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Error types for parsing and rendering.
//!
//! Render-time failures travel as [`ComponentError`]: a boxed source error
//! annotated with the element path and template location of the node that
//! raised it. Nested component renders wrap errors again, so the chain of
//! [`ComponentError`]s walked by [`ComponentError::component_stack`] reads
//! outer-to-inner through the import graph. Parse-time failures aggregate
//! into a [`ParseError`] holding one [`ComponentError`] per problem.
//!
//! # Source Context
//!
//! [`SourceContext`] captures a snippet of template source around an error
//! location for rich messages with line numbers and a caret pointing at the
//! exact column.

use crate::shape::Shape;
use crate::span::{Source, Span};
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Boxed error type carried inside [`ComponentError`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Raised when a provided argument does not match the input schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unrecognized argument {name:?}")]
pub struct UnrecognizedArgumentError {
    /// The offending argument name.
    pub name: String,
}

/// Raised when an import attribute cannot be coerced to the declared shape.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot decode argument {key:?}: {reason}")]
pub struct DecodeError {
    /// The attribute name, snake-cased.
    pub key: String,
    /// Why the coercion failed.
    pub reason: String,
}

/// Raised when a `<c var c:as="…">` aggregate fails validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot cast {actual} to {expected}: {reason}")]
pub struct CastError {
    /// The declared shape.
    pub expected: Shape,
    /// The shape of the value that was produced.
    pub actual: Shape,
    /// Why the validation failed.
    pub reason: String,
}

/// Sentinel: a `<c:NAME>` element was rendered with no importer configured.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq, Default)]
#[error("import not allowed: no importer is configured")]
pub struct ImportNotAllowed;

/// Sentinel: the importer does not know the requested component.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("component {name:?} not found")]
pub struct ComponentNotFound {
    /// The requested component name.
    pub name: String,
}

/// An error annotated with the component path and template location.
#[derive(Debug)]
pub struct ComponentError {
    source: BoxError,
    path: String,
    file: String,
    line: u32,
    column: u32,
    length: usize,
}

impl ComponentError {
    /// Wraps an error with a path and source location.
    pub fn new(source: impl Into<BoxError>, path: impl Into<String>, loc: &Source) -> Self {
        Self {
            source: source.into(),
            path: path.into(),
            file: loc.file.clone(),
            line: loc.span.line,
            column: loc.span.column,
            length: loc.span.length,
        }
    }

    /// Wraps an error with no known location.
    pub fn bare(source: impl Into<BoxError>) -> Self {
        Self::new(source, "", &Source::default())
    }

    /// Shifts the reported column right by an expression-relative offset.
    ///
    /// Type and evaluation errors carry positions within their expression
    /// text; the owning node contributes line and base column.
    pub fn with_expr_offset(mut self, pos: usize) -> Self {
        self.column += pos as u32;
        self
    }

    /// Slash-separated element chain from the document root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The template file, empty when parsed from a string.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// 1-indexed line of the owning node.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// 1-indexed column of the owning node.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Byte length of the owning node's source region.
    pub fn length(&self) -> usize {
        self.length
    }

    /// The location as a [`Span`] (offset unknown).
    pub fn span(&self) -> Span {
        Span { offset: 0, line: self.line, column: self.column, length: self.length }
    }

    /// The wrapped error.
    pub fn inner(&self) -> &(dyn StdError + 'static) {
        self.source.as_ref()
    }

    /// All component errors in the chain, outer to inner.
    ///
    /// Traverses wrapped errors and joined multi-errors alike, so the result
    /// reads as the chain of component frames the failure passed through.
    pub fn component_stack(&self) -> Vec<&ComponentError> {
        let mut stack = Vec::new();
        collect_component_errors(self, &mut stack);
        stack
    }

    /// The innermost non-component error.
    pub fn root_cause(&self) -> &(dyn StdError + 'static) {
        let mut cause: &(dyn StdError + 'static) = self.inner();
        loop {
            if let Some(ce) = cause.downcast_ref::<ComponentError>() {
                cause = ce.inner();
                continue;
            }
            match cause.source() {
                Some(next) => cause = next,
                None => return cause,
            }
        }
    }

    /// True when any error in the chain is a `T`.
    pub fn is<T: StdError + 'static>(&self) -> bool {
        self.find::<T>().is_some()
    }

    /// Finds the first `T` in the chain.
    pub fn find<T: StdError + 'static>(&self) -> Option<&T> {
        let mut cause: Option<&(dyn StdError + 'static)> = Some(self.inner());
        while let Some(err) = cause {
            if let Some(found) = err.downcast_ref::<T>() {
                return Some(found);
            }
            cause = match err.downcast_ref::<ComponentError>() {
                Some(ce) => Some(ce.inner()),
                None => err.source(),
            };
        }
        None
    }

    /// Builds a [`SourceContext`] by loading the template source through the
    /// provided reader.
    pub fn source_context(
        &self,
        read: impl FnOnce(&str) -> std::io::Result<String>,
    ) -> Option<SourceContext> {
        if self.file.is_empty() || self.line == 0 {
            return None;
        }
        let source = read(&self.file).ok()?;
        Some(SourceContext::from_source(&source, self.line as usize, self.column as usize))
    }
}

fn collect_component_errors<'a>(err: &'a ComponentError, out: &mut Vec<&'a ComponentError>) {
    out.push(err);
    let mut cause: Option<&(dyn StdError + 'static)> = Some(err.inner());
    while let Some(e) = cause {
        if let Some(ce) = e.downcast_ref::<ComponentError>() {
            collect_component_errors(ce, out);
            return;
        }
        if let Some(pe) = e.downcast_ref::<ParseError>() {
            for inner in &pe.errors {
                collect_component_errors(inner, out);
            }
            return;
        }
        cause = e.source();
    }
}

impl fmt::Display for ComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.file.is_empty() {
            write!(f, "{}:{}:{}: ", self.file, self.line, self.column)?;
        } else if self.line > 0 {
            write!(f, "{}:{}: ", self.line, self.column)?;
        }
        if !self.path.is_empty() {
            write!(f, "{}: ", self.path)?;
        }
        write!(f, "{}", self.source)
    }
}

impl StdError for ComponentError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Aggregated parse failures; each element carries its own location.
#[derive(Debug)]
pub struct ParseError {
    /// One entry per problem found, in source order.
    pub errors: Vec<ComponentError>,
}

impl ParseError {
    /// Wraps a list of parse problems.
    pub fn new(errors: Vec<ComponentError>) -> Self {
        Self { errors }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.len() {
            0 => write!(f, "parse failed"),
            1 => write!(f, "{}", self.errors[0]),
            n => write!(f, "{} (and {} more errors)", self.errors[0], n - 1),
        }
    }
}

impl StdError for ParseError {}

/// Source context for enhanced error messages.
///
/// Captures a snippet of template source around an error location, enabling
/// rich error messages with line numbers and visual indicators.
#[derive(Debug, Clone)]
pub struct SourceContext {
    /// All lines from the source file.
    pub lines: Vec<String>,
    /// The line number where the error occurred (1-indexed).
    pub error_line: usize,
    /// The column number where the error occurred (1-indexed).
    pub error_column: usize,
    /// First line number of the snippet (1-indexed).
    pub snippet_start: usize,
    /// Last line number of the snippet (1-indexed).
    pub snippet_end: usize,
}

impl SourceContext {
    /// Creates a source context from source code and error location.
    ///
    /// Captures 3 lines before and after the error line for context.
    pub fn from_source(source: &str, line: usize, column: usize) -> Self {
        let lines: Vec<String> = source.lines().map(|l| l.to_string()).collect();
        let snippet_start = line.saturating_sub(3).max(1);
        let snippet_end = (line + 3).min(lines.len());

        Self {
            lines,
            error_line: line,
            error_column: column,
            snippet_start,
            snippet_end,
        }
    }

    /// Formats the source snippet with line numbers and error indicator.
    ///
    /// Returns a string like:
    /// ```text
    ///    4 | <div class="container">
    ///    5 |   <span c:if="${oops">
    ///      |   ^
    ///    6 | </div>
    /// ```
    pub fn format_snippet(&self) -> String {
        let mut result = String::new();

        for line_num in self.snippet_start..=self.snippet_end {
            if line_num > self.lines.len() {
                break;
            }

            let line = &self.lines[line_num - 1];
            let is_error_line = line_num == self.error_line;

            result.push_str(&format!("{:4} | {}\n", line_num, line));

            if is_error_line {
                result.push_str(&format!(
                    "     | {}^\n",
                    " ".repeat(self.error_column.saturating_sub(1))
                ));
            }
        }

        result
    }
}

impl fmt::Display for SourceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_snippet())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Span;

    fn loc(file: &str, line: u32, column: u32) -> Source {
        Source::new(file, Span { offset: 0, line, column, length: 1 })
    }

    #[test]
    fn test_display_includes_location_and_path() {
        let err = ComponentError::new(
            UnrecognizedArgumentError { name: "x".into() },
            "div/ul",
            &loc("page.chtml", 3, 7),
        );
        assert_eq!(
            err.to_string(),
            "page.chtml:3:7: div/ul: unrecognized argument \"x\""
        );
    }

    #[test]
    fn test_component_stack_outer_to_inner() {
        let inner = ComponentError::new(
            DecodeError { key: "n".into(), reason: "bad".into() },
            "span",
            &loc("inner.chtml", 2, 1),
        );
        let outer = ComponentError::new(inner, "div/c:card", &loc("outer.chtml", 5, 3));
        let stack = outer.component_stack();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack[0].file(), "outer.chtml");
        assert_eq!(stack[1].file(), "inner.chtml");
    }

    #[test]
    fn test_component_stack_through_joined_errors() {
        let a = ComponentError::bare(ImportNotAllowed);
        let b = ComponentError::bare(ComponentNotFound { name: "x".into() });
        let joined = ParseError::new(vec![a, b]);
        let outer = ComponentError::new(joined, "", &loc("f.chtml", 1, 1));
        assert_eq!(outer.component_stack().len(), 3);
    }

    #[test]
    fn test_root_cause_and_is() {
        let inner = ComponentError::new(
            ComponentNotFound { name: "card".into() },
            "div",
            &loc("inner.chtml", 1, 1),
        );
        let outer = ComponentError::new(inner, "", &loc("outer.chtml", 1, 1));
        assert!(outer.is::<ComponentNotFound>());
        assert!(!outer.is::<ImportNotAllowed>());
        let root = outer.root_cause();
        assert!(root.downcast_ref::<ComponentNotFound>().is_some());
    }

    #[test]
    fn test_expr_offset_shifts_column() {
        let err = ComponentError::new(
            DecodeError { key: "k".into(), reason: "r".into() },
            "",
            &loc("f.chtml", 2, 10),
        )
        .with_expr_offset(5);
        assert_eq!(err.column(), 15);
    }

    #[test]
    fn test_source_context_reader() {
        let err = ComponentError::new(
            ImportNotAllowed,
            "",
            &loc("tpl.chtml", 2, 3),
        );
        let ctx = err
            .source_context(|file| {
                assert_eq!(file, "tpl.chtml");
                Ok("line one\nline two\nline three".to_string())
            })
            .unwrap();
        let snippet = ctx.format_snippet();
        assert!(snippet.contains("   2 | line two"));
        assert!(snippet.contains("     |   ^"));
    }

    #[test]
    fn test_parse_error_display_counts() {
        let errs = ParseError::new(vec![
            ComponentError::bare(ImportNotAllowed),
            ComponentError::bare(ImportNotAllowed),
        ]);
        assert!(errs.to_string().contains("and 1 more errors"));
    }
}
