// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Output HTML tree and serializer.
//!
//! Rendering a component produces either a scalar value or an [`HtmlNode`]
//! tree. The tree is a plain owned structure (no parent pointers) so values
//! can be cloned freely when the same argument is interpolated more than
//! once. [`render_html`] performs straightforward serialization: escaping,
//! void elements, and raw-text elements, nothing more.

use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Elements with no closing tag and no children.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta",
    "param", "source", "track", "wbr",
];

/// Elements whose text content is emitted without escaping.
pub const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Node classification within an output tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HtmlNodeKind {
    /// Container with no markup of its own; serializes as its children.
    Document,
    /// `<!DOCTYPE …>`.
    Doctype,
    /// Character data.
    Text,
    /// `<!-- … -->`.
    Comment,
    /// A tag with attributes and children.
    Element,
}

/// An attribute on an output element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlAttribute {
    /// Attribute name.
    pub name: String,
    /// Attribute value.
    pub value: String,
}

/// A node in the rendered output tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtmlNode {
    /// What kind of node this is.
    pub kind: HtmlNodeKind,
    /// Tag name for elements, doctype name for doctypes, empty otherwise.
    pub name: String,
    /// Content for text and comment nodes.
    pub data: String,
    /// Attributes, in source order.
    pub attrs: Vec<HtmlAttribute>,
    /// Child nodes.
    pub children: Vec<HtmlNode>,
}

impl HtmlNode {
    fn bare(kind: HtmlNodeKind) -> Self {
        Self {
            kind,
            name: String::new(),
            data: String::new(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// A document wrapper used to aggregate sibling results.
    pub fn document() -> Self {
        Self::bare(HtmlNodeKind::Document)
    }

    /// A text node.
    pub fn text(data: impl Into<String>) -> Self {
        let mut n = Self::bare(HtmlNodeKind::Text);
        n.data = data.into();
        n
    }

    /// A comment node.
    pub fn comment(data: impl Into<String>) -> Self {
        let mut n = Self::bare(HtmlNodeKind::Comment);
        n.data = data.into();
        n
    }

    /// A doctype node.
    pub fn doctype(name: impl Into<String>) -> Self {
        let mut n = Self::bare(HtmlNodeKind::Doctype);
        n.name = name.into();
        n
    }

    /// An element node with no attributes or children.
    pub fn element(name: impl Into<String>) -> Self {
        let mut n = Self::bare(HtmlNodeKind::Element);
        n.name = name.into();
        n
    }

    /// Appends a child, splicing document wrappers in place of themselves.
    pub fn append(&mut self, child: HtmlNode) {
        if child.kind == HtmlNodeKind::Document {
            self.children.extend(child.children);
        } else {
            self.children.push(child);
        }
    }

    /// True when the node serializes to nothing at all.
    pub fn is_empty(&self) -> bool {
        match self.kind {
            HtmlNodeKind::Document => self.children.iter().all(HtmlNode::is_empty),
            HtmlNodeKind::Text => self.data.is_empty(),
            _ => false,
        }
    }
}

/// Escapes character data for text content.
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escapes character data for a double-quoted attribute value.
pub fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Serializes an output tree to HTML text.
pub fn render_html(node: &HtmlNode) -> String {
    let mut out = String::new();
    write_node(&mut out, node, false);
    out
}

fn write_node(out: &mut String, node: &HtmlNode, raw_text: bool) {
    match node.kind {
        HtmlNodeKind::Document => {
            for child in &node.children {
                write_node(out, child, raw_text);
            }
        }
        HtmlNodeKind::Doctype => {
            let _ = write!(out, "<!DOCTYPE {}>", node.name);
        }
        HtmlNodeKind::Text => {
            if raw_text {
                out.push_str(&node.data);
            } else {
                out.push_str(&escape_text(&node.data));
            }
        }
        HtmlNodeKind::Comment => {
            let _ = write!(out, "<!--{}-->", node.data);
        }
        HtmlNodeKind::Element => {
            out.push('<');
            out.push_str(&node.name);
            for attr in &node.attrs {
                let _ = write!(out, " {}=\"{}\"", attr.name, escape_attr(&attr.value));
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&node.name.as_str()) {
                return;
            }
            let raw = RAW_TEXT_ELEMENTS.contains(&node.name.as_str());
            for child in &node.children {
                write_node(out, child, raw);
            }
            let _ = write!(out, "</{}>", node.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_element_with_attrs() {
        let mut el = HtmlNode::element("a");
        el.attrs.push(HtmlAttribute { name: "href".into(), value: "/x?a=1&b=2".into() });
        el.append(HtmlNode::text("go"));
        assert_eq!(render_html(&el), r#"<a href="/x?a=1&amp;b=2">go</a>"#);
    }

    #[test]
    fn test_render_escapes_text() {
        let mut el = HtmlNode::element("p");
        el.append(HtmlNode::text("1 < 2 & 3 > 2"));
        assert_eq!(render_html(&el), "<p>1 &lt; 2 &amp; 3 &gt; 2</p>");
    }

    #[test]
    fn test_render_void_element() {
        let mut el = HtmlNode::element("br");
        el.append(HtmlNode::text("ignored"));
        assert_eq!(render_html(&el), "<br>");
    }

    #[test]
    fn test_render_raw_text_element() {
        let mut el = HtmlNode::element("script");
        el.append(HtmlNode::text("if (a < b) { go(); }"));
        assert_eq!(render_html(&el), "<script>if (a < b) { go(); }</script>");
    }

    #[test]
    fn test_document_wrapper_splices() {
        let mut doc = HtmlNode::document();
        doc.append(HtmlNode::text("a"));
        let mut inner = HtmlNode::document();
        inner.append(HtmlNode::text("b"));
        let mut ul = HtmlNode::element("ul");
        ul.append(doc.clone());
        ul.append(inner);
        assert_eq!(render_html(&ul), "<ul>ab</ul>");
    }

    #[test]
    fn test_render_doctype_and_comment() {
        let mut doc = HtmlNode::document();
        doc.append(HtmlNode::doctype("html"));
        doc.append(HtmlNode::comment(" hi "));
        assert_eq!(render_html(&doc), "<!DOCTYPE html><!-- hi -->");
    }
}
