// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! HTML5 token stream.
//!
//! A hand-driven scanner producing offset-tagged tokens for the tree
//! builder: start/end tags with attribute sub-tokens, text, comments, and
//! doctypes. Tag and attribute names are lowercased per HTML5; raw-text
//! elements (`script`, `style`, `textarea`, `title`) switch the scanner into
//! text mode until the matching close tag. The scanner is deliberately
//! lenient: truncated markup produces best-effort tokens rather than
//! aborting the parse.

use crate::html::RAW_TEXT_ELEMENTS;

/// An attribute captured inside a start tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrToken {
    /// Lowercased attribute name.
    pub name: String,
    /// Attribute value with entities decoded; empty for bare attributes.
    pub value: String,
    /// False for bare attributes such as `disabled`.
    pub has_value: bool,
    /// Byte offset of the attribute name.
    pub offset: usize,
    /// Byte length from the name through the end of the value.
    pub len: usize,
    /// Byte offset of the raw value text (equal to `offset` for bare
    /// attributes).
    pub value_offset: usize,
}

/// The parts of an opening tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagToken {
    /// Lowercased tag name.
    pub name: String,
    /// Attributes in source order.
    pub attrs: Vec<AttrToken>,
    /// True for `<… />`.
    pub self_closing: bool,
    /// Byte offset of the `<`.
    pub offset: usize,
    /// Byte length of the whole token.
    pub len: usize,
}

/// One token of the input stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `<!DOCTYPE …>`
    Doctype {
        /// The doctype name (usually `html`).
        name: String,
        /// Byte offset of the `<`.
        offset: usize,
        /// Byte length of the whole token.
        len: usize,
    },
    /// An opening tag.
    StartTag(TagToken),
    /// A closing tag.
    EndTag {
        /// Lowercased tag name.
        name: String,
        /// Byte offset of the `<`.
        offset: usize,
        /// Byte length of the whole token.
        len: usize,
    },
    /// A run of character data, entities decoded.
    Text {
        /// The decoded text.
        text: String,
        /// Byte offset of the run.
        offset: usize,
        /// Byte length of the raw run.
        len: usize,
    },
    /// `<!-- … -->`
    Comment {
        /// The comment body.
        text: String,
        /// Byte offset of the `<`.
        offset: usize,
        /// Byte length of the whole token.
        len: usize,
    },
}

/// Scanner over template source.
pub struct Tokenizer<'a> {
    src: &'a str,
    pos: usize,
    /// When set, the scanner is inside a raw-text element with this name.
    raw_element: Option<String>,
}

impl<'a> Tokenizer<'a> {
    /// Creates a scanner over the full input.
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0, raw_element: None }
    }

    /// Produces the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Option<Token> {
        if self.pos >= self.src.len() {
            return None;
        }
        if let Some(name) = self.raw_element.take() {
            if let Some(tok) = self.scan_raw_text(&name) {
                return Some(tok);
            }
        }

        let bytes = self.src.as_bytes();
        let start = self.pos;
        if bytes[self.pos] == b'<' {
            let next = bytes.get(self.pos + 1).copied();
            match next {
                Some(b'!') => {
                    if self.src[self.pos..].starts_with("<!--") {
                        return Some(self.scan_comment());
                    }
                    return Some(self.scan_markup_declaration());
                }
                Some(b'/') => return Some(self.scan_end_tag()),
                Some(c) if c.is_ascii_alphabetic() => return Some(self.scan_start_tag()),
                _ => {}
            }
        }

        // Character data until the next plausible tag open.
        let mut i = self.pos + 1;
        while i < bytes.len() {
            if bytes[i] == b'<' {
                let next = bytes.get(i + 1).copied();
                if matches!(next, Some(b'!') | Some(b'/'))
                    || next.is_some_and(|c| c.is_ascii_alphabetic())
                {
                    break;
                }
            }
            i += 1;
        }
        self.pos = i;
        Some(Token::Text {
            text: decode_entities(&self.src[start..i]),
            offset: start,
            len: i - start,
        })
    }

    fn scan_raw_text(&mut self, element: &str) -> Option<Token> {
        let start = self.pos;
        let closer = format!("</{}", element);
        let rest = &self.src[self.pos..];
        let end = rest
            .char_indices()
            .find(|(i, _)| rest[*i..].to_ascii_lowercase().starts_with(&closer))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        self.pos += end;
        if end == 0 {
            return None;
        }
        Some(Token::Text {
            text: self.src[start..start + end].to_string(),
            offset: start,
            len: end,
        })
    }

    fn scan_comment(&mut self) -> Token {
        let start = self.pos;
        self.pos += 4; // <!--
        let rest = &self.src[self.pos..];
        let (body_len, tok_end) = match rest.find("-->") {
            Some(i) => (i, self.pos + i + 3),
            None => (rest.len(), self.src.len()),
        };
        let text = self.src[self.pos..self.pos + body_len].to_string();
        self.pos = tok_end;
        Token::Comment { text, offset: start, len: tok_end - start }
    }

    fn scan_markup_declaration(&mut self) -> Token {
        let start = self.pos;
        self.pos += 2; // <!
        let rest = &self.src[self.pos..];
        let end = rest.find('>').map(|i| self.pos + i).unwrap_or(self.src.len());
        let body = &self.src[self.pos..end];
        self.pos = (end + 1).min(self.src.len());

        let lowered = body.trim_start().to_ascii_lowercase();
        if let Some(name_part) = lowered.strip_prefix("doctype") {
            return Token::Doctype {
                name: name_part.trim().to_string(),
                offset: start,
                len: self.pos - start,
            };
        }
        // Bogus markup declaration becomes a comment, as per HTML5.
        Token::Comment {
            text: body.to_string(),
            offset: start,
            len: self.pos - start,
        }
    }

    fn scan_end_tag(&mut self) -> Token {
        let start = self.pos;
        self.pos += 2; // </
        let name = self.scan_name();
        let rest = &self.src[self.pos..];
        let end = rest.find('>').map(|i| self.pos + i).unwrap_or(self.src.len());
        self.pos = (end + 1).min(self.src.len());
        Token::EndTag { name, offset: start, len: self.pos - start }
    }

    fn scan_start_tag(&mut self) -> Token {
        let start = self.pos;
        self.pos += 1; // <
        let name = self.scan_name();
        let mut attrs = Vec::new();
        let mut self_closing = false;

        loop {
            self.skip_whitespace();
            match self.peek() {
                None => break,
                Some('>') => {
                    self.pos += 1;
                    break;
                }
                Some('/') => {
                    self.pos += 1;
                    if self.peek() == Some('>') {
                        self.pos += 1;
                        self_closing = true;
                        break;
                    }
                }
                _ => {
                    if let Some(attr) = self.scan_attribute() {
                        attrs.push(attr);
                    } else {
                        // Stray character inside the tag; skip it.
                        self.pos += self.peek().map(char::len_utf8).unwrap_or(1);
                    }
                }
            }
        }

        if !self_closing && RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
            self.raw_element = Some(name.clone());
        }
        Token::StartTag(TagToken {
            name,
            attrs,
            self_closing,
            offset: start,
            len: self.pos - start,
        })
    }

    fn scan_attribute(&mut self) -> Option<AttrToken> {
        let start = self.pos;
        let name = self.scan_attr_name();
        if name.is_empty() {
            return None;
        }
        self.skip_whitespace();
        let mut has_value = false;
        let mut value = String::new();
        let mut value_offset = start;
        if self.peek() == Some('=') {
            self.pos += 1;
            self.skip_whitespace();
            has_value = true;
            let scanned = self.scan_attr_value();
            value = scanned.0;
            value_offset = scanned.1;
        }
        Some(AttrToken {
            name: name.to_ascii_lowercase(),
            value,
            has_value,
            offset: start,
            len: self.pos - start,
            value_offset,
        })
    }

    fn scan_attr_value(&mut self) -> (String, usize) {
        match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.pos;
                let rest = &self.src[self.pos..];
                let end = rest.find(q).map(|i| self.pos + i).unwrap_or(self.src.len());
                let raw = &self.src[start..end];
                self.pos = (end + 1).min(self.src.len());
                (decode_entities(raw), start)
            }
            _ => {
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if c.is_ascii_whitespace() || c == '>' || c == '/' {
                        break;
                    }
                    self.pos += c.len_utf8();
                }
                (decode_entities(&self.src[start..self.pos]), start)
            }
        }
    }

    fn scan_name(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '-' || c == ':' || c == '_' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        self.src[start..self.pos].to_ascii_lowercase()
    }

    fn scan_attr_name(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_whitespace() || c == '=' || c == '>' || c == '/' {
                break;
            }
            self.pos += c.len_utf8();
        }
        self.src[start..self.pos].to_string()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }
}

/// Decodes the common named character references and numeric forms.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let semi = match rest[..rest.len().min(32)].find(';') {
            Some(i) => i,
            None => {
                out.push('&');
                rest = &rest[1..];
                continue;
            }
        };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{a0}'),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
