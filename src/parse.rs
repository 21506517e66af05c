//! Parse Module for stories files
//!
//! Scans the markup of a `*.stories.svelte` file into a position-preserving
//! tree, parses its module script with Oxc, and extracts the source-side node
//! set: the `defineMeta()` declaration, its import binding and every `<Story />`.

use lazy_static::lazy_static;
#[cfg(feature = "napi")]
use napi_derive::napi;
use oxc_allocator::Allocator;
use oxc_ast::ast::Statement;
use oxc_parser::Parser;
use oxc_span::SourceType;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::define_meta::{
    define_meta_first_argument, find_define_meta_import, find_unique_define_meta_declaration,
    leading_comment, meta_summary, story_binding_name, MetaSummary,
};
use crate::diagnostics::{CompilerError, INV_META_MISSING, PARSE_ERROR};
use crate::visitor::MarkupVisitor;

lazy_static! {
    /// HTML void elements never have a closing tag.
    static ref VOID_ELEMENTS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert("area");
        s.insert("base");
        s.insert("br");
        s.insert("col");
        s.insert("embed");
        s.insert("hr");
        s.insert("img");
        s.insert("input");
        s.insert("link");
        s.insert("meta");
        s.insert("source");
        s.insert("track");
        s.insert("wbr");
        s
    };

    /// `{#snippet name(...)}`; captures the snippet name.
    static ref SNIPPET_OPEN_RE: Regex = Regex::new(r"^\{#snippet\s+([A-Za-z_$][\w$]*)").unwrap();
    static ref SNIPPET_CLOSE_RE: Regex = Regex::new(r"^\{/snippet\s*\}$").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// MARKUP TREE
// ═══════════════════════════════════════════════════════════════════════════════

/// Byte range in the stories file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkupSpan {
    pub start: usize,
    pub end: usize,
}

impl MarkupSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn slice<'s>(&self, source: &'s str) -> &'s str {
        source.get(self.start..self.end).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum AttributeValue {
    /// `name="text"`, `name='text'` or `name=text`
    Static(String),
    /// `name={expr}`, `{shorthand}` or `{...spread}`
    Expression(String),
    /// `name`
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeNode {
    pub name: String,
    pub value: AttributeValue,
    pub span: MarkupSpan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementNode {
    pub name: String,
    pub attributes: Vec<AttributeNode>,
    pub children: Vec<MarkupNode>,
    pub span: MarkupSpan,
    /// Between the end of the opening tag and the start of the closing tag.
    /// `None` for self-closing and void elements.
    pub content: Option<MarkupSpan>,
}

impl ElementNode {
    pub fn attribute(&self, name: &str) -> Option<&AttributeNode> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn static_attribute(&self, name: &str) -> Option<&str> {
        match &self.attribute(name)?.value {
            AttributeValue::Static(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentNode {
    /// Text between `<!--` and `-->`.
    pub data: String,
    pub span: MarkupSpan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextNode {
    pub raw: String,
    pub span: MarkupSpan,
}

/// `<script>` and `<style>`: content is not markup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBlockNode {
    pub name: String,
    pub attributes: Vec<AttributeNode>,
    pub content: MarkupSpan,
    pub span: MarkupSpan,
}

impl RawBlockNode {
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name == name)
    }

    pub fn static_attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .and_then(|a| match &a.value {
                AttributeValue::Static(value) => Some(value.as_str()),
                _ => None,
            })
    }

    /// `<script module>` or the legacy `<script context="module">`.
    pub fn is_module_script(&self) -> bool {
        self.name.eq_ignore_ascii_case("script")
            && (self.has_attribute("module") || self.static_attribute("context") == Some("module"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MarkupNode {
    Element(ElementNode),
    Comment(CommentNode),
    Text(TextNode),
    RawBlock(RawBlockNode),
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCANNING HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Find the end of a balanced brace expression starting at `start_index`,
/// handling strings, template literals and comments.
/// Returns the byte index after the closing brace, or None if unbalanced.
fn find_balanced_brace_end(source: &str, start_index: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut i = start_index;
    let mut in_string: Option<u8> = None;
    let mut in_template_literal = false;
    let mut template_brace_depth = 0usize;

    while i < bytes.len() {
        let c = bytes[i];

        if c == b'\\' && i + 1 < bytes.len() {
            i += 2;
            continue;
        }

        if let Some(quote) = in_string {
            if c == quote {
                in_string = None;
            }
            i += 1;
            continue;
        }

        if in_template_literal {
            if c == b'`' && template_brace_depth == 0 {
                in_template_literal = false;
            } else if c == b'$' && bytes.get(i + 1) == Some(&b'{') {
                template_brace_depth += 1;
                i += 2;
                continue;
            } else if c == b'}' && template_brace_depth > 0 {
                template_brace_depth -= 1;
            }
            i += 1;
            continue;
        }

        if c == b'/' && bytes.get(i + 1) == Some(&b'/') {
            i = source[i..].find('\n').map_or(bytes.len(), |offset| i + offset);
            continue;
        }
        if c == b'/' && bytes.get(i + 1) == Some(&b'*') {
            i = i + 2 + source[i + 2..].find("*/")? + 2;
            continue;
        }

        match c {
            b'"' | b'\'' => in_string = Some(c),
            b'`' => in_template_literal = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }

        i += 1;
    }

    None
}

/// Check if a tag name represents a component (starts with uppercase or is dotted)
pub fn is_component_tag(tag_name: &str) -> bool {
    tag_name
        .chars()
        .next()
        .map(|c| c.is_uppercase())
        .unwrap_or(false)
        || tag_name.contains('.')
}

fn is_tag_name_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, b'-' | b'_' | b':' | b'.')
}

fn is_attribute_name_byte(c: u8) -> bool {
    !c.is_ascii_whitespace() && !matches!(c, b'=' | b'>' | b'/' | b'"' | b'\'' | b'<' | b'{')
}

// ═══════════════════════════════════════════════════════════════════════════════
// MARKUP PARSER
// ═══════════════════════════════════════════════════════════════════════════════

struct OpenElement {
    name: String,
    attributes: Vec<AttributeNode>,
    children: Vec<MarkupNode>,
    start: usize,
    content_start: usize,
}

struct OpenTag {
    name: String,
    attributes: Vec<AttributeNode>,
    self_closing: bool,
    end: usize,
}

struct MarkupParser<'s> {
    source: &'s str,
    file_path: &'s str,
    pos: usize,
    stack: Vec<OpenElement>,
    root: Vec<MarkupNode>,
    text_start: Option<usize>,
}

impl<'s> MarkupParser<'s> {
    fn new(source: &'s str, file_path: &'s str) -> Self {
        Self {
            source,
            file_path,
            pos: 0,
            stack: Vec::new(),
            root: Vec::new(),
            text_start: None,
        }
    }

    fn bytes(&self) -> &'s [u8] {
        self.source.as_bytes()
    }

    fn error(&self, message: &str, offset: usize) -> CompilerError {
        CompilerError::at_offset(PARSE_ERROR, message, self.file_path, self.source, offset)
    }

    fn push_node(&mut self, node: MarkupNode) {
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.root.push(node),
        }
    }

    fn flush_text(&mut self, end: usize) {
        if let Some(start) = self.text_start.take() {
            if end > start {
                let span = MarkupSpan::new(start, end);
                self.push_node(MarkupNode::Text(TextNode {
                    raw: span.slice(self.source).to_string(),
                    span,
                }));
            }
        }
    }

    fn mark_text(&mut self) {
        if self.text_start.is_none() {
            self.text_start = Some(self.pos);
        }
    }

    fn close_top(&mut self, content_end: usize, end: usize) {
        if let Some(open) = self.stack.pop() {
            self.push_node(MarkupNode::Element(ElementNode {
                name: open.name,
                attributes: open.attributes,
                children: open.children,
                span: MarkupSpan::new(open.start, end),
                content: Some(MarkupSpan::new(open.content_start, content_end)),
            }));
        }
    }

    fn parse(mut self) -> Result<Vec<MarkupNode>, CompilerError> {
        let source = self.source;
        let bytes = self.bytes();

        while self.pos < bytes.len() {
            let rest = &source[self.pos..];

            if rest.starts_with("<!--") {
                self.flush_text(self.pos);
                self.parse_comment()?;
            } else if rest.starts_with("</")
                && bytes.get(self.pos + 2).is_some_and(|c| c.is_ascii_alphabetic())
            {
                self.flush_text(self.pos);
                self.parse_closing_tag()?;
            } else if bytes[self.pos] == b'<'
                && bytes.get(self.pos + 1).is_some_and(|c| c.is_ascii_alphabetic())
            {
                self.flush_text(self.pos);
                self.parse_element()?;
            } else if bytes[self.pos] == b'{' {
                // Expressions and block tags stay part of the surrounding text.
                self.mark_text();
                self.pos = find_balanced_brace_end(source, self.pos)
                    .ok_or_else(|| self.error("Unbalanced `{` in markup.", self.pos))?;
            } else {
                self.mark_text();
                let first = rest.chars().next().map(char::len_utf8).unwrap_or(1);
                self.pos = rest[first..]
                    .find(['<', '{'])
                    .map(|offset| self.pos + first + offset)
                    .unwrap_or(bytes.len());
            }
        }

        self.flush_text(bytes.len());
        while !self.stack.is_empty() {
            self.close_top(bytes.len(), bytes.len());
        }

        Ok(self.root)
    }

    fn parse_comment(&mut self) -> Result<(), CompilerError> {
        let start = self.pos;
        let data_start = start + 4;
        let data_end = self.source[data_start..]
            .find("-->")
            .map(|offset| data_start + offset)
            .ok_or_else(|| self.error("Unclosed HTML comment.", start))?;
        self.pos = data_end + 3;
        self.push_node(MarkupNode::Comment(CommentNode {
            data: self.source[data_start..data_end].to_string(),
            span: MarkupSpan::new(start, self.pos),
        }));
        Ok(())
    }

    fn parse_closing_tag(&mut self) -> Result<(), CompilerError> {
        let start = self.pos;
        let source = self.source;
        let bytes = self.bytes();
        let mut i = start + 2;
        while i < bytes.len() && is_tag_name_byte(bytes[i]) {
            i += 1;
        }
        let name = &source[start + 2..i];
        let end = source[i..]
            .find('>')
            .map(|offset| i + offset + 1)
            .ok_or_else(|| self.error("Unterminated closing tag.", start))?;
        self.pos = end;

        // Elements left open inside the closed one are closed implicitly.
        if let Some(depth) = self.stack.iter().rposition(|open| open.name == name) {
            while self.stack.len() > depth + 1 {
                self.close_top(start, start);
            }
            self.close_top(start, end);
        }
        Ok(())
    }

    fn parse_element(&mut self) -> Result<(), CompilerError> {
        let start = self.pos;
        let tag = self.parse_open_tag()?;

        if !tag.self_closing
            && (tag.name.eq_ignore_ascii_case("script") || tag.name.eq_ignore_ascii_case("style"))
        {
            let closing = format!("</{}", tag.name.to_ascii_lowercase());
            let content_end = self.source[tag.end..]
                .to_ascii_lowercase()
                .find(&closing)
                .map(|offset| tag.end + offset)
                .ok_or_else(|| self.error(&format!("Unclosed <{}> block.", tag.name), start))?;
            let end = self.source[content_end..]
                .find('>')
                .map(|offset| content_end + offset + 1)
                .ok_or_else(|| self.error("Unterminated closing tag.", content_end))?;
            self.pos = end;
            self.push_node(MarkupNode::RawBlock(RawBlockNode {
                name: tag.name,
                attributes: tag.attributes,
                content: MarkupSpan::new(tag.end, content_end),
                span: MarkupSpan::new(start, end),
            }));
            return Ok(());
        }

        self.pos = tag.end;
        let is_void = !is_component_tag(&tag.name)
            && VOID_ELEMENTS.contains(tag.name.to_ascii_lowercase().as_str());

        if tag.self_closing || is_void {
            self.push_node(MarkupNode::Element(ElementNode {
                name: tag.name,
                attributes: tag.attributes,
                children: Vec::new(),
                span: MarkupSpan::new(start, tag.end),
                content: None,
            }));
        } else {
            self.stack.push(OpenElement {
                name: tag.name,
                attributes: tag.attributes,
                children: Vec::new(),
                start,
                content_start: tag.end,
            });
        }
        Ok(())
    }

    /// Parse `<name attr ...>` or `<name ... />` starting at `self.pos`.
    fn parse_open_tag(&self) -> Result<OpenTag, CompilerError> {
        let source = self.source;
        let bytes = self.bytes();
        let start = self.pos;
        let mut i = start + 1;
        while i < bytes.len() && is_tag_name_byte(bytes[i]) {
            i += 1;
        }
        let name = source[start + 1..i].to_string();
        let mut attributes = Vec::new();

        loop {
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            match bytes.get(i) {
                None => return Err(self.error(&format!("Unterminated <{}> tag.", name), start)),
                Some(b'>') => {
                    return Ok(OpenTag {
                        name,
                        attributes,
                        self_closing: false,
                        end: i + 1,
                    })
                }
                Some(b'/') if bytes.get(i + 1) == Some(&b'>') => {
                    return Ok(OpenTag {
                        name,
                        attributes,
                        self_closing: true,
                        end: i + 2,
                    })
                }
                Some(b'{') => {
                    let end = find_balanced_brace_end(source, i)
                        .ok_or_else(|| self.error("Unbalanced `{` in attribute.", i))?;
                    let expression = source[i + 1..end - 1].trim().to_string();
                    let attr_name = match expression.strip_prefix("...") {
                        Some(_) => "...".to_string(),
                        None => expression.clone(),
                    };
                    attributes.push(AttributeNode {
                        name: attr_name,
                        value: AttributeValue::Expression(expression),
                        span: MarkupSpan::new(i, end),
                    });
                    i = end;
                }
                Some(c) if is_attribute_name_byte(*c) => {
                    let attr_start = i;
                    while i < bytes.len() && is_attribute_name_byte(bytes[i]) {
                        i += 1;
                    }
                    let attr_name = source[attr_start..i].to_string();
                    let (value, end) = self.parse_attribute_value(i)?;
                    i = end;
                    attributes.push(AttributeNode {
                        name: attr_name,
                        value,
                        span: MarkupSpan::new(attr_start, end),
                    });
                }
                Some(_) => {
                    return Err(self.error(&format!("Unexpected character in <{}> tag.", name), i))
                }
            }
        }
    }

    /// Parse an optional `=value` at `i`. Returns the value and the index after it.
    fn parse_attribute_value(&self, mut i: usize) -> Result<(AttributeValue, usize), CompilerError> {
        let source = self.source;
        let bytes = self.bytes();

        let mut j = i;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() {
            j += 1;
        }
        if bytes.get(j) != Some(&b'=') {
            return Ok((AttributeValue::Boolean, i));
        }
        i = j + 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        match bytes.get(i) {
            Some(&quote) if quote == b'"' || quote == b'\'' => {
                let value_start = i + 1;
                let mut k = value_start;
                while k < bytes.len() && bytes[k] != quote {
                    if bytes[k] == b'{' {
                        k = find_balanced_brace_end(source, k)
                            .ok_or_else(|| self.error("Unbalanced `{` in attribute.", k))?;
                    } else {
                        k += 1;
                    }
                }
                if k >= bytes.len() {
                    return Err(self.error("Unterminated attribute value.", i));
                }
                let raw = &source[value_start..k];
                let value = if raw.starts_with('{') && find_balanced_brace_end(raw, 0) == Some(raw.len()) {
                    AttributeValue::Expression(raw[1..raw.len() - 1].trim().to_string())
                } else {
                    AttributeValue::Static(raw.to_string())
                };
                Ok((value, k + 1))
            }
            Some(b'{') => {
                let end = find_balanced_brace_end(source, i)
                    .ok_or_else(|| self.error("Unbalanced `{` in attribute.", i))?;
                Ok((
                    AttributeValue::Expression(source[i + 1..end - 1].trim().to_string()),
                    end,
                ))
            }
            Some(_) => {
                let value_start = i;
                while i < bytes.len()
                    && !bytes[i].is_ascii_whitespace()
                    && bytes[i] != b'>'
                    && !(bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'>'))
                {
                    i += 1;
                }
                Ok((AttributeValue::Static(source[value_start..i].to_string()), i))
            }
            None => Err(self.error("Unterminated attribute value.", i)),
        }
    }
}

/// Parse the markup of a stories file into a position-preserving tree.
pub fn parse_markup(source: &str, file_path: &str) -> Result<Vec<MarkupNode>, CompilerError> {
    MarkupParser::new(source, file_path).parse()
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE NODE SET
// ═══════════════════════════════════════════════════════════════════════════════

/// One `<Story />` declaration site in the original source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStory {
    /// Static `name` attribute.
    pub name: Option<String>,
    /// Static `exportName` attribute.
    pub export_name: Option<String>,
    /// Data of the HTML comment directly preceding the tag.
    pub comment: Option<String>,
    /// Verbatim children source; empty for self-closing stories.
    pub raw_children: String,
    /// Used for ordering only, never for identity across trees.
    pub span: MarkupSpan,
}

impl SourceStory {
    /// Best available human pointer to this story for diagnostics.
    pub fn label(&self) -> Option<&str> {
        self.name.as_deref().or(self.export_name.as_deref())
    }
}

/// Immutable view over the original source of one stories file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceNodeSet {
    /// Local name bound to the `defineMeta` import.
    pub meta_import_binding: String,
    /// Span of the `defineMeta()` declaration statement.
    pub meta_declaration: MarkupSpan,
    /// Local name of the destructured `Story` component.
    pub story_component_name: String,
    /// Text of the first comment leading the `defineMeta()` declaration.
    pub meta_description: Option<String>,
    pub meta: MetaSummary,
    pub story_components: Vec<SourceStory>,
}

/// Collects `<Story />` elements in document order together with the comment
/// that directly precedes each of them among its siblings.
struct StoryCollector<'s> {
    source: &'s str,
    story_component_name: &'s str,
    stories: Vec<SourceStory>,
}

impl<'m, 's> MarkupVisitor<'m> for StoryCollector<'s> {
    fn visit_children(&mut self, children: &'m [MarkupNode]) {
        let mut pending_comment: Option<&CommentNode> = None;

        for node in children {
            match node {
                MarkupNode::Comment(comment) => pending_comment = Some(comment),
                MarkupNode::Text(text) if text.raw.trim().is_empty() => {}
                MarkupNode::Element(element) if element.name == self.story_component_name => {
                    self.stories.push(SourceStory {
                        name: element.static_attribute("name").map(str::to_string),
                        export_name: element.static_attribute("exportName").map(str::to_string),
                        comment: pending_comment.take().map(|c| c.data.clone()),
                        raw_children: story_children_raw_code(element, self.source),
                        span: element.span,
                    });
                }
                other => {
                    pending_comment = None;
                    self.visit_node(other);
                }
            }
        }
    }
}

/// Brace tags (`{expr}`, `{#block}`, `{/block}`) of a text run, with their
/// spans in the stories file.
fn brace_tags(text: &TextNode) -> Vec<(MarkupSpan, &str)> {
    let raw = text.raw.as_str();
    let mut tags = Vec::new();
    let mut i = 0;
    while let Some(offset) = raw[i..].find('{') {
        let start = i + offset;
        let Some(end) = find_balanced_brace_end(raw, start) else {
            break;
        };
        let span = MarkupSpan::new(text.span.start + start, text.span.start + end);
        tags.push((span, &raw[start..end]));
        i = end;
    }
    tags
}

/// Body of the `{#snippet children(...)}` block placed directly inside a story.
fn children_snippet_body(element: &ElementNode) -> Option<MarkupSpan> {
    let mut depth = 0usize;
    let mut body_start = None;

    // Snippets nested in child elements are separate nodes and never reached.
    for child in &element.children {
        let MarkupNode::Text(text) = child else {
            continue;
        };
        for (span, tag) in brace_tags(text) {
            if let Some(caps) = SNIPPET_OPEN_RE.captures(tag) {
                if depth == 0 && &caps[1] == "children" {
                    body_start = Some(span.end);
                }
                depth += 1;
            } else if SNIPPET_CLOSE_RE.is_match(tag) {
                depth = depth.saturating_sub(1);
                if let (0, Some(start)) = (depth, body_start) {
                    return Some(MarkupSpan::new(start, span.start));
                }
            }
        }
    }
    None
}

/// Verbatim source of a story's children. When the story declares a
/// `{#snippet children(...)}` block, only that block's body is returned.
pub fn story_children_raw_code(element: &ElementNode, source: &str) -> String {
    let Some(content) = element.content else {
        return String::new();
    };
    children_snippet_body(element)
        .unwrap_or(content)
        .slice(source)
        .to_string()
}

fn module_script(nodes: &[MarkupNode]) -> Option<&RawBlockNode> {
    nodes.iter().find_map(|node| match node {
        MarkupNode::RawBlock(block) if block.is_module_script() => Some(block),
        _ => None,
    })
}

/// Extract the source-side node set of a stories file.
pub fn extract_source_nodes(
    source: &str,
    file_path: &str,
    package_name: &str,
) -> Result<SourceNodeSet, CompilerError> {
    let nodes = parse_markup(source, file_path)?;

    let script = module_script(&nodes).ok_or_else(|| {
        CompilerError::with_details(
            INV_META_MISSING,
            "No module script found.",
            file_path,
            0,
            0,
            None,
            vec!["Declare defineMeta() inside <script module>.".to_string()],
        )
    })?;
    let script_offset = script.content.start;
    let script_text = script.content.slice(source);

    let allocator = Allocator::default();
    let source_type = SourceType::default()
        .with_module(true)
        .with_typescript(matches!(
            script.static_attribute("lang"),
            Some("ts" | "typescript")
        ));
    let ret = Parser::new(&allocator, script_text, source_type).parse();
    if let Some(error) = ret.errors.first() {
        return Err(CompilerError::at_offset(
            PARSE_ERROR,
            &format!("Failed to parse module script: {}", error),
            file_path,
            source,
            script_offset,
        ));
    }
    let program = ret.program;

    let meta_import_binding = find_define_meta_import(&program, package_name).ok_or_else(|| {
        CompilerError::at_offset(
            INV_META_MISSING,
            &format!("defineMeta is not imported from '{}'.", package_name),
            file_path,
            source,
            script_offset,
        )
    })?;

    let index = find_unique_define_meta_declaration(&program, &meta_import_binding, file_path)?;
    let Statement::VariableDeclaration(declaration) = &program.body[index] else {
        return Err(CompilerError::new(
            INV_META_MISSING,
            "defineMeta() declaration is not a variable declaration.",
            file_path,
            0,
            0,
        ));
    };

    let first_argument = define_meta_first_argument(declaration, &meta_import_binding, file_path)?;
    let meta = meta_summary(first_argument);
    let story_component_name = story_binding_name(declaration, file_path)?;
    let meta_description = leading_comment(&program, index);

    let mut collector = StoryCollector {
        source,
        story_component_name: &story_component_name,
        stories: Vec::new(),
    };
    collector.visit_document(&nodes);
    let story_components = collector.stories;

    Ok(SourceNodeSet {
        meta_import_binding,
        meta_declaration: MarkupSpan::new(
            script_offset + declaration.span.start as usize,
            script_offset + declaration.span.end as usize,
        ),
        story_component_name,
        meta_description,
        meta,
        story_components,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
#[napi]
pub fn extract_source_nodes_native(
    source: String,
    file_path: String,
    package_name: Option<String>,
) -> napi::Result<serde_json::Value> {
    let package_name =
        package_name.unwrap_or_else(|| crate::compile::DEFAULT_PACKAGE_NAME.to_string());
    let nodes = extract_source_nodes(&source, &file_path, &package_name)
        .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    serde_json::to_value(nodes).map_err(|e| napi::Error::from_reason(e.to_string()))
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    const PACKAGE: &str = "@storybook/addon-svelte-csf";

    #[test]
    fn test_is_component_tag() {
        assert!(is_component_tag("Story"));
        assert!(is_component_tag("ui.Button"));
        assert!(!is_component_tag("div"));
    }

    #[test]
    fn test_find_balanced_brace() {
        assert_eq!(find_balanced_brace_end("{hello}", 0), Some(7));
        assert_eq!(find_balanced_brace_end("{obj.map(x => ({ x }))}", 0), Some(23));
        assert_eq!(find_balanced_brace_end("{'string with { brace'}", 0), Some(23));
        assert_eq!(find_balanced_brace_end("{`${a}}`}", 0), Some(9));
        assert_eq!(find_balanced_brace_end("{unclosed", 0), None);
    }

    #[test]
    fn test_find_balanced_brace_skips_comments() {
        let block = "{{ /* it's fine } */ a: 1 }}";
        assert_eq!(find_balanced_brace_end(block, 0), Some(block.len()));
        let line = "{{\n  // don't }\n  a: 1\n}}";
        assert_eq!(find_balanced_brace_end(line, 0), Some(line.len()));
        assert_eq!(find_balanced_brace_end("{ /* open }", 0), None);
    }

    #[test]
    fn test_parse_markup_structure() {
        let source = r#"<!-- note --><div class="a"><br><Story name="X" args={{ a: '>' }} /></div>"#;
        let nodes = parse_markup(source, "a.svelte").unwrap();
        assert_eq!(nodes.len(), 2);
        let MarkupNode::Comment(comment) = &nodes[0] else {
            panic!("expected comment");
        };
        assert_eq!(comment.data, " note ");

        let MarkupNode::Element(div) = &nodes[1] else {
            panic!("expected element");
        };
        assert_eq!(div.name, "div");
        assert_eq!(div.static_attribute("class"), Some("a"));
        assert_eq!(div.children.len(), 2);

        let MarkupNode::Element(story) = &div.children[1] else {
            panic!("expected story");
        };
        assert_eq!(story.name, "Story");
        assert!(story.content.is_none());
        assert_eq!(
            story.attribute("args").map(|a| &a.value),
            Some(&AttributeValue::Expression("{ a: '>' }".to_string()))
        );
    }

    #[test]
    fn test_parse_markup_raw_blocks_and_expressions() {
        let source = "<script module>\nconst a = '<div>';\n</script>\n{#if a < b}<p>x</p>{/if}<style>p{}</style>";
        let nodes = parse_markup(source, "a.svelte").unwrap();
        let MarkupNode::RawBlock(script) = &nodes[0] else {
            panic!("expected script block");
        };
        assert!(script.is_module_script());
        assert_eq!(script.content.slice(source), "\nconst a = '<div>';\n");
        assert!(nodes
            .iter()
            .any(|n| matches!(n, MarkupNode::Element(e) if e.name == "p")));
        assert!(matches!(nodes.last(), Some(MarkupNode::RawBlock(b)) if b.name == "style"));
    }

    #[test]
    fn test_parse_markup_attribute_forms() {
        let source = r#"<Story name='Single' exportName=Bare autofocus {...rest} {args} tags={["a"]} />"#;
        let nodes = parse_markup(source, "a.svelte").unwrap();
        let MarkupNode::Element(story) = &nodes[0] else {
            panic!("expected element");
        };
        assert_eq!(story.static_attribute("name"), Some("Single"));
        assert_eq!(story.static_attribute("exportName"), Some("Bare"));
        assert_eq!(story.attribute("autofocus").map(|a| &a.value), Some(&AttributeValue::Boolean));
        assert!(story.attribute("...").is_some());
        assert!(story.attribute("args").is_some());
        assert_eq!(
            story.attribute("tags").map(|a| &a.value),
            Some(&AttributeValue::Expression("[\"a\"]".to_string()))
        );
    }

    #[test]
    fn test_parse_markup_unclosed_comment_is_an_error() {
        let err = parse_markup("<div>\n<!-- open", "broken.svelte").unwrap_err();
        assert_eq!(err.code, PARSE_ERROR);
        assert_eq!(err.file, "broken.svelte");
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_story_children_raw_code() {
        let source = "<Story name=\"A\"><Button>Label</Button></Story><Story name=\"B\">{#snippet children(args)}<Button {...args} />{/snippet}</Story><Story name=\"C\" />";
        let nodes = parse_markup(source, "a.svelte").unwrap();
        let raw: Vec<String> = nodes
            .iter()
            .filter_map(|n| match n {
                MarkupNode::Element(e) => Some(story_children_raw_code(e, source)),
                _ => None,
            })
            .collect();
        assert_eq!(raw, vec!["<Button>Label</Button>", "<Button {...args} />", ""]);
    }

    fn first_story_raw_code(source: &str) -> String {
        let nodes = parse_markup(source, "a.svelte").unwrap();
        match &nodes[0] {
            MarkupNode::Element(e) => story_children_raw_code(e, source),
            _ => panic!("expected story"),
        }
    }

    #[test]
    fn test_children_snippet_with_sibling_snippet() {
        let source = "<Story name=\"A\">{#snippet children(args)}<Button {...args} />{/snippet}\n{#snippet extra()}<Icon />{/snippet}</Story>";
        assert_eq!(first_story_raw_code(source), "<Button {...args} />");
    }

    #[test]
    fn test_children_snippet_with_nested_snippet() {
        let source = "<Story name=\"A\">{#snippet children({ a = f() })}{#snippet icon()}<Icon />{/snippet}<Button {icon} />{/snippet}</Story>";
        assert_eq!(
            first_story_raw_code(source),
            "{#snippet icon()}<Icon />{/snippet}<Button {icon} />"
        );
    }

    #[test]
    fn test_children_snippet_inside_element_is_not_unwrapped() {
        let source = "<Story name=\"A\"><div>{#snippet children()}<p />{/snippet}</div></Story>";
        assert_eq!(
            first_story_raw_code(source),
            "<div>{#snippet children()}<p />{/snippet}</div>"
        );
    }

    const STORIES: &str = r#"<script module>
  import { defineMeta } from '@storybook/addon-svelte-csf';
  import Button from './Button.svelte';

  /**
   * A button.
   */
  const { Story: S } = defineMeta({
    title: 'Atoms/Button',
    component: Button,
    tags: ['autodocs'],
  });
</script>

<!-- First story -->
<S name="Primary" args={{ primary: true }} />

<!-- Orphan comment -->
<p>separator</p>

<S name="Secondary">
  <Button>Secondary</Button>
</S>

<!--
  Third story
  spans lines
-->
<S exportName="Third" />
"#;

    #[test]
    fn test_extract_source_nodes() {
        let nodes = extract_source_nodes(STORIES, "Button.stories.svelte", PACKAGE).unwrap();
        assert_eq!(nodes.meta_import_binding, "defineMeta");
        assert_eq!(nodes.story_component_name, "S");
        assert_eq!(nodes.meta.title.as_deref(), Some("Atoms/Button"));
        assert_eq!(nodes.meta.tags, vec!["autodocs".to_string()]);
        assert!(nodes.meta_description.as_deref().is_some_and(|c| c.contains("A button.")));
        assert!(nodes
            .meta_declaration
            .slice(STORIES)
            .starts_with("const { Story: S } = defineMeta"));

        let stories = &nodes.story_components;
        assert_eq!(stories.len(), 3);
        assert_eq!(stories[0].name.as_deref(), Some("Primary"));
        assert_eq!(stories[0].comment.as_deref(), Some(" First story "));
        assert_eq!(stories[0].raw_children, "");
        assert_eq!(stories[1].name.as_deref(), Some("Secondary"));
        assert_eq!(stories[1].comment, None);
        assert_eq!(stories[1].raw_children.trim(), "<Button>Secondary</Button>");
        assert_eq!(stories[2].label(), Some("Third"));
        assert!(stories[2].comment.as_deref().is_some_and(|c| c.contains("spans lines")));
        assert!(stories[0].span.start < stories[1].span.start);
        assert!(stories[1].span.start < stories[2].span.start);
    }

    #[test]
    fn test_extract_with_comments_in_attribute_expressions() {
        let source = "<script module>\n  import { defineMeta } from '@storybook/addon-svelte-csf';\n  const { Story } = defineMeta({});\n</script>\n\n<Story name=\"A\" args={{ /* it's fine */ a: 1 }} />\n<Story name=\"B\" args={{\n  // don't\n  a: 2\n}} />\n";
        let nodes = extract_source_nodes(source, "a.svelte", PACKAGE).unwrap();
        let names: Vec<_> = nodes
            .story_components
            .iter()
            .map(|story| story.name.as_deref())
            .collect();
        assert_eq!(names, vec![Some("A"), Some("B")]);
    }

    #[test]
    fn test_extract_typescript_lang_spelled_out() {
        let source = "<script module lang=\"typescript\">\n  import { defineMeta } from '@storybook/addon-svelte-csf';\n  const title: string = 'Typed';\n  const { Story } = defineMeta({ title: 'Typed' });\n</script>";
        let nodes = extract_source_nodes(source, "a.svelte", PACKAGE).unwrap();
        assert_eq!(nodes.meta.title.as_deref(), Some("Typed"));
    }

    #[test]
    fn test_extract_requires_module_script() {
        let err = extract_source_nodes("<script>const a = 1;</script>", "a.svelte", PACKAGE)
            .unwrap_err();
        assert_eq!(err.code, INV_META_MISSING);
    }

    #[test]
    fn test_extract_legacy_context_module() {
        let source = "<script context=\"module\" lang=\"ts\">\n  import { defineMeta } from '@storybook/addon-svelte-csf';\n  const { Story } = defineMeta({} as const);\n</script>";
        let err = extract_source_nodes(source, "a.svelte", PACKAGE).unwrap_err();
        assert_eq!(err.code, crate::diagnostics::INV_META_ARGUMENT);
    }

    #[test]
    fn test_extract_requires_import() {
        let source = "<script module>\n  const { Story } = defineMeta({});\n</script>";
        let err = extract_source_nodes(source, "a.svelte", PACKAGE).unwrap_err();
        assert_eq!(err.code, INV_META_MISSING);
        assert_eq!(err.line, 1);
    }
}
