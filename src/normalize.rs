//! Storage-format HTML to plain text.
//!
//! Confluence stores page bodies as XHTML sprinkled with `ac:` / `ri:`
//! macro elements. Retrieval wants flat text with just enough structure to
//! keep meaning: `#` headings, fenced code, `| a | b |` table rows, and
//! `- ` list items. Everything else collapses to paragraphs.
//!
//! Parsing goes through `scraper` (html5ever), which treats the `ac:*`
//! elements as ordinary unknown tags. Storage format is XHTML, though, and
//! two XML-isms need rewriting before the HTML parser sees them:
//!
//! - `<![CDATA[...]]>` sections are escaped into plain text (HTML has no
//!   CDATA outside foreign content).
//! - Self-closing namespaced tags (`<ac:parameter .../>`, `<ri:page .../>`)
//!   are expanded to an explicit open/close pair. HTML ignores `/>` on
//!   unknown elements, which would otherwise swallow every following
//!   sibling into the macro.

use std::borrow::Cow;

use scraper::node::Node;
use scraper::{ElementRef, Html};

type NodeRef<'a> = ego_tree::NodeRef<'a, Node>;

/// Convert storage-format HTML into normalized text.
pub fn html_to_text(storage_html: &str) -> String {
    let unwrapped = unwrap_cdata(storage_html);
    let fragment = Html::parse_fragment(&expand_self_closing(&unwrapped));
    let mut renderer = Renderer::default();
    for child in fragment.root_element().children() {
        renderer.walk(child);
    }
    collapse_blank_lines(&renderer.out)
}

#[derive(Default)]
struct Renderer {
    out: String,
    /// A `- ` marker was written and nothing has followed it yet.
    item_open: bool,
    /// Depth of enclosing `<li>` elements.
    item_depth: usize,
}

impl Renderer {
    fn walk(&mut self, node: NodeRef<'_>) {
        match node.value() {
            Node::Text(text) => self.push_inline(text),
            Node::Element(_) => {
                if let Some(el) = ElementRef::wrap(node) {
                    self.element(el);
                }
            }
            _ => {}
        }
    }

    fn walk_children(&mut self, el: ElementRef<'_>) {
        for child in el.children() {
            self.walk(child);
        }
    }

    fn element(&mut self, el: ElementRef<'_>) {
        let name = el.value().name();
        match name {
            "script" | "style" | "head" | "ac:parameter" | "ac:image" => {}
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<usize>().unwrap_or(1);
                let text = collapse_ws(&el.text().collect::<String>());
                self.item_open = false;
                self.block_break();
                if !text.is_empty() {
                    self.out.push_str(&"#".repeat(level));
                    self.out.push(' ');
                    self.out.push_str(&text);
                }
                self.block_break();
            }
            "pre" => self.fenced(None, &raw_text(*el)),
            "code" if is_code_block(el) => self.fenced(None, &raw_text(*el)),
            "code" => {
                let text = collapse_ws(&el.text().collect::<String>());
                if !text.is_empty() {
                    self.item_open = false;
                    self.out.push('`');
                    self.out.push_str(&text);
                    self.out.push('`');
                }
            }
            "ac:structured-macro" => self.structured_macro(el),
            "ac:link" => {
                let text = collapse_ws(&el.text().collect::<String>());
                if text.is_empty() {
                    if let Some(title) = linked_title(el) {
                        self.push_inline(&title);
                    }
                } else {
                    self.walk_children(el);
                }
            }
            "table" => self.table(el),
            "li" => {
                self.line_break();
                self.out.push_str("- ");
                self.item_open = true;
                self.item_depth += 1;
                self.walk_children(el);
                self.item_depth -= 1;
                self.item_open = false;
                self.line_break();
            }
            "ul" | "ol" => {
                self.line_break();
                self.walk_children(el);
                self.line_break();
            }
            "br" => self.out.push('\n'),
            "p" | "div" | "blockquote" | "section" | "article" | "hr" | "ac:layout"
            | "ac:layout-section" | "ac:layout-cell" | "ac:rich-text-body" => {
                // Paragraphs inside list items stay on the item's line.
                if !self.item_open {
                    self.block_break();
                }
                self.walk_children(el);
                if self.item_depth > 0 {
                    self.line_break();
                } else {
                    self.block_break();
                }
            }
            _ => self.walk_children(el),
        }
    }

    fn structured_macro(&mut self, el: ElementRef<'_>) {
        match el.value().attr("ac:name") {
            Some("code") | Some("noformat") => {
                let language = macro_parameter(el, "language");
                let body = el
                    .children()
                    .filter_map(ElementRef::wrap)
                    .find(|c| c.value().name() == "ac:plain-text-body")
                    .map(|c| raw_text(*c))
                    .unwrap_or_default();
                self.fenced(language.as_deref(), &body);
            }
            // Table of contents and similar have no textual content of their own.
            Some("toc") | Some("children") | Some("anchor") => {}
            _ => {
                self.block_break();
                self.walk_children(el);
                self.block_break();
            }
        }
    }

    fn table(&mut self, table: ElementRef<'_>) {
        self.item_open = false;
        self.block_break();
        for row in table
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|e| e.value().name() == "tr")
            .filter(|tr| owning_table(*tr) == Some(table.id()))
        {
            let cells: Vec<String> = row
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|c| matches!(c.value().name(), "td" | "th"))
                .map(|c| collapse_ws(&c.text().collect::<String>()).replace('|', "\\|"))
                .collect();
            if cells.is_empty() {
                continue;
            }
            self.out.push_str("| ");
            self.out.push_str(&cells.join(" | "));
            self.out.push_str(" |\n");
        }
        self.block_break();
    }

    fn fenced(&mut self, language: Option<&str>, code: &str) {
        let code = code.trim_matches('\n');
        self.item_open = false;
        self.block_break();
        self.out.push_str("```");
        if let Some(lang) = language {
            self.out.push_str(lang);
        }
        self.out.push('\n');
        self.out.push_str(code);
        self.out.push_str("\n```");
        self.block_break();
    }

    /// Append inline text with HTML whitespace semantics.
    fn push_inline(&mut self, text: &str) {
        let starts_ws = text.starts_with(char::is_whitespace);
        let ends_ws = text.ends_with(char::is_whitespace);
        let collapsed = collapse_ws(text);

        let at_break = self.out.is_empty() || self.out.ends_with(char::is_whitespace);
        if starts_ws && !at_break {
            self.out.push(' ');
        }
        if collapsed.is_empty() {
            return;
        }
        self.item_open = false;
        self.out.push_str(&collapsed);
        if ends_ws {
            self.out.push(' ');
        }
    }

    fn line_break(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn block_break(&mut self) {
        if self.out.is_empty() {
            return;
        }
        self.line_break();
        if !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }
}

/// Replace every `<![CDATA[...]]>` section with its escaped contents.
fn unwrap_cdata(html: &str) -> Cow<'_, str> {
    const OPEN: &str = "<![CDATA[";
    const CLOSE: &str = "]]>";

    if !html.contains(OPEN) {
        return Cow::Borrowed(html);
    }

    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let body = &rest[start + OPEN.len()..];
        let (inner, after) = match body.find(CLOSE) {
            Some(end) => (&body[..end], &body[end + CLOSE.len()..]),
            None => (body, ""),
        };
        for c in inner.chars() {
            match c {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                _ => out.push(c),
            }
        }
        rest = after;
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Rewrite `<prefix:name attrs/>` as `<prefix:name attrs></prefix:name>`.
///
/// Only tags with a namespace prefix are touched; void HTML elements like
/// `<br/>` are already handled by the parser.
fn expand_self_closing(html: &str) -> Cow<'_, str> {
    if !html.contains("/>") {
        return Cow::Borrowed(html);
    }

    let mut out = String::with_capacity(html.len() + 64);
    let mut rest = html;
    while let Some(lt) = rest.find('<') {
        out.push_str(&rest[..lt]);
        let tag = &rest[lt..];
        let name_len = tag[1..]
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, ':' | '-' | '_')))
            .unwrap_or(tag.len() - 1);
        let name = &tag[1..1 + name_len];

        let head = match name.contains(':').then(|| tag_end(tag)).flatten() {
            Some(end) => tag[..end].trim_end().strip_suffix('/').map(|h| (h, end)),
            None => None,
        };
        match head {
            Some((head, end)) => {
                out.push_str(head.trim_end());
                out.push_str("></");
                out.push_str(name);
                out.push('>');
                rest = &tag[end + 1..];
            }
            None => {
                out.push('<');
                rest = &tag[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Byte offset of the `>` that closes the tag starting at `tag[0]`.
/// Quoted attribute values may contain `>`.
fn tag_end(tag: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in tag.char_indices().skip(1) {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '>' => return Some(i),
            None => {}
        }
    }
    None
}

/// A `<code>` that stands on its own rather than inside running text.
fn is_code_block(el: ElementRef<'_>) -> bool {
    if el.text().any(|t| t.contains('\n')) {
        return true;
    }
    match el.parent().and_then(ElementRef::wrap) {
        Some(parent) => matches!(
            parent.value().name(),
            "html"
                | "body"
                | "div"
                | "section"
                | "article"
                | "blockquote"
                | "ac:rich-text-body"
                | "ac:layout-cell"
        ),
        None => true,
    }
}

/// All text under a node, verbatim.
fn raw_text(node: NodeRef<'_>) -> String {
    let mut out = String::new();
    collect_raw(node, &mut out);
    out
}

fn collect_raw(node: NodeRef<'_>, out: &mut String) {
    match node.value() {
        Node::Text(text) => out.push_str(text),
        Node::Element(el) if el.name() == "br" => out.push('\n'),
        Node::Element(_) => {
            for child in node.children() {
                collect_raw(child, out);
            }
        }
        _ => {}
    }
}

fn macro_parameter(el: ElementRef<'_>, name: &str) -> Option<String> {
    el.children()
        .filter_map(ElementRef::wrap)
        .find(|c| c.value().name() == "ac:parameter" && c.value().attr("ac:name") == Some(name))
        .map(|c| c.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn linked_title(el: ElementRef<'_>) -> Option<String> {
    el.descendants()
        .filter_map(ElementRef::wrap)
        .find_map(|e| e.value().attr("ri:content-title").map(str::to_string))
}

fn owning_table(row: ElementRef<'_>) -> Option<ego_tree::NodeId> {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "table")
        .map(|e| e.id())
}

fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trim line ends and squeeze runs of blank lines down to one.
fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}
