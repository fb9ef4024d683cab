//! Inline formatting: a small markup for bold, italic, code and links.
//!
//! `**bold**`, `*italic*`, `` `code` ``, `[text](href)` and `\n` for line breaks.
//! Literal markup characters in text are backslash-escaped, so anything
//! [`InlineExtractor`] emits is recovered exactly by [`parse_inline`].

use crate::dom::{attr_get, collapse_ws, tag_lower, text_content};
use markup5ever_rcdom::{Handle, NodeData};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStyle {
    pub bold: bool,
    pub italic: bool,
    pub code: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text {
        text: String,
        style: RunStyle,
    },
    LinkText {
        text: String,
        style: RunStyle,
        href: String,
    },
    Break,
}

fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '\\' | '*' | '`' | '[' | ']') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn escape_code(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '\\' | '`') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn escape_href(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '\\' | ')') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

pub fn sanitize_href(href: &str) -> Option<String> {
    let h = href.trim();
    if h.is_empty() {
        return None;
    }
    let low = h.to_ascii_lowercase();
    if low.starts_with("javascript:") || low.starts_with("data:") || low.starts_with("vbscript:") {
        return None;
    }
    Some(h.to_string())
}

/// Wraps `inner` in `delim`, keeping edge spaces outside the delimiters.
fn wrap(inner: &str, delim: &str) -> String {
    let core = inner.trim_matches(' ');
    if core.is_empty() {
        return inner.to_string();
    }
    let lead = if inner.starts_with(' ') { " " } else { "" };
    let trail = if inner.ends_with(' ') { " " } else { "" };
    format!("{lead}{delim}{core}{delim}{trail}")
}

fn normalize_spaces(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch == ' ' {
            if prev_space || out.ends_with('\n') {
                continue;
            }
            prev_space = true;
        } else {
            if ch == '\n' && prev_space {
                out.pop();
            }
            prev_space = false;
        }
        out.push(ch);
    }
    out.trim_matches(' ').to_string()
}

/// Walks inline content and emits the inline markup. Counts `<img>` elements on the way.
#[derive(Debug, Default)]
pub struct InlineExtractor {
    pub images: usize,
    // Emphasis already open around the current node; nested repeats emit no delimiters.
    bold: bool,
    italic: bool,
}

impl InlineExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Markup for all children of `node`.
    pub fn extract(&mut self, node: &Handle) -> String {
        let children = node.children.borrow().clone();
        self.extract_nodes(&children)
    }

    pub fn extract_nodes(&mut self, nodes: &[Handle]) -> String {
        let mut out = String::new();
        for n in nodes {
            self.walk(n, &mut out);
        }
        normalize_spaces(&out)
    }

    fn walk(&mut self, node: &Handle, out: &mut String) {
        match &node.data {
            NodeData::Text { contents } => {
                let raw = contents.borrow().to_string();
                out.push_str(&escape_text(&collapse_ws(&raw)));
            }
            NodeData::Element { .. } => {
                let Some(tag) = tag_lower(node) else { return };
                match tag.as_str() {
                    "strong" | "b" if self.bold => self.walk_children(node, out),
                    "strong" | "b" => {
                        self.bold = true;
                        let inner = self.inner(node);
                        self.bold = false;
                        out.push_str(&wrap(&inner, "**"));
                    }
                    "em" | "i" if self.italic => self.walk_children(node, out),
                    "em" | "i" => {
                        self.italic = true;
                        let inner = self.inner(node);
                        self.italic = false;
                        out.push_str(&wrap(&inner, "*"));
                    }
                    "code" | "kbd" | "samp" => {
                        let code = collapse_ws(&text_content(node));
                        if !code.is_empty() {
                            out.push('`');
                            out.push_str(&escape_code(&code));
                            out.push('`');
                        }
                    }
                    "a" => {
                        let inner = self.inner(node);
                        let href = attr_get(node, "href").and_then(|h| sanitize_href(&h));
                        match href {
                            Some(h) if !h.starts_with('#') && !inner.trim().is_empty() => {
                                if inner.starts_with(' ') {
                                    out.push(' ');
                                }
                                out.push('[');
                                out.push_str(inner.trim_matches(' '));
                                out.push_str("](");
                                out.push_str(&escape_href(&h));
                                out.push(')');
                                if inner.ends_with(' ') {
                                    out.push(' ');
                                }
                            }
                            _ => out.push_str(&inner),
                        }
                    }
                    "br" => out.push('\n'),
                    "img" => self.images += 1,
                    "script" | "style" | "template" | "ul" | "ol" => {}
                    "p" | "div" => {
                        self.walk_children(node, out);
                        out.push(' ');
                    }
                    _ => self.walk_children(node, out),
                }
            }
            _ => {}
        }
    }

    fn walk_children(&mut self, node: &Handle, out: &mut String) {
        for c in node.children.borrow().iter() {
            self.walk(c, out);
        }
    }

    fn inner(&mut self, node: &Handle) -> String {
        let mut s = String::new();
        self.walk_children(node, &mut s);
        s
    }
}

/// Convenience wrapper when image counts are not needed.
pub fn extract_inline(node: &Handle) -> String {
    InlineExtractor::new().extract(node)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delim {
    Bold,
    Italic,
    Bracket,
}

struct Scanner {
    chars: Vec<char>,
    pos: usize,
}

impl Scanner {
    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn star_run(&self) -> usize {
        self.chars[self.pos..]
            .iter()
            .take_while(|&&c| c == '*')
            .count()
    }

    /// Parses until `close` is consumed (true) or input ends (true only if nothing was open).
    fn parse_into(&mut self, out: &mut Vec<Segment>, style: RunStyle, close: Option<Delim>) -> bool {
        // A closer directly after its opener would make an empty span; never close there.
        let start = self.pos;
        let mut text = String::new();
        while let Some(c) = self.peek(0) {
            match c {
                '\\' if self.peek(1).is_some() => {
                    if let Some(next) = self.peek(1) {
                        text.push(next);
                    }
                    self.pos += 2;
                }
                '\n' => {
                    flush(out, &mut text, style);
                    out.push(Segment::Break);
                    self.pos += 1;
                }
                '*' => {
                    let run = self.star_run();
                    match close {
                        Some(Delim::Italic) if self.pos > start => {
                            flush(out, &mut text, style);
                            if run >= 2 && self.try_span(out, bolded(style), Delim::Bold, 2) {
                                continue;
                            }
                            self.pos += 1;
                            return true;
                        }
                        Some(Delim::Bold) if run >= 2 && self.pos > start => {
                            flush(out, &mut text, style);
                            self.pos += 2;
                            return true;
                        }
                        _ => {}
                    }
                    flush(out, &mut text, style);
                    if run >= 2 && self.try_span(out, bolded(style), Delim::Bold, 2) {
                        continue;
                    }
                    if self.try_span(out, italicized(style), Delim::Italic, 1) {
                        continue;
                    }
                    text.push('*');
                    self.pos += 1;
                }
                '`' => match self.scan_code() {
                    Some(code) => {
                        flush(out, &mut text, style);
                        if !code.is_empty() {
                            out.push(Segment::Text {
                                text: code,
                                style: RunStyle { code: true, ..style },
                            });
                        }
                    }
                    None => {
                        text.push('`');
                        self.pos += 1;
                    }
                },
                '[' => {
                    flush(out, &mut text, style);
                    if !self.try_link(out, style) {
                        text.push('[');
                        self.pos += 1;
                    }
                }
                ']' if close == Some(Delim::Bracket) && self.pos > start => {
                    flush(out, &mut text, style);
                    self.pos += 1;
                    return true;
                }
                _ => {
                    text.push(c);
                    self.pos += 1;
                }
            }
        }
        flush(out, &mut text, style);
        close.is_none()
    }

    fn try_span(&mut self, out: &mut Vec<Segment>, style: RunStyle, delim: Delim, width: usize) -> bool {
        let start = self.pos;
        self.pos += width;
        let mut inner = Vec::new();
        if self.parse_into(&mut inner, style, Some(delim)) {
            out.extend(inner);
            true
        } else {
            self.pos = start;
            false
        }
    }

    fn try_link(&mut self, out: &mut Vec<Segment>, style: RunStyle) -> bool {
        let start = self.pos;
        self.pos += 1;
        let mut inner = Vec::new();
        if !self.parse_into(&mut inner, style, Some(Delim::Bracket)) || self.peek(0) != Some('(') {
            self.pos = start;
            return false;
        }
        self.pos += 1;
        let mut href = String::new();
        loop {
            match self.peek(0) {
                None => {
                    self.pos = start;
                    return false;
                }
                Some('\\') if self.peek(1).is_some() => {
                    if let Some(next) = self.peek(1) {
                        href.push(next);
                    }
                    self.pos += 2;
                }
                Some(')') => {
                    self.pos += 1;
                    break;
                }
                Some(c) => {
                    href.push(c);
                    self.pos += 1;
                }
            }
        }
        for seg in inner {
            out.push(match seg {
                Segment::Text { text, style } => Segment::LinkText {
                    text,
                    style,
                    href: href.clone(),
                },
                other => other,
            });
        }
        true
    }

    fn scan_code(&mut self) -> Option<String> {
        let mut i = self.pos + 1;
        let mut code = String::new();
        while let Some(&c) = self.chars.get(i) {
            match c {
                '\\' if i + 1 < self.chars.len() => {
                    code.push(self.chars[i + 1]);
                    i += 2;
                }
                '`' => {
                    self.pos = i + 1;
                    return Some(code);
                }
                _ => {
                    code.push(c);
                    i += 1;
                }
            }
        }
        None
    }
}

fn bolded(style: RunStyle) -> RunStyle {
    RunStyle { bold: true, ..style }
}

fn italicized(style: RunStyle) -> RunStyle {
    RunStyle { italic: true, ..style }
}

fn flush(out: &mut Vec<Segment>, text: &mut String, style: RunStyle) {
    if !text.is_empty() {
        out.push(Segment::Text {
            text: std::mem::take(text),
            style,
        });
    }
}

/// Merges adjacent segments that share style (and href).
pub fn merge_segments(segments: Vec<Segment>) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::with_capacity(segments.len());
    for seg in segments {
        match (out.last_mut(), seg) {
            (
                Some(Segment::Text { text, style }),
                Segment::Text {
                    text: more,
                    style: s2,
                },
            ) if *style == s2 => text.push_str(&more),
            (
                Some(Segment::LinkText { text, style, href }),
                Segment::LinkText {
                    text: more,
                    style: s2,
                    href: h2,
                },
            ) if *style == s2 && *href == h2 => text.push_str(&more),
            (_, seg) => out.push(seg),
        }
    }
    out
}

/// Single-pass scanner for the inline markup.
pub fn parse_inline(input: &str) -> Vec<Segment> {
    let mut scanner = Scanner {
        chars: input.chars().collect(),
        pos: 0,
    };
    let mut out = Vec::new();
    scanner.parse_into(&mut out, RunStyle::default(), None);
    merge_segments(out)
}

/// Visible text of a markup string.
pub fn plain_text(input: &str) -> String {
    parse_inline(input)
        .into_iter()
        .map(|s| match s {
            Segment::Text { text, .. } | Segment::LinkText { text, .. } => text,
            Segment::Break => "\n".to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{find_element, parse_html};

    fn text(t: &str, bold: bool, italic: bool, code: bool) -> Segment {
        Segment::Text {
            text: t.to_string(),
            style: RunStyle { bold, italic, code },
        }
    }

    fn para_markup(html: &str) -> String {
        let dom = parse_html(html);
        let p = find_element(&dom.document, "p").unwrap();
        extract_inline(&p)
    }

    #[test]
    fn emits_expected_markup() {
        assert_eq!(
            para_markup("<p>This is <strong>bold</strong>.</p>"),
            "This is **bold**."
        );
        assert_eq!(
            para_markup("<p><b>a <i>b</i> c</b></p>"),
            "**a *b* c**"
        );
        assert_eq!(
            para_markup(r##"<p>see <a href="#sec">section</a> or <a href="https://e.com">site</a></p>"##),
            "see section or [site](https://e.com)"
        );
        assert_eq!(para_markup("<p>one<br>two</p>"), "one\ntwo");
        assert_eq!(para_markup("<p>x <em> y </em> z</p>"), "x *y* z");
    }

    #[test]
    fn round_trips_mixed_runs() {
        let markup = para_markup(
            r#"<p>Plain <strong>bold <em>both</em></strong> <code>a*b`c</code> <a href="https://x.y/(z)">link [1]</a> and *stars*<br>end</p>"#,
        );
        let segs = parse_inline(&markup);
        let link = |t: &str| Segment::LinkText {
            text: t.to_string(),
            style: RunStyle::default(),
            href: "https://x.y/(z)".to_string(),
        };
        assert_eq!(
            segs,
            vec![
                text("Plain ", false, false, false),
                text("bold ", true, false, false),
                text("both", true, true, false),
                text(" ", false, false, false),
                text("a*b`c", false, false, true),
                text(" ", false, false, false),
                link("link [1]"),
                text(" and *stars*", false, false, false),
                Segment::Break,
                text("end", false, false, false),
            ]
        );
    }

    #[test]
    fn triple_star_nesting_resolves_both_ways() {
        assert_eq!(parse_inline("***x***"), vec![text("x", true, true, false)]);
        assert_eq!(
            parse_inline("**a *b***"),
            vec![text("a ", true, false, false), text("b", true, true, false)]
        );
        assert_eq!(
            parse_inline("*a **b** c*"),
            vec![
                text("a ", false, true, false),
                text("b", true, true, false),
                text(" c", false, true, false),
            ]
        );
        assert_eq!(parse_inline("*a**b*"), vec![text("ab", false, true, false)]);
    }

    #[test]
    fn unmatched_markup_falls_back_to_literal() {
        assert_eq!(parse_inline("2 * 3"), vec![text("2 * 3", false, false, false)]);
        assert_eq!(parse_inline("**open"), vec![text("**open", false, false, false)]);
        assert_eq!(parse_inline("[x] y"), vec![text("[x] y", false, false, false)]);
        assert_eq!(parse_inline("tick ` only"), vec![text("tick ` only", false, false, false)]);
    }

    #[test]
    fn plain_text_strips_markup() {
        assert_eq!(plain_text("a **b** [c](d) `e`"), "a b c e");
    }

    #[test]
    fn nested_same_emphasis_opens_once() {
        let markup = para_markup("<p><em>a <em>b</em></em></p>");
        assert_eq!(markup, "*a b*");
        assert_eq!(parse_inline(&markup), vec![text("a b", false, true, false)]);

        let markup = para_markup("<p><b>a <b>b</b></b></p>");
        assert_eq!(markup, "**a b**");
        assert_eq!(parse_inline(&markup), vec![text("a b", true, false, false)]);

        let markup = para_markup("<p><i>a <b>b <i>c</i></b></i> d</p>");
        assert_eq!(
            parse_inline(&markup),
            vec![
                text("a ", false, true, false),
                text("b c", true, true, false),
                text(" d", false, false, false),
            ]
        );
    }

    #[test]
    fn link_edge_spaces_stay_outside_the_link() {
        let markup = para_markup(r#"<p>see<a href="https://u"> here</a> now</p>"#);
        assert_eq!(markup, "see [here](https://u) now");
        assert_eq!(plain_text(&markup), "see here now");

        let markup = para_markup(r#"<p><a href="https://u">here </a>now</p>"#);
        assert_eq!(markup, "[here](https://u) now");
        assert_eq!(plain_text(&markup), "here now");
    }

    #[test]
    fn unsafe_links_degrade_to_text() {
        assert_eq!(
            para_markup(r#"<p><a href="javascript:alert(1)">x</a></p>"#),
            "x"
        );
    }
}
