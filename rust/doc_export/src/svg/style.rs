//! A small CSS cascade for SVG presentation properties.
//!
//! Covers what diagram renderers emit: type, `*`, `#id`, `.class`, `[attr]` and
//! `[attr=value]` compounds joined by descendant or child combinators. Selectors
//! with anything else (pseudo-classes, sibling combinators) are ignored.

use crate::dom::{attr_get, class_tokens, is_element, parent_of, tag_lower, text_content};
use markup5ever_rcdom::Handle;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// Property name -> resolved value.
pub type Presentation = BTreeMap<String, String>;

pub const SHAPE_PROPERTIES: &[&str] = &[
    "fill",
    "stroke",
    "stroke-width",
    "stroke-dasharray",
    "stroke-linecap",
    "stroke-linejoin",
    "opacity",
    "fill-opacity",
    "stroke-opacity",
    "marker-start",
    "marker-mid",
    "marker-end",
];

pub const TEXT_PROPERTIES: &[&str] = &[
    "font-size",
    "font-family",
    "font-weight",
    "font-style",
    "text-anchor",
    "dominant-baseline",
];

const INHERITED: &[&str] = &[
    "fill",
    "stroke",
    "stroke-width",
    "stroke-dasharray",
    "stroke-linecap",
    "stroke-linejoin",
    "fill-opacity",
    "stroke-opacity",
    "marker-start",
    "marker-mid",
    "marker-end",
    "color",
    "font-size",
    "font-family",
    "font-weight",
    "font-style",
    "text-anchor",
];

fn is_tracked(property: &str) -> bool {
    property == "color" || SHAPE_PROPERTIES.contains(&property) || TEXT_PROPERTIES.contains(&property)
}

#[derive(Debug, Clone, PartialEq)]
struct Declaration {
    property: String,
    value: String,
    important: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, Option<String>)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

/// Compounds left to right; each combinator links a compound to the one before it.
#[derive(Debug, Clone, PartialEq)]
struct Selector {
    parts: Vec<(Combinator, Compound)>,
}

#[derive(Debug, Clone)]
struct Rule {
    selector: Selector,
    specificity: (u32, u32, u32),
    order: usize,
    declarations: Rc<Vec<Declaration>>,
}

#[derive(Debug, Clone, Default)]
pub struct StyleSheet {
    rules: Vec<Rule>,
}

impl StyleSheet {
    /// Gathers every `<style>` element under `root`, in document order.
    pub fn from_document(root: &Handle) -> Self {
        let mut css = String::new();
        collect_style_text(root, &mut css);
        Self::parse(&css)
    }

    pub fn parse(css: &str) -> Self {
        let css = strip_comments(css);
        let mut rules = Vec::new();
        let mut rest = css.as_str();
        while let Some(open) = rest.find('{') {
            let prelude = rest[..open].trim();
            let Some(len) = block_len(&rest[open..]) else {
                break;
            };
            let body = &rest[open + 1..open + len - 1];
            rest = &rest[open + len..];

            // Statement at-rules (`@import ...;`) may precede the prelude.
            let prelude = prelude.rsplit(';').next().unwrap_or(prelude).trim();
            if prelude.starts_with('@') || prelude.is_empty() {
                continue;
            }
            let declarations: Vec<Declaration> = parse_declarations(body)
                .into_iter()
                .filter(|d| is_tracked(&d.property))
                .collect();
            if declarations.is_empty() {
                continue;
            }
            let declarations = Rc::new(declarations);
            for text in prelude.split(',') {
                let Some(selector) = parse_selector(text) else {
                    continue;
                };
                rules.push(Rule {
                    specificity: specificity(&selector),
                    selector,
                    order: rules.len(),
                    declarations: Rc::clone(&declarations),
                });
            }
        }
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn matching(&self, node: &Handle) -> Vec<&Rule> {
        let mut out: Vec<&Rule> = self
            .rules
            .iter()
            .filter(|r| matches_selector(&r.selector.parts, node))
            .collect();
        out.sort_by_key(|r| (r.specificity, r.order));
        out
    }
}

fn collect_style_text(node: &Handle, out: &mut String) {
    if tag_lower(node).as_deref() == Some("style") {
        out.push_str(&text_content(node));
        out.push('\n');
        return;
    }
    for c in node.children.borrow().iter() {
        collect_style_text(c, out);
    }
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

/// Length of the balanced `{...}` block at the start of `s`, braces included.
fn block_len(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, ch) in s.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_declarations(body: &str) -> Vec<Declaration> {
    body.split(';')
        .filter_map(|decl| {
            let (property, value) = decl.split_once(':')?;
            let property = property.trim().to_ascii_lowercase();
            let mut value = value.trim();
            let mut important = false;
            if let Some(bang) = value.rfind('!') {
                if value[bang + 1..].trim().eq_ignore_ascii_case("important") {
                    important = true;
                    value = value[..bang].trim_end();
                }
            }
            if property.is_empty() || value.is_empty() {
                return None;
            }
            Some(Declaration {
                property,
                value: value.to_string(),
                important,
            })
        })
        .collect()
}

fn parse_selector(text: &str) -> Option<Selector> {
    let spaced = text.replace('>', " > ");
    let mut parts = Vec::new();
    let mut combinator = Combinator::Descendant;
    for token in spaced.split_whitespace() {
        if token == ">" {
            if parts.is_empty() {
                return None;
            }
            combinator = Combinator::Child;
            continue;
        }
        parts.push((combinator, parse_compound(token)?));
        combinator = Combinator::Descendant;
    }
    if parts.is_empty() || combinator == Combinator::Child {
        return None;
    }
    Some(Selector { parts })
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn parse_compound(token: &str) -> Option<Compound> {
    let chars: Vec<char> = token.chars().collect();
    let mut compound = Compound::default();
    let mut i = 0;
    let ident = |i: &mut usize| -> String {
        let start = *i;
        while *i < chars.len() && is_ident_char(chars[*i]) {
            *i += 1;
        }
        chars[start..*i].iter().collect()
    };
    if i < chars.len() && chars[i] == '*' {
        i += 1;
    } else if i < chars.len() && is_ident_char(chars[i]) {
        compound.tag = Some(ident(&mut i).to_ascii_lowercase());
    }
    while i < chars.len() {
        match chars[i] {
            '#' => {
                i += 1;
                let id = ident(&mut i);
                if id.is_empty() {
                    return None;
                }
                compound.id = Some(id);
            }
            '.' => {
                i += 1;
                let class = ident(&mut i);
                if class.is_empty() {
                    return None;
                }
                compound.classes.push(class);
            }
            '[' => {
                let close = chars[i..].iter().position(|&c| c == ']')? + i;
                let inner: String = chars[i + 1..close].iter().collect();
                let attr = match inner.split_once('=') {
                    Some((name, value)) => {
                        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
                        (name.trim().to_ascii_lowercase(), Some(value.to_string()))
                    }
                    None => (inner.trim().to_ascii_lowercase(), None),
                };
                if attr.0.is_empty() || !attr.0.chars().all(|c| is_ident_char(c) || c == ':') {
                    return None;
                }
                compound.attrs.push(attr);
                i = close + 1;
            }
            _ => return None,
        }
    }
    Some(compound)
}

fn specificity(selector: &Selector) -> (u32, u32, u32) {
    selector
        .parts
        .iter()
        .fold((0, 0, 0), |(a, b, c), (_, part)| {
            (
                a + u32::from(part.id.is_some()),
                b + (part.classes.len() + part.attrs.len()) as u32,
                c + u32::from(part.tag.is_some()),
            )
        })
}

fn matches_compound(compound: &Compound, node: &Handle) -> bool {
    let Some(tag) = tag_lower(node) else {
        return false;
    };
    if compound.tag.as_ref().is_some_and(|t| *t != tag) {
        return false;
    }
    if let Some(id) = &compound.id {
        if attr_get(node, "id").as_deref() != Some(id.as_str()) {
            return false;
        }
    }
    if !compound.classes.is_empty() {
        let classes = class_tokens(node);
        if !compound.classes.iter().all(|c| classes.contains(c)) {
            return false;
        }
    }
    compound.attrs.iter().all(|(name, value)| match (attr_get(node, name), value) {
        (Some(actual), Some(expected)) => actual == *expected,
        (Some(_), None) => true,
        (None, _) => false,
    })
}

fn matches_selector(parts: &[(Combinator, Compound)], node: &Handle) -> bool {
    let Some(((combinator, last), rest)) = parts.split_last() else {
        return true;
    };
    if !matches_compound(last, node) {
        return false;
    }
    if rest.is_empty() {
        return true;
    }
    match combinator {
        Combinator::Child => parent_of(node)
            .filter(is_element)
            .is_some_and(|p| matches_selector(rest, &p)),
        Combinator::Descendant => {
            let mut cur = parent_of(node);
            while let Some(p) = cur {
                if is_element(&p) && matches_selector(rest, &p) {
                    return true;
                }
                cur = parent_of(&p);
            }
            false
        }
    }
}

/// Memoizing resolver from live elements to presentation values.
pub struct StyleResolver<'a> {
    sheet: &'a StyleSheet,
    computed: HashMap<usize, (Handle, Rc<Presentation>)>,
}

impl<'a> StyleResolver<'a> {
    pub fn new(sheet: &'a StyleSheet) -> Self {
        Self {
            sheet,
            computed: HashMap::new(),
        }
    }

    /// Fully cascaded values, including those inherited from ancestors.
    pub fn computed(&mut self, node: &Handle) -> Rc<Presentation> {
        let key = Rc::as_ptr(node) as usize;
        if let Some((_, cached)) = self.computed.get(&key) {
            return Rc::clone(cached);
        }
        let parent = parent_of(node)
            .filter(is_element)
            .map(|p| self.computed(&p));
        let resolved = Rc::new(self.cascade(node, parent.as_deref()));
        self.computed.insert(key, (node.clone(), Rc::clone(&resolved)));
        resolved
    }

    /// Values declared on the element itself, without inheritance.
    pub fn declared(&self, node: &Handle) -> Presentation {
        self.cascade(node, None)
    }

    fn cascade(&self, node: &Handle, parent: Option<&Presentation>) -> Presentation {
        let mut out = Presentation::new();
        if let Some(parent) = parent {
            for prop in INHERITED {
                if let Some(v) = parent.get(*prop) {
                    out.insert(prop.to_string(), v.clone());
                }
            }
        }
        for prop in SHAPE_PROPERTIES.iter().chain(TEXT_PROPERTIES).chain(&["color"]) {
            if let Some(v) = attr_get(node, prop) {
                out.insert(prop.to_string(), v.trim().to_string());
            }
        }

        let rules = self.sheet.matching(node);
        let inline: Vec<Declaration> = attr_get(node, "style")
            .map(|s| parse_declarations(&s))
            .unwrap_or_default()
            .into_iter()
            .filter(|d| is_tracked(&d.property))
            .collect();
        let ordered = rules
            .iter()
            .flat_map(|r| r.declarations.iter())
            .chain(inline.iter());
        let (important, normal): (Vec<&Declaration>, Vec<&Declaration>) =
            ordered.partition(|d| d.important);
        for d in normal.into_iter().chain(important) {
            out.insert(d.property.clone(), d.value.clone());
        }

        out.retain(|prop, value| {
            if value.eq_ignore_ascii_case("inherit") {
                match parent.and_then(|p| p.get(prop)) {
                    Some(v) => *value = v.clone(),
                    None => return false,
                }
            }
            !matches!(value.to_ascii_lowercase().as_str(), "initial" | "unset")
        });
        let color = out.get("color").cloned().unwrap_or_else(|| "black".to_string());
        for value in out.values_mut() {
            if value.eq_ignore_ascii_case("currentcolor") {
                *value = color.clone();
            }
        }
        out
    }
}
