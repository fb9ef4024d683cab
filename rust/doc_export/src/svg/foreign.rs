//! Replaces `<foreignObject>` labels with native SVG text.

use super::{format_number, parse_length};
use crate::dom::{
    append_child, attr_get, collapse_ws, new_element, new_text, parent_of, remove_child,
    replace_child, tag_lower, SVG_NS,
};
use markup5ever_rcdom::{Handle, NodeData};

const DEFAULT_FONT_SIZE: f64 = 14.0;
const DEFAULT_FONT_FAMILY: &str = "Arial, sans-serif";
const DEFAULT_FONT_WEIGHT: &str = "normal";
const DEFAULT_FILL: &str = "#333";
const LINE_HEIGHT: f64 = 1.2;

const BLOCK_TAGS: &[&str] = &[
    "div", "p", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "table", "section",
    "blockquote", "pre",
];

#[derive(Debug, Clone, PartialEq)]
struct Font {
    size: f64,
    family: String,
    weight: String,
    fill: String,
}

/// Substitutes every foreign object under `svg`; returns how many were replaced with text.
pub fn substitute_foreign_objects(svg: &Handle) -> usize {
    let mut found = Vec::new();
    find_foreign(svg, &mut found);
    let mut replaced = 0;
    for fo in found {
        let Some(parent) = parent_of(&fo) else {
            continue;
        };
        let lines = text_lines(&fo);
        if lines.is_empty() {
            remove_child(&parent, &fo);
            continue;
        }
        let text = native_text(&fo, &lines, &font_of(&fo));
        if replace_child(&parent, &fo, text).is_some() {
            replaced += 1;
        }
    }
    replaced
}

fn find_foreign(node: &Handle, out: &mut Vec<Handle>) {
    if tag_lower(node).as_deref() == Some("foreignobject") {
        out.push(node.clone());
        return;
    }
    for c in node.children.borrow().iter() {
        find_foreign(c, out);
    }
}

/// Non-empty lines; block elements and `<br>` separate lines.
fn text_lines(node: &Handle) -> Vec<String> {
    fn walk(node: &Handle, out: &mut String) {
        match &node.data {
            NodeData::Text { contents } => out.push_str(&collapse_ws(&contents.borrow())),
            NodeData::Element { .. } => {
                let tag = tag_lower(node).unwrap_or_default();
                if tag == "br" {
                    out.push('\n');
                    return;
                }
                if matches!(tag.as_str(), "style" | "script") {
                    return;
                }
                let block = BLOCK_TAGS.contains(&tag.as_str());
                if block {
                    out.push('\n');
                }
                for c in node.children.borrow().iter() {
                    walk(c, out);
                }
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
    let mut raw = String::new();
    walk(node, &mut raw);
    raw.lines()
        .map(|l| collapse_ws(l).trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

fn font_of(node: &Handle) -> Font {
    let mut size = None;
    let mut family = None;
    let mut weight = None;
    let mut fill = None;
    let mut stack = vec![node.clone()];
    while let Some(n) = stack.pop() {
        if let Some(style) = attr_get(&n, "style") {
            for decl in style.split(';') {
                let Some((prop, value)) = decl.split_once(':') else {
                    continue;
                };
                let value = value.trim().trim_end_matches("!important").trim();
                if value.is_empty() {
                    continue;
                }
                match prop.trim().to_ascii_lowercase().as_str() {
                    "font-size" => size = size.or_else(|| parse_length(value)),
                    "font-family" => family = family.or_else(|| Some(value.to_string())),
                    "font-weight" => weight = weight.or_else(|| Some(value.to_string())),
                    "color" | "fill" => fill = fill.or_else(|| Some(value.to_string())),
                    _ => {}
                }
            }
        }
        let children = n.children.borrow();
        stack.extend(children.iter().rev().cloned());
    }
    Font {
        size: size.filter(|s| *s > 0.0).unwrap_or(DEFAULT_FONT_SIZE),
        family: family.unwrap_or_else(|| DEFAULT_FONT_FAMILY.to_string()),
        weight: weight.unwrap_or_else(|| DEFAULT_FONT_WEIGHT.to_string()),
        fill: fill.unwrap_or_else(|| DEFAULT_FILL.to_string()),
    }
}

fn native_text(fo: &Handle, lines: &[String], font: &Font) -> Handle {
    let num = |name: &str| attr_get(fo, name).and_then(|v| parse_length(&v)).unwrap_or(0.0);
    let cx = num("x") + num("width") / 2.0;
    let cy = num("y") + num("height") / 2.0;
    let step = font.size * LINE_HEIGHT;
    let first = cy - step * (lines.len() as f64 - 1.0) / 2.0;

    let text = new_element(
        SVG_NS,
        "text",
        &[
            ("x", format_number(cx)),
            ("y", format_number(cy)),
            ("text-anchor", "middle".to_string()),
            ("dominant-baseline", "central".to_string()),
            ("font-size", format_number(font.size)),
            ("font-family", font.family.clone()),
            ("font-weight", font.weight.clone()),
            ("fill", font.fill.clone()),
        ],
    );
    for (i, line) in lines.iter().enumerate() {
        let tspan = new_element(
            SVG_NS,
            "tspan",
            &[
                ("x", format_number(cx)),
                ("y", format_number(first + step * i as f64)),
            ],
        );
        append_child(&tspan, new_text(line));
        append_child(&text, tspan);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{attrs_vec, element_children, find_element, parse_html, text_content};

    #[test]
    fn multi_line_label_becomes_centered_tspans() {
        let dom = parse_html(
            r#"<svg><g><foreignObject x="10" y="20" width="100" height="40"><div style="font-size: 10px; color: red"><span>Line one</span><br>Line <b>two</b></div></foreignObject></g></svg>"#,
        );
        let svg = find_element(&dom.document, "svg").unwrap();
        assert_eq!(substitute_foreign_objects(&svg), 1);
        assert!(find_element(&svg, "foreignobject").is_none());

        let text = find_element(&svg, "text").unwrap();
        let attrs = attrs_vec(&text);
        assert!(attrs.contains(&("x".to_string(), "60".to_string())));
        assert!(attrs.contains(&("fill".to_string(), "red".to_string())));
        assert!(attrs.contains(&("font-size".to_string(), "10".to_string())));

        let spans = element_children(&text);
        assert_eq!(spans.len(), 2);
        assert_eq!(text_content(&spans[0]), "Line one");
        assert_eq!(text_content(&spans[1]), "Line two");
        assert_eq!(attr_get(&spans[0], "y").as_deref(), Some("34"));
        assert_eq!(attr_get(&spans[1], "y").as_deref(), Some("46"));
    }

    #[test]
    fn empty_label_is_dropped_and_defaults_apply() {
        let dom = parse_html(
            r#"<svg><foreignObject width="10" height="10"><div> </div></foreignObject><foreignObject width="50" height="20"><p>Hi</p></foreignObject></svg>"#,
        );
        let svg = find_element(&dom.document, "svg").unwrap();
        assert_eq!(substitute_foreign_objects(&svg), 1);
        let children = element_children(&svg);
        assert_eq!(children.len(), 1);
        assert_eq!(attr_get(&children[0], "font-size").as_deref(), Some("14"));
        assert_eq!(attr_get(&children[0], "fill").as_deref(), Some("#333"));
        assert_eq!(attr_get(&children[0], "font-family").as_deref(), Some("Arial, sans-serif"));
    }
}
