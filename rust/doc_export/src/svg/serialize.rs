//! Standalone SVG serialization and post-serialization fix-ups.

use crate::dom::qualified_attr_name;
use lazy_static::lazy_static;
use markup5ever_rcdom::{Handle, NodeData};
use regex::{Captures, Regex};

const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
const SVG_NS: &str = crate::dom::SVG_NS;

lazy_static! {
    static ref DASH_ATTR: Regex = Regex::new(r#"stroke-dasharray="([^"]*)""#).unwrap();
    static ref DASH_STYLE: Regex =
        Regex::new(r#"stroke-dasharray\s*:\s*([^;"]*?)\s*(;|"|$)"#).unwrap();
}

fn esc_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn esc_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

fn is_namespace_decl(name: &str) -> bool {
    name == "xmlns" || name.starts_with("xmlns:")
}

/// Serializes `root` as a standalone XML document fragment with its namespaces declared.
pub fn to_svg_string(root: &Handle) -> String {
    let mut out = String::new();
    serialize_node(&mut out, root, None);
    out
}

fn serialize_node(out: &mut String, node: &Handle, parent_ns: Option<&str>) {
    match &node.data {
        NodeData::Text { contents } => out.push_str(&esc_text(&contents.borrow())),
        NodeData::Element { name, attrs, .. } => {
            let ns: &str = &name.ns;
            out.push('<');
            out.push_str(&name.local);
            match parent_ns {
                None => {
                    out.push_str(&format!(" xmlns=\"{}\" xmlns:xlink=\"{}\"", SVG_NS, XLINK_NS));
                }
                Some(p) if p != ns && !ns.is_empty() => {
                    out.push_str(&format!(" xmlns=\"{}\"", esc_attr(ns)));
                }
                _ => {}
            }
            for attr in attrs.borrow().iter() {
                let key = qualified_attr_name(attr);
                if is_namespace_decl(&key) {
                    continue;
                }
                out.push(' ');
                out.push_str(&key);
                out.push_str("=\"");
                out.push_str(&esc_attr(&attr.value));
                out.push('"');
            }
            let children = node.children.borrow();
            let has_content = children
                .iter()
                .any(|c| matches!(c.data, NodeData::Text { .. } | NodeData::Element { .. }));
            if !has_content {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for c in children.iter() {
                serialize_node(out, c, Some(ns));
            }
            out.push_str("</");
            out.push_str(&name.local);
            out.push('>');
        }
        _ => {}
    }
}

/// True when every length in a dash list is numerically zero (`0`, `0.0`, `.0`, `0em`, ...).
fn is_zero_dash_list(value: &str) -> bool {
    let mut lengths = value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .peekable();
    if lengths.peek().is_none() {
        return false;
    }
    lengths.all(|t| {
        let number = t.trim_end_matches(|c: char| c.is_ascii_alphabetic() || c == '%');
        matches!(number.parse::<f64>(), Ok(n) if n == 0.0)
    })
}

/// Rewrites all-zero dash patterns to `none`, in attributes and inline styles.
pub fn fix_dash_arrays(markup: &str) -> String {
    let fixed = DASH_ATTR.replace_all(markup, |caps: &Captures| {
        if is_zero_dash_list(&caps[1]) {
            r#"stroke-dasharray="none""#.to_string()
        } else {
            caps[0].to_string()
        }
    });
    DASH_STYLE
        .replace_all(&fixed, |caps: &Captures| {
            if is_zero_dash_list(&caps[1]) {
                format!("stroke-dasharray: none{}", &caps[2])
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{find_element, parse_html};

    #[test]
    fn declares_namespaces_and_self_closes_empty_elements() {
        let dom = parse_html(
            r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10"><use xlink:href="#a"></use><text>a &lt; b</text></svg>"##,
        );
        let svg = find_element(&dom.document, "svg").unwrap();
        let out = to_svg_string(&svg);
        assert!(out.starts_with(
            r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" viewBox="0 0 10 10">"#
        ));
        assert_eq!(out.matches("xmlns=").count(), 1);
        assert!(out.contains(r##"<use xlink:href="#a"/>"##));
        assert!(out.contains("<text>a &lt; b</text>"));
    }

    #[test]
    fn zero_dash_patterns_become_none() {
        let input = r#"<path stroke-dasharray="0"/><path stroke-dasharray="0 0"/><path stroke-dasharray="0px,0"/><path style="fill:red;stroke-dasharray: 0;stroke:blue"/><path style="stroke-dasharray:0"/><path stroke-dasharray="0.5"/><path stroke-dasharray="0 4"/>"#;
        let out = fix_dash_arrays(input);
        assert!(!out.contains(r#"stroke-dasharray="0""#));
        assert!(!out.contains(r#"stroke-dasharray="0 0""#));
        assert!(!out.contains(r#"stroke-dasharray="0px,0""#));
        assert!(out.contains("fill:red;stroke-dasharray: none;stroke:blue"));
        assert!(out.contains(r#"style="stroke-dasharray: none""#));
        assert!(out.contains(r#"stroke-dasharray="0.5""#));
        assert!(out.contains(r#"stroke-dasharray="0 4""#));
    }

    #[test]
    fn numerically_zero_dash_values_count_as_zero() {
        for value in ["0.0", "0.00", "00", ".0", "0em", "0, 0.0", "0% 0"] {
            let out = fix_dash_arrays(&format!(r#"<path stroke-dasharray="{value}"/>"#));
            assert_eq!(out, r#"<path stroke-dasharray="none"/>"#, "attribute {value}");
            let out = fix_dash_arrays(&format!(r#"<path style="stroke-dasharray: {value}"/>"#));
            assert_eq!(out, r#"<path style="stroke-dasharray: none"/>"#, "style {value}");
        }
        for value in ["0.01", "none", "", "0 1e1"] {
            let markup = format!(r#"<path stroke-dasharray="{value}"/>"#);
            assert_eq!(fix_dash_arrays(&markup), markup, "kept {value}");
        }
    }
}
