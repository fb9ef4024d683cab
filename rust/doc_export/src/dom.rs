//! Small helpers over the `markup5ever_rcdom` tree.

use crate::error::{Error, Result};
use html5ever::parse_document;
use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{Attribute, LocalName, Namespace, QualName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};
use std::cell::RefCell;
use std::rc::Rc;

pub const SVG_NS: &str = "http://www.w3.org/2000/svg";

/// Parses a document or a bare fragment. Fragments are wrapped in a body first.
pub fn parse_html(input: &str) -> RcDom {
    let wrapped = if input.to_ascii_lowercase().contains("<html") {
        input.to_string()
    } else {
        format!(
            "<!doctype html><html><head><meta charset=\"utf-8\"></head><body>{}</body></html>",
            input
        )
    };
    parse_document(RcDom::default(), Default::default()).one(wrapped)
}

pub fn find_element(node: &Handle, name: &str) -> Option<Handle> {
    if let Some(tag) = tag_lower(node) {
        if tag == name {
            return Some(node.clone());
        }
    }
    for c in node.children.borrow().iter() {
        if let Some(x) = find_element(c, name) {
            return Some(x);
        }
    }
    None
}

/// The `<body>` element, or the document itself when there is none.
pub fn body(dom: &RcDom) -> Handle {
    find_element(&dom.document, "body").unwrap_or_else(|| dom.document.clone())
}

pub fn tag_lower(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.to_string().to_ascii_lowercase()),
        _ => None,
    }
}

pub fn is_element(node: &Handle) -> bool {
    matches!(node.data, NodeData::Element { .. })
}

pub fn attrs_vec(node: &Handle) -> Vec<(String, String)> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .map(|a| (qualified_attr_name(a), a.value.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

pub fn attr_get(node: &Handle, name: &str) -> Option<String> {
    let NodeData::Element { attrs, .. } = &node.data else {
        return None;
    };
    let attrs = attrs.borrow();
    attrs
        .iter()
        .find(|a| qualified_attr_name(a).eq_ignore_ascii_case(name))
        .map(|a| a.value.to_string())
}

pub fn qualified_attr_name(attr: &Attribute) -> String {
    match &attr.name.prefix {
        Some(prefix) => format!("{}:{}", prefix, attr.name.local),
        None => attr.name.local.to_string(),
    }
}

/// Sets an unprefixed attribute, replacing any existing value.
pub fn set_attr(node: &Handle, name: &str, value: &str) {
    let NodeData::Element { attrs, .. } = &node.data else {
        return;
    };
    let mut attrs = attrs.borrow_mut();
    if let Some(existing) = attrs
        .iter_mut()
        .find(|a| a.name.prefix.is_none() && (*a.name.local).eq_ignore_ascii_case(name))
    {
        existing.value = StrTendril::from(value);
        return;
    }
    attrs.push(Attribute {
        name: QualName::new(None, Namespace::from(""), LocalName::from(name)),
        value: StrTendril::from(value),
    });
}

pub fn remove_attr(node: &Handle, name: &str) {
    if let NodeData::Element { attrs, .. } = &node.data {
        attrs
            .borrow_mut()
            .retain(|a| !(a.name.prefix.is_none() && (*a.name.local).eq_ignore_ascii_case(name)));
    }
}

pub fn class_tokens(node: &Handle) -> Vec<String> {
    attr_get(node, "class")
        .map(|c| c.split_whitespace().map(|s| s.to_string()).collect())
        .unwrap_or_default()
}

pub fn has_class(node: &Handle, class: &str) -> bool {
    class_tokens(node).iter().any(|c| c == class)
}

pub fn element_children(node: &Handle) -> Vec<Handle> {
    node.children
        .borrow()
        .iter()
        .filter(|c| is_element(c))
        .cloned()
        .collect()
}

pub fn parent_of(node: &Handle) -> Option<Handle> {
    let weak = node.parent.take();
    let parent = weak.as_ref().and_then(|w| w.upgrade());
    node.parent.set(weak);
    parent
}

/// Ancestors from the nearest parent outwards.
pub fn ancestors(node: &Handle) -> Vec<Handle> {
    let mut out = Vec::new();
    let mut cur = parent_of(node);
    while let Some(p) = cur {
        cur = parent_of(&p);
        out.push(p);
    }
    out
}

/// Topmost ancestor of `node` (the document for attached nodes).
pub fn owner_root(node: &Handle) -> Handle {
    ancestors(node).pop().unwrap_or_else(|| node.clone())
}

pub fn append_child(parent: &Handle, child: Handle) {
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

pub fn child_index(parent: &Handle, child: &Handle) -> Option<usize> {
    parent
        .children
        .borrow()
        .iter()
        .position(|c| Rc::ptr_eq(c, child))
}

/// Swaps `old` for `new` in `parent`'s child list; returns the slot index.
pub fn replace_child(parent: &Handle, old: &Handle, new: Handle) -> Option<usize> {
    let index = child_index(parent, old)?;
    new.parent.set(Some(Rc::downgrade(parent)));
    old.parent.set(None);
    parent.children.borrow_mut()[index] = new;
    Some(index)
}

pub fn remove_child(parent: &Handle, child: &Handle) -> bool {
    let Some(index) = child_index(parent, child) else {
        return false;
    };
    child.parent.set(None);
    parent.children.borrow_mut().remove(index);
    true
}

pub fn new_element(ns: &str, local: &str, attrs: &[(&str, String)]) -> Handle {
    let attrs = attrs
        .iter()
        .map(|(k, v)| Attribute {
            name: QualName::new(None, Namespace::from(""), LocalName::from(*k)),
            value: StrTendril::from(v.as_str()),
        })
        .collect();
    Node::new(NodeData::Element {
        name: QualName::new(None, Namespace::from(ns), LocalName::from(local)),
        attrs: RefCell::new(attrs),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

pub fn new_text(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from(text)),
    })
}

/// Copies a subtree. The copy has no parent.
pub fn deep_clone(node: &Handle) -> Handle {
    let data = match &node.data {
        NodeData::Document => NodeData::Document,
        NodeData::Doctype {
            name,
            public_id,
            system_id,
        } => NodeData::Doctype {
            name: name.clone(),
            public_id: public_id.clone(),
            system_id: system_id.clone(),
        },
        NodeData::Text { contents } => NodeData::Text {
            contents: RefCell::new(contents.borrow().clone()),
        },
        NodeData::Comment { contents } => NodeData::Comment {
            contents: contents.clone(),
        },
        NodeData::Element {
            name,
            attrs,
            template_contents,
            mathml_annotation_xml_integration_point,
        } => NodeData::Element {
            name: name.clone(),
            attrs: RefCell::new(attrs.borrow().clone()),
            template_contents: RefCell::new(template_contents.borrow().as_ref().map(deep_clone)),
            mathml_annotation_xml_integration_point: *mathml_annotation_xml_integration_point,
        },
        NodeData::ProcessingInstruction { target, contents } => {
            NodeData::ProcessingInstruction {
                target: target.clone(),
                contents: contents.clone(),
            }
        }
    };
    let copy = Node::new(data);
    for child in node.children.borrow().iter() {
        append_child(&copy, deep_clone(child));
    }
    copy
}

/// Concatenated descendant text, untouched.
pub fn text_content(node: &Handle) -> String {
    fn walk(node: &Handle, out: &mut String) {
        match &node.data {
            NodeData::Text { contents } => out.push_str(&contents.borrow()),
            _ => {
                for c in node.children.borrow().iter() {
                    walk(c, out);
                }
            }
        }
    }
    let mut out = String::new();
    walk(node, &mut out);
    out
}

pub fn collapse_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_ws = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !in_ws {
                out.push(' ');
                in_ws = true;
            }
        } else {
            out.push(ch);
            in_ws = false;
        }
    }
    out
}

pub fn xml_escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

/// HTML serialization of `node` itself (or of its children for the document node).
pub fn serialize_html(node: &Handle) -> Result<String> {
    let traversal_scope = match node.data {
        NodeData::Document => TraversalScope::ChildrenOnly(None),
        _ => TraversalScope::IncludeNode,
    };
    let opts = SerializeOpts {
        traversal_scope,
        ..Default::default()
    };
    let handle: SerializableHandle = node.clone().into();
    let mut out = Vec::new();
    serialize(&mut out, &handle, opts)?;
    String::from_utf8(out).map_err(|e| Error::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_clone_is_detached_and_equal() {
        let dom = parse_html(r#"<div id="a" class="x y"><p>Hi <b>there</b></p></div>"#);
        let div = find_element(&dom.document, "div").unwrap();
        let copy = deep_clone(&div);
        assert!(parent_of(&copy).is_none());
        assert_eq!(
            serialize_html(&copy).unwrap(),
            serialize_html(&div).unwrap()
        );

        set_attr(&copy, "id", "b");
        assert_eq!(attr_get(&div, "id").as_deref(), Some("a"));
        assert_eq!(attr_get(&copy, "id").as_deref(), Some("b"));
    }

    #[test]
    fn replace_and_restore_child() {
        let dom = parse_html("<div><span>one</span></div>");
        let div = find_element(&dom.document, "div").unwrap();
        let span = find_element(&div, "span").unwrap();
        let before = serialize_html(&div).unwrap();

        let other = new_element("http://www.w3.org/1999/xhtml", "em", &[]);
        assert_eq!(replace_child(&div, &span, other.clone()), Some(0));
        assert!(parent_of(&span).is_none());
        assert_ne!(serialize_html(&div).unwrap(), before);

        replace_child(&div, &other, span.clone());
        assert_eq!(serialize_html(&div).unwrap(), before);
        assert!(Rc::ptr_eq(&parent_of(&span).unwrap(), &div));
    }

    #[test]
    fn class_and_text_helpers() {
        let dom = parse_html(r#"<div class=" diagram  big ">a <i>b</i>  c</div>"#);
        let div = find_element(&dom.document, "div").unwrap();
        assert!(has_class(&div, "diagram"));
        assert!(!has_class(&div, "dia"));
        assert_eq!(collapse_ws(&text_content(&div)), "a b c");
    }

    #[test]
    fn attribute_updates_ignore_case() {
        let dom = parse_html(r#"<svg viewBox="0 0 1 1"></svg>"#);
        let svg = find_element(&dom.document, "svg").unwrap();
        set_attr(&svg, "viewbox", "0 0 2 2");
        assert_eq!(attrs_vec(&svg), vec![("viewBox".to_string(), "0 0 2 2".to_string())]);
        remove_attr(&svg, "VIEWBOX");
        assert!(attr_get(&svg, "viewBox").is_none());
    }
}
