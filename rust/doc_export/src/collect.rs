//! Walks a rendered HTML subtree into the content model.
//!
//! Collection never fails: anything that cannot be classified is skipped.

use crate::dom::{
    attr_get, class_tokens, collapse_ws, element_children, find_element, has_class, tag_lower,
    text_content,
};
use crate::inline::{plain_text, InlineExtractor};
use crate::model::{Attributes, CollectedContent, Content, ContentNode, Metadata, NodeKind, UNTITLED};
use crate::options::ContainerPolicy;
use crate::svg::{find_diagrams, DIAGRAM_CLASS};
use chrono::Utc;
use markup5ever_rcdom::{Handle, NodeData};
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, Default)]
pub struct ContentCollector {
    policy: ContainerPolicy,
}

impl ContentCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: ContainerPolicy) -> Self {
        Self { policy }
    }

    /// Collects the direct children of `root`. The tree is not mutated.
    pub fn collect(&self, root: &Handle) -> CollectedContent {
        let diagram_ids = find_diagrams(root)
            .into_iter()
            .map(|d| (Rc::as_ptr(&d.container) as usize, d.id))
            .collect();
        let mut walk = Walk {
            policy: self.policy,
            inline: InlineExtractor::new(),
            diagram_ids,
        };
        let nodes = walk.children(root);

        let title = first_title(&nodes).unwrap_or_else(|| UNTITLED.to_string());
        let metadata = Metadata {
            word_count: word_count(&nodes),
            image_count: walk.inline.images,
            diagram_count: count_kind(&nodes, NodeKind::Diagram),
            collected_at: Utc::now(),
        };
        log::debug!(
            "collected {} top-level nodes ({} words, {} diagrams)",
            nodes.len(),
            metadata.word_count,
            metadata.diagram_count
        );
        CollectedContent {
            title,
            nodes,
            metadata,
        }
    }
}

struct Walk {
    policy: ContainerPolicy,
    inline: InlineExtractor,
    /// Container pointer -> resolved diagram id.
    diagram_ids: HashMap<usize, String>,
}

impl Walk {
    fn children(&mut self, node: &Handle) -> Vec<ContentNode> {
        element_children(node)
            .iter()
            .flat_map(|c| self.dispatch(c))
            .collect()
    }

    fn dispatch(&mut self, node: &Handle) -> Vec<ContentNode> {
        let Some(tag) = tag_lower(node) else {
            return Vec::new();
        };
        if has_class(node, DIAGRAM_CLASS) {
            return self.diagram(node).into_iter().collect();
        }
        match tag.as_str() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => vec![heading(node, &tag)],
            "p" => self.paragraph(node).into_iter().collect(),
            "ul" | "ol" => vec![self.list(node, tag == "ol")],
            "pre" => vec![code(node)],
            "table" => self.table(node).into_iter().collect(),
            "blockquote" => vec![self.blockquote(node)],
            "hr" => vec![ContentNode::new(NodeKind::Rule, Content::Empty)],
            "script" | "style" | "template" | "noscript" | "head" | "svg" | "img" => Vec::new(),
            _ if element_children(node).is_empty() => Vec::new(),
            _ => self.container(node),
        }
    }

    fn container(&mut self, node: &Handle) -> Vec<ContentNode> {
        let found = self.children(node);
        match (found.len(), self.policy) {
            (1, _) => found,
            (0, _) | (_, ContainerPolicy::Splice) => {
                if !found.is_empty() {
                    log::debug!(
                        "dropping <{}> wrapper with {} blocks",
                        tag_lower(node).unwrap_or_default(),
                        found.len()
                    );
                }
                Vec::new()
            }
            (_, ContainerPolicy::Group) => {
                vec![ContentNode::new(NodeKind::Group, Content::Empty).with_children(found)]
            }
        }
    }

    fn paragraph(&mut self, node: &Handle) -> Option<ContentNode> {
        let markup = self.inline.extract(node);
        if markup.trim().is_empty() {
            return None;
        }
        Some(ContentNode::new(NodeKind::Paragraph, Content::Text(markup)))
    }

    fn list(&mut self, node: &Handle, ordered: bool) -> ContentNode {
        let items = element_children(node)
            .iter()
            .filter(|c| tag_lower(c).as_deref() == Some("li"))
            .map(|li| self.list_item(li))
            .collect();
        ContentNode::new(NodeKind::List, Content::Nodes(items)).with_attributes(Attributes {
            ordered: Some(ordered),
            ..Default::default()
        })
    }

    fn list_item(&mut self, li: &Handle) -> ContentNode {
        let markup = self.inline.extract(li);
        let nested = nested_lists(li)
            .iter()
            .map(|l| {
                let ordered = tag_lower(l).as_deref() == Some("ol");
                self.list(l, ordered)
            })
            .collect();
        ContentNode::new(NodeKind::Paragraph, Content::Text(markup)).with_children(nested)
    }

    fn table(&mut self, node: &Handle) -> Option<ContentNode> {
        let mut head = Vec::new();
        let mut body = Vec::new();
        for section in element_children(node) {
            match tag_lower(&section).as_deref() {
                Some("thead") => head.extend(rows_of(&section)),
                Some("tbody") | Some("tfoot") => body.extend(rows_of(&section)),
                Some("tr") => body.push(section),
                _ => {}
            }
        }
        let mut rows: Vec<Vec<String>> = head
            .iter()
            .chain(body.iter())
            .map(|tr| {
                element_children(tr)
                    .iter()
                    .filter(|c| matches!(tag_lower(c).as_deref(), Some("td") | Some("th")))
                    .map(|cell| self.inline.extract(cell))
                    .collect()
            })
            .collect();
        let cols = rows.iter().map(Vec::len).max().unwrap_or(0);
        if rows.is_empty() || cols == 0 {
            return None;
        }
        for row in rows.iter_mut() {
            row.resize(cols, String::new());
        }
        let attributes = Attributes {
            rows: Some(rows.len()),
            cols: Some(cols),
            ..Default::default()
        };
        Some(ContentNode::new(NodeKind::Table, Content::Rows(rows)).with_attributes(attributes))
    }

    fn blockquote(&mut self, node: &Handle) -> ContentNode {
        let mut children = Vec::new();
        let mut loose: Vec<Handle> = Vec::new();
        for child in node.children.borrow().iter() {
            let block = match &child.data {
                NodeData::Element { .. } => !is_inline(child),
                _ => false,
            };
            if block {
                self.flush_loose(&mut loose, &mut children);
                children.extend(self.dispatch(child));
            } else {
                loose.push(child.clone());
            }
        }
        self.flush_loose(&mut loose, &mut children);
        ContentNode::new(NodeKind::Blockquote, Content::Empty).with_children(children)
    }

    /// Bare text and inline elements directly inside a quote form an implicit paragraph.
    fn flush_loose(&mut self, loose: &mut Vec<Handle>, out: &mut Vec<ContentNode>) {
        let markup = self.inline.extract_nodes(loose);
        loose.clear();
        if !markup.trim().is_empty() {
            out.push(ContentNode::new(NodeKind::Paragraph, Content::Text(markup)));
        }
    }

    fn diagram(&mut self, node: &Handle) -> Option<ContentNode> {
        let id = self.diagram_ids.get(&(Rc::as_ptr(node) as usize))?.clone();
        let graphic = find_element(node, "svg");
        let dim = |name: &str| graphic.as_ref().and_then(|g| attr_get(g, name));
        let attributes = Attributes {
            id: Some(id),
            width: dim("width"),
            height: dim("height"),
            ..Default::default()
        };
        Some(ContentNode::new(NodeKind::Diagram, Content::Empty).with_attributes(attributes))
    }
}

fn heading(node: &Handle, tag: &str) -> ContentNode {
    let level = tag[1..].parse::<u8>().unwrap_or(1);
    let text = collapse_ws(&text_content(node)).trim().to_string();
    ContentNode::new(NodeKind::Heading, Content::Text(text)).with_attributes(Attributes {
        level: Some(level),
        anchor: attr_get(node, "id"),
        ..Default::default()
    })
}

fn code(pre: &Handle) -> ContentNode {
    let inner = element_children(pre)
        .into_iter()
        .find(|c| tag_lower(c).as_deref() == Some("code"));
    let language = inner
        .iter()
        .chain(std::iter::once(pre))
        .flat_map(class_tokens)
        .find_map(|c| {
            c.strip_prefix("language-")
                .or_else(|| c.strip_prefix("lang-"))
                .map(str::to_string)
        })
        .unwrap_or_default();
    let mut text = text_content(pre);
    if text.ends_with('\n') {
        text.pop();
        if text.ends_with('\r') {
            text.pop();
        }
    }
    ContentNode::new(NodeKind::Code, Content::Text(text)).with_attributes(Attributes {
        language: Some(language),
        ..Default::default()
    })
}

fn rows_of(section: &Handle) -> Vec<Handle> {
    element_children(section)
        .into_iter()
        .filter(|c| tag_lower(c).as_deref() == Some("tr"))
        .collect()
}

/// Lists nested in an item, directly or through wrappers like `<p>` or `<div>`.
fn nested_lists(li: &Handle) -> Vec<Handle> {
    let mut out = Vec::new();
    for c in element_children(li) {
        match tag_lower(&c).as_deref() {
            Some("ul") | Some("ol") => out.push(c),
            Some("p") | Some("div") => out.extend(nested_lists(&c)),
            _ => {}
        }
    }
    out
}

fn is_inline(node: &Handle) -> bool {
    matches!(
        tag_lower(node).as_deref(),
        Some(
            "a" | "abbr" | "b" | "br" | "code" | "em" | "i" | "img" | "kbd" | "mark" | "s"
                | "samp" | "small" | "span" | "strong" | "sub" | "sup" | "u"
        )
    )
}

fn first_title(nodes: &[ContentNode]) -> Option<String> {
    for n in nodes {
        match n.kind() {
            NodeKind::Heading if n.attributes.level == Some(1) && !n.text().is_empty() => {
                return Some(n.text().to_string());
            }
            NodeKind::Group => {
                if let Some(t) = first_title(&n.children) {
                    return Some(t);
                }
            }
            _ => {}
        }
    }
    None
}

/// Words in heading and paragraph blocks. List items, code and tables do not count.
fn word_count(nodes: &[ContentNode]) -> usize {
    nodes
        .iter()
        .map(|n| match n.kind() {
            NodeKind::Heading => n.text().split_whitespace().count(),
            NodeKind::Paragraph => plain_text(n.text()).split_whitespace().count(),
            NodeKind::Blockquote | NodeKind::Group => word_count(&n.children),
            _ => 0,
        })
        .sum()
}

fn count_kind(nodes: &[ContentNode], kind: NodeKind) -> usize {
    nodes
        .iter()
        .map(|n| {
            usize::from(n.kind() == kind) + count_kind(&n.children, kind) + count_kind(n.items(), kind)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{body, parse_html};

    fn collect_html(html: &str) -> CollectedContent {
        let dom = parse_html(html);
        ContentCollector::new().collect(&body(&dom))
    }

    #[test]
    fn collects_title_paragraph_and_diagram() {
        let c = collect_html(
            r#"<h1>Title</h1><p>This is <strong>bold</strong>.</p><div class="diagram" id="d1"><svg width="100" height="50"><rect width="10" height="10"/></svg></div>"#,
        );
        assert_eq!(c.title, "Title");
        let kinds: Vec<_> = c.nodes.iter().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec![NodeKind::Heading, NodeKind::Paragraph, NodeKind::Diagram]);
        assert_eq!(c.nodes[1].text(), "This is **bold**.");
        assert_eq!(c.nodes[2].attributes.id.as_deref(), Some("d1"));
        assert_eq!(c.nodes[2].attributes.width.as_deref(), Some("100"));
        assert_eq!(c.metadata.diagram_count, 1);
        assert_eq!(c.diagram_ids(), vec!["d1".to_string()]);
    }

    #[test]
    fn word_count_covers_headings_and_paragraphs_only() {
        let c = collect_html("<h1>A B</h1><p>C D E</p>");
        assert_eq!(c.metadata.word_count, 5);

        let c = collect_html(
            "<h2>A B</h2><p>C D E</p><ul><li>x y</li></ul><pre><code>fn main() {}</code></pre><table><tr><td>q r</td></tr></table>",
        );
        assert_eq!(c.metadata.word_count, 5);
        assert_eq!(c.title, UNTITLED);
    }

    #[test]
    fn table_rows_and_cols_match_matrix() {
        let c = collect_html(
            "<table><thead><tr><th>A</th><th>B</th><th>C</th></tr></thead><tbody><tr><td>1</td><td>2</td><td>3</td></tr><tr><td>4</td></tr></tbody></table>",
        );
        let table = &c.nodes[0];
        assert_eq!(table.kind(), NodeKind::Table);
        assert_eq!(table.attributes.rows, Some(3));
        assert_eq!(table.attributes.cols, Some(3));
        assert_eq!(table.rows().len(), 3);
        assert!(table.rows().iter().all(|r| r.len() == 3));
        assert_eq!(table.rows()[0], vec!["A", "B", "C"]);
        assert_eq!(table.rows()[2], vec!["4", "", ""]);
    }

    #[test]
    fn nested_lists_attach_to_their_item() {
        let c = collect_html("<ol><li>one<ul><li>inner <em>a</em></li></ul></li><li>two</li></ol>");
        let list = &c.nodes[0];
        assert_eq!(list.attributes.ordered, Some(true));
        let items = list.items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].text(), "one");
        let nested = &items[0].children[0];
        assert_eq!(nested.attributes.ordered, Some(false));
        assert_eq!(nested.items()[0].text(), "inner *a*");
        assert!(items[1].children.is_empty());
    }

    #[test]
    fn code_language_and_trailing_newline() {
        let c = collect_html("<pre><code class=\"language-rust\">let x = 1;\n\nx\n</code></pre><pre>plain</pre>");
        assert_eq!(c.nodes[0].text(), "let x = 1;\n\nx");
        assert_eq!(c.nodes[0].attributes.language.as_deref(), Some("rust"));
        assert_eq!(c.nodes[1].attributes.language.as_deref(), Some(""));
    }

    #[test]
    fn quoted_headings_never_become_the_title() {
        let c = collect_html("<blockquote><h1>Quoted</h1></blockquote><h1>Real</h1>");
        assert_eq!(c.title, "Real");

        let c = collect_html("<blockquote><h1>Quoted</h1></blockquote><p>body</p>");
        assert_eq!(c.title, UNTITLED);
    }

    #[test]
    fn blockquote_recurses_and_wraps_loose_text() {
        let c = collect_html("<blockquote>lead <b>in</b><p>second</p><hr></blockquote>");
        let quote = &c.nodes[0];
        let kinds: Vec<_> = quote.children.iter().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec![NodeKind::Paragraph, NodeKind::Paragraph, NodeKind::Rule]);
        assert_eq!(quote.children[0].text(), "lead **in**");
        assert_eq!(c.metadata.word_count, 3);
    }

    #[test]
    fn container_policy_controls_multi_child_wrappers() {
        let html = "<section><p>only</p></section><div><p>a</p><p>b</p></div><span></span>";
        let c = collect_html(html);
        assert_eq!(c.nodes.len(), 1);
        assert_eq!(c.nodes[0].text(), "only");

        let dom = parse_html(html);
        let c = ContentCollector::with_policy(ContainerPolicy::Group).collect(&body(&dom));
        assert_eq!(c.nodes.len(), 2);
        assert_eq!(c.nodes[1].kind(), NodeKind::Group);
        assert_eq!(c.nodes[1].children.len(), 2);
    }

    #[test]
    fn collection_leaves_tree_untouched() {
        let dom = parse_html("<h1>T</h1><div class=\"diagram\"><svg id=\"g\"></svg></div>");
        let root = body(&dom);
        let before = crate::dom::serialize_html(&root).unwrap();
        let c = ContentCollector::new().collect(&root);
        assert_eq!(c.nodes[1].attributes.id.as_deref(), Some("g"));
        assert_eq!(crate::dom::serialize_html(&root).unwrap(), before);
    }

    #[test]
    fn counts_images_in_paragraphs() {
        let c = collect_html(r#"<p><img src="a.png"> and <img src="b.png"></p>"#);
        assert_eq!(c.metadata.image_count, 2);
        assert_eq!(c.nodes[0].text(), "and");
    }
}
