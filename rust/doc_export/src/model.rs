//! Content model produced by the collector and consumed by the generators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder title for documents without a level-1 heading.
pub const UNTITLED: &str = "Untitled Document";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Heading,
    Paragraph,
    List,
    Code,
    Table,
    Blockquote,
    Diagram,
    Rule,
    /// Only produced under [`crate::options::ContainerPolicy::Group`].
    Group,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Content {
    Empty,
    /// Inline-formatted text (see [`crate::inline`]).
    Text(String),
    /// Container items, e.g. list items.
    Nodes(Vec<ContentNode>),
    /// Table cells, row-major; every row has the same length.
    Rows(Vec<Vec<String>>),
}

/// Type-specific metadata. Only the fields relevant to a node's kind are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordered: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cols: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentNode {
    kind: NodeKind,
    pub content: Content,
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ContentNode>,
}

impl ContentNode {
    pub fn new(kind: NodeKind, content: Content) -> Self {
        Self {
            kind,
            content,
            attributes: Attributes::default(),
            children: Vec::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_children(mut self, children: Vec<ContentNode>) -> Self {
        self.children = children;
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Inline text, or the empty string for non-text content.
    pub fn text(&self) -> &str {
        match &self.content {
            Content::Text(t) => t,
            _ => "",
        }
    }

    pub fn items(&self) -> &[ContentNode] {
        match &self.content {
            Content::Nodes(n) => n,
            _ => &[],
        }
    }

    pub fn rows(&self) -> &[Vec<String>] {
        match &self.content {
            Content::Rows(r) => r,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub word_count: usize,
    pub image_count: usize,
    pub diagram_count: usize,
    pub collected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedContent {
    pub title: String,
    pub nodes: Vec<ContentNode>,
    pub metadata: Metadata,
}

impl CollectedContent {
    /// Ids of every diagram node, in document order.
    pub fn diagram_ids(&self) -> Vec<String> {
        fn walk(nodes: &[ContentNode], out: &mut Vec<String>) {
            for n in nodes {
                if n.kind() == NodeKind::Diagram {
                    if let Some(id) = &n.attributes.id {
                        out.push(id.clone());
                    }
                }
                walk(n.items(), out);
                walk(&n.children, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.nodes, &mut out);
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Svg,
    Png,
}

impl ImageFormat {
    pub fn is_vector(self) -> bool {
        matches!(self, ImageFormat::Svg)
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Svg => "svg",
            ImageFormat::Png => "png",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Svg => "image/svg+xml",
            ImageFormat::Png => "image/png",
        }
    }
}

/// An embeddable diagram artifact. Dimensions are CSS pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedImage {
    pub id: String,
    pub data: Vec<u8>,
    pub width: f64,
    pub height: f64,
    pub format: ImageFormat,
}
