//! DOCX generation from collected content and converted diagrams.

pub mod body;
pub mod parts;

use crate::error::Result;
use crate::model::{CollectedContent, ConvertedImage};
use crate::options::ExportOptions;
use body::BodyWriter;
use parts::{core_xml, document_xml, numbering_xml, write_package, Package};
use std::collections::BTreeMap;

pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[derive(Debug, Clone, Default)]
pub struct DocxGenerator {
    options: ExportOptions,
}

impl DocxGenerator {
    pub fn new(options: ExportOptions) -> Self {
        Self { options }
    }

    /// Builds the package. Nodes that fail to convert are logged and left out.
    pub fn generate(
        &self,
        content: &CollectedContent,
        images: &BTreeMap<String, ConvertedImage>,
    ) -> Result<Vec<u8>> {
        let geometry = self.options.geometry();
        let (content_width_px, _) = geometry.content_box_px();
        let title = self.options.title.as_deref().unwrap_or(&content.title);
        let author = self.options.author.as_deref();

        let mut writer = BodyWriter::new(images, content_width_px);
        let mut body = String::new();
        if self.options.include_title {
            body.push_str(&writer.title(title, author));
        }
        let mut skipped = 0;
        for node in &content.nodes {
            match writer.node(node) {
                Ok(xml) => body.push_str(&xml),
                Err(e) => {
                    skipped += 1;
                    log::warn!("skipping {:?} node: {}", node.kind(), e);
                }
            }
        }
        for id in writer.unplaced_images() {
            log::warn!("converted diagram {:?} has no matching node; not embedded", id);
        }
        log::debug!(
            "generated {} nodes ({} skipped), {} media parts",
            content.nodes.len() - skipped,
            skipped,
            writer.rels.media_parts().len()
        );

        let package = Package {
            document: document_xml(&body, &geometry),
            core: core_xml(title, author, content.metadata.collected_at),
            numbering: numbering_xml(writer.ordered_instances()),
            rels: &writer.rels,
        };
        write_package(&package)
    }
}

/// Serializes `content` with `images` using `options`.
pub fn generate(
    content: &CollectedContent,
    images: &BTreeMap<String, ConvertedImage>,
    options: &ExportOptions,
) -> Result<Vec<u8>> {
    DocxGenerator::new(options.clone()).generate(content, images)
}
