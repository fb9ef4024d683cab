//! Content nodes to WordprocessingML body markup.

use super::parts::{Relationships, BULLET_NUM_ID, DECIMAL_NUM_ID};
use crate::dom::xml_escape_text;
use crate::error::{Error, Result};
use crate::geometry::px_to_emu;
use crate::inline::{parse_inline, plain_text, RunStyle, Segment};
use crate::model::{ConvertedImage, ContentNode, ImageFormat, NodeKind};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::collections::{BTreeMap, BTreeSet};

/// 1x1 transparent PNG shown by renderers that cannot draw embedded SVG.
const PNG_FALLBACK: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

const SVG_BLIP_EXT: &str = "{96DAC541-7B7A-43D3-8B79-37D633B846F1}";

const QUOTE_TABLE_PLACEHOLDER: &str = "[Table]";

/// Left indent of the `Quote` style, and the extra step per nested list level inside it.
const QUOTE_INDENT_TWIPS: u32 = 720;
const QUOTE_LIST_STEP_TWIPS: u32 = 360;

#[derive(Debug, Clone, Copy, Default)]
struct ParaProps<'s> {
    style: Option<&'s str>,
    numbering: Option<(u32, usize)>,
    bottom_border: bool,
    indent_left: Option<u32>,
}

fn run_xml(text: &str, style: RunStyle, char_style: Option<&str>) -> String {
    let mut out = String::from("<w:r>");
    if style.bold || style.italic || style.code || char_style.is_some() {
        out.push_str("<w:rPr>");
        if let Some(cs) = char_style {
            out.push_str(&format!("<w:rStyle w:val=\"{}\"/>", cs));
        }
        if style.code {
            out.push_str("<w:rFonts w:ascii=\"Consolas\" w:hAnsi=\"Consolas\" w:cs=\"Consolas\"/>");
        }
        if style.bold {
            out.push_str("<w:b/>");
        }
        if style.italic {
            out.push_str("<w:i/>");
        }
        out.push_str("</w:rPr>");
    }
    out.push_str("<w:t xml:space=\"preserve\">");
    out.push_str(&xml_escape_text(text));
    out.push_str("</w:t></w:r>");
    out
}

fn paragraph_open(props: ParaProps<'_>) -> String {
    let mut out = String::from("<w:p>");
    if props.style.is_none()
        && props.numbering.is_none()
        && !props.bottom_border
        && props.indent_left.is_none()
    {
        return out;
    }
    out.push_str("<w:pPr>");
    if let Some(style) = props.style {
        out.push_str(&format!("<w:pStyle w:val=\"{}\"/>", style));
    }
    if let Some((num_id, ilvl)) = props.numbering {
        out.push_str(&format!(
            "<w:numPr><w:ilvl w:val=\"{}\"/><w:numId w:val=\"{}\"/></w:numPr>",
            ilvl, num_id
        ));
    }
    if props.bottom_border {
        out.push_str(
            "<w:pBdr><w:bottom w:val=\"single\" w:sz=\"6\" w:space=\"1\" w:color=\"auto\"/></w:pBdr>",
        );
    }
    if let Some(left) = props.indent_left {
        out.push_str(&format!("<w:ind w:left=\"{}\"/>", left));
    }
    out.push_str("</w:pPr>");
    out
}

fn plain_paragraph(text: &str, props: ParaProps<'_>, run: RunStyle) -> String {
    let mut out = paragraph_open(props);
    if !text.is_empty() {
        out.push_str(&run_xml(text, run, None));
    }
    out.push_str("</w:p>");
    out
}

/// Image to emit for one diagram node.
struct Placement<'i> {
    image: &'i ConvertedImage,
    width: f64,
    height: f64,
}

/// Scales `(w, h)` down to `max_width`, preserving aspect ratio. Never scales up.
pub fn fit_width(w: f64, h: f64, max_width: f64) -> (f64, f64) {
    if w > max_width && max_width > 0.0 {
        (max_width, h * max_width / w)
    } else {
        (w, h)
    }
}

pub struct BodyWriter<'a> {
    images: &'a BTreeMap<String, ConvertedImage>,
    max_image_width_px: f64,
    pub rels: Relationships,
    ordered_instances: Vec<u32>,
    fallback_rid: Option<String>,
    drawings: u32,
    placed: BTreeSet<String>,
}

impl<'a> BodyWriter<'a> {
    pub fn new(images: &'a BTreeMap<String, ConvertedImage>, max_image_width_px: f64) -> Self {
        Self {
            images,
            max_image_width_px,
            rels: Relationships::default(),
            ordered_instances: Vec::new(),
            fallback_rid: None,
            drawings: 0,
            placed: BTreeSet::new(),
        }
    }

    /// Numbering instances allocated for top-level ordered lists.
    pub fn ordered_instances(&self) -> &[u32] {
        &self.ordered_instances
    }

    /// Converted images that no diagram node has placed so far.
    pub fn unplaced_images(&self) -> Vec<&str> {
        self.images
            .keys()
            .filter(|id| !self.placed.contains(*id))
            .map(String::as_str)
            .collect()
    }

    pub fn title(&mut self, title: &str, author: Option<&str>) -> String {
        let mut out = plain_paragraph(
            title,
            ParaProps {
                style: Some("Title"),
                ..Default::default()
            },
            RunStyle::default(),
        );
        if let Some(author) = author {
            out.push_str(&plain_paragraph(
                author,
                ParaProps::default(),
                RunStyle {
                    italic: true,
                    ..Default::default()
                },
            ));
        }
        out
    }

    /// Markup for one top-level node; an error means the node is dropped.
    pub fn node(&mut self, node: &ContentNode) -> Result<String> {
        match node.kind() {
            NodeKind::Heading => Ok(self.heading(node)),
            NodeKind::Paragraph => Ok(self.paragraph(node.text(), ParaProps::default())),
            NodeKind::List => Ok(self.list(node, 0, None)),
            NodeKind::Code => Ok(code(node.text())),
            NodeKind::Table => self.table(node),
            NodeKind::Blockquote => Ok(self.blockquote(node)),
            NodeKind::Diagram => self.diagram(node),
            NodeKind::Rule => Ok(rule()),
            NodeKind::Group => {
                let mut out = String::new();
                for child in &node.children {
                    match self.node(child) {
                        Ok(xml) => out.push_str(&xml),
                        Err(e) => log::warn!("skipping {:?} node in group: {}", child.kind(), e),
                    }
                }
                Ok(out)
            }
        }
    }

    fn heading(&mut self, node: &ContentNode) -> String {
        let level = node.attributes.level.unwrap_or(1).clamp(1, 6);
        let style = format!("Heading{}", level);
        plain_paragraph(
            node.text(),
            ParaProps {
                style: Some(style.as_str()),
                ..Default::default()
            },
            RunStyle::default(),
        )
    }

    fn paragraph(&mut self, markup: &str, props: ParaProps<'_>) -> String {
        let mut out = paragraph_open(props);
        let mut link: Option<(String, String)> = None;
        let close_link = |out: &mut String, link: &mut Option<(String, String)>| {
            if let Some((rid, runs)) = link.take() {
                out.push_str(&format!("<w:hyperlink r:id=\"{}\" w:history=\"1\">", rid));
                out.push_str(&runs);
                out.push_str("</w:hyperlink>");
            }
        };
        for seg in parse_inline(markup) {
            match seg {
                Segment::Break => {
                    close_link(&mut out, &mut link);
                    out.push_str("<w:r><w:br/></w:r>");
                }
                Segment::Text { text, style } => {
                    close_link(&mut out, &mut link);
                    out.push_str(&run_xml(&text, style, None));
                }
                Segment::LinkText { text, style, href } => {
                    let rid = self.rels.link(&href);
                    let run = run_xml(&text, style, Some("Hyperlink"));
                    match &mut link {
                        Some((open, runs)) if *open == rid => runs.push_str(&run),
                        _ => {
                            close_link(&mut out, &mut link);
                            link = Some((rid, run));
                        }
                    }
                }
            }
        }
        close_link(&mut out, &mut link);
        out.push_str("</w:p>");
        out
    }

    /// `num_id` is inherited from the enclosing list for ordered sublists.
    fn list(&mut self, node: &ContentNode, depth: usize, inherited: Option<u32>) -> String {
        let ordered = node.attributes.ordered.unwrap_or(false);
        let num_id = match (ordered, inherited) {
            (false, _) => BULLET_NUM_ID,
            (true, Some(id)) => id,
            (true, None) => {
                let id = DECIMAL_NUM_ID + 1 + self.ordered_instances.len() as u32;
                self.ordered_instances.push(id);
                id
            }
        };
        let ilvl = depth.min(8);
        let mut out = String::new();
        for item in node.items() {
            out.push_str(&self.paragraph(
                item.text(),
                ParaProps {
                    numbering: Some((num_id, ilvl)),
                    ..Default::default()
                },
            ));
            for sub in &item.children {
                let sub_ordered = sub.attributes.ordered.unwrap_or(false);
                let pass = (ordered && sub_ordered).then_some(num_id);
                out.push_str(&self.list(sub, depth + 1, pass));
            }
        }
        out
    }

    fn table(&mut self, node: &ContentNode) -> Result<String> {
        let rows = node.rows();
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        if cols == 0 || rows.iter().any(|r| r.len() != cols) {
            return Err(Error::Node(format!(
                "table is not rectangular ({} rows)",
                rows.len()
            )));
        }
        let mut out = String::from("<w:tbl><w:tblPr><w:tblW w:w=\"5000\" w:type=\"pct\"/>");
        out.push_str(
            "<w:tblBorders><w:top w:val=\"nil\"/><w:left w:val=\"nil\"/><w:bottom w:val=\"nil\"/><w:right w:val=\"nil\"/><w:insideH w:val=\"nil\"/><w:insideV w:val=\"nil\"/></w:tblBorders>",
        );
        out.push_str("<w:tblLook w:val=\"04A0\" w:firstRow=\"1\" w:lastRow=\"0\" w:firstColumn=\"0\" w:lastColumn=\"0\" w:noHBand=\"0\" w:noVBand=\"1\"/></w:tblPr><w:tblGrid>");
        for _ in 0..cols {
            out.push_str("<w:gridCol/>");
        }
        out.push_str("</w:tblGrid>");

        for (i, row) in rows.iter().enumerate() {
            let header = i == 0;
            out.push_str("<w:tr>");
            if header {
                out.push_str("<w:trPr><w:tblHeader/></w:trPr>");
            }
            for cell in row {
                out.push_str("<w:tc><w:tcPr><w:tcW w:w=\"0\" w:type=\"auto\"/>");
                if header {
                    out.push_str("<w:tcBorders><w:bottom w:val=\"single\" w:sz=\"8\" w:space=\"0\" w:color=\"000000\"/></w:tcBorders>");
                }
                out.push_str("</w:tcPr>");
                if header {
                    out.push_str(&plain_paragraph(
                        &plain_text(cell),
                        ParaProps::default(),
                        RunStyle {
                            bold: true,
                            ..Default::default()
                        },
                    ));
                } else {
                    out.push_str(&self.paragraph(cell, ParaProps::default()));
                }
                out.push_str("</w:tc>");
            }
            out.push_str("</w:tr>");
        }
        out.push_str("</w:tbl>");
        Ok(out)
    }

    fn blockquote(&mut self, node: &ContentNode) -> String {
        let quote = ParaProps {
            style: Some("Quote"),
            ..Default::default()
        };
        let mut out = String::new();
        for child in &node.children {
            match child.kind() {
                NodeKind::Paragraph => out.push_str(&self.paragraph(child.text(), quote)),
                NodeKind::Heading | NodeKind::Code => {
                    for line in child.text().lines() {
                        out.push_str(&plain_paragraph(line, quote, RunStyle::default()));
                    }
                }
                NodeKind::Table => {
                    out.push_str(&plain_paragraph(
                        QUOTE_TABLE_PLACEHOLDER,
                        quote,
                        RunStyle::default(),
                    ));
                }
                NodeKind::Blockquote | NodeKind::Group => out.push_str(&self.blockquote(child)),
                NodeKind::List => self.quote_list(child, 0, &mut out),
                NodeKind::Diagram | NodeKind::Rule => match self.node(child) {
                    Ok(xml) => out.push_str(&xml),
                    Err(e) => log::warn!("skipping quoted block: {}", e),
                },
            }
        }
        out
    }

    /// Quoted lists lose their numbering; nesting shows as extra indent.
    fn quote_list(&mut self, list: &ContentNode, depth: u32, out: &mut String) {
        let props = ParaProps {
            style: Some("Quote"),
            indent_left: (depth > 0).then(|| QUOTE_INDENT_TWIPS + QUOTE_LIST_STEP_TWIPS * depth),
            ..Default::default()
        };
        for item in list.items() {
            out.push_str(&self.paragraph(item.text(), props));
            for sub in &item.children {
                self.quote_list(sub, depth + 1, out);
            }
        }
    }

    fn diagram(&mut self, node: &ContentNode) -> Result<String> {
        let Some(id) = node.attributes.id.as_deref() else {
            log::warn!("diagram node without id; skipping");
            return Ok(String::new());
        };
        let Some(image) = self.images.get(id) else {
            log::warn!("no converted image for diagram {:?}; skipping", id);
            return Ok(String::new());
        };
        if !(image.width > 0.0 && image.height > 0.0) {
            return Err(Error::Node(format!(
                "diagram {} has invalid size {}x{}",
                id, image.width, image.height
            )));
        }
        let (width, height) = fit_width(image.width, image.height, self.max_image_width_px);
        let xml = self.drawing(Placement {
            image,
            width,
            height,
        })?;
        self.placed.insert(id.to_string());
        Ok(xml)
    }

    fn drawing(&mut self, placement: Placement<'_>) -> Result<String> {
        let image = placement.image;
        let blip = match image.format {
            ImageFormat::Svg => {
                let svg_rid = self.rels.media(image.data.clone(), ImageFormat::Svg);
                let png_rid = self.fallback_rid()?;
                format!(
                    "<a:blip r:embed=\"{}\"><a:extLst><a:ext uri=\"{}\"><asvg:svgBlip xmlns:asvg=\"http://schemas.microsoft.com/office/drawing/2016/SVG/main\" r:embed=\"{}\"/></a:ext></a:extLst></a:blip>",
                    png_rid, SVG_BLIP_EXT, svg_rid
                )
            }
            ImageFormat::Png => {
                let rid = self.rels.media(image.data.clone(), ImageFormat::Png);
                format!("<a:blip r:embed=\"{}\"/>", rid)
            }
        };
        self.drawings += 1;
        let cx = px_to_emu(placement.width);
        let cy = px_to_emu(placement.height);
        let name = xml_escape_text(&image.id);
        Ok(format!(
            r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0"><wp:extent cx="{cx}" cy="{cy}"/><wp:effectExtent l="0" t="0" r="0" b="0"/><wp:docPr id="{id}" name="{name}"/><wp:cNvGraphicFramePr><a:graphicFrameLocks noChangeAspect="1"/></wp:cNvGraphicFramePr><a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture"><pic:pic><pic:nvPicPr><pic:cNvPr id="{id}" name="{name}"/><pic:cNvPicPr/></pic:nvPicPr><pic:blipFill>{blip}<a:stretch><a:fillRect/></a:stretch></pic:blipFill><pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr></pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#,
            cx = cx,
            cy = cy,
            id = self.drawings,
            name = name,
            blip = blip,
        ))
    }

    fn fallback_rid(&mut self) -> Result<String> {
        if let Some(rid) = &self.fallback_rid {
            return Ok(rid.clone());
        }
        let data = STANDARD.decode(PNG_FALLBACK)?;
        let rid = self.rels.media(data, ImageFormat::Png);
        self.fallback_rid = Some(rid.clone());
        Ok(rid)
    }
}

fn code(text: &str) -> String {
    let props = ParaProps {
        style: Some("CodeBlock"),
        ..Default::default()
    };
    let mut out = String::new();
    let lines: Vec<&str> = if text.is_empty() { vec![""] } else { text.split('\n').collect() };
    for line in lines {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let line = if line.is_empty() { " " } else { line };
        out.push_str(&plain_paragraph(line, props, RunStyle::default()));
    }
    out
}

fn rule() -> String {
    plain_paragraph(
        "",
        ParaProps {
            bottom_border: true,
            ..Default::default()
        },
        RunStyle::default(),
    )
}
