//! Package-level parts of a WordprocessingML document and the ZIP container.

use crate::dom::xml_escape_text;
use crate::error::Result;
use crate::geometry::{pt_to_twips, Orientation, PageGeometry};
use crate::model::ImageFormat;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const REL_HYPERLINK: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";
const REL_IMAGE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

/// First relationship id handed out for hyperlinks and media; lower ids are fixed parts.
const FIRST_DYNAMIC_RID: u32 = 10;

#[derive(Debug, Clone)]
pub struct MediaPart {
    pub rid: String,
    /// Path relative to `word/`.
    pub target: String,
    pub data: Vec<u8>,
    pub format: ImageFormat,
}

/// Relationships of `word/document.xml` beyond styles and numbering.
#[derive(Debug)]
pub struct Relationships {
    links: BTreeMap<String, String>,
    media: Vec<MediaPart>,
    next: u32,
}

impl Default for Relationships {
    fn default() -> Self {
        Self {
            links: BTreeMap::new(),
            media: Vec::new(),
            next: FIRST_DYNAMIC_RID,
        }
    }
}

impl Relationships {
    fn allocate(&mut self) -> String {
        let rid = format!("rId{}", self.next);
        self.next += 1;
        rid
    }

    /// One relationship per distinct href.
    pub fn link(&mut self, href: &str) -> String {
        if let Some(rid) = self.links.get(href) {
            return rid.clone();
        }
        let rid = self.allocate();
        self.links.insert(href.to_string(), rid.clone());
        rid
    }

    pub fn media(&mut self, data: Vec<u8>, format: ImageFormat) -> String {
        let rid = self.allocate();
        let target = format!("media/image{}.{}", self.media.len() + 1, format.extension());
        self.media.push(MediaPart {
            rid: rid.clone(),
            target,
            data,
            format,
        });
        rid
    }

    pub fn media_parts(&self) -> &[MediaPart] {
        &self.media
    }

    pub fn formats(&self) -> BTreeSet<&'static str> {
        self.media.iter().map(|m| m.format.extension()).collect()
    }
}

pub fn content_types_xml(extensions: &BTreeSet<&'static str>) -> String {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push('\n');
    out.push_str(r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#);
    out.push('\n');
    out.push_str(
        r#"  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    );
    out.push('\n');
    out.push_str(r#"  <Default Extension="xml" ContentType="application/xml"/>"#);
    out.push('\n');
    for ext in extensions {
        let mime = match *ext {
            "svg" => ImageFormat::Svg.mime_type(),
            _ => ImageFormat::Png.mime_type(),
        };
        out.push_str(&format!(
            r#"  <Default Extension="{}" ContentType="{}"/>"#,
            ext, mime
        ));
        out.push('\n');
    }
    for (part, ty) in [
        ("/word/document.xml", "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"),
        ("/word/styles.xml", "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"),
        ("/word/numbering.xml", "application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml"),
        ("/docProps/core.xml", "application/vnd.openxmlformats-package.core-properties+xml"),
    ] {
        out.push_str(&format!(r#"  <Override PartName="{}" ContentType="{}"/>"#, part, ty));
        out.push('\n');
    }
    out.push_str("</Types>");
    out
}

pub fn package_rels_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
</Relationships>"#
}

pub fn document_rels_xml(rels: &Relationships) -> String {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push('\n');
    out.push_str(r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#);
    out.push('\n');
    out.push_str(r#"  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#);
    out.push('\n');
    out.push_str(r#"  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/numbering" Target="numbering.xml"/>"#);
    out.push('\n');
    for (href, rid) in &rels.links {
        out.push_str(&format!(
            r#"  <Relationship Id="{}" Type="{}" Target="{}" TargetMode="External"/>"#,
            rid,
            REL_HYPERLINK,
            xml_escape_text(href),
        ));
        out.push('\n');
    }
    for media in &rels.media {
        out.push_str(&format!(
            r#"  <Relationship Id="{}" Type="{}" Target="{}"/>"#,
            media.rid, REL_IMAGE, media.target
        ));
        out.push('\n');
    }
    out.push_str("</Relationships>");
    out
}

fn heading_style(level: u8) -> String {
    let (size, before) = match level {
        1 => (32, 360),
        2 => (28, 240),
        3 => (26, 200),
        4 => (24, 160),
        _ => (22, 120),
    };
    format!(
        r#"  <w:style w:type="paragraph" w:styleId="Heading{level}">
    <w:name w:val="heading {level}"/>
    <w:basedOn w:val="Normal"/>
    <w:next w:val="Normal"/>
    <w:uiPriority w:val="9"/>
    <w:qFormat/>
    <w:pPr>
      <w:keepNext/>
      <w:spacing w:before="{before}" w:after="120"/>
      <w:outlineLvl w:val="{outline}"/>
    </w:pPr>
    <w:rPr>
      <w:b/>{italic}
      <w:sz w:val="{size}"/>
    </w:rPr>
  </w:style>
"#,
        level = level,
        before = before,
        outline = level - 1,
        italic = if level >= 5 { "\n      <w:i/>" } else { "" },
        size = size,
    )
}

pub fn styles_xml() -> String {
    let mut out = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:docDefaults>
    <w:rPrDefault><w:rPr><w:rFonts w:ascii="Calibri" w:hAnsi="Calibri" w:cs="Calibri"/><w:sz w:val="22"/></w:rPr></w:rPrDefault>
    <w:pPrDefault><w:pPr><w:spacing w:after="120" w:line="276" w:lineRule="auto"/></w:pPr></w:pPrDefault>
  </w:docDefaults>
  <w:style w:type="paragraph" w:default="1" w:styleId="Normal">
    <w:name w:val="Normal"/>
    <w:qFormat/>
  </w:style>
  <w:style w:type="paragraph" w:styleId="Title">
    <w:name w:val="Title"/>
    <w:basedOn w:val="Normal"/>
    <w:next w:val="Normal"/>
    <w:qFormat/>
    <w:pPr><w:spacing w:after="240"/></w:pPr>
    <w:rPr><w:b/><w:sz w:val="48"/></w:rPr>
  </w:style>
"#,
    );
    for level in 1..=6 {
        out.push_str(&heading_style(level));
    }
    out.push_str(
        r#"  <w:style w:type="paragraph" w:styleId="CodeBlock">
    <w:name w:val="Code Block"/>
    <w:basedOn w:val="Normal"/>
    <w:uiPriority w:val="99"/>
    <w:qFormat/>
    <w:pPr>
      <w:spacing w:before="0" w:after="0" w:line="240" w:lineRule="auto"/>
      <w:shd w:val="clear" w:color="auto" w:fill="F5F5F5"/>
    </w:pPr>
    <w:rPr>
      <w:rFonts w:ascii="Consolas" w:hAnsi="Consolas" w:cs="Consolas"/>
      <w:sz w:val="20"/>
    </w:rPr>
  </w:style>
  <w:style w:type="paragraph" w:styleId="Quote">
    <w:name w:val="Quote"/>
    <w:basedOn w:val="Normal"/>
    <w:next w:val="Normal"/>
    <w:qFormat/>
    <w:pPr>
      <w:ind w:left="720" w:right="720"/>
      <w:pBdr><w:left w:val="single" w:sz="12" w:space="8" w:color="BFBFBF"/></w:pBdr>
    </w:pPr>
    <w:rPr><w:i/><w:color w:val="595959"/></w:rPr>
  </w:style>
  <w:style w:type="character" w:styleId="Hyperlink">
    <w:name w:val="Hyperlink"/>
    <w:uiPriority w:val="99"/>
    <w:rPr><w:color w:val="0563C1"/><w:u w:val="single"/></w:rPr>
  </w:style>
</w:styles>"#,
    );
    out
}

const BULLETS: [&str; 3] = ["•", "◦", "▪"];

fn abstract_num(id: u32, ordered: bool) -> String {
    let mut out = format!(
        "  <w:abstractNum w:abstractNumId=\"{}\">\n    <w:multiLevelType w:val=\"hybridMultilevel\"/>\n",
        id
    );
    for ilvl in 0..9u32 {
        let (fmt, text) = if ordered {
            ("decimal", format!("%{}.", ilvl + 1))
        } else {
            ("bullet", BULLETS[ilvl as usize % BULLETS.len()].to_string())
        };
        out.push_str(&format!(
            "    <w:lvl w:ilvl=\"{ilvl}\"><w:start w:val=\"1\"/><w:numFmt w:val=\"{fmt}\"/><w:lvlText w:val=\"{text}\"/><w:lvlJc w:val=\"left\"/><w:pPr><w:ind w:left=\"{left}\" w:hanging=\"360\"/></w:pPr></w:lvl>\n",
            ilvl = ilvl,
            fmt = fmt,
            text = text,
            left = 720 * (ilvl + 1),
        ));
    }
    out.push_str("  </w:abstractNum>\n");
    out
}

pub const BULLET_NUM_ID: u32 = 1;
pub const DECIMAL_NUM_ID: u32 = 2;

/// Bullet and decimal definitions, plus one restarting instance per id in `ordered_instances`.
pub fn numbering_xml(ordered_instances: &[u32]) -> String {
    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<w:numbering xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\n",
    );
    out.push_str(&abstract_num(1, false));
    out.push_str(&abstract_num(2, true));
    out.push_str(&format!(
        "  <w:num w:numId=\"{}\"><w:abstractNumId w:val=\"1\"/></w:num>\n",
        BULLET_NUM_ID
    ));
    out.push_str(&format!(
        "  <w:num w:numId=\"{}\"><w:abstractNumId w:val=\"2\"/></w:num>\n",
        DECIMAL_NUM_ID
    ));
    for id in ordered_instances {
        out.push_str(&format!("  <w:num w:numId=\"{}\"><w:abstractNumId w:val=\"2\"/>", id));
        for ilvl in 0..9 {
            out.push_str(&format!(
                "<w:lvlOverride w:ilvl=\"{}\"><w:startOverride w:val=\"1\"/></w:lvlOverride>",
                ilvl
            ));
        }
        out.push_str("</w:num>\n");
    }
    out.push_str("</w:numbering>");
    out
}

pub fn core_xml(title: &str, author: Option<&str>, created: DateTime<Utc>) -> String {
    let creator = author
        .map(|a| format!("<dc:creator>{}</dc:creator>", xml_escape_text(a)))
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:dcmitype="http://purl.org/dc/dcmitype/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <dc:title>{title}</dc:title>{creator}
  <dcterms:created xsi:type="dcterms:W3CDTF">{created}</dcterms:created>
</cp:coreProperties>"#,
        title = xml_escape_text(title),
        creator = creator,
        created = created.format("%Y-%m-%dT%H:%M:%SZ"),
    )
}

pub fn document_xml(body: &str, geometry: &PageGeometry) -> String {
    let (w, h) = geometry.page_size();
    let m = &geometry.margins;
    let orient = match geometry.orientation {
        Orientation::Landscape => r#" w:orient="landscape""#,
        Orientation::Portrait => "",
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:mc="http://schemas.openxmlformats.org/markup-compatibility/2006"
 xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"
 xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing"
 xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"
 xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture"
 xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"
 xmlns:w14="http://schemas.microsoft.com/office/word/2010/wordprocessingml"
 mc:Ignorable="w14">
  <w:body>
    {body}
    <w:sectPr>
      <w:pgSz w:w="{pw}" w:h="{ph}"{orient}/>
      <w:pgMar w:top="{top}" w:right="{right}" w:bottom="{bottom}" w:left="{left}" w:header="708" w:footer="708" w:gutter="0"/>
      <w:cols w:space="708"/>
      <w:docGrid w:linePitch="360"/>
    </w:sectPr>
  </w:body>
</w:document>"#,
        body = body,
        pw = pt_to_twips(w),
        ph = pt_to_twips(h),
        orient = orient,
        top = pt_to_twips(m.top),
        right = pt_to_twips(m.right),
        bottom = pt_to_twips(m.bottom),
        left = pt_to_twips(m.left),
    )
}

/// Every part of a finished package.
pub struct Package<'a> {
    pub document: String,
    pub core: String,
    pub numbering: String,
    pub rels: &'a Relationships,
}

pub fn write_package(package: &Package<'_>) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", opts)?;
    zip.write_all(content_types_xml(&package.rels.formats()).as_bytes())?;

    zip.start_file("_rels/.rels", opts)?;
    zip.write_all(package_rels_xml().as_bytes())?;

    zip.start_file("docProps/core.xml", opts)?;
    zip.write_all(package.core.as_bytes())?;

    zip.start_file("word/document.xml", opts)?;
    zip.write_all(package.document.as_bytes())?;

    zip.start_file("word/styles.xml", opts)?;
    zip.write_all(styles_xml().as_bytes())?;

    zip.start_file("word/numbering.xml", opts)?;
    zip.write_all(package.numbering.as_bytes())?;

    zip.start_file("word/_rels/document.xml.rels", opts)?;
    zip.write_all(document_rels_xml(package.rels).as_bytes())?;

    for media in package.rels.media_parts() {
        zip.start_file(format!("word/{}", media.target), opts)?;
        zip.write_all(&media.data)?;
    }

    Ok(zip.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Margins, PageSize};

    #[test]
    fn relationships_dedupe_links_and_number_media() {
        let mut rels = Relationships::default();
        assert_eq!(rels.link("https://a"), "rId10");
        assert_eq!(rels.media(vec![1], ImageFormat::Svg), "rId11");
        assert_eq!(rels.link("https://a"), "rId10");
        assert_eq!(rels.media(vec![2], ImageFormat::Png), "rId12");
        assert_eq!(rels.media_parts()[1].target, "media/image2.png");

        let xml = document_rels_xml(&rels);
        assert_eq!(xml.matches("TargetMode=\"External\"").count(), 1);
        assert!(xml.contains(r#"Target="media/image1.svg""#));

        let types = content_types_xml(&rels.formats());
        assert!(types.contains(r#"Extension="svg" ContentType="image/svg+xml""#));
        assert!(types.contains(r#"Extension="png" ContentType="image/png""#));
    }

    #[test]
    fn numbering_restarts_each_ordered_instance() {
        let xml = numbering_xml(&[3, 4]);
        assert_eq!(xml.matches("<w:abstractNum ").count(), 2);
        assert_eq!(xml.matches("<w:lvl ").count(), 18);
        assert!(xml.contains(r#"<w:num w:numId="4"><w:abstractNumId w:val="2"/><w:lvlOverride w:ilvl="0"><w:startOverride w:val="1"/>"#));
        assert!(xml.contains(r#"<w:lvlText w:val="%3."/>"#));
    }

    #[test]
    fn section_uses_page_geometry() {
        let g = PageGeometry::new(PageSize::Letter, Orientation::Landscape, Margins::uniform(36.0));
        let xml = document_xml("", &g);
        assert!(xml.contains(r#"<w:pgSz w:w="15840" w:h="12240" w:orient="landscape"/>"#));
        assert!(xml.contains(r#"w:top="720" w:right="720" w:bottom="720" w:left="720""#));
    }

    #[test]
    fn styles_cover_every_heading_level() {
        let xml = styles_xml();
        for id in ["Title", "Heading1", "Heading6", "CodeBlock", "Quote", "Hyperlink"] {
            assert!(xml.contains(&format!("w:styleId=\"{}\"", id)), "missing {}", id);
        }
    }
}
