//! Vector diagram extraction.
//!
//! Diagrams live in container elements carrying the [`DIAGRAM_CLASS`] class.
//! Each one is cloned, its cascaded presentation is written out as explicit
//! attributes, foreign-object labels are turned into SVG text, and the result is
//! serialized as a standalone SVG that word processors can embed.

pub mod foreign;
pub mod serialize;
pub mod style;

use crate::dom::{
    attr_get, deep_clone, element_children, has_class, is_element, parent_of, set_attr, tag_lower,
};
use crate::error::{Error, Result};
use crate::model::{ConvertedImage, ImageFormat};
use markup5ever_rcdom::Handle;
use std::collections::BTreeMap;
use style::{Presentation, StyleResolver, StyleSheet, SHAPE_PROPERTIES, TEXT_PROPERTIES};

/// Class token marking a diagram container.
pub const DIAGRAM_CLASS: &str = "diagram";

/// Size used when a graphic declares nothing usable.
pub const FALLBACK_SIZE: (f64, f64) = (800.0, 600.0);

const SHAPES: &[&str] = &[
    "rect", "circle", "ellipse", "line", "polyline", "polygon", "path", "text", "tspan",
];

/// A diagram container paired with the graphic inside it.
#[derive(Debug, Clone)]
pub struct DiagramSource {
    pub id: String,
    pub container: Handle,
    pub graphic: Handle,
}

/// Finds diagram containers under `root` in document order.
///
/// The id is the container's `id`, else the graphic's `id`, else `diagram-<n>`.
pub fn find_diagrams(root: &Handle) -> Vec<DiagramSource> {
    fn walk(node: &Handle, out: &mut Vec<DiagramSource>) {
        if is_element(node) && has_class(node, DIAGRAM_CLASS) {
            if let Some(graphic) = first_svg(node) {
                let id = attr_get(node, "id")
                    .or_else(|| attr_get(&graphic, "id"))
                    .filter(|id| !id.trim().is_empty())
                    .unwrap_or_else(|| format!("diagram-{}", out.len() + 1));
                out.push(DiagramSource {
                    id,
                    container: node.clone(),
                    graphic,
                });
            }
            return;
        }
        for c in node.children.borrow().iter() {
            walk(c, out);
        }
    }
    let mut out = Vec::new();
    walk(root, &mut out);
    out
}

fn first_svg(node: &Handle) -> Option<Handle> {
    for c in element_children(node) {
        if tag_lower(&c).as_deref() == Some("svg") {
            return Some(c);
        }
        if let Some(found) = first_svg(&c) {
            return Some(found);
        }
    }
    None
}

/// Parses an absolute CSS/SVG length into pixels. Percentages and `auto` yield `None`.
pub fn parse_length(value: &str) -> Option<f64> {
    let v = value.trim();
    let bytes = v.as_bytes();
    let mut split = 0;
    while split < bytes.len() {
        let b = bytes[split];
        let exponent = matches!(b, b'e' | b'E')
            && bytes
                .get(split + 1)
                .is_some_and(|n| n.is_ascii_digit() || matches!(n, b'-' | b'+'));
        if !(b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+') || exponent) {
            break;
        }
        split += 1;
    }
    let (number, unit) = v.split_at(split);
    let n: f64 = number.parse().ok()?;
    let scale = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "px" => 1.0,
        "pt" => 96.0 / 72.0,
        "pc" => 16.0,
        "in" => 96.0,
        "cm" => 96.0 / 2.54,
        "mm" => 96.0 / 25.4,
        "em" | "rem" => 16.0,
        _ => return None,
    };
    let px = n * scale;
    px.is_finite().then_some(px)
}

/// Number formatting for attributes: integers without a fraction, else two decimals at most.
pub fn format_number(n: f64) -> String {
    if (n - n.round()).abs() < 1e-9 {
        format!("{}", n.round() as i64)
    } else {
        let s = format!("{:.2}", n);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn view_box(svg: &Handle) -> Option<(f64, f64)> {
    let raw = attr_get(svg, "viewBox")?;
    let nums: Vec<f64> = raw
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    match nums.as_slice() {
        [_, _, w, h] => Some((*w, *h)),
        _ => None,
    }
}

/// The sizing the page layout gave the graphic, read from its inline style.
fn rendered_size(svg: &Handle) -> Option<(f64, f64)> {
    let style = attr_get(svg, "style")?;
    let mut width = None;
    let mut height = None;
    for decl in style.split(';') {
        let Some((prop, value)) = decl.split_once(':') else {
            continue;
        };
        match prop.trim().to_ascii_lowercase().as_str() {
            "width" => width = parse_length(value),
            "max-width" => width = width.or_else(|| parse_length(value)),
            "height" => height = parse_length(value),
            _ => {}
        }
    }
    Some((width?, height?))
}

/// Width and height in pixels; the first source that supplies both wins.
pub fn resolve_dimensions(svg: &Handle) -> (f64, f64) {
    let attrs = attr_get(svg, "width")
        .and_then(|w| parse_length(&w))
        .zip(attr_get(svg, "height").and_then(|h| parse_length(&h)));
    attrs
        .or_else(|| view_box(svg))
        .or_else(|| rendered_size(svg))
        .unwrap_or(FALLBACK_SIZE)
}

fn strip_sizing_style(svg: &Handle) {
    let Some(style) = attr_get(svg, "style") else {
        return;
    };
    let kept: Vec<&str> = style
        .split(';')
        .filter(|decl| {
            let prop = decl.split_once(':').map(|(p, _)| p.trim().to_ascii_lowercase());
            !matches!(prop.as_deref(), Some("width" | "height" | "max-width" | "max-height"))
                && !decl.trim().is_empty()
        })
        .collect();
    if kept.is_empty() {
        crate::dom::remove_attr(svg, "style");
    } else {
        set_attr(svg, "style", &kept.join(";"));
    }
}

fn in_definitions(node: &Handle, graphic: &Handle) -> bool {
    let mut cur = parent_of(node);
    while let Some(p) = cur {
        if std::rc::Rc::ptr_eq(&p, graphic) {
            return false;
        }
        if matches!(tag_lower(&p).as_deref(), Some("defs" | "marker" | "symbol")) {
            return true;
        }
        cur = parent_of(&p);
    }
    false
}

fn write_presentation(target: &Handle, values: &Presentation, text: bool) {
    let props = SHAPE_PROPERTIES
        .iter()
        .chain(if text { TEXT_PROPERTIES } else { &[] });
    for prop in props {
        if let Some(value) = values.get(*prop) {
            if attr_get(target, prop).as_deref() != Some(value.as_str()) {
                set_attr(target, prop, value);
            }
        }
    }
}

/// Converts live diagrams into standalone SVG artifacts.
#[derive(Debug, Clone, Default)]
pub struct DiagramExtractor {
    sheet: StyleSheet,
}

impl DiagramExtractor {
    /// Builds an extractor whose cascade uses every `<style>` under `document`.
    pub fn new(document: &Handle) -> Self {
        Self {
            sheet: StyleSheet::from_document(document),
        }
    }

    pub fn with_stylesheet(sheet: StyleSheet) -> Self {
        Self { sheet }
    }

    pub fn convert(&self, source: &DiagramSource) -> Result<ConvertedImage> {
        let mut resolver = StyleResolver::new(&self.sheet);
        self.convert_with(&mut resolver, source)
    }

    /// Converts each source, skipping failures. Keys are a subset of the source ids.
    pub fn convert_all(&self, sources: &[DiagramSource]) -> BTreeMap<String, ConvertedImage> {
        let mut resolver = StyleResolver::new(&self.sheet);
        let mut out = BTreeMap::new();
        for source in sources {
            if out.contains_key(&source.id) {
                log::warn!("duplicate diagram id {:?}; keeping the first", source.id);
                continue;
            }
            match self.convert_with(&mut resolver, source) {
                Ok(image) => {
                    out.insert(image.id.clone(), image);
                }
                Err(e) => log::warn!("skipping diagram: {}", e),
            }
        }
        log::debug!("converted {}/{} diagrams", out.len(), sources.len());
        out
    }

    fn convert_with(&self, resolver: &mut StyleResolver<'_>, source: &DiagramSource) -> Result<ConvertedImage> {
        let fail = |reason: String| Error::Diagram {
            id: source.id.clone(),
            reason,
        };
        let (width, height) = resolve_dimensions(&source.graphic);
        if !(width > 0.0 && height > 0.0) {
            return Err(fail(format!("invalid size {}x{}", width, height)));
        }

        let clone = deep_clone(&source.graphic);
        set_attr(&clone, "width", &format_number(width));
        set_attr(&clone, "height", &format_number(height));
        if view_box(&clone).is_none() {
            set_attr(
                &clone,
                "viewBox",
                &format!("0 0 {} {}", format_number(width), format_number(height)),
            );
        }
        strip_sizing_style(&clone);

        inline_presentation(resolver, &source.graphic, &source.graphic, &clone);
        let replaced = foreign::substitute_foreign_objects(&clone);
        if replaced > 0 {
            log::debug!("diagram {}: replaced {} foreign labels", source.id, replaced);
        }

        let markup = serialize::fix_dash_arrays(&serialize::to_svg_string(&clone));
        Ok(ConvertedImage {
            id: source.id.clone(),
            data: markup.into_bytes(),
            width,
            height,
            format: ImageFormat::Svg,
        })
    }
}

/// Walks the live graphic and its clone in lockstep, copying cascaded values onto the clone.
fn inline_presentation(resolver: &mut StyleResolver<'_>, graphic: &Handle, live: &Handle, copy: &Handle) {
    let tag = tag_lower(live);
    if tag != tag_lower(copy) {
        return;
    }
    if let Some(tag) = tag.as_deref() {
        if SHAPES.contains(&tag) {
            let values = if in_definitions(live, graphic) {
                resolver.declared(live)
            } else {
                (*resolver.computed(live)).clone()
            };
            write_presentation(copy, &values, matches!(tag, "text" | "tspan"));
        }
        if tag == "foreignobject" {
            return;
        }
    }
    let live_children = element_children(live);
    let copy_children = element_children(copy);
    for (l, c) in live_children.iter().zip(copy_children.iter()) {
        inline_presentation(resolver, graphic, l, c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{body, parse_html, serialize_html};

    const SAMPLE: &str = r#"<style>.node rect { fill: #ececff; stroke: #9370db } .flow { stroke-dasharray: 0 }</style>
        <div class="diagram" id="d1"><svg id="mermaid-1" style="max-width: 320px; height: 200px;">
            <defs><marker id="arrow"><path d="M0,0 L10,5" fill="black"/></marker></defs>
            <g class="node"><rect width="40" height="20"/>
                <foreignObject x="0" y="0" width="40" height="20"><div>Start</div></foreignObject></g>
            <path class="flow" d="M0,0 L1,1" marker-end="url(#arrow)"/>
        </svg></div>
        <section><div class="diagram"><svg width="100" height="50"></svg></div></section>
        <div class="diagram"><p>no graphic</p></div>"#;

    #[test]
    fn finds_diagrams_with_resolved_ids() {
        let dom = parse_html(SAMPLE);
        let found = find_diagrams(&body(&dom));
        let ids: Vec<_> = found.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "diagram-2"]);
    }

    #[test]
    fn dimension_lookup_order() {
        let dom = parse_html(
            r#"<svg id="a" width="120" height="2in" viewBox="0 0 10 10"></svg><svg id="b" width="100%" viewBox="0,0,300,150"></svg><svg id="c" style="width: 64px; height: 32px"></svg><svg id="d"></svg>"#,
        );
        let svgs = element_children(&body(&dom));
        assert_eq!(resolve_dimensions(&svgs[0]), (120.0, 192.0));
        assert_eq!(resolve_dimensions(&svgs[1]), (300.0, 150.0));
        assert_eq!(resolve_dimensions(&svgs[2]), (64.0, 32.0));
        assert_eq!(resolve_dimensions(&svgs[3]), FALLBACK_SIZE);
    }

    #[test]
    fn converts_with_inlined_styles_and_text_labels() {
        let dom = parse_html(SAMPLE);
        let root = body(&dom);
        let before = serialize_html(&root).unwrap();
        let sources = find_diagrams(&root);
        let extractor = DiagramExtractor::new(&dom.document);
        let image = extractor.convert(&sources[0]).unwrap();

        assert_eq!(image.id, "d1");
        assert_eq!((image.width, image.height), (320.0, 200.0));
        assert_eq!(image.format, ImageFormat::Svg);
        let svg = String::from_utf8(image.data).unwrap();
        assert!(svg.contains(r#"width="320" height="200""#));
        assert!(svg.contains(r#"viewBox="0 0 320 200""#));
        assert!(svg.contains(r##"<rect width="40" height="20" fill="#ececff" stroke="#9370db"/>"##));
        assert!(svg.contains(r#"marker-end="url(#arrow)""#));
        assert!(svg.contains(r#"stroke-dasharray="none""#));
        assert!(svg.contains(r#"<path d="M0,0 L10,5" fill="black"/>"#));
        assert!(svg.contains("<tspan"));
        assert!(svg.contains(">Start</tspan>"));
        assert!(!svg.contains("foreignObject"));
        assert!(!svg.contains("max-width"));

        assert_eq!(serialize_html(&root).unwrap(), before);
    }

    #[test]
    fn cascaded_zero_dash_patterns_are_dropped_from_the_image() {
        let dom = parse_html(
            r#"<style>.e { stroke-dasharray: 0.0 } .f { stroke-dasharray: 0em, .0 }</style><div class="diagram" id="z"><svg width="20" height="20"><path class="e" d="M0,0 L1,1"/><line class="f" x1="0" y1="0" x2="5" y2="5"/></svg></div>"#,
        );
        let sources = find_diagrams(&body(&dom));
        let image = DiagramExtractor::new(&dom.document).convert(&sources[0]).unwrap();
        let svg = String::from_utf8(image.data).unwrap();
        assert_eq!(svg.matches(r#"stroke-dasharray="none""#).count(), 2);
        assert!(!svg.contains("0.0"));
        assert!(!svg.contains("0em"));
    }

    #[test]
    fn convert_all_never_invents_or_duplicates_ids() {
        let dom = parse_html(
            r#"<div class="diagram" id="x"><svg width="10" height="10"></svg></div><div class="diagram" id="bad"><svg width="0" height="10"></svg></div><div class="diagram" id="x"><svg width="5" height="5"></svg></div>"#,
        );
        let sources = find_diagrams(&body(&dom));
        assert_eq!(sources.len(), 3);
        let images = DiagramExtractor::default().convert_all(&sources);
        let keys: Vec<_> = images.keys().cloned().collect();
        assert_eq!(keys, vec!["x".to_string()]);
        assert_eq!(images["x"].width, 10.0);
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(60.0), "60");
        assert_eq!(format_number(12.5), "12.5");
        assert_eq!(format_number(1.0 / 3.0), "0.33");
        assert_eq!(parse_length("12pt"), Some(16.0));
        assert_eq!(parse_length("1.5em"), Some(24.0));
        assert_eq!(parse_length("1e2"), Some(100.0));
        assert_eq!(parse_length("50%"), None);
        assert_eq!(parse_length("auto"), None);
    }
}
