//! Print export: fit diagrams to the page, print, then put the tree back.
//!
//! The live tree is changed only while a [`DiagramSubstitution`] is held. It
//! swaps each diagram graphic for a resized copy and injects `@page` styling;
//! `release` (or drop) puts the original nodes back, so the tree serializes
//! exactly as before whether printing succeeded, failed or was cancelled.

use crate::dom::{
    append_child, attr_get, deep_clone, find_element, new_element, new_text, owner_root, parent_of,
    remove_attr, remove_child, replace_child, set_attr,
};
use crate::error::Result;
use crate::export::RenderBarrier;
use crate::geometry::PageGeometry;
use crate::options::ExportOptions;
use crate::progress::{CancelToken, ProgressReporter, Stage};
use crate::svg::{find_diagrams, format_number, resolve_dimensions};
use markup5ever_rcdom::Handle;
use std::time::Duration;

/// Pixels of the printable box kept free for diagram borders and padding.
pub const PRINT_RESERVE_PX: f64 = 32.0;

const HTML_NS: &str = "http://www.w3.org/1999/xhtml";

/// The platform print facility.
pub trait PrintHost {
    /// Starts printing the (substituted) tree.
    fn print(&mut self, root: &Handle) -> Result<()>;

    /// Blocks until printing finishes or `timeout` elapses; `false` on timeout.
    fn wait_for_completion(&mut self, timeout: Duration) -> bool;
}

/// Uniform scale that fits `natural` into `available`. Never above 1.
pub fn print_scale(natural: (f64, f64), available: (f64, f64)) -> f64 {
    let (w, h) = natural;
    let (aw, ah) = available;
    if !(w > 0.0 && h > 0.0) {
        return 1.0;
    }
    (aw / w).min(ah / h).clamp(0.0, 1.0)
}

/// Printable box in pixels after the border reserve.
pub fn available_px(geometry: &PageGeometry) -> (f64, f64) {
    let (w, h) = geometry.content_box_px();
    (
        (w - PRINT_RESERVE_PX).max(1.0),
        (h - PRINT_RESERVE_PX).max(1.0),
    )
}

fn page_css(geometry: &PageGeometry) -> String {
    let m = &geometry.margins;
    format!(
        "@page {{ size: {} {}; margin: {}pt {}pt {}pt {}pt; }}\n.diagram {{ page-break-inside: avoid; break-inside: avoid; }}\n",
        geometry.size.css_name(),
        geometry.orientation.css_name(),
        format_number(m.top),
        format_number(m.right),
        format_number(m.bottom),
        format_number(m.left),
    )
}

struct Swap {
    parent: Handle,
    original: Handle,
    replacement: Handle,
}

/// Scoped substitution of print-fitted diagrams into the live tree.
pub struct DiagramSubstitution {
    swaps: Vec<Swap>,
    style: Option<(Handle, Handle)>,
    released: bool,
}

impl DiagramSubstitution {
    /// Replaces every diagram graphic under `root` and injects page styling.
    pub fn apply(root: &Handle, geometry: &PageGeometry) -> Self {
        let available = available_px(geometry);
        let mut swaps = Vec::new();
        for source in find_diagrams(root) {
            let Some(parent) = parent_of(&source.graphic) else {
                continue;
            };
            let (w, h) = resolve_dimensions(&source.graphic);
            let scale = print_scale((w, h), available);
            let replacement = deep_clone(&source.graphic);
            if attr_get(&replacement, "viewBox").is_none() {
                set_attr(
                    &replacement,
                    "viewBox",
                    &format!("0 0 {} {}", format_number(w), format_number(h)),
                );
            }
            set_attr(&replacement, "width", &format_number(w * scale));
            set_attr(&replacement, "height", &format_number(h * scale));
            remove_attr(&replacement, "style");
            if replace_child(&parent, &source.graphic, replacement.clone()).is_some() {
                log::debug!("print: diagram {} scaled by {:.3}", source.id, scale);
                swaps.push(Swap {
                    parent,
                    original: source.graphic,
                    replacement,
                });
            }
        }

        let style_parent = style_host(root);
        let style = new_element(HTML_NS, "style", &[("media", "print".to_string())]);
        append_child(&style, new_text(&page_css(geometry)));
        append_child(&style_parent, style.clone());

        Self {
            swaps,
            style: Some((style_parent, style)),
            released: false,
        }
    }

    pub fn len(&self) -> usize {
        self.swaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.swaps.is_empty()
    }

    /// Restores every original graphic and removes the injected styling.
    pub fn release(mut self) {
        self.restore();
    }

    fn restore(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        for swap in self.swaps.drain(..).rev() {
            if replace_child(&swap.parent, &swap.replacement, swap.original).is_none() {
                log::warn!("print: substituted diagram was moved; original not restored");
            }
        }
        if let Some((parent, style)) = self.style.take() {
            remove_child(&parent, &style);
        }
    }
}

impl Drop for DiagramSubstitution {
    fn drop(&mut self) {
        self.restore();
    }
}

/// `<head>` of the document containing `root`, else `root` itself.
fn style_host(root: &Handle) -> Handle {
    find_element(&owner_root(root), "head").unwrap_or_else(|| root.clone())
}

#[derive(Debug, Clone, Default)]
pub struct PrintExportCoordinator {
    options: ExportOptions,
}

impl PrintExportCoordinator {
    pub fn new(options: ExportOptions) -> Self {
        Self { options }
    }

    /// Prints `root` through `host`. The tree is restored on every exit path.
    pub fn print(
        &self,
        root: &Handle,
        host: &mut dyn PrintHost,
        barrier: &dyn RenderBarrier,
        progress: &mut ProgressReporter<'_>,
        cancel: &CancelToken,
    ) -> Result<()> {
        cancel.check()?;
        barrier.complete_pending(root)?;
        cancel.check()?;

        let geometry = self.options.geometry();
        let substitution = DiagramSubstitution::apply(root, &geometry);
        progress.report(
            Stage::Generating,
            0.3,
            format!("fitted {} diagrams to the page", substitution.len()),
        );
        let outcome = self.run_host(root, host, progress, cancel);
        substitution.release();
        if outcome.is_ok() {
            progress.report(Stage::Generating, 1.0, "print complete");
        }
        outcome
    }

    fn run_host(
        &self,
        root: &Handle,
        host: &mut dyn PrintHost,
        progress: &mut ProgressReporter<'_>,
        cancel: &CancelToken,
    ) -> Result<()> {
        cancel.check()?;
        progress.report(Stage::Generating, 0.5, "printing");
        host.print(root)?;
        let timeout = self.options.print_completion_timeout();
        if !host.wait_for_completion(timeout) {
            log::warn!(
                "print completion not signalled within {} ms; continuing",
                timeout.as_millis()
            );
        }
        cancel.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::dom::{body, parse_html, serialize_html};
    use crate::export::NoPendingRenders;
    use crate::geometry::{Margins, Orientation, PageSize};

    const DOC: &str = r#"<html><head><title>t</title></head><body>
        <div class="diagram" id="big"><svg width="2000" height="500" style="max-width: 100%"><rect width="5" height="5"/></svg></div>
        <p>text</p>
        <div class="diagram" id="small"><svg viewBox="0 0 100 50"><circle r="3"/></svg></div>
        </body></html>"#;

    #[derive(Default)]
    struct RecordingHost {
        seen: Option<String>,
        complete: bool,
        fail: bool,
    }

    impl PrintHost for RecordingHost {
        fn print(&mut self, root: &Handle) -> Result<()> {
            self.seen = Some(serialize_html(&owner_root(root))?);
            if self.fail {
                return Err(Error::Print("printer on fire".into()));
            }
            Ok(())
        }

        fn wait_for_completion(&mut self, _timeout: Duration) -> bool {
            self.complete
        }
    }

    fn snapshot(html: &str) -> (markup5ever_rcdom::RcDom, String) {
        let dom = parse_html(html);
        let before = serialize_html(&dom.document).unwrap();
        (dom, before)
    }

    fn coordinator() -> PrintExportCoordinator {
        PrintExportCoordinator::new(ExportOptions {
            page_size: PageSize::Letter,
            orientation: Orientation::Portrait,
            margins: Margins::uniform(72.0),
            ..Default::default()
        })
    }

    #[test]
    fn scale_is_capped_at_one() {
        assert_eq!(print_scale((100.0, 100.0), (600.0, 800.0)), 1.0);
        assert_eq!(print_scale((1200.0, 100.0), (600.0, 800.0)), 0.5);
        assert_eq!(print_scale((100.0, 1600.0), (600.0, 800.0)), 0.5);
    }

    #[test]
    fn substitutes_during_print_and_restores_after_success() {
        let (dom, before) = snapshot(DOC);
        let mut host = RecordingHost {
            complete: true,
            ..Default::default()
        };
        coordinator()
            .print(
                &body(&dom),
                &mut host,
                &NoPendingRenders,
                &mut ProgressReporter::silent(),
                &CancelToken::new(),
            )
            .unwrap();

        let during = host.seen.unwrap();
        // Letter content box is 6.5in = 624px, minus the reserve
        assert!(during.contains(r#"width="592" height="148""#));
        assert!(during.contains(r#"viewBox="0 0 2000 500""#));
        assert!(during.contains("@page { size: letter portrait; margin: 72pt 72pt 72pt 72pt; }"));
        assert!(!during.contains("max-width"));
        assert_eq!(serialize_html(&dom.document).unwrap(), before);
    }

    #[test]
    fn restores_after_host_failure_and_timeout() {
        let (dom, before) = snapshot(DOC);
        let mut host = RecordingHost {
            fail: true,
            ..Default::default()
        };
        let err = coordinator()
            .print(
                &body(&dom),
                &mut host,
                &NoPendingRenders,
                &mut ProgressReporter::silent(),
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Print(_)));
        assert_eq!(serialize_html(&dom.document).unwrap(), before);

        let mut host = RecordingHost::default();
        coordinator()
            .print(
                &body(&dom),
                &mut host,
                &NoPendingRenders,
                &mut ProgressReporter::silent(),
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(serialize_html(&dom.document).unwrap(), before);
    }

    #[test]
    fn cancellation_after_substitution_restores_tree() {
        let (dom, before) = snapshot(DOC);
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let mut progress = ProgressReporter::new(move |p: &crate::progress::Progress| {
            if p.message.starts_with("fitted") {
                trigger.cancel();
            }
        });
        let mut host = RecordingHost::default();
        let err = coordinator()
            .print(&body(&dom), &mut host, &NoPendingRenders, &mut progress, &cancel)
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(host.seen.is_none());
        assert_eq!(serialize_html(&dom.document).unwrap(), before);
    }

    #[test]
    fn already_cancelled_does_nothing() {
        let (dom, before) = snapshot(DOC);
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut host = RecordingHost::default();
        let err = coordinator()
            .print(
                &body(&dom),
                &mut host,
                &NoPendingRenders,
                &mut ProgressReporter::silent(),
                &cancel,
            )
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(serialize_html(&dom.document).unwrap(), before);
    }

    #[test]
    fn dropping_the_guard_restores() {
        let (dom, before) = snapshot(DOC);
        let geometry = ExportOptions::default().geometry();
        {
            let sub = DiagramSubstitution::apply(&body(&dom), &geometry);
            assert_eq!(sub.len(), 2);
            assert_ne!(serialize_html(&dom.document).unwrap(), before);
        }
        assert_eq!(serialize_html(&dom.document).unwrap(), before);
    }
}
