//! Export orchestration: collect, convert, generate, deliver.

use crate::collect::ContentCollector;
use crate::docx::{self, DOCX_MIME};
use crate::dom::owner_root;
use crate::error::{Error, Result};
use crate::model::{CollectedContent, ConvertedImage};
use crate::options::ExportOptions;
use crate::print::{PrintExportCoordinator, PrintHost};
use crate::progress::{CancelToken, Progress, ProgressReporter, Stage};
use crate::svg::{find_diagrams, DiagramExtractor};
use markup5ever_rcdom::Handle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Docx,
    Print,
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docx" => Ok(ExportFormat::Docx),
            "print" => Ok(ExportFormat::Print),
            _ => Err(Error::UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Docx => "docx",
            ExportFormat::Print => "print",
        })
    }
}

/// Forces upstream diagram rendering to finish before the tree is read.
pub trait RenderBarrier {
    fn complete_pending(&self, root: &Handle) -> Result<()>;
}

/// Barrier for trees that are already fully rendered.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPendingRenders;

impl RenderBarrier for NoPendingRenders {
    fn complete_pending(&self, _root: &Handle) -> Result<()> {
        Ok(())
    }
}

/// A finished document ready to be saved.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Receives the finished document.
pub trait Delivery {
    fn deliver(&mut self, artifact: Artifact) -> Result<()>;
}

/// File name for a document titled `title`.
pub fn artifact_file_name(title: &str, extension: &str) -> String {
    let mut stem = String::new();
    for word in title.split_whitespace() {
        let cleaned: String = word
            .chars()
            .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
            .collect();
        let cleaned = cleaned.trim_matches('.');
        if cleaned.is_empty() {
            continue;
        }
        if !stem.is_empty() {
            stem.push('_');
        }
        stem.push_str(cleaned);
    }
    if stem.is_empty() {
        stem.push_str("document");
    }
    format!("{}.{}", stem, extension)
}

pub struct ExportOrchestrator<'a> {
    options: ExportOptions,
    barrier: Box<dyn RenderBarrier + 'a>,
    progress: ProgressReporter<'a>,
    cancel: CancelToken,
}

impl<'a> ExportOrchestrator<'a> {
    pub fn new(options: ExportOptions) -> Self {
        Self {
            options,
            barrier: Box::new(NoPendingRenders),
            progress: ProgressReporter::silent(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_barrier(mut self, barrier: impl RenderBarrier + 'a) -> Self {
        self.barrier = Box::new(barrier);
        self
    }

    pub fn on_progress(mut self, sink: impl FnMut(&Progress) + 'a) -> Self {
        self.progress = ProgressReporter::new(sink);
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Runs the export named by `format`. An unknown format fails before any work.
    pub fn export(
        &mut self,
        root: &Handle,
        format: &str,
        delivery: &mut dyn Delivery,
        host: &mut dyn PrintHost,
    ) -> Result<()> {
        match format.parse::<ExportFormat>()? {
            ExportFormat::Docx => self.export_docx(root, delivery),
            ExportFormat::Print => self.export_print(root, host),
        }
    }

    /// Builds a `.docx` from `root` and hands it to `delivery`.
    pub fn export_docx(&mut self, root: &Handle, delivery: &mut dyn Delivery) -> Result<()> {
        self.progress.reset();
        let (content, images) = self.prepare(root, true)?;

        self.cancel.check()?;
        self.progress
            .report(Stage::Generating, 0.0, "generating document");
        let bytes = docx::generate(&content, &images, &self.options)
            .map_err(|e| e.during(Stage::Generating.label()))?;
        log::info!("generated {} byte document", bytes.len());
        self.progress
            .report(Stage::Generating, 1.0, "document generated");

        self.cancel.check()?;
        let title = self.options.title.as_deref().unwrap_or(&content.title);
        let artifact = Artifact {
            file_name: artifact_file_name(title, "docx"),
            mime_type: DOCX_MIME.to_string(),
            bytes,
        };
        self.progress
            .report(Stage::Downloading, 0.0, format!("saving {}", artifact.file_name));
        delivery
            .deliver(artifact)
            .map_err(|e| e.during(Stage::Downloading.label()))?;
        self.progress.report(Stage::Downloading, 1.0, "export complete");
        Ok(())
    }

    /// Prints `root` through `host`, leaving the tree as it was found.
    pub fn export_print(&mut self, root: &Handle, host: &mut dyn PrintHost) -> Result<()> {
        self.progress.reset();
        self.prepare(root, false)?;

        self.cancel.check()?;
        self.progress
            .report(Stage::Generating, 0.0, "preparing print layout");
        PrintExportCoordinator::new(self.options.clone())
            .print(
                root,
                host,
                self.barrier.as_ref(),
                &mut self.progress,
                &self.cancel,
            )
            .map_err(|e| e.during(Stage::Generating.label()))?;
        self.progress.report(Stage::Downloading, 1.0, "print finished");
        Ok(())
    }

    /// Collection plus, when `convert` is set and enabled, diagram conversion.
    fn prepare(
        &mut self,
        root: &Handle,
        convert: bool,
    ) -> Result<(CollectedContent, BTreeMap<String, ConvertedImage>)> {
        self.cancel.check()?;
        self.barrier
            .complete_pending(root)
            .map_err(|e| e.during(Stage::Collecting.label()))?;

        self.cancel.check()?;
        self.progress
            .report(Stage::Collecting, 0.0, "collecting content");
        let content = ContentCollector::with_policy(self.options.container_policy).collect(root);
        log::info!(
            "collected {} nodes, {} words, {} diagrams",
            content.nodes.len(),
            content.metadata.word_count,
            content.metadata.diagram_count
        );
        self.progress.report(
            Stage::Collecting,
            1.0,
            format!("collected {} nodes", content.nodes.len()),
        );

        let mut images = BTreeMap::new();
        if convert {
            self.cancel.check()?;
            if self.options.convert_diagrams {
                self.progress
                    .report(Stage::Converting, 0.0, "converting diagrams");
                let sources = find_diagrams(root);
                images = DiagramExtractor::new(&owner_root(root)).convert_all(&sources);
                log::info!("converted {}/{} diagrams", images.len(), sources.len());
                self.progress.report(
                    Stage::Converting,
                    1.0,
                    format!("converted {} diagrams", images.len()),
                );
            } else {
                self.progress
                    .report(Stage::Converting, 1.0, "diagram conversion disabled");
            }
        }
        Ok((content, images))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{body, parse_html};
    use std::cell::RefCell;
    use std::time::Duration;

    #[derive(Default)]
    struct Collect {
        artifacts: Vec<Artifact>,
        fail: bool,
    }

    impl Delivery for Collect {
        fn deliver(&mut self, artifact: Artifact) -> Result<()> {
            if self.fail {
                return Err(Error::Io(std::io::Error::other("disk full")));
            }
            self.artifacts.push(artifact);
            Ok(())
        }
    }

    struct NoPrinter;

    impl PrintHost for NoPrinter {
        fn print(&mut self, _root: &Handle) -> Result<()> {
            Ok(())
        }

        fn wait_for_completion(&mut self, _timeout: Duration) -> bool {
            true
        }
    }

    struct FailingBarrier;

    impl RenderBarrier for FailingBarrier {
        fn complete_pending(&self, _root: &Handle) -> Result<()> {
            Err(Error::Encoding("renderer crashed".into()))
        }
    }

    #[test]
    fn format_parsing() {
        assert_eq!("DOCX".parse::<ExportFormat>().unwrap(), ExportFormat::Docx);
        assert_eq!(" print ".parse::<ExportFormat>().unwrap(), ExportFormat::Print);
        assert!(matches!(
            "pdf".parse::<ExportFormat>(),
            Err(Error::UnsupportedFormat(f)) if f == "pdf"
        ));
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(artifact_file_name("My Report: Q3/Q4", "docx"), "My_Report_Q3Q4.docx");
        assert_eq!(artifact_file_name("  ../..  ", "docx"), "document.docx");
        assert_eq!(artifact_file_name("v1.2 notes", "docx"), "v1.2_notes.docx");
    }

    #[test]
    fn unsupported_format_fails_before_any_work() {
        let dom = parse_html("<h1>T</h1>");
        let events = RefCell::new(Vec::new());
        let mut delivery = Collect::default();
        let err = ExportOrchestrator::new(ExportOptions::default())
            .on_progress(|p: &Progress| events.borrow_mut().push(p.clone()))
            .export(&body(&dom), "pdf", &mut delivery, &mut NoPrinter)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
        assert!(events.borrow().is_empty());
        assert!(delivery.artifacts.is_empty());
    }

    #[test]
    fn docx_export_reports_every_stage_monotonically() {
        let dom = parse_html("<h1>Quarterly Plan</h1><p>hello</p>");
        let events = RefCell::new(Vec::new());
        let mut delivery = Collect::default();
        ExportOrchestrator::new(ExportOptions::default())
            .on_progress(|p: &Progress| events.borrow_mut().push(p.clone()))
            .export(&body(&dom), "docx", &mut delivery, &mut NoPrinter)
            .unwrap();

        let events = events.into_inner();
        let stages: Vec<Stage> = events.iter().map(|p| p.stage).collect();
        for stage in [
            Stage::Collecting,
            Stage::Converting,
            Stage::Generating,
            Stage::Downloading,
        ] {
            assert!(stages.contains(&stage), "missing {stage}");
        }
        assert!(events.windows(2).all(|w| w[0].percent <= w[1].percent));
        assert_eq!(events.last().map(|p| p.percent), Some(100));

        assert_eq!(delivery.artifacts.len(), 1);
        assert_eq!(delivery.artifacts[0].file_name, "Quarterly_Plan.docx");
        assert_eq!(delivery.artifacts[0].mime_type, DOCX_MIME);
        assert!(delivery.artifacts[0].bytes.starts_with(b"PK"));
    }

    #[test]
    fn print_export_skips_conversion() {
        let dom = parse_html(r#"<div class="diagram"><svg width="10" height="10"></svg></div>"#);
        let events = RefCell::new(Vec::new());
        ExportOrchestrator::new(ExportOptions::default())
            .on_progress(|p: &Progress| events.borrow_mut().push(p.stage))
            .export_print(&body(&dom), &mut NoPrinter)
            .unwrap();
        let events = events.into_inner();
        assert!(!events.contains(&Stage::Converting));
        assert_eq!(events.last(), Some(&Stage::Downloading));
    }

    #[test]
    fn stage_failures_are_wrapped_but_cancellation_is_not() {
        let dom = parse_html("<p>x</p>");
        let mut delivery = Collect {
            fail: true,
            ..Default::default()
        };
        let err = ExportOrchestrator::new(ExportOptions::default())
            .export_docx(&body(&dom), &mut delivery)
            .unwrap_err();
        assert!(matches!(err, Error::ExportFailed { stage: "downloading", .. }));

        let err = ExportOrchestrator::new(ExportOptions::default())
            .with_barrier(FailingBarrier)
            .export_docx(&body(&dom), &mut Collect::default())
            .unwrap_err();
        assert!(matches!(err, Error::ExportFailed { stage: "collecting", .. }));

        let token = CancelToken::new();
        token.cancel();
        let mut delivery = Collect::default();
        let err = ExportOrchestrator::new(ExportOptions::default())
            .with_cancel_token(token)
            .export_docx(&body(&dom), &mut delivery)
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(delivery.artifacts.is_empty());
    }
}
