//! Export a rendered HTML tree to a Word document or a print-ready page.
//!
//! The pipeline reads a live `markup5ever_rcdom` tree:
//!
//! 1. [`collect::ContentCollector`] flattens it into a [`model::CollectedContent`].
//! 2. [`svg::DiagramExtractor`] turns each `.diagram` graphic into a standalone SVG.
//! 3. [`docx::DocxGenerator`] writes the `.docx` package, or
//!    [`print::PrintExportCoordinator`] prints the tree with page-fitted diagrams.
//!
//! [`export::ExportOrchestrator`] runs these in order with progress reporting and
//! cancellation.
//!
//! ```no_run
//! use doc_export::{dom, ExportOptions, ExportOrchestrator, Artifact, Delivery};
//!
//! struct Keep(Vec<Artifact>);
//! impl Delivery for Keep {
//!     fn deliver(&mut self, a: Artifact) -> doc_export::Result<()> {
//!         self.0.push(a);
//!         Ok(())
//!     }
//! }
//!
//! let tree = dom::parse_html("<h1>Notes</h1><p>Some <b>bold</b> text.</p>");
//! let mut out = Keep(Vec::new());
//! ExportOrchestrator::new(ExportOptions::default())
//!     .export_docx(&dom::body(&tree), &mut out)?;
//! # Ok::<(), doc_export::Error>(())
//! ```

pub mod collect;
pub mod docx;
pub mod dom;
pub mod error;
pub mod export;
pub mod geometry;
pub mod inline;
pub mod model;
pub mod options;
pub mod print;
pub mod progress;
pub mod svg;

pub use collect::ContentCollector;
pub use docx::DocxGenerator;
pub use error::{Error, Result};
pub use export::{
    Artifact, Delivery, ExportFormat, ExportOrchestrator, NoPendingRenders, RenderBarrier,
};
pub use geometry::{Margins, Orientation, PageGeometry, PageSize};
pub use model::{CollectedContent, ContentNode, ConvertedImage, ImageFormat, NodeKind};
pub use options::{ContainerPolicy, ExportOptions};
pub use print::{DiagramSubstitution, PrintExportCoordinator, PrintHost};
pub use progress::{CancelToken, Progress, ProgressReporter, Stage};
pub use svg::{DiagramExtractor, DiagramSource};
