use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use doc_export::dom::{body, owner_root, parse_html, serialize_html};
use doc_export::{
    Artifact, ContainerPolicy, ContentCollector, Delivery, ExportOptions, ExportOrchestrator,
    Margins, Orientation, PageSize, PrintHost, Progress,
};
use markup5ever_rcdom::Handle;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input HTML file (a full document or a fragment).
    #[arg(long)]
    html_file: PathBuf,

    /// Output path. Defaults to a name derived from the document title.
    #[arg(long)]
    out: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Format::Docx)]
    format: Format,

    /// JSON file with export options; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Document title metadata (defaults to the first top-level heading).
    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    author: Option<String>,

    /// Start the document with a title paragraph (and author line).
    #[arg(long)]
    include_title: bool,

    #[arg(long, value_enum)]
    page_size: Option<PageSizeArg>,

    #[arg(long, value_enum)]
    orientation: Option<OrientationArg>,

    /// Uniform page margin in points.
    #[arg(long)]
    margin: Option<f64>,

    /// Leave diagrams out of the document instead of embedding them as SVG.
    #[arg(long)]
    no_diagrams: bool,

    /// Keep generic containers with several blocks as groups instead of dropping them.
    #[arg(long)]
    group_containers: bool,

    /// Print the collected content model as JSON and exit.
    #[arg(long)]
    dump_model: bool,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Docx,
    Print,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum PageSizeArg {
    A3,
    A4,
    A5,
    Letter,
    Legal,
    Tabloid,
}

impl From<PageSizeArg> for PageSize {
    fn from(arg: PageSizeArg) -> Self {
        match arg {
            PageSizeArg::A3 => PageSize::A3,
            PageSizeArg::A4 => PageSize::A4,
            PageSizeArg::A5 => PageSize::A5,
            PageSizeArg::Letter => PageSize::Letter,
            PageSizeArg::Legal => PageSize::Legal,
            PageSizeArg::Tabloid => PageSize::Tabloid,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum OrientationArg {
    Portrait,
    Landscape,
}

impl From<OrientationArg> for Orientation {
    fn from(arg: OrientationArg) -> Self {
        match arg {
            OrientationArg::Portrait => Orientation::Portrait,
            OrientationArg::Landscape => Orientation::Landscape,
        }
    }
}

/// Writes the finished document to `out`, or next to the input under the artifact's name.
struct FileDelivery {
    out: Option<PathBuf>,
    fallback_dir: PathBuf,
    written: Option<PathBuf>,
}

impl Delivery for FileDelivery {
    fn deliver(&mut self, artifact: Artifact) -> doc_export::Result<()> {
        let path = self
            .out
            .clone()
            .unwrap_or_else(|| self.fallback_dir.join(&artifact.file_name));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &artifact.bytes)?;
        log::info!("wrote {} ({} bytes)", path.display(), artifact.bytes.len());
        self.written = Some(path);
        Ok(())
    }
}

/// "Prints" by saving the substituted, page-styled tree as a standalone HTML file.
struct SnapshotPrintHost {
    out: PathBuf,
    done: bool,
}

impl PrintHost for SnapshotPrintHost {
    fn print(&mut self, root: &Handle) -> doc_export::Result<()> {
        let markup = serialize_html(&owner_root(root))?;
        if let Some(parent) = self.out.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.out, format!("<!DOCTYPE html>\n{}", markup))?;
        self.done = true;
        Ok(())
    }

    fn wait_for_completion(&mut self, _timeout: Duration) -> bool {
        self.done
    }
}

fn load_options(args: &Args) -> Result<ExportOptions> {
    let mut options = match &args.config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            ExportOptions::from_json(&json)
                .with_context(|| format!("parse config {}", path.display()))?
        }
        None => ExportOptions::default(),
    };
    if let Some(size) = args.page_size {
        options.page_size = size.into();
    }
    if let Some(orientation) = args.orientation {
        options.orientation = orientation.into();
    }
    if let Some(margin) = args.margin {
        if margin.is_nan() || margin < 0.0 {
            return Err(anyhow!("margin must be a non-negative number of points"));
        }
        options.margins = Margins::uniform(margin);
    }
    if args.title.is_some() {
        options.title = args.title.clone();
    }
    if args.author.is_some() {
        options.author = args.author.clone();
    }
    if args.include_title {
        options.include_title = true;
    }
    if args.no_diagrams {
        options.convert_diagrams = false;
    }
    if args.group_containers {
        options.container_policy = ContainerPolicy::Group;
    }
    Ok(options)
}

fn print_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    input.with_file_name(format!("{}.print.html", stem))
}

fn main() -> Result<()> {
    let args = Args::parse();
    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let html = fs::read_to_string(&args.html_file)
        .with_context(|| format!("read {}", args.html_file.display()))?;
    let options = load_options(&args)?;

    let dom = parse_html(&html);
    let root = body(&dom);

    if args.dump_model {
        let content = ContentCollector::with_policy(options.container_policy).collect(&root);
        println!(
            "{}",
            serde_json::to_string_pretty(&content).context("serialize content model")?
        );
        return Ok(());
    }

    let mut orchestrator = ExportOrchestrator::new(options).on_progress(|p: &Progress| {
        log::info!("[{:>3}%] {}: {}", p.percent, p.stage, p.message)
    });

    match args.format {
        Format::Docx => {
            let fallback_dir = args
                .html_file
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            let mut delivery = FileDelivery {
                out: args.out.clone(),
                fallback_dir,
                written: None,
            };
            orchestrator
                .export_docx(&root, &mut delivery)
                .context("export docx")?;
            if let Some(path) = delivery.written {
                println!("{}", path.display());
            }
        }
        Format::Print => {
            let out = args
                .out
                .clone()
                .unwrap_or_else(|| print_output_path(&args.html_file));
            let mut host = SnapshotPrintHost {
                out: out.clone(),
                done: false,
            };
            orchestrator
                .export_print(&root, &mut host)
                .context("export print")?;
            println!("{}", out.display());
        }
    }
    Ok(())
}
