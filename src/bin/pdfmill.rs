//! CLI binary for pdfmill.
//!
//! A thin shim over the library crate that maps subcommands and flags onto
//! `PdfEngine` calls and prints results.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdfmill::{
    DocumentHandle, EngineConfig, NumberFormat, PageNumberSpec, PdfEngine, Position,
    RotationEntry, RotationSpec, SplitMethod,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI definition ───────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "pdfmill",
    version,
    about = "PDF transformations with automatic backend fallback",
    long_about = "Page count, text extraction, rotation, merge, split, page numbering, and \
                  chunked OCR. Each operation tries an ordered chain of backends (lopdf, \
                  pdf-extract, qpdf, poppler, ghostscript, tesseract) and falls back \
                  automatically when one is missing or chokes on the input."
)]
struct Cli {
    /// Fail on malformed page-range strings instead of dropping bad tokens
    #[arg(long, global = true)]
    strict: bool,

    /// Per-tool timeout in seconds for external backends
    #[arg(long, global = true, default_value_t = 120)]
    timeout: u64,

    /// Verbose logging (or set RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the page count
    Info {
        input: PathBuf,
    },

    /// Extract the text layer
    Extract {
        input: PathBuf,
        /// Page range, e.g. "1-3,5" (default: all pages)
        #[arg(long)]
        pages: Option<String>,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Rotate pages
    Rotate {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Rotation angle in degrees (any integer; normalized to 0/90/180/270)
        #[arg(long, conflicts_with = "spec")]
        angle: Option<i32>,
        /// Pages to rotate, e.g. "1-3,5" (default: all pages)
        #[arg(long, conflicts_with = "spec")]
        pages: Option<String>,
        /// JSON rotation spec: '[{"pages":"1-3","angle":90},…]'
        #[arg(long)]
        spec: Option<String>,
    },

    /// Merge documents in the given order
    Merge {
        #[arg(required = true, num_args = 2..)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Split a document into parts
    Split {
        input: PathBuf,
        /// Output directory for the parts
        #[arg(short, long)]
        output: PathBuf,
        /// One part per range token, e.g. "1-3,5" makes two parts
        #[arg(long, group = "method")]
        ranges: Option<String>,
        /// Every page as its own document
        #[arg(long, group = "method")]
        extract: bool,
        /// Parts of N pages each
        #[arg(long, group = "method", value_name = "N")]
        every: Option<usize>,
        /// Print a JSON listing of the parts
        #[arg(long)]
        json: bool,
    },

    /// Stamp page numbers
    Paginate {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// numeric, roman, or alphabetic
        #[arg(long, default_value = "numeric")]
        format: String,
        /// top-left, top-center, top-right, bottom-left, bottom-center, bottom-right
        #[arg(long, default_value = "bottom-center")]
        position: String,
        /// Number assigned to page 1
        #[arg(long, default_value_t = 1)]
        start: u32,
        #[arg(long, default_value = "")]
        prefix: String,
        #[arg(long, default_value = "")]
        suffix: String,
        /// Leave page 1 unnumbered (later pages keep their document position)
        #[arg(long)]
        skip_first: bool,
        /// Pages to number, e.g. "2-99" (default: all pages)
        #[arg(long)]
        pages: Option<String>,
    },

    /// Produce a searchable PDF via chunked OCR
    Ocr {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Tesseract language code
        #[arg(short, long, default_value = "eng")]
        language: String,
        /// Pages per OCR chunk
        #[arg(long)]
        chunk_size: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "pdfmill=debug" } else { "pdfmill=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = EngineConfig::builder()
        .strict_selectors(cli.strict)
        .tool_timeout_secs(cli.timeout)
        .build()?;
    let engine = PdfEngine::new(config)?;

    match cli.command {
        Command::Info { input } => {
            let doc = DocumentHandle::open(&input)?;
            let pages = engine.page_count(&doc).await?;
            println!("{}: {} page(s)", input.display(), bold(&pages.to_string()));
        }

        Command::Extract {
            input,
            pages,
            output,
        } => {
            let doc = DocumentHandle::open(&input)?;
            let text = engine.extract_text(&doc, pages.as_deref()).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &text)
                        .with_context(|| format!("writing {}", path.display()))?;
                    eprintln!("{} {} bytes -> {}", green("✓"), text.len(), path.display());
                }
                None => print!("{text}"),
            }
        }

        Command::Rotate {
            input,
            output,
            angle,
            pages,
            spec,
        } => {
            let doc = DocumentHandle::open(&input)?;
            let total = engine.page_count(&doc).await? as u32;

            let rotation = match (spec, angle) {
                (Some(json), _) => parse_rotation_json(&engine, &json, total)?,
                (None, Some(angle)) => {
                    let selector =
                        engine.parse_selector(pages.as_deref().unwrap_or(""), total)?;
                    RotationSpec::uniform(selector, angle)
                }
                (None, None) => bail!("provide --angle or --spec"),
            };

            let rotated = engine.rotate(&doc, &rotation).await?;
            rotated.persist(&output)?;
            eprintln!("{} rotated -> {}", green("✓"), output.display());
        }

        Command::Merge { inputs, output } => {
            let docs = inputs
                .iter()
                .map(DocumentHandle::open)
                .collect::<Result<Vec<_>, _>>()?;
            let merged = engine.merge(&docs).await?;
            merged.persist(&output)?;
            let pages = engine.page_count(&DocumentHandle::open(&output)?).await?;
            eprintln!(
                "{} merged {} documents ({} pages) -> {}",
                green("✓"),
                inputs.len(),
                pages,
                output.display()
            );
        }

        Command::Split {
            input,
            output,
            ranges,
            extract,
            every,
            json,
        } => {
            let method = match (ranges, extract, every) {
                (Some(spec), false, None) => SplitMethod::Ranges(spec),
                (None, true, None) => SplitMethod::Extract,
                (None, false, Some(n)) => SplitMethod::EveryN(n),
                _ => bail!("choose one of --ranges, --extract, --every"),
            };

            let doc = DocumentHandle::open(&input)?;
            let parts = engine.split(&doc, &method).await?;
            if parts.is_empty() {
                bail!("no valid parts selected");
            }

            std::fs::create_dir_all(&output)
                .with_context(|| format!("creating {}", output.display()))?;
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "part".into());

            let mut listing = Vec::new();
            for (i, part) in parts.iter().enumerate() {
                let name = format!("{}-{}.pdf", stem, i + 1);
                let dest = output.join(&name);
                part.handle.persist(&dest)?;
                listing.push(serde_json::json!({
                    "filename": name,
                    "pages": part.pages.to_range_string(),
                    "page_count": part.pages.len(),
                }));
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                eprintln!(
                    "{} {} part(s) -> {}",
                    green("✓"),
                    parts.len(),
                    output.display()
                );
            }
        }

        Command::Paginate {
            input,
            output,
            format,
            position,
            start,
            prefix,
            suffix,
            skip_first,
            pages,
        } => {
            let spec = PageNumberSpec {
                format: parse_format(&format)?,
                position: parse_position(&position)?,
                start_number: start,
                prefix,
                suffix,
                skip_first_page: skip_first,
                selector: pages,
                ..Default::default()
            };
            let doc = DocumentHandle::open(&input)?;
            let numbered = engine.paginate(&doc, &spec).await?;
            numbered.persist(&output)?;
            eprintln!("{} numbered -> {}", green("✓"), output.display());
        }

        Command::Ocr {
            input,
            output,
            language,
            chunk_size,
        } => {
            let doc = DocumentHandle::open(&input)?;
            let total = engine.page_count(&doc).await?;
            let chunk = chunk_size.unwrap_or(engine.config().chunk_size);
            let chunks = total.div_ceil(chunk);
            eprintln!(
                "{} {} pages, {} chunk(s) of ≤{}",
                dim("→"),
                total,
                chunks,
                chunk
            );

            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner:.cyan} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.set_message(format!("OCR in progress ({language})…"));
            bar.enable_steady_tick(Duration::from_millis(80));

            let result = engine.ocr(&doc, Some(&language), chunk_size).await;
            bar.finish_and_clear();

            let searchable = result?;
            searchable.persist(&output)?;
            eprintln!(
                "{} searchable PDF ({} pages) -> {}",
                green("✓"),
                total,
                output.display()
            );
        }
    }

    Ok(())
}

// ── Flag parsing helpers ─────────────────────────────────────────────────────

/// Rotation spec in the JSON array form: `[{"pages":"1-3","angle":90}]`.
/// An absent or empty "pages" means all pages.
fn parse_rotation_json(engine: &PdfEngine, json: &str, total: u32) -> Result<RotationSpec> {
    #[derive(serde::Deserialize)]
    struct RawEntry {
        #[serde(default)]
        pages: String,
        angle: i32,
    }

    let raw: Vec<RawEntry> = serde_json::from_str(json).context("parsing --spec JSON")?;
    let mut entries = Vec::with_capacity(raw.len());
    for e in raw {
        entries.push(RotationEntry {
            pages: engine.parse_selector(&e.pages, total)?,
            angle: e.angle,
        });
    }
    Ok(RotationSpec { entries })
}

fn parse_format(s: &str) -> Result<NumberFormat> {
    Ok(match s {
        "numeric" => NumberFormat::Numeric,
        "roman" => NumberFormat::Roman,
        "alphabetic" => NumberFormat::Alphabetic,
        other => bail!("unknown format '{other}' (numeric, roman, alphabetic)"),
    })
}

fn parse_position(s: &str) -> Result<Position> {
    Ok(match s {
        "top-left" => Position::TopLeft,
        "top-center" => Position::TopCenter,
        "top-right" => Position::TopRight,
        "bottom-left" => Position::BottomLeft,
        "bottom-center" => Position::BottomCenter,
        "bottom-right" => Position::BottomRight,
        other => bail!("unknown position '{other}'"),
    })
}
