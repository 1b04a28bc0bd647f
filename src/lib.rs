//! # pdfmill
//!
//! A PDF transformation engine with ordered backend fallback and a chunked
//! OCR pipeline.
//!
//! ## Why this crate?
//!
//! No single PDF implementation survives contact with the open web. Parsers
//! choke on damaged cross-reference tables, command-line tools go missing
//! from hosts, scanned documents have no text layer at all. Instead of
//! betting on one engine, pdfmill runs every logical operation against an
//! ordered chain of interchangeable backends — in-process libraries first,
//! external tools behind them — falling back deterministically until one
//! succeeds or the chain is exhausted.
//!
//! ## Architecture
//!
//! ```text
//! caller (web layer, CLI, worker)
//!  │
//!  ├─ PdfEngine        validate request, parse selectors
//!  │    │
//!  │    ├─ FallbackExecutor   walk the operation's adapter chain in order
//!  │    │    ├─ lopdf         in-process: count/extract/rotate/merge/split/paginate
//!  │    │    ├─ pdf-extract   in-process: text extraction
//!  │    │    ├─ qpdf          external: structural operations
//!  │    │    ├─ poppler       external: pdfinfo / pdftotext / pdftoppm
//!  │    │    ├─ ghostscript   external: last-resort count + merge
//!  │    │    └─ tesseract     external: OCR
//!  │    │
//!  │    └─ OcrPipeline        split → per-chunk OCR → merge by index
//!  │
//!  └─ Workspace        scoped temp dirs, dropped on every exit path
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use pdfmill::{DocumentHandle, EngineConfig, PdfEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = PdfEngine::new(EngineConfig::default())?;
//!     let doc = DocumentHandle::open("scan.pdf")?;
//!
//!     println!("{} pages", engine.page_count(&doc).await?);
//!
//!     let searchable = engine.ocr(&doc, Some("eng"), None).await?;
//!     searchable.persist("scan-searchable.pdf")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Guarantees
//!
//! * **Deterministic fallback** — chains are fixed at engine construction;
//!   the same inputs and tool availability select the same backend and
//!   produce identically-ordered diagnostics.
//! * **All-or-nothing results** — a caller receives one success or one
//!   structured [`EngineError`]; partial output is never presented as
//!   success.
//! * **Scoped temp resources** — every intermediate artifact lives in a
//!   workspace freed on success, failure, and cancellation alike; caller
//!   inputs are never deleted.
//!
//! ## Feature flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfmill` binary (clap + anyhow + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod executor;
pub mod format;
mod ocr;
pub mod selector;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{Backend, BackendKind, BackendRegistry, Invocation, Operation, Outcome};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use document::{DocumentHandle, Workspace};
pub use engine::{PdfEngine, SplitMethod, SplitPart};
pub use error::{AttemptFailure, BackendFailure, EngineError};
pub use executor::FallbackExecutor;
pub use format::{
    normalize_angle, NumberFormat, PageNumberSpec, Position, RotationEntry, RotationSpec,
};
pub use selector::PageSelector;
