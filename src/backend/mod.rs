//! Backend adapters: capability-typed handles to one processing engine each.
//!
//! A [`Backend`] wraps either an in-process library (lopdf, pdf-extract) or
//! an external executable (qpdf, poppler tools, ghostscript, tesseract) and
//! exposes the same operation surface through a single [`Backend::invoke`]
//! entry point. The [`crate::executor::FallbackExecutor`] walks an ordered
//! chain of adapters per operation; the tagged [`Invocation`] / [`Outcome`]
//! pair is what lets one generic dispatch loop replace a per-operation
//! cascade of call sites.
//!
//! ## Capability declaration
//!
//! Each adapter declares its supported operations via [`Backend::supports`].
//! Registering an adapter for an operation it does not support is a
//! programming error caught by [`BackendRegistry::register`] — never a
//! runtime dispatch failure.
//!
//! ## Availability
//!
//! External tools are probed lazily on first use and the result cached per
//! adapter instance. A missing executable is a normal runtime condition that
//! produces [`BackendFailure::Unavailable`] and moves the executor to the
//! next adapter.

use crate::document::{DocumentHandle, Workspace};
use crate::error::{BackendFailure, EngineError};
use crate::format::{PageNumberSpec, RotationSpec};
use crate::selector::PageSelector;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub mod ghostscript;
pub mod lopdf;
pub mod pdfextract;
pub mod poppler;
pub mod qpdf;
pub mod tesseract;

/// The logical operations the engine performs. Each maps to an ordered
/// fallback chain of backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    PageCount,
    ExtractText,
    Rotate,
    Merge,
    Split,
    Paginate,
    Ocr,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::PageCount => "page_count",
            Operation::ExtractText => "extract_text",
            Operation::Rotate => "rotate",
            Operation::Merge => "merge",
            Operation::Split => "split",
            Operation::Paginate => "paginate",
            Operation::Ocr => "ocr",
        };
        f.write_str(name)
    }
}

/// Identifies one concrete processing engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Lopdf,
    PdfExtract,
    Qpdf,
    Poppler,
    Ghostscript,
    Tesseract,
    /// Adapters supplied by callers (tests, embedders) via
    /// [`crate::engine::PdfEngine::with_backends`].
    Custom(&'static str),
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Lopdf => f.write_str("lopdf"),
            BackendKind::PdfExtract => f.write_str("pdf-extract"),
            BackendKind::Qpdf => f.write_str("qpdf"),
            BackendKind::Poppler => f.write_str("poppler"),
            BackendKind::Ghostscript => f.write_str("ghostscript"),
            BackendKind::Tesseract => f.write_str("tesseract"),
            BackendKind::Custom(name) => f.write_str(name),
        }
    }
}

/// A single operation request, borrowed from the caller for the duration of
/// one adapter attempt. `Copy` so the executor can hand the same request to
/// each adapter in the chain.
#[derive(Clone, Copy)]
pub enum Invocation<'a> {
    PageCount {
        doc: &'a DocumentHandle,
    },
    ExtractText {
        doc: &'a DocumentHandle,
        /// `None` = all pages.
        pages: Option<&'a PageSelector>,
    },
    Rotate {
        doc: &'a DocumentHandle,
        spec: &'a RotationSpec,
    },
    Merge {
        docs: &'a [DocumentHandle],
    },
    Split {
        doc: &'a DocumentHandle,
        parts: &'a [PageSelector],
    },
    Paginate {
        doc: &'a DocumentHandle,
        spec: &'a PageNumberSpec,
        targets: &'a PageSelector,
    },
    Ocr {
        doc: &'a DocumentHandle,
        language: &'a str,
    },
}

impl Invocation<'_> {
    /// Which logical operation this request is.
    pub fn operation(&self) -> Operation {
        match self {
            Invocation::PageCount { .. } => Operation::PageCount,
            Invocation::ExtractText { .. } => Operation::ExtractText,
            Invocation::Rotate { .. } => Operation::Rotate,
            Invocation::Merge { .. } => Operation::Merge,
            Invocation::Split { .. } => Operation::Split,
            Invocation::Paginate { .. } => Operation::Paginate,
            Invocation::Ocr { .. } => Operation::Ocr,
        }
    }
}

/// A successful operation result, tagged to mirror [`Invocation`].
#[derive(Debug)]
pub enum Outcome {
    Count(usize),
    /// Extracted text; empty string (never absent) when the document has no
    /// text layer.
    Text(String),
    Document(DocumentHandle),
    Documents(Vec<DocumentHandle>),
}

impl Outcome {
    // Shape mismatches indicate an adapter bug, not a caller mistake; they
    // surface as Internal rather than panicking mid-pipeline.

    pub(crate) fn into_count(self) -> Result<usize, EngineError> {
        match self {
            Outcome::Count(n) => Ok(n),
            other => Err(shape_error("Count", &other)),
        }
    }

    pub(crate) fn into_text(self) -> Result<String, EngineError> {
        match self {
            Outcome::Text(t) => Ok(t),
            other => Err(shape_error("Text", &other)),
        }
    }

    pub(crate) fn into_document(self) -> Result<DocumentHandle, EngineError> {
        match self {
            Outcome::Document(d) => Ok(d),
            other => Err(shape_error("Document", &other)),
        }
    }

    pub(crate) fn into_documents(self) -> Result<Vec<DocumentHandle>, EngineError> {
        match self {
            Outcome::Documents(d) => Ok(d),
            other => Err(shape_error("Documents", &other)),
        }
    }
}

fn shape_error(expected: &str, got: &Outcome) -> EngineError {
    let got = match got {
        Outcome::Count(_) => "Count",
        Outcome::Text(_) => "Text",
        Outcome::Document(_) => "Document",
        Outcome::Documents(_) => "Documents",
    };
    EngineError::Internal(format!("backend returned {got}, expected {expected}"))
}

/// One processing engine behind a uniform operation surface.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Stable identity, used in diagnostics and determinism tests.
    fn kind(&self) -> BackendKind;

    /// Capability declaration; checked at registration time.
    fn supports(&self, op: Operation) -> bool;

    /// Attempt the request. Output documents must be written into
    /// `workspace`; the adapter must not touch caller-owned inputs.
    ///
    /// Adapters may assume `request.operation()` is one they support — the
    /// registry guarantees it.
    async fn invoke(
        &self,
        request: Invocation<'_>,
        workspace: &Workspace,
    ) -> Result<Outcome, BackendFailure>;
}

/// Ordered fallback chains, one per operation, fixed at construction.
///
/// Ordering is static configuration: the same chain is walked on every call,
/// which is what makes backend selection reproducible. There is no runtime
/// re-scoring.
#[derive(Default)]
pub struct BackendRegistry {
    chains: HashMap<Operation, Vec<Arc<dyn Backend>>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `backend` to the chain for `op`. Fails if the adapter does not
    /// declare support for the operation — misregistration is a programming
    /// error surfaced at startup, not at call time.
    pub fn register(
        &mut self,
        op: Operation,
        backend: Arc<dyn Backend>,
    ) -> Result<(), EngineError> {
        if !backend.supports(op) {
            return Err(EngineError::InvalidConfig(format!(
                "backend {} does not support {}",
                backend.kind(),
                op
            )));
        }
        debug!("registered {} for {}", backend.kind(), op);
        self.chains.entry(op).or_default().push(backend);
        Ok(())
    }

    /// The fallback chain for `op`, in trial order. Empty when nothing is
    /// registered.
    pub fn chain(&self, op: Operation) -> &[Arc<dyn Backend>] {
        self.chains.get(&op).map(Vec::as_slice).unwrap_or(&[])
    }
}

// ── External-tool plumbing ───────────────────────────────────────────────
//
// Shared by the qpdf / poppler / ghostscript / tesseract adapters. Every
// spawned process is `kill_on_drop`, so cancelling a pipeline future kills
// its in-flight tools rather than awaiting them.

/// Run an external tool to completion under a timeout, mapping the three
/// interesting outcomes onto [`BackendFailure`]:
/// spawn failure → `Unavailable`, timeout → `Timeout`, non-zero exit →
/// `Tool` with captured stderr.
pub(crate) async fn run_tool(
    tool: &'static str,
    command: &mut tokio::process::Command,
    timeout: Duration,
) -> Result<std::process::Output, BackendFailure> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let fut = command.output();
    let output = match tokio::time::timeout(timeout, fut).await {
        Err(_) => {
            return Err(BackendFailure::Timeout {
                secs: timeout.as_secs(),
            })
        }
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(BackendFailure::Unavailable {
                reason: format!("{tool} not found on PATH"),
            })
        }
        Ok(Err(e)) => return Err(BackendFailure::Io(e)),
        Ok(Ok(output)) => output,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BackendFailure::Tool {
            tool,
            detail: format!(
                "exit {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ),
        });
    }

    Ok(output)
}

/// Lazily probe whether `tool` is present, caching the result in `cell`.
/// Used by every external adapter before its first real invocation.
///
/// `version_arg` is the tool's version flag (`--version` for most, `-v` for
/// the poppler utilities). Presence means the binary spawned and answered in
/// time; a non-zero exit still counts as present, since some tools exit
/// non-zero for their version flag.
pub(crate) async fn probe_tool(
    cell: &tokio::sync::OnceCell<bool>,
    tool: &'static str,
    version_arg: &'static str,
    timeout: Duration,
) -> bool {
    *cell
        .get_or_init(|| async move {
            let mut cmd = tokio::process::Command::new(tool);
            cmd.arg(version_arg);
            let ok = !matches!(
                run_tool(tool, &mut cmd, timeout).await,
                Err(BackendFailure::Unavailable { .. }) | Err(BackendFailure::Timeout { .. })
            );
            debug!("probe {}: {}", tool, if ok { "available" } else { "missing" });
            ok
        })
        .await
}

/// The `Unavailable` failure an adapter returns when its probe came back
/// negative.
pub(crate) fn unavailable(tool: &'static str) -> BackendFailure {
    BackendFailure::Unavailable {
        reason: format!("{tool} not found on PATH"),
    }
}
