//! Error types for the pdfmill engine.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`EngineError`] — **Fatal**: the operation cannot produce a result at
//!   all (bad input file, every backend in the chain failed, invalid request
//!   parameters). Returned as `Err(EngineError)` from the [`crate::engine`]
//!   surface.
//!
//! * [`BackendFailure`] — **Recoverable**: one backend attempt failed
//!   (missing executable, parse error, timeout) but the next adapter in the
//!   fallback chain may still succeed. These never surface individually;
//!   the executor collects them and, only when the chain is exhausted, wraps
//!   the full attempt log into [`EngineError::AllBackendsFailed`].
//!
//! The separation is what makes fallback honest: a caller sees either one
//! success or one structured error carrying every per-backend cause, never a
//! half-logged stream of swallowed exceptions.

use crate::backend::{BackendKind, Operation};
use std::path::PathBuf;
use thiserror::Error;

/// A single failed backend attempt, recoverable by trying the next adapter
/// in the chain.
#[derive(Debug, Error)]
pub enum BackendFailure {
    /// The adapter's dependency (library feature or external executable) is
    /// missing or not responding. Includes probe failures.
    #[error("backend unavailable: {reason}")]
    Unavailable { reason: String },

    /// This backend could not parse the input document.
    #[error("document unreadable by this backend: {detail}")]
    Corrupt { detail: String },

    /// An external tool exceeded the configured timeout.
    ///
    /// Treated exactly like [`BackendFailure::Unavailable`] by the executor:
    /// a hung tool is an absent tool.
    #[error("backend timed out after {secs}s")]
    Timeout { secs: u64 },

    /// An external tool ran but exited non-zero.
    #[error("{tool} failed: {detail}")]
    Tool { tool: &'static str, detail: String },

    /// Filesystem error while staging input or output for this attempt.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// One entry in the diagnostic log carried by
/// [`EngineError::AllBackendsFailed`]: which adapter was tried, and why it
/// failed. Entries appear in trial order.
#[derive(Debug)]
pub struct AttemptFailure {
    pub backend: BackendKind,
    pub failure: BackendFailure,
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.backend, self.failure)
    }
}

fn format_attempts(attempts: &[AttemptFailure]) -> String {
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// All fatal errors returned by the pdfmill engine.
#[derive(Debug, Error)]
pub enum EngineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{}'", .path.display())]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("permission denied reading '{}'", .path.display())]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("file is not a valid PDF: '{}' (first bytes: {magic:?})", .path.display())]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Request validation ────────────────────────────────────────────────
    /// A page-range string failed strict-mode parsing.
    ///
    /// Only produced when [`crate::config::EngineConfig::strict_selectors`]
    /// is enabled; the default lenient parser drops invalid tokens silently.
    #[error("invalid page selector '{spec}': {detail}")]
    InvalidSelector { spec: String, detail: String },

    /// Request parameters failed validation before any backend ran
    /// (e.g. `every_n_pages = 0`, `start_number = 0`, empty merge list).
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    // ── Execution errors ──────────────────────────────────────────────────
    /// Every adapter in the operation's fallback chain failed.
    ///
    /// `attempts` holds one [`AttemptFailure`] per adapter, in the order
    /// they were tried — the full diagnostic picture, never swallowed.
    #[error(
        "all {} backend(s) failed for {operation}: [{}]",
        .attempts.len(),
        format_attempts(.attempts)
    )]
    AllBackendsFailed {
        operation: Operation,
        attempts: Vec<AttemptFailure>,
    },

    /// A chunk of the OCR pipeline failed after its own fallback chain was
    /// exhausted. The pipeline aborts; no partial document is produced.
    #[error("OCR chunk {index}/{total} failed: {cause}")]
    ChunkProcessingFailed {
        /// 1-based chunk index.
        index: usize,
        total: usize,
        #[source]
        cause: Box<EngineError>,
    },

    /// The reassembled document does not have the expected page count.
    /// Indicates a backend corrupted output mid-pipeline.
    #[error("page count mismatch after merge: expected {expected}, got {actual}")]
    PageCountMismatch { expected: usize, actual: usize },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not persist an output document to the caller's path.
    #[error("failed to write output '{}': {source}", .path.display())]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation or registry construction failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_backends_failed_lists_causes_in_order() {
        let e = EngineError::AllBackendsFailed {
            operation: Operation::PageCount,
            attempts: vec![
                AttemptFailure {
                    backend: BackendKind::Lopdf,
                    failure: BackendFailure::Corrupt {
                        detail: "bad xref".into(),
                    },
                },
                AttemptFailure {
                    backend: BackendKind::Qpdf,
                    failure: BackendFailure::Unavailable {
                        reason: "not on PATH".into(),
                    },
                },
            ],
        };
        let msg = e.to_string();
        let lopdf_at = msg.find("lopdf").expect("first cause listed");
        let qpdf_at = msg.find("qpdf").expect("second cause listed");
        assert!(lopdf_at < qpdf_at, "causes must keep trial order: {msg}");
        assert!(msg.contains("bad xref"));
        assert!(msg.contains("not on PATH"));
    }

    #[test]
    fn chunk_failure_display() {
        let e = EngineError::ChunkProcessingFailed {
            index: 2,
            total: 3,
            cause: Box::new(EngineError::Internal("boom".into())),
        };
        let msg = e.to_string();
        assert!(msg.contains("chunk 2/3"), "got: {msg}");
    }

    #[test]
    fn timeout_reads_as_unavailability() {
        let f = BackendFailure::Timeout { secs: 120 };
        assert!(f.to_string().contains("120s"));
    }
}
