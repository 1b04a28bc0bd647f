//! External backend driving Ghostscript.
//!
//! Last resort in the page-count and merge chains. Slower than qpdf but
//! rewrites the document through a full interpreter pass, which recovers
//! files everything else rejects.
//!
//! The binary is `gswin64c` on Windows and `gs` elsewhere.

use crate::backend::{
    probe_tool, run_tool, unavailable, Backend, BackendKind, Invocation, Operation, Outcome,
};
use crate::document::Workspace;
use crate::error::BackendFailure;
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::OnceCell;

const TOOL: &str = if cfg!(windows) { "gswin64c" } else { "gs" };

pub struct GhostscriptBackend {
    timeout: Duration,
    probe_timeout: Duration,
    available: OnceCell<bool>,
}

impl GhostscriptBackend {
    pub fn new(timeout: Duration, probe_timeout: Duration) -> Self {
        Self {
            timeout,
            probe_timeout,
            available: OnceCell::new(),
        }
    }

    async fn ensure_available(&self) -> Result<(), BackendFailure> {
        if probe_tool(&self.available, TOOL, "--version", self.probe_timeout).await {
            Ok(())
        } else {
            Err(unavailable(TOOL))
        }
    }
}

#[async_trait]
impl Backend for GhostscriptBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Ghostscript
    }

    fn supports(&self, op: Operation) -> bool {
        matches!(op, Operation::PageCount | Operation::Merge)
    }

    async fn invoke(
        &self,
        request: Invocation<'_>,
        workspace: &Workspace,
    ) -> Result<Outcome, BackendFailure> {
        self.ensure_available().await?;

        match request {
            Invocation::PageCount { doc } => {
                // The classic pdfpagecount one-liner; prints the count to
                // stdout without rendering anything.
                let script = format!(
                    "({}) (r) file runpdfbegin pdfpagecount = quit",
                    doc.path().display()
                );
                let mut cmd = Command::new(TOOL);
                cmd.arg("-q").arg("-dNODISPLAY").arg("-c").arg(script);
                let output = run_tool(TOOL, &mut cmd, self.timeout).await?;
                let stdout = String::from_utf8_lossy(&output.stdout);
                let count: usize =
                    stdout
                        .trim()
                        .parse()
                        .map_err(|_| BackendFailure::Tool {
                            tool: TOOL,
                            detail: format!("unparseable page count: {:?}", stdout.trim()),
                        })?;
                Ok(Outcome::Count(count))
            }
            Invocation::Merge { docs } => {
                let out = workspace.scratch_path("merged.pdf");
                let mut cmd = Command::new(TOOL);
                cmd.arg("-q")
                    .arg("-dNOPAUSE")
                    .arg("-dBATCH")
                    .arg("-sDEVICE=pdfwrite")
                    .arg(format!("-sOutputFile={}", out.display()));
                for doc in docs {
                    cmd.arg(doc.path());
                }
                run_tool(TOOL, &mut cmd, self.timeout).await?;
                Ok(Outcome::Document(workspace.adopt(out)))
            }
            _ => unreachable!("ghostscript does not register for {}", request.operation()),
        }
    }
}
