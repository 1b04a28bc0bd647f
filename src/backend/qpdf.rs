//! External backend driving the `qpdf` command-line tool.
//!
//! Second in most structural chains (rotate, merge, split, page count):
//! qpdf copes with damaged cross-reference tables and other structural rot
//! that defeats in-process parsing.
//!
//! Command shapes:
//! * page count — `qpdf --show-npages input.pdf`
//! * rotate     — `qpdf input.pdf --rotate=+ANGLE:RANGE… output.pdf`
//!   (`+` makes the rotation relative, i.e. cumulative with the page's own)
//! * merge      — `qpdf --empty --pages a.pdf b.pdf … -- output.pdf`
//! * split      — `qpdf input.pdf --pages . RANGE -- output.pdf` per part

use crate::backend::{
    probe_tool, run_tool, unavailable, Backend, BackendKind, Invocation, Operation, Outcome,
};
use crate::document::Workspace;
use crate::error::BackendFailure;
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::OnceCell;

const TOOL: &str = "qpdf";

pub struct QpdfBackend {
    timeout: Duration,
    probe_timeout: Duration,
    available: OnceCell<bool>,
}

impl QpdfBackend {
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
impl Backend for QpdfBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Qpdf
    }

    fn supports(&self, op: Operation) -> bool {
        matches!(
            op,
            Operation::PageCount | Operation::Rotate | Operation::Merge | Operation::Split
        )
    }

    async fn invoke(
        &self,
        request: Invocation<'_>,
        workspace: &Workspace,
    ) -> Result<Outcome, BackendFailure> {
        self.ensure_available().await?;

        match request {
            Invocation::PageCount { doc } => {
                let mut cmd = Command::new(TOOL);
                cmd.arg("--show-npages").arg(doc.path());
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
            Invocation::Rotate { doc, spec } => {
                let out = workspace.scratch_path("rotated.pdf");
                let mut cmd = Command::new(TOOL);
                cmd.arg(doc.path());
                for entry in &spec.entries {
                    let angle = crate::format::normalize_angle(entry.angle);
                    if angle == 0 || entry.pages.is_empty() {
                        continue;
                    }
                    for (start, end) in entry.pages.runs() {
                        let range = if start == end {
                            start.to_string()
                        } else {
                            format!("{start}-{end}")
                        };
                        cmd.arg(format!("--rotate=+{angle}:{range}"));
                    }
                }
                cmd.arg(&out);
                run_tool(TOOL, &mut cmd, self.timeout).await?;
                Ok(Outcome::Document(workspace.adopt(out)))
            }
            Invocation::Merge { docs } => {
                let out = workspace.scratch_path("merged.pdf");
                let mut cmd = Command::new(TOOL);
                cmd.arg("--empty").arg("--pages");
                for doc in docs {
                    cmd.arg(doc.path());
                }
                cmd.arg("--").arg(&out);
                run_tool(TOOL, &mut cmd, self.timeout).await?;
                Ok(Outcome::Document(workspace.adopt(out)))
            }
            Invocation::Split { doc, parts } => {
                let mut outputs = Vec::with_capacity(parts.len());
                for (i, selector) in parts.iter().enumerate() {
                    if selector.is_empty() {
                        return Err(BackendFailure::Tool {
                            tool: TOOL,
                            detail: format!("part {} selects no pages", i + 1),
                        });
                    }
                    let out = workspace.scratch_path(&format!("part-{}.pdf", i + 1));
                    let mut cmd = Command::new(TOOL);
                    cmd.arg(doc.path())
                        .arg("--pages")
                        .arg(".")
                        .arg(selector.to_range_string())
                        .arg("--")
                        .arg(&out);
                    run_tool(TOOL, &mut cmd, self.timeout).await?;
                    outputs.push(workspace.adopt(out));
                }
                Ok(Outcome::Documents(outputs))
            }
            _ => unreachable!("qpdf does not register for {}", request.operation()),
        }
    }
}
