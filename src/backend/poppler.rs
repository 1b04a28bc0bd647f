//! External backend driving the poppler-utils tools.
//!
//! Covers two chains plus a service role:
//! * page count via `pdfinfo` (parses the `Pages:` line)
//! * text extraction via `pdftotext` — when a page subset is requested the
//!   tool is bounded with `-f min -l max`, the closest its interface gets to
//!   an arbitrary subset
//! * rasterization via `pdftoppm -png -r DPI`, consumed by the OCR adapter
//!
//! Each tool is probed independently: a host with pdftotext but no pdftoppm
//! is a normal configuration, not an error.

use crate::backend::{
    probe_tool, run_tool, unavailable, Backend, BackendKind, Invocation, Operation, Outcome,
};
use crate::document::Workspace;
use crate::error::BackendFailure;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::OnceCell;

pub struct PopplerBackend {
    timeout: Duration,
    probe_timeout: Duration,
    pdfinfo: OnceCell<bool>,
    pdftotext: OnceCell<bool>,
}

impl PopplerBackend {
    pub fn new(timeout: Duration, probe_timeout: Duration) -> Self {
        Self {
            timeout,
            probe_timeout,
            pdfinfo: OnceCell::new(),
            pdftotext: OnceCell::new(),
        }
    }
}

#[async_trait]
impl Backend for PopplerBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Poppler
    }

    fn supports(&self, op: Operation) -> bool {
        matches!(op, Operation::PageCount | Operation::ExtractText)
    }

    async fn invoke(
        &self,
        request: Invocation<'_>,
        workspace: &Workspace,
    ) -> Result<Outcome, BackendFailure> {
        match request {
            Invocation::PageCount { doc } => {
                if !probe_tool(&self.pdfinfo, "pdfinfo", "-v", self.probe_timeout).await {
                    return Err(unavailable("pdfinfo"));
                }
                let mut cmd = Command::new("pdfinfo");
                cmd.arg(doc.path());
                let output = run_tool("pdfinfo", &mut cmd, self.timeout).await?;
                let stdout = String::from_utf8_lossy(&output.stdout);
                let count = parse_pdfinfo_pages(&stdout).ok_or_else(|| BackendFailure::Tool {
                    tool: "pdfinfo",
                    detail: "no 'Pages:' line in output".into(),
                })?;
                Ok(Outcome::Count(count))
            }
            Invocation::ExtractText { doc, pages } => {
                if !probe_tool(&self.pdftotext, "pdftotext", "-v", self.probe_timeout).await {
                    return Err(unavailable("pdftotext"));
                }
                let out = workspace.scratch_path("extracted.txt");
                let mut cmd = Command::new("pdftotext");
                if let Some(sel) = pages {
                    if let Some((min, max)) = sel.bounds() {
                        cmd.arg("-f").arg(min.to_string());
                        cmd.arg("-l").arg(max.to_string());
                    }
                }
                cmd.arg(doc.path()).arg(&out);
                run_tool("pdftotext", &mut cmd, self.timeout).await?;
                let text = std::fs::read_to_string(&out).map_err(BackendFailure::Io)?;
                Ok(Outcome::Text(text))
            }
            _ => unreachable!("poppler does not register for {}", request.operation()),
        }
    }
}

/// Rasterize every page of `pdf` into `dir` as `page-NNN.png` files at the
/// given DPI, returning the images sorted by page number. Service entry
/// point for the OCR adapter; not part of the fallback surface.
pub(crate) async fn rasterize(
    pdf: &Path,
    dir: &Path,
    dpi: u32,
    timeout: Duration,
) -> Result<Vec<(usize, PathBuf)>, BackendFailure> {
    let prefix = dir.join("page");
    let mut cmd = Command::new("pdftoppm");
    cmd.arg("-png")
        .arg("-r")
        .arg(dpi.to_string())
        .arg(pdf)
        .arg(&prefix);
    run_tool("pdftoppm", &mut cmd, timeout).await?;

    // pdftoppm names output page-1.png, page-2.png, … (zero-padded on some
    // versions); recover the ordering from the numeric suffix, not the
    // lexical filename.
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(BackendFailure::Io)? {
        let path = entry.map_err(BackendFailure::Io)?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("png") {
            continue;
        }
        if let Some(num) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.rsplit('-').next())
            .and_then(|s| s.parse::<usize>().ok())
        {
            images.push((num, path));
        }
    }
    images.sort_by_key(|(num, _)| *num);

    if images.is_empty() {
        return Err(BackendFailure::Tool {
            tool: "pdftoppm",
            detail: "no page images produced".into(),
        });
    }
    Ok(images)
}

fn parse_pdfinfo_pages(stdout: &str) -> Option<usize> {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|rest| rest.trim().parse().ok())
}
