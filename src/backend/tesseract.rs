//! OCR backend: pdftoppm rasterization + per-page tesseract + in-process
//! reassembly.
//!
//! Tesseract's `pdf` output mode produces, for each page image, a one-page
//! PDF with the recognised text layered invisibly over the original image —
//! image content is preserved, the text layer is added. The per-page PDFs
//! are merged back together with lopdf rather than a third subprocess, so
//! the only tools this adapter needs are pdftoppm and tesseract.
//!
//! Intermediate images and one-page PDFs live in a directory created inside
//! the invocation's workspace; everything vanishes with the workspace.

use crate::backend::{
    poppler, probe_tool, run_tool, unavailable, Backend, BackendKind, Invocation, Operation,
    Outcome,
};
use crate::document::Workspace;
use crate::error::BackendFailure;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::debug;

pub struct TesseractBackend {
    timeout: Duration,
    probe_timeout: Duration,
    dpi: u32,
    tesseract: OnceCell<bool>,
    pdftoppm: OnceCell<bool>,
}

impl TesseractBackend {
    pub fn new(timeout: Duration, probe_timeout: Duration, dpi: u32) -> Self {
        Self {
            timeout,
            probe_timeout,
            dpi,
            tesseract: OnceCell::new(),
            pdftoppm: OnceCell::new(),
        }
    }

    async fn ensure_available(&self) -> Result<(), BackendFailure> {
        if !probe_tool(&self.pdftoppm, "pdftoppm", "-v", self.probe_timeout).await {
            return Err(unavailable("pdftoppm"));
        }
        if !probe_tool(&self.tesseract, "tesseract", "--version", self.probe_timeout).await {
            return Err(unavailable("tesseract"));
        }
        Ok(())
    }

    /// OCR one rasterized page into a one-page searchable PDF.
    async fn ocr_page(
        &self,
        image: &PathBuf,
        language: &str,
    ) -> Result<PathBuf, BackendFailure> {
        // tesseract appends ".pdf" to the output base itself.
        let base = image.with_extension("");
        let mut cmd = Command::new("tesseract");
        cmd.arg(image).arg(&base).arg("-l").arg(language).arg("pdf");
        run_tool("tesseract", &mut cmd, self.timeout).await?;

        let pdf = base.with_extension("pdf");
        if !pdf.exists() {
            return Err(BackendFailure::Tool {
                tool: "tesseract",
                detail: format!("no PDF produced for {}", image.display()),
            });
        }
        Ok(pdf)
    }
}

#[async_trait]
impl Backend for TesseractBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Tesseract
    }

    fn supports(&self, op: Operation) -> bool {
        op == Operation::Ocr
    }

    async fn invoke(
        &self,
        request: Invocation<'_>,
        workspace: &Workspace,
    ) -> Result<Outcome, BackendFailure> {
        let Invocation::Ocr { doc, language } = request else {
            unreachable!("tesseract registers for ocr only");
        };
        self.ensure_available().await?;

        // Page images and one-page PDFs go into their own subdirectory so
        // the rasterizer's output listing can't pick up stray files.
        let stage_dir = workspace.scratch_path("ocr-stage");
        std::fs::create_dir(&stage_dir).map_err(BackendFailure::Io)?;

        let images = poppler::rasterize(doc.path(), &stage_dir, self.dpi, self.timeout).await?;
        debug!("rasterized {} pages for OCR", images.len());

        let mut page_pdfs = Vec::with_capacity(images.len());
        for (page_num, image) in &images {
            let pdf = self.ocr_page(image, language).await?;
            debug!("OCR page {page_num}: {}", pdf.display());
            page_pdfs.push(pdf);
        }

        // Reassemble in page order; the rasterizer output is already sorted.
        let out_path = workspace.scratch_path("searchable.pdf");
        let merged = tokio::task::spawn_blocking(move || super::lopdf::merge_files(&page_pdfs))
            .await
            .unwrap_or_else(|e| {
                Err(BackendFailure::Corrupt {
                    detail: format!("merge task panicked: {e}"),
                })
            })?;
        std::fs::write(&out_path, merged).map_err(BackendFailure::Io)?;

        Ok(Outcome::Document(workspace.adopt(out_path)))
    }
}
