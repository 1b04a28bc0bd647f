//! The engine facade: the operation surface callers (a web layer, a CLI, a
//! worker process) program against.
//!
//! A [`PdfEngine`] owns an [`EngineConfig`], the adapter set, and the
//! fallback executor built from them. Per-document operations are
//! independent and safe to run concurrently from separate tasks; the engine
//! itself holds no mutable state.
//!
//! Request validation (selector parsing, parameter checks) happens here,
//! before any backend runs — backends only ever see well-formed requests.

use crate::backend::{
    ghostscript::GhostscriptBackend, lopdf::LopdfBackend, pdfextract::PdfExtractBackend,
    poppler::PopplerBackend, qpdf::QpdfBackend, tesseract::TesseractBackend, Backend,
    BackendRegistry, Invocation, Operation,
};
use crate::config::EngineConfig;
use crate::document::{DocumentHandle, Workspace};
use crate::error::EngineError;
use crate::executor::FallbackExecutor;
use crate::format::{PageNumberSpec, RotationSpec};
use crate::ocr::OcrPipeline;
use crate::selector::PageSelector;
use std::sync::Arc;
use tracing::info;

/// How to partition a document in [`PdfEngine::split`].
#[derive(Debug, Clone)]
pub enum SplitMethod {
    /// One output per comma token of a range string: `"1-3,5"` produces two
    /// documents.
    Ranges(String),
    /// Every page becomes its own single-page document.
    Extract,
    /// Contiguous groups of `n` pages; the last may be smaller. `n` must be
    /// positive.
    EveryN(usize),
}

/// One output of a split: the document and the pages it contains.
#[derive(Debug, Clone)]
pub struct SplitPart {
    pub handle: DocumentHandle,
    pub pages: PageSelector,
}

/// The PDF transformation engine.
pub struct PdfEngine {
    config: EngineConfig,
    executor: FallbackExecutor,
}

impl std::fmt::Debug for PdfEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PdfEngine {
    /// Build an engine with the default adapter set and fallback chains:
    ///
    /// | operation    | chain |
    /// |--------------|-------|
    /// | page_count   | lopdf → qpdf → poppler → ghostscript |
    /// | extract_text | lopdf → poppler → pdf-extract |
    /// | rotate       | lopdf → qpdf |
    /// | merge        | lopdf → qpdf → ghostscript |
    /// | split        | lopdf → qpdf |
    /// | paginate     | lopdf |
    /// | ocr          | tesseract |
    ///
    /// External tools are probed lazily; a host without qpdf simply skips it
    /// at execution time.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let timeout = config.tool_timeout();
        let probe = config.probe_timeout();

        let lopdf: Arc<dyn Backend> = Arc::new(LopdfBackend::new());
        let pdfextract: Arc<dyn Backend> = Arc::new(PdfExtractBackend::new());
        let qpdf: Arc<dyn Backend> = Arc::new(QpdfBackend::new(timeout, probe));
        let poppler: Arc<dyn Backend> = Arc::new(PopplerBackend::new(timeout, probe));
        let ghostscript: Arc<dyn Backend> = Arc::new(GhostscriptBackend::new(timeout, probe));
        let tesseract: Arc<dyn Backend> =
            Arc::new(TesseractBackend::new(timeout, probe, config.ocr_dpi));

        let chains: Vec<(Operation, &Arc<dyn Backend>)> = vec![
            (Operation::PageCount, &lopdf),
            (Operation::PageCount, &qpdf),
            (Operation::PageCount, &poppler),
            (Operation::PageCount, &ghostscript),
            (Operation::ExtractText, &lopdf),
            (Operation::ExtractText, &poppler),
            (Operation::ExtractText, &pdfextract),
            (Operation::Rotate, &lopdf),
            (Operation::Rotate, &qpdf),
            (Operation::Merge, &lopdf),
            (Operation::Merge, &qpdf),
            (Operation::Merge, &ghostscript),
            (Operation::Split, &lopdf),
            (Operation::Split, &qpdf),
            (Operation::Paginate, &lopdf),
            (Operation::Ocr, &tesseract),
        ];

        let mut registry = BackendRegistry::new();
        for (op, backend) in chains {
            registry.register(op, Arc::clone(backend))?;
        }

        Ok(Self {
            config,
            executor: FallbackExecutor::new(registry),
        })
    }

    /// Build an engine with a caller-supplied adapter wiring instead of the
    /// defaults. Chain order is the given registration order per operation.
    ///
    /// This is how embedders restrict the engine to in-process backends, and
    /// how tests inject scripted adapters.
    pub fn with_backends(
        config: EngineConfig,
        chains: Vec<(Operation, Arc<dyn Backend>)>,
    ) -> Result<Self, EngineError> {
        let mut registry = BackendRegistry::new();
        for (op, backend) in chains {
            registry.register(op, backend)?;
        }
        Ok(Self {
            config,
            executor: FallbackExecutor::new(registry),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parse a page-range string against this engine's selector mode:
    /// lenient by default, strict when configured.
    pub fn parse_selector(
        &self,
        spec: &str,
        total_pages: u32,
    ) -> Result<PageSelector, EngineError> {
        if self.config.strict_selectors {
            PageSelector::parse_strict(spec, total_pages)
        } else {
            Ok(PageSelector::parse(spec, total_pages))
        }
    }

    // ── Operations ───────────────────────────────────────────────────────

    /// Number of pages in the document.
    pub async fn page_count(&self, doc: &DocumentHandle) -> Result<usize, EngineError> {
        let ws = self.workspace("count")?;
        self.executor
            .execute(Invocation::PageCount { doc }, &ws)
            .await?
            .into_count()
    }

    /// Extract the document's text layer, optionally restricted by a page
    /// range string. Returns an empty string — never an error — when the
    /// selected pages have no text.
    pub async fn extract_text(
        &self,
        doc: &DocumentHandle,
        selector: Option<&str>,
    ) -> Result<String, EngineError> {
        let ws = self.workspace("extract")?;

        let pages = match selector {
            None => None,
            Some(spec) => {
                let total = self.page_count(doc).await? as u32;
                let sel = self.parse_selector(spec, total)?;
                if sel.is_empty() {
                    // Every token was dropped: nothing selected, nothing
                    // extracted.
                    return Ok(String::new());
                }
                Some(sel)
            }
        };

        self.executor
            .execute(
                Invocation::ExtractText {
                    doc,
                    pages: pages.as_ref(),
                },
                &ws,
            )
            .await?
            .into_text()
    }

    /// Apply cumulative page rotations; pages not named by the spec pass
    /// through untouched.
    pub async fn rotate(
        &self,
        doc: &DocumentHandle,
        spec: &RotationSpec,
    ) -> Result<DocumentHandle, EngineError> {
        let ws = self.workspace("rotate")?;
        self.executor
            .execute(Invocation::Rotate { doc, spec }, &ws)
            .await?
            .into_document()
    }

    /// Concatenate documents in the given order; each input's internal page
    /// order is preserved.
    pub async fn merge(&self, docs: &[DocumentHandle]) -> Result<DocumentHandle, EngineError> {
        if docs.is_empty() {
            return Err(EngineError::MalformedRequest(
                "merge requires at least one input document".into(),
            ));
        }
        let ws = self.workspace("merge")?;
        self.executor
            .execute(Invocation::Merge { docs }, &ws)
            .await?
            .into_document()
    }

    /// Split the document into independent parts. All-or-nothing: a failure
    /// producing any part fails the whole operation.
    pub async fn split(
        &self,
        doc: &DocumentHandle,
        method: &SplitMethod,
    ) -> Result<Vec<SplitPart>, EngineError> {
        let total = self.page_count(doc).await? as u32;

        let parts: Vec<PageSelector> = match method {
            SplitMethod::Ranges(spec) => {
                if self.config.strict_selectors {
                    PageSelector::parse_groups_strict(spec, total)?
                } else {
                    PageSelector::parse_groups(spec, total)
                }
            }
            SplitMethod::Extract => PageSelector::all(total).chunks(1),
            SplitMethod::EveryN(0) => {
                return Err(EngineError::MalformedRequest(
                    "every_n_pages must be >= 1".into(),
                ))
            }
            SplitMethod::EveryN(n) => PageSelector::all(total).chunks(*n),
        };

        if parts.is_empty() {
            return Ok(Vec::new());
        }

        let ws = self.workspace("split")?;
        let handles = self
            .executor
            .execute(
                Invocation::Split {
                    doc,
                    parts: &parts,
                },
                &ws,
            )
            .await?
            .into_documents()?;

        if handles.len() != parts.len() {
            return Err(EngineError::Internal(format!(
                "split produced {} of {} parts",
                handles.len(),
                parts.len()
            )));
        }

        Ok(handles
            .into_iter()
            .zip(parts)
            .map(|(handle, pages)| SplitPart { handle, pages })
            .collect())
    }

    /// Stamp page-number labels onto the document.
    pub async fn paginate(
        &self,
        doc: &DocumentHandle,
        spec: &PageNumberSpec,
    ) -> Result<DocumentHandle, EngineError> {
        spec.validate()?;
        let total = self.page_count(doc).await? as u32;

        let base = match spec.selector.as_deref() {
            None => PageSelector::all(total),
            Some(s) => self.parse_selector(s, total)?,
        };
        let targets = spec.target_pages(base);
        if targets.is_empty() {
            return Err(EngineError::MalformedRequest(
                "page-number selection matches no pages".into(),
            ));
        }

        let ws = self.workspace("paginate")?;
        self.executor
            .execute(
                Invocation::Paginate {
                    doc,
                    spec,
                    targets: &targets,
                },
                &ws,
            )
            .await?
            .into_document()
    }

    /// OCR the document through the chunk pipeline, producing a searchable
    /// PDF with identical page count and order.
    ///
    /// `language` defaults to the configured language, `chunk_size` to the
    /// configured chunk size.
    pub async fn ocr(
        &self,
        doc: &DocumentHandle,
        language: Option<&str>,
        chunk_size: Option<usize>,
    ) -> Result<DocumentHandle, EngineError> {
        let language = language.unwrap_or(&self.config.default_language);
        let chunk_size = match chunk_size {
            Some(0) => {
                return Err(EngineError::MalformedRequest(
                    "chunk_size must be >= 1".into(),
                ))
            }
            Some(n) => n,
            None => self.config.chunk_size,
        };
        info!("ocr requested: language={language}, chunk_size={chunk_size}");
        OcrPipeline::new(&self.executor, &self.config)
            .run(doc, language, chunk_size)
            .await
    }

    fn workspace(&self, label: &str) -> Result<Workspace, EngineError> {
        Workspace::new(self.config.temp_root.as_deref(), label)
    }
}
