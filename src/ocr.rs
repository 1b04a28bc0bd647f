//! The chunked OCR pipeline.
//!
//! Arbitrarily large documents cannot be OCR'd in one pass: rasterizing
//! every page at 300 DPI before recognition starts would hold hundreds of
//! megabytes of images alive at once. The pipeline instead walks a fixed
//! state machine:
//!
//! ```text
//! Created → Splitting → ChunkProcessing(i of N) → Merging → Done | Failed
//! ```
//!
//! * **Splitting** — all pages, partitioned into contiguous groups of
//!   `chunk_size` (default 20); the last group may be smaller. Chunk
//!   documents are materialized through the executor's Split chain.
//! * **ChunkProcessing** — each chunk is OCR'd through the executor's Ocr
//!   chain, up to `ocr_concurrency` in flight. Chunks are independent; a
//!   failure does not abort siblings already running, but the pipeline as a
//!   whole fails — no partial document is ever returned.
//! * **Merging** — outputs are reassembled **by chunk index**, never by
//!   completion order, restoring exact original page order.
//! * **Done** — the result's page count is asserted equal to the input's.
//!
//! Every intermediate artifact lives in a pipeline-owned [`Workspace`]
//! dropped on all exit paths; only the final document's workspace survives,
//! kept alive by the returned handle. Cancelling the future kills in-flight
//! subprocesses (`kill_on_drop`) and removes the workspace.

use crate::backend::Invocation;
use crate::config::EngineConfig;
use crate::document::{DocumentHandle, Workspace};
use crate::error::EngineError;
use crate::executor::FallbackExecutor;
use crate::selector::PageSelector;
use futures::stream::{self, StreamExt};
use tracing::{debug, info};

pub(crate) struct OcrPipeline<'a> {
    executor: &'a FallbackExecutor,
    config: &'a EngineConfig,
}

impl<'a> OcrPipeline<'a> {
    pub(crate) fn new(executor: &'a FallbackExecutor, config: &'a EngineConfig) -> Self {
        Self { executor, config }
    }

    /// OCR `doc` end to end, returning a searchable document with the same
    /// page count and order.
    pub(crate) async fn run(
        &self,
        doc: &DocumentHandle,
        language: &str,
        chunk_size: usize,
    ) -> Result<DocumentHandle, EngineError> {
        let scratch = Workspace::new(self.config.temp_root.as_deref(), "ocr")?;

        // ── Splitting ────────────────────────────────────────────────────
        let total_pages = self
            .executor
            .execute(Invocation::PageCount { doc }, &scratch)
            .await?
            .into_count()?;
        if total_pages == 0 {
            return Err(EngineError::MalformedRequest(
                "document has no pages to OCR".into(),
            ));
        }

        let parts = PageSelector::all(total_pages as u32).chunks(chunk_size);
        let total_chunks = parts.len();
        info!("ocr: splitting {total_pages} pages into {total_chunks} chunk(s) of ≤{chunk_size}");

        let chunks: Vec<DocumentHandle> = if total_chunks == 1 {
            // One chunk covers the whole document; the split step would only
            // copy it.
            vec![doc.clone()]
        } else {
            self.executor
                .execute(Invocation::Split { doc, parts: &parts }, &scratch)
                .await?
                .into_documents()?
        };
        debug_assert_eq!(chunks.len(), total_chunks);

        // ── ChunkProcessing ──────────────────────────────────────────────
        let results: Vec<(usize, Result<DocumentHandle, EngineError>)> =
            stream::iter(chunks.iter().enumerate().map(|(idx, chunk)| {
                let scratch = scratch.clone();
                async move {
                    debug!("ocr: chunk {} of {total_chunks} started", idx + 1);
                    let result = self
                        .executor
                        .execute(
                            Invocation::Ocr {
                                doc: chunk,
                                language,
                            },
                            &scratch,
                        )
                        .await
                        .and_then(|o| o.into_document());
                    (idx, result)
                }
            }))
            .buffer_unordered(self.config.ocr_concurrency)
            .collect()
            .await;

        // Reassemble by original index, not completion order.
        let mut ocred: Vec<Option<DocumentHandle>> = vec![None; total_chunks];
        let mut first_failure: Option<(usize, EngineError)> = None;
        for (idx, result) in results {
            match result {
                Ok(handle) => ocred[idx] = Some(handle),
                Err(cause) => {
                    // Report the lowest-index failure for determinism.
                    if first_failure.as_ref().map_or(true, |(i, _)| idx < *i) {
                        first_failure = Some((idx, cause));
                    }
                }
            }
        }
        if let Some((idx, cause)) = first_failure {
            return Err(EngineError::ChunkProcessingFailed {
                index: idx + 1,
                total: total_chunks,
                cause: Box::new(cause),
            });
        }
        let ocred: Vec<DocumentHandle> = ocred
            .into_iter()
            .map(|h| h.ok_or_else(|| EngineError::Internal("missing chunk result".into())))
            .collect::<Result<_, _>>()?;

        // ── Merging ──────────────────────────────────────────────────────
        info!("ocr: merging {total_chunks} chunk(s)");
        // The final document gets its own workspace: the pipeline scratch
        // (chunk files, page images) dies here, the output lives as long as
        // the returned handle.
        let out_ws = Workspace::new(self.config.temp_root.as_deref(), "ocr-out")?;
        let merged = self
            .executor
            .execute(Invocation::Merge { docs: &ocred }, &out_ws)
            .await?
            .into_document()?;

        // ── Done — page-order/count integrity assert ─────────────────────
        let merged_pages = self
            .executor
            .execute(Invocation::PageCount { doc: &merged }, &out_ws)
            .await?
            .into_count()?;
        if merged_pages != total_pages {
            return Err(EngineError::PageCountMismatch {
                expected: total_pages,
                actual: merged_pages,
            });
        }

        info!("ocr: done, {merged_pages} pages");
        Ok(merged)
    }
}
