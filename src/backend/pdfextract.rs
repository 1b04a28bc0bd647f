//! In-process text-extraction backend built on the `pdf-extract` crate.
//!
//! Last in the extract-text chain: it handles some font encodings lopdf's
//! extractor gives up on, at the cost of whole-document extraction only.
//! Page subsets are resolved from the form-feed separators (`\x0C`) the
//! extractor emits between pages.

use crate::backend::{Backend, BackendKind, Invocation, Operation, Outcome};
use crate::document::Workspace;
use crate::error::BackendFailure;
use crate::selector::PageSelector;
use async_trait::async_trait;

pub struct PdfExtractBackend;

impl PdfExtractBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfExtractBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for PdfExtractBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::PdfExtract
    }

    fn supports(&self, op: Operation) -> bool {
        op == Operation::ExtractText
    }

    async fn invoke(
        &self,
        request: Invocation<'_>,
        _workspace: &Workspace,
    ) -> Result<Outcome, BackendFailure> {
        let Invocation::ExtractText { doc, pages } = request else {
            unreachable!("pdf-extract registers for extract_text only");
        };
        let path = doc.path().to_path_buf();
        let pages = pages.cloned();

        tokio::task::spawn_blocking(move || {
            let text = pdf_extract::extract_text(&path).map_err(|e| BackendFailure::Corrupt {
                detail: e.to_string(),
            })?;
            Ok(Outcome::Text(match pages {
                Some(sel) => select_pages(&text, &sel),
                None => text,
            }))
        })
        .await
        .unwrap_or_else(|e| {
            Err(BackendFailure::Corrupt {
                detail: format!("pdf-extract task panicked: {e}"),
            })
        })
    }
}

/// Pick the requested pages out of form-feed-separated full text. Pages past
/// the last separator are simply absent from the output; pages without a
/// text layer contribute nothing either way.
fn select_pages(text: &str, selector: &PageSelector) -> String {
    let segments: Vec<&str> = text.split('\x0C').collect();
    selector
        .pages()
        .iter()
        .filter_map(|&p| segments.get((p - 1) as usize))
        .copied()
        .collect::<Vec<_>>()
        .join("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_pages_by_form_feed() {
        let text = "one\x0Ctwo\x0Cthree";
        let sel = PageSelector::from_pages([1, 3], 3);
        assert_eq!(select_pages(text, &sel), "onethree");
    }

    #[test]
    fn out_of_range_pages_contribute_nothing() {
        let text = "one\x0Ctwo";
        let sel = PageSelector::from_pages([2, 3], 3);
        assert_eq!(select_pages(text, &sel), "two");
    }
}
