//! Engine configuration.
//!
//! Every knob lives in one [`EngineConfig`] value passed explicitly to
//! [`crate::engine::PdfEngine::new`] — there is no process-wide settings
//! object. Build it with [`EngineConfig::builder()`] and rely on the
//! defaults for everything you don't care about.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a [`crate::engine::PdfEngine`].
///
/// # Example
/// ```rust
/// use pdfmill::EngineConfig;
///
/// let config = EngineConfig::builder()
///     .chunk_size(10)
///     .ocr_concurrency(2)
///     .strict_selectors(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Pages per OCR chunk. Default: 20.
    ///
    /// Bounds the rasterized-image working set of a single OCR unit; the
    /// last chunk of a document may be smaller.
    pub chunk_size: usize,

    /// Concurrent OCR chunk executions. Default: 4.
    ///
    /// Each in-flight chunk can hold an external tesseract process, so this
    /// is also the subprocess cap. Chunks are reassembled by index, never by
    /// completion order, so raising this never reorders output.
    pub ocr_concurrency: usize,

    /// Per-invocation timeout for external tools, in seconds. Default: 120.
    ///
    /// Expiry is treated as backend unavailability: the executor moves to
    /// the next adapter in the chain rather than aborting the operation.
    pub tool_timeout_secs: u64,

    /// Timeout for `--version` availability probes, in seconds. Default: 5.
    pub probe_timeout_secs: u64,

    /// Rasterization resolution for OCR, in DPI. Clamped to 72–600.
    /// Default: 300.
    pub ocr_dpi: u32,

    /// Tesseract language passed when the caller does not specify one.
    /// Default: "eng".
    pub default_language: String,

    /// Fail requests whose page-range strings contain malformed or
    /// out-of-range tokens, instead of silently dropping them.
    /// Default: false (the lenient legacy behaviour).
    pub strict_selectors: bool,

    /// Directory for temporary workspaces; `None` = system temp.
    pub temp_root: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 20,
            ocr_concurrency: 4,
            tool_timeout_secs: 120,
            probe_timeout_secs: 5,
            ocr_dpi: 300,
            default_language: "eng".to_string(),
            strict_selectors: false,
            temp_root: None,
        }
    }
}

impl EngineConfig {
    /// Create a new builder for `EngineConfig`.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder {
            config: Self::default(),
        }
    }

    pub(crate) fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub(crate) fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn chunk_size(mut self, pages: usize) -> Self {
        self.config.chunk_size = pages.max(1);
        self
    }

    pub fn ocr_concurrency(mut self, n: usize) -> Self {
        self.config.ocr_concurrency = n.max(1);
        self
    }

    pub fn tool_timeout_secs(mut self, secs: u64) -> Self {
        self.config.tool_timeout_secs = secs.max(1);
        self
    }

    pub fn probe_timeout_secs(mut self, secs: u64) -> Self {
        self.config.probe_timeout_secs = secs.max(1);
        self
    }

    pub fn ocr_dpi(mut self, dpi: u32) -> Self {
        self.config.ocr_dpi = dpi.clamp(72, 600);
        self
    }

    pub fn default_language(mut self, lang: impl Into<String>) -> Self {
        self.config.default_language = lang.into();
        self
    }

    pub fn strict_selectors(mut self, strict: bool) -> Self {
        self.config.strict_selectors = strict;
        self
    }

    pub fn temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.temp_root = Some(root.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<EngineConfig, EngineError> {
        let c = &self.config;
        if c.chunk_size == 0 {
            return Err(EngineError::InvalidConfig("chunk_size must be ≥ 1".into()));
        }
        if c.ocr_concurrency == 0 {
            return Err(EngineError::InvalidConfig(
                "ocr_concurrency must be ≥ 1".into(),
            ));
        }
        if c.default_language.is_empty() {
            return Err(EngineError::InvalidConfig(
                "default_language must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::builder().build().unwrap();
        assert_eq!(config.chunk_size, 20);
        assert_eq!(config.ocr_concurrency, 4);
        assert!(!config.strict_selectors);
    }

    #[test]
    fn setters_clamp_to_sane_floors() {
        let config = EngineConfig::builder()
            .chunk_size(0)
            .ocr_concurrency(0)
            .ocr_dpi(10_000)
            .build()
            .unwrap();
        assert_eq!(config.chunk_size, 1);
        assert_eq!(config.ocr_concurrency, 1);
        assert_eq!(config.ocr_dpi, 600);
    }

    #[test]
    fn empty_language_rejected() {
        let err = EngineConfig::builder().default_language("").build();
        assert!(err.is_err());
    }
}
