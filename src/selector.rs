//! Page selectors: parsed, deduplicated, ordered sets of 1-based page
//! indices.
//!
//! The grammar is the familiar print-dialog form: comma-separated tokens,
//! each either a single page (`5`) or an inclusive range (`2-7`). Two parse
//! modes exist:
//!
//! * **Lenient** ([`PageSelector::parse`]) — malformed or out-of-range
//!   tokens are dropped wholesale (a range is never partially clamped) and
//!   the best-effort valid subset is returned. Parsing never fails.
//! * **Strict** ([`PageSelector::parse_strict`]) — the first bad token is
//!   reported as [`EngineError::InvalidSelector`].
//!
//! Which mode an engine uses is decided once, in
//! [`crate::config::EngineConfig::strict_selectors`], so behaviour is
//! uniform across every operation.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An ordered, duplicate-free set of 1-based page indices, all within
/// `[1, total_pages]` of the document it was parsed against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSelector(Vec<u32>);

impl PageSelector {
    /// Selector covering all pages `1..=total_pages`.
    pub fn all(total_pages: u32) -> Self {
        Self((1..=total_pages).collect())
    }

    /// Build from explicit indices: out-of-range entries are dropped,
    /// duplicates collapse, order is ascending.
    pub fn from_pages(pages: impl IntoIterator<Item = u32>, total_pages: u32) -> Self {
        let set: BTreeSet<u32> = pages
            .into_iter()
            .filter(|&p| p >= 1 && p <= total_pages)
            .collect();
        Self(set.into_iter().collect())
    }

    /// Lenient parse: empty or blank `spec` means all pages; invalid tokens
    /// are silently excluded; never fails.
    pub fn parse(spec: &str, total_pages: u32) -> Self {
        if spec.trim().is_empty() {
            return Self::all(total_pages);
        }
        let mut set = BTreeSet::new();
        for token in spec.split(',') {
            if let Ok(Some(run)) = parse_token(token, total_pages) {
                set.extend(run);
            }
        }
        Self(set.into_iter().collect())
    }

    /// Strict parse: same grammar, but the first malformed or out-of-range
    /// token fails the whole spec.
    pub fn parse_strict(spec: &str, total_pages: u32) -> Result<Self, EngineError> {
        if spec.trim().is_empty() {
            return Ok(Self::all(total_pages));
        }
        let mut set = BTreeSet::new();
        for token in spec.split(',') {
            match parse_token(token, total_pages) {
                Ok(Some(run)) => set.extend(run),
                Ok(None) => {} // empty token between commas, ignored in both modes
                Err(detail) => {
                    return Err(EngineError::InvalidSelector {
                        spec: spec.to_string(),
                        detail,
                    })
                }
            }
        }
        Ok(Self(set.into_iter().collect()))
    }

    /// The selected indices, ascending, 1-based.
    pub fn pages(&self) -> &[u32] {
        &self.0
    }

    /// 0-based indices for backends that count from zero.
    pub fn zero_based(&self) -> Vec<usize> {
        self.0.iter().map(|&p| (p - 1) as usize).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, page: u32) -> bool {
        self.0.binary_search(&page).is_ok()
    }

    /// Smallest and largest selected index, when non-empty.
    pub fn bounds(&self) -> Option<(u32, u32)> {
        Some((*self.0.first()?, *self.0.last()?))
    }

    /// Remove a single page (used by skip-first-page pagination).
    pub fn without(&self, page: u32) -> Self {
        Self(self.0.iter().copied().filter(|&p| p != page).collect())
    }

    /// Maximal contiguous runs, ascending: `[1,2,3,5,7,8]` → `[(1,3),(5,5),(7,8)]`.
    /// This is the shape qpdf-style range arguments want.
    pub fn runs(&self) -> Vec<(u32, u32)> {
        let mut runs = Vec::new();
        let mut iter = self.0.iter().copied();
        let Some(first) = iter.next() else {
            return runs;
        };
        let (mut start, mut end) = (first, first);
        for p in iter {
            if p == end + 1 {
                end = p;
            } else {
                runs.push((start, end));
                start = p;
                end = p;
            }
        }
        runs.push((start, end));
        runs
    }

    /// Render as the canonical range string: `[1,2,3,5]` → `"1-3,5"`.
    pub fn to_range_string(&self) -> String {
        self.runs()
            .iter()
            .map(|&(a, b)| {
                if a == b {
                    a.to_string()
                } else {
                    format!("{a}-{b}")
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Partition into contiguous groups of at most `size` pages, preserving
    /// order; the last group may be smaller. Used by the OCR chunk pipeline.
    pub fn chunks(&self, size: usize) -> Vec<PageSelector> {
        assert!(size >= 1, "chunk size must be positive");
        self.0
            .chunks(size)
            .map(|c| PageSelector(c.to_vec()))
            .collect()
    }

    /// Lenient group parse: one selector **per comma token**, in spec order,
    /// invalid tokens dropped. This is the split-by-ranges shape, where
    /// `"1-3,5"` means two output documents, not one five-page selection.
    pub fn parse_groups(spec: &str, total_pages: u32) -> Vec<PageSelector> {
        spec.split(',')
            .filter_map(|token| match parse_token(token, total_pages) {
                Ok(Some(run)) => Some(PageSelector(run.collect())),
                _ => None,
            })
            .collect()
    }

    /// Strict group parse: like [`PageSelector::parse_groups`] but the first
    /// bad token fails the whole spec.
    pub fn parse_groups_strict(
        spec: &str,
        total_pages: u32,
    ) -> Result<Vec<PageSelector>, EngineError> {
        let mut groups = Vec::new();
        for token in spec.split(',') {
            match parse_token(token, total_pages) {
                Ok(Some(run)) => groups.push(PageSelector(run.collect())),
                Ok(None) => {}
                Err(detail) => {
                    return Err(EngineError::InvalidSelector {
                        spec: spec.to_string(),
                        detail,
                    })
                }
            }
        }
        Ok(groups)
    }
}

/// Parse one comma-delimited token. `Ok(None)` = blank token; `Err` carries
/// the strict-mode detail; `Ok(Some(range))` = the inclusive run it selects.
/// A token whose bounds fall outside `[1, total_pages]`, or whose start
/// exceeds its end, is invalid as a whole — no partial clamping.
fn parse_token(
    token: &str,
    total_pages: u32,
) -> Result<Option<std::ops::RangeInclusive<u32>>, String> {
    let token = token.trim();
    if token.is_empty() {
        return Ok(None);
    }

    if let Some((a, b)) = token.split_once('-') {
        let start: u32 = a
            .trim()
            .parse()
            .map_err(|_| format!("'{token}' is not a page range"))?;
        let end: u32 = b
            .trim()
            .parse()
            .map_err(|_| format!("'{token}' is not a page range"))?;
        if start < 1 || end > total_pages {
            return Err(format!(
                "'{token}' is outside 1-{total_pages}"
            ));
        }
        if start > end {
            return Err(format!("'{token}' is inverted"));
        }
        Ok(Some(start..=end))
    } else {
        let page: u32 = token
            .parse()
            .map_err(|_| format!("'{token}' is not a page number"))?;
        if page < 1 || page > total_pages {
            return Err(format!("'{token}' is outside 1-{total_pages}"));
        }
        Ok(Some(page..=page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_spec_selects_all_pages() {
        assert_eq!(PageSelector::parse("", 4).pages(), &[1, 2, 3, 4]);
        assert_eq!(PageSelector::parse("   ", 2).pages(), &[1, 2]);
    }

    #[test]
    fn singletons_and_ranges_combine() {
        assert_eq!(
            PageSelector::parse("1-3,5,7-9", 10).pages(),
            &[1, 2, 3, 5, 7, 8, 9]
        );
    }

    #[test]
    fn tokens_are_trimmed() {
        assert_eq!(PageSelector::parse(" 2 , 4 - 5 ", 6).pages(), &[2, 4, 5]);
    }

    #[test]
    fn inverted_range_yields_nothing() {
        assert!(PageSelector::parse("2-1", 5).is_empty());
    }

    #[test]
    fn out_of_range_tokens_dropped_wholesale() {
        // 0 and 5 both invalid for a 3-page document.
        assert!(PageSelector::parse("0,5", 3).is_empty());
        // A range straddling the bound is dropped, not clamped.
        assert!(PageSelector::parse("2-9", 3).is_empty());
    }

    #[test]
    fn duplicates_collapse_sorted() {
        assert_eq!(PageSelector::parse("2,2,1", 3).pages(), &[1, 2]);
        assert_eq!(PageSelector::parse("3,1-3", 3).pages(), &[1, 2, 3]);
    }

    #[test]
    fn malformed_tokens_never_raise_in_lenient_mode() {
        assert_eq!(PageSelector::parse("x,2,!!,-", 3).pages(), &[2]);
    }

    #[test]
    fn strict_mode_reports_first_bad_token() {
        let err = PageSelector::parse_strict("1,zap,3", 5).unwrap_err();
        match err {
            EngineError::InvalidSelector { detail, .. } => {
                assert!(detail.contains("zap"), "got: {detail}")
            }
            other => panic!("expected InvalidSelector, got {other:?}"),
        }
        assert!(PageSelector::parse_strict("2-1", 5).is_err());
        assert!(PageSelector::parse_strict("0", 5).is_err());
        assert_eq!(
            PageSelector::parse_strict("1-2,,4", 5).unwrap().pages(),
            &[1, 2, 4]
        );
    }

    #[test]
    fn runs_split_at_gaps() {
        let sel = PageSelector::parse("1-3,5,7-8", 10);
        assert_eq!(sel.runs(), vec![(1, 3), (5, 5), (7, 8)]);
        assert_eq!(sel.to_range_string(), "1-3,5,7-8");
    }

    #[test]
    fn chunks_partition_contiguously() {
        let sel = PageSelector::all(45);
        let chunks = sel.chunks(20);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 20);
        assert_eq!(chunks[1].len(), 20);
        assert_eq!(chunks[2].len(), 5);
        assert_eq!(chunks[2].pages(), &[41, 42, 43, 44, 45]);
    }

    #[test]
    fn groups_keep_one_selector_per_token() {
        let groups = PageSelector::parse_groups("1-3,5,9-2,7", 8);
        assert_eq!(groups.len(), 3); // "9-2" dropped wholesale
        assert_eq!(groups[0].pages(), &[1, 2, 3]);
        assert_eq!(groups[1].pages(), &[5]);
        assert_eq!(groups[2].pages(), &[7]);

        assert!(PageSelector::parse_groups_strict("1-3,9-2", 8).is_err());
    }

    #[test]
    fn zero_based_conversion() {
        assert_eq!(PageSelector::parse("1,3", 3).zero_based(), vec![0, 2]);
    }
}
