//! Pure transformation logic: rotation specs, angle normalization, and
//! page-number label formatting.
//!
//! Everything here is total and side-effect free; backends consume these
//! values but never define them. Angle normalization maps any integer onto
//! `{0, 90, 180, 270}`; numeral formatting turns a 1-based position into the
//! label stamped on the page.

use crate::selector::PageSelector;
use serde::{Deserialize, Serialize};

// ── Rotation ─────────────────────────────────────────────────────────────

/// Reduce any integer angle to one of the four canonical page rotations.
pub fn normalize_angle(angle: i32) -> u16 {
    (((angle % 360) + 360) % 360) as u16
}

/// One rotation instruction: turn every page in `pages` by `angle` degrees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationEntry {
    pub pages: PageSelector,
    /// Any integer; normalized before application.
    pub angle: i32,
}

/// A set of rotation instructions applied in order.
///
/// Rotations are cumulative: the normalized angle is *added* to the page's
/// existing rotation, mod 360, so rotating by 360 (or four times by 90) is
/// the identity. Pages not named by any entry pass through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RotationSpec {
    pub entries: Vec<RotationEntry>,
}

impl RotationSpec {
    /// Single-entry convenience constructor.
    pub fn uniform(pages: PageSelector, angle: i32) -> Self {
        Self {
            entries: vec![RotationEntry { pages, angle }],
        }
    }

    /// Net normalized rotation this spec adds to `page`, summing every entry
    /// that names it.
    pub fn delta_for(&self, page: u32) -> u16 {
        let mut total: u32 = 0;
        for entry in &self.entries {
            if entry.pages.contains(page) {
                total = (total + normalize_angle(entry.angle) as u32) % 360;
            }
        }
        total as u16
    }

    /// True when no entry rotates any page.
    pub fn is_noop(&self) -> bool {
        self.entries
            .iter()
            .all(|e| e.pages.is_empty() || normalize_angle(e.angle) == 0)
    }
}

// ── Page numbering ───────────────────────────────────────────────────────

/// Numeral system for page-number labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberFormat {
    /// Decimal digits. (default)
    #[default]
    Numeric,
    /// Uppercase subtractive Roman numerals; positive inputs only.
    Roman,
    /// Lowercase bijective base-26 letters: a, b, …, z, aa, ab, …
    Alphabetic,
}

/// Where on the page the label is stamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    TopLeft,
    TopCenter,
    TopRight,
    BottomLeft,
    #[default]
    BottomCenter,
    BottomRight,
}

impl Position {
    /// True for the three top anchors.
    pub fn is_top(self) -> bool {
        matches!(self, Position::TopLeft | Position::TopCenter | Position::TopRight)
    }
}

/// A page-numbering request: constructed per call, consumed once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageNumberSpec {
    pub format: NumberFormat,
    pub position: Position,
    /// Number assigned to page 1 (before skip handling). Must be ≥ 1.
    pub start_number: u32,
    pub prefix: String,
    pub suffix: String,
    /// Horizontal distance from the page edge, in points.
    pub margin_x: f32,
    /// Vertical distance from the page edge, in points.
    pub margin_y: f32,
    pub font_size: f32,
    /// Drop page 1 from the numbering target set. Later pages keep their
    /// original document position: with defaults, page 2 is numbered "2".
    pub skip_first_page: bool,
    /// Range string limiting which pages get a label; `None` = all pages.
    pub selector: Option<String>,
}

impl Default for PageNumberSpec {
    fn default() -> Self {
        Self {
            format: NumberFormat::Numeric,
            position: Position::BottomCenter,
            start_number: 1,
            prefix: String::new(),
            suffix: String::new(),
            margin_x: 40.0,
            margin_y: 30.0,
            font_size: 12.0,
            skip_first_page: false,
            selector: None,
        }
    }
}

impl PageNumberSpec {
    /// Validate invariants that must hold before any backend runs.
    pub fn validate(&self) -> Result<(), crate::error::EngineError> {
        if self.start_number == 0 {
            return Err(crate::error::EngineError::MalformedRequest(
                "start_number must be >= 1".into(),
            ));
        }
        if !(self.font_size.is_finite() && self.font_size > 0.0) {
            return Err(crate::error::EngineError::MalformedRequest(
                "font_size must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Pages that receive a label, given a pre-parsed base selector.
    pub fn target_pages(&self, base: PageSelector) -> PageSelector {
        if self.skip_first_page {
            base.without(1)
        } else {
            base
        }
    }

    /// The full label for the page at 1-based document position `page`:
    /// prefix + formatted `(page + start_number - 1)` + suffix.
    ///
    /// Numbers reflect position-in-document, not position-in-selector.
    pub fn label_for(&self, page: u32) -> String {
        let n = page + self.start_number - 1;
        let body = match self.format {
            NumberFormat::Numeric => n.to_string(),
            NumberFormat::Roman => roman_upper(n),
            NumberFormat::Alphabetic => alphabetic_lower(n),
        };
        format!("{}{}{}", self.prefix, body, self.suffix)
    }
}

/// Classic subtractive-notation uppercase Roman numeral.
///
/// Defined for positive integers only; zero is a contract violation the
/// caller must reject (see [`PageNumberSpec::validate`]).
pub fn roman_upper(mut n: u32) -> String {
    assert!(n > 0, "roman numerals are defined for positive integers");
    const TABLE: [(u32, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut out = String::new();
    for (value, glyph) in TABLE {
        while n >= value {
            out.push_str(glyph);
            n -= value;
        }
    }
    out
}

/// Lowercase bijective base-26 letter sequence: 1 → "a", 26 → "z",
/// 27 → "aa", 28 → "ab". Positive integers only.
pub fn alphabetic_lower(mut n: u32) -> String {
    assert!(n > 0, "alphabetic labels are defined for positive integers");
    let mut out = Vec::new();
    while n > 0 {
        n -= 1;
        out.push(char::from(b'a' + (n % 26) as u8));
        n /= 26;
    }
    out.reverse();
    out.into_iter().collect()
}
