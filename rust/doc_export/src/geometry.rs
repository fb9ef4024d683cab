//! Paper sizes and the printable content box.
//!
//! Page lengths are points (1/72 in); diagram lengths are CSS pixels (1/96 in).

use serde::{Deserialize, Serialize};

pub const PX_PER_PT: f64 = 96.0 / 72.0;
pub const TWIPS_PER_PT: f64 = 20.0;
pub const EMU_PER_PX: f64 = 9525.0;

pub fn pt_to_twips(pt: f64) -> i64 {
    (pt * TWIPS_PER_PT).round() as i64
}

pub fn px_to_emu(px: f64) -> i64 {
    (px * EMU_PER_PX).round() as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSize {
    A3,
    #[default]
    A4,
    A5,
    Letter,
    Legal,
    Tabloid,
}

impl PageSize {
    pub const ALL: [PageSize; 6] = [
        PageSize::A3,
        PageSize::A4,
        PageSize::A5,
        PageSize::Letter,
        PageSize::Legal,
        PageSize::Tabloid,
    ];

    /// Portrait (width, height) in points.
    pub fn dimensions(self) -> (f64, f64) {
        match self {
            PageSize::A3 => (841.89, 1190.55),
            PageSize::A4 => (595.28, 841.89),
            PageSize::A5 => (419.53, 595.28),
            PageSize::Letter => (612.0, 792.0),
            PageSize::Legal => (612.0, 1008.0),
            PageSize::Tabloid => (792.0, 1224.0),
        }
    }

    /// Name understood by CSS `@page { size: ... }`.
    pub fn css_name(self) -> &'static str {
        match self {
            PageSize::A3 => "A3",
            PageSize::A4 => "A4",
            PageSize::A5 => "A5",
            PageSize::Letter => "letter",
            PageSize::Legal => "legal",
            PageSize::Tabloid => "ledger",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn css_name(self) -> &'static str {
        match self {
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
        }
    }
}

/// Page margins in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Margins {
    pub fn uniform(pt: f64) -> Self {
        Self {
            top: pt,
            right: pt,
            bottom: pt,
            left: pt,
        }
    }
}

impl Default for Margins {
    fn default() -> Self {
        Margins::uniform(72.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub size: PageSize,
    pub orientation: Orientation,
    pub margins: Margins,
}

impl PageGeometry {
    pub fn new(size: PageSize, orientation: Orientation, margins: Margins) -> Self {
        Self {
            size,
            orientation,
            margins,
        }
    }

    /// Oriented (width, height) in points.
    pub fn page_size(&self) -> (f64, f64) {
        let (w, h) = self.size.dimensions();
        match self.orientation {
            Orientation::Portrait => (w, h),
            Orientation::Landscape => (h, w),
        }
    }

    /// Printable content box in points; never negative.
    pub fn content_box(&self) -> (f64, f64) {
        let (w, h) = self.page_size();
        let m = &self.margins;
        (
            (w - m.left - m.right).max(0.0),
            (h - m.top - m.bottom).max(0.0),
        )
    }

    /// Printable content box in CSS pixels.
    pub fn content_box_px(&self) -> (f64, f64) {
        let (w, h) = self.content_box();
        (w * PX_PER_PT, h * PX_PER_PT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_matches_word_default_twips() {
        let g = PageGeometry::new(PageSize::Letter, Orientation::Portrait, Margins::default());
        let (w, h) = g.page_size();
        assert_eq!(pt_to_twips(w), 12240);
        assert_eq!(pt_to_twips(h), 15840);
        assert_eq!(pt_to_twips(g.margins.left), 1440);
    }

    #[test]
    fn landscape_swaps_and_content_box_subtracts_margins() {
        let g = PageGeometry::new(PageSize::A4, Orientation::Landscape, Margins::uniform(36.0));
        let (w, h) = g.page_size();
        assert!(w > h);
        let (cw, ch) = g.content_box();
        assert!((cw - (841.89 - 72.0)).abs() < 1e-9);
        assert!((ch - (595.28 - 72.0)).abs() < 1e-9);
    }

    #[test]
    fn oversized_margins_clamp_to_zero() {
        let g = PageGeometry::new(PageSize::A5, Orientation::Portrait, Margins::uniform(400.0));
        assert_eq!(g.content_box(), (0.0, 0.0));
    }
}
