//! Pages, fragments and bounding boxes

use serde::{Deserialize, Serialize};

/// A page-bounded rectangle (top-left origin, page-local coordinates).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub page: usize,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(page: usize, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            page,
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Smallest box covering both. Returns `None` when the boxes are on
    /// different pages.
    pub fn union(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if self.page != other.page {
            return None;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Some(BoundingBox {
            page: self.page,
            x,
            y,
            width: self.right().max(other.right()) - x,
            height: self.bottom().max(other.bottom()) - y,
        })
    }
}

/// A single text run as extracted from a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFragment {
    pub text: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
}

/// One page of extracted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub index: usize,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    /// Raised upstream when the page had too little extractable text
    /// (OCR should have run). Only read and recorded here.
    #[serde(default)]
    pub low_text_density: bool,
    #[serde(default)]
    pub fragments: Vec<TextFragment>,
}

impl Page {
    /// Number of non-whitespace characters extracted from this page.
    pub fn char_count(&self) -> usize {
        self.fragments
            .iter()
            .map(|f| f.text.chars().filter(|c| !c.is_whitespace()).count())
            .sum()
    }
}

/// A whole extracted document: the question paper or the markscheme.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    #[serde(default)]
    pub pages: Vec<Page>,
}

/// A fragment placed in the document-wide reading order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionedFragment<'a> {
    pub text: &'a str,
    pub page: usize,
    pub bbox: BoundingBox,
}

impl SourceDocument {
    pub fn new(pages: Vec<Page>) -> Self {
        Self { pages }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Height of the given page, when the extractor reported one.
    pub fn page_height(&self, page: usize) -> Option<f64> {
        self.pages
            .iter()
            .find(|p| p.index == page)
            .and_then(|p| p.height)
    }

    /// The ordered fragment stream: pages in order, fragments in the order
    /// the extractor emitted them.
    pub fn fragments(&self) -> Vec<PositionedFragment<'_>> {
        self.pages
            .iter()
            .flat_map(|page| {
                page.fragments.iter().map(move |f| PositionedFragment {
                    text: f.text.as_str(),
                    page: page.index,
                    bbox: BoundingBox::new(page.index, f.x, f.y, f.width, f.height),
                })
            })
            .collect()
    }

    /// True when no page carries any non-blank fragment.
    pub fn is_blank(&self) -> bool {
        self.pages
            .iter()
            .all(|p| p.fragments.iter().all(|f| f.text.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests;
