//! Line-oriented document construction for fixtures and tests

use super::fragment::{Page, SourceDocument, TextFragment};

const PAGE_WIDTH: f64 = 595.0;
const PAGE_HEIGHT: f64 = 842.0;
const TOP: f64 = 60.0;
const LINE_HEIGHT: f64 = 16.0;
const LEFT: f64 = 50.0;
const CHAR_WIDTH: f64 = 6.0;

/// Builds a [`SourceDocument`] one line at a time on A4-sized pages.
///
/// ```
/// use paperlink::document::DocumentBuilder;
///
/// let doc = DocumentBuilder::new()
///     .line("1")
///     .line("Explain why the sky is blue.")
///     .page()
///     .line("(Total for Question 1 = 2 marks)")
///     .build();
/// assert_eq!(doc.page_count(), 2);
/// ```
#[derive(Debug, Default)]
pub struct DocumentBuilder {
    pages: Vec<Page>,
    cursor_y: f64,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new page.
    pub fn page(mut self) -> Self {
        let index = self.pages.len();
        self.pages.push(Page {
            index,
            width: Some(PAGE_WIDTH),
            height: Some(PAGE_HEIGHT),
            low_text_density: false,
            fragments: Vec::new(),
        });
        self.cursor_y = TOP;
        self
    }

    /// Append a line at the left margin.
    pub fn line(self, text: &str) -> Self {
        self.line_at(LEFT, text)
    }

    /// Append a line at a given x offset.
    pub fn line_at(mut self, x: f64, text: &str) -> Self {
        let y = self.next_y();
        self.push(x, y, text);
        self
    }

    /// Append several cells sharing one baseline (a table row).
    pub fn row(mut self, cells: &[(f64, &str)]) -> Self {
        let y = self.next_y();
        for (x, text) in cells {
            self.push(*x, y, text);
        }
        self
    }

    /// Place a fragment at an absolute position on the current page
    /// without advancing the line cursor.
    pub fn place(mut self, x: f64, y: f64, text: &str) -> Self {
        self.ensure_page();
        self.push(x, y, text);
        self
    }

    /// Mark the current page as having low text density.
    pub fn low_density(mut self) -> Self {
        self.ensure_page();
        if let Some(page) = self.pages.last_mut() {
            page.low_text_density = true;
        }
        self
    }

    pub fn build(self) -> SourceDocument {
        SourceDocument::new(self.pages)
    }

    fn ensure_page(&mut self) {
        if self.pages.is_empty() {
            let fresh = std::mem::take(self).page();
            *self = fresh;
        }
    }

    fn next_y(&mut self) -> f64 {
        self.ensure_page();
        let y = self.cursor_y;
        self.cursor_y += LINE_HEIGHT;
        y
    }

    fn push(&mut self, x: f64, y: f64, text: &str) {
        if let Some(page) = self.pages.last_mut() {
            page.fragments.push(TextFragment {
                text: text.to_string(),
                x,
                y,
                width: text.chars().count() as f64 * CHAR_WIDTH,
                height: LINE_HEIGHT - 4.0,
            });
        }
    }
}
