//! Segmentation output types

use crate::document::BoundingBox;
use crate::markers::normalize_code;
use serde::{Deserialize, Serialize};

/// One part or subpart of a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    /// Qualified code such as `"(a)"` or `"(a)(ii)"`; empty for the implicit
    /// whole-question part
    pub code: String,
    /// Marks declared next to the part, if any
    pub marks: Option<u32>,
    /// Visual footprint, one box per page touched, in reading order
    pub boxes: Vec<BoundingBox>,
    /// Text of the part with its marker stripped
    pub text: String,
    pub page_from: usize,
    pub page_to: usize,
    /// False when the part was inferred rather than started by a marker
    pub explicit_marker: bool,
}

impl Part {
    pub fn normalized_code(&self) -> String {
        normalize_code(&self.code)
    }
}

/// A whole question bounded by its fence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub number: u32,
    /// Total declared by the closing fence; `None` when closed implicitly
    pub total_marks: Option<u32>,
    /// Whether an explicit fence closed this question
    pub fenced: bool,
    /// Stem and every part, in reading order. Tagging always consumes this.
    pub context_text: String,
    /// Stem text before the first part marker
    pub header_text: String,
    pub header_box: Option<BoundingBox>,
    pub parts: Vec<Part>,
    pub start_page: usize,
    pub end_page: usize,
}

impl Question {
    /// Sum of all declared part marks.
    pub fn part_marks_sum(&self) -> u32 {
        self.parts.iter().filter_map(|p| p.marks).sum()
    }
}

/// Counts and warnings describing a segmentation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentationMetadata {
    /// Explicit fences found in the stream
    pub fences_found: usize,
    /// Fences implied by the emitted question structure (explicit + implicit)
    pub fences_implied: usize,
    pub question_count: usize,
    pub part_count: usize,
    /// Some page had too little extracted text, so OCR output was involved
    pub ocr_used: bool,
    pub warnings: Vec<String>,
}

/// Questions of one paper plus run metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentationResult {
    pub questions: Vec<Question>,
    pub metadata: SegmentationMetadata,
}

impl SegmentationResult {
    /// Iterate every (question, part) pair in reading order.
    pub fn parts(&self) -> impl Iterator<Item = (&Question, &Part)> {
        self.questions
            .iter()
            .flat_map(|q| q.parts.iter().map(move |p| (q, p)))
    }
}

/// Fatal segmentation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SegmentError {
    #[error("question paper contains no text fragments")]
    EmptyInput,
}
