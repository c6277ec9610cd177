//! Markscheme entries and link results

use crate::markers::normalize_code;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Layout family of a markscheme document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkschemeFormat {
    /// Rows of question reference, answer and a marks column
    Tabular,
    /// Standalone question numbers with bracketed part markers below them
    Listed,
    /// One line per entry: `1(a) answer [M1][A1][2]`
    Compact,
}

impl fmt::Display for MarkschemeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MarkschemeFormat::Tabular => "tabular",
            MarkschemeFormat::Listed => "listed",
            MarkschemeFormat::Compact => "compact",
        };
        f.write_str(name)
    }
}

/// A shorthand award code and the answer text it annotates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkPoint {
    /// `M1`, `A1`, `B2`, `C1`, or a check mark
    pub code: String,
    pub text: String,
}

/// One parsed markscheme entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkschemeEntry {
    pub question: u32,
    /// Part code as written; empty for a whole-question entry
    pub part_code: String,
    pub text: String,
    pub mark_points: Vec<MarkPoint>,
    pub total_marks: u32,
    /// True when `total_marks` was counted from mark points
    pub total_inferred: bool,
}

impl MarkschemeEntry {
    pub fn normalized_code(&self) -> String {
        normalize_code(&self.part_code)
    }

    /// The entry's mark value, or `None` when nothing declared one: no
    /// bracketed total and no mark points to count.
    pub fn known_marks(&self) -> Option<u32> {
        if self.total_inferred && self.mark_points.is_empty() {
            None
        } else {
            Some(self.total_marks)
        }
    }
}

pub(crate) fn label(question: u32, code: &str) -> String {
    if code.is_empty() {
        format!("question {}", question)
    } else {
        format!("question {} {}", question, code)
    }
}

/// Which parts of the confidence formula fired for a link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkDetails {
    /// Normalized codes matched exactly
    pub key_match: bool,
    /// Codes matched by their trailing components
    pub suffix_match: bool,
    /// Declared part marks equal the entry total
    pub marks_match: bool,
    /// Jaccard overlap of part and entry cues; 0.5 when neither has cues
    pub cue_overlap: f64,
}

/// The link of one question part to a markscheme entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkschemeLink {
    pub question: u32,
    pub part_code: String,
    /// In [0, 1]; zero means no suitable entry was found
    pub confidence: f64,
    pub mark_points: Vec<MarkPoint>,
    pub snippet: String,
    pub details: LinkDetails,
    /// Index into [`LinkingResult::entries`]
    pub entry_index: Option<usize>,
}

impl MarkschemeLink {
    pub fn is_linked(&self) -> bool {
        self.confidence > 0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkingStats {
    pub total_parts: usize,
    pub linked: usize,
    pub unlinked: usize,
    /// Mean confidence over linked parts only
    pub average_confidence: f64,
    pub warning_count: usize,
}

/// Links for every part of one paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkingResult {
    pub format: MarkschemeFormat,
    pub entries: Vec<MarkschemeEntry>,
    pub links: Vec<MarkschemeLink>,
    pub stats: LinkingStats,
    pub warnings: Vec<String>,
}

impl LinkingResult {
    pub fn link(&self, question: u32, part_code: &str) -> Option<&MarkschemeLink> {
        let wanted = normalize_code(part_code);
        self.links
            .iter()
            .find(|l| l.question == question && normalize_code(&l.part_code) == wanted)
    }

    /// Links of one question that found an entry.
    pub fn linked_for(&self, question: u32) -> impl Iterator<Item = &MarkschemeLink> {
        self.links
            .iter()
            .filter(move |l| l.question == question && l.is_linked())
    }
}
