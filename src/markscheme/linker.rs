//! Part ↔ markscheme-entry linking with confidence scoring

use super::format::{detect_format, parse_entries};
use super::types::{
    label, LinkDetails, LinkingResult, LinkingStats, MarkschemeEntry, MarkschemeFormat,
    MarkschemeLink,
};
use crate::config::LinkerConfig;
use crate::cues::{extract_cues, KeyTermVocabulary};
use crate::document::SourceDocument;
use crate::segment::{Part, SegmentationResult};
use tracing::info;

/// How a part's code matched an entry's code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyMatch {
    Exact,
    Suffix,
    /// The implicit whole-question part taking a question's only entry
    Fuzzy,
}

impl KeyMatch {
    fn score(self) -> f64 {
        match self {
            KeyMatch::Exact => 1.0,
            KeyMatch::Suffix | KeyMatch::Fuzzy => 0.5,
        }
    }
}

/// One side's components are a trailing run of the other's.
fn is_component_suffix(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() || a == b {
        return false;
    }
    let a: Vec<&str> = a.split('.').collect();
    let b: Vec<&str> = b.split('.').collect();
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    long.ends_with(&short)
}

/// Either side without a mark value scores the neutral 0.5.
fn marks_score(part: Option<u32>, entry: Option<u32>) -> f64 {
    match (part, entry) {
        (Some(part), Some(entry)) if part == entry => 1.0,
        (Some(part), Some(entry)) if part.abs_diff(entry) == 1 => 0.5,
        (Some(_), Some(_)) => 0.0,
        _ => 0.5,
    }
}

fn snippet(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Links every question part to at most one markscheme entry.
pub struct MarkschemeLinker {
    config: LinkerConfig,
}

impl Default for MarkschemeLinker {
    fn default() -> Self {
        Self::new(LinkerConfig::default())
    }
}

impl MarkschemeLinker {
    pub fn new(config: LinkerConfig) -> Self {
        Self { config }
    }

    /// Detect the markscheme format, parse its entries and link them.
    pub fn link(
        &self,
        segmentation: &SegmentationResult,
        markscheme: &SourceDocument,
        vocabulary: &KeyTermVocabulary,
    ) -> LinkingResult {
        if markscheme.is_blank() {
            let mut result =
                self.link_entries(segmentation, MarkschemeFormat::Listed, Vec::new(), vocabulary);
            result
                .warnings
                .insert(0, "markscheme is empty; every part left unlinked".to_string());
            result.stats.warning_count = result.warnings.len();
            return result;
        }

        let frags = markscheme.fragments();
        let format = detect_format(&frags, &self.config);
        let entries = parse_entries(format, &frags, &self.config);
        self.link_entries(segmentation, format, entries, vocabulary)
    }

    /// Link already-parsed entries to the parts of a segmented paper.
    pub fn link_entries(
        &self,
        segmentation: &SegmentationResult,
        format: MarkschemeFormat,
        entries: Vec<MarkschemeEntry>,
        vocabulary: &KeyTermVocabulary,
    ) -> LinkingResult {
        let normalized: Vec<String> = entries.iter().map(|e| e.normalized_code()).collect();
        let mut claimed = vec![false; entries.len()];
        let mut links = Vec::new();
        let mut warnings = Vec::new();

        for (question, part) in segmentation.parts() {
            let candidates: Vec<usize> = (0..entries.len())
                .filter(|&i| entries[i].question == question.number)
                .collect();

            let found = self.find_entry(part, &candidates, &normalized, &claimed);
            let link = match found {
                Some((index, key)) => {
                    claimed[index] = true;
                    self.score(question.number, part, index, &entries[index], key, vocabulary)
                }
                None => {
                    warnings.push(format!(
                        "{}: no markscheme entry found",
                        label(question.number, &part.code)
                    ));
                    MarkschemeLink {
                        question: question.number,
                        part_code: part.code.clone(),
                        confidence: 0.0,
                        mark_points: Vec::new(),
                        snippet: String::new(),
                        details: LinkDetails::default(),
                        entry_index: None,
                    }
                }
            };

            if link.confidence > 0.0 && link.confidence < self.config.low_confidence {
                warnings.push(format!(
                    "{}: low confidence link ({:.2})",
                    label(question.number, &part.code),
                    link.confidence
                ));
            }
            links.push(link);
        }

        for (entry, used) in entries.iter().zip(&claimed) {
            if !used {
                warnings.push(format!(
                    "unused markscheme entry {}; possible format mismatch",
                    label(entry.question, &entry.part_code)
                ));
            }
        }

        let linked: Vec<f64> = links
            .iter()
            .filter(|l| l.is_linked())
            .map(|l| l.confidence)
            .collect();
        let stats = LinkingStats {
            total_parts: links.len(),
            linked: linked.len(),
            unlinked: links.len() - linked.len(),
            average_confidence: if linked.is_empty() {
                0.0
            } else {
                linked.iter().sum::<f64>() / linked.len() as f64
            },
            warning_count: warnings.len(),
        };

        info!(
            format = %format,
            entries = entries.len(),
            linked = stats.linked,
            unlinked = stats.unlinked,
            "linked markscheme"
        );

        LinkingResult {
            format,
            entries,
            links,
            stats,
            warnings,
        }
    }

    /// Pick the entry for a part: exact code, then component suffix, then
    /// the fuzzy whole-question fallback. Unclaimed entries win ties.
    fn find_entry(
        &self,
        part: &Part,
        candidates: &[usize],
        normalized: &[String],
        claimed: &[bool],
    ) -> Option<(usize, KeyMatch)> {
        let code = part.normalized_code();
        let prefer_unclaimed = |matches: Vec<usize>| -> Option<usize> {
            matches
                .iter()
                .copied()
                .find(|&i| !claimed[i])
                .or_else(|| matches.first().copied())
        };

        let exact = candidates
            .iter()
            .copied()
            .filter(|&i| normalized[i] == code)
            .collect();
        if let Some(i) = prefer_unclaimed(exact) {
            return Some((i, KeyMatch::Exact));
        }

        let suffix = candidates
            .iter()
            .copied()
            .filter(|&i| is_component_suffix(&code, &normalized[i]))
            .collect();
        if let Some(i) = prefer_unclaimed(suffix) {
            return Some((i, KeyMatch::Suffix));
        }

        if code.is_empty() && !part.explicit_marker && candidates.len() == 1 {
            return Some((candidates[0], KeyMatch::Fuzzy));
        }
        None
    }

    fn score(
        &self,
        question: u32,
        part: &Part,
        index: usize,
        entry: &MarkschemeEntry,
        key: KeyMatch,
        vocabulary: &KeyTermVocabulary,
    ) -> MarkschemeLink {
        let weights = &self.config.weights;
        let part_cues = extract_cues(&part.text, vocabulary);
        let entry_cues = extract_cues(&entry.text, vocabulary);
        let overlap = part_cues.jaccard(&entry_cues).unwrap_or(0.5);
        let entry_marks = entry.known_marks();

        let confidence = weights.key * key.score()
            + weights.marks * marks_score(part.marks, entry_marks)
            + weights.cues * overlap;

        MarkschemeLink {
            question,
            part_code: part.code.clone(),
            confidence: confidence.clamp(0.0, 1.0),
            mark_points: entry.mark_points.clone(),
            snippet: snippet(&entry.text, self.config.snippet_chars),
            details: LinkDetails {
                key_match: key == KeyMatch::Exact,
                suffix_match: key == KeyMatch::Suffix,
                marks_match: part.marks.is_some() && part.marks == entry_marks,
                cue_overlap: overlap,
            },
            entry_index: Some(index),
        }
    }
}
