//! Cue extraction shared by the markscheme linker and the topic tagger
//!
//! A cue is a small, comparable piece of evidence pulled out of free text:
//! a `token = expression` formula, a number followed by a short unit token,
//! or a verbatim key term from the subject vocabulary. Both the linker (cue
//! overlap between a part and an entry) and the tagger (structural unit
//! bonus) go through [`extract_cues`] so the two agree on what a cue is.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

static FORMULA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?P<lhs>[A-Za-z][A-Za-z0-9_]*)\s*=\s*(?P<rhs>[A-Za-z0-9_.]+(?:\s*[+\-*/×÷^]\s*[A-Za-z0-9_.]+)*)",
    )
    .expect("formula regex")
});

static QUANTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?P<value>\d+(?:\.\d+)?)\s?(?P<unit>%|°C\b|[A-Za-zΩμ]{1,3}\b)")
        .expect("quantity regex")
});

/// Short lowercase words that follow numbers in prose and are not units.
const NOT_UNITS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "do", "for", "has", "had", "if", "in",
    "is", "it", "its", "no", "not", "of", "on", "or", "so", "the", "to", "up", "was", "we",
    "can", "but", "all", "any", "one", "two", "out", "use", "see",
];

/// One piece of comparable evidence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cue {
    /// Normalized `lhs=rhs`, lower-cased, whitespace removed
    Formula { text: String },
    /// A number immediately followed by a short unit token
    Quantity { value: String, unit: String },
    /// A vocabulary term found verbatim (lower-cased)
    KeyTerm { term: String },
}

/// A fixed vocabulary of subject key terms, matched case-insensitively on
/// word boundaries.
#[derive(Debug, Clone, Default)]
pub struct KeyTermVocabulary {
    terms: Vec<(String, Regex)>,
}

impl KeyTermVocabulary {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let unique: BTreeSet<String> = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        let terms = unique
            .into_iter()
            .filter_map(|term| {
                let re = Regex::new(&bounded_pattern(&term)).ok()?;
                Some((term, re))
            })
            .collect();
        Self { terms }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Terms of this vocabulary occurring in `text`, in sorted order.
    pub fn matches<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.terms
            .iter()
            .filter(move |(_, re)| re.is_match(text))
            .map(|(term, _)| term.as_str())
    }
}

/// Case-insensitive pattern for a literal term, word-bounded on the sides
/// where the term starts or ends with a word character.
pub(crate) fn bounded_pattern(literal: &str) -> String {
    let starts_word = literal.chars().next().is_some_and(|c| c.is_alphanumeric());
    let ends_word = literal.chars().last().is_some_and(|c| c.is_alphanumeric());
    format!(
        "(?i){}{}{}",
        if starts_word { r"\b" } else { "" },
        regex::escape(literal),
        if ends_word { r"\b" } else { "" }
    )
}

/// An ordered set of cues extracted from one text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CueSet {
    cues: BTreeSet<Cue>,
}

impl CueSet {
    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    pub fn contains(&self, cue: &Cue) -> bool {
        self.cues.contains(cue)
    }

    /// Units of every quantity cue.
    pub fn units(&self) -> impl Iterator<Item = &str> {
        self.cues.iter().filter_map(|c| match c {
            Cue::Quantity { unit, .. } => Some(unit.as_str()),
            _ => None,
        })
    }

    /// Jaccard similarity, or `None` when both sets are empty.
    pub fn jaccard(&self, other: &CueSet) -> Option<f64> {
        let union = self.cues.union(&other.cues).count();
        if union == 0 {
            return None;
        }
        let intersection = self.cues.intersection(&other.cues).count();
        Some(intersection as f64 / union as f64)
    }
}

/// Extract formula, quantity and key-term cues from `text`.
pub fn extract_cues(text: &str, vocabulary: &KeyTermVocabulary) -> CueSet {
    let mut cues = BTreeSet::new();

    for caps in FORMULA.captures_iter(text) {
        let (Some(lhs), Some(rhs)) = (caps.name("lhs"), caps.name("rhs")) else {
            continue;
        };
        let rhs = rhs.as_str().trim_end_matches('.');
        let normalized: String = format!("{}={}", lhs.as_str(), rhs)
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();
        cues.insert(Cue::Formula { text: normalized });
    }

    for caps in QUANTITY.captures_iter(text) {
        let (Some(value), Some(unit)) = (caps.name("value"), caps.name("unit")) else {
            continue;
        };
        let unit = unit.as_str();
        if NOT_UNITS.contains(&unit) {
            continue;
        }
        cues.insert(Cue::Quantity {
            value: value.as_str().to_string(),
            unit: unit.to_string(),
        });
    }

    for term in vocabulary.matches(text) {
        cues.insert(Cue::KeyTerm {
            term: term.to_string(),
        });
    }

    CueSet { cues }
}

#[cfg(test)]
mod tests;
