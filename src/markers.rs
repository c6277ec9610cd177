//! Part-marker lexing shared by the segmenter and the markscheme parsers
//!
//! Exam papers label parts `(a)`, `(b)`, … and subparts `(i)`, `(ii)`, ….
//! Subparts are qualified with the enclosing main part (`"(a)(ii)"`), which
//! requires remembering the currently open main part. That state lives in
//! [`MarkerContext`], a plain value owned by whichever parser is running.

use once_cell::sync::Lazy;
use regex::Regex;

static MARKER_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\(\s*([a-z]{1,4})\s*\)").expect("marker prefix regex"));

const ROMAN: [&str; 12] = [
    "i", "ii", "iii", "iv", "v", "vi", "vii", "viii", "ix", "x", "xi", "xii",
];

/// Whether `token` is a lowercase roman numeral between 1 and 12.
pub fn is_roman(token: &str) -> bool {
    ROMAN.contains(&token)
}

/// A classified marker token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// A lettered main part, e.g. `(b)`
    Main(char),
    /// A roman-numeral subpart, e.g. `(iii)`
    Sub(String),
}

/// Split the leading bracketed marker tokens off a fragment.
///
/// `"(a)(ii) Calculate"` yields `(["a", "ii"], "Calculate")`. Returns an
/// empty token list when the text does not start with a marker.
pub fn split_marker_prefix(text: &str) -> (Vec<&str>, &str) {
    let mut tokens = Vec::new();
    let mut rest = text;
    while let Some(caps) = MARKER_PREFIX.captures(rest) {
        let (Some(whole), Some(token)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let token = token.as_str();
        if token.len() > 1 && !is_roman(token) {
            break;
        }
        tokens.push(token);
        rest = &rest[whole.end()..];
    }
    (tokens, rest.trim_start())
}

/// Parser state for qualifying subpart markers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerContext {
    main: Option<char>,
    main_has_sub: bool,
}

impl MarkerContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the open main part (on a new question).
    pub fn reset(&mut self) {
        self.main = None;
        self.main_has_sub = false;
    }

    /// Classify a marker token against the current state without changing it.
    ///
    /// Single-letter roman numerals (`i`, `v`, `x`) are ambiguous. They are
    /// read as subparts, except directly after the preceding letter (`(h)`
    /// then `(i)`) when that part has no subparts yet.
    pub fn classify(&self, token: &str) -> Option<Marker> {
        let mut chars = token.chars();
        let first = chars.next()?;
        let single = chars.next().is_none();

        if single && !is_roman(token) {
            return first.is_ascii_lowercase().then_some(Marker::Main(first));
        }
        if !is_roman(token) {
            return None;
        }
        if !single {
            return Some(Marker::Sub(token.to_string()));
        }
        match self.main {
            None => Some(Marker::Sub(token.to_string())),
            Some(main) => {
                let follows_main = (main as u8).checked_add(1) == Some(first as u8);
                if follows_main && !self.main_has_sub {
                    Some(Marker::Main(first))
                } else {
                    Some(Marker::Sub(token.to_string()))
                }
            }
        }
    }

    /// Classify a token, update the state and return the qualified code.
    pub fn apply(&mut self, token: &str) -> Option<(Marker, String)> {
        let marker = self.classify(token)?;
        let code = match &marker {
            Marker::Main(letter) => {
                self.main = Some(*letter);
                self.main_has_sub = false;
                format!("({})", letter)
            }
            Marker::Sub(roman) => {
                self.main_has_sub = true;
                match self.main {
                    Some(letter) => format!("({})({})", letter, roman),
                    None => format!("({})", roman),
                }
            }
        };
        Some((marker, code))
    }
}

/// Normalize a part code for key comparison: lower-case, punctuation and
/// whitespace stripped, components joined with `.`.
///
/// `"(a)(ii)"`, `"a (ii)"` and `"A.ii"` all normalize to `"a.ii"`.
pub fn normalize_code(code: &str) -> String {
    code.split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect::<Vec<_>>()
        .join(".")
}
