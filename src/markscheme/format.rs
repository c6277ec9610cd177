//! Markscheme format detection and the per-format entry parsers
//!
//! Detection is a pure scoring pass over a prefix window of the fragment
//! stream. Each format then has its own pure parse function; all three
//! produce the same [`MarkschemeEntry`] values so the linker never needs to
//! know which layout it came from.

use super::types::{MarkPoint, MarkschemeEntry, MarkschemeFormat};
use crate::config::LinkerConfig;
use crate::document::PositionedFragment;
use crate::markers::{is_roman, split_marker_prefix, MarkerContext};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static MARK_POINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[MABC]\d{1,2}\b|[✓✔√]").expect("mark point regex"));

static BRACKETED_TOTAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\(\[]\s*(\d{1,2})\s*(?:marks?)?\s*[\)\]]").expect("bracketed total regex")
});

static BARE_INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}$").expect("integer regex"));

static QUESTION_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<num>\d{1,3})\.?(?P<sep>\s*)(?P<rest>.*)$").expect("question ref regex")
});

/// An award in square brackets: `[M1]`, `[2]`.
static AWARD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[\s*(?:[MABC]\d{1,2}|\d{1,2})\s*\]").expect("award regex")
});

static LETTER_ROMAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<letter>[a-z])(?:[\s.]*(?P<roman>[ivx]{1,4}))?$").expect("letter regex")
});

/// A leading question number and the text after it.
struct QuestionRef<'a> {
    number: u32,
    /// Whitespace separates the number from the rest
    separated: bool,
    rest: &'a str,
}

fn question_ref(text: &str) -> Option<QuestionRef<'_>> {
    let caps = QUESTION_REF.captures(text)?;
    Some(QuestionRef {
        number: caps.name("num")?.as_str().parse().ok()?,
        separated: caps.name("sep").is_some_and(|m| !m.as_str().is_empty()),
        rest: caps.name("rest").map_or("", |m| m.as_str()),
    })
}

/// A line opening a compact entry: `(number, code, body, has award)`.
/// Without a part code the number must be followed by whitespace and the
/// body must carry an award.
fn compact_head(text: &str) -> Option<(u32, &str, &str, bool)> {
    let reference = question_ref(text)?;
    let rest = reference.rest;
    let (tokens, body) = split_marker_prefix(rest);
    let awarded = AWARD.is_match(body);
    if tokens.is_empty() && !(reference.separated && awarded) {
        return None;
    }
    Some((reference.number, &rest[..rest.len() - body.len()], body, awarded))
}

/// Classify the layout of a markscheme from the start of its stream.
///
/// A format must score at least two hits and strictly lead the others;
/// anything else falls back to [`MarkschemeFormat::Listed`].
pub fn detect_format(frags: &[PositionedFragment<'_>], config: &LinkerConfig) -> MarkschemeFormat {
    let window = &frags[..frags.len().min(config.detection_window)];

    let tabular = group_rows(window, config.row_tolerance)
        .iter()
        .filter(|row| is_table_row(row))
        .count();
    let listed = listed_hits(window, config.margin_tolerance);
    let compact = window
        .iter()
        .filter(|f| compact_head(f.text.trim()).is_some_and(|(.., awarded)| awarded))
        .count();
    debug!(tabular, listed, compact, "markscheme format scores");

    let scores = [
        (MarkschemeFormat::Tabular, tabular),
        (MarkschemeFormat::Listed, listed),
        (MarkschemeFormat::Compact, compact),
    ];
    let best = scores.iter().map(|(_, s)| *s).max().unwrap_or(0);
    let leaders: Vec<_> = scores.iter().filter(|(_, s)| *s == best).collect();
    match leaders.as_slice() {
        [(format, score)] if *score >= 2 => *format,
        _ => MarkschemeFormat::Listed,
    }
}

/// Parse the whole stream with the parser for `format`.
pub fn parse_entries(
    format: MarkschemeFormat,
    frags: &[PositionedFragment<'_>],
    config: &LinkerConfig,
) -> Vec<MarkschemeEntry> {
    match format {
        MarkschemeFormat::Tabular => parse_tabular(frags, config),
        MarkschemeFormat::Listed => parse_listed(frags, config),
        MarkschemeFormat::Compact => parse_compact(frags),
    }
}

/// Mark points in `text`, each paired with the answer text preceding it.
pub fn mark_points(text: &str) -> Vec<MarkPoint> {
    let mut points = Vec::new();
    let mut last_end = 0;
    for m in MARK_POINT.find_iter(text) {
        points.push(MarkPoint {
            code: m.as_str().to_string(),
            text: clean_segment(&text[last_end..m.start()]),
        });
        last_end = m.end();
    }
    points
}

fn clean_segment(segment: &str) -> String {
    segment
        .trim_matches(|c: char| c.is_whitespace() || "[](),;:".contains(c))
        .to_string()
}

fn last_bracketed_total(text: &str) -> Option<u32> {
    BRACKETED_TOTAL
        .captures_iter(text)
        .last()
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn standalone_number(text: &str) -> Option<u32> {
    question_ref(text)
        .filter(|r| r.rest.is_empty())
        .map(|r| r.number)
}

/// Parse a table question cell such as `1`, `1(a)(ii)`, `1a` or `1 a.ii`.
fn parse_question_ref(text: &str) -> Option<(u32, Vec<String>)> {
    let reference = question_ref(text.trim())?;
    let number = reference.number;
    let rest = reference.rest.trim();

    if rest.is_empty() {
        return Some((number, Vec::new()));
    }
    if rest.starts_with('(') {
        let (tokens, leftover) = split_marker_prefix(rest);
        if tokens.is_empty() || !leftover.is_empty() {
            return None;
        }
        return Some((number, tokens.into_iter().map(String::from).collect()));
    }

    let caps = LETTER_ROMAN.captures(rest)?;
    let mut tokens = vec![caps.name("letter")?.as_str().to_string()];
    if let Some(roman) = caps.name("roman") {
        if !is_roman(roman.as_str()) {
            return None;
        }
        tokens.push(roman.as_str().to_string());
    }
    Some((number, tokens))
}

/// Qualify marker tokens against the question's open main part and return
/// the innermost code.
fn qualify<S: AsRef<str>>(markers: &mut MarkerContext, tokens: &[S]) -> Option<String> {
    tokens
        .iter()
        .filter_map(|t| markers.apply(t.as_ref()).map(|(_, code)| code))
        .last()
}

fn left_margin(frags: &[PositionedFragment<'_>]) -> f64 {
    frags
        .iter()
        .filter(|f| !f.text.trim().is_empty())
        .map(|f| f.bbox.x)
        .fold(f64::INFINITY, f64::min)
}

/// Group fragments into rows by page and baseline, cells ordered by x.
fn group_rows<'a>(
    frags: &[PositionedFragment<'a>],
    tolerance: f64,
) -> Vec<Vec<PositionedFragment<'a>>> {
    let mut rows: Vec<Vec<PositionedFragment<'a>>> = Vec::new();
    for frag in frags.iter().filter(|f| !f.text.trim().is_empty()) {
        let same_row = rows.last().and_then(|row| row.first()).is_some_and(|first| {
            first.page == frag.page && (first.bbox.y - frag.bbox.y).abs() <= tolerance
        });
        match rows.last_mut() {
            Some(row) if same_row => row.push(*frag),
            _ => rows.push(vec![*frag]),
        }
    }
    for row in &mut rows {
        row.sort_by(|a, b| a.bbox.x.total_cmp(&b.bbox.x));
    }
    rows
}

fn is_table_row(row: &[PositionedFragment<'_>]) -> bool {
    match (row.first(), row.last()) {
        (Some(first), Some(last)) if row.len() >= 2 => {
            parse_question_ref(first.text).is_some() && BARE_INTEGER.is_match(last.text.trim())
        }
        _ => false,
    }
}

fn starts_with_marker(text: &str) -> bool {
    !split_marker_prefix(text).0.is_empty()
}

fn listed_hits(window: &[PositionedFragment<'_>], margin_tolerance: f64) -> usize {
    let margin = left_margin(window) + margin_tolerance;
    window
        .iter()
        .enumerate()
        .filter(|(i, f)| {
            f.bbox.x <= margin
                && standalone_number(f.text.trim()).is_some()
                && window[i + 1..]
                    .iter()
                    .take(3)
                    .any(|next| starts_with_marker(next.text))
        })
        .count()
}

/// An entry under construction.
#[derive(Debug)]
struct EntryBuilder {
    question: u32,
    code: String,
    text: Vec<String>,
    declared_total: Option<u32>,
}

impl EntryBuilder {
    fn new(question: u32, code: String) -> Self {
        Self {
            question,
            code,
            text: Vec::new(),
            declared_total: None,
        }
    }

    fn push(&mut self, text: &str) {
        let text = text.trim();
        if !text.is_empty() {
            self.text.push(text.to_string());
        }
    }

    fn has_mark_points(&self) -> bool {
        self.text.iter().any(|t| MARK_POINT.is_match(t))
    }

    fn build(self) -> MarkschemeEntry {
        let text = self.text.join(" ");
        let mark_points = mark_points(&text);
        let (total_marks, total_inferred) = match self.declared_total.or_else(|| last_bracketed_total(&text)) {
            Some(total) => (total, false),
            None => (mark_points.len() as u32, true),
        };
        MarkschemeEntry {
            question: self.question,
            part_code: self.code,
            text,
            mark_points,
            total_marks,
            total_inferred,
        }
    }
}

/// Entries collected in stream order, with the question and marker state
/// used to qualify part codes.
#[derive(Debug, Default)]
struct EntryStream {
    question: Option<u32>,
    markers: MarkerContext,
    current: Option<EntryBuilder>,
    entries: Vec<MarkschemeEntry>,
}

impl EntryStream {
    /// Question numbers only move forward.
    fn accepts(&self, number: u32) -> bool {
        self.question.map_or(true, |q| number > q)
    }

    fn flush(&mut self) {
        if let Some(builder) = self.current.take() {
            if !builder.text.is_empty() || builder.declared_total.is_some() {
                self.entries.push(builder.build());
            }
        }
    }

    /// Close the open entry and start one for `number`.
    fn open<S: AsRef<str>>(&mut self, number: u32, tokens: &[S]) -> &mut EntryBuilder {
        self.flush();
        if self.question != Some(number) {
            self.markers.reset();
            self.question = Some(number);
        }
        let code = qualify(&mut self.markers, tokens).unwrap_or_default();
        self.current.insert(EntryBuilder::new(number, code))
    }

    /// Start a part entry of the current question. Returns false when no
    /// token could be classified.
    fn start_part(&mut self, tokens: &[&str], body: &str) -> bool {
        let Some(number) = self.question else {
            return false;
        };
        let Some(code) = qualify(&mut self.markers, tokens) else {
            return false;
        };
        // Text between the question number and its first part is heading
        // text unless it carries mark points of its own.
        if self
            .current
            .as_ref()
            .is_some_and(|b| b.code.is_empty() && !b.has_mark_points())
        {
            self.current = None;
        }
        self.flush();
        self.current.insert(EntryBuilder::new(number, code)).push(body);
        true
    }

    fn push_text(&mut self, text: &str) {
        if let Some(builder) = self.current.as_mut() {
            builder.push(text);
        }
    }

    fn finish(mut self) -> Vec<MarkschemeEntry> {
        self.flush();
        self.entries
    }
}

/// Rows of `question | answer … | marks`.
pub fn parse_tabular(frags: &[PositionedFragment<'_>], config: &LinkerConfig) -> Vec<MarkschemeEntry> {
    let mut stream = EntryStream::default();
    for row in group_rows(frags, config.row_tolerance) {
        match row.first().and_then(|first| parse_question_ref(first.text)) {
            Some((number, tokens)) if row.len() >= 2 => {
                let cells = &row[1..];
                let (body, marks) = match cells.split_last() {
                    Some((last, body)) if BARE_INTEGER.is_match(last.text.trim()) => {
                        (body, last.text.trim().parse().ok())
                    }
                    _ => (cells, None),
                };
                let builder = stream.open(number, &tokens);
                builder.declared_total = marks;
                for cell in body {
                    builder.push(cell.text);
                }
            }
            _ => row.iter().for_each(|cell| stream.push_text(cell.text)),
        }
    }
    stream.finish()
}

/// Standalone left-margin question numbers with bracketed part markers
/// beneath them. A bare subpart is qualified with the question's current
/// main letter when one has been seen.
pub fn parse_listed(frags: &[PositionedFragment<'_>], config: &LinkerConfig) -> Vec<MarkschemeEntry> {
    let margin = left_margin(frags) + config.margin_tolerance;
    let mut stream = EntryStream::default();

    for frag in frags {
        let text = frag.text.trim();
        if text.is_empty() {
            continue;
        }

        if frag.bbox.x <= margin {
            if let Some(reference) = question_ref(text).filter(|r| stream.accepts(r.number)) {
                let (tokens, body) = split_marker_prefix(reference.rest);
                if reference.rest.is_empty() {
                    stream.open::<&str>(reference.number, &[]);
                    continue;
                }
                if !tokens.is_empty() {
                    stream.open::<&str>(reference.number, &[]);
                    if stream.start_part(&tokens, body) {
                        continue;
                    }
                }
            }
        }

        let (tokens, body) = split_marker_prefix(text);
        if !tokens.is_empty() && stream.start_part(&tokens, body) {
            continue;
        }
        stream.push_text(text);
    }
    stream.finish()
}

/// One line per entry: `1(a) v = d/t [M1] 2.5 m/s [A1] [2]`. Lines that do
/// not start a new entry continue the previous one.
pub fn parse_compact(frags: &[PositionedFragment<'_>]) -> Vec<MarkschemeEntry> {
    let mut stream = EntryStream::default();
    for frag in frags {
        let text = frag.text.trim();
        if text.is_empty() {
            continue;
        }
        match compact_head(text) {
            Some((number, code, body, _)) => {
                let (tokens, _) = split_marker_prefix(code);
                stream.open(number, &tokens).push(body);
            }
            None => stream.push_text(text),
        }
    }
    stream.finish()
}
