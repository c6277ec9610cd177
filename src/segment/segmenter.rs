//! Fence-driven segmentation state machine
//!
//! The stream is first cut into regions at every "Total for Question N = M
//! marks" fence. Each region is then scanned by a small state machine:
//!
//! ```text
//! SeekingFence ──header──▶ InHeader ──marker──▶ InPart ──marker──▶ InPart
//!      ▲                                                            │
//!      └────────────────────────── fence ───────────────────────────┘
//! ```
//!
//! All scanner state (including the open main part used to qualify bare
//! subpart markers) lives in a [`ScanContext`] value created per region.

use super::types::{Part, Question, SegmentError, SegmentationMetadata, SegmentationResult};
use crate::config::SegmenterConfig;
use crate::document::{BoundingBox, Page, PositionedFragment, SourceDocument};
use crate::markers::{normalize_code, split_marker_prefix, MarkerContext};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

static FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)total\s+for\s+question\s+(\d{1,3})\s*[=:]?\s*(\d{1,3})(?:\s*marks?)?")
        .expect("fence regex")
});

static TRAILING_MARKS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\(\[]\s*(\d{1,2})\s*(?:marks?)?\s*[\)\]]\s*$").expect("trailing marks regex")
});

static LEADING_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,3})\.?(?:\s+(.*))?$").expect("leading number regex"));

static BOILERPLATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:\d{1,3}|blank\s+page|turn\s+over|do\s+not\s+write\s+(?:in|on)\s+this\s+(?:area|page))$")
        .expect("boilerplate regex")
});

/// Parse a fence fragment into (question number, declared total).
pub fn parse_fence(text: &str) -> Option<(u32, u32)> {
    let caps = FENCE.captures(text)?;
    let number = caps.get(1)?.as_str().parse().ok()?;
    let total = caps.get(2)?.as_str().parse().ok()?;
    Some((number, total))
}

/// Marks declared at the end of a fragment: `(2)`, `[3]`, `(1 mark)`.
pub fn trailing_marks(text: &str) -> Option<u32> {
    TRAILING_MARKS
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn starts_capitalized(text: &str) -> bool {
    text.trim_start()
        .chars()
        .next()
        .is_some_and(|c| c.is_uppercase())
}

/// A page with nothing on it beyond page furniture such as "BLANK PAGE".
fn is_boilerplate_page(page: &Page) -> bool {
    page.fragments.iter().all(|f| {
        let text = f.text.trim();
        text.is_empty() || BOILERPLATE.is_match(text)
    })
}

fn is_standalone_number(text: &str) -> bool {
    let t = text.trim();
    !t.is_empty() && t.chars().all(|c| c.is_ascii_digit())
}

#[derive(Debug, Clone, Copy)]
struct Fence {
    index: usize,
    number: u32,
    total: u32,
    page: usize,
}

#[derive(Debug, Clone)]
struct HeaderMatch {
    index: usize,
    number: u32,
    remainder: String,
}

/// Where the scanner is within the current region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum ScanState {
    /// Before the question header; fragments here are preamble
    #[default]
    SeekingFence,
    /// Collecting stem text
    InHeader,
    /// Collecting text for the open part
    InPart,
}

/// Bounding boxes merged to one per page, in first-touch order.
#[derive(Debug, Default)]
struct BoxSet {
    boxes: Vec<BoundingBox>,
}

impl BoxSet {
    fn add(&mut self, bbox: BoundingBox) {
        match self.boxes.iter_mut().find(|b| b.page == bbox.page) {
            Some(existing) => {
                if let Some(merged) = existing.union(&bbox) {
                    *existing = merged;
                }
            }
            None => self.boxes.push(bbox),
        }
    }
}

#[derive(Debug)]
struct PartBuilder {
    code: String,
    marks: Option<u32>,
    boxes: BoxSet,
    text: Vec<String>,
    explicit: bool,
}

impl PartBuilder {
    fn build(self) -> Part {
        let page_from = self.boxes.boxes.iter().map(|b| b.page).min().unwrap_or(0);
        let page_to = self.boxes.boxes.iter().map(|b| b.page).max().unwrap_or(page_from);
        Part {
            code: self.code,
            marks: self.marks,
            boxes: self.boxes.boxes,
            text: self.text.join(" "),
            page_from,
            page_to,
            explicit_marker: self.explicit,
        }
    }
}

fn add_marks(slot: &mut Option<u32>, marks: u32) {
    *slot = Some(slot.unwrap_or(0) + marks);
}

/// Parser context for one fenced region.
#[derive(Debug, Default)]
struct ScanContext {
    number: u32,
    state: ScanState,
    markers: MarkerContext,
    current: Option<usize>,
    parts: Vec<PartBuilder>,
    header_text: Vec<String>,
    header_boxes: BoxSet,
    header_marks: Option<u32>,
    context: Vec<String>,
    first_page: Option<usize>,
    last_page: Option<usize>,
    warnings: Vec<String>,
}

impl ScanContext {
    fn new(number: u32) -> Self {
        Self {
            number,
            ..Self::default()
        }
    }

    fn touch(&mut self, page: usize) {
        self.first_page.get_or_insert(page);
        self.last_page = Some(page);
    }

    /// The header fragment: only its text after the question number counts.
    fn begin_header(&mut self, remainder: &str, bbox: BoundingBox) {
        self.state = ScanState::InHeader;
        self.touch(bbox.page);
        if remainder.trim().is_empty() {
            self.header_boxes.add(bbox);
        } else {
            self.absorb(remainder, bbox);
        }
    }

    fn open_part(&mut self, code: String, bbox: BoundingBox) {
        let normalized = normalize_code(&code);
        let existing = self
            .parts
            .iter()
            .position(|p| normalize_code(&p.code) == normalized);

        let index = match existing {
            Some(index) => {
                self.warnings.push(format!(
                    "question {}: duplicate part marker {}; merged into the earlier part",
                    self.number, code
                ));
                index
            }
            None => {
                self.parts.push(PartBuilder {
                    code,
                    marks: None,
                    boxes: BoxSet::default(),
                    text: Vec::new(),
                    explicit: true,
                });
                self.parts.len() - 1
            }
        };
        self.parts[index].boxes.add(bbox);
        self.current = Some(index);
        self.state = ScanState::InPart;
    }

    fn absorb(&mut self, text: &str, bbox: BoundingBox) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        self.touch(bbox.page);
        self.context.push(trimmed.to_string());

        let (tokens, rest) = split_marker_prefix(trimmed);
        let codes: Vec<String> = tokens
            .iter()
            .filter_map(|t| self.markers.apply(t).map(|(_, code)| code))
            .collect();
        let opened = !codes.is_empty();
        for code in codes {
            self.open_part(code, bbox);
        }
        let body = if opened { rest } else { trimmed };

        match (self.state, self.current) {
            (ScanState::InPart, Some(index)) => {
                let part = &mut self.parts[index];
                if !opened {
                    part.boxes.add(bbox);
                }
                if !body.is_empty() {
                    part.text.push(body.to_string());
                }
            }
            _ => {
                self.state = ScanState::InHeader;
                self.header_boxes.add(bbox);
                if !body.is_empty() {
                    self.header_text.push(body.to_string());
                }
            }
        }

        if let Some(marks) = trailing_marks(trimmed) {
            match (self.state, self.current) {
                (ScanState::InPart, Some(index)) => add_marks(&mut self.parts[index].marks, marks),
                _ => add_marks(&mut self.header_marks, marks),
            }
        }
    }

    fn finish(mut self, fence: Option<Fence>, warnings: &mut Vec<String>) -> Question {
        let header_text = self.header_text.join(" ");

        if self.parts.is_empty() {
            self.warnings.push(format!(
                "question {}: no part markers found; treated as one implicit part",
                self.number
            ));
            self.parts.push(PartBuilder {
                code: String::new(),
                marks: self.header_marks,
                boxes: BoxSet {
                    boxes: self.header_boxes.boxes.clone(),
                },
                text: vec![header_text.clone()],
                explicit: false,
            });
        }

        let parts: Vec<Part> = self.parts.into_iter().map(PartBuilder::build).collect();
        let header_box = self.header_boxes.boxes.first().copied();
        let start_page = self
            .first_page
            .or(fence.map(|f| f.page))
            .unwrap_or(0);
        let end_page = fence
            .map(|f| f.page)
            .or(self.last_page)
            .unwrap_or(start_page);

        let question = Question {
            number: self.number,
            total_marks: fence.map(|f| f.total),
            fenced: fence.is_some(),
            context_text: self.context.join(" "),
            header_text,
            header_box,
            parts,
            start_page,
            end_page,
        };

        if let Some(total) = question.total_marks {
            let sum = question.part_marks_sum();
            if sum != total {
                self.warnings.push(format!(
                    "question {}: part marks sum to {} but the fence declares {}",
                    question.number, sum, total
                ));
            }
        }

        warnings.append(&mut self.warnings);
        question
    }
}

/// Turns a question-paper fragment stream into fenced questions and parts.
pub struct FenceSegmenter {
    config: SegmenterConfig,
}

impl Default for FenceSegmenter {
    fn default() -> Self {
        Self::new(SegmenterConfig::default())
    }
}

impl FenceSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self { config }
    }

    /// Segment a whole question paper.
    ///
    /// Only an empty stream is fatal. Everything else degrades to
    /// best-effort boundaries recorded in `metadata.warnings`.
    pub fn segment(&self, doc: &SourceDocument) -> Result<SegmentationResult, SegmentError> {
        if doc.is_blank() {
            return Err(SegmentError::EmptyInput);
        }

        let frags = doc.fragments();
        let fences: Vec<Fence> = frags
            .iter()
            .enumerate()
            .filter_map(|(index, f)| {
                parse_fence(f.text).map(|(number, total)| Fence {
                    index,
                    number,
                    total,
                    page: f.page,
                })
            })
            .collect();

        let mut warnings = Vec::new();
        let mut questions: Vec<Question> = Vec::new();
        let mut start = 0;
        let mut previous: Option<u32> = None;

        for fence in &fences {
            if let Some(prev) = previous {
                if fence.number != prev + 1 {
                    warnings.push(format!(
                        "fence for question {} follows question {}; a fence may be missing",
                        fence.number, prev
                    ));
                }
            }
            let region = &frags[start..fence.index];
            let header = self.find_header(doc, region, Some(fence.number), &mut warnings);
            match &header {
                Some(h) => {
                    let prefix = &region[..h.index];
                    if let Some(question) =
                        self.recover_prefix(doc, prefix, fence.number, previous, &mut warnings)
                    {
                        questions.push(question);
                    }
                }
                None => warnings.push(format!(
                    "question {}: header not found; region start used as stem",
                    fence.number
                )),
            }
            questions.push(self.scan_region(
                doc,
                region,
                fence.number,
                header,
                Some(*fence),
                &mut warnings,
            ));
            previous = Some(fence.number);
            start = fence.index + 1;
        }

        let trailing = &frags[start..];
        let trailing_len = trailing.iter().filter(|f| !f.text.trim().is_empty()).count();
        if trailing_len > 0 {
            let expected = previous.map(|p| p + 1);
            let header = self.find_header(doc, trailing, expected, &mut warnings);
            match (header, previous) {
                (Some(header), _) => {
                    let number = header.number;
                    warnings.push(format!(
                        "question {}: no closing fence; closed at end of document",
                        number
                    ));
                    let question =
                        self.scan_region(doc, trailing, number, Some(header), None, &mut warnings);
                    questions.push(question);
                }
                (None, None) => {
                    warnings.push(
                        "no fences or question header found; document treated as question 1"
                            .to_string(),
                    );
                    questions.push(self.scan_region(doc, trailing, 1, None, None, &mut warnings));
                }
                (None, Some(_)) => {
                    debug!(fragments = trailing_len, "trailing text after last fence ignored");
                    warnings.push(format!(
                        "{} fragments after the last fence belong to no question",
                        trailing_len
                    ));
                }
            }
        }

        let ocr_used = doc.pages.iter().any(|p| {
            p.low_text_density
                || (!is_boilerplate_page(p) && p.char_count() < self.config.min_chars_per_page)
        });

        let part_count = questions.iter().map(|q| q.parts.len()).sum();
        let metadata = SegmentationMetadata {
            fences_found: fences.len(),
            fences_implied: questions.len(),
            question_count: questions.len(),
            part_count,
            ocr_used,
            warnings,
        };

        info!(
            questions = metadata.question_count,
            parts = metadata.part_count,
            fences = metadata.fences_found,
            warnings = metadata.warnings.len(),
            "segmented question paper"
        );

        Ok(SegmentationResult {
            questions,
            metadata,
        })
    }

    fn scan_region(
        &self,
        doc: &SourceDocument,
        region: &[PositionedFragment<'_>],
        number: u32,
        header: Option<HeaderMatch>,
        fence: Option<Fence>,
        warnings: &mut Vec<String>,
    ) -> Question {
        let mut ctx = ScanContext::new(number);
        let header_index = header.as_ref().map(|h| h.index);

        for (i, frag) in region.iter().enumerate() {
            if ctx.state == ScanState::SeekingFence {
                match header_index {
                    Some(h) if i < h => continue,
                    Some(h) if i == h => {
                        let remainder = header.as_ref().map(|h| h.remainder.as_str()).unwrap_or("");
                        ctx.begin_header(remainder, frag.bbox);
                        continue;
                    }
                    _ => {}
                }
            }
            if is_standalone_number(frag.text) && self.in_page_number_band(doc, frag) {
                continue;
            }
            ctx.absorb(frag.text, frag.bbox);
        }

        ctx.finish(fence, warnings)
    }

    /// Text ahead of a fenced question's header.
    ///
    /// A header for an earlier question found there means that question's
    /// fence is missing; it is closed at the next header. Any other text is
    /// reported as belonging to no question.
    fn recover_prefix(
        &self,
        doc: &SourceDocument,
        prefix: &[PositionedFragment<'_>],
        number: u32,
        previous: Option<u32>,
        warnings: &mut Vec<String>,
    ) -> Option<Question> {
        let content = prefix
            .iter()
            .filter(|f| !f.text.trim().is_empty())
            .filter(|f| !(is_standalone_number(f.text) && self.in_page_number_band(doc, f)))
            .count();
        if content == 0 {
            return None;
        }

        let earlier = self
            .find_header(doc, prefix, None, warnings)
            .filter(|h| h.number < number && previous.map_or(true, |p| h.number > p));
        match earlier {
            Some(header) => {
                warnings.push(format!(
                    "question {}: no closing fence; closed at the header of question {}",
                    header.number, number
                ));
                Some(self.scan_region(doc, prefix, header.number, Some(header), None, warnings))
            }
            None => {
                debug!(question = number, fragments = content, "text before header ignored");
                warnings.push(format!(
                    "question {}: {} fragments before the header belong to no question",
                    number, content
                ));
                None
            }
        }
    }

    /// Find the question header inside a region.
    ///
    /// With a known number, the standalone number is accepted outright.
    /// A number with trailing text, or a standalone number when the
    /// question number is unknown, needs a capitalized word within the
    /// look-ahead window.
    fn find_header(
        &self,
        doc: &SourceDocument,
        region: &[PositionedFragment<'_>],
        expected: Option<u32>,
        warnings: &mut Vec<String>,
    ) -> Option<HeaderMatch> {
        for (i, frag) in region.iter().enumerate() {
            let text = frag.text.trim();
            let Some(caps) = LEADING_NUMBER.captures(text) else {
                continue;
            };
            let Some(number) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) else {
                continue;
            };
            if expected.is_some_and(|e| e != number) {
                continue;
            }
            let rest = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");

            if rest.is_empty() {
                if self.in_page_number_band(doc, frag) {
                    warnings.push(format!(
                        "ignored header candidate '{}' on page {}: inside page-number margin",
                        text,
                        frag.page + 1
                    ));
                    continue;
                }
                if expected.is_some() || self.capitalized_within(region, i + 1) {
                    return Some(HeaderMatch {
                        index: i,
                        number,
                        remainder: String::new(),
                    });
                }
            } else if starts_capitalized(rest) || self.capitalized_within(region, i + 1) {
                return Some(HeaderMatch {
                    index: i,
                    number,
                    remainder: rest.to_string(),
                });
            }
        }
        None
    }

    fn capitalized_within(&self, region: &[PositionedFragment<'_>], from: usize) -> bool {
        let end = (from + self.config.header_lookahead).min(region.len());
        from < end && region[from..end].iter().any(|f| starts_capitalized(f.text))
    }

    fn in_page_number_band(&self, doc: &SourceDocument, frag: &PositionedFragment<'_>) -> bool {
        let Some(height) = doc.page_height(frag.page) else {
            return false;
        };
        let band = height * self.config.page_number_margin;
        frag.bbox.y < band || frag.bbox.bottom() > height - band
    }
}
