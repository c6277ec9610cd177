//! Multi-signal topic scoring over whole questions

use super::rules::{RulePack, RuleWeights, TopicDef};
use super::semantic::SemanticScorer;
use super::types::{QuestionTags, SignalSource, TaggingMetadata, TaggingResult, TopicSignal, TopicTag};
use crate::config::{TagWeights, TaggerConfig};
use crate::cues::{extract_cues, Cue, CueSet};
use crate::markscheme::LinkingResult;
use crate::segment::{Question, SegmentationResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{info, warn};

static DIAGRAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:diagram|figure|fig)\b").expect("diagram regex"));

/// Stamp recorded on every tag.
pub fn pipeline_version(pack: &RulePack) -> String {
    format!("paperlink-{}/{}@{}", crate::VERSION, pack.subject(), pack.version())
}

/// Mark-point texts and snippets of every linked part of a question.
fn linked_markscheme_text(question: u32, linking: &LinkingResult) -> String {
    let mut pieces = Vec::new();
    for link in linking.linked_for(question) {
        pieces.extend(
            link.mark_points
                .iter()
                .map(|p| p.text.as_str())
                .filter(|t| !t.is_empty()),
        );
        if !link.snippet.is_empty() {
            pieces.push(link.snippet.as_str());
        }
    }
    pieces.join(" ")
}

/// The signal contributing most to the final score. Ties resolve in the
/// order formula, phrase, markscheme cue, semantic, structural.
fn dominant_source(signal: &TopicSignal, weights: &TagWeights) -> SignalSource {
    let lexical = weights.lexical * signal.lexical;
    let rule_total = signal.phrase_weight + signal.formula_weight;
    let share = |w: f64| if rule_total > 0.0 { lexical * w / rule_total } else { 0.0 };

    let contributions = [
        (SignalSource::RuleFormula, share(signal.formula_weight)),
        (SignalSource::RulePhrase, share(signal.phrase_weight)),
        (SignalSource::MsCue, weights.cue * signal.cue),
        (SignalSource::Semantic, weights.semantic * signal.semantic.unwrap_or(0.0)),
        (SignalSource::Structural, weights.structural * signal.structural),
    ];
    let mut best = contributions[0];
    for candidate in &contributions[1..] {
        if candidate.1 > best.1 {
            best = *candidate;
        }
    }
    best.0
}

/// Total weight of the signals computed for a question. Lexical, cue and
/// structural are always computed; semantic only when the fallback ran.
fn computed_weight(weights: &TagWeights, semantic: bool) -> f64 {
    let base = weights.lexical + weights.cue + weights.structural;
    if semantic {
        base + weights.semantic
    } else {
        base
    }
}

/// Assigns topics to whole questions from rule, markscheme-cue, structural
/// and (optionally) semantic evidence.
pub struct TopicTagger {
    config: TaggerConfig,
    semantic: Option<Arc<SemanticScorer>>,
}

impl Default for TopicTagger {
    fn default() -> Self {
        Self::new(TaggerConfig::default())
    }
}

impl TopicTagger {
    pub fn new(config: TaggerConfig) -> Self {
        Self {
            config,
            semantic: None,
        }
    }

    /// Enable the semantic fallback for questions without rule evidence.
    pub fn with_semantic(mut self, scorer: Arc<SemanticScorer>) -> Self {
        self.semantic = Some(scorer);
        self
    }

    fn saturate(&self, raw: f64) -> f64 {
        (raw / self.config.saturation).min(1.0)
    }

    fn structural(&self, topic: &TopicDef, cues: &CueSet, has_diagram: bool) -> f64 {
        let unit = cues.units().any(|u| {
            topic.units.iter().any(|t| t == u)
                || topic.key_terms.iter().any(|t| t.eq_ignore_ascii_case(u))
        });
        let key_term = topic.key_terms.iter().any(|t| {
            cues.contains(&Cue::KeyTerm {
                term: t.trim().to_lowercase(),
            })
        });

        let mut score = 0.0;
        if unit {
            score += self.config.unit_bonus;
        }
        if has_diagram && key_term {
            score += self.config.diagram_bonus;
        }
        score.min(1.0)
    }

    /// Rule, markscheme-cue and structural signals for every topic.
    fn rule_signals(
        &self,
        question: &Question,
        linking: &LinkingResult,
        pack: &RulePack,
    ) -> Vec<TopicSignal> {
        let context = &question.context_text;
        let lexical = pack.score(context);
        let ms_text = linked_markscheme_text(question.number, linking);
        let cue = if ms_text.is_empty() {
            vec![RuleWeights::default(); pack.topics().len()]
        } else {
            pack.score(&ms_text)
        };
        let cues = extract_cues(context, pack.vocabulary());
        let has_diagram = DIAGRAM.is_match(context);

        pack.topics()
            .iter()
            .zip(lexical.iter().zip(&cue))
            .map(|(topic, (lex, cue))| TopicSignal {
                lexical: self.saturate(lex.total()),
                cue: self.saturate(cue.total()),
                structural: self.structural(topic, &cues, has_diagram),
                semantic: None,
                phrase_weight: lex.phrase,
                formula_weight: lex.formula,
                cue_weight: cue.total(),
            })
            .collect()
    }

    /// Combine signals, apply floor and cap.
    fn select(
        &self,
        number: u32,
        signals: Vec<TopicSignal>,
        semantic_used: bool,
        pack: &RulePack,
        stamp: &str,
    ) -> QuestionTags {
        let weights = &self.config.weights;
        let denominator = computed_weight(weights, semantic_used);

        let mut kept: Vec<(usize, f64)> = signals
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let numerator = weights.lexical * s.lexical
                    + weights.cue * s.cue
                    + weights.structural * s.structural
                    + weights.semantic * s.semantic.unwrap_or(0.0);
                let score = if denominator > 0.0 {
                    (numerator / denominator).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                (i, score)
            })
            .filter(|(_, score)| *score > 0.0 && *score >= self.config.floor)
            .collect();

        kept.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        let capped = kept.len() > self.config.cap;
        kept.truncate(self.config.cap);

        let topics = pack.topics();
        let tags = kept
            .into_iter()
            .map(|(i, score)| TopicTag {
                topic_id: topics[i].id.clone(),
                topic_name: topics[i].name.clone(),
                score,
                source: dominant_source(&signals[i], weights),
                signal: signals[i].clone(),
                pipeline_version: stamp.to_string(),
            })
            .collect();

        QuestionTags {
            question: number,
            tags,
            capped,
            semantic_used,
        }
    }

    /// Tag every question of a segmented paper.
    ///
    /// The semantic fallback is requested once per paper for the questions
    /// whose rule evidence stays below `min_evidence`. If it fails, those
    /// questions are scored without it.
    pub async fn tag(
        &self,
        segmentation: &SegmentationResult,
        linking: &LinkingResult,
        pack: &RulePack,
    ) -> TaggingResult {
        let mut warnings = Vec::new();
        let mut signals: Vec<Vec<TopicSignal>> = segmentation
            .questions
            .iter()
            .map(|q| self.rule_signals(q, linking, pack))
            .collect();
        let mut semantic_used = vec![false; signals.len()];
        let mut semantic_fallbacks = 0;

        let weak: Vec<usize> = signals
            .iter()
            .enumerate()
            .filter(|(_, s)| s.iter().all(|t| t.rule_evidence() < self.config.min_evidence))
            .map(|(i, _)| i)
            .collect();

        if let Some(scorer) = self.semantic.as_ref().filter(|_| !weak.is_empty()) {
            let queries: Vec<String> = weak
                .iter()
                .map(|&i| segmentation.questions[i].context_text.clone())
                .collect();
            let candidates: Vec<String> = pack
                .topics()
                .iter()
                .map(|t| t.semantic_text().to_string())
                .collect();

            match scorer.score(&queries, &candidates).await {
                Ok(matrix) => {
                    for (&i, row) in weak.iter().zip(matrix) {
                        for (signal, score) in signals[i].iter_mut().zip(row) {
                            signal.semantic = Some(score);
                        }
                        semantic_used[i] = true;
                        semantic_fallbacks += 1;
                    }
                }
                Err(e) => {
                    warn!(error = %e, questions = weak.len(), "semantic fallback skipped");
                    warnings.push(format!(
                        "semantic fallback skipped for {} question(s): {}",
                        weak.len(),
                        e
                    ));
                }
            }
        }

        let stamp = pipeline_version(pack);
        let questions: Vec<QuestionTags> = segmentation
            .questions
            .iter()
            .zip(signals)
            .zip(semantic_used)
            .map(|((q, s), used)| self.select(q.number, s, used, pack, &stamp))
            .collect();

        for q in questions.iter().filter(|q| !q.is_tagged()) {
            warnings.push(format!(
                "question {}: no topic reached the confidence floor",
                q.question
            ));
        }

        let all_tags = || questions.iter().flat_map(|q| q.tags.iter());
        let sourced = |source| all_tags().filter(|t| t.source == source).count();
        let tagged = questions.iter().filter(|q| q.is_tagged()).count();
        let metadata = TaggingMetadata {
            total_questions: questions.len(),
            tagged,
            untagged: questions.len() - tagged,
            average_topics: if tagged == 0 {
                0.0
            } else {
                all_tags().count() as f64 / tagged as f64
            },
            capped: questions.iter().filter(|q| q.capped).count(),
            rule_sourced: all_tags().filter(|t| t.source.is_rule()).count(),
            cue_sourced: sourced(SignalSource::MsCue),
            semantic_sourced: sourced(SignalSource::Semantic),
            semantic_fallbacks,
            warnings,
        };

        info!(
            subject = pack.subject(),
            questions = metadata.total_questions,
            tagged = metadata.tagged,
            semantic_fallbacks = metadata.semantic_fallbacks,
            "tagged questions"
        );

        TaggingResult {
            questions,
            metadata,
        }
    }
}
