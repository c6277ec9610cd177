//! Topic tagging output types

use serde::{Deserialize, Serialize};

/// The signal that contributed most to a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    RulePhrase,
    RuleFormula,
    MsCue,
    Semantic,
    Structural,
}

impl SignalSource {
    pub fn is_rule(&self) -> bool {
        matches!(self, SignalSource::RulePhrase | SignalSource::RuleFormula)
    }
}

/// Every sub-score computed for one (question, topic) pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicSignal {
    pub lexical: f64,
    pub cue: f64,
    pub structural: f64,
    /// `None` when the semantic fallback was not run or failed
    pub semantic: Option<f64>,
    /// Raw summed weight of phrase rules on the context text
    pub phrase_weight: f64,
    /// Raw summed weight of formula rules on the context text
    pub formula_weight: f64,
    /// Raw summed rule weight on the linked markscheme text
    pub cue_weight: f64,
}

impl TopicSignal {
    /// Strongest rule-based evidence for the topic.
    pub fn rule_evidence(&self) -> f64 {
        self.lexical.max(self.cue)
    }
}

/// A kept topic for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicTag {
    pub topic_id: String,
    pub topic_name: String,
    /// Combined score in [0, 1]
    pub score: f64,
    pub source: SignalSource,
    pub signal: TopicSignal,
    /// `paperlink-<version>/<subject>@<pack version>`
    pub pipeline_version: String,
}

/// Tags of one question, best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionTags {
    pub question: u32,
    pub tags: Vec<TopicTag>,
    /// More topics passed the floor than the cap allowed
    pub capped: bool,
    /// The semantic fallback contributed to this question
    pub semantic_used: bool,
}

impl QuestionTags {
    pub fn is_tagged(&self) -> bool {
        !self.tags.is_empty()
    }

    pub fn tag(&self, topic_id: &str) -> Option<&TopicTag> {
        self.tags.iter().find(|t| t.topic_id == topic_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaggingMetadata {
    pub total_questions: usize,
    pub tagged: usize,
    pub untagged: usize,
    /// Mean number of tags over tagged questions
    pub average_topics: f64,
    pub capped: usize,
    pub rule_sourced: usize,
    pub cue_sourced: usize,
    pub semantic_sourced: usize,
    /// Questions whose scores include a successful semantic fallback
    pub semantic_fallbacks: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaggingResult {
    pub questions: Vec<QuestionTags>,
    pub metadata: TaggingMetadata,
}

impl TaggingResult {
    pub fn for_question(&self, number: u32) -> Option<&QuestionTags> {
        self.questions.iter().find(|q| q.question == number)
    }
}
