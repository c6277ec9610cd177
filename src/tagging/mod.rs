//! Topic tagger: rule packs, signal scoring and the semantic fallback

mod rules;
mod semantic;
mod tagger;
mod types;

#[cfg(test)]
mod tests;

pub use rules::{
    RuleDef, RuleKind, RulePack, RulePackError, RulePackRegistry, RulePackSpec, RuleWeights,
    TopicDef,
};
pub use semantic::{MockSimilarityClient, SemanticError, SemanticScorer, SimilarityClient};
pub use tagger::{pipeline_version, TopicTagger};
pub use types::{
    QuestionTags, SignalSource, TaggingMetadata, TaggingResult, TopicSignal, TopicTag,
};
