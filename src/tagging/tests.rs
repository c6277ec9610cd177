use super::*;
use crate::config::{SemanticConfig, TaggerConfig};
use crate::document::{DocumentBuilder, SourceDocument};
use crate::markscheme::{LinkingResult, MarkschemeLinker};
use crate::segment::{FenceSegmenter, SegmentationResult};
use std::sync::Arc;
use std::time::Duration;

const PHYSICS: &str = r#"
subject: physics
version: "2024.1"
topics:
  - id: electricity
    name: Electricity
    description: Current, potential difference and resistance in electric circuits
    key_terms: [current, resistance, circuit]
    units: [A, V, Ω]
  - id: energy
    name: Energy
    description: Energy stores and transfers, including falling objects
    key_terms: [kinetic energy]
    units: [J, kJ]
phrase_rules:
  - { pattern: "series circuit", topic: electricity, weight: 2.0 }
  - { pattern: "kinetic energy", topic: energy, weight: 3.0 }
formula_rules:
  - { pattern: 'resistance\s*=\s*voltage\s*/\s*current', topic: electricity, weight: 5.0 }
"#;

fn physics() -> RulePack {
    RulePack::from_yaml_str(PHYSICS).unwrap()
}

fn segment(doc: &SourceDocument) -> SegmentationResult {
    FenceSegmenter::default().segment(doc).unwrap()
}

fn unlinked(paper: &SegmentationResult, pack: &RulePack) -> LinkingResult {
    MarkschemeLinker::default().link(paper, &SourceDocument::default(), pack.vocabulary())
}

fn ohms_law_paper() -> SourceDocument {
    DocumentBuilder::new()
        .line("1")
        .line("A student sets up a circuit.")
        .line("(a) Show that resistance = voltage / current. (2)")
        .line("(Total for Question 1 = 2 marks)")
        .build()
}

fn two_question_paper() -> SourceDocument {
    DocumentBuilder::new()
        .line("1")
        .line("A student sets up a circuit.")
        .line("(a) Show that resistance = voltage / current. (2)")
        .line("(Total for Question 1 = 2 marks)")
        .line("2")
        .line("A ball is dropped from a height.")
        .line("(a) Describe what happens as it falls. (2)")
        .line("(Total for Question 2 = 2 marks)")
        .build()
}

fn semantic_config(timeout_ms: u64) -> SemanticConfig {
    SemanticConfig {
        timeout_ms,
        min_interval_ms: 0,
        max_in_flight: 1,
    }
}

// === Scenario: formula rule decides the topic ===
#[tokio::test]
async fn formula_rule_tags_electricity() {
    let pack = physics();
    let paper = segment(&ohms_law_paper());
    let linking = unlinked(&paper, &pack);

    let result = TopicTagger::default().tag(&paper, &linking, &pack).await;

    let tags = result.for_question(1).unwrap();
    assert_eq!(tags.tags.len(), 1);
    let tag = &tags.tags[0];
    assert_eq!(tag.topic_name, "Electricity");
    assert_eq!(tag.source, SignalSource::RuleFormula);
    assert_eq!(tag.signal.formula_weight, 5.0);
    assert_eq!(tag.signal.lexical, 1.0);
    assert_eq!(
        tag.pipeline_version,
        format!("paperlink-{}/physics@2024.1", crate::VERSION)
    );
    assert_eq!(result.metadata.rule_sourced, 1);
    assert_eq!(result.metadata.semantic_fallbacks, 0);
}

// === Scenario: semantic service times out ===
#[tokio::test]
async fn semantic_timeout_still_tags_from_rules() {
    let pack = physics();
    let paper = segment(&two_question_paper());
    let linking = unlinked(&paper, &pack);
    let client = Arc::new(MockSimilarityClient::new().with_delay(Duration::from_millis(500)));
    let scorer = Arc::new(SemanticScorer::new(client.clone(), semantic_config(20)));

    let result = TopicTagger::default()
        .with_semantic(scorer)
        .tag(&paper, &linking, &pack)
        .await;

    assert_eq!(client.calls(), 1);
    assert_eq!(result.metadata.semantic_fallbacks, 0);
    assert_eq!(
        result.for_question(1).unwrap().tags[0].topic_id,
        "electricity"
    );
    let second = result.for_question(2).unwrap();
    assert!(!second.is_tagged());
    assert!(!second.semantic_used);
    assert!(result
        .metadata
        .warnings
        .iter()
        .any(|w| w.contains("semantic fallback skipped")));
}

#[tokio::test]
async fn semantic_fallback_tags_question_without_rule_evidence() {
    let pack = physics();
    let paper = segment(&two_question_paper());
    let linking = unlinked(&paper, &pack);
    let client = Arc::new(MockSimilarityClient::new().with_score("ball", "falling objects", 0.9));
    let scorer = Arc::new(SemanticScorer::new(client.clone(), semantic_config(1_000)));
    let config = TaggerConfig {
        floor: 0.15,
        ..TaggerConfig::default()
    };

    let result = TopicTagger::new(config)
        .with_semantic(scorer)
        .tag(&paper, &linking, &pack)
        .await;

    assert_eq!(client.calls(), 1);
    assert_eq!(result.metadata.semantic_fallbacks, 1);
    assert_eq!(result.metadata.semantic_sourced, 1);

    let first = result.for_question(1).unwrap();
    assert!(!first.semantic_used);
    assert!(first.tags[0].signal.semantic.is_none());

    let second = result.for_question(2).unwrap();
    assert!(second.semantic_used);
    assert_eq!(second.tags.len(), 1);
    assert_eq!(second.tags[0].topic_id, "energy");
    assert_eq!(second.tags[0].source, SignalSource::Semantic);
    // all four signals computed: 0.2 * 0.9 over a total weight of 1.0
    assert!((second.tags[0].score - 0.18).abs() < 1e-9);
}

#[tokio::test]
async fn semantic_alone_stays_below_default_floor() {
    let pack = physics();
    let paper = segment(&two_question_paper());
    let linking = unlinked(&paper, &pack);
    let client = Arc::new(MockSimilarityClient::new().with_score("ball", "falling objects", 1.0));
    let scorer = Arc::new(SemanticScorer::new(client, semantic_config(1_000)));

    let result = TopicTagger::default()
        .with_semantic(scorer)
        .tag(&paper, &linking, &pack)
        .await;

    let second = result.for_question(2).unwrap();
    assert!(second.semantic_used);
    assert!(!second.is_tagged());
    assert_eq!(result.metadata.semantic_fallbacks, 1);
}

// === Scenario: lexical-only evidence is renormalized over every computed signal ===
#[tokio::test]
async fn lexical_only_score_is_renormalized_over_computed_signals() {
    let pack = RulePack::from_yaml_str(
        r#"
subject: physics
topics:
  - { id: electricity, name: Electricity }
  - { id: energy, name: Energy }
phrase_rules:
  - { pattern: "series circuit", topic: electricity, weight: 2.0 }
  - { pattern: "thermal store", topic: energy, weight: 1.5 }
"#,
    )
    .unwrap();
    let paper = segment(
        &DocumentBuilder::new()
            .line("1")
            .line("Two lamps are connected in a series circuit.")
            .line("(a) Explain what happens to the thermal store. (2)")
            .line("(Total for Question 1 = 2 marks)")
            .build(),
    );
    let linking = unlinked(&paper, &pack);

    let result = TopicTagger::default().tag(&paper, &linking, &pack).await;
    let tags = result.for_question(1).unwrap();

    // lexical 2/3 weighted 0.4, over lexical + cue + structural = 0.8
    let electricity = tags.tag("electricity").unwrap();
    assert!((electricity.signal.lexical - 2.0 / 3.0).abs() < 1e-9);
    assert!((electricity.score - 1.0 / 3.0).abs() < 1e-9);

    // lexical 0.5 gives 0.25, below the floor
    assert!(tags.tag("energy").is_none());
    assert_eq!(tags.tags.len(), 1);
}

#[tokio::test]
async fn semantic_not_requested_when_rules_suffice() {
    let pack = physics();
    let paper = segment(&ohms_law_paper());
    let linking = unlinked(&paper, &pack);
    let client = Arc::new(MockSimilarityClient::new());
    let scorer = Arc::new(SemanticScorer::new(client.clone(), semantic_config(1_000)));

    TopicTagger::default()
        .with_semantic(scorer)
        .tag(&paper, &linking, &pack)
        .await;

    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn markscheme_cues_tag_question_without_lexical_evidence() {
    let pack = physics();
    let paper = segment(
        &DocumentBuilder::new()
            .line("3")
            .line("A car travels along a road.")
            .line("(a) Name the store that increases as the car speeds up. (1)")
            .line("(Total for Question 3 = 1 mark)")
            .build(),
    );
    let markscheme = DocumentBuilder::new()
        .line("3(a) kinetic energy [B1] [1]")
        .build();
    let linking = MarkschemeLinker::default().link(&paper, &markscheme, pack.vocabulary());
    assert_eq!(linking.stats.linked, 1);

    let result = TopicTagger::default().tag(&paper, &linking, &pack).await;

    let tags = result.for_question(3).unwrap();
    assert_eq!(tags.tags.len(), 1);
    assert_eq!(tags.tags[0].topic_id, "energy");
    assert_eq!(tags.tags[0].source, SignalSource::MsCue);
    assert_eq!(tags.tags[0].signal.lexical, 0.0);
    assert_eq!(tags.tags[0].signal.cue_weight, 3.0);
    assert!((tags.tags[0].score - 0.3 / 0.8).abs() < 1e-9);
    assert_eq!(result.metadata.cue_sourced, 1);
}

#[tokio::test]
async fn floor_and_cap_limit_kept_topics() {
    let pack = RulePack::from_yaml_str(
        r#"
subject: test
topics:
  - { id: alpha, name: Alpha }
  - { id: beta, name: Beta }
  - { id: gamma, name: Gamma }
  - { id: delta, name: Delta }
  - { id: epsilon, name: Epsilon }
  - { id: zeta, name: Zeta }
phrase_rules:
  - { pattern: alpha, topic: alpha, weight: 3.0 }
  - { pattern: beta, topic: beta, weight: 3.0 }
  - { pattern: gamma, topic: gamma, weight: 3.0 }
  - { pattern: delta, topic: delta, weight: 3.0 }
  - { pattern: epsilon, topic: epsilon, weight: 3.0 }
  - { pattern: zeta, topic: zeta, weight: 0.3 }
"#,
    )
    .unwrap();
    let paper = segment(
        &DocumentBuilder::new()
            .line("1")
            .line("Alpha beta gamma delta epsilon zeta. (1)")
            .line("(Total for Question 1 = 1 mark)")
            .build(),
    );
    let linking = unlinked(&paper, &pack);
    let config = TaggerConfig::default();

    let result = TopicTagger::new(config.clone())
        .tag(&paper, &linking, &pack)
        .await;
    let tags = result.for_question(1).unwrap();

    let ids: Vec<_> = tags.tags.iter().map(|t| t.topic_id.as_str()).collect();
    assert_eq!(ids, vec!["alpha", "beta", "gamma", "delta"]);
    assert!(tags.capped);
    assert!(tags.tags.iter().all(|t| t.score >= config.floor));
    assert!(tags.tag("zeta").is_none());
    assert_eq!(result.metadata.capped, 1);
    assert_eq!(result.metadata.average_topics, 4.0);
}

#[tokio::test]
async fn untagged_question_is_reported() {
    let pack = physics();
    let paper = segment(
        &DocumentBuilder::new()
            .line("1")
            .line("Name one renewable resource. (1)")
            .line("(Total for Question 1 = 1 mark)")
            .build(),
    );
    let linking = unlinked(&paper, &pack);

    let result = TopicTagger::default().tag(&paper, &linking, &pack).await;

    assert_eq!(result.metadata.total_questions, 1);
    assert_eq!(result.metadata.untagged, 1);
    assert_eq!(result.metadata.average_topics, 0.0);
    assert!(result
        .metadata
        .warnings
        .iter()
        .any(|w| w.contains("question 1: no topic reached")));
}

#[tokio::test]
async fn tagging_is_deterministic() {
    let pack = physics();
    let paper = segment(&two_question_paper());
    let linking = unlinked(&paper, &pack);
    let tagger = TopicTagger::default();

    let first = tagger.tag(&paper, &linking, &pack).await;
    let second = tagger.tag(&paper, &linking, &pack).await;
    assert_eq!(first, second);
}
