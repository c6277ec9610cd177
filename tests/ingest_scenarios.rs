//! End-to-end ingestion: segment → link → tag through [`IngestPipeline`]
//!
//! Each scenario feeds a built question paper (and optionally a markscheme)
//! through the pipeline with rule packs loaded from disk, and checks the
//! three linked artifacts together.

mod common;

use common::*;
use paperlink::tagging::{MockSimilarityClient, RulePackError};
use paperlink::{
    IngestPipeline, MarkschemeFormat, PaperOutcome, PipelineConfig, PipelineError, Question,
    RulePackRegistry, SignalSource, SourceDocument,
};
use std::sync::Arc;
use std::time::Duration;

fn pipeline() -> IngestPipeline {
    IngestPipeline::new(PipelineConfig::default(), registry())
}

fn question(outcome: &PaperOutcome, number: u32) -> &Question {
    outcome
        .segmentation
        .questions
        .iter()
        .find(|q| q.number == number)
        .unwrap()
}

// === Scenario: nested parts under one fence ===
#[tokio::test]
async fn nested_parts_are_segmented_and_tagged() {
    let outcome = pipeline()
        .process(&input("nested", nested_parts_paper(), None))
        .await
        .unwrap();

    let question = question(&outcome, 2);
    assert_eq!(question.total_marks, Some(11));
    assert_eq!(question.parts.len(), 8);
    assert_eq!(question.part_marks_sum(), 11);

    assert_eq!(outcome.summary.fences_found, 1);
    assert_eq!(outcome.summary.parts_total, 8);
    assert_eq!(outcome.summary.parts_linked, 0);

    let tags = outcome.tagging.for_question(2).unwrap();
    assert_eq!(tags.tags[0].topic_id, "electricity");
    assert!(tags.tags[0].source.is_rule());
    assert_eq!(outcome.summary.questions_tagged, 1);
}

// === Scenario: bare subpart entries in a listed markscheme ===
#[tokio::test]
async fn listed_markscheme_links_subparts_by_suffix() {
    let outcome = pipeline()
        .process(&input("circuit", circuit_paper(), Some(circuit_markscheme())))
        .await
        .unwrap();

    assert_eq!(outcome.linking.format, MarkschemeFormat::Listed);
    let link = outcome.linking.link(1, "(a)(ii)").unwrap();
    assert!(link.details.suffix_match);
    assert!(link.confidence > 0.0);
    assert_eq!(link.mark_points.len(), 2);

    assert_eq!(outcome.summary.parts_total, 3);
    assert_eq!(outcome.summary.parts_linked, 2);
    assert!(outcome
        .linking
        .warnings
        .iter()
        .any(|w| w.contains("question 1 (a)") && w.contains("no markscheme entry")));
}

// === Scenario: formula rule decides the topic ===
#[tokio::test]
async fn formula_rule_tags_with_pack_version() {
    let outcome = pipeline()
        .process(&input("ohm", formula_and_plain_paper(), None))
        .await
        .unwrap();

    let tag = &outcome.tagging.for_question(1).unwrap().tags[0];
    assert_eq!(tag.topic_name, "Electricity");
    assert_eq!(tag.source, SignalSource::RuleFormula);
    assert_eq!(tag.signal.formula_weight, 5.0);
    assert!(tag.pipeline_version.ends_with("/physics@2024.1"));
}

// === Scenario: semantic service times out ===
#[tokio::test]
async fn semantic_timeout_degrades_to_rule_tags() {
    let mut config = PipelineConfig::default();
    config.semantic.timeout_ms = 20;
    config.semantic.min_interval_ms = 0;
    let client = Arc::new(MockSimilarityClient::new().with_delay(Duration::from_millis(500)));
    let pipeline = IngestPipeline::new(config, registry()).with_semantic(client.clone());

    let outcome = pipeline
        .process(&input("timeout", formula_and_plain_paper(), None))
        .await
        .unwrap();

    assert_eq!(client.calls(), 1);
    assert_eq!(outcome.tagging.metadata.semantic_fallbacks, 0);
    assert_eq!(
        outcome.tagging.for_question(1).unwrap().tags[0].topic_id,
        "electricity"
    );
    assert!(!outcome.tagging.for_question(2).unwrap().is_tagged());
    assert_eq!(outcome.summary.questions_tagged, 1);
    assert!(outcome
        .tagging
        .metadata
        .warnings
        .iter()
        .any(|w| w.contains("semantic fallback skipped")));
}

#[tokio::test]
async fn semantic_fallback_tags_weak_question() {
    let mut config = PipelineConfig::default();
    config.semantic.min_interval_ms = 0;
    config.tagger.floor = 0.15;
    let client = Arc::new(MockSimilarityClient::new().with_score("ball", "falling objects", 0.8));
    let pipeline = IngestPipeline::new(config, registry()).with_semantic(client.clone());

    let outcome = pipeline
        .process(&input("fallback", formula_and_plain_paper(), None))
        .await
        .unwrap();

    let second = outcome.tagging.for_question(2).unwrap();
    assert!(second.semantic_used);
    assert_eq!(second.tags[0].topic_id, "energy");
    assert_eq!(second.tags[0].source, SignalSource::Semantic);
    assert!((second.tags[0].score - 0.16).abs() < 1e-9);
    assert_eq!(outcome.summary.questions_tagged, 2);
}

#[tokio::test]
async fn subject_lookup_is_case_insensitive() {
    let mut paper = input("upper", circuit_paper(), None);
    paper.subject = "Physics".to_string();
    assert!(pipeline().process(&paper).await.is_ok());

    paper.subject = "biology".to_string();
    let err = pipeline().process(&paper).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::RulePack(RulePackError::UnknownSubject(ref s)) if s == "biology"
    ));
}

#[tokio::test]
async fn batch_isolates_failing_papers() {
    let pipeline = Arc::new(pipeline());
    let inputs = vec![
        input("a", circuit_paper(), Some(circuit_markscheme())),
        input("blank", SourceDocument::default(), None),
        input("c", formula_and_plain_paper(), None),
    ];

    let results = pipeline.process_batch(inputs, 2).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().paper_id, "a");
    assert!(matches!(
        results[1],
        Err(PipelineError::Segment { ref paper_id, .. }) if paper_id == "blank"
    ));
    assert_eq!(results[2].as_ref().unwrap().segmentation.questions.len(), 2);
}

#[test]
fn rule_pack_directory_loading() {
    let registry = registry();
    let subjects: Vec<_> = registry.subjects().collect();
    assert_eq!(subjects, vec!["chemistry", "physics"]);

    let dir = pack_dir(&[("physics", PHYSICS_PACK)]);
    write(dir.path(), "notes.txt", "not a rule pack");
    assert_eq!(RulePackRegistry::load_dir(dir.path()).unwrap().len(), 1);
}

#[test]
fn invalid_rule_pack_is_rejected() {
    let dir = pack_dir(&[(
        "broken",
        r#"
subject: physics
topics:
  - { id: waves, name: Waves }
phrase_rules:
  - { pattern: "wavelength", topic: optics, weight: 1.0 }
"#,
    )]);

    let err = RulePackRegistry::load_dir(dir.path()).unwrap_err();
    assert!(matches!(err, RulePackError::UnknownTopic { ref topic, .. } if topic == "optics"));
}

#[test]
fn duplicate_subjects_are_rejected() {
    let dir = pack_dir(&[("a", PHYSICS_PACK), ("b", PHYSICS_PACK)]);
    let err = RulePackRegistry::load_dir(dir.path()).unwrap_err();
    assert!(matches!(err, RulePackError::DuplicateSubject(_)));
}

#[tokio::test]
async fn outcome_serializes_to_json() {
    let outcome = pipeline()
        .process(&input("json", circuit_paper(), Some(circuit_markscheme())))
        .await
        .unwrap();

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["paper_id"], "json");
    assert_eq!(json["linking"]["format"], "listed");
    assert_eq!(json["segmentation"]["questions"][0]["number"], 1);
    assert_eq!(json["summary"]["parts_total"], 3);

    let back: PaperOutcome = serde_json::from_value(json).unwrap();
    assert_eq!(back.segmentation.questions.len(), 1);
    assert_eq!(back.linking.links.len(), 3);
}

#[tokio::test]
async fn documents_load_from_extractor_json() {
    let paper: SourceDocument = serde_json::from_str(
        r#"{"pages":[{"index":0,"height":842,"fragments":[
            {"text":"1","x":50,"y":60},
            {"text":"A lamp is connected to a cell.","x":50,"y":76},
            {"text":"(a) State what an ammeter measures. (1)","x":50,"y":92},
            {"text":"(Total for Question 1 = 1 mark)","x":300,"y":108}
        ]}]}"#,
    )
    .unwrap();

    let outcome = pipeline().process(&input("raw", paper, None)).await.unwrap();

    let question = question(&outcome, 1);
    assert!(question.fenced);
    assert_eq!(question.total_marks, Some(1));
    assert_eq!(question.parts[0].code, "(a)");
    assert_eq!(question.parts[0].marks, Some(1));
}

#[tokio::test]
async fn processing_is_deterministic() {
    let pipeline = pipeline();
    let paper = input("same", circuit_paper(), Some(circuit_markscheme()));

    let first = pipeline.process(&paper).await.unwrap();
    let second = pipeline.process(&paper).await.unwrap();
    assert_eq!(first, second);
}
