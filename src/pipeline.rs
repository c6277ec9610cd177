//! Per-paper ingestion: segment → link → tag
//!
//! Papers are independent. The only state shared between them is the
//! registry of compiled rule packs and, when enabled, the semantic scorer
//! with its rate limits. [`IngestPipeline::process_batch`] runs several
//! papers on tokio tasks under a caller-chosen concurrency limit.

use crate::config::{ConfigError, PipelineConfig};
use crate::document::SourceDocument;
use crate::markscheme::{LinkingResult, MarkschemeLinker};
use crate::segment::{FenceSegmenter, SegmentError, SegmentationResult};
use crate::tagging::{
    RulePackError, RulePackRegistry, SemanticScorer, SimilarityClient, TaggingResult, TopicTagger,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Warnings copied into a [`PaperSummary`].
pub const SUMMARY_WARNINGS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("paper {paper_id}: {source}")]
    Segment {
        paper_id: String,
        #[source]
        source: SegmentError,
    },
    #[error(transparent)]
    RulePack(#[from] RulePackError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("paper {paper_id}: task failed: {message}")]
    Task { paper_id: String, message: String },
}

/// One paper to ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperInput {
    pub paper_id: String,
    /// Selects the rule pack
    pub subject: String,
    pub question_paper: SourceDocument,
    #[serde(default)]
    pub markscheme: Option<SourceDocument>,
}

/// Headline numbers of one processed paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperSummary {
    pub paper_id: String,
    pub fences_found: usize,
    pub fences_implied: usize,
    pub parts_linked: usize,
    pub parts_total: usize,
    pub questions_tagged: usize,
    pub questions_total: usize,
    pub ocr_used: bool,
    /// The first few warnings across all three stages, in stage order
    pub leading_warnings: Vec<String>,
    pub warning_count: usize,
}

impl PaperSummary {
    pub fn new(
        paper_id: &str,
        segmentation: &SegmentationResult,
        linking: &LinkingResult,
        tagging: &TaggingResult,
    ) -> Self {
        let warnings = segmentation
            .metadata
            .warnings
            .iter()
            .chain(&linking.warnings)
            .chain(&tagging.metadata.warnings);
        let warning_count = warnings.clone().count();

        Self {
            paper_id: paper_id.to_string(),
            fences_found: segmentation.metadata.fences_found,
            fences_implied: segmentation.metadata.fences_implied,
            parts_linked: linking.stats.linked,
            parts_total: linking.stats.total_parts,
            questions_tagged: tagging.metadata.tagged,
            questions_total: tagging.metadata.total_questions,
            ocr_used: segmentation.metadata.ocr_used,
            leading_warnings: warnings.take(SUMMARY_WARNINGS).cloned().collect(),
            warning_count,
        }
    }
}

/// Everything produced for one paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperOutcome {
    pub paper_id: String,
    pub segmentation: SegmentationResult,
    pub linking: LinkingResult,
    pub tagging: TaggingResult,
    pub summary: PaperSummary,
}

pub struct IngestPipeline {
    config: PipelineConfig,
    registry: RulePackRegistry,
    segmenter: FenceSegmenter,
    linker: MarkschemeLinker,
    tagger: TopicTagger,
}

impl IngestPipeline {
    pub fn new(config: PipelineConfig, registry: RulePackRegistry) -> Self {
        Self {
            segmenter: FenceSegmenter::new(config.segmenter.clone()),
            linker: MarkschemeLinker::new(config.linker.clone()),
            tagger: TopicTagger::new(config.tagger.clone()),
            config,
            registry,
        }
    }

    /// Enable the semantic fallback through `client`.
    pub fn with_semantic(mut self, client: Arc<dyn SimilarityClient>) -> Self {
        let scorer = SemanticScorer::new(client, self.config.semantic.clone());
        self.tagger = self.tagger.with_semantic(Arc::new(scorer));
        self
    }

    /// Process one paper. Fails only on an empty question paper or a
    /// missing rule pack; everything else becomes warnings.
    pub async fn process(&self, input: &PaperInput) -> Result<PaperOutcome, PipelineError> {
        let pack = self.registry.get(&input.subject)?;

        let segmentation = self
            .segmenter
            .segment(&input.question_paper)
            .map_err(|source| PipelineError::Segment {
                paper_id: input.paper_id.clone(),
                source,
            })?;

        let empty = SourceDocument::default();
        let markscheme = input.markscheme.as_ref().unwrap_or(&empty);
        let linking = self
            .linker
            .link(&segmentation, markscheme, pack.vocabulary());

        let tagging = self.tagger.tag(&segmentation, &linking, &pack).await;
        let summary = PaperSummary::new(&input.paper_id, &segmentation, &linking, &tagging);

        info!(
            paper = %input.paper_id,
            questions = summary.questions_total,
            linked = summary.parts_linked,
            tagged = summary.questions_tagged,
            warnings = summary.warning_count,
            "processed paper"
        );

        Ok(PaperOutcome {
            paper_id: input.paper_id.clone(),
            segmentation,
            linking,
            tagging,
            summary,
        })
    }

    /// Process papers concurrently, at most `concurrency` at a time.
    /// Results come back in input order.
    pub async fn process_batch(
        self: Arc<Self>,
        inputs: Vec<PaperInput>,
        concurrency: usize,
    ) -> Vec<Result<PaperOutcome, PipelineError>> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut handles = Vec::with_capacity(inputs.len());

        for input in inputs {
            let pipeline = Arc::clone(&self);
            let semaphore = Arc::clone(&semaphore);
            let paper_id = input.paper_id.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| PipelineError::Task {
                        paper_id: input.paper_id.clone(),
                        message: e.to_string(),
                    })?;
                pipeline.process(&input).await
            });
            handles.push((paper_id, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (paper_id, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(PipelineError::Task {
                    paper_id,
                    message: e.to_string(),
                }),
            };
            if let Err(e) = &result {
                warn!(error = %e, "paper failed");
            }
            results.push(result);
        }
        results
    }
}
