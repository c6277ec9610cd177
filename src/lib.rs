//! Paperlink: structure and topic recovery for exam papers
//!
//! Takes a question paper and its markscheme, both already reduced to
//! page-ordered, positioned text fragments, and produces three linked
//! artifacts per paper:
//!
//! - **Segmentation**: questions bounded by their "Total for Question N = M
//!   marks" fences, with nested parts, bounding boxes and whole-question
//!   context text
//! - **Linking**: one markscheme entry per part, with a confidence score
//!   and the signals behind it
//! - **Tagging**: subject topics per whole question, from rule packs,
//!   markscheme cues, structural hints and an optional semantic fallback
//!
//! Every stage is deterministic and degrades to partial results plus
//! warnings rather than failing.
//!
//! # Example
//!
//! ```
//! use paperlink::document::DocumentBuilder;
//! use paperlink::FenceSegmenter;
//!
//! let paper = DocumentBuilder::new()
//!     .line("1")
//!     .line("A ball is thrown upwards.")
//!     .line("(a) State the energy change. (1)")
//!     .line("(b) Calculate the maximum height. (2)")
//!     .line("(Total for Question 1 = 3 marks)")
//!     .build();
//!
//! let result = FenceSegmenter::default().segment(&paper).unwrap();
//! assert_eq!(result.questions[0].parts.len(), 2);
//! ```

pub mod config;
pub mod cues;
pub mod document;
pub mod markers;
pub mod markscheme;
pub mod pipeline;
pub mod segment;
pub mod tagging;

pub use config::{ConfigError, PipelineConfig};
pub use document::{BoundingBox, SourceDocument};
pub use markscheme::{LinkingResult, MarkschemeFormat, MarkschemeLink, MarkschemeLinker};
pub use pipeline::{IngestPipeline, PaperInput, PaperOutcome, PaperSummary, PipelineError};
pub use segment::{FenceSegmenter, Part, Question, SegmentError, SegmentationResult};
pub use tagging::{
    RulePack, RulePackError, RulePackRegistry, SemanticScorer, SignalSource, SimilarityClient,
    TaggingResult, TopicTag, TopicTagger,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
