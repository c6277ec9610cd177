//! Fence segmenter: question paper → questions → parts

mod segmenter;
mod types;


pub use segmenter::{parse_fence, trailing_marks, FenceSegmenter};
pub use types::{Part, Question, SegmentError, SegmentationMetadata, SegmentationResult};
