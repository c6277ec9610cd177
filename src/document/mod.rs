//! Input documents as delivered by the text-extraction collaborator
//!
//! A document is an ordered list of pages, each carrying page-local,
//! top-left-origin text fragments. Downstream components consume the
//! flattened [`PositionedFragment`] stream.

mod builder;
mod fragment;

pub use builder::DocumentBuilder;
pub use fragment::{BoundingBox, Page, PositionedFragment, SourceDocument, TextFragment};
