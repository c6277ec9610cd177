//! Markscheme linker: format detection, entry parsing and part linking

mod format;
mod linker;
mod types;


pub use format::{detect_format, mark_points, parse_compact, parse_entries, parse_listed, parse_tabular};
pub use linker::MarkschemeLinker;
pub use types::{
    LinkDetails, LinkingResult, LinkingStats, MarkPoint, MarkschemeEntry, MarkschemeFormat,
    MarkschemeLink,
};
