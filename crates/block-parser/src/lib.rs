//! Block Parser & Coverage (spec §4.2): turns a Markdown block stream into
//! typed blocks and augments an LLM-selected block set with link closure
//! and query-scored additions.

pub mod coverage;
pub mod parser;

pub use coverage::{augment_selection, CoverageParams, CoverageResult};
pub use parser::{parse_block_stream, serialize_block_stream};
