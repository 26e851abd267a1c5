//! ghacron-scanner: annotation discovery across installation repositories.
//!
//! The parser is deliberately line-oriented rather than YAML-aware: the
//! annotations live inside comments that a YAML parser would discard.

mod parser;
mod scanner;

pub use parser::{has_workflow_dispatch, parse_annotations};
pub use scanner::{ScanResult, Scanner};
