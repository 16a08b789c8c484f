//! Static detector layer: one detector per bug pattern, all working on the
//! facts extracted by [`crate::analysis`].

mod attributes;
mod builtins;
mod corner_cases;
mod hallucination;
mod incomplete;
mod input_types;
mod prompt_bias;
mod runner;
mod silly;
pub mod stdlib;
mod syntax;
mod types;

pub use attributes::detect_wrong_attributes;
pub use corner_cases::detect_missing_corner_cases;
pub use hallucination::detect_hallucinations;
pub use incomplete::detect_incomplete_generation;
pub use input_types::detect_wrong_input_types;
pub use prompt_bias::detect_prompt_bias;
pub use runner::{Sample, StaticAnalyzer};
pub use silly::detect_silly_mistakes;
pub use stdlib::is_stdlib;
pub use syntax::detect_syntax_errors;
pub use types::{BugPattern, DetectionResult, Finding, Layer, Severity};
