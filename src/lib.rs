//! Codeguard - bug detection for LLM-generated Python code.
//!
//! Codeguard classifies a code sample as `bug` or `clean` by layering
//! independent signals: static detectors over the parsed tree, PyPI checks
//! for hallucinated packages, sandboxed execution, and an LLM judgment of
//! whether the code does what its prompt asked. It also runs labelled test
//! sets through a local or remote detector and aggregates the results.
//!
//! # Architecture
//!
//! - `analysis`: tree-sitter parsing and fact extraction
//! - `detect`: static detectors that consume the extracted facts
//! - `registry`: PyPI existence checks with a TTL cache
//! - `dynamic`: sandboxed execution and runtime error classification
//! - `llm`: LLM clients and the semantic reasoner
//! - `pipeline`: all local layers in order
//! - `verdict`: fusion of findings into a bug/clean verdict
//! - `api`: client for a remote `POST /api/analyze` endpoint
//! - `testset`, `evaluate`, `metrics`: evaluation runs and their metrics
//! - `config`, `report`, `cli`: configuration, output and entry points

pub mod analysis;
pub mod api;
pub mod cli;
pub mod config;
pub mod detect;
pub mod dynamic;
pub mod evaluate;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod testset;
pub mod verdict;

pub use analysis::{CodeFacts, PythonAnalyzer};
pub use config::Config;
pub use detect::{BugPattern, DetectionResult, Finding, Layer, Severity, StaticAnalyzer};
pub use pipeline::{AnalysisOutcome, AnalysisPipeline, AnalysisRequest, PipelineOptions};
pub use verdict::{fuse, Label, Verdict};
