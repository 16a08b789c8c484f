//! Integration tests for the static layers of the analysis pipeline.
//!
//! Every fixture under `testdata/samples` is named after the bug pattern it
//! contains.

use std::path::PathBuf;

use codeguard::detect::{BugPattern, Severity, StaticAnalyzer};
use codeguard::pipeline::{AnalysisPipeline, AnalysisRequest};
use codeguard::{Config, Label};

fn testdata_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

fn read_fixture(relative: &str) -> String {
    std::fs::read_to_string(testdata_path().join(relative)).expect("fixture should exist")
}

fn offline_pipeline() -> AnalysisPipeline {
    AnalysisPipeline::static_only(&Config::default())
}

#[test]
fn test_clean_fixture_has_no_findings() {
    let result = StaticAnalyzer::default()
        .analyze(&read_fixture("clean.py"), None)
        .expect("analysis should succeed");
    assert!(result.findings.is_empty(), "unexpected findings: {:?}", result.findings);
    assert!(result.imports_to_verify.is_empty());
}

#[tokio::test]
async fn test_each_sample_is_flagged_with_its_pattern() {
    let cases = [
        ("hallucinated_object.py", BugPattern::HallucinatedObject),
        ("wrong_attribute.py", BugPattern::WrongAttribute),
        ("wrong_input_type.py", BugPattern::WrongInputType),
        ("silly_mistake.py", BugPattern::SillyMistake),
        ("incomplete_generation.py", BugPattern::IncompleteGeneration),
        ("syntax_error.py", BugPattern::SyntaxError),
    ];

    let pipeline = offline_pipeline();
    for (file, pattern) in cases {
        let code = read_fixture(&format!("samples/{}", file));
        let outcome = pipeline
            .analyze(&AnalysisRequest::new(code))
            .await
            .expect("analysis should succeed");

        assert_eq!(outcome.verdict.label, Label::Bug, "{} should be a bug", file);
        assert!(
            outcome.verdict.patterns().contains(&pattern),
            "{} should report {}, got {:?}",
            file,
            pattern,
            outcome.verdict.patterns()
        );
        assert!(outcome
            .verdict
            .findings
            .iter()
            .any(|f| f.pattern == pattern && f.severity == Severity::Error));
    }
}

#[tokio::test]
async fn test_clean_fixture_verdict() {
    let outcome = offline_pipeline()
        .analyze(&AnalysisRequest::new(read_fixture("clean.py")).with_prompt("Numeric helpers."))
        .await
        .expect("analysis should succeed");
    assert_eq!(outcome.verdict.label, Label::Clean);
    assert_eq!(outcome.verdict.severity_score, 0.0);
}

#[test]
fn test_third_party_imports_are_queued_for_registry() {
    let result = StaticAnalyzer::default()
        .analyze(&read_fixture("samples/unknown_package.py"), None)
        .expect("analysis should succeed");
    assert_eq!(result.imports_to_verify, vec!["requests", "fastjsonx"]);
    assert!(!result
        .findings
        .iter()
        .any(|f| f.pattern == BugPattern::HallucinatedObject));
}

#[tokio::test]
async fn test_batch_matches_single_analysis() {
    let pipeline = offline_pipeline();
    let requests: Vec<AnalysisRequest> = ["clean.py", "samples/silly_mistake.py"]
        .iter()
        .map(|f| AnalysisRequest::new(read_fixture(f)))
        .collect();

    let outcomes = pipeline.analyze_batch(&requests, 4).await;
    let labels: Vec<Label> = outcomes
        .into_iter()
        .map(|o| o.expect("analysis should succeed").verdict.label)
        .collect();
    assert_eq!(labels, vec![Label::Clean, Label::Bug]);
}
