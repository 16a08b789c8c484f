//! Evaluation runs: every case of every test set through a backend, scored
//! against its expected label.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn, Instrument};

use crate::api::{ApiClient, ApiRequest, ReportedBug};
use crate::pipeline::{AnalysisPipeline, AnalysisRequest};
use crate::testset::{TestCase, TestSet};
use crate::verdict::Label;

pub const SUMMARY_FILE: &str = "summary.json";

/// What a backend says about one case.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: Label,
    pub severity_score: f64,
    pub bugs: Vec<ReportedBug>,
}

/// A backend failure. Transient failures are not held against the detector.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendError {
    pub message: String,
    pub transient: bool,
}

#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;

    async fn classify(&self, case: &TestCase) -> Result<Classification, BackendError>;
}

/// In-process analysis.
pub struct LocalBackend {
    pipeline: AnalysisPipeline,
}

impl LocalBackend {
    pub fn new(pipeline: AnalysisPipeline) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn classify(&self, case: &TestCase) -> Result<Classification, BackendError> {
        let mut request = AnalysisRequest::new(case.code.clone());
        if !case.prompt.is_empty() {
            request = request.with_prompt(case.prompt.clone());
        }
        let outcome = self
            .pipeline
            .analyze(&request)
            .await
            .map_err(|e| BackendError {
                message: format!("{:#}", e),
                transient: false,
            })?;
        let verdict = outcome.verdict;
        Ok(Classification {
            label: verdict.label,
            severity_score: verdict.severity_score,
            bugs: verdict
                .findings
                .iter()
                .map(|f| ReportedBug {
                    pattern: f.pattern.to_string(),
                    description: f.message.clone(),
                })
                .collect(),
        })
    }
}

/// The remote `/api/analyze` service.
pub struct RemoteBackend {
    client: ApiClient,
}

impl RemoteBackend {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    fn name(&self) -> &str {
        self.client.endpoint()
    }

    async fn classify(&self, case: &TestCase) -> Result<Classification, BackendError> {
        let prompt = Some(case.prompt.as_str()).filter(|p| !p.is_empty());
        let verdict = self
            .client
            .analyze(&ApiRequest::new(&case.code, prompt))
            .await
            .map_err(|e| BackendError {
                transient: e.is_transient(),
                message: e.to_string(),
            })?;
        Ok(Classification {
            label: verdict.label,
            severity_score: verdict.severity_score,
            bugs: verdict.bugs,
        })
    }
}

/// Outcome of one test case, in the results-file layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    #[serde(deserialize_with = "crate::testset::string_or_number")]
    pub test_case_id: String,
    pub name: String,
    pub expected: Label,
    /// Absent when the backend failed.
    #[serde(default)]
    pub predicted: Option<Label>,
    pub correct: bool,
    #[serde(default)]
    pub bug_count: usize,
    #[serde(default)]
    pub bugs_found: Vec<ReportedBug>,
    #[serde(default)]
    pub severity_score: f64,
    #[serde(default)]
    pub expected_bug_type: Option<String>,
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub transient: bool,
    #[serde(default)]
    pub latency_ms: u64,
}

impl CaseResult {
    /// Whether the case counts toward accuracy.
    pub fn is_evaluated(&self) -> bool {
        !self.transient
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// One `test_set_<id>_results.json` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSetResults {
    pub test_set_id: u32,
    pub test_set_name: String,
    pub total_cases: usize,
    #[serde(default)]
    pub evaluated: usize,
    #[serde(default)]
    pub errors: usize,
    pub correct: usize,
    /// Percent of evaluated cases.
    pub accuracy: f64,
    pub timestamp: String,
    pub results: Vec<CaseResult>,
}

impl TestSetResults {
    pub fn from_cases(set: &TestSet, results: Vec<CaseResult>) -> Self {
        let evaluated = results.iter().filter(|r| r.is_evaluated()).count();
        let errors = results.iter().filter(|r| r.is_error()).count();
        let correct = results.iter().filter(|r| r.correct).count();
        Self {
            test_set_id: set.test_set_id,
            test_set_name: set.name.clone(),
            total_cases: results.len(),
            evaluated,
            errors,
            correct,
            accuracy: percent(correct, evaluated),
            timestamp: Local::now().to_rfc3339(),
            results,
        }
    }

    pub fn file_name(&self) -> String {
        format!("test_set_{}_results.json", self.test_set_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetSummary {
    pub test_set_id: u32,
    pub test_set_name: String,
    pub total_cases: usize,
    pub evaluated: usize,
    pub correct: usize,
    pub accuracy: f64,
}

/// Contents of `summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub backend: String,
    pub timestamp: String,
    pub total_cases: usize,
    pub evaluated: usize,
    pub errors: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub test_sets: Vec<SetSummary>,
}

impl RunSummary {
    pub fn new(backend: &str, sets: &[TestSetResults]) -> Self {
        let total_cases = sets.iter().map(|s| s.total_cases).sum();
        let evaluated = sets.iter().map(|s| s.evaluated).sum();
        let errors = sets.iter().map(|s| s.errors).sum();
        let correct = sets.iter().map(|s| s.correct).sum();
        Self {
            backend: backend.to_string(),
            timestamp: Local::now().to_rfc3339(),
            total_cases,
            evaluated,
            errors,
            correct,
            accuracy: percent(correct, evaluated),
            test_sets: sets
                .iter()
                .map(|s| SetSummary {
                    test_set_id: s.test_set_id,
                    test_set_name: s.test_set_name.clone(),
                    total_cases: s.total_cases,
                    evaluated: s.evaluated,
                    correct: s.correct,
                    accuracy: s.accuracy,
                })
                .collect(),
        }
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

pub struct EvaluationRunner {
    backend: Arc<dyn Backend>,
    concurrency: usize,
    results_dir: Option<PathBuf>,
    show_progress: bool,
}

impl EvaluationRunner {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            concurrency: 1,
            results_dir: None,
            show_progress: false,
        }
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Write result files into `dir`.
    pub fn results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = Some(dir.into());
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub async fn run_set(&self, set: &TestSet) -> Result<TestSetResults> {
        let span = info_span!("test_set", id = set.test_set_id, cases = set.len());
        async {
            let progress = self.progress_bar(set);
            let results: Vec<CaseResult> = stream::iter(&set.test_cases)
                .map(|case| {
                    let progress = progress.clone();
                    async move {
                        let result = self.run_case(case).await;
                        progress.inc(1);
                        result
                    }
                })
                .buffered(self.concurrency)
                .collect()
                .await;
            progress.finish_and_clear();

            let set_results = TestSetResults::from_cases(set, results);
            info!(
                correct = set_results.correct,
                evaluated = set_results.evaluated,
                errors = set_results.errors,
                accuracy = set_results.accuracy,
                "test set finished"
            );
            if let Some(dir) = &self.results_dir {
                write_json(&dir.join(set_results.file_name()), &set_results)?;
            }
            Ok(set_results)
        }
        .instrument(span)
        .await
    }

    pub async fn run_all(&self, sets: &[TestSet]) -> Result<(Vec<TestSetResults>, RunSummary)> {
        if let Some(dir) = &self.results_dir {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create results directory {}", dir.display()))?;
        }

        let mut all = Vec::with_capacity(sets.len());
        for set in sets {
            all.push(self.run_set(set).await?);
        }

        let summary = RunSummary::new(self.backend.name(), &all);
        if let Some(dir) = &self.results_dir {
            write_json(&dir.join(SUMMARY_FILE), &summary)?;
        }
        Ok((all, summary))
    }

    async fn run_case(&self, case: &TestCase) -> CaseResult {
        let started = Instant::now();
        let outcome = self.backend.classify(case).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let mut result = CaseResult {
            test_case_id: case.id.clone(),
            name: case.name.clone(),
            expected: case.expected,
            predicted: None,
            correct: false,
            bug_count: 0,
            bugs_found: Vec::new(),
            severity_score: 0.0,
            expected_bug_type: case.bug_type.clone(),
            prompt: case.prompt.clone(),
            error: None,
            transient: false,
            latency_ms,
        };

        match outcome {
            Ok(classification) => {
                result.predicted = Some(classification.label);
                result.correct = classification.label == case.expected;
                result.bug_count = classification.bugs.len();
                result.bugs_found = classification.bugs;
                result.severity_score = classification.severity_score;
            }
            Err(e) => {
                warn!(case = %case.id, transient = e.transient, error = %e.message, "case failed");
                result.error = Some(e.message);
                result.transient = e.transient;
            }
        }
        result
    }

    fn progress_bar(&self, set: &TestSet) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(set.len() as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{prefix:>12} [{bar:30}] {pos}/{len} {elapsed_precise}")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_prefix(format!("set {}", set.test_set_id));
        bar
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Answers from a fixed table keyed by case id.
    struct TableBackend;

    #[async_trait]
    impl Backend for TableBackend {
        fn name(&self) -> &str {
            "table"
        }

        async fn classify(&self, case: &TestCase) -> Result<Classification, BackendError> {
            match case.id.as_str() {
                "gateway" => Err(BackendError {
                    message: "upstream error 502: bad gateway".into(),
                    transient: true,
                }),
                "rejected" => Err(BackendError {
                    message: "request rejected 422".into(),
                    transient: false,
                }),
                _ => Ok(Classification {
                    label: Label::Bug,
                    severity_score: 6.0,
                    bugs: vec![ReportedBug {
                        pattern: "silly_mistake".into(),
                        description: "x".into(),
                    }],
                }),
            }
        }
    }

    fn case(id: &str, expected: Label) -> TestCase {
        TestCase {
            id: id.into(),
            name: format!("case {}", id),
            prompt: "p".into(),
            code: "x = 1".into(),
            expected,
            bug_type: None,
        }
    }

    fn set() -> TestSet {
        TestSet {
            test_set_id: 4,
            name: "mixed".into(),
            description: None,
            test_cases: vec![
                case("a", Label::Bug),
                case("b", Label::Clean),
                case("gateway", Label::Bug),
                case("rejected", Label::Bug),
            ],
        }
    }

    #[tokio::test]
    async fn test_transient_failures_leave_accuracy() {
        let runner = EvaluationRunner::new(Arc::new(TableBackend)).concurrency(3);
        let results = runner.run_set(&set()).await.unwrap();

        assert_eq!(results.total_cases, 4);
        assert_eq!(results.errors, 2);
        assert_eq!(results.evaluated, 3);
        assert_eq!(results.correct, 1);
        assert!((results.accuracy - 100.0 / 3.0).abs() < 1e-9);

        let ids: Vec<&str> = results.results.iter().map(|r| r.test_case_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "gateway", "rejected"]);
        assert!(results.results[2].predicted.is_none());
        assert!(results.results[2].transient);
        assert_eq!(results.results[0].bug_count, 1);
    }

    #[tokio::test]
    async fn test_writes_result_files() {
        let dir = TempDir::new().unwrap();
        let runner = EvaluationRunner::new(Arc::new(TableBackend)).results_dir(dir.path());
        let (sets, summary) = runner.run_all(&[set()]).await.unwrap();

        assert_eq!(sets.len(), 1);
        assert_eq!(summary.backend, "table");
        assert_eq!(summary.errors, 2);

        let written = fs::read_to_string(dir.path().join("test_set_4_results.json")).unwrap();
        let parsed: TestSetResults = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed.correct, 1);
        assert_eq!(parsed.results[0].bugs_found[0].pattern, "silly_mistake");
        assert!(written.contains("\"type\": \"silly_mistake\""));
        assert!(dir.path().join(SUMMARY_FILE).exists());
    }

    #[test]
    fn test_reads_results_without_error_fields() {
        let json = r#"{
            "test_set_id": 1, "test_set_name": "basic", "total_cases": 1,
            "correct": 1, "accuracy": 100.0, "timestamp": "2024-01-01T00:00:00",
            "results": [{
                "test_case_id": "1", "name": "n", "expected": "clean",
                "predicted": "clean", "correct": true, "bug_count": 0,
                "bugs_found": [], "severity_score": 0, "expected_bug_type": null,
                "prompt": "p"
            }]
        }"#;
        let parsed: TestSetResults = serde_json::from_str(json).unwrap();
        assert!(parsed.results[0].is_evaluated());
        assert!(!parsed.results[0].is_error());
    }
}
