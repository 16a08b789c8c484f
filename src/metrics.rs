//! Aggregate metrics over evaluation results.
//!
//! Bug is the positive class. Cases that failed transiently are counted as
//! errors but left out of every ratio; other failures count as wrong
//! predictions. Ratios with a zero denominator are 0.0.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::evaluate::{CaseResult, TestSetResults};
use crate::verdict::Label;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
}

impl ConfusionMatrix {
    /// Record one evaluated case. A missing prediction is always wrong.
    pub fn record(&mut self, expected: Label, predicted: Option<Label>) {
        match (expected, predicted) {
            (Label::Bug, Some(Label::Bug)) => self.tp += 1,
            (Label::Bug, _) => self.fn_ += 1,
            (Label::Clean, Some(Label::Clean)) => self.tn += 1,
            (Label::Clean, _) => self.fp += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn specificity(&self) -> f64 {
        ratio(self.tn, self.tn + self.fp)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total: usize,
    pub evaluated: usize,
    pub errors: usize,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub specificity: f64,
    pub confusion: ConfusionMatrix,
}

impl Metrics {
    pub fn from_cases<'a>(cases: impl IntoIterator<Item = &'a CaseResult>) -> Self {
        let mut confusion = ConfusionMatrix::default();
        let mut total = 0;
        let mut errors = 0;
        for case in cases {
            total += 1;
            if case.is_error() {
                errors += 1;
            }
            if case.is_evaluated() {
                confusion.record(case.expected, case.predicted);
            }
        }
        Self {
            total,
            evaluated: confusion.total(),
            errors,
            accuracy: confusion.accuracy(),
            precision: confusion.precision(),
            recall: confusion.recall(),
            f1: confusion.f1(),
            specificity: confusion.specificity(),
            confusion,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetAccuracy {
    pub test_set_id: u32,
    pub name: String,
    pub total: usize,
    pub evaluated: usize,
    pub errors: usize,
    pub correct: usize,
    pub accuracy: f64,
}

/// Recall restricted to the cases of one expected bug type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionRate {
    pub cases: usize,
    pub detected: usize,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub overall: Metrics,
    pub per_set: Vec<SetAccuracy>,
    pub per_bug_type: BTreeMap<String, DetectionRate>,
}

pub fn compute(sets: &[TestSetResults]) -> MetricsReport {
    let overall = Metrics::from_cases(sets.iter().flat_map(|s| s.results.iter()));

    let per_set = sets
        .iter()
        .map(|set| {
            let m = Metrics::from_cases(&set.results);
            SetAccuracy {
                test_set_id: set.test_set_id,
                name: set.test_set_name.clone(),
                total: m.total,
                evaluated: m.evaluated,
                errors: m.errors,
                correct: m.confusion.tp + m.confusion.tn,
                accuracy: m.accuracy,
            }
        })
        .collect();

    let mut per_bug_type: BTreeMap<String, DetectionRate> = BTreeMap::new();
    for case in sets.iter().flat_map(|s| s.results.iter()) {
        let Some(bug_type) = case.expected_bug_type.as_deref() else {
            continue;
        };
        if case.expected != Label::Bug || !case.is_evaluated() {
            continue;
        }
        let entry = per_bug_type.entry(bug_type.to_string()).or_default();
        entry.cases += 1;
        if case.predicted == Some(Label::Bug) {
            entry.detected += 1;
        }
    }
    for rate in per_bug_type.values_mut() {
        rate.rate = ratio(rate.detected, rate.cases);
    }

    MetricsReport {
        overall,
        per_set,
        per_bug_type,
    }
}

/// The `<n>` of a `test_set_<n>_results.json` file name.
fn results_number(path: &Path) -> Option<u32> {
    path.file_name()?
        .to_str()?
        .strip_prefix("test_set_")?
        .strip_suffix("_results.json")?
        .parse()
        .ok()
}

/// Load every results file in `dir`, ordered by test set number.
pub fn load_results(dir: &Path) -> Result<Vec<TestSetResults>> {
    let mut files: Vec<(u32, PathBuf)> = fs::read_dir(dir)
        .with_context(|| format!("failed to read results directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter_map(|path| results_number(&path).map(|n| (n, path)))
        .collect();
    files.sort_by_key(|(n, _)| *n);

    files
        .into_iter()
        .map(|(n, path)| {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let results: TestSetResults = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            debug!(number = n, cases = results.results.len(), "loaded results");
            Ok(results)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub metric: String,
    pub baseline: f64,
    pub current: f64,
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetDelta {
    pub test_set_id: u32,
    pub baseline: Option<f64>,
    pub current: Option<f64>,
    pub delta: Option<f64>,
}

/// Before/after view of two metric reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub metrics: Vec<MetricDelta>,
    pub per_set: Vec<SetDelta>,
}

pub fn compare(baseline: &MetricsReport, current: &MetricsReport) -> Comparison {
    let (b, c) = (&baseline.overall, &current.overall);
    let metrics = [
        ("accuracy", b.accuracy, c.accuracy),
        ("precision", b.precision, c.precision),
        ("recall", b.recall, c.recall),
        ("f1", b.f1, c.f1),
        ("specificity", b.specificity, c.specificity),
    ]
    .into_iter()
    .map(|(metric, baseline, current)| MetricDelta {
        metric: metric.to_string(),
        baseline,
        current,
        delta: current - baseline,
    })
    .collect();

    let accuracy_of = |report: &MetricsReport, id: u32| {
        report
            .per_set
            .iter()
            .find(|s| s.test_set_id == id)
            .map(|s| s.accuracy)
    };
    let ids: BTreeSet<u32> = baseline
        .per_set
        .iter()
        .chain(current.per_set.iter())
        .map(|s| s.test_set_id)
        .collect();
    let per_set = ids
        .into_iter()
        .map(|id| {
            let before = accuracy_of(baseline, id);
            let after = accuracy_of(current, id);
            SetDelta {
                test_set_id: id,
                baseline: before,
                current: after,
                delta: before.zip(after).map(|(b, a)| a - b),
            }
        })
        .collect();

    Comparison { metrics, per_set }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(expected: Label, predicted: Option<Label>, bug_type: Option<&str>) -> CaseResult {
        CaseResult {
            test_case_id: "1".into(),
            name: "case".into(),
            expected,
            predicted,
            correct: predicted == Some(expected),
            bug_count: 0,
            bugs_found: Vec::new(),
            severity_score: 0.0,
            expected_bug_type: bug_type.map(str::to_string),
            prompt: String::new(),
            error: predicted.is_none().then(|| "failed".to_string()),
            transient: false,
            latency_ms: 0,
        }
    }

    fn set(id: u32, results: Vec<CaseResult>) -> TestSetResults {
        TestSetResults {
            test_set_id: id,
            test_set_name: format!("set {}", id),
            total_cases: results.len(),
            evaluated: 0,
            errors: 0,
            correct: 0,
            accuracy: 0.0,
            timestamp: String::new(),
            results,
        }
    }

    #[test]
    fn test_confusion_ratios() {
        let m = ConfusionMatrix {
            tp: 6,
            fp: 2,
            tn: 8,
            fn_: 4,
        };
        assert_eq!(m.total(), 20);
        assert!((m.accuracy() - 0.7).abs() < 1e-9);
        assert!((m.precision() - 0.75).abs() < 1e-9);
        assert!((m.recall() - 0.6).abs() < 1e-9);
        assert!((m.specificity() - 0.8).abs() < 1e-9);
        assert!((m.f1() - 2.0 * 0.75 * 0.6 / 1.35).abs() < 1e-9);
    }

    #[test]
    fn test_zero_denominators() {
        let m = ConfusionMatrix::default();
        assert_eq!(m.accuracy(), 0.0);
        assert_eq!(m.precision(), 0.0);
        assert_eq!(m.f1(), 0.0);
    }

    #[test]
    fn test_transient_errors_excluded() {
        let mut gateway = case(Label::Bug, None, None);
        gateway.transient = true;
        let results = set(
            1,
            vec![
                case(Label::Bug, Some(Label::Bug), Some("silly_mistake")),
                case(Label::Clean, Some(Label::Clean), None),
                case(Label::Bug, None, Some("silly_mistake")),
                gateway,
            ],
        );
        let report = compute(&[results]);
        let overall = report.overall;
        assert_eq!(overall.total, 4);
        assert_eq!(overall.errors, 2);
        assert_eq!(overall.evaluated, 3);
        assert_eq!(overall.confusion.fn_, 1);
        assert!((overall.accuracy - 2.0 / 3.0).abs() < 1e-9);

        let rate = report.per_bug_type["silly_mistake"];
        assert_eq!(rate.cases, 2);
        assert_eq!(rate.detected, 1);
        assert_eq!(rate.rate, 0.5);
        assert_eq!(report.per_set[0].correct, 2);
    }

    #[test]
    fn test_compare_reports() {
        let before = compute(&[
            set(1, vec![case(Label::Bug, Some(Label::Clean), None)]),
            set(2, vec![case(Label::Clean, Some(Label::Clean), None)]),
        ]);
        let after = compute(&[
            set(1, vec![case(Label::Bug, Some(Label::Bug), None)]),
            set(3, vec![case(Label::Clean, Some(Label::Clean), None)]),
        ]);
        let comparison = compare(&before, &after);

        let accuracy = &comparison.metrics[0];
        assert_eq!(accuracy.metric, "accuracy");
        assert_eq!(accuracy.baseline, 0.5);
        assert_eq!(accuracy.current, 1.0);
        assert_eq!(accuracy.delta, 0.5);

        let ids: Vec<u32> = comparison.per_set.iter().map(|s| s.test_set_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(comparison.per_set[0].delta, Some(1.0));
        assert_eq!(comparison.per_set[1].current, None);
        assert_eq!(comparison.per_set[2].delta, None);
    }

    #[test]
    fn test_results_number() {
        assert_eq!(results_number(Path::new("test_set_7_results.json")), Some(7));
        assert_eq!(results_number(Path::new("summary.json")), None);
        assert_eq!(results_number(Path::new("test_set_7.json")), None);
    }
}
