//! Fusion of static, dynamic and LLM signals into a bug/clean verdict.
//!
//! Each finding contributes its pattern's points, scaled by the finding's
//! confidence and severity. The LLM's own 0-10 severity acts as a floor when
//! it reported anything.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::VerdictConfig;
use crate::detect::{BugPattern, Finding, Layer, Severity};

/// Point weights for each bug pattern.
pub mod points {
    pub const SYNTAX_ERROR: f64 = 10.0;
    pub const HALLUCINATED_OBJECT: f64 = 8.0;
    pub const WRONG_ATTRIBUTE: f64 = 8.0;
    pub const WRONG_INPUT_TYPE: f64 = 8.0;
    pub const RUNTIME_ERROR: f64 = 8.0;
    pub const INCOMPLETE_GENERATION: f64 = 6.0;
    pub const MISINTERPRETATION: f64 = 5.0;
    pub const SILLY_MISTAKE: f64 = 4.0;
    pub const MISSING_CORNER_CASE: f64 = 4.0;
    pub const MISSING_FEATURE: f64 = 4.0;
    pub const PROMPT_BIASED: f64 = 3.0;
    pub const NON_PROMPTED_CONSIDERATION: f64 = 2.0;
}

/// Highest possible severity score.
pub const MAX_SCORE: f64 = 10.0;

pub fn points_for(pattern: BugPattern) -> f64 {
    match pattern {
        BugPattern::SyntaxError => points::SYNTAX_ERROR,
        BugPattern::HallucinatedObject => points::HALLUCINATED_OBJECT,
        BugPattern::WrongAttribute => points::WRONG_ATTRIBUTE,
        BugPattern::WrongInputType => points::WRONG_INPUT_TYPE,
        BugPattern::RuntimeError => points::RUNTIME_ERROR,
        BugPattern::IncompleteGeneration => points::INCOMPLETE_GENERATION,
        BugPattern::Misinterpretation => points::MISINTERPRETATION,
        BugPattern::SillyMistake => points::SILLY_MISTAKE,
        BugPattern::MissingCornerCase => points::MISSING_CORNER_CASE,
        BugPattern::MissingFeature => points::MISSING_FEATURE,
        BugPattern::PromptBiased => points::PROMPT_BIASED,
        BugPattern::NonPromptedConsideration => points::NON_PROMPTED_CONSIDERATION,
    }
}

fn severity_weight(severity: Severity) -> f64 {
    match severity {
        Severity::Error => 1.0,
        Severity::Warning => 0.5,
        Severity::Info => 0.1,
    }
}

/// Contribution of one finding to the severity score.
pub fn finding_points(finding: &Finding) -> f64 {
    points_for(finding.pattern) * finding.confidence * severity_weight(finding.severity)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Bug,
    Clean,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Bug => "bug",
            Label::Clean => "clean",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "bug" | "buggy" => Some(Label::Bug),
            "clean" => Some(Label::Clean),
            _ => None,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The final classification of one sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub label: Label,
    /// 0 to 10, one decimal place.
    pub severity_score: f64,
    pub findings: Vec<Finding>,
    pub pattern_counts: BTreeMap<BugPattern, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_severity: Option<f64>,
    pub threshold: f64,
}

impl Verdict {
    pub fn is_bug(&self) -> bool {
        self.label == Label::Bug
    }

    /// Distinct patterns, in taxonomy order.
    pub fn patterns(&self) -> Vec<BugPattern> {
        self.pattern_counts.keys().copied().collect()
    }
}

/// Combine all findings into a verdict.
///
/// `llm_severity` only counts when the LLM layer produced at least one
/// finding.
pub fn fuse(
    findings: Vec<Finding>,
    llm_severity: Option<f64>,
    config: &VerdictConfig,
) -> Verdict {
    let sum: f64 = findings.iter().map(finding_points).sum();

    let llm_reported = findings.iter().any(|f| f.layer == Layer::Llm);
    let llm_floor = llm_severity
        .filter(|_| llm_reported)
        .map_or(0.0, |s| s.clamp(0.0, MAX_SCORE));

    let severity_score = round1(sum.max(llm_floor).min(MAX_SCORE));

    let hard_error = findings
        .iter()
        .any(|f| f.severity == Severity::Error && f.layer != Layer::Llm);
    let over_threshold = !findings.is_empty() && severity_score >= config.bug_threshold;
    let label = if hard_error || over_threshold {
        Label::Bug
    } else {
        Label::Clean
    };

    let mut pattern_counts = BTreeMap::new();
    for finding in &findings {
        *pattern_counts.entry(finding.pattern).or_insert(0) += 1;
    }

    Verdict {
        label,
        severity_score,
        findings,
        pattern_counts,
        llm_severity,
        threshold: config.bug_threshold,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
