//! Core types for detection results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Severity levels for findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Severity::Error),
            "warning" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            _ => Err(format!("unknown severity: {}", s)),
        }
    }
}

/// Bug taxonomy for LLM-generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BugPattern {
    SyntaxError,
    HallucinatedObject,
    IncompleteGeneration,
    SillyMistake,
    WrongAttribute,
    WrongInputType,
    NonPromptedConsideration,
    PromptBiased,
    MissingCornerCase,
    Misinterpretation,
    MissingFeature,
    RuntimeError,
}

impl BugPattern {
    pub const ALL: [BugPattern; 12] = [
        BugPattern::SyntaxError,
        BugPattern::HallucinatedObject,
        BugPattern::IncompleteGeneration,
        BugPattern::SillyMistake,
        BugPattern::WrongAttribute,
        BugPattern::WrongInputType,
        BugPattern::NonPromptedConsideration,
        BugPattern::PromptBiased,
        BugPattern::MissingCornerCase,
        BugPattern::Misinterpretation,
        BugPattern::MissingFeature,
        BugPattern::RuntimeError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BugPattern::SyntaxError => "syntax_error",
            BugPattern::HallucinatedObject => "hallucinated_object",
            BugPattern::IncompleteGeneration => "incomplete_generation",
            BugPattern::SillyMistake => "silly_mistake",
            BugPattern::WrongAttribute => "wrong_attribute",
            BugPattern::WrongInputType => "wrong_input_type",
            BugPattern::NonPromptedConsideration => "non_prompted_consideration",
            BugPattern::PromptBiased => "prompt_biased",
            BugPattern::MissingCornerCase => "missing_corner_case",
            BugPattern::Misinterpretation => "misinterpretation",
            BugPattern::MissingFeature => "missing_feature",
            BugPattern::RuntimeError => "runtime_error",
        }
    }

    /// Parse a pattern name. Accepts the display names some services return
    /// ("Hallucinated Object", "wrong-attribute").
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        BugPattern::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
    }
}

impl std::fmt::Display for BugPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which analysis layer produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Static,
    Dynamic,
    Llm,
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Layer::Static => write!(f, "static"),
            Layer::Dynamic => write!(f, "dynamic"),
            Layer::Llm => write!(f, "llm"),
        }
    }
}

/// A single detected issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub pattern: BugPattern,
    pub message: String,
    /// 1-indexed line, 0 when the finding is not tied to a line.
    pub line: usize,
    pub severity: Severity,
    pub layer: Layer,
    /// 0.0 to 1.0.
    pub confidence: f64,
}

impl Finding {
    /// A static-layer finding at full confidence.
    pub fn new(
        pattern: BugPattern,
        severity: Severity,
        line: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            pattern,
            message: message.into(),
            line,
            severity,
            layer: Layer::Static,
            confidence: 1.0,
        }
    }

    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Create a unique key for this finding (for deduplication).
    pub fn key(&self) -> String {
        format!("{}|{}|{}", self.pattern, self.line, self.message)
    }
}

/// Results of running detection over one code sample.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionResult {
    pub findings: Vec<Finding>,
    /// Third-party top-level packages that still need a registry check.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports_to_verify: Vec<String>,
}

impl DetectionResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge another result into this one, dropping duplicate findings.
    pub fn merge(&mut self, other: DetectionResult) {
        for finding in other.findings {
            self.add(finding);
        }
        for package in other.imports_to_verify {
            if !self.imports_to_verify.contains(&package) {
                self.imports_to_verify.push(package);
            }
        }
    }

    /// Add a finding unless an identical one is already present.
    pub fn add(&mut self, finding: Finding) {
        let key = finding.key();
        if !self.findings.iter().any(|f| f.key() == key) {
            self.findings.push(finding);
        }
    }

    pub fn extend(&mut self, findings: impl IntoIterator<Item = Finding>) {
        for finding in findings {
            self.add(finding);
        }
    }

    /// Check if there are any error-severity findings.
    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }

    /// Distinct patterns found, in taxonomy order.
    pub fn patterns(&self) -> Vec<BugPattern> {
        let mut patterns: Vec<BugPattern> = self.findings.iter().map(|f| f.pattern).collect();
        patterns.sort();
        patterns.dedup();
        patterns
    }

    /// Number of findings per pattern.
    pub fn pattern_counts(&self) -> BTreeMap<BugPattern, usize> {
        let mut counts = BTreeMap::new();
        for finding in &self.findings {
            *counts.entry(finding.pattern).or_insert(0) += 1;
        }
        counts
    }

    /// Sort findings by line, then pattern.
    pub fn sort(&mut self) {
        self.findings.sort_by(|a, b| {
            a.line
                .cmp(&b.line)
                .then_with(|| a.pattern.cmp(&b.pattern))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_parse() {
        assert_eq!(
            BugPattern::parse("hallucinated_object"),
            Some(BugPattern::HallucinatedObject)
        );
        assert_eq!(
            BugPattern::parse("Wrong Attribute"),
            Some(BugPattern::WrongAttribute)
        );
        assert_eq!(
            BugPattern::parse("missing-corner-case"),
            Some(BugPattern::MissingCornerCase)
        );
        assert_eq!(BugPattern::parse("off_by_one"), None);
    }

    #[test]
    fn test_pattern_serde() {
        let json = serde_json::to_string(&BugPattern::NonPromptedConsideration).unwrap();
        assert_eq!(json, "\"non_prompted_consideration\"");
    }

    #[test]
    fn test_merge_dedupes() {
        let finding = Finding::new(BugPattern::SyntaxError, Severity::Error, 3, "invalid syntax");

        let mut a = DetectionResult::new();
        a.add(finding.clone());
        a.imports_to_verify.push("requests".to_string());

        let mut b = DetectionResult::new();
        b.add(finding);
        b.add(Finding::new(
            BugPattern::SillyMistake,
            Severity::Warning,
            5,
            "x compared with itself",
        ));
        b.imports_to_verify.push("requests".to_string());

        a.merge(b);
        assert_eq!(a.findings.len(), 2);
        assert_eq!(a.imports_to_verify, vec!["requests"]);
        assert!(a.has_errors());
        assert_eq!(
            a.patterns(),
            vec![BugPattern::SyntaxError, BugPattern::SillyMistake]
        );
    }

    #[test]
    fn test_confidence_clamped() {
        let f = Finding::new(BugPattern::RuntimeError, Severity::Error, 0, "boom")
            .with_confidence(1.7);
        assert_eq!(f.confidence, 1.0);
    }
}
