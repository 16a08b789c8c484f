//! Static analyzer that runs the enabled detectors over code samples.

use rayon::prelude::*;
use tracing::debug;

use crate::analysis::PythonAnalyzer;
use crate::config::DetectorConfig;

use super::{
    detect_hallucinations, detect_incomplete_generation, detect_missing_corner_cases,
    detect_prompt_bias, detect_silly_mistakes, detect_syntax_errors, detect_wrong_attributes,
    detect_wrong_input_types, DetectionResult,
};

/// One code sample, optionally with the prompt it was generated from.
#[derive(Debug, Clone, Default)]
pub struct Sample {
    pub code: String,
    pub prompt: Option<String>,
}

impl Sample {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            prompt: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}

/// Executes the static detector layer.
pub struct StaticAnalyzer {
    analyzer: PythonAnalyzer,
    config: DetectorConfig,
}

impl Default for StaticAnalyzer {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

impl StaticAnalyzer {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            analyzer: PythonAnalyzer::new(),
            config,
        }
    }

    /// Run every enabled detector over one sample.
    pub fn analyze(&self, code: &str, prompt: Option<&str>) -> anyhow::Result<DetectionResult> {
        let facts = self.analyzer.analyze(code)?;
        let cfg = &self.config;
        let mut result = DetectionResult::new();

        if cfg.syntax {
            result.extend(detect_syntax_errors(&facts));
        }
        if cfg.incomplete {
            result.extend(detect_incomplete_generation(&facts));
        }
        if cfg.hallucination {
            result.merge(detect_hallucinations(&facts));
        }
        if cfg.attributes {
            result.extend(detect_wrong_attributes(&facts));
        }
        if cfg.input_types {
            result.extend(detect_wrong_input_types(&facts));
        }
        if cfg.silly {
            result.extend(detect_silly_mistakes(&facts));
        }
        if cfg.corner_cases {
            result.extend(detect_missing_corner_cases(&facts));
        }
        if cfg.prompt_bias {
            if let Some(prompt) = prompt {
                result.extend(detect_prompt_bias(&facts, prompt));
            }
        }

        result.sort();
        debug!(
            findings = result.findings.len(),
            imports_to_verify = result.imports_to_verify.len(),
            "static analysis finished"
        );
        Ok(result)
    }

    /// Analyze many samples in parallel. Results keep the input order.
    pub fn analyze_batch(&self, samples: &[Sample]) -> Vec<anyhow::Result<DetectionResult>> {
        samples
            .par_iter()
            .map(|sample| self.analyze(&sample.code, sample.prompt.as_deref()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BugPattern;

    #[test]
    fn test_clean_sample() {
        let source = r#"
def mean(values):
    if not values:
        return 0.0
    return sum(values) / len(values)
"#;
        let result = StaticAnalyzer::default().analyze(source, None).unwrap();
        assert!(result.findings.is_empty(), "{:?}", result.findings);
    }

    #[test]
    fn test_findings_sorted_by_line() {
        let source = "stack = []\nstack.push(1)\nx = y + 1\nif x == x:\n    pass\n";
        let result = StaticAnalyzer::default().analyze(source, None).unwrap();
        let lines: Vec<usize> = result.findings.iter().map(|f| f.line).collect();
        let mut sorted = lines.clone();
        sorted.sort();
        assert_eq!(lines, sorted);
        assert_eq!(
            result.patterns(),
            vec![
                BugPattern::HallucinatedObject,
                BugPattern::SillyMistake,
                BugPattern::WrongAttribute
            ]
        );
    }

    #[test]
    fn test_disabled_detector() {
        let config = DetectorConfig {
            attributes: false,
            ..Default::default()
        };
        let result = StaticAnalyzer::new(config)
            .analyze("stack = []\nstack.push(1)\n", None)
            .unwrap();
        assert!(result.findings.is_empty());
    }

    #[test]
    fn test_prompt_bias_needs_prompt() {
        let source = "def answer():\n    return 'forty two'\n";
        let analyzer = StaticAnalyzer::default();
        assert!(analyzer.analyze(source, None).unwrap().findings.is_empty());
        let biased = analyzer
            .analyze(source, Some("answer() should return 'forty two'"))
            .unwrap();
        assert_eq!(biased.patterns(), vec![BugPattern::PromptBiased]);
    }

    #[test]
    fn test_batch_preserves_order() {
        let samples = vec![
            Sample::new("x = 1\n"),
            Sample::new("def f(:\n"),
            Sample::new("n = len(5)\n"),
        ];
        let results = StaticAnalyzer::default().analyze_batch(&samples);
        assert_eq!(results.len(), 3);
        assert!(results[0].as_ref().unwrap().findings.is_empty());
        assert!(results[1]
            .as_ref()
            .unwrap()
            .patterns()
            .contains(&BugPattern::SyntaxError));
        assert_eq!(
            results[2].as_ref().unwrap().patterns(),
            vec![BugPattern::WrongInputType]
        );
    }
}
