//! Semantic checks that need a language model: unrequested additions,
//! hardcoded prompt examples, missing features and misread intent.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::detect::{BugPattern, DetectionResult, Finding, Layer, Severity};

use super::{LlmClient, NoopLlmClient};

/// Confidence assigned to LLM findings when the model does not report one.
const DEFAULT_CONFIDENCE: f64 = 0.98;
/// Confidence of the single finding built from an unparsable answer.
const UNSTRUCTURED_CONFIDENCE: f64 = 0.7;
const UNSTRUCTURED_EXCERPT_CHARS: usize = 500;

/// Outcome of one LLM analysis.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SemanticAnalysis {
    pub findings: Vec<Finding>,
    /// Model-reported severity, 0 to 10.
    pub severity: f64,
    pub summary: String,
    pub confidence: f64,
    /// Only set by [`LlmReasoner::verify_misinterpretation`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_interpretation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub raw_response: Option<String>,
}

impl SemanticAnalysis {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn found(&self) -> bool {
        !self.findings.is_empty()
    }
}

#[derive(Deserialize)]
struct DeepAnswer {
    npc_issues: Vec<Value>,
    prompt_bias_issues: Vec<Value>,
    missing_features: Vec<Value>,
    misinterpretation: Vec<Value>,
    #[serde(default)]
    severity: Option<Value>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    confidence: Option<Value>,
}

#[derive(Deserialize)]
struct IntentAnswer {
    #[serde(default)]
    correct_interpretation: Option<bool>,
    #[serde(default)]
    mismatches: Vec<Value>,
    #[serde(default)]
    severity: Option<Value>,
}

pub struct LlmReasoner {
    client: Arc<dyn LlmClient>,
}

impl LlmReasoner {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopLlmClient))
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_enabled()
    }

    /// Ask the model for every semantic issue class at once. Findings of the
    /// earlier layers are summarized into the question.
    pub async fn deep_semantic_analysis(
        &self,
        prompt: &str,
        code: &str,
        previous: Option<&DetectionResult>,
    ) -> SemanticAnalysis {
        if !self.is_enabled() {
            return SemanticAnalysis::failed("LLM not enabled");
        }

        let question = deep_question(prompt, code, previous);
        let answer = match self.client.ask(&question).await {
            Ok(answer) if answer.trim().is_empty() => {
                return SemanticAnalysis::failed("no response from LLM")
            }
            Ok(answer) => answer,
            Err(e) => {
                warn!(provider = self.client.name(), error = %e, "LLM request failed");
                return SemanticAnalysis::failed(format!("{:#}", e));
            }
        };

        let analysis = parse_deep_answer(&answer);
        debug!(
            findings = analysis.findings.len(),
            severity = analysis.severity,
            "semantic analysis finished"
        );
        analysis
    }

    /// Focused check that the code implements what was asked.
    pub async fn verify_misinterpretation(&self, prompt: &str, code: &str) -> SemanticAnalysis {
        if !self.is_enabled() {
            return SemanticAnalysis::failed("LLM not enabled");
        }

        let question = intent_question(prompt, code);
        match self.client.ask(&question).await {
            Ok(answer) => parse_intent_answer(&answer),
            Err(e) => {
                warn!(provider = self.client.name(), error = %e, "LLM request failed");
                SemanticAnalysis::failed(format!("{:#}", e))
            }
        }
    }
}

/// Body of the first fenced block, preferring one tagged `json`.
pub fn strip_code_fences(answer: &str) -> &str {
    fenced(answer, "```json")
        .or_else(|| fenced(answer, "```"))
        .unwrap_or_else(|| answer.trim())
}

fn fenced<'a>(answer: &'a str, open: &str) -> Option<&'a str> {
    let start = answer.find(open)? + open.len();
    let rest = &answer[start..];
    let end = rest.find("```").unwrap_or(rest.len());
    Some(rest[..end].trim())
}

fn parse_deep_answer(answer: &str) -> SemanticAnalysis {
    let body = strip_code_fences(answer);
    let parsed: DeepAnswer = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) => {
            let excerpt: String = answer.chars().take(UNSTRUCTURED_EXCERPT_CHARS).collect();
            return SemanticAnalysis {
                findings: vec![Finding::new(
                    BugPattern::Misinterpretation,
                    Severity::Info,
                    0,
                    excerpt,
                )
                .with_layer(Layer::Llm)
                .with_confidence(UNSTRUCTURED_CONFIDENCE)],
                confidence: UNSTRUCTURED_CONFIDENCE,
                error: Some(format!("JSON parse error: {}", e)),
                raw_response: Some(answer.to_string()),
                ..Default::default()
            };
        }
    };

    let confidence = parsed
        .confidence
        .as_ref()
        .and_then(number)
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(DEFAULT_CONFIDENCE);

    let groups = [
        (
            parsed.npc_issues,
            BugPattern::NonPromptedConsideration,
            Severity::Warning,
        ),
        (
            parsed.prompt_bias_issues,
            BugPattern::PromptBiased,
            Severity::Warning,
        ),
        (
            parsed.missing_features,
            BugPattern::MissingFeature,
            Severity::Error,
        ),
        (
            parsed.misinterpretation,
            BugPattern::Misinterpretation,
            Severity::Error,
        ),
    ];

    let findings = groups
        .into_iter()
        .flat_map(|(issues, pattern, severity)| {
            issues.into_iter().filter_map(move |issue| {
                issue_text(&issue).map(|text| {
                    Finding::new(pattern, severity, 0, text)
                        .with_layer(Layer::Llm)
                        .with_confidence(confidence)
                })
            })
        })
        .collect();

    SemanticAnalysis {
        findings,
        severity: parsed.severity.as_ref().map_or(0.0, severity_value),
        summary: parsed.summary.unwrap_or_default(),
        confidence,
        raw_response: Some(answer.to_string()),
        ..Default::default()
    }
}

fn parse_intent_answer(answer: &str) -> SemanticAnalysis {
    let parsed: IntentAnswer = match serde_json::from_str(strip_code_fences(answer)) {
        Ok(parsed) => parsed,
        Err(e) => return SemanticAnalysis::failed(format!("JSON parse error: {}", e)),
    };

    let findings = parsed
        .mismatches
        .iter()
        .filter_map(issue_text)
        .map(|text| {
            Finding::new(BugPattern::Misinterpretation, Severity::Error, 0, text)
                .with_layer(Layer::Llm)
                .with_confidence(DEFAULT_CONFIDENCE)
        })
        .collect();

    SemanticAnalysis {
        findings,
        severity: parsed.severity.as_ref().map_or(0.0, severity_value),
        confidence: DEFAULT_CONFIDENCE,
        correct_interpretation: Some(parsed.correct_interpretation.unwrap_or(true)),
        raw_response: Some(answer.to_string()),
        ..Default::default()
    }
}

/// Models return issues as strings, or sometimes as small objects.
fn issue_text(issue: &Value) -> Option<String> {
    let text = match issue {
        Value::String(s) => s.trim().to_string(),
        Value::Null => return None,
        Value::Object(map) => ["description", "message", "issue"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| issue.to_string()),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn severity_value(value: &Value) -> f64 {
    number(value).map_or(0.0, |s| s.clamp(0.0, 10.0))
}

fn previous_context(previous: Option<&DetectionResult>) -> String {
    let Some(previous) = previous.filter(|p| !p.findings.is_empty()) else {
        return String::new();
    };
    let mut context = format!(
        "\n\nPREVIOUS ANALYSIS FINDINGS ({} issues):\n",
        previous.findings.len()
    );
    for finding in previous.findings.iter().take(20) {
        context.push_str(&format!(
            "- [{} {}] line {}: {}\n",
            finding.layer, finding.pattern, finding.line, finding.message
        ));
    }
    context
}

fn deep_question(prompt: &str, code: &str, previous: Option<&DetectionResult>) -> String {
    format!(
        r#"You are a code analysis expert. Analyze this code for semantic bugs and misinterpretations.

USER'S ORIGINAL PROMPT:
{prompt}

GENERATED CODE:
```python
{code}
```{context}

DEFINITIONS:

1. Non-prompted consideration: functionality the prompt did NOT ask for (extra logging,
   validation, caching, ...). Report only truly unrequested additions.
2. Prompt-biased code: hardcoded values from the prompt's examples instead of general logic,
   e.g. code that only works for the example input.
3. Missing features: features the prompt EXPLICITLY requested that the code does not implement.
   Do not report general best practices. For a minimal prompt this list should be empty.
4. Misinterpretation: the code does something fundamentally different from what was asked,
   e.g. returns the sum when the average was requested.

Be conservative. Unrequested edge-case handling is a non-prompted consideration, not a missing feature.

Return ONLY valid JSON in this exact format:
{{
    "npc_issues": ["..."],
    "prompt_bias_issues": ["..."],
    "missing_features": ["..."],
    "misinterpretation": ["..."],
    "severity": 0-10,
    "summary": "brief semantic analysis summary",
    "confidence": 0.0-1.0
}}"#,
        prompt = prompt,
        code = code,
        context = previous_context(previous),
    )
}

fn intent_question(prompt: &str, code: &str) -> String {
    format!(
        r#"Does this code correctly implement what the user asked for?

USER ASKED FOR:
{prompt}

CODE GENERATED:
```python
{code}
```

Check whether the code does what was asked, whether it makes assumptions that do not match
the request, and whether the approach is appropriate.

Return JSON:
{{
    "correct_interpretation": true/false,
    "mismatches": ["list of intent mismatches"],
    "severity": 0-10
}}"#,
        prompt = prompt,
        code = code,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies with canned answers and records the questions.
    struct ScriptedClient {
        answer: Result<String, String>,
        questions: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn replying(answer: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: Ok(answer.to_string()),
                questions: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn ask(&self, question: &str) -> anyhow::Result<String> {
            self.questions.lock().unwrap().push(question.to_string());
            self.answer.clone().map_err(anyhow::Error::msg)
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_parses_fenced_json_answer() {
        let answer = r#"Here you go:
```json
{"npc_issues": ["prints debug output"], "prompt_bias_issues": [], "missing_features": [],
 "misinterpretation": ["returns the sum instead of the average"], "severity": 7,
 "summary": "computes the wrong statistic", "confidence": 0.9}
```"#;
        let reasoner = LlmReasoner::new(ScriptedClient::replying(answer));
        let analysis = reasoner
            .deep_semantic_analysis("average a list", "def f(x): return sum(x)", None)
            .await;

        assert!(analysis.error.is_none());
        assert_eq!(analysis.findings.len(), 2);
        assert_eq!(analysis.findings[0].pattern, BugPattern::NonPromptedConsideration);
        assert_eq!(analysis.findings[1].pattern, BugPattern::Misinterpretation);
        assert!(analysis.findings.iter().all(|f| f.layer == Layer::Llm));
        assert_eq!(analysis.findings[1].confidence, 0.9);
        assert_eq!(analysis.severity, 7.0);
        assert_eq!(analysis.summary, "computes the wrong statistic");
    }

    #[tokio::test]
    async fn test_default_confidence_when_missing() {
        let answer = r#"{"npc_issues": [], "prompt_bias_issues": ["only handles [3, 1, 2]"],
            "missing_features": [], "misinterpretation": []}"#;
        let analysis = LlmReasoner::new(ScriptedClient::replying(answer))
            .deep_semantic_analysis("sort [3, 1, 2]", "def s(): return [1, 2, 3]", None)
            .await;
        assert_eq!(analysis.confidence, DEFAULT_CONFIDENCE);
        assert_eq!(analysis.findings[0].pattern, BugPattern::PromptBiased);
    }

    #[tokio::test]
    async fn test_unparsable_answer_becomes_single_finding() {
        let long = "The code looks mostly fine but ".repeat(40);
        let analysis = LlmReasoner::new(ScriptedClient::replying(&long))
            .deep_semantic_analysis("p", "c", None)
            .await;
        assert_eq!(analysis.findings.len(), 1);
        assert_eq!(analysis.confidence, UNSTRUCTURED_CONFIDENCE);
        assert_eq!(analysis.findings[0].message.chars().count(), 500);
        assert!(analysis.error.unwrap().starts_with("JSON parse error"));
    }

    #[tokio::test]
    async fn test_missing_required_keys_is_unstructured() {
        let analysis = LlmReasoner::new(ScriptedClient::replying(r#"{"severity": 3}"#))
            .deep_semantic_analysis("p", "c", None)
            .await;
        assert_eq!(analysis.confidence, UNSTRUCTURED_CONFIDENCE);
    }

    #[tokio::test]
    async fn test_transport_error_is_empty_analysis() {
        let client = Arc::new(ScriptedClient {
            answer: Err("connection refused".to_string()),
            questions: Mutex::new(Vec::new()),
        });
        let analysis = LlmReasoner::new(client)
            .deep_semantic_analysis("p", "c", None)
            .await;
        assert!(!analysis.found());
        assert!(analysis.error.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_disabled_reasoner_has_zero_confidence() {
        let reasoner = LlmReasoner::disabled();
        let analysis = reasoner.deep_semantic_analysis("p", "c", None).await;
        assert_eq!(analysis.confidence, 0.0);
        assert!(!analysis.found());
        assert_eq!(
            reasoner.verify_misinterpretation("p", "c").await.confidence,
            0.0
        );
    }

    #[tokio::test]
    async fn test_previous_findings_are_included_in_question() {
        let client = ScriptedClient::replying("{}");
        let reasoner = LlmReasoner::new(client.clone());
        let mut previous = DetectionResult::new();
        previous.add(Finding::new(
            BugPattern::WrongAttribute,
            Severity::Error,
            3,
            "'list' object has no attribute 'push'",
        ));
        reasoner
            .deep_semantic_analysis("p", "c", Some(&previous))
            .await;
        let questions = client.questions.lock().unwrap();
        assert!(questions[0].contains("PREVIOUS ANALYSIS FINDINGS (1 issues)"));
        assert!(questions[0].contains("wrong_attribute"));
    }

    #[tokio::test]
    async fn test_verify_misinterpretation_reports_mismatches() {
        let answer = "```json\n{\"correct_interpretation\": false, \"mismatches\": [\"sorts instead of removing duplicates\"], \"severity\": 8}\n```";
        let analysis = LlmReasoner::new(ScriptedClient::replying(answer))
            .verify_misinterpretation("remove duplicates", "sorted(x)")
            .await;
        assert_eq!(analysis.correct_interpretation, Some(false));
        assert_eq!(analysis.findings.len(), 1);
        assert_eq!(analysis.findings[0].severity, Severity::Error);
        assert_eq!(analysis.severity, 8.0);
    }

    #[test]
    fn test_strips_plain_fences() {
        assert_eq!(strip_code_fences("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("  {}  "), "{}");
    }
}
