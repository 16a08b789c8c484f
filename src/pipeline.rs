//! Local analysis: every layer in order, then fusion.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::detect::{DetectionResult, Sample, StaticAnalyzer};
use crate::dynamic::{DynamicAnalyzer, RuntimeReport};
use crate::llm::{build_client, LlmReasoner, LlmSettings, SemanticAnalysis};
use crate::registry::{verify_imports, RegistryClient};
use crate::verdict::{fuse, Verdict};

/// One sample to analyze.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub code: String,
    pub prompt: Option<String>,
}

impl AnalysisRequest {
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

/// Switches applied on top of the configuration, usually from CLI flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    /// Turn the LLM layer on even if the config leaves it off.
    pub with_llm: bool,
    pub skip_dynamic: bool,
    pub skip_registry: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub verdict: Verdict,
    #[serde(rename = "static")]
    pub static_result: DetectionResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<RuntimeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic: Option<SemanticAnalysis>,
    #[serde(rename = "latency_ms", serialize_with = "as_millis")]
    pub latency: Duration,
}

fn request_prompt(request: &AnalysisRequest) -> Option<&str> {
    request.prompt.as_deref().filter(|p| !p.trim().is_empty())
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

pub struct AnalysisPipeline {
    config: Config,
    static_analyzer: StaticAnalyzer,
    registry: Option<RegistryClient>,
    dynamic: Option<DynamicAnalyzer>,
    reasoner: LlmReasoner,
}

impl AnalysisPipeline {
    pub fn new(config: &Config, options: PipelineOptions) -> Result<Self> {
        let registry = if config.registry.enabled && !options.skip_registry {
            Some(
                RegistryClient::new(config.registry.clone())
                    .context("failed to create registry client")?,
            )
        } else {
            None
        };

        let dynamic = (config.dynamic.enabled && !options.skip_dynamic)
            .then(|| DynamicAnalyzer::new(config.dynamic.clone()));

        let reasoner = if config.llm.enabled || options.with_llm {
            let settings = LlmSettings::resolve(&config.llm)?;
            LlmReasoner::new(build_client(&settings)?)
        } else {
            LlmReasoner::disabled()
        };

        info!(
            registry = registry.is_some(),
            dynamic = dynamic.is_some(),
            llm = reasoner.is_enabled(),
            "analysis pipeline ready"
        );

        Ok(Self {
            config: config.clone(),
            static_analyzer: StaticAnalyzer::new(config.detectors.clone()),
            registry,
            dynamic,
            reasoner,
        })
    }

    /// Static layers only; no network, no processes.
    pub fn static_only(config: &Config) -> Self {
        Self {
            config: config.clone(),
            static_analyzer: StaticAnalyzer::new(config.detectors.clone()),
            registry: None,
            dynamic: None,
            reasoner: LlmReasoner::disabled(),
        }
    }

    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisOutcome> {
        let span = info_span!("analyze", bytes = request.code.len());
        self.analyze_inner(request).instrument(span).await
    }

    async fn analyze_inner(&self, request: &AnalysisRequest) -> Result<AnalysisOutcome> {
        let started = Instant::now();
        let static_result = self
            .static_analyzer
            .analyze(&request.code, request_prompt(request))?;
        self.finish(request, static_result, started).await
    }

    /// Analyze many samples. The static layer runs on the rayon pool; the
    /// remaining layers run `concurrency` samples at a time. Results keep the
    /// input order.
    pub async fn analyze_batch(
        &self,
        requests: &[AnalysisRequest],
        concurrency: usize,
    ) -> Vec<Result<AnalysisOutcome>> {
        let started = Instant::now();
        let samples: Vec<Sample> = requests
            .iter()
            .map(|r| Sample {
                code: r.code.clone(),
                prompt: request_prompt(r).map(str::to_string),
            })
            .collect();
        let static_results = self.static_analyzer.analyze_batch(&samples);
        debug!(
            samples = samples.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "static layer finished for batch"
        );

        stream::iter(requests.iter().zip(static_results))
            .map(|(request, static_result)| async move {
                self.finish(request, static_result?, started).await
            })
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    async fn finish(
        &self,
        request: &AnalysisRequest,
        mut static_result: DetectionResult,
        started: Instant,
    ) -> Result<AnalysisOutcome> {
        let prompt = request_prompt(request);

        if let Some(registry) = &self.registry {
            if !static_result.imports_to_verify.is_empty() {
                let findings = verify_imports(registry, &static_result.imports_to_verify).await;
                debug!(count = findings.len(), "registry findings");
                static_result.extend(findings);
                static_result.sort();
            }
        }

        let mut findings = static_result.findings.clone();

        let runtime = match &self.dynamic {
            Some(dynamic) => {
                let report = dynamic.analyze(&request.code).await;
                findings.extend(report.findings.iter().cloned());
                Some(report)
            }
            None => None,
        };

        let semantic = match prompt {
            Some(prompt) if self.reasoner.is_enabled() => {
                let mut previous = static_result.clone();
                if let Some(report) = &runtime {
                    previous.extend(report.findings.iter().cloned());
                }
                let analysis = self
                    .reasoner
                    .deep_semantic_analysis(prompt, &request.code, Some(&previous))
                    .await;
                if let Some(error) = &analysis.error {
                    warn!(error = %error, "LLM layer produced no judgment");
                }
                findings.extend(analysis.findings.iter().cloned());
                Some(analysis)
            }
            _ => None,
        };

        let llm_severity = semantic
            .as_ref()
            .filter(|s| s.error.is_none())
            .map(|s| s.severity);
        let verdict = fuse(findings, llm_severity, &self.config.verdict);
        let latency = started.elapsed();

        debug!(
            label = %verdict.label,
            score = verdict.severity_score,
            findings = verdict.findings.len(),
            latency_ms = latency.as_millis() as u64,
            "analysis finished"
        );

        Ok(AnalysisOutcome {
            verdict,
            static_result,
            runtime,
            semantic,
            latency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BugPattern;
    use crate::verdict::Label;

    fn offline_config() -> Config {
        let mut config = Config::default();
        config.registry.enabled = false;
        config.dynamic.enabled = false;
        config.llm.enabled = false;
        config
    }

    #[tokio::test]
    async fn test_clean_code_is_clean() {
        let pipeline = AnalysisPipeline::new(&offline_config(), PipelineOptions::default()).unwrap();
        let request = AnalysisRequest::new("def add(a, b):\n    return a + b\n")
            .with_prompt("Add two numbers.");
        let outcome = pipeline.analyze(&request).await.unwrap();
        assert_eq!(outcome.verdict.label, Label::Clean);
        assert!(outcome.runtime.is_none());
        assert!(outcome.semantic.is_none());
    }

    #[tokio::test]
    async fn test_syntax_error_is_bug() {
        let pipeline = AnalysisPipeline::static_only(&offline_config());
        let outcome = pipeline
            .analyze(&AnalysisRequest::new("def broken(:\n    pass\n"))
            .await
            .unwrap();
        assert!(outcome.verdict.is_bug());
        assert!(outcome.verdict.patterns().contains(&BugPattern::SyntaxError));
    }

    #[tokio::test]
    async fn test_skip_flags_disable_layers() {
        let mut config = Config::default();
        config.llm.enabled = false;
        let options = PipelineOptions {
            skip_dynamic: true,
            skip_registry: true,
            ..Default::default()
        };
        let pipeline = AnalysisPipeline::new(&config, options).unwrap();
        assert!(pipeline.registry.is_none());
        assert!(pipeline.dynamic.is_none());
    }

    #[tokio::test]
    async fn test_batch_keeps_input_order() {
        let pipeline = AnalysisPipeline::static_only(&offline_config());
        let requests = vec![
            AnalysisRequest::new("x = 1\n"),
            AnalysisRequest::new("def f(:\n"),
            AnalysisRequest::new("y = 2\n"),
        ];
        let outcomes = pipeline.analyze_batch(&requests, 2).await;
        let labels: Vec<Label> = outcomes
            .into_iter()
            .map(|o| o.unwrap().verdict.label)
            .collect();
        assert_eq!(labels, vec![Label::Clean, Label::Bug, Label::Clean]);
    }

    #[test]
    fn test_outcome_serializes_latency_in_millis() {
        let outcome = AnalysisOutcome {
            verdict: fuse(Vec::new(), None, &Default::default()),
            static_result: DetectionResult::new(),
            runtime: None,
            semantic: None,
            latency: Duration::from_millis(42),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["latency_ms"], 42);
        assert_eq!(json["verdict"]["label"], "clean");
    }
}
