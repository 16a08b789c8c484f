//! Runtime analysis: execute the sample in a sandbox and classify the
//! exception it raises.
//!
//! Strategies are tried in order: a Docker container with no network and
//! capped memory/CPU, then a plain interpreter subprocess when the code
//! imports nothing that touches the host, otherwise the sample is skipped.

mod wrapper;

pub use wrapper::{build_wrapper, error_line, parse_output, ExecutionResult};

use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use lazy_static::lazy_static;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::DynamicConfig;
use crate::detect::{BugPattern, Finding, Layer, Severity};

/// Modules that give the sample access to the host.
pub const DANGEROUS_IMPORTS: &[&str] = &[
    "os",
    "subprocess",
    "shutil",
    "socket",
    "ctypes",
    "multiprocessing",
    "threading",
    "signal",
    "pty",
    "tty",
    "termios",
    "resource",
];

/// Error types that describe the harness, not the sample.
const INFRASTRUCTURE_ERRORS: &[&str] = &[
    "ParseError",
    "ContainerError",
    "ImageNotFound",
    "ExecutionError",
];

lazy_static! {
    static ref DANGEROUS_IMPORT_RE: Regex = Regex::new(&format!(
        r"\b(?:import|from)\s+({})\b",
        DANGEROUS_IMPORTS.join("|")
    ))
    .expect("static regex");
}

#[derive(Error, Debug)]
pub enum DynamicError {
    #[error("failed to prepare sandbox script: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Docker,
    Subprocess,
    Skipped,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Docker => write!(f, "docker"),
            Strategy::Subprocess => write!(f, "subprocess"),
            Strategy::Skipped => write!(f, "skipped"),
        }
    }
}

/// What happened when the sample ran.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeReport {
    pub strategy: Strategy,
    /// The sample actually ran to a result (successful or not).
    pub executed: bool,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
    pub findings: Vec<Finding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<String>,
}

impl RuntimeReport {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            strategy: Strategy::Skipped,
            executed: false,
            success: false,
            error_type: None,
            error: None,
            traceback: None,
            findings: Vec::new(),
            skipped_reason: Some(reason.into()),
        }
    }

    fn from_execution(strategy: Strategy, result: ExecutionResult) -> Self {
        let findings = classify(&result);
        let executed = !is_infrastructure_error(&result);
        Self {
            strategy,
            executed,
            success: result.success,
            error_type: result.error_type,
            error: result.error,
            traceback: result.traceback,
            findings,
            skipped_reason: None,
        }
    }
}

fn is_infrastructure_error(result: &ExecutionResult) -> bool {
    result
        .error_type
        .as_deref()
        .is_some_and(|t| INFRASTRUCTURE_ERRORS.contains(&t))
}

/// Map a harness result to findings.
pub fn classify(result: &ExecutionResult) -> Vec<Finding> {
    if result.success {
        return Vec::new();
    }
    let Some(error_type) = result.error_type.as_deref() else {
        return Vec::new();
    };
    // Samples reading stdin cannot run unattended.
    if INFRASTRUCTURE_ERRORS.contains(&error_type) || error_type == "EOFError" {
        return Vec::new();
    }

    let error = result.error.as_deref().unwrap_or_default();
    let line = result
        .traceback
        .as_deref()
        .and_then(error_line)
        .unwrap_or(0);

    let (pattern, severity, message) = match error_type {
        "ZeroDivisionError" => (
            BugPattern::MissingCornerCase,
            Severity::Error,
            format!(
                "ZeroDivisionError at runtime, division by zero not guarded: {}",
                error
            ),
        ),
        "AttributeError" => (
            BugPattern::WrongAttribute,
            Severity::Error,
            format!("AttributeError: {}", error),
        ),
        "TypeError" => (
            BugPattern::WrongInputType,
            Severity::Error,
            format!("TypeError: {}", error),
        ),
        "NameError" => (
            BugPattern::HallucinatedObject,
            Severity::Error,
            format!("NameError: {}", error),
        ),
        "TimeoutError" => (
            BugPattern::RuntimeError,
            Severity::Warning,
            "execution did not finish within the time limit".to_string(),
        ),
        other => (
            BugPattern::RuntimeError,
            Severity::Error,
            format!("{}: {}", other, error),
        ),
    };

    vec![Finding::new(pattern, severity, line, message).with_layer(Layer::Dynamic)]
}

/// The first dangerous module the code imports.
pub fn dangerous_import(code: &str) -> Option<&str> {
    DANGEROUS_IMPORT_RE
        .captures(code)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

pub struct DynamicAnalyzer {
    config: DynamicConfig,
    docker_available: OnceCell<bool>,
}

impl DynamicAnalyzer {
    pub fn new(config: DynamicConfig) -> Self {
        Self {
            config,
            docker_available: OnceCell::new(),
        }
    }

    /// Run the sample with the best available strategy.
    pub async fn analyze(&self, code: &str) -> RuntimeReport {
        if !self.config.enabled {
            return RuntimeReport::skipped("dynamic analysis disabled");
        }

        if self.config.use_docker && self.docker_available().await {
            match self.run_in_docker(code).await {
                Ok(result) if !is_infrastructure_error(&result) => {
                    return RuntimeReport::from_execution(Strategy::Docker, result)
                }
                Ok(result) => warn!(
                    error_type = ?result.error_type,
                    error = ?result.error,
                    "docker sandbox failed, trying subprocess"
                ),
                Err(e) => warn!(error = %e, "docker execution failed, trying subprocess"),
            }
        }

        if let Some(module) = dangerous_import(code) {
            info!(module, "skipping subprocess execution of code importing a system module");
            return RuntimeReport::skipped(format!(
                "docker unavailable and code imports `{}`",
                module
            ));
        }

        match self.run_in_subprocess(code).await {
            Ok(result) => RuntimeReport::from_execution(Strategy::Subprocess, result),
            Err(e) => {
                warn!(error = %e, "subprocess execution failed");
                RuntimeReport::skipped(e.to_string())
            }
        }
    }

    async fn docker_available(&self) -> bool {
        if let Some(available) = self.docker_available.get() {
            return *available;
        }
        let probe = Command::new("docker")
            .args(["version", "--format", "{{.Server.Version}}"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();
        let available = matches!(
            tokio::time::timeout(Duration::from_secs(5), probe).await,
            Ok(Ok(status)) if status.success()
        );
        debug!(available, "docker probe");
        *self.docker_available.get_or_init(|| available)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    async fn run_in_docker(&self, code: &str) -> Result<ExecutionResult, DynamicError> {
        let script = write_script(code)?;
        let (dir, filename) = split_script_path(script.path())?;
        let container = format!(
            "codeguard-{}-{}",
            std::process::id(),
            filename.trim_end_matches(".py")
        );

        let mut command = Command::new("docker");
        command
            .arg("run")
            .arg("--rm")
            .args(["--name", &container])
            .args(["--network", "none"])
            .arg(format!("--memory={}m", self.config.memory_limit_mb))
            .arg(format!("--cpu-quota={}", self.config.cpu_quota))
            .arg("-v")
            .arg(format!("{}:/code:ro", dir))
            .args(["-w", "/code"])
            .arg(&self.config.docker_image)
            .arg("python")
            .arg(format!("/code/{}", filename));

        let result = self.execute(command, "docker").await?;
        if result.error_type.as_deref() == Some("TimeoutError") {
            // The CLI going away does not stop the container.
            let _ = Command::new("docker")
                .args(["rm", "-f", &container])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
        }
        Ok(result)
    }

    async fn run_in_subprocess(&self, code: &str) -> Result<ExecutionResult, DynamicError> {
        let script = write_script(code)?;
        let mut command = Command::new(&self.config.python);
        command.arg(script.path());
        self.execute(command, &self.config.python).await
    }

    async fn execute(
        &self,
        mut command: Command,
        program: &str,
    ) -> Result<ExecutionResult, DynamicError> {
        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DynamicError::Spawn {
                program: program.to_string(),
                source,
            })?;

        match tokio::time::timeout(self.timeout(), child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                let result = parse_output(&stdout, &stderr);
                if program == "docker" && result.error_type.as_deref() == Some("ParseError") {
                    let detail = stderr.trim().to_string();
                    if stderr.contains("Unable to find image")
                        || stderr.contains("pull access denied")
                    {
                        return Ok(ExecutionResult::failure("ImageNotFound", detail));
                    }
                    if !output.status.success() {
                        return Ok(ExecutionResult::failure("ContainerError", detail));
                    }
                }
                Ok(result)
            }
            Ok(Err(e)) => Ok(ExecutionResult::failure("ExecutionError", e.to_string())),
            Err(_) => {
                debug!(timeout_secs = self.config.timeout_secs, "sample execution timed out");
                Ok(ExecutionResult::failure("TimeoutError", "execution timed out"))
            }
        }
    }
}

fn write_script(code: &str) -> Result<tempfile::NamedTempFile, DynamicError> {
    let mut file = tempfile::Builder::new()
        .prefix("codeguard_")
        .suffix(".py")
        .tempfile()?;
    file.write_all(build_wrapper(code).as_bytes())?;
    file.flush()?;
    Ok(file)
}

fn split_script_path(path: &Path) -> Result<(String, String), DynamicError> {
    let invalid = || {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "temp path is not valid UTF-8",
        )
    };
    let dir = path.parent().and_then(|p| p.to_str()).ok_or_else(invalid)?;
    let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(invalid)?;
    Ok((dir.to_string(), name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(error_type: &str, error: &str) -> ExecutionResult {
        ExecutionResult::failure(error_type, error)
    }

    #[test]
    fn test_classification() {
        let cases = [
            ("ZeroDivisionError", BugPattern::MissingCornerCase),
            ("AttributeError", BugPattern::WrongAttribute),
            ("TypeError", BugPattern::WrongInputType),
            ("NameError", BugPattern::HallucinatedObject),
            ("KeyError", BugPattern::RuntimeError),
        ];
        for (error_type, pattern) in cases {
            let findings = classify(&failed(error_type, "boom"));
            assert_eq!(findings.len(), 1, "{}", error_type);
            assert_eq!(findings[0].pattern, pattern);
            assert_eq!(findings[0].layer, Layer::Dynamic);
            assert_eq!(findings[0].severity, Severity::Error);
        }
    }

    #[test]
    fn test_infrastructure_errors_are_not_findings() {
        for error_type in ["ParseError", "ContainerError", "ImageNotFound", "EOFError"] {
            assert!(classify(&failed(error_type, "x")).is_empty());
        }
        assert!(classify(&ExecutionResult {
            success: true,
            ..Default::default()
        })
        .is_empty());
    }

    #[test]
    fn test_timeout_is_warning() {
        let findings = classify(&failed("TimeoutError", "execution timed out"));
        assert_eq!(findings[0].severity, Severity::Warning);
    }

    #[test]
    fn test_line_from_traceback() {
        let result = ExecutionResult {
            traceback: Some("  File \"<codeguard>\", line 4, in f\n".to_string()),
            ..failed("TypeError", "unsupported operand")
        };
        assert_eq!(classify(&result)[0].line, 4);
    }

    #[test]
    fn test_dangerous_imports() {
        assert_eq!(dangerous_import("import os\n"), Some("os"));
        assert_eq!(dangerous_import("from subprocess import run\n"), Some("subprocess"));
        assert_eq!(dangerous_import("import osmnx\nimport math\n"), None);
        assert_eq!(dangerous_import("x = 1\n"), None);
    }

    #[tokio::test]
    async fn test_disabled_and_skipped() {
        let analyzer = DynamicAnalyzer::new(DynamicConfig {
            enabled: false,
            ..Default::default()
        });
        let report = analyzer.analyze("x = 1").await;
        assert_eq!(report.strategy, Strategy::Skipped);

        let analyzer = DynamicAnalyzer::new(DynamicConfig {
            use_docker: false,
            ..Default::default()
        });
        let report = analyzer.analyze("import shutil\nshutil.rmtree('/')\n").await;
        assert_eq!(report.strategy, Strategy::Skipped);
        assert!(!report.executed);
    }

    #[tokio::test]
    #[ignore = "requires a python3 interpreter"]
    async fn test_subprocess_runtime_error() {
        let analyzer = DynamicAnalyzer::new(DynamicConfig {
            use_docker: false,
            ..Default::default()
        });
        let report = analyzer
            .analyze("def mean(xs):\n    return sum(xs) / len(xs)\n\nprint(mean([]))\n")
            .await;
        assert_eq!(report.strategy, Strategy::Subprocess);
        assert!(report.executed);
        assert_eq!(report.error_type.as_deref(), Some("ZeroDivisionError"));
        assert_eq!(report.findings[0].line, 2);
    }

    #[tokio::test]
    #[ignore = "requires a python3 interpreter"]
    async fn test_subprocess_timeout() {
        let analyzer = DynamicAnalyzer::new(DynamicConfig {
            use_docker: false,
            timeout_secs: 1,
            ..Default::default()
        });
        let report = analyzer.analyze("while True:\n    pass\n").await;
        assert_eq!(report.error_type.as_deref(), Some("TimeoutError"));
    }
}
