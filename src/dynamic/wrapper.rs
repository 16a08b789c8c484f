//! Python harness that runs a code sample and reports the outcome as JSON.

use serde::{Deserialize, Serialize};

/// Filename the sample is compiled under; tracebacks refer to it.
pub const SAMPLE_FILENAME: &str = "<codeguard>";

/// Outcome printed by the harness on its last stdout line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub traceback: Option<String>,
}

impl ExecutionResult {
    pub fn failure(error_type: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            error_type: Some(error_type.to_string()),
            ..Default::default()
        }
    }
}

/// Build the harness script for `code`.
///
/// The sample's own stdout is captured so the JSON line stays parseable, and
/// stdin is empty, so `input()` raises EOFError.
pub fn build_wrapper(code: &str) -> String {
    // A JSON string literal is also a valid Python string literal.
    let literal = serde_json::Value::String(code.to_string()).to_string();
    format!(
        r#"import contextlib, io, json, sys, traceback
code_to_run = {literal}
result = {{"success": False, "output": "", "error": None, "error_type": None, "traceback": None}}
captured = io.StringIO()
try:
    with contextlib.redirect_stdout(captured):
        exec(compile(code_to_run, "{filename}", "exec"), {{"__name__": "__main__"}})
    result["success"] = True
except SystemExit as e:
    result["success"] = e.code in (None, 0)
    if not result["success"]:
        result["error_type"] = "SystemExit"
        result["error"] = str(e.code)
except BaseException as e:
    result["error_type"] = type(e).__name__
    result["error"] = str(e)
    result["traceback"] = traceback.format_exc()
result["output"] = captured.getvalue()[-2000:]
sys.stdout.write(json.dumps(result) + "\n")
"#,
        literal = literal,
        filename = SAMPLE_FILENAME,
    )
}

/// Parse harness output, taking the last line that holds a JSON object.
pub fn parse_output(stdout: &str, stderr: &str) -> ExecutionResult {
    let parsed = stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| serde_json::from_str::<ExecutionResult>(line).ok());

    parsed.unwrap_or_else(|| {
        let raw = if stdout.trim().is_empty() {
            stderr.trim()
        } else {
            stdout.trim()
        };
        ExecutionResult {
            output: raw.chars().take(2000).collect(),
            ..ExecutionResult::failure("ParseError", "failed to parse execution result")
        }
    })
}

/// Line of the innermost sample frame in a traceback.
pub fn error_line(traceback: &str) -> Option<usize> {
    let marker = format!("File \"{}\", line ", SAMPLE_FILENAME);
    traceback
        .lines()
        .filter_map(|line| {
            let rest = &line[line.find(&marker)? + marker.len()..];
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().ok()
        })
        .last()
}
