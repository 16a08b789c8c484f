//! Output formatting for codeguard results.
//!
//! Supports two output formats:
//! - Pretty: colored terminal output for human readability
//! - JSON: structured output for programmatic consumption

use colored::*;
use serde::{Deserialize, Serialize};

use crate::detect::{Finding, Severity};
use crate::evaluate::{RunSummary, TestSetResults};
use crate::metrics::{Comparison, MetricsReport};
use crate::pipeline::AnalysisOutcome;
use crate::verdict::Label;

/// One analyzed file.
pub struct FileReport<'a> {
    pub path: String,
    pub outcome: &'a AnalysisOutcome,
}

// =============================================================================
// JSON Format
// =============================================================================

#[derive(Serialize, Deserialize)]
pub struct JsonReport {
    pub version: String,
    pub files_analyzed: usize,
    pub bugs: usize,
    pub files: Vec<JsonFile>,
}

#[derive(Serialize, Deserialize)]
pub struct JsonFile {
    pub path: String,
    pub verdict: Label,
    pub severity_score: f64,
    pub findings: Vec<JsonFinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_summary: Option<String>,
    pub latency_ms: u64,
}

#[derive(Serialize, Deserialize)]
pub struct JsonFinding {
    pub pattern: String,
    pub severity: String,
    pub layer: String,
    pub line: usize,
    pub message: String,
    pub confidence: f64,
}

pub fn analysis_json(files: &[FileReport<'_>]) -> anyhow::Result<String> {
    let report = JsonReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        files_analyzed: files.len(),
        bugs: files.iter().filter(|f| f.outcome.verdict.is_bug()).count(),
        files: files.iter().map(file_to_json).collect(),
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

pub fn write_analysis_json(files: &[FileReport<'_>]) -> anyhow::Result<()> {
    println!("{}", analysis_json(files)?);
    Ok(())
}

fn file_to_json(file: &FileReport<'_>) -> JsonFile {
    let outcome = file.outcome;
    JsonFile {
        path: file.path.clone(),
        verdict: outcome.verdict.label,
        severity_score: outcome.verdict.severity_score,
        findings: outcome.verdict.findings.iter().map(finding_to_json).collect(),
        execution: outcome.runtime.as_ref().map(|r| r.strategy.to_string()),
        llm_summary: outcome
            .semantic
            .as_ref()
            .map(|s| s.summary.clone())
            .filter(|s| !s.is_empty()),
        latency_ms: outcome.latency.as_millis() as u64,
    }
}

fn finding_to_json(f: &Finding) -> JsonFinding {
    JsonFinding {
        pattern: f.pattern.to_string(),
        severity: f.severity.to_string(),
        layer: f.layer.to_string(),
        line: f.line,
        message: f.message.clone(),
        confidence: f.confidence,
    }
}

pub fn write_metrics_json(
    report: &MetricsReport,
    comparison: Option<&Comparison>,
) -> anyhow::Result<()> {
    #[derive(Serialize)]
    struct Output<'a> {
        #[serde(flatten)]
        report: &'a MetricsReport,
        #[serde(skip_serializing_if = "Option::is_none")]
        comparison: Option<&'a Comparison>,
    }
    let json = serde_json::to_string_pretty(&Output { report, comparison })?;
    println!("{}", json);
    Ok(())
}

// =============================================================================
// Pretty Format
// =============================================================================

fn write_header(subject: &str, value: &str) {
    println!();
    print!("  ");
    print!("{}", "codeguard".cyan().bold());
    println!(" v{}", env!("CARGO_PKG_VERSION"));
    println!();
    print!("  {}", format!("{:<10}", subject).dimmed());
    println!("{}", value);
    println!();
}

pub fn write_analysis_pretty(files: &[FileReport<'_>]) {
    let subject = match files {
        [single] => single.path.clone(),
        _ => format!("{} files", files.len()),
    };
    write_header("Analyzing:", &subject);

    for file in files {
        write_file(file);
        println!();
    }

    if files.len() > 1 {
        let bugs = files.iter().filter(|f| f.outcome.verdict.is_bug()).count();
        println!(
            "  {}",
            format!("{} of {} files flagged", bugs, files.len()).bold()
        );
        println!();
    }
}

fn write_file(file: &FileReport<'_>) {
    let verdict = &file.outcome.verdict;
    if verdict.is_bug() {
        print!("  {}", "✗ BUG  ".red());
    } else {
        print!("  {}", "✓ CLEAN".green());
    }
    print!("  {}", file.path.blue());
    print!("  Severity: ");
    write_colored_score(verdict.severity_score);
    println!("{}", format!("/10 (threshold {})", verdict.threshold).dimmed());

    if let Some(runtime) = &file.outcome.runtime {
        let line = match &runtime.skipped_reason {
            Some(reason) => format!("execution: {} ({})", runtime.strategy, reason),
            None => format!("execution: {}", runtime.strategy),
        };
        println!("    {}", line.dimmed());
    }

    if !verdict.findings.is_empty() {
        println!();
        write_findings(&verdict.findings);
    }

    if let Some(semantic) = &file.outcome.semantic {
        if !semantic.summary.is_empty() {
            println!("    {} {}", "LLM:".bold(), semantic.summary);
        }
    }
}

fn write_colored_score(s: f64) {
    let text = format!("{:.1}", s);
    match s {
        s if s < 2.0 => print!("{}", text.green().bold()),
        s if s < 4.0 => print!("{}", text.green()),
        s if s < 6.0 => print!("{}", text.yellow()),
        s if s < 8.0 => print!("{}", text.yellow().bold()),
        _ => print!("{}", text.red()),
    }
}

fn write_findings(findings: &[Finding]) {
    for f in findings {
        write_severity_tag(&f.severity);
        print!("   ");
        print!("{:<28}", f.pattern.as_str().dimmed());
        print!("{}", f.layer.to_string().blue());
        if f.line > 0 {
            print!("{}", format!(":{}", f.line).dimmed());
        }
        println!();

        println!("            {}", f.message);
    }
    println!();
}

fn write_severity_tag(severity: &Severity) {
    match severity {
        Severity::Error => print!("    {} ", "ERROR".red()),
        Severity::Warning => print!("    {} ", "WARN ".yellow()),
        Severity::Info => print!("    {} ", "INFO ".blue()),
    }
}

pub fn write_run_pretty(summary: &RunSummary, sets: &[TestSetResults]) {
    write_header("Backend:", &summary.backend);

    for set in sets {
        print!("  Test Set {:>2}: ", set.test_set_id);
        write_colored_percent(set.accuracy);
        print!(" ({}/{})", set.correct, set.evaluated);
        if set.errors > 0 {
            print!("  {}", format!("{} errors", set.errors).red());
        }
        println!("  {}", set.test_set_name.dimmed());
    }
    println!();

    print!("  {} ", "Overall:".bold());
    write_colored_percent(summary.accuracy);
    println!(
        " ({}/{} evaluated, {} cases)",
        summary.correct, summary.evaluated, summary.total_cases
    );
    if summary.errors > 0 {
        println!(
            "  {}",
            format!(
                "{} errors ({} excluded from accuracy)",
                summary.errors,
                summary.total_cases - summary.evaluated
            )
            .yellow()
        );
    }
    println!();
}

fn write_colored_percent(p: f64) {
    let text = format!("{:6.2}%", p);
    match p {
        p if p >= 80.0 => print!("{}", text.green()),
        p if p >= 60.0 => print!("{}", text.yellow()),
        _ => print!("{}", text.red()),
    }
}

pub fn write_metrics_pretty(report: &MetricsReport) {
    let m = &report.overall;
    write_header("Results:", &format!("{} cases", m.total));

    println!("  {}", "Metrics:".bold());
    println!("    {:<14} {:.2}%", "Accuracy", m.accuracy * 100.0);
    println!("    {:<14} {:.2}%", "Precision", m.precision * 100.0);
    println!("    {:<14} {:.2}%", "Recall", m.recall * 100.0);
    println!("    {:<14} {:.2}%", "F1 Score", m.f1 * 100.0);
    println!("    {:<14} {:.2}%", "Specificity", m.specificity * 100.0);
    println!(
        "    {}",
        format!("{} evaluated, {} errors", m.evaluated, m.errors).dimmed()
    );
    println!();

    let c = &m.confusion;
    println!("  {}", "Confusion matrix:".bold());
    println!("    {:<16}{:>10}{:>10}", "", "pred bug", "pred clean");
    println!("    {:<16}{:>10}{:>10}", "actual bug", c.tp, c.fn_);
    println!("    {:<16}{:>10}{:>10}", "actual clean", c.fp, c.tn);
    println!();

    if !report.per_set.is_empty() {
        println!("  {}", "Per test set:".bold());
        for set in &report.per_set {
            print!("    Test Set {:>2}: ", set.test_set_id);
            write_colored_percent(set.accuracy * 100.0);
            println!(" ({}/{})  {}", set.correct, set.evaluated, set.name.dimmed());
        }
        println!();
    }

    if !report.per_bug_type.is_empty() {
        println!("  {}", "Detection rate by bug type:".bold());
        for (bug_type, rate) in &report.per_bug_type {
            print!("    {:<28}", bug_type);
            write_colored_percent(rate.rate * 100.0);
            println!(" ({}/{})", rate.detected, rate.cases);
        }
        println!();
    }
}

pub fn write_comparison_pretty(comparison: &Comparison) {
    println!("  {}", "Comparison with baseline:".bold());
    println!(
        "    {:<14}{:>10}{:>10}{:>10}",
        "", "before", "after", "change"
    );
    for row in &comparison.metrics {
        print!(
            "    {:<14}{:>9.2}%{:>9.2}%",
            row.metric,
            row.baseline * 100.0,
            row.current * 100.0
        );
        write_delta(row.delta);
        println!();
    }
    println!();

    for set in &comparison.per_set {
        let cell = |v: Option<f64>| v.map_or("-".to_string(), |v| format!("{:.2}%", v * 100.0));
        print!(
            "    Test Set {:>2}  {:>10}{:>10}",
            set.test_set_id,
            cell(set.baseline),
            cell(set.current)
        );
        if let Some(delta) = set.delta {
            write_delta(delta);
        }
        println!();
    }
    println!();
}

fn write_delta(delta: f64) {
    let text = format!("{:>+9.2}", delta * 100.0);
    if delta > 0.0 {
        print!("{}", text.green());
    } else if delta < 0.0 {
        print!("{}", text.red());
    } else {
        print!("{}", text.dimmed());
    }
}
