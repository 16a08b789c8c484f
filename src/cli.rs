//! Command-line interface for codeguard.

use clap::{Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::api::ApiClient;
use crate::config::Config;
use crate::evaluate::{Backend, EvaluationRunner, LocalBackend, RemoteBackend};
use crate::metrics;
use crate::pipeline::{AnalysisPipeline, AnalysisRequest, PipelineOptions};
use crate::report::{self, FileReport};
use crate::testset;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Files analyzed at once when a directory is given.
const DIRECTORY_CONCURRENCY: usize = 8;

/// Bug detection for LLM-generated Python code.
///
/// Codeguard layers static detectors, sandboxed execution and an optional
/// LLM judgment into a bug/clean verdict, and evaluates detectors against
/// labelled test sets.
#[derive(Parser)]
#[command(name = "codeguard")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a Python file or every .py file in a directory
    #[command(visible_alias = "check")]
    Analyze(AnalyzeArgs),
    /// Run labelled test sets through a local or remote detector
    Run(RunArgs),
    /// Compute metrics from a results directory
    Metrics(MetricsArgs),
    /// Write a default configuration file
    Init(InitArgs),
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Pretty,
    Json,
}

/// Arguments for the analyze command.
#[derive(Parser)]
pub struct AnalyzeArgs {
    /// File or directory to analyze
    pub path: PathBuf,

    /// The prompt the code was generated from
    #[arg(long, conflicts_with = "prompt_file")]
    pub prompt: Option<String>,

    /// Read the prompt from a file
    #[arg(long)]
    pub prompt_file: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "pretty")]
    pub format: Format,

    /// Enable the LLM layer even if the config leaves it off
    #[arg(long)]
    pub with_llm: bool,

    /// Do not execute the code
    #[arg(long)]
    pub skip_dynamic: bool,

    /// Skip PyPI lookups for third-party imports
    #[arg(long)]
    pub skip_registry_check: bool,

    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for the run command.
#[derive(Parser)]
pub struct RunArgs {
    /// Directory of test_set_<n>.json files
    #[arg(long)]
    pub test_sets: Option<PathBuf>,

    /// Directory results are written to
    #[arg(long)]
    pub results: Option<PathBuf>,

    /// Remote analysis endpoint; without it cases are analyzed locally
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Only run these test sets (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub sets: Vec<u32>,

    /// Cases analyzed at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Per-request timeout in seconds for the remote endpoint
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Enable the LLM layer for local runs
    #[arg(long)]
    pub with_llm: bool,

    /// Do not execute the code in local runs
    #[arg(long)]
    pub skip_dynamic: bool,

    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for the metrics command.
#[derive(Parser)]
pub struct MetricsArgs {
    /// Directory of test_set_<n>_results.json files
    pub results: PathBuf,

    /// Earlier results to compare against
    #[arg(long)]
    pub baseline: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "pretty")]
    pub format: Format,
}

/// Arguments for the init command.
#[derive(Parser)]
pub struct InitArgs {
    /// Output file path
    #[arg(short, long, default_value = "codeguard.yaml")]
    pub output: PathBuf,
}

fn load_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let cwd = std::env::current_dir()?;
    Ok(Config::load(explicit, &cwd)?)
}

/// Collect Python files under a directory.
fn collect_files(root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            // Skip hidden directories
            if e.depth() > 0 && e.file_type().is_dir() && name.starts_with('.') {
                return false;
            }
            !(e.file_type().is_dir()
                && matches!(
                    name.as_ref(),
                    "__pycache__" | "venv" | "node_modules" | "site-packages"
                ))
        })
    {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|e| e.to_str()) == Some("py")
        {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

/// Run the analyze command.
pub async fn run_analyze(args: &AnalyzeArgs) -> anyhow::Result<i32> {
    let config = match load_config(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {:#}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let prompt = match (&args.prompt, &args.prompt_file) {
        (Some(p), _) => Some(p.clone()),
        (None, Some(path)) => match std::fs::read_to_string(path) {
            Ok(p) => Some(p),
            Err(e) => {
                eprintln!("Error: cannot read prompt file {:?}: {}", path, e);
                return Ok(EXIT_ERROR);
            }
        },
        (None, None) => None,
    };

    let metadata = match std::fs::metadata(&args.path) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: cannot access path {:?}: {}", args.path, e);
            return Ok(EXIT_ERROR);
        }
    };
    let files = if metadata.is_dir() {
        collect_files(&args.path)?
    } else {
        vec![args.path.clone()]
    };
    if files.is_empty() {
        eprintln!("Warning: no Python files to analyze");
        return Ok(EXIT_SUCCESS);
    }

    let mut requests = Vec::with_capacity(files.len());
    for file in &files {
        let code = match std::fs::read_to_string(file) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Error: cannot read {:?}: {}", file, e);
                return Ok(EXIT_ERROR);
            }
        };
        let mut request = AnalysisRequest::new(code);
        if let Some(prompt) = &prompt {
            request = request.with_prompt(prompt.clone());
        }
        requests.push(request);
    }

    let options = PipelineOptions {
        with_llm: args.with_llm,
        skip_dynamic: args.skip_dynamic,
        skip_registry: args.skip_registry_check,
    };
    let pipeline = AnalysisPipeline::new(&config, options)?;

    let outcomes = if requests.len() == 1 {
        vec![pipeline.analyze(&requests[0]).await]
    } else {
        pipeline
            .analyze_batch(&requests, DIRECTORY_CONCURRENCY)
            .await
    };

    let mut analyzed = Vec::with_capacity(outcomes.len());
    let mut failures = 0;
    for (file, outcome) in files.iter().zip(outcomes) {
        match outcome {
            Ok(outcome) => analyzed.push((file.to_string_lossy().to_string(), outcome)),
            Err(e) => {
                eprintln!("Error analyzing {}: {:#}", file.display(), e);
                failures += 1;
            }
        }
    }

    let reports: Vec<FileReport<'_>> = analyzed
        .iter()
        .map(|(path, outcome)| FileReport {
            path: path.clone(),
            outcome,
        })
        .collect();

    match args.format {
        Format::Json => report::write_analysis_json(&reports)?,
        Format::Pretty => report::write_analysis_pretty(&reports),
    }

    if failures > 0 {
        Ok(EXIT_ERROR)
    } else if reports.iter().any(|r| r.outcome.verdict.is_bug()) {
        Ok(EXIT_FAILED)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

/// Run the run command.
pub async fn run_evaluation(args: &RunArgs) -> anyhow::Result<i32> {
    let mut config = match load_config(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {:#}", e);
            return Ok(EXIT_ERROR);
        }
    };
    if let Some(endpoint) = &args.endpoint {
        config.api.endpoint = endpoint.clone();
    }
    if let Some(timeout) = args.timeout {
        config.api.timeout_secs = timeout;
    }
    let test_sets_dir = args
        .test_sets
        .clone()
        .unwrap_or_else(|| config.evaluation.test_sets_dir.clone());
    let results_dir = args
        .results
        .clone()
        .unwrap_or_else(|| config.evaluation.results_dir.clone());
    let concurrency = args.concurrency.unwrap_or(config.evaluation.concurrency);

    let filter = (!args.sets.is_empty()).then_some(args.sets.as_slice());
    let sets = match testset::load_test_sets(&test_sets_dir, filter) {
        Ok(sets) => sets,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return Ok(EXIT_ERROR);
        }
    };
    if sets.is_empty() {
        eprintln!("Error: no test sets found in {}", test_sets_dir.display());
        return Ok(EXIT_ERROR);
    }

    let backend: Arc<dyn Backend> = if args.endpoint.is_some() {
        Arc::new(RemoteBackend::new(ApiClient::new(&config.api)?))
    } else {
        let options = PipelineOptions {
            with_llm: args.with_llm,
            skip_dynamic: args.skip_dynamic,
            skip_registry: false,
        };
        Arc::new(LocalBackend::new(AnalysisPipeline::new(&config, options)?))
    };

    let runner = EvaluationRunner::new(backend)
        .concurrency(concurrency)
        .results_dir(results_dir.clone())
        .show_progress(std::io::stderr().is_terminal());
    let (results, summary) = runner.run_all(&sets).await?;

    report::write_run_pretty(&summary, &results);
    println!("  Results saved to {}", results_dir.display());
    println!();

    Ok(EXIT_SUCCESS)
}

/// Run the metrics command.
pub fn run_metrics(args: &MetricsArgs) -> anyhow::Result<i32> {
    let current = match metrics::load_results(&args.results) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return Ok(EXIT_ERROR);
        }
    };
    if current.is_empty() {
        eprintln!("Error: no results found in {}", args.results.display());
        return Ok(EXIT_ERROR);
    }
    let report = metrics::compute(&current);

    let comparison = match &args.baseline {
        Some(dir) => {
            let baseline = match metrics::load_results(dir) {
                Ok(r) => r,
                Err(e) => {
                    eprintln!("Error: {:#}", e);
                    return Ok(EXIT_ERROR);
                }
            };
            Some(metrics::compare(&metrics::compute(&baseline), &report))
        }
        None => None,
    };

    match args.format {
        Format::Json => report::write_metrics_json(&report, comparison.as_ref())?,
        Format::Pretty => {
            report::write_metrics_pretty(&report);
            if let Some(comparison) = &comparison {
                report::write_comparison_pretty(comparison);
            }
        }
    }

    Ok(EXIT_SUCCESS)
}

/// Run the init command.
pub fn run_init(args: &InitArgs) -> anyhow::Result<i32> {
    // Check if output already exists
    if args.output.exists() {
        eprintln!("Error: file already exists: {}", args.output.display());
        eprintln!("Remove it or use --output to specify a different path");
        return Ok(EXIT_ERROR);
    }

    // Create output directory if needed
    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() && parent != Path::new(".") {
            if let Err(e) = std::fs::create_dir_all(parent) {
                eprintln!("Error: failed to create directory: {}", e);
                return Ok(EXIT_ERROR);
            }
        }
    }

    if let Err(e) = std::fs::write(&args.output, Config::default_yaml()) {
        eprintln!("Error: failed to write config: {}", e);
        return Ok(EXIT_ERROR);
    }

    println!("Created {}", args.output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit {} to enable the layers you need", args.output.display());
    println!("  2. Run: codeguard analyze <file.py> --config {}", args.output.display());

    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_collect_python_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("__pycache__")).unwrap();
        std::fs::write(dir.path().join("__pycache__/a.py"), "").unwrap();
        std::fs::create_dir(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg/b.py"), "y = 2\n").unwrap();

        let files = collect_files(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|f| f.strip_prefix(dir.path()).unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.py".to_string(), "pkg/b.py".to_string()]);
    }

    #[test]
    fn test_init_writes_loadable_config() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("codeguard.yaml");
        let args = InitArgs {
            output: output.clone(),
        };
        assert_eq!(run_init(&args).unwrap(), EXIT_SUCCESS);
        let config = Config::parse_file(&output).unwrap();
        assert_eq!(config.verdict.bug_threshold, 4.0);

        // Refuses to overwrite
        assert_eq!(run_init(&args).unwrap(), EXIT_ERROR);
    }

    #[test]
    fn test_parse_run_args() {
        let cli = Cli::try_parse_from([
            "codeguard",
            "run",
            "--sets",
            "1,3",
            "--endpoint",
            "http://localhost:8000/api/analyze",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.sets, vec![1, 3]);
                assert!(args.endpoint.is_some());
            }
            _ => panic!("expected run"),
        }
    }
}
