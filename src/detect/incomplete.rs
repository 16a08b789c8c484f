//! Incomplete generation detection.
//!
//! Flags code the model did not finish writing:
//! - function bodies that are only `pass`, `...` or a docstring
//! - top-level functions that only `raise NotImplementedError`
//! - TODO/FIXME style markers
//! - source that stops in the middle of a construct
//!
//! Methods of classes with bases are skipped for the first two rules since
//! abstract methods and protocol stubs are legitimately empty.

use crate::analysis::{CodeFacts, FunctionDef};

use super::{BugPattern, Finding, Severity};

pub fn detect_incomplete_generation(facts: &CodeFacts) -> Vec<Finding> {
    let mut findings = Vec::new();

    if is_empty_sample(facts) {
        findings.push(Finding::new(
            BugPattern::IncompleteGeneration,
            Severity::Error,
            0,
            "no executable code was generated",
        ));
        return findings;
    }

    for function in &facts.functions {
        if is_exempt(function) {
            continue;
        }

        if function.body.raises_not_implemented {
            findings.push(Finding::new(
                BugPattern::IncompleteGeneration,
                Severity::Error,
                function.line,
                format!(
                    "function `{}` only raises NotImplementedError",
                    function.name
                ),
            ));
        } else if function.body.is_placeholder {
            findings.push(Finding::new(
                BugPattern::IncompleteGeneration,
                Severity::Error,
                function.line,
                format!("function `{}` has an empty placeholder body", function.name),
            ));
        }
    }

    for line in &facts.todo_lines {
        findings.push(Finding::new(
            BugPattern::IncompleteGeneration,
            Severity::Warning,
            *line,
            "unfinished-work marker left in the code",
        ));
    }

    if facts.truncated {
        let line = facts
            .syntax_issues
            .iter()
            .filter(|i| i.at_eof)
            .map(|i| i.line)
            .max()
            .unwrap_or(facts.line_count);
        findings.push(Finding::new(
            BugPattern::IncompleteGeneration,
            Severity::Error,
            line,
            "code is truncated: the source ends in the middle of a statement",
        ));
    }

    findings
}

fn is_exempt(function: &FunctionDef) -> bool {
    function.in_derived_class || (function.name.starts_with("__") && function.name.ends_with("__"))
}

/// Nothing but comments, blank lines or a bare docstring.
fn is_empty_sample(facts: &CodeFacts) -> bool {
    facts.functions.is_empty()
        && facts.classes.is_empty()
        && facts.imports.is_empty()
        && facts.assignments.is_empty()
        && facts.calls.is_empty()
        && facts.name_uses.is_empty()
        && facts.syntax_issues.is_empty()
}
