//! Syntax error detection from the recovered parse tree.

use std::collections::HashSet;

use crate::analysis::{CodeFacts, SyntaxIssueKind};

use super::{BugPattern, Finding, Severity};

/// One finding per line holding ERROR/MISSING nodes or a Python 2 `print`.
pub fn detect_syntax_errors(facts: &CodeFacts) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut seen_lines = HashSet::new();

    // Python 2 prints first so the clearer message wins the line.
    let mut issues: Vec<_> = facts.syntax_issues.iter().collect();
    issues.sort_by_key(|i| (i.line, i.kind != SyntaxIssueKind::Python2Print));

    for issue in issues {
        if !seen_lines.insert(issue.line) {
            continue;
        }

        let message = match issue.kind {
            SyntaxIssueKind::Python2Print => {
                "Python 2 print statement; print is a function in Python 3".to_string()
            }
            SyntaxIssueKind::Missing => format!(
                "invalid syntax: expected `{}` at column {}",
                issue.snippet, issue.column
            ),
            SyntaxIssueKind::Error if issue.snippet.is_empty() => {
                format!("invalid syntax at column {}", issue.column)
            }
            SyntaxIssueKind::Error => format!("invalid syntax near `{}`", issue.snippet),
        };

        findings.push(Finding::new(
            BugPattern::SyntaxError,
            Severity::Error,
            issue.line,
            message,
        ));
    }

    findings
}
