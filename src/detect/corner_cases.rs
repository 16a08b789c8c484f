//! Missing corner case detection.
//!
//! Looks for inputs a function never checks before using them in a way that
//! fails on the degenerate value: zero denominators, empty sequences passed
//! to `max`/`min`, and constant indexes into possibly empty sequences.
//! A name counts as checked when it appears in any condition (`if`, `while`,
//! `assert`, ternary, `and`/`or`) in the same function.

use crate::analysis::{CodeFacts, ScopeId};

use super::{BugPattern, Finding, Severity};

/// Confidence for a denominator that is a bare parameter.
const DIVISOR_CONFIDENCE: f64 = 0.7;
/// Confidence for `len(param)` denominators and empty-sequence cases.
const EMPTY_SEQUENCE_CONFIDENCE: f64 = 0.9;

pub fn detect_missing_corner_cases(facts: &CodeFacts) -> Vec<Finding> {
    let mut findings = Vec::new();

    for division in &facts.divisions {
        if division.left_is_str {
            continue;
        }
        let Some(name) = division.depends_on.as_deref() else {
            continue;
        };
        if !is_unchecked_param(facts, division.scope, name) {
            continue;
        }
        let guards = facts.guards_for(division.scope);
        if guards.catches_zero_division {
            continue;
        }

        let is_len = division.denominator.starts_with("len(");
        let message = if is_len {
            format!(
                "`{}` divides by the length of `{}` without handling an empty sequence",
                division.operator, name
            )
        } else {
            format!(
                "`{}` by parameter `{}` without checking for zero",
                division.operator, name
            )
        };
        findings.push(
            Finding::new(
                BugPattern::MissingCornerCase,
                Severity::Warning,
                division.line,
                message,
            )
            .with_confidence(if is_len {
                EMPTY_SEQUENCE_CONFIDENCE
            } else {
                DIVISOR_CONFIDENCE
            }),
        );
    }

    for subscript in &facts.subscripts {
        if subscript.is_store || !is_unchecked_param(facts, subscript.scope, &subscript.target) {
            continue;
        }
        if facts.guards_for(subscript.scope).catches_lookup_errors {
            continue;
        }
        findings.push(
            Finding::new(
                BugPattern::MissingCornerCase,
                Severity::Warning,
                subscript.line,
                format!(
                    "`{}[{}]` fails when `{}` is empty",
                    subscript.target, subscript.index, subscript.target
                ),
            )
            .with_confidence(EMPTY_SEQUENCE_CONFIDENCE),
        );
    }

    for call in &facts.calls {
        if !matches!(call.callee.as_str(), "max" | "min") {
            continue;
        }
        if call.args.len() != 1 || call.args[0].keyword.is_some() || call.args[0].is_splat {
            continue;
        }
        let target = call.args[0].text.as_str();
        if !is_unchecked_param(facts, call.scope, target) {
            continue;
        }
        if facts.guards_for(call.scope).catches_lookup_errors {
            continue;
        }
        findings.push(
            Finding::new(
                BugPattern::MissingCornerCase,
                Severity::Warning,
                call.line,
                format!(
                    "{}() of `{}` raises ValueError when it is empty",
                    call.callee, target
                ),
            )
            .with_confidence(EMPTY_SEQUENCE_CONFIDENCE),
        );
    }

    findings
}

/// `name` is a parameter of the function owning `scope` and no condition in
/// that function mentions it.
fn is_unchecked_param(facts: &CodeFacts, scope: ScopeId, name: &str) -> bool {
    let Some(function) = facts.function_for_scope(scope) else {
        return false;
    };
    function.has_param(name) && !facts.guards_for(scope).checked_names.contains(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::PythonAnalyzer;

    fn detect(source: &str) -> Vec<Finding> {
        let facts = PythonAnalyzer::new().analyze(source).unwrap();
        detect_missing_corner_cases(&facts)
    }

    #[test]
    fn test_average_of_empty_list() {
        let findings = detect("def average(nums):\n    return sum(nums) / len(nums)\n");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].confidence, EMPTY_SEQUENCE_CONFIDENCE);
        assert!(findings[0].message.contains("empty"));
    }

    #[test]
    fn test_guarded_division() {
        let source = r#"
def average(nums):
    if not nums:
        return 0.0
    return sum(nums) / len(nums)

def ratio(a, b):
    try:
        return a / b
    except ZeroDivisionError:
        return None
"#;
        assert!(detect(source).is_empty());
    }

    #[test]
    fn test_unguarded_divisor() {
        let findings = detect("def ratio(a, b):\n    return a / b\n");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].confidence, DIVISOR_CONFIDENCE);
    }

    #[test]
    fn test_local_divisor_ignored() {
        assert!(detect("def f(a):\n    n = 4\n    return a / n\n").is_empty());
    }

    #[test]
    fn test_first_element_and_max() {
        let source = "def head(items):\n    return items[0]\n\ndef largest(values):\n    return max(values)\n";
        let findings = detect(source);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].line, 2);
        assert_eq!(findings[1].line, 5);
    }

    #[test]
    fn test_max_with_default_ignored() {
        assert!(detect("def largest(values):\n    return max(values, default=0)\n").is_empty());
    }
}
