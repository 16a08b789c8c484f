//! Silly mistake detection: code that is valid but cannot be what the
//! author meant.

use crate::analysis::{CodeFacts, ValueType};

use super::{BugPattern, Finding, Severity};

/// Operators where comparing an expression with itself is a constant.
const SELF_COMPARISON_OPS: &[&str] = &["==", "<", ">", "<=", ">=", "is", "and", "or"];

pub fn detect_silly_mistakes(facts: &CodeFacts) -> Vec<Finding> {
    let mut findings = Vec::new();

    for comparison in &facts.comparisons {
        // `x != x` is the NaN idiom; calls like `next(it)` may differ per side.
        if comparison.left == comparison.right
            && !comparison.has_call
            && SELF_COMPARISON_OPS.contains(&comparison.operator.as_str())
        {
            findings.push(Finding::new(
                BugPattern::SillyMistake,
                Severity::Error,
                comparison.line,
                format!(
                    "`{} {} {}` compares an expression with itself",
                    comparison.left, comparison.operator, comparison.right
                ),
            ));
            continue;
        }

        if matches!(comparison.operator.as_str(), "is" | "is not")
            && is_value_literal(comparison.right_type)
        {
            findings.push(Finding::new(
                BugPattern::SillyMistake,
                Severity::Error,
                comparison.line,
                format!(
                    "`{} {} {}` tests identity against a literal; use == or !=",
                    comparison.left, comparison.operator, comparison.right
                ),
            ));
        }
    }

    for assignment in &facts.self_assignments {
        findings.push(Finding::new(
            BugPattern::SillyMistake,
            Severity::Warning,
            assignment.line,
            format!("`{0} = {0}` assigns a variable to itself", assignment.name),
        ));
    }

    for branches in &facts.identical_branches {
        findings.push(Finding::new(
            BugPattern::SillyMistake,
            Severity::Warning,
            branches.line,
            "if and else branches are identical",
        ));
    }

    findings
}

/// Literals whose identity is an implementation detail.
fn is_value_literal(value_type: ValueType) -> bool {
    matches!(
        value_type,
        ValueType::Str
            | ValueType::Int
            | ValueType::Float
            | ValueType::List
            | ValueType::Dict
            | ValueType::Set
            | ValueType::Tuple
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::PythonAnalyzer;

    fn detect(source: &str) -> Vec<Finding> {
        let facts = PythonAnalyzer::new().analyze(source).unwrap();
        detect_silly_mistakes(&facts)
    }

    #[test]
    fn test_self_comparison() {
        let findings = detect("def same(a, b):\n    return a == a\n");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Error);
    }

    #[test]
    fn test_nan_idiom_allowed() {
        assert!(detect("def is_nan(x):\n    return x != x\n").is_empty());
    }

    #[test]
    fn test_calls_compared_with_themselves_allowed() {
        assert!(detect("import random\nprint(random.random() == random.random())\n").is_empty());
        assert!(detect("def pair(it):\n    return next(it) == next(it)\n").is_empty());
    }

    #[test]
    fn test_is_literal() {
        let findings = detect("def check(s):\n    return s is 'yes'\n");
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("identity"));
        assert!(detect("def check(s):\n    return s is None\n").is_empty());
    }

    #[test]
    fn test_self_assignment_and_identical_branches() {
        let source = r#"
def pick(flag, value):
    value = value
    if flag:
        return value + 1
    else:
        return value + 1
"#;
        let findings = detect(source);
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.severity == Severity::Warning));
    }

    #[test]
    fn test_elif_chain_not_flagged() {
        let source = "def f(x):\n    if x:\n        return 1\n    elif x > 2:\n        return 1\n    else:\n        return 1\n";
        assert!(detect(source).is_empty());
    }
}
