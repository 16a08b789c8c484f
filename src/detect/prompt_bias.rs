//! Prompt-biased code: implementations that special-case the example values
//! given in the prompt instead of solving the general problem.

use crate::analysis::{CodeFacts, ReturnLiteral};

use super::{BugPattern, Finding, Severity};

const PROMPT_BIAS_CONFIDENCE: f64 = 0.8;

/// Lines before a `return` that an equality check on an example value may sit.
const CHECK_WINDOW: usize = 2;

/// Values too common to signal that an example was copied.
const TRIVIAL_VALUES: &[&str] = &["0", "1", "-1", "True", "False", "None", "[]", "{}", "()"];

/// Flags returns of literals copied from the prompt, either right after an
/// equality check against another prompt value (`if n == 5: return 120`) or
/// as the whole body of a function.
pub fn detect_prompt_bias(facts: &CodeFacts, prompt: &str) -> Vec<Finding> {
    if prompt.trim().is_empty() {
        return Vec::new();
    }

    let mut findings = Vec::new();
    for ret in &facts.return_literals {
        let value = literal_value(&ret.text);
        if is_trivial(value) || !contains_token(prompt, value) {
            continue;
        }

        let message = if let Some(check) = example_check_before(facts, ret, prompt) {
            format!(
                "`{}` returns {} for the prompt's example `{}` instead of computing it",
                ret.function, ret.text, check
            )
        } else if is_single_return(facts, ret) {
            format!(
                "`{}` always returns {}, the example output from the prompt",
                ret.function, ret.text
            )
        } else {
            continue;
        };

        findings.push(
            Finding::new(BugPattern::PromptBiased, Severity::Warning, ret.line, message)
                .with_confidence(PROMPT_BIAS_CONFIDENCE),
        );
    }
    findings
}

/// An `==` comparison against a non-trivial prompt value shortly before the
/// return.
fn example_check_before(facts: &CodeFacts, ret: &ReturnLiteral, prompt: &str) -> Option<String> {
    let first = ret.line.saturating_sub(CHECK_WINDOW);
    facts
        .comparisons
        .iter()
        .filter(|c| c.operator == "==" && c.line >= first && c.line <= ret.line)
        .find_map(|c| {
            [&c.right, &c.left].into_iter().find_map(|side| {
                let value = literal_value(side);
                (is_literal(side) && !is_trivial(value) && contains_token(prompt, value))
                    .then(|| format!("{} == {}", c.left, c.right))
            })
        })
}

fn is_single_return(facts: &CodeFacts, ret: &ReturnLiteral) -> bool {
    facts
        .functions
        .iter()
        .filter(|f| f.name == ret.function)
        .any(|f| f.body.statement_count == 1 && f.line < ret.line)
}

fn is_literal(text: &str) -> bool {
    let text = text.trim();
    text.starts_with(['"', '\''])
        || text.parse::<f64>().is_ok()
        || (text.starts_with('-') && text[1..].parse::<f64>().is_ok())
}

/// Strip string prefixes and quotes: `'abc'` -> `abc`, `b"x"` -> `x`.
fn literal_value(text: &str) -> &str {
    let text = text.trim();
    let body = text.trim_start_matches(|c: char| "rRbBuUfF".contains(c));
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if let Some(inner) = body
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    text
}

fn is_trivial(value: &str) -> bool {
    value.chars().count() < 2 && value.parse::<i64>().map_or(true, |n| n.abs() <= 1)
        || TRIVIAL_VALUES.contains(&value)
}

/// `needle` occurs in `haystack` not glued to other word characters, so
/// `12` does not match inside `120`.
fn contains_token(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let is_word = |c: char| c.is_alphanumeric() || c == '_' || c == '.';
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        let glued_before = before.is_some_and(is_word) && needle.starts_with(is_word);
        let glued_after = after.is_some_and(|c| c.is_alphanumeric() || c == '_')
            && needle.ends_with(is_word);
        !glued_before && !glued_after
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::PythonAnalyzer;

    fn detect(source: &str, prompt: &str) -> Vec<Finding> {
        let facts = PythonAnalyzer::new().analyze(source).unwrap();
        detect_prompt_bias(&facts, prompt)
    }

    #[test]
    fn test_special_cased_example() {
        let prompt = "Write factorial(n). For example, factorial(5) should return 120.";
        let source = r#"
def factorial(n):
    if n == 5:
        return 120
    result = 1
    for i in range(2, n + 1):
        result *= i
    return result
"#;
        let findings = detect(source, prompt);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line, 4);
        assert_eq!(findings[0].pattern, BugPattern::PromptBiased);
        assert_eq!(findings[0].confidence, PROMPT_BIAS_CONFIDENCE);
    }

    #[test]
    fn test_constant_function() {
        let prompt = "Return the greeting. Example: greet() returns 'Hello, World'.";
        let findings = detect("def greet():\n    return 'Hello, World'\n", prompt);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("always returns"));
    }

    #[test]
    fn test_trivial_values_ignored() {
        let prompt = "Return 0 if the list is empty, otherwise 1.";
        let source = "def f(xs):\n    if xs == []:\n        return 0\n    return 1\n";
        assert!(detect(source, prompt).is_empty());
    }

    #[test]
    fn test_no_prompt_no_findings() {
        assert!(detect("def f():\n    return 120\n", "").is_empty());
    }

    #[test]
    fn test_token_boundaries() {
        assert!(contains_token("should return 120.", "120"));
        assert!(!contains_token("should return 1200", "120"));
        assert!(!contains_token("value x120", "120"));
        assert_eq!(literal_value("'abc'"), "abc");
        assert_eq!(literal_value("f\"x\""), "x");
        assert_eq!(literal_value("42"), "42");
    }
}
