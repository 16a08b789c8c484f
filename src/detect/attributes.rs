//! Wrong attribute detection on values of known builtin type.

use crate::analysis::CodeFacts;

use super::builtins::{attributes_of, ATTRIBUTE_SUGGESTIONS};
use super::{BugPattern, Finding, Severity};

/// Flags `[].push(x)`, `"".length` and similar accesses that raise
/// AttributeError at runtime.
pub fn detect_wrong_attributes(facts: &CodeFacts) -> Vec<Finding> {
    let mut findings = Vec::new();

    for access in &facts.attributes {
        if access.is_store || access.attribute.starts_with("__") {
            continue;
        }
        let Some(known) = attributes_of(access.receiver_type) else {
            continue;
        };
        if known.contains(access.attribute.as_str()) {
            continue;
        }

        let mut message = format!(
            "'{}' object has no attribute '{}'",
            access.receiver_type, access.attribute
        );
        if let Some(suggestion) = ATTRIBUTE_SUGGESTIONS.get(access.attribute.as_str()) {
            message.push_str(&format!(" (use {} instead)", suggestion));
        }

        findings.push(Finding::new(
            BugPattern::WrongAttribute,
            Severity::Error,
            access.line,
            message,
        ));
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::PythonAnalyzer;

    fn detect(source: &str) -> Vec<Finding> {
        let facts = PythonAnalyzer::new().analyze(source).unwrap();
        detect_wrong_attributes(&facts)
    }

    #[test]
    fn test_list_push() {
        let findings = detect("stack = []\nstack.push(1)\n");
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("'list' object has no attribute 'push'"));
        assert!(findings[0].message.contains("append"));
    }

    #[test]
    fn test_string_length() {
        let findings = detect("name = input()\nn = name.length\n");
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("'str'"));
    }

    #[test]
    fn test_valid_methods() {
        let source = "words = 'a b'.split()\nwords.append('c')\nd = {}\nd.get('k')\n";
        assert!(detect(source).is_empty());
    }

    #[test]
    fn test_unknown_receiver_ignored() {
        assert!(detect("def f(items):\n    items.push(1)\n").is_empty());
    }

    #[test]
    fn test_reassigned_name_ignored() {
        assert!(detect("x = []\nx = make_stack()\nx.push(1)\n").is_empty());
    }

    #[test]
    fn test_global_reassignment_ignored() {
        let source =
            "count = 0\ndef set_name():\n    global count\n    count = 'x'\nprint(count.upper())\n";
        assert!(detect(source).is_empty());
    }
}
