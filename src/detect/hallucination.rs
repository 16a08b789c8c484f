//! Hallucinated object detection.
//!
//! Three kinds of invented names are caught statically:
//! - names that are read but never defined, imported or built in
//! - members of well-known stdlib modules that do not exist (`math.sqroot`)
//! - third-party packages, which are handed to the registry check

use std::collections::HashSet;

use crate::analysis::{CodeFacts, Import};

use super::builtins::{module_has_member, module_members, BUILTIN_NAMES};
use super::stdlib::is_stdlib;
use super::{BugPattern, DetectionResult, Finding, Severity};

pub fn detect_hallucinations(facts: &CodeFacts) -> DetectionResult {
    let mut result = DetectionResult::new();

    result.extend(undefined_names(facts));
    result.extend(unknown_module_members(facts));
    result.imports_to_verify = third_party_imports(facts);

    result
}

fn undefined_names(facts: &CodeFacts) -> Vec<Finding> {
    // A star import can define anything.
    if facts.has_star_import() {
        return Vec::new();
    }

    let mut reported = HashSet::new();
    let mut findings = Vec::new();

    for name_use in &facts.name_uses {
        let name = name_use.name.as_str();
        if facts.defined_names.contains(name) || BUILTIN_NAMES.contains(name) {
            continue;
        }
        if !reported.insert(name) {
            continue;
        }
        findings.push(Finding::new(
            BugPattern::HallucinatedObject,
            Severity::Error,
            name_use.line,
            format!("name `{}` is not defined", name),
        ));
    }

    findings
}

fn unknown_module_members(facts: &CodeFacts) -> Vec<Finding> {
    let mut findings = Vec::new();

    // `from math import sqroot`
    for import in &facts.imports {
        if import.is_relative || import.is_star || module_members(&import.module).is_none() {
            continue;
        }
        for name in &import.names {
            if !module_has_member(&import.module, name) {
                findings.push(Finding::new(
                    BugPattern::HallucinatedObject,
                    Severity::Error,
                    import.line,
                    format!("cannot import `{}` from `{}`", name, import.module),
                ));
            }
        }
    }

    // `math.sqroot(x)`, `np.linalg.foo` is left alone
    for access in &facts.attributes {
        if access.is_store {
            continue;
        }
        let Some(module) = resolve_module(facts, &access.receiver) else {
            continue;
        };
        if module_members(&module).is_some() && !module_has_member(&module, &access.attribute) {
            findings.push(Finding::new(
                BugPattern::HallucinatedObject,
                Severity::Error,
                access.line,
                format!(
                    "module `{}` has no attribute `{}`",
                    module, access.attribute
                ),
            ));
        }
    }

    findings
}

/// Dotted module path a receiver expression refers to, when it starts with
/// an imported name (`np` -> `numpy`, `os.path` -> `os.path`).
fn resolve_module(facts: &CodeFacts, receiver: &str) -> Option<String> {
    let mut parts = receiver.split('.');
    let head = parts.next()?;
    if !receiver
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
    {
        return None;
    }

    let import = facts.module_for_name(head)?;
    let rest: Vec<&str> = parts.collect();
    let base = match &import.alias {
        Some(_) => import.module.clone(),
        None => import.root().to_string(),
    };
    if rest.is_empty() {
        Some(base)
    } else {
        Some(format!("{}.{}", base, rest.join(".")))
    }
}

/// Top-level packages that are neither stdlib, relative nor defined locally.
fn third_party_imports(facts: &CodeFacts) -> Vec<String> {
    let mut packages: Vec<String> = Vec::new();
    for import in &facts.imports {
        if !is_third_party(facts, import) {
            continue;
        }
        let root = import.root().to_string();
        if !packages.contains(&root) {
            packages.push(root);
        }
    }
    packages
}

fn is_third_party(facts: &CodeFacts, import: &Import) -> bool {
    let root = import.root();
    !import.is_relative
        && !root.is_empty()
        && root != "__future__"
        && !is_stdlib(root)
        && !facts.classes.iter().any(|c| c == root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::PythonAnalyzer;

    fn detect(source: &str) -> DetectionResult {
        let facts = PythonAnalyzer::new().analyze(source).unwrap();
        detect_hallucinations(&facts)
    }

    #[test]
    fn test_defined_names_are_clean() {
        let source = r#"
import math
from collections import Counter

def count_words(text):
    counts = Counter(text.split())
    return {w: math.log(c) for w, c in counts.items()}

print(count_words("a b a"))
"#;
        let result = detect(source);
        assert!(result.findings.is_empty(), "{:?}", result.findings);
        assert!(result.imports_to_verify.is_empty());
    }

    #[test]
    fn test_undefined_function() {
        let source = "def f(xs):\n    return calculate_median(xs)\n";
        let result = detect(source);
        assert_eq!(result.findings.len(), 1);
        assert!(result.findings[0].message.contains("calculate_median"));
        assert_eq!(result.findings[0].line, 2);
    }

    #[test]
    fn test_undefined_reported_once() {
        let result = detect("a = helper(1)\nb = helper(2)\n");
        assert_eq!(result.findings.len(), 1);
    }

    #[test]
    fn test_star_import_suppresses() {
        let result = detect("from helpers import *\nx = helper(1)\n");
        assert!(result.findings.is_empty());
    }

    #[test]
    fn test_unknown_math_member() {
        let result = detect("import math\nroot = math.sqroot(16)\n");
        assert_eq!(result.findings.len(), 1);
        assert!(result.findings[0].message.contains("sqroot"));
    }

    #[test]
    fn test_unknown_from_import() {
        let result = detect("from math import sqroot\n");
        assert_eq!(result.findings.len(), 1);
        assert!(result.findings[0].message.contains("cannot import"));
    }

    #[test]
    fn test_os_path_members() {
        let result = detect("import os\np = os.path.joinpath('a', 'b')\nq = os.path.join('a')\n");
        assert_eq!(result.findings.len(), 1);
        assert!(result.findings[0].message.contains("os.path"));
    }

    #[test]
    fn test_third_party_collected() {
        let result = detect("import numpy as np\nimport requests\nfrom . import local\n");
        assert_eq!(result.imports_to_verify, vec!["numpy", "requests"]);
    }
}
