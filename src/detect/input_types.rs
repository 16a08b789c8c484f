//! Wrong input type detection.
//!
//! Three checks, all on statically known types only:
//! - arithmetic between incompatible builtin types (`"a" + 1`)
//! - builtin calls given arguments they reject (`len(5)`, `range(2.5)`)
//! - calls to functions defined in the sample with the wrong arity

use std::collections::HashMap;

use crate::analysis::{binary_result, Arg, Call, CodeFacts, FunctionDef, ValueType, MODULE_SCOPE};

use super::builtins::MATH_SCALAR_FUNCTIONS;
use super::{BugPattern, Finding, Severity};

pub fn detect_wrong_input_types(facts: &CodeFacts) -> Vec<Finding> {
    let mut findings = Vec::new();

    findings.extend(incompatible_operands(facts));
    for call in &facts.calls {
        if let Some(message) = builtin_argument_error(facts, call) {
            findings.push(finding(call.line, message));
        }
    }
    findings.extend(arity_mismatches(facts));

    findings
}

fn finding(line: usize, message: String) -> Finding {
    Finding::new(BugPattern::WrongInputType, Severity::Error, line, message)
}

fn incompatible_operands(facts: &CodeFacts) -> Vec<Finding> {
    facts
        .binary_ops
        .iter()
        .filter(|op| op.left_type.is_known() && op.right_type.is_known())
        .filter(|op| binary_result(op.left_type, &op.operator, op.right_type) == ValueType::Unknown)
        .map(|op| {
            finding(
                op.line,
                format!(
                    "unsupported operand type(s) for {}: '{}' and '{}' in `{} {} {}`",
                    op.operator,
                    op.left_type,
                    op.right_type,
                    op.left_text,
                    op.operator,
                    op.right_text
                ),
            )
        })
        .collect()
}

fn positional(call: &Call) -> Vec<&Arg> {
    call.args
        .iter()
        .filter(|a| a.keyword.is_none() && !a.is_splat)
        .collect()
}

/// The TypeError message CPython would raise, if any.
fn builtin_argument_error(facts: &CodeFacts, call: &Call) -> Option<String> {
    let args = positional(call);

    // Shadowed builtins behave however the sample defines them.
    if facts.defined_names.contains(call.callee.as_str()) {
        return None;
    }

    match call.callee.as_str() {
        "len" => {
            let arg = args.first()?;
            match arg.value_type {
                ValueType::Int | ValueType::Float | ValueType::Bool | ValueType::NoneType => Some(
                    format!("object of type '{}' has no len()", arg.value_type),
                ),
                _ => None,
            }
        }
        "range" => args
            .iter()
            .find(|a| {
                a.value_type.is_known()
                    && !matches!(a.value_type, ValueType::Int | ValueType::Bool)
            })
            .map(|a| {
                format!(
                    "'{}' object cannot be interpreted as an integer in range()",
                    a.value_type
                )
            }),
        "sum" => {
            let arg = args.first()?;
            let has_start = args.len() > 1 || call.args.iter().any(|a| a.keyword.is_some());
            match arg.value_type {
                ValueType::Str => Some("sum() can't sum strings; use ''.join(seq)".to_string()),
                ValueType::Int | ValueType::Float | ValueType::Bool | ValueType::NoneType => {
                    Some(format!("'{}' object is not iterable", arg.value_type))
                }
                _ if !has_start && arg.element_types.contains(&ValueType::Str) => Some(
                    "unsupported operand type(s) for +: 'int' and 'str' in sum()".to_string(),
                ),
                _ => None,
            }
        }
        "abs" | "round" => {
            let arg = args.first()?;
            if arg.value_type.is_known() && !arg.value_type.is_numeric() {
                Some(format!(
                    "bad operand type for {}(): '{}'",
                    call.callee, arg.value_type
                ))
            } else {
                None
            }
        }
        "int" | "float" => {
            let arg = args.first()?;
            match arg.value_type {
                ValueType::List
                | ValueType::Dict
                | ValueType::Set
                | ValueType::Tuple
                | ValueType::NoneType => Some(format!(
                    "{}() argument must be a string or a number, not '{}'",
                    call.callee, arg.value_type
                )),
                _ => None,
            }
        }
        callee if callee.ends_with(".join") && call.receiver_type == Some(ValueType::Str) => {
            let arg = args.first()?;
            if let Some(bad) = arg
                .element_types
                .iter()
                .find(|t| t.is_known() && **t != ValueType::Str)
            {
                return Some(format!(
                    "sequence item: expected str instance, {} found",
                    bad
                ));
            }
            match arg.value_type {
                ValueType::Int | ValueType::Float | ValueType::Bool | ValueType::NoneType => {
                    Some(format!("can only join an iterable, not '{}'", arg.value_type))
                }
                _ => None,
            }
        }
        callee => math_argument_error(facts, callee, &args),
    }
}

/// `math.sqrt("4")` and friends, for the functions that take only numbers.
fn math_argument_error(facts: &CodeFacts, callee: &str, args: &[&Arg]) -> Option<String> {
    let (receiver, function) = callee.rsplit_once('.')?;
    let import = facts.module_for_name(receiver)?;
    if import.module != "math" || !MATH_SCALAR_FUNCTIONS.contains(function) {
        return None;
    }
    let bad = args
        .iter()
        .find(|a| a.value_type.is_known() && !a.value_type.is_numeric())?;
    Some(format!(
        "must be real number, not {} (in math.{})",
        bad.value_type, function
    ))
}

/// Calls to module-level functions with too many or too few arguments.
fn arity_mismatches(facts: &CodeFacts) -> Vec<Finding> {
    let mut definitions: HashMap<&str, Vec<&FunctionDef>> = HashMap::new();
    for function in &facts.functions {
        // Decorators may replace the signature.
        if function.parent_scope == MODULE_SCOPE && !function.is_method && !function.is_decorated
        {
            definitions
                .entry(function.name.as_str())
                .or_default()
                .push(function);
        }
    }

    let mut findings = Vec::new();
    for call in &facts.calls {
        // Redefined functions and classes sharing the name are ambiguous.
        let Some([function]) = definitions.get(call.callee.as_str()).map(|d| d.as_slice()) else {
            continue;
        };
        if facts.classes.iter().any(|c| c == &call.callee)
            || call.args.iter().any(|a| a.is_splat)
            || facts.binds_locally(call.scope, &call.callee)
        {
            continue;
        }
        if let Some(message) = arity_error(function, call) {
            findings.push(finding(call.line, message));
        }
    }
    findings
}

fn arity_error(function: &FunctionDef, call: &Call) -> Option<String> {
    let accepts_kwargs = function
        .params
        .iter()
        .any(|p| p.kind == crate::analysis::ParamKind::KwArgs);
    let accepts_varargs = function
        .params
        .iter()
        .any(|p| p.kind == crate::analysis::ParamKind::VarArgs);

    let given = positional(call).len();
    let (required, max) = function.positional_arity();

    if given > max && !accepts_varargs {
        return Some(format!(
            "{}() takes {} positional argument{} but {} were given",
            function.name,
            max,
            if max == 1 { "" } else { "s" },
            given
        ));
    }

    let keywords: Vec<&str> = call.args.iter().filter_map(|a| a.keyword.as_deref()).collect();
    if !accepts_kwargs {
        if let Some(unknown) = keywords.iter().find(|k| !function.has_param(k)) {
            return Some(format!(
                "{}() got an unexpected keyword argument '{}'",
                function.name, unknown
            ));
        }
    }

    let satisfied_by_keyword = function
        .params
        .iter()
        .filter(|p| p.kind == crate::analysis::ParamKind::Positional && !p.has_default)
        .skip(given)
        .filter(|p| keywords.contains(&p.name.as_str()))
        .count();
    if given + satisfied_by_keyword < required {
        let missing = required - given - satisfied_by_keyword;
        return Some(format!(
            "{}() missing {} required positional argument{}",
            function.name,
            missing,
            if missing == 1 { "" } else { "s" }
        ));
    }

    let missing_keyword_only = function.params.iter().find(|p| {
        p.kind == crate::analysis::ParamKind::KeywordOnly
            && !p.has_default
            && !keywords.contains(&p.name.as_str())
    });
    missing_keyword_only.map(|p| {
        format!(
            "{}() missing required keyword-only argument '{}'",
            function.name, p.name
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::PythonAnalyzer;

    fn detect(source: &str) -> Vec<Finding> {
        let facts = PythonAnalyzer::new().analyze(source).unwrap();
        detect_wrong_input_types(&facts)
    }

    #[test]
    fn test_str_plus_int() {
        let findings = detect("age = input('age? ')\nprint(age + 1)\n");
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("'str' and 'int'"));
    }

    #[test]
    fn test_valid_arithmetic() {
        let source = "a = 1\nb = 2.5\nc = a * b\ns = 'x' * 3\nl = [1] + [2]\nm = 'n=%d' % a\n";
        assert!(detect(source).is_empty());
    }

    #[test]
    fn test_builtin_arguments() {
        assert_eq!(detect("n = len(5)\n").len(), 1);
        assert_eq!(detect("for i in range(2.5):\n    pass\n").len(), 1);
        assert_eq!(detect("total = sum('abc')\n").len(), 1);
        assert_eq!(detect("s = ', '.join([1, 2, 3])\n").len(), 1);
        assert!(detect("s = ', '.join(['a', 'b'])\n").is_empty());
        assert!(detect("n = len([1, 2])\n").is_empty());
    }

    #[test]
    fn test_math_string_argument() {
        let findings = detect("import math\nr = math.sqrt('16')\n");
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("math.sqrt"));
    }

    #[test]
    fn test_math_iterable_functions() {
        let source = "import math\nprint(math.fsum([0.1, 0.2]), math.dist((0, 0), (1, 1)))\np = math.prod([1, 2])\n";
        assert!(detect(source).is_empty());
    }

    #[test]
    fn test_shadowed_builtin() {
        assert!(detect("def len(x):\n    return 0\nn = len(5)\n").is_empty());
    }

    #[test]
    fn test_arity_mismatch() {
        let source = r#"
def area(width, height):
    return width * height

a = area(3)
b = area(3, 4, 5)
c = area(3, height=4)
d = area(width=3, height=4)
e = area(3, depth=4)
"#;
        let findings = detect(source);
        let lines: Vec<usize> = findings.iter().map(|f| f.line).collect();
        assert_eq!(lines, vec![5, 6, 9]);
        assert!(findings[0].message.contains("missing 1 required"));
        assert!(findings[1].message.contains("takes 2 positional arguments but 3"));
        assert!(findings[2].message.contains("unexpected keyword argument 'depth'"));
    }

    #[test]
    fn test_decorated_function_arity_unknown() {
        let source = r#"
def deco(fn):
    def wrapper(*args, **kwargs):
        return fn(args[0])
    return wrapper

@deco
def f(a):
    return a

print(f(1, 2))
"#;
        assert!(detect(source).is_empty());
    }

    #[test]
    fn test_local_definition_shadows_module_function() {
        let source = r#"
def f(a):
    return a

def g():
    def f(a, b):
        return a + b
    return f(1, 2)

def h(f):
    return f(1, 2, 3)
"#;
        assert!(detect(source).is_empty());
    }

    #[test]
    fn test_varargs_accept_anything() {
        let source = "def log(*parts, **extra):\n    pass\nlog(1, 2, 3, level=2)\n";
        assert!(detect(source).is_empty());
    }
}
