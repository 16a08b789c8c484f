//! Fact structures extracted from the parsed-code tree.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Source location span with byte offsets and line/column positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Start byte offset (0-indexed).
    pub start_byte: usize,
    /// End byte offset (0-indexed, exclusive).
    pub end_byte: usize,
    /// Start line (1-indexed).
    pub start_line: usize,
    /// Start column (1-indexed).
    pub start_col: usize,
}

impl Span {
    /// Create a span from a tree-sitter node.
    pub fn from_node(node: tree_sitter::Node) -> Self {
        let start = node.start_position();
        Self {
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            start_line: start.row + 1, // tree-sitter is 0-indexed
            start_col: start.column + 1,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_col)
    }
}

/// Statically inferred type of a Python value.
///
/// Only literal-derived types are tracked; anything else is `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Str,
    Int,
    Float,
    Bool,
    NoneType,
    List,
    Dict,
    Set,
    Tuple,
    Unknown,
}

impl ValueType {
    /// The name CPython uses in error messages.
    pub fn python_name(&self) -> &'static str {
        match self {
            ValueType::Str => "str",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Bool => "bool",
            ValueType::NoneType => "NoneType",
            ValueType::List => "list",
            ValueType::Dict => "dict",
            ValueType::Set => "set",
            ValueType::Tuple => "tuple",
            ValueType::Unknown => "object",
        }
    }

    pub fn is_known(&self) -> bool {
        *self != ValueType::Unknown
    }

    /// int, float and bool all take part in arithmetic.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueType::Int | ValueType::Float | ValueType::Bool)
    }

    /// Types that support `len()` and iteration.
    pub fn is_sized(&self) -> bool {
        matches!(
            self,
            ValueType::Str | ValueType::List | ValueType::Dict | ValueType::Set | ValueType::Tuple
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.python_name())
    }
}

/// Identifier of a lexical scope: 0 is the module, otherwise the start byte
/// of the enclosing function or lambda.
pub type ScopeId = usize;

/// The module-level scope.
pub const MODULE_SCOPE: ScopeId = 0;

/// An import statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Full dotted module path (`os.path`), or the relative path (`.utils`).
    pub module: String,
    /// Names pulled in by `from module import a, b`.
    pub names: Vec<String>,
    /// Alias for `import module as alias`.
    pub alias: Option<String>,
    pub line: usize,
    pub is_relative: bool,
    pub is_star: bool,
}

impl Import {
    /// The top-level package (`numpy` for `numpy.linalg`).
    pub fn root(&self) -> &str {
        self.module
            .trim_start_matches('.')
            .split('.')
            .next()
            .unwrap_or("")
    }

    /// The name this import binds in the module namespace for `import x`.
    pub fn bound_name(&self) -> Option<&str> {
        if !self.names.is_empty() || self.is_relative {
            return None;
        }
        match &self.alias {
            Some(alias) => Some(alias.as_str()),
            None => Some(self.root()),
        }
    }
}

/// Kind of function parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Positional,
    VarArgs,
    KwArgs,
    KeywordOnly,
}

/// A function parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub has_default: bool,
    pub kind: ParamKind,
}

/// Shape of a function body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionBody {
    /// Statements excluding comments and the docstring.
    pub statement_count: usize,
    /// Body is only `pass`, `...` or a docstring.
    pub is_placeholder: bool,
    /// Body carries a TODO/FIXME marker.
    pub has_todo_marker: bool,
    /// Body is a single `raise NotImplementedError`.
    pub raises_not_implemented: bool,
}

/// A function or method definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub line: usize,
    /// Defined directly inside a class body.
    pub is_method: bool,
    /// Defined inside a class that inherits from something (ABC, Protocol, ...).
    pub in_derived_class: bool,
    /// Wrapped by at least one decorator.
    pub is_decorated: bool,
    /// Scope the function body opens.
    pub scope: ScopeId,
    /// Scope the definition lives in.
    pub parent_scope: ScopeId,
    pub body: FunctionBody,
}

impl FunctionDef {
    /// Accepts any number of positional arguments.
    pub fn has_varargs(&self) -> bool {
        self.params
            .iter()
            .any(|p| matches!(p.kind, ParamKind::VarArgs | ParamKind::KwArgs))
    }

    /// Inclusive range of accepted positional argument counts.
    pub fn positional_arity(&self) -> (usize, usize) {
        let positional: Vec<_> = self
            .params
            .iter()
            .filter(|p| p.kind == ParamKind::Positional)
            .collect();
        let required = positional.iter().filter(|p| !p.has_default).count();
        (required, positional.len())
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name)
    }
}

/// `name = value` where the value type could be inferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub scope: ScopeId,
    pub name: String,
    pub value_type: ValueType,
    pub line: usize,
}

/// `receiver.attribute`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeAccess {
    pub scope: ScopeId,
    /// Source text of the receiver expression.
    pub receiver: String,
    pub receiver_type: ValueType,
    pub attribute: String,
    pub line: usize,
    /// The access is immediately called (`x.foo()`).
    pub is_call: bool,
    /// The access is an assignment target (`x.foo = 1`).
    pub is_store: bool,
}

/// A call argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arg {
    pub text: String,
    pub value_type: ValueType,
    pub keyword: Option<String>,
    pub is_splat: bool,
    /// Element types for list/tuple/set literals.
    pub element_types: Vec<ValueType>,
}

/// A call expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub scope: ScopeId,
    /// Source text of the callee (`len`, `math.sqrt`, `", ".join`).
    pub callee: String,
    /// Type of the receiver when the callee is an attribute.
    pub receiver_type: Option<ValueType>,
    pub args: Vec<Arg>,
    pub line: usize,
}

/// A binary arithmetic expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryOp {
    pub scope: ScopeId,
    pub operator: String,
    pub left_type: ValueType,
    pub right_type: ValueType,
    pub left_text: String,
    pub right_text: String,
    pub line: usize,
}

/// A `/`, `//` or `%` expression whose denominator is not a literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Division {
    pub scope: ScopeId,
    pub operator: String,
    /// Source text of the denominator.
    pub denominator: String,
    /// The bare name the denominator depends on (`b` or `items` for `len(items)`).
    pub depends_on: Option<String>,
    /// Left-hand side is a string (`%` formatting).
    pub left_is_str: bool,
    pub line: usize,
}

/// `target[index]` with a constant index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscript {
    pub scope: ScopeId,
    pub target: String,
    pub index: String,
    pub line: usize,
    pub is_store: bool,
}

/// A comparison between exactly two operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub operator: String,
    pub left: String,
    pub right: String,
    pub right_type: ValueType,
    /// Either side calls something, so it may differ between evaluations.
    pub has_call: bool,
    pub line: usize,
}

/// `if` statement whose consequence and `else` block are textually identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdenticalBranches {
    pub line: usize,
}

/// `x = x`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfAssignment {
    pub name: String,
    pub line: usize,
}

/// A `return <literal>` inside a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnLiteral {
    pub function: String,
    pub text: String,
    pub line: usize,
}

/// An identifier read somewhere in the code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameUse {
    pub name: String,
    pub line: usize,
}

/// Guard information collected per scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeGuards {
    /// Names that appear in an `if`/`while`/`assert`/ternary condition.
    pub checked_names: HashSet<String>,
    /// The scope catches ZeroDivisionError (or everything).
    pub catches_zero_division: bool,
    /// The scope catches IndexError/ValueError (or everything).
    pub catches_lookup_errors: bool,
}

/// Kind of syntax issue found in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxIssueKind {
    /// Tokens tree-sitter could not place.
    Error,
    /// A token the grammar requires but the source lacks.
    Missing,
    /// Python 2 `print x` statement.
    Python2Print,
}

/// A syntax problem in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxIssue {
    pub kind: SyntaxIssueKind,
    pub line: usize,
    pub column: usize,
    pub snippet: String,
    /// Issue sits at the very end of the source.
    pub at_eof: bool,
}

/// Everything the detectors know about one code sample.
#[derive(Debug, Clone, Default)]
pub struct CodeFacts {
    pub line_count: usize,
    pub has_parse_errors: bool,
    pub imports: Vec<Import>,
    pub functions: Vec<FunctionDef>,
    pub classes: Vec<String>,
    pub assignments: Vec<Assignment>,
    pub attributes: Vec<AttributeAccess>,
    pub calls: Vec<Call>,
    pub binary_ops: Vec<BinaryOp>,
    pub divisions: Vec<Division>,
    pub subscripts: Vec<Subscript>,
    pub comparisons: Vec<Comparison>,
    pub identical_branches: Vec<IdenticalBranches>,
    pub self_assignments: Vec<SelfAssignment>,
    pub return_literals: Vec<ReturnLiteral>,
    pub name_uses: Vec<NameUse>,
    pub defined_names: HashSet<String>,
    pub guards: std::collections::HashMap<ScopeId, ScopeGuards>,
    /// Names bound in each scope.
    pub scope_bindings: std::collections::HashMap<ScopeId, HashSet<String>>,
    /// Enclosing scope of each function or lambda scope.
    pub scope_parents: std::collections::HashMap<ScopeId, ScopeId>,
    pub syntax_issues: Vec<SyntaxIssue>,
    /// The source stops in the middle of a construct.
    pub truncated: bool,
    /// Lines holding TODO/FIXME/placeholder comments.
    pub todo_lines: Vec<usize>,
}

impl CodeFacts {
    /// Whether a `from x import *` hides which names exist.
    pub fn has_star_import(&self) -> bool {
        self.imports.iter().any(|i| i.is_star)
    }

    /// The function whose body opens `scope`.
    pub fn function_for_scope(&self, scope: ScopeId) -> Option<&FunctionDef> {
        if scope == MODULE_SCOPE {
            return None;
        }
        self.functions.iter().find(|f| f.scope == scope)
    }

    /// `name` is bound in `scope` or an enclosing function scope, so it does
    /// not refer to the module-level binding there.
    pub fn binds_locally(&self, scope: ScopeId, name: &str) -> bool {
        let mut current = scope;
        while current != MODULE_SCOPE {
            if self
                .scope_bindings
                .get(&current)
                .map_or(false, |names| names.contains(name))
            {
                return true;
            }
            current = self
                .scope_parents
                .get(&current)
                .copied()
                .unwrap_or(MODULE_SCOPE);
        }
        false
    }

    /// Guards recorded for a scope, or an empty set.
    pub fn guards_for(&self, scope: ScopeId) -> ScopeGuards {
        self.guards.get(&scope).cloned().unwrap_or_default()
    }

    /// Module a bound name refers to (`np` -> `numpy` for `import numpy as np`).
    pub fn module_for_name(&self, name: &str) -> Option<&Import> {
        self.imports
            .iter()
            .rev()
            .find(|i| i.bound_name() == Some(name))
    }
}
