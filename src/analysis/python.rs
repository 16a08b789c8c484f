//! Python fact extraction using tree-sitter.
//!
//! Extraction runs in two passes over the tree. The first pass collects
//! bindings (definitions, imports, assignments, guards, syntax issues) so
//! literal types can be resolved; the second pass records the expression
//! facts the detectors look at, typed with what the first pass learned.

use std::collections::{HashMap, HashSet};

use lazy_static::lazy_static;
use regex::Regex;
use streaming_iterator::StreamingIterator;
use tree_sitter::{Language, Node, Parser, Query, QueryCursor};

use crate::analysis::{
    Arg, Assignment, AttributeAccess, BinaryOp, Call, CodeFacts, Comparison, Division, FunctionBody,
    FunctionDef, IdenticalBranches, Import, NameUse, Param, ParamKind, ParsedSource,
    ReturnLiteral, ScopeId, SelfAssignment, Span, Subscript, SyntaxIssue, SyntaxIssueKind,
    ValueType, MODULE_SCOPE,
};

/// Tree-sitter query for extracting imports.
const IMPORT_QUERY: &str = r#"
(import_statement) @import
(import_from_statement) @import_from
"#;

lazy_static! {
    static ref MARKER_RE: Regex = Regex::new(
        r"(?i)\b(TODO|FIXME|XXX)\b|your code here|implement (me|this)|not implemented|fill (this )?in|placeholder"
    )
    .unwrap();
}

/// Arithmetic operators recorded as `BinaryOp` facts.
const ARITHMETIC_OPS: &[&str] = &["+", "-", "*", "/", "//", "%", "**", "@"];

pub struct PythonAnalyzer {
    language: Language,
}

impl PythonAnalyzer {
    pub fn new() -> Self {
        Self {
            language: tree_sitter_python::LANGUAGE.into(),
        }
    }

    fn create_parser(&self) -> anyhow::Result<Parser> {
        let mut parser = Parser::new();
        parser.set_language(&self.language)?;
        Ok(parser)
    }

    /// Parse Python source. Syntax errors do not fail the parse; they show up
    /// as ERROR and MISSING nodes in the tree.
    pub fn parse(&self, source: &str) -> anyhow::Result<ParsedSource> {
        let mut parser = self.create_parser()?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| anyhow::anyhow!("tree-sitter failed to parse Python source"))?;

        Ok(ParsedSource {
            tree,
            source: source.as_bytes().to_vec(),
        })
    }

    /// Parse and extract in one step.
    pub fn analyze(&self, source: &str) -> anyhow::Result<CodeFacts> {
        let parsed = self.parse(source)?;
        self.extract_facts(&parsed)
    }

    pub fn extract_facts(&self, parsed: &ParsedSource) -> anyhow::Result<CodeFacts> {
        let root = parsed.tree.root_node();
        let source = parsed.source_str();

        let mut bindings = BindingPass::new(parsed);
        bindings.visit(root, Ctx::module());
        let env = bindings.resolve_types();
        let mut facts = bindings.finish(&env);

        facts.imports = self.extract_imports(parsed)?;

        let mut expressions = ExpressionPass {
            parsed,
            env: &env,
            facts: &mut facts,
            functions: Vec::new(),
        };
        expressions.visit(root, MODULE_SCOPE);

        facts.line_count = source.lines().count();
        facts.has_parse_errors = parsed.has_errors();
        facts.truncated =
            facts.syntax_issues.iter().any(|i| i.at_eof) && ends_mid_construct(source);
        facts.syntax_issues.sort_by_key(|i| (i.line, i.column));
        facts.todo_lines.sort_unstable();
        facts.todo_lines.dedup();

        Ok(facts)
    }

    fn extract_imports(&self, parsed: &ParsedSource) -> anyhow::Result<Vec<Import>> {
        let query = Query::new(&self.language, IMPORT_QUERY)?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, parsed.tree.root_node(), &parsed.source[..]);

        let mut imports = Vec::new();
        while let Some(m) = matches.next() {
            for capture in m.captures {
                let node = capture.node;
                match query.capture_names()[capture.index as usize] {
                    "import" => imports.extend(plain_imports(parsed, node)),
                    "import_from" => imports.extend(from_import(parsed, node)),
                    _ => {}
                }
            }
        }

        imports.sort_by_key(|i| i.line);
        Ok(imports)
    }
}

impl Default for PythonAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// `import a.b, c as d`
fn plain_imports(parsed: &ParsedSource, node: Node) -> Vec<Import> {
    let line = line_of(node);
    let mut cursor = node.walk();
    node.children_by_field_name("name", &mut cursor)
        .map(|child| {
            let (module, alias) = match child.kind() {
                "aliased_import" => (
                    child
                        .child_by_field_name("name")
                        .map(|n| parsed.node_text(n).to_string())
                        .unwrap_or_default(),
                    child
                        .child_by_field_name("alias")
                        .map(|n| parsed.node_text(n).to_string()),
                ),
                _ => (parsed.node_text(child).to_string(), None),
            };
            Import {
                module,
                names: Vec::new(),
                alias,
                line,
                is_relative: false,
                is_star: false,
            }
        })
        .collect()
}

/// `from module import a, b as c` and `from module import *`
fn from_import(parsed: &ParsedSource, node: Node) -> Option<Import> {
    let module_node = node.child_by_field_name("module_name")?;

    let mut names = Vec::new();
    let mut cursor = node.walk();
    for child in node.children_by_field_name("name", &mut cursor) {
        let name_node = match child.kind() {
            "aliased_import" => child.child_by_field_name("name").unwrap_or(child),
            _ => child,
        };
        names.push(parsed.node_text(name_node).to_string());
    }

    Some(Import {
        module: parsed.node_text(module_node).to_string(),
        names,
        alias: None,
        line: line_of(node),
        is_relative: module_node.kind() == "relative_import",
        is_star: all_children(node)
            .iter()
            .any(|c| c.kind() == "wildcard_import"),
    })
}

fn line_of(node: Node) -> usize {
    node.start_position().row + 1
}

fn all_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

/// Named children without comments.
fn operands(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .collect()
}

fn is_field(parent: Node, field: &str, node: Node) -> bool {
    parent.child_by_field_name(field).map(|n| n.id()) == Some(node.id())
}

fn has_descendant(node: Node, kind: &str) -> bool {
    operands(node)
        .into_iter()
        .any(|c| c.kind() == kind || has_descendant(c, kind))
}

/// Scope opened by a function or lambda node. Offset by one so a definition
/// at byte 0 never collides with the module scope.
fn scope_of(node: Node) -> ScopeId {
    node.start_byte() + 1
}

/// The source ends inside an open bracket or right after an operator.
fn ends_mid_construct(source: &str) -> bool {
    let trimmed = source.trim_end();
    let dangling = trimmed.ends_with(|c: char| {
        matches!(
            c,
            '(' | '[' | '{' | ',' | ':' | '=' | '+' | '-' | '*' | '/' | '\\' | '.'
        )
    });
    dangling || bracket_depth(trimmed) > 0
}

/// Net count of unclosed brackets outside string literals.
fn bracket_depth(source: &str) -> i64 {
    let mut depth = 0i64;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for line in source.lines() {
        for c in line.chars() {
            if let Some(q) = quote {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '#' => break,
                '"' | '\'' => quote = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                _ => {}
            }
        }
        // Triple-quoted strings are rare in truncated tails; reset per line.
        quote = None;
    }
    depth
}

/// Literal type of a node without looking at names.
fn literal_type(parsed: &ParsedSource, node: Node) -> ValueType {
    match node.kind() {
        "string" | "concatenated_string" => {
            let text = parsed.node_text(node).to_ascii_lowercase();
            if text.starts_with('b') || text.starts_with("rb") {
                ValueType::Unknown
            } else {
                ValueType::Str
            }
        }
        "integer" => ValueType::Int,
        "float" => ValueType::Float,
        "true" | "false" => ValueType::Bool,
        "none" => ValueType::NoneType,
        "list" | "list_comprehension" => ValueType::List,
        "dictionary" | "dictionary_comprehension" => ValueType::Dict,
        "set" | "set_comprehension" => ValueType::Set,
        "tuple" | "expression_list" => ValueType::Tuple,
        _ => ValueType::Unknown,
    }
}

/// Result type of `left op right` for the builtin types, `Unknown` when the
/// operation is unsupported or depends on runtime values.
pub(crate) fn binary_result(left: ValueType, op: &str, right: ValueType) -> ValueType {
    use ValueType::*;
    match (left, op, right) {
        (Str, "+", Str) => Str,
        (Str, "*", Int) | (Int, "*", Str) | (Str, "*", Bool) | (Bool, "*", Str) => Str,
        (Str, "%", _) => Str,
        (List, "+", List) => List,
        (List, "*", Int) | (Int, "*", List) => List,
        (Tuple, "+", Tuple) => Tuple,
        (Tuple, "*", Int) | (Int, "*", Tuple) => Tuple,
        (Set, "|" | "&" | "-" | "^", Set) => Set,
        (Dict, "|", Dict) => Dict,
        (l, "/", r) if l.is_numeric() && r.is_numeric() => Float,
        (l, _, r) if l.is_numeric() && r.is_numeric() => {
            if l == Float || r == Float {
                Float
            } else {
                Int
            }
        }
        _ => Unknown,
    }
}

/// Literal types resolved per scope.
struct TypeEnv {
    types: HashMap<(ScopeId, String), ValueType>,
    bound: HashMap<ScopeId, HashSet<String>>,
}

impl TypeEnv {
    fn lookup(&self, scope: ScopeId, name: &str) -> ValueType {
        if let Some(t) = self.types.get(&(scope, name.to_string())) {
            return *t;
        }
        if scope == MODULE_SCOPE {
            return ValueType::Unknown;
        }
        let bound_locally = self
            .bound
            .get(&scope)
            .map_or(false, |names| names.contains(name));
        if bound_locally {
            return ValueType::Unknown;
        }
        self.types
            .get(&(MODULE_SCOPE, name.to_string()))
            .copied()
            .unwrap_or(ValueType::Unknown)
    }

    fn type_of(&self, parsed: &ParsedSource, node: Node, scope: ScopeId) -> ValueType {
        match node.kind() {
            "identifier" => self.lookup(scope, parsed.node_text(node)),
            "parenthesized_expression" => operands(node)
                .first()
                .map_or(ValueType::Unknown, |inner| self.type_of(parsed, *inner, scope)),
            "not_operator" | "comparison_operator" => ValueType::Bool,
            "unary_operator" => {
                let operand = node
                    .child_by_field_name("argument")
                    .map_or(ValueType::Unknown, |arg| self.type_of(parsed, arg, scope));
                match operand {
                    ValueType::Int | ValueType::Float => operand,
                    ValueType::Bool => ValueType::Int,
                    _ => ValueType::Unknown,
                }
            }
            "binary_operator" => {
                let (Some(left), Some(op), Some(right)) = (
                    node.child_by_field_name("left"),
                    node.child_by_field_name("operator"),
                    node.child_by_field_name("right"),
                ) else {
                    return ValueType::Unknown;
                };
                binary_result(
                    self.type_of(parsed, left, scope),
                    op.kind(),
                    self.type_of(parsed, right, scope),
                )
            }
            "call" => self.call_type(parsed, node, scope),
            _ => literal_type(parsed, node),
        }
    }

    fn call_type(&self, parsed: &ParsedSource, node: Node, scope: ScopeId) -> ValueType {
        let Some(function) = node.child_by_field_name("function") else {
            return ValueType::Unknown;
        };

        match function.kind() {
            "identifier" => match parsed.node_text(function) {
                "str" | "input" | "repr" | "chr" | "format" | "hex" | "bin" | "oct" => {
                    ValueType::Str
                }
                "int" | "len" | "ord" => ValueType::Int,
                "float" => ValueType::Float,
                "bool" | "isinstance" | "callable" | "hasattr" => ValueType::Bool,
                "list" | "sorted" => ValueType::List,
                "dict" => ValueType::Dict,
                "set" => ValueType::Set,
                "tuple" => ValueType::Tuple,
                _ => ValueType::Unknown,
            },
            "attribute" => {
                let receiver = function
                    .child_by_field_name("object")
                    .map_or(ValueType::Unknown, |obj| self.type_of(parsed, obj, scope));
                let method = function
                    .child_by_field_name("attribute")
                    .map(|a| parsed.node_text(a))
                    .unwrap_or("");
                method_result(receiver, method)
            }
            _ => ValueType::Unknown,
        }
    }
}

fn method_result(receiver: ValueType, method: &str) -> ValueType {
    match (receiver, method) {
        (
            ValueType::Str,
            "upper" | "lower" | "strip" | "lstrip" | "rstrip" | "replace" | "format" | "join"
            | "title" | "capitalize" | "casefold" | "center" | "ljust" | "rjust" | "zfill"
            | "swapcase" | "removeprefix" | "removesuffix",
        ) => ValueType::Str,
        (ValueType::Str, "split" | "rsplit" | "splitlines") => ValueType::List,
        (ValueType::Str, "find" | "rfind" | "count" | "index" | "rindex") => ValueType::Int,
        (ValueType::Str, m) if m.starts_with("is") || m == "startswith" || m == "endswith" => {
            ValueType::Bool
        }
        (ValueType::List, "copy") => ValueType::List,
        (ValueType::List, "count" | "index") => ValueType::Int,
        (ValueType::Dict, "copy") => ValueType::Dict,
        (ValueType::Set, "union" | "intersection" | "difference" | "copy") => ValueType::Set,
        _ => ValueType::Unknown,
    }
}

#[derive(Clone, Copy)]
struct Ctx {
    scope: ScopeId,
    /// Directly inside a class body; `Some(true)` when the class has bases.
    class: Option<bool>,
}

impl Ctx {
    fn module() -> Self {
        Self {
            scope: MODULE_SCOPE,
            class: None,
        }
    }

    fn with_scope(self, scope: ScopeId) -> Self {
        Self { scope, class: None }
    }
}

enum Binding<'t> {
    Plain(Node<'t>),
    /// Operator without the trailing `=`.
    Augmented(String, Node<'t>),
}

struct PendingAssign<'t> {
    /// Scope the right-hand side is evaluated in.
    scope: ScopeId,
    /// Scope the name is bound in; differs under `global`/`nonlocal`.
    target: ScopeId,
    name: String,
    binding: Binding<'t>,
    line: usize,
}

/// First pass: names, definitions, guards and syntax issues.
struct BindingPass<'t> {
    parsed: &'t ParsedSource,
    facts: CodeFacts,
    bound: HashMap<ScopeId, HashSet<String>>,
    /// Names bound by anything other than `name = value`; never typed.
    poisoned: HashSet<(ScopeId, String)>,
    pending: Vec<PendingAssign<'t>>,
    /// `global`/`nonlocal` names per scope, mapped to the scope they bind in.
    declared: HashMap<(ScopeId, String), ScopeId>,
    parents: HashMap<ScopeId, ScopeId>,
    source_end: usize,
}

impl<'t> BindingPass<'t> {
    fn new(parsed: &'t ParsedSource) -> Self {
        Self {
            parsed,
            facts: CodeFacts::default(),
            bound: HashMap::new(),
            poisoned: HashSet::new(),
            pending: Vec::new(),
            declared: HashMap::new(),
            parents: HashMap::new(),
            source_end: parsed.source_str().trim_end().len(),
        }
    }

    fn text(&self, node: Node) -> String {
        self.parsed.node_text(node).to_string()
    }

    fn target_scope(&self, scope: ScopeId, name: &str) -> ScopeId {
        self.declared
            .get(&(scope, name.to_string()))
            .copied()
            .unwrap_or(scope)
    }

    /// Nearest enclosing function scope binding `name`, else the direct parent.
    fn nonlocal_scope(&self, scope: ScopeId, name: &str) -> ScopeId {
        let parent = self.parents.get(&scope).copied().unwrap_or(MODULE_SCOPE);
        let mut current = parent;
        while current != MODULE_SCOPE {
            if self.bound.get(&current).map_or(false, |n| n.contains(name)) {
                return self.target_scope(current, name);
            }
            current = self.parents.get(&current).copied().unwrap_or(MODULE_SCOPE);
        }
        parent
    }

    fn bind(&mut self, scope: ScopeId, name: &str, poison: bool) {
        if name.is_empty() {
            return;
        }
        let scope = self.target_scope(scope, name);
        self.facts.defined_names.insert(name.to_string());
        self.bound
            .entry(scope)
            .or_default()
            .insert(name.to_string());
        if poison {
            self.poisoned.insert((scope, name.to_string()));
        }
    }

    fn visit(&mut self, node: Node<'t>, ctx: Ctx) {
        if node.is_missing() {
            self.record_syntax(node, SyntaxIssueKind::Missing);
            return;
        }

        match node.kind() {
            "ERROR" => self.record_syntax(node, SyntaxIssueKind::Error),
            "print_statement" => self.record_syntax(node, SyntaxIssueKind::Python2Print),
            "comment" => {
                if MARKER_RE.is_match(self.parsed.node_text(node)) {
                    self.facts.todo_lines.push(line_of(node));
                }
                return;
            }
            "function_definition" => {
                self.visit_function(node, ctx);
                return;
            }
            "class_definition" => {
                self.visit_class(node, ctx);
                return;
            }
            "lambda" => {
                self.visit_lambda(node, ctx);
                return;
            }
            "import_statement" | "import_from_statement" => {
                self.bind_imports(node, ctx.scope);
                return;
            }
            "future_import_statement" => return,
            "assignment" => self.visit_assignment(node, ctx.scope),
            "augmented_assignment" => self.visit_augmented(node, ctx.scope),
            "named_expression" => {
                if let (Some(name), Some(value)) = (
                    node.child_by_field_name("name"),
                    node.child_by_field_name("value"),
                ) {
                    let name = self.text(name);
                    self.bind(ctx.scope, &name, false);
                    self.pending.push(PendingAssign {
                        scope: ctx.scope,
                        target: self.target_scope(ctx.scope, &name),
                        name,
                        binding: Binding::Plain(value),
                        line: line_of(node),
                    });
                }
            }
            "for_statement" | "for_in_clause" => {
                if let Some(left) = node.child_by_field_name("left") {
                    self.bind_targets(left, ctx.scope);
                }
            }
            "as_pattern_target" | "case_pattern" => self.bind_targets(node, ctx.scope),
            "global_statement" | "nonlocal_statement" if ctx.scope != MODULE_SCOPE => {
                for name in operands(node) {
                    let name = self.text(name);
                    let target = if node.kind() == "global_statement" {
                        MODULE_SCOPE
                    } else {
                        self.nonlocal_scope(ctx.scope, &name)
                    };
                    self.declared.insert((ctx.scope, name), target);
                }
                return;
            }
            "global_statement" | "nonlocal_statement" => return,
            "except_clause" => self.visit_except(node, ctx.scope),
            "if_statement" | "elif_clause" | "while_statement" => {
                if let Some(condition) = node.child_by_field_name("condition") {
                    self.record_guard(condition, ctx.scope);
                }
            }
            "assert_statement" => self.record_guard(node, ctx.scope),
            "conditional_expression" => {
                if let Some(condition) = operands(node).get(1) {
                    self.record_guard(*condition, ctx.scope);
                }
            }
            "boolean_operator" => {
                if let Some(left) = node.child_by_field_name("left") {
                    self.record_guard(left, ctx.scope);
                }
            }
            _ => {}
        }

        for child in all_children(node) {
            self.visit(child, ctx);
        }
    }

    fn visit_function(&mut self, node: Node<'t>, ctx: Ctx) {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n))
            .unwrap_or_default();
        let fn_scope = scope_of(node);
        let params = node
            .child_by_field_name("parameters")
            .map(|p| self.extract_params(p))
            .unwrap_or_default();

        self.bind(ctx.scope, &name, true);
        self.parents.insert(fn_scope, ctx.scope);
        for param in &params {
            self.bind(fn_scope, &param.name, true);
        }

        let body_node = node.child_by_field_name("body");
        let body = self.summarize_body(node, body_node);

        self.facts.functions.push(FunctionDef {
            name,
            params,
            line: line_of(node),
            is_method: ctx.class.is_some(),
            in_derived_class: ctx.class == Some(true),
            is_decorated: node
                .parent()
                .map_or(false, |p| p.kind() == "decorated_definition"),
            scope: fn_scope,
            parent_scope: ctx.scope,
            body,
        });

        let body_id = body_node.map(|b| b.id());
        for child in all_children(node) {
            if Some(child.id()) == body_id {
                self.visit(child, ctx.with_scope(fn_scope));
            } else {
                self.visit(child, ctx.with_scope(ctx.scope));
            }
        }
    }

    fn visit_class(&mut self, node: Node<'t>, ctx: Ctx) {
        if let Some(name) = node.child_by_field_name("name") {
            let name = self.text(name);
            self.bind(ctx.scope, &name, true);
            self.facts.classes.push(name);
        }

        let has_bases = node
            .child_by_field_name("superclasses")
            .map_or(false, |bases| !operands(bases).is_empty());
        let body_id = node.child_by_field_name("body").map(|b| b.id());

        for child in all_children(node) {
            if Some(child.id()) == body_id {
                self.visit(
                    child,
                    Ctx {
                        scope: ctx.scope,
                        class: Some(has_bases),
                    },
                );
            } else {
                self.visit(child, ctx.with_scope(ctx.scope));
            }
        }
    }

    fn visit_lambda(&mut self, node: Node<'t>, ctx: Ctx) {
        let scope = scope_of(node);
        self.parents.insert(scope, ctx.scope);
        if let Some(params) = node.child_by_field_name("parameters") {
            for param in self.extract_params(params) {
                self.bind(scope, &param.name, true);
            }
        }
        let body_id = node.child_by_field_name("body").map(|b| b.id());
        for child in all_children(node) {
            if Some(child.id()) == body_id {
                self.visit(child, ctx.with_scope(scope));
            } else {
                self.visit(child, ctx.with_scope(ctx.scope));
            }
        }
    }

    fn extract_params(&self, node: Node) -> Vec<Param> {
        let mut params = Vec::new();
        let mut keyword_only = false;

        for child in operands(node) {
            let (name, has_default, kind) = match child.kind() {
                "identifier" => (self.text(child), false, ParamKind::Positional),
                "default_parameter" | "typed_default_parameter" => (
                    child
                        .child_by_field_name("name")
                        .map(|n| self.text(n))
                        .unwrap_or_default(),
                    true,
                    ParamKind::Positional,
                ),
                "typed_parameter" => match operands(child).first() {
                    Some(inner) if inner.kind() == "list_splat_pattern" => {
                        (self.splat_name(*inner), false, ParamKind::VarArgs)
                    }
                    Some(inner) if inner.kind() == "dictionary_splat_pattern" => {
                        (self.splat_name(*inner), false, ParamKind::KwArgs)
                    }
                    Some(inner) => (self.text(*inner), false, ParamKind::Positional),
                    None => continue,
                },
                "list_splat_pattern" => (self.splat_name(child), false, ParamKind::VarArgs),
                "dictionary_splat_pattern" => (self.splat_name(child), false, ParamKind::KwArgs),
                "keyword_separator" => {
                    keyword_only = true;
                    continue;
                }
                _ => continue,
            };

            let kind = match kind {
                ParamKind::Positional if keyword_only => ParamKind::KeywordOnly,
                ParamKind::VarArgs => {
                    keyword_only = true;
                    kind
                }
                other => other,
            };

            if !name.is_empty() {
                params.push(Param {
                    name,
                    has_default,
                    kind,
                });
            }
        }

        params
    }

    fn splat_name(&self, node: Node) -> String {
        operands(node)
            .into_iter()
            .find(|n| n.kind() == "identifier")
            .map(|n| self.text(n))
            .unwrap_or_default()
    }

    fn summarize_body(&self, function: Node, body: Option<Node>) -> FunctionBody {
        let statements = body.map(operands).unwrap_or_default();

        let mut rest = &statements[..];
        if statements.first().map_or(false, |s| is_docstring(*s)) {
            rest = &statements[1..];
        }

        let raises_not_implemented = rest.len() == 1
            && rest[0].kind() == "raise_statement"
            && self.parsed.node_text(rest[0]).contains("NotImplementedError");

        // Comments before the first statement attach to the definition node.
        let has_todo_marker = comments_in(function)
            .into_iter()
            .any(|c| MARKER_RE.is_match(self.parsed.node_text(c)));

        FunctionBody {
            statement_count: rest.len(),
            is_placeholder: rest.iter().all(|s| is_placeholder_statement(*s)),
            has_todo_marker,
            raises_not_implemented,
        }
    }

    fn bind_imports(&mut self, node: Node, scope: ScopeId) {
        let mut cursor = node.walk();
        let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
        let is_from = node.kind() == "import_from_statement";

        for child in names {
            let bound = match child.kind() {
                "aliased_import" => child
                    .child_by_field_name("alias")
                    .map(|a| self.text(a))
                    .unwrap_or_default(),
                _ if is_from => self.text(child),
                _ => self
                    .text(child)
                    .split('.')
                    .next()
                    .unwrap_or_default()
                    .to_string(),
            };
            self.bind(scope, &bound, true);
        }
    }

    fn visit_assignment(&mut self, node: Node<'t>, scope: ScopeId) {
        let Some(left) = node.child_by_field_name("left") else {
            return;
        };
        let Some(mut right) = node.child_by_field_name("right") else {
            // Bare annotation (`x: int`) binds nothing at runtime.
            return;
        };

        if left.kind() != "identifier" {
            self.bind_targets(left, scope);
            return;
        }

        while right.kind() == "assignment" {
            match right.child_by_field_name("right") {
                Some(inner) => right = inner,
                None => break,
            }
        }

        let name = self.text(left);
        self.bind(scope, &name, false);
        self.pending.push(PendingAssign {
            scope,
            target: self.target_scope(scope, &name),
            name,
            binding: Binding::Plain(right),
            line: line_of(node),
        });
    }

    fn visit_augmented(&mut self, node: Node<'t>, scope: ScopeId) {
        let (Some(left), Some(op), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("operator"),
            node.child_by_field_name("right"),
        ) else {
            return;
        };
        if left.kind() != "identifier" {
            return;
        }

        let name = self.text(left);
        self.bind(scope, &name, false);
        self.pending.push(PendingAssign {
            scope,
            target: self.target_scope(scope, &name),
            name,
            binding: Binding::Augmented(op.kind().trim_end_matches('=').to_string(), right),
            line: line_of(node),
        });
    }

    /// Bind every identifier in a target pattern.
    fn bind_targets(&mut self, node: Node, scope: ScopeId) {
        match node.kind() {
            "identifier" => {
                let name = self.text(node);
                self.bind(scope, &name, true);
            }
            "attribute" | "subscript" => {}
            _ => {
                for child in operands(node) {
                    self.bind_targets(child, scope);
                }
            }
        }
    }

    fn visit_except(&mut self, node: Node, scope: ScopeId) {
        let children = all_children(node);
        let header: Vec<&str> = children
            .iter()
            .filter(|c| c.is_named() && !matches!(c.kind(), "block" | "comment"))
            .map(|c| self.parsed.node_text(*c))
            .collect();
        let header = header.join(" ");
        let catches_all = header.is_empty() || header.contains("Exception");

        let guards = self.facts.guards.entry(scope).or_default();
        if catches_all || header.contains("ZeroDivisionError") || header.contains("ArithmeticError")
        {
            guards.catches_zero_division = true;
        }
        if catches_all
            || ["IndexError", "LookupError", "KeyError", "ValueError"]
                .iter()
                .any(|e| header.contains(e))
        {
            guards.catches_lookup_errors = true;
        }

        // Python 2 style `except E, e` and tree shapes without as_pattern.
        for (i, child) in children.iter().enumerate() {
            if matches!(child.kind(), "as" | ",") {
                if let Some(alias) = children[i + 1..].iter().find(|c| c.is_named()) {
                    if alias.kind() == "identifier" {
                        let name = self.text(*alias);
                        self.bind(scope, &name, true);
                    }
                }
            }
        }
    }

    fn record_guard(&mut self, node: Node, scope: ScopeId) {
        let mut names = Vec::new();
        collect_identifiers(self.parsed, node, &mut names);
        self.facts
            .guards
            .entry(scope)
            .or_default()
            .checked_names
            .extend(names);
    }

    fn record_syntax(&mut self, node: Node, kind: SyntaxIssueKind) {
        let span = Span::from_node(node);
        let snippet = match kind {
            SyntaxIssueKind::Missing => node.kind().to_string(),
            _ => {
                let text = self.parsed.node_text(node);
                let first = text.lines().next().unwrap_or("").trim();
                first.chars().take(40).collect()
            }
        };

        self.facts.syntax_issues.push(SyntaxIssue {
            kind,
            line: span.start_line,
            column: span.start_col,
            snippet,
            at_eof: node.end_byte() >= self.source_end,
        });
    }

    fn resolve_types(&self) -> TypeEnv {
        let mut env = TypeEnv {
            types: HashMap::new(),
            bound: self.bound.clone(),
        };

        // Names assigned from other names need a few rounds to settle.
        for _ in 0..3 {
            let mut groups: HashMap<(ScopeId, &str), (Vec<ValueType>, Vec<(&str, ValueType)>)> =
                HashMap::new();
            for pending in &self.pending {
                let entry = groups
                    .entry((pending.target, pending.name.as_str()))
                    .or_default();
                match &pending.binding {
                    Binding::Plain(rhs) => {
                        entry.0.push(env.type_of(self.parsed, *rhs, pending.scope))
                    }
                    Binding::Augmented(op, rhs) => entry.1.push((
                        op.as_str(),
                        env.type_of(self.parsed, *rhs, pending.scope),
                    )),
                }
            }

            let mut next = HashMap::new();
            for ((scope, name), (plain, augmented)) in groups {
                if self.poisoned.contains(&(scope, name.to_string())) {
                    continue;
                }
                let Some(&first) = plain.first() else {
                    continue;
                };
                if !first.is_known() || plain.iter().any(|t| *t != first) {
                    continue;
                }
                if augmented
                    .iter()
                    .any(|(op, t)| binary_result(first, op, *t) != first)
                {
                    continue;
                }
                next.insert((scope, name.to_string()), first);
            }

            if next == env.types {
                break;
            }
            env.types = next;
        }

        env
    }

    fn finish(mut self, env: &TypeEnv) -> CodeFacts {
        for pending in &self.pending {
            if let Binding::Plain(rhs) = &pending.binding {
                let value_type = env.type_of(self.parsed, *rhs, pending.scope);
                self.facts.assignments.push(Assignment {
                    scope: pending.target,
                    name: pending.name.clone(),
                    value_type,
                    line: pending.line,
                });
            }
        }
        self.facts.assignments.sort_by_key(|a| a.line);
        self.facts.scope_bindings = self.bound;
        self.facts.scope_parents = self.parents;
        self.facts
    }
}

fn is_docstring(statement: Node) -> bool {
    statement.kind() == "expression_statement"
        && matches!(
            &operands(statement)[..],
            [only] if matches!(only.kind(), "string" | "concatenated_string")
        )
}

fn is_placeholder_statement(statement: Node) -> bool {
    match statement.kind() {
        "pass_statement" => true,
        "expression_statement" => matches!(
            &operands(statement)[..],
            [only] if matches!(only.kind(), "ellipsis" | "string" | "concatenated_string")
        ),
        _ => false,
    }
}

fn comments_in(node: Node) -> Vec<Node> {
    let mut found = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        for child in all_children(current) {
            if child.kind() == "comment" {
                found.push(child);
            } else {
                stack.push(child);
            }
        }
    }
    found
}

fn collect_identifiers(parsed: &ParsedSource, node: Node, out: &mut Vec<String>) {
    if node.kind() == "identifier" {
        out.push(parsed.node_text(node).to_string());
        return;
    }
    for child in operands(node) {
        collect_identifiers(parsed, child, out);
    }
}

/// Whether an identifier is read (as opposed to a definition name, a
/// parameter, an attribute name or part of an import).
fn is_load(node: Node) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    match parent.kind() {
        "attribute" => !is_field(parent, "attribute", node),
        "keyword_argument" => !is_field(parent, "name", node),
        "function_definition" | "class_definition" => !is_field(parent, "name", node),
        "default_parameter" | "typed_default_parameter" => !is_field(parent, "name", node),
        "parameters" | "lambda_parameters" | "typed_parameter" | "list_splat_pattern"
        | "dictionary_splat_pattern" | "keyword_pattern" | "as_pattern_target"
        | "dotted_name" | "aliased_import" | "case_pattern" => false,
        _ => true,
    }
}

/// Literal with no names or calls inside.
fn is_constant_literal(node: Node) -> bool {
    match node.kind() {
        "integer" | "float" => true,
        "string" | "concatenated_string" => !has_descendant(node, "interpolation"),
        "list" | "tuple" | "set" | "dictionary" | "expression_list" | "pair"
        | "parenthesized_expression" => operands(node).into_iter().all(is_constant_literal),
        "unary_operator" => node
            .child_by_field_name("argument")
            .map_or(false, is_constant_literal),
        _ => false,
    }
}

fn is_numeric_literal(node: Node) -> bool {
    match node.kind() {
        "integer" | "float" => true,
        "unary_operator" => node
            .child_by_field_name("argument")
            .map_or(false, is_numeric_literal),
        "parenthesized_expression" => operands(node).into_iter().all(is_numeric_literal),
        _ => false,
    }
}

fn is_store(node: Node) -> bool {
    let Some(parent) = node.parent() else {
        return false;
    };
    match parent.kind() {
        "assignment" | "augmented_assignment" => is_field(parent, "left", node),
        "delete_statement" => true,
        _ => false,
    }
}

/// Second pass: typed expression facts.
struct ExpressionPass<'a> {
    parsed: &'a ParsedSource,
    env: &'a TypeEnv,
    facts: &'a mut CodeFacts,
    /// Enclosing function names, innermost last.
    functions: Vec<String>,
}

impl<'a> ExpressionPass<'a> {
    fn text(&self, node: Node) -> String {
        self.parsed.node_text(node).to_string()
    }

    fn type_of(&self, node: Node, scope: ScopeId) -> ValueType {
        self.env.type_of(self.parsed, node, scope)
    }

    fn visit(&mut self, node: Node, scope: ScopeId) {
        match node.kind() {
            "ERROR" | "print_statement" | "comment" => return,
            "import_statement" | "import_from_statement" | "future_import_statement"
            | "global_statement" | "nonlocal_statement" => return,
            "function_definition" | "lambda" => {
                let inner = scope_of(node);
                let name = node
                    .child_by_field_name("name")
                    .map(|n| self.text(n))
                    .unwrap_or_else(|| "<lambda>".to_string());
                self.functions.push(name);
                let body_id = node.child_by_field_name("body").map(|b| b.id());
                for child in all_children(node) {
                    let child_scope = if Some(child.id()) == body_id {
                        inner
                    } else {
                        scope
                    };
                    self.visit(child, child_scope);
                }
                self.functions.pop();
                return;
            }
            "identifier" => {
                if is_load(node) {
                    self.facts.name_uses.push(NameUse {
                        name: self.text(node),
                        line: line_of(node),
                    });
                }
                return;
            }
            "attribute" => self.record_attribute(node, scope),
            "call" => self.record_call(node, scope),
            "binary_operator" => self.record_binary(node, scope),
            "augmented_assignment" => self.record_augmented(node, scope),
            "subscript" => self.record_subscript(node, scope),
            "comparison_operator" => self.record_comparison(node),
            "boolean_operator" => self.record_boolean(node),
            "if_statement" => self.record_branches(node),
            "assignment" => self.record_self_assignment(node),
            "return_statement" => self.record_return(node),
            _ => {}
        }

        for child in all_children(node) {
            self.visit(child, scope);
        }
    }

    fn record_attribute(&mut self, node: Node, scope: ScopeId) {
        let (Some(object), Some(attribute)) = (
            node.child_by_field_name("object"),
            node.child_by_field_name("attribute"),
        ) else {
            return;
        };

        let is_call = node
            .parent()
            .map_or(false, |p| p.kind() == "call" && is_field(p, "function", node));

        self.facts.attributes.push(AttributeAccess {
            scope,
            receiver: self.text(object),
            receiver_type: self.type_of(object, scope),
            attribute: self.text(attribute),
            line: line_of(node),
            is_call,
            is_store: is_store(node),
        });
    }

    fn record_call(&mut self, node: Node, scope: ScopeId) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        let receiver_type = match function.kind() {
            "attribute" => function
                .child_by_field_name("object")
                .map(|obj| self.type_of(obj, scope)),
            _ => None,
        };

        let mut args = Vec::new();
        if let Some(arguments) = node.child_by_field_name("arguments") {
            if arguments.kind() == "argument_list" {
                for arg in operands(arguments) {
                    args.push(self.argument(arg, scope));
                }
            } else {
                // Bare generator argument: `sum(x for x in xs)`
                args.push(Arg {
                    text: self.text(arguments),
                    value_type: ValueType::Unknown,
                    keyword: None,
                    is_splat: false,
                    element_types: Vec::new(),
                });
            }
        }

        self.facts.calls.push(Call {
            scope,
            callee: self.text(function),
            receiver_type,
            args,
            line: line_of(node),
        });
    }

    fn argument(&self, arg: Node, scope: ScopeId) -> Arg {
        match arg.kind() {
            "keyword_argument" => {
                let value = arg.child_by_field_name("value");
                Arg {
                    text: value.map(|v| self.text(v)).unwrap_or_default(),
                    value_type: value.map_or(ValueType::Unknown, |v| self.type_of(v, scope)),
                    keyword: arg.child_by_field_name("name").map(|n| self.text(n)),
                    is_splat: false,
                    element_types: Vec::new(),
                }
            }
            "list_splat" | "dictionary_splat" => Arg {
                text: self.text(arg),
                value_type: ValueType::Unknown,
                keyword: None,
                is_splat: true,
                element_types: Vec::new(),
            },
            _ => {
                let element_types = match arg.kind() {
                    "list" | "tuple" | "set" => operands(arg)
                        .into_iter()
                        .map(|e| self.type_of(e, scope))
                        .collect(),
                    _ => Vec::new(),
                };
                Arg {
                    text: self.text(arg),
                    value_type: self.type_of(arg, scope),
                    keyword: None,
                    is_splat: false,
                    element_types,
                }
            }
        }
    }

    fn record_binary(&mut self, node: Node, scope: ScopeId) {
        let (Some(left), Some(op), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("operator"),
            node.child_by_field_name("right"),
        ) else {
            return;
        };
        let operator = op.kind();
        if !ARITHMETIC_OPS.contains(&operator) {
            return;
        }

        let left_type = self.type_of(left, scope);
        self.facts.binary_ops.push(BinaryOp {
            scope,
            operator: operator.to_string(),
            left_type,
            right_type: self.type_of(right, scope),
            left_text: self.text(left),
            right_text: self.text(right),
            line: line_of(node),
        });

        if matches!(operator, "/" | "//" | "%") && !is_numeric_literal(right) {
            self.record_division(node, operator, right, left_type == ValueType::Str, scope);
        }
    }

    fn record_augmented(&mut self, node: Node, scope: ScopeId) {
        let (Some(left), Some(op), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("operator"),
            node.child_by_field_name("right"),
        ) else {
            return;
        };
        let operator = op.kind().trim_end_matches('=');
        if matches!(operator, "/" | "//" | "%") && !is_numeric_literal(right) {
            let left_is_str = self.type_of(left, scope) == ValueType::Str;
            self.record_division(node, operator, right, left_is_str, scope);
        }
    }

    fn record_division(
        &mut self,
        node: Node,
        operator: &str,
        denominator: Node,
        left_is_str: bool,
        scope: ScopeId,
    ) {
        self.facts.divisions.push(Division {
            scope,
            operator: operator.to_string(),
            denominator: self.text(denominator),
            depends_on: self.denominator_name(denominator),
            left_is_str,
            line: line_of(node),
        });
    }

    /// `b` for `x / b`, `items` for `x / len(items)`.
    fn denominator_name(&self, node: Node) -> Option<String> {
        match node.kind() {
            "identifier" => Some(self.text(node)),
            "parenthesized_expression" => operands(node)
                .first()
                .and_then(|inner| self.denominator_name(*inner)),
            "call" => {
                let function = node.child_by_field_name("function")?;
                if function.kind() != "identifier" || self.parsed.node_text(function) != "len" {
                    return None;
                }
                match &operands(node.child_by_field_name("arguments")?)[..] {
                    [only] if only.kind() == "identifier" => Some(self.text(*only)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn record_subscript(&mut self, node: Node, scope: ScopeId) {
        let (Some(value), Some(index)) = (
            node.child_by_field_name("value"),
            node.child_by_field_name("subscript"),
        ) else {
            return;
        };
        if value.kind() != "identifier" {
            return;
        }
        let constant = match index.kind() {
            "integer" => true,
            "unary_operator" => index
                .child_by_field_name("argument")
                .map_or(false, |a| a.kind() == "integer"),
            _ => false,
        };
        if !constant {
            return;
        }

        self.facts.subscripts.push(Subscript {
            scope,
            target: self.text(value),
            index: self.text(index),
            line: line_of(node),
            is_store: is_store(node),
        });
    }

    fn record_comparison(&mut self, node: Node) {
        let (left, right) = match &operands(node)[..] {
            [left, right] => (*left, *right),
            _ => return,
        };
        let operator = all_children(node)
            .iter()
            .filter(|c| !c.is_named())
            .map(|c| c.kind())
            .collect::<Vec<_>>()
            .join(" ");

        self.facts.comparisons.push(Comparison {
            operator,
            left: self.text(left),
            right: self.text(right),
            right_type: literal_type(self.parsed, right),
            has_call: [left, right]
                .iter()
                .any(|side| side.kind() == "call" || has_descendant(*side, "call")),
            line: line_of(node),
        });
    }

    fn record_boolean(&mut self, node: Node) {
        let (Some(left), Some(op), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("operator"),
            node.child_by_field_name("right"),
        ) else {
            return;
        };
        let left_text = self.text(left);
        if left_text != self.parsed.node_text(right) || left_text.contains('(') {
            return;
        }

        self.facts.comparisons.push(Comparison {
            operator: op.kind().to_string(),
            right: left_text.clone(),
            left: left_text,
            right_type: ValueType::Unknown,
            has_call: false,
            line: line_of(node),
        });
    }

    fn record_branches(&mut self, node: Node) {
        let Some(consequence) = node.child_by_field_name("consequence") else {
            return;
        };
        let mut cursor = node.walk();
        let alternatives: Vec<Node> = node
            .children_by_field_name("alternative", &mut cursor)
            .collect();

        let [alternative] = &alternatives[..] else {
            return;
        };
        if alternative.kind() != "else_clause" {
            return;
        }
        let Some(else_body) = alternative.child_by_field_name("body") else {
            return;
        };

        let normalize = |n: Node| -> String {
            self.parsed
                .node_text(n)
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        };
        let then_text = normalize(consequence);
        if !then_text.is_empty() && then_text == normalize(else_body) {
            self.facts.identical_branches.push(IdenticalBranches {
                line: line_of(node),
            });
        }
    }

    fn record_self_assignment(&mut self, node: Node) {
        let (Some(left), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("right"),
        ) else {
            return;
        };
        if left.kind() == "identifier"
            && right.kind() == "identifier"
            && self.parsed.node_text(left) == self.parsed.node_text(right)
        {
            self.facts.self_assignments.push(SelfAssignment {
                name: self.text(left),
                line: line_of(node),
            });
        }
    }

    fn record_return(&mut self, node: Node) {
        let Some(function) = self.functions.last() else {
            return;
        };
        let Some(value) = operands(node).into_iter().next() else {
            return;
        };
        if is_constant_literal(value) {
            let literal = ReturnLiteral {
                function: function.clone(),
                text: self.text(value),
                line: line_of(node),
            };
            self.facts.return_literals.push(literal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(source: &str) -> CodeFacts {
        PythonAnalyzer::new().analyze(source).unwrap()
    }

    #[test]
    fn test_extract_imports() {
        let source = r#"
import os
import numpy as np
from math import sqrt, floor as fl
from . import utils
from helpers import *
"#;
        let facts = facts(source);
        assert_eq!(facts.imports.len(), 5);

        assert_eq!(facts.imports[0].module, "os");
        assert_eq!(facts.imports[1].module, "numpy");
        assert_eq!(facts.imports[1].alias.as_deref(), Some("np"));
        assert_eq!(facts.imports[2].names, vec!["sqrt", "floor"]);
        assert!(facts.imports[3].is_relative);
        assert!(facts.imports[4].is_star);
        assert!(facts.has_star_import());

        assert!(facts.defined_names.contains("np"));
        assert!(facts.defined_names.contains("fl"));
        assert!(!facts.defined_names.contains("floor"));
        assert_eq!(facts.module_for_name("np").map(|i| i.root()), Some("numpy"));
    }

    #[test]
    fn test_extract_functions() {
        let source = r#"
def add(a, b=1, *rest, flag=False, **opts):
    return a + b

class Base(ABC):
    def run(self):
        """Run it."""
        pass

def later():
    # TODO: write this
    ...

def abstract():
    raise NotImplementedError
"#;
        let facts = facts(source);
        assert_eq!(facts.functions.len(), 4);

        let add = &facts.functions[0];
        assert_eq!(add.name, "add");
        assert_eq!(add.positional_arity(), (1, 2));
        assert!(add.has_varargs());
        assert_eq!(add.params[3].kind, ParamKind::KeywordOnly);
        assert!(!add.body.is_placeholder);

        let run = &facts.functions[1];
        assert!(run.is_method);
        assert!(run.in_derived_class);
        assert!(run.body.is_placeholder);
        assert_eq!(run.body.statement_count, 1);

        let later = &facts.functions[2];
        assert!(later.body.is_placeholder);
        assert!(later.body.has_todo_marker);
        assert!(facts.todo_lines.contains(&11));

        assert!(facts.functions[3].body.raises_not_implemented);
        assert_eq!(facts.classes, vec!["Base"]);
    }

    #[test]
    fn test_literal_types() {
        let source = r#"
name = "bob"
count = 3
count += 1
mixed = 1
mixed = "one"
label = name + "!"

def f(name):
    return name + 1
"#;
        let facts = facts(source);
        let assigned = |n: &str| {
            facts
                .assignments
                .iter()
                .find(|a| a.name == n && a.scope == MODULE_SCOPE)
                .map(|a| a.value_type)
        };
        assert_eq!(assigned("name"), Some(ValueType::Str));
        assert_eq!(assigned("count"), Some(ValueType::Int));
        assert_eq!(assigned("label"), Some(ValueType::Str));

        // Inside f, `name` is a parameter and shadows the module string.
        let op = facts
            .binary_ops
            .iter()
            .find(|b| b.right_text == "1")
            .unwrap();
        assert_eq!(op.left_type, ValueType::Unknown);

        // `mixed` has conflicting assignments.
        let src2 = "mixed = 1\nmixed = 'one'\ny = mixed + 1\n";
        let facts2 = super::PythonAnalyzer::new().analyze(src2).unwrap();
        assert_eq!(facts2.binary_ops[0].left_type, ValueType::Unknown);
    }

    #[test]
    fn test_global_and_nonlocal_assignments_bind_outer_scope() {
        let source = r#"
count = 0

def set_name():
    global count
    count = "x"

def outer():
    total = 0
    def add():
        nonlocal total
        total = "x"
    add()
    return total.upper()

print(count.upper())
"#;
        let facts = facts(source);
        let receiver = |name: &str| {
            facts
                .attributes
                .iter()
                .find(|a| a.receiver == name && a.attribute == "upper")
                .map(|a| a.receiver_type)
        };
        assert_eq!(receiver("count"), Some(ValueType::Unknown));
        assert_eq!(receiver("total"), Some(ValueType::Unknown));

        let global = facts
            .assignments
            .iter()
            .find(|a| a.name == "count" && a.line == 6)
            .unwrap();
        assert_eq!(global.scope, MODULE_SCOPE);
    }

    #[test]
    fn test_input_is_string() {
        let facts = facts("age = input()\nnext_year = age + 1\n");
        let op = &facts.binary_ops[0];
        assert_eq!(op.left_type, ValueType::Str);
        assert_eq!(op.right_type, ValueType::Int);
    }

    #[test]
    fn test_divisions_and_guards() {
        let source = r#"
def average(items):
    return sum(items) / len(items)

def ratio(a, b):
    if b == 0:
        return 0
    return a / b

def half(x):
    return x / 2
"#;
        let facts = facts(source);
        assert_eq!(facts.divisions.len(), 2);
        assert_eq!(facts.divisions[0].depends_on.as_deref(), Some("items"));
        assert_eq!(facts.divisions[1].depends_on.as_deref(), Some("b"));

        let ratio = facts.functions.iter().find(|f| f.name == "ratio").unwrap();
        assert!(facts.guards_for(ratio.scope).checked_names.contains("b"));
        let average = facts.functions.iter().find(|f| f.name == "average").unwrap();
        assert!(facts.guards_for(average.scope).checked_names.is_empty());
    }

    #[test]
    fn test_try_except_guard() {
        let source = r#"
def safe(a, b):
    try:
        return a / b
    except ZeroDivisionError:
        return None
"#;
        let facts = facts(source);
        let guards = facts.guards_for(facts.functions[0].scope);
        assert!(guards.catches_zero_division);
        assert!(!guards.catches_lookup_errors);
    }

    #[test]
    fn test_syntax_issues() {
        let facts = facts("def f(x)\n    return x\n");
        assert!(facts.has_parse_errors);
        assert!(!facts.syntax_issues.is_empty());
        assert!(!facts.truncated);

        let facts = facts_truncated();
        assert!(facts.truncated);
    }

    fn facts_truncated() -> CodeFacts {
        facts("def total(values):\n    return sum(values) + (\n")
    }

    #[test]
    fn test_python2_print() {
        let facts = facts("print \"hello\"\n");
        assert!(facts
            .syntax_issues
            .iter()
            .any(|i| i.kind == SyntaxIssueKind::Python2Print));
    }

    #[test]
    fn test_name_uses_skip_definitions() {
        let source = r#"
import math

def area(r):
    return math.pi * r ** 2 + undefined_helper(r)

area(radius=2)
"#;
        let facts = facts(source);
        let used: Vec<&str> = facts.name_uses.iter().map(|u| u.name.as_str()).collect();
        assert!(used.contains(&"math"));
        assert!(used.contains(&"undefined_helper"));
        assert!(!used.contains(&"pi"));
        assert!(!used.contains(&"radius"));
        assert!(!used.contains(&"r") || facts.defined_names.contains("r"));
        assert!(facts.defined_names.contains("area"));

        let attr = facts.attributes.iter().find(|a| a.attribute == "pi").unwrap();
        assert_eq!(attr.receiver, "math");
        assert!(!attr.is_call);
    }

    #[test]
    fn test_silly_facts() {
        let source = r#"
def check(x, y):
    x = x
    if x == x:
        y = 1
    else:
        y = 1
    if x is 5:
        pass
    return y and y
"#;
        let facts = facts(source);
        assert_eq!(facts.self_assignments.len(), 1);
        assert_eq!(facts.identical_branches.len(), 1);
        assert!(facts
            .comparisons
            .iter()
            .any(|c| c.operator == "==" && c.left == c.right));
        assert!(facts
            .comparisons
            .iter()
            .any(|c| c.operator == "is" && c.right_type == ValueType::Int));
        assert!(facts.comparisons.iter().any(|c| c.operator == "and"));
    }

    #[test]
    fn test_calls_and_return_literals() {
        let source = r#"
def fizz(n):
    if n == 15:
        return "FizzBuzz"
    return str(n)

words = ", ".join([1, 2])
items = []
items.push(3)
"#;
        let facts = facts(source);
        assert_eq!(facts.return_literals.len(), 1);
        assert_eq!(facts.return_literals[0].function, "fizz");
        assert_eq!(facts.return_literals[0].text, "\"FizzBuzz\"");

        let join = facts.calls.iter().find(|c| c.callee.ends_with(".join")).unwrap();
        assert_eq!(join.receiver_type, Some(ValueType::Str));
        assert_eq!(
            join.args[0].element_types,
            vec![ValueType::Int, ValueType::Int]
        );

        let push = facts.attributes.iter().find(|a| a.attribute == "push").unwrap();
        assert_eq!(push.receiver_type, ValueType::List);
        assert!(push.is_call);
    }

    #[test]
    fn test_constant_subscripts() {
        let facts = facts("def first(xs):\n    return xs[0]\n\ndef last(xs):\n    xs[-1] = 0\n");
        assert_eq!(facts.subscripts.len(), 2);
        assert!(!facts.subscripts[0].is_store);
        assert!(facts.subscripts[1].is_store);
        assert_eq!(facts.subscripts[1].index, "-1");
    }
}
