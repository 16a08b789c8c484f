//! AST-backed code analysis module.
//!
//! Parses Python source with tree-sitter and extracts [`CodeFacts`]: the
//! imports, definitions, typed expressions, guards and syntax issues every
//! static detector reads.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌────────────────┐     ┌───────────────┐
//! │ Python source   │────▶│ PythonAnalyzer │────▶│ CodeFacts     │
//! └─────────────────┘     │ (two passes)   │     │ (Imports,     │
//!                         └────────────────┘     │  Calls, etc)  │
//!                                                └───────────────┘
//!                                                        │
//!                                                        ▼
//!                                                ┌───────────────┐
//!                                                │ detect::*     │
//!                                                └───────────────┘
//! ```
//!
//! Syntax errors never abort extraction: tree-sitter recovers, ERROR and
//! MISSING nodes become [`SyntaxIssue`] facts and the rest of the tree is
//! still walked.

mod facts;
mod python;
mod traits;

pub use facts::{
    Arg, Assignment, AttributeAccess, BinaryOp, Call, CodeFacts, Comparison, Division,
    FunctionBody, FunctionDef, IdenticalBranches, Import, NameUse, Param, ParamKind,
    ReturnLiteral, ScopeGuards, ScopeId, SelfAssignment, Span, Subscript, SyntaxIssue,
    SyntaxIssueKind, ValueType, MODULE_SCOPE,
};
pub(crate) use python::binary_result;
pub use python::PythonAnalyzer;
pub use traits::ParsedSource;
