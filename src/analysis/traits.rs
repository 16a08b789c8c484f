//! Parsed source container shared by the analysis passes.

/// Holds a parsed tree-sitter tree and the source it came from.
///
/// Kept separate from `CodeFacts` so several passes can reuse the tree
/// without re-parsing.
pub struct ParsedSource {
    /// The tree-sitter parse tree.
    pub tree: tree_sitter::Tree,
    /// Source text, for node text extraction.
    pub source: Vec<u8>,
}

impl ParsedSource {
    /// Get the source code as a string slice.
    pub fn source_str(&self) -> &str {
        std::str::from_utf8(&self.source).unwrap_or("")
    }

    /// Get text for a tree-sitter node.
    pub fn node_text(&self, node: tree_sitter::Node) -> &str {
        node.utf8_text(&self.source).unwrap_or("")
    }

    /// Whether tree-sitter had to recover from errors anywhere in the tree.
    pub fn has_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }
}
