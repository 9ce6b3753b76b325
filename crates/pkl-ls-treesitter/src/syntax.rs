//! A minimal read-only view of concrete syntax nodes.
//!
//! The AST builder only needs a handful of node queries. Going through [`SyntaxNode`] instead of
//! `tree_sitter::Node` directly lets it run against hand-built trees in tests.

use std::fmt::Write as _;
use std::ops::Range;
use tree_sitter::Node;

/// Read-only access to a concrete syntax node.
pub trait SyntaxNode: Sized {
    /// Grammar kind, e.g. `"classProperty"` or `"="`.
    fn kind(&self) -> &str;
    /// Whether the node is a named grammar rule rather than an anonymous token.
    fn is_named(&self) -> bool;
    /// Whether the parser produced this node to wrap unparseable input.
    fn is_error(&self) -> bool;
    /// Whether the parser inserted this zero-width node to recover from a missing token.
    fn is_missing(&self) -> bool;
    /// Byte span in the source text.
    fn byte_range(&self) -> Range<usize>;
    /// Direct children, in source order.
    fn child_nodes(&self) -> Vec<Self>;
}

impl SyntaxNode for Node<'_> {
    fn kind(&self) -> &str {
        Node::kind(self)
    }

    fn is_named(&self) -> bool {
        Node::is_named(self)
    }

    fn is_error(&self) -> bool {
        Node::is_error(self)
    }

    fn is_missing(&self) -> bool {
        Node::is_missing(self)
    }

    fn byte_range(&self) -> Range<usize> {
        Node::byte_range(self)
    }

    fn child_nodes(&self) -> Vec<Self> {
        let mut cursor = self.walk();
        self.children(&mut cursor).collect()
    }
}

/// Render a tree as an indented outline, one node per line.
///
/// Anonymous tokens are shown quoted; named leaves also show their text.
pub fn describe_tree<N: SyntaxNode>(root: &N, text: &str) -> String {
    let mut out = String::new();
    describe_node(root, text, 0, &mut out);
    out
}

fn describe_node<N: SyntaxNode>(node: &N, text: &str, depth: usize, out: &mut String) {
    let range = node.byte_range();
    let indent = "  ".repeat(depth);
    let children = node.child_nodes();

    let label = if node.is_missing() {
        format!("MISSING {}", node.kind())
    } else if node.is_named() {
        node.kind().to_string()
    } else {
        format!("{:?}", node.kind())
    };

    let _ = write!(out, "{indent}{label} [{}..{}]", range.start, range.end);
    if node.is_named() && children.is_empty() {
        let leaf = text.get(range).unwrap_or("");
        let _ = write!(out, " {leaf:?}");
    }
    out.push('\n');

    for child in &children {
        describe_node(child, text, depth + 1, out);
    }
}
