//! The contract between the AST builder and whoever follows imports.
//!
//! The builder never reads files itself. Every import-like construct is handed to an
//! [`ImportHook`], which decides whether and how to follow it and reports the outcome as an
//! [`ImportResolution`].

use crate::node::NodeRef;
use pkl_ls_core::Document;
use pkl_ls_treesitter::SyntaxNode;
use std::fmt;
use std::sync::Arc;

/// Kind of import edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportKind {
    /// `import "x"` or `import("x")`.
    Import,
    /// `amends "x"`.
    Amends,
    /// `extends "x"`.
    Extends,
}

impl fmt::Display for ImportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImportKind::Import => "import",
            ImportKind::Amends => "amends",
            ImportKind::Extends => "extends",
        })
    }
}

/// An import found by scanning a concrete tree before building.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImportSpec {
    /// Path literal contents.
    pub path: String,
    /// Edge kind.
    pub kind: ImportKind,
}

/// A request to follow one import.
#[derive(Debug, Clone, Copy)]
pub struct ImportRequest<'a> {
    /// Document containing the import.
    pub importing: &'a Arc<Document>,
    /// Path literal contents.
    pub path: &'a str,
    /// Edge kind.
    pub kind: ImportKind,
    /// Import depth of the importing document.
    pub depth: usize,
}

/// Outcome of following an import.
#[derive(Debug, Clone)]
pub enum ImportResolution {
    /// The target was found and built.
    Resolved(NodeRef),
    /// The target does not exist or could not be read.
    NotFound,
    /// Following the import would exceed the configured depth.
    DepthExceeded {
        /// Configured maximum depth.
        max_depth: usize,
    },
    /// Waiting for the target timed out.
    TimedOut,
}

impl ImportResolution {
    /// The resolved module, if any.
    pub fn module(&self) -> Option<&NodeRef> {
        match self {
            ImportResolution::Resolved(module) => Some(module),
            _ => None,
        }
    }
}

/// Follows imports on behalf of the builder.
pub trait ImportHook {
    /// Called once per build with every import of the document, before any [`resolve`] call, so
    /// the hook can start work on all of them at once.
    ///
    /// [`resolve`]: ImportHook::resolve
    fn prefetch(&self, _imports: &[ImportSpec], _importing: &Arc<Document>, _depth: usize) {}

    /// Follow one import.
    fn resolve(&self, request: &ImportRequest<'_>) -> ImportResolution;
}

/// A hook that never follows anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoImports;

impl ImportHook for NoImports {
    fn resolve(&self, _request: &ImportRequest<'_>) -> ImportResolution {
        ImportResolution::NotFound
    }
}

/// Collect the imports of a concrete tree in source order.
///
/// Error subtrees are skipped, as are amends/extends clauses that name both keywords or neither
/// and clauses without a path.
pub fn scan_imports<N: SyntaxNode>(root: &N, text: &str) -> Vec<ImportSpec> {
    let mut out = Vec::new();
    scan_node(root, text, &mut out);
    out
}

fn scan_node<N: SyntaxNode>(node: &N, text: &str, out: &mut Vec<ImportSpec>) {
    if node.is_error() || node.is_missing() {
        return;
    }

    if let Some((kind, path)) = import_parts(node, text)
        && let Some(kind) = kind
        && let Some(path) = path
    {
        out.push(ImportSpec { path, kind });
        return;
    }

    for child in node.child_nodes() {
        scan_node(&child, text, out);
    }
}

/// For an import-like node, the edge kind (`None` on an amends/extends conflict) and path.
pub(crate) fn import_parts<N: SyntaxNode>(
    node: &N,
    text: &str,
) -> Option<(Option<ImportKind>, Option<String>)> {
    let kind = node.kind();
    if !matches!(kind, "importClause" | "importExpr" | "extendsOrAmendsClause") {
        return None;
    }

    let children = node.child_nodes();
    let present = |token: &str| {
        children
            .iter()
            .any(|c| !c.is_named() && !c.is_missing() && c.kind() == token)
    };

    let edge = if kind == "extendsOrAmendsClause" {
        match (present("amends"), present("extends")) {
            (true, false) => Some(ImportKind::Amends),
            (false, true) => Some(ImportKind::Extends),
            _ => None,
        }
    } else {
        Some(ImportKind::Import)
    };

    let path = children
        .iter()
        .find(|c| c.is_named() && !c.is_missing() && is_string_kind(c.kind()))
        .map(|c| unquote(text.get(c.byte_range()).unwrap_or("")).to_string());

    Some((edge, path))
}

pub(crate) fn is_string_kind(kind: &str) -> bool {
    matches!(kind, "stringConstant" | "slStringLiteral" | "mlStringLiteral")
}

/// Strip string delimiters: `"x"`, `#"x"#`, `"""x"""`.
pub(crate) fn unquote(literal: &str) -> &str {
    let inner = literal.trim_matches('#');
    if let Some(rest) = inner.strip_prefix("\"\"\"") {
        return rest.strip_suffix("\"\"\"").unwrap_or(rest);
    }
    match inner.strip_prefix('"') {
        Some(rest) => rest.strip_suffix('"').unwrap_or(rest),
        None => inner,
    }
}
