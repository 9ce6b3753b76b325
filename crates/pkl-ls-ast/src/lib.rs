#![warn(missing_docs)]
//! `pkl-ls-ast` - typed Pkl syntax for the language server.
//!
//! This crate turns a concrete syntax tree into an immutable, shareable AST:
//!
//! - [`build_module`]: total conversion of a concrete tree (anything implementing
//!   [`pkl_ls_treesitter::SyntaxNode`]) into [`AstNode`]s
//! - [`AstNode::diagnostics`]: per-node validation, concatenated over a subtree
//! - [`ImportHook`]: the seam through which the builder follows `import`/`amends`/`extends`
//! - [`query`]: position lookup, traversal and go-to-definition over built modules
//!
//! The builder is generic over the concrete tree so that it can be exercised with the
//! hand-made trees in [`fixture`] as well as with real tree-sitter parses.

mod builder;
mod diagnostics;
pub mod fixture;
pub mod imports;
mod node;
pub mod query;

pub use builder::build_module;
pub use imports::{
    ImportHook, ImportKind, ImportRequest, ImportResolution, ImportSpec, NoImports, scan_imports,
};
pub use node::{
    AstNode, BodyNode, ClassNode, EntryNode, FunctionHeaderNode, ImportNode, NodeId, NodeKind,
    NodeRef, PropertyNode,
};
pub use query::{definition_of, describe_ast, position_to_node};
