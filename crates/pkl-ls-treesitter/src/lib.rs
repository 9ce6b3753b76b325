#![warn(missing_docs)]
//! `pkl-ls-treesitter` - syntax tree management for the Pkl language server.
//!
//! This crate owns the tree-sitter side of analysis:
//!
//! - full parses of freshly opened documents
//! - incremental re-parses driven by protocol change records, with a full re-parse fallback
//! - a [`SyntaxNode`] view of concrete nodes that the AST builder consumes
//!
//! The grammar is supplied by the host as a [`tree_sitter::Language`], so the manager itself does
//! not link any particular grammar.

pub mod edit;
mod manager;
pub mod syntax;

pub use edit::compute_edit;
pub use manager::{ParsedTree, SyntaxError, SyntaxTreeManager, TreeUpdateMode};
pub use syntax::{SyntaxNode, describe_tree};
