use crate::edit::compute_edit;
use crate::syntax::describe_tree;
use parking_lot::{Mutex, RwLock};
use pkl_ls_core::{Document, DocumentUri, TextChange};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{Level, debug, trace, warn};
use tree_sitter::{InputEdit, Language, Parser, Tree};

/// Errors produced by [`SyntaxTreeManager`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    /// The grammar could not be loaded into a parser.
    #[error("tree-sitter language error: {0}")]
    Language(String),
    /// The parser returned no tree.
    #[error("tree-sitter produced no tree for {uri}")]
    ParseFailed {
        /// Document that failed to parse.
        uri: DocumentUri,
    },
}

/// How a tree was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeUpdateMode {
    /// Parsed from scratch on request.
    Full,
    /// Updated by editing the cached tree and re-parsing incrementally.
    Incremental,
    /// An incremental update was requested but had to re-parse from scratch.
    FullFallback,
}

/// A parse result.
#[derive(Debug, Clone)]
pub struct ParsedTree {
    /// The concrete syntax tree.
    pub tree: Tree,
    /// How `tree` was produced.
    pub mode: TreeUpdateMode,
}

#[derive(Debug)]
struct CachedTree {
    version: Option<i32>,
    fingerprint: u64,
    tree: Tree,
}

/// Owns the parsers and the latest syntax tree of every tracked document.
///
/// Parsers are not shareable, so the manager keeps a small pool and hands one to each caller
/// for the duration of a parse. Trees are cached per URI together with the snapshot they were
/// parsed from; an incremental update is only attempted against a tree that matches the
/// caller's previous snapshot.
pub struct SyntaxTreeManager {
    language: Language,
    parsers: Mutex<Vec<Parser>>,
    trees: RwLock<HashMap<DocumentUri, CachedTree>>,
}

impl SyntaxTreeManager {
    /// Create a manager for `language`.
    ///
    /// Fails when the grammar is incompatible with the linked tree-sitter runtime; nothing can
    /// be parsed in that case.
    pub fn new(language: &Language) -> Result<Self, SyntaxError> {
        let parser = new_parser(language)?;
        Ok(Self {
            language: language.clone(),
            parsers: Mutex::new(vec![parser]),
            trees: RwLock::new(HashMap::new()),
        })
    }

    /// Parse `document` from scratch and cache the tree under its URI.
    pub fn parse_full(&self, document: &Document) -> Result<ParsedTree, SyntaxError> {
        let tree = self.parse_text(document, None)?;
        self.install(document, tree.clone());
        debug!(uri = %document.uri(), version = ?document.version(), "full parse");
        Ok(ParsedTree {
            tree,
            mode: TreeUpdateMode::Full,
        })
    }

    /// Parse `document` without touching the cache.
    ///
    /// Used for modules that are analyzed once (imports) and never edited through this manager.
    pub fn parse_detached(&self, document: &Document) -> Result<Tree, SyntaxError> {
        self.parse_text(document, None)
    }

    /// Update the tree of `old` to match `new`, which `changes` produced from `old`.
    ///
    /// Each change is replayed against the previous text and turned into an edit descriptor.
    /// When there is no cached tree for `old`, a change cannot be replayed, or the replay does
    /// not reproduce `new`, the document is re-parsed from scratch instead. Either way the
    /// returned tree matches `new` and replaces `old`'s entry in the cache.
    pub fn parse_incremental(
        &self,
        old: &Document,
        new: &Document,
        changes: &[TextChange],
    ) -> Result<ParsedTree, SyntaxError> {
        let cached = {
            let trees = self.trees.read();
            trees
                .get(old.uri())
                .filter(|c| c.version == old.version() && c.fingerprint == old.fingerprint())
                .map(|c| c.tree.clone())
        };

        let Some(mut tree) = cached else {
            debug!(uri = %old.uri(), "no cached tree for previous snapshot");
            return self.fallback(old, new);
        };

        let Some(edits) = replay_changes(old, changes, new) else {
            warn!(uri = %new.uri(), changes = changes.len(), "could not replay changes");
            return self.fallback(old, new);
        };

        for edit in &edits {
            tree.edit(edit);
        }

        let tree = match self.parse_text(new, Some(&tree)) {
            Ok(tree) => tree,
            Err(err) => {
                warn!(uri = %new.uri(), error = %err, "incremental parse failed");
                return self.fallback(old, new);
            }
        };

        self.replace(old, new, tree.clone());
        debug!(
            uri = %new.uri(),
            version = ?new.version(),
            edits = edits.len(),
            "incremental parse"
        );
        Ok(ParsedTree {
            tree,
            mode: TreeUpdateMode::Incremental,
        })
    }

    /// The cached tree for `uri`, if any.
    pub fn tree(&self, uri: &DocumentUri) -> Option<Tree> {
        self.trees.read().get(uri).map(|c| c.tree.clone())
    }

    /// Drop the cached tree for `uri`.
    pub fn retire(&self, uri: &DocumentUri) -> bool {
        self.trees.write().remove(uri).is_some()
    }

    /// Number of cached trees.
    pub fn len(&self) -> usize {
        self.trees.read().len()
    }

    /// Whether no tree is cached.
    pub fn is_empty(&self) -> bool {
        self.trees.read().is_empty()
    }

    fn fallback(&self, old: &Document, new: &Document) -> Result<ParsedTree, SyntaxError> {
        let tree = self.parse_text(new, None)?;
        self.replace(old, new, tree.clone());
        debug!(uri = %new.uri(), version = ?new.version(), "full re-parse fallback");
        Ok(ParsedTree {
            tree,
            mode: TreeUpdateMode::FullFallback,
        })
    }

    fn replace(&self, old: &Document, new: &Document, tree: Tree) {
        if old.uri() != new.uri() {
            self.trees.write().remove(old.uri());
        }
        self.install(new, tree);
    }

    fn install(&self, document: &Document, tree: Tree) {
        self.trees.write().insert(
            document.uri().clone(),
            CachedTree {
                version: document.version(),
                fingerprint: document.fingerprint(),
                tree,
            },
        );
    }

    fn parse_text(&self, document: &Document, old: Option<&Tree>) -> Result<Tree, SyntaxError> {
        let pooled = self.parsers.lock().pop();
        let mut parser = match pooled {
            Some(parser) => parser,
            None => new_parser(&self.language)?,
        };

        let parsed = parser.parse(document.text(), old);
        self.parsers.lock().push(parser);

        let tree = parsed.ok_or_else(|| SyntaxError::ParseFailed {
            uri: document.uri().clone(),
        })?;

        if tracing::enabled!(Level::TRACE) {
            trace!(
                uri = %document.uri(),
                "syntax tree:\n{}",
                describe_tree(&tree.root_node(), document.text())
            );
        }
        Ok(tree)
    }
}

fn new_parser(language: &Language) -> Result<Parser, SyntaxError> {
    let mut parser = Parser::new();
    parser
        .set_language(language)
        .map_err(|e| SyntaxError::Language(e.to_string()))?;
    Ok(parser)
}

/// Replay `changes` one at a time from `old`, diffing each step. Returns `None` when a change
/// does not apply or the result differs from `new`.
fn replay_changes(old: &Document, changes: &[TextChange], new: &Document) -> Option<Vec<InputEdit>> {
    let mut current = Document::new(old.uri().clone(), None, old.text());
    let mut edits = Vec::with_capacity(changes.len());

    for change in changes {
        let next = current.apply_edits(std::slice::from_ref(change), None).ok()?;
        if let Some(edit) = compute_edit(current.text(), next.text()) {
            edits.push(edit);
        }
        current = next;
    }

    (current.text() == new.text()).then_some(edits)
}
