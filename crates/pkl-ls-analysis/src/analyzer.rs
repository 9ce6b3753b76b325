//! The analysis façade a protocol layer talks to.

use crate::loader::{LoadError, ModuleLoader};
use crate::pipeline::{ImportPipeline, ModuleSource, TreeSitterModuleSource};
use crate::queue::PoolError;
use parking_lot::RwLock;
use pkl_ls_ast::query::position_to_node;
use pkl_ls_ast::{NodeRef, build_module, definition_of};
use pkl_ls_core::{
    AnalysisConfig, Diagnostic, Document, DocumentError, DocumentUri, FeatureSet, LspPosition,
    TextChange,
};
use pkl_ls_treesitter::{SyntaxError, SyntaxTreeManager};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use tree_sitter::Language;

/// Errors produced by [`Analyzer`].
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    /// Parsing failed or the grammar could not be loaded.
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    /// A change could not be applied.
    Document(#[from] DocumentError),

    #[error(transparent)]
    /// The import workers could not be started.
    Pool(#[from] PoolError),

    #[error("document is not open: {0}")]
    /// The document was never opened or has been closed.
    UnknownDocument(DocumentUri),
}

struct OpenDocument {
    document: Arc<Document>,
    module: NodeRef,
}

type OpenDocuments = Arc<RwLock<HashMap<DocumentUri, OpenDocument>>>;

/// Serves imports of open documents from the editor's buffers instead of the disk.
struct OverlayLoader {
    open: OpenDocuments,
    inner: Arc<dyn ModuleLoader>,
}

impl ModuleLoader for OverlayLoader {
    fn resolve(&self, importing: &DocumentUri, path: &str) -> Result<DocumentUri, LoadError> {
        self.inner.resolve(importing, path)
    }

    fn read(&self, uri: &DocumentUri) -> Result<Document, LoadError> {
        if let Some(open) = self.open.read().get(uri) {
            return Ok(Document::clone(&open.document));
        }
        self.inner.read(uri)
    }
}

/// Keeps the syntax tree and AST of every open document current.
///
/// Each call to [`open`](Self::open) or [`change`](Self::change) re-parses the document (the
/// latter incrementally), rebuilds its AST and resolves its imports before returning. Calls for
/// one document must be serialized by the caller; calls for different documents may run
/// concurrently.
pub struct Analyzer {
    config: AnalysisConfig,
    features: FeatureSet,
    trees: Arc<SyntaxTreeManager>,
    pipeline: ImportPipeline,
    open: OpenDocuments,
}

impl Analyzer {
    /// Create an analyzer for `language`, loading imported modules through `loader`.
    pub fn new(
        language: &Language,
        config: AnalysisConfig,
        loader: Arc<dyn ModuleLoader>,
    ) -> Result<Self, AnalysisError> {
        let trees = Arc::new(SyntaxTreeManager::new(language)?);
        let source = Arc::new(TreeSitterModuleSource::new(Arc::clone(&trees)));
        Self::with_source(trees, config, loader, source)
    }

    /// Like [`new`](Self::new), but imported modules are built by `source`.
    pub fn with_source(
        trees: Arc<SyntaxTreeManager>,
        config: AnalysisConfig,
        loader: Arc<dyn ModuleLoader>,
        source: Arc<dyn ModuleSource>,
    ) -> Result<Self, AnalysisError> {
        let open = OpenDocuments::default();
        let overlay = OverlayLoader {
            open: Arc::clone(&open),
            inner: loader,
        };
        let pipeline = ImportPipeline::new(&config, Arc::new(overlay), source)?;
        Ok(Self {
            features: FeatureSet::from_config(&config),
            config,
            trees,
            pipeline,
            open,
        })
    }

    /// Start tracking a document and analyze it.
    pub fn open(
        &self,
        uri: DocumentUri,
        version: i32,
        text: impl Into<String>,
    ) -> Result<NodeRef, AnalysisError> {
        let document = Arc::new(Document::new(uri, Some(version), text));
        let parsed = self.trees.parse_full(&document)?;
        debug!(uri = %document.uri(), version, "opened document");
        Ok(self.publish(document, &parsed.tree))
    }

    /// Apply `changes` to an open document and re-analyze it.
    pub fn change(
        &self,
        uri: &DocumentUri,
        version: i32,
        changes: &[TextChange],
    ) -> Result<NodeRef, AnalysisError> {
        let old = self
            .document(uri)
            .ok_or_else(|| AnalysisError::UnknownDocument(uri.clone()))?;
        let new = match old.apply_edits(changes, Some(version)) {
            Ok(new) => Arc::new(new),
            Err(err) => {
                warn!(uri = %uri, version, error = %err, "rejected document change");
                return Err(err.into());
            }
        };
        let parsed = self.trees.parse_incremental(&old, &new, changes)?;
        debug!(uri = %uri, version, mode = ?parsed.mode, "re-parsed document");
        Ok(self.publish(new, &parsed.tree))
    }

    /// Stop tracking a document. Returns whether it was open.
    pub fn close(&self, uri: &DocumentUri) -> bool {
        self.trees.retire(uri);
        let was_open = self.open.write().remove(uri).is_some();
        self.pipeline.invalidate(uri);
        debug!(uri = %uri, was_open, "closed document");
        was_open
    }

    fn publish(&self, document: Arc<Document>, tree: &tree_sitter::Tree) -> NodeRef {
        // Modules built from an older snapshot of this document are stale now.
        self.pipeline.invalidate(document.uri());
        let module = build_module(&tree.root_node(), &document, 0, &self.pipeline.entry_hook());
        self.open.write().insert(
            document.uri().clone(),
            OpenDocument {
                document,
                module: Arc::clone(&module),
            },
        );
        module
    }

    /// The current AST of an open document.
    pub fn module(&self, uri: &DocumentUri) -> Option<NodeRef> {
        self.open.read().get(uri).map(|open| Arc::clone(&open.module))
    }

    /// The current snapshot of an open document.
    pub fn document(&self, uri: &DocumentUri) -> Option<Arc<Document>> {
        self.open.read().get(uri).map(|open| Arc::clone(&open.document))
    }

    /// All diagnostics of an open document; empty when there are none.
    pub fn diagnostics(&self, uri: &DocumentUri) -> Result<Vec<Diagnostic>, AnalysisError> {
        let module = self
            .module(uri)
            .ok_or_else(|| AnalysisError::UnknownDocument(uri.clone()))?;
        Ok(module.diagnostics().unwrap_or_default())
    }

    /// The innermost node at `position` in an open document.
    pub fn node_at(&self, uri: &DocumentUri, position: LspPosition) -> Option<NodeRef> {
        position_to_node(&self.module(uri)?, position)
    }

    /// The declaration referenced at `position`, which may live in an imported module.
    pub fn definition_at(&self, uri: &DocumentUri, position: LspPosition) -> Option<NodeRef> {
        let module = self.module(uri)?;
        let node = position_to_node(&module, position)?;
        definition_of(&module, &node)
    }

    /// Enabled features.
    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    /// Configuration the analyzer was created with.
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// URIs of all open documents.
    pub fn open_documents(&self) -> Vec<DocumentUri> {
        let mut uris: Vec<_> = self.open.read().keys().cloned().collect();
        uris.sort();
        uris
    }
}
