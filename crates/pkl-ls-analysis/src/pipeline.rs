//! Depth-bounded import resolution.
//!
//! Imports of the document being analyzed are fanned out onto a [`WorkerPool`] as soon as the
//! builder announces them. Each worker loads its target, builds it one level deeper and
//! resolves that module's own imports inline. Built modules are memoized in a
//! [`BlockingCache`] keyed by document identity, content and depth, so two importers of the same
//! module at the same depth share a single build.
//!
//! Cycles are not detected. A cycle keeps producing new keys (the depth grows by one per hop)
//! until the depth limit stops it.

use crate::cache::{BlockingCache, CacheError};
use crate::loader::ModuleLoader;
use crate::queue::{PoolError, WorkerPool};
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use parking_lot::Mutex;
use pkl_ls_ast::query::imports;
use pkl_ls_ast::{
    ImportHook, ImportKind, ImportRequest, ImportResolution, ImportSpec, NodeKind, NodeRef,
    build_module,
};
use pkl_ls_core::{AnalysisConfig, Document, DocumentUri};
use pkl_ls_treesitter::{SyntaxError, SyntaxTreeManager};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Builds the AST of a module that is not open in the editor.
pub trait ModuleSource: Send + Sync {
    /// Parse and build `document` at `depth`, following its imports through `hook`.
    fn build(
        &self,
        document: &Arc<Document>,
        depth: usize,
        hook: &dyn ImportHook,
    ) -> Result<NodeRef, SyntaxError>;
}

/// [`ModuleSource`] backed by a tree-sitter grammar.
pub struct TreeSitterModuleSource {
    trees: Arc<SyntaxTreeManager>,
}

impl TreeSitterModuleSource {
    /// Parse with `trees`; imported modules never enter its cache.
    pub fn new(trees: Arc<SyntaxTreeManager>) -> Self {
        Self { trees }
    }
}

impl ModuleSource for TreeSitterModuleSource {
    fn build(
        &self,
        document: &Arc<Document>,
        depth: usize,
        hook: &dyn ImportHook,
    ) -> Result<NodeRef, SyntaxError> {
        let tree = self.trees.parse_detached(document)?;
        Ok(build_module(&tree.root_node(), document, depth, hook))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ModuleKey {
    uri: DocumentUri,
    fingerprint: u64,
    depth: usize,
}

type BuiltModule = Result<NodeRef, SyntaxError>;

struct Resolver {
    loader: Arc<dyn ModuleLoader>,
    source: Arc<dyn ModuleSource>,
    modules: BlockingCache<ModuleKey, BuiltModule>,
    max_depth: usize,
    timeout: Duration,
}

impl Resolver {
    fn resolve(&self, importing: &Arc<Document>, path: &str, depth: usize) -> ImportResolution {
        let target_depth = depth + 1;
        if self.max_depth == 0 || target_depth > self.max_depth {
            debug!(
                importing = %importing.uri(),
                path,
                max_depth = self.max_depth,
                "import depth limit reached"
            );
            return ImportResolution::DepthExceeded {
                max_depth: self.max_depth,
            };
        }

        let loaded = self
            .loader
            .resolve(importing.uri(), path)
            .and_then(|uri| self.loader.read(&uri));
        let document = match loaded {
            Ok(document) => Arc::new(document),
            Err(err) => {
                debug!(importing = %importing.uri(), path, error = %err, "import not loaded");
                return ImportResolution::NotFound;
            }
        };

        let key = ModuleKey {
            uri: document.uri().clone(),
            fingerprint: document.fingerprint(),
            depth: target_depth,
        };
        let built = self.modules.get_or_produce(key, self.timeout, || {
            debug!(uri = %document.uri(), depth = target_depth, "building imported module");
            self.source
                .build(&document, target_depth, &InlineImports { resolver: self })
        });

        match built {
            Ok(Ok(module)) => ImportResolution::Resolved(module),
            Ok(Err(err)) => {
                warn!(uri = %document.uri(), error = %err, "imported module failed to parse");
                ImportResolution::NotFound
            }
            Err(CacheError::TimedOut(timeout)) => {
                warn!(uri = %document.uri(), ?timeout, "timed out waiting for imported module");
                ImportResolution::TimedOut
            }
        }
    }
}

/// Resolves nested imports on the current thread.
struct InlineImports<'a> {
    resolver: &'a Resolver,
}

impl ImportHook for InlineImports<'_> {
    fn resolve(&self, request: &ImportRequest<'_>) -> ImportResolution {
        self.resolver
            .resolve(request.importing, request.path, request.depth)
    }
}

/// Import resolution for the documents open in the editor.
pub struct ImportPipeline {
    resolver: Arc<Resolver>,
    pool: WorkerPool,
}

impl ImportPipeline {
    /// Start the worker pool described by `config`.
    pub fn new(
        config: &AnalysisConfig,
        loader: Arc<dyn ModuleLoader>,
        source: Arc<dyn ModuleSource>,
    ) -> Result<Self, PoolError> {
        let resolver = Resolver {
            loader,
            source,
            modules: BlockingCache::new(),
            max_depth: config.max_import_depth,
            timeout: config.import_timeout(),
        };
        Ok(Self {
            resolver: Arc::new(resolver),
            pool: WorkerPool::new(config.worker_threads())?,
        })
    }

    /// A hook for building an entry document (depth 0) whose imports resolve concurrently.
    ///
    /// Each hook serves one build.
    pub fn entry_hook(&self) -> EntryImports<'_> {
        EntryImports {
            pipeline: self,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Build a document that has no tree of its own through the configured [`ModuleSource`].
    pub fn build(&self, document: &Arc<Document>) -> Result<NodeRef, SyntaxError> {
        self.resolver.source.build(document, 0, &self.entry_hook())
    }

    /// Resolve one import of `importing`, a document at `depth`, on the calling thread.
    pub fn resolve(&self, importing: &Arc<Document>, path: &str, depth: usize) -> ImportResolution {
        self.resolver.resolve(importing, path, depth)
    }

    /// Forget every built module of `uri`, and every module whose imports reached it.
    pub fn invalidate(&self, uri: &DocumentUri) {
        self.resolver.modules.retain(|key, built| {
            key.uri != *uri && !built.as_ref().is_ok_and(|module| reaches(module, uri))
        });
    }

    /// Number of memoized modules.
    pub fn cached_modules(&self) -> usize {
        self.resolver.modules.len()
    }

    /// Configured depth limit.
    pub fn max_depth(&self) -> usize {
        self.resolver.max_depth
    }
}

/// Whether `module` imports `uri`, directly or through other imports.
fn reaches(module: &NodeRef, uri: &DocumentUri) -> bool {
    let mut seen = HashSet::new();
    let mut stack = vec![Arc::clone(module)];
    while let Some(current) = stack.pop() {
        if !seen.insert(current.id()) {
            continue;
        }
        for import in imports(&current) {
            let NodeKind::Import(node) = import.kind() else {
                continue;
            };
            if let Some(target) = node.resolution.as_ref().and_then(ImportResolution::module) {
                if target.uri() == uri {
                    return true;
                }
                stack.push(Arc::clone(target));
            }
        }
    }
    false
}

/// [`ImportHook`] of an entry-document build; see [`ImportPipeline::entry_hook`].
pub struct EntryImports<'a> {
    pipeline: &'a ImportPipeline,
    in_flight: Mutex<HashMap<(String, ImportKind), VecDeque<Receiver<ImportResolution>>>>,
}

impl ImportHook for EntryImports<'_> {
    fn prefetch(&self, imports: &[ImportSpec], importing: &Arc<Document>, depth: usize) {
        let mut in_flight = self.in_flight.lock();
        for spec in imports {
            let (reply, receiver) = bounded(1);
            let resolver = Arc::clone(&self.pipeline.resolver);
            let importing = Arc::clone(importing);
            let path = spec.path.clone();
            let job = move || {
                let resolution = resolver.resolve(&importing, &path, depth);
                let _ = reply.send(resolution);
            };
            match self.pipeline.pool.submit(job) {
                Ok(()) => in_flight
                    .entry((spec.path.clone(), spec.kind))
                    .or_default()
                    .push_back(receiver),
                Err(err) => warn!(path = %spec.path, error = %err, "could not queue import"),
            }
        }
        debug!(
            uri = %importing.uri(),
            queued = self.pipeline.pool.queued(),
            "imports queued"
        );
    }

    fn resolve(&self, request: &ImportRequest<'_>) -> ImportResolution {
        let receiver = self
            .in_flight
            .lock()
            .get_mut(&(request.path.to_string(), request.kind))
            .and_then(VecDeque::pop_front);
        let Some(receiver) = receiver else {
            return self
                .pipeline
                .resolve(request.importing, request.path, request.depth);
        };

        match receiver.recv_timeout(self.pipeline.resolver.timeout) {
            Ok(resolution) => resolution,
            Err(RecvTimeoutError::Timeout) => {
                warn!(path = request.path, "timed out waiting for queued import");
                ImportResolution::TimedOut
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!(path = request.path, "import worker dropped its request");
                ImportResolution::NotFound
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoadError;
    use pkl_ls_ast::fixture::parse_outline;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Files(HashMap<String, String>);

    impl ModuleLoader for Files {
        fn resolve(&self, importing: &DocumentUri, path: &str) -> Result<DocumentUri, LoadError> {
            Ok(importing.join(path)?)
        }

        fn read(&self, uri: &DocumentUri) -> Result<Document, LoadError> {
            self.0
                .get(uri.as_str())
                .map(|text| Document::new(uri.clone(), None, text.as_str()))
                .ok_or_else(|| LoadError::NotFound(uri.clone()))
        }
    }

    #[derive(Default)]
    struct Outline {
        builds: AtomicUsize,
    }

    impl ModuleSource for Outline {
        fn build(
            &self,
            document: &Arc<Document>,
            depth: usize,
            hook: &dyn ImportHook,
        ) -> Result<NodeRef, SyntaxError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            Ok(build_module(&parse_outline(document.text()), document, depth, hook))
        }
    }

    fn pipeline(files: &[(&str, &str)], max_depth: usize) -> (ImportPipeline, Arc<Outline>) {
        let files = Files(
            files
                .iter()
                .map(|(uri, text)| (uri.to_string(), text.to_string()))
                .collect(),
        );
        let source = Arc::new(Outline::default());
        let config = AnalysisConfig {
            max_import_depth: max_depth,
            worker_threads: 2,
            ..AnalysisConfig::default()
        };
        let pipeline = ImportPipeline::new(&config, Arc::new(files), source.clone()).unwrap();
        (pipeline, source)
    }

    fn entry(text: &str) -> Arc<Document> {
        Arc::new(Document::new(
            DocumentUri::parse("file:///ws/main.pkl").unwrap(),
            Some(1),
            text,
        ))
    }

    #[test]
    fn test_depth_zero_never_follows() {
        let (pipeline, source) = pipeline(&[("file:///ws/a.pkl", "x = 1\n")], 0);
        let module = pipeline
            .build(&entry("import \"a.pkl\"\namends \"a.pkl\"\n"))
            .unwrap();

        let messages: Vec<_> = module
            .diagnostics()
            .unwrap()
            .into_iter()
            .map(|d| d.message)
            .collect();
        assert_eq!(
            messages,
            [
                "Module not found: a.pkl (import depth limit 0 reached)",
                "Module not found: a.pkl (import depth limit 0 reached)",
            ]
        );
        // Only the entry document itself was built.
        assert_eq!(source.builds.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.cached_modules(), 0);
    }

    #[test]
    fn test_shared_dependency_is_built_once() {
        let (pipeline, source) = pipeline(
            &[
                ("file:///ws/a.pkl", "import \"shared.pkl\"\n"),
                ("file:///ws/b.pkl", "import \"shared.pkl\"\n"),
                ("file:///ws/shared.pkl", "value = 1\n"),
            ],
            3,
        );
        let module = pipeline
            .build(&entry("import \"a.pkl\"\nimport \"b.pkl\"\n"))
            .unwrap();

        assert!(module.diagnostics().is_none());
        // main, a, b and one shared build.
        assert_eq!(source.builds.load(Ordering::SeqCst), 4);
        assert_eq!(pipeline.cached_modules(), 3);
    }

    #[test]
    fn test_cycle_ends_at_depth_limit() {
        let (pipeline, _) = pipeline(
            &[
                ("file:///ws/main.pkl", "import \"other.pkl\"\n"),
                ("file:///ws/other.pkl", "import \"main.pkl\"\n"),
            ],
            2,
        );
        let module = pipeline.build(&entry("import \"other.pkl\"\n")).unwrap();
        let messages: Vec<_> = module
            .diagnostics()
            .unwrap()
            .into_iter()
            .map(|d| d.message)
            .collect();
        assert_eq!(
            messages,
            ["Error in included file main.pkl:1:1: Module not found: other.pkl (import depth limit 2 reached)"]
        );
    }

    #[test]
    fn test_invalidate_drops_dependents() {
        let (pipeline, _) = pipeline(
            &[
                ("file:///ws/a.pkl", "import \"b.pkl\"\n"),
                ("file:///ws/b.pkl", "x = 1\n"),
                ("file:///ws/c.pkl", "y = 2\n"),
            ],
            3,
        );
        pipeline
            .build(&entry("import \"a.pkl\"\nimport \"c.pkl\"\n"))
            .unwrap();
        assert_eq!(pipeline.cached_modules(), 3);

        pipeline.invalidate(&DocumentUri::parse("file:///ws/b.pkl").unwrap());
        assert_eq!(pipeline.cached_modules(), 1);
    }

    #[test]
    fn test_missing_target_is_not_found() {
        let (pipeline, _) = pipeline(&[], 3);
        let document = entry("");
        assert!(matches!(
            pipeline.resolve(&document, "nowhere.pkl", 0),
            ImportResolution::NotFound
        ));
        assert!(matches!(
            pipeline.resolve(&document, "nowhere.pkl", 3),
            ImportResolution::DepthExceeded { max_depth: 3 }
        ));
    }
}
