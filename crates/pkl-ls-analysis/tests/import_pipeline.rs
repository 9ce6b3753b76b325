use parking_lot::Mutex;
use pkl_ls_analysis::{FileSystemLoader, ImportPipeline, ModuleSource};
use pkl_ls_ast::fixture::parse_outline;
use pkl_ls_ast::query::position_to_node;
use pkl_ls_ast::{ImportHook, NodeRef, build_module, definition_of};
use pkl_ls_core::{AnalysisConfig, Document, DocumentUri, LspPosition};
use pkl_ls_treesitter::SyntaxError;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Builds modules from the line outline format, counting builds per URI.
#[derive(Default)]
struct Outline {
    builds: Mutex<HashMap<String, usize>>,
    slow: Option<(&'static str, Duration)>,
}

impl Outline {
    fn builds_of(&self, name: &str) -> usize {
        self.builds
            .lock()
            .iter()
            .filter(|(uri, _)| uri.ends_with(name))
            .map(|(_, count)| *count)
            .sum()
    }
}

impl ModuleSource for Outline {
    fn build(
        &self,
        document: &Arc<Document>,
        depth: usize,
        hook: &dyn ImportHook,
    ) -> Result<NodeRef, SyntaxError> {
        *self
            .builds
            .lock()
            .entry(document.uri().to_string())
            .or_default() += 1;
        if let Some((name, delay)) = self.slow
            && document.uri().as_str().ends_with(name)
        {
            thread::sleep(delay);
        }
        Ok(build_module(&parse_outline(document.text()), document, depth, hook))
    }
}

fn write(dir: &Path, name: &str, text: &str) -> DocumentUri {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    DocumentUri::from_file_path(&path)
}

fn open(uri: &DocumentUri, text: &str) -> Arc<Document> {
    Arc::new(Document::new(uri.clone(), Some(1), text))
}

fn messages(module: &NodeRef) -> Vec<String> {
    module
        .diagnostics()
        .unwrap_or_default()
        .into_iter()
        .map(|d| d.message)
        .collect()
}

fn config(max_import_depth: usize, import_timeout_ms: u64) -> AnalysisConfig {
    AnalysisConfig {
        max_import_depth,
        worker_threads: 4,
        import_timeout_ms,
        ..AnalysisConfig::default()
    }
}

#[test]
fn test_diamond_imports_build_shared_module_once() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "left.pkl", "import \"shared.pkl\"\nleftValue = 1\n");
    write(dir.path(), "right.pkl", "import \"shared.pkl\"\nrightValue = 2\n");
    write(dir.path(), "shared.pkl", "sharedValue = 3\n");
    let main = write(
        dir.path(),
        "main.pkl",
        "import \"left.pkl\"\nimport \"right.pkl\"\n",
    );

    let source = Arc::new(Outline::default());
    let pipeline = ImportPipeline::new(
        &config(3, 5_000),
        Arc::new(FileSystemLoader::new()),
        source.clone(),
    )
    .unwrap();
    let module = pipeline
        .build(&open(&main, "import \"left.pkl\"\nimport \"right.pkl\"\n"))
        .unwrap();

    assert!(module.diagnostics().is_none());
    assert_eq!(source.builds_of("shared.pkl"), 1);
    assert_eq!(source.builds_of("left.pkl"), 1);
    assert_eq!(source.builds_of("right.pkl"), 1);
}

#[test]
fn test_imported_errors_are_rehomed_and_depth_is_stamped() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "dep.pkl", "ok = 1\nbroken\n");
    let main = write(dir.path(), "main.pkl", "");

    let pipeline = ImportPipeline::new(
        &config(3, 5_000),
        Arc::new(FileSystemLoader::new()),
        Arc::new(Outline::default()),
    )
    .unwrap();
    let document = open(&main, "x = 1\nimport \"dep.pkl\"\n");
    let module = pipeline.build(&document).unwrap();

    let diagnostics = module.diagnostics().unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(
        diagnostics[0].message,
        "Error in included file dep.pkl:2:1: Provide property type or value."
    );
    assert_eq!(diagnostics[0].range.bytes, 6..22);

    let ok = pipeline.resolve(&document, "dep.pkl", 0);
    let dep = ok.module().unwrap();
    assert_eq!(dep.import_depth(), 1);
    assert!(dep.children().iter().all(|n| n.import_depth() == 1));
}

#[test]
fn test_depth_zero_reports_every_clause_once() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "base.pkl", "x = 1\n");
    let main = write(dir.path(), "main.pkl", "");

    let pipeline = ImportPipeline::new(
        &config(0, 5_000),
        Arc::new(FileSystemLoader::new()),
        Arc::new(Outline::default()),
    )
    .unwrap();
    let module = pipeline
        .build(&open(
            &main,
            "extends \"base.pkl\"\nimport \"base.pkl\"\nimport \"missing.pkl\"\n",
        ))
        .unwrap();

    let messages = messages(&module);
    assert_eq!(messages.len(), 3);
    assert!(messages.iter().all(|m| m.starts_with("Module not found")));
}

#[test]
fn test_slow_import_times_out() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "slow.pkl", "x = 1\n");
    write(dir.path(), "fast.pkl", "y = 2\n");
    let main = write(dir.path(), "main.pkl", "");

    let source = Arc::new(Outline {
        slow: Some(("slow.pkl", Duration::from_millis(400))),
        ..Outline::default()
    });
    let pipeline = ImportPipeline::new(
        &config(3, 50),
        Arc::new(FileSystemLoader::new()),
        source,
    )
    .unwrap();
    let module = pipeline
        .build(&open(&main, "import \"slow.pkl\"\nimport \"fast.pkl\"\n"))
        .unwrap();

    assert_eq!(
        messages(&module),
        ["Module not found: slow.pkl (timed out waiting for the module)"]
    );
}

#[test]
fn test_definition_reaches_stdlib_module() {
    let dir = tempfile::tempdir().unwrap();
    let main = write(dir.path(), "main.pkl", "");
    let loader = FileSystemLoader::new().with_stdlib_module("math", "pi = 3.14\n");

    let pipeline = ImportPipeline::new(
        &config(3, 5_000),
        Arc::new(loader),
        Arc::new(Outline::default()),
    )
    .unwrap();
    let module = pipeline
        .build(&open(&main, "import \"pkl:math\"\ntau = pi * 2\n"))
        .unwrap();
    assert!(module.diagnostics().is_none());

    let reference = position_to_node(&module, LspPosition::new(1, 7)).unwrap();
    assert_eq!(reference.text(), "pi");
    let definition = definition_of(&module, &reference).unwrap();
    assert_eq!(definition.uri().as_str(), "pkl:math");
    assert_eq!(definition.text(), "pi = 3.14");
}

#[test]
fn test_invalidate_after_dependency_changes() {
    let dir = tempfile::tempdir().unwrap();
    let dep = write(dir.path(), "dep.pkl", "broken\n");
    let main = write(dir.path(), "main.pkl", "");

    let pipeline = ImportPipeline::new(
        &config(3, 5_000),
        Arc::new(FileSystemLoader::new()),
        Arc::new(Outline::default()),
    )
    .unwrap();
    let document = open(&main, "import \"dep.pkl\"\n");
    assert_eq!(messages(&pipeline.build(&document).unwrap()).len(), 1);
    assert_eq!(pipeline.cached_modules(), 1);

    write(dir.path(), "dep.pkl", "fixed = true\n");
    pipeline.invalidate(&dep);
    assert_eq!(pipeline.cached_modules(), 0);
    assert!(pipeline.build(&document).unwrap().diagnostics().is_none());
}
