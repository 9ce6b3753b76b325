#![warn(missing_docs)]
//! `pkl-ls-analysis` - import resolution and document analysis for the Pkl language server.
//!
//! This crate wires the lower layers into something a protocol layer can drive:
//!
//! - [`BlockingCache`]: memoization with a single producer per key and blocking waiters
//! - [`WorkerPool`]: the FIFO queue of import resolution work
//! - [`ModuleLoader`] / [`FileSystemLoader`]: turning import paths into documents
//! - [`ImportPipeline`]: depth-bounded, concurrent import resolution
//! - [`Analyzer`]: open/change/close plus the read-only queries feature handlers need

mod analyzer;
pub mod cache;
pub mod loader;
pub mod pipeline;
pub mod queue;

pub use analyzer::{AnalysisError, Analyzer};
pub use cache::{BlockingCache, CacheError};
pub use loader::{FileSystemLoader, LoadError, ModuleLoader};
pub use pipeline::{EntryImports, ImportPipeline, ModuleSource, TreeSitterModuleSource};
pub use queue::{PoolError, WorkerPool};
