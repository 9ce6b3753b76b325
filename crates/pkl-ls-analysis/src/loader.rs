//! Finding and reading imported modules.

use pkl_ls_core::{Document, DocumentUri, UriError};
use std::collections::HashMap;
use std::fs;
use std::io;
use thiserror::Error;

/// Errors produced while locating or reading a module.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("module not found: {0}")]
    /// Nothing exists at the resolved location.
    NotFound(DocumentUri),

    #[error("unknown standard library module: {0}")]
    /// A `pkl:` module that is not registered.
    UnknownStdlibModule(String),

    #[error("failed to read {uri}: {source}")]
    /// The module exists but could not be read.
    Io {
        /// Module location.
        uri: DocumentUri,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    /// The import path does not form a valid URI.
    Uri(#[from] UriError),
}

/// Turns import paths into documents.
pub trait ModuleLoader: Send + Sync {
    /// Resolve the path literal of an import found in `importing`.
    fn resolve(&self, importing: &DocumentUri, path: &str) -> Result<DocumentUri, LoadError>;

    /// Read the module at `uri`.
    fn read(&self, uri: &DocumentUri) -> Result<Document, LoadError>;
}

/// Loads modules from disk plus a set of registered `pkl:` standard library modules.
///
/// Relative paths resolve against the importing document's directory; paths that already
/// carry a scheme are taken as they are.
#[derive(Debug, Clone, Default)]
pub struct FileSystemLoader {
    stdlib: HashMap<String, String>,
}

impl FileSystemLoader {
    /// A loader without standard library modules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the source of `pkl:{name}`.
    pub fn with_stdlib_module(mut self, name: &str, text: impl Into<String>) -> Self {
        self.stdlib.insert(name.to_string(), text.into());
        self
    }
}

impl ModuleLoader for FileSystemLoader {
    fn resolve(&self, importing: &DocumentUri, path: &str) -> Result<DocumentUri, LoadError> {
        if let Ok(absolute) = DocumentUri::parse(path) {
            return Ok(absolute);
        }
        Ok(importing.join(path)?)
    }

    fn read(&self, uri: &DocumentUri) -> Result<Document, LoadError> {
        if uri.scheme() == "pkl" {
            let name = uri.as_str().trim_start_matches("pkl:");
            let text = self
                .stdlib
                .get(name)
                .ok_or_else(|| LoadError::UnknownStdlibModule(name.to_string()))?;
            return Ok(Document::new(uri.clone(), None, text.as_str()));
        }

        let path = uri
            .to_file_path()
            .ok_or_else(|| LoadError::NotFound(uri.clone()))?;
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Document::new(uri.clone(), None, text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(LoadError::NotFound(uri.clone())),
            Err(source) => Err(LoadError::Io {
                uri: uri.clone(),
                source,
            }),
        }
    }
}
