#![warn(missing_docs)]
//! `pkl-ls-core` - document and position model for the Pkl language server.
//!
//! This crate holds the value types every other layer speaks:
//!
//! - [`LineIndex`]: UTF-16 `(line, character)` ↔ byte offset conversion
//! - [`Document`]: immutable snapshots and ordered edit application
//! - [`DocumentUri`]: validated, scheme-qualified document identities
//! - [`Diagnostic`]: structured validation results with [`SourceRange`]s
//! - [`AnalysisConfig`] / [`FeatureSet`]: start-up configuration

pub mod config;
pub mod diagnostics;
pub mod document;
pub mod position;
pub mod uri;

pub use config::{AnalysisConfig, ConfigError, FeatureKind, FeatureSet};
pub use diagnostics::{Diagnostic, DiagnosticSeverity};
pub use document::{Document, DocumentError, TextChange};
pub use position::{LineIndex, LspPosition, LspRange, PositionError, SourceRange};
pub use uri::{DocumentUri, UriError, percent_decode_path, percent_encode_path};
