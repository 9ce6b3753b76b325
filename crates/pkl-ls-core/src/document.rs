//! Immutable document snapshots.
//!
//! A [`Document`] is never edited in place: [`Document::apply_edits`] produces the next snapshot.
//! Edits in one batch apply in order, each against the text left by the previous one, which is
//! how protocol `didChange` batches are defined.

use crate::position::{LineIndex, LspRange, PositionError};
use crate::uri::DocumentUri;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use thiserror::Error;
use tracing::debug;

/// Errors produced when applying edits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("invalid change range {range:?}")]
    /// An edit range does not exist in the text, or a full replacement was mixed with other
    /// edits (reported with `range: None`).
    InvalidChangeRange {
        /// The offending range.
        range: Option<LspRange>,
    },

    #[error("document version {next} is older than current version {current}")]
    /// The new version would move backwards.
    StaleVersion {
        /// Version of the current snapshot.
        current: i32,
        /// Rejected next version.
        next: i32,
    },
}

/// A single replacement edit, as sent by `textDocument/didChange`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChange {
    /// Range to replace; `None` replaces the whole text.
    pub range: Option<LspRange>,
    /// Replacement text.
    pub text: String,
}

impl TextChange {
    /// An edit replacing `range` with `text`.
    pub fn replace(range: LspRange, text: impl Into<String>) -> Self {
        Self {
            range: Some(range),
            text: text.into(),
        }
    }

    /// An edit replacing the whole document.
    pub fn full(text: impl Into<String>) -> Self {
        Self {
            range: None,
            text: text.into(),
        }
    }
}

/// Snapshot of a source file.
#[derive(Debug, Clone)]
pub struct Document {
    uri: DocumentUri,
    version: Option<i32>,
    text: String,
    index: LineIndex,
}

impl Document {
    /// Create a snapshot. `version` is `None` for buffers the client does not track (files read
    /// from disk, standard library modules).
    pub fn new(uri: DocumentUri, version: Option<i32>, text: impl Into<String>) -> Self {
        let text = text.into();
        let index = LineIndex::from_text(&text);
        Self {
            uri,
            version,
            text,
            index,
        }
    }

    /// Document identity.
    pub fn uri(&self) -> &DocumentUri {
        &self.uri
    }

    /// Client version, if tracked.
    pub fn version(&self) -> Option<i32> {
        self.version
    }

    /// Full text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Line index for position conversions.
    pub fn line_index(&self) -> &LineIndex {
        &self.index
    }

    /// Text in a byte range; empty when the range does not slice the text on char boundaries.
    pub fn text_in_bytes(&self, bytes: Range<usize>) -> &str {
        self.text.get(bytes).unwrap_or("")
    }

    /// Hash of the text, used to tell snapshots of the same URI apart.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.text.hash(&mut hasher);
        hasher.finish()
    }

    /// Apply a batch of edits and return the next snapshot.
    pub fn apply_edits(
        &self,
        edits: &[TextChange],
        next_version: Option<i32>,
    ) -> Result<Document, DocumentError> {
        if let (Some(current), Some(next)) = (self.version, next_version)
            && next < current
        {
            return Err(DocumentError::StaleVersion { current, next });
        }

        let mut index = self.index.clone();
        for edit in edits {
            match edit.range {
                Some(range) => {
                    let invalid = |_: PositionError| DocumentError::InvalidChangeRange {
                        range: Some(range),
                    };
                    let start = index.to_char_offset(range.start).map_err(invalid)?;
                    let end = index.to_char_offset(range.end).map_err(invalid)?;
                    if start > end {
                        return Err(DocumentError::InvalidChangeRange { range: Some(range) });
                    }
                    index.replace(start..end, &edit.text);
                }
                None => {
                    if edits.len() != 1 {
                        return Err(DocumentError::InvalidChangeRange { range: None });
                    }
                    index = LineIndex::from_text(&edit.text);
                }
            }
        }

        let text = index.text();
        debug!(
            uri = %self.uri,
            edits = edits.len(),
            version = ?next_version,
            "applied document edits"
        );
        Ok(Document {
            uri: self.uri.clone(),
            version: next_version,
            text,
            index,
        })
    }
}
