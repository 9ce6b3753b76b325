//! Document URIs.
//!
//! Every document reaching the analysis core is identified by a scheme-qualified absolute URI
//! (`file:///…`, `pkl:base`, `untitled:Untitled-1`, …). [`DocumentUri::parse`] is the gate that
//! rejects relative or malformed identifiers at the boundary. Path conversion is kept
//! self-contained and minimal: it targets the `file://` URIs editors send.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Errors produced when validating or manipulating document URIs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UriError {
    #[error("empty document uri")]
    /// The URI was empty.
    Empty,

    #[error("document uri '{0}' has no scheme")]
    /// The URI is relative or its scheme is malformed.
    MissingScheme(String),

    #[error("document uri '{0}' is not a file uri")]
    /// A file-only operation was attempted on another scheme.
    NotAFileUri(String),
}

/// A validated, scheme-qualified document URI.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentUri(String);

impl DocumentUri {
    /// Validate and wrap a URI string.
    pub fn parse(uri: &str) -> Result<Self, UriError> {
        if uri.is_empty() {
            return Err(UriError::Empty);
        }
        let Some((scheme, rest)) = uri.split_once(':') else {
            return Err(UriError::MissingScheme(uri.to_string()));
        };
        // Single-letter schemes are rejected so `C:\foo` is not mistaken for a URI.
        if scheme.len() < 2 || rest.is_empty() || !is_valid_scheme(scheme) {
            return Err(UriError::MissingScheme(uri.to_string()));
        }
        Ok(Self(uri.to_string()))
    }

    /// Build a `file://` URI from a local path.
    ///
    /// Relative paths are made absolute against the current directory and normalised lexically
    /// (`.` and `..` components are folded); the filesystem is not consulted.
    pub fn from_file_path(path: &Path) -> Self {
        let abs = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        Self::from_normalized_path(&normalize_path(&abs))
    }

    fn from_normalized_path(path: &Path) -> Self {
        let mut path_str = path.to_string_lossy().to_string();

        // Normalize to forward slashes for URIs.
        if cfg!(windows) {
            path_str = path_str.replace('\\', "/");
            if !path_str.starts_with('/') {
                path_str.insert(0, '/');
            }
        }

        Self(format!("file://{}", percent_encode_path(&path_str)))
    }

    /// The URI text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The URI scheme (without the trailing `:`).
    pub fn scheme(&self) -> &str {
        self.0.split_once(':').map(|(scheme, _)| scheme).unwrap_or("")
    }

    /// Whether this is a `file:` URI.
    pub fn is_file(&self) -> bool {
        self.scheme().eq_ignore_ascii_case("file")
    }

    /// Convert a `file://` URI back into a local filesystem path.
    pub fn to_file_path(&self) -> Option<PathBuf> {
        file_uri_to_path(&self.0)
    }

    /// Resolve `relative` against the directory containing this document.
    ///
    /// Only `file:` URIs have a directory to resolve against.
    pub fn join(&self, relative: &str) -> Result<Self, UriError> {
        let path = self
            .to_file_path()
            .ok_or_else(|| UriError::NotAFileUri(self.0.clone()))?;
        let dir = path.parent().unwrap_or_else(|| Path::new("/"));
        Ok(Self::from_normalized_path(&normalize_path(
            &dir.join(relative),
        )))
    }
}

impl fmt::Display for DocumentUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocumentUri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for DocumentUri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Fold `.` and `..` components without touching the filesystem.
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Percent-encode a path for use in a `file://` URI.
///
/// Keeps URI-safe bytes and percent-encodes the rest.
pub fn percent_encode_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for &b in path.as_bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

/// Percent-decode a `file://` URI path component.
pub fn percent_decode_path(path: &str) -> String {
    fn hex_val(b: u8) -> Option<u8> {
        match b {
            b'0'..=b'9' => Some(b - b'0'),
            b'a'..=b'f' => Some(b - b'a' + 10),
            b'A'..=b'F' => Some(b - b'A' + 10),
            _ => None,
        }
    }

    let bytes = path.as_bytes();
    let mut out = Vec::<u8>::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && let (Some(hi), Some(lo)) = (hex_val(bytes[i + 1]), hex_val(bytes[i + 2]))
        {
            out.push((hi << 4) | lo);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).to_string()
}

fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    let uri = uri.strip_prefix("file://")?;
    let uri = uri.strip_prefix("localhost/").unwrap_or(uri);

    let mut path_str = percent_decode_path(uri);

    // `file:///C:/...` -> `C:/...`
    if cfg!(windows) {
        if path_str.starts_with('/') && path_str.get(2..3) == Some(":") {
            path_str.remove(0);
        }
        path_str = path_str.replace('/', "\\");
    }

    Some(PathBuf::from(path_str))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_scheme_qualified_uris() {
        for uri in [
            "file:///tmp/a.pkl",
            "pkl:base",
            "untitled:Untitled-1",
            "https://example.com/x.pkl",
        ] {
            assert_eq!(DocumentUri::parse(uri).unwrap().as_str(), uri);
        }
    }

    #[test]
    fn test_parse_rejects_relative_and_malformed_uris() {
        assert_eq!(DocumentUri::parse(""), Err(UriError::Empty));
        for uri in ["foo.pkl", "./foo.pkl", "C:\\foo.pkl", "1x:foo", "file:", ":foo"] {
            assert!(
                matches!(DocumentUri::parse(uri), Err(UriError::MissingScheme(_))),
                "{uri} should be rejected"
            );
        }
    }

    #[test]
    fn test_scheme() {
        assert_eq!(DocumentUri::parse("pkl:base").unwrap().scheme(), "pkl");
        assert!(DocumentUri::parse("file:///a").unwrap().is_file());
        assert!(!DocumentUri::parse("pkl:base").unwrap().is_file());
    }

    #[test]
    fn test_percent_roundtrip() {
        let input = "/tmp/hello world.pkl";
        let encoded = percent_encode_path(input);
        assert_eq!(encoded, "/tmp/hello%20world.pkl");
        assert_eq!(percent_decode_path(&encoded), input);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_uri_roundtrip() {
        let uri = DocumentUri::from_file_path(Path::new("/tmp/dir/../hello world.pkl"));
        assert_eq!(uri.as_str(), "file:///tmp/hello%20world.pkl");
        assert_eq!(
            uri.to_file_path(),
            Some(PathBuf::from("/tmp/hello world.pkl"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_join_relative_paths() {
        let base = DocumentUri::parse("file:///work/project/main.pkl").unwrap();
        assert_eq!(
            base.join("lib/util.pkl").unwrap().as_str(),
            "file:///work/project/lib/util.pkl"
        );
        assert_eq!(
            base.join("../shared/base.pkl").unwrap().as_str(),
            "file:///work/shared/base.pkl"
        );
        assert_eq!(
            base.join("./same.pkl").unwrap().as_str(),
            "file:///work/project/same.pkl"
        );
    }

    #[test]
    fn test_join_requires_file_uri() {
        let base = DocumentUri::parse("pkl:base").unwrap();
        assert_eq!(
            base.join("x.pkl"),
            Err(UriError::NotAFileUri("pkl:base".to_string()))
        );
    }
}
