//! Analysis configuration and the feature table.
//!
//! Hosts pass configuration once at start-up (typically from the client's initialization
//! options). The resolved [`FeatureSet`] is immutable and handed to whatever needs it.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors produced when reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid analysis configuration: {0}")]
    /// The configuration JSON could not be decoded.
    Json(#[from] serde_json::Error),
}

/// Tunables of the analysis core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisConfig {
    /// Maximum number of nested imports followed from an open document; `0` disables imports.
    pub max_import_depth: usize,
    /// Number of import resolution workers.
    pub worker_threads: usize,
    /// Upper bound on any wait for a peer's parse or a queued resolution, in milliseconds.
    pub import_timeout_ms: u64,
    /// Turn on features still marked experimental.
    pub enable_experimental_features: bool,
    /// Features switched off regardless of their defaults.
    pub disabled_features: Vec<FeatureKind>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_import_depth: 3,
            worker_threads: 4,
            import_timeout_ms: 5_000,
            enable_experimental_features: false,
            disabled_features: Vec::new(),
        }
    }
}

impl AnalysisConfig {
    /// Decode a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Worker count, never zero.
    pub fn worker_threads(&self) -> usize {
        self.worker_threads.max(1)
    }

    /// Import wait timeout.
    pub fn import_timeout(&self) -> Duration {
        Duration::from_millis(self.import_timeout_ms)
    }

    /// Resolve the feature table for this configuration.
    pub fn features(&self) -> FeatureSet {
        FeatureSet::from_config(self)
    }
}

/// Editor features served on top of the analysis core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeatureKind {
    /// Code completion.
    Completion,
    /// Symbol rename.
    Rename,
    /// Document outline.
    DocumentSymbols,
    /// Semantic highlighting.
    SemanticTokens,
    /// Go to definition.
    Definition,
    /// Published diagnostics.
    Diagnostics,
}

impl FeatureKind {
    /// Every feature, in table order.
    pub const ALL: [FeatureKind; 6] = [
        FeatureKind::Completion,
        FeatureKind::Rename,
        FeatureKind::DocumentSymbols,
        FeatureKind::SemanticTokens,
        FeatureKind::Definition,
        FeatureKind::Diagnostics,
    ];

    /// Whether the feature is still experimental.
    pub fn is_experimental(self) -> bool {
        matches!(
            self,
            FeatureKind::Rename | FeatureKind::SemanticTokens | FeatureKind::Diagnostics
        )
    }

    /// Whether the feature is on without any configuration.
    pub fn is_enabled_by_default(self) -> bool {
        !self.is_experimental()
    }
}

/// Resolved, immutable feature table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSet {
    enabled: Vec<FeatureKind>,
}

impl FeatureSet {
    /// Resolve which features are on for `config`.
    pub fn from_config(config: &AnalysisConfig) -> Self {
        let enabled = FeatureKind::ALL
            .into_iter()
            .filter(|kind| {
                let on = kind.is_enabled_by_default()
                    || (kind.is_experimental() && config.enable_experimental_features);
                on && !config.disabled_features.contains(kind)
            })
            .collect();
        Self { enabled }
    }

    /// Whether `kind` is enabled.
    pub fn is_enabled(&self, kind: FeatureKind) -> bool {
        self.enabled.contains(&kind)
    }

    /// Enabled features, in table order.
    pub fn enabled(&self) -> &[FeatureKind] {
        &self.enabled
    }
}

impl Default for FeatureSet {
    fn default() -> Self {
        Self::from_config(&AnalysisConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.max_import_depth, 3);
        assert_eq!(config.import_timeout(), Duration::from_secs(5));
        assert_eq!(
            config.features().enabled(),
            &[
                FeatureKind::Completion,
                FeatureKind::DocumentSymbols,
                FeatureKind::Definition
            ]
        );
    }

    #[test]
    fn test_from_json_partial() {
        let config = AnalysisConfig::from_json_str(
            r#"{"maxImportDepth": 0, "disabledFeatures": ["completion"], "enableExperimentalFeatures": true}"#,
        )
        .unwrap();
        assert_eq!(config.max_import_depth, 0);
        assert_eq!(config.worker_threads, 4);

        let features = config.features();
        assert!(!features.is_enabled(FeatureKind::Completion));
        assert!(features.is_enabled(FeatureKind::Rename));
        assert!(features.is_enabled(FeatureKind::Diagnostics));
        assert!(features.is_enabled(FeatureKind::Definition));
    }

    #[test]
    fn test_from_json_rejects_unknown_feature() {
        let err = AnalysisConfig::from_json_str(r#"{"disabledFeatures": ["hover"]}"#);
        assert!(matches!(err, Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_worker_threads_never_zero() {
        let config = AnalysisConfig {
            worker_threads: 0,
            ..AnalysisConfig::default()
        };
        assert_eq!(config.worker_threads(), 1);
    }
}
