//! Engine configuration.
//!
//! ```toml
//! max_resolve_depth = 512
//! coalesce_skippable = true
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Limits and policies of one document session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Nested cell resolutions allowed before a cell fails.
    pub max_resolve_depth: usize,
    /// Nested composite expansions allowed before expansion fails.
    pub max_expansion_depth: usize,
    /// Upper bound on generated sequences.
    pub max_sequence_length: usize,
    /// Coalesce bursts of skippable actions on the same target.
    pub coalesce_skippable: bool,
    /// Record essential writes, expansions and actions in the ledger.
    pub record_ledger: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_resolve_depth: 512,
            max_expansion_depth: 64,
            max_sequence_length: 10_000,
            coalesce_skippable: true,
            record_ledger: false,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_use_defaults() {
        let config = EngineConfig::from_toml_str("coalesce_skippable = false\n").unwrap();
        assert!(!config.coalesce_skippable);
        assert_eq!(config.max_resolve_depth, 512);
    }

    #[test]
    fn rejects_wrong_types() {
        assert!(EngineConfig::from_toml_str("max_resolve_depth = \"deep\"").is_err());
    }
}
