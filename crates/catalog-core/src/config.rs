//! Catalog configuration types.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// How the owning storage of a node is located.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageLookup {
    /// Walk up the parents until a storage node is found.
    #[default]
    Walk,
    /// Take the node at depth 1 of the root-to-node chain and verify it is a storage.
    Ancestry,
}

/// Configuration for a catalog tree.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct CatalogConfig {
    /// Separator used when joining node names into paths.
    #[builder(default = "'/'")]
    #[serde(default = "default_separator")]
    pub separator: char,

    /// Strategy for owner storage lookups.
    #[builder(default)]
    #[serde(default)]
    pub storage_lookup: StorageLookup,

    /// Reject storage nodes attached anywhere but directly under the root.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub enforce_storage_depth: bool,
}

fn default_separator() -> char {
    '/'
}

fn default_true() -> bool {
    true
}

impl CatalogConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(separator) = self.separator {
            if separator == '\0' || separator.is_alphanumeric() {
                return Err(format!("Invalid path separator: {separator:?}"));
            }
        }
        Ok(())
    }
}

impl CatalogConfig {
    /// Create a new config builder.
    pub fn builder() -> CatalogConfigBuilder {
        CatalogConfigBuilder::default()
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            storage_lookup: StorageLookup::Walk,
            enforce_storage_depth: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = CatalogConfig::builder()
            .separator('\\')
            .storage_lookup(StorageLookup::Ancestry)
            .build()
            .unwrap();

        assert_eq!(config.separator, '\\');
        assert_eq!(config.storage_lookup, StorageLookup::Ancestry);
        assert!(config.enforce_storage_depth);
    }

    #[test]
    fn test_config_default() {
        let config = CatalogConfig::default();
        assert_eq!(config.separator, '/');
        assert_eq!(config.storage_lookup, StorageLookup::Walk);
        assert!(config.enforce_storage_depth);
        assert_eq!(CatalogConfig::builder().build().unwrap(), config);
    }

    #[test]
    fn test_config_rejects_bad_separator() {
        assert!(CatalogConfig::builder().separator('a').build().is_err());
        assert!(CatalogConfig::builder().separator('\0').build().is_err());
    }
}
