//! Core types for the storage catalog.
//!
//! This crate provides the in-memory catalog tree: storages, directories,
//! files, archive members and meta entries indexed by an external scanner,
//! together with path resolution, size aggregation, owner storage lookup and
//! flat record export/import for persistence.

mod arena;
mod config;
mod error;
mod node;
mod record;
mod subtree;
mod tree;

pub use config::{CatalogConfig, CatalogConfigBuilder, StorageLookup};
pub use error::CatalogError;
pub use node::{CatalogNode, ContentHash, NodeId, NodeKind, NodeType, may_have_children};
pub use record::NodeRecord;
pub use subtree::StorageSubtree;
pub use tree::{CatalogTree, Descendants, TreeStats};
