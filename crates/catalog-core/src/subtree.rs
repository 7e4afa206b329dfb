//! Storage subtrees built outside of a catalog tree.
//!
//! Each storage device can be indexed on its own thread into a
//! [`StorageSubtree`] and then attached under the root in a single step
//! with [`crate::CatalogTree::attach_storage`], so readers of the tree never
//! see a half-built storage.

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use indexmap::IndexMap;

use crate::arena::NodeArena;
use crate::error::CatalogError;
use crate::node::{CatalogNode, ContentHash, NodeId, NodeKind};

/// A storage node and its descendants, detached from any tree.
///
/// Ids returned by a subtree are local to it; they change once the subtree
/// is attached.
#[derive(Debug, Clone)]
pub struct StorageSubtree {
    arena: NodeArena,
    storage: NodeId,
}

impl StorageSubtree {
    /// Create a subtree holding a single storage node.
    pub fn new(
        name: impl Into<CompactString>,
        size: u64,
        free: u64,
        total: u64,
        indexed_at: DateTime<Utc>,
        attr: impl Into<CompactString>,
    ) -> Self {
        let mut arena = NodeArena::default();
        let kind = NodeKind::Storage {
            free,
            total,
            indexed_at,
            attr: attr.into(),
        };
        let storage = arena.push(name, size, kind);
        Self { arena, storage }
    }

    /// Id of the storage node.
    pub fn storage(&self) -> NodeId {
        self.storage
    }

    /// Get a node of this subtree.
    pub fn get(&self, id: NodeId) -> Result<&CatalogNode, CatalogError> {
        self.arena.get(id)
    }

    /// Number of nodes, the storage included.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Always false: a subtree holds at least its storage node.
    pub fn is_empty(&self) -> bool {
        self.arena.len() == 0
    }

    /// Add a directory under `parent`.
    pub fn add_dir(
        &mut self,
        parent: NodeId,
        name: impl Into<CompactString>,
        size: u64,
        accessed: DateTime<Utc>,
    ) -> Result<NodeId, CatalogError> {
        self.arena
            .insert(Some(parent), name, size, NodeKind::Dir { accessed }, true)
    }

    /// Add a file under `parent`.
    pub fn add_file(
        &mut self,
        parent: NodeId,
        name: impl Into<CompactString>,
        size: u64,
        hash: ContentHash,
        accessed: DateTime<Utc>,
    ) -> Result<NodeId, CatalogError> {
        self.arena.insert(
            Some(parent),
            name,
            size,
            NodeKind::File { hash, accessed },
            true,
        )
    }

    /// Add an archive member under `parent`.
    pub fn add_archived(
        &mut self,
        parent: NodeId,
        name: impl Into<CompactString>,
        size: u64,
        hash: ContentHash,
        archive: impl Into<CompactString>,
    ) -> Result<NodeId, CatalogError> {
        let kind = NodeKind::Archived {
            hash,
            archive: archive.into(),
        };
        self.arena.insert(Some(parent), name, size, kind, true)
    }

    /// Add a meta entry under `parent`.
    pub fn add_meta(
        &mut self,
        parent: NodeId,
        name: impl Into<CompactString>,
        attrs: IndexMap<String, String>,
    ) -> Result<NodeId, CatalogError> {
        self.arena
            .insert(Some(parent), name, 0, NodeKind::Meta { attrs }, true)
    }

    pub(crate) fn into_arena(self) -> NodeArena {
        self.arena
    }
}
