//! Catalog tree container and statistics.

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::arena::NodeArena;
use crate::config::{CatalogConfig, StorageLookup};
use crate::error::CatalogError;
use crate::node::{CatalogNode, ContentHash, NodeId, NodeKind, NodeType};
use crate::subtree::StorageSubtree;

/// Summary statistics for the nodes reachable from the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    /// Cached size of the root (valid after a size refresh).
    pub total_size: u64,
    /// Number of storage nodes.
    pub total_storages: u64,
    /// Number of directories.
    pub total_dirs: u64,
    /// Number of files.
    pub total_files: u64,
    /// Number of archive members.
    pub total_archived: u64,
    /// Number of meta entries.
    pub total_meta: u64,
    /// Deepest level below the root.
    pub max_depth: u32,
    /// Number of flagged nodes.
    pub total_flagged: u64,
}

impl TreeStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a node found at `depth`.
    pub fn record_node(&mut self, node: &CatalogNode, depth: u32) {
        self.max_depth = self.max_depth.max(depth);
        if node.flagged() {
            self.total_flagged += 1;
        }
        match node.node_type() {
            NodeType::Top => self.total_size = node.size(),
            NodeType::Storage => self.total_storages += 1,
            NodeType::Dir => self.total_dirs += 1,
            NodeType::File => self.total_files += 1,
            NodeType::Archived => self.total_archived += 1,
            NodeType::Meta => self.total_meta += 1,
        }
    }
}

/// Depth-first, parent-before-children iterator over a subtree.
pub struct Descendants<'a> {
    arena: &'a NodeArena,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a CatalogNode;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            match self.arena.get(id) {
                Ok(node) => {
                    self.stack.extend(node.children.iter().rev());
                    return Some(node);
                }
                Err(err) => {
                    tracing::warn!(target: "catalog", node = %id, %err, "skipping child missing from arena");
                }
            }
        }
        None
    }
}

/// In-memory catalog of indexed storages.
///
/// The tree owns every node. Nodes are created through the `add_*`
/// constructors, optionally detached and attached later, and never removed;
/// the whole tree is dropped as a unit.
#[derive(Debug, Clone)]
pub struct CatalogTree {
    arena: NodeArena,
    root: NodeId,
    config: CatalogConfig,
}

impl CatalogTree {
    /// Create a tree holding only its top node.
    pub fn new(name: impl Into<CompactString>) -> Self {
        Self::with_config(name, CatalogConfig::default())
    }

    /// Create a tree with a custom configuration.
    pub fn with_config(name: impl Into<CompactString>, config: CatalogConfig) -> Self {
        let mut arena = NodeArena::default();
        let root = arena.push(name, 0, NodeKind::Top);
        Self {
            arena,
            root,
            config,
        }
    }

    pub(crate) fn from_parts(arena: NodeArena, root: NodeId, config: CatalogConfig) -> Self {
        Self {
            arena,
            root,
            config,
        }
    }

    /// Configuration of this tree.
    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Id of the top node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes, detached ones included.
    ///
    /// Detached nodes are not reachable from the root, so they are not
    /// exported; [`CatalogTree::reachable_len`] counts what an export holds.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Number of nodes reachable from the root.
    pub fn reachable_len(&self) -> usize {
        self.iter().count()
    }

    /// Always false: a tree holds at least its top node.
    pub fn is_empty(&self) -> bool {
        self.arena.len() == 0
    }

    /// Get a node by id.
    pub fn get(&self, id: NodeId) -> Result<&CatalogNode, CatalogError> {
        self.arena.get(id)
    }

    /// Get the parent of a node.
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, CatalogError> {
        Ok(self.arena.get(id)?.parent)
    }

    /// Get the children of a node in insertion order.
    pub fn children(&self, id: NodeId) -> Result<&[NodeId], CatalogError> {
        Ok(self.arena.get(id)?.children())
    }

    /// Find a direct child by name.
    pub fn child_by_name(&self, parent: NodeId, name: &str) -> Result<Option<NodeId>, CatalogError> {
        for &child in self.children(parent)? {
            if self.arena.get(child)?.name() == name {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    /// Ancestors of a node, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Result<Vec<NodeId>, CatalogError> {
        self.arena.parent_chain(id)
    }

    /// Number of ancestors of a node (0 for the root).
    pub fn depth(&self, id: NodeId) -> Result<usize, CatalogError> {
        Ok(self.arena.parent_chain(id)?.len())
    }

    /// Iterate over a node and its descendants, parents before children.
    pub fn descendants(&self, id: NodeId) -> Result<Descendants<'_>, CatalogError> {
        self.arena.get(id)?;
        Ok(Descendants {
            arena: &self.arena,
            stack: vec![id],
        })
    }

    /// Iterate over every node reachable from the root.
    pub fn iter(&self) -> Descendants<'_> {
        Descendants {
            arena: &self.arena,
            stack: vec![self.root],
        }
    }

    /// Storage nodes attached under the root.
    pub fn storages(&self) -> impl Iterator<Item = &CatalogNode> {
        let root = self.arena.get(self.root).ok();
        root.into_iter()
            .flat_map(|root| root.children.iter())
            .filter_map(|&id| self.arena.get(id).ok())
            .filter(|node| node.kind.is_storage())
    }

    /// Find a storage by name.
    pub fn storage_by_name(&self, name: &str) -> Option<NodeId> {
        self.storages()
            .find(|node| node.name() == name)
            .map(CatalogNode::id)
    }

    /// Add a storage under the root.
    pub fn add_storage(
        &mut self,
        name: impl Into<CompactString>,
        size: u64,
        free: u64,
        total: u64,
        indexed_at: DateTime<Utc>,
        attr: impl Into<CompactString>,
    ) -> Result<NodeId, CatalogError> {
        let kind = NodeKind::Storage {
            free,
            total,
            indexed_at,
            attr: attr.into(),
        };
        self.insert(Some(self.root), name, size, kind)
    }

    /// Add a directory, detached when `parent` is `None`.
    pub fn add_dir(
        &mut self,
        parent: Option<NodeId>,
        name: impl Into<CompactString>,
        size: u64,
        accessed: DateTime<Utc>,
    ) -> Result<NodeId, CatalogError> {
        self.insert(parent, name, size, NodeKind::Dir { accessed })
    }

    /// Add a file, detached when `parent` is `None`.
    pub fn add_file(
        &mut self,
        parent: Option<NodeId>,
        name: impl Into<CompactString>,
        size: u64,
        hash: ContentHash,
        accessed: DateTime<Utc>,
    ) -> Result<NodeId, CatalogError> {
        self.insert(parent, name, size, NodeKind::File { hash, accessed })
    }

    /// Add an archive member, detached when `parent` is `None`.
    pub fn add_archived(
        &mut self,
        parent: Option<NodeId>,
        name: impl Into<CompactString>,
        size: u64,
        hash: ContentHash,
        archive: impl Into<CompactString>,
    ) -> Result<NodeId, CatalogError> {
        let kind = NodeKind::Archived {
            hash,
            archive: archive.into(),
        };
        self.insert(parent, name, size, kind)
    }

    /// Add a meta entry, detached when `parent` is `None`.
    pub fn add_meta(
        &mut self,
        parent: Option<NodeId>,
        name: impl Into<CompactString>,
        attrs: IndexMap<String, String>,
    ) -> Result<NodeId, CatalogError> {
        self.insert(parent, name, 0, NodeKind::Meta { attrs })
    }

    fn insert(
        &mut self,
        parent: Option<NodeId>,
        name: impl Into<CompactString>,
        size: u64,
        kind: NodeKind,
    ) -> Result<NodeId, CatalogError> {
        self.arena
            .insert(parent, name, size, kind, self.config.enforce_storage_depth)
    }

    /// Attach a detached node, with everything below it, under `parent`.
    pub fn attach(&mut self, child: NodeId, parent: NodeId) -> Result<(), CatalogError> {
        self.arena
            .attach(child, parent, self.config.enforce_storage_depth)?;
        tracing::debug!(target: "catalog", %child, %parent, "attached node");
        Ok(())
    }

    /// Attach a storage subtree under the root as a whole.
    pub fn attach_storage(&mut self, subtree: StorageSubtree) -> Result<NodeId, CatalogError> {
        let nodes = subtree.len();
        let storage = self.arena.graft(
            subtree.into_arena(),
            self.root,
            self.config.enforce_storage_depth,
        )?;
        tracing::debug!(target: "catalog", %storage, nodes, "attached storage subtree");
        Ok(storage)
    }

    /// Path of a node relative to the catalog root.
    ///
    /// The root resolves to an empty string; other nodes join their parent's
    /// path and their name with the configured separator.
    pub fn full_path(&self, id: NodeId) -> Result<String, CatalogError> {
        let node = self.arena.get(id)?;
        if node.kind.is_top() {
            return Ok(String::new());
        }

        let mut nodes = self
            .arena
            .parent_chain(id)?
            .into_iter()
            .rev()
            .map(|ancestor| self.arena.get(ancestor))
            .collect::<Result<Vec<_>, _>>()?;
        nodes.push(node);
        Ok(self.join_names(nodes))
    }

    /// Path of a node relative to its owning storage.
    ///
    /// Returns `None` when the node has no owning storage.
    pub fn storage_path(&self, id: NodeId) -> Result<Option<String>, CatalogError> {
        let Some(storage) = self.owner_storage(id)? else {
            return Ok(None);
        };
        if storage == id {
            return Ok(Some(String::new()));
        }

        let mut nodes = self
            .arena
            .parent_chain(id)?
            .into_iter()
            .take_while(|&ancestor| ancestor != storage)
            .map(|ancestor| self.arena.get(ancestor))
            .collect::<Result<Vec<_>, _>>()?;
        nodes.reverse();
        nodes.push(self.arena.get(id)?);
        Ok(Some(self.join_names(nodes)))
    }

    fn join_names(&self, nodes: Vec<&CatalogNode>) -> String {
        let mut path = String::new();
        for node in nodes {
            if node.kind.is_top() {
                continue;
            }
            if !path.is_empty() {
                path.push(self.config.separator);
            }
            path.push_str(node.name());
        }
        path
    }

    /// Compute the recursive size of a node.
    ///
    /// Containers sum their children and cache the result in their own size;
    /// files and archive members report their stored size; meta entries are
    /// always zero.
    pub fn recursive_size(&mut self, id: NodeId) -> Result<u64, CatalogError> {
        self.arena.refresh_size(id)
    }

    /// Refresh every cached container size and return the catalog total.
    pub fn refresh_sizes(&mut self) -> Result<u64, CatalogError> {
        self.recursive_size(self.root)
    }

    /// Find the storage a node belongs to.
    ///
    /// A storage owns itself, the root has no owner and meta entries
    /// defer to their parent.
    pub fn owner_storage(&self, id: NodeId) -> Result<Option<NodeId>, CatalogError> {
        let node = self.arena.get(id)?;
        match node.node_type() {
            NodeType::Storage => Ok(Some(id)),
            NodeType::Top => Ok(None),
            NodeType::Meta => match node.parent {
                Some(parent) => self.owner_storage(parent),
                None => Ok(None),
            },
            NodeType::Dir | NodeType::File | NodeType::Archived => {
                match self.config.storage_lookup {
                    StorageLookup::Walk => self.walk_to_storage(id),
                    StorageLookup::Ancestry => self.storage_by_ancestry(id).map(Some),
                }
            }
        }
    }

    fn walk_to_storage(&self, id: NodeId) -> Result<Option<NodeId>, CatalogError> {
        for ancestor in self.arena.parent_chain(id)? {
            if self.arena.get(ancestor)?.kind.is_storage() {
                return Ok(Some(ancestor));
            }
        }
        Ok(None)
    }

    fn storage_by_ancestry(&self, id: NodeId) -> Result<NodeId, CatalogError> {
        let chain = self.arena.parent_chain(id)?;
        let mut from_root = chain.iter().rev();
        let (Some(&first), Some(&second)) = (from_root.next(), from_root.next()) else {
            tracing::warn!(target: "catalog", node = %id, "no ancestor at depth 1");
            return Err(CatalogError::structural_violation(id, "no ancestor at depth 1"));
        };

        if !self.arena.get(first)?.kind.is_top() {
            tracing::warn!(target: "catalog", node = %id, "ancestry does not start at the root");
            return Err(CatalogError::structural_violation(
                id,
                "ancestry does not start at the root",
            ));
        }
        let candidate = self.arena.get(second)?;
        if !candidate.kind.is_storage() {
            tracing::warn!(target: "catalog", node = %id, found = %candidate.node_type(), "depth 1 ancestor is not a storage");
            return Err(CatalogError::structural_violation(
                id,
                format!(
                    "depth 1 ancestor '{}' is a {}, not a storage",
                    candidate.name(),
                    candidate.node_type()
                ),
            ));
        }
        Ok(second)
    }

    /// Flag a node.
    pub fn flag(&mut self, id: NodeId) -> Result<(), CatalogError> {
        self.arena.get_mut(id)?.flagged = true;
        Ok(())
    }

    /// Reset a node's flag.
    pub fn unflag(&mut self, id: NodeId) -> Result<(), CatalogError> {
        self.arena.get_mut(id)?.flagged = false;
        Ok(())
    }

    /// Check whether a node is flagged; unknown ids read as unflagged.
    pub fn flagged(&self, id: NodeId) -> bool {
        self.arena.get(id).is_ok_and(CatalogNode::flagged)
    }

    /// Flagged nodes reachable from the root, parents before children.
    pub fn flagged_nodes(&self) -> Vec<NodeId> {
        self.iter()
            .filter(|node| node.flagged())
            .map(CatalogNode::id)
            .collect()
    }

    /// Unflag every node and return how many were flagged.
    pub fn clear_flags(&mut self) -> usize {
        let mut cleared = 0;
        for node in self.arena.iter_mut().filter(|node| node.flagged) {
            node.flagged = false;
            cleared += 1;
        }
        cleared
    }

    /// Compute statistics over the nodes reachable from the root.
    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats::new();
        let mut stack = vec![(self.root, 0u32)];
        while let Some((id, depth)) = stack.pop() {
            let node = match self.arena.get(id) {
                Ok(node) => node,
                Err(err) => {
                    tracing::warn!(target: "catalog", node = %id, %err, "skipping child missing from arena");
                    continue;
                }
            };
            stats.record_node(node, depth);
            stack.extend(node.children.iter().map(|&child| (child, depth + 1)));
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(0, 0).unwrap()
    }

    #[test]
    fn test_tree_stats_default() {
        let stats = TreeStats::default();
        assert_eq!(stats.total_size, 0);
        assert_eq!(stats.total_files, 0);
        assert_eq!(stats.total_dirs, 0);
    }

    #[test]
    fn test_new_tree_has_only_top() {
        let tree = CatalogTree::new("top");
        assert_eq!(tree.len(), 1);
        assert!(!tree.is_empty());

        let root = tree.get(tree.root()).unwrap();
        assert_eq!(root.name(), "top");
        assert!(root.kind().is_top());
        assert_eq!(root.parent(), None);
        assert_eq!(tree.full_path(tree.root()).unwrap(), "");
        assert_eq!(tree.owner_storage(tree.root()).unwrap(), None);
    }

    #[test]
    fn test_detached_node_attach() {
        let mut tree = CatalogTree::new("top");
        let disk = tree
            .add_storage("disk1", 0, 10, 20, epoch(), "")
            .unwrap();
        let docs = tree.add_dir(None, "docs", 0, epoch()).unwrap();
        let file = tree
            .add_file(Some(docs), "a.txt", 10, ContentHash::new("abc"), epoch())
            .unwrap();

        // Detached subtree resolves paths from its own root.
        assert_eq!(tree.full_path(file).unwrap(), "docs/a.txt");
        assert_eq!(tree.owner_storage(file).unwrap(), None);
        assert!(tree.iter().all(|node| node.id() != docs));

        tree.attach(docs, disk).unwrap();
        assert_eq!(tree.full_path(file).unwrap(), "disk1/docs/a.txt");
        assert_eq!(tree.owner_storage(file).unwrap(), Some(disk));
        assert_eq!(tree.depth(file).unwrap(), 3);

        let err = tree.attach(docs, disk).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidOperation { .. }));
    }

    #[test]
    fn test_attach_storage_subtree() {
        let mut tree = CatalogTree::new("top");
        let mut subtree = StorageSubtree::new("disk2", 0, 1, 2, epoch(), "");
        let inner = subtree
            .add_dir(subtree.storage(), "inner", 0, epoch())
            .unwrap();
        subtree
            .add_file(inner, "b.bin", 3, ContentHash::default(), epoch())
            .unwrap();

        let storage = tree.attach_storage(subtree).unwrap();
        assert_eq!(tree.parent(storage).unwrap(), Some(tree.root()));
        assert_eq!(tree.storage_by_name("disk2"), Some(storage));

        let inner = tree.child_by_name(storage, "inner").unwrap().unwrap();
        let file = tree.child_by_name(inner, "b.bin").unwrap().unwrap();
        assert_eq!(tree.full_path(file).unwrap(), "disk2/inner/b.bin");
        assert_eq!(tree.owner_storage(file).unwrap(), Some(storage));
        assert_eq!(tree.recursive_size(storage).unwrap(), 3);
    }

    #[test]
    fn test_leaf_size_leaves_cache_alone() {
        let mut tree = CatalogTree::new("top");
        let disk = tree
            .add_storage("disk1", 0, 10, 20, epoch(), "")
            .unwrap();
        let dir = tree.add_dir(Some(disk), "docs", 77, epoch()).unwrap();
        let file = tree
            .add_file(Some(dir), "a.txt", 5, ContentHash::default(), epoch())
            .unwrap();

        assert_eq!(tree.recursive_size(file).unwrap(), 5);
        // No container was refreshed by a leaf query.
        assert_eq!(tree.get(dir).unwrap().size(), 77);
        assert_eq!(tree.recursive_size(dir).unwrap(), 5);
        assert_eq!(tree.get(dir).unwrap().size(), 5);
    }

    #[test]
    fn test_traversal_skips_missing_child() {
        let mut tree = CatalogTree::new("top");
        let disk = tree
            .add_storage("disk1", 0, 10, 20, epoch(), "")
            .unwrap();
        let missing = NodeId::new(500);
        tree.arena.get_mut(tree.root).unwrap().children.insert(0, missing);
        let file = tree
            .add_file(Some(disk), "a.txt", 5, ContentHash::default(), epoch())
            .unwrap();

        let ids: Vec<NodeId> = tree.iter().map(CatalogNode::id).collect();
        assert_eq!(ids, vec![tree.root(), disk, file]);

        let stats = tree.stats();
        assert_eq!(stats.total_storages, 1);
        assert_eq!(stats.total_files, 1);
    }

    #[test]
    fn test_custom_separator() {
        let config = CatalogConfig::builder().separator('\\').build().unwrap();
        let mut tree = CatalogTree::with_config("top", config);
        let disk = tree
            .add_storage("C", 0, 10, 20, epoch(), "")
            .unwrap();
        let dir = tree.add_dir(Some(disk), "Users", 0, epoch()).unwrap();

        assert_eq!(tree.full_path(dir).unwrap(), "C\\Users");
        assert_eq!(tree.storage_path(dir).unwrap().as_deref(), Some("Users"));
    }

    #[test]
    fn test_flags_and_stats() {
        let mut tree = CatalogTree::new("top");
        let disk = tree
            .add_storage("disk1", 0, 10, 20, epoch(), "")
            .unwrap();
        let file = tree
            .add_file(Some(disk), "a.txt", 7, ContentHash::new("abc"), epoch())
            .unwrap();

        tree.flag(file).unwrap();
        tree.flag(disk).unwrap();
        assert_eq!(tree.flagged_nodes(), vec![disk, file]);

        tree.refresh_sizes().unwrap();
        let stats = tree.stats();
        assert_eq!(stats.total_size, 7);
        assert_eq!(stats.total_storages, 1);
        assert_eq!(stats.total_files, 1);
        assert_eq!(stats.max_depth, 2);
        assert_eq!(stats.total_flagged, 2);

        assert_eq!(tree.clear_flags(), 2);
        assert!(tree.flagged_nodes().is_empty());
        assert!(!tree.flagged(NodeId::new(99)));
        assert!(tree.flag(NodeId::new(99)).is_err());
    }
}
