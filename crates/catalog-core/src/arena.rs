//! Arena storage shared by catalog trees and detached storage subtrees.
//!
//! Nodes are addressed by their index. A parent owns an ordered list of
//! child ids and each child keeps the id of its parent, so the tree has no
//! reference cycles while parent access stays O(1).

use std::collections::HashSet;

use compact_str::CompactString;

use crate::error::CatalogError;
use crate::node::{CatalogNode, NodeId, NodeKind, NodeType};

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct NodeArena {
    nodes: Vec<CatalogNode>,
}

impl NodeArena {
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn get(&self, id: NodeId) -> Result<&CatalogNode, CatalogError> {
        self.nodes
            .get(id.index())
            .ok_or(CatalogError::NodeNotFound { id })
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Result<&mut CatalogNode, CatalogError> {
        self.nodes
            .get_mut(id.index())
            .ok_or(CatalogError::NodeNotFound { id })
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut CatalogNode> {
        self.nodes.iter_mut()
    }

    /// Create a node, attaching it to `parent` when given.
    ///
    /// The parent is validated before anything is pushed, so a rejected
    /// insert leaves the arena untouched.
    pub(crate) fn insert(
        &mut self,
        parent: Option<NodeId>,
        name: impl Into<CompactString>,
        size: u64,
        kind: NodeKind,
        enforce_storage_depth: bool,
    ) -> Result<NodeId, CatalogError> {
        let name = name.into();
        if let Some(parent) = parent {
            self.check_parent(&kind, &name, parent, enforce_storage_depth)?;
        }

        let id = self.push(name, size, kind);
        if let Some(parent) = parent {
            self.link(id, parent);
        }
        Ok(id)
    }

    /// Create a detached node.
    pub(crate) fn push(&mut self, name: impl Into<CompactString>, size: u64, kind: NodeKind) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        self.nodes.push(CatalogNode::new(id, name, size, kind));
        id
    }

    /// Attach a detached node (and its subtree) under `parent`.
    pub(crate) fn attach(
        &mut self,
        child: NodeId,
        parent: NodeId,
        enforce_storage_depth: bool,
    ) -> Result<(), CatalogError> {
        let node = self.get(child)?;
        if node.parent.is_some() {
            return Err(CatalogError::invalid_operation(format!(
                "'{}' is already attached",
                node.name
            )));
        }
        self.check_parent(&node.kind, &node.name, parent, enforce_storage_depth)?;

        if child == parent || self.parent_chain(parent)?.contains(&child) {
            return Err(CatalogError::invalid_operation(format!(
                "attaching {child} under {parent} would create a cycle"
            )));
        }

        self.link(child, parent);
        Ok(())
    }

    /// Move every node of `other` into this arena and attach its first node
    /// under `parent`. Returns the new id of that node.
    pub(crate) fn graft(
        &mut self,
        other: NodeArena,
        parent: NodeId,
        enforce_storage_depth: bool,
    ) -> Result<NodeId, CatalogError> {
        let Some(root) = other.nodes.first() else {
            return Err(CatalogError::invalid_operation("cannot attach an empty subtree"));
        };
        self.check_parent(&root.kind, &root.name, parent, enforce_storage_depth)?;

        let offset = self.nodes.len() as u64;
        let shift = |id: NodeId| NodeId(id.0 + offset);
        let root_id = shift(root.id);

        self.nodes.reserve(other.nodes.len());
        for mut node in other.nodes {
            node.id = shift(node.id);
            node.parent = node.parent.map(shift);
            for child in &mut node.children {
                *child = shift(*child);
            }
            self.nodes.push(node);
        }

        self.link(root_id, parent);
        Ok(root_id)
    }

    /// Ancestors of `id`, nearest first.
    pub(crate) fn parent_chain(&self, id: NodeId) -> Result<Vec<NodeId>, CatalogError> {
        let mut chain = Vec::new();
        let mut current = self.get(id)?.parent;
        while let Some(parent) = current {
            // More steps than nodes means the parent links loop.
            if chain.len() >= self.nodes.len() {
                tracing::warn!(target: "catalog", node = %id, "parent chain loops");
                return Err(CatalogError::CycleDetected { id: parent });
            }
            chain.push(parent);
            current = self.get(parent)?.parent;
        }
        Ok(chain)
    }

    /// Recompute the size of `id` from its children and cache it on every
    /// container visited.
    ///
    /// The walk is post-order over an explicit stack, so tree depth is not
    /// bounded by the thread's stack. Leaves return without touching the
    /// rest of the arena.
    pub(crate) fn refresh_size(&mut self, id: NodeId) -> Result<u64, CatalogError> {
        let node = self.get(id)?;
        match node.node_type() {
            NodeType::Meta => return Ok(0),
            NodeType::File | NodeType::Archived => return Ok(node.size),
            NodeType::Top | NodeType::Storage | NodeType::Dir => {}
        }

        let mut visited = HashSet::from([id]);
        // (container, position of the next child, sum so far)
        let mut stack: Vec<(NodeId, usize, u64)> = vec![(id, 0, 0)];
        let mut total = 0;

        while let Some(&(current, position, sum)) = stack.last() {
            let next = self.nodes[current.index()].children.get(position).copied();
            let Some(child) = next else {
                self.nodes[current.index()].size = sum;
                stack.pop();
                match stack.last_mut() {
                    Some(parent) => parent.2 = parent.2.saturating_add(sum),
                    None => total = sum,
                }
                continue;
            };

            if let Some(frame) = stack.last_mut() {
                frame.1 += 1;
            }
            if !visited.insert(child) {
                tracing::warn!(target: "catalog", node = %child, "node revisited during size refresh");
                return Err(CatalogError::CycleDetected { id: child });
            }

            let child_node = self.get(child)?;
            match child_node.node_type() {
                NodeType::Meta => {}
                NodeType::File | NodeType::Archived => {
                    let size = child_node.size;
                    if let Some(frame) = stack.last_mut() {
                        frame.2 = frame.2.saturating_add(size);
                    }
                }
                NodeType::Top | NodeType::Storage | NodeType::Dir => stack.push((child, 0, 0)),
            }
        }
        Ok(total)
    }

    fn check_parent(
        &self,
        kind: &NodeKind,
        name: &str,
        parent: NodeId,
        enforce_storage_depth: bool,
    ) -> Result<(), CatalogError> {
        let parent_node = self.get(parent)?;
        if kind.is_top() {
            return Err(CatalogError::invalid_operation(format!(
                "top node '{name}' cannot have a parent"
            )));
        }
        if !parent_node.may_have_children() {
            return Err(CatalogError::invalid_operation(format!(
                "{} '{}' cannot own children (attaching '{name}')",
                parent_node.node_type(),
                parent_node.name
            )));
        }
        if enforce_storage_depth && kind.is_storage() && !parent_node.kind.is_top() {
            return Err(CatalogError::invalid_operation(format!(
                "storage '{name}' must sit under top, not under {} '{}'",
                parent_node.node_type(),
                parent_node.name
            )));
        }
        Ok(())
    }

    fn link(&mut self, child: NodeId, parent: NodeId) {
        self.nodes[child.index()].parent = Some(parent);
        self.nodes[parent.index()].children.push(child);
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;

    fn dir() -> NodeKind {
        NodeKind::Dir {
            accessed: chrono::DateTime::from_timestamp(0, 0).unwrap(),
        }
    }

    #[test]
    fn test_insert_rejects_leaf_parent_without_mutation() {
        let mut arena = NodeArena::default();
        let meta = arena
            .insert(
                None,
                "meta",
                0,
                NodeKind::Meta {
                    attrs: IndexMap::new(),
                },
                true,
            )
            .unwrap();

        let err = arena.insert(Some(meta), "docs", 0, dir(), true).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidOperation { .. }));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_attach_rejects_cycle() {
        let mut arena = NodeArena::default();
        let outer = arena.insert(None, "outer", 0, dir(), true).unwrap();
        let inner = arena.insert(Some(outer), "inner", 0, dir(), true).unwrap();

        let err = arena.attach(outer, inner, true).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidOperation { .. }));
        assert!(arena.attach(outer, outer, true).is_err());
        assert!(arena.get(inner).unwrap().children().is_empty());
    }

    #[test]
    fn test_refresh_size_detects_revisit() {
        let mut arena = NodeArena::default();
        let outer = arena.insert(None, "outer", 0, dir(), true).unwrap();
        let inner = arena.insert(Some(outer), "inner", 0, dir(), true).unwrap();

        // Corrupt the tree by listing the child twice.
        arena.get_mut(outer).unwrap().children.push(inner);

        let err = arena.refresh_size(outer).unwrap_err();
        assert_eq!(err, CatalogError::CycleDetected { id: inner });
    }

    #[test]
    fn test_parent_chain_detects_loop() {
        let mut arena = NodeArena::default();
        let a = arena.insert(None, "a", 0, dir(), true).unwrap();
        let b = arena.insert(Some(a), "b", 0, dir(), true).unwrap();
        arena.get_mut(a).unwrap().parent = Some(b);

        let err = arena.parent_chain(b).unwrap_err();
        assert!(matches!(err, CatalogError::CycleDetected { .. }));
    }
}
