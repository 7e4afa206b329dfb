//! Flat record export and import.
//!
//! A catalog is handed to persistence as a flat list of [`NodeRecord`]s in
//! depth-first order, each naming its kind and its parent's record id. The
//! list is restored into a tree in one pass; any bad record fails the whole
//! import.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::arena::NodeArena;
use crate::config::CatalogConfig;
use crate::error::CatalogError;
use crate::node::{CatalogNode, ContentHash, NodeId, NodeKind, NodeType};
use crate::tree::CatalogTree;

/// Generic record of a single node, as exchanged with persistence.
///
/// The kind stays raw text so that records of unknown kinds can be read
/// and rejected with [`CatalogError::InvalidNodeKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Record id, unique within one export.
    pub id: u64,
    /// Record id of the parent, `None` only for the top node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<u64>,
    /// Kind discriminant (`top`, `storage`, `dir`, `file`, `arc`, `meta`).
    #[serde(rename = "type")]
    pub kind: CompactString,
    /// Entry name.
    pub name: CompactString,
    /// Stored size in bytes.
    #[serde(default)]
    pub size: u64,

    /// Storage free bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free: Option<u64>,
    /// Storage capacity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Storage indexing time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed_at: Option<DateTime<Utc>>,
    /// Storage description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr: Option<CompactString>,
    /// Content digest of files and archive members.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<ContentHash>,
    /// Last access time of files and directories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessed: Option<DateTime<Utc>>,
    /// Enclosing archive of archive members.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<CompactString>,
    /// Meta attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<IndexMap<String, String>>,
}

impl NodeRecord {
    /// Create an empty record of the given kind.
    pub fn new(id: u64, parent: Option<u64>, kind: impl Into<CompactString>, name: impl Into<CompactString>) -> Self {
        Self {
            id,
            parent,
            kind: kind.into(),
            name: name.into(),
            size: 0,
            free: None,
            total: None,
            indexed_at: None,
            attr: None,
            hash: None,
            accessed: None,
            archive: None,
            attrs: None,
        }
    }

    /// Build the record of a node.
    pub fn from_node(node: &CatalogNode, id: u64, parent: Option<u64>) -> Self {
        let mut record = Self::new(id, parent, node.node_type().as_str(), node.name());
        record.size = node.size();
        match node.kind() {
            NodeKind::Top => {}
            NodeKind::Storage {
                free,
                total,
                indexed_at,
                attr,
            } => {
                record.free = Some(*free);
                record.total = Some(*total);
                record.indexed_at = Some(*indexed_at);
                record.attr = Some(attr.clone());
            }
            NodeKind::Dir { accessed } => record.accessed = Some(*accessed),
            NodeKind::File { hash, accessed } => {
                record.hash = Some(hash.clone());
                record.accessed = Some(*accessed);
            }
            NodeKind::Archived { hash, archive } => {
                record.hash = Some(hash.clone());
                record.archive = Some(archive.clone());
            }
            NodeKind::Meta { attrs } => record.attrs = Some(attrs.clone()),
        }
        record
    }

    /// Parse the kind discriminant.
    pub fn node_type(&self) -> Result<NodeType, CatalogError> {
        NodeType::from_str(&self.kind).map_err(|_| CatalogError::InvalidNodeKind {
            kind: self.kind.to_string(),
        })
    }

    /// Build the node kind this record describes. `index` is the record's
    /// position, used in error reports.
    pub fn to_kind(&self, index: usize) -> Result<NodeKind, CatalogError> {
        let node_type = self.node_type()?;
        let missing = |field: &str| {
            CatalogError::invalid_record(
                index,
                format!("{node_type} '{}' has no '{field}'", self.name),
            )
        };

        let kind = match node_type {
            NodeType::Top => NodeKind::Top,
            NodeType::Storage => NodeKind::Storage {
                free: self.free.ok_or_else(|| missing("free"))?,
                total: self.total.ok_or_else(|| missing("total"))?,
                indexed_at: self.indexed_at.ok_or_else(|| missing("indexed_at"))?,
                attr: self.attr.clone().unwrap_or_default(),
            },
            NodeType::Dir => NodeKind::Dir {
                accessed: self.accessed.ok_or_else(|| missing("accessed"))?,
            },
            NodeType::File => NodeKind::File {
                hash: self.hash.clone().unwrap_or_default(),
                accessed: self.accessed.ok_or_else(|| missing("accessed"))?,
            },
            NodeType::Archived => NodeKind::Archived {
                hash: self.hash.clone().unwrap_or_default(),
                archive: self.archive.clone().ok_or_else(|| missing("archive"))?,
            },
            NodeType::Meta => NodeKind::Meta {
                attrs: self.attrs.clone().unwrap_or_default(),
            },
        };
        Ok(kind)
    }
}

impl CatalogTree {
    /// Export every node reachable from the root, parents before children.
    ///
    /// Record ids are positions in the returned list. Flags and detached
    /// nodes are not exported.
    pub fn export_records(&self) -> Vec<NodeRecord> {
        let mut ordinals: HashMap<NodeId, u64> = HashMap::with_capacity(self.len());
        let mut records = Vec::with_capacity(self.len());

        for node in self.iter() {
            let id = records.len() as u64;
            let parent = node
                .parent()
                .and_then(|parent| ordinals.get(&parent).copied());
            ordinals.insert(node.id(), id);
            records.push(NodeRecord::from_node(node, id, parent));
        }

        let detached = self.len().saturating_sub(records.len());
        tracing::info!(target: "catalog", records = records.len(), detached, "exported catalog");
        records
    }

    /// Restore a tree from records with the default configuration.
    pub fn from_records<I>(records: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = NodeRecord>,
    {
        Self::from_records_with_config(records, CatalogConfig::default())
    }

    /// Restore a tree from records.
    ///
    /// The first record must be the top node and every other record must
    /// name a parent that appears before it. Nothing is returned unless
    /// every record is valid.
    pub fn from_records_with_config<I>(records: I, config: CatalogConfig) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = NodeRecord>,
    {
        let records: Vec<NodeRecord> = records.into_iter().collect();

        // Unknown kinds are reported before any structural problem.
        for record in &records {
            record.node_type()?;
        }

        let mut arena = NodeArena::default();
        let mut ids: HashMap<u64, NodeId> = HashMap::with_capacity(records.len());
        let mut root = None;

        for (index, record) in records.into_iter().enumerate() {
            let kind = record.to_kind(index)?;
            if ids.contains_key(&record.id) {
                return Err(CatalogError::invalid_record(
                    index,
                    format!("duplicate record id {}", record.id),
                ));
            }

            let parent = if root.is_none() {
                if !kind.is_top() {
                    return Err(CatalogError::invalid_record(index, "first record must be the top node"));
                }
                if record.parent.is_some() {
                    return Err(CatalogError::invalid_record(index, "top node cannot have a parent"));
                }
                None
            } else {
                if kind.is_top() {
                    return Err(CatalogError::invalid_record(index, "catalog already has a top node"));
                }
                let Some(parent) = record.parent else {
                    return Err(CatalogError::invalid_record(index, "record has no parent"));
                };
                let Some(&parent) = ids.get(&parent) else {
                    return Err(CatalogError::invalid_record(
                        index,
                        format!("parent {parent} does not precede this record"),
                    ));
                };
                Some(parent)
            };

            let id = arena.insert(parent, record.name, record.size, kind, config.enforce_storage_depth)?;
            root.get_or_insert(id);
            ids.insert(record.id, id);
        }

        let Some(root) = root else {
            return Err(CatalogError::invalid_record(0, "no records"));
        };
        tracing::info!(target: "catalog", nodes = arena.len(), "imported catalog");
        Ok(CatalogTree::from_parts(arena, root, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(0, 0).unwrap()
    }

    fn sample_tree() -> CatalogTree {
        let mut tree = CatalogTree::new("top");
        let disk = tree
            .add_storage("disk1", 0, 100, 200, epoch(), "usb")
            .unwrap();
        let docs = tree.add_dir(Some(disk), "docs", 0, epoch()).unwrap();
        tree.add_file(Some(docs), "a.txt", 10, ContentHash::new("abc"), epoch())
            .unwrap();
        tree
    }

    #[test]
    fn test_export_order_and_parents() {
        let records = sample_tree().export_records();
        let kinds: Vec<&str> = records.iter().map(|r| r.kind.as_str()).collect();
        assert_eq!(kinds, ["top", "storage", "dir", "file"]);

        assert_eq!(records[0].parent, None);
        for (position, record) in records.iter().enumerate().skip(1) {
            assert_eq!(record.id, position as u64);
            assert!(record.parent.unwrap() < record.id);
        }
        assert_eq!(records[1].attr.as_deref(), Some("usb"));
        assert_eq!(records[3].hash.as_ref().map(ContentHash::as_str), Some("abc"));
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let mut records = sample_tree().export_records();
        records.push(NodeRecord::new(4, Some(1), "bogus", "x"));

        let err = CatalogTree::from_records(records).unwrap_err();
        assert_eq!(
            err,
            CatalogError::InvalidNodeKind {
                kind: "bogus".to_string()
            }
        );
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let mut records = sample_tree().export_records();
        records[2].accessed = None;

        let err = CatalogTree::from_records(records).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidRecord { index: 2, .. }));
    }

    #[test]
    fn test_forward_parent_is_rejected() {
        let mut records = sample_tree().export_records();
        records.swap(2, 3);

        let err = CatalogTree::from_records(records).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidRecord { index: 2, .. }));
    }

    #[test]
    fn test_leaf_parent_is_rejected() {
        let mut records = sample_tree().export_records();
        let mut child = NodeRecord::new(4, Some(3), "dir", "inside-file");
        child.accessed = Some(epoch());
        records.push(child);

        let err = CatalogTree::from_records(records).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidOperation { .. }));
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let err = CatalogTree::from_records(Vec::new()).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidRecord { .. }));
    }
}
