//! Catalog node types.

use std::fmt;

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Unique identifier for a node within a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Create a new NodeId from a u64.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u64)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hex digest of a file's content, as produced by the indexer.
///
/// The catalog never computes hashes; an empty digest means hashing was
/// disabled when the entry was indexed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(CompactString);

impl ContentHash {
    /// Wrap a hex digest.
    pub fn new(hex: impl Into<CompactString>) -> Self {
        Self(hex.into())
    }

    /// Get the digest as a hex string.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Check whether no digest was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check whether the digest is non-empty and made only of hex digits.
    pub fn is_hex(&self) -> bool {
        !self.0.is_empty() && self.0.chars().all(|c| c.is_ascii_hexdigit())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminant of a catalog node, as written in flat records.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Root of the catalog.
    Top,
    /// An indexed storage device.
    Storage,
    /// Directory inside a storage.
    Dir,
    /// Indexed file.
    File,
    /// Member of an archive file.
    #[strum(serialize = "arc")]
    #[serde(rename = "arc")]
    Archived,
    /// Free-form attributes.
    Meta,
}

impl NodeType {
    /// All node kinds, containers first.
    pub const ALL: [NodeType; 6] = [
        NodeType::Top,
        NodeType::Storage,
        NodeType::Dir,
        NodeType::File,
        NodeType::Archived,
        NodeType::Meta,
    ];

    /// Check whether nodes of this kind may own children.
    pub fn may_have_children(self) -> bool {
        matches!(self, NodeType::Top | NodeType::Storage | NodeType::Dir)
    }

    /// Get the record discriminant.
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Check whether nodes of `kind` may own children.
pub fn may_have_children(kind: NodeType) -> bool {
    kind.may_have_children()
}

/// Kind of catalog node and its kind-specific fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Root of the catalog.
    Top,
    /// An indexed storage device.
    Storage {
        /// Free bytes when indexed.
        free: u64,
        /// Capacity in bytes.
        total: u64,
        /// When the storage was indexed.
        indexed_at: DateTime<Utc>,
        /// Free-form description.
        attr: CompactString,
    },
    /// Directory.
    Dir {
        /// Last access time.
        accessed: DateTime<Utc>,
    },
    /// Regular file.
    File {
        /// Content digest.
        hash: ContentHash,
        /// Last access time.
        accessed: DateTime<Utc>,
    },
    /// Entry found inside an archive.
    Archived {
        /// Content digest.
        hash: ContentHash,
        /// Name of the enclosing archive.
        archive: CompactString,
    },
    /// Free-form key/value attributes.
    Meta {
        /// Attributes in insertion order.
        attrs: IndexMap<String, String>,
    },
}

impl NodeKind {
    /// Get the discriminant of this kind.
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Top => NodeType::Top,
            NodeKind::Storage { .. } => NodeType::Storage,
            NodeKind::Dir { .. } => NodeType::Dir,
            NodeKind::File { .. } => NodeType::File,
            NodeKind::Archived { .. } => NodeType::Archived,
            NodeKind::Meta { .. } => NodeType::Meta,
        }
    }

    /// Check whether nodes of this kind may own children.
    pub fn may_have_children(&self) -> bool {
        self.node_type().may_have_children()
    }

    /// Check if this is the catalog root.
    pub fn is_top(&self) -> bool {
        matches!(self, NodeKind::Top)
    }

    /// Check if this is a storage device.
    pub fn is_storage(&self) -> bool {
        matches!(self, NodeKind::Storage { .. })
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, NodeKind::Dir { .. })
    }

    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, NodeKind::File { .. })
    }

    /// Content digest of files and archive members.
    pub fn content_hash(&self) -> Option<&ContentHash> {
        match self {
            NodeKind::File { hash, .. } | NodeKind::Archived { hash, .. } => Some(hash),
            _ => None,
        }
    }
}

/// A single node of the catalog tree.
///
/// Structural fields are owned by the tree; use [`crate::CatalogTree`] to
/// attach nodes or refresh sizes.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogNode {
    pub(crate) id: NodeId,
    pub(crate) name: CompactString,
    pub(crate) size: u64,
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) flagged: bool,
}

impl CatalogNode {
    pub(crate) fn new(id: NodeId, name: impl Into<CompactString>, size: u64, kind: NodeKind) -> Self {
        // Meta entries never carry bytes.
        let size = if matches!(kind, NodeKind::Meta { .. }) { 0 } else { size };
        Self {
            id,
            name: name.into(),
            size,
            kind,
            parent: None,
            children: Vec::new(),
            flagged: false,
        }
    }

    /// Identifier of this node.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Entry name (not full path).
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Stored size in bytes.
    ///
    /// For containers this is the value cached by the last size refresh.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Node kind and its fields.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Discriminant of this node.
    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    /// Parent node, `None` for the root and for detached nodes.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in insertion order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Get the number of direct children.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Check whether this node may own children.
    pub fn may_have_children(&self) -> bool {
        self.kind.may_have_children()
    }

    /// Check whether this node is currently flagged.
    pub fn flagged(&self) -> bool {
        self.flagged
    }

    /// Used bytes of a storage node.
    pub fn used(&self) -> Option<u64> {
        match self.kind {
            NodeKind::Storage { free, total, .. } => Some(total.saturating_sub(free)),
            _ => None,
        }
    }
}
