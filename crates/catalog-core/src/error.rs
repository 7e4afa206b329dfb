//! Error types for catalog tree operations.

use thiserror::Error;

use crate::node::NodeId;

/// Errors that can occur while building, querying or restoring a catalog tree.
///
/// Every variant is a contract or data-integrity violation rather than a
/// transient condition: callers fix the input or abort the operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// A record carried a kind discriminant that names no known node kind.
    #[error("Invalid node kind: {kind:?}")]
    InvalidNodeKind { kind: String },

    /// An illegal structural mutation was rejected before touching the tree.
    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },

    /// A storage node was not found at depth 1 during a positional lookup.
    #[error("Structural violation at {id}: {message}")]
    StructuralViolation { id: NodeId, message: String },

    /// A traversal reached the same node twice.
    #[error("Cycle detected at {id}")]
    CycleDetected { id: NodeId },

    /// The id does not belong to this tree.
    #[error("Node not found: {id}")]
    NodeNotFound { id: NodeId },

    /// A flat record could not be restored into the tree.
    #[error("Invalid record #{index}: {message}")]
    InvalidRecord { index: usize, message: String },
}

impl CatalogError {
    /// Create an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Create an invalid record error.
    pub fn invalid_record(index: usize, message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            index,
            message: message.into(),
        }
    }

    /// Create a structural violation error.
    pub fn structural_violation(id: NodeId, message: impl Into<String>) -> Self {
        Self::StructuralViolation {
            id,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CatalogError::InvalidNodeKind {
            kind: "bogus".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid node kind: \"bogus\"");

        let err = CatalogError::CycleDetected { id: NodeId::new(3) };
        assert_eq!(err.to_string(), "Cycle detected at #3");
    }

    #[test]
    fn test_error_constructors() {
        let err = CatalogError::invalid_operation("cannot attach");
        assert!(matches!(err, CatalogError::InvalidOperation { .. }));
        assert!(err.to_string().contains("cannot attach"));

        let err = CatalogError::invalid_record(4, "missing parent");
        assert_eq!(err.to_string(), "Invalid record #4: missing parent");
    }
}
