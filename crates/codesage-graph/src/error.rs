//! Error types for codesage graph operations.
//!
//! All fallible operations return [`Result<T>`]. "Not found" is an explicit
//! variant rather than a sentinel, so callers can match on it.

use codesage_parser_api::ParserError;
use thiserror::Error;

/// Result type alias for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Boxed source error carried by the storage and serialization variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Comprehensive error type for all graph operations.
#[derive(Error, Debug)]
pub enum GraphError {
    /// Storage backend error (SQLite, RocksDB, failed transaction, ...)
    #[error("Storage error: {message}")]
    Storage {
        /// Detailed error message
        message: String,
        /// Optional source error
        #[source]
        source: Option<BoxError>,
    },

    /// Node not found in the graph or in storage
    #[error("Node not found: {node_id}")]
    NodeNotFound {
        /// ID of the missing node
        node_id: String,
    },

    /// Edge rejected because one of its endpoints is missing
    #[error("Invalid edge {source_id} -> {target_id}: {reason}")]
    InvalidEdge {
        /// Source node id
        source_id: String,
        /// Target node id
        target_id: String,
        /// Which endpoint was missing
        reason: String,
    },

    /// Query DSL tokenization, parse, or validation failure
    #[error("Query syntax error{}: {message}", .position.map(|p| format!(" at position {p}")).unwrap_or_default())]
    QuerySyntax {
        /// Human-readable reason
        message: String,
        /// Byte offset into the query string, when known
        position: Option<usize>,
    },

    /// Invalid operation (e.g., updater started twice)
    #[error("Invalid operation: {message}")]
    InvalidOperation {
        /// Description of what went wrong
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error details
        message: String,
        /// Optional source error
        #[source]
        source: Option<BoxError>,
    },

    /// A parser failed to produce a record for a file
    #[error(transparent)]
    Parser(#[from] ParserError),

    /// Filesystem watcher failure
    #[error("Watcher error: {message}")]
    Watcher {
        /// Error details
        message: String,
    },

    /// I/O error outside the storage layer
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GraphError {
    /// Create a storage error from a message and optional source.
    pub fn storage<E>(message: impl Into<String>, source: Option<E>) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            message: message.into(),
            source: source.map(|e| Box::new(e) as BoxError),
        }
    }

    /// Create a serialization error from a message and optional source.
    pub fn serialization<E>(message: impl Into<String>, source: Option<E>) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Serialization {
            message: message.into(),
            source: source.map(|e| Box::new(e) as BoxError),
        }
    }

    /// Create a query syntax error.
    pub fn query_syntax(message: impl Into<String>, position: Option<usize>) -> Self {
        Self::QuerySyntax {
            message: message.into(),
            position,
        }
    }

    /// Create a node-not-found error.
    pub fn node_not_found(node_id: impl Into<String>) -> Self {
        Self::NodeNotFound {
            node_id: node_id.into(),
        }
    }

    /// Create an invalid-operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Wrap any error raised inside a transaction scope as a storage error.
    ///
    /// Storage errors pass through unchanged so their source chain is kept.
    pub fn into_transaction_failure(self) -> Self {
        match self {
            err @ Self::Storage { .. } => err,
            other => Self::Storage {
                message: format!("Transaction rolled back: {other}"),
                source: Some(Box::new(other)),
            },
        }
    }

    /// True for [`GraphError::NodeNotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NodeNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_not_found_error() {
        let err = GraphError::node_not_found("function:a.py:main");
        assert_eq!(err.to_string(), "Node not found: function:a.py:main");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_storage_error() {
        let err = GraphError::storage("Failed to write to disk", None::<std::io::Error>);
        assert_eq!(err.to_string(), "Storage error: Failed to write to disk");
    }

    #[test]
    fn test_query_syntax_error_with_position() {
        let err = GraphError::query_syntax("Unexpected character '$'", Some(14));
        assert_eq!(
            err.to_string(),
            "Query syntax error at position 14: Unexpected character '$'"
        );
    }

    #[test]
    fn test_query_syntax_error_without_position() {
        let err = GraphError::query_syntax("Unknown node type: widget", None);
        assert_eq!(err.to_string(), "Query syntax error: Unknown node type: widget");
    }

    #[test]
    fn test_invalid_edge_error() {
        let err = GraphError::InvalidEdge {
            source_id: "a".to_string(),
            target_id: "b".to_string(),
            reason: "target node not in graph".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid edge a -> b: target node not in graph");
    }

    #[test]
    fn test_transaction_failure_wraps_non_storage_errors() {
        let err = GraphError::node_not_found("x").into_transaction_failure();
        assert!(matches!(err, GraphError::Storage { .. }));
        assert!(err.to_string().contains("Node not found: x"));

        let err = GraphError::storage("disk full", None::<std::io::Error>)
            .into_transaction_failure();
        assert_eq!(err.to_string(), "Storage error: disk full");
    }
}
